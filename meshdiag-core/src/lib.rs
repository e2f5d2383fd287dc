#![forbid(unsafe_code)]

//! Diagnostics core for a mesh-routing daemon: route-label codec and
//! algebra, routing-table aggregation, direct-peer inference and probe
//! statistics. All daemon traffic goes through [`admin::AdminConnection`].

pub mod admin;
pub mod algebra;
pub mod config;
pub mod error;
pub mod label;
pub mod logs;
pub mod peers;
pub mod ping;
pub mod table;
pub mod target;

pub use admin::AdminConnection;
pub use config::{AdminCredentials, MeshConfig};
pub use error::{MeshError, MeshResult};
pub use label::Label;
pub use peers::direct_peers;
pub use ping::{PingConfig, PingSession, PingSummary, Pinger};
pub use table::{fetch_table, fetch_table_until, Route};
pub use target::Target;
