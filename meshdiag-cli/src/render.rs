#![forbid(unsafe_code)]

//! Terminal output for the table, ping and log commands.

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, Table};
use console::style;

use meshdiag_core::admin::LogEntry;
use meshdiag_core::ping::ProbeOutcome;
use meshdiag_core::{MeshResult, Route};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Plain,
    Json,
}

/// Print routing table rows in the requested format.
pub fn routes(rows: &[&Route], format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(rows)?);
        }
        OutputFormat::Plain => {
            for (k, r) in rows.iter().enumerate() {
                println!(
                    "{} IP: {} -- Version: {} -- Path: {} -- Link: {:.0}",
                    k + 1,
                    r.ip,
                    r.version,
                    r.raw_path,
                    r.link
                );
            }
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table.load_preset(UTF8_FULL);
            table.set_header(vec!["#", "IP", "Version", "Path", "Link"]);
            for (k, r) in rows.iter().enumerate() {
                table.add_row(vec![
                    (k + 1).to_string(),
                    r.ip.clone(),
                    r.version.to_string(),
                    r.raw_path.clone(),
                    format!("{:.0}", r.link),
                ]);
            }
            println!("{table}");
        }
    }
    Ok(())
}

/// One line per probe, in the style of the system `ping`.
pub fn probe_line(target: &str, outcome: &MeshResult<ProbeOutcome>) {
    match outcome {
        Ok(ProbeOutcome::Reply { time_ms, .. }) => {
            println!("Reply from {} {}ms", target, style(time_ms).green());
        }
        Ok(ProbeOutcome::Timeout { time_ms }) => {
            println!("{}", style(format!("Timeout from {target} after {time_ms}ms")).yellow());
        }
        Err(e) => {
            println!("{}", style(format!("Error from {target}: {e}")).red());
        }
    }
}

pub fn log_line(counter: u64, entry: &LogEntry) {
    let time = chrono::DateTime::from_timestamp(entry.time, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| entry.time.to_string());
    println!(
        "{} {} {} {}:{} {}",
        counter,
        time,
        style(&entry.level).bold(),
        entry.file,
        entry.line,
        entry.message
    );
}
