//! CLI command implementations

mod batch;
mod console;
mod manage;

pub use batch::{batch, Payload};
pub use console::console;
pub use manage::config;

use anyhow::Result;
use runbox_core::ActionReport;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Print a report: JSON on stdout, or text on stdout/stderr by outcome
pub(crate) fn print_report(report: &ActionReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(report)?);
    } else if report.ok {
        println!("{}", report.text);
    } else {
        eprintln!("{}", report.text);
    }
    Ok(())
}

/// Progress channel whose messages go to stderr (dropped in JSON mode).
///
/// The printer task ends once every sender is gone.
pub(crate) fn progress_channel(json: bool) -> (mpsc::UnboundedSender<String>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let printer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if !json {
                eprintln!("  {}", msg);
            }
        }
    });
    (tx, printer)
}
