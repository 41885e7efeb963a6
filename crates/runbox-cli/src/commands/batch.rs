//! One-shot runs: bring a container up, execute, and tear it down

use anyhow::{anyhow, Result};
use runbox_core::{ActionReport, LifecycleState, SessionManager};

use super::{print_report, progress_channel};

/// What a one-shot run executes once the container is up
pub enum Payload {
    /// Source code for the configured interpreter
    Code(String),
    /// Shell commands, one per line
    Terminal(String),
}

/// Pull, create and run, execute `payload`, then tear down unless `keep`.
///
/// Stops at the first failed step. The container is removed whenever it
/// was created, even if a later step failed.
pub async fn batch(
    manager: &SessionManager,
    image: Option<String>,
    keep: bool,
    payload: Payload,
    json: bool,
) -> Result<()> {
    let image = image.unwrap_or_else(|| manager.config().engine.default_image.clone());
    let (progress, printer) = progress_channel(json);
    let mut reports: Vec<ActionReport> = Vec::new();
    let mut output: Option<ActionReport> = None;

    let mut ok = record(&mut reports, manager.pull_with_progress(&image, progress.clone()).await);
    if ok {
        ok = record(&mut reports, manager.create_with_progress(progress.clone()).await);
    }
    if ok {
        ok = record(&mut reports, manager.run_with_progress(progress.clone()).await);
    }
    if ok {
        let report = match payload {
            Payload::Code(ref source) => {
                manager
                    .execute_code_with_progress(source, progress.clone())
                    .await
            }
            Payload::Terminal(ref text) => {
                manager
                    .execute_terminal_with_progress(text, progress.clone())
                    .await
            }
        };
        output = Some(report.clone());
        record(&mut reports, report);
    }

    let failed = reports.iter().find(|r| !r.ok).cloned();

    if !keep && manager.state().await >= LifecycleState::Created {
        let report = manager.teardown_with_progress(progress.clone()).await;
        if !report.ok {
            tracing::warn!("{}", report.text);
        }
        reports.push(report);
    } else if keep {
        tracing::info!(
            "Keeping container {}",
            manager.config().engine.container_name
        );
    }
    drop(progress);
    let _ = printer.await;

    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else if let Some(ref report) = output {
        if report.ok {
            print_report(report, false)?;
        }
    }

    match failed {
        Some(report) => Err(anyhow!(report.text)),
        None => Ok(()),
    }
}

fn record(reports: &mut Vec<ActionReport>, report: ActionReport) -> bool {
    let ok = report.ok;
    reports.push(report);
    ok
}
