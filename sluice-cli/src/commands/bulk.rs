//! Bulk ingest command
//!
//! Streams a newline-delimited JSON file into a bulk run with a progress bar.
//! Ctrl+C cancels the run; buffers already on the wire still finish.

use crate::error::{CliError, CliResult};
use crate::{Action, BulkArgs};
use colored::Colorize;
use futures::Stream;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use sluice_bulk::{BulkAllEvent, BulkOperation, ItemFailure, bulk_all};
use sluice_config::Settings;
use sluice_transport::RequestPipeline;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

/// Failures listed after the summary.
const SHOWN_FAILURES: usize = 10;

/// Turn one input line into an operation. Blank lines yield `None`.
pub fn operation(
    line: &str,
    action: Action,
    id_field: Option<&str>,
) -> Result<Option<BulkOperation>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let id = match id_field {
        Some(field) => {
            let doc: Value = serde_json::from_str(line).map_err(|e| e.to_string())?;
            match doc.get(field) {
                Some(Value::String(s)) => Some(s.clone()),
                Some(Value::Number(n)) => Some(n.to_string()),
                Some(_) => return Err(format!("field '{}' is not a string or number", field)),
                None => return Err(format!("missing field '{}'", field)),
            }
        }
        None => None,
    };

    let source = line.to_string();
    let operation = match action {
        Action::Index => BulkOperation::index_source(source),
        Action::Create => BulkOperation::create_source(source),
    }
    .map_err(|e| e.to_string())?;

    Ok(Some(match id {
        Some(id) => operation.with_id(id),
        None => operation,
    }))
}

/// Read operations lazily. Lines that cannot be turned into an operation
/// are logged, counted in `skipped` and left out.
fn read_operations(
    file: File,
    action: Action,
    id_field: Option<String>,
    skipped: Arc<AtomicU64>,
) -> impl Stream<Item = BulkOperation> + Send + 'static {
    let lines = BufReader::new(file).lines();
    futures::stream::unfold((lines, 0u64), move |(mut lines, mut number)| {
        let id_field = id_field.clone();
        let skipped = skipped.clone();
        async move {
            loop {
                number += 1;
                match lines.next_line().await {
                    Ok(Some(line)) => match operation(&line, action, id_field.as_deref()) {
                        Ok(Some(op)) => return Some((op, (lines, number))),
                        Ok(None) => {}
                        Err(reason) => {
                            warn!(line = number, reason = %reason, "Skipping input line");
                            skipped.fetch_add(1, Ordering::Relaxed);
                        }
                    },
                    Ok(None) => return None,
                    Err(e) => {
                        warn!(line = number, error = %e, "Stopped reading input");
                        return None;
                    }
                }
            }
        }
    })
}

async fn count_documents(path: &Path) -> CliResult<u64> {
    let mut lines = BufReader::new(File::open(path).await?).lines();
    let mut count = 0;
    while let Some(line) = lines.next_line().await? {
        if !line.trim().is_empty() {
            count += 1;
        }
    }
    Ok(count)
}

fn progress_bar(total: u64, quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓░"),
    );
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Bulk command
pub async fn run(settings: &Settings, args: &BulkArgs, quiet: bool) -> CliResult<()> {
    let mut settings = settings.clone();
    if let Some(index) = &args.index {
        settings.bulk.index = Some(index.clone());
    }
    if let Some(size) = args.buffer_size {
        settings.bulk.buffer_size = size;
    }
    if let Some(concurrency) = args.concurrency {
        settings.bulk.concurrency = concurrency;
    }
    if let Some(retries) = args.max_retries {
        settings.bulk.max_item_retries = retries;
    }
    let config = settings.bulk_config()?;
    let pipeline = RequestPipeline::http(settings.transport_config()?)?;

    let total = count_documents(&args.file).await?;
    let skipped = Arc::new(AtomicU64::new(0));
    let operations = read_operations(
        File::open(&args.file).await?,
        args.action,
        args.id_field.clone(),
        skipped.clone(),
    );

    let mut observer = bulk_all(pipeline, config, operations)?;
    let token = observer.cancellation_token();
    ctrlc::set_handler(move || token.cancel())
        .map_err(|e| CliError::Bulk(format!("Failed to set Ctrl+C handler: {}", e)))?;

    let pb = progress_bar(total, quiet);
    let mut failures: Vec<ItemFailure> = Vec::new();
    let mut outcome = None;
    while let Some(event) = observer.next_event().await {
        match event {
            BulkAllEvent::Buffer(result) => {
                pb.inc(result.items as u64);
                failures.extend(result.failures);
                let counters = observer.counters();
                pb.set_message(format!(
                    "{} failed, {} retries",
                    counters.items_failed(),
                    counters.total_retries()
                ));
            }
            BulkAllEvent::Completed(summary) => outcome = Some(Ok(summary)),
            BulkAllEvent::Failed(error) => outcome = Some(Err(error)),
        }
    }
    pb.finish_and_clear();

    let summary = match outcome {
        Some(Ok(summary)) => summary,
        Some(Err(error)) => return Err(error.into()),
        None => return Err(CliError::Bulk("run ended without an outcome".to_string())),
    };

    if !quiet {
        println!(
            "  {} {} indexed, {} failed, {} re-sent in {} retries ({} buffers, {:?})",
            "✓".green(),
            summary.items_succeeded,
            summary.items_failed,
            summary.items_retried,
            summary.total_retries,
            summary.buffers,
            summary.elapsed
        );
        let skipped = skipped.load(Ordering::Relaxed);
        if skipped > 0 {
            println!("  {} {} input lines skipped", "!".yellow(), skipped);
        }
        for failure in failures.iter().take(SHOWN_FAILURES) {
            eprintln!(
                "  {} #{} {} {}",
                "✗".red(),
                failure.seq,
                failure.id.as_deref().unwrap_or("-"),
                failure.reason
            );
        }
        if failures.len() > SHOWN_FAILURES {
            eprintln!("  ... and {} more", failures.len() - SHOWN_FAILURES);
        }
    }
    Ok(())
}
