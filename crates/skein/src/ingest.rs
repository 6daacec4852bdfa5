// SPDX-FileCopyrightText: 2026 Skein Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `skein ingest` command implementation.
//!
//! Reads one event per line, feeds them through an [`IngestionPipeline`]
//! wired to the configured collector, logs background failures as they
//! arrive, and prints a JSON summary once the pipeline has shut down.

use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use skein_config::SkeinConfig;
use skein_core::{Context, Event, EventId, EventType, SkeinError};
use skein_ingest::{
    HttpTransport, HttpTransportConfig, IngestionPipeline, PipelineConfig, PipelineStats,
};
use skein_resilience::CircuitState;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// One input line.
#[derive(Debug, Deserialize)]
struct InputLine {
    #[serde(rename = "type")]
    event_type: EventType,
    #[serde(default)]
    id: Option<String>,
    #[serde(alias = "body")]
    payload: serde_json::Value,
}

impl From<InputLine> for Event {
    fn from(line: InputLine) -> Self {
        match line.id {
            Some(id) => Event::with_id(EventId::from(id), line.event_type, line.payload),
            None => Event::new(line.event_type, line.payload),
        }
    }
}

/// What a run did, printed as JSON on stdout.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Summary {
    pub lines: u64,
    pub unparsable: u64,
    pub submitted: u64,
    pub delivered: u64,
    pub failed: u64,
    pub dropped: u64,
    pub rejected: u64,
    pub async_errors: u64,
    pub pending: usize,
}

impl Summary {
    fn new(lines: u64, unparsable: u64, stats: &PipelineStats, async_errors: u64) -> Self {
        Self {
            lines,
            unparsable,
            submitted: stats.submitted,
            delivered: stats.events_delivered,
            failed: stats.events_failed,
            dropped: stats.dropped,
            rejected: stats.rejected,
            async_errors,
            pending: stats.pending,
        }
    }
}

pub fn parse_line(line: &str) -> Result<Event, SkeinError> {
    let input: InputLine = serde_json::from_str(line)
        .map_err(|e| SkeinError::validation(format!("unparsable event: {e}")))?;
    Ok(input.into())
}

/// Runs the command end to end. Errors only for setup failures or an
/// incomplete shutdown; per-event problems are counted in the summary.
pub async fn run(config: &SkeinConfig, path: &Path, print_metrics: bool) -> Result<(), SkeinError> {
    let metrics = if print_metrics {
        Some(
            metrics_exporter_prometheus::PrometheusBuilder::new()
                .install_recorder()
                .map_err(|e| {
                    SkeinError::Internal(format!("failed to install Prometheus recorder: {e}"))
                })?,
        )
    } else {
        None
    };
    skein_ingest::recording::register_metrics();

    let reader: Box<dyn AsyncBufRead + Send + Unpin> = if path == Path::new("-") {
        Box::new(BufReader::new(tokio::io::stdin()))
    } else {
        let file = tokio::fs::File::open(path)
            .await
            .map_err(|e| SkeinError::Config(format!("cannot open {}: {e}", path.display())))?;
        Box::new(BufReader::new(file))
    };

    let interrupt = CancellationToken::new();
    let watcher = interrupt.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping intake");
            watcher.cancel();
        }
    });

    let summary = ingest(config, reader, Context::with_token(interrupt.child_token())).await?;
    println!(
        "{}",
        serde_json::to_string(&summary)
            .map_err(|e| SkeinError::Internal(format!("failed to encode summary: {e}")))?
    );
    if let Some(handle) = metrics {
        print!("{}", handle.render());
    }
    if summary.pending > 0 {
        return Err(SkeinError::Shutdown {
            pending_events: summary.pending,
        });
    }
    Ok(())
}

/// Submits every line of `reader` and shuts the pipeline down.
///
/// `ctx` bounds intake only, including a read waiting on a quiet input;
/// the final drain uses the configured shutdown timeout.
pub async fn ingest(
    config: &SkeinConfig,
    reader: impl AsyncBufRead + Unpin,
    ctx: Context,
) -> Result<Summary, SkeinError> {
    let transport = HttpTransport::new(HttpTransportConfig::from(&config.client))?;
    info!(endpoint = transport.endpoint(), "sending events");

    let pipeline = IngestionPipeline::builder(PipelineConfig::from_config(config))
        .transport(Arc::new(transport))
        .on_circuit_transition(Arc::new(|from: CircuitState, to: CircuitState| {
            info!(%from, %to, "collector circuit changed state");
        }))
        .on_error_overflow(Arc::new(|dropped: u64| {
            warn!(dropped, "async error buffer full, dropping reports");
        }))
        .build()?;

    let reporter = Arc::clone(pipeline.reporter());
    let errors = tokio::spawn(async move {
        let mut seen = 0u64;
        while let Some(err) = reporter.recv().await {
            seen += 1;
            warn!(
                operation = %err.operation,
                events = err.event_ids.len(),
                retryable = err.retryable,
                error = %err.cause,
                "background ingestion failure"
            );
        }
        seen
    });

    let mut lines = 0u64;
    let mut unparsable = 0u64;
    let mut reader = reader.lines();
    loop {
        let line = match ctx.run(reader.next_line()).await {
            Ok(Ok(Some(line))) => line,
            Ok(Ok(None)) => break,
            Ok(Err(e)) => {
                warn!(line = lines + 1, error = %e, "read failed, stopping intake");
                break;
            }
            Err(_) => {
                debug!("intake interrupted");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        lines += 1;
        let event = match parse_line(&line) {
            Ok(event) => event,
            Err(e) => {
                unparsable += 1;
                warn!(line = lines, error = %e, "skipping line");
                continue;
            }
        };
        match pipeline.submit_wait(event, &ctx).await {
            Ok(()) => {}
            Err(e) if e.is_cancellation() => break,
            Err(e) => debug!(line = lines, error = %e, "event not accepted"),
        }
    }

    if let Err(e) = pipeline.close().await {
        warn!(error = %e, "shutdown incomplete");
    }
    let async_errors = errors
        .await
        .map_err(|e| SkeinError::Internal(format!("error reporter task failed: {e}")))?;

    Ok(Summary::new(lines, unparsable, &pipeline.stats(), async_errors))
}
