//! Foreground timer command.
//!
//! Runs a [`TimerService`] against the local store until Ctrl-C or until a
//! countdown completes.

use std::io::{IsTerminal, Write};
use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;
use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError};

use crate::cli::args::OutputFormat;
use crate::config::Config;
use crate::error::TickvaultError;
use crate::features::sync::{DrainReport, RetryExecutor};
use crate::features::timer::{
    format_clock, format_words, parse_duration, SyncEvent, TimerMode, TimerService,
};
use crate::output::{format_drain_report_pretty, format_live_line, to_json};
use crate::storage::LocalStore;

/// How long a completed countdown waits for its final write.
const FINAL_FLUSH_WAIT: Duration = Duration::from_secs(5);

/// How a foreground run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunEnd {
    /// The countdown reached zero.
    Completed,
    /// The user interrupted the run.
    Interrupted,
}

/// Summary of a foreground run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Entity that was timed.
    pub entity_id: String,
    /// Timer mode.
    pub mode: TimerMode,
    /// How the run ended.
    pub ended: RunEnd,
    /// Final value: elapsed for a stopwatch, remaining for a countdown.
    pub elapsed_seconds: u64,
    /// True if the final snapshot reached the store.
    pub saved: bool,
    /// Writes still waiting in the request queue at exit.
    pub queued: usize,
    /// Queue drain attempted before exit, if anything was queued.
    pub drained: Option<DrainReport>,
}

/// Resolve the `--countdown` argument into a timer mode.
///
/// An empty value selects the configured default countdown.
///
/// # Errors
///
/// Returns [`TickvaultError::InvalidDuration`] if the value does not parse or
/// is zero.
pub fn mode_from_arg(countdown: Option<&str>, config: &Config) -> Result<TimerMode, TickvaultError> {
    let total_seconds = match countdown {
        None => return Ok(TimerMode::Stopwatch),
        Some(raw) if raw.trim().is_empty() => {
            config.timer.default_countdown_minutes.saturating_mul(60)
        },
        Some(raw) => parse_duration(raw)
            .map(|d| d.as_secs())
            .ok_or_else(|| TickvaultError::InvalidDuration(raw.to_string()))?,
    };

    if total_seconds == 0 {
        return Err(TickvaultError::InvalidDuration(
            countdown.unwrap_or_default().to_string(),
        ));
    }
    Ok(TimerMode::Countdown { total_seconds })
}

/// Run a timer in the foreground.
///
/// # Errors
///
/// Returns an error for a blank entity or bad duration, or if the store or
/// runtime fails.
pub fn start(
    store: Arc<LocalStore>,
    config: &Config,
    entity: &str,
    countdown: Option<&str>,
    format: OutputFormat,
) -> Result<String, TickvaultError> {
    if entity.trim().is_empty() {
        return Err(TickvaultError::InvalidEntity(entity.to_string()));
    }
    let mode = mode_from_arg(countdown, config)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let live = format == OutputFormat::Pretty && std::io::stderr().is_terminal();
    let summary = runtime.block_on(run(store, config, entity, mode, live))?;

    match format {
        OutputFormat::Pretty => Ok(format_summary_pretty(&summary)),
        OutputFormat::Json => to_json(&summary),
    }
}

async fn run(
    store: Arc<LocalStore>,
    config: &Config,
    entity: &str,
    mode: TimerMode,
    live: bool,
) -> Result<RunSummary, TickvaultError> {
    let replayed = store.replay_outbox()?;
    if replayed.applied + replayed.stale + replayed.discarded > 0 {
        tracing::info!(
            applied = replayed.applied,
            stale = replayed.stale,
            discarded = replayed.discarded,
            "replayed teardown outbox"
        );
    }

    let service = TimerService::builder(store.clone(), store.clone())
        .executor(RetryExecutor::new(config.retry.to_retry_config()))
        .queue_config(config.queue.to_queue_config())
        .coordinator_config(config.sync.to_coordinator_config())
        .build();
    let mut completed = service.on_timer_completed();
    let mut events = service.sync_events();

    service.start_timer(entity, mode).await?;

    let mut display = tokio::time::interval(Duration::from_secs(1));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let ended = loop {
        tokio::select! {
            _ = display.tick() => {
                if live {
                    render_live(&service);
                }
            },
            done = completed.recv() => match done {
                Ok(done) if done.entity_id == entity => break RunEnd::Completed,
                Ok(_) | Err(RecvError::Lagged(_)) => {},
                Err(RecvError::Closed) => break RunEnd::Interrupted,
            },
            signal = &mut ctrl_c => {
                signal?;
                break RunEnd::Interrupted;
            },
        }
    };
    if live {
        eprintln!();
    }

    let (saved, drained) = match ended {
        RunEnd::Completed => {
            let saved = wait_for_final_flush(&mut events, entity).await;
            let drained = if service.queue_size() > 0 {
                Some(service.drain_queue().await)
            } else {
                None
            };
            (saved, drained)
        },
        RunEnd::Interrupted => {
            // The outbox lives in the same database, so apply it right away.
            let saved = service.teardown() && store.replay_outbox()?.applied > 0;
            (saved, None)
        },
    };

    Ok(RunSummary {
        entity_id: entity.to_string(),
        mode,
        ended,
        elapsed_seconds: service.get_elapsed(entity).unwrap_or_default(),
        saved,
        queued: service.queue_size(),
        drained,
    })
}

fn render_live(service: &TimerService) {
    if let Some(active) = service.active() {
        let line = format_live_line(
            &active.entity_id,
            active.fields.mode,
            active.fields.elapsed_seconds,
        );
        let mut stderr = std::io::stderr().lock();
        // A closed stderr only loses the display.
        let _ = write!(stderr, "\r{line}\x1b[K");
        let _ = stderr.flush();
    }
}

async fn wait_for_final_flush(events: &mut broadcast::Receiver<SyncEvent>, entity: &str) -> bool {
    let wait = async {
        loop {
            match events.recv().await {
                Ok(SyncEvent::Flushed {
                    entity_id,
                    elapsed_seconds: 0,
                }) if entity_id == entity => return true,
                Ok(SyncEvent::Queued { entity_id, .. } | SyncEvent::Failed { entity_id, .. })
                    if entity_id == entity =>
                {
                    return false;
                },
                Ok(_) | Err(RecvError::Lagged(_)) => {},
                Err(RecvError::Closed) => return false,
            }
        }
    };
    tokio::time::timeout(FINAL_FLUSH_WAIT, wait)
        .await
        .unwrap_or(false)
}

fn format_summary_pretty(summary: &RunSummary) -> String {
    let mut lines = Vec::new();

    match (summary.ended, summary.mode) {
        (RunEnd::Completed, TimerMode::Countdown { total_seconds }) => {
            lines.push(format!(
                "{} Countdown finished for {} ({})",
                "✓".green(),
                summary.entity_id.bold(),
                format_words(total_seconds)
            ));
        },
        (_, TimerMode::Countdown { .. }) => {
            lines.push(format!(
                "{} Stopped {} with {} remaining",
                "■".yellow(),
                summary.entity_id.bold(),
                format_clock(summary.elapsed_seconds).cyan()
            ));
        },
        (_, TimerMode::Stopwatch) => {
            lines.push(format!(
                "{} Stopped {} at {} ({})",
                "■".yellow(),
                summary.entity_id.bold(),
                format_clock(summary.elapsed_seconds).cyan(),
                format_words(summary.elapsed_seconds)
            ));
        },
    }

    if summary.saved {
        lines.push(format!("  {}", "Final snapshot saved".dimmed()));
    } else {
        lines.push(format!(
            "  {}",
            "Final snapshot was not saved; run `tickvault outbox --replay` later".red()
        ));
    }
    if let Some(report) = &summary.drained {
        lines.push(String::new());
        lines.push(format_drain_report_pretty(report));
    }
    if summary.queued > 0 {
        lines.push(format!(
            "  {}",
            format!("{} writes still queued", summary.queued).yellow()
        ));
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_from_arg_stopwatch() {
        let config = Config::default();
        assert_eq!(mode_from_arg(None, &config).unwrap(), TimerMode::Stopwatch);
    }

    #[test]
    fn test_mode_from_arg_default_countdown() {
        let mut config = Config::default();
        config.timer.default_countdown_minutes = 10;
        assert_eq!(
            mode_from_arg(Some(""), &config).unwrap(),
            TimerMode::Countdown { total_seconds: 600 }
        );
    }

    #[test]
    fn test_mode_from_arg_explicit() {
        let config = Config::default();
        assert_eq!(
            mode_from_arg(Some("1h30m"), &config).unwrap(),
            TimerMode::Countdown {
                total_seconds: 5400
            }
        );
        assert_eq!(
            mode_from_arg(Some("90s"), &config).unwrap(),
            TimerMode::Countdown { total_seconds: 90 }
        );
    }

    #[test]
    fn test_mode_from_arg_invalid() {
        let mut config = Config::default();
        let err = mode_from_arg(Some("soon"), &config).unwrap_err();
        assert!(matches!(err, TickvaultError::InvalidDuration(_)));

        config.timer.default_countdown_minutes = 0;
        let err = mode_from_arg(Some(""), &config).unwrap_err();
        assert!(matches!(err, TickvaultError::InvalidDuration(_)));
    }

    #[test]
    fn test_start_rejects_blank_entity() {
        let store = Arc::new(LocalStore::in_memory().unwrap());
        let err = start(store, &Config::default(), "  ", None, OutputFormat::Json).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_summary_pretty() {
        colored::control::set_override(false);
        let summary = RunSummary {
            entity_id: "write-report".to_string(),
            mode: TimerMode::Stopwatch,
            ended: RunEnd::Interrupted,
            elapsed_seconds: 754,
            saved: true,
            queued: 0,
            drained: None,
        };
        let output = format_summary_pretty(&summary);
        assert!(output.contains("Stopped write-report at 12:34"));
        assert!(output.contains("Final snapshot saved"));

        let summary = RunSummary {
            mode: TimerMode::Countdown { total_seconds: 1500 },
            ended: RunEnd::Completed,
            elapsed_seconds: 0,
            saved: false,
            queued: 1,
            drained: Some(DrainReport {
                requeued: 1,
                ..DrainReport::empty()
            }),
            ..summary
        };
        let output = format_summary_pretty(&summary);
        assert!(output.contains("Countdown finished"));
        assert!(output.contains("not saved"));
        assert!(output.contains("1 requeued"));
        assert!(output.contains("1 writes still queued"));
    }

    #[test]
    fn test_summary_json_shape() {
        let summary = RunSummary {
            entity_id: "a".to_string(),
            mode: TimerMode::Countdown { total_seconds: 60 },
            ended: RunEnd::Completed,
            elapsed_seconds: 0,
            saved: true,
            queued: 0,
            drained: None,
        };
        let json: serde_json::Value = serde_json::from_str(&to_json(&summary).unwrap()).unwrap();
        assert_eq!(json["ended"], "completed");
        assert_eq!(json["mode"]["kind"], "countdown");
        assert_eq!(json["saved"], true);
    }
}
