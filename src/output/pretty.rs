use colored::Colorize;

use crate::features::sync::DrainReport;
use crate::features::timer::{format_clock, progress_bar, TimerMode};
use crate::storage::{OutboxEntry, ReplayReport, StoredSnapshot};

const BAR_WIDTH: usize = 20;

/// Format stored snapshots as a pretty table
pub fn format_snapshots_pretty(snapshots: &[StoredSnapshot]) -> String {
    if snapshots.is_empty() {
        return "Snapshots (0 items)\n  No timers recorded".to_string();
    }

    let mut output = format!("Snapshots ({} items)\n", snapshots.len());
    output.push_str(&"─".repeat(60));
    output.push('\n');

    for snapshot in snapshots {
        output.push_str(&snapshot_line(snapshot));
        output.push('\n');
    }

    output.trim_end().to_string()
}

/// Format a single stored snapshot with details
pub fn format_snapshot_pretty(snapshot: &StoredSnapshot) -> String {
    let fields = &snapshot.fields;
    let mut lines = vec![
        format!("{}", snapshot.entity_id.bold()),
        "─".repeat(40),
        format!("  Mode:      {}", fields.mode),
        format!("  {}", value_label(fields.mode, fields.elapsed_seconds)),
        format!("  State:     {}", state_label(fields.running)),
        format!(
            "  Captured:  {}",
            fields.captured_at.format("%Y-%m-%d %H:%M:%S UTC")
        ),
        format!(
            "  Persisted: {}",
            snapshot.persisted_at.format("%Y-%m-%d %H:%M:%S UTC")
        ),
    ];

    if let TimerMode::Countdown { total_seconds } = fields.mode {
        lines.push(format!(
            "  {}",
            progress_bar(fields.elapsed_seconds, total_seconds, BAR_WIDTH).cyan()
        ));
    }

    lines.join("\n")
}

/// Format pending outbox entries
pub fn format_outbox_pretty(entries: &[OutboxEntry]) -> String {
    if entries.is_empty() {
        return "Outbox (0 items)\n  Nothing waiting for replay".to_string();
    }

    let mut lines = vec![format!("Outbox ({} items)", entries.len()), "─".repeat(60)];
    for entry in entries {
        lines.push(format!(
            "  {} {} {}",
            format!("#{}", entry.id).dimmed(),
            entry.endpoint.cyan(),
            entry.created_at.format("%Y-%m-%d %H:%M:%S").to_string().dimmed()
        ));
    }
    lines.join("\n")
}

/// Format the result of replaying the outbox
pub fn format_replay_pretty(report: &ReplayReport) -> String {
    let total = report.applied + report.stale + report.discarded;
    let mut lines = vec![format!("Replayed {total} outbox entries"), "─".repeat(40)];

    if report.applied > 0 {
        lines.push(format!(
            "  {} {}",
            "✓".green(),
            format!("{} applied", report.applied).green()
        ));
    }
    if report.stale > 0 {
        lines.push(format!(
            "  {} {}",
            "○".yellow(),
            format!("{} older than stored", report.stale).yellow()
        ));
    }
    if report.discarded > 0 {
        lines.push(format!(
            "  {} {}",
            "✗".red(),
            format!("{} unreadable", report.discarded).red()
        ));
    }

    lines.join("\n")
}

/// Format the result of draining the request queue
pub fn format_drain_report_pretty(report: &DrainReport) -> String {
    if report.skipped {
        return format!("{} Drain already in progress", "○".yellow());
    }

    let mut lines = vec![
        format!("Queue drained: {} operations", report.attempts()),
        "─".repeat(40),
    ];

    if report.succeeded > 0 {
        lines.push(format!(
            "  {} {}",
            "✓".green(),
            format!("{} succeeded", report.succeeded).green()
        ));
    }
    if report.requeued > 0 {
        lines.push(format!(
            "  {} {}",
            "○".yellow(),
            format!("{} requeued", report.requeued).yellow()
        ));
    }
    if report.superseded > 0 {
        lines.push(format!(
            "  {} {}",
            "○".dimmed(),
            format!("{} superseded", report.superseded).dimmed()
        ));
    }
    if report.dropped > 0 {
        lines.push(format!(
            "  {} {}",
            "✗".red(),
            format!("{} dropped", report.dropped).red()
        ));
        for id in report.dropped_ids.iter().take(3) {
            lines.push(format!("    {}", id.dimmed()));
        }
        if report.dropped_ids.len() > 3 {
            lines.push(format!("    ... and {} more", report.dropped_ids.len() - 3));
        }
    }
    if report.interrupted {
        lines.push(String::new());
        lines.push(format!("{} Stopped early: network went offline", "!".yellow()));
    }

    lines.join("\n")
}

/// One-line live display of a running timer.
///
/// `seconds` is elapsed time for a stopwatch and remaining time for a
/// countdown.
pub fn format_live_line(entity_id: &str, mode: TimerMode, seconds: u64) -> String {
    match mode {
        TimerMode::Stopwatch => format!(
            "{} {}  {}",
            "▶".green(),
            entity_id.bold(),
            format_clock(seconds).cyan().bold()
        ),
        TimerMode::Countdown { total_seconds } => format!(
            "{} {}  {} {}",
            "▶".green(),
            entity_id.bold(),
            format_clock(seconds).cyan().bold(),
            progress_bar(seconds, total_seconds, BAR_WIDTH).dimmed()
        ),
    }
}

fn snapshot_line(snapshot: &StoredSnapshot) -> String {
    let fields = &snapshot.fields;
    let icon = if fields.running {
        "●".green()
    } else {
        "○".dimmed()
    };
    format!(
        "{} {}  {}  {}  {}",
        icon,
        snapshot.entity_id.bold(),
        format_clock(fields.elapsed_seconds).cyan(),
        fields.mode.to_string().dimmed(),
        snapshot
            .persisted_at
            .format("%Y-%m-%d %H:%M")
            .to_string()
            .dimmed()
    )
}

fn value_label(mode: TimerMode, seconds: u64) -> String {
    match mode {
        TimerMode::Stopwatch => format!("Elapsed:   {}", format_clock(seconds)),
        TimerMode::Countdown { .. } => format!("Remaining: {}", format_clock(seconds)),
    }
}

fn state_label(running: bool) -> colored::ColoredString {
    if running {
        "running".green()
    } else {
        "stopped".yellow()
    }
}
