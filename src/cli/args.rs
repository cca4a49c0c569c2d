use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

#[derive(Parser)]
#[command(name = "tickvault")]
#[command(about = "A durable single active timer that survives flaky networks and restarts")]
#[command(long_about = "tickvault - a durable single active timer

Times one entity at a time. While a timer runs its value is persisted to a
local store every sync interval and whenever the timer stops, switches or the
process is interrupted. Writes that fail are retried with backoff and queued
while offline.

QUICK START:
  tickvault start write-report              Run a stopwatch until Ctrl-C
  tickvault start review --countdown 25m    Count down from 25 minutes
  tickvault status                          Show every recorded timer
  tickvault outbox --replay                 Apply payloads left by an interrupted run

OUTPUT FORMATS:
  --output pretty    Human-readable colored output
  --output json      Machine-readable JSON for scripting
  (default: general.default_output in ~/.tickvault/config.yaml)

For more information on a specific command, run:
  tickvault <command> --help")]
#[command(version, propagate_version = true)]
pub struct Cli {
    /// Output format for command results
    ///
    /// Use 'pretty' for human-readable colored output, or 'json' for
    /// machine-readable output suitable for scripting. Defaults to
    /// `general.default_output` from the config file.
    #[arg(short, long, value_enum, global = true)]
    pub output: Option<OutputFormat>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for command results.
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable colored output.
    #[default]
    Pretty,
    /// Machine-readable JSON output.
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start timing an entity
    ///
    /// Runs in the foreground with a live display until Ctrl-C, or until a
    /// countdown reaches zero.
    ///
    /// # Examples
    ///
    ///   tickvault start write-report
    ///   tickvault start review --countdown 25m
    ///   tickvault start review --countdown       (uses timer.default_countdown_minutes)
    #[command(alias = "s")]
    Start {
        /// Entity to time
        entity: String,

        /// Count down instead of up (e.g. 25, 25m, 1h30m, 90s)
        ///
        /// A bare number is minutes. Without a value the configured default
        /// countdown is used.
        #[arg(short, long, num_args = 0..=1, default_missing_value = "")]
        countdown: Option<String>,
    },

    /// Mark a stored timer as stopped
    ///
    /// Use this when a previous run was killed without a chance to record
    /// its final state.
    Stop {
        /// Entity to stop
        entity: String,
    },

    /// Show stored timers
    ///
    /// With an entity, shows details for that entity only.
    #[command(alias = "st")]
    Status {
        /// Entity to show
        entity: Option<String>,
    },

    /// Inspect or replay the teardown outbox
    ///
    /// When a run is interrupted its final snapshot is written to the
    /// outbox. Replaying applies those payloads to the snapshot table unless
    /// a newer capture is already stored. `start` replays automatically.
    Outbox {
        /// Apply pending payloads and clear the outbox
        #[arg(long)]
        replay: bool,
    },

    /// Show the active configuration
    Config {
        /// Print the config file path only
        #[arg(long, conflicts_with = "init")]
        path: bool,

        /// Write a config file with default values if none exists
        #[arg(long)]
        init: bool,
    },
}
