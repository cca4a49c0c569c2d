//! Configuration management for tickvault.
//!
//! This module handles loading and saving configuration from `~/.tickvault/`.

mod paths;
mod settings;

pub use paths::Paths;
pub use settings::{
    ColorSetting, Config, GeneralSettings, QueueSettings, RetrySettings, SyncSettings,
    TimerSettings,
};
