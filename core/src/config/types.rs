use serde::{Deserialize, Serialize};

use crate::suite::SuiteConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Names the log file: `<suite_name>-tests.log`.
    #[serde(default = "default_suite_name")]
    pub suite_name: String,

    /// Test categories excluded from the run. These are data, not code:
    /// the defaults name the categories known to be unreliable in the
    /// host environment.
    #[serde(default = "default_exclude_tags")]
    pub exclude_tags: Vec<String>,

    #[serde(default)]
    pub verbose_success: bool,

    #[serde(default = "default_show_durations")]
    pub show_durations: bool,

    /// Wall-clock watchdog: a run still executing after this many seconds
    /// is abandoned.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Tick of the live output flusher.
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
}

fn default_suite_name() -> String {
    "suite".to_string()
}

fn default_exclude_tags() -> Vec<String> {
    ["network", "dns", "benchmark", "event-loop"]
        .into_iter()
        .map(str::to_string)
        .collect()
}

fn default_show_durations() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    600
}

fn default_flush_interval_ms() -> u64 {
    150
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            suite_name: default_suite_name(),
            exclude_tags: default_exclude_tags(),
            verbose_success: false,
            show_durations: default_show_durations(),
            timeout_secs: default_timeout_secs(),
            flush_interval_ms: default_flush_interval_ms(),
        }
    }
}

impl HarnessConfig {
    pub fn log_file_name(&self) -> String {
        format!("{}-tests.log", self.suite_name)
    }

    /// Renders `exclude_tags` as a negated-tag filter expression.
    pub fn filter_expression(&self) -> String {
        self.exclude_tags
            .iter()
            .map(|tag| format!("~[{tag}]"))
            .collect()
    }

    pub fn suite_config(&self) -> SuiteConfig {
        SuiteConfig {
            filter_expression: self.filter_expression(),
            verbose_success: self.verbose_success,
            show_durations: self.show_durations,
        }
    }
}
