//! Boundary to the external suite collaborator.
//!
//! The harness treats the suite as an opaque blocking callable: it receives a
//! filter/verbosity configuration and reports an integer status. It may panic;
//! the coordinator's worker boundary absorbs that and never lets it unwind.

/// Configuration handed to the suite for a single run.
#[derive(Debug, Clone)]
pub struct SuiteConfig {
    /// Negated-tag filter, e.g. `~[network]~[dns]`. Rendered from
    /// configuration data, never hardcoded.
    pub filter_expression: String,
    pub verbose_success: bool,
    pub show_durations: bool,
}

/// The external test-running entity, invoked at most once per process.
///
/// Implementations are expected to write their human-readable output to the
/// process's standard streams; the harness captures those streams for the
/// duration of the run.
pub trait Suite: Send + Sync {
    /// Runs the suite to completion and returns its status code
    /// (0 = all tests passed).
    fn run(&self, cfg: &SuiteConfig) -> i32;
}
