//! Runtime configuration.

use crate::cache::DEFAULT_CACHE_CAPACITY;

/// Tunables read once at dataset/manager construction.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeConfig {
    /// Maximum number of remote tiles a manager's cache retains. Defaults
    /// to [`DEFAULT_CACHE_CAPACITY`].
    pub cache_capacity: usize,
    /// Whether remote fetches emit per-call `tracing::debug!` timing in
    /// addition to the always-on telemetry counters.
    pub trace_remote_fetch: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            trace_remote_fetch: trace_remote_fetch_enabled(),
        }
    }
}

/// A single env-var read, cached at construction instead of re-read on
/// every call.
fn trace_remote_fetch_enabled() -> bool {
    std::env::var("GP_TILE_TIMING").is_ok_and(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_cache_capacity_matches_constant() {
        assert_eq!(RuntimeConfig::default().cache_capacity, DEFAULT_CACHE_CAPACITY);
    }
}
