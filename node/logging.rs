//! Tracing subscriber setup.

#[cfg(feature = "tracing-subscriber")]
use tracing_subscriber::EnvFilter;

/// Filter from `RUST_LOG` when set and parseable, else `fallback`, else
/// `info`.
#[cfg(feature = "tracing-subscriber")]
pub fn env_filter(fallback: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Installs a global `fmt` subscriber. Returns `false` when one was already
/// installed, which happens when several tests share a process.
#[cfg(feature = "tracing-subscriber")]
pub fn init_tracing(fallback: &str) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(fallback))
        .with_target(false)
        .try_init()
        .is_ok()
}

#[cfg(all(test, feature = "tracing-subscriber"))]
mod tests {
    use super::*;

    #[test]
    fn test_bad_fallback_still_builds_filter() {
        let filter = env_filter("not a [valid filter");
        assert!(!filter.to_string().is_empty());
    }
}
