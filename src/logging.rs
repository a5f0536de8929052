//! Tracing setup
//!
//! The library only emits `tracing` events. Binaries and tests that want to
//! see them call `init_tracing` once.

use tracing_subscriber::EnvFilter;

/// Install a global fmt subscriber.
///
/// `RUST_LOG` wins when set, otherwise `default_directive` (e.g. `"archive_meta=debug"`)
/// is used. Returns an error if a global subscriber is already installed.
pub fn init_tracing(default_directive: &str) -> Result<(), String> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive))
        .map_err(|e| format!("invalid log directive '{}': {}", default_directive, e))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|e| format!("tracing already initialized: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_an_error() {
        let _ = init_tracing("archive_meta=debug");
        assert!(init_tracing("archive_meta=debug").is_err());
    }
}
