//! Tracing subscriber setup

use tracing_subscriber::EnvFilter;

use crate::config::LogConfig;

/// Install a global fmt subscriber
///
/// `RUST_LOG` takes precedence over `config.level`. Returns false when a
/// global subscriber was already installed.
pub fn init_tracing(config: &LogConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(config.ansi)
        .with_target(true);

    let installed = if config.json {
        builder.json().try_init().is_ok()
    } else {
        builder.try_init().is_ok()
    };
    if installed {
        tracing::info!(json = config.json, level = %config.level, "Tracing initialized");
    }
    installed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_refused() {
        let config = LogConfig {
            level: "weft=debug".into(),
            ..LogConfig::default()
        };
        init_tracing(&config);
        assert!(!init_tracing(&config));
        assert!(!init_tracing(&LogConfig::default()));
    }
}
