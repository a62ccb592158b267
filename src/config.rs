use tracing::debug;

/// Namespace compositor layer rules match on (e.g. `layerrule = blur, dotfiles-idle-blur`).
pub const DEFAULT_NAMESPACE: &str = "dotfiles-idle-blur";

/// Environment variable overriding [`DEFAULT_NAMESPACE`].
pub const NAMESPACE_ENV: &str = "IDLE_BLUR_OVERLAY_NAMESPACE";

/// Filter used when `RUST_LOG` is unset. Quiet unless something goes wrong.
pub const DEFAULT_LOG_FILTER: &str = "warn";

/// Runtime settings. There are no flags or files; everything comes from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayConfig {
    pub namespace: String,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }
}

impl OverlayConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let namespace = lookup(NAMESPACE_ENV)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());

        debug!("Layer surface namespace: {}", namespace);
        Self { namespace }
    }
}

/// Installs the global `tracing` subscriber. `RUST_LOG` takes precedence over the default.
pub fn setup_logging() {
    use tracing_subscriber::{EnvFilter, FmtSubscriber};

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();

    // A subscriber may already be installed when embedded in tests.
    let _ = tracing::subscriber::set_global_default(subscriber);
}
