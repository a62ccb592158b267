use thiserror::Error;

/// Every way the overlay can fail. All of them are terminal: the process releases
/// what it already holds and exits non-zero.
#[derive(Debug, Error)]
pub enum OverlayError {
    #[error("cannot reach the Wayland compositor: {0}")]
    Connection(String),

    #[error("required global `{interface}` unavailable: {detail}")]
    MissingCapability {
        interface: &'static str,
        detail: String,
    },

    #[error("surface setup failed: {0}")]
    Surface(String),

    #[error("shared memory allocation failed: {context}")]
    Allocation {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("cannot install signal handlers: {0}")]
    Signals(#[source] std::io::Error),
}

impl OverlayError {
    /// Wraps the current `errno` as an allocation failure.
    pub(crate) fn last_os(context: &'static str) -> Self {
        Self::Allocation {
            context,
            source: std::io::Error::last_os_error(),
        }
    }
}

pub type Result<T, E = OverlayError> = std::result::Result<T, E>;
