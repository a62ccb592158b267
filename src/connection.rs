use tracing::{debug, info, warn};
use wayland_client::Connection;

use crate::error::{OverlayError, Result};

/// Owns the transport session with the compositor.
///
/// Every proxy created through this connection becomes inert once the session is
/// disconnected, so it must be the last thing released. Declare it before any other
/// protocol-owning local so drop order enforces that on error paths too.
pub struct Session {
    connection: Connection,
    disconnected: bool,
}

impl Session {
    /// Connects to the compositor named by the ambient environment
    /// (`WAYLAND_SOCKET`, or `WAYLAND_DISPLAY` under `XDG_RUNTIME_DIR`).
    pub fn connect() -> Result<Self> {
        let wayland_display =
            std::env::var("WAYLAND_DISPLAY").unwrap_or_else(|_| "not set".to_string());
        debug!("Wayland environment: WAYLAND_DISPLAY={}", wayland_display);

        let connection = Connection::connect_to_env().map_err(|e| {
            OverlayError::Connection(format!("{} (WAYLAND_DISPLAY={})", e, wayland_display))
        })?;

        info!("Connected to Wayland compositor");
        Ok(Self {
            connection,
            disconnected: false,
        })
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Flushes outstanding requests (typically the teardown destroys) and closes the
    /// session. Consumes the session so it cannot run twice.
    pub fn disconnect(mut self) {
        self.close();
    }

    fn close(&mut self) {
        if self.disconnected {
            return;
        }
        self.disconnected = true;

        if let Err(e) = self.connection.flush() {
            // The compositor may already be gone; nothing left to deliver to.
            warn!("Failed to flush final requests: {}", e);
        }
        info!("Disconnected from Wayland compositor");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}
