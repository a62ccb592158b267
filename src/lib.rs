//! A transparent, input-transparent, full-screen wlr-layer-shell overlay.
//!
//! The overlay draws nothing. It exists so compositor-side effects (idle blur, dimming)
//! have a stable surface on the overlay layer to attach to.

pub mod app;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod registry;
pub mod role;
pub mod shm;
pub mod teardown;
pub mod wayland_overlay;

pub use app::run_overlay;
pub use config::OverlayConfig;
pub use dispatch::StopReason;
pub use error::OverlayError;
