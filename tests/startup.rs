//! Startup against an environment with no compositor listening.

use idle_blur_overlay::{OverlayConfig, OverlayError, run_overlay};

#[tokio::test]
async fn test_missing_compositor_fails_with_connection_error() {
    let runtime_dir = tempfile::tempdir().unwrap();
    // Only test in this binary, so nothing else reads the environment concurrently.
    unsafe {
        std::env::remove_var("WAYLAND_SOCKET");
        std::env::set_var("XDG_RUNTIME_DIR", runtime_dir.path());
        std::env::set_var("WAYLAND_DISPLAY", "wayland-idle-blur-absent");
    }

    let result = run_overlay(OverlayConfig::default()).await;

    match result {
        Err(OverlayError::Connection(message)) => {
            assert!(message.contains("wayland-idle-blur-absent"));
        }
        other => panic!("expected a connection error, got {:?}", other),
    }
}
