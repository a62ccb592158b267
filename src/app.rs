use std::sync::Arc;

use tracing::{debug, info, warn};
use wayland_client::protocol::wl_shm;

use crate::config::OverlayConfig;
use crate::connection::Session;
use crate::dispatch::{self, Lifecycle, LoopPhase, RunState, Signals, StopReason};
use crate::error::{OverlayError, Result};
use crate::registry::{Discovery, discover_and_bind};
use crate::role::{LayerConfig, RolePhase};
use crate::shm::{PixelLayout, TransparentBuffer, build_transparent_buffer};
use crate::teardown::ReleaseStack;
use crate::wayland_overlay::{OverlayState, create_overlay};

/// Brings the overlay up, keeps it alive until a signal or a `closed` event, and tears
/// everything down in reverse order: unmap, buffer, layer surface, surface, connection.
///
/// `Ok` means a graceful stop. Any `Err` is fatal; resources acquired so far have
/// already been released when it is returned.
pub async fn run_overlay(config: OverlayConfig) -> Result<StopReason> {
    let mut signals = Signals::install()?;
    let run = Arc::new(RunState::new());
    let mut lifecycle = Lifecycle::new();

    // Declared before everything that owns protocol objects: dropped last.
    let session = Session::connect()?;

    let Discovery {
        globals,
        mut event_queue,
        capabilities,
    } = discover_and_bind(session.connection())?;
    let qh = event_queue.handle();
    let mut state = OverlayState::new(&globals, &qh, run.clone());
    drop(globals);

    let mut releases = ReleaseStack::new();
    let layer_config = LayerConfig::full_screen_overlay(config.namespace);
    let overlay = create_overlay(&capabilities, &qh, &layer_config, &mut releases)?;

    // Configure/ack handshake before any buffer is attached.
    overlay.commit_role();
    dispatch::roundtrip(&mut event_queue, &mut state)?;

    if run.is_running() {
        if state.role().phase() != RolePhase::Configured {
            return Err(OverlayError::ProtocolViolation(
                "no configure received for the layer surface after its initial commit"
                    .to_string(),
            ));
        }
        if !state.shm_formats().contains(&wl_shm::Format::Argb8888) {
            warn!("Compositor did not announce argb8888; attaching it anyway");
        }

        let transparent = build_transparent_buffer(&capabilities.shm, &qh, PixelLayout::overlay()?)?;
        releases.push("wl_buffer", {
            let buffer = transparent.buffer.clone();
            move || buffer.destroy()
        });
        overlay.attach(&transparent);
        let TransparentBuffer { mapping, .. } = transparent;
        releases.push("shm mapping", move || drop(mapping));

        dispatch::roundtrip(&mut event_queue, &mut state)?;
    }

    let reason = dispatch::run(
        session.connection(),
        &mut event_queue,
        &mut state,
        &mut signals,
        &mut lifecycle,
    )
    .await?;

    info!(
        "Shutting down ({}); acknowledged {} of {} configure events",
        reason,
        state.acks_sent(),
        state.role().configures_received()
    );
    debug!("Release order: {:?}", releases.pending());
    releases.release();
    drop(state);
    drop(event_queue);
    session.disconnect();
    lifecycle.advance(LoopPhase::Terminated);

    Ok(reason)
}
