use smithay_client_toolkit::compositor::CompositorState;
use tracing::{debug, info};
use wayland_client::{
    Connection, EventQueue, Proxy,
    globals::{BindError, GlobalList, registry_queue_init},
    protocol::wl_shm::WlShm,
};
use wayland_protocols_wlr::layer_shell::v1::client::zwlr_layer_shell_v1::ZwlrLayerShellV1;

use crate::error::{OverlayError, Result};
use crate::wayland_overlay::OverlayState;

pub const COMPOSITOR: &str = "wl_compositor";
pub const LAYER_SHELL: &str = "zwlr_layer_shell_v1";
pub const SHM: &str = "wl_shm";

/// A global this client cannot run without, and the oldest version it accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Requirement {
    pub interface: &'static str,
    pub min_version: u32,
}

/// `wl_compositor` v4 for `damage_buffer`; layer shell v4 for the
/// `keyboard_interactivity` enum and `destroy` on the shell.
pub const REQUIRED: [Requirement; 3] = [
    Requirement {
        interface: COMPOSITOR,
        min_version: 4,
    },
    Requirement {
        interface: LAYER_SHELL,
        min_version: 4,
    },
    Requirement {
        interface: SHM,
        min_version: 1,
    },
];

/// Checks an advertised `(interface, version)` list against [`REQUIRED`].
///
/// Unknown interfaces are ignored. If an interface is advertised more than once the
/// newest version counts. The first unmet requirement is reported.
pub fn negotiate<'a, I>(advertised: I) -> Result<()>
where
    I: IntoIterator<Item = (&'a str, u32)>,
{
    let mut best = [None::<u32>; REQUIRED.len()];
    for (interface, version) in advertised {
        if let Some(slot) = REQUIRED.iter().position(|req| req.interface == interface) {
            best[slot] = Some(best[slot].map_or(version, |seen| seen.max(version)));
        }
    }

    for (req, found) in REQUIRED.iter().zip(best) {
        match found {
            None => {
                return Err(OverlayError::MissingCapability {
                    interface: req.interface,
                    detail: "not advertised".to_string(),
                });
            }
            Some(version) if version < req.min_version => {
                return Err(OverlayError::MissingCapability {
                    interface: req.interface,
                    detail: format!(
                        "advertised v{}, need at least v{}",
                        version, req.min_version
                    ),
                });
            }
            Some(_) => {}
        }
    }

    Ok(())
}

/// The three bound globals the overlay needs.
pub struct Capabilities {
    pub compositor: CompositorState,
    pub layer_shell: ZwlrLayerShellV1,
    pub shm: WlShm,
}

/// Result of the single registry round-trip. `globals` is only kept long enough to
/// build the toolkit states, then dropped.
pub struct Discovery {
    pub globals: GlobalList,
    pub event_queue: EventQueue<OverlayState>,
    pub capabilities: Capabilities,
}

/// Performs one registry round-trip and binds the compositor, layer shell and shm.
/// Nothing is bound unless every requirement is met.
pub fn discover_and_bind(connection: &Connection) -> Result<Discovery> {
    let (globals, event_queue) = registry_queue_init::<OverlayState>(connection)
        .map_err(|e| OverlayError::ProtocolViolation(format!("registry round-trip failed: {}", e)))?;
    let qh = event_queue.handle();

    let snapshot = globals.contents().with_list(|list| {
        list.iter()
            .map(|g| (g.interface.clone(), g.version))
            .collect::<Vec<_>>()
    });
    debug!("Compositor advertised {} globals:", snapshot.len());
    for (interface, version) in &snapshot {
        debug!("  - {} v{}", interface, version);
    }

    negotiate(snapshot.iter().map(|(interface, version)| (interface.as_str(), *version)))?;

    let compositor =
        CompositorState::bind(&globals, &qh).map_err(|e| bind_failure(COMPOSITOR, e))?;
    let layer_shell = globals
        .bind::<ZwlrLayerShellV1, _, _>(&qh, 4..=4, ())
        .map_err(|e| bind_failure(LAYER_SHELL, e))?;
    let shm = globals
        .bind::<WlShm, _, _>(&qh, 1..=1, ())
        .map_err(|e| bind_failure(SHM, e))?;

    info!(
        "Bound {} v{}, {} v{}, {} v{}",
        COMPOSITOR,
        compositor.wl_compositor().version(),
        LAYER_SHELL,
        layer_shell.version(),
        SHM,
        shm.version()
    );

    Ok(Discovery {
        globals,
        event_queue,
        capabilities: Capabilities {
            compositor,
            layer_shell,
            shm,
        },
    })
}

fn bind_failure(interface: &'static str, error: BindError) -> OverlayError {
    OverlayError::MissingCapability {
        interface,
        detail: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn missing_interface(result: Result<()>) -> &'static str {
        match result {
            Err(OverlayError::MissingCapability { interface, .. }) => interface,
            other => panic!("expected MissingCapability, got {:?}", other),
        }
    }

    #[test]
    fn test_all_required_globals_present() {
        let advertised = [
            ("wl_seat", 7),
            (COMPOSITOR, 6),
            ("wl_output", 4),
            (LAYER_SHELL, 4),
            (SHM, 1),
        ];
        assert!(negotiate(advertised).is_ok());
    }

    #[test]
    fn test_each_missing_global_is_named() {
        for skipped in [COMPOSITOR, LAYER_SHELL, SHM] {
            let advertised = [(COMPOSITOR, 5), (LAYER_SHELL, 4), (SHM, 1)]
                .into_iter()
                .filter(|(interface, _)| *interface != skipped);
            assert_eq!(missing_interface(negotiate(advertised)), skipped);
        }
    }

    #[test]
    fn test_old_layer_shell_rejected() {
        let result = negotiate([(COMPOSITOR, 4), (LAYER_SHELL, 3), (SHM, 1)]);
        match result {
            Err(OverlayError::MissingCapability { interface, detail }) => {
                assert_eq!(interface, LAYER_SHELL);
                assert!(detail.contains("v3"));
                assert!(detail.contains("v4"));
            }
            other => panic!("expected MissingCapability, got {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_advertisement_uses_newest() {
        let advertised = [(COMPOSITOR, 2), (COMPOSITOR, 5), (LAYER_SHELL, 4), (SHM, 1)];
        assert!(negotiate(advertised).is_ok());
    }

    #[test]
    fn test_empty_registry() {
        assert_eq!(missing_interface(negotiate(Vec::<(&str, u32)>::new())), COMPOSITOR);
    }
}
