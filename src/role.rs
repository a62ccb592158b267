//! Layer-surface role: its fixed configuration and the configure/closed state machine.

use tracing::{debug, info};
use wayland_protocols_wlr::layer_shell::v1::client::{
    zwlr_layer_shell_v1::Layer,
    zwlr_layer_surface_v1::{self, Anchor, KeyboardInteractivity, ZwlrLayerSurfaceV1},
};

use crate::error::{OverlayError, Result};

/// Role parameters, sent once before the first commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerConfig {
    pub layer: Layer,
    pub namespace: String,
    /// `(0, 0)` lets the anchors decide the size.
    pub size: (u32, u32),
    pub anchor: Anchor,
    /// `-1`: cover the whole output without pushing other surfaces aside.
    pub exclusive_zone: i32,
    pub keyboard_interactivity: KeyboardInteractivity,
}

impl LayerConfig {
    pub fn full_screen_overlay(namespace: impl Into<String>) -> Self {
        Self {
            layer: Layer::Overlay,
            namespace: namespace.into(),
            size: (0, 0),
            anchor: Anchor::Top | Anchor::Bottom | Anchor::Left | Anchor::Right,
            exclusive_zone: -1,
            keyboard_interactivity: KeyboardInteractivity::None,
        }
    }

    pub fn apply(&self, layer_surface: &ZwlrLayerSurfaceV1) {
        layer_surface.set_size(self.size.0, self.size.1);
        layer_surface.set_anchor(self.anchor);
        layer_surface.set_exclusive_zone(self.exclusive_zone);
        layer_surface.set_keyboard_interactivity(self.keyboard_interactivity);
        debug!(
            "Layer surface configured: layer={:?} anchor={:?} exclusive_zone={} keyboard={:?}",
            self.layer, self.anchor, self.exclusive_zone, self.keyboard_interactivity
        );
    }
}

/// Events the compositor sends to the role, decoded from the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerEvent {
    Configure { serial: u32, width: u32, height: u32 },
    Closed,
}

impl LayerEvent {
    /// Returns `None` for events this client does not know about.
    pub fn from_wire(event: zwlr_layer_surface_v1::Event) -> Option<Self> {
        match event {
            zwlr_layer_surface_v1::Event::Configure {
                serial,
                width,
                height,
            } => Some(Self::Configure {
                serial,
                width,
                height,
            }),
            zwlr_layer_surface_v1::Event::Closed => Some(Self::Closed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RolePhase {
    Unconfigured,
    Configured,
    Closed,
}

/// What the caller must do after feeding an event to [`RoleState::handle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleAction {
    /// Send `ack_configure` with exactly this serial.
    AckConfigure(u32),
    /// The compositor destroyed the role; shut down gracefully.
    Stop,
}

#[derive(Debug)]
pub struct RoleState {
    phase: RolePhase,
    configures: u64,
    last_serial: Option<u32>,
}

impl Default for RoleState {
    fn default() -> Self {
        Self::new()
    }
}

impl RoleState {
    pub fn new() -> Self {
        Self {
            phase: RolePhase::Unconfigured,
            configures: 0,
            last_serial: None,
        }
    }

    pub fn phase(&self) -> RolePhase {
        self.phase
    }

    pub fn configures_received(&self) -> u64 {
        self.configures
    }

    pub fn last_serial(&self) -> Option<u32> {
        self.last_serial
    }

    /// Single transition function. Every configure yields exactly one ack action carrying
    /// its own serial; `Closed` is terminal and any event after it is a violation.
    pub fn handle(&mut self, event: LayerEvent) -> Result<RoleAction> {
        match (self.phase, event) {
            (RolePhase::Closed, event) => Err(OverlayError::ProtocolViolation(format!(
                "layer surface received {:?} after closed",
                event
            ))),
            (
                phase,
                LayerEvent::Configure {
                    serial,
                    width,
                    height,
                },
            ) => {
                // The buffer is fixed at creation; proposed dimensions are informational.
                debug!("Configure serial={} size={}x{}", serial, width, height);
                if phase == RolePhase::Unconfigured {
                    info!("Layer surface configured");
                }
                self.phase = RolePhase::Configured;
                self.configures += 1;
                self.last_serial = Some(serial);
                Ok(RoleAction::AckConfigure(serial))
            }
            (_, LayerEvent::Closed) => {
                info!("Layer surface closed by compositor");
                self.phase = RolePhase::Closed;
                Ok(RoleAction::Stop)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_screen_overlay_config() {
        let config = LayerConfig::full_screen_overlay("dotfiles-idle-blur");
        assert_eq!(config.layer, Layer::Overlay);
        assert_eq!(config.size, (0, 0));
        assert!(config.anchor.contains(Anchor::Top));
        assert!(config.anchor.contains(Anchor::Bottom));
        assert!(config.anchor.contains(Anchor::Left));
        assert!(config.anchor.contains(Anchor::Right));
        assert_eq!(config.exclusive_zone, -1);
        assert_eq!(config.keyboard_interactivity, KeyboardInteractivity::None);
    }

    #[test]
    fn test_configure_acks_exact_serial() {
        let mut role = RoleState::new();
        assert_eq!(role.phase(), RolePhase::Unconfigured);

        let action = role
            .handle(LayerEvent::Configure {
                serial: 41,
                width: 2560,
                height: 1440,
            })
            .unwrap();

        assert_eq!(action, RoleAction::AckConfigure(41));
        assert_eq!(role.phase(), RolePhase::Configured);
        assert_eq!(role.last_serial(), Some(41));
    }

    #[test]
    fn test_one_ack_per_configure_in_order() {
        let mut role = RoleState::new();
        let serials = [7, 8, 12, 3];

        let acked: Vec<u32> = serials
            .iter()
            .map(|&serial| {
                match role.handle(LayerEvent::Configure {
                    serial,
                    width: 0,
                    height: 0,
                }) {
                    Ok(RoleAction::AckConfigure(s)) => s,
                    other => panic!("unexpected {:?}", other),
                }
            })
            .collect();

        assert_eq!(acked, serials);
        assert_eq!(role.configures_received(), 4);
        assert_eq!(role.last_serial(), Some(3));
    }

    #[test]
    fn test_closed_before_configure_stops() {
        let mut role = RoleState::new();
        assert_eq!(role.handle(LayerEvent::Closed).unwrap(), RoleAction::Stop);
        assert_eq!(role.phase(), RolePhase::Closed);
        assert_eq!(role.configures_received(), 0);
    }

    #[test]
    fn test_events_after_closed_are_violations() {
        let mut role = RoleState::new();
        role.handle(LayerEvent::Configure {
            serial: 1,
            width: 0,
            height: 0,
        })
        .unwrap();
        role.handle(LayerEvent::Closed).unwrap();

        let late = role.handle(LayerEvent::Configure {
            serial: 2,
            width: 0,
            height: 0,
        });
        assert!(matches!(late, Err(OverlayError::ProtocolViolation(_))));
        assert_eq!(role.configures_received(), 1);
        assert_eq!(role.last_serial(), Some(1));
        assert_eq!(role.phase(), RolePhase::Closed);
    }

    #[test]
    fn test_wire_event_decoding() {
        let event = LayerEvent::from_wire(zwlr_layer_surface_v1::Event::Configure {
            serial: 9,
            width: 1920,
            height: 1080,
        });
        assert_eq!(
            event,
            Some(LayerEvent::Configure {
                serial: 9,
                width: 1920,
                height: 1080
            })
        );
        assert_eq!(
            LayerEvent::from_wire(zwlr_layer_surface_v1::Event::Closed),
            Some(LayerEvent::Closed)
        );
    }
}
