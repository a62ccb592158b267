//! Capability negotiation against registry contents seen on real compositors.

use idle_blur_overlay::OverlayError;
use idle_blur_overlay::registry::{LAYER_SHELL, negotiate};

const SWAY_GLOBALS: &[(&str, u32)] = &[
    ("wl_shm", 1),
    ("wl_drm", 2),
    ("zwp_linux_dmabuf_v1", 4),
    ("wl_compositor", 6),
    ("wl_subcompositor", 1),
    ("wl_data_device_manager", 3),
    ("zwlr_layer_shell_v1", 4),
    ("xdg_wm_base", 5),
    ("wl_seat", 9),
    ("wl_output", 4),
];

const MUTTER_GLOBALS: &[(&str, u32)] = &[
    ("wl_compositor", 6),
    ("wl_shm", 1),
    ("wl_subcompositor", 1),
    ("xdg_wm_base", 6),
    ("wl_seat", 8),
    ("wl_output", 4),
];

#[test]
fn test_wlroots_registry_is_sufficient() {
    assert!(negotiate(SWAY_GLOBALS.iter().copied()).is_ok());
}

#[test]
fn test_registry_without_layer_shell_is_rejected() {
    match negotiate(MUTTER_GLOBALS.iter().copied()) {
        Err(OverlayError::MissingCapability { interface, detail }) => {
            assert_eq!(interface, LAYER_SHELL);
            assert_eq!(detail, "not advertised");
        }
        other => panic!("expected MissingCapability, got {:?}", other),
    }
}
