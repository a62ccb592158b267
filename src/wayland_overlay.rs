use std::sync::Arc;

use smithay_client_toolkit::{
    compositor::CompositorHandler,
    delegate_compositor, delegate_output, delegate_registry,
    output::{OutputHandler, OutputState},
    registry::{ProvidesRegistryState, RegistryState},
    registry_handlers,
};
use tracing::{debug, info, warn};
use wayland_client::{
    Connection, Dispatch, Proxy, QueueHandle, WEnum,
    globals::GlobalList,
    protocol::{wl_buffer, wl_output, wl_region, wl_shm, wl_shm_pool, wl_surface},
};
use wayland_protocols_wlr::layer_shell::v1::client::{
    zwlr_layer_shell_v1::ZwlrLayerShellV1, zwlr_layer_surface_v1::ZwlrLayerSurfaceV1,
};

use crate::dispatch::{RunState, StopReason};
use crate::error::{OverlayError, Result};
use crate::registry::Capabilities;
use crate::role::{LayerConfig, LayerEvent, RoleAction, RoleState};
use crate::shm::TransparentBuffer;
use crate::teardown::ReleaseStack;

/// Client-side state every protocol event is dispatched into.
pub struct OverlayState {
    registry_state: RegistryState,
    output_state: OutputState,
    run: Arc<RunState>,
    role: RoleState,
    acks_sent: u64,
    shm_formats: Vec<wl_shm::Format>,
    fault: Option<OverlayError>,
}

impl OverlayState {
    pub fn new(globals: &GlobalList, qh: &QueueHandle<Self>, run: Arc<RunState>) -> Self {
        Self {
            registry_state: RegistryState::new(globals),
            output_state: OutputState::new(globals, qh),
            run,
            role: RoleState::new(),
            acks_sent: 0,
            shm_formats: Vec::new(),
            fault: None,
        }
    }

    pub fn role(&self) -> &RoleState {
        &self.role
    }

    /// Number of `ack_configure` requests actually sent.
    pub fn acks_sent(&self) -> u64 {
        self.acks_sent
    }

    pub fn run_state(&self) -> &RunState {
        &self.run
    }

    pub fn shm_formats(&self) -> &[wl_shm::Format] {
        &self.shm_formats
    }

    /// Returns the first error raised from inside an event handler, if any.
    pub fn take_fault(&mut self) -> Option<OverlayError> {
        self.fault.take()
    }

    fn fail(&mut self, error: OverlayError) {
        warn!("{}", error);
        if self.fault.is_none() {
            self.fault = Some(error);
        }
    }

    fn handle_layer_event(&mut self, layer_surface: &ZwlrLayerSurfaceV1, event: LayerEvent) {
        match self.role.handle(event) {
            Ok(RoleAction::AckConfigure(serial)) => {
                layer_surface.ack_configure(serial);
                self.acks_sent += 1;
            }
            Ok(RoleAction::Stop) => {
                self.run.request_stop(StopReason::Closed);
            }
            Err(e) => self.fail(e),
        }
    }
}

/// The overlay's base surface and its layer role.
pub struct OverlaySurface {
    pub surface: wl_surface::WlSurface,
    pub layer_surface: ZwlrLayerSurfaceV1,
}

impl OverlaySurface {
    /// First commit: role state only, no buffer. The compositor answers with a configure.
    pub fn commit_role(&self) {
        self.surface.commit();
    }

    pub fn attach(&self, buffer: &TransparentBuffer) {
        self.surface.attach(Some(&buffer.buffer), 0, 0);
        self.surface
            .damage_buffer(0, 0, buffer.layout.width as i32, buffer.layout.height as i32);
        self.surface.commit();
        info!("Transparent buffer attached and committed");
    }
}

/// Creates the base surface and gives it the overlay layer role with `config`.
///
/// Every object created here is registered on `releases`, so a failure part-way
/// leaves nothing behind once the stack is dropped.
pub fn create_overlay(
    capabilities: &Capabilities,
    qh: &QueueHandle<OverlayState>,
    config: &LayerConfig,
    releases: &mut ReleaseStack,
) -> Result<OverlaySurface> {
    let surface = capabilities.compositor.create_surface(qh);
    if !surface.is_alive() {
        return Err(OverlayError::Surface(
            "compositor did not create a surface".to_string(),
        ));
    }
    releases.push("wl_surface", {
        let surface = surface.clone();
        move || surface.destroy()
    });

    // No output: the compositor decides where (and on how many outputs) it appears.
    let layer_surface = capabilities.layer_shell.get_layer_surface(
        &surface,
        None,
        config.layer,
        config.namespace.clone(),
        qh,
        (),
    );
    if !layer_surface.is_alive() {
        return Err(OverlayError::Surface(
            "layer shell did not create a layer surface".to_string(),
        ));
    }
    releases.push("zwlr_layer_surface_v1", {
        let layer_surface = layer_surface.clone();
        move || layer_surface.destroy()
    });

    config.apply(&layer_surface);

    // Empty input region: pointer events fall through to whatever is underneath.
    let empty_region = capabilities.compositor.wl_compositor().create_region(qh, ());
    surface.set_input_region(Some(&empty_region));
    empty_region.destroy();

    info!(
        "Created overlay layer surface (namespace {:?})",
        config.namespace
    );
    Ok(OverlaySurface {
        surface,
        layer_surface,
    })
}

impl CompositorHandler for OverlayState {
    fn scale_factor_changed(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &wl_surface::WlSurface,
        _new_factor: i32,
    ) {
    }

    fn transform_changed(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &wl_surface::WlSurface,
        _new_transform: wl_output::Transform,
    ) {
    }

    fn frame(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &wl_surface::WlSurface,
        _time: u32,
    ) {
    }

    fn surface_enter(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &wl_surface::WlSurface,
        output: &wl_output::WlOutput,
    ) {
        debug!("Overlay entered output {}", output.id());
    }

    fn surface_leave(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &wl_surface::WlSurface,
        output: &wl_output::WlOutput,
    ) {
        debug!("Overlay left output {}", output.id());
    }
}

impl OutputHandler for OverlayState {
    fn output_state(&mut self) -> &mut OutputState {
        &mut self.output_state
    }

    fn new_output(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        output: wl_output::WlOutput,
    ) {
        match self.output_state.info(&output) {
            Some(info) => info!(
                "Output {} available ({:?})",
                info.name.as_deref().unwrap_or("unnamed"),
                info.logical_size
            ),
            None => info!("Output {} available", output.id()),
        }
    }

    fn update_output(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        output: wl_output::WlOutput,
    ) {
        debug!("Output {} updated", output.id());
    }

    fn output_destroyed(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        output: wl_output::WlOutput,
    ) {
        info!("Output {} removed", output.id());
    }
}

impl ProvidesRegistryState for OverlayState {
    fn registry(&mut self) -> &mut RegistryState {
        &mut self.registry_state
    }

    registry_handlers![OutputState];
}

impl Dispatch<ZwlrLayerShellV1, ()> for OverlayState {
    fn event(
        _state: &mut Self,
        _proxy: &ZwlrLayerShellV1,
        _event: <ZwlrLayerShellV1 as Proxy>::Event,
        _data: &(),
        _conn: &Connection,
        _qhandle: &QueueHandle<Self>,
    ) {
        // The shell global has no events.
    }
}

impl Dispatch<ZwlrLayerSurfaceV1, ()> for OverlayState {
    fn event(
        state: &mut Self,
        proxy: &ZwlrLayerSurfaceV1,
        event: <ZwlrLayerSurfaceV1 as Proxy>::Event,
        _data: &(),
        _conn: &Connection,
        _qhandle: &QueueHandle<Self>,
    ) {
        if let Some(event) = LayerEvent::from_wire(event) {
            state.handle_layer_event(proxy, event);
        }
    }
}

impl Dispatch<wl_shm::WlShm, ()> for OverlayState {
    fn event(
        state: &mut Self,
        _proxy: &wl_shm::WlShm,
        event: wl_shm::Event,
        _data: &(),
        _conn: &Connection,
        _qhandle: &QueueHandle<Self>,
    ) {
        if let wl_shm::Event::Format {
            format: WEnum::Value(format),
        } = event
        {
            debug!("wl_shm supports {:?}", format);
            state.shm_formats.push(format);
        }
    }
}

impl Dispatch<wl_shm_pool::WlShmPool, ()> for OverlayState {
    fn event(
        _state: &mut Self,
        _proxy: &wl_shm_pool::WlShmPool,
        _event: wl_shm_pool::Event,
        _data: &(),
        _conn: &Connection,
        _qhandle: &QueueHandle<Self>,
    ) {
    }
}

impl Dispatch<wl_buffer::WlBuffer, ()> for OverlayState {
    fn event(
        _state: &mut Self,
        _proxy: &wl_buffer::WlBuffer,
        _event: wl_buffer::Event,
        _data: &(),
        _conn: &Connection,
        _qhandle: &QueueHandle<Self>,
    ) {
        // Release is irrelevant: the content never changes, so the buffer stays attached.
    }
}

impl Dispatch<wl_region::WlRegion, ()> for OverlayState {
    fn event(
        _state: &mut Self,
        _proxy: &wl_region::WlRegion,
        _event: wl_region::Event,
        _data: &(),
        _conn: &Connection,
        _qhandle: &QueueHandle<Self>,
    ) {
    }
}

delegate_compositor!(OverlayState);
delegate_output!(OverlayState);
delegate_registry!(OverlayState);
