//! Demo host: a window standing in for a slippy map.
//!
//! Drag to pan, scroll to zoom around the cursor. `Space` toggles solid/gradient color,
//! `Up`/`Down` double or halve the particle count, `Escape` quits.

use std::sync::Arc;

use glam::{DVec2, Vec2};
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::{ElementState, KeyEvent, MouseButton, MouseScrollDelta, WindowEvent},
    event_loop::ActiveEventLoop,
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowId},
};

use windflow::error::AppError;
use windflow::projection::{inverse_mercator, mercator};
use windflow::{ColorMode, GeoBounds, GpuContext, RenderConfig, Rgb, TickStatus, VectorField, Viewport, WindLayer};

const SEA_BLUE: wgpu::Color = wgpu::Color {
    r: 0.02,
    g: 0.07,
    b: 0.15,
    a: 1.0,
};
const MIN_PARTICLES: u32 = 1 << 10;
const MAX_PARTICLES: u32 = 1 << 20;

/// A cyclone embedded in mid-latitude westerlies.
fn cyclone_field() -> Result<VectorField, windflow::FieldError> {
    let bounds = GeoBounds::new(-60.0, -45.0, 60.0, 60.0);
    let eye = Vec2::new(5.0, 20.0);
    VectorField::from_fn(240, 210, bounds, |lon, lat| {
        let d = Vec2::new(lon, lat) - eye;
        let r = d.length().max(0.1);
        // Solid-body core, decaying outside ~8 degrees
        let swirl = 14.0 * (r / 8.0).min(1.0) * (-(r / 20.0).powi(2)).exp();
        let tangent = Vec2::new(-d.y, d.x) / r;
        let westerly = Vec2::new(8.0 * (lat.to_radians() * 2.0).sin().max(0.0), 0.0);
        tangent * swirl + westerly
    })
}

/// Viewport of `half_width` degrees either side of `center`, matching the
/// window's aspect ratio in Mercator space.
fn initial_viewport(center: DVec2, half_width: f64, size: PhysicalSize<u32>) -> Result<Viewport, AppError> {
    let c = mercator(center);
    let half_x = half_width.to_radians();
    let half = DVec2::new(half_x, half_x * size.height as f64 / size.width as f64);
    Viewport::new(
        inverse_mercator(c + half),
        inverse_mercator(c - half),
        size.width,
        size.height,
        3.0,
    )
    .map_err(|e| AppError::Layer(e.into()))
}

struct DemoState {
    surface: wgpu::Surface<'static>,
    surface_config: wgpu::SurfaceConfiguration,
    gpu: GpuContext,
    layer: WindLayer,
    viewport: Viewport,
}

impl DemoState {
    fn new(window: Arc<Window>) -> Result<Self, AppError> {
        let size = window.inner_size();
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });
        let surface = instance.create_surface(window).map_err(windflow::GpuError::from)?;
        let gpu = GpuContext::for_surface(&instance, &surface)?;

        let surface_caps = surface.get_capabilities(&gpu.adapter);
        let format = surface_caps
            .formats
            .iter()
            .find(|f| !f.is_srgb())
            .or_else(|| surface_caps.formats.first())
            .copied()
            .ok_or(windflow::GpuError::NoAdapter)?;

        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: surface_caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&gpu.device, &surface_config);

        let viewport = initial_viewport(
            DVec2::new(0.0, 15.0),
            70.0,
            PhysicalSize::new(surface_config.width, surface_config.height),
        )?;
        let field = cyclone_field().map_err(|e| AppError::Layer(e.into()))?;
        let layer = WindLayer::attach(&gpu, format, field, RenderConfig::new(), viewport)?;

        Ok(Self {
            surface,
            surface_config,
            gpu,
            layer,
            viewport,
        })
    }

    fn resize(&mut self, size: PhysicalSize<u32>) {
        if size.width == 0 || size.height == 0 {
            return;
        }
        self.surface_config.width = size.width;
        self.surface_config.height = size.height;
        self.surface.configure(&self.gpu.device, &self.surface_config);
        self.settle(self.viewport.resized(size.width, size.height));
    }

    /// Forward a settled viewport to the layer.
    fn settle(&mut self, viewport: Viewport) {
        self.viewport = viewport;
        if let Err(e) = self.layer.on_viewport_change(viewport) {
            log::error!("Viewport update failed: {}", e);
        }
    }

    fn toggle_color(&mut self) {
        let color = match self.layer.config().color {
            ColorMode::Gradient(..) => ColorMode::Solid(Rgb::new(1.0, 1.0, 1.0)),
            ColorMode::Solid(_) => ColorMode::default(),
        };
        self.layer.set_color(color);
    }

    fn scale_particles(&mut self, up: bool) {
        let count = self.layer.config().particle_count;
        let next = if up { count.saturating_mul(2) } else { count / 2 };
        let next = next.clamp(MIN_PARTICLES, MAX_PARTICLES);
        if self.layer.set_particle_count(next).is_ok() {
            log::info!("Particle count: {}", next);
        }
    }

    fn render(&mut self) -> Result<TickStatus, wgpu::SurfaceError> {
        let frame = self.surface.get_current_texture()?;
        let view = frame.texture.create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self.gpu.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Demo Frame Encoder"),
        });
        {
            // Map background
            let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Background Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(SEA_BLUE),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
        }
        let status = self.layer.encode_frame(&mut encoder, &view);

        self.gpu.queue.submit(std::iter::once(encoder.finish()));
        frame.present();
        Ok(status)
    }
}

/// winit application driving the demo.
pub struct App {
    window: Option<Arc<Window>>,
    state: Option<DemoState>,
    error: Option<AppError>,
    dragging: bool,
    last_cursor: Option<(f64, f64)>,
    cursor: Option<(f64, f64)>,
}

impl App {
    pub fn new() -> Self {
        Self {
            window: None,
            state: None,
            error: None,
            dragging: false,
            last_cursor: None,
            cursor: None,
        }
    }

    /// The error that stopped the event loop, if any.
    pub fn into_result(self) -> Result<(), AppError> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<(), AppError> {
        let window_attrs = Window::default_attributes()
            .with_title("windflow")
            .with_inner_size(winit::dpi::LogicalSize::new(1280, 720));
        let window = Arc::new(event_loop.create_window(window_attrs)?);
        self.state = Some(DemoState::new(window.clone())?);
        window.request_redraw();
        self.window = Some(window);
        Ok(())
    }

    fn handle_key(&mut self, event_loop: &ActiveEventLoop, event: KeyEvent) {
        if event.state != ElementState::Pressed {
            return;
        }
        let Some(state) = &mut self.state else {
            return;
        };
        match event.physical_key {
            PhysicalKey::Code(KeyCode::Space) => state.toggle_color(),
            PhysicalKey::Code(KeyCode::ArrowUp) => state.scale_particles(true),
            PhysicalKey::Code(KeyCode::ArrowDown) => state.scale_particles(false),
            PhysicalKey::Code(KeyCode::Escape) => {
                state.layer.detach();
                event_loop.exit();
            }
            _ => {}
        }
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Err(e) = self.init(event_loop) {
            log::error!("Failed to start: {}", e);
            self.error = Some(e);
            event_loop.exit();
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                if let Some(state) = &mut self.state {
                    state.layer.detach();
                }
                event_loop.exit();
            }
            WindowEvent::Resized(physical_size) => {
                if let Some(state) = &mut self.state {
                    state.resize(physical_size);
                }
            }
            WindowEvent::KeyboardInput { event, .. } => self.handle_key(event_loop, event),
            WindowEvent::MouseInput { state: button_state, button, .. } => {
                if button == MouseButton::Left {
                    self.dragging = button_state == ElementState::Pressed;
                    if !self.dragging {
                        self.last_cursor = None;
                        if let Some(state) = &mut self.state {
                            state.settle(state.viewport);
                        }
                    }
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.cursor = Some((position.x, position.y));
                if self.dragging {
                    if let (Some((last_x, last_y)), Some(state)) = (self.last_cursor, &mut self.state) {
                        state.viewport = state.viewport.panned(position.x - last_x, position.y - last_y);
                        state.layer.on_viewport_moving(state.viewport);
                    }
                    self.last_cursor = Some((position.x, position.y));
                }
            }
            WindowEvent::CursorLeft { .. } => self.cursor = None,
            WindowEvent::MouseWheel { delta, .. } => {
                let scroll = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y as f64,
                    MouseScrollDelta::PixelDelta(pos) => pos.y * 0.02,
                };
                if let Some(state) = &mut self.state {
                    let factor = 1.15f64.powf(scroll);
                    // Zoom around the cursor like a slippy map
                    let zoomed = match self.cursor {
                        Some((x, y)) => state.viewport.zoomed_at(factor, x, y),
                        None => state.viewport.zoomed(factor),
                    };
                    state.settle(zoomed);
                }
            }
            WindowEvent::RedrawRequested => {
                let Some(state) = &mut self.state else {
                    return;
                };
                match state.render() {
                    Ok(TickStatus::Continue) => {
                        if let Some(window) = &self.window {
                            window.request_redraw();
                        }
                    }
                    Ok(TickStatus::Stopped) => {}
                    Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                        let size = PhysicalSize::new(state.surface_config.width, state.surface_config.height);
                        state.resize(size);
                        if let Some(window) = &self.window {
                            window.request_redraw();
                        }
                    }
                    Err(wgpu::SurfaceError::OutOfMemory) => {
                        log::error!("Surface out of memory");
                        event_loop.exit();
                    }
                    Err(e) => {
                        log::warn!("Render error: {:?}", e);
                        if let Some(window) = &self.window {
                            window.request_redraw();
                        }
                    }
                }
            }
            _ => {}
        }
    }
}
