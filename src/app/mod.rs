use crate::assembly::{SurfaceKind, SyncOutcome, VatAssembly};
use crate::camera::OrbitRig;
use crate::config::{VatConfig, VatConfigOverrides, DEFAULT_CONFIG_PATH};
use crate::frame_clock::FrameClock;
use crate::frame_compute::FrameComputeSeed;
use crate::geometry::VatGeometry;
use crate::instance_state::InstanceState;
use crate::logging;
use crate::renderer::{
    state_bind_group_layout, FrameBindings, FrameUniform, GpuFrameCompute, GpuSurfaceFactory, PlanePass,
    VatPass, WindowSurface, CLEAR_COLOR,
};
use crate::scene::{tick_params, SceneAssets, ScenePlan};
use crate::time::Time;
use crate::trigger::{hot_spot_channel, HotSpotReader, InteractivePlane, PointerTracker};

mod config_watch;

use config_watch::ConfigWatcher;

use anyhow::{Context, Result};
use glam::{Vec2, Vec3};
use std::path::PathBuf;
use std::sync::Arc;
use winit::application::ApplicationHandler;
use winit::event::{ElementState, KeyEvent, MouseButton, MouseScrollDelta, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::keyboard::{Key, NamedKey};

const FOV_Y_RADIANS: f32 = 0.8;
const ORBIT_RADIANS_PER_PIXEL: f32 = 0.005;
const PLANE_SEGMENTS: u32 = 64;
const PIXELS_PER_SCROLL_LINE: f32 = 40.0;

pub async fn run() -> Result<()> {
    run_with_overrides(VatConfigOverrides::default()).await
}

pub async fn run_with_overrides(overrides: VatConfigOverrides) -> Result<()> {
    let config_path = overrides.config_path.clone().unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let loaded = VatConfig::load(&config_path);
    let mut config = match &loaded {
        Ok(config) => config.clone(),
        Err(_) => VatConfig::default(),
    };
    logging::init(&config.logging);
    if let Err(err) = loaded {
        log::warn!(target: logging::APP, "{err:?}. Using built-in defaults.");
    }
    config.apply_overrides(&overrides);

    let event_loop = EventLoop::new().context("Failed to create winit event loop")?;
    let mut app = App::new(config, config_path, overrides)?;
    event_loop.run_app(&mut app).context("Event loop execution failed")?;
    Ok(())
}

/// GPU side of the scene. Built once the window and device exist.
struct GpuScene {
    frame: FrameBindings,
    state_bgl: Arc<wgpu::BindGroupLayout>,
    assembly: VatAssembly<GpuSurfaceFactory>,
    compute: GpuFrameCompute,
    compute_seed: FrameComputeSeed,
    plane: PlanePass,
    plane_size: f32,
}

impl GpuScene {
    fn new(window: &WindowSurface, plan: &ScenePlan, config: &VatConfig) -> Result<Self> {
        let device = window.device()?;
        let queue = window.queue()?;
        let format = window.surface_format()?;
        let frame = FrameBindings::new(device);
        let state_bgl = state_bind_group_layout(device);
        let factory = GpuSurfaceFactory::new(device, queue, format, frame.layout().clone(), state_bgl.clone());
        let mut assembly = VatAssembly::new(factory);
        let outcome = assembly.sync(&plan.descriptor, &plan.params)?;
        log::info!(target: logging::ASSEMBLY, "initial surface {outcome:?}");
        let compute = GpuFrameCompute::new(device, &state_bgl, &plan.seed);
        let plane_size = config.instancing.plane_size;
        let plane = PlanePass::new(device, format, frame.layout(), &plane_geometry(plane_size));
        Ok(Self { frame, state_bgl, assembly, compute, compute_seed: plan.seed.clone(), plane, plane_size })
    }

    /// Syncs the surface and rebuilds the compute or plane only when their
    /// inputs moved.
    fn apply(&mut self, window: &WindowSurface, plan: &ScenePlan, config: &VatConfig) -> Result<SyncOutcome> {
        let outcome = self.assembly.sync(&plan.descriptor, &plan.params)?;
        let device = window.device()?;
        if plan.seed != self.compute_seed {
            self.compute.destroy();
            self.compute = GpuFrameCompute::new(device, &self.state_bgl, &plan.seed);
            self.compute_seed = plan.seed.clone();
            log::info!(target: logging::COMPUTE, "frame compute rebuilt for {} instances", plan.seed.count());
        }
        let plane_size = config.instancing.plane_size;
        if plane_size != self.plane_size {
            let format = window.surface_format()?;
            self.plane = PlanePass::new(device, format, self.frame.layout(), &plane_geometry(plane_size));
            self.plane_size = plane_size;
        }
        Ok(outcome)
    }
}

impl Drop for GpuScene {
    fn drop(&mut self) {
        self.compute.destroy();
    }
}

fn plane_geometry(size: f32) -> VatGeometry {
    VatGeometry::plane(size, size, PLANE_SEGMENTS)
}

fn pointer_for(size: f32) -> (PointerTracker, HotSpotReader) {
    let (writer, reader) = hot_spot_channel();
    (PointerTracker::new(writer, Box::new(InteractivePlane::new(size, size))), reader)
}

fn clock_for(config: &VatConfig) -> FrameClock {
    let mut clock =
        FrameClock::new(config.playback.mode(), config.playback.speed).with_headroom(config.playback.headroom_frames);
    clock.set_paused(config.playback.paused);
    clock
}

fn rig_for(kind: SurfaceKind, plane_size: f32) -> OrbitRig {
    match kind {
        SurfaceKind::Single => OrbitRig::new(Vec3::new(0.0, 0.5, 0.0), 3.0, 0.6, 0.3),
        SurfaceKind::Instanced { .. } => OrbitRig::new(Vec3::ZERO, plane_size.max(0.5) * 2.5, 0.6, 0.6),
    }
}

pub struct App {
    config_path: PathBuf,
    overrides: VatConfigOverrides,
    config: VatConfig,
    plan: ScenePlan,
    window: WindowSurface,
    gpu: Option<GpuScene>,
    time: Time,
    clock: FrameClock,
    pointer: PointerTracker,
    hot_spot: HotSpotReader,
    rig: OrbitRig,
    cursor: Option<Vec2>,
    orbiting: bool,
    watcher: Option<ConfigWatcher>,
    should_close: bool,
}

impl App {
    pub fn new(config: VatConfig, config_path: PathBuf, overrides: VatConfigOverrides) -> Result<Self> {
        let assets = SceneAssets::load(&config)?;
        let plan = ScenePlan::new(&config, &assets)?;
        let (pointer, hot_spot) = pointer_for(config.instancing.plane_size);
        let rig = rig_for(plan.descriptor.kind, config.instancing.plane_size);
        let watcher = match ConfigWatcher::new() {
            Ok(watcher) => Some(watcher),
            Err(err) => {
                log::warn!(target: logging::APP, "hot reload disabled: {err:?}");
                None
            }
        };
        let mut app = Self {
            config_path,
            overrides,
            window: WindowSurface::new(&config.window),
            clock: clock_for(&config),
            config,
            plan,
            gpu: None,
            time: Time::new(),
            pointer,
            hot_spot,
            rig,
            cursor: None,
            orbiting: false,
            watcher,
            should_close: false,
        };
        app.watch_sources();
        Ok(app)
    }

    fn watch_sources(&mut self) {
        let Some(watcher) = self.watcher.as_mut() else {
            return;
        };
        let mut paths = vec![self.config_path.clone()];
        paths.extend(SceneAssets::watched_paths(&self.config));
        for path in paths {
            if watcher.is_watched(&path) {
                continue;
            }
            if let Err(err) = watcher.watch_file(&path) {
                log::warn!(target: logging::APP, "not watching {}: {err:?}", path.display());
            }
        }
    }

    /// Reloads config and assets. On failure the running scene is kept.
    fn reload(&mut self, changed: &[PathBuf]) {
        for path in changed {
            log::info!(target: logging::APP, "changed: {}", path.display());
        }
        if let Err(err) = self.try_reload() {
            log::error!(target: logging::APP, "reload failed, keeping previous scene: {err:?}");
        }
        self.watch_sources();
    }

    fn try_reload(&mut self) -> Result<()> {
        let mut config = VatConfig::load(&self.config_path)?;
        config.apply_overrides(&self.overrides);
        let assets = SceneAssets::load(&config)?;
        let plan = ScenePlan::new(&config, &assets)?;
        if let Some(gpu) = self.gpu.as_mut() {
            let outcome = gpu.apply(&self.window, &plan, &config)?;
            log::info!(target: logging::ASSEMBLY, "reload applied: {outcome:?}");
        }

        if config.playback.headroom_frames != self.config.playback.headroom_frames {
            self.clock = clock_for(&config);
        } else {
            self.clock.set_mode(config.playback.mode());
            self.clock.set_speed(config.playback.speed);
            self.clock.set_paused(config.playback.paused);
        }
        if config.instancing.plane_size != self.config.instancing.plane_size {
            let (pointer, hot_spot) = pointer_for(config.instancing.plane_size);
            self.pointer = pointer;
            self.hot_spot = hot_spot;
        }
        self.config = config;
        self.plan = plan;
        Ok(())
    }

    fn toggle_pause(&mut self) {
        self.config.playback.paused = !self.config.playback.paused;
        self.clock.set_paused(self.config.playback.paused);
        log::info!(target: logging::APP, "playback {}", if self.config.playback.paused { "paused" } else { "resumed" });
    }

    fn render(&mut self) -> Result<()> {
        let Some(gpu) = self.gpu.as_mut() else {
            return Ok(());
        };
        let frame = match self.window.acquire_surface_frame() {
            Ok(frame) => frame,
            Err(err) => {
                log::warn!(target: logging::GPU, "skipping frame: {err:?}");
                return Ok(());
            }
        };
        let device = self.window.device()?;
        let queue = self.window.queue()?;
        let depth_view = self.window.depth_view()?;
        let viewport = self.window.size();

        let camera = self.rig.camera(FOV_Y_RADIANS);
        gpu.frame.write(queue, &FrameUniform::new(&camera, viewport, self.time.elapsed_seconds()));
        gpu.plane.write_highlight(queue, &self.config.highlight.uniform(self.hot_spot.get()));

        let mut encoder =
            device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("VAT Frame Encoder") });
        if !self.config.playback.paused {
            let params = tick_params(&self.config, self.time.delta_seconds(), self.hot_spot.get());
            gpu.compute.encode_tick(&mut encoder, queue, &params);
        }

        if let Some(surface) = gpu.assembly.surface() {
            if surface.kind() == SurfaceKind::Single {
                let progress = self.clock.progress(self.plan.descriptor.atlas.meta());
                surface.write_single_state(
                    queue,
                    InstanceState { frame: progress.value(), animated: 1.0, reserved: 0.0, cycle: 0.0 },
                );
            }
        }

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("VAT Depth Prepass"),
                color_attachments: &[],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: depth_view,
                    depth_ops: Some(wgpu::Operations { load: wgpu::LoadOp::Clear(1.0), store: wgpu::StoreOp::Store }),
                    stencil_ops: None,
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            if let Some(surface) = gpu.assembly.surface() {
                surface.draw(VatPass::Depth, &mut pass, gpu.frame.bind_group(), gpu.compute.sample_bind_group());
            }
        }
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("VAT Main Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: frame.view(),
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations { load: wgpu::LoadOp::Clear(CLEAR_COLOR), store: wgpu::StoreOp::Store },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: depth_view,
                    depth_ops: Some(wgpu::Operations { load: wgpu::LoadOp::Load, store: wgpu::StoreOp::Store }),
                    stencil_ops: None,
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            gpu.plane.draw(&mut pass, gpu.frame.bind_group());
            if let Some(surface) = gpu.assembly.surface() {
                surface.draw(VatPass::Shading, &mut pass, gpu.frame.bind_group(), gpu.compute.sample_bind_group());
            }
        }
        queue.submit(Some(encoder.finish()));
        frame.present();
        Ok(())
    }

    fn pointer_moved(&mut self, position: Vec2) {
        if self.orbiting {
            if let Some(previous) = self.cursor {
                self.rig.drag(position - previous, ORBIT_RADIANS_PER_PIXEL);
            }
        } else {
            let camera = self.rig.camera(FOV_Y_RADIANS);
            self.pointer.pointer_moved(&camera, position, self.window.size());
        }
        self.cursor = Some(position);
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        match self.window.ensure_window(event_loop) {
            Ok(false) => return,
            Ok(true) => {}
            Err(err) => {
                log::error!(target: logging::GPU, "Renderer initialization error: {err:?}");
                self.should_close = true;
                return;
            }
        }
        match GpuScene::new(&self.window, &self.plan, &self.config) {
            Ok(gpu) => self.gpu = Some(gpu),
            Err(err) => {
                log::error!(target: logging::GPU, "Failed to build the VAT scene: {err:?}");
                self.should_close = true;
            }
        }
    }

    fn window_event(&mut self, _el: &ActiveEventLoop, _id: winit::window::WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => self.should_close = true,
            WindowEvent::Resized(size) => self.window.resize(size),
            WindowEvent::CursorMoved { position, .. } => {
                self.pointer_moved(Vec2::new(position.x as f32, position.y as f32));
            }
            WindowEvent::CursorLeft { .. } => {
                self.cursor = None;
                self.pointer.pointer_left();
            }
            WindowEvent::MouseInput { state, button: MouseButton::Right, .. } => {
                self.orbiting = state == ElementState::Pressed;
                if self.orbiting {
                    self.pointer.pointer_left();
                }
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let steps = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y,
                    MouseScrollDelta::PixelDelta(pos) => pos.y as f32 / PIXELS_PER_SCROLL_LINE,
                };
                self.rig.zoom(steps);
            }
            WindowEvent::KeyboardInput {
                event: KeyEvent { logical_key, state: ElementState::Pressed, repeat: false, .. },
                ..
            } => match logical_key {
                Key::Named(NamedKey::Escape) => self.should_close = true,
                Key::Named(NamedKey::Space) => self.toggle_pause(),
                Key::Character(c) if c.eq_ignore_ascii_case("r") => {
                    self.clock.reset();
                    log::info!(target: logging::APP, "playback restarted");
                }
                _ => {}
            },
            WindowEvent::RedrawRequested => {
                if let Err(err) = self.render() {
                    log::error!(target: logging::GPU, "render failed: {err:?}");
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.should_close {
            event_loop.exit();
            return;
        }
        self.time.tick();
        self.clock.advance(self.time.delta_seconds());

        let changed = self.watcher.as_mut().map(ConfigWatcher::drain_changes).unwrap_or_default();
        if !changed.is_empty() {
            self.reload(&changed);
        }
        self.window.request_redraw();
    }
}
