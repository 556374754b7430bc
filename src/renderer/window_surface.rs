use crate::config::WindowConfig;
use crate::logging;
use anyhow::{anyhow, bail, Context, Result};
use std::sync::Arc;
use winit::dpi::PhysicalSize;
use winit::event_loop::ActiveEventLoop;
use winit::window::{Fullscreen, Window};

use super::DEPTH_FORMAT;

/// Storage buffers bound by the frame compute kernel.
const COMPUTE_STORAGE_BUFFERS: u32 = 4;

pub struct SurfaceFrame {
    view: wgpu::TextureView,
    surface: wgpu::SurfaceTexture,
}

impl SurfaceFrame {
    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub fn present(self) {
        self.surface.present();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SurfaceErrorAction {
    Reconfigure,
    Retry,
    OutOfMemory,
    Unknown,
}

/// Window, device and swapchain. Created lazily on the first `resumed`.
pub struct WindowSurface {
    window: Option<Arc<Window>>,
    surface: Option<wgpu::Surface<'static>>,
    device: Option<wgpu::Device>,
    queue: Option<wgpu::Queue>,
    config: Option<wgpu::SurfaceConfiguration>,
    depth_view: Option<wgpu::TextureView>,
    size: PhysicalSize<u32>,
    title: String,
    vsync: bool,
    fullscreen: bool,
    reconfigure_count: usize,
}

impl WindowSurface {
    pub fn new(window_cfg: &WindowConfig) -> Self {
        Self {
            window: None,
            surface: None,
            device: None,
            queue: None,
            config: None,
            depth_view: None,
            size: PhysicalSize::new(window_cfg.width.max(1), window_cfg.height.max(1)),
            title: window_cfg.title.clone(),
            vsync: window_cfg.vsync,
            fullscreen: window_cfg.fullscreen,
            reconfigure_count: 0,
        }
    }

    /// Returns `true` when the window was created by this call.
    pub fn ensure_window(&mut self, event_loop: &ActiveEventLoop) -> Result<bool> {
        if self.window.is_some() {
            return Ok(false);
        }
        let mut attrs = Window::default_attributes().with_title(self.title.clone()).with_inner_size(self.size);
        if self.fullscreen {
            attrs = attrs.with_fullscreen(Some(Fullscreen::Borderless(None)));
        }
        let window = Arc::new(event_loop.create_window(attrs).context("Failed to create window")?);
        pollster::block_on(self.init_wgpu(&window))?;
        self.window = Some(window);
        Ok(true)
    }

    pub fn device(&self) -> Result<&wgpu::Device> {
        self.device.as_ref().context("GPU device not initialized")
    }

    pub fn queue(&self) -> Result<&wgpu::Queue> {
        self.queue.as_ref().context("GPU queue not initialized")
    }

    pub fn depth_view(&self) -> Result<&wgpu::TextureView> {
        self.depth_view.as_ref().context("Depth texture missing")
    }

    pub fn surface_format(&self) -> Result<wgpu::TextureFormat> {
        Ok(self.config.as_ref().context("Surface configuration missing")?.format)
    }

    pub fn size(&self) -> PhysicalSize<u32> {
        self.size
    }

    pub fn window(&self) -> Option<&Window> {
        self.window.as_deref()
    }

    pub fn request_redraw(&self) {
        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }

    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        self.size = new_size;
        self.reconfigure_count = self.reconfigure_count.saturating_add(1);
        if new_size.width == 0 || new_size.height == 0 {
            return;
        }
        if let Some(config) = self.config.as_mut() {
            config.width = new_size.width;
            config.height = new_size.height;
            if let Err(err) = self.configure_surface() {
                log::error!(target: logging::GPU, "surface resize failed: {err:?}");
            }
        }
        if self.device.is_some() {
            if let Err(err) = self.recreate_depth_texture() {
                log::error!(target: logging::GPU, "depth texture resize failed: {err:?}");
            }
        }
    }

    pub fn acquire_surface_frame(&mut self) -> Result<SurfaceFrame> {
        let surface = self.surface.as_ref().ok_or_else(|| anyhow!("Surface not initialized"))?;
        match surface.get_current_texture() {
            Ok(frame) => {
                let view = frame.texture.create_view(&wgpu::TextureViewDescriptor::default());
                Ok(SurfaceFrame { view, surface: frame })
            }
            Err(err) => Err(self.handle_surface_error(&err)),
        }
    }

    fn handle_surface_error(&mut self, error: &wgpu::SurfaceError) -> anyhow::Error {
        match Self::surface_error_action(error) {
            SurfaceErrorAction::Reconfigure => {
                self.resize(self.size);
                anyhow!("Surface lost or outdated; reconfigured surface")
            }
            SurfaceErrorAction::Retry => anyhow!("Surface acquisition timed out"),
            SurfaceErrorAction::OutOfMemory => anyhow!("Surface out of memory"),
            SurfaceErrorAction::Unknown => anyhow!("Surface reported an unknown error"),
        }
    }

    fn surface_error_action(error: &wgpu::SurfaceError) -> SurfaceErrorAction {
        match error {
            wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated => SurfaceErrorAction::Reconfigure,
            wgpu::SurfaceError::Timeout => SurfaceErrorAction::Retry,
            wgpu::SurfaceError::OutOfMemory => SurfaceErrorAction::OutOfMemory,
            wgpu::SurfaceError::Other => SurfaceErrorAction::Unknown,
        }
    }

    fn configure_surface(&mut self) -> Result<()> {
        let surface = self.surface.as_ref().context("Surface not initialized")?;
        let device = self.device.as_ref().context("GPU device not initialized")?;
        let config = self.config.as_ref().context("Surface configuration missing")?;
        surface.configure(device, config);
        Ok(())
    }

    fn recreate_depth_texture(&mut self) -> Result<()> {
        let device = self.device.as_ref().context("GPU device not initialized")?;
        self.depth_view = Some(create_depth_view(device, self.size));
        Ok(())
    }

    fn select_present_mode(&self, modes: &[wgpu::PresentMode]) -> wgpu::PresentMode {
        if self.vsync {
            wgpu::PresentMode::Fifo
        } else {
            modes.iter().copied().find(|mode| *mode != wgpu::PresentMode::Fifo).unwrap_or(wgpu::PresentMode::Fifo)
        }
    }

    fn choose_surface_format(formats: &[wgpu::TextureFormat]) -> Option<wgpu::TextureFormat> {
        formats.iter().copied().find(|f| f.is_srgb()).or_else(|| formats.first().copied())
    }

    async fn init_wgpu(&mut self, window: &Arc<Window>) -> Result<()> {
        let instance = wgpu::Instance::default();
        let surface = instance.create_surface(window.clone()).context("Failed to create WGPU surface")?;
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("Failed to request WGPU adapter")?;
        let downlevel = adapter.get_downlevel_capabilities();
        if !downlevel.flags.contains(wgpu::DownlevelFlags::VERTEX_STORAGE) {
            bail!("adapter '{}' cannot read storage buffers in vertex shaders", adapter.get_info().name);
        }
        let adapter_limits = adapter.limits();
        if adapter_limits.max_storage_buffers_per_shader_stage < COMPUTE_STORAGE_BUFFERS {
            bail!(
                "adapter supports {} storage buffers per stage, {COMPUTE_STORAGE_BUFFERS} are needed",
                adapter_limits.max_storage_buffers_per_shader_stage
            );
        }
        if adapter_limits.max_bind_groups < 4 {
            bail!("adapter supports {} bind groups, 4 are needed", adapter_limits.max_bind_groups);
        }
        let device_desc = wgpu::DeviceDescriptor {
            label: Some("Device"),
            required_features: wgpu::Features::empty(),
            required_limits: adapter_limits,
            experimental_features: wgpu::ExperimentalFeatures::default(),
            memory_hints: wgpu::MemoryHints::default(),
            trace: wgpu::Trace::default(),
        };
        let (device, queue) =
            adapter.request_device(&device_desc).await.context("Failed to request WGPU device")?;

        let caps = surface.get_capabilities(&adapter);
        let format = Self::choose_surface_format(&caps.formats).context("Surface reports no formats")?;
        let alpha_mode = caps.alpha_modes.first().copied().unwrap_or(wgpu::CompositeAlphaMode::Auto);
        let size = window.inner_size();
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: self.select_present_mode(&caps.present_modes),
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);
        log::info!(
            target: logging::GPU,
            "using adapter '{}' ({:?}), surface {:?} {}x{}",
            adapter.get_info().name,
            adapter.get_info().backend,
            format,
            config.width,
            config.height
        );

        self.depth_view = Some(create_depth_view(&device, size));
        self.size = size;
        self.surface = Some(surface);
        self.device = Some(device);
        self.queue = Some(queue);
        self.config = Some(config);
        Ok(())
    }
}

fn create_depth_view(device: &wgpu::Device, size: PhysicalSize<u32>) -> wgpu::TextureView {
    let extent = wgpu::Extent3d { width: size.width.max(1), height: size.height.max(1), depth_or_array_layers: 1 };
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Depth Texture"),
        size: extent,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    texture.create_view(&wgpu::TextureViewDescriptor::default())
}
