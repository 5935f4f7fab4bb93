use std::sync::{Arc, Mutex};

use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::{debug, error, warn};

use crate::error::CompositorError;
use crate::types::SurfaceSize;

/// Instance, device, queue and configured surface for one session.
pub(crate) struct GpuContext {
    pub _instance: wgpu::Instance,
    pub surface: wgpu::Surface<'static>,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub config: wgpu::SurfaceConfiguration,
    pub size: SurfaceSize,
    pub surface_format: wgpu::TextureFormat,
    fault: Arc<Mutex<Option<String>>>,
}

impl GpuContext {
    /// Creates the context for `target`.
    ///
    /// # Safety contract
    ///
    /// The surface borrows `target`'s native handles without a lifetime; the
    /// caller must keep `target` alive until this context is dropped.
    pub(crate) fn new<T>(target: &T, initial_size: SurfaceSize) -> Result<Self, CompositorError>
    where
        T: HasDisplayHandle + HasWindowHandle,
    {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            flags: wgpu::InstanceFlags::default(),
            memory_budget_thresholds: wgpu::MemoryBudgetThresholds::default(),
            backend_options: wgpu::BackendOptions::default(),
        });

        let window_handle = target.window_handle().map_err(|err| {
            CompositorError::ContextCreation(format!("failed to acquire window handle: {err}"))
        })?;
        let display_handle = target.display_handle().map_err(|err| {
            CompositorError::ContextCreation(format!("failed to acquire display handle: {err}"))
        })?;

        let surface = unsafe {
            instance.create_surface_unsafe(wgpu::SurfaceTargetUnsafe::RawHandle {
                raw_display_handle: display_handle.as_raw(),
                raw_window_handle: window_handle.as_raw(),
            })
        }
        .map_err(|err| {
            CompositorError::ContextCreation(format!("failed to create rendering surface: {err}"))
        })?;

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .map_err(|err| {
            CompositorError::ContextCreation(format!("failed to find a suitable GPU adapter: {err}"))
        })?;

        let info = adapter.get_info();
        debug!(
            name = %info.name,
            backend = ?info.backend,
            device_type = ?info.device_type,
            "selected GPU adapter"
        );

        let limits = adapter.limits();
        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("delaycam device"),
            required_features: wgpu::Features::empty(),
            required_limits: limits,
            memory_hints: wgpu::MemoryHints::MemoryUsage,
            trace: wgpu::Trace::default(),
        }))
        .map_err(|err| {
            CompositorError::ContextCreation(format!("failed to create GPU device: {err}"))
        })?;

        let fault = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&fault);
        device.on_uncaptured_error(Box::new(move |err: wgpu::Error| {
            error!(error = %err, "uncaptured GPU error");
            let mut slot = sink.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            slot.get_or_insert_with(|| err.to_string());
        }));

        let surface_caps = surface.get_capabilities(&adapter);
        let Some(&first_format) = surface_caps.formats.first() else {
            return Err(CompositorError::ContextCreation(
                "surface reports no supported formats for this adapter".to_string(),
            ));
        };
        // Frames are stored and sampled as plain RGBA8; a gamma surface keeps
        // the bytes unchanged on the way out.
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|format| !format.is_srgb())
            .unwrap_or_else(|| {
                warn!(
                    ?first_format,
                    "no non-sRGB surface format available; colours will be re-encoded"
                );
                first_format
            });

        let present_mode = surface_caps
            .present_modes
            .iter()
            .copied()
            .find(|mode| *mode == wgpu::PresentMode::Fifo)
            .or_else(|| surface_caps.present_modes.first().copied())
            .unwrap_or(wgpu::PresentMode::Fifo);
        let alpha_mode = surface_caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: initial_size.width.max(1),
            height: initial_size.height.max(1),
            present_mode,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);
        debug!(?surface_format, ?present_mode, "configured presentation surface");

        Ok(Self {
            _instance: instance,
            surface,
            device,
            queue,
            config,
            size: initial_size,
            surface_format,
            fault,
        })
    }

    pub(crate) fn resize(&mut self, new_size: SurfaceSize) {
        if new_size.is_empty() {
            return;
        }

        self.size = new_size;
        self.config.width = new_size.width;
        self.config.height = new_size.height;
        self.surface.configure(&self.device, &self.config);
    }

    pub(crate) fn reconfigure(&mut self) {
        self.surface.configure(&self.device, &self.config);
    }

    /// First uncaptured device error since the last call, if any.
    pub(crate) fn take_fault(&self) -> Option<String> {
        self.fault
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }
}
