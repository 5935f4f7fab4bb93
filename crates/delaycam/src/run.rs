use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use camconfig::budget::max_delay_seconds;
use camconfig::{OverlayCorner, Settings};
use compositor::{
    CompositorConfig, CompositorError, DelaySession, PipCorner, SessionEvent, StopStatus,
    Termination, WindowSurface,
};
use crossbeam_channel::{Receiver, TryRecvError};
use sysinfo::System;
use tracing_subscriber::EnvFilter;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, Event, KeyEvent, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop, EventLoopWindowTarget};
use winit::keyboard::{Key, NamedKey};
use winit::window::WindowBuilder;

use crate::cli::{PipChoice, RunArgs};
use crate::paths::AppPaths;
use crate::pattern::PatternSource;

const TITLE_REFRESH: Duration = Duration::from_millis(100);
const PIP_SCALE_STEP: f32 = 0.05;
const MIN_PIP_SCALE: f32 = 0.1;

pub fn run(args: RunArgs) -> Result<()> {
    let paths = AppPaths::discover()?;
    let settings_path = paths.settings_file();
    let mut settings = Settings::load_or_default(&settings_path)
        .with_context(|| format!("failed to load {}", settings_path.display()))?;
    apply_overrides(&mut settings, &args);
    settings.validate()?;

    let available = available_memory();
    let max_delay = max_delay_seconds(settings.width, settings.height, settings.fps, available);
    settings.clamp_delay(max_delay);
    tracing::debug!(
        config = %paths.config_dir().display(),
        available_mb = available / (1024 * 1024),
        max_delay,
        "resolved delaycam settings"
    );

    if args.save {
        settings.persist(&settings_path)?;
        tracing::info!(path = %settings_path.display(), "saved settings");
    }

    let config = compositor_config(&settings);
    run_window(&settings, config, Duration::from_millis(args.stop_timeout_ms))
}

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Bytes of memory currently available to new allocations.
pub fn available_memory() -> u64 {
    let mut system = System::new();
    system.refresh_memory();
    system.available_memory()
}

fn apply_overrides(settings: &mut Settings, args: &RunArgs) {
    if let Some((width, height)) = args.size {
        settings.width = width;
        settings.height = height;
    }
    if let Some(fps) = args.fps {
        settings.fps = fps;
    }
    if let Some(delay) = args.delay {
        settings.delay = delay;
    }
    match args.pip {
        Some(PipChoice::Off) => settings.show_live_overlay = false,
        Some(PipChoice::Corner(corner)) => {
            settings.show_live_overlay = true;
            settings.live_overlay_corner = corner;
        }
        None => {}
    }
    if let Some(scale) = args.pip_scale {
        settings.pip_scale = scale;
    }
    if args.mirror {
        settings.mirror_preview = true;
    }
}

fn compositor_config(settings: &Settings) -> CompositorConfig {
    let pip_corner = if settings.show_live_overlay {
        pip_corner(settings.live_overlay_corner)
    } else {
        PipCorner::Hidden
    };
    CompositorConfig {
        fps: settings.fps as f32,
        delay_seconds: settings.delay_seconds(),
        frame_width: settings.width,
        frame_height: settings.height,
        pip_corner,
        pip_scale: settings.pip_scale,
        ..CompositorConfig::default()
    }
}

fn pip_corner(corner: OverlayCorner) -> PipCorner {
    match corner {
        OverlayCorner::TopLeft => PipCorner::TopLeft,
        OverlayCorner::TopRight => PipCorner::TopRight,
        OverlayCorner::BottomLeft => PipCorner::BottomLeft,
        OverlayCorner::BottomRight => PipCorner::BottomRight,
    }
}

fn run_window(settings: &Settings, config: CompositorConfig, stop_timeout: Duration) -> Result<()> {
    let event_loop = EventLoop::new().map_err(|err| anyhow!("failed to create event loop: {err}"))?;
    let window = WindowBuilder::new()
        .with_title("delaycam")
        .with_inner_size(PhysicalSize::new(settings.width, settings.height))
        .build(&event_loop)
        .map_err(|err| anyhow!("failed to create window: {err}"))?;
    let surface = Arc::new(WindowSurface::new(Arc::new(window)));

    let session = DelaySession::start(Arc::clone(&surface), config.clone())?;
    tracing::info!(
        delay = ?settings.delay,
        frames = session.delay_frames(),
        corner = %config.pip_corner,
        "delaycam running; press p to move the overlay, +/- to resize it, Esc to quit"
    );

    let mut host = Host {
        events: session.events(),
        session: Some(session),
        surface,
        pattern: None,
        fps: settings.fps,
        mirror: settings.mirror_preview,
        delay_label: humantime::format_duration(settings.delay).to_string(),
        corner: config.pip_corner,
        scale: config.pip_scale,
        stop_timeout,
        title: String::new(),
        failure: None,
    };

    event_loop
        .run(|event, elwt| host.handle_event(event, elwt))
        .map_err(|err| anyhow!("window event loop error: {err}"))?;
    host.shutdown();

    match host.failure.take() {
        Some(err) => Err(err.into()),
        None => Ok(()),
    }
}

struct Host {
    session: Option<DelaySession>,
    events: Receiver<SessionEvent>,
    surface: Arc<WindowSurface>,
    pattern: Option<PatternSource>,
    fps: u32,
    mirror: bool,
    delay_label: String,
    corner: PipCorner,
    scale: f32,
    stop_timeout: Duration,
    title: String,
    failure: Option<CompositorError>,
}

impl Host {
    fn handle_event(&mut self, event: Event<()>, elwt: &EventLoopWindowTarget<()>) {
        match event {
            Event::WindowEvent { window_id, event } if window_id == self.surface.window().id() => {
                match event {
                    WindowEvent::CloseRequested | WindowEvent::Destroyed => {
                        self.shutdown();
                        elwt.exit();
                    }
                    WindowEvent::KeyboardInput { event, .. } => {
                        if self.handle_key(&event) {
                            self.shutdown();
                            elwt.exit();
                        }
                    }
                    WindowEvent::Resized(size) => {
                        tracing::trace!(width = size.width, height = size.height, "window resized");
                    }
                    _ => {}
                }
            }
            Event::AboutToWait => {
                if !self.drain_session_events() {
                    self.shutdown();
                    elwt.exit();
                    return;
                }
                self.refresh_title();
                elwt.set_control_flow(ControlFlow::WaitUntil(Instant::now() + TITLE_REFRESH));
            }
            _ => {}
        }
    }

    /// Returns true when the key asks to quit.
    fn handle_key(&mut self, event: &KeyEvent) -> bool {
        if event.state != ElementState::Pressed || event.repeat {
            return false;
        }
        let Some(session) = self.session.as_ref() else {
            return false;
        };
        match &event.logical_key {
            Key::Named(NamedKey::Escape) => return true,
            Key::Character(value) => match value.as_str() {
                "q" | "Q" => return true,
                "p" | "P" => {
                    self.corner = self.corner.next();
                    session.set_pip_corner(self.corner);
                    tracing::info!(corner = %self.corner, "moved live overlay");
                }
                "+" | "=" => {
                    self.scale = (self.scale + PIP_SCALE_STEP).min(1.0);
                    session.set_pip_scale(self.scale);
                }
                "-" | "_" => {
                    self.scale = (self.scale - PIP_SCALE_STEP).max(MIN_PIP_SCALE);
                    session.set_pip_scale(self.scale);
                }
                _ => {}
            },
            _ => {}
        }
        false
    }

    /// Handles pending session events. Returns false once the session ended.
    fn drain_session_events(&mut self) -> bool {
        loop {
            match self.events.try_recv() {
                Ok(SessionEvent::SinkReady(sink)) => {
                    match PatternSource::spawn(sink, self.fps, self.mirror) {
                        Ok(pattern) => self.pattern = Some(pattern),
                        Err(err) => {
                            tracing::error!(error = %err, "failed to start frame source");
                            return false;
                        }
                    }
                }
                Ok(SessionEvent::Stopped(termination)) => {
                    match termination {
                        Termination::Failed(err) => {
                            tracing::error!(error = %err, "render session failed");
                            self.failure = Some(err);
                        }
                        other => tracing::info!(reason = ?other, "render session ended"),
                    }
                    return false;
                }
                Err(TryRecvError::Empty) => return true,
                Err(TryRecvError::Disconnected) => return false,
            }
        }
    }

    fn refresh_title(&mut self) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        let title = if session.is_playback_ready() {
            format!("delaycam | {} delay", self.delay_label)
        } else {
            format!(
                "delaycam | buffering {:.0}%",
                session.fill_ratio() * 100.0
            )
        };
        if title != self.title {
            self.surface.window().set_title(&title);
            self.title = title;
        }
    }

    fn shutdown(&mut self) {
        if let Some(mut pattern) = self.pattern.take() {
            pattern.stop();
        }
        let Some(mut session) = self.session.take() else {
            return;
        };
        self.surface.invalidate();
        match session.stop_and_wait(self.stop_timeout) {
            StopStatus::Stopped => tracing::debug!("render session stopped"),
            StopStatus::TimedOut => tracing::warn!(
                timeout_ms = self.stop_timeout.as_millis() as u64,
                "render thread still busy at exit"
            ),
        }
        if self.failure.is_none() {
            if let Some(Termination::Failed(err)) = session.termination() {
                self.failure = Some(err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn run_args(argv: &[&str]) -> RunArgs {
        let mut full = vec!["delaycam"];
        full.extend_from_slice(argv);
        crate::cli::Cli::try_parse_from(full).unwrap().run
    }

    #[test]
    fn overrides_replace_saved_values() {
        let mut settings = Settings::default();
        let args = run_args(&[
            "--size", "640x480", "--fps", "15", "--delay", "8", "--pip", "bottom-left",
            "--pip-scale", "0.4", "--mirror",
        ]);
        apply_overrides(&mut settings, &args);
        assert_eq!((settings.width, settings.height), (640, 480));
        assert_eq!(settings.fps, 15);
        assert_eq!(settings.delay, Duration::from_secs(8));
        assert_eq!(settings.live_overlay_corner, OverlayCorner::BottomLeft);
        assert!(settings.show_live_overlay);
        assert_eq!(settings.pip_scale, 0.4);
        assert!(settings.mirror_preview);
    }

    #[test]
    fn hidden_overlay_maps_to_hidden_corner() {
        let mut settings = Settings::default();
        apply_overrides(&mut settings, &run_args(&["--pip", "off"]));
        let config = compositor_config(&settings);
        assert_eq!(config.pip_corner, PipCorner::Hidden);

        let config = compositor_config(&Settings::default());
        assert_eq!(config.pip_corner, PipCorner::TopRight);
        assert_eq!(config.delay_frames(), 90);
        assert_eq!((config.frame_width, config.frame_height), (1280, 720));
    }

    #[test]
    fn every_overlay_corner_has_a_visible_pip_corner() {
        for corner in OverlayCorner::ALL {
            let mapped = pip_corner(corner);
            assert!(mapped.is_visible());
            assert_eq!(mapped.to_string(), corner.as_str());
        }
    }
}
