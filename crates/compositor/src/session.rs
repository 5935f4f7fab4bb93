//! Render-thread lifecycle: startup, readiness, cooperative stop and bounded
//! join.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::{debug, info, warn};

use crate::backend::{BackendSetup, GpuBackend};
use crate::compositor::{Compositor, Termination};
use crate::error::CompositorError;
use crate::gpu::WgpuBackend;
use crate::live::{FrameSink, LiveSource};
use crate::overlay::{OverlayConfig, OverlaySettings};
use crate::ring::{BufferProgress, RingStore};
use crate::surface::{wait_for_surface, PresentationSurface, SurfaceWait};
use crate::types::{CompositorConfig, PipCorner};

/// Bound applied when a session is dropped without an explicit stop.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_millis(1500);

const RENDER_THREAD_NAME: &str = "delaycam-render";

/// Lifecycle of the render thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Starting,
    Running,
    Stopping,
    Stopped,
}

impl SessionState {
    fn to_bits(self) -> u8 {
        match self {
            SessionState::Starting => 0,
            SessionState::Running => 1,
            SessionState::Stopping => 2,
            SessionState::Stopped => 3,
        }
    }

    fn from_bits(bits: u8) -> Self {
        match bits {
            0 => SessionState::Starting,
            1 => SessionState::Running,
            2 => SessionState::Stopping,
            _ => SessionState::Stopped,
        }
    }
}

/// Notifications emitted by the render thread, in order.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Setup finished; the source may start submitting frames. Sent once.
    SinkReady(FrameSink),
    /// The render thread finished teardown and is exiting.
    Stopped(Termination),
}

/// Result of [`DelaySession::stop_and_wait`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopStatus {
    Stopped,
    /// The render thread did not exit in time and was left running detached.
    TimedOut,
}

#[derive(Debug)]
struct Shared {
    state: AtomicU8,
    stop: AtomicBool,
    progress: Arc<BufferProgress>,
    overlay: Arc<OverlaySettings>,
    termination: Mutex<Option<Termination>>,
    sink: Mutex<Option<FrameSink>>,
}

impl Shared {
    fn state(&self) -> SessionState {
        SessionState::from_bits(self.state.load(Ordering::Acquire))
    }

    fn transition(&self, from: SessionState, to: SessionState) -> bool {
        self.state
            .compare_exchange(
                from.to_bits(),
                to.to_bits(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    fn set_state(&self, state: SessionState) {
        self.state.store(state.to_bits(), Ordering::Release);
    }

    fn termination(&self) -> MutexGuard<'_, Option<Termination>> {
        self.termination
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn sink(&self) -> MutexGuard<'_, Option<FrameSink>> {
        self.sink.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Cloneable, thread-safe view of a running session.
///
/// Suitable for UI threads: every method is a lock-free atomic access.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    shared: Arc<Shared>,
}

impl SessionHandle {
    /// Asks the render thread to stop after its current tick. Repeated calls
    /// are no-ops.
    pub fn request_stop(&self) {
        self.shared.stop.store(true, Ordering::Release);
        let moved = self
            .shared
            .transition(SessionState::Running, SessionState::Stopping)
            || self
                .shared
                .transition(SessionState::Starting, SessionState::Stopping);
        if moved {
            debug!("render thread stop requested");
        }
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    pub fn fill_ratio(&self) -> f32 {
        self.shared.progress.fill_ratio()
    }

    pub fn is_playback_ready(&self) -> bool {
        self.shared.progress.is_playback_ready()
    }

    pub fn progress(&self) -> Arc<BufferProgress> {
        Arc::clone(&self.shared.progress)
    }

    /// Takes effect on the next tick.
    pub fn set_pip_corner(&self, corner: PipCorner) {
        self.shared.overlay.set_corner(corner);
    }

    /// Takes effect on the next tick. Clamped to `0.0..=1.0`.
    pub fn set_pip_scale(&self, scale: f32) {
        self.shared.overlay.set_scale(scale);
    }

    pub fn overlay(&self) -> OverlayConfig {
        self.shared.overlay.load()
    }
}

/// One render thread bound to one presentation surface and one configuration.
///
/// Changing the configuration means stopping this session and starting a
/// new one. Dropping the session performs a stop bounded by
/// [`DEFAULT_STOP_TIMEOUT`].
#[derive(Debug)]
pub struct DelaySession {
    handle: SessionHandle,
    thread: Option<JoinHandle<()>>,
    exited_rx: Receiver<()>,
    ready_rx: Receiver<()>,
    events_rx: Receiver<SessionEvent>,
    capacity: usize,
}

impl DelaySession {
    /// Starts a session rendering through wgpu into `surface`.
    pub fn start<S>(surface: Arc<S>, config: CompositorConfig) -> Result<Self, CompositorError>
    where
        S: PresentationSurface + HasWindowHandle + HasDisplayHandle + 'static,
    {
        let target = Arc::clone(&surface);
        Self::start_with_backend(surface, config, move |setup| {
            WgpuBackend::new(target, setup)
        })
    }

    /// Starts a session whose GPU work is done by the backend `init` builds.
    ///
    /// `init` runs on the render thread once the surface is valid.
    pub fn start_with_backend<B, F>(
        surface: Arc<dyn PresentationSurface>,
        config: CompositorConfig,
        init: F,
    ) -> Result<Self, CompositorError>
    where
        B: GpuBackend + 'static,
        F: FnOnce(&BackendSetup) -> Result<B, CompositorError> + Send + 'static,
    {
        config.validate()?;
        let capacity = config.delay_frames();
        let ring = RingStore::new(capacity);
        let shared = Arc::new(Shared {
            state: AtomicU8::new(SessionState::Starting.to_bits()),
            stop: AtomicBool::new(false),
            progress: ring.progress(),
            overlay: Arc::new(OverlaySettings::new(OverlayConfig {
                corner: config.pip_corner,
                scale: config.pip_scale,
            })),
            termination: Mutex::new(None),
            sink: Mutex::new(None),
        });

        let (exited_tx, exited_rx) = crossbeam_channel::bounded::<()>(0);
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<()>(0);
        let (events_tx, events_rx) = crossbeam_channel::unbounded();

        info!(
            capacity,
            fps = config.fps,
            delay_seconds = config.delay_seconds,
            width = config.frame_width,
            height = config.frame_height,
            "starting delay session"
        );

        let thread_shared = Arc::clone(&shared);
        let thread = thread::Builder::new()
            .name(RENDER_THREAD_NAME.into())
            .spawn(move || {
                let _exited = exited_tx;
                let ctx = RenderThread {
                    shared: thread_shared,
                    surface,
                    config,
                    ring,
                    ready_tx,
                    events_tx,
                };
                ctx.run(init);
            })
            .map_err(|err| CompositorError::Spawn(err.to_string()))?;

        Ok(Self {
            handle: SessionHandle { shared },
            thread: Some(thread),
            exited_rx,
            ready_rx,
            events_rx,
            capacity,
        })
    }

    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    pub fn request_stop(&self) {
        self.handle.request_stop();
    }

    /// Requests a stop and waits up to `timeout` for the render thread to
    /// finish teardown. Calling it again after it returned `Stopped` is a no-op.
    pub fn stop_and_wait(&mut self, timeout: Duration) -> StopStatus {
        self.request_stop();
        let Some(thread) = self.thread.take() else {
            return StopStatus::Stopped;
        };
        match self.exited_rx.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    timeout_ms = timeout.as_millis() as u64,
                    "render thread did not stop in time"
                );
                self.thread = Some(thread);
                StopStatus::TimedOut
            }
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if thread.join().is_err() {
                    warn!("render thread panicked during shutdown");
                }
                debug!("render thread joined");
                StopStatus::Stopped
            }
        }
    }

    /// Blocks until the sink is ready, the session ends, or `timeout` passes.
    pub fn wait_until_ready(&self, timeout: Duration) -> Result<FrameSink, CompositorError> {
        match self.ready_rx.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => Err(CompositorError::NotReady(timeout)),
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if let Some(sink) = self.handle.shared.sink().clone() {
                    return Ok(sink);
                }
                match self.termination() {
                    Some(Termination::Failed(err)) => Err(err),
                    _ => Err(CompositorError::Ended),
                }
            }
        }
    }

    /// Stream of [`SessionEvent`]s. Each event is delivered to one receiver.
    pub fn events(&self) -> Receiver<SessionEvent> {
        self.events_rx.clone()
    }

    pub fn state(&self) -> SessionState {
        self.handle.state()
    }

    /// Why the render thread ended, once it has.
    pub fn termination(&self) -> Option<Termination> {
        self.handle.shared.termination().clone()
    }

    pub fn fill_ratio(&self) -> f32 {
        self.handle.fill_ratio()
    }

    pub fn is_playback_ready(&self) -> bool {
        self.handle.is_playback_ready()
    }

    pub fn progress(&self) -> Arc<BufferProgress> {
        self.handle.progress()
    }

    pub fn set_pip_corner(&self, corner: PipCorner) {
        self.handle.set_pip_corner(corner);
    }

    pub fn set_pip_scale(&self, scale: f32) {
        self.handle.set_pip_scale(scale);
    }

    /// Ring capacity of this session.
    pub fn delay_frames(&self) -> usize {
        self.capacity
    }
}

impl Drop for DelaySession {
    fn drop(&mut self) {
        if self.thread.is_some() {
            let _ = self.stop_and_wait(DEFAULT_STOP_TIMEOUT);
        }
    }
}

struct RenderThread {
    shared: Arc<Shared>,
    surface: Arc<dyn PresentationSurface>,
    config: CompositorConfig,
    ring: RingStore,
    ready_tx: Sender<()>,
    events_tx: Sender<SessionEvent>,
}

impl RenderThread {
    fn run<B, F>(self, init: F)
    where
        B: GpuBackend,
        F: FnOnce(&BackendSetup) -> Result<B, CompositorError>,
    {
        let RenderThread {
            shared,
            surface,
            config,
            ring,
            ready_tx,
            events_tx,
        } = self;

        let mut ready_tx = Some(ready_tx);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            drive(&shared, surface, config, ring, init, &mut ready_tx, &events_tx)
        }));
        let termination = outcome.unwrap_or_else(|payload| {
            Termination::Failed(CompositorError::Runtime(panic_message(&*payload)))
        });

        match &termination {
            Termination::Failed(err) if err.is_setup_error() => {
                warn!(error = %err, "delay session failed to start")
            }
            Termination::Failed(err) => warn!(error = %err, "delay session failed"),
            other => info!(reason = ?other, "delay session stopped"),
        }
        *shared.termination() = Some(termination.clone());
        shared.set_state(SessionState::Stopped);
        // Waiters read the termination once this sender is gone.
        drop(ready_tx);
        let _ = events_tx.send(SessionEvent::Stopped(termination));
    }
}

fn drive<B, F>(
    shared: &Arc<Shared>,
    surface: Arc<dyn PresentationSurface>,
    config: CompositorConfig,
    ring: RingStore,
    init: F,
    ready_tx: &mut Option<Sender<()>>,
    events_tx: &Sender<SessionEvent>,
) -> Termination
where
    B: GpuBackend,
    F: FnOnce(&BackendSetup) -> Result<B, CompositorError>,
{
    match wait_for_surface(&*surface, config.surface_wait, &shared.stop) {
        Ok(SurfaceWait::Ready) => {}
        Ok(SurfaceWait::Cancelled) => return Termination::StopRequested,
        Err(err) => return Termination::Failed(err),
    }

    let setup = BackendSetup {
        capacity: ring.capacity(),
        surface_size: surface.size(),
        config: config.clone(),
    };
    let mut backend = match init(&setup) {
        Ok(backend) => backend,
        Err(err) => return Termination::Failed(err),
    };
    if let Err(err) = backend.allocate_ring(ring.capacity(), config.frame_width, config.frame_height)
    {
        backend.teardown();
        return Termination::Failed(err);
    }

    let live = LiveSource::new(config.frame_width, config.frame_height);
    let sink = live.sink();
    let mut compositor = Compositor::new(
        backend,
        ring,
        live,
        Arc::clone(&shared.overlay),
        surface,
    );

    if !shared.transition(SessionState::Starting, SessionState::Running) {
        debug!("stop requested during setup");
        compositor.backend_mut().teardown();
        return Termination::StopRequested;
    }
    debug!("render thread running");
    *shared.sink() = Some(sink.clone());
    drop(ready_tx.take());
    let _ = events_tx.send(SessionEvent::SinkReady(sink));

    let termination = panic::catch_unwind(AssertUnwindSafe(|| {
        compositor.run(&shared.stop, config.pacing)
    }))
    .unwrap_or_else(|payload| {
        Termination::Failed(CompositorError::Runtime(panic_message(&*payload)))
    });

    shared.transition(SessionState::Running, SessionState::Stopping);
    compositor.backend_mut().teardown();
    termination
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "render thread panicked".to_string()
    }
}
