use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use compositor::{
    BackendSetup, CompositorConfig, CompositorError, DelaySession, GpuBackend, LiveFrame, Pacing,
    PipCorner, PipViewport, PresentStatus, PresentationSurface, SampleTransform, SessionEvent,
    SessionState, StopStatus, SurfaceSize, SurfaceWaitPolicy, Termination,
};

#[derive(Default)]
struct Journal {
    captures: AtomicUsize,
    presents: AtomicUsize,
    teardowns: AtomicUsize,
    allocated: Mutex<Option<(usize, u32, u32)>>,
    overlays: Mutex<Vec<PipViewport>>,
}

#[derive(Default, Clone, Copy)]
struct Faults {
    allocate: bool,
    capture: bool,
}

struct JournalBackend {
    journal: Arc<Journal>,
    faults: Faults,
}

impl JournalBackend {
    fn new(journal: Arc<Journal>) -> Self {
        Self {
            journal,
            faults: Faults::default(),
        }
    }
}

impl GpuBackend for JournalBackend {
    fn allocate_ring(
        &mut self,
        capacity: usize,
        width: u32,
        height: u32,
    ) -> Result<(), CompositorError> {
        if self.faults.allocate {
            return Err(CompositorError::IncompleteRenderTarget {
                index: capacity - 1,
                status: "missing render attachment usage".to_string(),
            });
        }
        *self.journal.allocated.lock().unwrap() = Some((capacity, width, height));
        Ok(())
    }

    fn upload_live(&mut self, _frame: &LiveFrame) -> Result<(), CompositorError> {
        Ok(())
    }

    fn capture_live(&mut self, _slot: usize) -> Result<(), CompositorError> {
        if self.faults.capture {
            return Err(CompositorError::Runtime("device lost".to_string()));
        }
        self.journal.captures.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn begin_present(&mut self, _surface: SurfaceSize) -> Result<PresentStatus, CompositorError> {
        Ok(PresentStatus::Ready)
    }

    fn draw_delayed(&mut self, _slot: usize) -> Result<(), CompositorError> {
        Ok(())
    }

    fn draw_live(&mut self, viewport: PipViewport) -> Result<(), CompositorError> {
        self.journal.overlays.lock().unwrap().push(viewport);
        Ok(())
    }

    fn present(&mut self) -> Result<(), CompositorError> {
        self.journal.presents.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(1));
        Ok(())
    }

    fn teardown(&mut self) {
        self.journal.teardowns.fetch_add(1, Ordering::SeqCst);
    }
}

struct TestSurface {
    valid: AtomicBool,
}

impl TestSurface {
    fn new(valid: bool) -> Arc<Self> {
        Arc::new(Self {
            valid: AtomicBool::new(valid),
        })
    }
}

impl PresentationSurface for TestSurface {
    fn is_valid(&self) -> bool {
        self.valid.load(Ordering::SeqCst)
    }

    fn size(&self) -> SurfaceSize {
        SurfaceSize::new(1920, 1080)
    }
}

fn config() -> CompositorConfig {
    CompositorConfig {
        fps: 10.0,
        delay_seconds: 0.5,
        frame_width: 4,
        frame_height: 2,
        pip_corner: PipCorner::TopRight,
        surface_wait: SurfaceWaitPolicy {
            attempts: 5,
            interval: Duration::from_millis(2),
        },
        ..CompositorConfig::default()
    }
}

fn start(
    surface: Arc<TestSurface>,
    config: CompositorConfig,
) -> (DelaySession, Arc<Journal>) {
    start_faulty(surface, config, Faults::default())
}

fn start_faulty(
    surface: Arc<TestSurface>,
    config: CompositorConfig,
    faults: Faults,
) -> (DelaySession, Arc<Journal>) {
    let journal = Arc::new(Journal::default());
    let backend_journal = Arc::clone(&journal);
    let session = DelaySession::start_with_backend(surface, config, move |_setup: &BackendSetup| {
        Ok(JournalBackend {
            journal: backend_journal,
            faults,
        })
    })
    .expect("session starts");
    (session, journal)
}

fn collect_events(session: &DelaySession) -> Vec<SessionEvent> {
    let events = session.events();
    let mut seen = Vec::new();
    while let Ok(event) = events.recv_timeout(Duration::from_secs(5)) {
        let stopped = matches!(event, SessionEvent::Stopped(_));
        seen.push(event);
        if stopped {
            break;
        }
    }
    seen
}

fn frame() -> LiveFrame {
    LiveFrame::new(4, 2, vec![128; 32], SampleTransform::identity())
}

fn wait_for(deadline: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    condition()
}

#[test]
fn surface_that_never_becomes_valid_fails_setup() {
    let (mut session, journal) = start(TestSurface::new(false), config());
    let events = session.events();

    let mut seen = Vec::new();
    while let Ok(event) = events.recv_timeout(Duration::from_secs(5)) {
        let stopped = matches!(event, SessionEvent::Stopped(_));
        seen.push(event);
        if stopped {
            break;
        }
    }

    assert_eq!(seen.len(), 1, "only the stopped event is emitted");
    match &seen[0] {
        SessionEvent::Stopped(Termination::Failed(CompositorError::SurfaceUnavailable {
            attempts,
        })) => assert_eq!(*attempts, 5),
        other => panic!("unexpected event {other:?}"),
    }
    assert_eq!(session.state(), SessionState::Stopped);
    assert!(matches!(
        session.wait_until_ready(Duration::from_millis(10)),
        Err(CompositorError::SurfaceUnavailable { .. })
    ));
    assert!(journal.allocated.lock().unwrap().is_none());
    assert_eq!(session.stop_and_wait(Duration::from_secs(1)), StopStatus::Stopped);
}

#[test]
fn frames_fill_the_ring_and_report_progress() {
    let (mut session, journal) = start(TestSurface::new(true), config());
    assert_eq!(session.delay_frames(), 5);

    let sink = session
        .wait_until_ready(Duration::from_secs(5))
        .expect("sink ready");
    assert_eq!(sink.frame_size(), (4, 2));
    assert_eq!(*journal.allocated.lock().unwrap(), Some((5, 4, 2)));
    assert!(wait_for(Duration::from_secs(5), || session.state() == SessionState::Running));
    assert_eq!(session.fill_ratio(), 0.0);

    let progress = session.progress();
    let mut last = 0.0;
    for _ in 0..8 {
        sink.submit(frame()).unwrap();
        let target = journal.captures.load(Ordering::SeqCst) + 1;
        assert!(wait_for(Duration::from_secs(5), || {
            journal.captures.load(Ordering::SeqCst) >= target
        }));
        let ratio = progress.fill_ratio();
        assert!(ratio >= last);
        last = ratio;
    }
    assert_eq!(session.fill_ratio(), 1.0);
    assert!(session.is_playback_ready());

    assert_eq!(session.stop_and_wait(Duration::from_secs(5)), StopStatus::Stopped);
    assert_eq!(session.termination(), Some(Termination::StopRequested));
    assert_eq!(journal.teardowns.load(Ordering::SeqCst), 1);
}

#[test]
fn stopping_twice_is_a_no_op() {
    let (mut session, journal) = start(TestSurface::new(true), config());
    session
        .wait_until_ready(Duration::from_secs(5))
        .expect("sink ready");

    session.request_stop();
    session.request_stop();
    assert_eq!(session.stop_and_wait(Duration::from_secs(5)), StopStatus::Stopped);
    assert_eq!(session.stop_and_wait(Duration::from_secs(5)), StopStatus::Stopped);
    assert_eq!(session.state(), SessionState::Stopped);
    drop(session);
    assert_eq!(journal.teardowns.load(Ordering::SeqCst), 1);
}

#[test]
fn invalidated_surface_ends_the_session() {
    let surface = TestSurface::new(true);
    let (session, journal) = start(Arc::clone(&surface), config());
    session
        .wait_until_ready(Duration::from_secs(5))
        .expect("sink ready");

    surface.valid.store(false, Ordering::SeqCst);
    assert!(wait_for(Duration::from_secs(5), || session.state() == SessionState::Stopped));
    assert_eq!(session.termination(), Some(Termination::SurfaceInvalid));
    assert_eq!(journal.teardowns.load(Ordering::SeqCst), 1);
}

#[test]
fn corner_changes_apply_on_following_ticks() {
    let (session, journal) = start(
        TestSurface::new(true),
        CompositorConfig {
            pacing: Pacing::FrameArrival {
                max_wait: Duration::from_millis(5),
            },
            ..config()
        },
    );
    let sink = session
        .wait_until_ready(Duration::from_secs(5))
        .expect("sink ready");
    sink.submit(frame()).unwrap();
    assert!(wait_for(Duration::from_secs(5), || {
        !journal.overlays.lock().unwrap().is_empty()
    }));
    assert_eq!(journal.overlays.lock().unwrap()[0].y, 768);

    let handle = session.handle();
    handle.set_pip_corner(PipCorner::BottomLeft);
    journal.overlays.lock().unwrap().clear();
    assert!(wait_for(Duration::from_secs(5), || {
        journal
            .overlays
            .lock()
            .unwrap()
            .iter()
            .any(|viewport| viewport.x == 42 && viewport.y == 42)
    }));

    handle.set_pip_corner(PipCorner::Hidden);
    let presents = journal.presents.load(Ordering::SeqCst);
    assert!(wait_for(Duration::from_secs(5), || {
        journal.presents.load(Ordering::SeqCst) > presents + 2
    }));
    journal.overlays.lock().unwrap().clear();
    let presents = journal.presents.load(Ordering::SeqCst);
    assert!(wait_for(Duration::from_secs(5), || {
        journal.presents.load(Ordering::SeqCst) > presents + 2
    }));
    assert!(journal.overlays.lock().unwrap().is_empty());
}

#[test]
fn invalid_configuration_is_rejected_before_spawning() {
    let journal = Arc::new(Journal::default());
    let result = DelaySession::start_with_backend(
        TestSurface::new(true),
        CompositorConfig {
            fps: -1.0,
            ..config()
        },
        move |_setup: &BackendSetup| Ok(JournalBackend::new(journal)),
    );
    assert!(matches!(result, Err(CompositorError::InvalidConfig(_))));
}

#[test]
fn backend_setup_failure_is_reported_once() {
    let (tx, rx) = crossbeam_channel::unbounded();
    let session = DelaySession::start_with_backend(
        TestSurface::new(true),
        config(),
        move |setup: &BackendSetup| -> Result<JournalBackend, CompositorError> {
            tx.send(setup.capacity).unwrap();
            Err(CompositorError::ContextCreation("no adapter".to_string()))
        },
    )
    .expect("thread spawned");
    assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 5);
    assert!(matches!(
        session.wait_until_ready(Duration::from_secs(5)),
        Err(CompositorError::ContextCreation(_))
    ));
    assert!(session.termination().is_some_and(|t| t.is_failure()));
}

#[test]
fn incomplete_ring_target_aborts_setup_with_teardown() {
    let (session, journal) = start_faulty(
        TestSurface::new(true),
        config(),
        Faults {
            allocate: true,
            ..Faults::default()
        },
    );

    let seen = collect_events(&session);
    assert_eq!(seen.len(), 1, "no sink is handed out");
    assert!(matches!(
        &seen[0],
        SessionEvent::Stopped(Termination::Failed(CompositorError::IncompleteRenderTarget {
            index: 4,
            ..
        }))
    ));
    assert_eq!(session.state(), SessionState::Stopped);
    assert!(matches!(
        session.wait_until_ready(Duration::from_millis(10)),
        Err(CompositorError::IncompleteRenderTarget { .. })
    ));
    assert_eq!(journal.teardowns.load(Ordering::SeqCst), 1);
    assert_eq!(journal.captures.load(Ordering::SeqCst), 0);
}

#[test]
fn gpu_failure_while_running_is_fatal() {
    let (mut session, journal) = start_faulty(
        TestSurface::new(true),
        config(),
        Faults {
            capture: true,
            ..Faults::default()
        },
    );
    let sink = session
        .wait_until_ready(Duration::from_secs(5))
        .expect("sink ready");
    sink.submit(frame()).unwrap();

    assert!(wait_for(Duration::from_secs(5), || session.state() == SessionState::Stopped));
    assert_eq!(
        session.termination(),
        Some(Termination::Failed(CompositorError::Runtime(
            "device lost".to_string()
        )))
    );
    assert_eq!(journal.teardowns.load(Ordering::SeqCst), 1);
    assert_eq!(session.fill_ratio(), 0.0);
    assert_eq!(session.stop_and_wait(Duration::from_secs(5)), StopStatus::Stopped);
    assert_eq!(journal.teardowns.load(Ordering::SeqCst), 1);
}

#[test]
fn stop_during_setup_never_hands_out_a_sink() {
    let journal = Arc::new(Journal::default());
    let backend_journal = Arc::clone(&journal);
    let (entered_tx, entered_rx) = crossbeam_channel::bounded::<()>(1);
    let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(1);
    let session = DelaySession::start_with_backend(
        TestSurface::new(true),
        config(),
        move |_setup: &BackendSetup| {
            entered_tx.send(()).unwrap();
            release_rx.recv_timeout(Duration::from_secs(5)).unwrap();
            Ok(JournalBackend::new(backend_journal))
        },
    )
    .expect("session starts");

    entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    session.request_stop();
    assert_eq!(session.state(), SessionState::Stopping);
    release_tx.send(()).unwrap();

    let seen = collect_events(&session);
    assert_eq!(seen.len(), 1, "only the stopped event is emitted");
    assert!(matches!(
        seen[0],
        SessionEvent::Stopped(Termination::StopRequested)
    ));
    assert!(matches!(
        session.wait_until_ready(Duration::from_millis(10)),
        Err(CompositorError::Ended)
    ));
    assert_eq!(journal.teardowns.load(Ordering::SeqCst), 1);
    assert_eq!(journal.presents.load(Ordering::SeqCst), 0);
}
