use super::*;
use crate::output::simulated::{SimulatedBackend, SimulatedScript, SimulatedStats};
use std::time::Instant;

const WAIT: Duration = Duration::from_secs(5);

fn controller(script: SimulatedScript, opts: OutputControllerOpts) -> (OutputController, SimulatedStats) {
    let backend = SimulatedBackend::new(script);
    let stats = backend.stats();
    (OutputController::new(Box::new(backend), opts).unwrap(), stats)
}

fn quick() -> SimulatedScript {
    SimulatedScript {
        connect_latency: Duration::from_millis(5),
        stop_latency: Duration::from_millis(5),
        ..SimulatedScript::default()
    }
}

fn next_event(rx: &Receiver<OutputEvent>) -> OutputEvent {
    rx.recv_timeout(WAIT).expect("event within timeout")
}

fn wait_state(c: &OutputController, want: OutputState) {
    let deadline = Instant::now() + WAIT;
    while c.state() != want {
        assert!(Instant::now() < deadline, "state stuck at {}", c.state());
        std::thread::sleep(Duration::from_millis(2));
    }
}

fn drain(rx: &Receiver<OutputEvent>) -> Vec<OutputEvent> {
    std::thread::sleep(Duration::from_millis(50));
    rx.try_iter().collect()
}

#[test]
fn start_then_stop_walks_the_lifecycle() {
    let (c, stats) = controller(quick(), OutputControllerOpts::default());
    let rx = c.events();

    assert_eq!(c.setup_streaming(&ServiceConfig::default()).unwrap(), Transition::Applied);
    assert_eq!(c.state(), OutputState::Configuring);
    assert_eq!(c.start_streaming().unwrap(), Transition::Applied);
    assert!(c.streaming_active());

    assert_eq!(next_event(&rx), OutputEvent::StreamingStarted);
    assert_eq!(c.state(), OutputState::Active);

    assert_eq!(c.stop_streaming(false), Transition::Applied);
    assert_eq!(next_event(&rx), OutputEvent::StreamingStopping);
    assert!(matches!(next_event(&rx), OutputEvent::StreamingStopped { code: 0, .. }));
    assert_eq!(c.state(), OutputState::Idle);
    assert!(!c.streaming_active());
    assert_eq!(stats.teardowns(), 1);
    assert_eq!(stats.publish_url().as_deref(), Some("rtmp://127.0.0.1:1935/live/stream"));
}

#[test]
fn duplicate_start_is_a_noop() {
    let (c, stats) = controller(quick(), OutputControllerOpts::default());
    let rx = c.events();
    c.setup_streaming(&ServiceConfig::default()).unwrap();
    assert_eq!(c.start_streaming().unwrap(), Transition::Applied);
    assert_eq!(c.start_streaming().unwrap(), Transition::NoOp);
    wait_state(&c, OutputState::Active);
    assert_eq!(c.start_streaming().unwrap(), Transition::NoOp);

    let events = drain(&rx);
    assert_eq!(events, vec![OutputEvent::StreamingStarted]);
    assert_eq!(stats.starts(), 1);
}

#[test]
fn stop_while_idle_emits_nothing() {
    let (c, stats) = controller(quick(), OutputControllerOpts::default());
    let rx = c.events();
    assert_eq!(c.stop_streaming(false), Transition::NoOp);
    assert_eq!(c.stop_streaming(true), Transition::NoOp);
    assert!(drain(&rx).is_empty());
    assert_eq!(stats.stops(), 0);
    assert_eq!(c.state(), OutputState::Idle);
}

#[test]
fn start_requires_setup() {
    let (c, _) = controller(quick(), OutputControllerOpts::default());
    let err = c.start_streaming().unwrap_err();
    assert!(matches!(err, StagecastError::InvalidState(_)));
}

#[test]
fn setup_twice_is_rejected() {
    let (c, _) = controller(quick(), OutputControllerOpts::default());
    c.setup_streaming(&ServiceConfig::default()).unwrap();
    let err = c.setup_streaming(&ServiceConfig::default()).unwrap_err();
    assert!(matches!(err, StagecastError::InvalidState(_)));
    assert_eq!(c.state(), OutputState::Configuring);
}

#[test]
fn setup_failure_returns_to_idle() {
    let script = SimulatedScript {
        reject_setup: Some("no such service".into()),
        ..quick()
    };
    let (c, stats) = controller(script, OutputControllerOpts::default());
    let rx = c.events();

    let err = c.setup_streaming(&ServiceConfig::default()).unwrap_err();
    assert!(matches!(err, StagecastError::Setup(ref m) if m == "no such service"));
    assert_eq!(c.state(), OutputState::Idle);
    assert_eq!(
        next_event(&rx),
        OutputEvent::SetupFailed {
            message: "no such service".into()
        }
    );
    assert_eq!(stats.teardowns(), 1);
}

#[test]
fn incompatible_service_fails_setup_before_the_backend() {
    let (c, stats) = controller(quick(), OutputControllerOpts::default());
    let service = ServiceConfig::rtmp_custom("http://example.com/live", "k");
    assert!(matches!(
        c.setup_streaming(&service),
        Err(StagecastError::Setup(_))
    ));
    assert_eq!(stats.setups(), 0);
    assert_eq!(c.state(), OutputState::Idle);
}

#[test]
fn connect_failure_reports_code_and_returns_to_idle() {
    let script = SimulatedScript {
        fail_connect: Some((StopCode::ConnectFailed.code(), "connection refused".into())),
        ..quick()
    };
    let (c, _) = controller(script, OutputControllerOpts::default());
    let rx = c.events();
    c.setup_streaming(&ServiceConfig::default()).unwrap();
    c.start_streaming().unwrap();

    assert_eq!(
        next_event(&rx),
        OutputEvent::StreamingStopped {
            code: -2,
            message: "connection refused".into()
        }
    );
    assert_eq!(c.state(), OutputState::Idle);
    assert!(!c.streaming_active());
    assert_eq!(c.last_error(), Some((-2, "connection refused".to_owned())));
    assert!(drain(&rx).is_empty());
}

#[test]
fn synchronous_start_error_is_a_start_failure() {
    let script = SimulatedScript {
        refuse_start: Some((StopCode::BadPath.code(), "bad url".into())),
        ..quick()
    };
    let (c, _) = controller(script, OutputControllerOpts::default());
    let rx = c.events();
    c.setup_streaming(&ServiceConfig::default()).unwrap();
    assert_eq!(c.start_streaming().unwrap(), Transition::Applied);
    assert_eq!(c.state(), OutputState::Idle);
    assert_eq!(
        next_event(&rx),
        OutputEvent::StreamingStopped {
            code: -1,
            message: "bad url".into()
        }
    );
}

#[test]
fn force_stop_during_start_delay_never_starts() {
    let opts = OutputControllerOpts {
        start_delay: Duration::from_secs(5),
        ..OutputControllerOpts::default()
    };
    let (c, stats) = controller(quick(), opts);
    let rx = c.events();
    c.setup_streaming(&ServiceConfig::default()).unwrap();
    c.start_streaming().unwrap();
    assert_eq!(c.state(), OutputState::DelayedStart);
    assert!(c.streaming_active());
    assert_eq!(next_event(&rx), OutputEvent::DelayStarting { seconds: 5 });

    assert_eq!(c.stop_streaming(true), Transition::Applied);
    assert_eq!(c.state(), OutputState::Idle);
    assert!(matches!(next_event(&rx), OutputEvent::StreamingStopped { code: 0, .. }));
    assert!(drain(&rx).is_empty());
    assert_eq!(stats.starts(), 0);
}

#[test]
fn start_delay_elapses_into_active() {
    let opts = OutputControllerOpts {
        start_delay: Duration::from_millis(30),
        ..OutputControllerOpts::default()
    };
    let (c, stats) = controller(quick(), opts);
    let rx = c.events();
    c.setup_streaming(&ServiceConfig::default()).unwrap();
    c.start_streaming().unwrap();
    assert_eq!(next_event(&rx), OutputEvent::DelayStarting { seconds: 1 });
    assert_eq!(next_event(&rx), OutputEvent::StreamingStarted);
    assert_eq!(c.state(), OutputState::Active);
    assert_eq!(stats.starts(), 1);
}

#[test]
fn graceful_stop_waits_for_the_stop_delay() {
    let opts = OutputControllerOpts {
        stop_delay: Duration::from_millis(40),
        ..OutputControllerOpts::default()
    };
    let (c, _) = controller(quick(), opts);
    let rx = c.events();
    c.setup_streaming(&ServiceConfig::default()).unwrap();
    c.start_streaming().unwrap();
    assert_eq!(next_event(&rx), OutputEvent::StreamingStarted);

    assert_eq!(c.stop_streaming(false), Transition::Applied);
    assert_eq!(c.state(), OutputState::DelayedStop);
    assert!(c.streaming_active());
    assert_eq!(next_event(&rx), OutputEvent::DelayStopping { seconds: 1 });
    assert_eq!(c.stop_streaming(false), Transition::NoOp);

    assert_eq!(next_event(&rx), OutputEvent::StreamingStopping);
    assert!(matches!(next_event(&rx), OutputEvent::StreamingStopped { code: 0, .. }));
    assert_eq!(c.state(), OutputState::Idle);
}

#[test]
fn force_stop_cuts_the_stop_delay_short() {
    let opts = OutputControllerOpts {
        stop_delay: Duration::from_secs(30),
        ..OutputControllerOpts::default()
    };
    let (c, _) = controller(quick(), opts);
    let rx = c.events();
    c.setup_streaming(&ServiceConfig::default()).unwrap();
    c.start_streaming().unwrap();
    assert_eq!(next_event(&rx), OutputEvent::StreamingStarted);
    c.stop_streaming(false);
    assert_eq!(next_event(&rx), OutputEvent::DelayStopping { seconds: 30 });

    assert_eq!(c.stop_streaming(true), Transition::Applied);
    assert_eq!(next_event(&rx), OutputEvent::StreamingStopping);
    assert!(matches!(next_event(&rx), OutputEvent::StreamingStopped { code: 0, .. }));
    assert_eq!(c.state(), OutputState::Idle);
}

#[test]
fn disconnect_while_active_reports_code() {
    let script = SimulatedScript {
        disconnect_after: Some(Duration::from_millis(20)),
        ..quick()
    };
    let (c, _) = controller(script, OutputControllerOpts::default());
    let rx = c.events();
    c.setup_streaming(&ServiceConfig::default()).unwrap();
    c.start_streaming().unwrap();
    assert_eq!(next_event(&rx), OutputEvent::StreamingStarted);
    assert!(matches!(
        next_event(&rx),
        OutputEvent::StreamingStopped { code: -5, .. }
    ));
    assert_eq!(c.state(), OutputState::Idle);
    assert_eq!(c.last_error().map(|(code, _)| code), Some(-5));
}

#[test]
fn stop_while_starting_cancels_the_connect() {
    let script = SimulatedScript {
        connect_latency: Duration::from_secs(10),
        ..quick()
    };
    let (c, _) = controller(script, OutputControllerOpts::default());
    let rx = c.events();
    c.setup_streaming(&ServiceConfig::default()).unwrap();
    c.start_streaming().unwrap();
    assert_eq!(c.state(), OutputState::Starting);

    assert_eq!(c.stop_streaming(false), Transition::Applied);
    assert_eq!(next_event(&rx), OutputEvent::StreamingStopping);
    assert!(matches!(next_event(&rx), OutputEvent::StreamingStopped { code: 0, .. }));
    assert_eq!(c.state(), OutputState::Idle);
}

#[test]
fn concurrent_starts_start_once() {
    let (c, stats) = controller(quick(), OutputControllerOpts::default());
    let rx = c.events();
    c.setup_streaming(&ServiceConfig::default()).unwrap();

    let applied: usize = std::thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| s.spawn(|| c.start_streaming().unwrap()))
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|t| *t == Transition::Applied)
            .count()
    });
    assert_eq!(applied, 1);
    wait_state(&c, OutputState::Active);
    assert_eq!(drain(&rx), vec![OutputEvent::StreamingStarted]);
    assert_eq!(stats.starts(), 1);
}

#[test]
fn can_restart_after_a_session_ends() {
    let (c, stats) = controller(quick(), OutputControllerOpts::default());
    let rx = c.events();
    for _ in 0..2 {
        c.setup_streaming(&ServiceConfig::default()).unwrap();
        c.start_streaming().unwrap();
        assert_eq!(next_event(&rx), OutputEvent::StreamingStarted);
        c.stop_streaming(true);
        assert_eq!(next_event(&rx), OutputEvent::StreamingStopping);
        assert!(matches!(next_event(&rx), OutputEvent::StreamingStopped { .. }));
    }
    assert_eq!(stats.starts(), 2);
    assert_eq!(stats.teardowns(), 2);
}

#[test]
fn drop_stops_an_active_session() {
    let (c, stats) = controller(quick(), OutputControllerOpts::default());
    let rx = c.events();
    c.setup_streaming(&ServiceConfig::default()).unwrap();
    c.start_streaming().unwrap();
    assert_eq!(next_event(&rx), OutputEvent::StreamingStarted);
    drop(c);
    assert_eq!(stats.stops(), 1);
    assert_eq!(stats.teardowns(), 1);
    assert!(matches!(
        rx.try_iter().last(),
        Some(OutputEvent::StreamingStopped { code: 0, .. })
    ));
}

#[test]
fn whole_seconds_rounds_up() {
    assert_eq!(whole_seconds(Duration::ZERO), 0);
    assert_eq!(whole_seconds(Duration::from_millis(1)), 1);
    assert_eq!(whole_seconds(Duration::from_secs(5)), 5);
    assert_eq!(whole_seconds(Duration::from_millis(5001)), 6);
}
