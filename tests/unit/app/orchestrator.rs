use super::*;
use crate::output::simulated::{SimulatedBackend, SimulatedScript, SimulatedStats};
use std::sync::Mutex;

const WAIT: Duration = Duration::from_secs(5);

fn quick() -> SimulatedScript {
    SimulatedScript {
        connect_latency: Duration::from_millis(5),
        stop_latency: Duration::from_millis(5),
        ..SimulatedScript::default()
    }
}

fn orchestrator(config: AppConfig, script: SimulatedScript) -> (Orchestrator, SimulatedStats) {
    let backend = SimulatedBackend::new(script);
    let stats = backend.stats();
    (Orchestrator::headless(config, Box::new(backend)).unwrap(), stats)
}

#[test]
fn bring_up_binds_the_program_scene() {
    let (o, _) = orchestrator(AppConfig::default(), quick());
    assert_eq!(o.scene().bound_scene().name(), PROGRAM_SCENE);
    assert!(o.scene().bound_scene().is_empty());
    assert_eq!(o.canvas(), Canvas::new(1920, 1080).unwrap());
    assert_eq!(o.engine().video_config(), Some(&AppConfig::default().video));
    assert_eq!(o.output().state(), OutputState::Idle);
}

#[test]
fn bad_video_config_is_a_video_init_error() {
    let mut config = AppConfig::default();
    config.video.base_width = 0;
    let err = Orchestrator::new(
        config,
        Box::new(HeadlessEngine::new()),
        Box::new(BuiltinSourceFactory::new(Canvas::new(16, 16).unwrap())),
        |_, _| Ok(Box::new(SimulatedBackend::default()) as Box<dyn OutputBackend>),
    )
    .unwrap_err();
    assert!(matches!(err, StagecastError::VideoInit(_)));
}

#[test]
fn sources_are_added_visible_at_their_default_scale() {
    let (o, _) = orchestrator(AppConfig::default(), quick());
    let monitor = o.add_monitor_source().unwrap();
    let video = o.add_video_file_source("clips/intro.mp4").unwrap();
    let image = o.add_image_source("logo.png").unwrap();
    let text = o.add_text_source("live show").unwrap();
    let mic = o.add_audio_input_source("mic-0").unwrap();
    let desktop = o.add_audio_output_source("default").unwrap();

    let scene = o.scene().bound_scene();
    assert_eq!(scene.len(), 6);
    for (id, scale) in [
        (monitor, 0.2),
        (video, 0.2),
        (image, 1.0),
        (text, 1.0),
        (mic, 1.0),
        (desktop, 1.0),
    ] {
        let item = scene.find(id).unwrap();
        assert!(item.visible);
        assert_eq!(item.scale, Vec2::new(scale, scale));
    }
    let video_item = scene.find(video).unwrap();
    assert_eq!(video_item.source.name(), "media_source test");
    assert_eq!(
        video_item.source.settings().get_bool("looping"),
        Some(true)
    );
    assert_eq!(scene.items()[0].id, monitor);
}

#[test]
fn camera_without_devices_leaves_the_scene_unchanged() {
    let (o, _) = orchestrator(AppConfig::default(), quick());
    o.add_monitor_source().unwrap();
    let version = o.scene().version();

    let err = o.add_camera_source(None).unwrap_err();
    assert!(matches!(err, StagecastError::SourceCreation(_)));
    assert_eq!(o.scene().version(), version);
    assert_eq!(o.scene().bound_scene().len(), 1);
}

#[test]
fn camera_picks_the_first_enumerated_device() {
    let config = AppConfig::default();
    let canvas = config.video.canvas().unwrap();
    let factory = BuiltinSourceFactory::new(canvas)
        .with_video_devices(["cam-a".to_owned(), "cam-b".to_owned()]);
    let o = Orchestrator::new(
        config,
        Box::new(HeadlessEngine::new()),
        Box::new(factory),
        |_, _| Ok(Box::new(SimulatedBackend::new(quick())) as Box<dyn OutputBackend>),
    )
    .unwrap();

    let id = o.add_camera_source(None).unwrap();
    let scene = o.scene().bound_scene();
    let item = scene.find(id).unwrap();
    assert_eq!(item.source.settings().get_str("video_device_id"), Some("cam-a"));
    assert_eq!(item.scale, Vec2::new(0.2, 0.2));

    assert!(matches!(
        o.add_camera_source(Some("cam-z")),
        Err(StagecastError::SourceCreation(_))
    ));
}

#[test]
fn push_start_stop_relays_status() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink_seen = Arc::clone(&seen);
    let (o, stats) = orchestrator(AppConfig::default(), quick());
    let mut o = o.with_status_sink(Box::new(move |e: &OutputEvent| {
        sink_seen.lock().unwrap().push(e.status_text());
    }));

    assert_eq!(o.start_push().unwrap(), Transition::Applied);
    assert_eq!(o.start_push().unwrap(), Transition::NoOp);
    assert!(o
        .wait_for_event(WAIT, |e| *e == OutputEvent::StreamingStarted)
        .is_some());
    assert_eq!(o.last_status(), Some("stream started"));

    assert_eq!(o.stop_push(), Transition::Applied);
    assert!(o
        .wait_for_event(WAIT, |e| matches!(e, OutputEvent::StreamingStopped { .. }))
        .is_some());
    assert_eq!(o.last_status(), Some("stream stopped: 0, stream stopped"));
    assert_eq!(stats.starts(), 1);

    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            "stream started".to_owned(),
            "stream stopping".to_owned(),
            "stream stopped: 0, stream stopped".to_owned(),
        ]
    );
}

#[test]
fn async_completions_wait_for_the_next_pump() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink_seen = Arc::clone(&seen);
    let (o, _) = orchestrator(AppConfig::default(), quick());
    let mut o = o.with_status_sink(Box::new(move |e: &OutputEvent| {
        sink_seen.lock().unwrap().push(e.status_text());
    }));

    o.start_push().unwrap();
    let before = o.last_status().map(str::to_owned);
    let deadline = Instant::now() + WAIT;
    while o.output().state() != OutputState::Active {
        assert!(Instant::now() < deadline, "stream never came up");
        std::thread::sleep(Duration::from_millis(2));
    }
    // The controller is live, but nothing pulled the event yet.
    assert_eq!(o.last_status().map(str::to_owned), before);
    assert!(seen.lock().unwrap().is_empty());

    assert_eq!(o.pump_events(), vec![OutputEvent::StreamingStarted]);
    assert_eq!(o.last_status(), Some("stream started"));
    assert_eq!(*seen.lock().unwrap(), vec!["stream started".to_owned()]);
    assert!(o.pump_events().is_empty());
}

#[test]
fn failed_setup_surfaces_as_error_and_status() {
    let mut config = AppConfig::default();
    config.service = ServiceConfig::rtmp_custom("ftp://example.com", "k");
    let (mut o, stats) = orchestrator(config, quick());
    assert!(matches!(o.start_push(), Err(StagecastError::Setup(_))));
    assert!(o.last_status().unwrap().starts_with("stream setup failed"));
    assert_eq!(stats.starts(), 0);
    assert_eq!(o.output().state(), OutputState::Idle);
}

#[test]
fn delayed_start_then_force_stop_never_starts() {
    let mut config = AppConfig::default();
    config.output.start_delay_sec = 5.0;
    let (mut o, stats) = orchestrator(config, quick());
    o.start_push().unwrap();
    assert_eq!(o.last_status(), Some("stream start after 5"));
    assert_eq!(o.force_stop_push(), Transition::Applied);
    assert_eq!(o.output().state(), OutputState::Idle);
    assert!(o.last_status().unwrap().starts_with("stream stopped: 0"));
    std::thread::sleep(Duration::from_millis(30));
    assert!(o.pump_events().is_empty());
    assert_eq!(stats.starts(), 0);
}

#[test]
fn shutdown_stops_the_push_and_releases_the_scene() {
    let (mut o, stats) = orchestrator(AppConfig::default(), quick());
    o.add_monitor_source().unwrap();
    o.start_push().unwrap();
    o.wait_for_event(WAIT, |e| *e == OutputEvent::StreamingStarted)
        .unwrap();

    o.shutdown();
    assert_eq!(o.output().state(), OutputState::Idle);
    assert!(o.scene().bound_scene().is_empty());
    assert_eq!(stats.teardowns(), 1);
    // Idempotent.
    o.shutdown();
    assert_eq!(stats.teardowns(), 1);
}

#[test]
fn resize_updates_the_shared_preview() {
    let (o, _) = orchestrator(AppConfig::default(), quick());
    let vp = o.resize_preview(SurfaceSize::new(1940, 1100));
    assert_eq!(vp.placement.scale, 1.0);
    assert_eq!(*o.preview().viewport(), vp);
}
