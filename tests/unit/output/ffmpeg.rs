use super::*;
use crate::output::backend::ControlMsg;
use crate::output::controller::{OutputController, OutputControllerOpts, Transition};
use crate::output::events::OutputEvent;
use crate::output::mode::OutputMode;
use crate::output::state::OutputState;
use crate::video::config::{AudioConfig, VideoConfig};

fn pairing() -> EncoderPairing {
    OutputMode::default()
        .resolve(
            &VideoConfig::default(),
            &AudioConfig::default(),
            &ServiceConfig::default(),
        )
        .unwrap()
}

fn backend(program: &str) -> FfmpegPushBackend {
    FfmpegPushBackend::new(
        FfmpegPushOpts {
            ffmpeg: PathBuf::from(program),
            connect_grace: Duration::from_millis(50),
            ..FfmpegPushOpts::default()
        },
        SceneGraph::new("test scene"),
        Canvas::new(1920, 1080).unwrap(),
    )
}

#[test]
fn args_describe_an_flv_push() {
    let args = ffmpeg_args(&pairing()).unwrap();
    let joined = args.join(" ");
    assert!(joined.contains("-f rawvideo -pix_fmt rgba -s 1280x720 -r 30/1 -i pipe:0"));
    assert!(joined.contains("anullsrc=channel_layout=stereo:sample_rate=48000"));
    assert!(joined.contains("-c:v libx264 -preset veryfast -b:v 2500k -g 60"));
    assert!(joined.contains("-c:a aac -b:a 160k"));
    assert_eq!(
        args[args.len() - 3..],
        ["-f", "flv", "rtmp://127.0.0.1:1935/live/stream"]
    );
}

#[test]
fn hardware_encoders_map_to_ffmpeg_codecs() {
    assert_eq!(video_codec("nvenc_h264").unwrap(), "h264_nvenc");
    assert_eq!(video_codec("qsv_h264").unwrap(), "h264_qsv");
    assert!(matches!(video_codec("vp9"), Err(StagecastError::Setup(_))));
}

#[test]
fn flatten_blends_translucent_pixels_over_background() {
    let mut data = vec![128u8, 0, 0, 128, 0, 0, 0, 0, 10, 20, 30, 255];
    flatten_premul_over_bg(&mut data, [0, 0, 255, 255]);
    assert_eq!(data, vec![128, 0, 127, 255, 0, 0, 255, 255, 10, 20, 30, 255]);
}

#[test]
fn setup_requires_a_runnable_ffmpeg() {
    let mut b = backend("/nonexistent/stagecast-ffmpeg");
    let err = b.setup(&ServiceConfig::default(), &pairing()).unwrap_err();
    assert!(matches!(err, StagecastError::Setup(_)));
}

#[test]
fn start_without_setup_is_a_start_error() {
    let mut b = backend("ffmpeg");
    let (tx, _rx) = unbounded();
    let err = b.start(OutputSignals::new(tx, 1)).unwrap_err();
    assert!(matches!(err, StagecastError::StreamStart { .. }));
}

#[cfg(unix)]
#[test]
fn child_exiting_before_grace_is_a_connect_failure() {
    let mut b = backend("true");
    b.pairing = Some(pairing());
    let (tx, rx) = unbounded();
    b.start(OutputSignals::new(tx, 3)).unwrap();
    match rx.recv_timeout(Duration::from_secs(10)).unwrap() {
        ControlMsg::StartFailed { session, code, .. } => {
            assert_eq!(session, 3);
            assert_eq!(code, StopCode::ConnectFailed.code());
        }
        other => panic!("unexpected {other:?}"),
    }
    b.teardown();
}

/// Stand-in `ffmpeg` that answers `-version` and otherwise hangs without reading stdin, the way
/// a real one does while stuck connecting.
#[cfg(unix)]
fn stalled_ffmpeg(name: &str) -> String {
    use std::os::unix::fs::PermissionsExt;

    let dir = PathBuf::from("target").join("ffmpeg_unit");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    std::fs::write(
        &path,
        "#!/bin/sh\n[ \"$1\" = \"-version\" ] && exit 0\nexec sleep 8\n",
    )
    .unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    // A fork on another test thread can keep the fresh file busy for a moment.
    let deadline = Instant::now() + Duration::from_secs(5);
    while !ffmpeg_runs(&path) {
        assert!(Instant::now() < deadline, "{} never became runnable", path.display());
        std::thread::sleep(Duration::from_millis(20));
    }
    path.to_string_lossy().into_owned()
}

#[cfg(unix)]
#[test]
fn forced_stop_kills_an_ffmpeg_that_is_not_reading() {
    let mut b = backend(&stalled_ffmpeg("stalled-backend.sh"));
    b.opts.connect_grace = Duration::from_secs(5);
    b.setup(&ServiceConfig::default(), &pairing()).unwrap();
    let (tx, rx) = unbounded();
    b.start(OutputSignals::new(tx, 7)).unwrap();
    // One 1280x720 frame is far larger than the pipe buffer, so the feeder is now blocked.
    std::thread::sleep(Duration::from_millis(300));
    assert!(rx.try_recv().is_err());

    let asked = Instant::now();
    b.stop(true);
    match rx.recv_timeout(Duration::from_secs(2)).unwrap() {
        ControlMsg::Stopped {
            session,
            code,
            message,
        } => {
            assert_eq!(session, 7);
            assert_eq!(code, StopCode::Success.code());
            assert_eq!(message, "connect cancelled");
        }
        other => panic!("unexpected {other:?}"),
    }
    b.teardown();
    assert!(asked.elapsed() < Duration::from_secs(2));
}

#[cfg(unix)]
#[test]
fn forced_stop_cuts_a_stalled_graceful_stop_short() {
    let mut b = backend(&stalled_ffmpeg("stalled-controller.sh"));
    b.opts.connect_grace = Duration::from_secs(5);
    let c = OutputController::new(Box::new(b), OutputControllerOpts::default()).unwrap();
    let events = c.events();

    c.setup_streaming(&ServiceConfig::default()).unwrap();
    c.start_streaming().unwrap();
    std::thread::sleep(Duration::from_millis(300));
    assert_eq!(c.state(), OutputState::Starting);

    // ffmpeg never drains its input, so the graceful stop cannot complete on its own.
    assert_eq!(c.stop_streaming(false), Transition::Applied);
    std::thread::sleep(Duration::from_millis(200));
    assert_eq!(c.state(), OutputState::Stopping);

    let asked = Instant::now();
    assert_eq!(c.stop_streaming(true), Transition::Applied);
    let (code, message) = loop {
        if let OutputEvent::StreamingStopped { code, message } =
            events.recv_timeout(Duration::from_secs(2)).unwrap()
        {
            break (code, message);
        }
    };
    assert!(asked.elapsed() < Duration::from_secs(2));
    assert_eq!(code, StopCode::Success.code(), "{message}");

    let deadline = Instant::now() + Duration::from_secs(2);
    while c.state() != OutputState::Idle {
        assert!(Instant::now() < deadline, "state stuck at {}", c.state());
        std::thread::sleep(Duration::from_millis(2));
    }
    assert_eq!(c.last_error(), None);
}

#[test]
fn pushes_to_a_local_server_when_ffmpeg_is_available() {
    if !is_ffmpeg_on_path() {
        eprintln!("skipping: ffmpeg not on PATH");
        return;
    }
    // Nothing listens on the port, so ffmpeg must fail to connect.
    let mut b = FfmpegPushBackend::new(
        FfmpegPushOpts {
            connect_grace: Duration::from_secs(20),
            ..FfmpegPushOpts::default()
        },
        SceneGraph::new("test scene"),
        Canvas::new(1920, 1080).unwrap(),
    );
    let service = ServiceConfig::rtmp_custom("rtmp://127.0.0.1:9/live/", "stream");
    let pairing = OutputMode::default()
        .resolve(&VideoConfig::default(), &AudioConfig::default(), &service)
        .unwrap();
    b.setup(&service, &pairing).unwrap();
    let (tx, rx) = unbounded();
    b.start(OutputSignals::new(tx, 1)).unwrap();
    let msg = rx.recv_timeout(Duration::from_secs(30)).unwrap();
    assert!(matches!(msg, ControlMsg::StartFailed { .. }), "{msg:?}");
    b.teardown();
}
