use super::*;

#[test]
fn log_sink_keeps_the_last_line() {
    let mut sink = LogStatusSink::new();
    assert_eq!(sink.last_status(), None);
    sink.on_event(&OutputEvent::DelayStarting { seconds: 3 });
    assert_eq!(sink.last_status(), Some("stream start after 3"));
    sink.on_event(&OutputEvent::StreamingStopped {
        code: -5,
        message: "disconnected".into(),
    });
    assert_eq!(sink.last_status(), Some("stream stopped: -5, disconnected"));
}

#[test]
fn closures_are_sinks() {
    let mut seen = Vec::new();
    {
        let mut sink = |e: &OutputEvent| seen.push(e.clone());
        sink.on_event(&OutputEvent::StreamingStarted);
        sink.on_event(&OutputEvent::StreamingStopping);
    }
    assert_eq!(
        seen,
        vec![OutputEvent::StreamingStarted, OutputEvent::StreamingStopping]
    );
}
