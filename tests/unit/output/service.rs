use super::*;

const CUSTOM_DOC: &str = r#"{
    "settings": {
        "bwtest": false,
        "key": "stream",
        "server": "rtmp://127.0.0.1:1935/live/",
        "use_auth": false
    },
    "type": "rtmp_custom"
}"#;

#[test]
fn parses_custom_service_document() {
    let svc = ServiceConfig::from_json_str(CUSTOM_DOC).unwrap();
    assert_eq!(svc.kind(), "rtmp_custom");
    assert_eq!(svc.server(), Some("rtmp://127.0.0.1:1935/live/"));
    assert_eq!(svc.key(), Some("stream"));
    assert!(!svc.use_auth());
    assert!(!svc.bwtest());
    assert_eq!(svc.protocol(), Some("rtmp"));
    assert_eq!(
        svc.publish_url().as_deref(),
        Some("rtmp://127.0.0.1:1935/live/stream")
    );
    svc.validate().unwrap();
    assert_eq!(svc, ServiceConfig::default());
}

#[test]
fn missing_type_defaults_to_common_provider() {
    let svc = ServiceConfig::from_json_str(
        r#"{ "settings": { "server": "rtmp://live.example.com/app", "service": "Example" } }"#,
    )
    .unwrap();
    assert_eq!(svc.kind(), DEFAULT_SERVICE_TYPE);
    assert_eq!(svc.service_name(), Some("Example"));
    svc.validate().unwrap();
}

#[test]
fn hotkeys_are_preserved() {
    let svc = ServiceConfig::from_json_str(
        r#"{ "type": "rtmp_custom", "settings": { "server": "rtmp://h/app" }, "hotkeys": { "start": [] } }"#,
    )
    .unwrap();
    assert!(svc.hotkeys().contains_key("start"));
    let back: ServiceConfig =
        serde_json::from_str(&serde_json::to_string(&svc).unwrap()).unwrap();
    assert_eq!(back, svc);
}

#[test]
fn validation_reports_setup_errors() {
    let no_server = ServiceConfig::new(RTMP_CUSTOM, Map::new());
    assert!(matches!(no_server.validate(), Err(StagecastError::Setup(_))));

    let bad_scheme = ServiceConfig::rtmp_custom("srt://host:9000", "k");
    assert!(bad_scheme.validate().unwrap_err().to_string().contains("srt"));

    let not_url = ServiceConfig::rtmp_custom("localhost", "k");
    assert!(not_url.validate().is_err());

    let common_without_provider =
        ServiceConfig::from_json_str(r#"{ "settings": { "server": "rtmp://a/b" } }"#).unwrap();
    assert!(common_without_provider.validate().is_err());

    let unknown = ServiceConfig::new("whip_custom", Map::new());
    assert!(unknown.validate().unwrap_err().to_string().contains("whip_custom"));

    let mut auth = ServiceConfig::rtmp_custom("rtmps://a/b", "k");
    auth.settings.insert("use_auth".into(), Value::Bool(true));
    assert!(auth.validate().is_err());
    auth.settings.insert("username".into(), Value::String("me".into()));
    auth.validate().unwrap();
}

#[test]
fn publish_url_without_key_is_the_server() {
    let svc = ServiceConfig::rtmp_custom("rtmp://a/live", "");
    assert_eq!(svc.publish_url().as_deref(), Some("rtmp://a/live"));
}

#[test]
fn malformed_json_is_a_serde_error() {
    assert!(matches!(
        ServiceConfig::from_json_str("{ nope"),
        Err(StagecastError::Serde(_))
    ));
}
