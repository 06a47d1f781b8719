use super::*;

#[test]
fn defaults_match_the_bring_up_profile() {
    let v = VideoConfig::default();
    assert_eq!((v.base_width, v.base_height), (1920, 1080));
    assert_eq!((v.output_width, v.output_height), (1280, 720));
    assert_eq!(v.output_format, PixelFormat::Nv12);
    assert_eq!(v.colorspace, ColorSpace::Bt709);
    assert_eq!(v.range, ColorRange::Partial);
    assert!(v.validate().is_ok());
    assert_eq!(AudioConfig::default().samples_per_sec, 48_000);
    assert_eq!(AudioConfig::default().speakers.channels(), 2);
}

#[test]
fn validation_catches_bad_values() {
    let bad_base = VideoConfig {
        base_width: 0,
        ..VideoConfig::default()
    };
    assert!(matches!(
        bad_base.validate(),
        Err(StagecastError::VideoInit(_))
    ));

    let odd = VideoConfig {
        output_width: 1281,
        ..VideoConfig::default()
    };
    assert!(odd.validate().is_err());
    let odd_rgba = VideoConfig {
        output_width: 1281,
        output_format: PixelFormat::Rgba,
        ..VideoConfig::default()
    };
    assert!(odd_rgba.validate().is_ok());

    let no_fps = VideoConfig {
        fps_den: 0,
        ..VideoConfig::default()
    };
    assert!(no_fps.validate().is_err());
}

#[test]
fn partial_json_fills_defaults() {
    let v: VideoConfig =
        serde_json::from_str(r#"{ "base_width": 1280, "base_height": 720, "graphics": "d3d11" }"#)
            .unwrap();
    assert_eq!(v.base_width, 1280);
    assert_eq!(v.output_width, 1280);
    assert_eq!(v.graphics, GraphicsBackend::D3d11);
    assert_eq!(v.frame_interval(), std::time::Duration::from_secs_f64(1.0 / 30.0));
}
