use super::*;
use crate::foundation::core::Point;

#[test]
fn clear_and_fill_with_identity_projection() {
    let mut s = RasterSurface::new(8, 4).unwrap();
    s.clear([10, 20, 30, 255]);
    s.fill_rect(Rect::new(2.0, 1.0, 4.0, 3.0), [255, 255, 255, 255]);
    assert_eq!(s.pixel(2, 1), Some([255, 255, 255, 255]));
    assert_eq!(s.pixel(3, 2), Some([255, 255, 255, 255]));
    assert_eq!(s.pixel(4, 2), Some([10, 20, 30, 255]));
    assert_eq!(s.pixel(1, 1), Some([10, 20, 30, 255]));
    assert_eq!(s.pixel(8, 0), None);
}

#[test]
fn projection_maps_into_viewport_and_clips() {
    let mut s = RasterSurface::new(20, 20).unwrap();
    s.ortho(0.0, 100.0, 0.0, 100.0);
    s.set_viewport(10, 10, 10, 10);
    // Full projection space lands in the bottom-right quadrant only.
    s.fill_rect(Rect::new(-50.0, -50.0, 200.0, 200.0), [0, 255, 0, 255]);
    assert_eq!(s.pixel(9, 9), Some([0, 0, 0, 0]));
    assert_eq!(s.pixel(10, 10), Some([0, 255, 0, 255]));
    assert_eq!(s.pixel(19, 19), Some([0, 255, 0, 255]));

    let a = s.transform() * Point::new(50.0, 50.0);
    assert_eq!(a, Point::new(15.0, 15.0));
}

#[test]
fn push_pop_restores_state() {
    let mut s = RasterSurface::new(10, 10).unwrap();
    let before = s.transform();
    s.push_viewport();
    s.push_projection();
    assert_eq!(s.stack_depth(), (1, 1));
    s.ortho(-5.0, 5.0, -5.0, 5.0);
    s.set_viewport(2, 2, 3, 3);
    s.pop_projection();
    s.pop_viewport();
    assert_eq!(s.stack_depth(), (0, 0));
    assert_eq!(s.transform(), before);

    // Unbalanced pops are ignored.
    s.pop_viewport();
    s.pop_projection();
    assert_eq!(s.transform(), before);
}

#[test]
fn translucent_fill_blends_over() {
    let mut s = RasterSurface::new(1, 1).unwrap();
    s.clear([0, 0, 0, 255]);
    s.fill_rect(Rect::new(0.0, 0.0, 1.0, 1.0), [255, 0, 0, 128]);
    assert_eq!(s.pixel(0, 0), Some([128, 0, 0, 255]));
}

#[test]
fn rasterize_scales_canvas_to_output() {
    use crate::foundation::core::Vec2;
    use crate::scene::graph::SceneGraph;
    use crate::scene::source::{BuiltinSourceFactory, SourceFactory, SourceSettings};

    let canvas = Canvas::new(200, 100).unwrap();
    let graph = SceneGraph::new("test scene");
    let src = BuiltinSourceFactory::new(canvas)
        .create_source("monitor_capture", "m", SourceSettings::new())
        .unwrap();
    graph.add_source(src, Vec2::new(0.5, 0.5), true).unwrap();

    let frame = rasterize_scene(&graph.bound_scene(), canvas, 20, 10, [0, 0, 0, 255]).unwrap();
    assert_eq!((frame.width, frame.height), (20, 10));
    assert_eq!(frame.data.len(), 20 * 10 * 4);
    assert_ne!(frame.pixel(0, 0), Some([0, 0, 0, 255]));
    assert_eq!(frame.pixel(10, 5), Some([0, 0, 0, 255]));
}

#[test]
fn write_png_creates_parent_dirs() {
    let dir = std::path::PathBuf::from("target").join("raster_png");
    let _ = std::fs::remove_dir_all(&dir);
    let path = dir.join("nested").join("frame.png");
    let mut s = RasterSurface::new(4, 4).unwrap();
    s.clear([1, 2, 3, 255]);
    s.to_frame().write_png(&path).unwrap();
    assert!(path.is_file());
}
