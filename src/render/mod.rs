pub(crate) mod graphics;
pub(crate) mod preview;
pub(crate) mod raster;
pub(crate) mod render_loop;
