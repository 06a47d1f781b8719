pub(crate) mod backend;
pub(crate) mod controller;
pub(crate) mod events;
pub(crate) mod ffmpeg;
pub(crate) mod mode;
pub(crate) mod service;
pub(crate) mod simulated;
pub(crate) mod state;
