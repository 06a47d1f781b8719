pub(crate) mod graph;
pub(crate) mod item;
pub(crate) mod source;
