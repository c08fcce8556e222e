//! CLI command implementations.

pub(crate) mod build;
pub(crate) mod new;
pub(crate) mod render;
pub(crate) mod serve;

pub(crate) use build::BuildArgs;
pub(crate) use new::NewArgs;
pub(crate) use render::RenderArgs;
pub(crate) use serve::ServeArgs;
