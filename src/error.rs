//! Top-level error type

use thiserror::Error;

use crate::backend::BackendError;
use crate::render_graph::RenderError;
use crate::resources::WatError;
use crate::scene::SceneError;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),
    #[error("Render error: {0}")]
    Render(#[from] RenderError),
    #[error("Scene error: {0}")]
    Scene(#[from] SceneError),
    #[error("Material error: {0}")]
    Wat(#[from] WatError),
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("Unknown level '{0}'")]
    UnknownLevel(String),
    #[error("Invalid screen size '{0}', expected WIDTHxHEIGHT")]
    InvalidScreenSize(String),
}

pub type EngineResult<T> = Result<T, EngineError>;
