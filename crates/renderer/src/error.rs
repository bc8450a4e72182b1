//! Renderer error type.

use thiserror::Error;
use vkpresent_rhi::RhiError;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error(transparent)]
    Rhi(#[from] RhiError),

    /// Window, surface or configuration failure.
    #[error(transparent)]
    Platform(#[from] vkpresent_core::Error),

    /// The context was used after `cleanup`.
    #[error("render context is not initialized")]
    NotInitialized,
}

pub type RenderResult<T> = std::result::Result<T, RenderError>;
