//! Decode/transform capabilities for raster images and PDF documents.
//!
//! Codec calls are CPU-bound and synchronous; callers run them on the
//! blocking thread pool.

use thiserror::Error;

pub mod image_codec;
pub mod pdf_codec;

#[derive(Debug, Error)]
pub enum CodecError {
    /// The bytes are not recognised as the expected format.
    #[error("unrecognized input: {0}")]
    Unrecognized(String),

    /// The codec failed while processing otherwise valid input.
    #[error("{0}")]
    Internal(String),

    /// A page consumer refused a page; rendering stopped early.
    #[error("rendering stopped by page consumer")]
    Stopped,
}

pub type CodecResult<T> = Result<T, CodecError>;
