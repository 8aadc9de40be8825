//! # Recognizer Interface
//!
//! The pipeline never performs character recognition itself. It hands each
//! tile to an external recognition service through the [`Recognizer`] trait
//! and only relies on the contract that a call may return text, return empty
//! text, or fail with one of the error codes below.
//!
//! Implementations live in the host application (an HTTP client for a vision
//! API, a local engine binding, a test double). The pipeline treats the call
//! as opaque.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use crate::document_class::DocumentClass;

/// Boxed future returned by [`Recognizer::recognize`].
pub type RecognizeFuture<'a> =
    Pin<Box<dyn Future<Output = Result<String, RecognizerError>> + Send + 'a>>;

/// External character-recognition service consumed per tile.
///
/// A call receives the tile encoded as PNG bytes together with the document
/// class (some services tune their models per content type). Empty returned
/// text is a valid success: it means the tile contained no readable text.
pub trait Recognizer: Send + Sync + 'static {
    /// Recognize the text contained in one tile image.
    fn recognize<'a>(&'a self, tile_png: &'a [u8], class: DocumentClass) -> RecognizeFuture<'a>;
}

/// Error codes a recognition call may fail with.
///
/// The set mirrors the remote service contract: the pipeline retries the
/// transient codes, re-encodes the tile smaller on `PayloadTooLarge`, and
/// gives up immediately on the configuration codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecognizerError {
    /// The API key was rejected. Not retryable.
    InvalidKey,
    /// The account quota is exhausted. Not retryable.
    QuotaExceeded,
    /// The encoded tile exceeded the service payload limit. Retryable with a
    /// smaller re-encoding of the same tile.
    PayloadTooLarge,
    /// The service asked the client to slow down.
    RateLimited,
    /// The service failed internally.
    ServerError,
    /// The call timed out.
    Timeout,
    /// The call never reached the service.
    NetworkError,
}

impl RecognizerError {
    /// Whether another attempt on the same tile can reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            RecognizerError::InvalidKey | RecognizerError::QuotaExceeded => false,
            RecognizerError::PayloadTooLarge
            | RecognizerError::RateLimited
            | RecognizerError::ServerError
            | RecognizerError::Timeout
            | RecognizerError::NetworkError => true,
        }
    }

    /// Specificity rank used to pick the code reported when reconstruction
    /// yields nothing. Lower is more specific: a rejected key explains the
    /// failure better than a generic server error ever could.
    pub fn specificity_rank(&self) -> u8 {
        match self {
            RecognizerError::InvalidKey => 0,
            RecognizerError::QuotaExceeded => 1,
            RecognizerError::PayloadTooLarge => 2,
            RecognizerError::RateLimited => 3,
            RecognizerError::Timeout => 4,
            RecognizerError::NetworkError => 5,
            RecognizerError::ServerError => 6,
        }
    }

    /// A user-actionable description of the failure, used when the whole
    /// request produced no text.
    pub fn user_guidance(&self) -> &'static str {
        match self {
            RecognizerError::InvalidKey => {
                "The recognition service rejected the API key. Check the configured credentials."
            }
            RecognizerError::QuotaExceeded => {
                "The recognition quota is exhausted. Wait for the quota to reset or upgrade the plan."
            }
            RecognizerError::PayloadTooLarge => {
                "The photo is too large for the recognition service even after downscaling. Try a smaller photo."
            }
            RecognizerError::RateLimited => {
                "The recognition service is rate limiting requests. Wait a moment and try again."
            }
            RecognizerError::Timeout => {
                "Recognition timed out. Check the connection and try again."
            }
            RecognizerError::NetworkError => {
                "The recognition service could not be reached. Check the network connection."
            }
            RecognizerError::ServerError => {
                "The recognition service failed. Try again in a few minutes."
            }
        }
    }
}

impl fmt::Display for RecognizerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            RecognizerError::InvalidKey => "invalid-key",
            RecognizerError::QuotaExceeded => "quota-exceeded",
            RecognizerError::PayloadTooLarge => "payload-too-large",
            RecognizerError::RateLimited => "rate-limited",
            RecognizerError::ServerError => "server-error",
            RecognizerError::Timeout => "timeout",
            RecognizerError::NetworkError => "network-error",
        };
        write!(f, "{}", code)
    }
}

impl std::error::Error for RecognizerError {}
