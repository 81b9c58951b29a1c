//! Collaborator interfaces.
//!
//! The pipeline never talks to the network or the filesystem. It asks
//! these traits instead; `retouch-io` provides the real implementations
//! and tests provide in-memory fakes.

use std::time::Duration;

use crate::request::PassRequest;
use crate::types::{GrayImage, RgbImage};

/// Longest response body kept in [`ServiceError::Http`].
pub const MAX_ERROR_BODY: usize = 1000;

/// Failure of an external service call.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The service answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Http {
        /// Status code.
        status: u16,
        /// Response body, truncated.
        body: String,
    },

    /// The service answered successfully but returned no images.
    #[error("service returned no images")]
    EmptyResult,

    /// The call did not complete within its timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The request could not be sent or the response not read.
    #[error("transport error: {0}")]
    Transport(String),

    /// The response could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// The service is not configured or not reachable.
    #[error("service unavailable: {0}")]
    Unavailable(String),
}

impl ServiceError {
    /// HTTP error with the body truncated to [`MAX_ERROR_BODY`] characters.
    #[must_use]
    pub fn http(status: u16, body: &str) -> Self {
        Self::Http {
            status,
            body: body.chars().take(MAX_ERROR_BODY).collect(),
        }
    }
}

/// Facial landmarks in normalized image coordinates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FaceLandmarks {
    points: Vec<(f64, f64)>,
}

impl FaceLandmarks {
    /// Wrap a landmark list; index `i` is face-mesh landmark `i`.
    #[must_use]
    pub const fn new(points: Vec<(f64, f64)>) -> Self {
        Self { points }
    }

    /// Landmark at `index`, if the mesh has that many points.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<(f64, f64)> {
        self.points.get(index).copied()
    }

    /// Number of landmarks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether there are no landmarks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Image-to-image inpainting endpoint.
pub trait InpaintService {
    /// Submit one request and wait for up to `timeout`.
    ///
    /// # Errors
    ///
    /// Returns a [`ServiceError`] when the call fails or yields nothing.
    fn img2img(&self, request: &PassRequest, timeout: Duration) -> Result<Vec<RgbImage>, ServiceError>;
}

/// Facial landmark detector.
pub trait LandmarkService {
    /// Landmarks of the first face, or `None` if no face was found.
    ///
    /// # Errors
    ///
    /// Returns a [`ServiceError`] when the service cannot be reached.
    fn detect(&self, image: &RgbImage) -> Result<Option<FaceLandmarks>, ServiceError>;
}

/// Cheap local face-presence check.
pub trait FaceCounter {
    /// Number of faces found in a grayscale image.
    fn count_faces(&self, image: &GrayImage) -> usize;
}

impl<T: InpaintService + ?Sized> InpaintService for &T {
    fn img2img(&self, request: &PassRequest, timeout: Duration) -> Result<Vec<RgbImage>, ServiceError> {
        (**self).img2img(request, timeout)
    }
}

impl<T: LandmarkService + ?Sized> LandmarkService for &T {
    fn detect(&self, image: &RgbImage) -> Result<Option<FaceLandmarks>, ServiceError> {
        (**self).detect(image)
    }
}

impl<T: FaceCounter + ?Sized> FaceCounter for &T {
    fn count_faces(&self, image: &GrayImage) -> usize {
        (**self).count_faces(image)
    }
}
