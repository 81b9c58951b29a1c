//! Landmark service clients.
//!
//! The landmark service is optional. [`HttpLandmarkService`] posts the
//! image as base64 PNG to a configured URL and expects
//! `{"faces": [[[x, y], ...], ...]}` with coordinates normalized to
//! `0..=1`; only the first face is used. [`NoLandmarks`] stands in when
//! no endpoint is configured, so refinement stages fall back to cached
//! masks.

use std::time::Duration;

use reqwest::blocking::Client;
use retouch_pipeline::service::{FaceLandmarks, LandmarkService, ServiceError};
use retouch_pipeline::types::RgbImage;
use serde::{Deserialize, Serialize};

use crate::raster::rgb_to_base64;

#[derive(Serialize)]
struct LandmarkRequest {
    image: String,
}

#[derive(Deserialize)]
struct LandmarkResponse {
    #[serde(default)]
    faces: Vec<Vec<(f64, f64)>>,
}

/// Parse a landmark response body into the first face, if any.
///
/// # Errors
///
/// Returns [`ServiceError::Decode`] for malformed JSON.
pub fn parse_landmarks(body: &str) -> Result<Option<FaceLandmarks>, ServiceError> {
    let parsed: LandmarkResponse = serde_json::from_str(body).map_err(|e| ServiceError::Decode(e.to_string()))?;
    Ok(parsed
        .faces
        .into_iter()
        .next()
        .filter(|points| !points.is_empty())
        .map(FaceLandmarks::new))
}

/// Face-mesh landmarks over HTTP.
#[derive(Debug, Clone)]
pub struct HttpLandmarkService {
    http: Client,
    url: String,
    timeout: Duration,
}

impl HttpLandmarkService {
    /// Client posting to `url` with a per-request `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Transport`] if the HTTP client cannot be
    /// constructed.
    pub fn new(url: &str, timeout: Duration) -> Result<Self, ServiceError> {
        let http = Client::builder()
            .build()
            .map_err(|e| ServiceError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            url: url.to_owned(),
            timeout,
        })
    }
}

impl LandmarkService for HttpLandmarkService {
    fn detect(&self, image: &RgbImage) -> Result<Option<FaceLandmarks>, ServiceError> {
        let body = LandmarkRequest {
            image: rgb_to_base64(image).map_err(|e| ServiceError::Transport(e.to_string()))?,
        };
        let response = self
            .http
            .post(&self.url)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    ServiceError::Timeout(self.timeout)
                } else {
                    ServiceError::Unavailable(e.to_string())
                }
            })?;
        let status = response.status();
        let text = response.text().map_err(|e| ServiceError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(ServiceError::http(status.as_u16(), &text));
        }
        parse_landmarks(&text)
    }
}

/// Landmark service that is never available.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLandmarks;

impl LandmarkService for NoLandmarks {
    fn detect(&self, _image: &RgbImage) -> Result<Option<FaceLandmarks>, ServiceError> {
        Err(ServiceError::Unavailable("no landmark endpoint configured".to_owned()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn first_face_is_used() {
        let lm = parse_landmarks(r#"{"faces": [[[0.1, 0.2], [0.3, 0.4]], [[0.9, 0.9]]]}"#)
            .unwrap()
            .unwrap();
        assert_eq!(lm.len(), 2);
        assert_eq!(lm.get(1), Some((0.3, 0.4)));
    }

    #[test]
    fn no_face_is_none() {
        assert!(parse_landmarks(r#"{"faces": []}"#).unwrap().is_none());
        assert!(parse_landmarks("{}").unwrap().is_none());
        assert!(parse_landmarks(r#"{"faces": [[]]}"#).unwrap().is_none());
    }

    #[test]
    fn malformed_body_is_decode_error() {
        assert!(matches!(parse_landmarks("[1, 2"), Err(ServiceError::Decode(_))));
    }

    #[test]
    fn unconfigured_service_is_unavailable() {
        assert!(matches!(
            NoLandmarks.detect(&RgbImage::new(1, 1)),
            Err(ServiceError::Unavailable(_))
        ));
    }
}
