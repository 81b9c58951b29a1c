//! Local cascade face counter backed by `rustface` (SeetaFace).

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use retouch_pipeline::service::FaceCounter;
use retouch_pipeline::types::GrayImage;

/// Smallest face, in pixels, the cascade looks for.
const MIN_FACE_SIZE: u32 = 20;

/// SeetaFace funnel cascade. Without a loadable model it counts zero
/// faces everywhere.
pub struct CascadeFaceCounter {
    model: Option<rustface::Model>,
}

impl CascadeFaceCounter {
    /// Load the cascade model from `path`.
    ///
    /// A missing or unreadable model is logged and yields a counter that
    /// always reports zero faces.
    #[must_use]
    pub fn load(path: &Path) -> Self {
        let model = File::open(path)
            .and_then(|f| rustface::read_model(BufReader::new(f)))
            .map_err(|e| {
                tracing::warn!(path = %path.display(), error = %e, "face detector model unavailable, counting zero faces");
            })
            .ok();
        Self { model }
    }

    /// Whether a model was loaded.
    #[must_use]
    pub const fn is_loaded(&self) -> bool {
        self.model.is_some()
    }
}

impl FaceCounter for CascadeFaceCounter {
    fn count_faces(&self, image: &GrayImage) -> usize {
        let Some(model) = &self.model else {
            return 0;
        };
        let mut detector = rustface::create_detector_with_model(model.clone());
        detector.set_min_face_size(MIN_FACE_SIZE);
        detector.set_score_thresh(2.0);
        detector.set_pyramid_scale_factor(0.8);
        detector.set_slide_window_step(4, 4);
        detector
            .detect(&rustface::ImageData::new(image.as_raw(), image.width(), image.height()))
            .len()
    }
}
