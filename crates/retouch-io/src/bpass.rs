//! B-pass orchestration.
//!
//! One image moves through a fixed sequence of stages:
//!
//! 1. **Main pass** (required): detector selection, optional manual mask
//!    override, secondary conditioning from the contour guide, one
//!    inpainting request. Any failure aborts this image.
//! 2. **Cheek refinement** (optional, best-effort).
//! 3. **Eyelash refinement** (optional, best-effort).
//!
//! Every stage that succeeds overwrites the single output file. The
//! optional stages are [`Result`]-returning steps; the orchestrator logs
//! and discards their errors and continues with the previous image.

use std::path::{Path, PathBuf};
use std::time::Duration;

use image::imageops::{self, FilterType};
use retouch_pipeline::config::{MaskSource, RefinerConfig};
use retouch_pipeline::landmarks::{cheek_mask, eyelash_mask};
use retouch_pipeline::request::SecondaryConditioning;
use retouch_pipeline::service::{FaceCounter, FaceLandmarks, InpaintService, LandmarkService, ServiceError};
use retouch_pipeline::strategy::{DetectorSelector, Selector};
use retouch_pipeline::types::{Dimensions, GrayImage, Mask, RgbImage};
use retouch_pipeline::{BPassConfig, GeneralConfig, PassRequest, ResolvedDetectors, SamplingParams, VariantSlot};

use crate::workdir::{WorkDir, WorkDirError, load_gray_if_present, save_gray, save_rgb};

/// Why the B-pass failed for an image.
#[derive(Debug, thiserror::Error)]
pub enum BPassError {
    /// A required A-pass artifact is not on disk.
    #[error("missing A-pass artifact {0}")]
    MissingArtifact(PathBuf),

    /// Reading inputs or writing the output failed.
    #[error(transparent)]
    WorkDir(#[from] WorkDirError),

    /// The main inpainting request failed.
    #[error("main pass failed: {0}")]
    MainPass(#[from] ServiceError),
}

/// Why an optional refinement stage produced no image.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    /// Neither landmarks nor a cached file provided a mask.
    #[error("no mask available")]
    NoMask,

    /// The inpainting request failed.
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// Reading the cached mask or writing an artifact failed.
    #[error(transparent)]
    WorkDir(#[from] WorkDirError),
}

/// The two optional refinement stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefinementStage {
    /// Malar region smoothing.
    Cheek,
    /// Upper eyelid and lash definition.
    Eyelash,
}

impl RefinementStage {
    /// Log marker for a saved output.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Cheek => "[CHEEK-REFINER]",
            Self::Eyelash => "[EYELASH-REFINER]",
        }
    }

    fn config(self, b_pass: &BPassConfig) -> &RefinerConfig {
        match self {
            Self::Cheek => &b_pass.cheek_refiner,
            Self::Eyelash => &b_pass.eyelash_refiner,
        }
    }

    fn cached_mask_path(self, workdir: &WorkDir) -> PathBuf {
        match self {
            Self::Cheek => workdir.cheek_mask_path(),
            Self::Eyelash => workdir.eyelash_mask_path(),
        }
    }

    fn landmark_mask(self, dims: Dimensions, landmarks: &FaceLandmarks, config: &RefinerConfig) -> Option<Mask> {
        match self {
            Self::Cheek => cheek_mask(dims, landmarks, config.dilate_px, config.blur_px),
            Self::Eyelash => eyelash_mask(dims, landmarks, config.dilate_px, config.blur_px),
        }
    }
}

/// What happened to an optional stage.
#[derive(Debug)]
pub enum StageOutcome {
    /// The stage is turned off.
    Disabled,
    /// The stage ran and overwrote the output.
    Applied,
    /// The stage failed; the output is unchanged.
    Skipped(StageError),
}

impl StageOutcome {
    /// Whether the stage overwrote the output.
    #[must_use]
    pub const fn is_applied(&self) -> bool {
        matches!(self, Self::Applied)
    }
}

/// Summary of one image's B-pass.
#[derive(Debug)]
pub struct BPassReport {
    /// Final output file.
    pub output: PathBuf,
    /// Detector variants sent with the main pass.
    pub detectors: Vec<VariantSlot>,
    /// Whether a user-supplied mask replaced the face mask.
    pub manual_mask: bool,
    /// Cheek stage result.
    pub cheek: StageOutcome,
    /// Eyelash stage result.
    pub eyelash: StageOutcome,
}

/// External collaborators used by the B-pass.
#[derive(Clone, Copy)]
pub struct Services<'a> {
    /// Inpainting endpoint.
    pub inpaint: &'a dyn InpaintService,
    /// Landmark detector.
    pub landmarks: &'a dyn LandmarkService,
    /// Local face counter for the sequential policy.
    pub faces: &'a dyn FaceCounter,
}

/// The B-pass for one configuration.
pub struct BPass<'a> {
    general: &'a GeneralConfig,
    config: &'a BPassConfig,
    services: Services<'a>,
}

impl<'a> BPass<'a> {
    /// Bind configuration and collaborators.
    #[must_use]
    pub const fn new(general: &'a GeneralConfig, config: &'a BPassConfig, services: Services<'a>) -> Self {
        Self {
            general,
            config,
            services,
        }
    }

    fn sampling(&self) -> SamplingParams {
        SamplingParams::from_config(self.general, self.config)
    }

    const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.general.request_timeout_secs)
    }

    /// Run every stage for the image in `workdir`, writing the result
    /// under `output_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`BPassError`] when A-pass artifacts are missing or
    /// unreadable, the main pass fails, or its output cannot be written.
    /// Optional stage failures are reported in the [`BPassReport`].
    pub fn run(&self, workdir: &WorkDir, output_dir: &Path) -> Result<BPassReport, BPassError> {
        for artifact in [workdir.base_image_path(), workdir.face_mask_path()] {
            if !artifact.is_file() {
                return Err(BPassError::MissingArtifact(artifact));
            }
        }
        let (base, face_mask) = workdir.load_main_inputs()?;
        let guide = workdir.load_contour_guide()?;
        if guide.is_none() && self.config.controlnet.enabled {
            tracing::warn!(
                path = %workdir.contour_guide_path().display(),
                "contour guide missing, conditioning on the base image"
            );
        }

        let detectors = ResolvedDetectors::from_config(&self.config.detectors, self.config.denoise);
        let selected = self.select_detectors(&base, &detectors);
        let slots: Vec<VariantSlot> = selected.iter().map(|v| v.slot).collect();

        let (mask, manual_mask) = if selected.is_empty() && self.config.manual_fallback.enabled {
            self.manual_fallback(workdir, face_mask)
        } else {
            (face_mask, false)
        };

        let request = PassRequest::new(base.clone(), mask, &self.sampling())
            .with_prompts(&self.config.prompt, &self.config.negative)
            .with_detectors(selected)
            .with_conditioning(self.conditioning(&base, guide.as_ref()));
        let output = workdir.output_path(output_dir);
        let mut current = self.main_pass(&request)?;
        save_rgb(&output, &current)?;
        tracing::info!(path = %output.display(), "[B-PASS] saved");

        let mut outcomes = [StageOutcome::Disabled, StageOutcome::Disabled];
        for (stage, outcome) in [RefinementStage::Cheek, RefinementStage::Eyelash]
            .into_iter()
            .zip(outcomes.iter_mut())
        {
            if !stage.config(self.config).enabled {
                continue;
            }
            *outcome = match self.refine(stage, &current, workdir, &output) {
                Ok(refined) => {
                    current = refined;
                    StageOutcome::Applied
                }
                Err(e) => {
                    tracing::warn!(stage = stage.tag(), error = %e, "refinement skipped");
                    StageOutcome::Skipped(e)
                }
            };
        }
        let [cheek, eyelash] = outcomes;

        Ok(BPassReport {
            output,
            detectors: slots,
            manual_mask,
            cheek,
            eyelash,
        })
    }

    /// Detector variants for the main pass under the configured policy.
    #[must_use]
    pub fn select_detectors(
        &self,
        base: &RgbImage,
        detectors: &ResolvedDetectors,
    ) -> Vec<retouch_pipeline::DetectorVariant> {
        let selector = Selector::for_policy(
            self.config.selection,
            self.services.faces,
            self.services.inpaint,
            &self.sampling(),
            &self.config.probe,
            &self.config.sequential,
            Duration::from_secs(self.general.probe_timeout_secs),
        );
        selector.select(base, detectors)
    }

    /// Secondary conditioning from the contour guide, or from the base
    /// image when the guide is missing. `None` when disabled.
    #[must_use]
    pub fn conditioning(&self, base: &RgbImage, guide: Option<&GrayImage>) -> Option<SecondaryConditioning> {
        if !self.config.controlnet.enabled {
            return None;
        }
        let source = guide.map_or_else(
            || base.clone(),
            |g| image::DynamicImage::ImageLuma8(g.clone()).to_rgb8(),
        );
        Some(SecondaryConditioning::new(&self.config.controlnet, source))
    }

    /// Swap in the user mask if one exists and point the user at the
    /// configured UI and help page.
    fn manual_fallback(&self, workdir: &WorkDir, face_mask: Mask) -> (Mask, bool) {
        let fallback = &self.config.manual_fallback;
        let path = workdir.manual_mask_path(&fallback.mask_filename);
        let dims = Dimensions::of(&face_mask);

        let result = match load_gray_if_present(&path) {
            Ok(Some(mask)) => {
                tracing::info!(path = %path.display(), "no detector selected, using manual mask");
                (fit_mask(mask, dims), true)
            }
            Ok(None) => {
                tracing::info!(path = %path.display(), "no detector selected and no manual mask");
                (face_mask, false)
            }
            Err(e) => {
                tracing::warn!(error = %e, "manual mask unreadable, keeping face mask");
                (face_mask, false)
            }
        };

        if fallback.open_ui {
            tracing::info!(url = %self.general.a1111_endpoint, "draw a mask in the inpainting UI");
        }
        if fallback.open_help {
            tracing::info!(path = %fallback.help_path, "manual fallback help");
        }
        result
    }

    fn main_pass(&self, request: &PassRequest) -> Result<RgbImage, ServiceError> {
        tracing::debug!(
            size = %request.size,
            detectors = request.detectors.len(),
            conditioning = request.conditioning.is_some(),
            "main pass"
        );
        first_image(self.services.inpaint.img2img(request, self.request_timeout())?)
    }

    /// Run one refinement stage over `current` and save its output.
    ///
    /// # Errors
    ///
    /// Returns [`StageError`] when no mask is available, the request
    /// fails, or a file cannot be written.
    pub fn refine(
        &self,
        stage: RefinementStage,
        current: &RgbImage,
        workdir: &WorkDir,
        output: &Path,
    ) -> Result<RgbImage, StageError> {
        let config = stage.config(self.config);
        let mask = self.stage_mask(stage, config, current, workdir)?;

        let request = PassRequest::refinement(current.clone(), mask, &self.sampling(), config);
        let refined = first_image(self.services.inpaint.img2img(&request, self.request_timeout())?)?;
        save_rgb(output, &refined)?;
        tracing::info!(path = %output.display(), "{} saved", stage.tag());
        Ok(refined)
    }

    /// Landmark-derived mask (cached to disk before use), else the
    /// cached file.
    fn stage_mask(
        &self,
        stage: RefinementStage,
        config: &RefinerConfig,
        current: &RgbImage,
        workdir: &WorkDir,
    ) -> Result<Mask, StageError> {
        let dims = Dimensions::of(current);
        let cached = stage.cached_mask_path(workdir);

        if config.mask_source == MaskSource::Landmarks {
            let derived = match self.services.landmarks.detect(current) {
                Ok(Some(landmarks)) => stage.landmark_mask(dims, &landmarks, config),
                Ok(None) => {
                    tracing::info!(stage = stage.tag(), "landmark service found no face");
                    None
                }
                Err(e) => {
                    tracing::warn!(stage = stage.tag(), error = %e, "landmark service failed");
                    None
                }
            };
            if let Some(mask) = derived {
                save_gray(&cached, &mask)?;
                return Ok(mask);
            }
        }

        let mask = load_gray_if_present(&cached)?.ok_or(StageError::NoMask)?;
        tracing::debug!(stage = stage.tag(), path = %cached.display(), "using cached mask");
        Ok(fit_mask(mask, dims))
    }
}

/// First generated image, or [`ServiceError::EmptyResult`].
fn first_image(images: Vec<RgbImage>) -> Result<RgbImage, ServiceError> {
    images.into_iter().next().ok_or(ServiceError::EmptyResult)
}

/// Resize `mask` to `dims` if it differs.
fn fit_mask(mask: Mask, dims: Dimensions) -> Mask {
    if Dimensions::of(&mask) == dims {
        mask
    } else {
        imageops::resize(&mask, dims.width, dims.height, FilterType::Triangle)
    }
}
