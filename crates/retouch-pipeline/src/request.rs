//! Inpainting request model.
//!
//! [`PassRequest`] is the wire-independent description of one call to
//! the inpainting service. The HTTP client in `retouch-io` turns it into
//! a JSON payload.

use crate::config::{BPassConfig, ControlNetConfig, GeneralConfig, RefinerConfig};
use crate::detector::DetectorVariant;
use crate::sizing::target_dimensions;
use crate::types::{Dimensions, Mask, RgbImage};

/// Upper bound on sampling steps for any request.
pub const MAX_STEPS: u32 = 16;

/// Sampler settings shared by every request of one B-pass.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingParams {
    /// Denoising strength in `0..=1`.
    pub denoise: f64,
    /// Guidance scale.
    pub cfg_scale: f64,
    /// Sampling steps, capped at [`MAX_STEPS`] when building a request.
    pub steps: u32,
    /// Sampler name.
    pub sampler: String,
    /// Inpainting mask blur in pixels.
    pub mask_blur: u32,
    /// Optional checkpoint override.
    pub checkpoint: Option<String>,
}

impl SamplingParams {
    /// Main pass sampling from the configuration.
    #[must_use]
    pub fn from_config(general: &GeneralConfig, b_pass: &BPassConfig) -> Self {
        Self {
            denoise: b_pass.denoise,
            cfg_scale: b_pass.cfg,
            steps: b_pass.steps,
            sampler: b_pass.sampler.clone(),
            mask_blur: b_pass.mask_blur_px,
            checkpoint: general.model_checkpoint.clone(),
        }
    }

    /// Same sampler with a different denoising strength.
    #[must_use]
    pub fn with_denoise(&self, denoise: f64) -> Self {
        Self {
            denoise,
            ..self.clone()
        }
    }

    /// Same sampler with a different step count.
    #[must_use]
    pub fn with_steps(&self, steps: u32) -> Self {
        Self {
            steps,
            ..self.clone()
        }
    }
}

/// Priority between the prompt and the conditioning signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ControlMode {
    /// Neither dominates.
    #[default]
    Balanced,
    /// The prompt dominates.
    PromptMoreImportant,
    /// The conditioning signal dominates.
    ControlMoreImportant,
}

impl ControlMode {
    /// Map a configured index; unknown values become [`Self::Balanced`].
    #[must_use]
    pub const fn from_index(index: i64) -> Self {
        match index {
            1 => Self::PromptMoreImportant,
            2 => Self::ControlMoreImportant,
            _ => Self::Balanced,
        }
    }

    /// Label the inpainting service expects.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Balanced => "Balanced",
            Self::PromptMoreImportant => "My prompt is more important",
            Self::ControlMoreImportant => "ControlNet is more important",
        }
    }
}

/// Auxiliary guidance attached to the main pass.
#[derive(Debug, Clone, PartialEq)]
pub struct SecondaryConditioning {
    /// Preprocessor module.
    pub module: String,
    /// Conditioning model.
    pub model: String,
    /// Weight, clamped to `0..=2`.
    pub weight: f64,
    /// Conditioning source; the contour guide or the base image.
    pub source: RgbImage,
    /// Start of guidance as a fraction of sampling.
    pub guidance_start: f64,
    /// End of guidance as a fraction of sampling.
    pub guidance_end: f64,
    /// Control priority.
    pub mode: ControlMode,
}

impl SecondaryConditioning {
    /// Build from configuration and a source image.
    ///
    /// Weight is clamped to `0..=2` and the guidance window to `0..=1`
    /// with the start kept at or below the end.
    #[must_use]
    pub fn new(config: &ControlNetConfig, source: RgbImage) -> Self {
        let end = config.guidance_end.clamp(0.0, 1.0);
        let start = config.guidance_start.clamp(0.0, end);
        Self {
            module: config.module.clone(),
            model: config.model.clone(),
            weight: config.weight.clamp(0.0, 2.0),
            source,
            guidance_start: start,
            guidance_end: end,
            mode: ControlMode::from_index(config.mode),
        }
    }
}

/// One call to the inpainting service.
#[derive(Debug, Clone, PartialEq)]
pub struct PassRequest {
    /// Image to inpaint.
    pub init_image: RgbImage,
    /// Where to inpaint.
    pub mask: Mask,
    /// Prompt.
    pub prompt: String,
    /// Negative prompt.
    pub negative_prompt: String,
    /// Denoising strength in `0..=1`.
    pub denoise: f64,
    /// Guidance scale.
    pub cfg_scale: f64,
    /// Sampling steps, at most [`MAX_STEPS`].
    pub steps: u32,
    /// Sampler name.
    pub sampler: String,
    /// Render size, derived from the init image.
    pub size: Dimensions,
    /// Inpainting mask blur.
    pub mask_blur: u32,
    /// Optional checkpoint override.
    pub checkpoint: Option<String>,
    /// Detector arguments; empty means no detector runs.
    pub detectors: Vec<DetectorVariant>,
    /// Optional secondary conditioning.
    pub conditioning: Option<SecondaryConditioning>,
}

impl PassRequest {
    /// A request with no prompt, detectors or conditioning.
    #[must_use]
    pub fn new(init_image: RgbImage, mask: Mask, sampling: &SamplingParams) -> Self {
        let size = target_dimensions(Dimensions::of(&init_image));
        Self {
            init_image,
            mask,
            prompt: String::new(),
            negative_prompt: String::new(),
            denoise: sampling.denoise.clamp(0.0, 1.0),
            cfg_scale: sampling.cfg_scale,
            steps: sampling.steps.min(MAX_STEPS),
            sampler: sampling.sampler.clone(),
            size,
            mask_blur: sampling.mask_blur,
            checkpoint: sampling.checkpoint.clone(),
            detectors: Vec::new(),
            conditioning: None,
        }
    }

    /// Request for an optional refinement stage.
    #[must_use]
    pub fn refinement(init_image: RgbImage, mask: Mask, sampling: &SamplingParams, stage: &RefinerConfig) -> Self {
        Self::new(init_image, mask, &sampling.with_denoise(stage.denoise))
            .with_prompts(&stage.prompt, &stage.negative)
    }

    /// Set the prompt pair.
    #[must_use]
    pub fn with_prompts(mut self, prompt: &str, negative: &str) -> Self {
        prompt.clone_into(&mut self.prompt);
        negative.clone_into(&mut self.negative_prompt);
        self
    }

    /// Set the detector argument list.
    #[must_use]
    pub fn with_detectors(mut self, detectors: Vec<DetectorVariant>) -> Self {
        self.detectors = detectors;
        self
    }

    /// Attach secondary conditioning.
    #[must_use]
    pub fn with_conditioning(mut self, conditioning: Option<SecondaryConditioning>) -> Self {
        self.conditioning = conditioning;
        self
    }
}
