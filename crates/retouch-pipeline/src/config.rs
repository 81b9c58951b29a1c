//! B-pass configuration.
//!
//! These types mirror the `general` and `b_pass` sections of the YAML
//! configuration. Only `denoise`, `cfg`, `steps` and `mask_blur_px` are
//! required; everything else falls back to a default.

use serde::{Deserialize, Serialize};

/// Connection settings for the external services.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Base URL of the inpainting service.
    pub a1111_endpoint: String,
    /// Checkpoint the inpainting service should switch to per request.
    pub model_checkpoint: Option<String>,
    /// Base URL of the landmark service, if one is deployed.
    pub landmark_endpoint: Option<String>,
    /// Timeout for full generation requests, in seconds.
    pub request_timeout_secs: u64,
    /// Timeout for probe requests, in seconds.
    pub probe_timeout_secs: u64,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            a1111_endpoint: "http://127.0.0.1:7860".to_owned(),
            model_checkpoint: None,
            landmark_endpoint: None,
            request_timeout_secs: 900,
            probe_timeout_secs: 120,
        }
    }
}

/// Which detector selection policy runs before the main pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    /// Every enabled variant is sent at once.
    #[default]
    Fixed,
    /// Local face count at four rotations picks one variant.
    Sequential,
    /// Low-step probe requests pick the first variant that changes the image.
    ProbeFallback,
}

/// Probe request settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Sampling steps per probe, capped at the request maximum.
    pub steps: u32,
    /// Probe output must differ from the input by more than this.
    pub mse_threshold: f64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            steps: 8,
            mse_threshold: 1.0,
        }
    }
}

/// Sequential-heuristic tie-break.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequentialConfig {
    /// With no upright face but a rotated one, try the tertiary variant
    /// first. When false, rotated faces try secondary, then primary,
    /// then tertiary.
    pub prefer_tertiary_on_rotation: bool,
}

impl Default for SequentialConfig {
    fn default() -> Self {
        Self {
            prefer_tertiary_on_rotation: true,
        }
    }
}

/// Per-variant detector fields as written in the config. Unset fields
/// inherit from the preceding variant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorFields {
    /// Whether this variant takes part in selection.
    pub enabled: bool,
    /// Detection model file name.
    pub model: Option<String>,
    /// Minimum detection confidence.
    pub confidence: Option<f64>,
    /// Minimum detected area as a fraction of the image.
    pub mask_min_ratio: Option<f64>,
    /// Dilate (positive) or erode (negative) radius in pixels.
    pub dilate_erode: Option<i32>,
    /// Blur applied to the detected mask, in pixels.
    pub mask_blur: Option<u32>,
    /// Denoising strength inside the detected region.
    pub denoise: Option<f64>,
    /// Prompt for the detected region.
    pub prompt: Option<String>,
    /// Negative prompt for the detected region.
    pub negative: Option<String>,
}

/// The three detector variants in priority order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorSet {
    /// Highest-priority variant.
    pub primary: DetectorFields,
    /// Second variant; inherits from primary.
    pub secondary: DetectorFields,
    /// Third variant; inherits from secondary.
    pub tertiary: DetectorFields,
}

impl Default for DetectorSet {
    fn default() -> Self {
        Self {
            primary: DetectorFields {
                enabled: true,
                ..DetectorFields::default()
            },
            secondary: DetectorFields::default(),
            tertiary: DetectorFields::default(),
        }
    }
}

/// Secondary conditioning (`ControlNet`) fed by the contour guide.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlNetConfig {
    /// Attach the conditioning unit to the main pass.
    pub enabled: bool,
    /// Preprocessor module.
    pub module: String,
    /// Conditioning model.
    pub model: String,
    /// Conditioning weight in `0..=2`.
    pub weight: f64,
    /// Fraction of sampling at which conditioning starts.
    pub guidance_start: f64,
    /// Fraction of sampling at which conditioning ends.
    pub guidance_end: f64,
    /// Control priority index; see [`ControlMode::from_index`](crate::request::ControlMode::from_index).
    pub mode: i64,
}

impl Default for ControlNetConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            module: "canny".to_owned(),
            model: "xinsirControlnetCanny_v20".to_owned(),
            weight: 0.44,
            guidance_start: 0.25,
            guidance_end: 0.90,
            mode: 0,
        }
    }
}

/// Manual override when no detector is selected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManualFallbackConfig {
    /// Look for a user-supplied mask when selection comes back empty.
    pub enabled: bool,
    /// File name of the user mask, next to the face mask.
    pub mask_filename: String,
    /// Point the user at the inpainting UI.
    pub open_ui: bool,
    /// Point the user at the help page.
    pub open_help: bool,
    /// Help page location.
    pub help_path: String,
}

impl Default for ManualFallbackConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            mask_filename: "custom_face_mask.png".to_owned(),
            open_ui: false,
            open_help: false,
            help_path: "manual_fallback_help.html".to_owned(),
        }
    }
}

/// Where a refinement stage gets its mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaskSource {
    /// Derive from landmarks, falling back to the cached file.
    #[default]
    Landmarks,
    /// Use the cached file only.
    Cached,
}

/// Settings for one optional refinement stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefinerConfig {
    /// Run this stage.
    pub enabled: bool,
    /// Mask origin.
    pub mask_source: MaskSource,
    /// Max-filter size in pixels; 0 disables dilation.
    pub dilate_px: u32,
    /// Gaussian blur radius in pixels; 0 disables blurring.
    pub blur_px: u32,
    /// Stage prompt.
    pub prompt: String,
    /// Stage negative prompt.
    pub negative: String,
    /// Stage denoising strength.
    pub denoise: f64,
}

impl RefinerConfig {
    /// Cheek stage defaults.
    #[must_use]
    pub fn cheek() -> Self {
        Self {
            enabled: false,
            mask_source: MaskSource::Landmarks,
            dilate_px: 10,
            blur_px: 12,
            prompt: String::new(),
            negative: String::new(),
            denoise: 0.16,
        }
    }

    /// Eyelash stage defaults.
    #[must_use]
    pub fn eyelash() -> Self {
        Self {
            dilate_px: 4,
            blur_px: 6,
            denoise: 0.14,
            ..Self::cheek()
        }
    }
}

impl Default for RefinerConfig {
    fn default() -> Self {
        Self::cheek()
    }
}

/// A refinement stage as written in YAML, before stage defaults apply.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RefinerOverrides {
    enabled: Option<bool>,
    mask_source: Option<MaskSource>,
    dilate_px: Option<u32>,
    blur_px: Option<u32>,
    prompt: Option<String>,
    negative: Option<String>,
    denoise: Option<f64>,
}

impl RefinerOverrides {
    fn apply(self, base: RefinerConfig) -> RefinerConfig {
        RefinerConfig {
            enabled: self.enabled.unwrap_or(base.enabled),
            mask_source: self.mask_source.unwrap_or(base.mask_source),
            dilate_px: self.dilate_px.unwrap_or(base.dilate_px),
            blur_px: self.blur_px.unwrap_or(base.blur_px),
            prompt: self.prompt.unwrap_or(base.prompt),
            negative: self.negative.unwrap_or(base.negative),
            denoise: self.denoise.unwrap_or(base.denoise),
        }
    }
}

fn cheek_refiner<'de, D: serde::Deserializer<'de>>(d: D) -> Result<RefinerConfig, D::Error> {
    Ok(RefinerOverrides::deserialize(d)?.apply(RefinerConfig::cheek()))
}

fn eyelash_refiner<'de, D: serde::Deserializer<'de>>(d: D) -> Result<RefinerConfig, D::Error> {
    Ok(RefinerOverrides::deserialize(d)?.apply(RefinerConfig::eyelash()))
}

fn default_sampler() -> String {
    "DPM++ SDE Karras".to_owned()
}

fn default_face_detector_model() -> String {
    "models/seeta_fd_frontal_v1.0.bin".to_owned()
}

fn default_eyelash() -> RefinerConfig {
    RefinerConfig::eyelash()
}

fn default_cheek() -> RefinerConfig {
    RefinerConfig::cheek()
}

/// The `b_pass` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BPassConfig {
    /// Main pass prompt.
    #[serde(default)]
    pub prompt: String,
    /// Main pass negative prompt.
    #[serde(default)]
    pub negative: String,
    /// Main pass denoising strength; also the detector default.
    pub denoise: f64,
    /// Guidance scale.
    pub cfg: f64,
    /// Sampling steps before capping.
    pub steps: u32,
    /// Sampler name.
    #[serde(default = "default_sampler")]
    pub sampler: String,
    /// Inpainting mask blur in pixels.
    pub mask_blur_px: u32,
    /// Detector selection policy.
    #[serde(default)]
    pub selection: SelectionPolicy,
    /// Cascade model used by the sequential policy.
    #[serde(default = "default_face_detector_model")]
    pub face_detector_model: String,
    /// Probe policy settings.
    #[serde(default)]
    pub probe: ProbeConfig,
    /// Sequential policy settings.
    #[serde(default)]
    pub sequential: SequentialConfig,
    /// Detector variants.
    #[serde(default)]
    pub detectors: DetectorSet,
    /// Secondary conditioning.
    #[serde(default)]
    pub controlnet: ControlNetConfig,
    /// Manual override.
    #[serde(default)]
    pub manual_fallback: ManualFallbackConfig,
    /// Cheek refinement stage.
    #[serde(default = "default_cheek", deserialize_with = "cheek_refiner")]
    pub cheek_refiner: RefinerConfig,
    /// Eyelash refinement stage.
    #[serde(default = "default_eyelash", deserialize_with = "eyelash_refiner")]
    pub eyelash_refiner: RefinerConfig,
}

impl BPassConfig {
    /// Config with the required numeric fields set and everything else
    /// at its default.
    #[must_use]
    pub fn new(denoise: f64, cfg: f64, steps: u32, mask_blur_px: u32) -> Self {
        Self {
            prompt: String::new(),
            negative: String::new(),
            denoise,
            cfg,
            steps,
            sampler: default_sampler(),
            mask_blur_px,
            selection: SelectionPolicy::default(),
            face_detector_model: default_face_detector_model(),
            probe: ProbeConfig::default(),
            sequential: SequentialConfig::default(),
            detectors: DetectorSet::default(),
            controlnet: ControlNetConfig::default(),
            manual_fallback: ManualFallbackConfig::default(),
            cheek_refiner: RefinerConfig::cheek(),
            eyelash_refiner: RefinerConfig::eyelash(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const MINIMAL: &str = "denoise: 0.18\ncfg: 5.0\nsteps: 32\nmask_blur_px: 6\n";

    #[test]
    fn minimal_b_pass_uses_defaults() {
        let bp: BPassConfig = serde_yaml::from_str(MINIMAL).unwrap();
        assert_eq!(bp, BPassConfig::new(0.18, 5.0, 32, 6));
        assert_eq!(bp.sampler, "DPM++ SDE Karras");
        assert_eq!(bp.selection, SelectionPolicy::Fixed);
        assert!(bp.detectors.primary.enabled);
        assert!(!bp.detectors.secondary.enabled);
        assert_eq!(bp.eyelash_refiner.dilate_px, 4);
        assert_eq!(bp.cheek_refiner.dilate_px, 10);
    }

    #[test]
    fn missing_required_field_is_named() {
        let err = serde_yaml::from_str::<BPassConfig>("denoise: 0.2\ncfg: 5.0\nsteps: 20\n").unwrap_err();
        assert!(err.to_string().contains("mask_blur_px"), "{err}");
    }

    #[test]
    fn nested_sections_parse() {
        let yaml = format!(
            "{MINIMAL}selection: probe_fallback\nprobe:\n  mse_threshold: 2.5\n\
             detectors:\n  secondary:\n    enabled: true\n    confidence: 0.25\n\
             eyelash_refiner:\n  enabled: true\n  mask_source: cached\n"
        );
        let bp: BPassConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(bp.selection, SelectionPolicy::ProbeFallback);
        assert_eq!(bp.probe.steps, 8);
        assert!((bp.probe.mse_threshold - 2.5).abs() < f64::EPSILON);
        assert!(bp.detectors.secondary.enabled);
        assert_eq!(bp.detectors.secondary.confidence, Some(0.25));
        assert_eq!(bp.eyelash_refiner.mask_source, MaskSource::Cached);
        assert!(bp.eyelash_refiner.enabled);
        // Unset stage fields keep the eyelash defaults, not the cheek ones.
        assert_eq!(bp.eyelash_refiner.dilate_px, 4);
        assert_eq!(bp.eyelash_refiner.blur_px, 6);
    }

    #[test]
    fn general_defaults() {
        let g: GeneralConfig = serde_yaml::from_str("model_checkpoint: sdxl.safetensors\n").unwrap();
        assert_eq!(g.a1111_endpoint, "http://127.0.0.1:7860");
        assert_eq!(g.model_checkpoint.as_deref(), Some("sdxl.safetensors"));
        assert_eq!(g.request_timeout_secs, 900);
        assert_eq!(g.probe_timeout_secs, 120);
    }
}
