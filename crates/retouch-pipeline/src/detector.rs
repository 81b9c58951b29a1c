//! Detector variants and their field inheritance.
//!
//! Each of the three variants may leave any field unset. An unset field
//! takes the value of the previous variant after that variant has been
//! resolved itself, and the primary variant falls back to hard-coded
//! defaults. [`resolve`] is the one place this chain is expressed.

use serde::Serialize;

use crate::config::{DetectorFields, DetectorSet};

/// Default detection model.
pub const DEFAULT_MODEL: &str = "face_yolov8n.pt";
/// Default detection confidence.
pub const DEFAULT_CONFIDENCE: f64 = 0.33;
/// Default minimum area ratio.
pub const DEFAULT_MASK_MIN_RATIO: f64 = 0.01;
/// Default dilate/erode radius.
pub const DEFAULT_DILATE_ERODE: i32 = 16;
/// Default detected-mask blur.
pub const DEFAULT_MASK_BLUR: u32 = 14;

/// Position of a variant in the priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VariantSlot {
    /// First in priority.
    Primary,
    /// Second in priority.
    Secondary,
    /// Third in priority.
    Tertiary,
}

impl VariantSlot {
    /// All slots, highest priority first.
    pub const ALL: [Self; 3] = [Self::Primary, Self::Secondary, Self::Tertiary];

    /// Lower-case name used in logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Secondary => "secondary",
            Self::Tertiary => "tertiary",
        }
    }
}

impl std::fmt::Display for VariantSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A fully resolved detector variant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectorVariant {
    /// Priority slot.
    pub slot: VariantSlot,
    /// Whether the configuration enables this variant.
    pub enabled: bool,
    /// Detection model file name.
    pub model: String,
    /// Minimum detection confidence.
    pub confidence: f64,
    /// Minimum detected area as a fraction of the image.
    pub mask_min_ratio: f64,
    /// Dilate (positive) or erode (negative) radius.
    pub dilate_erode: i32,
    /// Detected-mask blur.
    pub mask_blur: u32,
    /// Denoising strength inside the detected region.
    pub denoise: f64,
    /// Region prompt.
    pub prompt: String,
    /// Region negative prompt.
    pub negative: String,
}

/// Three-level field resolution: the variant's own value, else the
/// value inherited from the previous variant, else `default`.
#[must_use]
pub fn resolve<T>(own: Option<T>, inherited: Option<T>, default: T) -> T {
    own.or(inherited).unwrap_or(default)
}

impl DetectorVariant {
    /// Resolve `fields` against the already-resolved previous variant.
    ///
    /// `base_denoise` is the main pass denoising strength, which is the
    /// default for the first variant.
    #[must_use]
    pub fn resolve(
        slot: VariantSlot,
        fields: &DetectorFields,
        previous: Option<&Self>,
        base_denoise: f64,
    ) -> Self {
        Self {
            slot,
            enabled: fields.enabled,
            model: resolve(
                fields.model.clone(),
                previous.map(|p| p.model.clone()),
                DEFAULT_MODEL.to_owned(),
            ),
            confidence: resolve(fields.confidence, previous.map(|p| p.confidence), DEFAULT_CONFIDENCE),
            mask_min_ratio: resolve(
                fields.mask_min_ratio,
                previous.map(|p| p.mask_min_ratio),
                DEFAULT_MASK_MIN_RATIO,
            ),
            dilate_erode: resolve(
                fields.dilate_erode,
                previous.map(|p| p.dilate_erode),
                DEFAULT_DILATE_ERODE,
            ),
            mask_blur: resolve(fields.mask_blur, previous.map(|p| p.mask_blur), DEFAULT_MASK_BLUR),
            denoise: resolve(fields.denoise, previous.map(|p| p.denoise), base_denoise),
            prompt: resolve(fields.prompt.clone(), previous.map(|p| p.prompt.clone()), String::new()),
            negative: resolve(
                fields.negative.clone(),
                previous.map(|p| p.negative.clone()),
                String::new(),
            ),
        }
    }
}

/// All three variants after inheritance.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedDetectors {
    variants: [DetectorVariant; 3],
}

impl ResolvedDetectors {
    /// Resolve a configured detector set.
    #[must_use]
    pub fn from_config(set: &DetectorSet, base_denoise: f64) -> Self {
        let primary = DetectorVariant::resolve(VariantSlot::Primary, &set.primary, None, base_denoise);
        let secondary = DetectorVariant::resolve(
            VariantSlot::Secondary,
            &set.secondary,
            Some(&primary),
            base_denoise,
        );
        let tertiary = DetectorVariant::resolve(
            VariantSlot::Tertiary,
            &set.tertiary,
            Some(&secondary),
            base_denoise,
        );
        Self {
            variants: [primary, secondary, tertiary],
        }
    }

    /// The variant in `slot`, enabled or not.
    #[must_use]
    pub fn get(&self, slot: VariantSlot) -> &DetectorVariant {
        match slot {
            VariantSlot::Primary => &self.variants[0],
            VariantSlot::Secondary => &self.variants[1],
            VariantSlot::Tertiary => &self.variants[2],
        }
    }

    /// The variant in `slot` if it is enabled.
    #[must_use]
    pub fn enabled(&self, slot: VariantSlot) -> Option<&DetectorVariant> {
        Some(self.get(slot)).filter(|v| v.enabled)
    }

    /// Enabled variants in priority order.
    pub fn iter_enabled(&self) -> impl Iterator<Item = &DetectorVariant> {
        self.variants.iter().filter(|v| v.enabled)
    }
}
