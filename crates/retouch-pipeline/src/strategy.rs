//! Detector selection policies.
//!
//! This module defines the [`DetectorSelector`] trait, one implementation
//! per policy, and the [`Selector`] enum that picks an implementation
//! from configuration once per image.
//!
//! - [`FixedSelector`] sends every enabled variant.
//! - [`SequentialSelector`] counts faces at four rotations with a local
//!   cascade detector and picks one variant from the result.
//! - [`ProbeFallbackSelector`] issues cheap probe requests and keeps the
//!   first variant that visibly changes the image.

use std::time::Duration;

use image::imageops;

use crate::compare::mean_squared_difference;
use crate::config::{ProbeConfig, SelectionPolicy, SequentialConfig};
use crate::detector::{DetectorVariant, ResolvedDetectors, VariantSlot};
use crate::request::{MAX_STEPS, PassRequest, SamplingParams};
use crate::service::{FaceCounter, InpaintService};
use crate::types::{GrayImage, Mask, RgbImage};

/// Decides which detector variants accompany the main pass.
pub trait DetectorSelector {
    /// Variants to send, in priority order. Empty means none.
    fn select(&self, image: &RgbImage, detectors: &ResolvedDetectors) -> Vec<DetectorVariant>;
}

/// Every enabled variant, no selection logic.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedSelector;

impl DetectorSelector for FixedSelector {
    fn select(&self, _image: &RgbImage, detectors: &ResolvedDetectors) -> Vec<DetectorVariant> {
        detectors.iter_enabled().cloned().collect()
    }
}

/// Face counts at 0°, 90°, 180° and 270°.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RotationCounts {
    /// Faces in the upright image.
    pub upright: usize,
    /// Faces at 90°, 180° and 270°.
    pub rotated: [usize; 3],
}

impl RotationCounts {
    /// Run `counter` over the four rotations of `image`.
    #[must_use]
    pub fn measure<C: FaceCounter + ?Sized>(counter: &C, image: &GrayImage) -> Self {
        Self {
            upright: counter.count_faces(image),
            rotated: [
                counter.count_faces(&imageops::rotate90(image)),
                counter.count_faces(&imageops::rotate180(image)),
                counter.count_faces(&imageops::rotate270(image)),
            ],
        }
    }

    /// Whether any rotated view found a face.
    #[must_use]
    pub fn any_rotated(&self) -> bool {
        self.rotated.iter().any(|&n| n > 0)
    }
}

/// Local face-count heuristic.
#[derive(Debug, Clone)]
pub struct SequentialSelector<C> {
    counter: C,
    config: SequentialConfig,
}

impl<C: FaceCounter> SequentialSelector<C> {
    /// Create a selector around a face counter.
    pub const fn new(counter: C, config: SequentialConfig) -> Self {
        Self { counter, config }
    }

    /// Pick a slot from rotation counts.
    #[must_use]
    pub fn choose<'d>(&self, counts: RotationCounts, detectors: &'d ResolvedDetectors) -> Option<&'d DetectorVariant> {
        use VariantSlot::{Primary, Secondary, Tertiary};

        let order: &[VariantSlot] = if counts.upright > 0 {
            &[Primary, Secondary, Tertiary]
        } else if !counts.any_rotated() {
            &[]
        } else if self.config.prefer_tertiary_on_rotation {
            &[Tertiary, Secondary, Primary]
        } else {
            &[Secondary, Primary, Tertiary]
        };
        order.iter().find_map(|&slot| detectors.enabled(slot))
    }
}

impl<C: FaceCounter> DetectorSelector for SequentialSelector<C> {
    fn select(&self, image: &RgbImage, detectors: &ResolvedDetectors) -> Vec<DetectorVariant> {
        let gray = imageops::grayscale(image);
        let counts = RotationCounts::measure(&self.counter, &gray);
        let chosen = self.choose(counts, detectors);
        tracing::info!(
            upright = counts.upright,
            rotated = ?counts.rotated,
            chosen = chosen.map_or("none", |v| v.slot.name()),
            "sequential detector selection"
        );
        chosen.cloned().into_iter().collect()
    }
}

/// Probe each enabled variant and keep the first that changes the image.
#[derive(Debug, Clone)]
pub struct ProbeFallbackSelector<S> {
    service: S,
    sampling: SamplingParams,
    probe: ProbeConfig,
    timeout: Duration,
}

impl<S: InpaintService> ProbeFallbackSelector<S> {
    /// Create a selector that probes through `service`.
    pub const fn new(service: S, sampling: SamplingParams, probe: ProbeConfig, timeout: Duration) -> Self {
        Self {
            service,
            sampling,
            probe,
            timeout,
        }
    }

    /// Probe request for one variant: blank mask, no prompts, few steps.
    #[must_use]
    pub fn probe_request(&self, image: &RgbImage, variant: &DetectorVariant) -> PassRequest {
        let blank = Mask::new(image.width(), image.height());
        let sampling = self.sampling.with_steps(self.probe.steps.min(MAX_STEPS));
        PassRequest::new(image.clone(), blank, &sampling).with_detectors(vec![variant.clone()])
    }

    /// Whether probing `variant` changed the image. Failures count as
    /// no change.
    fn changes_image(&self, image: &RgbImage, variant: &DetectorVariant) -> bool {
        let request = self.probe_request(image, variant);
        match self.service.img2img(&request, self.timeout) {
            Ok(images) => images.first().is_some_and(|out| {
                let mse = mean_squared_difference(image, out);
                tracing::debug!(variant = %variant.slot, mse, threshold = self.probe.mse_threshold, "probe result");
                mse > self.probe.mse_threshold
            }),
            Err(e) => {
                tracing::warn!(variant = %variant.slot, error = %e, "probe failed, skipping variant");
                false
            }
        }
    }
}

impl<S: InpaintService> DetectorSelector for ProbeFallbackSelector<S> {
    fn select(&self, image: &RgbImage, detectors: &ResolvedDetectors) -> Vec<DetectorVariant> {
        let chosen = detectors
            .iter_enabled()
            .find(|variant| self.changes_image(image, variant));
        tracing::info!(
            chosen = chosen.map_or("none", |v| v.slot.name()),
            "probe-fallback detector selection"
        );
        chosen.cloned().into_iter().collect()
    }
}

/// The configured policy, bound to its collaborators for one image.
pub enum Selector<'a> {
    /// See [`FixedSelector`].
    Fixed(FixedSelector),
    /// See [`SequentialSelector`].
    Sequential(SequentialSelector<&'a dyn FaceCounter>),
    /// See [`ProbeFallbackSelector`].
    ProbeFallback(ProbeFallbackSelector<&'a dyn InpaintService>),
}

impl<'a> Selector<'a> {
    /// Build the selector for `policy`.
    #[must_use]
    pub fn for_policy(
        policy: SelectionPolicy,
        counter: &'a dyn FaceCounter,
        service: &'a dyn InpaintService,
        sampling: &SamplingParams,
        probe: &ProbeConfig,
        sequential: &SequentialConfig,
        probe_timeout: Duration,
    ) -> Self {
        match policy {
            SelectionPolicy::Fixed => Self::Fixed(FixedSelector),
            SelectionPolicy::Sequential => Self::Sequential(SequentialSelector::new(counter, sequential.clone())),
            SelectionPolicy::ProbeFallback => Self::ProbeFallback(ProbeFallbackSelector::new(
                service,
                sampling.clone(),
                probe.clone(),
                probe_timeout,
            )),
        }
    }
}

impl DetectorSelector for Selector<'_> {
    fn select(&self, image: &RgbImage, detectors: &ResolvedDetectors) -> Vec<DetectorVariant> {
        match self {
            Self::Fixed(s) => s.select(image, detectors),
            Self::Sequential(s) => s.select(image, detectors),
            Self::ProbeFallback(s) => s.select(image, detectors),
        }
    }
}
