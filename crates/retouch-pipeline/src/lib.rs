//! retouch-pipeline: Pure portrait retouching core (sans-IO).
//!
//! Builds the A-pass artifacts (face mask, sharpened base image, contour
//! guide) from resolution-independent geometry, and models the B-pass
//! decisions: detector variant inheritance, selection policies, request
//! assembly and landmark-derived refinement masks.
//!
//! This crate has **no I/O dependencies** -- external services are
//! reached through the traits in [`service`], and all filesystem and
//! network interaction lives in `retouch-io`.

pub mod a_pass;
pub mod blur;
pub mod compare;
pub mod config;
pub mod detector;
pub mod geometry;
pub mod guide;
pub mod landmarks;
pub mod request;
pub mod service;
pub mod sizing;
pub mod strategy;
pub mod types;

pub use a_pass::{APassConfig, APassOutput, synthesize};
pub use config::{BPassConfig, GeneralConfig, RefinerConfig, SelectionPolicy};
pub use detector::{DetectorVariant, ResolvedDetectors, VariantSlot};
pub use request::{PassRequest, SamplingParams, SecondaryConditioning};
pub use service::{FaceCounter, FaceLandmarks, InpaintService, LandmarkService, ServiceError};
pub use strategy::{DetectorSelector, Selector};
pub use types::{Dimensions, Mask, PipelineError, RelPoint, RelRadii};
