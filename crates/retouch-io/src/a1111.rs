//! HTTP client for an AUTOMATIC1111-compatible `img2img` endpoint.
//!
//! [`PassRequest`]s are serialized into the `/sdapi/v1/img2img` JSON
//! payload, including the `ADetailer` and `ControlNet` always-on script
//! arguments, and the base64 images in the response are decoded.

use std::time::Duration;

use reqwest::blocking::Client;
use retouch_pipeline::request::SecondaryConditioning;
use retouch_pipeline::service::{InpaintService, ServiceError};
use retouch_pipeline::types::RgbImage;
use retouch_pipeline::{DetectorVariant, PassRequest};
use serde::{Deserialize, Serialize};

use crate::raster::{PNG_DATA_URL_PREFIX, RasterError, decode_base64_rgb, gray_to_base64, rgb_to_base64};

/// Path of the image-to-image route, relative to the service base URL.
pub const IMG2IMG_ROUTE: &str = "/sdapi/v1/img2img";

/// Padding around the masked region when inpainting at full resolution.
const FULL_RES_PADDING: u32 = 32;

/// `inpainting_fill` value for "original".
const FILL_ORIGINAL: u8 = 1;

/// Preprocessor resolution for the conditioning unit.
const PROCESSOR_RES: u32 = 512;

/// Canny thresholds passed to the conditioning preprocessor.
const CANNY_THRESHOLDS: (u32, u32) = (100, 200);

#[derive(Debug, Serialize)]
struct OverrideSettings<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    sd_model_checkpoint: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct ScriptArgs<T> {
    args: Vec<T>,
}

#[derive(Debug, Serialize)]
struct AlwaysOnScripts<'a> {
    #[serde(rename = "ADetailer", skip_serializing_if = "Option::is_none")]
    adetailer: Option<ScriptArgs<DetailerArgs<'a>>>,
    #[serde(rename = "ControlNet", skip_serializing_if = "Option::is_none")]
    controlnet: Option<ScriptArgs<ControlNetUnit<'a>>>,
}

#[derive(Debug, Serialize)]
struct DetailerArgs<'a> {
    ad_model: &'a str,
    ad_confidence: f64,
    ad_mask_min_ratio: f64,
    ad_dilate_erode: i32,
    ad_mask_blur: u32,
    ad_inpaint_only_masked: bool,
    ad_denoising_strength: f64,
    ad_use_inpaint: bool,
    ad_use_next_frame: bool,
    ad_prompt: &'a str,
    ad_negative_prompt: &'a str,
}

impl<'a> From<&'a DetectorVariant> for DetailerArgs<'a> {
    fn from(v: &'a DetectorVariant) -> Self {
        Self {
            ad_model: &v.model,
            ad_confidence: v.confidence,
            ad_mask_min_ratio: v.mask_min_ratio,
            ad_dilate_erode: v.dilate_erode,
            ad_mask_blur: v.mask_blur,
            ad_inpaint_only_masked: true,
            ad_denoising_strength: v.denoise,
            ad_use_inpaint: true,
            ad_use_next_frame: false,
            ad_prompt: &v.prompt,
            ad_negative_prompt: &v.negative,
        }
    }
}

#[derive(Debug, Serialize)]
struct ControlNetUnit<'a> {
    enabled: bool,
    module: &'a str,
    model: &'a str,
    weight: f64,
    input_image: String,
    lowvram: bool,
    processor_res: u32,
    guidance_start: f64,
    guidance_end: f64,
    control_mode: &'static str,
    threshold_a: u32,
    threshold_b: u32,
}

impl<'a> ControlNetUnit<'a> {
    fn new(c: &'a SecondaryConditioning) -> Result<Self, RasterError> {
        Ok(Self {
            enabled: true,
            module: &c.module,
            model: &c.model,
            weight: c.weight,
            input_image: format!("{PNG_DATA_URL_PREFIX}{}", rgb_to_base64(&c.source)?),
            lowvram: false,
            processor_res: PROCESSOR_RES,
            guidance_start: c.guidance_start,
            guidance_end: c.guidance_end,
            control_mode: c.mode.label(),
            threshold_a: CANNY_THRESHOLDS.0,
            threshold_b: CANNY_THRESHOLDS.1,
        })
    }
}

/// JSON body of an `img2img` call.
#[derive(Debug, Serialize)]
pub struct Img2ImgPayload<'a> {
    init_images: [String; 1],
    mask: String,
    prompt: &'a str,
    negative_prompt: &'a str,
    denoising_strength: f64,
    cfg_scale: f64,
    steps: u32,
    sampler_name: &'a str,
    width: u32,
    height: u32,
    inpainting_fill: u8,
    inpaint_only_masked: bool,
    inpaint_full_res: bool,
    inpaint_full_res_padding: u32,
    inpainting_mask_invert: u8,
    mask_blur: u32,
    override_settings: OverrideSettings<'a>,
    override_settings_restore_afterwards: bool,
    alwayson_scripts: AlwaysOnScripts<'a>,
}

impl<'a> Img2ImgPayload<'a> {
    /// Serialize-ready payload for `request`.
    ///
    /// # Errors
    ///
    /// Returns [`RasterError`] if an image cannot be PNG-encoded.
    pub fn new(request: &'a PassRequest) -> Result<Self, RasterError> {
        let adetailer = (!request.detectors.is_empty()).then(|| ScriptArgs {
            args: request.detectors.iter().map(DetailerArgs::from).collect(),
        });
        let controlnet = request
            .conditioning
            .as_ref()
            .map(|c| ControlNetUnit::new(c).map(|unit| ScriptArgs { args: vec![unit] }))
            .transpose()?;

        Ok(Self {
            init_images: [rgb_to_base64(&request.init_image)?],
            mask: gray_to_base64(&request.mask)?,
            prompt: &request.prompt,
            negative_prompt: &request.negative_prompt,
            denoising_strength: request.denoise,
            cfg_scale: request.cfg_scale,
            steps: request.steps,
            sampler_name: &request.sampler,
            width: request.size.width,
            height: request.size.height,
            inpainting_fill: FILL_ORIGINAL,
            inpaint_only_masked: true,
            inpaint_full_res: true,
            inpaint_full_res_padding: FULL_RES_PADDING,
            inpainting_mask_invert: 0,
            mask_blur: request.mask_blur,
            override_settings: OverrideSettings {
                sd_model_checkpoint: request.checkpoint.as_deref(),
            },
            override_settings_restore_afterwards: true,
            alwayson_scripts: AlwaysOnScripts {
                adetailer,
                controlnet,
            },
        })
    }
}

#[derive(Debug, Deserialize)]
struct Img2ImgResponse {
    #[serde(default)]
    images: Vec<String>,
}

/// Blocking client for one inpainting service.
#[derive(Debug, Clone)]
pub struct A1111Client {
    http: Client,
    url: String,
}

impl A1111Client {
    /// Client for the service at `endpoint` (scheme, host and port).
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Transport`] if the HTTP client cannot be
    /// constructed.
    pub fn new(endpoint: &str) -> Result<Self, ServiceError> {
        let http = Client::builder()
            .build()
            .map_err(|e| ServiceError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            url: format!("{}{IMG2IMG_ROUTE}", endpoint.trim_end_matches('/')),
        })
    }

    /// Full URL requests are posted to.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

fn transport_error(err: &reqwest::Error, timeout: Duration) -> ServiceError {
    if err.is_timeout() {
        ServiceError::Timeout(timeout)
    } else {
        ServiceError::Transport(err.to_string())
    }
}

/// Decode every image in a response body.
///
/// # Errors
///
/// Returns [`ServiceError::Decode`] for malformed JSON or images and
/// [`ServiceError::EmptyResult`] when the list is empty.
pub fn decode_response(body: &str) -> Result<Vec<RgbImage>, ServiceError> {
    let parsed: Img2ImgResponse =
        serde_json::from_str(body).map_err(|e| ServiceError::Decode(e.to_string()))?;
    if parsed.images.is_empty() {
        return Err(ServiceError::EmptyResult);
    }
    parsed
        .images
        .iter()
        .map(|b64| decode_base64_rgb(b64).map_err(|e| ServiceError::Decode(e.to_string())))
        .collect()
}

impl InpaintService for A1111Client {
    fn img2img(&self, request: &PassRequest, timeout: Duration) -> Result<Vec<RgbImage>, ServiceError> {
        let payload = Img2ImgPayload::new(request)
            .map_err(|e| ServiceError::Transport(format!("failed to encode request images: {e}")))?;
        tracing::debug!(
            url = %self.url,
            size = %request.size,
            steps = request.steps,
            detectors = request.detectors.len(),
            conditioning = request.conditioning.is_some(),
            "img2img request"
        );

        let response = self
            .http
            .post(&self.url)
            .timeout(timeout)
            .json(&payload)
            .send()
            .map_err(|e| transport_error(&e, timeout))?;

        let status = response.status();
        let body = response.text().map_err(|e| transport_error(&e, timeout))?;
        if !status.is_success() {
            return Err(ServiceError::http(status.as_u16(), &body));
        }
        decode_response(&body)
    }
}
