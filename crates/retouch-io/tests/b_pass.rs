//! End-to-end B-pass scenarios against in-memory services.

#![allow(clippy::unwrap_used)]

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::time::Duration;

use image::{Luma, Rgb};
use retouch_io::workdir::{load_rgb, save_gray, save_rgb};
use retouch_io::{BPass, BPassError, NoLandmarks, Services, StageError, StageOutcome, WorkDir, run_a_pass};
use retouch_pipeline::config::{DetectorFields, MaskSource};
use retouch_pipeline::landmarks::LEFT_CHEEK;
use retouch_pipeline::types::{GrayImage, RgbImage};
use retouch_pipeline::{
    APassConfig, BPassConfig, Dimensions, FaceCounter, FaceLandmarks, GeneralConfig, InpaintService, LandmarkService,
    PassRequest, ResolvedDetectors, SelectionPolicy, ServiceError, VariantSlot,
};

type Responder = dyn Fn(&PassRequest, usize) -> Result<Vec<RgbImage>, ServiceError>;

/// Records every request and answers through a closure given the call
/// index.
struct FakeInpaint {
    respond: Box<Responder>,
    calls: RefCell<Vec<PassRequest>>,
}

impl FakeInpaint {
    fn new(respond: impl Fn(&PassRequest, usize) -> Result<Vec<RgbImage>, ServiceError> + 'static) -> Self {
        Self {
            respond: Box::new(respond),
            calls: RefCell::new(Vec::new()),
        }
    }

    /// Solid image at the request size whose red channel encodes the
    /// call index.
    fn numbered() -> Self {
        Self::new(|req, n| Ok(vec![solid(req.size, n)]))
    }

    fn calls(&self) -> Vec<PassRequest> {
        self.calls.borrow().clone()
    }
}

impl InpaintService for FakeInpaint {
    fn img2img(&self, request: &PassRequest, _timeout: Duration) -> Result<Vec<RgbImage>, ServiceError> {
        let n = self.calls.borrow().len();
        self.calls.borrow_mut().push(request.clone());
        (self.respond)(request, n)
    }
}

struct NoFaces;

impl FaceCounter for NoFaces {
    fn count_faces(&self, _image: &GrayImage) -> usize {
        0
    }
}

/// Sees a face only in portrait orientation.
struct PortraitOnly;

impl FaceCounter for PortraitOnly {
    fn count_faces(&self, image: &GrayImage) -> usize {
        usize::from(image.height() > image.width())
    }
}

struct FixedMesh(FaceLandmarks);

impl LandmarkService for FixedMesh {
    fn detect(&self, _image: &RgbImage) -> Result<Option<FaceLandmarks>, ServiceError> {
        Ok(Some(self.0.clone()))
    }
}

#[allow(clippy::cast_possible_truncation)]
fn solid(size: Dimensions, n: usize) -> RgbImage {
    RgbImage::from_pixel(size.width, size.height, Rgb([(n * 40 + 20) as u8, 90, 90]))
}

/// A 1024x768 portrait run through the A-pass.
struct Scene {
    _dir: tempfile::TempDir,
    workdir: WorkDir,
    output_dir: PathBuf,
}

fn scene() -> Scene {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("portrait.png");
    let portrait = RgbImage::from_fn(1024, 768, |x, y| {
        #[allow(clippy::cast_possible_truncation)]
        Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    });
    save_rgb(&input, &portrait).unwrap();
    let workdir = WorkDir::for_input(&dir.path().join("work"), &input);
    run_a_pass(&input, &workdir, &APassConfig::default()).unwrap();
    let output_dir = dir.path().join("output");
    Scene {
        _dir: dir,
        workdir,
        output_dir,
    }
}

fn b_pass_config() -> BPassConfig {
    let mut config = BPassConfig::new(0.18, 5.0, 32, 6);
    config.controlnet.enabled = false;
    config
}

fn run(
    scene: &Scene,
    config: &BPassConfig,
    inpaint: &FakeInpaint,
    landmarks: &dyn LandmarkService,
    faces: &dyn FaceCounter,
) -> Result<retouch_io::BPassReport, BPassError> {
    let general = GeneralConfig::default();
    let services = Services {
        inpaint,
        landmarks,
        faces,
    };
    BPass::new(&general, config, services).run(&scene.workdir, &scene.output_dir)
}

fn output_pixel(path: &Path) -> Rgb<u8> {
    *load_rgb(path).unwrap().get_pixel(0, 0)
}

#[test]
fn fixed_policy_sends_primary_at_target_size() {
    let scene = scene();
    let config = b_pass_config();
    let inpaint = FakeInpaint::numbered();

    let report = run(&scene, &config, &inpaint, &NoLandmarks, &NoFaces).unwrap();

    let calls = inpaint.calls();
    assert_eq!(calls.len(), 1);
    let main = &calls[0];
    assert_eq!(main.size, Dimensions::new(768, 576));
    assert_eq!(main.steps, 16);
    assert!(main.conditioning.is_none());

    let resolved = ResolvedDetectors::from_config(&config.detectors, config.denoise);
    assert_eq!(main.detectors, vec![resolved.get(VariantSlot::Primary).clone()]);
    assert_eq!(report.detectors, vec![VariantSlot::Primary]);

    assert_eq!(report.output, scene.output_dir.join("portrait.png"));
    assert_eq!(output_pixel(&report.output), Rgb([20, 90, 90]));
    assert!(matches!(report.cheek, StageOutcome::Disabled));
    assert!(matches!(report.eyelash, StageOutcome::Disabled));
}

#[test]
fn contour_guide_conditions_main_pass() {
    let scene = scene();
    let mut config = b_pass_config();
    config.controlnet.enabled = true;
    let inpaint = FakeInpaint::numbered();

    run(&scene, &config, &inpaint, &NoLandmarks, &NoFaces).unwrap();

    let calls = inpaint.calls();
    let conditioning = calls[0].conditioning.as_ref().unwrap();
    assert_eq!(conditioning.source.dimensions(), (1024, 768));
    assert!(conditioning.source.pixels().all(|p| p[0] == p[1] && p[1] == p[2]));
    assert!((conditioning.weight - 0.44).abs() < 1e-9);
}

#[test]
fn missing_contour_guide_falls_back_to_base() {
    let scene = scene();
    std::fs::remove_file(scene.workdir.contour_guide_path()).unwrap();
    let mut config = b_pass_config();
    config.controlnet.enabled = true;
    let inpaint = FakeInpaint::numbered();

    run(&scene, &config, &inpaint, &NoLandmarks, &NoFaces).unwrap();

    let calls = inpaint.calls();
    let conditioning = calls[0].conditioning.as_ref().unwrap();
    assert_eq!(conditioning.source, calls[0].init_image);
}

#[test]
fn main_pass_failure_is_fatal() {
    let scene = scene();
    let inpaint = FakeInpaint::new(|_, _| Err(ServiceError::http(500, "CUDA out of memory")));

    let err = run(&scene, &b_pass_config(), &inpaint, &NoLandmarks, &NoFaces).unwrap_err();

    assert!(matches!(err, BPassError::MainPass(ServiceError::Http { status: 500, .. })));
    assert!(!scene.workdir.output_path(&scene.output_dir).exists());
}

#[test]
fn empty_main_result_is_fatal() {
    let scene = scene();
    let inpaint = FakeInpaint::new(|_, _| Ok(Vec::new()));

    let err = run(&scene, &b_pass_config(), &inpaint, &NoLandmarks, &NoFaces).unwrap_err();
    assert!(matches!(err, BPassError::MainPass(ServiceError::EmptyResult)));
}

#[test]
fn missing_a_pass_artifacts_are_reported() {
    let dir = tempfile::tempdir().unwrap();
    let scene = Scene {
        workdir: WorkDir::new(dir.path(), "never-ran"),
        output_dir: dir.path().join("output"),
        _dir: dir,
    };
    let inpaint = FakeInpaint::numbered();

    let err = run(&scene, &b_pass_config(), &inpaint, &NoLandmarks, &NoFaces).unwrap_err();

    assert!(matches!(err, BPassError::MissingArtifact(ref p) if p.ends_with("base_enhanced.png") || p.ends_with("face_mask.png")));
    assert!(inpaint.calls().is_empty());
}

#[test]
fn refiners_without_masks_leave_main_output() {
    let scene = scene();
    let mut config = b_pass_config();
    config.cheek_refiner.enabled = true;
    config.eyelash_refiner.enabled = true;
    let inpaint = FakeInpaint::numbered();

    let report = run(&scene, &config, &inpaint, &NoLandmarks, &NoFaces).unwrap();

    assert_eq!(inpaint.calls().len(), 1);
    assert!(matches!(report.cheek, StageOutcome::Skipped(StageError::NoMask)));
    assert!(matches!(report.eyelash, StageOutcome::Skipped(StageError::NoMask)));
    assert_eq!(output_pixel(&report.output), Rgb([20, 90, 90]));
}

#[test]
fn cached_cheek_mask_refines_output() {
    let scene = scene();
    save_gray(&scene.workdir.cheek_mask_path(), &GrayImage::from_pixel(64, 48, Luma([255]))).unwrap();
    let mut config = b_pass_config();
    config.cheek_refiner.enabled = true;
    config.cheek_refiner.mask_source = MaskSource::Cached;
    config.cheek_refiner.prompt = "even skin".to_owned();
    let inpaint = FakeInpaint::numbered();

    let report = run(&scene, &config, &inpaint, &NoLandmarks, &NoFaces).unwrap();

    let calls = inpaint.calls();
    assert_eq!(calls.len(), 2);
    let cheek = &calls[1];
    assert!((cheek.denoise - 0.16).abs() < 1e-9);
    assert_eq!(cheek.prompt, "even skin");
    assert!(cheek.detectors.is_empty());
    assert!(cheek.conditioning.is_none());
    assert_eq!(cheek.mask.dimensions(), (768, 576));
    assert_eq!(cheek.init_image.get_pixel(0, 0), &Rgb([20, 90, 90]));

    assert!(report.cheek.is_applied());
    assert_eq!(output_pixel(&report.output), Rgb([60, 90, 90]));
}

#[test]
fn failed_refiner_keeps_previous_output() {
    let scene = scene();
    save_gray(&scene.workdir.cheek_mask_path(), &GrayImage::from_pixel(768, 576, Luma([255]))).unwrap();
    save_gray(&scene.workdir.eyelash_mask_path(), &GrayImage::from_pixel(768, 576, Luma([255]))).unwrap();
    let mut config = b_pass_config();
    config.cheek_refiner.enabled = true;
    config.eyelash_refiner.enabled = true;
    let inpaint = FakeInpaint::new(|req, n| match n {
        1 => Err(ServiceError::Timeout(Duration::from_secs(900))),
        _ => Ok(vec![solid(req.size, n)]),
    });

    let report = run(&scene, &config, &inpaint, &NoLandmarks, &NoFaces).unwrap();

    assert!(matches!(report.cheek, StageOutcome::Skipped(StageError::Service(ServiceError::Timeout(_)))));
    assert!(report.eyelash.is_applied());
    let calls = inpaint.calls();
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[2].init_image.get_pixel(0, 0), &Rgb([20, 90, 90]));
    assert!((calls[2].denoise - 0.14).abs() < 1e-9);
    assert_eq!(output_pixel(&report.output), Rgb([100, 90, 90]));
}

#[test]
fn landmark_mask_is_cached_before_request() {
    let scene = scene();
    let mut points = vec![(0.2, 0.4); 478];
    let corners = [(0.2, 0.4), (0.4, 0.4), (0.4, 0.6), (0.2, 0.6)];
    for (n, &i) in LEFT_CHEEK.iter().enumerate() {
        points[i] = corners[n % 4];
    }
    let landmarks = FixedMesh(FaceLandmarks::new(points));
    let mut config = b_pass_config();
    config.cheek_refiner.enabled = true;
    let inpaint = FakeInpaint::numbered();

    let report = run(&scene, &config, &inpaint, &landmarks, &NoFaces).unwrap();

    assert!(report.cheek.is_applied());
    let cached = image::open(scene.workdir.cheek_mask_path()).unwrap().to_luma8();
    assert_eq!(cached.dimensions(), (768, 576));
    assert!(cached.get_pixel(230, 288)[0] > 200);
    assert_eq!(cached.get_pixel(700, 50)[0], 0);
    assert_eq!(inpaint.calls()[1].mask, cached);
}

#[test]
fn probe_fallback_picks_first_variant_that_changes_image() {
    let scene = scene();
    let mut config = b_pass_config();
    config.selection = SelectionPolicy::ProbeFallback;
    config.detectors.secondary = DetectorFields {
        enabled: true,
        confidence: Some(0.2),
        ..DetectorFields::default()
    };
    config.detectors.tertiary.enabled = true;
    let inpaint = FakeInpaint::new(|req, n| match n {
        0 => Ok(vec![req.init_image.clone()]),
        _ => Ok(vec![solid(req.size, n)]),
    });

    let report = run(&scene, &config, &inpaint, &NoLandmarks, &NoFaces).unwrap();

    assert_eq!(report.detectors, vec![VariantSlot::Secondary]);
    let calls = inpaint.calls();
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[0].steps, 8);
    assert!(calls[0].mask.pixels().all(|p| p[0] == 0));
    assert_eq!(calls[2].detectors.len(), 1);
    assert!((calls[2].detectors[0].confidence - 0.2).abs() < 1e-9);
}

#[test]
fn sequential_policy_prefers_tertiary_for_rotated_face() {
    let scene = scene();
    let mut config = b_pass_config();
    config.selection = SelectionPolicy::Sequential;
    config.detectors.tertiary.enabled = true;
    let inpaint = FakeInpaint::numbered();

    let report = run(&scene, &config, &inpaint, &NoLandmarks, &PortraitOnly).unwrap();

    assert_eq!(report.detectors, vec![VariantSlot::Tertiary]);
    assert_eq!(inpaint.calls().len(), 1);
}

#[test]
fn manual_mask_replaces_face_mask_when_nothing_selected() {
    let scene = scene();
    let mut config = b_pass_config();
    config.selection = SelectionPolicy::Sequential;
    config.manual_fallback.enabled = true;
    let manual = GrayImage::from_pixel(1024, 768, Luma([200]));
    save_gray(&scene.workdir.manual_mask_path(&config.manual_fallback.mask_filename), &manual).unwrap();
    let inpaint = FakeInpaint::numbered();

    let report = run(&scene, &config, &inpaint, &NoLandmarks, &NoFaces).unwrap();

    assert!(report.detectors.is_empty());
    assert!(report.manual_mask);
    let calls = inpaint.calls();
    assert!(calls[0].detectors.is_empty());
    assert_eq!(calls[0].mask, manual);
}

#[test]
fn empty_selection_without_manual_mask_keeps_face_mask() {
    let scene = scene();
    let mut config = b_pass_config();
    config.selection = SelectionPolicy::Sequential;
    config.manual_fallback.enabled = true;
    let inpaint = FakeInpaint::numbered();

    let report = run(&scene, &config, &inpaint, &NoLandmarks, &NoFaces).unwrap();

    assert!(!report.manual_mask);
    let face_mask = image::open(scene.workdir.face_mask_path()).unwrap().to_luma8();
    assert_eq!(inpaint.calls()[0].mask, face_mask);
}
