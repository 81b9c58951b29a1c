//! Per-image working directory layout.
//!
//! ```text
//! <work>/<name>/masks/face_mask.png
//! <work>/<name>/masks/cheek_mask.png      (cached refinement masks)
//! <work>/<name>/masks/eyelash_mask.png
//! <work>/<name>/a_pass/base_enhanced.png
//! <work>/<name>/a_pass/contour_map.png
//! <output>/<name>.png
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use retouch_pipeline::types::{Dimensions, GrayImage, PipelineError, RgbImage};
use retouch_pipeline::APassOutput;

/// Errors from reading or writing working-directory artifacts.
#[derive(Debug, thiserror::Error)]
pub enum WorkDirError {
    /// Filesystem operation failed.
    #[error("{path}: {source}")]
    Io {
        /// Path being accessed.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// Image could not be encoded or decoded.
    #[error("{path}: {source}")]
    Image {
        /// Path being accessed.
        path: PathBuf,
        /// Underlying error.
        source: image::ImageError,
    },

    /// An artifact does not match the size of the image it belongs to.
    #[error("{path}: {source}")]
    Mismatch {
        /// Offending artifact.
        path: PathBuf,
        /// Size details.
        source: PipelineError,
    },
}

/// Paths for one input image's intermediate artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkDir {
    root: PathBuf,
    name: String,
}

impl WorkDir {
    /// Working directory for the input named `name` under `work_root`.
    #[must_use]
    pub fn new(work_root: &Path, name: &str) -> Self {
        Self {
            root: work_root.join(name),
            name: name.to_owned(),
        }
    }

    /// Working directory for an input file, named after its stem.
    #[must_use]
    pub fn for_input(work_root: &Path, input: &Path) -> Self {
        Self::new(work_root, &input_name(input))
    }

    /// Input name this directory belongs to.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `<work>/<name>`.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding masks.
    #[must_use]
    pub fn masks_dir(&self) -> PathBuf {
        self.root.join("masks")
    }

    /// Directory holding A-pass images.
    #[must_use]
    pub fn a_pass_dir(&self) -> PathBuf {
        self.root.join("a_pass")
    }

    /// Face-selection mask.
    #[must_use]
    pub fn face_mask_path(&self) -> PathBuf {
        self.masks_dir().join("face_mask.png")
    }

    /// Sharpened base image.
    #[must_use]
    pub fn base_image_path(&self) -> PathBuf {
        self.a_pass_dir().join("base_enhanced.png")
    }

    /// Contour guide image.
    #[must_use]
    pub fn contour_guide_path(&self) -> PathBuf {
        self.a_pass_dir().join("contour_map.png")
    }

    /// Cached cheek refinement mask.
    #[must_use]
    pub fn cheek_mask_path(&self) -> PathBuf {
        self.masks_dir().join("cheek_mask.png")
    }

    /// Cached eyelash refinement mask.
    #[must_use]
    pub fn eyelash_mask_path(&self) -> PathBuf {
        self.masks_dir().join("eyelash_mask.png")
    }

    /// User-supplied manual mask, next to the face mask.
    #[must_use]
    pub fn manual_mask_path(&self, filename: &str) -> PathBuf {
        self.masks_dir().join(filename)
    }

    /// Final output path for this input.
    #[must_use]
    pub fn output_path(&self, output_dir: &Path) -> PathBuf {
        output_dir.join(format!("{}.png", self.name))
    }

    /// Write all three A-pass artifacts.
    ///
    /// # Errors
    ///
    /// Returns [`WorkDirError`] if a directory cannot be created or an
    /// image cannot be written.
    pub fn write_a_pass(&self, output: &APassOutput) -> Result<(), WorkDirError> {
        save_gray(&self.face_mask_path(), &output.face_mask)?;
        save_rgb(&self.base_image_path(), &output.base_image)?;
        save_gray(&self.contour_guide_path(), &output.contour_guide)?;
        tracing::info!(
            face_mask = %self.face_mask_path().display(),
            base = %self.base_image_path().display(),
            contour = %self.contour_guide_path().display(),
            "[A-PASS] saved"
        );
        Ok(())
    }

    /// Read the base image and face mask, checking they agree in size.
    ///
    /// # Errors
    ///
    /// Returns [`WorkDirError`] if either file is unreadable or their
    /// sizes differ.
    pub fn load_main_inputs(&self) -> Result<(RgbImage, GrayImage), WorkDirError> {
        let base = load_rgb(&self.base_image_path())?;
        let mask_path = self.face_mask_path();
        let mask = load_gray(&mask_path)?;
        ensure_same_size(&mask_path, Dimensions::of(&base), &mask)?;
        Ok((base, mask))
    }

    /// Read the contour guide if it exists.
    ///
    /// # Errors
    ///
    /// Returns [`WorkDirError`] if the file exists but cannot be read.
    pub fn load_contour_guide(&self) -> Result<Option<GrayImage>, WorkDirError> {
        load_gray_if_present(&self.contour_guide_path())
    }
}

/// Stem of `input`, or `"final"` when it has none.
#[must_use]
pub fn input_name(input: &Path) -> String {
    input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "final".to_owned())
}

/// Fail unless `mask` has the given size.
///
/// # Errors
///
/// Returns [`WorkDirError::Mismatch`] naming `path` when sizes differ.
pub fn ensure_same_size(path: &Path, expected: Dimensions, mask: &GrayImage) -> Result<(), WorkDirError> {
    let found = Dimensions::of(mask);
    if found == expected {
        Ok(())
    } else {
        Err(WorkDirError::Mismatch {
            path: path.to_owned(),
            source: PipelineError::SizeMismatch { expected, found },
        })
    }
}

fn create_parent(path: &Path) -> Result<(), WorkDirError> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => fs::create_dir_all(dir).map_err(|source| WorkDirError::Io {
            path: dir.to_owned(),
            source,
        }),
        _ => Ok(()),
    }
}

/// Write an RGB image as PNG, creating parent directories.
///
/// # Errors
///
/// Returns [`WorkDirError`] on filesystem or encoding failure.
pub fn save_rgb(path: &Path, image: &RgbImage) -> Result<(), WorkDirError> {
    create_parent(path)?;
    image
        .save_with_format(path, image::ImageFormat::Png)
        .map_err(|source| image_error(path, source))
}

/// Write a grayscale image as PNG, creating parent directories.
///
/// # Errors
///
/// Returns [`WorkDirError`] on filesystem or encoding failure.
pub fn save_gray(path: &Path, image: &GrayImage) -> Result<(), WorkDirError> {
    create_parent(path)?;
    image
        .save_with_format(path, image::ImageFormat::Png)
        .map_err(|source| image_error(path, source))
}

/// Read any supported image file as RGB.
///
/// # Errors
///
/// Returns [`WorkDirError`] if the file is missing or undecodable.
pub fn load_rgb(path: &Path) -> Result<RgbImage, WorkDirError> {
    Ok(image::open(path).map_err(|source| image_error(path, source))?.to_rgb8())
}

/// Read any supported image file as single-channel.
///
/// # Errors
///
/// Returns [`WorkDirError`] if the file is missing or undecodable.
pub fn load_gray(path: &Path) -> Result<GrayImage, WorkDirError> {
    Ok(image::open(path).map_err(|source| image_error(path, source))?.to_luma8())
}

/// Read a single-channel image if the file exists.
///
/// # Errors
///
/// Returns [`WorkDirError`] if the file exists but is undecodable.
pub fn load_gray_if_present(path: &Path) -> Result<Option<GrayImage>, WorkDirError> {
    if path.is_file() {
        load_gray(path).map(Some)
    } else {
        Ok(None)
    }
}

fn image_error(path: &Path, source: image::ImageError) -> WorkDirError {
    match source {
        image::ImageError::IoError(source) => WorkDirError::Io {
            path: path.to_owned(),
            source,
        },
        source => WorkDirError::Image {
            path: path.to_owned(),
            source,
        },
    }
}
