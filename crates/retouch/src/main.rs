//! retouch: command-line driver for the portrait retouching pipeline.
//!
//! Reads a YAML configuration, then runs the A-pass (local mask and
//! guide synthesis), the B-pass (remote inpainting with optional
//! refinement stages), or both, over one or more images. Images are
//! processed one at a time; a failure is reported and the next image
//! continues. The exit status is non-zero if any image failed.
//!
//! # Usage
//!
//! ```text
//! retouch --config config.yaml run input/portrait.jpg
//! retouch a-pass                # every image in io.input_dir
//! retouch b-pass portrait       # by working-directory name
//! ```

#![allow(clippy::print_stderr)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use retouch_io::{
    A1111Client, BPass, CascadeFaceCounter, HttpLandmarkService, NoLandmarks, RetouchConfig, Services, WorkDir,
    run_a_pass,
};
use retouch_pipeline::LandmarkService;

type CliError = Box<dyn std::error::Error>;

/// Portrait retouching against an A1111-compatible inpainting service.
#[derive(Parser)]
#[command(name = "retouch", version)]
struct Cli {
    /// Configuration file.
    #[arg(long, short, default_value = "config.yaml")]
    config: PathBuf,

    /// Root of per-image working directories (overrides `io.work_dir`).
    #[arg(long, global = true)]
    work_dir: Option<PathBuf>,

    /// Final output directory (overrides `io.output_dir`).
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Synthesize face mask, base image and contour guide.
    APass {
        /// Input images. Defaults to every image in `io.input_dir`.
        inputs: Vec<PathBuf>,
    },

    /// Inpaint from existing A-pass artifacts.
    BPass {
        /// Working-directory names. Defaults to every directory under the
        /// work root.
        names: Vec<String>,
    },

    /// A-pass followed by B-pass.
    Run {
        /// Input images. Defaults to every image in `io.input_dir`.
        inputs: Vec<PathBuf>,
    },
}

/// Image files directly inside `dir`, sorted by name.
fn list_inputs(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut inputs: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && image::ImageFormat::from_path(path).is_ok())
        .collect();
    inputs.sort();
    Ok(inputs)
}

/// Working-directory names under `root`, sorted.
fn list_workdirs(root: &Path) -> std::io::Result<Vec<String>> {
    let mut names: Vec<String> = std::fs::read_dir(root)?
        .filter_map(Result::ok)
        .filter(|entry| entry.path().is_dir())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    Ok(names)
}

/// Live collaborators built from the configuration.
struct Backends {
    inpaint: A1111Client,
    landmarks: Box<dyn LandmarkService>,
    faces: CascadeFaceCounter,
}

impl Backends {
    fn connect(config: &RetouchConfig) -> Result<Self, CliError> {
        let general = &config.general;
        let inpaint = A1111Client::new(&general.a1111_endpoint)?;
        let landmarks: Box<dyn LandmarkService> = match &general.landmark_endpoint {
            Some(url) => Box::new(HttpLandmarkService::new(
                url,
                Duration::from_secs(general.probe_timeout_secs),
            )?),
            None => {
                tracing::info!("no landmark endpoint configured, refiners use cached masks");
                Box::new(NoLandmarks)
            }
        };
        let faces = CascadeFaceCounter::load(Path::new(&config.b_pass.face_detector_model));
        Ok(Self {
            inpaint,
            landmarks,
            faces,
        })
    }

    fn services(&self) -> Services<'_> {
        Services {
            inpaint: &self.inpaint,
            landmarks: self.landmarks.as_ref(),
            faces: &self.faces,
        }
    }
}

/// Resolved directories and configuration for one invocation.
struct Session {
    config: RetouchConfig,
    work_root: PathBuf,
    output_dir: PathBuf,
}

impl Session {
    fn inputs(&self, explicit: Vec<PathBuf>) -> Result<Vec<PathBuf>, CliError> {
        if !explicit.is_empty() {
            return Ok(explicit);
        }
        let dir = &self.config.io.input_dir;
        list_inputs(dir).map_err(|e| format!("cannot list {}: {e}", dir.display()).into())
    }

    fn a_pass(&self, input: &Path) -> Result<WorkDir, CliError> {
        let workdir = WorkDir::for_input(&self.work_root, input);
        run_a_pass(input, &workdir, &self.config.a_pass)?;
        Ok(workdir)
    }

    fn b_pass(&self, backends: &Backends, workdir: &WorkDir) -> Result<(), CliError> {
        let report = BPass::new(&self.config.general, &self.config.b_pass, backends.services())
            .run(workdir, &self.output_dir)?;
        tracing::info!(
            image = workdir.name(),
            output = %report.output.display(),
            detectors = ?report.detectors,
            manual_mask = report.manual_mask,
            cheek = report.cheek.is_applied(),
            eyelash = report.eyelash.is_applied(),
            "done"
        );
        Ok(())
    }
}

/// Run `job` for each item, logging failures. Returns the failure count.
fn each<T>(items: &[T], label: impl Fn(&T) -> String, mut job: impl FnMut(&T) -> Result<(), CliError>) -> usize {
    let mut failed = 0;
    for item in items {
        let name = label(item);
        let _span = tracing::info_span!("image", %name).entered();
        if let Err(e) = job(item) {
            tracing::error!(error = %e, "failed");
            failed += 1;
        }
    }
    failed
}

fn execute(session: &Session, command: Command) -> Result<usize, CliError> {
    let failed = match command {
        Command::APass { inputs } => {
            let inputs = session.inputs(inputs)?;
            each(&inputs, |p| p.display().to_string(), |input| session.a_pass(input).map(drop))
        }
        Command::BPass { names } => {
            let names = if names.is_empty() {
                list_workdirs(&session.work_root)
                    .map_err(|e| format!("cannot list {}: {e}", session.work_root.display()))?
            } else {
                names
            };
            let backends = Backends::connect(&session.config)?;
            each(&names, Clone::clone, |name| {
                session.b_pass(&backends, &WorkDir::new(&session.work_root, name))
            })
        }
        Command::Run { inputs } => {
            let inputs = session.inputs(inputs)?;
            let backends = Backends::connect(&session.config)?;
            each(&inputs, |p| p.display().to_string(), |input| {
                let workdir = session.a_pass(input)?;
                session.b_pass(&backends, &workdir)
            })
        }
    };
    Ok(failed)
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match RetouchConfig::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.logging.filter_directive())),
        )
        .init();

    let session = Session {
        work_root: cli.work_dir.unwrap_or_else(|| config.io.work_dir.clone()),
        output_dir: cli.output_dir.unwrap_or_else(|| config.io.output_dir.clone()),
        config,
    };

    match execute(&session, cli.command) {
        Ok(0) => ExitCode::SUCCESS,
        Ok(failed) => {
            tracing::error!(failed, "some images failed");
            ExitCode::FAILURE
        }
        Err(e) => {
            tracing::error!(error = %e, "aborted");
            ExitCode::FAILURE
        }
    }
}
