//! retouch-io: Filesystem, HTTP and detector bindings for the retouch
//! pipeline.
//!
//! Implements the service traits from `retouch-pipeline` against real
//! collaborators (the A1111 web API, an optional landmark endpoint and a
//! local `rustface` cascade), manages per-image working directories, and
//! drives the A-pass and B-pass for one image at a time.

pub mod a1111;
pub mod a_pass;
pub mod bpass;
pub mod config;
pub mod face_count;
pub mod landmarks;
pub mod raster;
pub mod workdir;

pub use a1111::A1111Client;
pub use a_pass::{APassError, run_a_pass};
pub use bpass::{BPass, BPassError, BPassReport, RefinementStage, Services, StageError, StageOutcome};
pub use config::{ConfigError, RetouchConfig};
pub use face_count::CascadeFaceCounter;
pub use landmarks::{HttpLandmarkService, NoLandmarks};
pub use workdir::{WorkDir, WorkDirError};
