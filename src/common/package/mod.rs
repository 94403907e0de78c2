//! Cross-ecosystem requirement installation.
//!
//! A requirement token such as `lief>0.13 --conda=py-lief --only-binary` is
//! parsed into a [`RequirementDirective`], checked against the current
//! platform and interpreter, routed to the backend that owns the
//! interpreter, and installed.
//!
//! # Backends
//!
//! - Conda: used whenever the interpreter prefix is a conda environment.
//!   Never falls back to pip.
//! - Pacman: MSYS2 Pythons. Each requirement is looked up under several
//!   spellings; misses fall through to pip.
//! - Pip: everything else (pipenv when a pipenv shell is active).
//!
//! # Example
//!
//! ```ignore
//! use crate::common::package::{install_requirements, InstallOptions};
//!
//! let report = install_requirements(
//!     &["pip --upgrade", "lief --conda=py-lief --only-binary"],
//!     &InstallOptions::with_extra_index("https://marcelotduarte.github.io/packages/"),
//!     &ctx,
//!     &mut SystemRunner,
//! )?;
//! println!("Requirements installed: {}", report);
//! ```

mod batch;
pub mod eligibility;
mod install;
mod manager;
mod requirement;
mod resolve;

pub use batch::InstallBatch;
pub use install::Executor;
pub use manager::{
    Backend, BackendKind, Backends, CondaBackend, InstallOptions, PacmanBackend, PipBackend,
};
pub use requirement::RequirementDirective;
pub use resolve::{InstallReport, install_requirements};
