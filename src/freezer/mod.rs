//! Preparing an environment to build and test one frozen sample.
//!
//! The workflow installs the project's own build requirements, swaps the
//! installed freezer for the one under test (editable checkout, latest
//! release, or the prebuilt package from the project index) and finally
//! installs whatever the sample itself needs.

mod pyproject;
mod status;
mod wheel;

use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::common::package::{InstallOptions, InstallReport, PacmanBackend, install_requirements};
use crate::common::platform::{EnvironmentContext, EnvironmentManager, Platform};
use crate::common::process::{CommandRunner, Invocation};
use crate::manifest::SampleJob;
use crate::ui::prelude::*;

pub use pyproject::load_project_requirements;
pub use status::FreezerStatus;

/// Package index hosting prebuilt freezer releases and niche wheels.
pub const PACKAGES_INDEX_URL: &str = "https://marcelotduarte.github.io/packages/";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildFlags {
    pub develop: bool,
    pub editable: bool,
    pub latest: bool,
    pub verbose: bool,
}

pub struct Workflow<'a> {
    pub root: PathBuf,
    pub ctx: &'a EnvironmentContext,
    pub runner: &'a mut dyn CommandRunner,
    pub flags: BuildFlags,
}

impl<'a> Workflow<'a> {
    pub fn new(
        root: impl Into<PathBuf>,
        ctx: &'a EnvironmentContext,
        runner: &'a mut dyn CommandRunner,
        flags: BuildFlags,
    ) -> Self {
        Self {
            root: root.into(),
            ctx,
            runner,
            flags,
        }
    }

    fn install<S: AsRef<str>>(&mut self, requires: &[S], options: &InstallOptions) -> Result<InstallReport> {
        Ok(install_requirements(requires, options, self.ctx, &mut *self.runner)?)
    }

    /// Install the project's requirements and, given a sample, the freezer
    /// and the sample's own requirements.
    pub fn install_requires(&mut self, sample: Option<SampleJob>) -> Result<InstallReport> {
        let project = load_project_requirements(&self.root.join("pyproject.toml"))?;
        let index = InstallOptions::with_extra_index(PACKAGES_INDEX_URL);
        let mut report = InstallReport::new();

        let mut bootstrap = Vec::new();
        if self.ctx.platform == Platform::Mingw {
            bootstrap.push("ca-certificates");
        }
        if !self.ctx.pipenv_active {
            bootstrap.push("pip --upgrade");
        }
        report.merge(self.install(&bootstrap, &InstallOptions::default())?);
        report.merge(self.install(&project, &index)?);

        if let Some(job) = sample {
            self.install_freezer(&index, &mut report)?;
            if !job.requirements.is_empty() {
                report.merge(self.install(&job.requirements, &job.options)?);
            }
        }

        if !report.is_empty() {
            emit(
                Level::Success,
                "install.summary",
                &format!("Requirements installed: {}", report),
                Some(serde_json::json!({ "installed": report.packages() })),
            );
        }
        Ok(report)
    }

    fn install_freezer(&mut self, index: &InstallOptions, report: &mut InstallReport) -> Result<()> {
        let current = FreezerStatus::detect(self.ctx, &self.root, &mut *self.runner);
        if current.installed {
            status::uninstall(self.ctx, &self.root, &mut *self.runner)?;
        }

        if self.flags.develop || self.flags.editable {
            self.install_editable(&current.version, report)?;
        } else if self.flags.latest {
            report.merge(self.install(&[status::DISTRIBUTION], &InstallOptions::default())?);
        }

        let refreshed = FreezerStatus::detect(self.ctx, &self.root, &mut *self.runner);
        if refreshed.installed {
            return Ok(());
        }

        if self.ctx.platform == Platform::Mingw {
            self.install_mingw_package(&refreshed.version, report);
        } else {
            let require = match self.ctx.manager {
                EnvironmentManager::Conda => "cx_freeze".to_string(),
                _ => refreshed.compatible_requirement(),
            };
            report.merge(self.install(&[format!("{} --pre --no-deps", require)], index)?);
        }
        Ok(())
    }

    fn install_editable(&mut self, version: &str, report: &mut InstallReport) -> Result<()> {
        let ctx = self.ctx;
        let mut develop = Invocation::new(ctx.interpreter.executable_arg())
            .args(["-m", "pip", "install", "-e", ".", "--no-build-isolation", "--no-deps"])
            .current_dir(&self.root);
        if self.flags.verbose {
            develop.push_arg("--verbose");
        }
        if ctx.platform == Platform::Windows && ctx.ci {
            develop = develop.env("CIBUILDWHEEL", "1");
        }
        self.run_logged(&develop);

        let wants_bases = match ctx.platform {
            Platform::Linux => !ctx.manylinux && !ctx.is_conda(),
            Platform::Macos => true,
            _ => false,
        };
        if !(self.flags.editable && wants_bases) {
            return Ok(());
        }

        let mut wheels = wheel::find_wheels(&self.root, version, ctx)?;
        if wheels.is_empty() {
            report.merge(self.install(&["cibuildwheel"], &InstallOptions::default())?);
            self.run_logged(&wheel::cibuildwheel(ctx, &self.root));
            wheels = wheel::find_wheels(&self.root, version, ctx)?;
        }
        match wheels.first() {
            Some(wheelfile) => {
                let count = wheel::extract_bases(wheelfile, &self.root)?;
                emit(
                    Level::Debug,
                    "freezer.bases",
                    &format!("Extracted {} bases from {}", count, wheelfile.display()),
                    None,
                );
            }
            None => emit(
                Level::Warn,
                "freezer.no_wheel",
                &format!("No wheel found for {}", wheel::build_identifier(ctx)),
                None,
            ),
        }
        Ok(())
    }

    fn install_mingw_package(&mut self, version: &str, report: &mut InstallReport) {
        let package = status::mingw_package(self.ctx);
        let url = wheel::mingw_package_url(PACKAGES_INDEX_URL, &self.ctx.mingw_package_prefix, version);
        emit(Level::Info, "freezer.download", &format!("download: {}", url), None);

        let file = match wheel::download_package(&url) {
            Ok(file) => file,
            Err(e) => {
                emit(Level::Warn, "freezer.download_failed", &format!("{:#}", e), None);
                return;
            }
        };
        let pacman = PacmanBackend {
            package_prefix: self.ctx.mingw_package_prefix.clone(),
        };
        let invocation = pacman.install_file(&file.path().to_string_lossy());
        if self.run_logged(&invocation) {
            report.push(package);
        }
    }

    fn run_logged(&mut self, invocation: &Invocation) -> bool {
        emit(Level::Info, "freezer.run", &format!("args {}", invocation), None);
        match self.runner.run(invocation) {
            Ok(outcome) => outcome.success(),
            Err(e) => {
                emit(Level::Warn, "freezer.run_failed", &format!("{:#}", e), None);
                false
            }
        }
    }
}

/// Working directory of a sample under the project root.
pub fn sample_dir(root: &std::path::Path, sample: &str) -> Result<PathBuf> {
    let dir = root.join("samples").join(sample);
    dir.canonicalize()
        .with_context(|| format!("Sample directory {} not found", dir.display()))
}
