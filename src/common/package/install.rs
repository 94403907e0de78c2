//! Execution of install batches against the real package managers.
//!
//! Failures here never abort the run: a failed command is logged and the
//! affected packages are simply missing from the result.

use lazy_static::lazy_static;
use regex::Regex;

use crate::common::platform::EnvironmentContext;
use crate::common::process::{CommandOutcome, CommandRunner, Invocation};
use crate::ui::prelude::*;

use super::manager::CondaBackend;
use super::{Backend, BackendKind, Backends, InstallBatch, InstallOptions, RequirementDirective};

lazy_static! {
    static ref CONDA_BUILD_PYVER: Regex = Regex::new(r"(py)(\d*)\s*").expect("valid conda build pattern");
}

/// Outcome of executing one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionResult {
    /// Every command in the batch exited with status 0.
    pub succeeded: bool,
    pub installed: Vec<String>,
    /// Directives the backend could not resolve, to be retried elsewhere.
    pub unresolved: Vec<RequirementDirective>,
}

/// Runs batches one command at a time.
pub struct Executor<'a> {
    ctx: &'a EnvironmentContext,
    backends: &'a Backends,
    options: &'a InstallOptions,
    runner: &'a mut dyn CommandRunner,
}

impl<'a> Executor<'a> {
    pub fn new(
        ctx: &'a EnvironmentContext,
        backends: &'a Backends,
        options: &'a InstallOptions,
        runner: &'a mut dyn CommandRunner,
    ) -> Self {
        Self {
            ctx,
            backends,
            options,
            runner,
        }
    }

    pub fn execute(&mut self, batch: &InstallBatch) -> ExecutionResult {
        if batch.is_empty() {
            return ExecutionResult {
                succeeded: true,
                ..ExecutionResult::default()
            };
        }

        emit(
            Level::Debug,
            "install.batch",
            &format!(
                "Installing {} requirement{} via {}",
                batch.len(),
                if batch.len() == 1 { "" } else { "s" },
                batch.kind.display_name()
            ),
            None,
        );

        match batch.kind {
            BackendKind::Pip => self.execute_pip(batch),
            BackendKind::Conda => self.execute_conda(batch),
            BackendKind::Pacman => self.execute_pacman(batch),
        }
    }

    /// Run a command with inherited stdio. Spawn errors count as failure.
    fn run(&mut self, invocation: &Invocation) -> bool {
        self.attempt(invocation, false)
            .is_some_and(|outcome| outcome.success())
    }

    fn attempt(&mut self, invocation: &Invocation, capture: bool) -> Option<CommandOutcome> {
        emit(
            Level::Info,
            "install.command",
            &format!("args {}", invocation.command_line()),
            None,
        );
        let result = if capture {
            self.runner.capture(invocation)
        } else {
            self.runner.run(invocation)
        };
        match result {
            Ok(outcome) => {
                if !outcome.success() {
                    emit(
                        Level::Warn,
                        "install.command_failed",
                        &format!(
                            "{} exited with {}",
                            invocation.program,
                            outcome
                                .code
                                .map(|c| c.to_string())
                                .unwrap_or_else(|| "a signal".to_string())
                        ),
                        None,
                    );
                }
                Some(outcome)
            }
            Err(e) => {
                emit(Level::Warn, "install.spawn_failed", &format!("{:#}", e), None);
                None
            }
        }
    }

    /// Run a pip command, retrying once with `--pre` on preview interpreters.
    fn run_with_prerelease_retry(&mut self, mut invocation: Invocation, pre_requested: bool) -> bool {
        if self.run(&invocation) {
            return true;
        }
        if !self.ctx.is_preview() || pre_requested {
            return false;
        }
        emit(
            Level::Info,
            "install.retry_pre",
            "Preview interpreter: retrying with pre-releases allowed",
            None,
        );
        invocation.push_arg("--pre");
        self.run(&invocation)
    }

    fn execute_pip(&mut self, batch: &InstallBatch) -> ExecutionResult {
        let backends = self.backends;
        let pip = &backends.pip;
        let mut result = ExecutionResult {
            succeeded: true,
            ..ExecutionResult::default()
        };

        for directive in &batch.individual {
            let Some(package) = &directive.package else {
                continue;
            };
            let args = pip.translate_args(Some(directive), self.options);
            let invocation = pip.install(&[package.to_string()], &args);
            if self.run_with_prerelease_retry(invocation, directive.pre_release) {
                result.installed.push(package.name().to_string());
            } else {
                result.succeeded = false;
            }
        }

        let packages: Vec<String> = batch
            .grouped
            .iter()
            .filter_map(|d| d.package.as_ref().map(ToString::to_string))
            .collect();
        if !packages.is_empty() {
            let args = pip.translate_args(None, self.options);
            let invocation = pip.install(&packages, &args);
            let pre_requested = batch.grouped.iter().any(|d| d.pre_release);
            if self.run_with_prerelease_retry(invocation, pre_requested) {
                result.installed.extend(packages);
            } else {
                result.succeeded = false;
            }
        }

        result
    }

    /// Find a package file built for this interpreter in the `<index>/conda`
    /// channels. A match in a later index replaces an earlier one.
    fn find_conda_package_url(&mut self, name: &str) -> Option<String> {
        let (ctx, backends, options) = (self.ctx, self.backends, self.options);
        let conda = &backends.conda;
        let mut found = None;

        for index in &options.extra_index_url {
            let channel = ["-c".to_string(), CondaBackend::channel_for_index(index)];
            let Some(search) = conda.search(name, &channel) else {
                continue;
            };
            let Some(outcome) = self.attempt(&search, true) else {
                continue;
            };
            if !outcome.success() {
                continue;
            }
            match conda_url_for_python(&outcome.stdout, name, &ctx.interpreter.py_version_nodot) {
                Ok(Some(url)) => found = Some(url),
                Ok(None) => {}
                Err(e) => emit(
                    Level::Warn,
                    "install.conda_search_output",
                    &format!("Unreadable conda search output for {}: {}", name, e),
                    None,
                ),
            }
        }

        found
    }

    fn execute_conda(&mut self, batch: &InstallBatch) -> ExecutionResult {
        let mut result = ExecutionResult {
            succeeded: true,
            ..ExecutionResult::default()
        };
        let mut remaining = Vec::new();

        for directive in batch.individual.iter().chain(&batch.grouped) {
            let Some(package) = &directive.package else {
                continue;
            };
            if !self.options.extra_index_url.is_empty() {
                if let Some(url) = self.find_conda_package_url(package.name()) {
                    let invocation = self.backends.conda.install(&[url.clone()], &[]);
                    if self.run(&invocation) {
                        result.installed.push(url);
                    } else {
                        result.succeeded = false;
                    }
                    continue;
                }
            }
            remaining.push(package.to_string());
        }

        if !remaining.is_empty() {
            let conda = &self.backends.conda;
            let args = conda.translate_args(None, self.options);
            let invocation = conda.install(&remaining, &args);
            if self.run(&invocation) {
                result.installed.extend(remaining);
            } else {
                result.succeeded = false;
            }
        }

        result
    }

    /// Try each MSYS2 spelling until one is installed or already present.
    fn install_with_pacman(&mut self, name: &str) -> Option<String> {
        let backends = self.backends;
        let pacman = &backends.pacman;
        for candidate in pacman.candidates(name) {
            let Some(search) = pacman.search(&candidate, &[]) else {
                continue;
            };
            let Some(outcome) = self.attempt(&search, true) else {
                continue;
            };
            match outcome.code {
                Some(1) => continue,
                Some(0) if outcome.stdout.contains("installed") => {
                    emit(
                        Level::Debug,
                        "install.already_installed",
                        &format!("{} is already installed", candidate),
                        None,
                    );
                    return Some(candidate);
                }
                _ => {}
            }
            let install = pacman.install(&[candidate.clone()], &[]);
            if self.run(&install) {
                return Some(candidate);
            }
        }
        None
    }

    fn execute_pacman(&mut self, batch: &InstallBatch) -> ExecutionResult {
        let mut result = ExecutionResult {
            succeeded: true,
            ..ExecutionResult::default()
        };

        for directive in batch.individual.iter().chain(&batch.grouped) {
            let Some(name) = directive.package_name() else {
                continue;
            };
            match self.install_with_pacman(name) {
                Some(package) => result.installed.push(package),
                None => {
                    emit(
                        Level::Debug,
                        "install.pacman_fallback",
                        &format!("No MSYS2 package for {}, falling back to pip", name),
                        None,
                    );
                    result.unresolved.push(directive.clone());
                }
            }
        }

        result
    }
}

/// Pick the file URL whose build string targets `py_version_nodot`.
///
/// `output` is the JSON printed by `conda search --json`, keyed by package
/// name with a list of files carrying `build` and `url`.
pub fn conda_url_for_python(
    output: &str,
    name: &str,
    py_version_nodot: &str,
) -> Result<Option<String>, serde_json::Error> {
    let value: serde_json::Value = serde_json::from_str(output)?;
    let Some(files) = value.get(name).and_then(|v| v.as_array()) else {
        return Ok(None);
    };

    Ok(files.iter().find_map(|file| {
        let build = file.get("build")?.as_str()?;
        let caps = CONDA_BUILD_PYVER.captures(build)?;
        if caps.get(2).map(|m| m.as_str()) == Some(py_version_nodot) {
            file.get("url")?.as_str().map(String::from)
        } else {
            None
        }
    }))
}
