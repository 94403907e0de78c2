//! Entry point tying parsing, filtering, dispatch and execution together.

use std::collections::HashSet;
use std::fmt;

use crate::common::platform::EnvironmentContext;
use crate::common::process::CommandRunner;
use crate::error::ConfigError;
use crate::ui::prelude::*;

use super::batch::{dispatch, route};
use super::eligibility::is_eligible;
use super::{BackendKind, Backends, Executor, InstallOptions, RequirementDirective};

/// Ordered identifiers of everything confirmed installed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallReport {
    installed: Vec<String>,
}

impl InstallReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend<I: IntoIterator<Item = String>>(&mut self, packages: I) {
        self.installed.extend(packages);
    }

    pub fn merge(&mut self, other: InstallReport) {
        self.installed.extend(other.installed);
    }

    pub fn push(&mut self, package: impl Into<String>) {
        self.installed.push(package.into());
    }

    pub fn packages(&self) -> &[String] {
        &self.installed
    }

    pub fn is_empty(&self) -> bool {
        self.installed.is_empty()
    }
}

impl fmt::Display for InstallReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.installed.join(" "))
    }
}

/// Install a set of requirement tokens with whatever backend owns the
/// interpreter.
///
/// Duplicate tokens are installed once. Only malformed python-version
/// constraints abort; every other failure just leaves the package out of
/// the report.
pub fn install_requirements<S: AsRef<str>>(
    requires: &[S],
    options: &InstallOptions,
    ctx: &EnvironmentContext,
    runner: &mut dyn CommandRunner,
) -> Result<InstallReport, ConfigError> {
    let mut seen = HashSet::new();
    let mut directives = Vec::new();
    for token in requires.iter().map(AsRef::as_ref) {
        if !seen.insert(token) {
            continue;
        }
        let directive = RequirementDirective::parse(token, ctx.upgrade_by_default);
        if is_eligible(&directive, ctx)? {
            directives.push(directive);
        } else {
            emit(
                Level::Debug,
                "install.skipped",
                &format!("Skipping '{}' on {}", token.trim(), ctx.platform),
                None,
            );
        }
    }

    let backends = Backends::new(ctx);
    let mut plan = dispatch(&directives, BackendKind::for_environment(ctx), &backends);
    let mut report = InstallReport::new();
    let mut executor = Executor::new(ctx, &backends, options, runner);

    // MSYS2 misses fall through to pip, so pacman has to run first.
    if let Some(batch) = plan.remove(&BackendKind::Pacman) {
        let result = executor.execute(&batch);
        report.extend(result.installed);
        for directive in &result.unresolved {
            route(&mut plan, BackendKind::Pip, directive, &backends);
        }
    }

    for batch in plan.values() {
        let result = executor.execute(batch);
        if !result.succeeded {
            emit(
                Level::Debug,
                "install.batch_incomplete",
                &format!("Some {} installs failed", batch.kind),
                None,
            );
        }
        report.extend(result.installed);
    }

    Ok(report)
}
