//! Installed state of the freezer distribution itself.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use crate::common::package::{Backend, CondaBackend, PacmanBackend, PipBackend};
use crate::common::platform::{EnvironmentContext, EnvironmentManager};
use crate::common::process::{CommandRunner, Invocation};
use crate::ui::prelude::*;

pub const DISTRIBUTION: &str = "cx_Freeze";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreezerStatus {
    pub version: String,
    pub installed: bool,
}

impl FreezerStatus {
    /// Installed version from package metadata, or the version in the
    /// source tree under `root` when the distribution is not installed.
    pub fn detect(ctx: &EnvironmentContext, root: &Path, runner: &mut dyn CommandRunner) -> Self {
        let query = Invocation::new(ctx.interpreter.executable_arg()).args([
            "-c".to_string(),
            format!(
                "import importlib.metadata as m; print(m.version('{}'))",
                DISTRIBUTION
            ),
        ]);
        if let Ok(outcome) = runner.capture(&query) {
            let version = outcome.stdout.trim();
            if outcome.success() && !version.is_empty() {
                return Self {
                    version: version.to_string(),
                    installed: true,
                };
            }
        }

        Self {
            version: source_version(root).unwrap_or_default(),
            installed: false,
        }
    }

    /// Requirement for the matching release series, e.g. `cx_Freeze~=7.2.0`.
    pub fn compatible_requirement(&self) -> String {
        let mut series = self.version.clone();
        series.pop();
        format!("{}~={}0", DISTRIBUTION, series)
    }
}

/// `__version__` from `<root>/cx_Freeze/__init__.py`, normalised.
pub fn source_version(root: &Path) -> Option<String> {
    let init = root.join(DISTRIBUTION).join("__init__.py");
    let content = fs::read_to_string(init).ok()?;
    content
        .lines()
        .find(|line| line.starts_with("__version__"))
        .and_then(|line| line.split('=').nth(1))
        .map(|v| v.replace('-', ".").trim().replace(['"', '\''], ""))
}

/// MSYS2 package name of the freezer.
pub fn mingw_package(ctx: &EnvironmentContext) -> String {
    format!("{}-python-cx-freeze", ctx.mingw_package_prefix)
}

/// Remove the installed freezer from every ecosystem that may own it, then
/// clear extension modules left in the source tree by an editable install.
pub fn uninstall(ctx: &EnvironmentContext, root: &Path, runner: &mut dyn CommandRunner) -> Result<()> {
    let native = match ctx.manager {
        EnvironmentManager::Conda => Some(
            CondaBackend {
                exe: ctx.conda_exe.clone(),
                prefix: ctx.interpreter.prefix.clone(),
            }
            .remove(&["cx_freeze".to_string()]),
        ),
        EnvironmentManager::PosixBridge => Some(
            PacmanBackend {
                package_prefix: ctx.mingw_package_prefix.clone(),
            }
            .remove(&[mingw_package(ctx)]),
        ),
        EnvironmentManager::None => None,
    };
    let pip = PipBackend {
        python: ctx.interpreter.executable_arg(),
        pipenv: false,
    }
    .remove(&[DISTRIBUTION.to_string()]);

    for invocation in native.iter().chain(std::iter::once(&pip)) {
        emit(Level::Info, "freezer.uninstall", &format!("args {}", invocation), None);
        // a missing package is not an error here
        if let Err(e) = runner.run(invocation) {
            emit(Level::Warn, "freezer.uninstall_failed", &format!("{:#}", e), None);
        }
    }

    if let Some(suffix) = &ctx.interpreter.ext_suffix {
        remove_stale_extensions(&root.join(DISTRIBUTION).join("bases").join("lib-dynload"), suffix)?;
    }
    Ok(())
}

/// Delete `*<suffix>` files directly inside `dynload`.
pub fn remove_stale_extensions(dynload: &Path, suffix: &str) -> Result<usize> {
    let pattern = format!(
        "{}/*{}",
        glob::Pattern::escape(&dynload.to_string_lossy()),
        glob::Pattern::escape(suffix)
    );
    let mut removed = 0;
    for path in glob::glob(&pattern)
        .with_context(|| format!("Invalid extension pattern {}", pattern))?
        .filter_map(|entry| entry.ok())
        .filter(|path| path.is_file())
    {
        fs::remove_file(&path).with_context(|| format!("Failed to remove {}", path.display()))?;
        removed += 1;
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::platform::Platform;
    use crate::common::process::testing::ScriptedRunner;

    fn write_source_tree(root: &Path, version_line: &str) {
        let pkg = root.join(DISTRIBUTION);
        fs::create_dir_all(&pkg).unwrap();
        fs::write(pkg.join("__init__.py"), format!("\"\"\"doc\"\"\"\n{}\n", version_line)).unwrap();
    }

    #[test]
    fn test_detect_installed() {
        let ctx = EnvironmentContext::fixture(Platform::Linux, EnvironmentManager::None);
        let root = tempfile::tempdir().unwrap();
        let mut runner = ScriptedRunner::new().respond("importlib.metadata", 0, "7.2.3\n");
        let status = FreezerStatus::detect(&ctx, root.path(), &mut runner);
        assert_eq!(
            status,
            FreezerStatus {
                version: "7.2.3".to_string(),
                installed: true
            }
        );
    }

    #[test]
    fn test_detect_falls_back_to_source() {
        let ctx = EnvironmentContext::fixture(Platform::Linux, EnvironmentManager::None);
        let root = tempfile::tempdir().unwrap();
        write_source_tree(root.path(), "__version__ = \"7.3.0-dev5\"");
        let mut runner = ScriptedRunner::new().respond("importlib.metadata", 1, "");
        let status = FreezerStatus::detect(&ctx, root.path(), &mut runner);
        assert!(!status.installed);
        assert_eq!(status.version, "7.3.0.dev5");
        assert_eq!(status.compatible_requirement(), "cx_Freeze~=7.3.0.dev0");
    }

    #[test]
    fn test_compatible_requirement() {
        let status = FreezerStatus {
            version: "7.2.3".to_string(),
            installed: false,
        };
        assert_eq!(status.compatible_requirement(), "cx_Freeze~=7.2.0");
    }

    #[test]
    fn test_uninstall_conda() {
        let ctx = EnvironmentContext::fixture(Platform::Linux, EnvironmentManager::Conda);
        let root = tempfile::tempdir().unwrap();
        let mut runner = ScriptedRunner::new().respond("conda remove", 1, "");
        uninstall(&ctx, root.path(), &mut runner).unwrap();
        assert_eq!(
            runner.command_lines(),
            vec![
                "conda remove -p /nonexistent/prefix -y --force-remove cx_freeze",
                "/usr/bin/python3 -m pip uninstall -y cx_Freeze",
            ]
        );
    }

    #[test]
    fn test_uninstall_mingw_and_dynload_cleanup() {
        let ctx = EnvironmentContext::fixture(Platform::Mingw, EnvironmentManager::PosixBridge);
        let root = tempfile::tempdir().unwrap();
        let dynload = root.path().join("cx_Freeze/bases/lib-dynload");
        fs::create_dir_all(&dynload).unwrap();
        let suffix = ctx.interpreter.ext_suffix.clone().unwrap();
        fs::write(dynload.join(format!("_bz2{}", suffix)), b"").unwrap();
        fs::write(dynload.join("README.txt"), b"").unwrap();

        let mut runner = ScriptedRunner::new();
        uninstall(&ctx, root.path(), &mut runner).unwrap();

        assert_eq!(
            runner.command_lines()[0],
            "pacman --noconfirm -R mingw-w64-x86_64-python-cx-freeze"
        );
        let left: Vec<_> = fs::read_dir(&dynload).unwrap().map(|e| e.unwrap().file_name()).collect();
        assert_eq!(left, vec![std::ffi::OsString::from("README.txt")]);
    }

    #[test]
    fn test_remove_stale_extensions_matches_top_level_files() {
        let root = tempfile::tempdir().unwrap();
        let dynload = root.path().join("build [x86]/lib-dynload");
        let suffix = ".cpython-312-x86_64-linux-gnu.so";
        assert_eq!(remove_stale_extensions(&dynload, suffix).unwrap(), 0);

        fs::create_dir_all(dynload.join(format!("nested{}", suffix))).unwrap();
        fs::write(dynload.join(format!("_ssl{}", suffix)), b"").unwrap();
        fs::write(dynload.join(format!("_ctypes{}", suffix)), b"").unwrap();
        fs::write(dynload.join("_ssl.cpython-311-x86_64-linux-gnu.so"), b"").unwrap();

        assert_eq!(remove_stale_extensions(&dynload, suffix).unwrap(), 2);
        let mut left: Vec<_> = fs::read_dir(&dynload).unwrap().map(|e| e.unwrap().file_name()).collect();
        left.sort();
        assert_eq!(
            left,
            vec![
                std::ffi::OsString::from("_ssl.cpython-311-x86_64-linux-gnu.so"),
                std::ffi::OsString::from(format!("nested{}", suffix)),
            ]
        );
    }
}
