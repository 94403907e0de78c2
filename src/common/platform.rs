//! Platform classification for the interpreter being provisioned.
//!
//! Detection happens once: [`InterpreterInfo::probe`] asks the target Python
//! about itself, then [`EnvironmentContext::classify`] folds that together with
//! a snapshot of the environment variables. The resulting context is passed by
//! reference to everything that needs it and never changes afterwards.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use duct::cmd;
use serde::Deserialize;

use crate::error::ConfigError;

/// Operating environment, named by the tags used in platform constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Platform {
    Linux,
    Macos,
    /// MSYS2 / MinGW Python on Windows
    Mingw,
    /// Native Windows Python
    Windows,
}

impl Platform {
    pub const ALL: [Platform; 4] = [
        Platform::Linux,
        Platform::Macos,
        Platform::Mingw,
        Platform::Windows,
    ];

    pub fn tag(&self) -> &'static str {
        match self {
            Self::Linux => "linux",
            Self::Macos => "macos",
            Self::Mingw => "mingw",
            Self::Windows => "windows",
        }
    }

    /// Map a `sysconfig.get_platform()` string. Anything unrecognised is linux.
    pub fn from_sysconfig(platform: &str) -> Self {
        if platform.starts_with("macos") {
            Self::Macos
        } else if platform.starts_with("mingw") {
            Self::Mingw
        } else if platform.starts_with("win") {
            Self::Windows
        } else {
            Self::Linux
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// Which package ecosystem owns the interpreter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvironmentManager {
    None,
    Conda,
    PosixBridge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseChannel {
    Final,
    Preview,
}

const PROBE_SCRIPT: &str = r#"import json, sys, sysconfig
print(json.dumps({
    "executable": sys.executable,
    "prefix": sys.prefix,
    "platform": sysconfig.get_platform(),
    "version": list(sys.version_info[:3]),
    "releaselevel": sys.version_info.releaselevel,
    "python_version": sysconfig.get_python_version(),
    "py_version_nodot": sysconfig.get_config_var("py_version_nodot"),
    "ext_suffix": sysconfig.get_config_var("EXT_SUFFIX"),
}))"#;

/// Facts reported by the target interpreter.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InterpreterInfo {
    pub executable: PathBuf,
    pub prefix: PathBuf,
    pub platform: String,
    pub version: [u32; 3],
    pub releaselevel: String,
    /// `major.minor`
    pub python_version: String,
    pub py_version_nodot: String,
    pub ext_suffix: Option<String>,
}

impl InterpreterInfo {
    pub fn probe(python: &str) -> Result<Self, ConfigError> {
        let probe_error = |reason: String| ConfigError::InterpreterProbe {
            python: python.to_string(),
            reason,
        };

        let output = cmd!(python, "-c", PROBE_SCRIPT)
            .stdout_capture()
            .stderr_capture()
            .unchecked()
            .run()
            .map_err(|e| probe_error(e.to_string()))?;

        if !output.status.success() {
            return Err(probe_error(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        Self::from_json(&String::from_utf8_lossy(&output.stdout))
            .map_err(|e| probe_error(e.to_string()))
    }

    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw.trim())
    }

    /// `sys.executable` as a string argument for subprocesses.
    pub fn executable_arg(&self) -> String {
        self.executable.to_string_lossy().into_owned()
    }
}

/// Process-wide facts, established once and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentContext {
    pub interpreter: InterpreterInfo,
    pub platform: Platform,
    pub manager: EnvironmentManager,
    pub conda_exe: String,
    pub mingw_package_prefix: String,
    pub release: ReleaseChannel,
    pub upgrade_by_default: bool,
    pub pipenv_active: bool,
    pub ci: bool,
    pub manylinux: bool,
}

fn flag_set(vars: &HashMap<String, String>, key: &str) -> bool {
    vars.get(key).is_some_and(|v| !v.is_empty())
}

impl EnvironmentContext {
    /// Classify from interpreter facts and an environment snapshot.
    ///
    /// The only filesystem access is the `conda-meta` marker under the
    /// interpreter prefix.
    pub fn classify(interpreter: InterpreterInfo, vars: &HashMap<String, String>) -> Self {
        let platform = Platform::from_sysconfig(&interpreter.platform);
        let manager = if is_conda_prefix(&interpreter.prefix) {
            EnvironmentManager::Conda
        } else if platform == Platform::Mingw {
            EnvironmentManager::PosixBridge
        } else {
            EnvironmentManager::None
        };
        let release = if interpreter.releaselevel == "final" {
            ReleaseChannel::Final
        } else {
            ReleaseChannel::Preview
        };

        Self {
            platform,
            manager,
            conda_exe: vars
                .get("CONDA_EXE")
                .cloned()
                .unwrap_or_else(|| "conda".to_string()),
            mingw_package_prefix: vars.get("MINGW_PACKAGE_PREFIX").cloned().unwrap_or_default(),
            release,
            upgrade_by_default: flag_set(vars, "PIP_UPGRADE"),
            pipenv_active: flag_set(vars, "PIPENV_ACTIVE"),
            ci: vars.get("CI").is_some_and(|v| v == "true"),
            manylinux: vars
                .get("AUDITWHEEL_PLAT")
                .is_some_and(|v| v.starts_with("manylinux")),
            interpreter,
        }
    }

    /// Probe `python` and classify against the current process environment.
    pub fn detect(python: &str) -> Result<Self, ConfigError> {
        let interpreter = InterpreterInfo::probe(python)?;
        let vars: HashMap<String, String> = std::env::vars().collect();
        Ok(Self::classify(interpreter, &vars))
    }

    pub fn is_preview(&self) -> bool {
        self.release == ReleaseChannel::Preview
    }

    pub fn is_conda(&self) -> bool {
        self.manager == EnvironmentManager::Conda
    }

    pub fn python_version(&self) -> [u32; 3] {
        self.interpreter.version
    }
}

fn is_conda_prefix(prefix: &Path) -> bool {
    prefix.join("conda-meta").is_dir()
}

#[cfg(test)]
impl InterpreterInfo {
    pub(crate) fn fixture(platform: &str) -> Self {
        Self {
            executable: PathBuf::from("/usr/bin/python3"),
            prefix: PathBuf::from("/nonexistent/prefix"),
            platform: platform.to_string(),
            version: [3, 12, 1],
            releaselevel: "final".to_string(),
            python_version: "3.12".to_string(),
            py_version_nodot: "312".to_string(),
            ext_suffix: Some(".cpython-312-x86_64-linux-gnu.so".to_string()),
        }
    }
}

#[cfg(test)]
impl EnvironmentContext {
    pub(crate) fn fixture(platform: Platform, manager: EnvironmentManager) -> Self {
        let sysconfig_platform = match platform {
            Platform::Linux => "linux-x86_64",
            Platform::Macos => "macosx-11.0-arm64",
            Platform::Mingw => "mingw_x86_64",
            Platform::Windows => "win-amd64",
        };
        Self {
            interpreter: InterpreterInfo::fixture(sysconfig_platform),
            platform,
            manager,
            conda_exe: "conda".to_string(),
            mingw_package_prefix: "mingw-w64-x86_64".to_string(),
            release: ReleaseChannel::Final,
            upgrade_by_default: false,
            pipenv_active: false,
            ci: false,
            manylinux: false,
        }
    }
}
