//! Installation backends and the per-backend command syntax.

use std::fmt;
use std::path::PathBuf;

use crate::common::platform::{EnvironmentContext, EnvironmentManager};
use crate::common::process::Invocation;

use super::RequirementDirective;

/// The installation ecosystems. Declaration order is execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BackendKind {
    /// MSYS2 pacman
    Pacman,
    /// pip, or pipenv when a pipenv shell is active
    Pip,
    Conda,
}

impl BackendKind {
    /// Backend that receives requirements in this environment.
    pub fn for_environment(ctx: &EnvironmentContext) -> Self {
        match ctx.manager {
            EnvironmentManager::Conda => Self::Conda,
            EnvironmentManager::PosixBridge => Self::Pacman,
            EnvironmentManager::None => Self::Pip,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Pacman => "Pacman",
            Self::Pip => "Pip",
            Self::Conda => "Conda",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Index locations handed to the installers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallOptions {
    pub extra_index_url: Vec<String>,
    pub find_links: Vec<String>,
}

impl InstallOptions {
    pub fn with_extra_index(url: impl Into<String>) -> Self {
        Self {
            extra_index_url: vec![url.into()],
            find_links: Vec::new(),
        }
    }
}

/// Command syntax of one package manager.
pub trait Backend {
    fn install(&self, packages: &[String], args: &[String]) -> Invocation;

    /// `None` when the manager has no usable search command.
    fn search(&self, package: &str, args: &[String]) -> Option<Invocation>;

    fn remove(&self, packages: &[String]) -> Invocation;

    /// Arguments for installing `directive` alone, or for a grouped
    /// command when `directive` is `None`.
    fn translate_args(
        &self,
        directive: Option<&RequirementDirective>,
        options: &InstallOptions,
    ) -> Vec<String>;

    /// Whether `directive` must be installed with its own command.
    fn needs_own_command(&self, _directive: &RequirementDirective) -> bool {
        false
    }
}

#[derive(Debug, Clone)]
pub struct PipBackend {
    pub python: String,
    pub pipenv: bool,
}

impl PipBackend {
    fn directive_flags(&self, d: &RequirementDirective) -> Vec<String> {
        let mut args = Vec::new();
        if d.no_deps && !self.pipenv {
            args.push("--no-deps".to_string());
        }
        if d.only_binary && !self.pipenv {
            args.push(format!("--only-binary={}", d.package_name().unwrap_or(":all:")));
        }
        if d.pre_release {
            args.push("--pre".to_string());
        }
        if d.prefer_binary && !self.pipenv {
            args.push("--prefer-binary".to_string());
        }
        if d.upgrade {
            args.push("--upgrade".to_string());
        }
        args
    }
}

impl Backend for PipBackend {
    fn install(&self, packages: &[String], args: &[String]) -> Invocation {
        let base = if self.pipenv {
            Invocation::new("pipenv").arg("install")
        } else {
            Invocation::new(self.python.as_str()).args(["-m", "pip", "install"])
        };
        base.args(args.iter().cloned()).args(packages.iter().cloned())
    }

    fn search(&self, _package: &str, _args: &[String]) -> Option<Invocation> {
        None
    }

    fn remove(&self, packages: &[String]) -> Invocation {
        let base = if self.pipenv {
            Invocation::new("pipenv").arg("uninstall")
        } else {
            Invocation::new(self.python.as_str()).args(["-m", "pip", "uninstall", "-y"])
        };
        base.args(packages.iter().cloned())
    }

    fn translate_args(
        &self,
        directive: Option<&RequirementDirective>,
        options: &InstallOptions,
    ) -> Vec<String> {
        match directive {
            Some(d) => {
                let mut args = self.directive_flags(d);
                if self.pipenv {
                    if let Some(index) = options.extra_index_url.first() {
                        args.push(format!("--index={}", index));
                    }
                } else {
                    args.extend(options.extra_index_url.iter().map(|u| format!("--extra-index-url={}", u)));
                    args.extend(options.find_links.iter().map(|l| format!("--find-links={}", l)));
                }
                args
            }
            // pipenv takes no index arguments for grouped installs
            None if self.pipenv => Vec::new(),
            None => options
                .find_links
                .iter()
                .map(|l| format!("--find-links={}", l))
                .chain(options.extra_index_url.iter().map(|u| format!("--extra-index-url={}", u)))
                .collect(),
        }
    }

    fn needs_own_command(&self, directive: &RequirementDirective) -> bool {
        !self.directive_flags(directive).is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct CondaBackend {
    pub exe: String,
    pub prefix: PathBuf,
}

impl CondaBackend {
    /// Channel argument for a `<url>/conda` channel under an extra index.
    pub fn channel_for_index(index_url: &str) -> String {
        format!("{}/conda", index_url.strip_suffix('/').unwrap_or(index_url))
    }
}

impl Backend for CondaBackend {
    fn install(&self, packages: &[String], args: &[String]) -> Invocation {
        Invocation::new(self.exe.as_str())
            .args(["install", "--prefix"])
            .arg(self.prefix.to_string_lossy())
            .args(["-y", "-q", "--no-channel-priority", "-S"])
            .args(args.iter().cloned())
            .args(packages.iter().cloned())
    }

    fn search(&self, package: &str, args: &[String]) -> Option<Invocation> {
        Some(
            Invocation::new(self.exe.as_str())
                .args(["search", "--override-channels"])
                .args(args.iter().cloned())
                .args([package, "--json"]),
        )
    }

    fn remove(&self, packages: &[String]) -> Invocation {
        Invocation::new(self.exe.as_str())
            .args(["remove", "-p"])
            .arg(self.prefix.to_string_lossy())
            .args(["-y", "--force-remove"])
            .args(packages.iter().cloned())
    }

    fn translate_args(
        &self,
        directive: Option<&RequirementDirective>,
        _options: &InstallOptions,
    ) -> Vec<String> {
        match directive {
            Some(_) => Vec::new(),
            None => ["--override-channels", "-c", "conda-forge"]
                .map(String::from)
                .to_vec(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PacmanBackend {
    /// `MINGW_PACKAGE_PREFIX`, e.g. `mingw-w64-ucrt-x86_64`
    pub package_prefix: String,
}

impl PacmanBackend {
    /// Fully prefixed package names to try for a Python distribution.
    ///
    /// MSYS2 names Python packages inconsistently (`python-cx-logging`,
    /// `python-Pillow`, plain `cython`), so spelling variants are generated in
    /// a fixed order: namespaced then raw; lowercased copies when the name has
    /// uppercase letters; then `_`/`-` swapped copies.
    pub fn candidates(&self, name: &str) -> Vec<String> {
        let mut names = vec![format!("python-{}", name), name.to_string()];
        if name.chars().any(char::is_uppercase) {
            let lowered: Vec<String> = names.iter().map(|n| n.to_lowercase()).collect();
            names.extend(lowered);
        }
        if name.contains('_') {
            let swapped: Vec<String> = names.iter().map(|n| n.replace('_', "-")).collect();
            names.extend(swapped);
        } else if name.contains('-') {
            let swapped: Vec<String> = names.iter().map(|n| n.replace('-', "_")).collect();
            names.extend(swapped);
        }
        names
            .into_iter()
            .map(|n| format!("{}-{}", self.package_prefix, n))
            .collect()
    }

    /// Install a package file downloaded outside the sync databases.
    pub fn install_file(&self, file: &str) -> Invocation {
        Invocation::new("pacman").args(["--noconfirm", "-U", file])
    }
}

impl Backend for PacmanBackend {
    fn install(&self, packages: &[String], args: &[String]) -> Invocation {
        Invocation::new("pacman")
            .args(["--noconfirm", "--needed", "-S"])
            .args(args.iter().cloned())
            .args(packages.iter().cloned())
    }

    fn search(&self, package: &str, args: &[String]) -> Option<Invocation> {
        Some(
            Invocation::new("pacman")
                .args(["--noconfirm", "-Ss"])
                .args(args.iter().cloned())
                .arg(package),
        )
    }

    fn remove(&self, packages: &[String]) -> Invocation {
        Invocation::new("pacman")
            .args(["--noconfirm", "-R"])
            .args(packages.iter().cloned())
    }

    fn translate_args(
        &self,
        _directive: Option<&RequirementDirective>,
        _options: &InstallOptions,
    ) -> Vec<String> {
        Vec::new()
    }
}

/// Dispatch table: one backend per [`BackendKind`].
#[derive(Debug, Clone)]
pub struct Backends {
    pub pip: PipBackend,
    pub conda: CondaBackend,
    pub pacman: PacmanBackend,
}

impl Backends {
    pub fn new(ctx: &EnvironmentContext) -> Self {
        Self {
            pip: PipBackend {
                python: ctx.interpreter.executable_arg(),
                pipenv: ctx.pipenv_active,
            },
            conda: CondaBackend {
                exe: ctx.conda_exe.clone(),
                prefix: ctx.interpreter.prefix.clone(),
            },
            pacman: PacmanBackend {
                package_prefix: ctx.mingw_package_prefix.clone(),
            },
        }
    }

    pub fn get(&self, kind: BackendKind) -> &dyn Backend {
        match kind {
            BackendKind::Pip => &self.pip,
            BackendKind::Conda => &self.conda,
            BackendKind::Pacman => &self.pacman,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::platform::Platform;

    fn pip(pipenv: bool) -> PipBackend {
        PipBackend {
            python: "python".to_string(),
            pipenv,
        }
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_for_environment() {
        let cases = [
            (EnvironmentManager::None, BackendKind::Pip),
            (EnvironmentManager::Conda, BackendKind::Conda),
            (EnvironmentManager::PosixBridge, BackendKind::Pacman),
        ];
        for (manager, expected) in cases {
            let ctx = EnvironmentContext::fixture(Platform::Linux, manager);
            assert_eq!(BackendKind::for_environment(&ctx), expected);
        }
    }

    #[test]
    fn test_pip_directive_args() {
        let options = InstallOptions {
            extra_index_url: strings(&["https://a/", "https://b/"]),
            find_links: strings(&["wheels"]),
        };
        let d = RequirementDirective::parse("lief --only-binary --no-deps --pre --prefer-binary --upgrade", false);
        assert_eq!(
            pip(false).translate_args(Some(&d), &options),
            strings(&[
                "--no-deps",
                "--only-binary=lief",
                "--pre",
                "--prefer-binary",
                "--upgrade",
                "--extra-index-url=https://a/",
                "--extra-index-url=https://b/",
                "--find-links=wheels",
            ])
        );
        assert_eq!(
            pip(true).translate_args(Some(&d), &options),
            strings(&["--pre", "--upgrade", "--index=https://a/"])
        );
    }

    #[test]
    fn test_pip_grouped_args() {
        let options = InstallOptions {
            extra_index_url: strings(&["https://a/"]),
            find_links: strings(&["wheels"]),
        };
        assert_eq!(
            pip(false).translate_args(None, &options),
            strings(&["--find-links=wheels", "--extra-index-url=https://a/"])
        );
        assert!(pip(true).translate_args(None, &options).is_empty());
    }

    #[test]
    fn test_pip_needs_own_command() {
        let plain = RequirementDirective::parse("a", false);
        let no_deps = RequirementDirective::parse("b --no-deps", false);
        assert!(!pip(false).needs_own_command(&plain));
        assert!(pip(false).needs_own_command(&no_deps));
        // pipenv drops --no-deps, so nothing is left to translate
        assert!(!pip(true).needs_own_command(&no_deps));
    }

    #[test]
    fn test_pip_commands() {
        let install = pip(false).install(&strings(&["a", "b"]), &strings(&["--upgrade"]));
        assert_eq!(install.command_line(), "python -m pip install --upgrade a b");
        let install = pip(true).install(&strings(&["a"]), &[]);
        assert_eq!(install.command_line(), "pipenv install a");
        assert!(pip(false).search("a", &[]).is_none());
        assert_eq!(
            pip(false).remove(&strings(&["cx_Freeze"])).command_line(),
            "python -m pip uninstall -y cx_Freeze"
        );
    }

    #[test]
    fn test_conda_commands() {
        let conda = CondaBackend {
            exe: "conda".to_string(),
            prefix: PathBuf::from("/opt/env"),
        };
        let args = conda.translate_args(None, &InstallOptions::default());
        assert_eq!(
            conda.install(&strings(&["tomli"]), &args).command_line(),
            "conda install --prefix /opt/env -y -q --no-channel-priority -S --override-channels -c conda-forge tomli"
        );
        let channel = CondaBackend::channel_for_index("https://example.org/packages/");
        assert_eq!(channel, "https://example.org/packages/conda");
        let search = conda.search("lief", &["-c".to_string(), channel]).unwrap();
        assert_eq!(
            search.command_line(),
            "conda search --override-channels -c https://example.org/packages/conda lief --json"
        );
        assert_eq!(
            conda.remove(&strings(&["cx_freeze"])).command_line(),
            "conda remove -p /opt/env -y --force-remove cx_freeze"
        );
    }

    #[test]
    fn test_pacman_candidates() {
        let pacman = PacmanBackend {
            package_prefix: "mingw-w64-x86_64".to_string(),
        };
        assert_eq!(
            pacman.candidates("cx_Logging"),
            strings(&[
                "mingw-w64-x86_64-python-cx_Logging",
                "mingw-w64-x86_64-cx_Logging",
                "mingw-w64-x86_64-python-cx_logging",
                "mingw-w64-x86_64-cx_logging",
                "mingw-w64-x86_64-python-cx-Logging",
                "mingw-w64-x86_64-cx-Logging",
                "mingw-w64-x86_64-python-cx-logging",
                "mingw-w64-x86_64-cx-logging",
            ])
        );
        assert_eq!(
            pacman.candidates("typing-extensions"),
            strings(&[
                "mingw-w64-x86_64-python-typing-extensions",
                "mingw-w64-x86_64-typing-extensions",
                "mingw-w64-x86_64-python_typing_extensions",
                "mingw-w64-x86_64-typing_extensions",
            ])
        );
        assert_eq!(
            pacman.candidates("cython"),
            strings(&["mingw-w64-x86_64-python-cython", "mingw-w64-x86_64-cython"])
        );
    }

    #[test]
    fn test_pacman_candidates_deterministic() {
        let pacman = PacmanBackend {
            package_prefix: "mingw-w64-ucrt-x86_64".to_string(),
        };
        for name in ["Pillow", "cx_Freeze", "py-lief", "tomli"] {
            assert_eq!(pacman.candidates(name), pacman.candidates(name));
        }
        assert_eq!(pacman.candidates("Pillow").len(), 4);
    }

    #[test]
    fn test_pacman_commands() {
        let pacman = PacmanBackend {
            package_prefix: "mingw-w64-x86_64".to_string(),
        };
        assert_eq!(
            pacman.search("mingw-w64-x86_64-python-foo", &[]).unwrap().command_line(),
            "pacman --noconfirm -Ss mingw-w64-x86_64-python-foo"
        );
        assert_eq!(
            pacman.install(&strings(&["mingw-w64-x86_64-python-foo"]), &[]).command_line(),
            "pacman --noconfirm --needed -S mingw-w64-x86_64-python-foo"
        );
        assert_eq!(
            pacman.install_file("/tmp/pkg.tar.zst").command_line(),
            "pacman --noconfirm -U /tmp/pkg.tar.zst"
        );
        assert_eq!(
            pacman.remove(&strings(&["mingw-w64-x86_64-python-cx-freeze"])).command_line(),
            "pacman --noconfirm -R mingw-w64-x86_64-python-cx-freeze"
        );
    }

    #[test]
    fn test_dispatch_table() {
        let ctx = EnvironmentContext::fixture(Platform::Linux, EnvironmentManager::None);
        let backends = Backends::new(&ctx);
        let packages = strings(&["tomli"]);
        let lines: Vec<String> = [BackendKind::Pip, BackendKind::Conda, BackendKind::Pacman]
            .into_iter()
            .map(|kind| backends.get(kind).install(&packages, &[]).command_line())
            .collect();
        assert!(lines[0].starts_with("/usr/bin/python3 -m pip install"));
        assert!(lines[1].starts_with("conda install"));
        assert!(lines[2].starts_with("pacman"));
        assert_eq!(backends.pip.python, "/usr/bin/python3");
    }
}
