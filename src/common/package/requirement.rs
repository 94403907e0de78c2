//! Requirement tokens and their parsed directives.
//!
//! A token is a whitespace separated list of sub-tokens, for example
//! `lief>=0.13 --conda=py-lief --only-binary --platform=!mingw`. Each
//! sub-token is either one of the recognised flags or the package
//! expression. Flags may appear in any order; a repeated flag overwrites
//! the earlier value. When several non-flag sub-tokens appear, the last
//! one is the package expression.

use std::fmt;

use crate::ui::prelude::*;

use super::BackendKind;

/// Package name plus optional version specifier, e.g. `cx_Freeze~=7.2.0`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PackageSpec(String);

impl PackageSpec {
    pub fn new(spec: impl Into<String>) -> Self {
        Self(spec.into())
    }

    /// Distribution name without extras, markers or version specifier.
    pub fn name(&self) -> &str {
        let end = self
            .0
            .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')))
            .unwrap_or(self.0.len());
        &self.0[..end]
    }
}

impl fmt::Display for PackageSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One sub-token of a requirement string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token<'a> {
    CondaAlias(&'a str),
    MingwAlias(&'a str),
    NoDeps,
    Platform(&'a str),
    PythonVersion(&'a str),
    OnlyBinary,
    Pre,
    PreferBinary,
    Upgrade,
    Package(&'a str),
}

impl<'a> Token<'a> {
    fn classify(sub: &'a str) -> Self {
        if let Some(alias) = sub.strip_prefix("--conda=") {
            Token::CondaAlias(alias)
        } else if let Some(alias) = sub.strip_prefix("--mingw=") {
            Token::MingwAlias(alias)
        } else if sub == "--no-deps" {
            Token::NoDeps
        } else if let Some(rest) = sub.strip_prefix("--platform=") {
            Token::Platform(rest.split('=').next().unwrap_or_default())
        } else if let Some(expr) = sub.strip_prefix("--python-version") {
            Token::PythonVersion(expr)
        } else if sub == "--only-binary" {
            Token::OnlyBinary
        } else if sub == "--pre" {
            Token::Pre
        } else if sub == "--prefer-binary" {
            Token::PreferBinary
        } else if sub == "--upgrade" {
            Token::Upgrade
        } else {
            Token::Package(sub)
        }
    }
}

/// Structured form of one requirement token.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequirementDirective {
    pub package: Option<PackageSpec>,
    /// Replacement spec on conda. `Some("")` skips the requirement there.
    pub conda_alias: Option<String>,
    /// Replacement name on MSYS2. `Some("")` skips the requirement there.
    pub mingw_alias: Option<String>,
    pub no_deps: bool,
    /// Comma separated platform tags, `!tag` denies.
    pub platform: Option<String>,
    /// Comparison such as `>=3.10`.
    pub python_version: Option<String>,
    pub only_binary: bool,
    pub pre_release: bool,
    pub prefer_binary: bool,
    pub upgrade: bool,
}

impl RequirementDirective {
    /// Parse a requirement token. `upgrade_by_default` seeds `upgrade`.
    pub fn parse(token: &str, upgrade_by_default: bool) -> Self {
        let mut directive = Self {
            upgrade: upgrade_by_default,
            ..Self::default()
        };

        for sub in token.split_whitespace() {
            match Token::classify(sub) {
                Token::CondaAlias(alias) => directive.conda_alias = Some(alias.to_string()),
                Token::MingwAlias(alias) => directive.mingw_alias = Some(alias.to_string()),
                Token::NoDeps => directive.no_deps = true,
                Token::Platform(tags) => directive.platform = Some(tags.to_string()),
                Token::PythonVersion(expr) => {
                    directive.python_version = (!expr.is_empty()).then(|| expr.to_string());
                }
                Token::OnlyBinary => directive.only_binary = true,
                Token::Pre => directive.pre_release = true,
                Token::PreferBinary => directive.prefer_binary = true,
                Token::Upgrade => directive.upgrade = true,
                Token::Package(spec) => {
                    if spec.starts_with("--") {
                        emit(
                            Level::Warn,
                            "requirement.unknown_flag",
                            &format!(
                                "Unrecognized flag '{}' in requirement '{}', treating it as the package",
                                spec, token
                            ),
                            None,
                        );
                    }
                    directive.package = Some(PackageSpec::new(spec));
                }
            }
        }

        directive
    }

    /// Apply the per-backend alias.
    ///
    /// Returns `None` when the directive has nothing to install on `kind`,
    /// either because the alias is empty or because no package was given.
    pub fn for_backend(&self, kind: BackendKind) -> Option<Self> {
        let alias = match kind {
            BackendKind::Conda => self.conda_alias.as_deref(),
            BackendKind::Pacman => self.mingw_alias.as_deref(),
            BackendKind::Pip => None,
        };

        match alias {
            Some("") => None,
            Some(alias) => Some(Self {
                package: Some(PackageSpec::new(alias)),
                ..self.clone()
            }),
            None => self.package.as_ref().map(|_| self.clone()),
        }
    }

    pub fn package_name(&self) -> Option<&str> {
        self.package.as_ref().map(PackageSpec::name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_package_spec_name() {
        assert_eq!(PackageSpec::new("cx_Freeze~=7.2.0").name(), "cx_Freeze");
        assert_eq!(PackageSpec::new("lief>=0.13").name(), "lief");
        assert_eq!(PackageSpec::new("foo[extra]==1").name(), "foo");
        assert_eq!(PackageSpec::new("py-lief").name(), "py-lief");
        assert_eq!(PackageSpec::new("pip").to_string(), "pip");
    }

    #[test]
    fn test_parse_plain_package() {
        let d = RequirementDirective::parse("pillow", false);
        assert_eq!(d.package, Some(PackageSpec::new("pillow")));
        assert!(!d.no_deps && !d.upgrade && !d.pre_release);
        assert!(d.platform.is_none());
    }

    #[test]
    fn test_parse_all_flags() {
        let d = RequirementDirective::parse(
            "lief>0.13 --conda=py-lief>=0.13 --mingw=lief --no-deps --platform=linux,!macos \
             --python-version<3.13 --only-binary --pre --prefer-binary --upgrade",
            false,
        );
        assert_eq!(d.package_name(), Some("lief"));
        assert_eq!(d.conda_alias.as_deref(), Some("py-lief>=0.13"));
        assert_eq!(d.mingw_alias.as_deref(), Some("lief"));
        assert_eq!(d.platform.as_deref(), Some("linux,!macos"));
        assert_eq!(d.python_version.as_deref(), Some("<3.13"));
        assert!(d.no_deps && d.only_binary && d.pre_release && d.prefer_binary && d.upgrade);
    }

    #[test]
    fn test_flags_are_order_independent() {
        let flags = ["--no-deps", "--pre", "--platform=!mingw", "--conda="];
        let reference = RequirementDirective::parse("foo --no-deps --pre --platform=!mingw --conda=", false);
        // every rotation of the flags yields the same directive
        for shift in 0..flags.len() {
            let mut rotated = flags.to_vec();
            rotated.rotate_left(shift);
            let token = format!("{} foo", rotated.join(" "));
            assert_eq!(RequirementDirective::parse(&token, false), reference);
        }
    }

    #[test]
    fn test_last_package_wins() {
        let d = RequirementDirective::parse("first --pre second", false);
        assert_eq!(d.package, Some(PackageSpec::new("second")));
    }

    #[test]
    fn test_later_flag_overwrites() {
        let d = RequirementDirective::parse("foo --platform=linux --platform=macos", false);
        assert_eq!(d.platform.as_deref(), Some("macos"));
    }

    #[test]
    fn test_unknown_flag_becomes_package() {
        let d = RequirementDirective::parse("foo --frobnicate", false);
        assert_eq!(d.package, Some(PackageSpec::new("--frobnicate")));
    }

    #[test]
    fn test_upgrade_default_and_whitespace() {
        let d = RequirementDirective::parse("  pip   ", true);
        assert!(d.upgrade);
        assert_eq!(d.package_name(), Some("pip"));
        assert_eq!(RequirementDirective::parse("   ", false).package, None);
    }

    #[test]
    fn test_bare_python_version_is_no_constraint() {
        let d = RequirementDirective::parse("foo --python-version", false);
        assert!(d.python_version.is_none());
    }

    #[test]
    fn test_for_backend_aliases() {
        let d = RequirementDirective::parse("lief --conda=py-lief --mingw=", false);
        let conda = d.for_backend(BackendKind::Conda).unwrap();
        assert_eq!(conda.package, Some(PackageSpec::new("py-lief")));
        assert!(d.for_backend(BackendKind::Pacman).is_none());
        assert_eq!(d.for_backend(BackendKind::Pip).unwrap().package_name(), Some("lief"));

        let flags_only = RequirementDirective::parse("--pre", false);
        assert!(flags_only.for_backend(BackendKind::Pip).is_none());
        let aliased = RequirementDirective::parse("--pre --conda=tomli", false);
        assert!(aliased.for_backend(BackendKind::Conda).is_some());
    }
}
