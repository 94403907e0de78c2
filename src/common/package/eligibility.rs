//! Platform and python-version gates for requirements and samples.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::str::FromStr;

use lazy_static::lazy_static;
use regex::Regex;

use crate::common::platform::{EnvironmentContext, Platform};
use crate::error::ConfigError;

use super::RequirementDirective;

lazy_static! {
    static ref VERSION_CONSTRAINT: Regex = Regex::new(
        r#"^\s*(==|!=|<=|>=|<|>)\s*["']*(\d+)(?:\.(\d*))?(?:\.(\d*))?["']*\s*$"#
    )
    .expect("valid version constraint pattern");
}

/// Check a list of platform tags against `current`.
///
/// Tags without `!` form the allowed set (all platforms when there are
/// none); `!`-prefixed tags are then removed from it. An empty list allows
/// every platform.
pub fn is_supported_platform<S: AsRef<str>>(tags: &[S], current: Platform) -> bool {
    let tags: Vec<&str> = tags
        .iter()
        .map(|t| t.as_ref().trim())
        .filter(|t| !t.is_empty())
        .collect();
    if tags.is_empty() {
        return true;
    }

    let allowed: BTreeSet<&str> = tags.iter().copied().filter(|t| !t.starts_with('!')).collect();
    let denied: BTreeSet<&str> = tags.iter().filter_map(|t| t.strip_prefix('!')).collect();

    let mut supported: BTreeSet<&str> = if allowed.is_empty() {
        Platform::ALL.iter().map(Platform::tag).collect()
    } else {
        allowed
    };
    supported.retain(|t| !denied.contains(t));

    supported.contains(current.tag())
}

/// Comma separated form used by `--platform=`.
pub fn split_platform_tags(constraint: &str) -> Vec<&str> {
    constraint.split(',').collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    fn holds(self, ordering: Ordering) -> bool {
        match self {
            Self::Eq => ordering == Ordering::Equal,
            Self::Ne => ordering != Ordering::Equal,
            Self::Lt => ordering == Ordering::Less,
            Self::Le => ordering != Ordering::Greater,
            Self::Gt => ordering == Ordering::Greater,
            Self::Ge => ordering != Ordering::Less,
        }
    }
}

/// Python version comparison such as `>=3.10` or `<3.13.1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionConstraint {
    pub op: CompareOp,
    /// One to three components; missing ones are absent, not zero.
    pub version: Vec<u32>,
}

impl FromStr for VersionConstraint {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidVersionConstraint(s.to_string());
        let caps = VERSION_CONSTRAINT.captures(s).ok_or_else(invalid)?;

        let op = match &caps[1] {
            "==" => CompareOp::Eq,
            "!=" => CompareOp::Ne,
            "<=" => CompareOp::Le,
            ">=" => CompareOp::Ge,
            "<" => CompareOp::Lt,
            _ => CompareOp::Gt,
        };

        let mut version = Vec::with_capacity(3);
        for group in 2..=4 {
            match caps.get(group).map(|m| m.as_str()) {
                Some(num) if !num.is_empty() => version.push(num.parse().map_err(|_| invalid())?),
                _ => {}
            }
        }

        Ok(Self { op, version })
    }
}

impl VersionConstraint {
    /// Compare like Python tuples: element-wise, a shorter prefix sorts first.
    pub fn matches(&self, current: &[u32]) -> bool {
        self.op.holds(current.cmp(self.version.as_slice()))
    }
}

pub fn is_supported_python(constraint: &str, current: [u32; 3]) -> Result<bool, ConfigError> {
    let constraint: VersionConstraint = constraint.parse()?;
    Ok(constraint.matches(&current))
}

/// Whether a directive applies to the current environment.
pub fn is_eligible(
    directive: &RequirementDirective,
    ctx: &EnvironmentContext,
) -> Result<bool, ConfigError> {
    if let Some(platform) = &directive.platform {
        if !is_supported_platform(&split_platform_tags(platform), ctx.platform) {
            return Ok(false);
        }
    }
    match &directive.python_version {
        Some(constraint) => is_supported_python(constraint, ctx.python_version()),
        None => Ok(true),
    }
}
