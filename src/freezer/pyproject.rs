//! Build and runtime requirements declared by the project's `pyproject.toml`.

use std::fs;
use std::path::Path;

use toml::Table;

use crate::error::ConfigError;

/// Turn one PEP 508 dependency into a requirement token.
///
/// Only the `sys_platform` markers the project uses are understood; any
/// other marker is dropped together with the `;`.
pub fn requirement_token(dependency: &str) -> String {
    let (spec, marker) = match dependency.split_once(';') {
        Some((spec, marker)) => (spec.trim(), marker),
        None => (dependency.trim(), ""),
    };
    let marker: String = marker.chars().filter(|c| !c.is_whitespace()).collect();
    let marker = marker.replace('"', "'");

    let mut token = spec.to_string();
    if marker == "sys_platform=='linux'" {
        token.push_str(" --platform=linux");
    } else if marker == "sys_platform=='win32'" {
        token.push_str(" --platform=windows,mingw");
    }
    if token.starts_with("lief") {
        token.push_str(" --conda=py-lief --only-binary");
    }
    token
}

fn string_array<'t>(table: &'t Table, section: &str, key: &str) -> impl Iterator<Item = &'t str> {
    table
        .get(section)
        .and_then(|s| s.get(key))
        .and_then(|v| v.as_array())
        .into_iter()
        .flatten()
        .filter_map(|v| v.as_str())
}

/// `build-system.requires` followed by `project.dependencies`.
pub fn project_requirements(raw: &str) -> Result<Vec<String>, toml::de::Error> {
    let table: Table = raw.parse()?;
    Ok(string_array(&table, "build-system", "requires")
        .chain(string_array(&table, "project", "dependencies"))
        .map(requirement_token)
        .collect())
}

pub fn load_project_requirements(path: &Path) -> Result<Vec<String>, ConfigError> {
    if !path.is_file() {
        return Err(ConfigError::PyprojectNotFound(path.to_path_buf()));
    }
    let raw = fs::read_to_string(path)?;
    project_requirements(&raw).map_err(|source| ConfigError::InvalidPyproject {
        path: path.to_path_buf(),
        source,
    })
}
