//! `ci/build-test.json`: per-sample build settings.
//!
//! ```json
//! {
//!   "sqlite": {"requirements": ["pysqlite3-binary --platform=linux"]},
//!   "pyqt6": {"platform": "!mingw", "extra_index_url": ["https://..."]}
//! }
//! ```

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::common::package::InstallOptions;
use crate::common::package::eligibility::{is_supported_platform, split_platform_tags};
use crate::common::platform::Platform;
use crate::error::ConfigError;

/// A platform constraint written either as `"linux,macos"` or a list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum PlatformSpec {
    One(String),
    Many(Vec<String>),
}

impl PlatformSpec {
    pub fn tags(&self) -> Vec<&str> {
        match self {
            Self::One(s) => split_platform_tags(s),
            Self::Many(tags) => tags.iter().map(String::as_str).collect(),
        }
    }

    pub fn supports(&self, platform: Platform) -> bool {
        is_supported_platform(&self.tags(), platform)
    }
}

/// Sample requirements, either a list or one comma separated string.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum RequirementList {
    Joined(String),
    Listed(Vec<String>),
}

impl RequirementList {
    pub fn into_tokens(self) -> Vec<String> {
        match self {
            Self::Joined(joined) => joined
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(String::from)
                .collect(),
            Self::Listed(tokens) => tokens,
        }
    }
}

/// Settings for one sample. Unknown keys are kept for display.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SampleRecord {
    #[serde(default)]
    pub platform: Option<PlatformSpec>,
    #[serde(default)]
    pub extra_index_url: Option<Vec<String>>,
    #[serde(default)]
    pub find_links: Option<Vec<String>>,
    #[serde(default)]
    pub requirements: Option<RequirementList>,
    #[serde(flatten)]
    pub other: serde_json::Map<String, serde_json::Value>,
}

impl SampleRecord {
    /// Record used for samples absent from the manifest.
    pub fn default_for(sample: &str) -> Self {
        let mut other = serde_json::Map::new();
        other.insert(
            "test_app".to_string(),
            serde_json::Value::String(format!("test_{}", sample)),
        );
        Self {
            other,
            ..Self::default()
        }
    }

    pub fn supports(&self, platform: Platform) -> bool {
        self.platform.as_ref().is_none_or(|p| p.supports(platform))
    }

    /// Take the installer inputs out of the record.
    pub fn take_job(&mut self) -> SampleJob {
        SampleJob {
            options: InstallOptions {
                extra_index_url: self.extra_index_url.take().unwrap_or_default(),
                find_links: self.find_links.take().unwrap_or_default(),
            },
            requirements: self
                .requirements
                .take()
                .map(RequirementList::into_tokens)
                .unwrap_or_default(),
        }
    }
}

/// What a sample asks the installer for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SampleJob {
    pub options: InstallOptions,
    pub requirements: Vec<String>,
}

/// Raw manifest. Records are only interpreted when a sample is looked up,
/// so a malformed entry affects that sample alone.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    samples: serde_json::Map<String, serde_json::Value>,
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.is_file() {
            return Err(ConfigError::ManifestNotFound(path.to_path_buf()));
        }
        let raw = fs::read_to_string(path)?;
        Self::parse(&raw).map_err(|source| ConfigError::InvalidManifest {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// The sample's record, or the default one.
    pub fn sample(&self, name: &str) -> Result<SampleRecord, ConfigError> {
        match self.samples.get(name) {
            Some(value) => {
                SampleRecord::deserialize(value).map_err(|source| ConfigError::InvalidSample {
                    sample: name.to_string(),
                    source,
                })
            }
            None => Ok(SampleRecord::default_for(name)),
        }
    }
}
