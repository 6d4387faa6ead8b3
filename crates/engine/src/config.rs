//! Zone configuration via `shmtree.toml`
//!
//! One `[[zone]]` table per zone. A zone without a `path` lives in an
//! unnamed shared mapping, visible to this process and every worker it forks
//! afterwards; with a `path` it maps that file and is shared with every
//! process that maps the same file. Two zones may not share a path.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use rustc_hash::FxHashSet;
use shmtree_core::{Error, Result, MAX_ZONE_SIZE, MIN_ZONE_SIZE};

/// Conventional config file name
pub const CONFIG_FILE_NAME: &str = "shmtree.toml";

/// A zone size: plain bytes or a string with a `k`, `m` or `g` suffix
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ZoneSize {
    /// Size in bytes
    Bytes(u64),
    /// Size such as `"512k"` or `"4m"`
    Text(String),
}

impl ZoneSize {
    /// Size in bytes
    ///
    /// # Errors
    ///
    /// `Config` for malformed text or a size outside
    /// `MIN_ZONE_SIZE..=MAX_ZONE_SIZE`.
    pub fn bytes(&self) -> Result<usize> {
        let bytes = match self {
            ZoneSize::Bytes(n) => *n,
            ZoneSize::Text(s) => parse_size(s)?,
        };
        usize::try_from(bytes)
            .ok()
            .filter(|b| (MIN_ZONE_SIZE..=MAX_ZONE_SIZE).contains(b))
            .ok_or_else(|| {
                Error::Config(format!(
                    "zone size {bytes} outside {MIN_ZONE_SIZE}..={MAX_ZONE_SIZE} bytes"
                ))
            })
    }
}

impl From<usize> for ZoneSize {
    fn from(n: usize) -> Self {
        ZoneSize::Bytes(n as u64)
    }
}

fn parse_size(text: &str) -> Result<u64> {
    let text = text.trim();
    let (digits, unit) = match text.char_indices().last() {
        Some((i, c)) if c.is_ascii_alphabetic() => (&text[..i], c.to_ascii_lowercase()),
        _ => (text, 'b'),
    };
    let scale: u64 = match unit {
        'b' => 1,
        'k' => 1 << 10,
        'm' => 1 << 20,
        'g' => 1 << 30,
        other => {
            return Err(Error::Config(format!(
                "unknown size unit '{other}' in \"{text}\" (expected k, m or g)"
            )))
        }
    };
    digits
        .trim()
        .parse::<u64>()
        .ok()
        .and_then(|n| n.checked_mul(scale))
        .ok_or_else(|| Error::Config(format!("invalid zone size \"{text}\"")))
}

/// One `[[zone]]` entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneConfig {
    /// Zone name, unique within a config
    pub name: String,
    /// Total segment size
    pub size: ZoneSize,
    /// Backing file; anonymous mapping when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl ZoneConfig {
    /// An anonymous zone
    pub fn anonymous(name: impl Into<String>, size: usize) -> Self {
        ZoneConfig {
            name: name.into(),
            size: size.into(),
            path: None,
        }
    }

    /// A zone backed by `path`
    pub fn file(name: impl Into<String>, size: usize, path: impl Into<PathBuf>) -> Self {
        ZoneConfig {
            name: name.into(),
            size: size.into(),
            path: Some(path.into()),
        }
    }
}

/// Configuration loaded from `shmtree.toml`
///
/// # Example
///
/// ```toml
/// [[zone]]
/// name = "cache"
/// size = "4m"
///
/// [[zone]]
/// name = "sessions"
/// size = 1048576
/// path = "/dev/shm/shmtree-sessions"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShmConfig {
    /// Zones, in declaration order
    #[serde(default, rename = "zone")]
    pub zones: Vec<ZoneConfig>,
}

impl ShmConfig {
    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# shmtree zone configuration
#
# One [[zone]] table per zone.
#   name = unique zone name
#   size = bytes, or a string with a k/m/g suffix ("512k", "4m")
#   path = optional backing file; processes mapping the same file share
#          the zone. Without it the zone is shared with forked workers only.

[[zone]]
name = "default"
size = "1m"

# [[zone]]
# name = "sessions"
# size = "16m"
# path = "/dev/shm/shmtree-sessions"
"#
    }

    /// Check names and sizes
    ///
    /// # Errors
    ///
    /// `Config` for an empty or duplicate name, two zones backed by one
    /// path, or an out-of-range size.
    pub fn validate(&self) -> Result<()> {
        let mut seen = FxHashSet::default();
        let mut paths = FxHashSet::default();
        for zone in &self.zones {
            if zone.name.trim().is_empty() {
                return Err(Error::Config("zone name must not be empty".to_string()));
            }
            if !seen.insert(zone.name.as_str()) {
                return Err(Error::Config(format!("duplicate zone name '{}'", zone.name)));
            }
            if let Some(path) = &zone.path {
                if !paths.insert(path.as_path()) {
                    return Err(Error::Config(format!(
                        "zone '{}' reuses path '{}'",
                        zone.name,
                        path.display()
                    )));
                }
            }
            zone.size.bytes().map_err(|e| match e {
                Error::Config(msg) => Error::Config(format!("zone '{}': {msg}", zone.name)),
                other => other,
            })?;
        }
        Ok(())
    }

    /// Read, parse and validate a config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        content.parse::<ShmConfig>().map_err(|e| match e {
            Error::Config(msg) => Error::Config(format!("{}: {msg}", path.display())),
            other => other,
        })
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

impl FromStr for ShmConfig {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let config: ShmConfig = toml::from_str(s)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }
}
