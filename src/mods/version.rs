//! Lenient version parsing for catalog manifests
//!
//! Catalog versions are dotted numbers with one to four components
//! (`1.2`, `1.5.78.11833`). They are mapped onto `semver::Version` so that
//! ordinary comparisons work; a fourth component becomes build metadata.

use semver::{BuildMetadata, Version};

/// The version recorded for mods that must be treated as out of date.
pub fn zero() -> Version {
    Version::new(0, 0, 0)
}

/// Parse a catalog version string.
///
/// Strict semver is tried first, then the dotted-number form. Returns `None`
/// for anything else.
pub fn parse_lenient(raw: &str) -> Option<Version> {
    let raw = raw.trim().trim_start_matches(['v', 'V']);
    if raw.is_empty() {
        return None;
    }

    if let Ok(v) = Version::parse(raw) {
        return Some(v);
    }

    let parts: Vec<&str> = raw.split('.').collect();
    if parts.len() > 4 {
        return None;
    }

    let mut numbers = [0u64; 3];
    for (slot, part) in numbers.iter_mut().zip(parts.iter()) {
        *slot = part.parse().ok()?;
    }

    let mut version = Version::new(numbers[0], numbers[1], numbers[2]);
    if let Some(revision) = parts.get(3) {
        revision.parse::<u64>().ok()?;
        version.build = BuildMetadata::new(revision).ok()?;
    }

    Some(version)
}

/// Render a version the way catalog manifests write it.
pub fn display(version: &Version) -> String {
    if version.build.is_empty() {
        version.to_string()
    } else {
        format!(
            "{}.{}.{}.{}",
            version.major, version.minor, version.patch, version.build
        )
    }
}
