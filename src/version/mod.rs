//! Version coercion and comparison helpers.
//!
//! Release and product versions on Windows are frequently four-part numbers
//! (`1.2.3.4`) which semantic versioning cannot represent. This module rewrites
//! them into a comparable form and provides the lenient parsing rules used across
//! the engine.
//!
//! # Rules
//!
//! - A leading `v`/`V` and surrounding spaces or tabs are ignored
//! - `a.b.c.d` becomes `a.b.c-rc.d` so the fourth component still orders
//! - Everything else is handed to [`semver::Version::parse`] unchanged
//!
//! # Examples
//!
//! ```rust
//! use setup_updater::version::{parse_version, to_semver_compatible};
//!
//! assert_eq!(to_semver_compatible("1.2.3.4"), "1.2.3-rc.4");
//! assert_eq!(to_semver_compatible("1.2.3"), "1.2.3");
//! assert!(parse_version(" v2.0.1.7 ").is_ok());
//! ```

use crate::core::UpdaterError;
use regex::Regex;
use semver::Version;
use std::sync::LazyLock;

static FOUR_PART_VERSION: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^(\d+)\.(\d+)\.(\d+)\.(\d+)$").ok());

/// Rewrite a four-part version into a semantic version compatible string.
///
/// The fourth component becomes an `rc` prerelease identifier. Numeric components
/// are normalized so leading zeros do not produce invalid identifiers. Input that
/// is not a plain four-part version is returned unchanged, which makes the
/// function idempotent.
///
/// # Arguments
///
/// * `version` - The raw version string
///
/// # Returns
///
/// The rewritten (or untouched) version string.
#[must_use]
pub fn to_semver_compatible(version: &str) -> String {
    let Some(regex) = FOUR_PART_VERSION.as_ref() else {
        return version.to_string();
    };

    let Some(captures) = regex.captures(version) else {
        return version.to_string();
    };

    let parts: Vec<u64> = (1..=4)
        .filter_map(|i| captures.get(i).and_then(|m| m.as_str().parse::<u64>().ok()))
        .collect();

    match parts.as_slice() {
        [major, minor, patch, build] => format!("{major}.{minor}.{patch}-rc.{build}"),
        // Component overflowed u64, leave it to the parser to reject
        _ => version.to_string(),
    }
}

/// Strip decoration that servers and registry values commonly carry.
fn clean(version: &str) -> &str {
    version
        .trim_matches(|c: char| c == ' ' || c == '\t')
        .trim_start_matches(['v', 'V'])
        .trim_matches(|c: char| c == ' ' || c == '\t')
}

/// Parse a version string, applying the four-part rewrite first.
///
/// # Errors
///
/// Returns [`UpdaterError::VersionParse`] if the cleaned and rewritten input is not
/// a valid semantic version.
pub fn parse_version(version: &str) -> Result<Version, UpdaterError> {
    let compatible = to_semver_compatible(clean(version));

    Version::parse(&compatible).map_err(|_| UpdaterError::VersionParse {
        input: version.to_string(),
    })
}

/// Parse a version string, falling back to `0.0.0` when it cannot be parsed.
///
/// Used for ordering releases, where an unparseable version must not abort the
/// whole response.
#[must_use]
pub fn parse_version_lenient(version: &str) -> Version {
    parse_version(version).unwrap_or_else(|_| {
        tracing::debug!("Version '{}' is not parseable, treating it as 0.0.0", version);
        Version::new(0, 0, 0)
    })
}

/// Build a semantic version from the four numeric parts of a Windows version resource.
#[must_use]
pub fn from_four_part(major: u16, minor: u16, patch: u16, build: u16) -> Version {
    let rendered = to_semver_compatible(&format!("{major}.{minor}.{patch}.{build}"));
    // The rewritten form of four integers always parses
    Version::parse(&rendered).unwrap_or_else(|_| {
        Version::new(u64::from(major), u64::from(minor), u64::from(patch))
    })
}
