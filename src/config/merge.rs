//! Configuration merging.
//!
//! Priority, lowest first:
//! 1. Compiled defaults ([`MergedConfig::default`])
//! 2. Local configuration file `shared` block
//! 3. Server `shared` block, only when the authority is [`Authority::Remote`]
//! 4. Command line version overrides ([`apply_version_overrides`])
//!
//! Optional fields only override when set. An absent field means "no opinion",
//! it never resets a value to its default.

use crate::config::Authority;
use crate::models::{DetectionMethod, MergedConfig, SharedConfig};
use tracing::debug;

/// Combine defaults, local and server shared settings.
///
/// # Arguments
///
/// * `defaults` - Compiled-in defaults
/// * `local` - `shared` block of the local configuration file, if any
/// * `remote` - `shared` block of the server response, if the response had one
/// * `authority` - Which side wins on conflicts
///
/// # Returns
///
/// The effective configuration.
///
/// # Examples
///
/// ```rust
/// use setup_updater::config::{Authority, merge};
/// use setup_updater::models::{MergedConfig, SharedConfig};
///
/// let local = SharedConfig { product_name: Some("Local".into()), ..Default::default() };
/// let remote = SharedConfig { product_name: Some("Remote".into()), ..Default::default() };
///
/// let merged = merge(MergedConfig::default(), Some(&local), Some(&remote), Authority::Local);
/// assert_eq!(merged.product_name, "Local");
/// ```
#[must_use]
pub fn merge(
    defaults: MergedConfig,
    local: Option<&SharedConfig>,
    remote: Option<&SharedConfig>,
    authority: Authority,
) -> MergedConfig {
    let mut merged = defaults;

    if let Some(local) = local {
        merged.apply(local);
    }

    match (authority, remote) {
        (Authority::Remote, Some(remote)) => {
            debug!("Applying server provided shared configuration");
            merged.apply(remote);
        }
        (Authority::Local, Some(_)) => {
            debug!("Ignoring server provided shared configuration, authority is local");
        }
        (_, None) => {}
    }

    merged
}

/// Apply command line local version overrides on top of a merged configuration.
///
/// `force_local_version` always replaces the detection method with a fixed
/// version. `local_version` only fills in when no detection method is configured.
pub fn apply_version_overrides(
    merged: &mut MergedConfig,
    force_local_version: Option<&str>,
    local_version: Option<&str>,
) {
    if let Some(version) = force_local_version {
        debug!("Forcing local version {}", version);
        merged.detection = Some(DetectionMethod::fixed_version(version));
    } else if merged.detection.is_none() {
        if let Some(version) = local_version {
            debug!("Using local version {} as no detection method is configured", version);
            merged.detection = Some(DetectionMethod::fixed_version(version));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::DEFAULT_WINDOW_TITLE;
    use crate::models::DetectionMethodKind;

    fn shared_named(name: &str) -> SharedConfig {
        SharedConfig {
            product_name: Some(name.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults_only() {
        let merged = merge(MergedConfig::default(), None, None, Authority::Remote);
        assert_eq!(merged, MergedConfig::default());
    }

    #[test]
    fn test_local_overrides_defaults() {
        let merged =
            merge(MergedConfig::default(), Some(&shared_named("Local")), None, Authority::Remote);
        assert_eq!(merged.product_name, "Local");
        assert_eq!(merged.window_title, DEFAULT_WINDOW_TITLE);
    }

    #[test]
    fn test_remote_wins_with_remote_authority() {
        let merged = merge(
            MergedConfig::default(),
            Some(&shared_named("Local")),
            Some(&shared_named("Remote")),
            Authority::Remote,
        );
        assert_eq!(merged.product_name, "Remote");
    }

    #[test]
    fn test_local_authority_ignores_remote() {
        let remote = SharedConfig {
            product_name: Some("Remote".to_string()),
            run_as_temporary_copy: Some(true),
            ..Default::default()
        };
        let merged =
            merge(MergedConfig::default(), Some(&shared_named("Local")), Some(&remote), Authority::Local);
        assert_eq!(merged.product_name, "Local");
        assert!(!merged.run_as_temporary_copy);
    }

    #[test]
    fn test_absent_remote_fields_do_not_reset() {
        let local = SharedConfig {
            window_title: Some("Local Title".to_string()),
            installation_error_url: Some("https://local/help".to_string()),
            ..Default::default()
        };
        let merged = merge(
            MergedConfig::default(),
            Some(&local),
            Some(&shared_named("Remote")),
            Authority::Remote,
        );
        assert_eq!(merged.window_title, "Local Title");
        assert_eq!(merged.installation_error_url.as_deref(), Some("https://local/help"));
        assert_eq!(merged.product_name, "Remote");
    }

    #[test]
    fn test_force_local_version_replaces_detection() {
        let mut merged = MergedConfig {
            detection: Some(DetectionMethod::fixed_version("1.0.0")),
            ..Default::default()
        };
        apply_version_overrides(&mut merged, Some("3.0.0"), Some("2.0.0"));
        assert_eq!(merged.detection, Some(DetectionMethod::fixed_version("3.0.0")));
    }

    #[test]
    fn test_local_version_only_fills_gap() {
        let mut configured = MergedConfig {
            detection: Some(DetectionMethod::fixed_version("1.0.0")),
            ..Default::default()
        };
        apply_version_overrides(&mut configured, None, Some("2.0.0"));
        assert_eq!(configured.detection, Some(DetectionMethod::fixed_version("1.0.0")));

        let mut empty = MergedConfig::default();
        apply_version_overrides(&mut empty, None, Some("2.0.0"));
        assert_eq!(empty.detection.map(|d| d.kind()), Some(DetectionMethodKind::FixedVersion));
    }
}
