//! Configuration loading and schema definitions for railpost.
//!
//! Configuration is read from TOML. The password may be left out of the
//! file and supplied through the `RAILPOST_PASSWORD` environment variable.

pub mod schema;

pub use schema::*;

use std::path::Path;

use anyhow::{Context, Result};

/// Environment variable consulted when `service.password` is not set.
pub const PASSWORD_ENV: &str = "RAILPOST_PASSWORD";

/// Loads railpost configuration from a TOML file.
///
/// # Errors
///
/// Returns an error if:
/// - The file cannot be read (e.g., doesn't exist or permission denied)
/// - The file contains invalid TOML syntax
/// - The configuration doesn't match the expected schema
///
/// # Example
///
/// ```no_run
/// use railpost::config::load_config;
/// use std::path::Path;
///
/// let config = load_config(Path::new("railpost.toml"))?;
/// println!("Workers: {}", config.publisher.workers);
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

    if config.service.password.is_none() {
        config.service.password = std::env::var(PASSWORD_ENV).ok();
    }

    Ok(config)
}

/// Loads railpost configuration from a TOML string.
///
/// # Example
///
/// ```
/// use railpost::config::load_config_str;
///
/// let config = load_config_str(r#"
///     [service]
///     url = "https://example.testrail.io"
///     user = "ci@example.com"
///
///     [session]
///     run_id = 50
/// "#)?;
///
/// assert_eq!(config.session.run_id, Some(50));
/// assert_eq!(config.publisher.workers, 60);
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn load_config_str(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).context("Failed to parse config")?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [service]
        url = "https://example.testrail.io"
        user = "ci@example.com"

        [session]
        project_id = 4
    "#;

    #[test]
    fn test_defaults() {
        let config = load_config_str(MINIMAL).unwrap();

        assert!(config.service.verify_tls);
        assert_eq!(config.service.timeout_secs, 60);
        assert_eq!(config.session.project_id, Some(4));
        assert!(config.session.publish_blocked);
        assert!(!config.session.close_on_complete);
        assert!(!config.session.skip_missing);
        assert_eq!(config.publisher.workers, 60);
        assert_eq!(config.publisher.comment_limit, 4000);
        config.validate().unwrap();
    }

    #[test]
    fn test_full_session() {
        let config = load_config_str(
            r#"
            [service]
            url = "https://example.testrail.io"
            user = "ci@example.com"
            password = "key"
            verify_tls = false

            [session]
            plan_id = 9
            version = "1.0.0.0"
            publish_blocked = false
            close_on_complete = true

            [publisher]
            workers = 8
            comment_limit = 100
            "#,
        )
        .unwrap();

        assert_eq!(config.service.password.as_deref(), Some("key"));
        assert!(!config.service.verify_tls);
        assert_eq!(config.session.plan_id, Some(9));
        assert!(!config.session.publish_blocked);
        assert_eq!(config.publisher.workers, 8);
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let mut config = load_config_str(MINIMAL).unwrap();
        config.publisher.workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_requires_a_target() {
        let mut config = load_config_str(MINIMAL).unwrap();
        config.session.project_id = None;
        assert!(config.validate().is_err());

        config.session.run_id = Some(50);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("railpost.toml");
        std::fs::write(&path, MINIMAL).unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.service.user, "ci@example.com");

        assert!(load_config(&dir.path().join("missing.toml")).is_err());
    }
}
