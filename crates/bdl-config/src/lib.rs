//! Configuration loading for the library service.
//!
//! Values come from the environment first; unset keys fall back to a
//! co-located `.env` file read per key without mutating the process
//! environment.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::path::{Path, PathBuf};

/// Required: base path holding every tenant library under `users/`.
pub const ENV_LIBRARY_PATH: &str = "BRAINDRIVE_LIBRARY_PATH";
/// Optional bool (default true): whether the tenant header is enforced.
pub const ENV_REQUIRE_USER_HEADER: &str = "BRAINDRIVE_LIBRARY_REQUIRE_USER_HEADER";
/// Optional shared service token.
pub const ENV_SERVICE_TOKEN: &str = "BRAINDRIVE_LIBRARY_SERVICE_TOKEN";

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The library path key is missing or empty.
    #[error("{ENV_LIBRARY_PATH} is required; set it to the library root path.")]
    MissingLibraryPath,

    /// A boolean key carries an unrecognised literal.
    #[error("{key} must be a boolean value.")]
    InvalidBool {
        /// Offending key name.
        key: String,
    },
}

/// Immutable runtime configuration snapshot, captured at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// Base path of the service library store.
    pub library_path: PathBuf,
    /// Whether requests must carry the tenant identity header.
    pub require_user_header: bool,
    /// Shared service token, when configured.
    pub service_token: Option<String>,
}

/// Load configuration from the environment, consulting `./.env` for unset
/// keys.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from(&std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
}

/// Load configuration with an explicit dotenv directory (test seam).
pub fn load_config_from(dotenv_dir: &Path) -> Result<AppConfig, ConfigError> {
    let dotenv_path = dotenv_dir.join(".env");

    let raw_path = env_or_dotenv(&dotenv_path, ENV_LIBRARY_PATH)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or(ConfigError::MissingLibraryPath)?;

    let require_user_header = parse_bool(
        env_or_dotenv(&dotenv_path, ENV_REQUIRE_USER_HEADER).as_deref(),
        true,
        ENV_REQUIRE_USER_HEADER,
    )?;

    let service_token = env_or_dotenv(&dotenv_path, ENV_SERVICE_TOKEN)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty());

    Ok(AppConfig {
        library_path: PathBuf::from(raw_path),
        require_user_header,
        service_token,
    })
}

fn env_or_dotenv(dotenv_path: &Path, key: &str) -> Option<String> {
    if let Ok(value) = std::env::var(key) {
        if !value.trim().is_empty() {
            return Some(value);
        }
    }
    dotenv_value(dotenv_path, key)
}

/// Read a single key from a `.env` file without touching the environment.
fn dotenv_value(dotenv_path: &Path, key: &str) -> Option<String> {
    let iter = dotenvy::from_path_iter(dotenv_path).ok()?;
    for item in iter {
        let Ok((name, value)) = item else {
            continue;
        };
        if name == key {
            let value = value.trim().to_string();
            return (!value.is_empty()).then_some(value);
        }
    }
    None
}

fn parse_bool(raw: Option<&str>, default: bool, key: &str) -> Result<bool, ConfigError> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    let normalized = raw.trim().to_ascii_lowercase();
    if normalized.is_empty() {
        return Ok(default);
    }
    match normalized.as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidBool {
            key: key.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    // Env-var based paths are covered indirectly; these tests pin the dotenv
    // fallback and the parsers, which do not touch process state.

    #[test]
    fn parse_bool_accepts_known_literals() {
        for raw in ["1", "true", "YES", " on "] {
            assert!(parse_bool(Some(raw), false, "K").unwrap(), "raw {raw:?}");
        }
        for raw in ["0", "false", "No", "off"] {
            assert!(!parse_bool(Some(raw), true, "K").unwrap(), "raw {raw:?}");
        }
    }

    #[test]
    fn parse_bool_defaults_on_missing_or_blank() {
        assert!(parse_bool(None, true, "K").unwrap());
        assert!(parse_bool(Some("  "), true, "K").unwrap());
        assert!(!parse_bool(None, false, "K").unwrap());
    }

    #[test]
    fn parse_bool_rejects_garbage() {
        let err = parse_bool(Some("maybe"), true, "SOME_KEY").unwrap_err();
        assert!(err.to_string().contains("SOME_KEY"));
    }

    #[test]
    fn dotenv_fallback_reads_single_key() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(".env"),
            "# comment\nexport BRAINDRIVE_LIBRARY_PATH=/srv/library\nBRAINDRIVE_LIBRARY_SERVICE_TOKEN='secret'\n",
        )
        .unwrap();

        assert_eq!(
            dotenv_value(&dir.path().join(".env"), ENV_LIBRARY_PATH).as_deref(),
            Some("/srv/library")
        );
        assert_eq!(
            dotenv_value(&dir.path().join(".env"), ENV_SERVICE_TOKEN).as_deref(),
            Some("secret")
        );
        assert!(dotenv_value(&dir.path().join(".env"), "UNSET_KEY").is_none());
    }

    #[test]
    fn dotenv_missing_file_is_none() {
        let dir = TempDir::new().unwrap();
        assert!(dotenv_value(&dir.path().join(".env"), ENV_LIBRARY_PATH).is_none());
    }

    #[test]
    fn load_config_requires_library_path() {
        let dir = TempDir::new().unwrap();
        // No env override in tests that could race; rely on the key being
        // absent from the test environment.
        if std::env::var(ENV_LIBRARY_PATH).is_ok() {
            return;
        }
        let err = load_config_from(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingLibraryPath));
    }

    #[test]
    fn load_config_reads_dotenv_values() {
        let dir = TempDir::new().unwrap();
        if std::env::var(ENV_LIBRARY_PATH).is_ok() {
            return;
        }
        std::fs::write(
            dir.path().join(".env"),
            "BRAINDRIVE_LIBRARY_PATH=/srv/library\nBRAINDRIVE_LIBRARY_REQUIRE_USER_HEADER=false\n",
        )
        .unwrap();

        let config = load_config_from(dir.path()).unwrap();
        assert_eq!(config.library_path, PathBuf::from("/srv/library"));
        assert!(!config.require_user_header);
        assert!(config.service_token.is_none());
    }
}
