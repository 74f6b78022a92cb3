//! Platform-specific paths for unit declarations and saved state.
//!
//! # Directory Structure
//!
//! - **User config**: `~/.config/patchwire/` (Linux), `~/Library/Application Support/patchwire/` (macOS), `%APPDATA%\patchwire\` (Windows)
//! - **Unit declarations**: `<user config>/units/`
//! - **Saved state**: `<user config>/state.toml`
//!
//! # Example
//!
//! ```rust,no_run
//! use patchwire_config::paths;
//!
//! if let Some(path) = paths::find_declaration("lead_env") {
//!     println!("Found declaration at: {:?}", path);
//! }
//! ```

use std::path::{Path, PathBuf};

use crate::ConfigError;

/// Application name used for directory paths.
const APP_NAME: &str = "patchwire";

/// Subdirectory name for unit declarations.
const UNITS_SUBDIR: &str = "units";

/// File name of the saved patch state.
const STATE_FILE: &str = "state.toml";

/// Returns the user-specific configuration directory.
///
/// Returns a fallback path if the config directory cannot be determined.
pub fn user_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Returns the directory searched for unit declarations by name.
pub fn user_units_dir() -> PathBuf {
    user_config_dir().join(UNITS_SUBDIR)
}

/// Default location of the saved patch state.
pub fn default_state_path() -> PathBuf {
    user_config_dir().join(STATE_FILE)
}

/// Find a declaration file by path or name.
///
/// An existing file path wins; otherwise `name` (with or without `.toml`)
/// is looked up in [`user_units_dir`].
pub fn find_declaration(name: &str) -> Option<PathBuf> {
    let path = PathBuf::from(name);
    if path.is_file() {
        return Some(path);
    }

    let filename = if name.ends_with(".toml") {
        name.to_string()
    } else {
        format!("{name}.toml")
    };
    let user_path = user_units_dir().join(filename);
    user_path.is_file().then_some(user_path)
}

/// Ensure the user config directory exists.
///
/// # Errors
///
/// Returns an error if the directory cannot be created.
pub fn ensure_user_config_dir() -> Result<PathBuf, ConfigError> {
    let dir = user_config_dir();
    ensure_dir(&dir)?;
    Ok(dir)
}

/// List declaration files in a directory, sorted by name.
///
/// Returns an empty vector if the directory doesn't exist or can't be read.
pub fn list_declarations(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut found: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "toml"))
        .collect();
    found.sort();
    found
}

pub(crate) fn ensure_dir(dir: &Path) -> Result<(), ConfigError> {
    if !dir.as_os_str().is_empty() && !dir.exists() {
        std::fs::create_dir_all(dir).map_err(|e| ConfigError::create_dir(dir, e))?;
    }
    Ok(())
}
