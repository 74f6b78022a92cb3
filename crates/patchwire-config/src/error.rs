//! Error types for configuration operations.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while loading, validating, or saving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read a file
    #[error("failed to read file '{path}': {source}")]
    ReadFile {
        /// Path of the file that could not be read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to write a file
    #[error("failed to write file '{path}': {source}")]
    WriteFile {
        /// Path of the file that could not be written.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to create directory
    #[error("failed to create directory '{path}': {source}")]
    CreateDir {
        /// Path of the directory that could not be created.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Failed to serialize TOML
    #[error("failed to serialize TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// Declaration problems found before anything was built
    #[error("validation failed: {0}")]
    Validation(#[from] crate::validation::ValidationError),

    /// The runtime rejected the declared shape
    #[error("invalid unit '{unit}': {source}")]
    Unit {
        /// Declared unit name.
        unit: String,
        /// Construction error from the runtime.
        #[source]
        source: patchwire_core::Error,
    },
}

impl ConfigError {
    /// Create a read file error.
    pub fn read_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConfigError::ReadFile {
            path: path.into(),
            source,
        }
    }

    /// Create a write file error.
    pub fn write_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConfigError::WriteFile {
            path: path.into(),
            source,
        }
    }

    /// Create a create directory error.
    pub fn create_dir(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConfigError::CreateDir {
            path: path.into(),
            source,
        }
    }

    /// Wrap a runtime construction error for a named unit.
    pub fn unit(unit: impl Into<String>, source: patchwire_core::Error) -> Self {
        ConfigError::Unit {
            unit: unit.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    fn mock_io_err() -> std::io::Error {
        std::io::Error::new(std::io::ErrorKind::NotFound, "mock")
    }

    #[test]
    fn read_file_display() {
        let err = ConfigError::read_file("/a/b.toml", mock_io_err());
        let msg = err.to_string();
        assert!(msg.contains("failed to read file"), "got: {msg}");
        assert!(msg.contains("/a/b.toml"), "got: {msg}");
        assert!(err.source().is_some());
    }

    #[test]
    fn create_dir_factory_produces_correct_variant() {
        let err = ConfigError::create_dir("/dir/path", mock_io_err());
        assert!(
            matches!(err, ConfigError::CreateDir { ref path, .. } if path == std::path::Path::new("/dir/path"))
        );
    }

    #[test]
    fn unit_error_names_unit_and_keeps_source() {
        let err = ConfigError::unit("env", patchwire_core::Error::DuplicateBinding("attack".into()));
        assert_eq!(
            err.to_string(),
            "invalid unit 'env': parameter 'attack' is bound more than once"
        );
        assert!(err.source().is_some());
    }

    #[test]
    fn validation_error_is_source() {
        let err: ConfigError =
            crate::validation::ValidationError::UnknownKind("reverb".into()).into();
        assert_eq!(err.to_string(), "validation failed: unknown unit kind: reverb");
        assert!(err.source().is_some());
    }
}
