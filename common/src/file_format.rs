use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum FileFormatError {
    #[error("Missing file extension: {0}")]
    MissingFileExtension(String),
    #[error("Unsupported file extension for file: {0}")]
    UnsupportedFileExtension(String),
    #[error("YAML serialization failed")]
    Yaml(#[from] serde_yml::Error),
    #[error("JSON serialization failed")]
    Json(#[from] serde_json::Error),
    #[error("I/O error on {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub type FileFormatResult<T> = Result<T, FileFormatError>;

pub fn get_file_extension(path: &Path) -> Option<&str> {
    path.extension().and_then(|os_str| os_str.to_str())
}

/// Text formats used for configuration files and ROI archives.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SerdeFormat {
    #[default]
    Yaml,
    Json,
}

impl SerdeFormat {
    pub fn from_path(path: &Path) -> FileFormatResult<Self> {
        let ext = get_file_extension(path)
            .ok_or_else(|| FileFormatError::MissingFileExtension(path.display().to_string()))?;

        if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") {
            Ok(Self::Yaml)
        } else if ext.eq_ignore_ascii_case("json") {
            Ok(Self::Json)
        } else {
            Err(FileFormatError::UnsupportedFileExtension(
                path.display().to_string(),
            ))
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            SerdeFormat::Yaml => "yml",
            SerdeFormat::Json => "json",
        }
    }

    pub fn serialize<T: Serialize>(&self, value: &T) -> FileFormatResult<String> {
        let mut text = match self {
            SerdeFormat::Yaml => serde_yml::to_string(value)?,
            SerdeFormat::Json => serde_json::to_string_pretty(value)?,
        };
        if !text.ends_with('\n') {
            text.push('\n');
        }
        Ok(text)
    }

    pub fn deserialize<T: DeserializeOwned + 'static>(&self, text: &str) -> FileFormatResult<T> {
        match self {
            SerdeFormat::Yaml => Ok(serde_yml::from_str(text)?),
            SerdeFormat::Json => Ok(serde_json::from_str(text)?),
        }
    }
}

/// Reads `path` with the format implied by its extension.
pub fn read_file<T: DeserializeOwned + 'static>(path: &Path) -> FileFormatResult<T> {
    let format = SerdeFormat::from_path(path)?;
    let text = std::fs::read_to_string(path).map_err(|source| FileFormatError::Io {
        path: path.display().to_string(),
        source,
    })?;
    format.deserialize(&text)
}

/// Writes `value` to `path` with the format implied by its extension.
pub fn write_file<T: Serialize>(path: &Path, value: &T) -> FileFormatResult<()> {
    let format = SerdeFormat::from_path(path)?;
    let text = format.serialize(value)?;
    std::fs::write(path, text).map_err(|source| FileFormatError::Io {
        path: path.display().to_string(),
        source,
    })
}
