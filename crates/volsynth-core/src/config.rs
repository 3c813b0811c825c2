//! RON config loading shared by every crate's config struct.

use std::path::Path;

use serde::de::DeserializeOwned;

use crate::error::ConfigError;

/// Parse a config value from a RON string. Missing fields fall back to the
/// struct's `#[serde(default)]` values.
pub fn from_ron_str<T: DeserializeOwned>(ron_str: &str) -> Result<T, ConfigError> {
    let options = ron::Options::default();
    options
        .from_str(ron_str)
        .map_err(|e| ConfigError::Parse(e.to_string()))
}

/// Read and parse a RON config file.
pub fn from_ron_file<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    from_ron_str(&text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    #[serde(default)]
    struct Sample {
        width: u32,
        label: String,
    }

    impl Default for Sample {
        fn default() -> Self {
            Self {
                width: 64,
                label: "default".into(),
            }
        }
    }

    #[test]
    fn test_partial_ron_uses_defaults() {
        let parsed: Sample = from_ron_str("(width: 128)").expect("valid RON");
        assert_eq!(parsed.width, 128);
        assert_eq!(parsed.label, "default");
    }

    #[test]
    fn test_invalid_ron_is_parse_error() {
        let result: Result<Sample, _> = from_ron_str("(width: )");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result: Result<Sample, _> = from_ron_file(Path::new("/nonexistent/volsynth.ron"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }
}
