use serde::{Deserialize, Serialize};

/// Configuration for [`DescriptorDecoder`](crate::DescriptorDecoder).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeConfig {
    /// Upper bound on a declared text length, checked before any buffer is
    /// allocated. `None` accepts any length that fits in `usize`.
    pub max_field_len: Option<usize>,
    /// Reject text fields that are not valid UTF-8. When `false`, invalid
    /// sequences are replaced with U+FFFD instead.
    pub strict_utf8: bool,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            max_field_len: None,
            strict_utf8: true,
        }
    }
}

impl DecodeConfig {
    /// Default configuration with a bound on text field length.
    pub fn with_max_field_len(max: usize) -> Self {
        Self {
            max_field_len: Some(max),
            ..Default::default()
        }
    }

    /// A configuration that decodes invalid UTF-8 lossily.
    ///
    /// Intended for salvage tooling; the result may not re-encode to the
    /// original bytes.
    pub fn lossy() -> Self {
        Self {
            strict_utf8: false,
            ..Default::default()
        }
    }
}
