//! Conversion request options and their validation.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use mm_core::{Error, Result};

/// Optional knobs accompanying a conversion request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionOptions {
    /// Encoder quality, 1..=100.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<u8>,
    /// Bitrate string handed to ffmpeg as-is, e.g. `"5M"` or `"192k"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bitrate: Option<String>,
    /// Byte budget for the post-conversion compression pass.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_file_size: Option<u64>,
}

impl ConversionOptions {
    /// Parse and validate options from a JSON document.
    pub fn from_json(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| Error::validation(format!("options must be valid JSON: {e}")))?;
        Self::try_from(&value)
    }

    /// Check values constructed directly in code.
    pub fn validate(&self) -> Result<()> {
        if let Some(q) = self.quality {
            if !(1..=100).contains(&q) {
                return Err(Error::validation("quality must be between 1 and 100"));
            }
        }
        if let Some(ref b) = self.bitrate {
            if b.trim().is_empty() {
                return Err(Error::validation("bitrate must be a non-empty string (e.g. \"5M\")"));
            }
        }
        Ok(())
    }
}

impl TryFrom<&Value> for ConversionOptions {
    type Error = Error;

    fn try_from(value: &Value) -> Result<Self> {
        let map = value
            .as_object()
            .ok_or_else(|| Error::validation("options must be an object"))?;

        let quality = match map.get("quality") {
            None | Some(Value::Null) => None,
            Some(v) => Some(parse_quality(v)?),
        };

        let bitrate = match map.get("bitrate") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(_) => {
                return Err(Error::validation("bitrate must be a string (e.g. \"5M\")"));
            }
        };

        let target_file_size = match map.get("targetFileSize") {
            None | Some(Value::Null) => None,
            Some(v) => Some(parse_target_size(v)?),
        };

        let options = Self {
            quality,
            bitrate,
            target_file_size,
        };
        options.validate()?;
        Ok(options)
    }
}

fn parse_quality(v: &Value) -> Result<u8> {
    let err = || Error::validation("quality must be an integer between 1 and 100");
    let n = match v.as_u64() {
        Some(n) => n,
        None => {
            let f = v.as_f64().ok_or_else(err)?;
            if f.fract() != 0.0 || f < 0.0 {
                return Err(err());
            }
            f as u64
        }
    };
    if !(1..=100).contains(&n) {
        return Err(err());
    }
    Ok(n as u8)
}

fn parse_target_size(v: &Value) -> Result<u64> {
    let err = || Error::validation("targetFileSize must be a non-negative number (in bytes)");
    if let Some(n) = v.as_u64() {
        return Ok(n);
    }
    let f = v.as_f64().ok_or_else(err)?;
    if !f.is_finite() || f < 0.0 {
        return Err(err());
    }
    Ok(f.floor() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_full_options() {
        let opts =
            ConversionOptions::from_json(r#"{"quality": 80, "bitrate": "2M", "targetFileSize": 204800}"#)
                .unwrap();
        assert_eq!(opts.quality, Some(80));
        assert_eq!(opts.bitrate.as_deref(), Some("2M"));
        assert_eq!(opts.target_file_size, Some(204_800));
    }

    #[test]
    fn empty_object_is_default() {
        let opts = ConversionOptions::try_from(&json!({})).unwrap();
        assert_eq!(opts, ConversionOptions::default());
    }

    #[test]
    fn non_object_rejected() {
        for v in [json!(null), json!([1, 2]), json!("quality=5"), json!(3)] {
            let err = ConversionOptions::try_from(&v).unwrap_err();
            assert!(matches!(err, Error::Validation(_)), "{v}");
        }
    }

    #[test]
    fn quality_bounds() {
        assert!(ConversionOptions::try_from(&json!({"quality": 0})).is_err());
        assert!(ConversionOptions::try_from(&json!({"quality": 101})).is_err());
        assert!(ConversionOptions::try_from(&json!({"quality": 50.5})).is_err());
        assert!(ConversionOptions::try_from(&json!({"quality": "high"})).is_err());
        assert_eq!(
            ConversionOptions::try_from(&json!({"quality": 100.0}))
                .unwrap()
                .quality,
            Some(100)
        );
    }

    #[test]
    fn bitrate_must_be_string() {
        let err = ConversionOptions::try_from(&json!({"bitrate": 5000})).unwrap_err();
        assert!(err.to_string().contains("bitrate must be a string"));
    }

    #[test]
    fn target_size_must_be_non_negative() {
        assert!(ConversionOptions::try_from(&json!({"targetFileSize": -1})).is_err());
        assert!(ConversionOptions::try_from(&json!({"targetFileSize": "1MB"})).is_err());
        assert_eq!(
            ConversionOptions::try_from(&json!({"targetFileSize": 0}))
                .unwrap()
                .target_file_size,
            Some(0)
        );
    }

    #[test]
    fn invalid_json_is_validation_error() {
        let err = ConversionOptions::from_json("{quality:").unwrap_err();
        assert_eq!(err.http_status(), 400);
    }
}
