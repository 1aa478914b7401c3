//! External prober invocation (spec.md §4.5). Runs a configured
//! ffprobe-compatible binary and parses its JSON report into structural and
//! tag metadata, grounded on the `essentia_client.rs` subprocess pattern:
//! blocking `Command` wrapped in `spawn_blocking`, exit status and stderr
//! surfaced as a typed error.

mod derive;
mod executor;

pub use derive::derive_track_fields;
pub use executor::AnalyzeExecutor;

use aqlab_common::{Error, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::process::Command;

#[derive(Debug, Clone, Deserialize)]
pub struct ProbeFormat {
    pub filename: String,
    #[serde(default, rename = "format_name")]
    pub container_name: String,
    #[serde(default, deserialize_with = "de_opt_f64_from_str")]
    pub duration: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_i64_from_str")]
    pub size: Option<i64>,
    #[serde(default, rename = "bit_rate", deserialize_with = "de_opt_i64_from_str")]
    pub bitrate: Option<i64>,
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProbeStream {
    #[serde(rename = "codec_type")]
    pub codec_type: String,
    #[serde(rename = "codec_name")]
    pub codec_name: String,
    #[serde(default, deserialize_with = "de_opt_i64_from_str")]
    pub sample_rate: Option<i64>,
    #[serde(default)]
    pub channels: Option<i64>,
    #[serde(default)]
    pub bits_per_sample: Option<i64>,
    #[serde(default)]
    pub bits_per_raw_sample: Option<i64>,
    #[serde(default)]
    pub bits_per_coded_sample: Option<i64>,
    #[serde(default, rename = "bit_rate", deserialize_with = "de_opt_i64_from_str")]
    pub bitrate: Option<i64>,
    #[serde(default, deserialize_with = "de_opt_f64_from_str")]
    pub duration: Option<f64>,
    #[serde(default)]
    pub tags: HashMap<String, String>,
    #[serde(default)]
    pub disposition: HashMap<String, i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProbeResult {
    pub format: ProbeFormat,
    pub streams: Vec<ProbeStream>,
}

/// ffprobe renders numeric fields as strings in its JSON output; deserialize
/// leniently so either shape parses.
fn de_opt_f64_from_str<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StrOrNum {
        S(String),
        F(f64),
        Null,
    }
    Ok(match Option::<StrOrNum>::deserialize(deserializer)? {
        Some(StrOrNum::S(s)) => s.parse().ok(),
        Some(StrOrNum::F(f)) => Some(f),
        _ => None,
    })
}

fn de_opt_i64_from_str<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StrOrNum {
        S(String),
        I(i64),
        Null,
    }
    Ok(match Option::<StrOrNum>::deserialize(deserializer)? {
        Some(StrOrNum::S(s)) => s.parse().ok(),
        Some(StrOrNum::I(i)) => Some(i),
        _ => None,
    })
}

/// Invoke the configured prober binary on `path` and parse its JSON report.
/// A non-zero exit or unparseable output is surfaced as
/// [`Error::DecoderFailure`] (spec.md §4.5 failure semantics).
pub async fn probe(prober_path: &str, path: &Path) -> Result<ProbeResult> {
    let prober = prober_path.to_string();
    let target = path.to_path_buf();

    let output = tokio::task::spawn_blocking(move || {
        Command::new(&prober)
            .arg("-v")
            .arg("quiet")
            .arg("-print_format")
            .arg("json")
            .arg("-show_format")
            .arg("-show_streams")
            .arg(&target)
            .output()
    })
    .await
    .map_err(|e| Error::Internal(format!("probe task join error: {e}")))?
    .map_err(|e| Error::DecoderFailure(format!("failed to launch prober: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::DecoderFailure(format!(
            "prober exited with {:?}: {stderr}",
            output.status.code()
        )));
    }

    serde_json::from_slice(&output.stdout)
        .map_err(|e| Error::ParseFailure(format!("unparseable prober output: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_ffprobe_style_json() {
        let json = r#"
        {
            "format": {
                "filename": "/music/a.flac",
                "format_name": "flac",
                "duration": "245.30",
                "size": "40000000",
                "bit_rate": "900000",
                "tags": {"ARTIST": "Artist", "title": "Title"}
            },
            "streams": [
                {
                    "codec_type": "audio",
                    "codec_name": "flac",
                    "sample_rate": "44100",
                    "channels": 2,
                    "bits_per_raw_sample": 16,
                    "tags": {},
                    "disposition": {}
                }
            ]
        }
        "#;
        let result: ProbeResult = serde_json::from_str(json).unwrap();
        assert_eq!(result.format.container_name, "flac");
        assert_eq!(result.format.duration, Some(245.30));
        assert_eq!(result.streams[0].sample_rate, Some(44100));
    }
}
