//! Encoder, filter and format capability detection.

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use std::sync::OnceLock;
use tokio::process::Command;
use tracing::warn;

use crate::config::ProcessorConfig;

/// Stream type an encoder produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Video,
    Audio,
    Subtitle,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncoderInfo {
    pub name: String,
    pub kind: StreamKind,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterInfo {
    pub name: String,
    /// Input and output pad types, e.g. `A->A` or `V->V`.
    pub io: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatInfo {
    pub name: String,
    pub description: String,
    pub demux: bool,
    pub mux: bool,
}

/// What the local ffmpeg build supports.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EncoderCapabilities {
    pub encoders: Vec<EncoderInfo>,
    pub filters: Vec<FilterInfo>,
    pub formats: Vec<FormatInfo>,
}

impl EncoderCapabilities {
    /// Detect capabilities by probing ffmpeg. A probe that fails leaves its
    /// list empty.
    pub async fn detect(config: &ProcessorConfig) -> Self {
        let (encoders, filters, formats) = tokio::join!(
            probe(config, "-encoders"),
            probe(config, "-filters"),
            probe(config, "-formats"),
        );

        Self {
            encoders: encoders.map(|o| parse_encoders(&o)).unwrap_or_default(),
            filters: filters.map(|o| parse_filters(&o)).unwrap_or_default(),
            formats: formats.map(|o| parse_formats(&o)).unwrap_or_default(),
        }
    }

    pub fn has_encoder(&self, name: &str) -> bool {
        self.encoders.iter().any(|e| e.name == name)
    }

    pub fn has_filter(&self, name: &str) -> bool {
        self.filters.iter().any(|f| f.name == name)
    }

    /// Whether `name` can be written. Format names may be comma separated
    /// aliases such as `mov,mp4,m4a`.
    pub fn can_mux(&self, name: &str) -> bool {
        self.formats
            .iter()
            .any(|f| f.mux && f.name.split(',').any(|alias| alias == name))
    }
}

async fn probe(config: &ProcessorConfig, flag: &str) -> Option<String> {
    let output = Command::new(&config.ffmpeg_path)
        .args(["-hide_banner", flag])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output()
        .await;

    match output {
        Ok(o) if o.status.success() => Some(String::from_utf8_lossy(&o.stdout).to_string()),
        Ok(o) => {
            warn!("ffmpeg {} exited with {:?}", flag, o.status.code());
            None
        }
        Err(e) => {
            warn!("Failed to run ffmpeg {}: {}", flag, e);
            None
        }
    }
}

/// Lines after the legend, which ends with a dashed separator.
fn listing(output: &str) -> impl Iterator<Item = &str> {
    output
        .lines()
        .skip_while(|line| !line.trim_start().starts_with("--"))
        .skip(1)
}

fn encoder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*([VAS])[.A-Z]{5}\s+(\S+)\s+(.*)$").expect("valid encoder regex")
    })
}

fn filter_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*[T.][S.]?[C.]?\s+(\S+)\s+(\S*->\S*)\s+(.*)$").expect("valid filter regex")
    })
}

fn format_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^ ([D ])([E ])[d ]?\s+(\S+)\s+(.*)$").expect("valid format regex")
    })
}

/// Parses the output of `ffmpeg -encoders`.
pub fn parse_encoders(output: &str) -> Vec<EncoderInfo> {
    listing(output)
        .filter_map(|line| {
            let caps = encoder_re().captures(line)?;
            let kind = match &caps[1] {
                "V" => StreamKind::Video,
                "A" => StreamKind::Audio,
                _ => StreamKind::Subtitle,
            };
            Some(EncoderInfo {
                name: caps[2].to_string(),
                kind,
                description: caps[3].trim().to_string(),
            })
        })
        .collect()
}

/// Parses the output of `ffmpeg -filters`. The legend carries no separator,
/// so every line is matched and legend lines fall out for lacking an `->`.
pub fn parse_filters(output: &str) -> Vec<FilterInfo> {
    output
        .lines()
        .filter_map(|line| {
            let caps = filter_re().captures(line)?;
            Some(FilterInfo {
                name: caps[1].to_string(),
                io: caps[2].to_string(),
                description: caps[3].trim().to_string(),
            })
        })
        .collect()
}

/// Parses the output of `ffmpeg -formats`.
pub fn parse_formats(output: &str) -> Vec<FormatInfo> {
    listing(output)
        .filter_map(|line| {
            let caps = format_re().captures(line)?;
            Some(FormatInfo {
                demux: &caps[1] == "D",
                mux: &caps[2] == "E",
                name: caps[3].to_string(),
                description: caps[4].trim().to_string(),
            })
        })
        .collect()
}
