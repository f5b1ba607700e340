use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;

use crate::processor::{
    AudioOptions, ImageFormat, ImageOptions, MediaKind, OutputOptions, VideoOptions,
};

use super::error::OptionsError;

/// Name of the request header carrying the options.
pub const OPTIONS_HEADER: &str = "x-options";

/// Parses and validates the options for a `kind` request.
///
/// `raw` is the header value, if the request had one. Error paths carry the
/// entry index only when the header held an array.
pub fn parse_options(kind: MediaKind, raw: Option<&str>) -> Result<Vec<OutputOptions>, OptionsError> {
    let raw = raw.map(str::trim).filter(|r| !r.is_empty()).ok_or(OptionsError::Missing)?;
    let value: Value = serde_json::from_str(raw).map_err(|_| OptionsError::Malformed)?;

    let (entries, indexed) = match value {
        Value::Array(entries) => (entries, true),
        Value::Object(_) => (vec![value], false),
        _ => return Err(OptionsError::invalid("/", "Expected an object or an array of objects")),
    };
    if entries.is_empty() {
        return Err(OptionsError::Missing);
    }

    entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| {
            let path = if indexed { format!("/{}", index) } else { String::new() };
            let options = match kind {
                MediaKind::Image => {
                    check_image_format(&path, &entry)?;
                    let options: ImageOptions = typed(&path, entry)?;
                    validate_image(&path, &options)?;
                    OutputOptions::Image(options)
                }
                MediaKind::Audio => {
                    let options: AudioOptions = typed(&path, entry)?;
                    validate_audio(&path, &options)?;
                    OutputOptions::Audio(options)
                }
                MediaKind::Video => {
                    let options: VideoOptions = typed(&path, entry)?;
                    validate_video(&path, &options)?;
                    OutputOptions::Video(options)
                }
            };
            Ok(options)
        })
        .collect()
}

fn typed<T: DeserializeOwned>(path: &str, entry: Value) -> Result<T, OptionsError> {
    if !entry.is_object() {
        return Err(OptionsError::invalid(pointer(path), "Expected an object"));
    }
    serde_json::from_value(entry).map_err(|e| OptionsError::invalid(pointer(path), e.to_string()))
}

/// The root of a single-object header is `/`.
fn pointer(path: &str) -> &str {
    if path.is_empty() {
        "/"
    } else {
        path
    }
}

fn check_image_format(path: &str, entry: &Value) -> Result<(), OptionsError> {
    match entry.get("format") {
        Some(format) if ImageFormat::deserialize(format).is_err() => Err(OptionsError::invalid(
            field(path, "format"),
            "Expected union value",
        )),
        _ => Ok(()),
    }
}

fn field(path: &str, name: &str) -> String {
    format!("{}/{}", path, name)
}

fn non_empty(path: &str, name: &str, value: Option<&str>) -> Result<(), OptionsError> {
    match value {
        Some(v) if v.trim().is_empty() => Err(OptionsError::invalid(field(path, name), "Must not be empty")),
        _ => Ok(()),
    }
}

fn validate_target(path: &str, name: Option<&str>, output: Option<&Path>) -> Result<(), OptionsError> {
    non_empty(path, "name", name)?;
    if let Some(name) = name {
        if name.contains('/') || name.contains('\\') {
            return Err(OptionsError::invalid(
                field(path, "name"),
                "Must be a file name, not a path",
            ));
        }
    }
    if let Some(output) = output {
        if output.as_os_str().is_empty() {
            return Err(OptionsError::invalid(field(path, "output"), "Must not be empty"));
        }
    }
    Ok(())
}

fn validate_time(path: &str, seek: Option<f64>, duration: Option<f64>) -> Result<(), OptionsError> {
    if let Some(seek) = seek {
        if !seek.is_finite() || seek < 0.0 {
            return Err(OptionsError::invalid(field(path, "seek"), "Must be a non-negative number"));
        }
    }
    if let Some(duration) = duration {
        if !duration.is_finite() || duration <= 0.0 {
            return Err(OptionsError::invalid(field(path, "duration"), "Must be a positive number"));
        }
    }
    Ok(())
}

fn validate_ext(path: &str, ext: Option<&str>) -> Result<(), OptionsError> {
    match ext {
        Some(ext) if ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) => Err(
            OptionsError::invalid(field(path, "ext"), "Must be alphanumeric"),
        ),
        _ => Ok(()),
    }
}

fn validate_image(path: &str, options: &ImageOptions) -> Result<(), OptionsError> {
    if let Some(resize) = options.resize {
        if resize.width == Some(0) {
            return Err(OptionsError::invalid(field(path, "resize/width"), "Must be at least 1"));
        }
        if resize.height == Some(0) {
            return Err(OptionsError::invalid(field(path, "resize/height"), "Must be at least 1"));
        }
    }
    if let Some(quality) = options.quality {
        if !(1..=100).contains(&quality) {
            return Err(OptionsError::invalid(
                field(path, "quality"),
                "Must be between 1 and 100",
            ));
        }
    }
    validate_target(path, options.name.as_deref(), options.output.as_deref())
}

fn validate_audio(path: &str, options: &AudioOptions) -> Result<(), OptionsError> {
    non_empty(path, "format", options.format.as_deref())?;
    non_empty(path, "codec", options.codec.as_deref())?;
    validate_time(path, options.seek, options.duration)?;
    validate_ext(path, options.ext.as_deref())?;
    validate_target(path, options.name.as_deref(), options.output.as_deref())
}

fn validate_video(path: &str, options: &VideoOptions) -> Result<(), OptionsError> {
    non_empty(path, "format", options.format.as_deref())?;
    non_empty(path, "videoCodec", options.video_codec.as_deref())?;
    non_empty(path, "audioCodec", options.audio_codec.as_deref())?;
    if let Some(crf) = options.crf {
        if crf > 63 {
            return Err(OptionsError::invalid(field(path, "crf"), "Must be between 0 and 63"));
        }
    }
    validate_time(path, options.seek, options.duration)?;
    validate_ext(path, options.ext.as_deref())?;
    validate_target(path, options.name.as_deref(), options.output.as_deref())
}
