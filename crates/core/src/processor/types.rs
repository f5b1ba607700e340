//! Types for the processor module.

use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;

/// A stream of byte chunks.
pub type ByteStream = BoxStream<'static, io::Result<Bytes>>;

/// Kind of media a queue and its endpoint handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Audio,
    Video,
}

impl MediaKind {
    pub const ALL: [MediaKind; 3] = [Self::Image, Self::Audio, Self::Video];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Audio => "audio",
            Self::Video => "video",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input handed to a processor.
pub enum MediaInput {
    /// A file owned by the caller. The processor never deletes it.
    Path(PathBuf),
    /// An in-memory blob.
    Bytes(Bytes),
    /// A byte stream, e.g. a request body.
    Stream(ByteStream),
}

impl fmt::Debug for MediaInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Self::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// Returns the MIME type for a file extension.
pub fn mime_for_extension(ext: &str) -> &'static str {
    match ext.to_ascii_lowercase().as_str() {
        // Audio
        "mp3" => "audio/mpeg",
        "ogg" | "oga" => "audio/ogg",
        "opus" => "audio/opus",
        "flac" => "audio/flac",
        "wav" => "audio/wav",
        "m4a" => "audio/mp4",
        "aac" => "audio/aac",
        "weba" => "audio/webm",
        // Video
        "mp4" | "m4v" => "video/mp4",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        "mov" => "video/quicktime",
        "avi" => "video/x-msvideo",
        "ts" => "video/mp2t",
        "ogv" => "video/ogg",
        "gif" => "image/gif",
        // Image
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "avif" => "image/avif",
        _ => "application/octet-stream",
    }
}

/// Maps an ffmpeg muxer name to the usual file extension.
fn extension_for_format(format: &str) -> String {
    match format {
        "matroska" => "mkv",
        "adts" => "aac",
        "ipod" => "m4a",
        "mpegts" => "ts",
        "image2" | "mjpeg" => "jpeg",
        "oga" => "ogg",
        other => other,
    }
    .to_string()
}

fn push_opt(args: &mut Vec<String>, flag: &str, value: Option<impl ToString>) {
    if let Some(value) = value {
        args.extend([flag.to_string(), value.to_string()]);
    }
}

/// Options for one audio output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AudioOptions {
    /// Output muxer (`-f`), defaults to mp3.
    pub format: Option<String>,
    /// Audio codec (`-c:a`).
    pub codec: Option<String>,
    /// Audio bitrate, e.g. `128k`.
    pub bitrate: Option<String>,
    /// Simple audio filter graph (`-af`).
    pub filters: Option<String>,
    /// Complex filter graph (`-filter_complex`).
    pub complex_filters: Option<String>,
    /// Start offset in seconds.
    pub seek: Option<f64>,
    /// Output duration in seconds.
    pub duration: Option<f64>,
    /// Extra raw ffmpeg arguments.
    #[serde(default)]
    pub args: Vec<String>,
    /// File extension override.
    pub ext: Option<String>,
    /// Suggested filename for the produced file.
    pub name: Option<String>,
    /// Destination path; the file is written there instead of streamed back.
    pub output: Option<PathBuf>,
}

impl AudioOptions {
    pub fn ffmpeg_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        push_opt(&mut args, "-f", Some(self.format.as_deref().unwrap_or("mp3")));
        push_opt(&mut args, "-ss", self.seek);
        push_opt(&mut args, "-t", self.duration);
        push_opt(&mut args, "-b:a", self.bitrate.as_deref());
        push_opt(&mut args, "-af", self.filters.as_deref());
        push_opt(&mut args, "-filter_complex", self.complex_filters.as_deref());
        push_opt(&mut args, "-c:a", self.codec.as_deref());
        args.extend(self.args.iter().cloned());
        args
    }

    pub fn extension(&self) -> String {
        self.ext
            .clone()
            .unwrap_or_else(|| extension_for_format(self.format.as_deref().unwrap_or("mp3")))
    }
}

/// Options for one video output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct VideoOptions {
    /// Output muxer (`-f`), defaults to mp4.
    pub format: Option<String>,
    /// Video codec (`-c:v`).
    pub video_codec: Option<String>,
    /// Audio codec (`-c:a`).
    pub audio_codec: Option<String>,
    /// Video bitrate, e.g. `2M`.
    pub video_bitrate: Option<String>,
    /// Audio bitrate, e.g. `128k`.
    pub audio_bitrate: Option<String>,
    /// Constant rate factor (0-63 depending on codec).
    pub crf: Option<u8>,
    /// Video filter graph (`-vf`).
    pub video_filters: Option<String>,
    /// Audio filter graph (`-af`).
    pub audio_filters: Option<String>,
    /// Complex filter graph (`-filter_complex`).
    pub complex_filters: Option<String>,
    /// Start offset in seconds.
    pub seek: Option<f64>,
    /// Output duration in seconds.
    pub duration: Option<f64>,
    /// Extra raw ffmpeg arguments.
    #[serde(default)]
    pub args: Vec<String>,
    /// File extension override.
    pub ext: Option<String>,
    /// Suggested filename for the produced file.
    pub name: Option<String>,
    /// Destination path; the file is written there instead of streamed back.
    pub output: Option<PathBuf>,
}

impl VideoOptions {
    pub fn ffmpeg_args(&self) -> Vec<String> {
        let format = self.format.as_deref().unwrap_or("mp4");
        let mut args = Vec::new();
        push_opt(&mut args, "-f", Some(format));
        push_opt(&mut args, "-ss", self.seek);
        push_opt(&mut args, "-t", self.duration);
        push_opt(&mut args, "-c:v", self.video_codec.as_deref());
        push_opt(&mut args, "-crf", self.crf);
        push_opt(&mut args, "-b:v", self.video_bitrate.as_deref());
        push_opt(&mut args, "-vf", self.video_filters.as_deref());
        push_opt(&mut args, "-c:a", self.audio_codec.as_deref());
        push_opt(&mut args, "-b:a", self.audio_bitrate.as_deref());
        push_opt(&mut args, "-af", self.audio_filters.as_deref());
        push_opt(&mut args, "-filter_complex", self.complex_filters.as_deref());
        // moov atom up front so the file plays while still downloading
        if format == "mp4" {
            args.extend(["-movflags".to_string(), "+faststart".to_string()]);
        }
        args.extend(self.args.iter().cloned());
        args
    }

    pub fn extension(&self) -> String {
        self.ext
            .clone()
            .unwrap_or_else(|| extension_for_format(self.format.as_deref().unwrap_or("mp4")))
    }
}

/// Still image output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Jpeg,
    Png,
    Webp,
    Avif,
}

impl ImageFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpeg",
            Self::Png => "png",
            Self::Webp => "webp",
            Self::Avif => "avif",
        }
    }

    fn muxer(&self) -> &'static str {
        match self {
            Self::Jpeg | Self::Png => "image2",
            Self::Webp => "webp",
            Self::Avif => "avif",
        }
    }

    fn codec(&self) -> &'static str {
        match self {
            Self::Jpeg => "mjpeg",
            Self::Png => "png",
            Self::Webp => "libwebp",
            Self::Avif => "libaom-av1",
        }
    }
}

/// Target dimensions of an image output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResizeOptions {
    /// Target width in pixels; height keeps the aspect ratio when omitted.
    pub width: Option<u32>,
    /// Target height in pixels; width keeps the aspect ratio when omitted.
    pub height: Option<u32>,
}

/// Options for one image output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ImageOptions {
    pub format: ImageFormat,
    pub resize: Option<ResizeOptions>,
    /// Quality from 1 (worst) to 100 (best).
    pub quality: Option<u8>,
    /// Suggested filename for the produced file.
    pub name: Option<String>,
    /// Destination path; the file is written there instead of streamed back.
    pub output: Option<PathBuf>,
}

impl ImageOptions {
    pub fn ffmpeg_args(&self) -> Vec<String> {
        let mut args = vec!["-frames:v".to_string(), "1".to_string()];

        if let Some(resize) = self.resize.filter(|r| r.width.is_some() || r.height.is_some()) {
            let dim = |d: Option<u32>| d.map(|d| d.to_string()).unwrap_or_else(|| "-1".into());
            args.extend([
                "-vf".to_string(),
                format!("scale={}:{}", dim(resize.width), dim(resize.height)),
            ]);
        }

        args.extend(["-c:v".to_string(), self.format.codec().to_string()]);

        if let Some(quality) = self.quality {
            let quality = u32::from(quality.clamp(1, 100));
            match self.format {
                // mjpeg: 2 (best) .. 31 (worst)
                ImageFormat::Jpeg => {
                    args.extend(["-q:v".to_string(), (31 - (quality - 1) * 29 / 99).to_string()])
                }
                ImageFormat::Webp => args.extend(["-quality".to_string(), quality.to_string()]),
                // libaom: 0 (best) .. 63 (worst)
                ImageFormat::Avif => {
                    args.extend(["-crf".to_string(), ((100 - quality) * 63 / 99).to_string()])
                }
                ImageFormat::Png => {}
            }
        }
        if self.format == ImageFormat::Avif {
            args.extend(["-still-picture".to_string(), "1".to_string()]);
        }

        args.extend(["-f".to_string(), self.format.muxer().to_string()]);
        args
    }
}

/// Per-output option set of a job.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputOptions {
    Image(ImageOptions),
    Audio(AudioOptions),
    Video(VideoOptions),
}

impl OutputOptions {
    pub fn kind(&self) -> MediaKind {
        match self {
            Self::Image(_) => MediaKind::Image,
            Self::Audio(_) => MediaKind::Audio,
            Self::Video(_) => MediaKind::Video,
        }
    }

    /// Output-side ffmpeg arguments (everything between input and output path).
    pub fn ffmpeg_args(&self) -> Vec<String> {
        match self {
            Self::Image(o) => o.ffmpeg_args(),
            Self::Audio(o) => o.ffmpeg_args(),
            Self::Video(o) => o.ffmpeg_args(),
        }
    }

    pub fn extension(&self) -> String {
        match self {
            Self::Image(o) => o.format.extension().to_string(),
            Self::Audio(o) => o.extension(),
            Self::Video(o) => o.extension(),
        }
    }

    pub fn mime_type(&self) -> &'static str {
        mime_for_extension(&self.extension())
    }

    /// Suggested filename requested by the client.
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Image(o) => o.name.as_deref(),
            Self::Audio(o) => o.name.as_deref(),
            Self::Video(o) => o.name.as_deref(),
        }
    }

    /// Destination path requested by the client.
    pub fn output(&self) -> Option<&Path> {
        match self {
            Self::Image(o) => o.output.as_deref(),
            Self::Audio(o) => o.output.as_deref(),
            Self::Video(o) => o.output.as_deref(),
        }
    }
}

/// A file on disk that is removed when the guard drops, unless kept.
#[derive(Debug)]
pub(crate) struct TransientFile {
    path: PathBuf,
    armed: bool,
}

impl TransientFile {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    fn keep(mut self) {
        self.armed = false;
    }
}

impl Drop for TransientFile {
    fn drop(&mut self) {
        if self.armed {
            if let Err(e) = std::fs::remove_file(&self.path) {
                if e.kind() != io::ErrorKind::NotFound {
                    tracing::warn!("Failed to remove transient file {:?}: {}", self.path, e);
                }
            }
        }
    }
}

enum FileBody {
    Path(TransientFile),
    Stream(ByteStream),
}

/// An output produced by a processor.
///
/// A path-backed file is transient: its backing file is deleted exactly once,
/// after it has been streamed, persisted elsewhere, or dropped.
pub struct ProcessedFile {
    name: String,
    mime_type: String,
    body: FileBody,
}

impl fmt::Debug for ProcessedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("ProcessedFile");
        s.field("name", &self.name).field("mime_type", &self.mime_type);
        match &self.body {
            FileBody::Path(file) => s.field("path", &file.path()),
            FileBody::Stream(_) => s.field("stream", &".."),
        };
        s.finish()
    }
}

impl ProcessedFile {
    /// Wraps a transient file; it is deleted once consumed or dropped.
    pub fn from_path(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            body: FileBody::Path(TransientFile::new(path.into())),
        }
    }

    pub(crate) fn from_transient(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        file: TransientFile,
    ) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            body: FileBody::Path(file),
        }
    }

    pub fn from_stream(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        stream: ByteStream,
    ) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            body: FileBody::Stream(stream),
        }
    }

    pub fn from_bytes(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        bytes: impl Into<Bytes>,
    ) -> Self {
        let bytes: Bytes = bytes.into();
        Self::from_stream(
            name,
            mime_type,
            futures::stream::once(async move { Ok(bytes) }).boxed(),
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Path of the backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        match &self.body {
            FileBody::Path(file) => Some(file.path()),
            FileBody::Stream(_) => None,
        }
    }

    /// Replaces the suggested filename.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Turns the file into a chunk stream. A backing file is deleted when the
    /// returned stream is dropped.
    pub async fn into_stream(self) -> io::Result<ByteStream> {
        match self.body {
            FileBody::Stream(stream) => Ok(stream),
            FileBody::Path(transient) => {
                let file = tokio::fs::File::open(transient.path()).await?;
                Ok(ReaderStream::new(file)
                    .map(move |chunk| {
                        let _ = &transient;
                        chunk
                    })
                    .boxed())
            }
        }
    }

    /// Writes the file to `dest` and releases any transient backing file.
    /// Returns the number of bytes written.
    pub async fn persist(self, dest: &Path) -> io::Result<u64> {
        if let Some(parent) = dest.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        match self.body {
            FileBody::Path(transient) => {
                if tokio::fs::rename(transient.path(), dest).await.is_ok() {
                    transient.keep();
                    return Ok(tokio::fs::metadata(dest).await?.len());
                }
                // Different filesystem: copy, the guard removes the source.
                tokio::fs::copy(transient.path(), dest).await
            }
            FileBody::Stream(mut stream) => {
                let mut out = tokio::fs::File::create(dest).await?;
                let mut written = 0u64;
                while let Some(chunk) = stream.next().await {
                    let chunk = chunk?;
                    out.write_all(&chunk).await?;
                    written += chunk.len() as u64;
                }
                out.flush().await?;
                Ok(written)
            }
        }
    }
}
