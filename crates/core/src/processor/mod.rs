//! Processor module: the contract between the queue and the component that
//! actually transforms media, plus an FFmpeg-backed implementation.
//!
//! A [`Processor`] takes one input and an ordered list of [`OutputOptions`]
//! and yields one [`ProcessedFile`] per output, in order. It must stop
//! promptly when its cancellation token fires and discard partial output.
//!
//! # Example
//!
//! ```ignore
//! use mediaflow_core::processor::{FfmpegProcessor, MediaInput, Processor};
//! use mediaflow_core::config::ProcessorConfig;
//!
//! let processor = FfmpegProcessor::new(ProcessorConfig::default());
//! processor.validate().await?;
//!
//! let mut files = processor.process(
//!     MediaInput::Path("/path/to/input.flac".into()),
//!     outputs,
//!     CancellationToken::new(),
//! );
//! while let Some(file) = files.next().await {
//!     let file = file?;
//!     println!("Produced {} ({})", file.name(), file.mime_type());
//! }
//! ```

mod capabilities;
mod error;
mod ffmpeg;
mod traits;
mod types;

pub use capabilities::{EncoderCapabilities, EncoderInfo, FilterInfo, FormatInfo, StreamKind};
pub use error::ProcessorError;
pub use ffmpeg::FfmpegProcessor;
pub use traits::{ProcessedStream, Processor};
pub use types::{
    mime_for_extension, AudioOptions, ByteStream, ImageFormat, ImageOptions, MediaInput,
    MediaKind, OutputOptions, ProcessedFile, ResizeOptions, VideoOptions,
};
