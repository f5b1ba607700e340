//! Testing utilities for exercising the streaming pipeline without ffmpeg.
//!
//! # Example
//!
//! ```rust,ignore
//! use mediaflow_core::testing::{fixtures, MockProcessor};
//!
//! let processor = Arc::new(MockProcessor::new());
//! processor.set_delay(Duration::from_millis(10));
//!
//! // Use in AppState, run a request, then decode the body with multer
//! // into `Part`s:
//! assert_eq!(parts[0].json()["position"], 0);
//! ```

mod mock_processor;
mod multipart;

pub use mock_processor::{MockProcessor, RecordedCall};
pub use multipart::Part;

/// Output option fixtures.
pub mod fixtures {
    use crate::processor::{AudioOptions, ImageFormat, ImageOptions, OutputOptions, VideoOptions};

    /// Default mp3 output.
    pub fn audio_output() -> OutputOptions {
        OutputOptions::Audio(AudioOptions::default())
    }

    /// Default mp4 output.
    pub fn video_output() -> OutputOptions {
        OutputOptions::Video(VideoOptions::default())
    }

    /// Image output in `format` without resizing.
    pub fn image_output(format: ImageFormat) -> OutputOptions {
        OutputOptions::Image(ImageOptions {
            format,
            resize: None,
            quality: None,
            name: None,
            output: None,
        })
    }

    /// `n` default mp3 outputs.
    pub fn audio_outputs(n: usize) -> Vec<OutputOptions> {
        (0..n).map(|_| audio_output()).collect()
    }
}
