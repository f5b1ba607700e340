pub mod config;
pub mod multipart;
pub mod options;
pub mod processor;
pub mod progress;
pub mod queue;
pub mod testing;

pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, ProcessorConfig,
    QueueConfig, QueuesConfig, ServerConfig, StreamConfig,
};
pub use multipart::{MultipartEncoder, StreamError, StreamItem, StreamResult};
pub use options::{parse_options, OptionsError};
pub use processor::{
    EncoderCapabilities, FfmpegProcessor, MediaInput, MediaKind, OutputOptions, ProcessedFile,
    Processor, ProcessorError,
};
pub use progress::{ProgressEmitter, StatusEvent};
pub use queue::{Job, JobId, JobQueue, JobState, QueueError, QueueStats, Ticket};
