use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::processor::MediaKind;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub queues: QueuesConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub processor: ProcessorConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    3000
}

/// Admission policy of a single job queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct QueueConfig {
    /// Maximum number of jobs held at once (queued + running).
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// Maximum number of jobs running at the same time.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            parallelism: default_parallelism(),
        }
    }
}

impl QueueConfig {
    pub fn new(capacity: usize, parallelism: usize) -> Self {
        Self {
            capacity,
            parallelism,
        }
    }
}

fn default_capacity() -> usize {
    5
}

fn default_parallelism() -> usize {
    1
}

/// One independent queue per media kind.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct QueuesConfig {
    #[serde(default)]
    pub image: QueueConfig,
    #[serde(default)]
    pub audio: QueueConfig,
    #[serde(default)]
    pub video: QueueConfig,
}

impl QueuesConfig {
    pub fn for_kind(&self, kind: MediaKind) -> QueueConfig {
        match kind {
            MediaKind::Image => self.image,
            MediaKind::Audio => self.audio,
            MediaKind::Video => self.video,
        }
    }
}

/// Response streaming configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StreamConfig {
    /// Idle time after which a keepalive part is written.
    #[serde(default = "default_keepalive_interval")]
    pub keepalive_interval_secs: u64,
    /// Size of the bounded channel between the job and the encoder.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            keepalive_interval_secs: default_keepalive_interval(),
            event_buffer: default_event_buffer(),
        }
    }
}

impl StreamConfig {
    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.keepalive_interval_secs)
    }
}

fn default_keepalive_interval() -> u64 {
    60
}

fn default_event_buffer() -> usize {
    16
}

/// Configuration for the ffmpeg-backed processor.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProcessorConfig {
    /// Path to ffmpeg binary.
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: PathBuf,

    /// Directory for spooled inputs and produced outputs.
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,

    /// FFmpeg log level (quiet, panic, fatal, error, warning, info, verbose, debug, trace).
    #[serde(default = "default_log_level")]
    pub ffmpeg_log_level: String,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg_path(),
            temp_dir: default_temp_dir(),
            ffmpeg_log_level: default_log_level(),
        }
    }
}

impl ProcessorConfig {
    /// Sets the temp directory.
    pub fn with_temp_dir(mut self, temp_dir: PathBuf) -> Self {
        self.temp_dir = temp_dir;
        self
    }

    /// Sets the ffmpeg binary path.
    pub fn with_ffmpeg_path(mut self, ffmpeg_path: PathBuf) -> Self {
        self.ffmpeg_path = ffmpeg_path;
        self
    }
}

fn default_ffmpeg_path() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_temp_dir() -> PathBuf {
    std::env::temp_dir().join("mediaflow")
}

fn default_log_level() -> String {
    "error".to_string()
}
