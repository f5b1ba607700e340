//! FFmpeg-based processor implementation.

use async_trait::async_trait;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::ProcessorConfig;
use crate::multipart::receiver_stream;

use super::error::ProcessorError;
use super::traits::{ProcessedStream, Processor};
use super::types::{MediaInput, OutputOptions, ProcessedFile, TransientFile};

/// FFmpeg-based processor implementation.
#[derive(Debug, Clone)]
pub struct FfmpegProcessor {
    config: ProcessorConfig,
}

/// Input file on disk, removed afterwards if it was spooled by us.
struct SpooledInput {
    path: PathBuf,
    _transient: Option<TransientFile>,
}

impl FfmpegProcessor {
    /// Creates a new FFmpeg processor with the given configuration.
    pub fn new(config: ProcessorConfig) -> Self {
        Self { config }
    }

    /// Creates a processor with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(ProcessorConfig::default())
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    fn temp_path(&self, prefix: &str, ext: &str) -> PathBuf {
        self.config
            .temp_dir
            .join(format!("{}-{}.{}", prefix, uuid::Uuid::new_v4().simple(), ext))
    }

    /// Builds the full ffmpeg command line for one output.
    fn build_args(&self, input_path: &Path, output: &OutputOptions, output_path: &Path) -> Vec<String> {
        let mut args = vec![
            "-y".to_string(), // Overwrite output
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            self.config.ffmpeg_log_level.clone(),
            "-i".to_string(),
            input_path.to_string_lossy().to_string(),
        ];
        args.extend(output.ffmpeg_args());
        args.push(output_path.to_string_lossy().to_string());
        args
    }

    /// Writes the input to a transient file unless it already is a file.
    async fn spool_input(
        &self,
        input: MediaInput,
        cancel: &CancellationToken,
    ) -> Result<SpooledInput, ProcessorError> {
        let mut stream = match input {
            MediaInput::Path(path) => {
                if !path.exists() {
                    return Err(ProcessorError::InputFailed {
                        reason: format!("{} does not exist", path.display()),
                    });
                }
                return Ok(SpooledInput {
                    path,
                    _transient: None,
                });
            }
            MediaInput::Bytes(bytes) => futures::stream::once(async move { Ok(bytes) }).boxed(),
            MediaInput::Stream(stream) => stream,
        };

        tokio::fs::create_dir_all(&self.config.temp_dir).await?;
        let transient = TransientFile::new(self.temp_path("input", "bin"));
        let mut file = tokio::fs::File::create(transient.path()).await?;

        loop {
            let chunk = tokio::select! {
                chunk = stream.next() => chunk,
                _ = cancel.cancelled() => return Err(ProcessorError::Cancelled),
            };
            match chunk {
                Some(Ok(bytes)) => file.write_all(&bytes).await?,
                Some(Err(e)) => {
                    return Err(ProcessorError::InputFailed {
                        reason: e.to_string(),
                    })
                }
                None => break,
            }
        }
        file.flush().await?;

        Ok(SpooledInput {
            path: transient.path().to_path_buf(),
            _transient: Some(transient),
        })
    }

    /// Runs ffmpeg for one output. Kills the child if cancelled.
    async fn run_ffmpeg(
        &self,
        input_path: &Path,
        output: &OutputOptions,
        output_path: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), ProcessorError> {
        let args = self.build_args(input_path, output, output_path);
        debug!("Running {:?} {}", self.config.ffmpeg_path, args.join(" "));

        let mut child = Command::new(&self.config.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ProcessorError::FfmpegNotFound {
                        path: self.config.ffmpeg_path.clone(),
                    }
                } else {
                    ProcessorError::Io(e)
                }
            })?;

        // Drain stderr concurrently so a chatty ffmpeg never blocks on a full pipe.
        let stderr = child.stderr.take();
        let stderr_task = tokio::spawn(async move {
            let mut output = String::new();
            if let Some(mut stderr) = stderr {
                let _ = stderr.read_to_string(&mut output).await;
            }
            output
        });

        let status = tokio::select! {
            status = child.wait() => status?,
            _ = cancel.cancelled() => {
                let _ = child.kill().await;
                stderr_task.abort();
                return Err(ProcessorError::Cancelled);
            }
        };

        let error_output = stderr_task.await.unwrap_or_default();
        if !status.success() {
            return Err(ProcessorError::process_failed(
                format!("FFmpeg exited with code: {:?}", status.code()),
                if error_output.trim().is_empty() {
                    None
                } else {
                    Some(error_output.trim().to_string())
                },
            ));
        }

        Ok(())
    }

    /// Produces every output in order, sending each file as soon as it exists.
    async fn run(
        self,
        input: MediaInput,
        outputs: Vec<OutputOptions>,
        cancel: CancellationToken,
        tx: mpsc::Sender<Result<ProcessedFile, ProcessorError>>,
    ) {
        let input = match self.spool_input(input, &cancel).await {
            Ok(input) => input,
            Err(e) => {
                let _ = tx.send(Err(e)).await;
                return;
            }
        };

        for (index, output) in outputs.iter().enumerate() {
            let ext = output.extension();
            let output_file = TransientFile::new(self.temp_path("output", &ext));

            match self
                .run_ffmpeg(&input.path, output, output_file.path(), &cancel)
                .await
            {
                Ok(()) => {
                    let file = ProcessedFile::from_transient(
                        format!("file{}.{}", index + 1, ext),
                        output.mime_type(),
                        output_file,
                    );
                    if tx.send(Ok(file)).await.is_err() {
                        debug!("Consumer went away, stopping after output {}", index + 1);
                        return;
                    }
                }
                Err(e) => {
                    if !e.is_cancelled() {
                        warn!("FFmpeg failed on output {}: {}", index + 1, e);
                    }
                    let _ = tx.send(Err(e)).await;
                    return;
                }
            }
        }
    }
}

#[async_trait]
impl Processor for FfmpegProcessor {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    fn process(
        &self,
        input: MediaInput,
        outputs: Vec<OutputOptions>,
        cancel: CancellationToken,
    ) -> ProcessedStream {
        let (tx, rx) = mpsc::channel(1);
        tokio::spawn(self.clone().run(input, outputs, cancel, tx));

        receiver_stream(rx)
    }

    async fn validate(&self) -> Result<(), ProcessorError> {
        // Check ffmpeg exists
        let ffmpeg_result = Command::new(&self.config.ffmpeg_path)
            .arg("-version")
            .output()
            .await;

        if let Err(e) = ffmpeg_result {
            if e.kind() == std::io::ErrorKind::NotFound {
                return Err(ProcessorError::FfmpegNotFound {
                    path: self.config.ffmpeg_path.clone(),
                });
            }
            return Err(ProcessorError::Io(e));
        }

        // Ensure temp dir exists
        tokio::fs::create_dir_all(&self.config.temp_dir).await?;

        Ok(())
    }
}
