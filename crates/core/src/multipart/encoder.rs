use bytes::Bytes;
use futures::stream::{BoxStream, Stream, StreamExt};
use std::io;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::processor::{ByteStream, ProcessedFile};

use super::writer::{generate_boundary, MultipartWriter, KEEPALIVE};
use super::{StreamError, StreamItem, StreamResult};

/// Number of framed chunks buffered ahead of the transport.
const OUTPUT_BUFFER: usize = 8;

/// Adapts a channel receiver into a stream.
pub fn receiver_stream<T: Send + 'static>(rx: mpsc::Receiver<T>) -> BoxStream<'static, T> {
    futures::stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) })
        .boxed()
}

/// Frames a sequence of stream items as a `multipart/mixed` body.
#[derive(Debug)]
pub struct MultipartEncoder {
    writer: MultipartWriter,
    keepalive: Duration,
}

impl MultipartEncoder {
    pub fn new(keepalive: Duration) -> Self {
        Self::with_boundary(generate_boundary(), keepalive)
    }

    pub fn with_boundary(boundary: impl Into<String>, keepalive: Duration) -> Self {
        Self {
            writer: MultipartWriter::new(boundary),
            keepalive,
        }
    }

    pub fn boundary(&self) -> &str {
        self.writer.boundary()
    }

    pub fn content_type(&self) -> String {
        self.writer.content_type()
    }

    /// Starts encoding `items` on a background task and returns the body.
    ///
    /// Dropping the body stops the task, which in turn drops `items`.
    pub fn encode<S>(self, items: S) -> ByteStream
    where
        S: Stream<Item = StreamResult> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(OUTPUT_BUFFER);
        tokio::spawn(self.run(items.boxed(), tx));
        receiver_stream(rx)
    }

    async fn run(
        mut self,
        mut items: BoxStream<'static, StreamResult>,
        tx: mpsc::Sender<io::Result<Bytes>>,
    ) {
        let idle = tokio::time::sleep(self.keepalive);
        tokio::pin!(idle);

        let outcome = loop {
            tokio::select! {
                item = items.next() => {
                    let written = match item {
                        None => break Ok(()),
                        Some(Err(e)) => break Err(e),
                        Some(Ok(StreamItem::Event(event))) => {
                            match self.writer.json_part(&event) {
                                Ok(part) => send(&tx, part).await,
                                Err(e) => Err(StreamError::failed(e.to_string())),
                            }
                        }
                        Some(Ok(StreamItem::File(file))) => self.write_file(file, &tx).await,
                    };
                    if let Err(e) = written {
                        break Err(e);
                    }
                    idle.as_mut().reset(Instant::now() + self.keepalive);
                }
                _ = &mut idle => {
                    if let Err(e) = send(&tx, self.writer.text_part(KEEPALIVE)).await {
                        break Err(e);
                    }
                    idle.as_mut().reset(Instant::now() + self.keepalive);
                }
                _ = tx.closed() => break Err(StreamError::Aborted),
            }
        };

        // Release the producer before finishing so it observes the close.
        drop(items);

        if let Err(e) = outcome {
            match e.message() {
                Some(message) => {
                    warn!("Response stream failed: {}", message);
                    let part = self
                        .writer
                        .json_part(&serde_json::json!({ "error": message }));
                    if let Ok(part) = part {
                        let _ = send(&tx, part).await;
                    }
                }
                None => warn!("Response stream aborted"),
            }
        }

        if send(&tx, self.writer.end()).await.is_err() {
            debug!("Response body dropped before the closing boundary");
        }
    }

    async fn write_file(
        &mut self,
        file: ProcessedFile,
        tx: &mpsc::Sender<io::Result<Bytes>>,
    ) -> Result<(), StreamError> {
        let name = file.name().to_string();
        let mime_type = file.mime_type().to_string();
        let mut chunks = file
            .into_stream()
            .await
            .map_err(|e| StreamError::failed(format!("Failed to read {}: {}", name, e)))?;

        send(tx, self.writer.part(&mime_type, Some(&name))).await?;
        while let Some(chunk) = chunks.next().await {
            let chunk =
                chunk.map_err(|e| StreamError::failed(format!("Failed to read {}: {}", name, e)))?;
            if !chunk.is_empty() {
                send(tx, chunk).await?;
            }
        }
        Ok(())
    }
}

async fn send(tx: &mpsc::Sender<io::Result<Bytes>>, bytes: Bytes) -> Result<(), StreamError> {
    tx.send(Ok(bytes)).await.map_err(|_| StreamError::Aborted)
}
