//! Reply playback
//!
//! Fetches synthesized audio over HTTP and plays it on a rodio sink. At
//! most one playback is live: a new `Play` stops whatever is in flight.
//! Every attempt reports a `PlaybackFinished` completion (success, fetch or
//! decode failure, or supersession) tagged with its generation so the state
//! machine can discard stale ones.
//!
//! `rodio::OutputStream` is not `Send`, so it is parked on a dedicated
//! thread and only the (sendable) handle crosses into async code.

use std::io::Cursor;
use std::sync::Arc;

use rodio::{OutputStream, OutputStreamHandle, Sink};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{CallError, Result};
use crate::events::{EngineEvent, PlaybackCommand};

pub struct PlaybackController {
    commands: mpsc::UnboundedReceiver<PlaybackCommand>,
    events: mpsc::UnboundedSender<EngineEvent>,
    http: reqwest::Client,
}

impl PlaybackController {
    pub fn new(
        commands: mpsc::UnboundedReceiver<PlaybackCommand>,
        events: mpsc::UnboundedSender<EngineEvent>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| CallError::Playback(e.to_string()))?;

        Ok(Self {
            commands,
            events,
            http,
        })
    }

    pub async fn run(mut self) {
        // Missing output device is not fatal: plays fail fast and the call
        // keeps flowing as listen/respond turns.
        let stream_handle = match spawn_output_thread() {
            Ok(handle) => {
                info!("Playback output ready");
                Some(handle)
            }
            Err(e) => {
                warn!("No audio output available: {}", e);
                None
            }
        };

        let mut current: Option<Arc<Sink>> = None;

        while let Some(command) = self.commands.recv().await {
            match command {
                PlaybackCommand::Play { url, generation } => {
                    if let Some(sink) = current.take() {
                        sink.stop();
                    }

                    let handle = match &stream_handle {
                        Some(handle) => handle,
                        None => {
                            self.finish(generation, Some("no audio output".to_string()));
                            continue;
                        }
                    };

                    match self.fetch_and_queue(handle, &url).await {
                        Ok(sink) => {
                            current = Some(Arc::clone(&sink));
                            self.watch(sink, generation);
                        }
                        Err(e) => {
                            self.finish(generation, Some(e));
                        }
                    }
                }

                PlaybackCommand::Stop => {
                    if let Some(sink) = current.take() {
                        sink.stop();
                    }
                }
            }
        }

        if let Some(sink) = current.take() {
            sink.stop();
        }
        debug!("Playback controller stopped");
    }

    async fn fetch_and_queue(
        &self,
        handle: &OutputStreamHandle,
        url: &str,
    ) -> std::result::Result<Arc<Sink>, String> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| format!("fetch failed: {}", e))?;

        if !response.status().is_success() {
            return Err(format!("fetch failed: HTTP {}", response.status()));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| format!("fetch failed: {}", e))?;

        let sink = Sink::try_new(handle).map_err(|e| format!("sink failed: {}", e))?;

        let source = rodio::Decoder::new(Cursor::new(bytes.to_vec()))
            .map_err(|e| format!("decode failed: {}", e))?;
        sink.append(source);

        Ok(Arc::new(sink))
    }

    /// Report completion when the sink drains (or is stopped)
    fn watch(&self, sink: Arc<Sink>, generation: u64) {
        let events = self.events.clone();
        tokio::task::spawn_blocking(move || {
            sink.sleep_until_end();
            let _ = events.send(EngineEvent::PlaybackFinished {
                generation,
                error: None,
            });
        });
    }

    fn finish(&self, generation: u64, error: Option<String>) {
        let _ = self.events.send(EngineEvent::PlaybackFinished { generation, error });
    }
}

/// Park the non-Send `OutputStream` on its own thread, return the handle
fn spawn_output_thread() -> std::result::Result<OutputStreamHandle, String> {
    let (tx, rx) = std::sync::mpsc::channel();

    std::thread::Builder::new()
        .name("voxcall-playback".to_string())
        .spawn(move || match OutputStream::try_default() {
            Ok((stream, handle)) => {
                if tx.send(Ok(handle)).is_err() {
                    return;
                }
                // Keep the stream alive for the life of the process
                let _stream = stream;
                loop {
                    std::thread::park();
                }
            }
            Err(e) => {
                let _ = tx.send(Err(e.to_string()));
            }
        })
        .map_err(|e| e.to_string())?;

    rx.recv().map_err(|e| e.to_string())?
}
