//! Persistent bidirectional channel to the conversation backend
//!
//! One TCP connection per call. A writer task drains the outbound queue;
//! a reader task splits inbound lines, decodes them leniently, and signals
//! closure with a terminal frame so the consumer can tear the call down.

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{Result, TransportError};
use crate::events::{decode_server_line, ClientEvent, ServerEvent};

/// One inbound frame from the reader task
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    Event(ServerEvent),
    /// The connection ended (EOF or read error)
    Closed,
}

/// Persistent connection with dedicated reader and writer tasks
pub struct TransportChannel {
    outbound: mpsc::UnboundedSender<ClientEvent>,
    inbound: Option<mpsc::UnboundedReceiver<InboundFrame>>,
    writer_task: JoinHandle<()>,
    reader_task: JoinHandle<()>,
}

impl TransportChannel {
    /// Connect to the backend and spawn the IO tasks
    pub async fn connect(endpoint: &str) -> Result<Self> {
        let stream = TcpStream::connect(endpoint).await.map_err(|e| {
            TransportError::connect(endpoint.to_string(), e.to_string())
        })?;

        info!("Connected to {}", endpoint);

        let (read_half, write_half) = stream.into_split();

        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        let writer_task = tokio::spawn(write_loop(write_half, outbound_rx));
        let reader_task = tokio::spawn(read_loop(read_half, inbound_tx));

        Ok(Self {
            outbound,
            inbound: Some(inbound_rx),
            writer_task,
            reader_task,
        })
    }

    /// Queue an outbound event
    pub fn send(&self, event: ClientEvent) -> Result<()> {
        self.outbound
            .send(event)
            .map_err(|_| TransportError::Closed)
    }

    /// Clone of the outbound queue handle
    pub fn sender(&self) -> mpsc::UnboundedSender<ClientEvent> {
        self.outbound.clone()
    }

    /// Take the inbound frame receiver (single consumer)
    pub fn take_inbound(&mut self) -> Option<mpsc::UnboundedReceiver<InboundFrame>> {
        self.inbound.take()
    }

    /// Close the connection and stop the IO tasks
    pub async fn shutdown(self) {
        // Dropping the sender ends the write loop, which closes the socket
        drop(self.outbound);
        let _ = self.writer_task.await;
        self.reader_task.abort();
        debug!("Transport shut down");
    }
}

async fn write_loop(
    mut write_half: OwnedWriteHalf,
    mut outbound_rx: mpsc::UnboundedReceiver<ClientEvent>,
) {
    while let Some(event) = outbound_rx.recv().await {
        let line = match event.to_json_line() {
            Ok(line) => line,
            Err(e) => {
                warn!("Failed to serialize outbound event: {}", e);
                continue;
            }
        };

        if let Err(e) = write_half.write_all(line.as_bytes()).await {
            warn!("Write failed, closing connection: {}", e);
            break;
        }
    }

    let _ = write_half.shutdown().await;
    debug!("Writer task ended");
}

async fn read_loop(read_half: OwnedReadHalf, inbound_tx: mpsc::UnboundedSender<InboundFrame>) {
    let mut lines = BufReader::new(read_half).lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if let Some(event) = decode_server_line(&line) {
                    if inbound_tx.send(InboundFrame::Event(event)).is_err() {
                        break;
                    }
                }
            }
            Ok(None) => {
                debug!("Server closed the connection");
                let _ = inbound_tx.send(InboundFrame::Closed);
                break;
            }
            Err(e) => {
                warn!("Read failed: {}", e);
                let _ = inbound_tx.send(InboundFrame::Closed);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_loopback_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();

            let mut buf = vec![0u8; 1024];
            let n = socket.read(&mut buf).await.unwrap();
            let received = String::from_utf8_lossy(&buf[..n]).to_string();

            // greeting, an unknown type, and a malformed line before closing
            socket
                .write_all(
                    b"{\"type\":\"greeting\",\"text\":\"Hello!\",\"audioUrl\":\"http://x/g.wav\"}\n\
                      {\"type\":\"future_thing\",\"payload\":1}\n\
                      not json at all\n",
                )
                .await
                .unwrap();

            received
        });

        let mut channel = TransportChannel::connect(&addr.to_string()).await.unwrap();
        let mut inbound = channel.take_inbound().unwrap();

        channel
            .send(ClientEvent::Init {
                character_id: "c1".to_string(),
                character_name: "Ada".to_string(),
            })
            .unwrap();

        let received = server.await.unwrap();
        assert!(received.contains("\"type\":\"init\""));
        assert!(received.contains("\"characterId\":\"c1\""));

        // unknown and malformed frames are dropped, only the greeting arrives
        let frame = inbound.recv().await.unwrap();
        assert_eq!(
            frame,
            InboundFrame::Event(ServerEvent::Greeting {
                text: "Hello!".to_string(),
                audio_url: "http://x/g.wav".to_string(),
            })
        );

        let frame = inbound.recv().await.unwrap();
        assert_eq!(frame, InboundFrame::Closed);

        channel.shutdown().await;
    }

    #[tokio::test]
    async fn test_connect_failure() {
        // Port 1 is never listening
        let result = TransportChannel::connect("127.0.0.1:1").await;
        assert!(matches!(result, Err(TransportError::Connect { .. })));
    }
}
