use std::io;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use crate::engine::EventSink;

/// Frames each event as one `data:` line on an open event-stream response.
pub struct SseSink {
    socket: TcpStream,
}

impl SseSink {
    #[must_use]
    pub const fn new(socket: TcpStream) -> Self {
        Self { socket }
    }
}

#[async_trait]
impl EventSink for SseSink {
    async fn send(&mut self, event: &str) -> io::Result<()> {
        let frame = format!("data: {}\n\n", event);
        self.socket.write_all(frame.as_bytes()).await?;
        self.socket.flush().await
    }

    async fn close(&mut self) -> io::Result<()> {
        self.socket.shutdown().await
    }
}
