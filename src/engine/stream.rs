use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::io::{AsyncWriteExt, Stdout};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::events::RunEvent;

/// Transport for serialized events. A write error means the listener is gone.
#[async_trait]
pub trait EventSink: Send {
    /// Delivers one serialized event.
    ///
    /// # Errors
    ///
    /// Returns an error when the listener can no longer be written to.
    async fn send(&mut self, event: &str) -> io::Result<()>;

    /// Ends the channel.
    ///
    /// # Errors
    ///
    /// Returns an error when the final flush or shutdown fails.
    async fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Writes one JSON object per line.
pub struct StdoutSink {
    out: Stdout,
}

impl StdoutSink {
    #[must_use]
    pub fn new() -> Self {
        Self {
            out: tokio::io::stdout(),
        }
    }
}

impl Default for StdoutSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventSink for StdoutSink {
    async fn send(&mut self, event: &str) -> io::Result<()> {
        self.out.write_all(event.as_bytes()).await?;
        self.out.write_all(b"\n").await?;
        self.out.flush().await
    }

    async fn close(&mut self) -> io::Result<()> {
        self.out.flush().await
    }
}

/// Events the writer may hold before `running` snapshots start to coalesce.
pub const PROGRESS_QUEUE_CAPACITY: usize = 64;

/// Newest `running` event that did not fit in the queue. Older overflow is
/// replaced, never written.
type Overflow = Arc<Mutex<Option<RunEvent>>>;

/// Single writer between the controller and an [`EventSink`].
///
/// Events are queued and written by a dedicated task, so a slow listener
/// never blocks recording. The queue is bounded: when it is full, `running`
/// events collapse into the newest one, while the terminal event passed to
/// [`ProgressStreamer::finish`] is always delivered. After the first failed
/// write the streamer flags the disconnect and every later push is dropped.
pub struct ProgressStreamer {
    tx: Option<mpsc::Sender<RunEvent>>,
    overflow: Overflow,
    disconnected: watch::Receiver<bool>,
    writer: Option<JoinHandle<()>>,
}

impl ProgressStreamer {
    #[must_use]
    pub fn spawn(sink: Box<dyn EventSink>) -> Self {
        let (tx, rx) = mpsc::channel(PROGRESS_QUEUE_CAPACITY);
        let overflow = Overflow::default();
        let (disconnected_tx, disconnected) = watch::channel(false);
        let writer = tokio::spawn(write_events(
            sink,
            rx,
            Arc::clone(&overflow),
            disconnected_tx,
        ));
        Self {
            tx: Some(tx),
            overflow,
            disconnected,
            writer: Some(writer),
        }
    }

    /// Queues one progress event. A no-op once the listener has
    /// disconnected or the streamer has been finished.
    pub fn push(&self, event: RunEvent) {
        if self.is_disconnected() {
            return;
        }
        let Some(tx) = &self.tx else {
            return;
        };
        let mut overflow = lock(&self.overflow);
        if overflow.is_some() {
            *overflow = Some(event);
            return;
        }
        match tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                debug!("Progress queue full; coalescing running events");
                *overflow = Some(event);
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Progress writer already finished; event dropped");
            }
        }
    }

    #[must_use]
    pub fn is_disconnected(&self) -> bool {
        *self.disconnected.borrow()
    }

    /// Watch that flips to `true` when the listener goes away.
    #[must_use]
    pub fn disconnected(&self) -> watch::Receiver<bool> {
        self.disconnected.clone()
    }

    /// Queues `terminal` behind everything pushed so far, waiting for queue
    /// space instead of dropping it, then closes the sink and waits for the
    /// writer.
    pub async fn finish(&mut self, terminal: RunEvent) {
        if let Some(tx) = self.tx.take() {
            let pending = lock(&self.overflow).take();
            for event in pending.into_iter().chain(std::iter::once(terminal)) {
                if tx.send(event).await.is_err() {
                    debug!("Progress writer already finished; event dropped");
                    break;
                }
            }
        }
        self.close().await;
    }

    /// Flushes queued events, closes the sink and waits for the writer.
    async fn close(&mut self) {
        drop(self.tx.take());
        if let Some(writer) = self.writer.take()
            && let Err(err) = writer.await
        {
            warn!("Progress writer task failed: {}", err);
        }
    }
}

fn lock(overflow: &Overflow) -> MutexGuard<'_, Option<RunEvent>> {
    overflow.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Next event in push order: queued events first, then the coalesced
/// overflow. `None` means the writer must wait on the queue.
fn next_ready(rx: &mut mpsc::Receiver<RunEvent>, overflow: &Overflow) -> Option<RunEvent> {
    let mut slot = lock(overflow);
    rx.try_recv().ok().or_else(|| slot.take())
}

async fn write_events(
    mut sink: Box<dyn EventSink>,
    mut rx: mpsc::Receiver<RunEvent>,
    overflow: Overflow,
    disconnected_tx: watch::Sender<bool>,
) {
    loop {
        let event = match next_ready(&mut rx, &overflow) {
            Some(event) => event,
            None => match rx.recv().await {
                Some(event) => event,
                None => break,
            },
        };
        if *disconnected_tx.borrow() {
            continue;
        }
        let line = match serde_json::to_string(&event) {
            Ok(line) => line,
            Err(err) => {
                warn!("Failed to serialize {} event: {}", event.status().as_str(), err);
                continue;
            }
        };
        if let Err(err) = sink.send(&line).await {
            warn!("Listener disconnected: {}", err);
            disconnected_tx.send_modify(|flag| *flag = true);
        }
    }
    if let Err(err) = sink.close().await {
        debug!("Failed to close event sink: {}", err);
    }
}
