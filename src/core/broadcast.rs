//! Result stream for observers of a pipeline.
//!
//! Two delivery modes exist:
//! - `FanOut` (default): every subscriber receives every result sent after
//!   it subscribed.
//! - `LatestOnly`: each `subscribe()` installs a fresh producer handle and
//!   replaces the previous one, so only the most recent subscriber receives
//!   further results. Earlier streams end once their handle is replaced.

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

/// How results are delivered to subscribers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BroadcastMode {
    /// Every subscriber receives every result
    FanOut,

    /// Only the most recently attached subscriber receives results
    LatestOnly,
}

impl Default for BroadcastMode {
    fn default() -> Self {
        Self::FanOut
    }
}

/// Producer end of the result stream, owned by the pipeline
#[derive(Debug)]
pub struct ResultBroadcaster<T> {
    mode: BroadcastMode,
    fan_out: Option<broadcast::Sender<T>>,
    latest: Option<mpsc::UnboundedSender<T>>,
    closed: bool,
}

impl<T: Clone + Send + 'static> ResultBroadcaster<T> {
    /// Create a broadcaster. `capacity` bounds how far a fan-out subscriber
    /// may lag before it starts skipping results.
    pub fn new(mode: BroadcastMode, capacity: usize) -> Self {
        let fan_out = match mode {
            BroadcastMode::FanOut => Some(broadcast::channel(capacity.max(1)).0),
            BroadcastMode::LatestOnly => None,
        };

        Self {
            mode,
            fan_out,
            latest: None,
            closed: false,
        }
    }

    pub fn mode(&self) -> BroadcastMode {
        self.mode
    }

    /// Attach a new reader
    pub fn subscribe(&mut self) -> ResultStream<T> {
        if self.closed {
            let (_, rx) = mpsc::unbounded_channel();
            return ResultStream::Latest(rx);
        }

        match self.mode {
            BroadcastMode::FanOut => match &self.fan_out {
                Some(sender) => ResultStream::FanOut(sender.subscribe()),
                None => {
                    let (_, rx) = mpsc::unbounded_channel();
                    ResultStream::Latest(rx)
                }
            },
            BroadcastMode::LatestOnly => {
                let (tx, rx) = mpsc::unbounded_channel();
                if self.latest.replace(tx).is_some() {
                    debug!("Replacing previous result subscriber");
                }
                ResultStream::Latest(rx)
            }
        }
    }

    /// Emit a result to the current subscribers. Returns how many readers
    /// it reached.
    pub fn send(&mut self, item: T) -> usize {
        if self.closed {
            return 0;
        }

        match self.mode {
            BroadcastMode::FanOut => self
                .fan_out
                .as_ref()
                .and_then(|sender| sender.send(item).ok())
                .unwrap_or(0),
            BroadcastMode::LatestOnly => match &self.latest {
                Some(sender) => {
                    if sender.send(item).is_ok() {
                        1
                    } else {
                        self.latest = None;
                        0
                    }
                }
                None => 0,
            },
        }
    }

    /// Close the channel. Streams end after delivering what was sent.
    pub fn finish(&mut self) {
        self.closed = true;
        self.fan_out = None;
        self.latest = None;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

/// Consumer end of the result stream
#[derive(Debug)]
pub enum ResultStream<T> {
    FanOut(broadcast::Receiver<T>),
    Latest(mpsc::UnboundedReceiver<T>),
}

impl<T: Clone> ResultStream<T> {
    /// Wait for the next result. Returns None once the stream has ended.
    pub async fn recv(&mut self) -> Option<T> {
        match self {
            ResultStream::FanOut(rx) => loop {
                match rx.recv().await {
                    Ok(item) => return Some(item),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Result subscriber lagged, skipping results");
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            },
            ResultStream::Latest(rx) => rx.recv().await,
        }
    }

    /// Take a result if one is ready, without waiting
    pub fn try_recv(&mut self) -> Option<T> {
        match self {
            ResultStream::FanOut(rx) => loop {
                match rx.try_recv() {
                    Ok(item) => return Some(item),
                    Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                        warn!(skipped, "Result subscriber lagged, skipping results");
                    }
                    Err(_) => return None,
                }
            },
            ResultStream::Latest(rx) => rx.try_recv().ok(),
        }
    }
}
