//! Reasoning loop contract and its run-time plumbing.
//!
//! A [`ReasoningLoop`] runs in the background and reports progress through the
//! [`LoopHandle`] it owns: text deltas and structured tool events go into an
//! ordered [`OutputQueue`], and a [`CompletionFlag`] marks the end of a run.

use crate::error::Result;
use crate::ui_message::StructuredMessage;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard, mpsc};
use tokio_util::sync::CancellationToken;

/// Step timeout used until a caller overrides it.
pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(120);

/// One item produced by a running loop.
#[derive(Debug, Clone, PartialEq)]
pub enum QueueItem {
    /// A complete message, forwarded to clients unchanged.
    Message(StructuredMessage),
    /// A raw text delta, folded into the response's cumulative text.
    Delta(String),
}

/// Producer side of an [`OutputQueue`]. Cheap to clone.
///
/// Sends never block and never fail loudly: once the consumer is gone,
/// items are dropped.
#[derive(Debug, Clone)]
pub struct OutputSender {
    tx: mpsc::UnboundedSender<QueueItem>,
}

impl OutputSender {
    pub fn send(&self, item: QueueItem) {
        let _ = self.tx.send(item);
    }

    pub fn send_message(&self, message: StructuredMessage) {
        self.send(QueueItem::Message(message));
    }

    pub fn send_delta(&self, text: impl Into<String>) {
        self.send(QueueItem::Delta(text.into()));
    }
}

pub type OutputReceiver = OwnedMutexGuard<mpsc::UnboundedReceiver<QueueItem>>;

/// Ordered multi-producer, single-consumer queue of loop output.
#[derive(Debug)]
pub struct OutputQueue {
    tx: mpsc::UnboundedSender<QueueItem>,
    rx: Arc<AsyncMutex<mpsc::UnboundedReceiver<QueueItem>>>,
}

impl OutputQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Arc::new(AsyncMutex::new(rx)),
        }
    }

    pub fn sender(&self) -> OutputSender {
        OutputSender { tx: self.tx.clone() }
    }

    /// Take exclusive ownership of the consuming end.
    ///
    /// Waits while another consumer holds it.
    pub async fn take_receiver(&self) -> OutputReceiver {
        self.rx.clone().lock_owned().await
    }

    /// Drop everything currently queued. Returns the number of items discarded.
    ///
    /// A no-op (returning 0) while a consumer holds the receiver.
    pub fn clear(&self) -> usize {
        let Ok(mut rx) = self.rx.try_lock() else {
            return 0;
        };
        let mut dropped = 0;
        while rx.try_recv().is_ok() {
            dropped += 1;
        }
        dropped
    }
}

impl Default for OutputQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Set-once-per-run marker that a loop's background run has finished.
#[derive(Debug, Default)]
pub struct CompletionFlag {
    set: AtomicBool,
}

impl CompletionFlag {
    pub fn set(&self) {
        self.set.store(true, Ordering::Release);
    }

    pub fn clear(&self) {
        self.set.store(false, Ordering::Release);
    }

    pub fn is_set(&self) -> bool {
        self.set.load(Ordering::Acquire)
    }
}

/// Run-time state a reasoning loop exposes to whoever drives it.
#[derive(Debug)]
pub struct LoopHandle {
    output: OutputQueue,
    task_done: CompletionFlag,
    step_timeout: Mutex<Duration>,
    cancel: CancellationToken,
}

impl LoopHandle {
    pub fn new() -> Self {
        Self::with_cancellation(CancellationToken::new())
    }

    /// A handle whose runs stop when `cancel` fires.
    ///
    /// Nested loops are given a child of their parent's token.
    pub fn with_cancellation(cancel: CancellationToken) -> Self {
        Self {
            output: OutputQueue::new(),
            task_done: CompletionFlag::default(),
            step_timeout: Mutex::new(DEFAULT_STEP_TIMEOUT),
            cancel,
        }
    }

    pub fn output(&self) -> &OutputQueue {
        &self.output
    }

    pub fn sender(&self) -> OutputSender {
        self.output.sender()
    }

    pub fn task_done(&self) -> &CompletionFlag {
        &self.task_done
    }

    pub fn step_timeout(&self) -> Duration {
        match self.step_timeout.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Replace the step timeout, returning the previous value.
    pub fn set_step_timeout(&self, timeout: Duration) -> Duration {
        let mut guard = match self.step_timeout.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        std::mem::replace(&mut *guard, timeout)
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }
}

impl Default for LoopHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// A background reasoning process driven by a request string.
///
/// `run` reports incremental output through [`LoopHandle::sender`] and
/// returns the final result, if the loop produces one.
#[async_trait]
pub trait ReasoningLoop: Send + Sync {
    fn name(&self) -> &str;

    fn handle(&self) -> &LoopHandle;

    async fn run(&self, request: &str) -> Result<Option<serde_json::Value>>;
}
