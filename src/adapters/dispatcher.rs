//! Dispatcher Adapters
//!
//! Implements the `Dispatcher` port.
//!
//! - [`ChannelDispatcher`] hands tasks to a [`DispatchQueue`] that the owner
//!   context drains from its own loop. Tasks run in posting order.
//! - [`InlineDispatcher`] runs tasks immediately on the posting thread.

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::domain::ports::{DispatchTask, Dispatcher};

/// Sending half: posts tasks to the owner context
#[derive(Debug, Clone)]
pub struct ChannelDispatcher {
    tx: mpsc::UnboundedSender<DispatchTask>,
}

/// Receiving half: owned and drained by the owner context
#[derive(Debug)]
pub struct DispatchQueue {
    rx: mpsc::UnboundedReceiver<DispatchTask>,
}

impl ChannelDispatcher {
    /// Create a dispatcher and the queue its tasks arrive on.
    pub fn channel() -> (Self, DispatchQueue) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, DispatchQueue { rx })
    }
}

impl Dispatcher for ChannelDispatcher {
    fn post(&self, task: DispatchTask) {
        if self.tx.send(task).is_err() {
            warn!("Dispatch queue closed, dropping task");
        }
    }
}

impl DispatchQueue {
    /// Run every task that is already queued. Returns how many ran.
    pub fn run_pending(&mut self) -> usize {
        let mut ran = 0;
        while let Ok(task) = self.rx.try_recv() {
            task();
            ran += 1;
        }
        if ran > 0 {
            debug!("Ran {} dispatched tasks", ran);
        }
        ran
    }

    /// Wait for the next task and run it. Returns false once every
    /// dispatcher has been dropped and the queue is empty.
    pub async fn run_next(&mut self) -> bool {
        match self.rx.recv().await {
            Some(task) => {
                task();
                true
            }
            None => false,
        }
    }

    /// Run tasks until every dispatcher has been dropped.
    pub async fn run(mut self) {
        while self.run_next().await {}
        debug!("Dispatch queue drained and closed");
    }
}

/// Runs each task right away on whichever thread posts it.
///
/// Default of a context built without a dispatcher, meant for hosts without
/// an event loop. Callbacks of asynchronous commits then run on the commit
/// worker, not on the owner's thread; use [`ChannelDispatcher`] when the
/// owner must observe them.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineDispatcher;

impl Dispatcher for InlineDispatcher {
    fn post(&self, task: DispatchTask) {
        task();
    }
}
