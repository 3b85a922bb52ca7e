//! Hand-off of delivered states from the network thread to the loop.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::warn;

use crate::state::ControlState;

/// Default bound on the ordered queue used while a session is active.
pub const FIFO_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngressMode {
    /// Single slot: a newer state replaces an unread one.
    Coalesce,
    /// Ordered queue: every delivered state is kept for recording.
    Fifo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvError {
    Timeout,
    Closed,
}

struct Inner {
    mode: IngressMode,
    queue: VecDeque<ControlState>,
    closed: bool,
}

pub struct StateInbox {
    inner: Mutex<Inner>,
    ready: Condvar,
    capacity: usize,
}

impl Default for StateInbox {
    fn default() -> Self {
        StateInbox::new(FIFO_CAPACITY)
    }
}

impl StateInbox {
    pub fn new(capacity: usize) -> Self {
        StateInbox {
            inner: Mutex::new(Inner {
                mode: IngressMode::Coalesce,
                queue: VecDeque::new(),
                closed: false,
            }),
            ready: Condvar::new(),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, state: ControlState) {
        let mut inner = self.lock();
        if inner.closed {
            return;
        }
        match inner.mode {
            IngressMode::Coalesce => inner.queue.clear(),
            IngressMode::Fifo => {
                if inner.queue.len() >= self.capacity {
                    warn!("inbox full, oldest state dropped");
                    inner.queue.pop_front();
                }
            }
        }
        inner.queue.push_back(state);
        drop(inner);
        self.ready.notify_one();
    }

    pub fn try_recv(&self) -> Option<ControlState> {
        self.lock().queue.pop_front()
    }

    /// Waits at most `timeout` for a state. Closing the inbox wakes the
    /// waiter immediately.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<ControlState, RecvError> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.lock();
        loop {
            if let Some(state) = inner.queue.pop_front() {
                return Ok(state);
            }
            if inner.closed {
                return Err(RecvError::Closed);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(RecvError::Timeout);
            }
            inner = self
                .ready
                .wait_timeout(inner, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Switching back to coalescing keeps only the newest queued state.
    pub fn set_mode(&self, mode: IngressMode) {
        let mut inner = self.lock();
        if inner.mode == mode {
            return;
        }
        inner.mode = mode;
        if mode == IngressMode::Coalesce {
            while inner.queue.len() > 1 {
                inner.queue.pop_front();
            }
        }
    }

    pub fn mode(&self) -> IngressMode {
        self.lock().mode
    }

    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().queue.is_empty()
    }

    pub fn close(&self) {
        self.lock().closed = true;
        self.ready.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}
