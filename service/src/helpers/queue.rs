// Copyright 2024 The farcall contributors
// This file is part of the farcall library.

// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at:

// http://www.apache.org/licenses/LICENSE-2.0

// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tokio::sync::Notify;

/// A closable, thread-safe, blocking FIFO.
///
/// Multiple producers may enqueue; the queue is a single-consumer abstraction
/// at its point of use. After [`close`](Self::close), `enqueue` rejects new
/// items while `dequeue` drains the remainder and then yields `None`.
#[derive(Debug)]
pub struct MessageQueue<T> {
    inner: Mutex<Inner<T>>,
    notify: Notify,
}

#[derive(Debug)]
struct Inner<T> {
    items: VecDeque<T>,
    closed: bool,
}

impl<T> Default for MessageQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> MessageQueue<T> {
    /// Initializes a new, open queue.
    pub fn new() -> Self {
        Self { inner: Mutex::new(Inner { items: VecDeque::new(), closed: false }), notify: Notify::new() }
    }

    /// Enqueues an item without blocking, returning `true` if it was accepted
    /// and `false` if the queue is closed.
    pub fn enqueue(&self, item: T) -> bool {
        let mut inner = self.inner.lock();
        if inner.closed {
            return false;
        }
        inner.items.push_back(item);
        drop(inner);

        self.notify.notify_one();
        true
    }

    /// Dequeues the next item in FIFO order, blocking while the queue is open
    /// and empty. Returns `None` once the queue is closed and drained.
    pub async fn dequeue(&self) -> Option<T> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register for a wakeup before checking state, so a notification
            // racing with the check below cannot be missed.
            notified.as_mut().enable();

            {
                let mut inner = self.inner.lock();
                if let Some(item) = inner.items.pop_front() {
                    return Some(item);
                }
                if inner.closed {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Closes the queue, waking every blocked consumer. Returns `true` if
    /// this call transitioned the queue; closing twice is indistinguishable
    /// from closing once.
    pub fn close(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.closed {
            return false;
        }
        inner.closed = true;
        drop(inner);

        self.notify.notify_waiters();
        true
    }

    /// Returns `true` if the queue holds no items.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().items.is_empty()
    }

    /// Returns `true` if the queue was closed.
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }
}
