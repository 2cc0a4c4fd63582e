use std::{
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    task::{Context, Poll},
};

use futures_util::task::AtomicWaker;

/// Counter of outstanding work with a future that resolves once it drops to zero.
///
/// Only a single waiter is supported at a time.
#[derive(Debug)]
pub struct PendingTasks {
    counter: AtomicUsize,
    waker: AtomicWaker,
}

impl PendingTasks {
    pub fn new(initial_count: usize) -> Self {
        Self {
            counter: AtomicUsize::new(initial_count),
            waker: AtomicWaker::new(),
        }
    }

    pub fn current(&self) -> usize {
        self.counter.load(Ordering::SeqCst)
    }

    pub fn increment(&self) {
        self.counter.fetch_add(1, Ordering::SeqCst);
    }

    pub fn decrement(&self) {
        let prev = self.counter.fetch_sub(1, Ordering::SeqCst);
        if prev == 1 {
            // Counter has reached zero
            self.waker.wake();
        }
    }

    pub fn wait_for_zero(self: Arc<Self>) -> WaitForZero {
        WaitForZero {
            pending_tasks: self,
        }
    }
}

impl Default for PendingTasks {
    fn default() -> Self {
        Self::new(0)
    }
}

pub struct WaitForZero {
    pending_tasks: Arc<PendingTasks>,
}

impl Future for WaitForZero {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.pending_tasks.current() == 0 {
            return Poll::Ready(());
        }

        self.pending_tasks.waker.register(cx.waker());
        // Double-check the counter after registering the waker
        if self.pending_tasks.current() == 0 {
            Poll::Ready(())
        } else {
            Poll::Pending
        }
    }
}
