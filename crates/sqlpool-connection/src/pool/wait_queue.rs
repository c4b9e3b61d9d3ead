//! FIFO queue of requests waiting for a connection

use std::collections::VecDeque;

use tokio::time::Instant;

use crate::timer::TimerHandle;

/// A queued request plus its bookkeeping
#[derive(Debug)]
pub(crate) struct Waiter<T> {
    pub(crate) ticket: u64,
    pub(crate) enqueued_at: Instant,
    deadline: Option<TimerHandle>,
    item: T,
}

impl<T> Waiter<T> {
    /// Cancel the deadline timer and hand back the request
    pub(crate) fn into_item(self) -> T {
        if let Some(timer) = self.deadline {
            timer.cancel();
        }
        self.item
    }
}

/// Requests that arrived while no connection was free, oldest first.
///
/// Each waiter is identified by a ticket so an expiring deadline can find
/// its entry, or discover it was already dispatched.
#[derive(Debug)]
pub(crate) struct WaitQueue<T> {
    waiters: VecDeque<Waiter<T>>,
    next_ticket: u64,
}

impl<T> WaitQueue<T> {
    pub(crate) fn new() -> Self {
        Self {
            waiters: VecDeque::new(),
            next_ticket: 1,
        }
    }

    /// Append a request. `arm` receives the new ticket and may start the
    /// deadline timer for it.
    pub(crate) fn enqueue<F>(&mut self, item: T, arm: F) -> u64
    where
        F: FnOnce(u64) -> Option<TimerHandle>,
    {
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        let deadline = arm(ticket);
        self.waiters.push_back(Waiter {
            ticket,
            enqueued_at: Instant::now(),
            deadline,
            item,
        });
        ticket
    }

    /// Take the oldest waiter
    pub(crate) fn dequeue(&mut self) -> Option<Waiter<T>> {
        self.waiters.pop_front()
    }

    /// Remove the waiter holding `ticket`, if it is still queued
    pub(crate) fn remove(&mut self, ticket: u64) -> Option<Waiter<T>> {
        let pos = self.waiters.iter().position(|w| w.ticket == ticket)?;
        self.waiters.remove(pos)
    }

    pub(crate) fn len(&self) -> usize {
        self.waiters.len()
    }

    /// Remove every waiter, oldest first
    pub(crate) fn drain(&mut self) -> impl Iterator<Item = Waiter<T>> + '_ {
        self.waiters.drain(..)
    }
}
