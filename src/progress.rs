//! Progress notifications from a running operation to its observer.
//!
//! An operation sends exactly one [`ProgressEvent::Total`] followed by one
//! [`ProgressEvent::Increment`] per member processed. The channel is unbounded
//! so the producer never waits on a slow consumer, and a channel serves a
//! single operation: it is dropped once the operation finishes.

use thiserror::Error;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender, error::TryRecvError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressEvent {
    /// Number of units the operation will process. Always sent first.
    Total(u64),
    /// One more unit finished.
    Increment,
}

/// Create a connected sender/receiver pair for one operation.
pub fn channel() -> (ProgressSender, ProgressReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ProgressSender { tx }, ProgressReceiver { rx })
}

/// Producer half, held by the engine.
#[derive(Debug, Clone)]
pub struct ProgressSender {
    tx: UnboundedSender<ProgressEvent>,
}

impl ProgressSender {
    /// Sends are fire-and-forget: if the observer went away the event is dropped.
    fn send(&self, event: ProgressEvent) {
        let _ = self.tx.send(event);
    }
}

/// Emits events on an optional sender, keeping the Total-then-Increments order.
#[derive(Debug)]
pub struct Reporter<'a> {
    sender: Option<&'a ProgressSender>,
    total: Option<u64>,
    sent: u64,
}

impl<'a> Reporter<'a> {
    pub fn new(sender: Option<&'a ProgressSender>) -> Self {
        Self {
            sender,
            total: None,
            sent: 0,
        }
    }

    pub fn total(&mut self, count: u64) {
        debug_assert!(self.total.is_none(), "total reported twice");
        self.total = Some(count);
        if let Some(sender) = self.sender {
            sender.send(ProgressEvent::Total(count));
        }
    }

    pub fn increment(&mut self) {
        debug_assert!(
            self.total.is_some_and(|total| self.sent < total),
            "increment outside of announced total"
        );
        self.sent += 1;
        if let Some(sender) = self.sender {
            sender.send(ProgressEvent::Increment);
        }
    }
}

/// Consumer half, polled by the foreground loop.
#[derive(Debug)]
pub struct ProgressReceiver {
    rx: UnboundedReceiver<ProgressEvent>,
}

impl ProgressReceiver {
    /// Next pending event without waiting.
    pub fn try_next(&mut self) -> Option<ProgressEvent> {
        match self.rx.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Every event currently queued, without waiting.
    pub fn drain(&mut self) -> Vec<ProgressEvent> {
        std::iter::from_fn(|| self.try_next()).collect()
    }

    /// Wait for the next event; `None` once the producer is gone and the queue is empty.
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        self.rx.recv().await
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProgressError {
    #[error("increment received before total")]
    IncrementBeforeTotal,
    #[error("total received twice")]
    DuplicateTotal,
    #[error("more increments than the announced total of {0}")]
    Overflow(u64),
}

/// Running count for a progress bar, built from received events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressTally {
    pub total: Option<u64>,
    pub completed: u64,
}

impl ProgressTally {
    pub fn apply(&mut self, event: ProgressEvent) -> Result<(), ProgressError> {
        match (event, self.total) {
            (ProgressEvent::Total(_), Some(_)) => Err(ProgressError::DuplicateTotal),
            (ProgressEvent::Total(count), None) => {
                self.total = Some(count);
                Ok(())
            }
            (ProgressEvent::Increment, None) => Err(ProgressError::IncrementBeforeTotal),
            (ProgressEvent::Increment, Some(total)) if self.completed >= total => {
                Err(ProgressError::Overflow(total))
            }
            (ProgressEvent::Increment, Some(_)) => {
                self.completed += 1;
                Ok(())
            }
        }
    }

    pub fn is_complete(&self) -> bool {
        self.total == Some(self.completed)
    }

    /// Completed fraction in `0.0..=1.0`; an empty operation counts as done.
    pub fn fraction(&self) -> f64 {
        match self.total {
            Some(0) => 1.0,
            Some(total) => self.completed as f64 / total as f64,
            None => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_arrive_in_order() {
        let (tx, mut rx) = channel();
        let mut reporter = Reporter::new(Some(&tx));
        reporter.total(2);
        reporter.increment();
        reporter.increment();

        assert_eq!(
            rx.drain(),
            [
                ProgressEvent::Total(2),
                ProgressEvent::Increment,
                ProgressEvent::Increment
            ]
        );
        assert_eq!(rx.try_next(), None);
    }

    #[test]
    fn sending_after_receiver_dropped_is_silent() {
        let (tx, rx) = channel();
        drop(rx);
        let mut reporter = Reporter::new(Some(&tx));
        reporter.total(1);
        reporter.increment();
    }

    #[test]
    fn reporter_without_sender_is_inert() {
        let mut reporter = Reporter::new(None);
        reporter.total(1);
        reporter.increment();
    }

    #[tokio::test]
    async fn recv_ends_when_sender_dropped() {
        let (tx, mut rx) = channel();
        Reporter::new(Some(&tx)).total(0);
        drop(tx);
        assert_eq!(rx.recv().await, Some(ProgressEvent::Total(0)));
        assert_eq!(rx.recv().await, None);
    }

    #[test]
    fn tally_enforces_protocol() {
        let mut tally = ProgressTally::default();
        assert_eq!(
            tally.apply(ProgressEvent::Increment),
            Err(ProgressError::IncrementBeforeTotal)
        );
        tally.apply(ProgressEvent::Total(1)).unwrap();
        assert_eq!(tally.apply(ProgressEvent::Total(1)), Err(ProgressError::DuplicateTotal));
        tally.apply(ProgressEvent::Increment).unwrap();
        assert!(tally.is_complete());
        assert_eq!(tally.apply(ProgressEvent::Increment), Err(ProgressError::Overflow(1)));
    }

    #[test]
    fn tally_fraction() {
        let mut tally = ProgressTally::default();
        assert_eq!(tally.fraction(), 0.0);
        tally.apply(ProgressEvent::Total(4)).unwrap();
        tally.apply(ProgressEvent::Increment).unwrap();
        assert_eq!(tally.fraction(), 0.25);

        let mut empty = ProgressTally::default();
        empty.apply(ProgressEvent::Total(0)).unwrap();
        assert!(empty.is_complete());
        assert_eq!(empty.fraction(), 1.0);
    }
}
