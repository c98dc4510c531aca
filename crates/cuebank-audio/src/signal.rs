//! Single-slot wake signal.

use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};

/// Coalescing wake-up flag shared between a notifier and one waiter.
///
/// Any number of `notify` calls before a `wait` collapse into one wake.
#[derive(Debug, Clone)]
pub struct Signal {
    tx: Sender<()>,
    rx: Receiver<()>,
}

impl Default for Signal {
    fn default() -> Self {
        Self::new()
    }
}

impl Signal {
    pub fn new() -> Self {
        let (tx, rx) = bounded(1);
        Self { tx, rx }
    }

    /// Raise the signal. Never blocks.
    pub fn notify(&self) {
        let _ = self.tx.try_send(());
    }

    /// Block until raised or `timeout` passes. Returns true if raised.
    pub fn wait(&self, timeout: Duration) -> bool {
        match self.rx.recv_timeout(timeout) {
            Ok(()) => true,
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => false,
        }
    }

    /// Consume a pending signal without blocking.
    pub fn try_take(&self) -> bool {
        self.rx.try_recv().is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notifications_coalesce() {
        let signal = Signal::new();
        signal.notify();
        signal.notify();
        signal.notify();

        assert!(signal.try_take());
        assert!(!signal.try_take());
    }

    #[test]
    fn test_wait_times_out() {
        let signal = Signal::new();
        assert!(!signal.wait(Duration::from_millis(5)));
    }

    #[test]
    fn test_wait_across_threads() {
        let signal = Signal::new();
        let notifier = signal.clone();
        let handle = std::thread::spawn(move || notifier.notify());

        assert!(signal.wait(Duration::from_secs(5)));
        handle.join().ok();
    }
}
