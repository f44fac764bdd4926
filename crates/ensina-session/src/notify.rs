//! Debounced change notifications
//!
//! Publishes values on a `tokio::sync::watch` channel after a quiet window,
//! so a burst of rapid updates collapses into a single notification carrying
//! the final value. Subscribers never see intermediate values from a burst,
//! only the latest.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Watch-channel publisher with a trailing-edge debounce window.
///
/// Non-zero windows need a running tokio runtime at `publish` time; a zero
/// window publishes synchronously.
#[derive(Debug)]
pub struct DebouncedPublisher<T> {
    sender: watch::Sender<T>,
    // Held so publishing never fails for lack of subscribers.
    receiver: watch::Receiver<T>,
    window: Duration,
    pending: Arc<Mutex<Pending<T>>>,
}

#[derive(Debug)]
struct Pending<T> {
    latest: Option<T>,
    timer: Option<JoinHandle<()>>,
}

impl<T: Clone + Send + Sync + 'static> DebouncedPublisher<T> {
    /// Create a publisher whose channel starts at `initial`.
    pub fn new(initial: T, window: Duration) -> Self {
        let (sender, receiver) = watch::channel(initial);
        Self {
            sender,
            receiver,
            window,
            pending: Arc::new(Mutex::new(Pending {
                latest: None,
                timer: None,
            })),
        }
    }

    /// Subscribe to published values.
    ///
    /// The receiver observes values published after this call; the current
    /// value is available through `watch::Receiver::borrow` immediately.
    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.receiver.clone()
    }

    /// The most recently published value.
    pub fn last_published(&self) -> T {
        self.receiver.borrow().clone()
    }

    /// Queue a value for publication once the quiet window elapses.
    ///
    /// Each call restarts the window and replaces the queued value, so only
    /// the newest value of a burst is sent.
    pub fn publish(&self, value: T) {
        let mut pending = self.pending.lock();
        if let Some(timer) = pending.timer.take() {
            timer.abort();
        }

        if self.window.is_zero() {
            pending.latest = None;
            drop(pending);
            let _ = self.sender.send(value);
            return;
        }

        pending.latest = Some(value);

        let sender = self.sender.clone();
        let slot = Arc::clone(&self.pending);
        let window = self.window;
        pending.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(window).await;
            let value = {
                let mut pending = slot.lock();
                pending.timer = None;
                pending.latest.take()
            };
            if let Some(value) = value {
                let _ = sender.send(value);
            }
        }));
    }

    /// Update the channel value without waking subscribers.
    ///
    /// `last_published` and `borrow` observe the new value; `changed` does
    /// not resolve for it. When a debounced publication is already queued,
    /// the value is absorbed into it so the eventual wake-up delivers the
    /// newest state.
    pub fn set_silently(&self, value: T) {
        let mut pending = self.pending.lock();
        if pending.timer.is_some() {
            pending.latest = Some(value);
            return;
        }
        self.sender.send_if_modified(|slot| {
            *slot = value;
            false
        });
    }
}

impl<T> Drop for DebouncedPublisher<T> {
    fn drop(&mut self) {
        if let Some(timer) = self.pending.lock().timer.take() {
            timer.abort();
        }
    }
}
