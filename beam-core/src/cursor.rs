//! Cursor visibility monitoring (sender side).
//!
//! Games and other capture-style apps hide the OS cursor globally when
//! they believe they have focus. The hiding API has no observer, so
//! the sender polls visibility at 3 Hz and, on every change, notifies
//! the receiver (which enters or leaves cursor-capture mode). Between
//! polls any global hide is reversed locally so the sender's own
//! cursor stays visible while the hidden app runs.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Poll period (3 Hz).
const POLL_INTERVAL: Duration = Duration::from_millis(333);

// ── CursorApi ────────────────────────────────────────────────────

/// Platform cursor state. The poll reads the hide state the target
/// app requested; `force_show` undoes a global hide without touching
/// that intent.
pub trait CursorApi: Send {
    fn is_visible(&mut self) -> bool;

    /// Reverse a global cursor hide.
    fn force_show(&mut self);
}

/// Cursor state for tests and loopback runs: visibility is the "app
/// intent" and `force_show` only counts (the app would immediately
/// re-hide).
pub struct MockCursorApi {
    visible: std::sync::Arc<std::sync::atomic::AtomicBool>,
    force_shows: std::sync::Arc<std::sync::atomic::AtomicU64>,
}

impl MockCursorApi {
    pub fn new() -> (
        Self,
        std::sync::Arc<std::sync::atomic::AtomicBool>,
        std::sync::Arc<std::sync::atomic::AtomicU64>,
    ) {
        let visible = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(true));
        let force_shows = std::sync::Arc::new(std::sync::atomic::AtomicU64::new(0));
        (
            Self {
                visible: std::sync::Arc::clone(&visible),
                force_shows: std::sync::Arc::clone(&force_shows),
            },
            visible,
            force_shows,
        )
    }
}

impl CursorApi for MockCursorApi {
    fn is_visible(&mut self) -> bool {
        self.visible.load(std::sync::atomic::Ordering::Relaxed)
    }

    fn force_show(&mut self) {
        self.force_shows
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    }
}

// ── CursorMonitor ────────────────────────────────────────────────

/// 3 Hz visibility poller.
pub struct CursorMonitor {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl CursorMonitor {
    /// Start polling. Visibility transitions are pushed into `sink`.
    pub fn spawn(mut api: Box<dyn CursorApi>, sink: mpsc::Sender<bool>) -> Self {
        let cancel = CancellationToken::new();
        let loop_cancel = cancel.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(POLL_INTERVAL);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The cursor starts visible; only changes are reported.
            let mut last_visible = true;
            loop {
                tokio::select! {
                    _ = loop_cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let visible = api.is_visible();
                if visible != last_visible {
                    last_visible = visible;
                    debug!("cursor visibility changed: {visible}");
                    if sink.send(visible).await.is_err() {
                        break;
                    }
                }
                if !visible {
                    // Keep the sender's own cursor usable while the
                    // hidden app believes it owns the screen.
                    api.force_show();
                }
            }
        });

        Self {
            cancel,
            handle: Some(handle),
        }
    }

    /// Stop polling and join the task. Idempotent.
    pub async fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            handle.await.ok();
        }
    }
}

impl Drop for CursorMonitor {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn reports_transitions_and_reverses_hides() {
        let (api, visible, force_shows) = MockCursorApi::new();
        let (tx, mut rx) = mpsc::channel(8);
        let mut monitor = CursorMonitor::spawn(Box::new(api), tx);

        // No event while the cursor stays visible.
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(rx.try_recv().is_err());

        // The app hides the cursor: one `false` notification, and the
        // hide keeps being reversed locally.
        visible.store(false, Ordering::Relaxed);
        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timeout")
            .expect("closed");
        assert!(!event);
        tokio::time::sleep(Duration::from_millis(800)).await;
        assert!(force_shows.load(Ordering::Relaxed) >= 2);

        // Back to visible: one `true` notification.
        visible.store(true, Ordering::Relaxed);
        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timeout")
            .expect("closed");
        assert!(event);

        monitor.stop().await;
        monitor.stop().await; // idempotent
    }
}
