//! Display-side frame queue.
//!
//! The renderer owns a [`DisplayLayer`] on a dedicated task (the "UI
//! thread"); `enqueue` may be called from any thread and posts across.
//! A layer that reports a failed state is flushed and the next enqueue
//! proceeds. On teardown the layer is flushed BEFORE it is dropped:
//! pending frames inside a live layer can crash the compositor.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::video::decoder::DecodedFrame;

// ── DisplayLayer ─────────────────────────────────────────────────

/// The display surface the renderer feeds. Platform shells provide the
/// real implementation; [`CountingLayer`] serves tests and the
/// loopback binaries.
pub trait DisplayLayer: Send + 'static {
    /// Hand one timed frame to the layer.
    fn enqueue(&mut self, frame: DecodedFrame);

    /// Drop all pending frames.
    fn flush(&mut self);

    /// Whether the layer entered a failed state and needs a flush
    /// before it will accept frames again.
    fn is_failed(&self) -> bool {
        false
    }
}

/// Layer that counts frames and discards pixels.
#[derive(Default)]
pub struct CountingLayer {
    frames: Arc<AtomicU64>,
}

impl CountingLayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared counter of frames that reached the layer.
    pub fn counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.frames)
    }
}

impl DisplayLayer for CountingLayer {
    fn enqueue(&mut self, _frame: DecodedFrame) {
        self.frames.fetch_add(1, Ordering::Relaxed);
    }

    fn flush(&mut self) {}
}

// ── Renderer ─────────────────────────────────────────────────────

enum RenderCommand {
    Enqueue(DecodedFrame),
    Flush,
}

/// Cheap cloneable front end to a [`Renderer`]. Enqueues fail
/// silently once the renderer shut down.
#[derive(Clone)]
pub struct RendererHandle {
    tx: mpsc::Sender<RenderCommand>,
    frames_enqueued: Arc<AtomicU64>,
}

impl RendererHandle {
    /// Queue one decoded frame for display. Never blocks; frames are
    /// dropped when the display queue is full.
    pub fn enqueue(&self, frame: DecodedFrame) {
        if self.tx.try_send(RenderCommand::Enqueue(frame)).is_ok() {
            self.frames_enqueued.fetch_add(1, Ordering::Relaxed);
        } else {
            debug!("display queue full or closed, dropping frame");
        }
    }

    /// Frames accepted into the display queue so far.
    pub fn frames_enqueued(&self) -> u64 {
        self.frames_enqueued.load(Ordering::Relaxed)
    }

    /// Shared counter of accepted frames.
    pub fn counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.frames_enqueued)
    }
}

/// Posts decoded frames onto the layer's task.
pub struct Renderer {
    tx: mpsc::Sender<RenderCommand>,
    handle: Option<JoinHandle<()>>,
    frames_enqueued: Arc<AtomicU64>,
}

impl Renderer {
    pub fn new(mut layer: Box<dyn DisplayLayer>) -> Self {
        let (tx, mut rx) = mpsc::channel::<RenderCommand>(64);
        let handle = tokio::spawn(async move {
            while let Some(cmd) = rx.recv().await {
                match cmd {
                    RenderCommand::Enqueue(frame) => {
                        if layer.is_failed() {
                            layer.flush();
                        }
                        layer.enqueue(frame);
                    }
                    RenderCommand::Flush => layer.flush(),
                }
            }
            // Channel closed: flush before the layer is dropped.
            layer.flush();
        });
        Self {
            tx,
            handle: Some(handle),
            frames_enqueued: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Queue one decoded frame for display. Never blocks; frames are
    /// dropped when the display queue is full.
    pub fn enqueue(&self, frame: DecodedFrame) {
        self.handle().enqueue(frame);
    }

    /// A cloneable handle for pipeline tasks.
    pub fn handle(&self) -> RendererHandle {
        RendererHandle {
            tx: self.tx.clone(),
            frames_enqueued: Arc::clone(&self.frames_enqueued),
        }
    }

    /// Frames accepted into the display queue so far.
    pub fn frames_enqueued(&self) -> u64 {
        self.frames_enqueued.load(Ordering::Relaxed)
    }

    /// Flush the layer and tear the task down, in that order.
    pub async fn shutdown(mut self) {
        let _ = self.tx.send(RenderCommand::Flush).await;
        let handle = self.handle.take();
        drop(self); // closes the command channel
        if let Some(handle) = handle {
            handle.await.ok();
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn frame(pts_us: u64) -> DecodedFrame {
        DecodedFrame {
            width: 2,
            height: 2,
            data: vec![0u8; 12],
            pts_us,
            duration_us: 33_333,
        }
    }

    #[tokio::test]
    async fn frames_reach_the_layer() {
        let layer = CountingLayer::new();
        let counter = layer.counter();
        let renderer = Renderer::new(Box::new(layer));

        for n in 0..10 {
            renderer.enqueue(frame(n * 33_333));
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(counter.load(Ordering::Relaxed), 10);
        assert_eq!(renderer.frames_enqueued(), 10);

        renderer.shutdown().await;
    }

    #[tokio::test]
    async fn failed_layer_is_flushed_then_fed() {
        struct FlakyLayer {
            failed_once: bool,
            flushes: Arc<AtomicU64>,
            frames: Arc<AtomicU64>,
        }
        impl DisplayLayer for FlakyLayer {
            fn enqueue(&mut self, _frame: DecodedFrame) {
                self.frames.fetch_add(1, Ordering::Relaxed);
            }
            fn flush(&mut self) {
                self.failed_once = false;
                self.flushes.fetch_add(1, Ordering::Relaxed);
            }
            fn is_failed(&self) -> bool {
                self.failed_once
            }
        }

        let flushes = Arc::new(AtomicU64::new(0));
        let frames = Arc::new(AtomicU64::new(0));
        let renderer = Renderer::new(Box::new(FlakyLayer {
            failed_once: true,
            flushes: Arc::clone(&flushes),
            frames: Arc::clone(&frames),
        }));

        renderer.enqueue(frame(0));
        renderer.enqueue(frame(33_333));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(frames.load(Ordering::Relaxed), 2);
        assert_eq!(flushes.load(Ordering::Relaxed), 1);

        renderer.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_flushes_before_dropping_layer() {
        struct OrderLayer {
            flushed: Arc<AtomicU64>,
        }
        impl DisplayLayer for OrderLayer {
            fn enqueue(&mut self, _frame: DecodedFrame) {}
            fn flush(&mut self) {
                self.flushed.fetch_add(1, Ordering::Relaxed);
            }
        }
        impl Drop for OrderLayer {
            fn drop(&mut self) {
                assert!(
                    self.flushed.load(Ordering::Relaxed) > 0,
                    "layer dropped without a flush"
                );
            }
        }

        let flushed = Arc::new(AtomicU64::new(0));
        let renderer = Renderer::new(Box::new(OrderLayer {
            flushed: Arc::clone(&flushed),
        }));
        renderer.enqueue(frame(0));
        renderer.shutdown().await;
        assert!(flushed.load(Ordering::Relaxed) > 0);
    }
}
