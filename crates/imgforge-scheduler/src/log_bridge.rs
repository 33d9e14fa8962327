//! Relays engine log output to a consumer in incremental deltas.
//!
//! The engine writes into the bridge's [`LogSink`]. A drain task wakes every
//! `interval`, takes whatever was appended since the previous drain and
//! sends it as one delta. [`LogBridge::stop`] runs one last drain before the
//! delta channel closes, so lines written at the very end of a build are
//! still delivered.

use imgforge_core::LogSink;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::warn;

pub struct LogBridge {
    sink: LogSink,
    stop: CancellationToken,
    drain_task: JoinHandle<()>,
}

impl LogBridge {
    /// Start draining a fresh sink every `interval`.
    ///
    /// Returns the bridge and the receiving end of the delta channel.
    pub fn start(interval: Duration) -> (Self, mpsc::UnboundedReceiver<String>) {
        let sink = LogSink::new();
        let stop = CancellationToken::new();
        let (tx, rx) = mpsc::unbounded_channel();

        let drain_task = tokio::spawn(Self::drain_loop(sink.clone(), interval, stop.clone(), tx));

        (
            Self {
                sink,
                stop,
                drain_task,
            },
            rx,
        )
    }

    /// Write handle for the engine.
    pub fn sink(&self) -> &LogSink {
        &self.sink
    }

    /// Flush pending output and close the delta channel.
    pub async fn stop(self) {
        self.stop.cancel();
        if let Err(e) = self.drain_task.await {
            warn!(error = %e, "Log drain task ended abnormally");
        }
    }

    async fn drain_loop(
        sink: LogSink,
        interval: Duration,
        stop: CancellationToken,
        tx: mpsc::UnboundedSender<String>,
    ) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Some(delta) = sink.drain_new() {
                        if tx.send(delta).is_err() {
                            // Consumer is gone; nothing left to deliver to.
                            return;
                        }
                    }
                }
                _ = stop.cancelled() => {
                    if let Some(delta) = sink.drain_new() {
                        let _ = tx.send(delta);
                    }
                    return;
                }
            }
        }
    }
}
