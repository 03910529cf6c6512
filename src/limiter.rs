//! Token-emission rate limiter.
//!
//! Emits at most `quota` tokens per `interval` over a bounded hand-off
//! queue. Emission is demand-driven: a token is only produced once the
//! consumer has made room for it, so blocking on [`RateLimiter::acquire`]
//! right before an outbound call also caps how many calls are in flight
//! per interval, not just how many are permitted.

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

/// A token-emission gate. Created running; see [`RateLimiter::new`].
///
/// A quota of 0 emits nothing; consumers block until [`stop`] is called.
/// That is a caller configuration error and is not detected here.
///
/// [`stop`]: RateLimiter::stop
pub struct RateLimiter {
    tokens: mpsc::Receiver<()>,
    shutdown: watch::Sender<bool>,
    worker: Option<JoinHandle<()>>,
}

impl RateLimiter {
    /// Create a limiter and start its worker task. Must be called from
    /// within a tokio runtime.
    pub fn new(quota: usize, interval: Duration) -> Self {
        let (tx, rx) = mpsc::channel(1);
        let (shutdown, shutdown_rx) = watch::channel(false);
        let worker = tokio::spawn(emit_tokens(quota, interval, tx, shutdown_rx));

        Self {
            tokens: rx,
            shutdown,
            worker: Some(worker),
        }
    }

    /// Wait for the next token. Returns `None` once the limiter has been
    /// stopped, so a blocked consumer observes closure instead of hanging.
    pub async fn acquire(&mut self) -> Option<()> {
        self.tokens.recv().await
    }

    /// Signal shutdown, wait for the worker to exit, then close and drain
    /// the token queue. Safe to call more than once; after the first call
    /// every `acquire` returns `None`.
    pub async fn stop(&mut self) {
        let _ = self.shutdown.send(true);
        if let Some(worker) = self.worker.take() {
            let _ = worker.await;
        }
        self.tokens.close();
        while self.tokens.try_recv().is_ok() {}
    }
}

/// Worker loop. The emitted-token counter resets on every interval tick;
/// while the counter is below quota the worker races a hand-off against
/// shutdown. At quota it parks until the next tick rather than spinning,
/// which leaves the emission contract untouched.
async fn emit_tokens(
    quota: usize,
    interval: Duration,
    tokens: mpsc::Sender<()>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = time::interval_at(time::Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut emitted = 0usize;

    loop {
        if emitted < quota {
            tokio::select! {
                biased;
                _ = shutdown.changed() => return,
                _ = ticker.tick() => emitted = 0,
                permit = tokens.reserve() => match permit {
                    Ok(permit) => {
                        permit.send(());
                        emitted += 1;
                    }
                    // Receiver side is gone, nothing left to throttle.
                    Err(_) => return,
                },
            }
        } else {
            tokio::select! {
                biased;
                _ = shutdown.changed() => return,
                _ = ticker.tick() => emitted = 0,
            }
        }
    }
}
