//! Periodic liveness ticks

use std::time::Duration;

use eyre::{Result, eyre};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::coordinator::CoordRequest;

/// Feeds a `Tick` into the coordinator queue once per period
///
/// The ticker never touches presence state itself; evaluation happens inside
/// the coordinator so ticks and inbound messages are serialized.
pub struct LivenessTicker {
    period: Duration,
    coordinator_tx: mpsc::Sender<CoordRequest>,
    ticks_sent: u64,
}

impl LivenessTicker {
    pub fn new(period: Duration, coordinator_tx: mpsc::Sender<CoordRequest>) -> Self {
        Self {
            period,
            coordinator_tx,
            ticks_sent: 0,
        }
    }

    /// Send a single tick (useful for testing)
    pub async fn tick_once(&mut self) -> Result<()> {
        self.coordinator_tx
            .send(CoordRequest::Tick)
            .await
            .map_err(|_| eyre!("Coordinator channel closed"))?;
        self.ticks_sent += 1;
        Ok(())
    }

    pub fn ticks_sent(&self) -> u64 {
        self.ticks_sent
    }

    /// Run the ticker loop
    ///
    /// Runs until `shutdown_rx` fires (or its sender is dropped) or the
    /// coordinator channel is closed.
    pub async fn run(mut self, mut shutdown_rx: mpsc::Receiver<()>) -> Result<()> {
        info!(period_ms = self.period.as_millis() as u64, "LivenessTicker started");

        let mut interval = tokio::time::interval_at(Instant::now() + self.period, self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    debug!("LivenessTicker: shutdown requested");
                    break;
                }
                _ = interval.tick() => {
                    if self.tick_once().await.is_err() {
                        debug!("LivenessTicker: coordinator gone");
                        break;
                    }
                }
            }
        }

        info!(ticks = self.ticks_sent, "LivenessTicker stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_tick_once_sends_tick() {
        let (tx, mut rx) = mpsc::channel(10);
        let mut ticker = LivenessTicker::new(Duration::from_secs(2), tx);

        ticker.tick_once().await.unwrap();

        assert!(matches!(rx.try_recv(), Ok(CoordRequest::Tick)));
        assert_eq!(ticker.ticks_sent(), 1);
    }

    #[tokio::test]
    async fn test_run_ticks_periodically_until_shutdown() {
        let (tx, mut rx) = mpsc::channel(100);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let ticker = LivenessTicker::new(Duration::from_millis(10), tx);

        let task = tokio::spawn(ticker.run(shutdown_rx));

        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown_tx.send(()).await.unwrap();

        let result = tokio::time::timeout(Duration::from_secs(5), task).await;
        assert!(result.is_ok(), "Ticker should stop on shutdown");

        let mut ticks = 0;
        while let Ok(CoordRequest::Tick) = rx.try_recv() {
            ticks += 1;
        }
        assert!(ticks >= 2, "expected several ticks, got {ticks}");
    }

    #[tokio::test]
    async fn test_run_stops_when_coordinator_closes() {
        let (tx, rx) = mpsc::channel(10);
        let (_shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let ticker = LivenessTicker::new(Duration::from_millis(5), tx);
        drop(rx);

        let result = tokio::time::timeout(Duration::from_secs(5), ticker.run(shutdown_rx)).await;
        assert!(result.is_ok());
    }
}
