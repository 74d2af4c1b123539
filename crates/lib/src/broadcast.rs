//! Scheduled broadcasts: after an initial delay, send one randomly chosen message to the
//! target conversation every interval until shutdown.
//!
//! Cycles are independent: a failed send is logged and the schedule carries on. Selection is
//! uniform with repetition; there is no guarantee every message is eventually sent.

use crate::channels::{ChannelError, ChannelHandle, ConversationId};
use crate::config::BroadcastConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub struct Broadcaster {
    outbound: Arc<dyn ChannelHandle>,
    target: ConversationId,
    messages: Vec<String>,
    interval: Duration,
    initial_delay: Duration,
}

impl Broadcaster {
    pub fn new(outbound: Arc<dyn ChannelHandle>, config: &BroadcastConfig) -> Self {
        Self {
            outbound,
            target: config.target.clone(),
            messages: config.messages.clone(),
            interval: config.interval,
            initial_delay: config.initial_delay,
        }
    }

    /// Uniform random entry; `None` only for an empty rotation.
    pub fn pick(&self) -> Option<&str> {
        if self.messages.is_empty() {
            return None;
        }
        Some(self.messages[fastrand::usize(..self.messages.len())].as_str())
    }

    /// One broadcast cycle's send.
    pub async fn send_one(&self) -> Result<(), ChannelError> {
        let Some(text) = self.pick() else {
            return Ok(());
        };
        self.outbound.send_message(&self.target, text).await
    }

    /// Spawn the timer loop. The handle resolves to the number of cycles run.
    pub fn start(self, shutdown: CancellationToken) -> JoinHandle<u64> {
        tokio::spawn(self.run(shutdown))
    }

    /// Runs until `shutdown` is cancelled. Returns the number of cycles run (failed sends included).
    pub async fn run(self, shutdown: CancellationToken) -> u64 {
        log::info!(
            "broadcast: first message to {} in {}s, then every {}s",
            self.target,
            self.initial_delay.as_secs(),
            self.interval.as_secs()
        );
        let mut cycles = 0u64;
        if !sleep_or_cancel(self.initial_delay, &shutdown).await {
            log::info!("broadcast: stopped before first cycle");
            return cycles;
        }
        loop {
            cycles += 1;
            match self.send_one().await {
                Ok(()) => log::debug!("broadcast: cycle {} sent to {}", cycles, self.target),
                Err(e) => log::error!("broadcast: cycle {} to {} failed: {}", cycles, self.target, e),
            }
            if !sleep_or_cancel(self.interval, &shutdown).await {
                break;
            }
        }
        log::info!("broadcast: stopped after {} cycles", cycles);
        cycles
    }
}

/// False when cancelled before the sleep elapsed.
async fn sleep_or_cancel(duration: Duration, shutdown: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = shutdown.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingChannel;
    use tokio::time::Instant;

    fn config(messages: &[&str], interval_secs: u64, initial_delay_secs: u64) -> BroadcastConfig {
        BroadcastConfig {
            target: ConversationId::Numeric(-100500),
            interval: Duration::from_secs(interval_secs),
            initial_delay: Duration::from_secs(initial_delay_secs),
            messages: messages.iter().map(|m| m.to_string()).collect(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn three_cycles_send_three_rotation_entries() {
        let shutdown = CancellationToken::new();
        let channel = Arc::new(RecordingChannel::new().cancel_after(3, shutdown.clone()));
        let started = Instant::now();
        let cycles = Broadcaster::new(channel.clone(), &config(&["A", "B"], 1, 0))
            .run(shutdown)
            .await;

        assert_eq!(cycles, 3);
        let sent = channel.sent();
        assert_eq!(sent.len(), 3);
        for s in &sent {
            assert_eq!(s.conversation_id, ConversationId::Numeric(-100500));
            assert!(s.text == "A" || s.text == "B", "unexpected text {:?}", s.text);
        }
        assert!(sent[0].at >= started);
        for pair in sent.windows(2) {
            assert!(pair[1].at - pair[0].at >= Duration::from_secs(1));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn failed_cycles_do_not_stop_schedule() {
        let shutdown = CancellationToken::new();
        let channel = Arc::new(
            RecordingChannel::new()
                .failing_first(4)
                .cancel_after(5, shutdown.clone()),
        );
        let cycles = Broadcaster::new(channel.clone(), &config(&["only"], 3600, 0))
            .run(shutdown)
            .await;
        assert_eq!(cycles, 5);
        assert_eq!(channel.attempts(), 5);
        assert_eq!(channel.sent().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn first_send_waits_for_initial_delay() {
        let shutdown = CancellationToken::new();
        let channel = Arc::new(RecordingChannel::new().cancel_after(1, shutdown.clone()));
        let started = Instant::now();
        Broadcaster::new(channel.clone(), &config(&["hello"], 60, 5))
            .run(shutdown)
            .await;
        let sent = channel.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].at - started >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_during_initial_delay_sends_nothing() {
        let shutdown = CancellationToken::new();
        let channel = Arc::new(RecordingChannel::new());
        let handle = Broadcaster::new(channel.clone(), &config(&["hello"], 60, 30)).start(shutdown.clone());
        tokio::time::sleep(Duration::from_secs(10)).await;
        shutdown.cancel();
        assert_eq!(handle.await.unwrap(), 0);
        assert_eq!(channel.attempts(), 0);
    }

    #[test]
    fn pick_only_returns_rotation_entries() {
        let b = Broadcaster::new(Arc::new(RecordingChannel::new()), &config(&["A", "B", "C"], 1, 0));
        for _ in 0..100 {
            let m = b.pick().unwrap();
            assert!(["A", "B", "C"].contains(&m));
        }
        let empty = Broadcaster::new(Arc::new(RecordingChannel::new()), &config(&[], 1, 0));
        assert!(empty.pick().is_none());
    }
}
