//! Inbound dispatch: admission in the dispatcher, then one sequential lane per conversation.
//! Replies within a conversation keep acceptance order; conversations do not wait on each other.
//!
//! Lanes are opened on demand and closed again once they have had no work for [`LANE_IDLE`].
//! A lane whose queue is full drops the new message instead of stalling the dispatcher.

use crate::channels::{ConversationId, InboundMessage};
use crate::relay::InboundRelay;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

const LANE_CAPACITY: usize = 32;
pub(crate) const LANE_IDLE: Duration = Duration::from_secs(300);

struct Lane {
    tx: mpsc::Sender<InboundMessage>,
    /// Messages queued or in flight. Only the dispatcher increments it.
    pending: Arc<AtomicUsize>,
    last_used: Instant,
}

impl Lane {
    fn is_idle(&self, now: Instant) -> bool {
        self.tx.is_closed()
            || (self.pending.load(Ordering::SeqCst) == 0 && now - self.last_used >= LANE_IDLE)
    }
}

pub(crate) async fn run_dispatcher(
    relay: InboundRelay,
    mut inbound_rx: mpsc::Receiver<InboundMessage>,
    shutdown: CancellationToken,
) {
    let mut lanes: HashMap<ConversationId, Lane> = HashMap::new();
    let mut tasks = JoinSet::new();
    let mut sweep = tokio::time::interval_at(Instant::now() + LANE_IDLE, LANE_IDLE);
    sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
    log::debug!("dispatch: started");

    loop {
        let msg = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            Some(res) = tasks.join_next() => {
                report_lane_exit(res);
                continue;
            }
            _ = sweep.tick() => {
                reap_idle_lanes(&mut lanes);
                continue;
            }
            msg = inbound_rx.recv() => match msg {
                Some(m) => m,
                None => {
                    log::info!("dispatch: inbound stream closed");
                    break;
                }
            },
        };
        if !relay.admit(&msg) {
            continue;
        }

        let key = msg.conversation_id.clone();
        let lane = lanes
            .entry(key.clone())
            .or_insert_with(|| spawn_lane(&mut tasks, &relay, &key, &shutdown));
        let msg = match deliver(lane, msg) {
            Delivery::Queued => continue,
            Delivery::Full => {
                log::warn!("dispatch: lane for {} is full, dropping message", key);
                continue;
            }
            Delivery::LaneGone(msg) => msg,
        };
        // The lane panicked; its messages are lost, but the conversation keeps working.
        log::warn!("dispatch: lane for {} ended unexpectedly, restarting", key);
        let mut lane = spawn_lane(&mut tasks, &relay, &key, &shutdown);
        if !matches!(deliver(&mut lane, msg), Delivery::Queued) {
            log::warn!("dispatch: restarted lane for {} refused message", key);
        }
        lanes.insert(key, lane);
    }

    // Closing the senders lets idle lanes finish; busy ones see the cancelled token.
    drop(lanes);
    drop(inbound_rx);
    while let Some(res) = tasks.join_next().await {
        report_lane_exit(res);
    }
    log::debug!("dispatch: stopped");
}

enum Delivery {
    Queued,
    Full,
    LaneGone(InboundMessage),
}

fn deliver(lane: &mut Lane, msg: InboundMessage) -> Delivery {
    // Counted before the hand-off so the lane can never decrement below zero.
    lane.pending.fetch_add(1, Ordering::SeqCst);
    lane.last_used = Instant::now();
    match lane.tx.try_send(msg) {
        Ok(()) => Delivery::Queued,
        Err(e) => {
            lane.pending.fetch_sub(1, Ordering::SeqCst);
            match e {
                mpsc::error::TrySendError::Full(_) => Delivery::Full,
                mpsc::error::TrySendError::Closed(msg) => Delivery::LaneGone(msg),
            }
        }
    }
}

/// Drop the sender of every lane with nothing queued or in flight; the lane task then ends.
fn reap_idle_lanes(lanes: &mut HashMap<ConversationId, Lane>) {
    let now = Instant::now();
    let before = lanes.len();
    lanes.retain(|_, lane| !lane.is_idle(now));
    if lanes.len() < before {
        log::debug!(
            "dispatch: closed {} idle lanes, {} open",
            before - lanes.len(),
            lanes.len()
        );
    }
}

fn spawn_lane(
    tasks: &mut JoinSet<()>,
    relay: &InboundRelay,
    conversation_id: &ConversationId,
    shutdown: &CancellationToken,
) -> Lane {
    let (tx, rx) = mpsc::channel(LANE_CAPACITY);
    let pending = Arc::new(AtomicUsize::new(0));
    log::debug!("dispatch: opening lane for {}", conversation_id);
    tasks.spawn(run_lane(
        relay.clone(),
        conversation_id.clone(),
        rx,
        pending.clone(),
        shutdown.clone(),
    ));
    Lane {
        tx,
        pending,
        last_used: Instant::now(),
    }
}

async fn run_lane(
    relay: InboundRelay,
    conversation_id: ConversationId,
    mut rx: mpsc::Receiver<InboundMessage>,
    pending: Arc<AtomicUsize>,
    shutdown: CancellationToken,
) {
    loop {
        let msg = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            msg = rx.recv() => match msg {
                Some(m) => m,
                None => break,
            },
        };
        // Dropping the relay future abandons generation before any reply is sent.
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                log::info!("dispatch: abandoning in-flight message in {}", conversation_id);
                break;
            }
            _ = relay.on_message(msg) => {}
        }
        pending.fetch_sub(1, Ordering::SeqCst);
    }
    log::debug!("dispatch: lane for {} closed", conversation_id);
}

fn report_lane_exit(res: Result<(), tokio::task::JoinError>) {
    if let Err(e) = res {
        if e.is_panic() {
            log::error!("dispatch: lane panicked: {}", e);
        } else {
            log::debug!("dispatch: lane cancelled: {}", e);
        }
    }
}
