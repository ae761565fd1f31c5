//! Process-wide counters for the transport and dispatcher.
//!
//! Relaxed atomics only; the values are diagnostic and logged on teardown.
use std::sync::atomic::{AtomicU64, Ordering};

static FRAMES_RECEIVED: AtomicU64 = AtomicU64::new(0);
static MESSAGES_DECODED: AtomicU64 = AtomicU64::new(0);
static MESSAGES_UNRECOGNIZED: AtomicU64 = AtomicU64::new(0);
static DECODE_ERRORS: AtomicU64 = AtomicU64::new(0);
static HEARTBEATS_SENT: AtomicU64 = AtomicU64::new(0);
static ACTIONS_DISPATCHED: AtomicU64 = AtomicU64::new(0);
static TURN_ACTIONS: AtomicU64 = AtomicU64::new(0);
static UI_BLOCKS: AtomicU64 = AtomicU64::new(0);
static SETTLE_TIMEOUTS: AtomicU64 = AtomicU64::new(0);
static SERVER_REJECTIONS: AtomicU64 = AtomicU64::new(0);

pub fn inc_frames_received() {
    FRAMES_RECEIVED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_messages_decoded() {
    MESSAGES_DECODED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_messages_unrecognized() {
    MESSAGES_UNRECOGNIZED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_decode_errors() {
    DECODE_ERRORS.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_heartbeats_sent() {
    HEARTBEATS_SENT.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_actions_dispatched() {
    ACTIONS_DISPATCHED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_turn_actions() {
    TURN_ACTIONS.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_ui_blocks() {
    UI_BLOCKS.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_settle_timeouts() {
    SETTLE_TIMEOUTS.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_server_rejections() {
    SERVER_REJECTIONS.fetch_add(1, Ordering::Relaxed);
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    pub frames_received: u64,
    pub messages_decoded: u64,
    pub messages_unrecognized: u64,
    pub decode_errors: u64,
    pub heartbeats_sent: u64,
    pub actions_dispatched: u64,
    pub turn_actions: u64,
    pub ui_blocks: u64,
    pub settle_timeouts: u64,
    pub server_rejections: u64,
}

pub fn snapshot() -> Snapshot {
    Snapshot {
        frames_received: FRAMES_RECEIVED.load(Ordering::Relaxed),
        messages_decoded: MESSAGES_DECODED.load(Ordering::Relaxed),
        messages_unrecognized: MESSAGES_UNRECOGNIZED.load(Ordering::Relaxed),
        decode_errors: DECODE_ERRORS.load(Ordering::Relaxed),
        heartbeats_sent: HEARTBEATS_SENT.load(Ordering::Relaxed),
        actions_dispatched: ACTIONS_DISPATCHED.load(Ordering::Relaxed),
        turn_actions: TURN_ACTIONS.load(Ordering::Relaxed),
        ui_blocks: UI_BLOCKS.load(Ordering::Relaxed),
        settle_timeouts: SETTLE_TIMEOUTS.load(Ordering::Relaxed),
        server_rejections: SERVER_REJECTIONS.load(Ordering::Relaxed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Counters are global and other tests bump them concurrently, so only
    // monotonic growth is asserted.
    #[test]
    fn counters_grow() {
        let before = snapshot();
        inc_frames_received();
        inc_ui_blocks();
        inc_ui_blocks();
        let after = snapshot();
        assert!(after.frames_received >= before.frames_received + 1);
        assert!(after.ui_blocks >= before.ui_blocks + 2);
    }
}
