//! Tunables of the real-time core.

use std::time::Duration;

pub const DEFAULT_ALLOWED_ORIGIN: &str = "http://localhost:8080";

/// Smallest message size the transport itself accepts.
const TRANSPORT_LIMIT_FLOOR: usize = 64 * 1024;

#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    /// The single Origin header value accepted at upgrade.
    pub allowed_origin: String,
    /// Read deadline, refreshed by every pong.
    pub pong_wait: Duration,
    /// Inbound frame cap in bytes.
    pub max_frame_size: usize,
    /// Bounded outbound queue per client.
    pub egress_capacity: usize,
    pub presence_interval: Duration,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            allowed_origin: DEFAULT_ALLOWED_ORIGIN.to_string(),
            pong_wait: Duration::from_secs(10),
            // 250 runes of up to four bytes each, plus the envelope
            max_frame_size: 4096,
            egress_capacity: 256,
            presence_interval: Duration::from_secs(5),
        }
    }
}

impl RealtimeConfig {
    /// Heartbeat period: 9/10 of the read deadline so a healthy peer's pong
    /// always lands before the deadline expires.
    pub fn ping_interval(&self) -> Duration {
        self.pong_wait * 9 / 10
    }

    /// Message size handed to the WebSocket transport. Kept above
    /// `max_frame_size` so oversized frames reach the read pump, which
    /// closes them with 1009; the transport only guards against abuse.
    pub fn transport_limit(&self) -> usize {
        self.max_frame_size
            .saturating_mul(4)
            .max(TRANSPORT_LIMIT_FLOOR)
    }
}
