//! Server metrics for observability
//!
//! Runtime counters for connections, routed traffic, the chatbot gate and handoffs.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::router::RouterStats;

/// Server-wide metrics
#[derive(Debug, Default)]
pub struct ServerMetrics {
    // Connection metrics
    /// Currently open WebSocket connections
    pub active_connections: AtomicU64,
    /// Total connections since server start
    pub total_connections: AtomicU64,
    /// Connections closed because the same participant connected again
    pub superseded_connections: AtomicU64,

    // Message metrics
    /// Envelopes received from clients
    pub messages_received: AtomicU64,
    /// Envelopes written to clients
    pub messages_sent: AtomicU64,
    /// Envelopes dropped: recipient offline, closed, or its queue full
    pub messages_dropped: AtomicU64,
    /// Inbound text that did not parse as an envelope
    pub malformed_messages: AtomicU64,
    /// Envelopes refused because the sender is not bound to the claimed identity
    pub rejected_messages: AtomicU64,

    // Fan-out
    /// Domain events accepted for fan-out
    pub events_routed: AtomicU64,
    /// Individual deliveries produced by fan-out
    pub event_deliveries: AtomicU64,

    // Chatbot
    /// Messages refused locally by the access-control gate
    pub gate_refusals: AtomicU64,
    /// Calls issued to the NLU service
    pub nlu_requests: AtomicU64,
    /// NLU calls answered with the fallback message
    pub nlu_fallbacks: AtomicU64,

    // Handoff
    pub handoffs_requested: AtomicU64,
    /// Requests answered with "no agent available"
    pub handoffs_unavailable: AtomicU64,
    /// Requests promoted to a live human conversation
    pub handoffs_started: AtomicU64,
    pub handoffs_ended: AtomicU64,

    /// Server start time (for uptime calculation)
    start_time: Option<Instant>,
}

impl ServerMetrics {
    pub fn new() -> Self {
        Self {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    // Connection tracking
    pub fn connection_opened(&self) {
        self.active_connections.fetch_add(1, Ordering::Relaxed);
        self.total_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn connection_superseded(&self) {
        self.superseded_connections.fetch_add(1, Ordering::Relaxed);
    }

    // Message tracking
    pub fn message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_sent(&self) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_dropped(&self) {
        self.messages_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_malformed(&self) {
        self.malformed_messages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_rejected(&self) {
        self.rejected_messages.fetch_add(1, Ordering::Relaxed);
    }

    // Fan-out
    pub fn event_routed(&self, deliveries: u64) {
        self.events_routed.fetch_add(1, Ordering::Relaxed);
        self.event_deliveries.fetch_add(deliveries, Ordering::Relaxed);
    }

    // Chatbot
    pub fn gate_refused(&self) {
        self.gate_refusals.fetch_add(1, Ordering::Relaxed);
    }

    pub fn nlu_requested(&self) {
        self.nlu_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn nlu_fell_back(&self) {
        self.nlu_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    // Handoff
    pub fn handoff_requested(&self) {
        self.handoffs_requested.fetch_add(1, Ordering::Relaxed);
    }

    pub fn handoff_unavailable(&self) {
        self.handoffs_unavailable.fetch_add(1, Ordering::Relaxed);
    }

    pub fn handoff_started(&self) {
        self.handoffs_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn handoff_ended(&self) {
        self.handoffs_ended.fetch_add(1, Ordering::Relaxed);
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.map(|t| t.elapsed().as_secs()).unwrap_or(0)
    }

    /// Create a snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: self.uptime_secs(),
            connections: ConnectionMetrics {
                active: self.active_connections.load(Ordering::Relaxed),
                total: self.total_connections.load(Ordering::Relaxed),
                superseded: self.superseded_connections.load(Ordering::Relaxed),
            },
            messages: MessageMetrics {
                received: self.messages_received.load(Ordering::Relaxed),
                sent: self.messages_sent.load(Ordering::Relaxed),
                dropped: self.messages_dropped.load(Ordering::Relaxed),
                malformed: self.malformed_messages.load(Ordering::Relaxed),
                rejected: self.rejected_messages.load(Ordering::Relaxed),
            },
            events: EventMetrics {
                routed: self.events_routed.load(Ordering::Relaxed),
                deliveries: self.event_deliveries.load(Ordering::Relaxed),
            },
            chatbot: ChatbotMetrics {
                gate_refusals: self.gate_refusals.load(Ordering::Relaxed),
                nlu_requests: self.nlu_requests.load(Ordering::Relaxed),
                nlu_fallbacks: self.nlu_fallbacks.load(Ordering::Relaxed),
            },
            handoffs: HandoffMetrics {
                requested: self.handoffs_requested.load(Ordering::Relaxed),
                unavailable: self.handoffs_unavailable.load(Ordering::Relaxed),
                started: self.handoffs_started.load(Ordering::Relaxed),
                ended: self.handoffs_ended.load(Ordering::Relaxed),
            },
        }
    }
}

/// Serializable snapshot of metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub connections: ConnectionMetrics,
    pub messages: MessageMetrics,
    pub events: EventMetrics,
    pub chatbot: ChatbotMetrics,
    pub handoffs: HandoffMetrics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionMetrics {
    pub active: u64,
    pub total: u64,
    pub superseded: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageMetrics {
    pub received: u64,
    pub sent: u64,
    pub dropped: u64,
    pub malformed: u64,
    pub rejected: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMetrics {
    pub routed: u64,
    pub deliveries: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatbotMetrics {
    pub gate_refusals: u64,
    pub nlu_requests: u64,
    pub nlu_fallbacks: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandoffMetrics {
    pub requested: u64,
    pub unavailable: u64,
    pub started: u64,
    pub ended: u64,
}

/// Health status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub participants: Option<RouterStats>,
    pub connections: u64,
    pub uptime_secs: u64,
}
