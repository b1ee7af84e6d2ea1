use metrics::{counter, histogram};

/// Metric names under `{ns}_session_*`.
pub struct SessionMetrics {
    ns: &'static str,
}

impl SessionMetrics {
    pub fn new(namespace: &'static str) -> Self {
        Self { ns: namespace }
    }

    #[inline]
    pub fn conn_accepted(&self) {
        counter!(format!("{}_session_connections_total", self.ns)).increment(1);
    }

    #[inline]
    pub fn conn_closed(&self, reason: &'static str) {
        counter!(format!("{}_session_connections_closed_total", self.ns), "reason" => reason).increment(1);
    }

    #[inline]
    pub fn auth_failed(&self) {
        counter!(format!("{}_session_auth_failed_total", self.ns)).increment(1);
    }

    #[inline]
    pub fn heartbeat_timeout(&self) {
        counter!(format!("{}_session_heartbeat_timeout_total", self.ns)).increment(1);
    }

    #[inline]
    pub fn conversation_finalized(&self, outcome: &'static str) {
        counter!(format!("{}_session_conversations_finalized_total", self.ns), "outcome" => outcome).increment(1);
    }

    #[inline]
    pub fn finalize_seconds(&self, seconds: f64) {
        histogram!(format!("{}_session_finalize_seconds", self.ns)).record(seconds);
    }
}
