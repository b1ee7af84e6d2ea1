use metrics::counter;

/// Metric names under `{ns}_fanout_*`.
pub struct FanoutMetrics {
    ns: &'static str,
}

impl FanoutMetrics {
    pub fn new(namespace: &'static str) -> Self {
        Self { ns: namespace }
    }

    #[inline]
    pub fn reconnected(&self, stream: &'static str) {
        counter!(format!("{}_fanout_reconnected_total", self.ns), "stream" => stream).increment(1);
    }

    #[inline]
    pub fn batches_sent(&self, stream: &'static str) {
        counter!(format!("{}_fanout_batches_sent_total", self.ns), "stream" => stream).increment(1);
    }

    #[inline]
    pub fn send_failed(&self, stream: &'static str) {
        counter!(format!("{}_fanout_send_failed_total", self.ns), "stream" => stream).increment(1);
    }
}
