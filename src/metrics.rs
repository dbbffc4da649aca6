use std::time::Duration;

/// A 'snapshot' of the heap's counters.
///
/// Obtained by calling [`crate::Heap::metrics`].
#[derive(Copy, Clone, Debug, Default)]
pub struct Metrics {
    /// Number of collections that have occured.
    pub collections: u64,

    /// Average time that a collection takes to complete.
    pub collect_avg_time: Duration,

    pub last_collect_time: Duration,

    /// Words found live by the last collection, descriptors included.
    pub live_words: usize,

    /// Number of pools in the generation.
    pub pool_count: usize,

    pub max_pool_count: usize,

    /// Number of distinct shapes that have a descriptor.
    pub descriptors: usize,

    /// Pools taken from the recycler instead of the page backend.
    pub pools_recycled: usize,

    /// Objects handed out, descriptors included.
    pub allocations: u64,
}

impl Metrics {
    pub(crate) fn record_collection(&mut self, elapsed: Duration, live_words: usize) {
        self.collections += 1;
        self.last_collect_time = elapsed;
        self.live_words = live_words;
        self.collect_avg_time = update_avg(self.collect_avg_time, elapsed, self.collections);
    }

    pub(crate) fn record_pools(&mut self, pool_count: usize, pools_recycled: usize) {
        self.pool_count = pool_count;
        self.max_pool_count = self.max_pool_count.max(pool_count);
        self.pools_recycled = pools_recycled;
    }
}

fn update_avg(running_avg: Duration, new_value: Duration, sample_size: u64) -> Duration {
    let avg = running_avg.as_nanos() as i128;
    let update = (new_value.as_nanos() as i128 - avg) / sample_size.max(1) as i128;

    Duration::from_nanos((avg + update).max(0) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn average_follows_samples() {
        let mut metrics = Metrics::default();

        metrics.record_collection(Duration::from_millis(10), 5);
        assert_eq!(metrics.collect_avg_time, Duration::from_millis(10));

        metrics.record_collection(Duration::from_millis(20), 7);
        assert_eq!(metrics.collect_avg_time, Duration::from_millis(15));
        assert_eq!(metrics.last_collect_time, Duration::from_millis(20));
        assert_eq!(metrics.live_words, 7);

        metrics.record_collection(Duration::from_millis(0), 7);
        assert_eq!(metrics.collect_avg_time, Duration::from_millis(10));
    }

    #[test]
    fn peak_pool_count_is_kept() {
        let mut metrics = Metrics::default();

        metrics.record_pools(4, 0);
        metrics.record_pools(2, 1);

        assert_eq!(metrics.pool_count, 2);
        assert_eq!(metrics.max_pool_count, 4);
        assert_eq!(metrics.pools_recycled, 1);
    }
}
