// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

// Running statistics over per-frame quantities such as detection counts and
// processing times.

use medians::Medianf64;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct DescriptiveStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub stddev: f64,
    // Only computed over the recent window.
    pub median: Option<f64>,
    pub median_absolute_deviation: Option<f64>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ValueStats {
    // Over the last `capacity` values.
    pub recent: DescriptiveStats,
    // Over all values since construction or the last reset_session().
    pub session: DescriptiveStats,
    // Number of values in `session`.
    pub session_count: usize,
}

pub struct ValueStatsAccumulator {
    value_stats: ValueStats,

    // State for `recent`.
    circular_buffer: CircularBuffer,

    // State for `session`.
    rolling_stats: rolling_stats::Stats<f64>,
}

impl ValueStatsAccumulator {
    pub fn new(capacity: usize) -> Self {
        Self {
            value_stats: ValueStats::default(),
            circular_buffer: CircularBuffer::new(capacity.max(1)),
            rolling_stats: rolling_stats::Stats::<f64>::new(),
        }
    }

    pub fn add_value(&mut self, value: f64) {
        self.circular_buffer.push(value);
        self.rolling_stats.update(value);

        let recent_values = self.circular_buffer.unordered_contents();
        let recent = &mut self.value_stats.recent;
        recent.min = recent_values.iter().copied().fold(f64::INFINITY, f64::min);
        recent.max = recent_values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        recent.mean = statistical::mean(recent_values);
        if recent_values.len() > 1 {
            recent.stddev = statistical::standard_deviation(
                recent_values, Some(recent.mean));
        }
        let median = recent_values.medf_unchecked();
        recent.median = Some(median);
        recent.median_absolute_deviation = Some(recent_values.madf(median));

        let session = &mut self.value_stats.session;
        session.min = self.rolling_stats.min;
        session.max = self.rolling_stats.max;
        session.mean = self.rolling_stats.mean;
        session.stddev = self.rolling_stats.std_dev;
        self.value_stats.session_count += 1;
    }

    pub fn reset_session(&mut self) {
        self.value_stats.session = DescriptiveStats::default();
        self.value_stats.session_count = 0;
        self.rolling_stats = rolling_stats::Stats::<f64>::new();
    }

    pub fn value_stats(&self) -> &ValueStats {
        &self.value_stats
    }
}

// Fixed-capacity ring buffer whose contents are viewed as one unordered
// slice, which is all the recent statistics need.
#[derive(Debug)]
struct CircularBuffer {
    start: usize,
    capacity: usize,
    data: Vec<f64>,
}

impl CircularBuffer {
    fn new(capacity: usize) -> Self {
        Self {
            start: 0,
            capacity,
            data: Vec::with_capacity(capacity),
        }
    }

    fn push(&mut self, item: f64) {
        if self.data.len() < self.capacity {
            self.data.push(item);
        } else {
            self.data[self.start] = item;
            self.start = (self.start + 1) % self.capacity;
        }
    }

    fn unordered_contents(&self) -> &[f64] {
        self.data.as_slice()
    }
}

#[cfg(test)]
mod tests {
    extern crate approx;
    use approx::assert_abs_diff_eq;
    use super::*;

    #[test]
    fn test_circular_buffer() {
        let mut cb = CircularBuffer::new(2);
        assert!(cb.unordered_contents().is_empty());

        cb.push(10.0);
        cb.push(20.0);
        assert_eq!(cb.unordered_contents(), [10.0, 20.0]);

        cb.push(30.0);
        assert_eq!(cb.unordered_contents(), [30.0, 20.0]);
        cb.push(40.0);
        assert_eq!(cb.unordered_contents(), [30.0, 40.0]);
    }

    #[test]
    fn test_detection_count_stats() {
        let mut vsa = ValueStatsAccumulator::new(3);
        assert_eq!(*vsa.value_stats(), ValueStats::default());

        // Detection counts from four frames; the window keeps the last three.
        for count in [2.0, 6.0, 4.0, 8.0] {
            vsa.add_value(count);
        }
        let stats = vsa.value_stats();
        assert_eq!(stats.recent.min, 4.0);
        assert_eq!(stats.recent.max, 8.0);
        assert_eq!(stats.recent.mean, 6.0);
        assert_abs_diff_eq!(stats.recent.stddev, 2.0, epsilon = 1e-9);
        assert_eq!(stats.recent.median, Some(6.0));
        assert_eq!(stats.recent.median_absolute_deviation, Some(2.0));

        assert_eq!(stats.session_count, 4);
        assert_eq!(stats.session.min, 2.0);
        assert_eq!(stats.session.max, 8.0);
        assert_eq!(stats.session.mean, 5.0);
        assert_abs_diff_eq!(stats.session.stddev, 2.58, epsilon = 0.01);
        assert_eq!(stats.session.median, None);
    }

    #[test]
    fn test_reset_session() {
        let mut vsa = ValueStatsAccumulator::new(4);
        vsa.add_value(1.5);
        vsa.add_value(3.5);
        vsa.reset_session();
        let stats = vsa.value_stats();
        assert_eq!(stats.session, DescriptiveStats::default());
        assert_eq!(stats.session_count, 0);
        // Recent stats survive the reset.
        assert_eq!(stats.recent.mean, 2.5);
        assert_eq!(stats.recent.median, Some(2.5));

        vsa.add_value(7.0);
        let stats = vsa.value_stats();
        assert_eq!(stats.session.min, 7.0);
        assert_eq!(stats.session.max, 7.0);
        assert_eq!(stats.session_count, 1);
        assert_eq!(stats.recent.max, 7.0);
    }

}  // mod tests.
