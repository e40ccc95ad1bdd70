//! 运行中平均值

use serde::{Deserialize, Serialize};

/// 增量平均值
///
/// 每次更新 `new_avg = (old_avg × n + x) / (n + 1)`，无需保留样本
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RunningAverage {
    count: u64,
    average: f64,
}

impl RunningAverage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, value: f64) {
        let n = self.count as f64;
        self.average = (self.average * n + value) / (n + 1.0);
        self.count += 1;
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn average(&self) -> f64 {
        self.average
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_running_average() {
        let mut avg = RunningAverage::new();
        assert_eq!(avg.count(), 0);
        assert_eq!(avg.average(), 0.0);

        avg.record(10.0);
        avg.record(20.0);
        avg.record(30.0);
        assert_eq!(avg.count(), 3);
        assert!((avg.average() - 20.0).abs() < 1e-9);
    }

    proptest! {
        #[test]
        fn running_average_matches_arithmetic_mean(values in prop::collection::vec(0u32..10_000, 1..200)) {
            let mut avg = RunningAverage::new();
            for v in &values {
                avg.record(f64::from(*v));
            }
            let mean = values.iter().map(|v| f64::from(*v)).sum::<f64>() / values.len() as f64;
            prop_assert_eq!(avg.count(), values.len() as u64);
            prop_assert!((avg.average() - mean).abs() < 1e-6);
        }
    }
}
