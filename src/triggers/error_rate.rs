//! Threshold check on the rolling 5xx rate

use crate::aggregator::SlidingWindow;

/// Raises a candidate alert when the windowed error rate exceeds a threshold
///
/// Stays silent until the window has filled up once: a handful of requests
/// right after startup is too small a sample to alert on.
#[derive(Debug, Clone)]
pub struct ErrorRateDetector {
    /// Threshold in percent (0-100)
    threshold: f64,
}

impl ErrorRateDetector {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// Evaluate the window
    ///
    /// # Returns
    ///
    /// The current rate if the window is full and the rate is strictly above
    /// the threshold, `None` otherwise
    pub fn evaluate(&self, window: &SlidingWindow) -> Option<f64> {
        if !window.is_full() {
            return None;
        }
        let rate = window.error_rate();
        (rate > self.threshold).then_some(rate)
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silent_until_window_full() {
        let detector = ErrorRateDetector::new(10.0);
        let mut window = SlidingWindow::new(4);

        for _ in 0..3 {
            window.push(500);
            assert_eq!(detector.evaluate(&window), None);
        }

        window.push(500);
        assert_eq!(detector.evaluate(&window), Some(100.0));
    }

    #[test]
    fn test_rate_equal_to_threshold_does_not_fire() {
        let detector = ErrorRateDetector::new(50.0);
        let mut window = SlidingWindow::new(2);
        window.push(200);
        window.push(500);
        assert_eq!(detector.evaluate(&window), None);
    }

    #[test]
    fn test_rate_above_threshold_fires() {
        let detector = ErrorRateDetector::new(2.0);
        let mut window = SlidingWindow::new(10);
        for _ in 0..9 {
            window.push(200);
        }
        window.push(502);
        assert_eq!(detector.evaluate(&window), Some(10.0));
    }
}
