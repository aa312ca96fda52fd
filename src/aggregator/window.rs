use std::collections::VecDeque;

/// Whether a status code counts as a server error (5xx and above)
pub fn is_server_error(code: u16) -> bool {
    code >= 500
}

/// Percentage of server errors among `codes`
///
/// Returns 0.0 for an empty slice.
pub fn error_rate(codes: &[u16]) -> f64 {
    if codes.is_empty() {
        return 0.0;
    }
    let errors = codes.iter().filter(|&&code| is_server_error(code)).count();
    100.0 * errors as f64 / codes.len() as f64
}

/// Sliding window over the most recent status codes
///
/// Keeps at most `capacity` codes in arrival order; pushing into a full window
/// evicts the oldest code. The number of server errors in the window is kept
/// up to date on every push so the rate never needs a rescan.
#[derive(Debug, Clone)]
pub struct SlidingWindow {
    codes: VecDeque<u16>,
    capacity: usize,
    error_count: usize,
}

impl SlidingWindow {
    /// Create an empty window
    ///
    /// `capacity` is validated by the configuration layer; a zero capacity is
    /// treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            codes: VecDeque::with_capacity(capacity),
            capacity,
            error_count: 0,
        }
    }

    /// Append a status code, evicting from the head until the window fits
    pub fn push(&mut self, code: u16) {
        self.codes.push_back(code);
        if is_server_error(code) {
            self.error_count += 1;
        }
        self.enforce_capacity();
    }

    fn enforce_capacity(&mut self) {
        while self.codes.len() > self.capacity {
            if let Some(evicted) = self.codes.pop_front() {
                if is_server_error(evicted) {
                    self.error_count -= 1;
                }
            }
        }
    }

    pub fn size(&self) -> usize {
        self.codes.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.codes.len() == self.capacity
    }

    /// Number of server errors currently in the window
    pub fn error_count(&self) -> usize {
        self.error_count
    }

    /// Current error rate, identical to `error_rate(&self.snapshot())`
    pub fn error_rate(&self) -> f64 {
        if self.codes.is_empty() {
            return 0.0;
        }
        100.0 * self.error_count as f64 / self.codes.len() as f64
    }

    /// Owned copy of the window contents, oldest first
    pub fn snapshot(&self) -> Vec<u16> {
        self.codes.iter().copied().collect()
    }
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    #[quickcheck]
    fn prop_size_never_exceeds_capacity(capacity: u8, codes: Vec<u16>) -> bool {
        let capacity = (capacity as usize % 50) + 1;
        let mut window = SlidingWindow::new(capacity);

        for (i, &code) in codes.iter().enumerate() {
            window.push(code);
            if window.size() > capacity {
                return false;
            }
            if i + 1 >= capacity && window.size() != capacity {
                return false;
            }
        }
        true
    }

    #[quickcheck]
    fn prop_window_keeps_last_codes_in_order(capacity: u8, codes: Vec<u16>) -> bool {
        let capacity = (capacity as usize % 50) + 1;
        let mut window = SlidingWindow::new(capacity);
        for &code in &codes {
            window.push(code);
        }

        let start = codes.len().saturating_sub(capacity);
        window.snapshot() == codes[start..]
    }

    #[quickcheck]
    fn prop_incremental_rate_matches_rescan(capacity: u8, codes: Vec<u16>) -> bool {
        let capacity = (capacity as usize % 50) + 1;
        let mut window = SlidingWindow::new(capacity);

        codes.iter().all(|&code| {
            window.push(code);
            let snapshot = window.snapshot();
            let errors = snapshot.iter().filter(|&&c| c >= 500).count();
            let expected = 100.0 * errors as f64 / snapshot.len() as f64;
            (window.error_rate() - error_rate(&snapshot)).abs() < 1e-9
                && (window.error_rate() - expected).abs() < 1e-9
        })
    }
}
