//! # Rate and BDP estimation
//!
//! Converts a flow's raw per-chunk samples (arrival time, bytes acked, RTT)
//! into a smoothed delivery-rate signal, and folds new samples into a
//! long-running EWMA the way the rest of the engine expects to consume it.

// ─── Sliding-window rate ────────────────────────────────────────────────────

/// Walks `times`/`vals`/`rtts` with a sliding window of `window_length`
/// seconds, advancing by `step` seconds each iteration, and returns the
/// summed `vals` falling in each window divided by the window length (i.e.
/// bytes/sec). The last, necessarily partial, window is dropped.
///
/// The window is advanced by `step` *before* each window is evaluated, so
/// the first emitted window is `[t0+step, t0+step+window_length)`, and the
/// walk runs until `right_idx` has swept past every sample — matching the
/// source's `while right_idx < len(times)` termination rather than a
/// window-end/end-time comparison.
///
/// When the right edge of the window crosses a gap bigger than half the
/// window length and RTT did not grow across that gap, the flow was
/// application-limited rather than congestion-limited during the gap: both
/// window edges are advanced by 90% of the gap so the idle period doesn't
/// get counted as zero throughput.
pub fn sliding_window_rate(times: &[f64], vals: &[f64], rtts: &[f64], step: f64, window_length: f64) -> Vec<f64> {
    if times.is_empty() {
        return Vec::new();
    }
    debug_assert_eq!(times.len(), vals.len());
    debug_assert_eq!(times.len(), rtts.len());

    let mut wnd_start_time = times[0];

    let mut left_idx = 0usize;
    let mut right_idx = 0usize;
    let mut window_sum = 0.0;

    let mut results = Vec::new();

    while right_idx < times.len() {
        wnd_start_time += step;
        let mut wnd_end_time = wnd_start_time + window_length;

        while left_idx < times.len() && times[left_idx] < wnd_start_time {
            window_sum -= vals[left_idx];
            left_idx += 1;
        }

        while right_idx < times.len() && times[right_idx] < wnd_end_time {
            if right_idx + 1 < times.len() {
                let gap = times[right_idx + 1] - times[right_idx];
                if gap > window_length / 2.0 {
                    let rtt_growth = (rtts[right_idx + 1] - rtts[right_idx]) / 1000.0;
                    if rtt_growth < 0.5 * gap {
                        let padding = 0.9 * gap;
                        wnd_start_time += padding;
                        wnd_end_time += padding;
                    }
                }
            }
            window_sum += vals[right_idx];
            right_idx += 1;
        }

        if left_idx < right_idx && window_length > 0.0 {
            results.push(window_sum / window_length);
        }
    }

    if !results.is_empty() {
        results.pop();
    }
    results
}

/// Converts a bytes/sec rate into Mbps (mebibit-based, `* 8 / 2^20`).
pub fn bytes_per_sec_to_mbps(rate: f64) -> f64 {
    rate * 8.0 / 1024.0 / 1024.0
}

// ─── EWMA ───────────────────────────────────────────────────────────────────

/// Folds `new_samples` into `old_value` using a geometric `0.8` decay per
/// sample: `sum(0.8^(k-1-i) * 0.2 * sample_i) + 0.8^k * old_value`, where
/// `k = min(new_samples.len(), max_wnd_len)`.
///
/// Only the most recent `max_wnd_len` of `new_samples` are folded in; older
/// samples are assumed to have already been incorporated into `old_value` on
/// a previous call.
pub fn update_ewma(old_value: f64, new_samples: &[f64], max_wnd_len: usize) -> f64 {
    if new_samples.is_empty() {
        return old_value;
    }
    let k = new_samples.len().min(max_wnd_len);
    let window = &new_samples[new_samples.len() - k..];

    let mut acc = 0.0;
    for (i, &sample) in window.iter().enumerate() {
        let weight = 0.8f64.powi((k - 1 - i) as i32) * 0.2;
        acc += weight * sample;
    }
    acc + old_value * 0.8f64.powi(k as i32)
}

/// A persistent exponentially weighted moving average for a scalar signal
/// that is periodically topped up with batches of new samples.
#[derive(Debug, Clone, Default)]
pub struct Ewma {
    value: f64,
    max_wnd_len: usize,
}

impl Ewma {
    pub fn new(max_wnd_len: usize) -> Self {
        Ewma { value: 0.0, max_wnd_len }
    }

    /// Folds a batch of new samples in and returns the updated value.
    pub fn update(&mut self, new_samples: &[f64]) -> f64 {
        self.value = update_ewma(self.value, new_samples, self.max_wnd_len);
        self.value
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn reset(&mut self) {
        self.value = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ─── sliding_window_rate ─────────────────────────────────────────────

    #[test]
    fn sliding_window_rate_constant_stream() {
        // 1 unit every 0.01s for 1 second, 0.02s windows stepped by 0.005s.
        let times: Vec<f64> = (0..100).map(|i| i as f64 * 0.01).collect();
        let vals: Vec<f64> = vec![1.0; 100];
        let rtts: Vec<f64> = vec![50.0; 100];

        let rates = sliding_window_rate(&times, &vals, &rtts, 0.005, 0.02);
        assert!(!rates.is_empty());
        // Two samples land in every 0.02s window at this density, so the
        // rate should hover near 2.0/0.02 = 100.
        let mean = rates.iter().sum::<f64>() / rates.len() as f64;
        assert!((mean - 100.0).abs() < 20.0, "mean rate {mean} should be near 100");
    }

    #[test]
    fn sliding_window_rate_empty_input() {
        assert!(sliding_window_rate(&[], &[], &[], 0.005, 0.02).is_empty());
    }

    #[test]
    fn sliding_window_rate_app_limited_gap_does_not_zero_out() {
        let mut times = vec![0.0, 0.005, 0.01];
        // Large idle gap with flat RTT: application-limited, not congested.
        times.push(1.0);
        times.push(1.005);
        let vals = vec![10.0, 10.0, 10.0, 10.0, 10.0];
        let rtts = vec![50.0, 50.0, 50.0, 50.0, 50.0];

        let rates = sliding_window_rate(&times, &vals, &rtts, 0.005, 0.02);
        // The gap-skip logic should keep producing nonzero windows rather
        // than reporting a long run of zero throughput across the gap.
        assert!(rates.iter().any(|&r| r > 0.0));
    }

    #[test]
    fn bytes_per_sec_converts_to_mbps() {
        let mbps = bytes_per_sec_to_mbps(1024.0 * 1024.0 / 8.0);
        assert!((mbps - 1.0).abs() < 1e-9);
    }

    // ─── EWMA ─────────────────────────────────────────────────────────────

    #[test]
    fn update_ewma_empty_samples_is_noop() {
        assert_eq!(update_ewma(42.0, &[], 20), 42.0);
    }

    #[test]
    fn update_ewma_single_sample_blends_old_and_new() {
        let v = update_ewma(0.0, &[10.0], 20);
        assert!((v - 2.0).abs() < 1e-9, "0.2*10 + 0.8*0 == 2.0, got {v}");
    }

    #[test]
    fn update_ewma_caps_window_length() {
        let samples: Vec<f64> = vec![5.0; 50];
        let capped = update_ewma(0.0, &samples, 20);
        let uncapped_equivalent = update_ewma(0.0, &samples[30..], 20);
        assert!((capped - uncapped_equivalent).abs() < 1e-9);
    }

    #[test]
    fn ewma_struct_tracks_running_value() {
        let mut ewma = Ewma::new(20);
        let v1 = ewma.update(&[10.0]);
        let v2 = ewma.update(&[10.0]);
        assert!(v2 > v1, "value should keep climbing toward 10.0: {v1} -> {v2}");
    }

    #[test]
    fn ewma_reset_clears_value() {
        let mut ewma = Ewma::new(20);
        ewma.update(&[10.0]);
        ewma.reset();
        assert_eq!(ewma.value(), 0.0);
    }
}
