//! Per-flow controller: the engine that turns a stream of ack samples into
//! a periodically-adjusted Copa delta for one flow.

use tracing::debug;

use crate::changepoint::ChangePointDetector;
use crate::constants::{
    ALPHA, CP_DIP_THRESHOLD, CP_MIN_INTERVALS, DECISION_INTERVAL_PERIOD, LOSS_THR, MINRTT_WINDOW_SECS, MSS_BYTES,
    STEP_EPS, TRADE_OFF_INITIAL, TRADE_OFF_MAX, TRADE_OFF_MIN,
};
use crate::copa::{calc_loss, calc_queue_delay, calc_relative_tput_high_freq, calc_relative_tput_low_freq};
use crate::estimator::{bytes_per_sec_to_mbps, sliding_window_rate, update_ewma};
use crate::filters::{cheby_highpass_filter, cheby_lowpass_filter, compute_average_peak_width, peak_to_peak};
use crate::qoe::{update_qoe_preference, AppType};

/// A run length that has never been observed; compares greater than any
/// real run length, mirroring the source's `float('inf')` sentinel.
const RUN_LEN_INF: usize = usize::MAX;

/// A single ack sample as reported by the agent.
#[derive(Debug, Clone, Copy)]
pub struct ReportDataElem {
    /// Measured RTT, in microseconds.
    pub rtt: u32,
    /// Bytes acknowledged by this sample.
    pub acked_bytes: u32,
    /// Bytes declared lost by this sample.
    pub lost_bytes: u32,
    /// Sample time, in microseconds since an agent-defined epoch.
    pub timestamp: u32,
}

/// A framed batch of samples for one flow.
#[derive(Debug, Clone)]
pub struct ReportEntry {
    pub flow_id: u32,
    /// Negative value marks end-of-interval.
    pub chunk_id: i16,
    /// Number of valid elements in `data_array`.
    pub chunk_len: u16,
    pub data_array: Vec<ReportDataElem>,
}

/// The outcome of a fired decision: the new trade-off to push to the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TradeOffDecision {
    pub flow_id: u32,
    pub trade_off: i64,
}

fn mean(data: &[f64]) -> f64 {
    if data.is_empty() {
        0.0
    } else {
        data.iter().sum::<f64>() / data.len() as f64
    }
}

/// Sum of the last `n` entries of `data` (or all of it, if shorter).
fn tail_sum(data: &[f64], n: usize) -> f64 {
    let from = data.len().saturating_sub(n);
    data[from..].iter().sum()
}

/// Index of the oldest history sample still within `wnd_len` seconds of
/// `first_new_time`, scanning from the end.
fn windowed_history_start(history_timestamp: &[f64], wnd_len: f64, first_new_time: f64) -> usize {
    let n = history_timestamp.len();
    let mut start = n;
    for back in 1..=n {
        let idx = n - back;
        if history_timestamp[idx] + wnd_len < first_new_time {
            break;
        }
        start = idx;
    }
    start
}

/// Per-flow signal-processing and delta-optimisation engine.
pub struct FlowCtrl {
    app_type: AppType,
    flow_id: Option<u32>,

    cp_detector: ChangePointDetector,
    cp_detected: bool,
    run_len: usize,
    last_run_len: usize,

    history_rtt: Vec<f64>,
    history_acked_bytes: Vec<f64>,
    history_lost_bytes: Vec<f64>,
    history_timestamp: Vec<f64>,
    history_max_qlen: Vec<f64>,

    smoothed_rate: Vec<f64>,
    smoothed_bdp: Vec<f64>,
    ewma_rate: f64,
    loss_rate: f64,

    minrtts: Vec<f64>,
    minrtt_age: Vec<f64>,
    clock: f64,

    sample_interval: f64,
    cur_trade_off: i64,
    last_trade_off: i64,
    intervals_len: Vec<f64>,

    enable_adjust: bool,
    decide_intervals_cnts: u64,

    qoe_lambda: f64,
    qoe_beta: f64,
}

impl FlowCtrl {
    pub fn new(app_type: AppType) -> Self {
        FlowCtrl {
            app_type,
            flow_id: None,
            cp_detector: ChangePointDetector::default(),
            cp_detected: false,
            run_len: RUN_LEN_INF,
            last_run_len: RUN_LEN_INF,
            history_rtt: Vec::new(),
            history_acked_bytes: Vec::new(),
            history_lost_bytes: Vec::new(),
            history_timestamp: Vec::new(),
            history_max_qlen: Vec::new(),
            smoothed_rate: Vec::new(),
            smoothed_bdp: Vec::new(),
            ewma_rate: 0.0,
            loss_rate: 0.0,
            minrtts: Vec::new(),
            minrtt_age: Vec::new(),
            clock: 0.0,
            sample_interval: 0.01,
            cur_trade_off: TRADE_OFF_INITIAL,
            last_trade_off: TRADE_OFF_INITIAL,
            intervals_len: vec![0.0],
            enable_adjust: false,
            decide_intervals_cnts: 0,
            qoe_lambda: crate::constants::LAMBDA,
            qoe_beta: crate::constants::BETA,
        }
    }

    pub fn flow_id(&self) -> Option<u32> {
        self.flow_id
    }

    pub fn cur_trade_off(&self) -> i64 {
        self.cur_trade_off
    }

    /// Drops all history accumulated in the current regime, but keeps the
    /// min-RTT window, the change-point detector, and the current
    /// trade-off untouched.
    fn clear_history(&mut self) {
        self.history_rtt.clear();
        self.history_acked_bytes.clear();
        self.history_lost_bytes.clear();
        self.history_timestamp.clear();
        self.history_max_qlen.clear();
        self.smoothed_rate.clear();
        self.smoothed_bdp.clear();
        self.ewma_rate = 0.0;
        self.decide_intervals_cnts = 0;
    }

    fn update_loss(&mut self) {
        let window = tail_sum(&self.intervals_len, 2) as usize;
        let total_acked = tail_sum(&self.history_acked_bytes, window);
        let total_lost = tail_sum(&self.history_lost_bytes, window);
        let denom = total_acked + total_lost;
        self.loss_rate = if denom > 0.0 { total_lost / denom } else { 0.0 };
        if self.loss_rate > 0.0 {
            self.history_max_qlen
                .push((1.0 - self.loss_rate) / self.cur_trade_off as f64 * 1000.0);
        }
    }

    /// `cur_min_rtt` is in ms. `now` is a monotonic clock reading in
    /// seconds, used only for the 10-second sliding window.
    fn update_minrtt(&mut self, cur_min_rtt: f64, now: f64) {
        self.minrtt_age.push(now);
        self.minrtts.push(cur_min_rtt);
        while !self.minrtt_age.is_empty() && now - self.minrtt_age[0] > MINRTT_WINDOW_SECS {
            self.minrtt_age.remove(0);
            self.minrtts.remove(0);
        }
    }

    fn refresh_qoe_preference(&mut self) {
        let min_rtt_s = min_of(&self.minrtts) / 1000.0;
        let (lambda, beta) = update_qoe_preference(self.app_type, self.ewma_rate, min_rtt_s, self.loss_rate);
        self.qoe_lambda = lambda;
        self.qoe_beta = beta;
    }

    fn update_smoothed_data(&mut self, timestamps: &[f64], bytes: &[f64], rtts: &[f64]) {
        let rtt_min = min_of(rtts) / 1000.0;
        let wnd_len = rtt_min;
        self.sample_interval = (rtt_min / 4.0).max(0.004);

        let raw_rates = sliding_window_rate(timestamps, bytes, rtts, self.sample_interval, wnd_len);
        let raw_rate_mbps: Vec<f64> = raw_rates.iter().map(|&r| bytes_per_sec_to_mbps(r)).collect();

        self.ewma_rate = update_ewma(self.ewma_rate, &raw_rate_mbps, 20);
        self.smoothed_rate.extend_from_slice(&raw_rate_mbps);
        self.smoothed_bdp.extend(raw_rates.iter().map(|&r| r * rtt_min / MSS_BYTES));
    }

    /// The BDP tail covering the last `last_n` reporting intervals, per the
    /// windowing rule shared by the network-slope estimate and the fine
    /// search.
    fn recent_bdp_tail(&self, last_n: usize) -> &[f64] {
        let recent_count = tail_sum(&self.intervals_len, last_n) as usize;
        let history_len = self.history_timestamp.len();
        if history_len == 0 || recent_count == 0 {
            return &self.smoothed_bdp[self.smoothed_bdp.len()..];
        }
        let offset_idx = history_len.saturating_sub(recent_count).min(history_len - 1);
        let elapsed = self.history_timestamp[history_len - 1] - self.history_timestamp[offset_idx];
        let bdp_tail = ((elapsed / self.sample_interval) as usize).min(self.smoothed_bdp.len());
        let start = self.smoothed_bdp.len() - bdp_tail;
        &self.smoothed_bdp[start..]
    }

    /// Computes the network's own `(lambda, beta)` throughput/delay slope
    /// over the last four reporting intervals, for comparison against the
    /// QoE target.
    fn net_lambda_beta(&self) -> (f64, f64) {
        let rtt_min = min_of(&self.minrtts);
        let bdp = self.recent_bdp_tail(4);

        let cutoff = (1000.0 / (2.0 * 1.5 * rtt_min)) as i64;
        let fs = (1.0 / self.sample_interval).max(2.01 * cutoff as f64);
        let rp = 1.0;

        let bdp_h = cheby_highpass_filter(bdp, cutoff as f64, fs, rp, 4);
        let bdp_mean = mean(bdp);
        let bdp_zd: Vec<f64> = bdp.iter().map(|&v| v - bdp_mean).collect();
        let bdp_b = cheby_lowpass_filter(&bdp_zd, cutoff as f64, fs, rp, 2);

        let bdp_p2p_h = peak_to_peak(&bdp_h);
        let bdp_p2p_l = peak_to_peak(&bdp_b);
        let peak_width_l = compute_average_peak_width(&bdp_b) * self.sample_interval;

        let delta_large = 500.0_f64.min(self.cur_trade_off as f64 * (1.0 + STEP_EPS));
        let delta_small = (self.cur_trade_off as f64 / 3.0)
            .trunc()
            .max(self.cur_trade_off as f64 * (1.0 - STEP_EPS));

        let tput_h = calc_relative_tput_high_freq(bdp_p2p_h, delta_small, rtt_min / 1000.0)
            - calc_relative_tput_high_freq(bdp_p2p_h, delta_large, rtt_min / 1000.0);
        let tput_l = calc_relative_tput_low_freq(bdp_p2p_l, delta_small, rtt_min / 1000.0, peak_width_l)
            - calc_relative_tput_low_freq(bdp_p2p_l, delta_large, rtt_min / 1000.0, peak_width_l);
        let thr = tput_h + tput_l;

        let bw = self.ewma_rate;
        let lat_mean =
            calc_queue_delay(delta_small, bw, rtt_min, true) - calc_queue_delay(delta_large, bw, rtt_min, true);

        let loss_mean = if !self.history_max_qlen.is_empty() {
            let max_qlen = mean(&self.history_max_qlen);
            calc_loss(delta_small, max_qlen) - calc_loss(delta_large, max_qlen)
        } else {
            0.0
        };

        let beta = if loss_mean > LOSS_THR { thr / loss_mean } else { 0.0 };
        (thr / lat_mean, beta)
    }

    fn fine_tune_with_filtering(&self, rtt_min: f64) -> f64 {
        let bdp = self.recent_bdp_tail(4);
        let bw = self.ewma_rate;

        let cutoff = (1000.0 / (2.0 * 1.5 * rtt_min)) as i64;
        let fs = (1.0 / self.sample_interval).max(2.01 * cutoff as f64);
        let rp = 0.8;

        let bdp_h = cheby_highpass_filter(bdp, cutoff as f64, fs, rp, 4);
        let bdp_mean = mean(bdp);
        let bdp_zd: Vec<f64> = bdp.iter().map(|&v| v - bdp_mean).collect();
        let bdp_b = cheby_lowpass_filter(&bdp_zd, cutoff as f64, fs, rp, 2);

        let bdp_p2p_h = peak_to_peak(&bdp_h);
        let bdp_p2p_l = peak_to_peak(&bdp_b);
        let peak_width_l = (compute_average_peak_width(&bdp_b) * self.sample_interval).max(1.0 / cutoff as f64);

        let mut opt_delta = self.cur_trade_off as f64;
        let mut opt_qoe = -1_000_000.0_f64;

        let delay_thr = 0.08 * rtt_min;
        let delta_max = (500.0_f64).min((12.0 / delay_thr / self.ewma_rate * 1000.0).trunc());
        let delta_min = (12.0 + (100.0 * self.qoe_lambda).trunc()).max((self.cur_trade_off as f64 / 2.0).trunc());

        let mut delta = delta_min;
        while delta < delta_max {
            let tput_h = calc_relative_tput_high_freq(bdp_p2p_h, delta, rtt_min / 1000.0);
            let tput_l = calc_relative_tput_low_freq(bdp_p2p_l, delta, rtt_min / 1000.0, peak_width_l);
            let thr = tput_h + tput_l;
            let lat_mean = calc_queue_delay(delta, bw, rtt_min, true);

            let max_qlen = if !self.history_max_qlen.is_empty() {
                mean(&self.history_max_qlen)
            } else {
                268_435_455.0
            };
            let loss_mean = calc_loss(delta, max_qlen);

            let cur_qoe = thr - self.qoe_lambda * lat_mean / (1.0 - loss_mean) - self.qoe_beta * loss_mean;
            if cur_qoe > opt_qoe {
                opt_delta = delta;
                opt_qoe = cur_qoe;
            }
            delta += 25.0;
        }

        if opt_delta <= self.cur_trade_off as f64 && self.loss_rate < LOSS_THR {
            opt_delta = self.cur_trade_off as f64
                - self.cur_trade_off as f64 * 0.1 / (0.2 + self.qoe_lambda + self.qoe_beta);
            opt_delta = opt_delta.max(delta_min);
        }
        if self.loss_rate > LOSS_THR {
            opt_delta += self.cur_trade_off as f64 * (0.5_f64.min(self.qoe_beta * self.loss_rate * 12.0));
        }

        opt_delta
    }

    fn coarse_adjust_with_stepping(&self, net_lambda: f64) -> f64 {
        let mut lambda_opt_d = self.cur_trade_off as f64;

        if net_lambda < self.qoe_lambda {
            if self.loss_rate < LOSS_THR {
                lambda_opt_d *= 1.0 + STEP_EPS / 2.0;
            } else {
                lambda_opt_d *= 1.0 + STEP_EPS;
            }
        } else if self.loss_rate > LOSS_THR {
            lambda_opt_d /= 1.0 + STEP_EPS / 2.0;
        } else {
            lambda_opt_d /= 1.0 + STEP_EPS;
        }

        let delta_min = (10.0 + (100.0 * self.qoe_lambda).trunc()).max((self.cur_trade_off as f64 / 3.0).trunc());
        let rtt_min = min_of(&self.minrtts);
        let delay_thr = 0.1 * rtt_min;
        let delta_max = (500.0_f64).min((12.0 / delay_thr / self.ewma_rate * 1000.0).trunc());

        lambda_opt_d.min(delta_max).max(delta_min)
    }

    /// Searches for a new trade-off using the fine (integer grid search) or
    /// coarse (multiplicative step) path, depending on how close the
    /// network's own slope already is to the QoE target.
    fn probe_opt_delta(&self) -> f64 {
        let rtt_min = min_of(&self.minrtts);
        let (net_lambda, _net_beta) = self.net_lambda_beta();

        let lambda_ratio = if self.qoe_lambda > 0.0 { net_lambda / self.qoe_lambda } else { 0.0 };
        if lambda_ratio > 0.5 && lambda_ratio < 2.0 {
            self.fine_tune_with_filtering(rtt_min)
        } else {
            self.coarse_adjust_with_stepping(net_lambda)
        }
    }

    fn check_change_point(&mut self) {
        let cur_run_len = self.cp_detector.add_data(self.ewma_rate);
        if self.run_len < cur_run_len
            && cur_run_len < self.last_run_len
            && cur_run_len as f64 <= CP_DIP_THRESHOLD
        {
            self.cp_detected = true;
        }
        self.last_run_len = self.run_len;
        self.run_len = cur_run_len;
    }

    /// Feeds one framed batch of samples into the controller. `now` is a
    /// monotonic seconds reading used only for the min-RTT sliding window.
    pub fn add_data(&mut self, entry: &ReportEntry, now: f64) {
        if self.flow_id.is_none() {
            self.flow_id = Some(entry.flow_id);
        }

        let chunk_len = entry.chunk_len as usize;
        if let Some(last) = self.intervals_len.last_mut() {
            *last += chunk_len as f64;
        }
        if entry.chunk_id < 0 {
            self.intervals_len.push(0.0);
        }
        if chunk_len == 0 {
            return;
        }

        let samples = &entry.data_array[..chunk_len];
        let times: Vec<f64> = samples.iter().map(|e| e.timestamp as f64 / 1_000_000.0).collect();
        let rtts: Vec<f64> = samples.iter().map(|e| e.rtt as f64 / 1000.0).collect();
        let bytes: Vec<f64> = samples.iter().map(|e| e.acked_bytes as f64).collect();
        let losts: Vec<f64> = samples.iter().map(|e| e.lost_bytes as f64).collect();

        if !self.history_rtt.is_empty() {
            let wnd_len = min_of(&self.minrtts) / 1000.0;
            let start = windowed_history_start(&self.history_timestamp, wnd_len, times[0]);
            let combined_times: Vec<f64> = self.history_timestamp[start..].iter().chain(times.iter()).copied().collect();
            let combined_rtts: Vec<f64> = self.history_rtt[start..].iter().chain(rtts.iter()).copied().collect();
            let combined_bytes: Vec<f64> =
                self.history_acked_bytes[start..].iter().chain(bytes.iter()).copied().collect();
            self.update_smoothed_data(&combined_times, &combined_bytes, &combined_rtts);
        }

        self.history_rtt.extend_from_slice(&rtts);
        self.history_timestamp.extend_from_slice(&times);
        self.history_acked_bytes.extend_from_slice(&bytes);
        self.history_lost_bytes.extend_from_slice(&losts);

        self.update_minrtt(min_of(&rtts), now);
        self.update_loss();
        self.refresh_qoe_preference();
        self.check_change_point();

        if entry.chunk_id < 0 {
            self.enable_adjust = true;
            self.decide_intervals_cnts += 1;
        }
    }

    /// Fires a trade-off decision if one is due, resetting the
    /// end-of-interval flag regardless of whether a decision fired.
    pub fn process(&mut self) -> Option<TradeOffDecision> {
        let mut decision = None;
        if self.enable_adjust
            && (self.decide_intervals_cnts % DECISION_INTERVAL_PERIOD == 0
                || (self.decide_intervals_cnts > CP_MIN_INTERVALS && self.cp_detected))
        {
            self.last_trade_off = self.cur_trade_off;
            let opt_delta = self.probe_opt_delta() as i64;

            if self.cp_detected {
                self.cur_trade_off = opt_delta.clamp(TRADE_OFF_MIN, TRADE_OFF_MAX);
                self.clear_history();
                self.cp_detected = false;
                debug!(flow_id = ?self.flow_id, trade_off = self.cur_trade_off, "change-point reset");
            } else {
                let blended = (ALPHA * opt_delta as f64 + (1.0 - ALPHA) * self.cur_trade_off as f64) as i64;
                self.cur_trade_off = blended.clamp(TRADE_OFF_MIN, TRADE_OFF_MAX);
                debug!(flow_id = ?self.flow_id, trade_off = self.cur_trade_off, "blended adjustment");
            }

            if let Some(flow_id) = self.flow_id {
                decision = Some(TradeOffDecision { flow_id, trade_off: self.cur_trade_off });
            }
        }
        self.enable_adjust = false;
        decision
    }
}

fn min_of(data: &[f64]) -> f64 {
    data.iter().copied().fold(f64::INFINITY, f64::min)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(ts_us: u32, rtt_us: u32, acked: u32, lost: u32) -> ReportDataElem {
        ReportDataElem { rtt: rtt_us, acked_bytes: acked, lost_bytes: lost, timestamp: ts_us }
    }

    #[test]
    fn first_sample_binds_flow_id() {
        let mut flow = FlowCtrl::new(AppType::Streaming);
        let entry = ReportEntry {
            flow_id: 7,
            chunk_id: 0,
            chunk_len: 1,
            data_array: vec![sample(1_000_000, 60_000, 1448, 0)],
        };
        flow.add_data(&entry, 0.0);
        assert_eq!(flow.flow_id(), Some(7));
    }

    #[test]
    fn empty_chunk_is_ignored_but_interval_still_advances() {
        let mut flow = FlowCtrl::new(AppType::Streaming);
        let entry = ReportEntry { flow_id: 1, chunk_id: -1, chunk_len: 0, data_array: vec![] };
        flow.add_data(&entry, 0.0);
        assert_eq!(flow.intervals_len.len(), 2);
    }

    #[test]
    fn trade_off_stays_in_range_after_many_intervals() {
        let mut flow = FlowCtrl::new(AppType::Streaming);
        let mut t = 0u32;
        for interval in 0..40 {
            let mut samples = Vec::new();
            for i in 0..10 {
                t += 10_000;
                samples.push(sample(t, 55_000 + (i as u32 % 3) * 500, 1448, 0));
            }
            let entry = ReportEntry { flow_id: 3, chunk_id: -1, chunk_len: samples.len() as u16, data_array: samples };
            flow.add_data(&entry, interval as f64 * 0.1);
            if let Some(decision) = flow.process() {
                assert!(decision.trade_off >= 10 && decision.trade_off <= 500);
            }
        }
    }

    #[test]
    fn no_decision_before_fifth_interval() {
        let mut flow = FlowCtrl::new(AppType::Streaming);
        let mut t = 0u32;
        for interval in 0..4 {
            let mut samples = Vec::new();
            for _ in 0..5 {
                t += 10_000;
                samples.push(sample(t, 55_000, 1448, 0));
            }
            let entry = ReportEntry { flow_id: 9, chunk_id: -1, chunk_len: samples.len() as u16, data_array: samples };
            flow.add_data(&entry, interval as f64 * 0.1);
            assert!(flow.process().is_none());
        }
    }
}
