//! Copa congestion-control performance model.
//!
//! Closed-form estimates of relative throughput, queueing delay, and loss
//! as a function of a scalar trade-off parameter `delta` (Copa's
//! throughput/delay knob, transmitted over the wire as `delta * 1000`).
//! These let the delta controller search for an operating point without
//! running a live congestion-control simulation.

// ─── Throughput ─────────────────────────────────────────────────────────────

/// Relative throughput loss (Mbps, negative) from the fast-oscillation
/// (high-frequency) component of the queue occupancy signal, with
/// peak-to-peak amplitude `p2p` packets and round-trip time `minrtt`
/// seconds.
pub fn calc_relative_tput_high_freq(p2p: f64, delta_scaled: f64, minrtt: f64) -> f64 {
    let delta = delta_scaled / 1000.0;
    let height = p2p / 2.0;
    let extra_cwnd = height.min(1.0 / delta);
    let rel_tput_in_packets = -((height - extra_cwnd).powi(2)) / (2.0 * height.max(2.0) * minrtt);
    rel_tput_in_packets * 1448.0 * 8.0 / 1024.0 / 1024.0
}

/// Relative throughput loss (Mbps, negative) from the slow-oscillation
/// (low-frequency) component, simulating Copa's congestion-window ramp
/// across an average oscillation period `avg_peak_width` seconds.
pub fn calc_relative_tput_low_freq(p2p: f64, delta_scaled: f64, minrtt: f64, avg_peak_width: f64) -> f64 {
    let delta = delta_scaled / 1000.0;
    let mut delta_packets = 0.0;
    let mut cur_cwnd = 0.0;
    // The bounce mechanism never drains the queue, so at very small delta
    // the window starts the ramp already partway up.
    if delta <= 0.1 {
        cur_cwnd += 0.5 / delta;
    }
    let mut cur_time = 0.0;
    let mut round_cnt = 0;
    while cur_cwnd < p2p && round_cnt < 6 && cur_time < avg_peak_width {
        cur_cwnd += 0.5 / delta;
        round_cnt += 1;
        cur_time += 0.5 * minrtt;
        delta_packets += (0.5 * (p2p - cur_cwnd)).max(0.0);
    }

    let delta_p2p = p2p - cur_cwnd;
    if delta_p2p >= 1.0 && cur_time < avg_peak_width {
        let max_converge_rounds = ((avg_peak_width - cur_time) * 2.0 / minrtt) as i64;
        let converge_rounds = ((2.0 * delta * delta_p2p + 1.0).log2().ceil() as i64).min(max_converge_rounds);
        delta_packets += converge_rounds as f64 * delta_p2p / 2.0
            - (2f64.powi(converge_rounds as i32) - 2.0 - converge_rounds as f64) / 4.0 / delta;
    }

    -(delta_packets / avg_peak_width) * 12.0 / 1000.0
}

// ─── Delay ───────────────────────────────────────────────────────────────────

/// Average queueing delay (seconds) at the given trade-off and bottleneck
/// `bandwidth` (Mbps).
pub fn calc_queue_delay(delta_scaled: f64, bandwidth: f64, minrtt: f64, bounce: bool) -> f64 {
    let delta = delta_scaled / 1000.0;
    let bandwidth = if bandwidth == 0.0 { 0.001 } else { bandwidth };
    let mut delay = 1.25 * 12.0 / delta / bandwidth;
    // The bounce mechanism doesn't drain the queue below ~100 delta, so the
    // average latency runs about 30% high in that regime.
    if delta <= 0.1 && bounce {
        delay *= 1.3;
    }
    delay
}

// ─── Loss ────────────────────────────────────────────────────────────────────

/// Expected loss rate given the trade-off and the link's maximum queue
/// length (packets).
pub fn calc_loss(delta_scaled: f64, max_qlen: f64) -> f64 {
    (1.0 - max_qlen * delta_scaled / 1000.0).max(0.0)
}
