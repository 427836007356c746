//! Chebyshev Type-I IIR filtering and peak-width estimation.
//!
//! The estimator and the delta controller both need to split a noisy rate
//! signal into a fast-oscillation band and a slow-oscillation band before
//! measuring its peak-to-peak spread. This module builds a direct-form
//! biquad cascade from the analog Chebyshev I pole layout (bilinear
//! transform, pre-warped cutoff) the way `scipy.signal.cheby1` does, then
//! runs it over a buffer from zero initial state.

/// A single second-order (or first-order, with `b2 == 0.0 && a2 == 0.0`)
/// direct-form-I section.
#[derive(Debug, Clone, Copy)]
struct Biquad {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}

impl Biquad {
    /// Runs this section over `input`, returning a freshly allocated output
    /// buffer. State is zero-initialised on every call, matching the
    /// reference implementation's per-call `lfilter` invocations.
    fn run(&self, input: &[f64]) -> Vec<f64> {
        let (mut x1, mut x2, mut y1, mut y2) = (0.0, 0.0, 0.0, 0.0);
        let mut out = Vec::with_capacity(input.len());
        for &x0 in input {
            let y0 = self.b0 * x0 + self.b1 * x1 + self.b2 * x2 - self.a1 * y1 - self.a2 * y2;
            x2 = x1;
            x1 = x0;
            y2 = y1;
            y1 = y0;
            out.push(y0);
        }
        out
    }

    /// Frequency response magnitude-sum ratio at `z`, where `z == 1.0` is DC
    /// and `z == -1.0` is Nyquist. Both poles and zeros of this design are
    /// real-summed at those two points, so no complex arithmetic is needed.
    fn gain_at(&self, z: f64) -> f64 {
        let num = self.b0 + self.b1 * z + self.b2 * z * z;
        let den = 1.0 + self.a1 * z + self.a2 * z * z;
        num / den
    }
}

/// A Chebyshev Type-I filter realised as a cascade of biquads plus an
/// overall gain term that normalises the response at the design's
/// reference frequency (DC for low-pass, Nyquist for high-pass).
pub struct ChebyCascade {
    sections: Vec<Biquad>,
    gain: f64,
}

impl ChebyCascade {
    /// Filters `input`, returning a freshly allocated output buffer.
    pub fn filter(&self, input: &[f64]) -> Vec<f64> {
        let mut buf = input.to_vec();
        for section in &self.sections {
            buf = section.run(&buf);
        }
        for v in &mut buf {
            *v *= self.gain;
        }
        buf
    }
}

/// Analog Chebyshev-I prototype pole (lowpass, cutoff 1 rad/s, order `n`,
/// `rp` dB of passband ripple), the `k`-th of `n` (1-indexed).
fn prototype_pole(n: u32, k: u32, rp: f64) -> (f64, f64) {
    let eps = ((10f64.powf(rp / 10.0)) - 1.0).sqrt();
    let mu = (1.0 / eps).asinh() / n as f64;
    let theta = std::f64::consts::PI * (2 * k - 1) as f64 / (2.0 * n as f64);
    let re = -mu.sinh() * theta.sin();
    let im = mu.cosh() * theta.cos();
    (re, im)
}

/// Reciprocal of a complex number, used for the analog lowpass-to-highpass
/// frequency transform `s -> wc / s`.
fn complex_recip(re: f64, im: f64) -> (f64, f64) {
    let mag2 = re * re + im * im;
    (re / mag2, -im / mag2)
}

/// Bilinear transform of an analog pole/zero at `(re, im)` with sample rate
/// `fs`: `z = (2*fs + s) / (2*fs - s)`.
fn bilinear(re: f64, im: f64, fs: f64) -> (f64, f64) {
    let two_fs = 2.0 * fs;
    let dre = two_fs - re;
    let dim = -im;
    let nre = two_fs + re;
    let nim = im;
    let den = dre * dre + dim * dim;
    let out_re = (nre * dre + nim * dim) / den;
    let out_im = (nim * dre - nre * dim) / den;
    (out_re, out_im)
}

enum Band {
    Low,
    High,
}

/// Builds a Chebyshev-I cascade of the given `order` with `rp` dB ripple, a
/// `-3`-ish dB cutoff of `cutoff_hz`, evaluated at sample rate `fs_hz`.
fn build_cascade(order: u32, rp: f64, cutoff_hz: f64, fs_hz: f64, band: Band) -> ChebyCascade {
    assert!(order >= 1, "filter order must be at least 1");

    let warped = 2.0 * fs_hz * (std::f64::consts::PI * cutoff_hz / fs_hz).tan();

    // Analog poles, scaled to the target cutoff and (for high-pass)
    // transformed via the lowpass-to-highpass reciprocal mapping.
    let mut analog_poles: Vec<(f64, f64)> = Vec::with_capacity(order as usize);
    for k in 1..=order {
        let (pr, pi) = prototype_pole(order, k, rp);
        let scaled = match band {
            Band::Low => (pr * warped, pi * warped),
            Band::High => {
                let (r, i) = complex_recip(pr, pi);
                (r * warped, i * warped)
            }
        };
        analog_poles.push(scaled);
    }

    let digital_poles: Vec<(f64, f64)> = analog_poles
        .iter()
        .map(|&(re, im)| bilinear(re, im, fs_hz))
        .collect();

    let mut sections = Vec::with_capacity((order as usize + 1) / 2);
    let mut i = 0usize;
    while i < digital_poles.len() {
        let (re0, im0) = digital_poles[i];
        if im0.abs() > 1e-9 && i + 1 < digital_poles.len() {
            // conjugate pair -> one biquad
            let a1 = -2.0 * re0;
            let a2 = re0 * re0 + im0 * im0;
            let (b0, b1, b2) = match band {
                Band::Low => (1.0, 0.0, 0.0),
                Band::High => (1.0, -2.0, 1.0),
            };
            sections.push(Biquad { b0, b1, b2, a1, a2 });
            i += 2;
        } else {
            // real pole -> first-order section
            let a1 = -re0;
            let (b0, b1) = match band {
                Band::Low => (1.0, 0.0),
                Band::High => (1.0, -1.0),
            };
            sections.push(Biquad { b0, b1, b2: 0.0, a1, a2: 0.0 });
            i += 1;
        }
    }

    let reference_z = match band {
        Band::Low => 1.0,
        Band::High => -1.0,
    };
    let unnormalised: f64 = sections.iter().map(|s| s.gain_at(reference_z)).product();
    let gain = if unnormalised.abs() > 1e-15 {
        1.0 / unnormalised
    } else {
        1.0
    };

    ChebyCascade { sections, gain }
}

/// Designs and applies a Chebyshev-I low-pass filter to `data` in one shot.
pub fn cheby_lowpass_filter(data: &[f64], cutoff_hz: f64, fs_hz: f64, rp: f64, order: u32) -> Vec<f64> {
    build_cascade(order, rp, cutoff_hz, fs_hz, Band::Low).filter(data)
}

/// Designs and applies a Chebyshev-I high-pass filter to `data` in one shot.
pub fn cheby_highpass_filter(data: &[f64], cutoff_hz: f64, fs_hz: f64, rp: f64, order: u32) -> Vec<f64> {
    build_cascade(order, rp, cutoff_hz, fs_hz, Band::High).filter(data)
}

/// Population standard deviation.
fn std_dev(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let mean = data.iter().sum::<f64>() / data.len() as f64;
    let var = data.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / data.len() as f64;
    var.sqrt()
}

/// Peak-to-peak estimate of a band, approximated as `2 * std`.
pub fn peak_to_peak(data: &[f64]) -> f64 {
    2.0 * std_dev(data)
}

/// Ricker ("Mexican hat") wavelet sampled at integer offsets, used as a
/// lightweight stand-in for a full continuous wavelet transform peak finder.
fn ricker(points: usize, width: f64) -> Vec<f64> {
    let a = 2.0 / ((3.0 * width).sqrt() * std::f64::consts::PI.powf(0.25));
    let wsq = width * width;
    let half = (points as f64 - 1.0) / 2.0;
    (0..points)
        .map(|i| {
            let x = i as f64 - half;
            let xsq = x * x;
            let mod_term = 1.0 - xsq / wsq;
            let gauss = (-xsq / (2.0 * wsq)).exp();
            a * mod_term * gauss
        })
        .collect()
}

/// Same-length convolution of `signal` with `kernel`.
fn convolve_same(signal: &[f64], kernel: &[f64]) -> Vec<f64> {
    let n = signal.len();
    let k = kernel.len();
    let offset = k / 2;
    let mut out = vec![0.0; n];
    for (i, slot) in out.iter_mut().enumerate() {
        let mut acc = 0.0;
        for (j, &kv) in kernel.iter().enumerate() {
            let idx = i as isize + j as isize - offset as isize;
            if idx >= 0 && (idx as usize) < n {
                acc += signal[idx as usize] * kv;
            }
        }
        *slot = acc;
    }
    out
}

/// Candidate peak indices found by scanning ridge lines across a small bank
/// of Ricker-wavelet convolutions at the given widths.
fn cwt_peak_indices(signal: &[f64], widths: &[f64]) -> Vec<usize> {
    let mut candidates = std::collections::BTreeSet::new();
    for &width in widths {
        let points = ((width * 10.0).ceil() as usize).max(3) | 1; // odd length
        if points > signal.len() {
            continue;
        }
        let kernel = ricker(points, width);
        let response = convolve_same(signal, &kernel);
        for i in 1..response.len().saturating_sub(1) {
            if response[i] > response[i - 1] && response[i] >= response[i + 1] && response[i] > 0.0 {
                candidates.insert(i);
            }
        }
    }
    candidates.into_iter().collect()
}

/// Width of the peak at `idx` measured at half its prominence above the
/// surrounding local minima, in samples.
fn half_prominence_width(signal: &[f64], idx: usize) -> Option<f64> {
    let n = signal.len();
    let peak_val = signal[idx];

    let mut left_min = peak_val;
    let mut li = idx;
    while li > 0 {
        li -= 1;
        left_min = left_min.min(signal[li]);
        if signal[li] > peak_val {
            break;
        }
    }
    let mut right_min = peak_val;
    let mut ri = idx;
    while ri + 1 < n {
        ri += 1;
        right_min = right_min.min(signal[ri]);
        if signal[ri] > peak_val {
            break;
        }
    }

    let base = left_min.max(right_min);
    let half_height = base + (peak_val - base) / 2.0;
    if peak_val <= half_height {
        return None;
    }

    let mut left_cross = idx as f64;
    for i in (0..idx).rev() {
        if signal[i] <= half_height {
            let denom = signal[i + 1] - signal[i];
            left_cross = if denom.abs() > 1e-12 {
                i as f64 + (half_height - signal[i]) / denom
            } else {
                i as f64
            };
            break;
        }
        if i == 0 {
            left_cross = 0.0;
        }
    }

    let mut right_cross = idx as f64;
    for i in idx..n {
        if signal[i] <= half_height {
            let denom = signal[i] - signal[i - 1];
            right_cross = if denom.abs() > 1e-12 {
                (i - 1) as f64 + (half_height - signal[i - 1]) / denom
            } else {
                i as f64
            };
            break;
        }
        if i == n - 1 {
            right_cross = (n - 1) as f64;
        }
    }

    Some((right_cross - left_cross).max(0.0))
}

/// Estimates the average peak width (in samples) of an oscillatory signal.
/// Falls back to `1.0` when the signal is too short or no usable peak is
/// found, matching the conservative default of the original estimator.
pub fn compute_average_peak_width(signal: &[f64]) -> f64 {
    if signal.len() < 5 {
        return 1.0;
    }

    let widths: Vec<f64> = {
        let mut v = Vec::new();
        let mut w = 0.7;
        while w < 2.5 {
            v.push(w);
            w += 0.3;
        }
        v
    };

    let peaks = cwt_peak_indices(signal, &widths);
    if peaks.is_empty() {
        return 1.0;
    }

    let mut widths_found: Vec<f64> = peaks
        .iter()
        .filter_map(|&idx| half_prominence_width(signal, idx))
        .filter(|&w| w > 0.1)
        .collect();

    if widths_found.is_empty() {
        return 1.0;
    }

    widths_found.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let median = widths_found[widths_found.len() / 2];
    let upper = signal.len() as f64 / 3.0;
    median.clamp(0.1, upper.max(0.1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowpass_passes_dc() {
        let data = vec![5.0; 64];
        let out = cheby_lowpass_filter(&data, 2.0, 100.0, 1.0, 4);
        let tail_mean = out[out.len() - 8..].iter().sum::<f64>() / 8.0;
        assert!((tail_mean - 5.0).abs() < 0.2, "tail mean {tail_mean} should settle near 5.0");
    }

    #[test]
    fn highpass_kills_dc() {
        let data = vec![5.0; 64];
        let out = cheby_highpass_filter(&data, 2.0, 100.0, 1.0, 4);
        let tail_mean = out[out.len() - 8..].iter().sum::<f64>() / 8.0;
        assert!(tail_mean.abs() < 0.2, "tail mean {tail_mean} should settle near 0.0");
    }

    #[test]
    fn lowpass_odd_order_is_stable() {
        let data: Vec<f64> = (0..50).map(|i| (i as f64 * 0.3).sin() * 3.0 + 10.0).collect();
        let out = cheby_lowpass_filter(&data, 5.0, 100.0, 1.0, 3);
        assert!(out.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn peak_to_peak_of_constant_is_zero() {
        assert_eq!(peak_to_peak(&[2.0; 10]), 0.0);
    }

    #[test]
    fn peak_to_peak_scales_with_amplitude() {
        let data: Vec<f64> = (0..200).map(|i| (i as f64 * 0.2).sin() * 4.0).collect();
        let p2p = peak_to_peak(&data);
        assert!(p2p > 0.0 && p2p < 8.0);
    }

    #[test]
    fn short_signal_falls_back_to_one() {
        assert_eq!(compute_average_peak_width(&[1.0, 2.0, 1.0]), 1.0);
    }

    #[test]
    fn oscillatory_signal_yields_bounded_width() {
        let signal: Vec<f64> = (0..200).map(|i| (i as f64 * 0.3).sin()).collect();
        let width = compute_average_peak_width(&signal);
        assert!(width >= 0.1 && width <= signal.len() as f64 / 3.0);
    }
}
