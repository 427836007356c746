//! Quality-of-experience preference model.
//!
//! Converts a flow's recent throughput/delay/loss observation into a linear
//! `(lambda, beta)` trade-off the delta controller can compare directly
//! against the network's own throughput/delay/loss slope.

use crate::constants::{CHUNK_SIZE, RESPONSE_SIZE};

/// The kind of application a flow carries, each with its own QoE shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppType {
    /// Bulk transfer: QoE is dominated by completion time.
    File,
    /// Chunked playback: QoE is dominated by rebuffering risk.
    Streaming,
}

/// Piecewise `(a, b)` penalty coefficients used by both app models, keyed
/// on the observed loss rate.
fn loss_penalty_coeffs(loss_rate: f64) -> (f64, f64) {
    if loss_rate < 0.05 {
        (0.0, 0.0)
    } else if loss_rate < 0.1 {
        (4.0, -0.2)
    } else if loss_rate < 0.4 {
        (1.0, 0.1)
    } else {
        (0.0, 0.5)
    }
}

/// Recomputes `(qoe_lambda, qoe_beta)` from a fresh `(throughput, delay,
/// loss_rate)` observation. `tput` is in Mbps, `delay` is in seconds.
pub fn update_qoe_preference(app_type: AppType, tput: f64, delay: f64, loss_rate: f64) -> (f64, f64) {
    let (a, b) = loss_penalty_coeffs(loss_rate);

    match app_type {
        AppType::File => {
            // The reference model works in milliseconds here.
            let delay = delay / 1000.0;
            let response = RESPONSE_SIZE;
            let qoe_lambda = (tput * tput) * (loss_rate + 2.0) / (2.0 * response) / 1000.0;
            let qoe_beta = -tput * (2.0 * a * (response + tput * delay) - (b - 1.0) * tput * delay)
                / (2.0 * response * (a * loss_rate + b - 1.0));
            (qoe_lambda, qoe_beta)
        }
        AppType::Streaming => {
            let qoe_lambda = 2.66 * (tput * tput) * (loss_rate + 2.0) / (tput + CHUNK_SIZE * 2.66) / 1000.0;
            let qoe_beta = 2.66 * (tput * tput) * delay / (tput + CHUNK_SIZE * 2.66);
            (qoe_lambda, qoe_beta)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loss_free_streaming_has_zero_penalty_coeffs() {
        let (lambda, _beta) = update_qoe_preference(AppType::Streaming, 50.0, 0.02, 0.0);
        assert!(lambda > 0.0);
    }

    #[test]
    fn streaming_lambda_grows_with_throughput() {
        let (lo, _) = update_qoe_preference(AppType::Streaming, 5.0, 0.02, 0.0);
        let (hi, _) = update_qoe_preference(AppType::Streaming, 50.0, 0.02, 0.0);
        assert!(hi > lo);
    }

    #[test]
    fn streaming_beta_grows_with_delay() {
        let (_, lo) = update_qoe_preference(AppType::Streaming, 20.0, 0.01, 0.0);
        let (_, hi) = update_qoe_preference(AppType::Streaming, 20.0, 0.1, 0.0);
        assert!(hi > lo);
    }

    #[test]
    fn file_lambda_is_positive_for_typical_inputs() {
        let (lambda, _beta) = update_qoe_preference(AppType::File, 20.0, 0.02, 0.0);
        assert!(lambda > 0.0);
    }

    #[test]
    fn loss_penalty_coeffs_match_bands() {
        assert_eq!(loss_penalty_coeffs(0.01), (0.0, 0.0));
        assert_eq!(loss_penalty_coeffs(0.07), (4.0, -0.2));
        assert_eq!(loss_penalty_coeffs(0.2), (1.0, 0.1));
        assert_eq!(loss_penalty_coeffs(0.5), (0.0, 0.5));
    }
}
