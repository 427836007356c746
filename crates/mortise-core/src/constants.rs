//! Tunables shared across the estimator, change-point detector, and
//! Copa performance model. Mirrors the module-level constants of the
//! original reference implementation this engine was distilled from.

/// Maximum Transmission Segment size in bytes (assumed throughout).
pub const MSS_BYTES: f64 = 1448.0;

/// Loss-rate threshold below which a beta slope is considered undefined.
pub const LOSS_THR: f64 = 5e-3;

/// Prior QoE lambda (Mbps/ms), used before the first sample updates it.
pub const LAMBDA: f64 = 0.1;

/// Prior QoE beta, used before the first sample updates it.
pub const BETA: f64 = 0.1;

/// FILE app QoE response size, in Mb.
pub const RESPONSE_SIZE: f64 = 4.87;

/// STREAMING app QoE chunk size, in Mb.
pub const CHUNK_SIZE: f64 = 2.0;

/// Blend weight applied to a freshly searched delta vs. the current one
/// when no change point fired.
pub const ALPHA: f64 = 0.6;

/// Fractional step used to bracket the coarse/fine search around the
/// current trade-off (+/-24%).
pub const STEP_EPS: f64 = 0.24;

/// Admissible delta*1000 range.
pub const TRADE_OFF_MIN: i64 = 10;
pub const TRADE_OFF_MAX: i64 = 500;

/// Initial trade-off value (delta*1000) for a freshly created flow.
pub const TRADE_OFF_INITIAL: i64 = 100;

/// How many end-of-interval reports must elapse before a periodic decision fires.
pub const DECISION_INTERVAL_PERIOD: u64 = 5;

/// Change-point decisions require at least this many intervals since the
/// last reset before they are allowed to fire out of cadence.
pub const CP_MIN_INTERVALS: u64 = 10;

/// Sliding window over which `minrtts` samples are retained, in seconds.
pub const MINRTT_WINDOW_SECS: f64 = 10.0;

/// Bayesian online change-point detector: run-length history horizon.
pub const CP_HISTORY_LEN: usize = 200;

/// Constant hazard rate parameter (mean run length between change points).
pub const CP_HAZARD_LAMBDA: f64 = 250.0;

/// Student-T conjugate prior hyperparameters (alpha, beta, kappa, mu).
pub const CP_PRIOR_ALPHA: f64 = 0.1;
pub const CP_PRIOR_BETA: f64 = 0.01;
pub const CP_PRIOR_KAPPA: f64 = 1.0;
pub const CP_PRIOR_MU: f64 = 0.0;

/// Change point is only declared when the detected run length is this small.
pub const CP_DIP_THRESHOLD: f64 = 10.0;
