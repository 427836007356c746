//! # mortise-core
//!
//! Per-flow signal-processing and delta-optimisation engine for the Mortise
//! congestion-control co-tuning service.
//!
//! ## Crate structure
//!
//! - [`constants`] — shared tunables (app-type constants, decision cadence, CP priors)
//! - [`filters`] — Chebyshev Type-I biquad cascades and peak-width estimation
//! - [`estimator`] — sliding-window rate/BDP estimation and EWMA smoothing
//! - [`changepoint`] — Bayesian online change-point detector (Student-T likelihood)
//! - [`copa`] — closed-form Copa performance model (throughput, delay, loss)
//! - [`qoe`] — application-specific QoE preference model
//! - [`flow`] — [`flow::FlowCtrl`], the per-flow state machine tying the above together

pub mod changepoint;
pub mod constants;
pub mod copa;
pub mod estimator;
pub mod filters;
pub mod flow;
pub mod qoe;

pub use changepoint::ChangePointDetector;
pub use flow::{FlowCtrl, ReportDataElem, ReportEntry, TradeOffDecision};
pub use qoe::AppType;
