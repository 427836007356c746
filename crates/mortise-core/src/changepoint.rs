//! Bayesian online change-point detection (Adams & MacKay) with a constant
//! hazard function and a Normal-Inverse-Gamma/Student-T predictive
//! likelihood. Tracks a posterior over the current run length (samples
//! since the last regime change) and is queried for its mode after every
//! new sample.

use statrs::distribution::{Continuous, StudentsT};

use crate::constants::{CP_HAZARD_LAMBDA, CP_HISTORY_LEN, CP_PRIOR_ALPHA, CP_PRIOR_BETA, CP_PRIOR_KAPPA, CP_PRIOR_MU};

/// Constant hazard: the prior probability of a change point at any given
/// step, independent of the current run length.
fn constant_hazard(lambda: f64) -> f64 {
    1.0 / lambda
}

/// Student-T predictive density for a Normal-Inverse-Gamma posterior with
/// the given sufficient statistics.
fn predictive_pdf(x: f64, mu: f64, kappa: f64, alpha: f64, beta: f64) -> f64 {
    let df = 2.0 * alpha;
    let scale = (beta * (kappa + 1.0) / (alpha * kappa)).sqrt();
    match StudentsT::new(mu, scale, df) {
        Ok(dist) => dist.pdf(x),
        Err(_) => 0.0,
    }
}

/// Online change-point detector over a scalar signal.
pub struct ChangePointDetector {
    hazard_lambda: f64,
    prior: (f64, f64, f64, f64), // (mu, kappa, alpha, beta)
    history_len: usize,

    run_length_posterior: Vec<f64>,
    mu: Vec<f64>,
    kappa: Vec<f64>,
    alpha: Vec<f64>,
    beta: Vec<f64>,
}

impl Default for ChangePointDetector {
    fn default() -> Self {
        Self::new(CP_HAZARD_LAMBDA, CP_PRIOR_MU, CP_PRIOR_KAPPA, CP_PRIOR_ALPHA, CP_PRIOR_BETA, CP_HISTORY_LEN)
    }
}

impl ChangePointDetector {
    pub fn new(hazard_lambda: f64, mu0: f64, kappa0: f64, alpha0: f64, beta0: f64, history_len: usize) -> Self {
        ChangePointDetector {
            hazard_lambda,
            prior: (mu0, kappa0, alpha0, beta0),
            history_len,
            run_length_posterior: vec![1.0],
            mu: vec![mu0],
            kappa: vec![kappa0],
            alpha: vec![alpha0],
            beta: vec![beta0],
        }
    }

    /// Feeds a new sample in and returns the most likely current run
    /// length (0 means "a change point just happened").
    pub fn add_data(&mut self, x: f64) -> usize {
        let t = self.run_length_posterior.len();
        let hazard = constant_hazard(self.hazard_lambda);

        let pred_probs: Vec<f64> = (0..t)
            .map(|r| predictive_pdf(x, self.mu[r], self.kappa[r], self.alpha[r], self.beta[r]))
            .collect();

        let mut next_r = vec![0.0; t + 1];
        let mut cp_prob = 0.0;
        for r in 0..t {
            let growth = self.run_length_posterior[r] * pred_probs[r] * (1.0 - hazard);
            next_r[r + 1] = growth;
            cp_prob += self.run_length_posterior[r] * pred_probs[r] * hazard;
        }
        next_r[0] = cp_prob;

        let norm: f64 = next_r.iter().sum();
        if norm > 0.0 {
            for v in &mut next_r {
                *v /= norm;
            }
        }
        self.run_length_posterior = next_r;

        // Normal-Inverse-Gamma conjugate update, prepending the prior as
        // the new run-length-0 hypothesis.
        let (mu0, kappa0, alpha0, beta0) = self.prior;
        let mut new_mu = Vec::with_capacity(t + 1);
        let mut new_kappa = Vec::with_capacity(t + 1);
        let mut new_alpha = Vec::with_capacity(t + 1);
        let mut new_beta = Vec::with_capacity(t + 1);
        new_mu.push(mu0);
        new_kappa.push(kappa0);
        new_alpha.push(alpha0);
        new_beta.push(beta0);
        for r in 0..t {
            let (mu, kappa, alpha, beta) = (self.mu[r], self.kappa[r], self.alpha[r], self.beta[r]);
            new_mu.push((kappa * mu + x) / (kappa + 1.0));
            new_kappa.push(kappa + 1.0);
            new_alpha.push(alpha + 0.5);
            new_beta.push(beta + kappa * (x - mu).powi(2) / (2.0 * (kappa + 1.0)));
        }
        self.mu = new_mu;
        self.kappa = new_kappa;
        self.alpha = new_alpha;
        self.beta = new_beta;

        self.prune();
        self.get_max()
    }

    /// Drops the longest-run-length hypotheses once the tracked history
    /// exceeds `history_len`, keeping the detector's cost bounded.
    fn prune(&mut self) {
        let cap = self.history_len + 2;
        if self.run_length_posterior.len() > cap {
            self.run_length_posterior.truncate(cap);
            self.mu.truncate(cap);
            self.kappa.truncate(cap);
            self.alpha.truncate(cap);
            self.beta.truncate(cap);
        }
    }

    /// The run length with the highest posterior probability.
    pub fn get_max(&self) -> usize {
        self.run_length_posterior
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap())
            .map(|(idx, _)| idx)
            .unwrap_or(0)
    }

    /// Resets the detector to its prior, as if a change point had just been
    /// confirmed and history cleared.
    pub fn reset(&mut self) {
        let (mu0, kappa0, alpha0, beta0) = self.prior;
        self.run_length_posterior = vec![1.0];
        self.mu = vec![mu0];
        self.kappa = vec![kappa0];
        self.alpha = vec![alpha0];
        self.beta = vec![beta0];
    }
}
