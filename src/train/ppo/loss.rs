//! Loss computation functions for PPO
//!
//! This module contains the core loss computation functions used in PPO
//! training: policy loss, value loss, and entropy loss. Each returns the
//! scalar loss together with its gradient with respect to the model
//! outputs it consumed, so the update engine can hand the combined
//! gradient to the policy.

use crate::utils::stats;

/// Per-sample clipped surrogate objective
///
/// ```text
/// min(r * A, clip(r, 1 - ε, 1 + ε) * A)
/// ```
///
/// For `A > 0` this is non-decreasing in `r` and constant for
/// `r > 1 + ε`; for `A < 0` it is constant for `r < 1 - ε`.
pub fn clipped_surrogate(ratio: f64, advantage: f64, clip_range: f64) -> f64 {
    let clipped = ratio.clamp(1.0 - clip_range, 1.0 + clip_range);
    (ratio * advantage).min(clipped * advantage)
}

/// Policy loss and diagnostics for one minibatch
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyLoss {
    /// `-mean(clipped_surrogate)`
    pub loss: f64,

    /// Fraction of samples with `|r - 1| > ε`
    pub clip_fraction: f64,

    /// `mean((r - 1) - ln r)`, a non-negative estimate of KL(old || new)
    pub approx_kl: f64,

    /// ∂loss / ∂log_prob per sample
    pub grad_log_probs: Vec<f64>,
}

/// Compute PPO policy loss with clipping
///
/// # Arguments
/// * `log_probs` - Log probabilities of actions under current policy
/// * `old_log_probs` - Log probabilities of actions under old policy
/// * `advantages` - Normalized advantages
/// * `clip_range` - PPO clipping parameter (epsilon)
pub fn compute_policy_loss(
    log_probs: &[f64],
    old_log_probs: &[f64],
    advantages: &[f64],
    clip_range: f64,
) -> PolicyLoss {
    let n = log_probs.len().max(1) as f64;
    let mut objective = 0.0;
    let mut clipped_count = 0usize;
    let mut kl = 0.0;
    let mut grad_log_probs = Vec::with_capacity(log_probs.len());

    for ((&lp, &old), &adv) in log_probs.iter().zip(old_log_probs).zip(advantages) {
        let ratio = (lp - old).exp();
        let unclipped = ratio * adv;
        let clipped = ratio.clamp(1.0 - clip_range, 1.0 + clip_range) * adv;

        objective += unclipped.min(clipped);
        if (ratio - 1.0).abs() > clip_range {
            clipped_count += 1;
        }
        kl += (ratio - 1.0) - (lp - old);

        // The clipped branch is only selected outside the trust region,
        // where it does not depend on the ratio.
        let grad = if clipped < unclipped { 0.0 } else { -unclipped / n };
        grad_log_probs.push(grad);
    }

    PolicyLoss {
        loss: -objective / n,
        clip_fraction: clipped_count as f64 / n,
        approx_kl: kl / n,
        grad_log_probs,
    }
}

/// Value loss and diagnostics for one minibatch
#[derive(Debug, Clone, PartialEq)]
pub struct ValueLoss {
    /// Mean squared error against the returns
    pub loss: f64,

    /// `1 - Var(returns - values) / Var(returns)`
    pub explained_var: f64,

    /// ∂loss / ∂value per sample
    pub grad_values: Vec<f64>,
}

/// Compute value function loss with optional clipping
///
/// With `clip_range_vf = Some(c)` each sample takes the larger of the plain
/// squared error and the squared error of `old + clamp(v - old, -c, c)`.
///
/// # Arguments
/// * `values` - Predicted values under current value function
/// * `old_values` - Predicted values at collection time
/// * `returns` - Computed returns (targets)
/// * `clip_range_vf` - Value function clipping parameter
pub fn compute_value_loss(
    values: &[f64],
    old_values: &[f64],
    returns: &[f64],
    clip_range_vf: Option<f64>,
) -> ValueLoss {
    let n = values.len().max(1) as f64;
    let mut total = 0.0;
    let mut grad_values = Vec::with_capacity(values.len());

    for ((&v, &old), &ret) in values.iter().zip(old_values).zip(returns) {
        let err = v - ret;
        let plain = err * err;

        let (loss, grad) = match clip_range_vf {
            Some(c) => {
                let delta = v - old;
                let v_clipped = old + delta.clamp(-c, c);
                let clipped_err = v_clipped - ret;
                let clipped = clipped_err * clipped_err;
                if plain >= clipped {
                    (plain, 2.0 * err)
                } else if delta.abs() < c {
                    (clipped, 2.0 * clipped_err)
                } else {
                    (clipped, 0.0)
                }
            }
            None => (plain, 2.0 * err),
        };

        total += loss;
        grad_values.push(grad / n);
    }

    ValueLoss { loss: total / n, explained_var: explained_variance(values, returns), grad_values }
}

/// Explained variance of `values` as predictors of `returns`
///
/// Returns 1.0 when the returns have no variance.
pub fn explained_variance(values: &[f64], returns: &[f64]) -> f64 {
    let (_, std_returns) = stats::mean_std(returns);
    let var_returns = std_returns * std_returns;
    if var_returns == 0.0 {
        return 1.0;
    }

    let residuals: Vec<f64> = returns.iter().zip(values).map(|(r, v)| r - v).collect();
    let (_, std_residual) = stats::mean_std(&residuals);
    1.0 - std_residual * std_residual / var_returns
}

/// Compute entropy loss (negative entropy for maximization)
///
/// Returns `(-mean(entropy), ∂loss/∂entropy per sample)`.
///
/// # Arguments
/// * `entropy` - Per-sample entropy of the policy distribution
pub fn compute_entropy_loss(entropy: &[f64]) -> (f64, Vec<f64>) {
    let n = entropy.len().max(1) as f64;
    let loss = -entropy.iter().sum::<f64>() / n;
    (loss, vec![-1.0 / n; entropy.len()])
}
