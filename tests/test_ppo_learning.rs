//! Checks that PPO updates move the policy in the right direction
//!
//! The synthetic batch makes the optimal action obvious:
//! - When obs=0, action=0 has high advantage (should increase probability)
//! - When obs=1, action=1 has high advantage (should increase probability)

use thrust_rl::{
    buffer::rollout::RolloutBatch,
    policy::{LinearPolicy, Policy},
    train::ppo::{PPOConfig, PPOTrainer},
};

fn synthetic_batch<P: Policy>(policy: &P) -> (RolloutBatch, Vec<f64>, Vec<f64>) {
    let observations = vec![0.0_f32, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0];
    let actions = vec![0_i64, 0, 0, 0, 1, 1, 1, 1];

    // Old log probs come from the policy itself so the first ratio is 1
    let eval = policy.evaluate_actions(&observations, &actions).unwrap();

    let batch = RolloutBatch {
        observations,
        obs_dim: 1,
        actions,
        old_log_probs: eval.log_probs,
        old_values: eval.values,
    };
    (batch, vec![10.0; 8], vec![10.0; 8])
}

#[test]
fn test_ppo_learns_from_synthetic_data() {
    let mut policy = LinearPolicy::new(1, 2, 0);

    let p0_before = policy.action_probs(&[0.0]).unwrap()[0];
    let p1_before = policy.action_probs(&[1.0]).unwrap()[1];
    println!("BEFORE training:");
    println!("  P(action=0 | obs=0) = {:.4}", p0_before);
    println!("  P(action=1 | obs=1) = {:.4}", p1_before);

    let config = PPOConfig::new().learning_rate(0.1).n_epochs(10).batch_size(8).seed(0);
    let mut trainer = PPOTrainer::new(config).unwrap();

    for _ in 0..5 {
        let (batch, advantages, returns) = synthetic_batch(&policy);
        let stats = trainer.update(&mut policy, &batch, &advantages, &returns).unwrap();
        assert!(stats.policy_loss.is_finite());
        assert!(stats.value_loss.is_finite());
    }

    let p0_after = policy.action_probs(&[0.0]).unwrap()[0];
    let p1_after = policy.action_probs(&[1.0]).unwrap()[1];
    println!("AFTER training:");
    println!("  P(action=0 | obs=0) = {:.4}", p0_after);
    println!("  P(action=1 | obs=1) = {:.4}", p1_after);

    assert!(p0_after > p0_before, "P(action=0 | obs=0) did not increase");
    assert!(p1_after > p1_before, "P(action=1 | obs=1) did not increase");
}

#[test]
fn test_value_head_fits_returns() {
    let mut policy = LinearPolicy::new(1, 2, 1);
    let config = PPOConfig::new().learning_rate(0.05).n_epochs(20).batch_size(4).seed(1);
    let mut trainer = PPOTrainer::new(config).unwrap();

    let (batch, _, returns) = synthetic_batch(&policy);
    let before = policy.value(&[1.0]).unwrap();
    trainer.update(&mut policy, &batch, &[0.0; 8], &returns).unwrap();
    let after = policy.value(&[1.0]).unwrap();

    assert!((after - 10.0).abs() < (before - 10.0).abs());
}

#[cfg(feature = "tch")]
#[test]
fn test_mlp_policy_learns_from_synthetic_data() {
    use thrust_rl::policy::mlp::MlpPolicy;

    let mut policy = MlpPolicy::new(1, 2, 64).unwrap();
    let probs = |p: &MlpPolicy, obs: f32, action: i64| {
        p.evaluate_actions(&[obs], &[action]).unwrap().log_probs[0].exp()
    };
    let p0_before = probs(&policy, 0.0, 0);
    let p1_before = probs(&policy, 1.0, 1);

    let config = PPOConfig::new().learning_rate(0.01).n_epochs(10).batch_size(8).seed(0);
    let mut trainer = PPOTrainer::new(config).unwrap();
    for _ in 0..3 {
        let (batch, advantages, returns) = synthetic_batch(&policy);
        trainer.update(&mut policy, &batch, &advantages, &returns).unwrap();
    }

    assert!(probs(&policy, 0.0, 0) > p0_before);
    assert!(probs(&policy, 1.0, 1) > p1_before);
}
