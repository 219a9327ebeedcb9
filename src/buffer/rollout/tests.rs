//! Tests for rollout buffer functionality

use rand::rngs::StdRng;
use rand::SeedableRng;

use super::*;
use crate::env::StepInfo;
use crate::error::InvariantError;

fn fill(buffer: &mut RolloutBuffer, rewards: &[f64], dones: &[bool], values: &[f64]) {
    for i in 0..rewards.len() {
        buffer
            .append(Transition {
                observation: vec![i as f32],
                action: 0,
                reward: rewards[i],
                next_observation: vec![i as f32 + 1.0],
                done: dones[i],
                value: values[i],
                log_prob: 0.0,
                info: StepInfo::new(),
            })
            .unwrap();
    }
}

#[test]
fn test_gae_single_episode_reference_values() {
    // horizon=4, rewards all 1, episode ends at the last step, values 0.5
    let rewards = [1.0; 4];
    let values = [0.5; 4];
    let dones = [false, false, false, true];

    let (advantages, returns) = compute_gae(&rewards, &values, &dones, 0.0, 0.99, 0.95).unwrap();

    // Terminal step: delta = 1 - 0.5, nothing carried
    assert!((advantages[3] - 0.5).abs() < 1e-12, "adv[3] = {}", advantages[3]);

    // Step 2: delta = 1 + 0.99 * 0.5 - 0.5 = 0.995, plus 0.99 * 0.95 * 0.5
    let expected_2 = 0.995 + 0.99 * 0.95 * 0.5;
    assert!((advantages[2] - expected_2).abs() < 1e-12);

    for t in 0..4 {
        assert!((returns[t] - (advantages[t] + values[t])).abs() < 1e-12);
    }
}

#[test]
fn test_gae_simple_episode() {
    let rewards = [1.0, 1.0, 1.0];
    let values = [2.0, 2.0, 2.0];
    let dones = [false, false, true];

    let (advantages, _) = compute_gae(&rewards, &values, &dones, 0.0, 1.0, 1.0).unwrap();

    // Step 2 (terminal): delta = 1.0 + 0 - 2.0 = -1.0, gae = -1.0
    // Step 1: delta = 1.0 + 2.0 - 2.0 = 1.0, gae = 1.0 + (-1.0) = 0.0
    // Step 0: delta = 1.0, gae = 1.0 + 0.0 = 1.0
    println!("Simple episode advantages: {:?}", advantages);
    assert!((advantages[2] - (-1.0)).abs() < 1e-9, "Step 2: expected -1.0, got {}", advantages[2]);
    assert!(advantages[1].abs() < 1e-9, "Step 1: expected 0.0, got {}", advantages[1]);
    assert!((advantages[0] - 1.0).abs() < 1e-9, "Step 0: expected 1.0, got {}", advantages[0]);
}

#[test]
fn test_gae_episode_boundaries_do_not_leak() {
    // Episode ends at step 2; steps 3.. belong to the next episode.
    let dones = [false, false, true, false, false];
    let values = [0.5, 0.5, 0.5, 1.0, 1.0];
    let rewards = [1.0, 1.0, 1.0, 2.0, 2.0];

    let (baseline, _) = compute_gae(&rewards, &values, &dones, 0.3, 0.99, 0.95).unwrap();

    // Perturb everything after the boundary, including the bootstrap.
    let mut rewards_b = rewards;
    let mut values_b = values;
    rewards_b[3] = -7.0;
    rewards_b[4] = 11.0;
    values_b[3] = 4.0;
    values_b[4] = -2.0;
    let (perturbed, _) = compute_gae(&rewards_b, &values_b, &dones, 9.0, 0.99, 0.95).unwrap();

    for t in 0..=2 {
        assert!(
            (baseline[t] - perturbed[t]).abs() < 1e-12,
            "step {} leaked across the episode boundary: {} vs {}",
            t,
            baseline[t],
            perturbed[t]
        );
    }
    assert!((baseline[2] - 0.5).abs() < 1e-12);
}

#[test]
fn test_gae_length_mismatch() {
    let err = compute_gae(&[1.0, 1.0], &[0.0], &[false, false], 0.0, 0.99, 0.95).unwrap_err();
    assert!(matches!(err, InvariantError::ShapeMismatch { what: "values", .. }));
}

#[test]
fn test_normalized_advantages_statistics() {
    let mut advantages: Vec<f64> = (0..257).map(|i| ((i * 37) % 101) as f64 * 0.3 - 4.0).collect();
    normalize_advantages(&mut advantages);

    let n = advantages.len() as f64;
    let mean = advantages.iter().sum::<f64>() / n;
    let std = (advantages.iter().map(|a| (a - mean).powi(2)).sum::<f64>() / n).sqrt();

    assert!(mean.abs() < 1e-6, "mean = {}", mean);
    assert!((std - 1.0).abs() < 1e-6, "std = {}", std);
}

#[test]
fn test_normalize_constant_advantages_stays_finite() {
    let mut advantages = vec![2.5; 8];
    normalize_advantages(&mut advantages);
    assert!(advantages.iter().all(|a| a.is_finite() && a.abs() < 1e-6));
}

#[test]
fn test_rollout_buffer_advantages() {
    let mut buffer = RolloutBuffer::new(4);
    fill(&mut buffer, &[1.0; 4], &[false, false, false, true], &[0.5; 4]);

    let (advantages, returns) = buffer.compute_advantages(0.0, 0.99, 0.95).unwrap();
    let (raw, _) = compute_gae(&[1.0; 4], &[0.5; 4], &[false, false, false, true], 0.0, 0.99, 0.95)
        .unwrap();

    // Returns come from the raw advantages, not the normalized ones.
    for t in 0..4 {
        assert!((returns[t] - (raw[t] + 0.5)).abs() < 1e-12);
    }

    let mean = advantages.iter().sum::<f64>() / 4.0;
    assert!(mean.abs() < 1e-9);
}

#[test]
fn test_compute_advantages_requires_full_rollout() {
    let mut buffer = RolloutBuffer::new(4);
    fill(&mut buffer, &[1.0; 2], &[false; 2], &[0.0; 2]);

    assert_eq!(
        buffer.compute_advantages(0.0, 0.99, 0.95),
        Err(InvariantError::RolloutIncomplete { len: 2, horizon: 4 })
    );
}

#[test]
fn test_buffer_lifecycle() {
    let mut buffer = RolloutBuffer::new(3);
    for round in 0..2 {
        fill(&mut buffer, &[1.0; 3], &[false; 3], &[0.0; 3]);
        assert!(buffer.is_full(), "round {}", round);
        assert!(buffer.compute_advantages(0.0, 0.99, 0.95).is_ok());
        buffer.clear();
        assert!(buffer.is_empty());
    }
}

#[test]
fn test_minibatch_indices_cover_every_sample() {
    let mut rng = StdRng::seed_from_u64(0);
    let batches = generate_minibatch_indices(10, 4, &mut rng);

    assert_eq!(batches.iter().map(Vec::len).collect::<Vec<_>>(), vec![4, 4, 2]);

    let mut all: Vec<usize> = batches.into_iter().flatten().collect();
    all.sort_unstable();
    assert_eq!(all, (0..10).collect::<Vec<_>>());
}

#[test]
fn test_minibatch_gather() {
    let mut buffer = RolloutBuffer::new(3);
    fill(&mut buffer, &[1.0, 2.0, 3.0], &[false; 3], &[0.1, 0.2, 0.3]);
    let batch = buffer.batch();

    let advantages = [10.0, 20.0, 30.0];
    let returns = [11.0, 22.0, 33.0];
    let minibatch = Minibatch::gather(&batch, &advantages, &returns, &[2, 0]).unwrap();

    assert_eq!(minibatch.obs_shape(), (2, 1));
    assert_eq!(minibatch.observations, vec![2.0, 0.0]);
    assert_eq!(minibatch.old_values, vec![0.3, 0.1]);
    assert_eq!(minibatch.advantages, vec![30.0, 10.0]);
    assert_eq!(minibatch.returns, vec![33.0, 11.0]);

    assert!(Minibatch::gather(&batch, &advantages[..2], &returns, &[0]).is_err());
}
