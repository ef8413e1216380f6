use proptest::prelude::*;
use splitledger::money::Money;
use splitledger::schemas::{SplitPolicy, UserId};
use splitledger::split::compute_split;
use std::collections::HashMap;

fn participants(count: usize) -> Vec<UserId> {
    (0..count).map(|i| format!("user{i:02}")).collect()
}

proptest! {
    #[test]
    fn equal_split_conserves_every_cent(
        cents in 0i64..=100_000_000,
        participant_count in 1usize..=12,
    ) {
        let participants = participants(participant_count);
        let total = Money::from_minor_units(cents);
        let shares = compute_split(total, &participants, &SplitPolicy::Equal)
            .expect("equal split should always succeed");

        let sum: Money = shares.values().sum();
        prop_assert_eq!(sum, total);

        // No participant's share deviates from another's by more than a cent.
        let min = shares.values().min().copied().unwrap_or(Money::ZERO);
        let max = shares.values().max().copied().unwrap_or(Money::ZERO);
        prop_assert!(max.minor_units() - min.minor_units() <= 1);
    }

    #[test]
    fn weighted_split_stays_within_a_cent_of_exact_proportionality(
        cents in 0i64..=10_000_000,
        weights in prop::collection::vec(0.5f64..=25.0, 2..=8),
    ) {
        let participants = participants(weights.len());
        let inputs: HashMap<UserId, f64> = participants
            .iter()
            .cloned()
            .zip(weights.iter().copied())
            .collect();
        let total = Money::from_minor_units(cents);
        let shares = compute_split(total, &participants, &SplitPolicy::Shares { weights: inputs })
            .expect("positive weights should always split");

        let sum: Money = shares.values().sum();
        prop_assert_eq!(sum, total);

        // Compare each share against the exact quotient on the quantized
        // weights the calculator works with.
        let quantized: Vec<i128> = weights
            .iter()
            .map(|weight| (weight * 1000.0).round() as i128)
            .collect();
        let weight_sum: i128 = quantized.iter().sum();
        for (idx, id) in participants.iter().enumerate() {
            let exact = cents as i128 * quantized[idx] / weight_sum;
            let deviation = (shares[id].minor_units() as i128 - exact).abs();
            prop_assert!(deviation <= 1, "share for {} deviates by {}", id, deviation);
        }
    }

    #[test]
    fn percentage_split_reconciles_when_inputs_sum_to_100(
        cents in 0i64..=10_000_000,
        cuts in prop::collection::vec(0i64..=2_000, 1..=4),
    ) {
        // Basis-point inputs that sum to exactly 100%.
        let spent: i64 = cuts.iter().sum();
        let mut basis_points = cuts.clone();
        basis_points.push(10_000 - spent);

        let participants = participants(basis_points.len());
        let inputs: HashMap<UserId, f64> = participants
            .iter()
            .cloned()
            .zip(basis_points.iter().map(|bp| *bp as f64 / 100.0))
            .collect();
        let total = Money::from_minor_units(cents);
        let shares = compute_split(
            total,
            &participants,
            &SplitPolicy::Percentage { percentages: inputs },
        )
        .expect("percentages summing to 100 should split");

        let sum: Money = shares.values().sum();
        prop_assert_eq!(sum, total);
    }

    #[test]
    fn compute_split_is_referentially_transparent(
        cents in 0i64..=10_000_000,
        weights in prop::collection::vec(0.0f64..=10.0, 1..=6),
    ) {
        let participants = participants(weights.len());
        let inputs: HashMap<UserId, f64> = participants
            .iter()
            .cloned()
            .zip(weights.iter().copied())
            .collect();
        let policy = SplitPolicy::Shares { weights: inputs };
        let total = Money::from_minor_units(cents);

        let first = compute_split(total, &participants, &policy);
        let second = compute_split(total, &participants, &policy);
        prop_assert_eq!(first, second);
    }
}
