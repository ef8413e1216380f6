use crate::money::Money;
use crate::schemas::{Payer, SplitPolicy, UserId};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

/// Tolerance for reconciling percentages against 100%, in basis points.
const PERCENT_TOLERANCE_BP: i64 = 1;

// Policy inputs are quantized to integers before any share arithmetic:
// percentages to basis points, share weights to milli-units.
const PERCENT_SCALE: f64 = 100.0;
const WEIGHT_SCALE: f64 = 1000.0;

#[derive(Clone, Debug, PartialEq, Error, Serialize)]
#[serde(tag = "error", rename_all = "snake_case")]
pub enum SplitError {
    #[error("an expense needs at least one participant")]
    NoParticipants,
    #[error("split inputs total {computed} but {expected} is required")]
    SplitMismatch { computed: f64, expected: f64 },
    #[error("share weights must not total zero")]
    ZeroWeightTotal,
    #[error("monetary inputs must be non-negative numbers")]
    InvalidAmount,
    #[error("payer amounts total {computed} but the expense total is {expected}")]
    PayerMismatch { computed: f64, expected: f64 },
}

/// Derives each participant's share of `total` under the given policy.
///
/// Pure: identical inputs always produce identical shares. On error no
/// partial allocation is returned, and callers must not persist the expense.
///
/// Rounding never leaks or duplicates a cent: for `equal`, `percentage` and
/// `shares` the computed shares sum exactly to `total`, with leftover cents
/// assigned by largest remainder (ties to the earlier participant in list
/// order). `exact` returns the supplied amounts verbatim once they reconcile
/// with the total.
pub fn compute_split(
    total: Money,
    participants: &[UserId],
    policy: &SplitPolicy,
) -> Result<BTreeMap<UserId, Money>, SplitError> {
    if participants.is_empty() {
        return Err(SplitError::NoParticipants);
    }
    if total < Money::ZERO {
        return Err(SplitError::InvalidAmount);
    }

    match policy {
        SplitPolicy::Equal => {
            let weights = vec![1; participants.len()];
            Ok(distribute(total, participants, &weights))
        }
        SplitPolicy::Exact { amounts } => exact_split(total, participants, amounts),
        SplitPolicy::Percentage { percentages } => {
            let weights = quantize_inputs(participants, percentages, PERCENT_SCALE, 0.0)?;
            let computed: i64 = weights.iter().sum();
            if (computed - 10_000).abs() > PERCENT_TOLERANCE_BP {
                return Err(SplitError::SplitMismatch {
                    computed: computed as f64 / PERCENT_SCALE,
                    expected: 100.0,
                });
            }
            Ok(distribute(total, participants, &weights))
        }
        SplitPolicy::Shares { weights } => {
            let weights = quantize_inputs(participants, weights, WEIGHT_SCALE, 1.0)?;
            if weights.iter().sum::<i64>() == 0 {
                return Err(SplitError::ZeroWeightTotal);
            }
            Ok(distribute(total, participants, &weights))
        }
    }
}

/// Checks that the payer amounts of an expense sum to its total.
pub fn validate_payers(total: Money, payers: &[Payer]) -> Result<(), SplitError> {
    if payers.iter().any(|payer| payer.amount < Money::ZERO) {
        return Err(SplitError::InvalidAmount);
    }
    let computed: Money = payers.iter().map(|payer| payer.amount).sum();
    if computed != total {
        return Err(SplitError::PayerMismatch {
            computed: computed.to_major(),
            expected: total.to_major(),
        });
    }
    Ok(())
}

fn exact_split(
    total: Money,
    participants: &[UserId],
    amounts: &HashMap<UserId, Money>,
) -> Result<BTreeMap<UserId, Money>, SplitError> {
    let mut shares = BTreeMap::new();
    let mut computed = Money::ZERO;
    for id in participants {
        let amount = amounts.get(id).copied().unwrap_or(Money::ZERO);
        if amount < Money::ZERO {
            return Err(SplitError::InvalidAmount);
        }
        computed += amount;
        *shares.entry(id.clone()).or_insert(Money::ZERO) += amount;
    }
    // Amounts are whole cents, so any discrepancy is at least a full cent
    // and lands outside the sub-cent tolerance.
    if computed != total {
        return Err(SplitError::SplitMismatch {
            computed: computed.to_major(),
            expected: total.to_major(),
        });
    }
    Ok(shares)
}

fn quantize_inputs(
    participants: &[UserId],
    inputs: &HashMap<UserId, f64>,
    scale: f64,
    default: f64,
) -> Result<Vec<i64>, SplitError> {
    participants
        .iter()
        .map(|id| {
            let value = inputs.get(id).copied().unwrap_or(default);
            if !value.is_finite() || value < 0.0 {
                return Err(SplitError::InvalidAmount);
            }
            let scaled = (value * scale).round();
            if scaled >= i64::MAX as f64 {
                return Err(SplitError::InvalidAmount);
            }
            Ok(scaled as i64)
        })
        .collect()
}

/// Splits `total` proportionally to `weights`. Each participant gets the
/// floor of their exact share; leftover cents go to the largest fractional
/// remainders, ties resolving to the earlier participant.
fn distribute(total: Money, participants: &[UserId], weights: &[i64]) -> BTreeMap<UserId, Money> {
    let weight_sum: i128 = weights.iter().map(|&weight| weight as i128).sum();
    let cents = total.minor_units() as i128;

    let mut base = Vec::with_capacity(weights.len());
    let mut remainder = Vec::with_capacity(weights.len());
    let mut allocated: i128 = 0;
    for &weight in weights {
        let exact = cents * weight as i128;
        base.push(exact.div_euclid(weight_sum));
        remainder.push(exact.rem_euclid(weight_sum));
        allocated += exact.div_euclid(weight_sum);
    }

    let leftover = (cents - allocated) as usize;
    let mut order: Vec<usize> = (0..weights.len()).collect();
    order.sort_by(|&a, &b| remainder[b].cmp(&remainder[a]).then(a.cmp(&b)));

    let mut shares = BTreeMap::new();
    for (rank, &idx) in order.iter().enumerate() {
        let mut cents_for = base[idx];
        if rank < leftover {
            cents_for += 1;
        }
        *shares
            .entry(participants[idx].clone())
            .or_insert(Money::ZERO) += Money::from_minor_units(cents_for as i64);
    }
    shares
}
