use std::collections::{BTreeMap, HashMap};

use crate::money::Money;
use crate::schemas::{Balance, Expense, Settlement, UserId};
use serde::Deserialize;

/// How per-expense imbalances are attributed to pairwise debts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NettingStrategy {
    /// Attribute the target's surplus or deficit proportionally to the other
    /// parties' shares, capped by each party's own imbalance. When more than
    /// two parties are imbalanced on one expense the attribution is a
    /// heuristic, not an exact reconciliation.
    #[default]
    ProportionalAttribution,
    /// Match each expense's creditors against its debtors, largest first.
    /// Exact per expense: the target's attributed flows always sum to their
    /// net position.
    GreedyFlow,
}

/// Computes the target party's pairwise balances across `expenses` under the
/// default proportional-attribution strategy.
pub fn compute_balance(target: &UserId, expenses: &[Expense]) -> Balance {
    compute_balance_with(target, expenses, NettingStrategy::default())
}

/// Computes the target party's pairwise balances across `expenses`.
///
/// Never fails: expenses the target did not participate in are skipped, and
/// lookups that find nothing contribute zero rather than aborting the scan.
/// Entries that accumulate to exactly zero are omitted; amounts are whole
/// cents, so no sub-cent residue can remain for a presentation layer to
/// filter.
pub fn compute_balance_with(
    target: &UserId,
    expenses: &[Expense],
    strategy: NettingStrategy,
) -> Balance {
    let mut owes: HashMap<UserId, Money> = HashMap::new();
    let mut owed_by: HashMap<UserId, Money> = HashMap::new();

    for expense in expenses {
        match strategy {
            NettingStrategy::ProportionalAttribution => {
                attribute_proportionally(target, expense, &mut owes, &mut owed_by);
            }
            NettingStrategy::GreedyFlow => {
                attribute_greedily(target, expense, &mut owes, &mut owed_by);
            }
        }
    }

    owes.retain(|_, amount| !amount.is_zero());
    owed_by.retain(|_, amount| !amount.is_zero());
    Balance { owes, owed_by }
}

fn participant_share(expense: &Expense, user: &UserId) -> Option<Money> {
    expense
        .participants
        .iter()
        .find(|participant| participant.user_id == *user)
        .map(|participant| participant.share)
}

fn paid_amount(expense: &Expense, user: &UserId) -> Money {
    expense
        .payers
        .iter()
        .filter(|payer| payer.user_id == *user)
        .map(|payer| payer.amount)
        .sum()
}

fn attribute_proportionally(
    target: &UserId,
    expense: &Expense,
    owes: &mut HashMap<UserId, Money>,
    owed_by: &mut HashMap<UserId, Money>,
) {
    let Some(target_share) = participant_share(expense, target) else {
        return;
    };
    let net = paid_amount(expense, target) - target_share;

    if net > Money::ZERO {
        // The target overpaid; every underpaid co-participant owes them a
        // slice of the surplus, proportional to that participant's share of
        // the pool that excludes the target's own share.
        for participant in &expense.participants {
            if participant.user_id == *target {
                continue;
            }
            let other_net = paid_amount(expense, &participant.user_id) - participant.share;
            if other_net >= Money::ZERO {
                continue;
            }
            let pool = expense.amount - target_share;
            let Some(slice) = net.apportion(participant.share, pool) else {
                tracing::debug!(
                    expense = %expense.id,
                    "skipping attribution over a non-positive share pool"
                );
                continue;
            };
            *owed_by
                .entry(participant.user_id.clone())
                .or_insert(Money::ZERO) += slice.min(other_net.abs());
        }
    } else if net < Money::ZERO {
        // The target underpaid; their deficit is owed to the overpaid payers.
        for payer in &expense.payers {
            if payer.user_id == *target {
                continue;
            }
            let payer_share =
                participant_share(expense, &payer.user_id).unwrap_or(Money::ZERO);
            let payer_net = paid_amount(expense, &payer.user_id) - payer_share;
            if payer_net <= Money::ZERO {
                continue;
            }
            let pool = expense.amount - payer_share;
            let Some(slice) = payer_net.apportion(target_share, pool) else {
                tracing::debug!(
                    expense = %expense.id,
                    "skipping attribution over a non-positive share pool"
                );
                continue;
            };
            *owes.entry(payer.user_id.clone()).or_insert(Money::ZERO) +=
                slice.min(net.abs());
        }
    }
}

fn attribute_greedily(
    target: &UserId,
    expense: &Expense,
    owes: &mut HashMap<UserId, Money>,
    owed_by: &mut HashMap<UserId, Money>,
) {
    if participant_share(expense, target).is_none() {
        return;
    }

    let mut positions: BTreeMap<&UserId, Money> = BTreeMap::new();
    for payer in &expense.payers {
        *positions.entry(&payer.user_id).or_insert(Money::ZERO) += payer.amount;
    }
    for participant in &expense.participants {
        *positions.entry(&participant.user_id).or_insert(Money::ZERO) -= participant.share;
    }

    let mut creditors: Vec<(&UserId, Money)> = Vec::new();
    let mut debtors: Vec<(&UserId, Money)> = Vec::new();
    for (user, position) in positions {
        if position > Money::ZERO {
            creditors.push((user, position));
        } else if position < Money::ZERO {
            debtors.push((user, position.abs()));
        }
    }
    // Largest first; the BTreeMap walk already fixed the order of ties.
    creditors.sort_by(|a, b| b.1.cmp(&a.1));
    debtors.sort_by(|a, b| b.1.cmp(&a.1));

    let (mut ci, mut di) = (0, 0);
    while ci < creditors.len() && di < debtors.len() {
        let flow = creditors[ci].1.min(debtors[di].1);
        if *debtors[di].0 == *target {
            *owes.entry(creditors[ci].0.clone()).or_insert(Money::ZERO) += flow;
        } else if *creditors[ci].0 == *target {
            *owed_by.entry(debtors[di].0.clone()).or_insert(Money::ZERO) += flow;
        }
        creditors[ci].1 -= flow;
        debtors[di].1 -= flow;
        if creditors[ci].1.is_zero() {
            ci += 1;
        }
        if debtors[di].1.is_zero() {
            di += 1;
        }
    }
}

/// Nets recorded settlements into a computed balance. This is the
/// presentation-side step: the core balance itself stays gross of
/// settlements.
pub fn apply_settlements(
    balance: Balance,
    target: &UserId,
    settlements: &[Settlement],
) -> Balance {
    let mut net: HashMap<UserId, Money> = HashMap::new();
    for (user, amount) in balance.owed_by {
        *net.entry(user).or_insert(Money::ZERO) += amount;
    }
    for (user, amount) in balance.owes {
        *net.entry(user).or_insert(Money::ZERO) -= amount;
    }
    for settlement in settlements {
        if settlement.from_user == *target {
            // The target paid down their debt; the counterparty's net moves up.
            *net.entry(settlement.to_user.clone()).or_insert(Money::ZERO) += settlement.amount;
        } else if settlement.to_user == *target {
            *net.entry(settlement.from_user.clone()).or_insert(Money::ZERO) -=
                settlement.amount;
        }
    }

    let mut netted = Balance::default();
    for (user, amount) in net {
        if amount > Money::ZERO {
            netted.owed_by.insert(user, amount);
        } else if amount < Money::ZERO {
            netted.owes.insert(user, amount.abs());
        }
    }
    netted
}

/// Each member's net position (paid minus owed) across a set of expenses.
pub fn member_positions(expenses: &[Expense]) -> HashMap<UserId, Money> {
    let mut positions = HashMap::new();
    for expense in expenses {
        for payer in &expense.payers {
            *positions
                .entry(payer.user_id.clone())
                .or_insert(Money::ZERO) += payer.amount;
        }
        for participant in &expense.participants {
            *positions
                .entry(participant.user_id.clone())
                .or_insert(Money::ZERO) -= participant.share;
        }
    }
    positions
}

/// The target's own spending grouped by the leading word of each expense
/// note, `Other` when no note was recorded.
pub fn spending_by_category(target: &UserId, expenses: &[Expense]) -> HashMap<String, Money> {
    let mut totals = HashMap::new();
    for expense in expenses {
        let Some(share) = participant_share(expense, target) else {
            continue;
        };
        let category = expense
            .note
            .as_deref()
            .and_then(|note| note.split_whitespace().next())
            .unwrap_or("Other");
        *totals.entry(category.to_string()).or_insert(Money::ZERO) += share;
    }
    totals
}
