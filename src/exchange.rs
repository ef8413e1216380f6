use crate::balance::member_positions;
use crate::money::Money;
use crate::schemas::{Expense, Group, UserId};
use serde::Serialize;
use std::collections::HashMap;
use std::mem::swap;

/// One suggested transfer in a settle-up plan.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Exchange {
    pub payer: UserId,
    pub receiver: UserId,
    pub amount: Money,
}

#[derive(Clone, Debug)]
struct MemberPosition {
    id: UserId,
    amount: Money,
}

#[derive(Clone, Eq, PartialEq, Hash, Debug)]
struct UserPair {
    user1: UserId,
    user2: UserId,
}

// The transfers that would be made if no simplification happens: every
// debtor pays every payer of each expense directly, proportional to what
// that payer put in.
fn naive_exchanges(expenses: &[Expense]) -> Vec<Exchange> {
    let mut pair_balances: HashMap<UserPair, Money> = HashMap::new();

    for expense in expenses {
        if expense.amount <= Money::ZERO {
            continue;
        }
        for participant in &expense.participants {
            for payer in &expense.payers {
                if payer.user_id == participant.user_id {
                    continue;
                }
                let Some(owed) = participant.share.apportion(payer.amount, expense.amount)
                else {
                    continue;
                };
                if owed.is_zero() {
                    continue;
                }

                let mut pair = UserPair {
                    user1: payer.user_id.clone(),
                    user2: participant.user_id.clone(),
                };
                let mut amount = owed;

                // We use alphabetical order to ensure all the amounts
                // regarding the same two users end up stored in the same
                // direction.
                if pair.user1 > pair.user2 {
                    swap(&mut pair.user1, &mut pair.user2);
                    amount = -amount;
                }

                *pair_balances.entry(pair).or_insert(Money::ZERO) += amount;
            }
        }
    }

    let mut exchanges = Vec::new();
    for (pair, balance) in pair_balances {
        if balance.is_zero() {
            continue;
        }
        let mut payer = pair.user2;
        let mut receiver = pair.user1;
        // If the balance is smaller than zero we change the direction
        if balance < Money::ZERO {
            swap(&mut payer, &mut receiver);
        }
        exchanges.push(Exchange {
            payer,
            receiver,
            amount: balance.abs(),
        });
    }
    exchanges
}

// Tries to reduce the number of transfers by matching the largest debtor
// against the largest creditor until both sides run out.
fn simplified_exchanges(
    mut debtors: Vec<MemberPosition>,
    mut creditors: Vec<MemberPosition>,
) -> Vec<Exchange> {
    debtors.sort_by(|a, b| a.amount.cmp(&b.amount).then_with(|| b.id.cmp(&a.id)));
    creditors.sort_by(|a, b| a.amount.cmp(&b.amount).then_with(|| b.id.cmp(&a.id)));

    let mut exchanges = Vec::new();
    while let (Some(debtor), Some(creditor)) = (debtors.last_mut(), creditors.last_mut()) {
        let amount = debtor.amount.min(creditor.amount);
        exchanges.push(Exchange {
            payer: debtor.id.clone(),
            receiver: creditor.id.clone(),
            amount,
        });
        debtor.amount -= amount;
        creditor.amount -= amount;
        if debtors.last().is_some_and(|d| d.amount.is_zero()) {
            debtors.pop();
        }
        if creditors.last().is_some_and(|c| c.amount.is_zero()) {
            creditors.pop();
        }
    }
    exchanges
}

/// Builds a settle-up plan for the group's recorded expenses.
pub fn plan_exchanges(group: &Group) -> Vec<Exchange> {
    let mut debtors = Vec::new();
    let mut creditors = Vec::new();
    for (id, position) in member_positions(&group.expenses) {
        if position < Money::ZERO {
            debtors.push(MemberPosition {
                id,
                amount: position.abs(),
            });
        } else if position > Money::ZERO {
            creditors.push(MemberPosition {
                id,
                amount: position,
            });
        }
    }

    let naive_exchanges = naive_exchanges(&group.expenses);
    let simplified_exchanges = simplified_exchanges(debtors, creditors);

    // We ensure the simplification didn't accidentally end up being
    // more complicated than the naive exchanges
    if simplified_exchanges.len() < naive_exchanges.len() {
        simplified_exchanges
    } else {
        naive_exchanges
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schemas::{Participant, Payer};
    use chrono::{NaiveDate, TimeZone, Utc};

    fn cents(value: i64) -> Money {
        Money::from_minor_units(value)
    }

    fn expense(
        id: &str,
        amount: i64,
        payers: &[(&str, i64)],
        participants: &[(&str, i64)],
    ) -> Expense {
        Expense {
            id: id.to_string(),
            title: format!("expense {id}"),
            amount: cents(amount),
            currency: "USD".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 10, 1).unwrap(),
            note: None,
            payers: payers
                .iter()
                .map(|(user, paid)| Payer {
                    user_id: user.to_string(),
                    amount: cents(*paid),
                })
                .collect(),
            participants: participants
                .iter()
                .map(|(user, share)| Participant {
                    user_id: user.to_string(),
                    share: cents(*share),
                })
                .collect(),
            group_id: Some("group1".to_string()),
            created_by: payers[0].0.to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 10, 1, 19, 30, 0).unwrap(),
        }
    }

    fn group(expenses: Vec<Expense>) -> Group {
        let members = vec![
            "user1".to_string(),
            "user2".to_string(),
            "user3".to_string(),
        ];
        Group {
            id: "group1".to_string(),
            name: "Trip".to_string(),
            currency: "USD".to_string(),
            members,
            expenses,
        }
    }

    #[test]
    fn simplification_collapses_a_debt_chain() {
        // user1 fronts for everyone twice, user2 fronts once; naively user3
        // would pay both, but one transfer per debtor settles the group.
        let group = group(vec![
            expense(
                "a",
                3000,
                &[("user1", 3000)],
                &[("user1", 1000), ("user2", 1000), ("user3", 1000)],
            ),
            expense(
                "b",
                3000,
                &[("user2", 3000)],
                &[("user1", 1000), ("user2", 1000), ("user3", 1000)],
            ),
            expense(
                "c",
                3000,
                &[("user1", 3000)],
                &[("user1", 1000), ("user2", 1000), ("user3", 1000)],
            ),
        ]);
        let plan = plan_exchanges(&group);

        // Positions: user1 +3000, user2 0, user3 -3000.
        assert_eq!(
            plan,
            vec![Exchange {
                payer: "user3".to_string(),
                receiver: "user1".to_string(),
                amount: cents(3000),
            }]
        );
    }

    #[test]
    fn plan_settles_every_position_exactly() {
        let group = group(vec![
            expense(
                "a",
                12050,
                &[("user1", 12050)],
                &[("user1", 4017), ("user2", 4017), ("user3", 4016)],
            ),
            expense(
                "b",
                4500,
                &[("user2", 4500)],
                &[("user1", 1500), ("user2", 1500), ("user3", 1500)],
            ),
        ]);
        let plan = plan_exchanges(&group);
        let mut positions = member_positions(&group.expenses);
        for transfer in &plan {
            *positions.get_mut(&transfer.payer).unwrap() += transfer.amount;
            *positions.get_mut(&transfer.receiver).unwrap() -= transfer.amount;
        }
        assert!(positions.values().all(|position| position.is_zero()));
    }

    #[test]
    fn pairwise_plan_wins_when_it_is_no_longer() {
        // A single two-party expense: both plans have one transfer, so the
        // naive plan is kept.
        let group = group(vec![expense(
            "a",
            2000,
            &[("user1", 2000)],
            &[("user1", 1000), ("user2", 1000)],
        )]);
        let plan = plan_exchanges(&group);
        assert_eq!(
            plan,
            vec![Exchange {
                payer: "user2".to_string(),
                receiver: "user1".to_string(),
                amount: cents(1000),
            }]
        );
    }

    #[test]
    fn settled_groups_produce_an_empty_plan() {
        let group = group(vec![expense(
            "a",
            2000,
            &[("user1", 1000), ("user2", 1000)],
            &[("user1", 1000), ("user2", 1000)],
        )]);
        assert!(plan_exchanges(&group).is_empty());
    }

    #[test]
    fn plans_are_deterministic() {
        let group = group(vec![
            expense(
                "a",
                9000,
                &[("user1", 9000)],
                &[("user1", 3000), ("user2", 3000), ("user3", 3000)],
            ),
            expense(
                "b",
                6000,
                &[("user2", 6000)],
                &[("user1", 2000), ("user2", 2000), ("user3", 2000)],
            ),
        ]);
        assert_eq!(plan_exchanges(&group), plan_exchanges(&group));
    }
}
