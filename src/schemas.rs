use crate::money::Money;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub type UserId = String;

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Group {
    pub id: String,
    pub name: String,
    /// Settlement currency for every expense recorded in the group.
    pub currency: String,
    pub members: Vec<UserId>,
    pub expenses: Vec<Expense>,
}

/// One entry per person who physically paid part of an expense.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Payer {
    pub user_id: UserId,
    pub amount: Money,
}

/// One entry per person responsible for part of an expense. Shares are
/// computed once at submission time and persisted with the expense.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Participant {
    pub user_id: UserId,
    pub share: Money,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Expense {
    pub id: String,
    pub title: String,
    pub amount: Money,
    pub currency: String,
    pub date: NaiveDate,
    pub note: Option<String>,
    pub payers: Vec<Payer>,
    pub participants: Vec<Participant>,
    pub group_id: Option<String>,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
}

/// A direct payment between two parties, recorded to reduce a balance.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Settlement {
    pub id: String,
    pub from_user: UserId,
    pub to_user: UserId,
    pub amount: Money,
    pub currency: String,
    pub date: NaiveDate,
    pub note: Option<String>,
    pub group_id: Option<String>,
}

/// How an expense total is divided among its participants.
///
/// Per-participant inputs are keyed by user id. Missing keys default to `0`
/// for `exact` and `percentage` and to `1` for `shares`, matching the
/// submission form's behavior.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum SplitPolicy {
    Equal,
    Exact { amounts: HashMap<UserId, Money> },
    Percentage { percentages: HashMap<UserId, f64> },
    Shares { weights: HashMap<UserId, f64> },
}

/// A single party's aggregated position against everyone they have shared
/// an expense with. Derived per query, never persisted.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct Balance {
    pub owes: HashMap<UserId, Money>,
    pub owed_by: HashMap<UserId, Money>,
}
