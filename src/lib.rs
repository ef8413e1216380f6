pub mod auth;
pub mod balance;
pub mod exchange;
pub mod money;
pub mod schemas;
pub mod split;

pub use balance::{
    apply_settlements, compute_balance, compute_balance_with, member_positions,
    spending_by_category, NettingStrategy,
};
pub use exchange::{plan_exchanges, Exchange};
pub use money::Money;
pub use schemas::{Balance, Expense, Group, Participant, Payer, Settlement, SplitPolicy, UserId};
pub use split::{compute_split, validate_payers, SplitError};
