//! External payment integration

pub mod payout;

pub use payout::{PayoutError, PayoutService};
