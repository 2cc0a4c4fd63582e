//! Collection of data types shared by the deposit relayer crates.

pub mod deposit;
pub mod payout;

pub mod prelude;
