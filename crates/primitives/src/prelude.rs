pub use crate::{
    deposit::{BlockHeight, DepositEvent, DepositId, DepositIdError},
    payout::{DestinationKind, PayoutReceipt},
};
