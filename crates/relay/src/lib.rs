//! The deposit to payout pipeline: admitting deposits, running their payouts under a
//! concurrency ceiling, and wiring the source and destination sides together.

mod errors;
mod queue;
mod relayer;

pub use errors::{RelayError, RelayResult};
pub use queue::{DispatchQueue, EnqueueOutcome, QueueItem, QueueStats};
pub use relayer::{relayer_from_config, Relayer, RelayerHandle, INTAKE_CAPACITY};
