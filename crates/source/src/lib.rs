//! Source chain side of the relayer: finding deposit events and deciding when they are final.

mod errors;
mod gate;
mod events;
mod rpc;
mod traits;
mod watcher;
mod ws;

#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;

pub use errors::{SourceError, SourceResult};
pub use gate::ConfirmationGate;
pub use events::{decode_deposit_log, deposit_filter, Deposit, RpcLog};
pub use rpc::EvmRpcClient;
pub use traits::{DepositStream, DepositSubscriber, SourceClient};
pub use watcher::{init_cursor, PollWatcher, PushWatcher};
pub use ws::EvmSubscriptionClient;
