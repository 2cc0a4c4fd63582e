use async_trait::async_trait;
use futures_util::stream::BoxStream;
use relayer_primitives::prelude::{BlockHeight, DepositEvent};

use crate::errors::SourceResult;

/// Stream of deposits pushed by the source chain. Ends (or yields an error) when the
/// subscription is lost.
pub type DepositStream = BoxStream<'static, SourceResult<DepositEvent>>;

/// Request/response access to the source chain.
#[async_trait]
pub trait SourceClient: Send + Sync + 'static {
    /// Current head height.
    async fn block_number(&self) -> SourceResult<BlockHeight>;

    /// Deposits emitted in the inclusive block range `from..=to`, in log order.
    async fn get_deposits(
        &self,
        from: BlockHeight,
        to: BlockHeight,
    ) -> SourceResult<Vec<DepositEvent>>;
}

/// Push access to the source chain's deposit events.
#[async_trait]
pub trait DepositSubscriber: Send + Sync + 'static {
    async fn subscribe_deposits(&self) -> SourceResult<DepositStream>;
}
