//! SDK entry point.
//!
//! [`LoyaltyClient`] owns the [`Context`] and the three access modules built
//! from it. Workflows and read operations are implemented on it in
//! [`crate::workflow`].

use tracing::info;

use crate::chain::ChainAccess;
use crate::config::{Context, ContextParams};
use crate::error::Result;
use crate::indexer::IndexerAccess;
use crate::relay::RelayAccess;

#[derive(Debug, Clone)]
pub struct LoyaltyClient {
    context: Context,
    chain: ChainAccess,
    relay: RelayAccess,
    indexer: IndexerAccess,
}

impl LoyaltyClient {
    pub fn new(context: Context) -> Result<Self> {
        let chain = ChainAccess::new(&context)?;
        let relay = RelayAccess::new(&context)?;
        let indexer = IndexerAccess::new(&context)?;
        info!(
            "Loyalty client for {} ({} providers, {} GraphQL nodes)",
            context.network(),
            chain.provider_count(),
            indexer.node_count()
        );

        Ok(Self {
            context,
            chain,
            relay,
            indexer,
        })
    }

    /// Builds the context from a complete parameter object.
    pub fn from_params(params: ContextParams) -> Result<Self> {
        Self::new(Context::set_full(params)?)
    }

    /// Merges `partial` into the context and rebuilds the access modules.
    ///
    /// The new state is built completely before it replaces the old one, so a
    /// validation error leaves the client unchanged. Provider and node
    /// rotation restart at index 0.
    pub fn update_context(&mut self, partial: ContextParams) -> Result<()> {
        let next = Self::new(self.context.set(partial)?)?;
        *self = next;
        Ok(())
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn chain(&self) -> &ChainAccess {
        &self.chain
    }

    pub fn chain_mut(&mut self) -> &mut ChainAccess {
        &mut self.chain
    }

    pub fn relay(&self) -> &RelayAccess {
        &self.relay
    }

    pub fn indexer(&self) -> &IndexerAccess {
        &self.indexer
    }

    pub fn indexer_mut(&mut self) -> &mut IndexerAccess {
        &mut self.indexer
    }
}
