// src/reactor/chain.rs
use super::{RelayError, Trade};
use async_trait::async_trait;
use hyper::{Body, Response};
use std::sync::Arc;
use tracing::trace;

/// Match-then-react capability of one routing rule.
///
/// `Ok(None)` means "not handled" (rule declined or soft failure) and the
/// chain continues; `Ok(Some(..))` is the produced outbound; `Err` is a hard
/// failure surfaced to the caller.
#[async_trait]
pub trait TradeReactor: Send + Sync {
    fn name(&self) -> &str;

    async fn react(&self, trade: &Trade) -> Result<Option<Response<Body>>, RelayError>;
}

/// Ordered list of reactors with short-circuiting continue-on-decline
/// evaluation.
pub struct ReactorChain {
    reactors: Vec<Arc<dyn TradeReactor>>,
}

impl ReactorChain {
    pub fn new(reactors: Vec<Arc<dyn TradeReactor>>) -> Self {
        Self { reactors }
    }

    pub fn len(&self) -> usize {
        self.reactors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reactors.is_empty()
    }

    pub async fn dispatch(&self, trade: &Trade) -> Result<Option<Response<Body>>, RelayError> {
        for reactor in &self.reactors {
            trace!(reactor = reactor.name(), trade = %trade.id(), "trying reactor");
            match reactor.react(trade).await? {
                Some(response) => {
                    trade.mark_outbound();
                    return Ok(Some(response));
                }
                None => continue,
            }
        }
        Ok(None)
    }
}
