use crate::core::error::StoreResult;
use tokio::sync::oneshot;

/// Whether a resolution may be answered from the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Cache hit answers without a round-trip
    Cached,
    /// Always ask the store, then refresh the cache
    Fresh,
}

#[derive(Debug)]
pub struct ResolveRequest {
    pub contact_identifier: String,
    pub display_name: Option<String>,
    pub freshness: Freshness,
    pub response: oneshot::Sender<StoreResult<String>>,
}

#[derive(Debug)]
pub enum ResolverMessage {
    Resolve(ResolveRequest),
    CachedId {
        contact_identifier: String,
        response: oneshot::Sender<Option<String>>,
    },
    Shutdown,
}

/// Outcome of one lookup-then-create, reported back to the resolver actor
#[derive(Debug)]
pub struct Resolution {
    pub contact_identifier: String,
    pub result: StoreResult<String>,
}
