//! Batch fetch port.

use async_trait::async_trait;

use crate::error::Result;

/// One upstream request covering many identifiers.
///
/// `A` carries per-call context (chain, filters) that is not part of the
/// identifier set.
#[async_trait]
pub trait BatchFetch<I, A>: Send + Sync
where
    I: Send + 'static,
    A: Send + 'static,
{
    type Output: Send + Sync + 'static;

    async fn fetch(&self, ids: Vec<I>, args: A) -> Result<Self::Output>;
}
