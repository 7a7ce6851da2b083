use anyhow::Result;
use async_trait::async_trait;

use crate::{
    core::types::Dictionary,
    router::context::RealmContext,
};

/// Router-level policies for accepting sessions into a realm.
///
/// This is the seam where authentication plugs in: the policy sees the
/// HELLO details and can refuse the session, which is answered with ABORT.
#[async_trait]
pub trait SessionPolicies<S>: Send + Sync {
    /// Validates that a session may join the realm.
    async fn authenticate(&self, context: &RealmContext<'_, S>, details: &Dictionary)
    -> Result<()>;
}

/// Default implementation of [`SessionPolicies`] that accepts every session.
#[derive(Default)]
pub struct EmptySessionPolicies {}

#[async_trait]
impl<S> SessionPolicies<S> for EmptySessionPolicies {
    async fn authenticate(&self, _: &RealmContext<'_, S>, _: &Dictionary) -> Result<()> {
        Ok(())
    }
}
