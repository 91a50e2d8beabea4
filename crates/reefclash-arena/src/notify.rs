//! Outbound promotion notification port
//!
//! Queue promotions are surfaced through an explicit port instead of a
//! fire-and-forget log line. Delivery is best-effort; a failed or missing
//! notification never fails the admission path, and clients still learn
//! their state by polling `status`.

use async_trait::async_trait;
use tracing::info;

use reefclash_types::ActiveMembership;

/// Receives a callback for every queue-head promotion.
#[async_trait]
pub trait PromotionNotifier: Send + Sync {
    async fn queue_promoted(&self, membership: &ActiveMembership);
}

/// Discards promotions.
pub struct NoopNotifier;

#[async_trait]
impl PromotionNotifier for NoopNotifier {
    async fn queue_promoted(&self, _membership: &ActiveMembership) {}
}

/// Logs promotions.
pub struct TracingNotifier;

#[async_trait]
impl PromotionNotifier for TracingNotifier {
    async fn queue_promoted(&self, membership: &ActiveMembership) {
        info!(
            user = %membership.user_id,
            fighter = %membership.fighter_id,
            "queue promotion delivered"
        );
    }
}
