// # Publisher Trait
//
// Optional last step of a poll: ship output artifacts (for example commit
// the trip log to a repository). Publishing is best effort; the poller logs
// a failure and still reports the poll as completed.

use async_trait::async_trait;

use crate::engine::PollReport;

/// Trait for artifact publishers
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish the artifacts of a completed poll
    async fn publish(&self, report: &PollReport) -> Result<(), crate::Error>;
}

/// Publisher that does nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPublisher;

#[async_trait]
impl Publisher for NoopPublisher {
    async fn publish(&self, _report: &PollReport) -> Result<(), crate::Error> {
        Ok(())
    }
}
