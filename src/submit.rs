use std::fmt::Debug;

use async_trait::async_trait;

use crate::error::ClientError;
use crate::types::ScanReply;

/// Sends one decoded payload to whatever records attendance.
///
/// The scan gate calls this at most once per accepted decode and never
/// retries. Network failures and non-success responses both come back as
/// `Err`.
#[async_trait]
pub trait Submitter: Send + Sync + Debug {
    async fn submit(&self, payload: &str) -> Result<ScanReply, ClientError>;
}
