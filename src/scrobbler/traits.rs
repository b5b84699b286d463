// Common traits for scrobbling services

use super::params::ScrobbleParams;
use anyhow::Result;
use std::future::Future;

/// What the service said about an accepted request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmissionResponse {
    /// The service received the call but discarded it
    pub ignored: bool,
    /// Reason given for ignoring, if any
    pub message: Option<String>,
}

/// Common trait for all scrobbling services
pub trait Scrobbler: Send + Sync + 'static {
    /// Update "now playing" status
    fn now_playing(
        &self,
        params: &ScrobbleParams,
    ) -> impl Future<Output = Result<SubmissionResponse>> + Send;

    /// Submit a scrobble; `params.timestamp` carries the start of playback
    fn scrobble(
        &self,
        params: &ScrobbleParams,
    ) -> impl Future<Output = Result<SubmissionResponse>> + Send;
}
