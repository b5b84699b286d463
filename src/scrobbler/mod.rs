// Scrobbler module
// Submission parameters and the Last.fm gateway

pub mod lastfm;
pub mod lastfm_auth;
pub mod params;
pub mod traits;

pub use params::{Normalizer, ScrobbleParams};
pub use traits::{Scrobbler, SubmissionResponse};
