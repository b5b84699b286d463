// Last.fm scrobbler implementation
// API Documentation: https://www.last.fm/api/scrobbling

use super::params::ScrobbleParams;
use super::traits::{Scrobbler, SubmissionResponse};
use anyhow::{Context, Result};
use serde_json::Value;
use std::collections::BTreeMap;

const API_URL: &str = "https://ws.audioscrobbler.com/2.0/";
const AUTH_URL: &str = "https://www.last.fm/api/auth/";

/// Signed Last.fm web service client. Calls are blocking; the async
/// `Scrobbler` methods run them on the blocking thread pool.
#[derive(Clone)]
pub struct LastFmScrobbler {
    api_key: String,
    api_secret: String,
    session_key: Option<String>,
}

impl LastFmScrobbler {
    pub fn new(api_key: String, api_secret: String) -> Self {
        Self {
            api_key,
            api_secret,
            session_key: None,
        }
    }

    pub fn with_session_key(mut self, session_key: String) -> Self {
        self.session_key = Some(session_key);
        self
    }

    /// `api_sig`: md5 over the sorted key/value pairs followed by the secret
    fn sign(&self, params: &BTreeMap<&'static str, String>) -> String {
        let mut raw = String::new();
        for (key, value) in params {
            raw.push_str(key);
            raw.push_str(value);
        }
        raw.push_str(&self.api_secret);
        format!("{:x}", md5::compute(raw))
    }

    /// Perform one signed POST and return the decoded JSON body
    pub fn call(&self, method: &str, mut params: BTreeMap<&'static str, String>) -> Result<Value> {
        params.insert("method", method.to_string());
        params.insert("api_key", self.api_key.clone());
        if let Some(session_key) = &self.session_key {
            params.insert("sk", session_key.clone());
        }
        let signature = self.sign(&params);
        params.insert("api_sig", signature);
        params.insert("format", "json".to_string());

        let response = attohttpc::post(API_URL)
            .form(&params)
            .context("Failed to encode Last.fm request")?
            .send()
            .with_context(|| format!("Failed to send {} to Last.fm", method))?;

        let status = response.status();
        let body = response.text().context("Failed to read Last.fm response")?;
        let value: Value = serde_json::from_str(&body)
            .with_context(|| format!("Last.fm returned invalid JSON ({}): {}", status, body))?;

        if let Some(code) = value.get("error") {
            let message = value
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default();
            anyhow::bail!("Last.fm API error {} on {}: {}", code, method, message);
        }
        if !status.is_success() {
            anyhow::bail!("Last.fm API error ({}): {}", status, body);
        }

        Ok(value)
    }

    /// Request an unauthorized token for the web authorization flow
    pub fn get_token(&self) -> Result<String> {
        let value = self.call("auth.getToken", BTreeMap::new())?;
        value
            .get("token")
            .and_then(Value::as_str)
            .map(str::to_string)
            .context("Last.fm response did not contain a token")
    }

    /// Page where the user grants this application access for `token`
    pub fn auth_url(&self, token: &str) -> String {
        format!("{}?api_key={}&token={}", AUTH_URL, self.api_key, token)
    }

    async fn submit(&self, method: &'static str, params: &ScrobbleParams) -> Result<Value> {
        let client = self.clone();
        let pairs = params.to_pairs();
        tokio::task::spawn_blocking(move || client.call(method, pairs))
            .await
            .context("Last.fm request task failed")?
    }
}

impl Scrobbler for LastFmScrobbler {
    async fn now_playing(&self, params: &ScrobbleParams) -> Result<SubmissionResponse> {
        let value = self
            .submit("track.updateNowPlaying", params)
            .await
            .context("Failed to update now playing on Last.fm")?;
        Ok(now_playing_response(&value))
    }

    async fn scrobble(&self, params: &ScrobbleParams) -> Result<SubmissionResponse> {
        let value = self
            .submit("track.scrobble", params)
            .await
            .context("Failed to scrobble to Last.fm")?;
        Ok(scrobble_response(&value))
    }
}

/// Last.fm encodes counters as numbers or numeric strings depending on the endpoint
fn as_count(value: &Value) -> u64 {
    match value {
        Value::Number(n) => n.as_u64().unwrap_or_default(),
        Value::String(s) => s.parse().unwrap_or_default(),
        _ => 0,
    }
}

fn ignored_message(track: &Value) -> Option<String> {
    let message = track.get("ignoredMessage")?;
    if as_count(message.get("code")?) == 0 {
        return None;
    }
    message
        .get("#text")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| Some(String::new()))
}

fn now_playing_response(value: &Value) -> SubmissionResponse {
    let message = value.get("nowplaying").and_then(ignored_message);
    SubmissionResponse {
        ignored: message.is_some(),
        message,
    }
}

fn scrobble_response(value: &Value) -> SubmissionResponse {
    let scrobbles = value.get("scrobbles");
    let ignored = scrobbles
        .and_then(|s| s.get("@attr"))
        .and_then(|attr| attr.get("ignored"))
        .map(as_count)
        .unwrap_or_default()
        > 0;
    let message = scrobbles
        .and_then(|s| s.get("scrobble"))
        .and_then(ignored_message);
    SubmissionResponse { ignored, message }
}
