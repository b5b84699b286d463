// Last.fm authentication helper
// Web token flow: fetch a token, let the user approve it in a browser,
// then trade it for a session key with rustfm-scrobble-proxy

use super::lastfm::LastFmScrobbler;
use anyhow::{Context, Result};
use rustfm_scrobble_proxy::Scrobbler;
use std::io::{self, Write};
use std::path::Path;

const API_ACCOUNT_URL: &str = "https://www.last.fm/api/account/create";

/// Interactive prompts need a terminal to answer them
fn ensure_interactive() -> Result<()> {
    if !atty::is(atty::Stream::Stdin) {
        anyhow::bail!("Interactive setup needs a terminal on stdin");
    }
    Ok(())
}

fn prompt(message: &str) -> Result<String> {
    print!("{}\n>: ", message);
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().read_line(&mut answer)?;
    Ok(answer.trim().to_string())
}

fn open_in_browser(url: &str) {
    if let Err(e) = open::that(url) {
        log::warn!("Failed to open browser: {}", e);
    }
}

/// Called right after a template config was written. Offers to open the page
/// where the user creates the API key and secret the config needs.
pub fn offer_api_account(config_path: &Path) -> Result<()> {
    ensure_interactive()?;

    let answer = prompt(&format!(
        "Saved template config at {:?}. You'll need to fill in the API key and secret. Generate these now? [yY/nN]",
        config_path
    ))?;

    if answer.eq_ignore_ascii_case("y") {
        open_in_browser(API_ACCOUNT_URL);
        println!(
            "{}\nFill in the form (details are unimportant) then add the key/secret to the config file.",
            API_ACCOUNT_URL
        );
    }

    Ok(())
}

/// Perform the complete Last.fm web authorization flow.
/// Returns the session key on success
pub fn authenticate(api_key: &str, api_secret: &str) -> Result<String> {
    ensure_interactive()?;

    let client = LastFmScrobbler::new(api_key.to_string(), api_secret.to_string());
    let token = client
        .get_token()
        .context("Couldn't get token from Last.fm")?;

    let url = client.auth_url(&token);
    open_in_browser(&url);
    prompt(&format!("{}\nAuthorize and then press Enter to continue.", url))?;

    let mut scrobbler = Scrobbler::new(api_key, api_secret);
    let session = scrobbler
        .authenticate_with_token(&token)
        .context("Couldn't login to Last.fm")?;
    log::info!("Last.fm session obtained");

    Ok(session.key)
}
