// OAuth for installed applications, delegated to yup-oauth2: client secrets
// from the Google Cloud console file, a token cache on disk and the two
// consent flows (loopback redirect or pasted redirect URL). The
// authenticator is async, so it runs on a private current-thread runtime.

use crate::error::{DriveError, DriveResult};
use crate::settings::GoogleDriveSettings;
use dialoguer::Input;
use log::{error, info, warn};
use reqwest::Url;
use std::fs;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use tokio::runtime::{Builder, Runtime};
use yup_oauth2::authenticator::DefaultAuthenticator;
use yup_oauth2::authenticator_delegate::InstalledFlowDelegate;
use yup_oauth2::{InstalledFlowAuthenticator, InstalledFlowReturnMethod};

// The consent page sends the browser here in remote mode; nothing needs to
// listen on it, the user copies the address bar.
const PASTE_REDIRECT_URI: &str = "http://localhost";

/// Supplies bearer tokens to the Drive client.
pub trait TokenSource {
    /// A currently valid access token.
    fn token(&self) -> DriveResult<String>;

    /// A new access token, after the API rejected the last one.
    fn renew(&self) -> DriveResult<String>;
}

pub struct Authorizer {
    runtime: Runtime,
    auth: DefaultAuthenticator,
    scopes: Vec<String>,
}

impl Authorizer {
    /// Read the client secrets and build the authenticator. No network
    /// traffic happens until the first token is requested.
    pub fn new(settings: &GoogleDriveSettings, credentials: &Path) -> DriveResult<Self> {
        if !credentials.exists() {
            error!(
                "Credentials file {} not found. Download it from Google Cloud Console.",
                credentials.display()
            );
            return Err(DriveError::NotFound(credentials.to_path_buf()));
        }
        let runtime = Builder::new_current_thread().enable_all().build()?;
        let secret = runtime.block_on(yup_oauth2::read_application_secret(credentials))?;

        let (method, delegate): (_, Box<dyn InstalledFlowDelegate>) = if settings.remote {
            info!("OAuth authorization mode: remote login (paste redirected URL)");
            (InstalledFlowReturnMethod::Interactive, Box::new(PastedRedirect))
        } else {
            info!("OAuth authorization mode: local login (loopback redirect)");
            (InstalledFlowReturnMethod::HTTPRedirect, Box::new(OpenBrowser))
        };
        let mut builder = InstalledFlowAuthenticator::builder(secret, method).flow_delegate(delegate);
        if settings.save_token {
            builder = builder.persist_tokens_to_disk(settings.save_token_file.clone());
        }
        let auth = runtime.block_on(builder.build())?;

        Ok(Authorizer {
            runtime,
            auth,
            scopes: settings.oauth_scope.clone(),
        })
    }

    /// Make sure a token is available, running the consent flow if the
    /// cache has none.
    pub fn obtain(&self) -> DriveResult<()> {
        self.token()?;
        info!("OAuth authorization completed.");
        Ok(())
    }
}

impl TokenSource for Authorizer {
    fn token(&self) -> DriveResult<String> {
        let token = self.runtime.block_on(self.auth.token(self.scopes.as_slice()))?;
        access_token(token.token())
    }

    fn renew(&self) -> DriveResult<String> {
        let token = self
            .runtime
            .block_on(self.auth.force_refreshed_token(self.scopes.as_slice()))?;
        info!("Token refreshed successfully.");
        access_token(token.token())
    }
}

fn access_token(token: Option<&str>) -> DriveResult<String> {
    token
        .map(str::to_string)
        .ok_or_else(|| DriveError::Auth("token response carried no access token".into()))
}

/// Delete the cached token so the next connection asks for consent again.
/// Returns whether a file was removed.
pub fn forget_token(settings: &GoogleDriveSettings) -> DriveResult<bool> {
    let path = &settings.save_token_file;
    if !path.exists() {
        return Ok(false);
    }
    fs::remove_file(path)?;
    info!("Removed token file: {}", path.display());
    Ok(true)
}

/// Loopback flow: show the consent URL (and try a browser); yup-oauth2
/// catches the redirect itself.
struct OpenBrowser;

impl InstalledFlowDelegate for OpenBrowser {
    fn present_user_url<'a>(
        &'a self,
        url: &'a str,
        _need_code: bool,
    ) -> Pin<Box<dyn Future<Output = Result<String, String>> + Send + 'a>> {
        Box::pin(async move {
            println!("Please visit this URL to authorize this application: {url}");
            if let Err(e) = open::that(url) {
                warn!("Could not open a browser ({}), open the URL manually", e);
            }
            Ok(String::new())
        })
    }
}

/// Remote flow: the browser runs elsewhere, so the user pastes back the
/// URL the consent page redirected to.
struct PastedRedirect;

impl InstalledFlowDelegate for PastedRedirect {
    fn redirect_uri(&self) -> Option<&str> {
        Some(PASTE_REDIRECT_URI)
    }

    fn present_user_url<'a>(
        &'a self,
        url: &'a str,
        _need_code: bool,
    ) -> Pin<Box<dyn Future<Output = Result<String, String>> + Send + 'a>> {
        Box::pin(async move {
            println!("Please go to this URL to authorize the application: {url}");
            let pasted: String = Input::new()
                .with_prompt("Paste redirected URL here")
                .interact_text()
                .map_err(|e| e.to_string())?;
            code_from_redirect(pasted.trim()).map_err(|e| e.to_string())
        })
    }
}

/// Pull the `code` parameter out of the URL the consent page redirected to.
pub fn code_from_redirect(redirected: &str) -> DriveResult<String> {
    if !redirected.contains("code=") {
        if let Ok(url) = Url::parse(redirected) {
            if let Some((_, err)) = url.query_pairs().find(|(k, _)| k == "error") {
                return Err(DriveError::Auth(format!("authorization denied: {err}")));
            }
        }
        return Err(DriveError::Auth(
            "invalid redirected URL, 'code=' parameter not found".into(),
        ));
    }
    let url = Url::parse(redirected)
        .map_err(|e| DriveError::Auth(format!("invalid redirected URL: {e}")))?;
    url.query_pairs()
        .find(|(k, _)| k == "code")
        .map(|(_, v)| v.into_owned())
        .ok_or_else(|| DriveError::Auth("'code' parameter is empty".into()))
}
