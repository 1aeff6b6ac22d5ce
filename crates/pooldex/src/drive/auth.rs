//! OAuth2 Device Flow authorization for the Drive account.
//!
//! Implements the OAuth2 Device Authorization Grant (RFC 8628) so the tool
//! can be authorized from a terminal without a local callback server. Tokens
//! persist in the state store and refresh automatically.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::db::{token_repo, Database};

use super::error::{DriveError, Result};

/// Scopes requested for the job: manage files this tool creates, read the
/// incoming folder.
pub const DRIVE_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/drive.file",
    "https://www.googleapis.com/auth/drive.readonly",
];

const DEVICE_AUTH_URL: &str = "https://oauth2.googleapis.com/device/code";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Key under which the single credentialed identity is stored.
const TOKEN_ACCOUNT: &str = "default";

/// Tokens this close to expiry are refreshed before use.
const EXPIRY_BUFFER_SECS: u64 = 60;

/// Default connect timeout for HTTP requests (10 seconds).
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default request timeout for HTTP requests (30 seconds).
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum length for sanitized error bodies to prevent log flooding.
const MAX_ERROR_BODY_LENGTH: usize = 200;

/// Sanitizes an OAuth error response body by truncating to a reasonable
/// length. Keeps useful context out of very large (or token-bearing) bodies.
fn sanitize_oauth_error_body(body: &str) -> String {
    if body.len() > MAX_ERROR_BODY_LENGTH {
        format!("{}... (truncated)", &body[..MAX_ERROR_BODY_LENGTH])
    } else {
        body.to_string()
    }
}

/// OAuth client credentials from a Google "installed application"
/// client secrets file.
#[derive(Clone)]
pub struct ClientSecrets {
    pub client_id: String,
    client_secret: SecretString,
}

#[derive(Debug, Deserialize)]
struct ClientSecretsFile {
    #[serde(default)]
    installed: Option<ClientSecretsSection>,
}

#[derive(Debug, Deserialize)]
struct ClientSecretsSection {
    client_id: String,
    client_secret: String,
}

impl ClientSecrets {
    /// Loads client credentials from a client secrets JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| DriveError::ClientSecretsRead {
                path: path.to_path_buf(),
                source: e,
            })?;
        Self::from_json(&content)
    }

    fn from_json(content: &str) -> Result<Self> {
        let file: ClientSecretsFile = serde_json::from_str(content)
            .map_err(|e| DriveError::ClientSecretsFormat(e.to_string()))?;
        let section = file.installed.ok_or_else(|| {
            DriveError::ClientSecretsFormat(
                "missing 'installed' section; download secrets for an installed application"
                    .to_string(),
            )
        })?;

        if section.client_id.is_empty() || section.client_secret.is_empty() {
            return Err(DriveError::ClientSecretsFormat(
                "client_id and client_secret must be non-empty".to_string(),
            ));
        }

        Ok(Self {
            client_id: section.client_id,
            client_secret: SecretString::from(section.client_secret),
        })
    }
}

/// Response from the device authorization request.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceCodeResponse {
    /// The device verification code.
    pub device_code: String,

    /// The end-user verification code to display to the user.
    pub user_code: String,

    /// The verification URI where the user should enter the user_code.
    #[serde(alias = "verification_url")]
    pub verification_uri: String,

    /// Lifetime in seconds of the device_code and user_code.
    pub expires_in: u64,

    /// Minimum polling interval in seconds (default: 5).
    #[serde(default = "default_interval")]
    pub interval: u64,
}

fn default_interval() -> u64 {
    5
}

/// Response from the token endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    /// The access token.
    pub access_token: String,

    /// Lifetime in seconds of the access token.
    #[serde(default)]
    pub expires_in: Option<u64>,

    /// The refresh token (only sent on the first authorization).
    #[serde(default)]
    pub refresh_token: Option<String>,

    /// Space-separated list of granted scopes.
    #[serde(default)]
    pub scope: Option<String>,
}

/// Error response from the token endpoint during polling.
#[derive(Debug, Clone, Deserialize)]
struct TokenErrorResponse {
    error: String,

    #[serde(default)]
    error_description: Option<String>,
}

/// OAuth2 Device Flow handler for the Google endpoints.
pub struct DeviceFlowAuth {
    client: Client,
}

impl DeviceFlowAuth {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| DriveError::Auth(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    /// Step 1: Request a device code from the authorization server.
    pub async fn request_device_code(
        &self,
        secrets: &ClientSecrets,
    ) -> Result<DeviceCodeResponse> {
        let scope = DRIVE_SCOPES.join(" ");

        info!("Requesting device code for scopes: {}", scope);

        let params: Vec<(&str, &str)> = vec![
            ("client_id", &secrets.client_id),
            ("scope", &scope),
            ("access_type", "offline"),
        ];

        let response = self
            .client
            .post(DEVICE_AUTH_URL)
            .form(&params)
            .send()
            .await
            .map_err(|e| DriveError::Auth(format!("Failed to request device code: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DriveError::Auth(format!(
                "Device code request failed ({}): {}",
                status,
                sanitize_oauth_error_body(&body)
            )));
        }

        let device_code: DeviceCodeResponse = response
            .json()
            .await
            .map_err(|e| DriveError::Auth(format!("Failed to parse device code: {}", e)))?;

        Ok(device_code)
    }

    /// Step 2: Poll for the token after the user has authorized.
    ///
    /// Polls the token endpoint until the user authorizes, the code
    /// expires, or an error occurs. Honors `slow_down` per RFC 8628.
    pub async fn poll_for_token(
        &self,
        device_code: &DeviceCodeResponse,
        secrets: &ClientSecrets,
    ) -> Result<TokenResponse> {
        let deadline =
            std::time::Instant::now() + Duration::from_secs(device_code.expires_in.max(5));

        let min_interval = Duration::from_secs(1);
        let max_interval = Duration::from_secs(30);
        let mut interval = Duration::from_secs(device_code.interval).max(min_interval);

        const DEVICE_CODE_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:device_code";

        info!(
            "Polling for token authorization (expires in {}s)",
            device_code.expires_in
        );

        loop {
            if std::time::Instant::now() > deadline {
                return Err(DriveError::Auth(
                    "Device code expired before authorization".to_string(),
                ));
            }

            tokio::time::sleep(interval).await;

            let params = [
                ("client_id", secrets.client_id.as_str()),
                ("client_secret", secrets.client_secret.expose_secret()),
                ("device_code", &device_code.device_code),
                ("grant_type", DEVICE_CODE_GRANT_TYPE),
            ];

            let response = self
                .client
                .post(TOKEN_URL)
                .form(&params)
                .send()
                .await
                .map_err(|e| DriveError::Auth(format!("Token request failed: {}", e)))?;

            if response.status().is_success() {
                let token: TokenResponse = response.json().await.map_err(|e| {
                    DriveError::Auth(format!("Failed to parse token response: {}", e))
                })?;
                info!("Successfully obtained access token");
                return Ok(token);
            }

            let error: TokenErrorResponse = response.json().await.map_err(|e| {
                DriveError::Auth(format!("Failed to parse error response: {}", e))
            })?;

            match error.error.as_str() {
                "authorization_pending" => {
                    debug!("Authorization pending, continuing to poll...");
                }
                "slow_down" => {
                    // RFC 8628 section 3.5: add 5 seconds to the polling interval
                    interval += Duration::from_secs(5);
                    interval = interval.min(max_interval);
                    warn!("Server requested slow down, new interval: {:?}", interval);
                }
                "expired_token" => {
                    return Err(DriveError::Auth(
                        "Device code expired before authorization".to_string(),
                    ));
                }
                "access_denied" => {
                    return Err(DriveError::Auth(
                        "User denied the authorization request".to_string(),
                    ));
                }
                _ => {
                    return Err(DriveError::Auth(format!(
                        "Token request error: {} - {}",
                        error.error,
                        error.error_description.unwrap_or_default()
                    )));
                }
            }
        }
    }

    /// Refreshes an access token using a refresh token.
    pub async fn refresh_access_token(
        &self,
        refresh_token: &SecretString,
        secrets: &ClientSecrets,
    ) -> Result<TokenResponse> {
        info!("Refreshing access token");

        let params = [
            ("client_id", secrets.client_id.as_str()),
            ("client_secret", secrets.client_secret.expose_secret()),
            ("refresh_token", refresh_token.expose_secret()),
            ("grant_type", "refresh_token"),
        ];

        let response = self
            .client
            .post(TOKEN_URL)
            .form(&params)
            .send()
            .await
            .map_err(|e| DriveError::Auth(format!("Token refresh failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DriveError::Auth(format!(
                "Token refresh failed ({}): {}",
                status,
                sanitize_oauth_error_body(&body)
            )));
        }

        let token: TokenResponse = response.json().await.map_err(|e| {
            DriveError::Auth(format!("Failed to parse refresh response: {}", e))
        })?;

        info!("Successfully refreshed access token");
        Ok(token)
    }
}

/// Produces a valid bearer token for storage calls.
///
/// The single seam between the pipeline and whatever authorization scheme
/// backs it.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn access_token(&self) -> Result<SecretString>;
}

/// Token provider backed by the state store.
///
/// Serves the persisted access token, refreshing it through the device-flow
/// client when it nears expiry.
pub struct StoredTokenProvider {
    db: Database,
    auth: DeviceFlowAuth,
    secrets: ClientSecrets,
}

impl StoredTokenProvider {
    pub fn new(db: Database, secrets: ClientSecrets) -> Result<Self> {
        Ok(Self {
            db,
            auth: DeviceFlowAuth::new()?,
            secrets,
        })
    }

    /// Makes sure a usable authorization exists, running the interactive
    /// device flow when none is stored. Called once at startup.
    pub async fn ensure_authorized(&self) -> Result<()> {
        match token_repo::find(&self.db, TOKEN_ACCOUNT)? {
            Some(row) if !row.is_expired(EXPIRY_BUFFER_SECS) || row.can_refresh() => {
                debug!("Using stored authorization");
                Ok(())
            }
            _ => self.authorize_interactive().await,
        }
    }

    async fn authorize_interactive(&self) -> Result<()> {
        let device_code = self.auth.request_device_code(&self.secrets).await?;

        info!(
            "To authorize, visit {} and enter code {}",
            device_code.verification_uri, device_code.user_code
        );

        let token = self.auth.poll_for_token(&device_code, &self.secrets).await?;
        self.store(&token)
    }

    fn store(&self, token: &TokenResponse) -> Result<()> {
        let now = chrono::Utc::now();
        let row = token_repo::TokenRow {
            account: TOKEN_ACCOUNT.to_string(),
            access_token: token.access_token.clone(),
            refresh_token: token.refresh_token.clone(),
            expires_at: compute_expires_at(now, token.expires_in),
            scope: token.scope.clone(),
            created_at: now.to_rfc3339(),
            updated_at: now.to_rfc3339(),
        };
        token_repo::upsert(&self.db, &row)?;
        Ok(())
    }
}

/// Converts a token lifetime into an absolute RFC3339 expiry.
fn compute_expires_at(now: chrono::DateTime<chrono::Utc>, expires_in: Option<u64>) -> String {
    let secs = expires_in.unwrap_or(3600).min(365 * 24 * 3600);
    (now + chrono::Duration::seconds(secs as i64)).to_rfc3339()
}

#[async_trait]
impl TokenProvider for StoredTokenProvider {
    async fn access_token(&self) -> Result<SecretString> {
        let row = token_repo::find(&self.db, TOKEN_ACCOUNT)?.ok_or_else(|| {
            DriveError::Auth("No stored authorization; run the tool interactively once".to_string())
        })?;

        if !row.is_expired(EXPIRY_BUFFER_SECS) {
            return Ok(SecretString::from(row.access_token));
        }

        let Some(refresh_token) = row.refresh_token else {
            return Err(DriveError::Auth(
                "Access token expired and no refresh token is stored; re-authorize".to_string(),
            ));
        };

        let refresh_token = SecretString::from(refresh_token);
        let token = self
            .auth
            .refresh_access_token(&refresh_token, &self.secrets)
            .await?;
        self.store(&token)?;

        Ok(SecretString::from(token.access_token))
    }
}
