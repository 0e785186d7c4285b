use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use octocrab::Octocrab;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

use crate::config::GitHubConfig;
use crate::error::{AppError, Result};

#[derive(Debug, Serialize)]
struct JwtClaims {
    iat: i64,
    exp: i64,
    iss: String,
}

/// Generate a JWT for GitHub App authentication.
pub fn generate_app_jwt(app_id: u64, private_key_path: &Path) -> Result<String> {
    let key_pem = std::fs::read(private_key_path).map_err(|e| {
        AppError::Config(format!(
            "Failed to read private key at {}: {e}",
            private_key_path.display()
        ))
    })?;

    let encoding_key = EncodingKey::from_rsa_pem(&key_pem)
        .map_err(|e| AppError::Config(format!("Invalid RSA private key: {e}")))?;

    let now = chrono::Utc::now().timestamp();
    let claims = JwtClaims {
        iat: now - 60,      // 60 seconds in the past to account for clock drift
        exp: now + 10 * 60, // 10 minute maximum
        iss: app_id.to_string(),
    };

    let header = Header::new(Algorithm::RS256);
    encode(&header, &claims, &encoding_key)
        .map_err(|e| AppError::Config(format!("Failed to generate JWT: {e}")))
}

type CachedToken = (String, chrono::DateTime<chrono::Utc>);

/// Credentials shared by the pull-request client and the git driver.
pub enum GitHubAuth {
    /// Personal access token, used as-is.
    Token(String),
    /// GitHub App installation; tokens are minted on demand and cached.
    App {
        app_id: u64,
        private_key_path: PathBuf,
        installation_id: u64,
        cache: RwLock<Option<CachedToken>>,
    },
}

impl std::fmt::Debug for GitHubAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GitHubAuth::Token(_) => f.write_str("GitHubAuth::Token([REDACTED])"),
            GitHubAuth::App {
                app_id,
                installation_id,
                ..
            } => f
                .debug_struct("GitHubAuth::App")
                .field("app_id", app_id)
                .field("installation_id", installation_id)
                .finish(),
        }
    }
}

impl GitHubAuth {
    pub fn from_config(config: &GitHubConfig) -> Result<Self> {
        if let Some(token) = config.token.as_ref().filter(|t| !t.is_empty()) {
            return Ok(GitHubAuth::Token(token.clone()));
        }

        match (config.app_id, &config.private_key_path, config.installation_id) {
            (Some(app_id), Some(path), Some(installation_id)) => {
                // Validate the private key exists
                if !path.exists() {
                    return Err(AppError::Config(format!(
                        "GitHub App private key not found at: {}",
                        path.display()
                    )));
                }
                Ok(GitHubAuth::App {
                    app_id,
                    private_key_path: path.clone(),
                    installation_id,
                    cache: RwLock::new(None),
                })
            }
            _ => Err(AppError::Config(
                "No usable GitHub credentials configured".to_string(),
            )),
        }
    }

    /// Return a token valid for at least the next five minutes.
    pub async fn access_token(&self) -> Result<String> {
        let (app_id, private_key_path, installation_id, cache) = match self {
            GitHubAuth::Token(token) => return Ok(token.clone()),
            GitHubAuth::App {
                app_id,
                private_key_path,
                installation_id,
                cache,
            } => (*app_id, private_key_path, *installation_id, cache),
        };

        // Check cache
        {
            let cached = cache.read().await;
            if let Some((token, expiry)) = cached.as_ref() {
                if *expiry > chrono::Utc::now() + chrono::Duration::minutes(5) {
                    return Ok(token.clone());
                }
            }
        }

        // Generate new token
        let jwt = generate_app_jwt(app_id, private_key_path)?;

        let client = Octocrab::builder()
            .personal_token(jwt)
            .build()
            .map_err(|e| AppError::GitHubApi(format!("Failed to build JWT client: {e}")))?;

        let url = format!("/app/installations/{installation_id}/access_tokens");
        let response: serde_json::Value = client
            .post(&url, None::<&()>)
            .await
            .map_err(|e| AppError::GitHubApi(format!("Failed to create installation token: {e}")))?;

        let token = response["token"]
            .as_str()
            .ok_or_else(|| AppError::GitHubApi("No token in response".to_string()))?
            .to_string();

        let expires_at = response["expires_at"]
            .as_str()
            .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&chrono::Utc))
            .unwrap_or_else(|| chrono::Utc::now() + chrono::Duration::hours(1));

        tracing::debug!(installation_id, %expires_at, "Minted installation token");
        *cache.write().await = Some((token.clone(), expires_at));

        Ok(token)
    }
}
