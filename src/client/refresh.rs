use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::client::request::ApiRequest;
use crate::config::ClientConfig;
use crate::session::SessionStore;

/// What to do with a 401 response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Disposition {
    /// 401 from the refresh endpoint itself: fatal, never self-refresh.
    RefreshEndpoint,
    /// Pre-authentication endpoint: a legitimate credential failure,
    /// passed through untouched.
    Exempt,
    /// The one permitted retry already happened.
    AlreadyRetried,
    /// First 401 on a protected endpoint: refresh and retry.
    Eligible,
}

pub(crate) fn classify(config: &ClientConfig, req: &ApiRequest) -> Disposition {
    if config.is_refresh_endpoint(&req.path) {
        Disposition::RefreshEndpoint
    } else if config.is_exempt(&req.path) {
        Disposition::Exempt
    } else if req.retried {
        Disposition::AlreadyRetried
    } else {
        Disposition::Eligible
    }
}

/// Result of one refresh attempt.
#[derive(Debug, Clone)]
pub enum RefreshOutcome {
    Success { new_access_token: String },
    Failure { reason: String },
}

/// Refresh response envelope: `{"data":{"accessToken":"..."}}`.
#[derive(Debug, Deserialize, Default)]
struct RefreshEnvelope {
    #[serde(default)]
    data: RefreshData,
}

#[derive(Debug, Deserialize, Default)]
struct RefreshData {
    #[serde(rename = "accessToken")]
    access_token: Option<String>,
}

/// Exchange the stored refresh token for a new access token.
///
/// Goes straight to the auth base URL on a bare client, with no bearer
/// header and no 401 interception, so a dying session can never recurse
/// into another refresh. On success the rotated token is written into
/// the store before returning.
pub(crate) async fn exchange(
    http: &Client,
    config: &ClientConfig,
    session: &SessionStore,
) -> RefreshOutcome {
    let refresh_token = match session.refresh_token().await {
        Some(token) => token,
        None => {
            return RefreshOutcome::Failure {
                reason: "no refresh token held".to_string(),
            }
        }
    };

    let url = format!("{}{}", config.auth_base_url, config.refresh_endpoint);
    debug!(url = %url, "exchanging refresh token");

    let response = match http
        .post(&url)
        .json(&json!({ "refreshToken": refresh_token }))
        .send()
        .await
    {
        Ok(response) => response,
        Err(err) => {
            return RefreshOutcome::Failure {
                reason: format!("refresh call failed: {err}"),
            }
        }
    };

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        warn!(status = %status, body = %body, "refresh endpoint rejected the token");
        return RefreshOutcome::Failure {
            reason: format!("refresh endpoint returned {status}"),
        };
    }

    let envelope: RefreshEnvelope = match response.json().await {
        Ok(envelope) => envelope,
        Err(err) => {
            return RefreshOutcome::Failure {
                reason: format!("malformed refresh response: {err}"),
            }
        }
    };

    match envelope.data.access_token {
        Some(token) => {
            session.rotate_access(token.clone()).await;
            info!("session refreshed, access token rotated");
            RefreshOutcome::Success {
                new_access_token: token,
            }
        }
        None => RefreshOutcome::Failure {
            reason: "refresh response carries no access token".to_string(),
        },
    }
}
