//! Calls against the auth service that populate and tear down the
//! session. Login and register are pre-authentication endpoints: a 401
//! here means bad credentials and is surfaced directly, never a
//! refresh trigger.

use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use crate::client::{ApiClient, ApiRequest};
use crate::error::{ClientError, Result};
use crate::session::Profile;

/// Auth service envelope: `{"data":{"accessToken","refreshToken","user"}}`.
#[derive(Debug, Deserialize)]
struct CredentialsEnvelope {
    data: CredentialsData,
}

#[derive(Debug, Deserialize)]
struct CredentialsData {
    #[serde(rename = "accessToken")]
    access_token: String,
    #[serde(rename = "refreshToken")]
    refresh_token: String,
    user: Profile,
}

/// Authenticate and populate the session store.
pub async fn login(client: &ApiClient, email: &str, password: &str) -> Result<Profile> {
    let envelope: CredentialsEnvelope = client
        .post_json(
            "/auth/login",
            &json!({ "email": email, "password": password }),
        )
        .await?;

    let data = envelope.data;
    client
        .session()
        .set_tokens(data.access_token, Some(data.refresh_token))
        .await;
    client.session().set_user(data.user.clone()).await;
    Ok(data.user)
}

/// Create an account; the auth service logs the new user straight in.
pub async fn register(client: &ApiClient, email: &str, password: &str, name: &str) -> Result<Profile> {
    let envelope: CredentialsEnvelope = client
        .post_json(
            "/auth/register",
            &json!({ "email": email, "password": password, "name": name }),
        )
        .await?;

    let data = envelope.data;
    client
        .session()
        .set_tokens(data.access_token, Some(data.refresh_token))
        .await;
    client.session().set_user(data.user.clone()).await;
    Ok(data.user)
}

/// Request a password reset mail. Succeeds on any 2xx.
pub async fn forgot_password(client: &ApiClient, email: &str) -> Result<()> {
    let response = client
        .execute(ApiRequest::post("/auth/forgot-password").json(&json!({ "email": email }))?)
        .await?;
    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        return Err(ClientError::Status { status, body });
    }
    Ok(())
}

/// Tell the auth service the session is over, then wipe it locally.
/// The server call is best effort; the local wipe always happens.
pub async fn logout(client: &ApiClient) -> Result<()> {
    match client.execute(ApiRequest::post("/auth/logout")).await {
        Ok(response) if !response.status().is_success() => {
            warn!(status = %response.status(), "logout call rejected, clearing session anyway");
        }
        Err(err) => {
            warn!(error = %err, "logout call failed, clearing session anyway");
        }
        Ok(_) => {}
    }
    client.session().clear().await;
    Ok(())
}
