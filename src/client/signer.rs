use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use tracing::debug;
use uuid::Uuid;

use crate::client::request::ApiRequest;
use crate::error::Result;
use crate::session::SessionStore;

/// Build the outbound header set for one send attempt.
///
/// Reads the access token from the store at call time, so a retry after
/// a refresh automatically picks up the rotated token. Without a token
/// the request goes out unauthenticated and the server decides.
pub(crate) async fn sign(session: &SessionStore, req: &ApiRequest) -> Result<HeaderMap> {
    let mut headers = req.headers.clone();

    if req.body.is_some() {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    }
    headers.insert(
        "X-Request-Id",
        HeaderValue::from_str(&Uuid::new_v4().to_string())?,
    );

    match session.access_token().await {
        Some(token) => {
            let bearer = format!("Bearer {token}");
            headers.insert(AUTHORIZATION, HeaderValue::from_str(&bearer)?);
        }
        None => {
            debug!(path = %req.path, "no access token held, sending unauthenticated");
        }
    }

    Ok(headers)
}
