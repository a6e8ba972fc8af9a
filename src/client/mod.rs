pub mod navigator;
pub mod refresh;
pub mod request;
pub(crate) mod signer;

pub use navigator::{Navigator, NullNavigator};
pub use refresh::RefreshOutcome;
pub use request::ApiRequest;

use refresh::Disposition;
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::routing::ServiceRouter;
use crate::session::SessionStore;

/// Multi-service authenticated HTTP client.
///
/// Routes each request to its backend by path prefix, signs it with the
/// current bearer token, and on the first 401 of a protected endpoint
/// refreshes the session and retries once. Callers only ever see the
/// final response or error; the refresh dance stays internal.
pub struct ApiClient {
    http: reqwest::Client,
    config: Arc<ClientConfig>,
    router: ServiceRouter,
    session: SessionStore,
    navigator: Arc<dyn Navigator>,
    // Single-flight gate: concurrent 401s queue here instead of each
    // issuing its own refresh call.
    refresh_gate: Mutex<()>,
}

impl ApiClient {
    pub fn new(config: ClientConfig, session: SessionStore) -> Result<Self> {
        Self::with_navigator(config, session, Arc::new(NullNavigator))
    }

    pub fn with_navigator(
        config: ClientConfig,
        session: SessionStore,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;
        let router = ServiceRouter::new(&config);
        Ok(Self {
            http,
            config: Arc::new(config),
            router,
            session,
            navigator,
            refresh_gate: Mutex::new(()),
        })
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn router(&self) -> &ServiceRouter {
        &self.router
    }

    /// Send one logical request, transparently recovering from an
    /// expired access token.
    ///
    /// Non-401 responses pass through regardless of status; typed
    /// helpers like [`ApiClient::get_json`] turn non-2xx into
    /// [`ClientError::Status`]. Network errors surface as
    /// [`ClientError::Transport`] with no retry.
    pub async fn execute(&self, req: ApiRequest) -> Result<Response> {
        let epoch = self.session.epoch().await;
        let response = self.send_once(&req).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        match refresh::classify(&self.config, &req) {
            Disposition::RefreshEndpoint => {
                warn!(path = %req.path, "401 from the refresh endpoint, clearing session");
                self.session.clear().await;
                Ok(response)
            }
            Disposition::Exempt => {
                debug!(path = %req.path, "401 on pre-auth endpoint, passing through");
                Ok(response)
            }
            Disposition::AlreadyRetried => {
                debug!(path = %req.path, "401 after retry, giving up");
                Ok(response)
            }
            Disposition::Eligible => self.recover(req.into_retry(), response, epoch).await,
        }
    }

    /// Refresh-and-retry path for the first 401 of a protected request.
    ///
    /// `seen_epoch` is the session epoch observed when the failed
    /// attempt was signed. If it advanced while we waited at the gate,
    /// another request already rotated (or cleared) the session and the
    /// refresh call is skipped.
    async fn recover(
        &self,
        retry: ApiRequest,
        original: Response,
        seen_epoch: u64,
    ) -> Result<Response> {
        let outcome = {
            let _gate = self.refresh_gate.lock().await;
            if self.session.epoch().await != seen_epoch {
                match self.session.access_token().await {
                    Some(token) => {
                        debug!(path = %retry.path, "session already rotated by a concurrent request");
                        RefreshOutcome::Success {
                            new_access_token: token,
                        }
                    }
                    None => RefreshOutcome::Failure {
                        reason: "session cleared while waiting for refresh".to_string(),
                    },
                }
            } else {
                refresh::exchange(&self.http, &self.config, &self.session).await
            }
        };

        match outcome {
            RefreshOutcome::Success { .. } => {
                // Re-signed at send time, so the retry picks up the
                // rotated token from the store.
                self.send_once(&retry).await
            }
            RefreshOutcome::Failure { reason } => {
                warn!(path = %retry.path, reason = %reason, "session refresh failed, forcing re-login");
                self.session.clear().await;
                let route = self.navigator.current_route();
                if !self.config.is_public_route(&route) {
                    self.navigator.goto(&self.config.sign_in_route);
                }
                Ok(original)
            }
        }
    }

    async fn send_once(&self, req: &ApiRequest) -> Result<Response> {
        let url = self.router.target_url(&req.path);
        let headers = signer::sign(&self.session, req).await?;

        let mut builder = self.http.request(req.method.clone(), &url).headers(headers);
        if let Some(body) = &req.body {
            builder = builder.json(body);
        }

        debug!(method = %req.method, url = %url, retried = req.retried, "sending request");
        Ok(builder.send().await?)
    }

    pub async fn get(&self, path: &str) -> Result<Response> {
        self.execute(ApiRequest::get(path)).await
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        decode(self.get(path).await?).await
    }

    pub async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let req = ApiRequest::post(path).json(body)?;
        decode(self.execute(req).await?).await
    }

    pub async fn put_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let req = ApiRequest::put(path).json(body)?;
        decode(self.execute(req).await?).await
    }

    pub async fn delete(&self, path: &str) -> Result<Response> {
        self.execute(ApiRequest::delete(path)).await
    }
}

/// Turn a response into typed JSON, mapping non-2xx to
/// [`ClientError::Status`] with the body text preserved.
async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(ClientError::Status {
            status: status.as_u16(),
            body,
        });
    }
    Ok(serde_json::from_str(&body)?)
}
