//! The Service Client (spec.md §4.1): typed HTTP calls to one downstream
//! microservice, with retry, timeout, and error classification.
//!
//! Grounded on `lexe-api::rest::RestClient`'s shape (a `reqwest::Client`
//! wrapper carrying `from`/`to` labels, builder methods per verb, an
//! explicit retry loop over a backoff iterator) simplified to a single
//! concrete error type and parameterized to spec.md §4.1's concrete values
//! rather than the teacher's own retry defaults.

use std::time::Duration;

use bytes::Bytes;
use dlg_api_core::endpoints::Stage;
use dlg_api_core::error::{classify_reqwest_error, GatewayApiError, GatewayErrorKind};
use dlg_api_core::registry::ServiceName;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::{debug, warn};

/// Connect deadline for every outbound call (spec.md §4.1, §5).
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Read deadline for every outbound call, default and configurable per
/// service (spec.md §4.1, §5).
pub const READ_TIMEOUT: Duration = Duration::from_secs(300);

/// HTTP statuses the client retries (spec.md §4.1: "Retries: up to 3
/// attempts on transport errors and on response statuses `{429, 500, 502,
/// 503, 504}`").
fn is_retriable_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS
            | StatusCode::INTERNAL_SERVER_ERROR
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

/// A shared, connection-pooled client used for every downstream call
/// (spec.md §5: "a single connection-pool (max 10 connections per host) is
/// shared across requests process-wide").
#[derive(Clone)]
pub struct ServiceClient {
    client: reqwest::Client,
    auth_token: Option<String>,
    /// Whether the gateway is running in local-dev mode, used only to pick
    /// which of the two user-facing messages a Connection/Timeout error
    /// gets (spec.md §7: "restart the *X* service" vs "contact support").
    is_local: bool,
}

impl ServiceClient {
    pub fn new(auth_token: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(10)
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(READ_TIMEOUT)
            .build()
            .expect("reqwest::Client::builder with static config should never fail");
        Self { client, auth_token, is_local: true }
    }

    /// Sets whether [`GatewayApiError::downstream_unavailable`]'s local or
    /// production message variant is used for Connection/Timeout errors.
    pub fn with_deployment_mode(mut self, mode: dlg_api_core::registry::DeploymentMode) -> Self {
        self.is_local = mode == dlg_api_core::registry::DeploymentMode::Local;
        self
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// `PostJSON` (spec.md §4.1): `Content-Type: application/json`, JSON
    /// response expected.
    pub async fn post_json(
        &self,
        service: ServiceName,
        base_url: &str,
        stage: Stage,
        body: &Value,
    ) -> Result<Value, GatewayApiError> {
        let url = format!("{base_url}{}", stage.downstream_path());
        let bytes = self
            .send_with_retries(service, &url, stage.downstream_path(), || {
                self.authorize(self.client.post(&url).json(body))
            })
            .await?;
        serde_json::from_slice(&bytes).map_err(|e| {
            GatewayApiError::internal(format!(
                "{service} ({}) returned non-JSON body: {e}",
                stage.downstream_path()
            ))
        })
    }

    /// `PostMultipart` (spec.md §4.1): file upload alongside form fields.
    /// Grounded on `reqwest::multipart::{Form, Part}`, the standard crate
    /// for this; matches `http_client.py::post_multipart`'s `files` +
    /// `data` shape.
    pub async fn post_multipart(
        &self,
        service: ServiceName,
        base_url: &str,
        stage: Stage,
        file_field_name: &str,
        filename: &str,
        file_bytes: Bytes,
        form_fields: &[(&str, String)],
    ) -> Result<Value, GatewayApiError> {
        let url = format!("{base_url}{}", stage.downstream_path());
        let bytes = self
            .send_with_retries(service, &url, stage.downstream_path(), || {
                let part = reqwest::multipart::Part::bytes(file_bytes.to_vec())
                    .file_name(filename.to_owned());
                let mut form = reqwest::multipart::Form::new().part(file_field_name.to_owned(), part);
                for (key, value) in form_fields {
                    form = form.clone().text((*key).to_owned(), value.clone());
                }
                self.authorize(self.client.post(&url).multipart(form))
            })
            .await?;
        serde_json::from_slice(&bytes).map_err(|e| {
            GatewayApiError::internal(format!(
                "{service} ({}) returned non-JSON body: {e}",
                stage.downstream_path()
            ))
        })
    }

    /// `PostBinary` (spec.md §4.1): identical payload to `post_json`, but the
    /// caller expects raw bytes. A `Content-Type: application/json` response
    /// is re-interpreted as a JSON error object.
    pub async fn post_binary(
        &self,
        service: ServiceName,
        base_url: &str,
        stage: Stage,
        body: &Value,
    ) -> Result<Bytes, GatewayApiError> {
        let url = format!("{base_url}{}", stage.downstream_path());
        self.send_with_retries(service, &url, stage.downstream_path(), || {
            self.authorize(self.client.post(&url).json(body))
        })
        .await
    }

    /// The shared retry loop: one initial attempt, then up to
    /// [`dlg_std::backoff::SERVICE_CLIENT_MAX_RETRIES`] more attempts spaced
    /// by the backoff iterator, retrying only on transport errors or
    /// [`is_retriable_status`]. Never retries other 4xx (spec.md §4.1:
    /// "The client never retries 4xx").
    async fn send_with_retries(
        &self,
        service: ServiceName,
        endpoint: &str,
        endpoint_label: &str,
        build: impl Fn() -> reqwest::RequestBuilder,
    ) -> Result<Bytes, GatewayApiError> {
        let mut backoff = dlg_std::backoff::service_client_backoff_iter();
        loop {
            let result = build().send().await;
            match result {
                Ok(response) => {
                    let status = response.status();
                    if status == StatusCode::FORBIDDEN {
                        return Err(self.response_error(
                            service,
                            endpoint_label,
                            status,
                            response,
                            true,
                        )
                        .await);
                    }
                    if status.is_success() {
                        return Self::content_aware_bytes(service, endpoint_label, response).await;
                    }
                    if is_retriable_status(status) {
                        match backoff.next() {
                            Some(wait) => {
                                warn!(%service, endpoint = endpoint_label, %status, ?wait, "retrying downstream call");
                                tokio::time::sleep(wait).await;
                                continue;
                            }
                            None => {
                                return Err(self
                                    .response_error(service, endpoint_label, status, response, false)
                                    .await)
                            }
                        }
                    }
                    return Err(self
                        .response_error(service, endpoint_label, status, response, false)
                        .await);
                }
                Err(error) => {
                    let classified = classify_reqwest_error(&service.to_string(), endpoint, &error);
                    // Only transport (connection) failures retry; a timeout is a deadline
                    // breach, not a transient fault, and spec §7 gives TimeoutError no
                    // retry policy (unlike ConnectionError's "3x backoff").
                    let is_retriable =
                        matches!(classified.kind, GatewayErrorKind::Connection { .. });
                    if is_retriable {
                        if let Some(wait) = backoff.next() {
                            warn!(%service, endpoint = endpoint_label, ?wait, "retrying after transport error");
                            tokio::time::sleep(wait).await;
                            continue;
                        }
                    }
                    return Err(self.with_user_facing_message(service, endpoint_label, classified));
                }
            }
        }
    }

    /// Rewrites a Connection/Timeout error's message to the local-vs-
    /// production variant spec.md §7 requires ("restart the *X* service" vs
    /// "service unavailable, contact support"); leaves every other kind's
    /// message untouched.
    fn with_user_facing_message(
        &self,
        service: ServiceName,
        endpoint: &str,
        error: GatewayApiError,
    ) -> GatewayApiError {
        let is_unavailable = matches!(
            error.kind,
            GatewayErrorKind::Connection { .. } | GatewayErrorKind::Timeout { .. }
        );
        if is_unavailable {
            let msg = GatewayApiError::downstream_unavailable(
                &service.to_string(),
                endpoint,
                self.is_local,
            );
            GatewayApiError::new(error.kind, msg)
        } else {
            error
        }
    }

    async fn response_error(
        &self,
        service: ServiceName,
        endpoint: &str,
        status: StatusCode,
        response: reqwest::Response,
        is_authorization: bool,
    ) -> GatewayApiError {
        let body = response
            .text()
            .await
            .unwrap_or_default()
            .chars()
            .take(200)
            .collect::<String>();
        debug!(%service, endpoint, %status, "downstream returned an error response");
        if is_authorization {
            GatewayApiError::new(
                GatewayErrorKind::Authorization { service: service.to_string() },
                format!("{service} denied authorization calling {endpoint}"),
            )
        } else {
            GatewayApiError::new(
                GatewayErrorKind::Response {
                    service: service.to_string(),
                    status: status.as_u16(),
                    body: body.clone(),
                },
                format!("{service} ({endpoint}) responded with HTTP {status}: {body}"),
            )
        }
    }

    /// `PostBinary`'s content-type sniff (spec.md §4.1): a
    /// `Content-Type: application/json` body is re-interpreted as
    /// `{status: "error", error: ...}` and surfaced as a Response error.
    async fn content_aware_bytes(
        service: ServiceName,
        endpoint: &str,
        response: reqwest::Response,
    ) -> Result<Bytes, GatewayApiError> {
        let is_json = response
            .headers()
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("application/json"));
        let bytes = response.bytes().await.map_err(|error| {
            classify_reqwest_error(&service.to_string(), endpoint, &error)
        })?;
        if is_json {
            if let Ok(json) = serde_json::from_slice::<Value>(&bytes) {
                if json.get("status").and_then(Value::as_str) == Some("error") {
                    let msg = json
                        .get("error")
                        .and_then(Value::as_str)
                        .unwrap_or("downstream reported an error")
                        .to_owned();
                    return Err(GatewayApiError::new(
                        GatewayErrorKind::Response {
                            service: service.to_string(),
                            status: 200,
                            body: msg.clone(),
                        },
                        format!("{service} ({endpoint}) reported an error: {msg}"),
                    ));
                }
            }
        }
        Ok(bytes)
    }
}

#[cfg(test)]
mod test {
    use dlg_api_core::endpoints::Stage;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[test]
    fn retriable_statuses_match_spec() {
        assert!(is_retriable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retriable_status(StatusCode::BAD_GATEWAY));
        assert!(!is_retriable_status(StatusCode::BAD_REQUEST));
        assert!(!is_retriable_status(StatusCode::FORBIDDEN));
        assert!(!is_retriable_status(StatusCode::NOT_FOUND));
    }

    /// A persistently-failing downstream must be retried a bounded number of
    /// times (1 initial attempt + `SERVICE_CLIENT_MAX_RETRIES` retries), not
    /// forever (spec.md §4.1, §5's 3x retry budget).
    #[tokio::test]
    async fn persistent_failure_is_retried_a_bounded_number_of_times() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/calculate-direction"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let client = ServiceClient::new(None);
        let error = client
            .post_json(
                dlg_api_core::registry::ServiceName::Obstruction,
                &mock_server.uri(),
                Stage::DirectionAngle,
                &json!({}),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            error.kind,
            dlg_api_core::error::GatewayErrorKind::Response { status: 500, .. }
        ));

        let requests = mock_server.received_requests().await.unwrap();
        assert_eq!(
            requests.len(),
            1 + dlg_std::backoff::SERVICE_CLIENT_MAX_RETRIES
        );
    }
}
