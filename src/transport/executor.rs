//! Single-request execution and result classification.

use super::ApiRequest;
use crate::errors::{Result, VakSmsError};
use crate::response::VakSmsResponse;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest_middleware::ClientWithMiddleware;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use std::time::Duration;
use url::Url;

#[cfg(feature = "tracing")]
use opentelemetry::trace::Status;
#[cfg(feature = "tracing")]
use tracing::{Span, debug};
#[cfg(feature = "tracing")]
use tracing_opentelemetry::OpenTelemetrySpanExt;

/// Query parameter carrying the API key.
const API_KEY_PARAM: &str = "apiKey";

/// Builds and sends one authenticated request.
#[derive(Clone)]
pub(crate) struct Executor {
    http_client: ClientWithMiddleware,
    api_key: Option<SecretString>,
    timeout: Duration,
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Executor {
    pub fn new(
        http_client: ClientWithMiddleware,
        api_key: Option<SecretString>,
        timeout: Duration,
    ) -> Self {
        Self {
            http_client,
            api_key,
            timeout,
        }
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Fail fast when the operation needs a key and none is configured.
    pub fn check_api_key(&self, request: &ApiRequest) -> Result<()> {
        if request.requires_key && self.api_key.is_none() {
            return Err(VakSmsError::MissingApiKey {
                operation: request.operation,
            });
        }
        Ok(())
    }

    /// Operation URL without query; safe to show in errors and logs.
    fn endpoint_url(base: &Url, request: &ApiRequest) -> Result<Url> {
        base.join(request.path.trim_start_matches('/'))
            .map_err(|source| VakSmsError::InvalidBaseUrl {
                url: base.to_string(),
                source,
            })
    }

    /// Full request URL: non-null parameters plus the API key when configured.
    fn request_url(&self, endpoint: &Url, request: &ApiRequest) -> Result<Url> {
        let mut params: Vec<(&str, &str)> = request
            .params
            .iter()
            .filter_map(|(name, value)| value.as_deref().map(|v| (*name, v)))
            .collect();

        if let Some(api_key) = &self.api_key {
            params.push((API_KEY_PARAM, api_key.expose_secret()));
        }

        let mut url = endpoint.clone();
        if !params.is_empty() {
            url.set_query(Some(
                &serde_urlencoded::to_string(&params).map_err(VakSmsError::BuildRequestUrl)?,
            ));
        }
        Ok(url)
    }

    /// Send the request to `base` and classify the response.
    ///
    /// Transport failures, unreadable bodies and non-JSON bodies are
    /// connectivity errors; a truthy `error` field is a provider error.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            name = "vak_sms.request",
            skip_all,
            fields(operation = request.operation, base = %base)
        )
    )]
    pub async fn execute(&self, base: &Url, request: &ApiRequest) -> Result<Value> {
        let endpoint = Self::endpoint_url(base, request)?;
        let url = self.request_url(&endpoint, request)?;

        #[cfg(feature = "tracing")]
        debug!(endpoint = %endpoint, "Sending request");

        let response = self
            .http_client
            .get(url)
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|source| VakSmsError::HttpRequest {
                url: endpoint.clone(),
                source: without_url(source),
            })?;

        let text = response
            .text()
            .await
            .map_err(|source| VakSmsError::ReadBody {
                url: endpoint.clone(),
                source: source.without_url(),
            })?;

        let value: Value =
            serde_json::from_str(&text).map_err(|source| VakSmsError::MalformedResponse {
                url: endpoint,
                source,
            })?;

        let data = VakSmsResponse::from_value(value)
            .into_result()
            .map_err(VakSmsError::Service)?;

        #[cfg(feature = "tracing")]
        Span::current().set_status(Status::Ok);

        Ok(data)
    }
}

/// Drop the request URL from transport errors; its query carries the API key.
fn without_url(error: reqwest_middleware::Error) -> reqwest_middleware::Error {
    match error {
        reqwest_middleware::Error::Reqwest(e) => reqwest_middleware::Error::Reqwest(e.without_url()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest_middleware::ClientBuilder;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn executor(api_key: Option<&str>) -> Executor {
        let client = ClientBuilder::new(reqwest::Client::new()).build();
        Executor::new(
            client,
            api_key.map(|k| SecretString::from(k.to_string())),
            Duration::from_secs(5),
        )
    }

    fn base(server: &MockServer) -> Url {
        Url::parse(&format!("{}/", server.uri())).unwrap()
    }

    #[tokio::test]
    async fn test_execute_injects_key_and_omits_nulls() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/getCountNumber"))
            .and(query_param("apiKey", "secret"))
            .and(query_param("service", "tg"))
            .and(header("accept", "application/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"tg": 10})))
            .expect(1)
            .mount(&server)
            .await;

        let request = ApiRequest::new("getCountNumber", "/api/getCountNumber")
            .param("service", "tg")
            .opt_param("operator", None::<String>);

        let body = executor(Some("secret"))
            .execute(&base(&server), &request)
            .await
            .unwrap();
        assert_eq!(body, json!({"tg": 10}));

        let received = server.received_requests().await.unwrap();
        let query = received[0].url.query().unwrap_or_default().to_string();
        assert!(!query.contains("operator"), "null params must be omitted: {query}");
    }

    #[test]
    fn test_missing_key_fails_fast() {
        let request = ApiRequest::new("getBalance", "/api/getBalance");
        let error = executor(None).check_api_key(&request).unwrap_err();
        assert!(matches!(
            error,
            VakSmsError::MissingApiKey {
                operation: "getBalance"
            }
        ));

        let public = ApiRequest::new("getCountryList", "/api/getCountryList").public();
        assert!(executor(None).check_api_key(&public).is_ok());
    }

    #[tokio::test]
    async fn test_provider_error_is_classified() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/getBalance"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"error": "apiKeyNotFound"})),
            )
            .mount(&server)
            .await;

        let request = ApiRequest::new("getBalance", "/api/getBalance");
        let error = executor(Some("bad"))
            .execute(&base(&server), &request)
            .await
            .unwrap_err();

        assert!(error.is_provider());
        assert_eq!(error.service_message(), Some("apiKeyNotFound"));
    }

    #[tokio::test]
    async fn test_non_json_body_is_connectivity_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502).set_body_string("<html>Bad gateway</html>"))
            .mount(&server)
            .await;

        let request = ApiRequest::new("getBalance", "/api/getBalance");
        let error = executor(Some("key"))
            .execute(&base(&server), &request)
            .await
            .unwrap_err();

        assert!(error.is_connectivity());
        assert!(matches!(error, VakSmsError::MalformedResponse { .. }));
    }

    #[tokio::test]
    async fn test_errors_do_not_leak_api_key() {
        // Nothing listens on port 9 of localhost.
        let base = Url::parse("http://127.0.0.1:9/").unwrap();
        let request = ApiRequest::new("getBalance", "/api/getBalance");
        let error = executor(Some("top-secret"))
            .execute(&base, &request)
            .await
            .unwrap_err();

        assert!(error.is_connectivity());
        assert!(!error.to_string().contains("top-secret"));
    }
}
