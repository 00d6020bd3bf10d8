//! Remote service client implementation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::{ActivityChunk, Proxy, ResourceInfo, ServiceError, activity_chunks};

/// The remote operations an account workflow needs.
///
/// Every call either succeeds or fails with one of the two
/// [`ServiceError`] kinds. Implementations hold whatever session state the
/// service requires; one instance serves exactly one account.
#[async_trait]
pub trait ServiceClient: Send + Sync {
    /// Look up a resource by its external reference.
    async fn resolve_resource(&self, reference: &str) -> Result<ResourceInfo, ServiceError>;

    /// Establish a session for the account.
    async fn authenticate(&self, email: &str, password: &str) -> Result<(), ServiceError>;

    /// Join the resource, presenting the invitation when one exists.
    async fn join_resource(
        &self,
        resource_id: u64,
        invitation: Option<&str>,
    ) -> Result<(), ServiceError>;

    /// Report `duration` of activity, claiming local time at `offset_minutes`.
    async fn send_heartbeat(
        &self,
        resource_id: u64,
        offset_minutes: i32,
        duration: Duration,
    ) -> Result<(), ServiceError>;
}

#[async_trait]
impl<T: ServiceClient + ?Sized> ServiceClient for Arc<T> {
    async fn resolve_resource(&self, reference: &str) -> Result<ResourceInfo, ServiceError> {
        (**self).resolve_resource(reference).await
    }

    async fn authenticate(&self, email: &str, password: &str) -> Result<(), ServiceError> {
        (**self).authenticate(email, password).await
    }

    async fn join_resource(
        &self,
        resource_id: u64,
        invitation: Option<&str>,
    ) -> Result<(), ServiceError> {
        (**self).join_resource(resource_id, invitation).await
    }

    async fn send_heartbeat(
        &self,
        resource_id: u64,
        offset_minutes: i32,
        duration: Duration,
    ) -> Result<(), ServiceError> {
        (**self)
            .send_heartbeat(resource_id, offset_minutes, duration)
            .await
    }
}

/// JSON-over-HTTP client for the remote service.
pub struct HttpServiceClient {
    http: Client,
    api_url: String,
    device_id: String,
    session: Arc<RwLock<Option<String>>>,
}

impl HttpServiceClient {
    /// Create a client for one account, routed through its proxy if any.
    pub fn new(
        api_url: impl Into<String>,
        device_id: impl Into<String>,
        proxy: Option<&Proxy>,
    ) -> Result<Self, ServiceError> {
        let mut builder = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30));

        if let Some(proxy) = proxy {
            if let Some(addr) = proxy.http() {
                builder = builder.proxy(reqwest::Proxy::http(addr)?);
            }
            if let Some(addr) = proxy.https() {
                builder = builder.proxy(reqwest::Proxy::https(addr)?);
            }
        }

        let api_url: String = api_url.into();
        Ok(Self {
            http: builder.build()?,
            api_url: api_url.trim_end_matches('/').to_string(),
            device_id: device_id.into(),
            session: Arc::new(RwLock::new(None)),
        })
    }

    #[cfg(test)]
    fn api_url(&self) -> &str {
        &self.api_url
    }

    #[cfg(test)]
    async fn is_authenticated(&self) -> bool {
        self.session.read().await.is_some()
    }

    async fn session_id(&self) -> Result<String, ServiceError> {
        self.session
            .read()
            .await
            .clone()
            .ok_or_else(|| ServiceError::service("not authenticated"))
    }

    async fn post_authed<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<(), ServiceError> {
        let sid = self.session_id().await?;
        let url = format!("{}{}", self.api_url, path);

        let response = self
            .http
            .post(&url)
            .header("X-Device-Id", &self.device_id)
            .bearer_auth(sid)
            .json(body)
            .send()
            .await?;

        Self::check_status(response).await?;
        Ok(())
    }

    async fn handle_response<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ServiceError> {
        let response = Self::check_status(response).await?;
        let text = response.text().await?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Map a non-success response onto the failure taxonomy.
    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ServiceError> {
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ServiceError::RateLimited);
        }

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&text)
                .ok()
                .and_then(|body| body.message)
                .unwrap_or_else(|| format!("request failed ({}): {}", status, text));
            return Err(ServiceError::Service { message });
        }

        Ok(response)
    }
}

#[async_trait]
impl ServiceClient for HttpServiceClient {
    async fn resolve_resource(&self, reference: &str) -> Result<ResourceInfo, ServiceError> {
        let url = format!("{}/resources/resolve", self.api_url);

        let response = self
            .http
            .get(&url)
            .header("X-Device-Id", &self.device_id)
            .query(&[("link", reference)])
            .send()
            .await?;

        Self::handle_response(response).await
    }

    async fn authenticate(&self, email: &str, password: &str) -> Result<(), ServiceError> {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct LoginRequest<'a> {
            email: &'a str,
            password: &'a str,
            device_id: &'a str,
        }

        let url = format!("{}/auth/login", self.api_url);

        let response = self
            .http
            .post(&url)
            .header("X-Device-Id", &self.device_id)
            .json(&LoginRequest {
                email,
                password,
                device_id: &self.device_id,
            })
            .send()
            .await?;

        let login: LoginResponse = Self::handle_response(response).await?;
        debug!(email, "session established");

        *self.session.write().await = Some(login.session_id);
        Ok(())
    }

    async fn join_resource(
        &self,
        resource_id: u64,
        invitation: Option<&str>,
    ) -> Result<(), ServiceError> {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct JoinRequest<'a> {
            #[serde(skip_serializing_if = "Option::is_none")]
            invitation_id: Option<&'a str>,
        }

        self.post_authed(
            &format!("/resources/{}/join", resource_id),
            &JoinRequest {
                invitation_id: invitation,
            },
        )
        .await
    }

    async fn send_heartbeat(
        &self,
        resource_id: u64,
        offset_minutes: i32,
        duration: Duration,
    ) -> Result<(), ServiceError> {
        #[derive(Serialize)]
        struct HeartbeatRequest {
            timezone: i32,
            chunks: Vec<ActivityChunk>,
        }

        self.post_authed(
            &format!("/resources/{}/heartbeat", resource_id),
            &HeartbeatRequest {
                timezone: offset_minutes,
                chunks: activity_chunks(Utc::now(), duration),
            },
        )
        .await
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    session_id: String,
}

/// Error body returned by the service.
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn logged_in(server: &MockServer) -> HttpServiceClient {
        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "sessionId": "sid-123" })),
            )
            .mount(server)
            .await;

        let client = HttpServiceClient::new(server.uri(), "device-1", None).unwrap();
        client.authenticate("a@example.com", "hunter2").await.unwrap();
        client
    }

    #[test]
    fn test_client_trims_trailing_slash() {
        let client = HttpServiceClient::new("https://example.com/api/", "dev", None).unwrap();
        assert_eq!(client.api_url(), "https://example.com/api");
    }

    #[test]
    fn test_client_with_proxies() {
        let single = Proxy::Single("http://127.0.0.1:3128".to_string());
        assert!(HttpServiceClient::new("https://example.com", "dev", Some(&single)).is_ok());

        let per_scheme = Proxy::PerScheme {
            http: None,
            https: Some("http://127.0.0.1:3129".to_string()),
        };
        assert!(HttpServiceClient::new("https://example.com", "dev", Some(&per_scheme)).is_ok());
    }

    #[tokio::test]
    async fn test_resolve_resource() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/resources/resolve"))
            .and(query_param("link", "http://example.com/c/garden"))
            .and(header("X-Device-Id", "device-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "resourceId": 9001,
                "invitationId": "inv-7"
            })))
            .mount(&server)
            .await;

        let client = HttpServiceClient::new(server.uri(), "device-1", None).unwrap();
        let info = client
            .resolve_resource("http://example.com/c/garden")
            .await
            .unwrap();

        assert_eq!(info.resource_id, 9001);
        assert_eq!(info.invitation_id.as_deref(), Some("inv-7"));
    }

    #[tokio::test]
    async fn test_login_stores_session() {
        let server = MockServer::start().await;
        let client = logged_in(&server).await;
        assert!(client.is_authenticated().await);
    }

    #[tokio::test]
    async fn test_rate_limited_maps_to_rate_limited() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let client = HttpServiceClient::new(server.uri(), "device-1", None).unwrap();
        let err = client.authenticate("a@example.com", "pw").await.unwrap_err();

        assert_eq!(err, ServiceError::RateLimited);
        assert!(!client.is_authenticated().await);
    }

    #[tokio::test]
    async fn test_error_body_message_surfaces() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(serde_json::json!({ "message": "Invalid password." })),
            )
            .mount(&server)
            .await;

        let client = HttpServiceClient::new(server.uri(), "device-1", None).unwrap();
        let err = client.authenticate("a@example.com", "pw").await.unwrap_err();

        assert_eq!(err, ServiceError::service("Invalid password."));
    }

    #[tokio::test]
    async fn test_error_without_message_keeps_status() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/resources/resolve"))
            .respond_with(ResponseTemplate::new(503).set_body_string("upstream down"))
            .mount(&server)
            .await;

        let client = HttpServiceClient::new(server.uri(), "device-1", None).unwrap();
        let err = client.resolve_resource("ref").await.unwrap_err();

        match err {
            ServiceError::Service { message } => {
                assert!(message.contains("503"));
                assert!(message.contains("upstream down"));
            }
            other => panic!("expected Service, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_malformed_success_body_is_service_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/resources/resolve"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let client = HttpServiceClient::new(server.uri(), "device-1", None).unwrap();
        let err = client.resolve_resource("ref").await.unwrap_err();
        assert!(matches!(err, ServiceError::Service { .. }));
    }

    #[tokio::test]
    async fn test_join_requires_session() {
        let client = HttpServiceClient::new("http://127.0.0.1:9", "device-1", None).unwrap();
        let err = client.join_resource(1, None).await.unwrap_err();
        assert_eq!(err, ServiceError::service("not authenticated"));
    }

    #[tokio::test]
    async fn test_join_sends_bearer_and_invitation() {
        let server = MockServer::start().await;
        let client = logged_in(&server).await;

        Mock::given(method("POST"))
            .and(path("/resources/77/join"))
            .and(header("Authorization", "Bearer sid-123"))
            .and(body_partial_json(serde_json::json!({ "invitationId": "inv-1" })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        client.join_resource(77, Some("inv-1")).await.unwrap();
    }

    #[tokio::test]
    async fn test_heartbeat_reports_timezone() {
        let server = MockServer::start().await;
        let client = logged_in(&server).await;

        Mock::given(method("POST"))
            .and(path("/resources/77/heartbeat"))
            .and(header("Authorization", "Bearer sid-123"))
            .and(body_partial_json(serde_json::json!({ "timezone": -300 })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        client
            .send_heartbeat(77, -300, Duration::from_secs(4 * 3600))
            .await
            .unwrap();
    }
}
