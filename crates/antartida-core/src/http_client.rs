use std::collections::{BTreeMap, HashMap};
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Credential applied to every provider request.
#[derive(Clone, PartialEq, Eq)]
pub enum HttpAuth {
    None,
    Header { name: String, value: String },
}

impl HttpAuth {
    /// The provider's `api_key` header.
    pub fn api_key(value: impl Into<String>) -> Self {
        Self::Header {
            name: String::from("api_key"),
            value: value.into(),
        }
    }

    pub fn apply(&self, headers: &mut BTreeMap<String, String>) {
        match self {
            Self::None => {}
            Self::Header { name, value } => {
                headers.insert(name.to_ascii_lowercase(), value.clone());
            }
        }
    }
}

// Keeps the credential out of logs and error output.
impl std::fmt::Debug for HttpAuth {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Header { name, .. } => write!(f, "Header {{ name: {name:?}, value: <redacted> }}"),
        }
    }
}

/// GET request envelope used by the two-step protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub timeout_ms: u64,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: BTreeMap::new(),
            timeout_ms: 30_000,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_auth(mut self, auth: &HttpAuth) -> Self {
        auth.apply(&mut self.headers);
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn ok_json(body: impl Into<String>) -> Self {
        Self::new(200, body)
    }

    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// Transport-level HTTP error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpError {
    message: String,
}

impl HttpError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for HttpError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for HttpError {}

/// Transport contract for provider calls.
pub trait HttpClient: Send + Sync {
    fn execute<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>>;
}

/// Production transport over reqwest.
#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    pub fn try_new() -> Result<Self, HttpError> {
        reqwest::Client::builder()
            .user_agent(concat!("antartida/", env!("CARGO_PKG_VERSION")))
            .build()
            .map(Self::with_client)
            .map_err(|error| HttpError::new(format!("cannot build http client: {error}")))
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl HttpClient for ReqwestHttpClient {
    fn execute<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
        Box::pin(async move {
            let mut builder = self
                .client
                .get(&request.url)
                .timeout(Duration::from_millis(request.timeout_ms));
            for (name, value) in &request.headers {
                builder = builder.header(name, value);
            }

            let response = builder.send().await.map_err(|e| {
                if e.is_timeout() {
                    HttpError::new(format!("request timeout: {e}"))
                } else if e.is_connect() {
                    HttpError::new(format!("connection failed: {e}"))
                } else {
                    HttpError::new(format!("request failed: {e}"))
                }
            })?;

            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .map_err(|e| HttpError::new(format!("failed to read response body: {e}")))?;

            Ok(HttpResponse { status, body })
        })
    }
}

/// Opens the session shared by every request of one `timeseries` call.
pub trait SessionFactory: Send + Sync {
    fn open_session(&self) -> Result<Arc<dyn HttpClient>, HttpError>;
}

/// Builds a fresh reqwest client (and connection pool) per session.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReqwestSessionFactory;

impl SessionFactory for ReqwestSessionFactory {
    fn open_session(&self) -> Result<Arc<dyn HttpClient>, HttpError> {
        Ok(Arc::new(ReqwestHttpClient::try_new()?))
    }
}

/// Hands out the same client for every session and counts how many were opened.
#[derive(Clone)]
pub struct SharedSessionFactory {
    client: Arc<dyn HttpClient>,
    opened: Arc<AtomicUsize>,
}

impl SharedSessionFactory {
    pub fn new(client: Arc<dyn HttpClient>) -> Self {
        Self {
            client,
            opened: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn sessions_opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

impl SessionFactory for SharedSessionFactory {
    fn open_session(&self) -> Result<Arc<dyn HttpClient>, HttpError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::clone(&self.client))
    }
}

/// Offline transport answering from a URL table and recording every request.
///
/// Unknown URLs answer `404`.
#[derive(Debug, Default)]
pub struct ScriptedHttpClient {
    routes: Mutex<HashMap<String, Result<HttpResponse, HttpError>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(self, url: impl Into<String>, response: HttpResponse) -> Self {
        self.route(url, Ok(response));
        self
    }

    pub fn with_failure(self, url: impl Into<String>, error: HttpError) -> Self {
        self.route(url, Err(error));
        self
    }

    pub fn route(&self, url: impl Into<String>, outcome: Result<HttpResponse, HttpError>) {
        self.routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url.into(), outcome);
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl HttpClient for ScriptedHttpClient {
    fn execute<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
        let outcome = self
            .routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&request.url)
            .cloned()
            .unwrap_or_else(|| Ok(HttpResponse::new(404, "no route")));
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);
        Box::pin(async move { outcome })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_key_auth_sets_lowercase_header() {
        let request =
            HttpRequest::get("https://example.test/ticket").with_auth(&HttpAuth::api_key("k-123"));

        assert_eq!(
            request.headers.get("api_key").map(String::as_str),
            Some("k-123")
        );
    }

    #[test]
    fn debug_output_redacts_credential() {
        let rendered = format!("{:?}", HttpAuth::api_key("secret-value"));
        assert!(!rendered.contains("secret-value"));
        assert!(rendered.contains("api_key"));
    }

    #[tokio::test]
    async fn scripted_client_records_requests_and_defaults_to_404() {
        let client = ScriptedHttpClient::new()
            .with_response("https://example.test/a", HttpResponse::ok_json("[]"));

        let hit = client
            .execute(HttpRequest::get("https://example.test/a"))
            .await
            .expect("routed");
        let miss = client
            .execute(HttpRequest::get("https://example.test/b"))
            .await
            .expect("fallback");

        assert!(hit.is_success());
        assert_eq!(miss.status, 404);
        assert_eq!(client.request_count(), 2);
    }

    #[test]
    fn shared_sessions_are_counted() {
        let factory = SharedSessionFactory::new(Arc::new(ScriptedHttpClient::new()));
        let _ = factory.open_session().expect("session");
        let _ = factory.open_session().expect("session");
        assert_eq!(factory.sessions_opened(), 2);
    }
}
