//! Two-step "ticket then data" retrieval.
//!
//! The provider never answers a range query with data directly. The first GET returns a
//! small JSON ticket (`{"estado": 200, "datos": "<uri>"}`) and the second GET of `datos`
//! returns the readings. [`AemetTwoStep`] speaks that protocol over the session carried by a
//! [`FetchContext`]. [`MemoizedTwoStep`] wraps any [`TwoStepFetch`] with a process-lifetime
//! memo keyed by ticket URI.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::Deserialize;
use uuid::Uuid;

use crate::http_client::{HttpAuth, HttpClient, HttpRequest};
use crate::throttling::RequestThrottle;
use crate::{DateWindow, FetchError, UtcDateTime, WeatherPoint};

/// Ticket endpoint of the provider's Antarctic dataset.
pub const DEFAULT_TICKET_URI_TEMPLATE: &str = "https://opendata.aemet.es/opendata/api/antartida/datos/fechaini/{date0}/fechafin/{dateF}/estacion/{station}";

/// Boxed future returned by [`TwoStepFetch::fetch`].
pub type FetchFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Vec<WeatherPoint>, FetchError>> + Send + 'a>>;

/// Per-call request state: one session, the credential and a correlation id.
#[derive(Clone)]
pub struct FetchContext {
    session: Arc<dyn HttpClient>,
    auth: HttpAuth,
    request_id: Uuid,
}

impl FetchContext {
    pub fn new(session: Arc<dyn HttpClient>, auth: HttpAuth) -> Self {
        Self {
            session,
            auth,
            request_id: Uuid::new_v4(),
        }
    }

    pub fn session(&self) -> &dyn HttpClient {
        self.session.as_ref()
    }

    pub fn auth(&self) -> &HttpAuth {
        &self.auth
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }
}

/// One window's worth of provider retrieval.
pub trait TwoStepFetch: Send + Sync {
    /// URI of the ticket request for `window` at the provider station `station_id`.
    fn ticket_uri(&self, window: &DateWindow, station_id: &str) -> String;

    fn fetch<'a>(
        &'a self,
        ctx: &'a FetchContext,
        window: DateWindow,
        station_id: &'a str,
    ) -> FetchFuture<'a>;
}

impl<T: TwoStepFetch + ?Sized> TwoStepFetch for Arc<T> {
    fn ticket_uri(&self, window: &DateWindow, station_id: &str) -> String {
        (**self).ticket_uri(window, station_id)
    }

    fn fetch<'a>(
        &'a self,
        ctx: &'a FetchContext,
        window: DateWindow,
        station_id: &'a str,
    ) -> FetchFuture<'a> {
        (**self).fetch(ctx, window, station_id)
    }
}

#[derive(Debug, Deserialize)]
struct TicketBody {
    estado: i64,
    #[serde(default)]
    datos: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawReading {
    #[serde(rename = "fhora", alias = "timestamp")]
    timestamp: String,
    #[serde(default, rename = "temp", alias = "temperature")]
    temperature: Option<f64>,
    #[serde(default, rename = "pres", alias = "pressure")]
    pressure: Option<f64>,
    #[serde(default, rename = "vel", alias = "wind_speed")]
    wind_speed: Option<f64>,
}

impl RawReading {
    fn into_point(self, uri: &str) -> Result<WeatherPoint, FetchError> {
        let timestamp =
            UtcDateTime::parse_lenient(&self.timestamp).map_err(|error| FetchError::Payload {
                uri: uri.to_owned(),
                message: error.to_string(),
            })?;
        Ok(WeatherPoint::new(
            timestamp,
            self.temperature.unwrap_or(f64::NAN),
            self.pressure.unwrap_or(f64::NAN),
            self.wind_speed.unwrap_or(f64::NAN),
        ))
    }
}

/// Parse a data payload into points. Unknown fields are ignored, missing readings are NaN.
pub fn parse_readings(uri: &str, body: &str) -> Result<Vec<WeatherPoint>, FetchError> {
    let raw: Vec<RawReading> = serde_json::from_str(body).map_err(|error| FetchError::Payload {
        uri: uri.to_owned(),
        message: error.to_string(),
    })?;
    raw.into_iter().map(|reading| reading.into_point(uri)).collect()
}

/// The provider's ticket/data protocol.
#[derive(Debug, Clone)]
pub struct AemetTwoStep {
    uri_template: String,
    timeout_ms: u64,
    throttle: Option<RequestThrottle>,
}

impl Default for AemetTwoStep {
    fn default() -> Self {
        Self {
            uri_template: DEFAULT_TICKET_URI_TEMPLATE.to_owned(),
            timeout_ms: 30_000,
            throttle: None,
        }
    }
}

impl AemetTwoStep {
    pub fn new() -> Self {
        Self::default()
    }

    /// Template with `{date0}`, `{dateF}` and `{station}` placeholders.
    pub fn with_uri_template(mut self, template: impl Into<String>) -> Self {
        self.uri_template = template.into();
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_throttle(mut self, throttle: RequestThrottle) -> Self {
        self.throttle = Some(throttle);
        self
    }

    async fn get(&self, ctx: &FetchContext, uri: &str) -> Result<(u16, String), FetchError> {
        if let Some(throttle) = &self.throttle {
            throttle.acquire().await;
        }

        let request = HttpRequest::get(uri)
            .with_auth(ctx.auth())
            .with_timeout_ms(self.timeout_ms);
        let response = ctx
            .session()
            .execute(request)
            .await
            .map_err(|source| FetchError::Transport {
                uri: uri.to_owned(),
                source,
            })?;

        let status = response.status;
        if response.is_success() {
            Ok((status, response.body))
        } else {
            Err(FetchError::Data {
                uri: uri.to_owned(),
                status,
                body: response.body,
            })
        }
    }

    async fn fetch_ticket(&self, ctx: &FetchContext, uri: &str) -> Result<String, FetchError> {
        let (status, body) = self.get(ctx, uri).await.map_err(|error| match error {
            FetchError::Data { uri, status, body } => FetchError::Ticket { uri, status, body },
            other => other,
        })?;

        let ticket: TicketBody =
            serde_json::from_str(&body).map_err(|error| FetchError::Payload {
                uri: uri.to_owned(),
                message: error.to_string(),
            })?;

        if ticket.estado != 200 {
            return Err(FetchError::Ticket {
                uri: uri.to_owned(),
                status: u16::try_from(ticket.estado).unwrap_or(status),
                body,
            });
        }

        ticket.datos.ok_or_else(|| FetchError::Payload {
            uri: uri.to_owned(),
            message: String::from("ticket has no 'datos' uri"),
        })
    }
}

impl TwoStepFetch for AemetTwoStep {
    fn ticket_uri(&self, window: &DateWindow, station_id: &str) -> String {
        self.uri_template
            .replace("{date0}", &window.start.format_provider())
            .replace("{dateF}", &window.end.format_provider())
            .replace("{station}", &urlencoding::encode(station_id))
    }

    fn fetch<'a>(
        &'a self,
        ctx: &'a FetchContext,
        window: DateWindow,
        station_id: &'a str,
    ) -> FetchFuture<'a> {
        Box::pin(async move {
            let ticket_uri = self.ticket_uri(&window, station_id);
            tracing::debug!(request_id = %ctx.request_id(), uri = %ticket_uri, "requesting ticket");
            let data_uri = self.fetch_ticket(ctx, &ticket_uri).await?;

            tracing::debug!(request_id = %ctx.request_id(), uri = %data_uri, "requesting data");
            let (_, body) = self.get(ctx, &data_uri).await?;
            let points = parse_readings(&data_uri, &body)?;

            tracing::debug!(
                request_id = %ctx.request_id(),
                station = station_id,
                window = %window,
                points = points.len(),
                "window fetched"
            );
            Ok(points)
        })
    }
}

/// Memoizes successful fetches by ticket URI for the lifetime of the value.
#[derive(Clone)]
pub struct MemoizedTwoStep<P> {
    inner: P,
    memo: Arc<tokio::sync::RwLock<HashMap<String, Arc<Vec<WeatherPoint>>>>>,
}

impl<P: TwoStepFetch> MemoizedTwoStep<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            memo: Arc::new(tokio::sync::RwLock::new(HashMap::new())),
        }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    /// Number of memoized ticket URIs.
    pub async fn len(&self) -> usize {
        self.memo.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.memo.read().await.is_empty()
    }

    pub async fn clear(&self) {
        self.memo.write().await.clear();
    }
}

impl<P: TwoStepFetch> TwoStepFetch for MemoizedTwoStep<P> {
    fn ticket_uri(&self, window: &DateWindow, station_id: &str) -> String {
        self.inner.ticket_uri(window, station_id)
    }

    fn fetch<'a>(
        &'a self,
        ctx: &'a FetchContext,
        window: DateWindow,
        station_id: &'a str,
    ) -> FetchFuture<'a> {
        Box::pin(async move {
            let key = self.inner.ticket_uri(&window, station_id);
            if let Some(points) = self.memo.read().await.get(&key) {
                tracing::debug!(uri = %key, "memoized window reused");
                return Ok(points.as_ref().clone());
            }

            let points = self.inner.fetch(ctx, window, station_id).await?;
            self.memo
                .write()
                .await
                .insert(key, Arc::new(points.clone()));
            Ok(points)
        })
    }
}
