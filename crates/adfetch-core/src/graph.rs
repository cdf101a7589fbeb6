//! [`AdsTransport`] over a Graph-style JSON HTTP API.
//!
//! Wire shape:
//!
//! - list: `GET {base}/{version}/{scope}/{edge}?fields=a,b&limit=100`, answered
//!   with `{"data": [...], "paging": {"next": "<absolute url>"}}`
//! - object: `GET {base}/{version}/{id}?fields=a,b`
//! - mutate: `POST {base}/{version}/{id}` with form fields, answered with
//!   `{"success": true}`
//! - create: `POST {base}/{version}/{account}/{edge}` with form fields, answered
//!   with `{"id": "<new id>"}`
//! - batch: `POST {base}/{version}/` with `batch=[{"method","relative_url","name"}]`,
//!   answered with an array of `{"code", "headers", "body"}` (or `null`) in
//!   request order
//! - failures: `{"error": {"code", "error_subcode", "message", "is_transient"}}`

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::api_error::{classify_status, ApiError, ApiErrorKind};
use crate::http_client::{HttpAuth, HttpClient, HttpError, HttpRequest, HttpResponse};
use crate::transport::{
    AdsTransport, BatchRequest, BatchResponse, CreateRequest, ListRequest, MutateRequest,
    ObjectRequest, TransportFuture,
};
use crate::{ResourceId, ResourceKind, ResourceRecord};

/// `code 100, subcode 33`: the object id does not exist or is not visible.
const MISSING_OBJECT_SUBCODE: i64 = 33;
const MISSING_OBJECT_CODE: i64 = 803;
/// Guard against a server that never stops returning `paging.next`.
const DEFAULT_MAX_PAGES: usize = 1_000;

/// Connection settings for [`GraphTransport`].
#[derive(Clone, PartialEq, Eq)]
pub struct GraphSettings {
    pub base_url: String,
    pub api_version: String,
    pub access_token: String,
    pub timeout_ms: u64,
    pub max_pages: usize,
}

impl std::fmt::Debug for GraphSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphSettings")
            .field("base_url", &self.base_url)
            .field("api_version", &self.api_version)
            .field("access_token", &"***")
            .field("timeout_ms", &self.timeout_ms)
            .field("max_pages", &self.max_pages)
            .finish()
    }
}

impl GraphSettings {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            base_url: String::from("https://graph.facebook.com"),
            api_version: String::from("v19.0"),
            access_token: access_token.into(),
            timeout_ms: 30_000,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }
}

/// Graph API transport.
#[derive(Clone)]
pub struct GraphTransport {
    settings: GraphSettings,
    auth: HttpAuth,
    http_client: Arc<dyn HttpClient>,
}

impl GraphTransport {
    pub fn new(settings: GraphSettings, http_client: Arc<dyn HttpClient>) -> Self {
        let auth = HttpAuth::BearerToken(settings.access_token.clone());
        Self {
            settings,
            auth,
            http_client,
        }
    }

    pub fn settings(&self) -> &GraphSettings {
        &self.settings
    }

    fn versioned_path(&self, path: &str) -> String {
        format!("{}/{}", self.settings.api_version, path)
    }

    fn absolute(&self, relative: &str) -> String {
        format!("{}/{}", self.settings.base_url.trim_end_matches('/'), relative)
    }

    fn list_relative_url(&self, request: &ListRequest) -> String {
        let path = format!("{}/{}", request.scope, request.kind.edge());
        let mut pairs = Vec::with_capacity(request.spec.params.len() + 1);
        if !request.spec.fields.is_empty() {
            pairs.push((String::from("fields"), request.spec.fields_param()));
        }
        for (name, value) in &request.spec.params {
            pairs.push((name.clone(), param_value(value)));
        }
        with_query(&self.versioned_path(&path), &pairs)
    }

    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        let request = request
            .with_auth(&self.auth)
            .with_timeout_ms(self.settings.timeout_ms);
        let url = redact_url(&request.url);
        debug!(method = ?request.method, url = %url, "graph request");

        let response = self
            .http_client
            .execute(request)
            .await
            .map_err(|error| transport_error(&error, &self.settings.access_token))?;

        if response.is_success() {
            return Ok(response);
        }

        let error = error_from_response(&response, &self.settings.access_token);
        warn!(
            status = response.status,
            kind = %error.kind(),
            code = ?error.code(),
            url = %url,
            "graph request failed"
        );
        Err(error)
    }

    async fn fetch_pages(
        &self,
        kind: ResourceKind,
        first_page: Value,
    ) -> Result<Vec<ResourceRecord>, ApiError> {
        let mut records = Vec::new();
        let mut page = first_page;
        let mut pages = 1usize;

        loop {
            let envelope: PageEnvelope = serde_json::from_value(page)
                .map_err(|e| ApiError::permanent(format!("malformed list page: {e}")))?;
            for item in envelope.data {
                let record = ResourceRecord::from_json(kind, item)
                    .map_err(|e| ApiError::permanent(format!("malformed {kind} record: {e}")))?;
                records.push(record);
            }

            let Some(next) = envelope.paging.and_then(|paging| paging.next) else {
                break;
            };
            if pages >= self.settings.max_pages {
                warn!(%kind, pages, "page limit reached; truncating list");
                break;
            }

            let response = self.send(HttpRequest::get(next)).await?;
            page = parse_json(&response.body)?;
            pages += 1;
        }

        debug!(%kind, pages, records = records.len(), "collected list pages");
        Ok(records)
    }
}

impl AdsTransport for GraphTransport {
    fn query<'a>(&'a self, request: &'a ListRequest) -> TransportFuture<'a, Vec<ResourceRecord>> {
        Box::pin(async move {
            let url = self.absolute(&self.list_relative_url(request));
            let response = self.send(HttpRequest::get(url)).await?;
            let records = self
                .fetch_pages(request.kind, parse_json(&response.body)?)
                .await?;
            info!(
                kind = %request.kind,
                scope = %request.scope,
                records = records.len(),
                "listed resources"
            );
            Ok(records)
        })
    }

    fn get<'a>(&'a self, request: &'a ObjectRequest) -> TransportFuture<'a, ResourceRecord> {
        Box::pin(async move {
            let pairs = [(String::from("fields"), request.fields.join(","))];
            let relative = with_query(&self.versioned_path(request.id.as_str()), &pairs);
            let response = self
                .send(HttpRequest::get(self.absolute(&relative)))
                .await
                .map_err(|error| {
                    if error.is_not_found() {
                        ApiError::not_found(request.id.as_str())
                    } else {
                        error
                    }
                })?;

            let body = parse_json(&response.body)?;
            let record = ResourceRecord::from_json(request.kind, body)
                .map_err(|e| ApiError::permanent(format!("malformed {} record: {e}", request.kind)))?;
            info!(kind = %request.kind, id = %request.id, "fetched resource");
            Ok(record)
        })
    }

    fn mutate<'a>(&'a self, request: &'a MutateRequest) -> TransportFuture<'a, ()> {
        Box::pin(async move {
            let url = self.absolute(&self.versioned_path(request.id.as_str()));
            let form = request
                .data
                .iter()
                .map(|(name, value)| (name.as_str(), param_value(value)));
            let response = self.send(HttpRequest::post(url).with_form(form)).await?;

            let ack: MutationAck = serde_json::from_str(&response.body)
                .map_err(|e| ApiError::unclassified(format!("unreadable mutation ack: {e}")))?;
            if !ack.success {
                return Err(ApiError::permanent(format!(
                    "platform did not acknowledge update of {} {}",
                    request.kind, request.id
                )));
            }

            info!(kind = %request.kind, id = %request.id, fields = request.data.len(), "updated resource");
            Ok(())
        })
    }

    fn create<'a>(&'a self, request: &'a CreateRequest) -> TransportFuture<'a, ResourceId> {
        Box::pin(async move {
            let path = format!("{}/{}", request.account, request.kind.edge());
            let url = self.absolute(&self.versioned_path(&path));
            let form = request
                .data
                .iter()
                .map(|(name, value)| (name.as_str(), param_value(value)));
            let response = self.send(HttpRequest::post(url).with_form(form)).await?;

            let created: CreatedObject = serde_json::from_str(&response.body)
                .map_err(|e| ApiError::unclassified(format!("unreadable create response: {e}")))?;
            let id = ResourceId::parse(&created.id).map_err(|e| {
                ApiError::unclassified(format!("platform returned an unusable id for new {}: {e}", request.kind))
            })?;

            info!(kind = %request.kind, account = %request.account, %id, "created resource");
            Ok(id)
        })
    }

    fn batch<'a>(&'a self, requests: &'a [BatchRequest]) -> TransportFuture<'a, BatchResponse> {
        Box::pin(async move {
            if requests.is_empty() {
                return Ok(HashMap::new());
            }
            if requests.len() > self.max_batch_size() {
                return Err(ApiError::permanent(format!(
                    "batch of {} exceeds the limit of {}",
                    requests.len(),
                    self.max_batch_size()
                )));
            }

            let operations: Vec<Value> = requests
                .iter()
                .map(|request| {
                    json!({
                        "method": "GET",
                        "name": request.name,
                        "relative_url": self.list_relative_url(&request.list),
                    })
                })
                .collect();
            let url = self.absolute(&self.versioned_path(""));
            let form = [
                ("batch", Value::Array(operations).to_string()),
                ("include_headers", String::from("false")),
            ];
            let response = self.send(HttpRequest::post(url).with_form(form)).await?;

            let parts: Vec<Option<BatchPart>> = serde_json::from_str(&response.body)
                .map_err(|e| ApiError::unclassified(format!("unreadable batch response: {e}")))?;

            let mut results = HashMap::with_capacity(requests.len());
            for (index, request) in requests.iter().enumerate() {
                let outcome = match parts.get(index) {
                    Some(Some(part)) => self.batch_part_records(request, part).await,
                    // a null slot means the platform timed the sub-request out
                    _ => Err(ApiError::transient(format!(
                        "batch sub-request '{}' returned no response",
                        request.name
                    ))),
                };
                results.insert(request.name.clone(), outcome);
            }

            info!(sub_requests = requests.len(), "executed batch");
            Ok(results)
        })
    }
}

impl GraphTransport {
    async fn batch_part_records(
        &self,
        request: &BatchRequest,
        part: &BatchPart,
    ) -> Result<Vec<ResourceRecord>, ApiError> {
        if !(200..300).contains(&part.code) {
            let synthetic = HttpResponse::with_status(part.code, part.body.clone().unwrap_or_default());
            return Err(error_from_response(&synthetic, &self.settings.access_token));
        }

        let body = parse_json(part.body.as_deref().unwrap_or("{}"))?;
        self.fetch_pages(request.list.kind, body).await
    }
}

#[derive(Debug, Deserialize)]
struct PageEnvelope {
    #[serde(default)]
    data: Vec<Value>,
    #[serde(default)]
    paging: Option<Paging>,
}

#[derive(Debug, Deserialize)]
struct Paging {
    #[serde(default)]
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MutationAck {
    #[serde(default)]
    success: bool,
}

#[derive(Debug, Deserialize)]
struct CreatedObject {
    #[serde(deserialize_with = "id_text")]
    id: String,
}

/// Ids arrive as strings, but some edges answer with bare numbers.
fn id_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(text) => Ok(text),
        Value::Number(number) => Ok(number.to_string()),
        other => Err(serde::de::Error::custom(format!("expected an id, found {other}"))),
    }
}

#[derive(Debug, Deserialize)]
struct BatchPart {
    code: u16,
    #[serde(default)]
    body: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: PlatformError,
}

#[derive(Debug, Deserialize)]
struct PlatformError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    error_subcode: Option<i64>,
    #[serde(default)]
    is_transient: bool,
}

fn parse_json(body: &str) -> Result<Value, ApiError> {
    serde_json::from_str(body).map_err(|e| ApiError::unclassified(format!("unreadable response body: {e}")))
}

/// Strings go out verbatim; everything else as compact JSON.
fn param_value(value: &Value) -> String {
    match value {
        Value::String(raw) => raw.clone(),
        other => other.to_string(),
    }
}

fn with_query(path: &str, pairs: &[(String, String)]) -> String {
    if pairs.is_empty() {
        return path.to_owned();
    }
    let query = pairs
        .iter()
        .map(|(name, value)| format!("{}={}", urlencoding::encode(name), urlencoding::encode(value)))
        .collect::<Vec<_>>()
        .join("&");
    format!("{path}?{query}")
}

fn transport_error(error: &HttpError, token: &str) -> ApiError {
    let message = redact_secret(&format!("graph transport error: {error}"), token);
    if error.retryable() {
        ApiError::transient(message)
    } else {
        ApiError::permanent(message)
    }
}

/// Classifies a failed response from its error envelope, falling back to the
/// HTTP status when the body is not a platform error.
pub fn error_from_response(response: &HttpResponse, token: &str) -> ApiError {
    let retry_after = response
        .header("retry-after")
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs);

    let mut error = match serde_json::from_str::<ErrorEnvelope>(&response.body) {
        Ok(envelope) => {
            let platform = envelope.error;
            let message = redact_secret(&platform.message, token);
            match platform.code {
                Some(100) if platform.error_subcode == Some(MISSING_OBJECT_SUBCODE) => {
                    ApiError::from_code(MISSING_OBJECT_CODE, message)
                }
                Some(code) => {
                    let error = ApiError::from_code(code, message);
                    if platform.is_transient && error.kind() == ApiErrorKind::Permanent {
                        ApiError::new(ApiErrorKind::Transient, error.message().to_owned())
                    } else {
                        error
                    }
                }
                None => ApiError::new(classify_status(response.status), message),
            }
        }
        Err(_) => ApiError::new(
            classify_status(response.status),
            format!("platform returned status {}", response.status),
        ),
    };

    if let Some(retry_after) = retry_after {
        error = error.with_retry_after(retry_after);
    }
    error
}

/// Replaces the `access_token` query value in a URL.
pub fn redact_url(url: &str) -> String {
    let Some((path, query)) = url.split_once('?') else {
        return url.to_owned();
    };
    let query = query
        .split('&')
        .map(|pair| match pair.split_once('=') {
            Some(("access_token", _)) => String::from("access_token=***"),
            _ => pair.to_owned(),
        })
        .collect::<Vec<_>>()
        .join("&");
    format!("{path}?{query}")
}

fn redact_secret(message: &str, secret: &str) -> String {
    if secret.is_empty() {
        return message.to_owned();
    }
    message.replace(secret, "***")
}

impl std::fmt::Debug for GraphTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphTransport")
            .field("settings", &self.settings)
            .finish()
    }
}
