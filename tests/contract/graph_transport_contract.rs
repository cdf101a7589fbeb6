//! Wire contract of the Graph transport against a scripted HTTP client.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use adfetch_core::{
    AdsTransport, ApiErrorKind, BatchRequest, CreateRequest, GraphSettings, GraphTransport,
    HttpClient, HttpError, HttpFuture, HttpMethod, HttpRequest, HttpResponse, ListRequest,
    MutateRequest, ObjectRequest, QuerySpec, ResourceId, ResourceKind,
};
use serde_json::{json, Map, Value};

const TOKEN: &str = "contract-secret-token";

/// Replays scripted responses in order and records every request.
#[derive(Default)]
struct ScriptedHttp {
    responses: Mutex<VecDeque<Result<HttpResponse, HttpError>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedHttp {
    fn replying(responses: Vec<Result<HttpResponse, HttpError>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::default(),
        })
    }

    fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().expect("requests lock").clone()
    }
}

impl HttpClient for ScriptedHttp {
    fn execute<'a>(&'a self, request: HttpRequest) -> HttpFuture<'a> {
        Box::pin(async move {
            self.requests.lock().expect("requests lock").push(request);
            self.responses
                .lock()
                .expect("responses lock")
                .pop_front()
                .unwrap_or_else(|| Err(HttpError::invalid("no scripted response left")))
        })
    }
}

fn transport(http: Arc<ScriptedHttp>) -> GraphTransport {
    let settings = GraphSettings {
        base_url: String::from("https://graph.test/"),
        ..GraphSettings::new(TOKEN)
    };
    GraphTransport::new(settings, http)
}

fn id(raw: &str) -> ResourceId {
    ResourceId::parse(raw).expect("valid id")
}

fn campaigns_request(scope: &str) -> ListRequest {
    let spec = QuerySpec::new(["id", "name"]).with_param("limit", json!(100));
    ListRequest::new(ResourceKind::Campaign, id(scope), spec)
}

fn ok(body: Value) -> Result<HttpResponse, HttpError> {
    Ok(HttpResponse::ok_json(body.to_string()))
}

fn failed(status: u16, body: Value) -> Result<HttpResponse, HttpError> {
    Ok(HttpResponse::with_status(status, body.to_string()))
}

fn form_value(body: &str, name: &str) -> Option<String> {
    body.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        (key == name).then(|| urlencoding::decode(value).expect("utf-8 form value").into_owned())
    })
}

// =============================================================================
// Listing
// =============================================================================

#[tokio::test]
async fn list_sends_fields_and_params_with_bearer_auth() {
    let http = ScriptedHttp::replying(vec![ok(json!({"data": [{"id": "101", "name": "Brand"}]}))]);
    let transport = transport(http.clone());

    let records = transport
        .query(&campaigns_request("act_1"))
        .await
        .expect("list succeeds");

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].get_str("name"), Some("Brand"));

    let requests = http.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, HttpMethod::Get);
    assert_eq!(
        requests[0].url,
        "https://graph.test/v19.0/act_1/campaigns?fields=id%2Cname&limit=100"
    );
    assert_eq!(
        requests[0].headers.get("authorization").map(String::as_str),
        Some("Bearer contract-secret-token")
    );
    assert!(!requests[0].url.contains(TOKEN));
}

#[tokio::test]
async fn list_follows_paging_cursor_until_exhausted() {
    let http = ScriptedHttp::replying(vec![
        ok(json!({
            "data": [{"id": "101"}, {"id": "102"}],
            "paging": {"next": "https://graph.test/v19.0/act_1/campaigns?after=abc"}
        })),
        ok(json!({"data": [{"id": "103"}], "paging": {}})),
    ]);
    let transport = transport(http.clone());

    let records = transport
        .query(&campaigns_request("act_1"))
        .await
        .expect("list succeeds");

    let ids: Vec<&str> = records.iter().map(|record| record.id().as_str()).collect();
    assert_eq!(ids, vec!["101", "102", "103"]);
    assert_eq!(http.requests()[1].url, "https://graph.test/v19.0/act_1/campaigns?after=abc");
}

#[tokio::test]
async fn list_stops_at_page_limit() {
    let page = json!({
        "data": [{"id": "101"}],
        "paging": {"next": "https://graph.test/v19.0/act_1/campaigns?after=loop"}
    });
    let http = ScriptedHttp::replying(vec![ok(page.clone()), ok(page.clone()), ok(page)]);
    let settings = GraphSettings {
        max_pages: 2,
        ..GraphSettings::new(TOKEN)
    };
    let transport = GraphTransport::new(settings, http.clone());

    let records = transport
        .query(&campaigns_request("act_1"))
        .await
        .expect("list succeeds");

    assert_eq!(records.len(), 2);
    assert_eq!(http.requests().len(), 2);
}

// =============================================================================
// Objects and mutations
// =============================================================================

#[tokio::test]
async fn missing_object_is_reported_as_not_found() {
    let http = ScriptedHttp::replying(vec![failed(
        400,
        json!({"error": {"message": "Unsupported get request", "code": 100, "error_subcode": 33}}),
    )]);
    let transport = transport(http);
    let request = ObjectRequest {
        kind: ResourceKind::Ad,
        id: id("301"),
        fields: vec![String::from("id")],
    };

    let error = transport.get(&request).await.expect_err("object is missing");

    assert!(error.is_not_found());
    assert!(!error.retryable());
}

#[tokio::test]
async fn mutation_posts_form_and_requires_acknowledgement() {
    let http = ScriptedHttp::replying(vec![ok(json!({"success": true})), ok(json!({"success": false}))]);
    let transport = transport(http.clone());
    let mut data = Map::new();
    data.insert(String::from("status"), json!("PAUSED"));
    let request = MutateRequest {
        kind: ResourceKind::Campaign,
        id: id("101"),
        data,
    };

    transport.mutate(&request).await.expect("first update acknowledged");
    let rejected = transport.mutate(&request).await.expect_err("second update refused");

    let sent = &http.requests()[0];
    assert_eq!(sent.method, HttpMethod::Post);
    assert_eq!(sent.url, "https://graph.test/v19.0/101");
    assert_eq!(sent.body.as_deref(), Some("status=PAUSED"));
    assert_eq!(rejected.kind(), ApiErrorKind::Permanent);
}

#[tokio::test]
async fn create_posts_to_the_account_edge_and_returns_the_new_id() {
    let http = ScriptedHttp::replying(vec![
        ok(json!({"id": "120210000000001"})),
        ok(json!({"id": 120210000000002_u64})),
        ok(json!({"success": true})),
    ]);
    let transport = transport(http.clone());
    let mut data = Map::new();
    data.insert(String::from("name"), json!("Autumn sale"));
    data.insert(String::from("daily_budget"), json!(2550));
    data.insert(String::from("special_ad_categories"), json!([]));
    let request = CreateRequest {
        kind: ResourceKind::Campaign,
        account: id("act_1"),
        data,
    };

    let created = transport.create(&request).await.expect("create succeeds");
    let numeric = transport.create(&request).await.expect("numeric id accepted");
    let missing = transport.create(&request).await.expect_err("no id in response");

    assert_eq!(created, id("120210000000001"));
    assert_eq!(numeric, id("120210000000002"));
    assert_eq!(missing.kind(), ApiErrorKind::Unclassified);

    let sent = &http.requests()[0];
    assert_eq!(sent.method, HttpMethod::Post);
    assert_eq!(sent.url, "https://graph.test/v19.0/act_1/campaigns");
    let body = sent.body.as_deref().expect("form body");
    assert_eq!(form_value(body, "name").as_deref(), Some("Autumn sale"));
    assert_eq!(form_value(body, "daily_budget").as_deref(), Some("2550"));
    assert_eq!(form_value(body, "special_ad_categories").as_deref(), Some("[]"));
}

// =============================================================================
// Batching
// =============================================================================

#[tokio::test]
async fn batch_sends_named_sub_requests_and_maps_results_back() {
    let first_body = json!({"data": [{"id": "201", "campaign_id": "101"}]}).to_string();
    let second_body = json!({"error": {"message": "Permissions error", "code": 200}}).to_string();
    let http = ScriptedHttp::replying(vec![ok(json!([
        {"code": 200, "body": first_body},
        {"code": 403, "body": second_body},
        null
    ]))]);
    let transport = transport(http.clone());

    let spec = QuerySpec::new(["id", "campaign_id"]);
    let requests: Vec<BatchRequest> = ["101", "102", "103"]
        .into_iter()
        .map(|scope| {
            BatchRequest::for_scope(ListRequest::new(ResourceKind::AdGroup, id(scope), spec.clone()))
        })
        .collect();

    let results = transport.batch(&requests).await.expect("batch call succeeds");

    let listed = results["101"].as_ref().expect("first sub-request succeeds");
    assert_eq!(listed[0].id(), &id("201"));
    let forbidden = results["102"].as_ref().expect_err("second sub-request fails");
    assert_eq!(forbidden.code(), Some(200));
    assert_eq!(forbidden.kind(), ApiErrorKind::Permanent);
    let missing = results["103"].as_ref().expect_err("third sub-request timed out");
    assert_eq!(missing.kind(), ApiErrorKind::Transient);

    let sent = &http.requests()[0];
    assert_eq!(sent.method, HttpMethod::Post);
    assert_eq!(sent.url, "https://graph.test/v19.0/");
    let body = sent.body.as_deref().expect("form body");
    assert_eq!(form_value(body, "include_headers").as_deref(), Some("false"));
    let operations: Value =
        serde_json::from_str(&form_value(body, "batch").expect("batch field")).expect("batch json");
    assert_eq!(operations[0]["method"], json!("GET"));
    assert_eq!(operations[0]["name"], json!("101"));
    assert_eq!(
        operations[0]["relative_url"],
        json!("v19.0/101/adsets?fields=id%2Ccampaign_id")
    );
}

#[tokio::test]
async fn oversized_batch_is_refused_without_a_call() {
    let http = ScriptedHttp::replying(Vec::new());
    let transport = transport(http.clone());
    let requests: Vec<BatchRequest> = (0..51)
        .map(|n| {
            BatchRequest::for_scope(ListRequest::new(
                ResourceKind::Ad,
                id(&format!("{}", 200 + n)),
                QuerySpec::new(["id"]),
            ))
        })
        .collect();

    let error = transport.batch(&requests).await.expect_err("too many sub-requests");

    assert_eq!(error.kind(), ApiErrorKind::Permanent);
    assert!(http.requests().is_empty());
    assert!(transport.batch(&[]).await.expect("empty batch").is_empty());
}

// =============================================================================
// Failure classification
// =============================================================================

#[tokio::test]
async fn platform_error_codes_are_classified() {
    let mut throttled = HttpResponse::with_status(
        400,
        json!({"error": {"message": "User request limit reached", "code": 17}}).to_string(),
    );
    throttled.headers.insert(String::from("retry-after"), String::from("30"));
    let http = ScriptedHttp::replying(vec![
        Ok(throttled),
        failed(500, json!({"error": {"message": "Unknown error", "code": 2}})),
        failed(400, json!({"error": {"message": "Bad field", "code": 100, "is_transient": true}})),
        failed(502, json!("<html>bad gateway</html>")),
        Err(HttpError::interrupted("connection reset")),
    ]);
    let transport = transport(http);
    let request = campaigns_request("act_1");

    let rate_limited = transport.query(&request).await.expect_err("throttled");
    assert_eq!(rate_limited.kind(), ApiErrorKind::RateLimited);
    assert_eq!(rate_limited.retry_after(), Some(Duration::from_secs(30)));

    let transient = transport.query(&request).await.expect_err("server error");
    assert_eq!(transient.kind(), ApiErrorKind::Transient);

    let flagged = transport.query(&request).await.expect_err("flagged transient");
    assert_eq!(flagged.kind(), ApiErrorKind::Transient);

    let gateway = transport.query(&request).await.expect_err("bad gateway");
    assert!(gateway.retryable());

    let network = transport.query(&request).await.expect_err("network failure");
    assert_eq!(network.kind(), ApiErrorKind::Transient);
}

#[tokio::test]
async fn error_messages_never_carry_the_access_token() {
    let http = ScriptedHttp::replying(vec![
        failed(
            400,
            json!({"error": {"message": format!("Invalid token {TOKEN}"), "code": 190}}),
        ),
        Err(HttpError::invalid(format!("tls failure for token={TOKEN}"))),
    ]);
    let transport = transport(http);
    let request = campaigns_request("act_1");

    for _ in 0..2 {
        let error = transport.query(&request).await.expect_err("call fails");
        assert!(!error.to_string().contains(TOKEN), "{error}");
        assert!(!error.message().contains(TOKEN));
    }
    assert!(!format!("{transport:?}").contains(TOKEN));
}
