//! A scriptable stand-in for the platform.
//!
//! Serves the service login, API key, project/jobs endpoints and a Consul
//! catalog lookup from one axum router, and records what clients sent so
//! tests can assert on it.
//!
//! ```rust,no_run
//! # async fn run() -> std::io::Result<()> {
//! let mock = mock_hopsworks::MockHopsworks::new("airflow@hopsworks.ai", "secret");
//! let addr = mock.clone().spawn().await?;
//! println!("platform at http://{addr}");
//! # Ok(())
//! # }
//! ```

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};

use axum::{
    extract::{Form, Path, Query, State},
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE, COOKIE, SET_COOKIE},
        HeaderMap, HeaderName, HeaderValue, StatusCode,
    },
    response::{AppendHeaders, IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use rand::{distributions::Alphanumeric, Rng};
use serde_json::{json, Value};

/// Session cookie set on login, scoped to the API path.
pub const SESSION_COOKIE: &str = "JSESSIONID=mock-session-7f3a";
/// Load balancer cookie set on login, scoped to `/`.
pub const SERVER_COOKIE: &str = "SERVERID=node-1";
/// Bearer token echoed in the login response's `Authorization` header.
pub const BEARER_TOKEN: &str = "Bearer mock.jwt.token";

/// What a client sent to the API key endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyRequest {
    /// `name` query parameter.
    pub name: Option<String>,
    /// `scope` query parameter.
    pub scope: Option<String>,
    /// `Cookie` header.
    pub cookie: Option<String>,
    /// `Authorization` header.
    pub authorization: Option<String>,
    /// `Content-Type` header.
    pub content_type: Option<String>,
}

/// A job launch received by the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Launch {
    /// Execution id handed back.
    pub id: i64,
    /// Project id from the path.
    pub project: i64,
    /// Job name from the path.
    pub job: String,
    /// Request body, i.e. the job arguments.
    pub args: String,
}

#[derive(Debug, Clone)]
struct CatalogService {
    name: String,
    port: u16,
    tags: Vec<String>,
}

#[derive(Debug)]
struct Inner {
    email: String,
    password: String,
    login_status: Option<StatusCode>,
    send_authorization: bool,
    extra_cookies: Vec<Vec<u8>>,
    key_status: Option<StatusCode>,
    key_response: Option<Value>,
    services: Vec<CatalogService>,
    projects: Vec<(i64, String)>,
    accepted_keys: Vec<String>,
    states: VecDeque<(String, String)>,
    failing_job_calls: u32,

    login_calls: u32,
    key_requests: Vec<KeyRequest>,
    issued_keys: Vec<String>,
    job_calls: u32,
    launches: Vec<Launch>,
}

/// Shared mock state. Clones share the same state.
#[derive(Debug, Clone)]
pub struct MockHopsworks {
    inner: Arc<Mutex<Inner>>,
}

impl MockHopsworks {
    /// A platform that accepts exactly `email`/`password`.
    pub fn new(email: &str, password: &str) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                email: email.to_string(),
                password: password.to_string(),
                login_status: None,
                send_authorization: true,
                extra_cookies: Vec::new(),
                key_status: None,
                key_response: None,
                services: Vec::new(),
                projects: Vec::new(),
                accepted_keys: Vec::new(),
                states: VecDeque::from([("FINISHED".to_string(), "SUCCEEDED".to_string())]),
                failing_job_calls: 0,
                login_calls: 0,
                key_requests: Vec::new(),
                issued_keys: Vec::new(),
                job_calls: 0,
                launches: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }

    // ── Scripting ───────────────────────────────────────────────

    /// Answer every login with `status`, whatever the credentials.
    pub fn reject_logins(self, status: StatusCode) -> Self {
        self.lock().login_status = Some(status);
        self
    }

    /// Leave the `Authorization` header out of login responses.
    pub fn without_authorization_header(self) -> Self {
        self.lock().send_authorization = false;
        self
    }

    /// Send one more `Set-Cookie` header on login, byte for byte.
    pub fn extra_set_cookie(self, raw: &[u8]) -> Self {
        self.lock().extra_cookies.push(raw.to_vec());
        self
    }

    /// Answer authenticated key requests with `status` and an error body.
    pub fn reject_key_requests(self, status: StatusCode) -> Self {
        self.lock().key_status = Some(status);
        self
    }

    /// Answer authenticated key requests with this exact JSON body.
    pub fn key_response(self, body: Value) -> Self {
        self.lock().key_response = Some(body);
        self
    }

    /// Register a catalog entry served under `/v1/catalog/service/{name}`.
    pub fn register_service(self, name: &str, port: u16, tags: &[&str]) -> Self {
        self.lock().services.push(CatalogService {
            name: name.to_string(),
            port,
            tags: tags.iter().map(|t| (*t).to_string()).collect(),
        });
        self
    }

    /// Add a project.
    pub fn project(self, id: i64, name: &str) -> Self {
        self.lock().projects.push((id, name.to_string()));
        self
    }

    /// Accept `key` on the jobs endpoints in addition to issued keys.
    pub fn accept_api_key(self, key: &str) -> Self {
        self.lock().accepted_keys.push(key.to_string());
        self
    }

    /// States returned by successive execution polls, by id or latest; the
    /// last one repeats.
    pub fn execution_states(self, states: &[(&str, &str)]) -> Self {
        self.lock().states = states
            .iter()
            .map(|(s, f)| ((*s).to_string(), (*f).to_string()))
            .collect();
        self
    }

    /// Fail the next `n` jobs calls with `503`.
    pub fn fail_next_job_calls(self, n: u32) -> Self {
        self.lock().failing_job_calls = n;
        self
    }

    // ── Inspection ──────────────────────────────────────────────

    /// Number of login attempts received.
    pub fn login_calls(&self) -> u32 {
        self.lock().login_calls
    }

    /// Number of key requests received.
    pub fn api_key_calls(&self) -> usize {
        self.lock().key_requests.len()
    }

    /// The most recent key request.
    pub fn last_key_request(&self) -> Option<KeyRequest> {
        self.lock().key_requests.last().cloned()
    }

    /// Every key handed out, in order.
    pub fn issued_keys(&self) -> Vec<String> {
        self.lock().issued_keys.clone()
    }

    /// Number of jobs calls received, failed ones included.
    pub fn job_calls(&self) -> u32 {
        self.lock().job_calls
    }

    /// Every job launch received.
    pub fn launches(&self) -> Vec<Launch> {
        self.lock().launches.clone()
    }

    // ── Serving ─────────────────────────────────────────────────

    /// The axum router serving all endpoints.
    pub fn router(self) -> Router {
        Router::new()
            .route("/hopsworks-api/api/auth/service", post(login))
            .route("/hopsworks-api/api/users/apiKey", post(create_api_key))
            .route("/v1/catalog/service/{name}", get(catalog))
            .route(
                "/hopsworks-api/api/project/getProjectInfo/{name}",
                get(project_by_name),
            )
            .route("/hopsworks-api/api/project/{id}", get(project_by_id))
            .route(
                "/hopsworks-api/api/project/{id}/jobs/{job}/executions",
                post(launch).get(last_execution),
            )
            .route(
                "/hopsworks-api/api/project/{id}/jobs/{job}/executions/{eid}",
                get(execution),
            )
            .with_state(self)
    }

    /// Serve on an ephemeral loopback port in the background.
    pub async fn spawn(self) -> std::io::Result<SocketAddr> {
        self.spawn_on("127.0.0.1:0").await
    }

    /// Serve on `addr` in the background.
    pub async fn spawn_on(self, addr: &str) -> std::io::Result<SocketAddr> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        let local = listener.local_addr()?;
        let app = self.router();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Ok(local)
    }
}

fn header(headers: &HeaderMap, name: HeaderName) -> Option<String> {
    headers
        .get(name)
        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
}

fn error_body(status: StatusCode, msg: &str) -> Response {
    (
        status,
        Json(json!({ "errorCode": status.as_u16(), "usrMsg": msg })),
    )
        .into_response()
}

// --- Authentication ---

async fn login(
    State(mock): State<MockHopsworks>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let mut inner = mock.lock();
    inner.login_calls += 1;

    if let Some(status) = inner.login_status {
        return error_body(status, "login rejected");
    }
    let ok = form.get("email") == Some(&inner.email) && form.get("password") == Some(&inner.password);
    if !ok {
        return error_body(StatusCode::UNAUTHORIZED, "Incorrect email or password.");
    }

    let mut headers = vec![
        (
            SET_COOKIE,
            HeaderValue::from_str(&format!("{SESSION_COOKIE}; Path=/hopsworks-api; HttpOnly")).unwrap(),
        ),
        (SET_COOKIE, HeaderValue::from_str(&format!("{SERVER_COOKIE}; Path=/")).unwrap()),
    ];
    for raw in &inner.extra_cookies {
        headers.push((SET_COOKIE, HeaderValue::from_bytes(raw).unwrap()));
    }
    if inner.send_authorization {
        headers.push((AUTHORIZATION, HeaderValue::from_static(BEARER_TOKEN)));
    }
    (
        StatusCode::OK,
        AppendHeaders(headers),
        Json(json!({ "sessionID": "mock-session-7f3a" })),
    )
        .into_response()
}

async fn create_api_key(
    State(mock): State<MockHopsworks>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let mut inner = mock.lock();
    let request = KeyRequest {
        name: params.get("name").cloned(),
        scope: params.get("scope").cloned(),
        cookie: header(&headers, COOKIE),
        authorization: header(&headers, AUTHORIZATION),
        content_type: header(&headers, CONTENT_TYPE),
    };
    inner.key_requests.push(request.clone());

    let has_session = request
        .cookie
        .as_deref()
        .is_some_and(|c| c.split("; ").any(|pair| pair == SESSION_COOKIE));
    let has_token = !inner.send_authorization || request.authorization.as_deref() == Some(BEARER_TOKEN);
    if !has_session || !has_token {
        return error_body(StatusCode::UNAUTHORIZED, "Not authenticated.");
    }

    if let Some(status) = inner.key_status {
        return error_body(status, "API key could not be created.");
    }
    if let Some(body) = inner.key_response.clone() {
        return (StatusCode::CREATED, Json(body)).into_response();
    }

    let secret: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect();
    let key = format!("{}.{}", &secret[..8], &secret[8..]);
    inner.issued_keys.push(key.clone());

    (
        StatusCode::CREATED,
        Json(json!({
            "key": key,
            "name": request.name,
            "prefix": &secret[..8],
            "scope": [request.scope],
        })),
    )
        .into_response()
}

// --- Consul ---

async fn catalog(
    State(mock): State<MockHopsworks>,
    Path(name): Path<String>,
    Query(params): Query<Vec<(String, String)>>,
) -> Json<Value> {
    let wanted: Vec<&str> = params
        .iter()
        .filter(|(k, _)| k == "tag")
        .map(|(_, v)| v.as_str())
        .collect();

    let inner = mock.lock();
    let entries: Vec<Value> = inner
        .services
        .iter()
        .filter(|s| s.name == name && wanted.iter().all(|t| s.tags.iter().any(|st| st == t)))
        .map(|s| {
            json!({
                "ServiceName": s.name,
                "ServiceAddress": "127.0.0.1",
                "ServicePort": s.port,
                "ServiceTags": s.tags,
            })
        })
        .collect();
    Json(Value::Array(entries))
}

// --- Jobs ---

/// Counts the call, applies scripted failures and checks the API key.
fn authorize_job_call(inner: &mut Inner, headers: &HeaderMap) -> Result<(), Response> {
    inner.job_calls += 1;
    if inner.failing_job_calls > 0 {
        inner.failing_job_calls -= 1;
        return Err(error_body(StatusCode::SERVICE_UNAVAILABLE, "Service unavailable."));
    }
    let key = header(headers, AUTHORIZATION)
        .and_then(|h| h.strip_prefix("ApiKey ").map(String::from));
    match key {
        Some(k) if inner.issued_keys.contains(&k) || inner.accepted_keys.contains(&k) => Ok(()),
        _ => Err(error_body(StatusCode::UNAUTHORIZED, "Invalid API key.")),
    }
}

fn project_json(id: i64, name: &str) -> Value {
    json!({ "projectId": id, "projectName": name, "owner": "airflow" })
}

async fn project_by_name(
    State(mock): State<MockHopsworks>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> Response {
    let mut inner = mock.lock();
    if let Err(res) = authorize_job_call(&mut inner, &headers) {
        return res;
    }
    match inner.projects.iter().find(|(_, n)| *n == name) {
        Some((id, n)) => Json(project_json(*id, n)).into_response(),
        None => error_body(StatusCode::NOT_FOUND, "Project wasn't found."),
    }
}

async fn project_by_id(
    State(mock): State<MockHopsworks>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Response {
    let mut inner = mock.lock();
    if let Err(res) = authorize_job_call(&mut inner, &headers) {
        return res;
    }
    match inner.projects.iter().find(|(pid, _)| *pid == id) {
        Some((pid, n)) => Json(project_json(*pid, n)).into_response(),
        None => error_body(StatusCode::NOT_FOUND, "Project wasn't found."),
    }
}

async fn launch(
    State(mock): State<MockHopsworks>,
    Path((project, job)): Path<(i64, String)>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let mut inner = mock.lock();
    if let Err(res) = authorize_job_call(&mut inner, &headers) {
        return res;
    }
    let id = 1000 + i64::try_from(inner.launches.len()).unwrap();
    inner.launches.push(Launch {
        id,
        project,
        job,
        args: body,
    });
    (StatusCode::CREATED, Json(json!({ "id": id }))).into_response()
}

/// The execution at the head of the state script.
fn execution_json(inner: &Inner, id: i64) -> Value {
    let (state, final_status) = inner.states.front().cloned().unwrap_or_default();
    json!({ "id": id, "state": state, "finalStatus": final_status })
}

fn advance_states(inner: &mut Inner) {
    if inner.states.len() > 1 {
        inner.states.pop_front();
    }
}

async fn execution(
    State(mock): State<MockHopsworks>,
    Path((_project, _job, eid)): Path<(i64, String, i64)>,
    headers: HeaderMap,
) -> Response {
    let mut inner = mock.lock();
    if let Err(res) = authorize_job_call(&mut inner, &headers) {
        return res;
    }
    let body = execution_json(&inner, eid);
    advance_states(&mut inner);
    Json(body).into_response()
}

async fn last_execution(
    State(mock): State<MockHopsworks>,
    Path((project, job)): Path<(i64, String)>,
    headers: HeaderMap,
) -> Response {
    let mut inner = mock.lock();
    if let Err(res) = authorize_job_call(&mut inner, &headers) {
        return res;
    }
    let latest = inner
        .launches
        .iter()
        .rev()
        .find(|l| l.project == project && l.job == job)
        .map(|l| l.id);
    let items: Vec<Value> = latest
        .map(|id| execution_json(&inner, id))
        .into_iter()
        .collect();
    if !items.is_empty() {
        advance_states(&mut inner);
    }
    Json(json!({ "count": items.len(), "items": items })).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum_test::TestServer;

    fn server(mock: MockHopsworks) -> TestServer {
        TestServer::new(mock.router()).unwrap()
    }

    fn creds() -> [(&'static str, &'static str); 2] {
        [("email", "a@b"), ("password", "pw")]
    }

    #[tokio::test]
    async fn login_sets_two_cookies_and_token() {
        let server = server(MockHopsworks::new("a@b", "pw"));
        let res = server.post("/hopsworks-api/api/auth/service").form(&creds()).await;
        res.assert_status_ok();
        let cookies: Vec<_> = res.headers().get_all(SET_COOKIE).iter().collect();
        assert_eq!(cookies.len(), 2);
        assert_eq!(
            res.headers().get(AUTHORIZATION).unwrap().to_str().unwrap(),
            BEARER_TOKEN
        );
    }

    #[tokio::test]
    async fn extra_cookie_is_sent_verbatim() {
        let server = server(MockHopsworks::new("a@b", "pw").extra_set_cookie(b"LANG=caf\xe9; Path=/"));
        let res = server.post("/hopsworks-api/api/auth/service").form(&creds()).await;
        let cookies: Vec<_> = res.headers().get_all(SET_COOKIE).iter().collect();
        assert_eq!(cookies.len(), 3);
        assert_eq!(cookies[2].as_bytes(), b"LANG=caf\xe9; Path=/");
    }

    #[tokio::test]
    async fn wrong_password_is_401() {
        let mock = MockHopsworks::new("a@b", "pw");
        let server = server(mock.clone());
        let res = server
            .post("/hopsworks-api/api/auth/service")
            .form(&[("email", "a@b"), ("password", "nope")])
            .await;
        res.assert_status(StatusCode::UNAUTHORIZED);
        assert_eq!(mock.login_calls(), 1);
    }

    #[tokio::test]
    async fn api_key_requires_session() {
        let mock = MockHopsworks::new("a@b", "pw");
        let server = server(mock.clone());
        let res = server
            .post("/hopsworks-api/api/users/apiKey")
            .add_query_param("name", "airflow_x")
            .add_query_param("scope", "JOB")
            .await;
        res.assert_status(StatusCode::UNAUTHORIZED);
        assert!(mock.issued_keys().is_empty());
        assert_eq!(mock.last_key_request().unwrap().name.as_deref(), Some("airflow_x"));
    }

    #[tokio::test]
    async fn api_key_issued_with_session() {
        let mock = MockHopsworks::new("a@b", "pw");
        let server = server(mock.clone());
        let res = server
            .post("/hopsworks-api/api/users/apiKey")
            .add_query_param("name", "airflow_x")
            .add_query_param("scope", "JOB")
            .add_header(COOKIE, HeaderValue::from_static(SESSION_COOKIE))
            .add_header(AUTHORIZATION, HeaderValue::from_static(BEARER_TOKEN))
            .await;
        res.assert_status(StatusCode::CREATED);
        let body: Value = res.json();
        assert_eq!(body["key"], mock.issued_keys()[0]);
        assert_eq!(body["scope"][0], "JOB");
    }

    #[tokio::test]
    async fn catalog_filters_by_all_tags() {
        let mock = MockHopsworks::new("a@b", "pw")
            .register_service("glassfish", 8181, &["http", "hopsworks"])
            .register_service("glassfish", 4848, &["admin"]);
        let server = server(mock);

        let res = server
            .get("/v1/catalog/service/glassfish")
            .add_query_param("tag", "http")
            .add_query_param("tag", "hopsworks")
            .await;
        let body: Value = res.json();
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["ServicePort"], 8181);

        let res = server.get("/v1/catalog/service/namenode").await;
        assert_eq!(res.json::<Value>(), json!([]));
    }

    #[tokio::test]
    async fn jobs_reject_unknown_key() {
        let server = server(MockHopsworks::new("a@b", "pw").project(119, "demo"));
        let res = server
            .get("/hopsworks-api/api/project/119")
            .add_header(AUTHORIZATION, HeaderValue::from_static("ApiKey nope"))
            .await;
        res.assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn latest_execution_advances_states() {
        let mock = MockHopsworks::new("a@b", "pw")
            .accept_api_key("k")
            .execution_states(&[("RUNNING", "UNDEFINED"), ("FINISHED", "SUCCEEDED")]);
        let server = server(mock);
        let path = "/hopsworks-api/api/project/1/jobs/etl/executions";
        let key = HeaderValue::from_static("ApiKey k");

        let res = server.get(path).add_header(AUTHORIZATION, key.clone()).await;
        assert_eq!(res.json::<Value>()["count"], 0);

        server
            .post(path)
            .add_header(AUTHORIZATION, key.clone())
            .await
            .assert_status(StatusCode::CREATED);
        for expected in ["RUNNING", "FINISHED"] {
            let res = server.get(path).add_header(AUTHORIZATION, key.clone()).await;
            let body: Value = res.json();
            assert_eq!(body["items"][0]["id"], 1000);
            assert_eq!(body["items"][0]["state"], expected);
        }
    }

    #[tokio::test]
    async fn execution_states_advance_then_repeat() {
        let mock = MockHopsworks::new("a@b", "pw")
            .accept_api_key("k")
            .execution_states(&[("RUNNING", "UNDEFINED"), ("FINISHED", "SUCCEEDED")]);
        let server = server(mock);
        let path = "/hopsworks-api/api/project/1/jobs/etl/executions/5";

        for expected in ["RUNNING", "FINISHED", "FINISHED"] {
            let res = server
                .get(path)
                .add_header(AUTHORIZATION, HeaderValue::from_static("ApiKey k"))
                .await;
            assert_eq!(res.json::<Value>()["state"], expected);
        }
    }
}
