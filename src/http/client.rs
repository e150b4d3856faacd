use std::future::Future;
use std::sync::Arc;

use parking_lot::RwLock;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::{AuthMode, ClientConfig};
use crate::error::{ClientError, ClientResult};
use crate::session::storage::SessionStorage;
use crate::session::{TenantContext, TokenStore};
use super::refresh::RefreshCoordinator;
use super::transport::read_body;

#[derive(Debug, Clone)]
pub enum RequestBody {
    /// Encoded as JSON.
    Json(Value),
    /// Sent verbatim; the caller already serialized it and sets its own content type.
    Raw(String),
}

impl RequestBody {
    fn encode(&self) -> String {
        match self {
            RequestBody::Json(v) => v.to_string(),
            RequestBody::Raw(s) => s.clone(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Option<RequestBody>,
    /// Cancels the request (and the wait on a shared refresh) when fired.
    pub signal: Option<CancellationToken>,
}

impl RequestOptions {
    pub fn new(method: Method) -> Self { Self { method, ..Default::default() } }
    pub fn get() -> Self { Self::new(Method::GET) }

    pub fn json(mut self, body: Value) -> Self { self.body = Some(RequestBody::Json(body)); self }
    pub fn raw(mut self, body: impl Into<String>) -> Self { self.body = Some(RequestBody::Raw(body.into())); self }
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self { self.headers.insert(name, value); self }
    pub fn signal(mut self, signal: CancellationToken) -> Self { self.signal = Some(signal); self }
}

/// Cookie jar that can be emptied; reqwest's own jar only ever grows.
#[derive(Default)]
struct SessionJar {
    jar: RwLock<Jar>,
}

impl SessionJar {
    fn clear(&self) {
        *self.jar.write() = Jar::default();
    }
}

impl CookieStore for SessionJar {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        self.jar.read().set_cookies(cookie_headers, url);
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        self.jar.read().cookies(url)
    }
}

struct ClientInner {
    config: ClientConfig,
    http: reqwest::Client,
    cookies: Arc<SessionJar>,
    tokens: Arc<TokenStore>,
    tenant: Arc<TenantContext>,
    storage: Option<Arc<dyn SessionStorage>>,
    refresher: RefreshCoordinator,
}

/// The one HTTP entry point of the dashboard. Cheap to clone; clones share
/// tokens, tenant and the refresh slot.
#[derive(Clone)]
pub struct HttpClient {
    inner: Arc<ClientInner>,
}

impl HttpClient {
    pub fn new(config: ClientConfig, tokens: Arc<TokenStore>, tenant: Arc<TenantContext>) -> ClientResult<Self> {
        Self::build(config, tokens, tenant, None)
    }

    /// Build the token store and tenant context over one storage backend.
    /// The backend's session is ended by [`end_session`](Self::end_session).
    pub fn with_storage(config: ClientConfig, storage: Arc<dyn SessionStorage>) -> ClientResult<Self> {
        let tokens = Arc::new(TokenStore::new(storage.clone(), config.auth_mode));
        let tenant = Arc::new(TenantContext::new(storage.clone()));
        Self::build(config, tokens, tenant, Some(storage))
    }

    fn build(
        config: ClientConfig,
        tokens: Arc<TokenStore>,
        tenant: Arc<TenantContext>,
        storage: Option<Arc<dyn SessionStorage>>,
    ) -> ClientResult<Self> {
        let cookies = Arc::new(SessionJar::default());
        let http = reqwest::Client::builder()
            .cookie_provider(cookies.clone())
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ClientError::network(format!("failed to build http client: {}", e)))?;
        let refresher = RefreshCoordinator::new(
            http.clone(),
            config.resolve_url(&config.refresh_path),
            config.refresh_timeout,
            tokens.clone(),
        );
        Ok(Self { inner: Arc::new(ClientInner { config, http, cookies, tokens, tenant, storage, refresher }) })
    }

    pub fn config(&self) -> &ClientConfig { &self.inner.config }
    pub fn tokens(&self) -> &Arc<TokenStore> { &self.inner.tokens }
    pub fn tenant(&self) -> &Arc<TenantContext> { &self.inner.tenant }
    pub fn refresher(&self) -> &RefreshCoordinator { &self.inner.refresher }
    pub(crate) fn raw_http(&self) -> &reqwest::Client { &self.inner.http }

    /// Forget every cookie the server set, so a cookie session cannot outlive sign-out.
    pub fn clear_cookies(&self) {
        self.inner.cookies.clear();
    }

    /// End the storage backend's session (a file-backed one removes its directory).
    pub fn end_session(&self) {
        if let Some(storage) = &self.inner.storage {
            if let Err(e) = storage.end_session() {
                warn!(target: "buildops::session", "failed to end session storage: {}", e);
            }
        }
    }

    pub async fn request(&self, path: &str, opts: RequestOptions) -> ClientResult<Value> {
        let resolved = self.inner.config.resolve_url(path);
        let url = Url::parse(&resolved)
            .map_err(|e| ClientError::InvalidUrl { url: resolved.clone(), message: e.to_string() })?;
        let body = opts.body.as_ref().map(RequestBody::encode);
        let signal = opts.signal.as_ref();
        let header_mode = self.inner.config.auth_mode == AuthMode::Header;

        let sent_token = if header_mode { self.inner.tokens.access_token() } else { None };
        let mut resp = self.send_once(&url, &opts, body.clone(), sent_token.as_deref()).await?;

        if resp.status() == StatusCode::UNAUTHORIZED && header_mode {
            let refreshed = guarded(signal, self.inner.refresher.ensure_refreshed_after(sent_token.as_deref())).await?;
            match refreshed {
                Some(token) => {
                    debug!(target: "buildops::http", "{} {} -> 401, retrying once with refreshed token", opts.method, url);
                    resp = self.send_once(&url, &opts, body, Some(&token)).await?;
                }
                None => debug!(target: "buildops::http", "{} {} -> 401, no refreshed token", opts.method, url),
            }
        }

        let status = resp.status().as_u16();
        let value = guarded(signal, read_body(resp)).await??;
        if !(200..300).contains(&status) {
            return Err(ClientError::http(status, value));
        }
        Ok(value)
    }

    pub async fn request_json<T: DeserializeOwned>(&self, path: &str, opts: RequestOptions) -> ClientResult<T> {
        let value = self.request(path, opts).await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn get(&self, path: &str) -> ClientResult<Value> {
        self.request(path, RequestOptions::get()).await
    }

    pub async fn post(&self, path: &str, body: Value) -> ClientResult<Value> {
        self.request(path, RequestOptions::new(Method::POST).json(body)).await
    }

    pub async fn put(&self, path: &str, body: Value) -> ClientResult<Value> {
        self.request(path, RequestOptions::new(Method::PUT).json(body)).await
    }

    pub async fn patch(&self, path: &str, body: Value) -> ClientResult<Value> {
        self.request(path, RequestOptions::new(Method::PATCH).json(body)).await
    }

    pub async fn delete(&self, path: &str) -> ClientResult<Value> {
        self.request(path, RequestOptions::new(Method::DELETE)).await
    }

    async fn send_once(
        &self,
        url: &Url,
        opts: &RequestOptions,
        body: Option<String>,
        token: Option<&str>,
    ) -> ClientResult<reqwest::Response> {
        let headers = self.build_headers(&opts.headers, token)?;
        let mut req = self.inner.http.request(opts.method.clone(), url.clone()).headers(headers);
        if let Some(b) = body {
            req = req.body(b);
        }
        debug!(target: "buildops::http", "{} {}", opts.method, url);
        guarded(opts.signal.as_ref(), req.send()).await?.map_err(ClientError::from)
    }

    /// JSON defaults, tenant, bearer; caller headers replace any of them.
    fn build_headers(&self, caller: &HeaderMap, token: Option<&str>) -> ClientResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(tenant) = self.inner.tenant.get() {
            let name = HeaderName::from_bytes(self.inner.config.tenant_header.as_bytes())
                .map_err(|e| ClientError::encode(format!("invalid tenant header name: {}", e)))?;
            let value = HeaderValue::from_str(&tenant)
                .map_err(|e| ClientError::encode(format!("invalid tenant id: {}", e)))?;
            headers.insert(name, value);
        }
        if self.inner.config.auth_mode == AuthMode::Header {
            if let Some(token) = token {
                let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
                    .map_err(|e| ClientError::encode(format!("invalid access token: {}", e)))?;
                value.set_sensitive(true);
                headers.insert(AUTHORIZATION, value);
            }
        }
        for key in caller.keys() {
            headers.remove(key);
        }
        for (key, value) in caller.iter() {
            headers.append(key.clone(), value.clone());
        }
        Ok(headers)
    }
}

/// Race `fut` against the caller's cancellation token.
async fn guarded<F: Future>(signal: Option<&CancellationToken>, fut: F) -> ClientResult<F::Output> {
    match signal {
        Some(signal) => tokio::select! {
            biased;
            _ = signal.cancelled() => Err(ClientError::Aborted),
            out = fut => Ok(out),
        },
        None => Ok(fut.await),
    }
}
