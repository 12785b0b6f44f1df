//! HTTP client for M1 servers
//!
//! Every call gets a fresh decimal request id from a per-client counter. By
//! default calls from one client run concurrently; with
//! [`ClientSettings::serialize_calls`] at most one call is in flight.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;

use crate::config::{ClientSettings, ConfigError};
use crate::rpc::{decode_strict, MetaData, RawResponse, Request, RpcError};
use crate::server::transport::JSON_MEDIA_TYPE;

/// Failures of the client's own transport channel.
///
/// An error produced by the remote pipeline is not a `ClientError`; it is
/// returned in [`Reply::error`].
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid client settings: {0}")]
    Config(#[from] ConfigError),
    #[error("RPC request is malformed")]
    MalformedRequest,
    #[error("unsupported protocol: {0}")]
    UnsupportedProtocol(String),
    #[error("unexpected HTTP status: {0}")]
    Status(reqwest::StatusCode),
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Decoded response of a typed call.
#[derive(Debug)]
pub struct Reply<R> {
    pub id: Option<String>,
    pub result: Option<R>,
    pub error: Option<RpcError>,
    pub meta: Option<MetaData>,
    pub ok: bool,
}

impl<R> Reply<R> {
    pub fn into_result(self) -> Result<Option<R>, RpcError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.result),
        }
    }
}

/// Moves one encoded request to the server and returns the response body.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn post(
        &self,
        url: &str,
        headers: &HeaderMap,
        body: String,
    ) -> Result<Vec<u8>, ClientError>;
}

/// Default transport backed by `reqwest`.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn post(
        &self,
        url: &str,
        headers: &HeaderMap,
        body: String,
    ) -> Result<Vec<u8>, ClientError> {
        let response = self
            .http
            .post(url)
            .headers(headers.clone())
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Status(status));
        }

        Ok(response.bytes().await?.to_vec())
    }
}

pub struct Client {
    url: String,
    transport: Arc<dyn HttpTransport>,
    headers: HeaderMap,
    escape_html: bool,
    call_guard: Option<Mutex<()>>,
    requests_count: AtomicU64,
}

impl Client {
    pub fn new(settings: ClientSettings) -> Result<Self, ClientError> {
        let transport = ReqwestTransport::new(settings.http_client.clone().unwrap_or_default());
        Self::with_transport(settings, Arc::new(transport))
    }

    pub fn with_transport(
        settings: ClientSettings,
        transport: Arc<dyn HttpTransport>,
    ) -> Result<Self, ClientError> {
        settings.check()?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON_MEDIA_TYPE));
        headers.insert(ACCEPT, HeaderValue::from_static(JSON_MEDIA_TYPE));
        for (name, value) in &settings.headers {
            let name = HeaderName::try_from(name.as_str())
                .map_err(|_| ConfigError::InvalidHeader(name.clone()))?;
            let value = HeaderValue::try_from(value.as_str())
                .map_err(|_| ConfigError::InvalidHeader(name.as_str().to_string()))?;
            headers.insert(name, value);
        }

        Ok(Self {
            url: settings.url(),
            transport,
            headers,
            escape_html: settings.escape_html,
            call_guard: settings.serialize_calls.then(|| Mutex::new(())),
            requests_count: AtomicU64::new(0),
        })
    }

    /// Number of calls issued so far; also the id of the latest call.
    /// Wraps around after `u64::MAX` calls.
    pub fn requests_count(&self) -> u64 {
        self.requests_count.load(Ordering::Relaxed)
    }

    /// Calls `method` with `params` and decodes a present result into `R`.
    /// A result carrying fields unknown to `R` fails with [`ClientError::Json`].
    pub async fn call<P, R>(&self, method: &str, params: &P) -> Result<Reply<R>, ClientError>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let _guard = self.lock().await;

        let id = self.next_request_id();
        let params = serde_json::value::to_raw_value(params)?;
        let request = Request::new(id, method, params);

        let raw = self.send(&request).await?;
        let result = raw
            .result
            .as_deref()
            .map(|result| decode_strict::<R>(result.get()))
            .transpose()?;

        Ok(Reply {
            id: raw.id,
            result,
            error: raw.error,
            meta: raw.meta,
            ok: raw.ok,
        })
    }

    /// Sends a prepared request and returns the undecoded response.
    pub async fn call_raw(&self, request: &Request) -> Result<RawResponse, ClientError> {
        let _guard = self.lock().await;
        self.send(request).await
    }

    async fn lock(&self) -> Option<MutexGuard<'_, ()>> {
        match &self.call_guard {
            Some(guard) => Some(guard.lock().await),
            None => None,
        }
    }

    fn next_request_id(&self) -> String {
        let id = self.requests_count.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        id.to_string()
    }

    async fn send(&self, request: &Request) -> Result<RawResponse, ClientError> {
        if !request.has_all_root_fields() {
            return Err(ClientError::MalformedRequest);
        }

        if !request.has_supported_protocol() {
            return Err(ClientError::UnsupportedProtocol(
                request.protocol_name.clone().unwrap_or_default(),
            ));
        }

        let body = self.encode(request)?;
        debug!(url = %self.url, method = ?request.method, id = ?request.id, "sending rpc request");

        let bytes = self.transport.post(&self.url, &self.headers, body).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn encode(&self, request: &Request) -> Result<String, ClientError> {
        let text = serde_json::to_string(request)?;
        if self.escape_html {
            return Ok(escape_html(&text));
        }

        Ok(text)
    }
}

/// Escapes HTML-sensitive characters of encoded JSON text. These characters
/// only ever occur inside string literals, so the result decodes to the same
/// value.
fn escape_html(json: &str) -> String {
    let mut escaped = String::with_capacity(json.len());
    for ch in json.chars() {
        match ch {
            '<' => escaped.push_str("\\u003c"),
            '>' => escaped.push_str("\\u003e"),
            '&' => escaped.push_str("\\u0026"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use std::{sync::atomic::AtomicUsize, time::Duration};

    use axum::{routing::post, Json, Router};
    use serde::Deserialize;
    use serde_json::{json, value::RawValue, Value};

    use super::*;
    use crate::config::ProcessorSettings;
    use crate::rpc::{parse_params, ErrorCode};
    use crate::server::Processor;

    #[derive(Debug, Serialize)]
    struct SumParams {
        a: u8,
        b: u8,
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct SumResult {
        c: u8,
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Plain {
        a: u8,
    }

    async fn serve(app: Router) -> u16 {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind listener");
        let port = listener.local_addr().expect("local addr").port();
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve");
        });
        port
    }

    async fn m1_server() -> u16 {
        let processor = Processor::new(ProcessorSettings {
            catch_exceptions: true,
            duration_field_name: Some("dur".to_string()),
            request_id_field_name: Some("rid".to_string()),
            ..ProcessorSettings::default()
        })
        .expect("processor");

        processor.add_function_or_panic("Sum", |params, _| {
            #[derive(Deserialize)]
            struct Params {
                a: u8,
                b: u8,
            }

            let params: Params = parse_params(params)?;
            let c = params
                .a
                .checked_add(params.b)
                .ok_or_else(|| RpcError::user(1, "overflow", json!({"a": params.a, "b": params.b})))?;
            Ok(json!({"c": c}))
        });
        processor.add_function_or_panic("Echo", |params, _| {
            let value: Value = parse_params(params)?;
            Ok(value)
        });

        serve(crate::build_app(Arc::new(processor))).await
    }

    fn client(port: u16) -> Client {
        let settings = ClientSettings::new("http", "127.0.0.1", port, "/").expect("settings");
        Client::new(settings).expect("client")
    }

    #[tokio::test]
    async fn call_decodes_result_and_counts_requests() {
        let client = client(m1_server().await);
        assert_eq!(client.requests_count(), 0);

        let reply: Reply<SumResult> = client
            .call("Sum", &SumParams { a: 1, b: 2 })
            .await
            .expect("transport ok");
        assert_eq!(reply.id.as_deref(), Some("1"));
        assert!(reply.ok);
        assert_eq!(reply.error, None);
        assert_eq!(reply.result, Some(SumResult { c: 3 }));
        assert!(reply.meta.expect("duration meta").get_field("dur").is_some());
        assert_eq!(client.requests_count().to_string(), "1");

        let reply: Reply<SumResult> = client
            .call("Sum", &SumParams { a: 2, b: 2 })
            .await
            .expect("transport ok");
        assert_eq!(reply.id.as_deref(), Some("2"));
        assert_eq!(client.requests_count().to_string(), "2");
    }

    #[tokio::test]
    async fn remote_errors_are_not_transport_errors() {
        let client = client(m1_server().await);

        let reply: Reply<Value> = client.call("Nope", &json!({})).await.expect("transport ok");
        let err = reply.into_result().expect_err("unknown method");
        assert_eq!(err.code, ErrorCode::UNKNOWN_METHOD);

        let reply: Reply<SumResult> = client
            .call("Sum", &SumParams { a: 200, b: 100 })
            .await
            .expect("transport ok");
        assert!(!reply.ok);
        assert_eq!(reply.result, None);
        let err = reply.error.expect("user error");
        assert_eq!(err.code, ErrorCode(1));
        assert_eq!(err.message, "overflow");
    }

    #[tokio::test]
    async fn result_decoding_is_strict() {
        let client = client(m1_server().await);

        let err = client
            .call::<_, Plain>("Echo", &json!({"a": 1, "extra": true}))
            .await
            .expect_err("unknown field in result");
        assert!(matches!(err, ClientError::Json(_)));

        let reply: Reply<Plain> = client
            .call("Echo", &json!({"a": 1}))
            .await
            .expect("known fields only");
        assert_eq!(reply.result, Some(Plain { a: 1 }));
    }

    #[tokio::test]
    async fn large_numbers_keep_their_precision() {
        let client = client(m1_server().await);

        let reply: Reply<Value> = client
            .call("Echo", &json!({"n": 18446744073709551616_u128}))
            .await
            .expect("transport ok");
        let result = reply.result.expect("echoed value");
        assert_eq!(result["n"].to_string(), "18446744073709551616");
    }

    #[tokio::test]
    async fn escaped_text_decodes_to_original() {
        let port = m1_server().await;
        let settings = ClientSettings::new("http", "127.0.0.1", port, "/")
            .expect("settings")
            .with_html_escaping(true);
        let client = Client::new(settings).expect("client");

        let reply: Reply<String> = client
            .call("Echo", "<b>&amp;</b>")
            .await
            .expect("transport ok");
        assert_eq!(reply.result.as_deref(), Some("<b>&amp;</b>"));
    }

    #[tokio::test]
    async fn call_raw_returns_undecoded_result() {
        let client = client(m1_server().await);
        let params = RawValue::from_string(r#"{"a":4,"b":5}"#.to_string()).expect("raw");
        let request = Request::new("custom-id", "Sum", params);

        let raw = client.call_raw(&request).await.expect("transport ok");
        assert_eq!(raw.id.as_deref(), Some("custom-id"));
        assert_eq!(raw.result.expect("result").get(), r#"{"c":9}"#);
        assert_eq!(client.requests_count(), 0);
    }

    #[tokio::test]
    async fn call_raw_validates_request_locally() {
        let client = client(1);

        let err = client
            .call_raw(&Request::default())
            .await
            .expect_err("malformed");
        assert!(matches!(err, ClientError::MalformedRequest));

        let mut request = Request::new("1", "Sum", RawValue::from_string("{}".to_string()).expect("raw"));
        request.protocol_name = Some("2.0".to_string());
        let err = client.call_raw(&request).await.expect_err("foreign protocol");
        assert!(matches!(err, ClientError::UnsupportedProtocol(name) if name == "2.0"));
    }

    #[tokio::test]
    async fn connection_failure_is_transport_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind listener");
        let port = listener.local_addr().expect("local addr").port();
        drop(listener);

        let err = client(port)
            .call::<_, Value>("Sum", &json!({}))
            .await
            .expect_err("nothing listens");
        assert!(matches!(err, ClientError::Http(_)));
    }

    #[tokio::test]
    async fn non_success_status_is_transport_error() {
        let port = m1_server().await;
        let settings = ClientSettings::new("http", "127.0.0.1", port, "/missing").expect("settings");
        let client = Client::new(settings).expect("client");

        let err = client
            .call::<_, Value>("Sum", &json!({}))
            .await
            .expect_err("not found");
        assert!(matches!(err, ClientError::Status(status) if status == reqwest::StatusCode::NOT_FOUND));
    }

    #[tokio::test]
    async fn custom_headers_are_sent() {
        let app = Router::new().route(
            "/",
            post(|headers: axum::http::HeaderMap| async move {
                let api_key = headers
                    .get("x-api-key")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                let accept = headers
                    .get("accept")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                Json(json!({
                    "jsonrpc": "M1",
                    "id": "1",
                    "result": {"api_key": api_key, "accept": accept},
                    "error": null,
                    "ok": true
                }))
            }),
        );
        let port = serve(app).await;

        let settings = ClientSettings::new("http", "127.0.0.1", port, "/")
            .expect("settings")
            .with_header("X-Api-Key", "secret");
        let client = Client::new(settings).expect("client");

        let reply: Reply<Value> = client.call("Any", &json!({})).await.expect("transport ok");
        let result = reply.result.expect("result");
        assert_eq!(result["api_key"], "secret");
        assert_eq!(result["accept"], "application/json");
    }

    #[derive(Default)]
    struct GaugeTransport {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    #[async_trait]
    impl HttpTransport for GaugeTransport {
        async fn post(
            &self,
            _url: &str,
            _headers: &HeaderMap,
            _body: String,
        ) -> Result<Vec<u8>, ClientError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(br#"{"jsonrpc":"M1","id":"1","result":null,"error":null,"ok":true}"#.to_vec())
        }
    }

    async fn max_in_flight(serialize_calls: bool) -> usize {
        let transport = Arc::new(GaugeTransport::default());
        let settings = ClientSettings::new("http", "127.0.0.1", 8080, "/")
            .expect("settings")
            .with_serialized_calls(serialize_calls);
        let client = Arc::new(Client::with_transport(settings, transport.clone()).expect("client"));

        let calls: Vec<_> = (0..4)
            .map(|_| {
                let client = Arc::clone(&client);
                tokio::spawn(async move {
                    client
                        .call::<_, Value>("Any", &json!({}))
                        .await
                        .expect("transport ok")
                })
            })
            .collect();
        for call in calls {
            assert!(call.await.expect("task").ok);
        }

        assert_eq!(client.requests_count(), 4);
        transport.max_in_flight.load(Ordering::SeqCst)
    }

    #[tokio::test]
    async fn serialized_client_keeps_one_call_in_flight() {
        assert_eq!(max_in_flight(true).await, 1);
    }

    #[tokio::test]
    async fn default_client_overlaps_calls() {
        assert!(max_in_flight(false).await > 1);
    }

    struct RecordingTransport {
        sent: parking_lot::Mutex<Vec<(String, String)>>,
        reply: &'static str,
    }

    #[async_trait]
    impl HttpTransport for RecordingTransport {
        async fn post(
            &self,
            url: &str,
            _headers: &HeaderMap,
            body: String,
        ) -> Result<Vec<u8>, ClientError> {
            self.sent.lock().push((url.to_string(), body));
            Ok(self.reply.as_bytes().to_vec())
        }
    }

    #[tokio::test]
    async fn custom_transport_receives_encoded_request() {
        let transport = Arc::new(RecordingTransport {
            sent: parking_lot::Mutex::new(Vec::new()),
            reply: r#"{"jsonrpc":"M1","id":"1","result":"ok","error":null,"ok":true}"#,
        });
        let settings = ClientSettings::new("https", "rpc.internal", 9443, "/m1")
            .expect("settings")
            .with_html_escaping(true);
        let client = Client::with_transport(settings, transport.clone()).expect("client");

        let reply: Reply<String> = client.call("Tag", "<i>").await.expect("transport ok");
        assert_eq!(reply.result.as_deref(), Some("ok"));

        let sent = transport.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "https://rpc.internal:9443/m1");
        assert_eq!(
            sent[0].1,
            r#"{"jsonrpc":"M1","id":"1","method":"Tag","params":"\u003ci\u003e"}"#
        );
    }

    #[tokio::test]
    async fn unknown_response_fields_are_rejected() {
        let transport = Arc::new(RecordingTransport {
            sent: parking_lot::Mutex::new(Vec::new()),
            reply: r#"{"jsonrpc":"M1","id":"1","result":null,"error":null,"ok":true,"extra":1}"#,
        });
        let settings = ClientSettings::new("http", "127.0.0.1", 8080, "/").expect("settings");
        let client = Client::with_transport(settings, transport).expect("client");

        let err = client
            .call::<_, Value>("Any", &json!({}))
            .await
            .expect_err("strict envelope");
        assert!(matches!(err, ClientError::Json(_)));
    }

    #[test]
    fn invalid_custom_header_is_rejected() {
        let settings = ClientSettings::new("http", "127.0.0.1", 8080, "/")
            .expect("settings")
            .with_header("bad header", "x");
        assert!(matches!(
            Client::new(settings),
            Err(ClientError::Config(ConfigError::InvalidHeader(_)))
        ));
    }

    #[test]
    fn escape_html_only_touches_sensitive_characters() {
        assert_eq!(
            escape_html(r#"{"s":"<a href='x'>&</a>"}"#),
            r#"{"s":"\u003ca href='x'\u003e\u0026\u003c/a\u003e"}"#
        );
        assert_eq!(escape_html(r#"{"n":1}"#), r#"{"n":1}"#);
    }
}
