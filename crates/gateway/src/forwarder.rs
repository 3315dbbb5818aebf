use std::sync::Arc;

use bytes::Bytes;
use darkroom_core::GatewayConfig;
use reqwest::header::{
    CONNECTION, CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE, HeaderMap, HeaderName,
    HeaderValue, TRANSFER_ENCODING,
};
use reqwest::multipart::Form;
use reqwest::{Client, Method, StatusCode};
use tracing::{debug, instrument, warn};

use crate::error::GatewayError;

/// `Keep-Alive` is not among the `http` crate's named constants.
const KEEP_ALIVE: HeaderName = HeaderName::from_static("keep-alive");

/// Upstream response headers that describe the transport framing of the
/// original body. They stop being true once the body has been buffered and
/// re-emitted, so they are never relayed.
const FRAMING_HEADERS: [HeaderName; 5] = [
    CONTENT_ENCODING,
    CONTENT_LENGTH,
    TRANSFER_ENCODING,
    CONNECTION,
    KEEP_ALIVE,
];

/// Body of an inbound request headed upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyBody {
    Empty,
    Text(String),
    Binary(Bytes),
}

impl ProxyBody {
    /// Classify a fully-read inbound body by its declared content type.
    ///
    /// Textual content types with valid UTF-8 become [`ProxyBody::Text`];
    /// everything else is kept as raw bytes.
    pub fn from_bytes(bytes: Bytes, content_type: Option<&str>) -> Self {
        if bytes.is_empty() {
            return Self::Empty;
        }
        if content_type.is_some_and(is_textual)
            && let Ok(text) = std::str::from_utf8(&bytes)
        {
            return Self::Text(text.to_owned());
        }
        Self::Binary(bytes)
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Empty => 0,
            Self::Text(text) => text.len(),
            Self::Binary(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// An inbound request as the forwarder sees it. Derived per request, never
/// stored.
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub method: Method,
    /// Path suffix appended to the upstream base, including any query string.
    pub path: String,
    /// Content type of the inbound body, if it declared one.
    pub content_type: Option<HeaderValue>,
    pub body: ProxyBody,
}

impl ProxyRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            content_type: None,
            body: ProxyBody::Empty,
        }
    }

    #[must_use]
    pub fn with_body(mut self, body: ProxyBody, content_type: Option<HeaderValue>) -> Self {
        self.body = body;
        self.content_type = content_type;
        self
    }

    /// `GET` and `HEAD` never carry a body upstream.
    pub fn carries_body(&self) -> bool {
        !matches!(self.method, Method::GET | Method::HEAD) && !self.body.is_empty()
    }
}

/// How an upstream response body is relayed. Decided once per response from
/// its content type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayKind {
    /// Media and opaque bytes: buffered whole, re-emitted with a recomputed
    /// `Content-Length`.
    Binary,
    /// JSON and text: read fully and re-emitted byte for byte, whatever the
    /// declared charset.
    Text,
}

impl RelayKind {
    pub fn classify(content_type: Option<&str>) -> Self {
        let Some(content_type) = content_type else {
            return Self::Text;
        };
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        let binary = essence.starts_with("image/")
            || essence.starts_with("video/")
            || essence.starts_with("audio/")
            || essence == "application/octet-stream"
            || essence == "application/zip";
        if binary { Self::Binary } else { Self::Text }
    }
}

/// Relayed response body. Text that is not valid UTF-8 is carried as
/// [`RelayBody::Binary`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayBody {
    Binary(Bytes),
    Text(String),
}

impl RelayBody {
    pub fn into_bytes(self) -> Bytes {
        match self {
            Self::Binary(bytes) => bytes,
            Self::Text(text) => Bytes::from(text),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Binary(bytes) => bytes.len(),
            Self::Text(text) => text.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// An upstream response ready to be sent back to the caller.
#[derive(Debug, Clone)]
pub struct ProxyResponse {
    /// Upstream status, relayed unchanged.
    pub status: StatusCode,
    /// Upstream headers minus the transport-framing set.
    pub headers: HeaderMap,
    pub kind: RelayKind,
    pub body: RelayBody,
}

impl ProxyResponse {
    /// The response body parsed as JSON, when it is JSON.
    pub fn json(&self) -> Option<serde_json::Value> {
        match &self.body {
            RelayBody::Text(text) => serde_json::from_str(text).ok(),
            RelayBody::Binary(_) => None,
        }
    }
}

/// Relays requests to the upstream media service.
///
/// Holds no per-request state: one pooled [`Client`] and the immutable
/// configuration. The upstream URL is the configured base joined with the
/// caller's path suffix; no route table is consulted.
#[derive(Debug, Clone)]
pub struct ProxyForwarder {
    config: Arc<GatewayConfig>,
    client: Client,
}

impl ProxyForwarder {
    /// Create a forwarder whose client applies the configured upstream timeout.
    pub fn new(config: Arc<GatewayConfig>) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError::Configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { config, client })
    }

    /// Create a forwarder with a custom HTTP client.
    pub fn with_client(config: Arc<GatewayConfig>, client: Client) -> Self {
        Self { config, client }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Forward `request` under the resolved credential `headers`.
    #[instrument(skip_all, fields(method = %request.method, path = %request.path))]
    pub async fn forward(
        &self,
        request: ProxyRequest,
        mut headers: HeaderMap,
    ) -> Result<ProxyResponse, GatewayError> {
        let url = self.config.upstream_target(&request.path);
        let carries_body = request.carries_body();

        if carries_body && let Some(content_type) = request.content_type.clone() {
            headers.insert(CONTENT_TYPE, content_type);
        }

        debug!(url = %url, body_bytes = request.body.len(), carries_body, "forwarding upstream");

        let mut builder = self
            .client
            .request(request.method, &url)
            .headers(headers);
        if carries_body {
            builder = match request.body {
                ProxyBody::Text(text) => builder.body(text),
                ProxyBody::Binary(bytes) => builder.body(bytes),
                ProxyBody::Empty => builder,
            };
        }

        let response = builder.send().await.map_err(|e| {
            warn!(error = %e, url = %url, "upstream request failed");
            GatewayError::from(e)
        })?;
        relay(response).await
    }

    /// Send a multipart form to `path` under the resolved credential `headers`.
    ///
    /// Any `Content-Type` in `headers` is replaced by the form's own boundary
    /// type.
    #[instrument(skip_all, fields(path = %path))]
    pub async fn forward_multipart(
        &self,
        path: &str,
        form: Form,
        mut headers: HeaderMap,
    ) -> Result<ProxyResponse, GatewayError> {
        let url = self.config.upstream_target(path);
        headers.remove(CONTENT_TYPE);

        let response = self
            .client
            .post(&url)
            .headers(headers)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, url = %url, "upstream multipart request failed");
                GatewayError::from(e)
            })?;
        relay(response).await
    }

    /// POST a JSON document without credential headers.
    ///
    /// Only for calls that acquire a credential in the first place, such as
    /// the upstream login endpoint.
    pub(crate) async fn post_json_anonymous(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<ProxyResponse, GatewayError> {
        let url = self.config.upstream_target(path);
        let response = self.client.post(&url).json(body).send().await?;
        relay(response).await
    }
}

/// Buffer an upstream response and shape it for relaying.
async fn relay(response: reqwest::Response) -> Result<ProxyResponse, GatewayError> {
    let status = response.status();
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let kind = RelayKind::classify(content_type.as_deref());
    let mut headers = relayable_headers(response.headers());

    let bytes = response
        .bytes()
        .await
        .map_err(|e| GatewayError::Upstream(format!("failed to read upstream body: {e}")))?;
    let body = match kind {
        RelayKind::Binary => {
            headers.insert(CONTENT_LENGTH, HeaderValue::from(bytes.len()));
            RelayBody::Binary(bytes)
        }
        // Non-UTF-8 charsets stay as the upstream encoded them.
        RelayKind::Text => match String::from_utf8(bytes.to_vec()) {
            Ok(text) => RelayBody::Text(text),
            Err(_) => RelayBody::Binary(bytes),
        },
    };

    debug!(
        status = status.as_u16(),
        kind = ?kind,
        body_bytes = body.len(),
        "relaying upstream response"
    );

    Ok(ProxyResponse {
        status,
        headers,
        kind,
        body,
    })
}

/// Copy `upstream` minus the transport-framing headers.
pub fn relayable_headers(upstream: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(upstream.len());
    for (name, value) in upstream {
        if !FRAMING_HEADERS.contains(name) {
            headers.append(name.clone(), value.clone());
        }
    }
    headers
}

fn is_textual(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    essence.starts_with("text/")
        || essence == "application/json"
        || essence.ends_with("+json")
        || essence == "application/xml"
        || essence == "application/x-www-form-urlencoded"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockResponse, MockUpstream};

    fn forwarder(base_url: &str) -> ProxyForwarder {
        ProxyForwarder::new(Arc::new(GatewayConfig::new(base_url))).unwrap()
    }

    fn credential() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert("x-api-key", HeaderValue::from_static("service-key"));
        headers
    }

    #[test]
    fn classify_media_types_as_binary() {
        for ct in [
            "image/jpeg",
            "video/mp4",
            "audio/mpeg",
            "application/octet-stream",
            "application/zip",
            "IMAGE/WEBP; charset=binary",
        ] {
            assert_eq!(RelayKind::classify(Some(ct)), RelayKind::Binary, "{ct}");
        }
    }

    #[test]
    fn classify_everything_else_as_text() {
        for ct in [
            Some("application/json"),
            Some("application/json; charset=utf-8"),
            Some("text/html"),
            Some("application/problem+json"),
            None,
        ] {
            assert_eq!(RelayKind::classify(ct), RelayKind::Text, "{ct:?}");
        }
    }

    #[test]
    fn proxy_body_classification() {
        assert_eq!(
            ProxyBody::from_bytes(Bytes::new(), Some("application/json")),
            ProxyBody::Empty
        );
        assert_eq!(
            ProxyBody::from_bytes(Bytes::from_static(b"{\"a\":1}"), Some("application/json")),
            ProxyBody::Text("{\"a\":1}".into())
        );
        let raw = Bytes::from_static(&[0xff, 0xd8, 0xff]);
        assert_eq!(
            ProxyBody::from_bytes(raw.clone(), Some("image/jpeg")),
            ProxyBody::Binary(raw.clone())
        );
        // Invalid UTF-8 under a textual type stays binary.
        assert_eq!(
            ProxyBody::from_bytes(raw.clone(), Some("text/plain")),
            ProxyBody::Binary(raw)
        );
    }

    #[test]
    fn get_and_head_never_carry_a_body() {
        let body = ProxyBody::Text("{}".into());
        assert!(!ProxyRequest::new(Method::GET, "/x").with_body(body.clone(), None).carries_body());
        assert!(!ProxyRequest::new(Method::HEAD, "/x").with_body(body.clone(), None).carries_body());
        assert!(ProxyRequest::new(Method::POST, "/x").with_body(body, None).carries_body());
        assert!(!ProxyRequest::new(Method::POST, "/x").carries_body());
    }

    #[test]
    fn framing_headers_are_dropped() {
        let mut upstream = HeaderMap::new();
        upstream.insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));
        upstream.insert(CONTENT_LENGTH, HeaderValue::from_static("10"));
        upstream.insert(TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        upstream.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
        upstream.insert(KEEP_ALIVE, HeaderValue::from_static("timeout=5"));
        upstream.insert(CONTENT_TYPE, HeaderValue::from_static("image/jpeg"));
        upstream.insert("etag", HeaderValue::from_static("\"abc\""));

        let relayed = relayable_headers(&upstream);
        assert_eq!(relayed.len(), 2);
        assert_eq!(relayed[CONTENT_TYPE], "image/jpeg");
        assert_eq!(relayed["etag"], "\"abc\"");
    }

    #[tokio::test]
    async fn json_response_is_relayed_as_text_with_status() {
        let server = MockUpstream::start().await;
        let forwarder = forwarder(&server.base_url);
        let handle = tokio::spawn(async move {
            server
                .respond_once(MockResponse::json(200, r#"{"albums":[]}"#))
                .await
        });

        let response = forwarder
            .forward(ProxyRequest::new(Method::GET, "/albums?shared=true"), credential())
            .await
            .unwrap();
        let request = handle.await.unwrap();

        assert_eq!(request.method, "GET");
        assert_eq!(request.path, "/albums?shared=true");
        assert_eq!(request.header("x-api-key"), Some("service-key"));
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.kind, RelayKind::Text);
        assert_eq!(response.body, RelayBody::Text(r#"{"albums":[]}"#.into()));
    }

    #[tokio::test]
    async fn upstream_error_status_is_relayed_unchanged() {
        for status in [404_u16, 400, 403, 500, 502] {
            let server = MockUpstream::start().await;
            let forwarder = forwarder(&server.base_url);
            let handle = tokio::spawn(async move {
                server
                    .respond_once(MockResponse::json(status, r#"{"message":"nope"}"#))
                    .await
            });

            let response = forwarder
                .forward(ProxyRequest::new(Method::GET, "/assets/missing"), credential())
                .await
                .expect("upstream business errors are not gateway errors");
            handle.await.unwrap();

            assert_eq!(response.status.as_u16(), status);
            assert_eq!(response.json().unwrap()["message"], "nope");
        }
    }

    #[tokio::test]
    async fn binary_response_is_buffered_with_recomputed_length() {
        let server = MockUpstream::start().await;
        let forwarder = forwarder(&server.base_url);
        let image: Vec<u8> = (0..=255).cycle().take(4096).collect();
        let expected = image.clone();
        let handle = tokio::spawn(async move {
            server
                .respond_once(
                    MockResponse::bytes(200, "image/jpeg", image)
                        .with_header("Cache-Control", "private, max-age=86400")
                        .with_header("Keep-Alive", "timeout=5")
                        .chunked(),
                )
                .await
        });

        let response = forwarder
            .forward(ProxyRequest::new(Method::GET, "/assets/a1/thumbnail"), credential())
            .await
            .unwrap();
        handle.await.unwrap();

        assert_eq!(response.kind, RelayKind::Binary);
        assert_eq!(response.headers[CONTENT_TYPE], "image/jpeg");
        assert_eq!(response.headers[CONTENT_LENGTH], "4096");
        assert_eq!(response.headers["cache-control"], "private, max-age=86400");
        assert!(response.headers.get(TRANSFER_ENCODING).is_none());
        assert!(response.headers.get(KEEP_ALIVE).is_none());
        assert!(response.headers.get(CONNECTION).is_none());
        assert_eq!(response.body, RelayBody::Binary(Bytes::from(expected)));
    }

    #[tokio::test]
    async fn text_in_other_charsets_is_relayed_untranscoded() {
        let server = MockUpstream::start().await;
        let forwarder = forwarder(&server.base_url);
        let latin1 = vec![99, 97, 102, 233];
        let handle = tokio::spawn({
            let latin1 = latin1.clone();
            async move {
                server
                    .respond_once(MockResponse::bytes(200, "text/plain; charset=iso-8859-1", latin1))
                    .await
            }
        });

        let response = forwarder
            .forward(ProxyRequest::new(Method::GET, "/server/about"), credential())
            .await
            .unwrap();
        handle.await.unwrap();

        assert_eq!(response.kind, RelayKind::Text);
        assert_eq!(response.headers[CONTENT_TYPE], "text/plain; charset=iso-8859-1");
        assert_eq!(response.body.into_bytes(), Bytes::from(latin1));
    }

    #[tokio::test]
    async fn post_body_and_content_type_are_forwarded() {
        let server = MockUpstream::start().await;
        let forwarder = forwarder(&server.base_url);
        let handle = tokio::spawn(async move {
            server
                .respond_once(MockResponse::json(201, r#"{"id":"new"}"#))
                .await
        });

        let request = ProxyRequest::new(Method::POST, "/albums").with_body(
            ProxyBody::Text(r#"{"albumName":"Trip"}"#.into()),
            Some(HeaderValue::from_static("application/json; charset=utf-8")),
        );
        let response = forwarder.forward(request, credential()).await.unwrap();
        let captured = handle.await.unwrap();

        assert_eq!(captured.method, "POST");
        assert_eq!(captured.body, br#"{"albumName":"Trip"}"#);
        assert_eq!(
            captured.header("content-type"),
            Some("application/json; charset=utf-8")
        );
        assert_eq!(response.status, StatusCode::CREATED);
    }

    #[tokio::test]
    async fn binary_request_body_is_forwarded_byte_for_byte() {
        let server = MockUpstream::start().await;
        let forwarder = forwarder(&server.base_url);
        let handle = tokio::spawn(async move {
            server.respond_once(MockResponse::json(200, "{}")).await
        });

        let payload = Bytes::from_static(&[0, 159, 146, 150, 255]);
        let request = ProxyRequest::new(Method::PUT, "/assets/a1/original").with_body(
            ProxyBody::Binary(payload.clone()),
            Some(HeaderValue::from_static("application/octet-stream")),
        );
        forwarder.forward(request, credential()).await.unwrap();
        let captured = handle.await.unwrap();

        assert_eq!(captured.body, payload.to_vec());
        assert_eq!(
            captured.header("content-type"),
            Some("application/octet-stream")
        );
    }

    #[tokio::test]
    async fn get_drops_request_body() {
        let server = MockUpstream::start().await;
        let forwarder = forwarder(&server.base_url);
        let handle = tokio::spawn(async move {
            server.respond_once(MockResponse::json(200, "[]")).await
        });

        let request = ProxyRequest::new(Method::GET, "/people")
            .with_body(ProxyBody::Text("ignored".into()), None);
        forwarder.forward(request, credential()).await.unwrap();
        let captured = handle.await.unwrap();

        assert!(captured.body.is_empty());
        assert_eq!(captured.header("content-type"), Some("application/json"));
    }

    #[tokio::test]
    async fn unreachable_upstream_is_gateway_error() {
        let base_url = MockUpstream::unreachable_url().await;
        let forwarder = forwarder(&base_url);

        let err = forwarder
            .forward(ProxyRequest::new(Method::GET, "/server/ping"), credential())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Upstream(_)), "{err:?}");
    }
}
