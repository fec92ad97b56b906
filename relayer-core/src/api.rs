pub mod handlers {
    //! Credential-hiding proxy for the two ledger calls a relay needs. The
    //! upstream RPC URL (which embeds the provider key) only ever lives in
    //! this process's environment.

    use crate::transport::{
        explorer_url, mentions_caller_restriction, BlockhashResponse, ProxyErrorBody,
        RelayResponse, INVALID_DESTINATION_CALLER_CODE,
    };
    use async_trait::async_trait;
    use axum::{
        body::Bytes,
        extract::State,
        http::{header, HeaderMap, HeaderValue, StatusCode},
        response::{IntoResponse, Json, Response},
        routing::get,
        routing::post,
        Router,
    };
    use serde::Deserialize;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use std::time::Duration;
    use tracing::{error, info};

    #[derive(Debug, Clone, PartialEq)]
    pub enum UpstreamError {
        /// The JSON-RPC `error` object.
        Rpc(Value),
        Transport(String),
    }

    #[async_trait]
    pub trait JsonRpcUpstream: Send + Sync {
        async fn call(&self, method: &str, params: Value) -> Result<Value, UpstreamError>;
    }

    pub struct HttpJsonRpcUpstream {
        client: reqwest::Client,
        url: String,
    }

    #[derive(Deserialize)]
    struct JsonRpcReply {
        #[serde(default)]
        result: Option<Value>,
        #[serde(default)]
        error: Option<Value>,
    }

    impl HttpJsonRpcUpstream {
        pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, UpstreamError> {
            let client = reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| UpstreamError::Transport(e.to_string()))?;
            Ok(Self {
                client,
                url: url.into(),
            })
        }

        /// `None` when the variable is unset or empty.
        pub fn from_env(var: &str, timeout: Duration) -> Option<Self> {
            let url = std::env::var(var).ok().filter(|url| !url.trim().is_empty())?;
            Self::new(url, timeout).ok()
        }
    }

    #[async_trait]
    impl JsonRpcUpstream for HttpJsonRpcUpstream {
        async fn call(&self, method: &str, params: Value) -> Result<Value, UpstreamError> {
            let response = self
                .client
                .post(&self.url)
                .json(&json!({
                    "jsonrpc": "2.0",
                    "id": 1,
                    "method": method,
                    "params": params,
                }))
                .send()
                .await
                .map_err(|e| UpstreamError::Transport(e.to_string()))?;

            // Rate limits and overloads come back as non-2xx, sometimes with a
            // JSON-RPC error body. The node never evaluated the call.
            let status = response.status();
            if !status.is_success() {
                return Err(UpstreamError::Transport(format!(
                    "upstream answered {status}"
                )));
            }

            let reply: JsonRpcReply = response
                .json()
                .await
                .map_err(|e| UpstreamError::Transport(e.to_string()))?;

            match (reply.error, reply.result) {
                (Some(error), _) => Err(UpstreamError::Rpc(error)),
                (None, Some(result)) => Ok(result),
                (None, None) => Err(UpstreamError::Transport(
                    "reply has neither result nor error".to_string(),
                )),
            }
        }
    }

    #[derive(Clone)]
    pub struct AppState {
        pub upstream: Option<Arc<dyn JsonRpcUpstream>>,
        pub allowed_origins: Vec<String>,
    }

    fn cors_headers(state: &AppState, origin: Option<&str>, methods: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::VARY, HeaderValue::from_static("Origin"));

        if let Some(origin) = origin.filter(|o| state.allowed_origins.iter().any(|a| a == o)) {
            if let Ok(value) = HeaderValue::from_str(origin) {
                headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
                headers.insert(
                    header::ACCESS_CONTROL_ALLOW_METHODS,
                    HeaderValue::from_static(methods),
                );
                headers.insert(
                    header::ACCESS_CONTROL_ALLOW_HEADERS,
                    HeaderValue::from_static("Content-Type"),
                );
            }
        }
        headers
    }

    fn origin(headers: &HeaderMap) -> Option<&str> {
        headers.get(header::ORIGIN).and_then(|v| v.to_str().ok())
    }

    fn error_body(message: &str) -> ProxyErrorBody {
        ProxyErrorBody {
            error: message.to_string(),
            details: None,
            code: None,
        }
    }

    /// Shared gate: origin allowlist, then a configured upstream.
    fn admit<'a>(
        state: &'a AppState,
        request_headers: &HeaderMap,
        cors: &HeaderMap,
    ) -> Result<&'a Arc<dyn JsonRpcUpstream>, Response> {
        if let Some(origin) = origin(request_headers) {
            if !state.allowed_origins.iter().any(|a| a == origin) {
                return Err((
                    StatusCode::FORBIDDEN,
                    cors.clone(),
                    Json(error_body("Origin not allowed")),
                )
                    .into_response());
            }
        }

        state.upstream.as_ref().ok_or_else(|| {
            error!("upstream rpc url not configured");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                cors.clone(),
                Json(error_body("Server misconfigured")),
            )
                .into_response()
        })
    }

    pub async fn blockhash_preflight(
        State(state): State<Arc<AppState>>,
        headers: HeaderMap,
    ) -> impl IntoResponse {
        (StatusCode::OK, cors_headers(&state, origin(&headers), "GET, OPTIONS"))
    }

    pub async fn relay_preflight(
        State(state): State<Arc<AppState>>,
        headers: HeaderMap,
    ) -> impl IntoResponse {
        (StatusCode::OK, cors_headers(&state, origin(&headers), "POST, OPTIONS"))
    }

    pub async fn get_blockhash(
        State(state): State<Arc<AppState>>,
        headers: HeaderMap,
    ) -> Response {
        let cors = cors_headers(&state, origin(&headers), "GET, OPTIONS");
        let upstream = match admit(&state, &headers, &cors) {
            Ok(upstream) => upstream,
            Err(response) => return response,
        };

        let result = upstream
            .call("getLatestBlockhash", json!([{ "commitment": "finalized" }]))
            .await;

        match result {
            Ok(result) => match serde_json::from_value::<BlockhashResponse>(result["value"].clone()) {
                Ok(body) => (StatusCode::OK, cors, Json(body)).into_response(),
                Err(e) => {
                    error!(error = %e, "unexpected getLatestBlockhash result");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        cors,
                        Json(error_body("Failed to fetch blockhash")),
                    )
                        .into_response()
                }
            },
            Err(UpstreamError::Rpc(rpc_error)) => {
                let message = rpc_error["message"].as_str().unwrap_or("rpc error");
                (StatusCode::BAD_REQUEST, cors, Json(error_body(message))).into_response()
            }
            Err(UpstreamError::Transport(e)) => {
                error!(error = %e, "blockhash fetch failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    cors,
                    Json(error_body("Failed to fetch blockhash")),
                )
                    .into_response()
            }
        }
    }

    fn signed_transaction(body: &[u8]) -> Option<String> {
        let value: Value = serde_json::from_slice(body).ok()?;
        value
            .get("signedTransaction")?
            .as_str()
            .filter(|tx| !tx.is_empty())
            .map(str::to_string)
    }

    /// Rejections whose program output names the destination-caller check
    /// carry a machine-readable `code`.
    fn relay_rejection(rpc_error: Value) -> ProxyErrorBody {
        let mut body = ProxyErrorBody {
            error: rpc_error["message"]
                .as_str()
                .unwrap_or("Transaction rejected")
                .to_string(),
            details: Some(rpc_error),
            code: None,
        };

        if mentions_caller_restriction(&body.error)
            || body.logs().iter().any(|line| mentions_caller_restriction(line))
        {
            body.error = "This message restricts which wallet may relay it (non-zero destination caller). \
                          Only the designated caller can complete this relay."
                .to_string();
            body.code = Some(INVALID_DESTINATION_CALLER_CODE.to_string());
        }
        body
    }

    pub async fn post_relay(
        State(state): State<Arc<AppState>>,
        headers: HeaderMap,
        body: Bytes,
    ) -> Response {
        let cors = cors_headers(&state, origin(&headers), "POST, OPTIONS");
        let upstream = match admit(&state, &headers, &cors) {
            Ok(upstream) => upstream,
            Err(response) => return response,
        };

        let Some(signed_transaction) = signed_transaction(&body) else {
            return (
                StatusCode::BAD_REQUEST,
                cors,
                Json(error_body("Missing signedTransaction in request body")),
            )
                .into_response();
        };

        let result = upstream
            .call(
                "sendTransaction",
                json!([
                    signed_transaction,
                    {
                        "encoding": "base64",
                        "skipPreflight": false,
                        "preflightCommitment": "finalized",
                    }
                ]),
            )
            .await;

        match result {
            Ok(Value::String(signature)) => {
                info!(%signature, "relayed transaction");
                let explorer_url = explorer_url(&signature);
                (
                    StatusCode::OK,
                    cors,
                    Json(RelayResponse {
                        signature,
                        explorer_url,
                    }),
                )
                    .into_response()
            }
            Ok(other) => {
                error!(result = %other, "unexpected sendTransaction result");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    cors,
                    Json(error_body("Failed to relay transaction")),
                )
                    .into_response()
            }
            Err(UpstreamError::Rpc(rpc_error)) => {
                (StatusCode::BAD_REQUEST, cors, Json(relay_rejection(rpc_error))).into_response()
            }
            Err(UpstreamError::Transport(e)) => {
                error!(error = %e, "relay failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    cors,
                    Json(error_body("Failed to relay transaction")),
                )
                    .into_response()
            }
        }
    }

    pub fn router(state: Arc<AppState>) -> Router {
        Router::new()
            .route(
                "/api/blockhash",
                get(get_blockhash).options(blockhash_preflight),
            )
            .route("/api/relay", post(post_relay).options(relay_preflight))
            .with_state(state)
    }

}
