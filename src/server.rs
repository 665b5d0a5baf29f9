use std::net::SocketAddr;
use std::sync::Arc;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use log::{debug, error, info, warn};

use crate::config::{CorsPolicy, ProxyConfig};
use crate::proxy::{json_type_name, GenerationProxy};
use crate::rate_limit::RateLimiter;
use crate::request::{
    ErrorBody, GenerationEnvelope, GENERATION_FAILURE_MESSAGE, RATE_LIMIT_MESSAGE,
};

pub type SharedState = Arc<AppState>;

/// Key used when a request carries no peer address
pub const UNKNOWN_CLIENT: &str = "unknown";

pub struct AppState
{   pub proxy: GenerationProxy
  , pub limiter: RateLimiter
  , pub body_limit: usize
  , pub trust_proxy: bool
}

impl AppState
{   pub fn new(
      generator: Arc<dyn crate::providers::TextGenerator>
    , config: &ProxyConfig
    ) -> Self
    {   AppState
        {   proxy: GenerationProxy::new(generator, config.upstream_timeout())
          , limiter: RateLimiter::from_config(&config.rate_limit)
          , body_limit: config.body_limit_bytes
          , trust_proxy: config.trust_proxy
        }
    }
}

/// Error response carrying `{ "error": message }`
#[derive(Debug)]
pub struct ApiError
{   status: StatusCode
  , message: String
}

impl ApiError
{   fn bad_request(message: impl Into<String>) -> Self
    {   ApiError
        {   status: StatusCode::BAD_REQUEST
          , message: message.into()
        }
    }

    fn payload_too_large(limit: usize) -> Self
    {   ApiError
        {   status: StatusCode::PAYLOAD_TOO_LARGE
          , message: format!("Request body exceeds {} bytes", limit)
        }
    }
}

impl From<crate::error::Error> for ApiError
{   fn from(e: crate::error::Error) -> Self
    {   match e
        {   crate::error::Error::RateLimitExceeded => ApiError
            {   status: StatusCode::TOO_MANY_REQUESTS
              , message: RATE_LIMIT_MESSAGE.to_string()
            }
          , other => {
              if !other.is_upstream()
              {   warn!("Unexpected error in generation path: {}", other);
              }
              ApiError
              {   status: StatusCode::INTERNAL_SERVER_ERROR
                , message: GENERATION_FAILURE_MESSAGE.to_string()
              }
            }
        }
    }
}

impl IntoResponse for ApiError
{   fn into_response(self) -> Response
    {   let body = ErrorBody
        {   error: self.message
        };
        (self.status, Json(body)).into_response()
    }
}

/// Build the router around shared state
pub fn build_router(state: SharedState, cors: &CorsPolicy) -> Router
{   Router::new()
      .route("/", post(generate))
      .with_state(state)
      .layer(cors_layer(cors))
}

/// Bind and serve until Ctrl-C or SIGTERM
pub async fn serve(
  config: ProxyConfig
, generator: Arc<dyn crate::providers::TextGenerator>
) -> Result<(), crate::error::Error>
{   let state = Arc::new(AppState::new(generator, &config));
    let router = build_router(state, &config.cors);
    let addr = config.listen_addr();
    info!("Binding HTTP listener on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(
        listener
      , router.into_make_service_with_connect_info::<SocketAddr>()
      )
      .with_graceful_shutdown(shutdown_signal())
      .await?;
    info!("HTTP server exited");
    Ok(())
}

fn cors_layer(policy: &CorsPolicy) -> CorsLayer
{   let layer = CorsLayer::new()
      .allow_methods([Method::POST, Method::OPTIONS])
      .allow_headers([header::CONTENT_TYPE]);
    match policy
    {   CorsPolicy::AnyOrigin => layer.allow_origin(Any)
      , CorsPolicy::Origins(origins) => {
          let parsed: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|o| match HeaderValue::from_str(o)
            {   Ok(v) => Some(v)
              , Err(_) => {
                  warn!("Ignoring invalid CORS origin: {}", o);
                  None
                }
            })
            .collect();
          layer.allow_origin(AllowOrigin::list(parsed))
        }
    }
}

async fn shutdown_signal()
{   let ctrl_c = async {
      let _ = signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
      use tokio::signal::unix::{signal, SignalKind};
      if let Ok(mut stream) = signal(SignalKind::terminate())
      {   let _ = stream.recv().await;
      }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select!
    {   _ = ctrl_c => {}
      , _ = terminate => {}
    }
    info!("Shutdown signal received");
}

/// Rate-limit key for a request.
///
/// Behind a trusted proxy the key is the last `X-Forwarded-For` hop, the
/// one the proxy appended itself. Earlier hops are client-supplied.
pub fn client_key(request: &Request, trust_proxy: bool) -> String
{   if trust_proxy
    {   let forwarded = request.headers()
          .get("x-forwarded-for")
          .and_then(|v| v.to_str().ok())
          .and_then(|v| v.rsplit(',').next())
          .map(|v| v.trim())
          .filter(|v| !v.is_empty());
        if let Some(addr) = forwarded
        {   return addr.to_string();
        }
    }
    request.extensions()
      .get::<ConnectInfo<SocketAddr>>()
      .map(|ConnectInfo(addr)| addr.ip().to_string())
      .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

async fn generate(
  State(state): State<SharedState>
, request: Request
) -> Result<Json<GenerationEnvelope>, ApiError>
{   // Counted before the body is read
    let key = client_key(&request, state.trust_proxy);
    state.limiter.check(&key)?;

    let bytes = axum::body::to_bytes(request.into_body(), state.body_limit)
      .await
      .map_err(|e| {
        warn!("Rejecting body from {}: {}", key, e);
        ApiError::payload_too_large(state.body_limit)
      })?;

    let question = extract_question(&bytes)?;
    debug!("Accepted prompt from {}", key);

    match state.proxy.generate_json(&question).await
    {   Ok(data) => Ok(Json(GenerationEnvelope::ok(data)))
      , Err(e) => {
          error!("Generation failed for {}: {}", key, e);
          Err(ApiError::from(e))
        }
    }
}

/// Pull the `question` string out of a request body
fn extract_question(bytes: &[u8]) -> Result<String, ApiError>
{   let body: Value = serde_json::from_slice(bytes).map_err(|_| {
      ApiError::bad_request(
        "Request body must be a JSON object with a \"question\" string"
      )
    })?;

    match body.get("question")
    {   Some(Value::String(q)) if !q.trim().is_empty() => Ok(q.clone())
      , Some(Value::String(_)) => Err(ApiError::bad_request(
          "The \"question\" field must not be empty"
        ))
      , Some(other) => Err(ApiError::bad_request(format!(
          "The \"question\" field must be a string, received {}",
          json_type_name(other)
        )))
      , None => Err(ApiError::bad_request(format!(
          "Missing \"question\" field; received {}",
          describe_received(&body)
        )))
    }
}

/// Shape of a received body, without its contents
fn describe_received(body: &Value) -> String
{   match body
    {   Value::Object(map) if map.is_empty() => "an empty object".to_string()
      , Value::Object(map) => {
          let keys: Vec<&str> = map.keys().map(|k| k.as_str()).collect();
          format!("an object with fields [{}]", keys.join(", "))
        }
      , other => format!("a JSON {}", json_type_name(other))
    }
}
