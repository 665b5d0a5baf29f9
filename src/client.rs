use async_trait::async_trait;
use serde_json::Value;
use log::{debug, error, trace, warn};

use crate::request::{GenerationRequest, CONNECTION_FAILURE_MESSAGE};
use crate::GenerationResult;

/// Sends one generation request and always settles on a result
#[async_trait]
pub trait GenerationTransport: Send + Sync
{   async fn request(&self, request: GenerationRequest) -> GenerationResult;
}

/// HTTP transport posting to the proxy endpoint
#[derive(Debug, Clone)]
pub struct ProxyClient
{   endpoint: String
  , http_client: reqwest::Client
}

impl ProxyClient
{   pub fn new(
      endpoint: String
    , timeout: std::time::Duration
    ) -> Result<Self, crate::error::Error>
    {   debug!("Creating ProxyClient for {}", endpoint);
        let http_client = reqwest::Client::builder()
          .timeout(timeout)
          .build()
          .map_err(|e| {
            error!("Failed to build HTTP client: {}", e);
            crate::error::Error::HttpError(e.to_string())
          })?;
        Ok(ProxyClient
        {   endpoint
          , http_client
        })
    }

    pub fn from_config(
      config: &crate::config::ClientConfig
    ) -> Result<Self, crate::error::Error>
    {   ProxyClient::new(config.endpoint.clone(), config.request_timeout())
    }

    pub fn endpoint(&self) -> &str
    {   &self.endpoint
    }
}

#[async_trait]
impl GenerationTransport for ProxyClient
{   async fn request(&self, request: GenerationRequest) -> GenerationResult
    {   trace!("Posting generation request: {:?}", request);

        let response = match self.http_client
          .post(&self.endpoint)
          .json(&request)
          .send()
          .await
        {   Ok(r) => r
          , Err(e) => {
              warn!("Proxy unreachable: {}", e);
              return GenerationResult::Failure(
                CONNECTION_FAILURE_MESSAGE.to_string()
              );
            }
        };

        let status = response.status();
        debug!("Proxy response status: {}", status);

        let body = match response.json::<Value>().await
        {   Ok(b) => Some(b)
          , Err(e) => {
              warn!("Proxy response body is not JSON: {}", e);
              None
            }
        };

        interpret_response(status.is_success(), body)
    }
}

/// Map a proxy response onto a [`GenerationResult`].
///
/// An `error` string wins over everything else. A success needs both a
/// 2xx status and the `{ success: true, data }` envelope.
pub fn interpret_response(
  status_ok: bool
, body: Option<Value>
) -> GenerationResult
{   let body = match body
    {   Some(b) => b
      , None => {
          return GenerationResult::Failure(
            CONNECTION_FAILURE_MESSAGE.to_string()
          );
        }
    };

    if let Some(message) = body.get("error").and_then(|e| e.as_str())
    {   return GenerationResult::Failure(message.to_string());
    }

    let succeeded = body.get("success")
      .and_then(|s| s.as_bool())
      .unwrap_or(false);

    match body.get("data")
    {   Some(data) if status_ok && succeeded => {
          GenerationResult::Success(data.clone())
        }
      , _ => GenerationResult::Failure(
          CONNECTION_FAILURE_MESSAGE.to_string()
        )
    }
}
