use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;
use log::debug;

pub const DEFAULT_API_BASE: &str = "https://api.mistral.ai/v1";
pub const DEFAULT_MODEL: &str = "mistral-small-latest";
pub const DEFAULT_DOWNLOAD_NAME: &str = "generated.json";

/// Allowed CORS origins
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CorsPolicy
{   AnyOrigin
  , Origins(Vec<String>)
}

/// Fixed-window rate limit settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig
{   /// Requests allowed per window and key
    pub max_requests: u32
  , /// Window length in seconds
    pub window_secs: u64
}

impl RateLimitConfig
{   pub fn window(&self) -> Duration
    {   Duration::from_secs(self.window_secs)
    }
}

impl Default for RateLimitConfig
{   fn default() -> Self
    {   RateLimitConfig
        {   max_requests: 50
          , window_secs: 15 * 60
        }
    }
}

/// Proxy service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig
{   /// Listen address
    pub host: IpAddr
  , /// Listen port
    pub port: u16
  , /// Model provider credential
    pub api_key: String
  , /// Provider API base URL
    pub api_base: String
  , /// Model name
    pub model: String
  , /// Upper bound on one model call, in seconds
    pub upstream_timeout_secs: u64
  , /// Request body cap in bytes
    pub body_limit_bytes: usize
  , pub cors: CorsPolicy
  , pub rate_limit: RateLimitConfig
  , /// Key clients by the first `X-Forwarded-For` hop
    pub trust_proxy: bool
}

impl ProxyConfig
{   /// Config with defaults for everything but the credential
    pub fn new(api_key: String) -> Self
    {   ProxyConfig
        {   host: IpAddr::V4(Ipv4Addr::UNSPECIFIED)
          , port: 3000
          , api_key
          , api_base: DEFAULT_API_BASE.to_string()
          , model: DEFAULT_MODEL.to_string()
          , upstream_timeout_secs: 30
          , body_limit_bytes: 1024 * 1024
          , cors: CorsPolicy::AnyOrigin
          , rate_limit: RateLimitConfig::default()
          , trust_proxy: false
        }
    }

    /// Load from process environment
    pub fn from_env() -> Result<Self, crate::error::Error>
    {   Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary variable lookup, then validate
    pub fn from_lookup<F>(lookup: F)
      -> Result<Self, crate::error::Error>
    where
      F: Fn(&str) -> Option<String>
    {   let api_key = lookup("MISTRAL_API_KEY")
          .filter(|k| !k.trim().is_empty())
          .ok_or_else(|| crate::error::Error::MissingApiKey(
            "MISTRAL_API_KEY".to_string()
          ))?;

        let mut config = ProxyConfig::new(api_key);

        if let Some(host) = lookup("JSONGEN_HOST")
        {   config.host = parse_var("JSONGEN_HOST", &host)?;
        }
        if let Some(port) = lookup("JSONGEN_PORT")
        {   config.port = parse_var("JSONGEN_PORT", &port)?;
        }
        if let Some(base) = lookup("JSONGEN_API_BASE")
        {   config.api_base = base.trim_end_matches('/').to_string();
        }
        if let Some(model) = lookup("JSONGEN_MODEL")
        {   config.model = model;
        }
        if let Some(secs) = lookup("JSONGEN_UPSTREAM_TIMEOUT_SECS")
        {   config.upstream_timeout_secs
              = parse_var("JSONGEN_UPSTREAM_TIMEOUT_SECS", &secs)?;
        }
        if let Some(bytes) = lookup("JSONGEN_BODY_LIMIT_BYTES")
        {   config.body_limit_bytes
              = parse_var("JSONGEN_BODY_LIMIT_BYTES", &bytes)?;
        }
        if let Some(origins) = lookup("JSONGEN_CORS_ORIGINS")
        {   config.cors = parse_cors(&origins);
        }
        if let Some(max) = lookup("JSONGEN_RATE_LIMIT_MAX")
        {   config.rate_limit.max_requests
              = parse_var("JSONGEN_RATE_LIMIT_MAX", &max)?;
        }
        if let Some(secs) = lookup("JSONGEN_RATE_LIMIT_WINDOW_SECS")
        {   config.rate_limit.window_secs
              = parse_var("JSONGEN_RATE_LIMIT_WINDOW_SECS", &secs)?;
        }
        if let Some(flag) = lookup("JSONGEN_TRUST_PROXY")
        {   config.trust_proxy = parse_flag("JSONGEN_TRUST_PROXY", &flag)?;
        }

        config.validate()?;
        debug!(
          "Loaded proxy config: {}:{} model={} window={}s max={}"
        , config.host
        , config.port
        , config.model
        , config.rate_limit.window_secs
        , config.rate_limit.max_requests
        );
        Ok(config)
    }

    /// Reject values the service cannot run with
    pub fn validate(&self) -> Result<(), crate::error::Error>
    {   let invalid = |msg: &str| -> Result<(), crate::error::Error>
        {   Err(crate::error::Error::InvalidConfiguration(
              msg.to_string()
            ))
        };
        if self.api_key.trim().is_empty()
        {   return invalid("api key must not be empty");
        }
        if !self.api_base.starts_with("http://")
          && !self.api_base.starts_with("https://")
        {   return invalid("api base must be an http(s) URL");
        }
        if self.model.trim().is_empty()
        {   return invalid("model must not be empty");
        }
        if self.upstream_timeout_secs == 0
        {   return invalid("upstream timeout must be positive");
        }
        if self.body_limit_bytes == 0
        {   return invalid("body limit must be positive");
        }
        if self.rate_limit.max_requests == 0
        {   return invalid("rate limit max must be positive");
        }
        if self.rate_limit.window_secs == 0
        {   return invalid("rate limit window must be positive");
        }
        if let CorsPolicy::Origins(origins) = &self.cors
        {   if origins.is_empty()
            {   return invalid("at least one CORS origin is required");
            }
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> SocketAddr
    {   SocketAddr::new(self.host, self.port)
    }

    pub fn upstream_timeout(&self) -> Duration
    {   Duration::from_secs(self.upstream_timeout_secs)
    }
}

/// Client controller configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig
{   /// Proxy URL the prompt is posted to
    pub endpoint: String
  , /// Quiet period after a successful generation, in seconds
    pub cooldown_secs: u32
  , /// How long the copied/downloaded indicators stay raised
    pub flash_ms: u64
  , /// Client-side bound on the proxy call
    pub request_timeout_secs: u64
  , /// Default name offered for downloads
    pub download_file_name: String
  , /// Where downloads are staged before saving; system temp dir if unset
    #[serde(default)]
    pub staging_dir: Option<PathBuf>
}

impl Default for ClientConfig
{   fn default() -> Self
    {   ClientConfig
        {   endpoint: "http://127.0.0.1:3000/".to_string()
          , cooldown_secs: 10
          , flash_ms: 3000
          , request_timeout_secs: 60
          , download_file_name: DEFAULT_DOWNLOAD_NAME.to_string()
          , staging_dir: None
        }
    }
}

impl ClientConfig
{   pub fn from_env() -> Result<Self, crate::error::Error>
    {   Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F)
      -> Result<Self, crate::error::Error>
    where
      F: Fn(&str) -> Option<String>
    {   let mut config = ClientConfig::default();
        if let Some(endpoint) = lookup("JSONGEN_ENDPOINT")
        {   config.endpoint = endpoint;
        }
        if let Some(secs) = lookup("JSONGEN_COOLDOWN_SECS")
        {   config.cooldown_secs = parse_var("JSONGEN_COOLDOWN_SECS", &secs)?;
        }
        if let Some(ms) = lookup("JSONGEN_FLASH_MS")
        {   config.flash_ms = parse_var("JSONGEN_FLASH_MS", &ms)?;
        }
        if let Some(secs) = lookup("JSONGEN_REQUEST_TIMEOUT_SECS")
        {   config.request_timeout_secs
              = parse_var("JSONGEN_REQUEST_TIMEOUT_SECS", &secs)?;
        }
        if !config.endpoint.starts_with("http://")
          && !config.endpoint.starts_with("https://")
        {   return Err(crate::error::Error::InvalidConfiguration(
              "endpoint must be an http(s) URL".to_string()
            ));
        }
        if config.request_timeout_secs == 0
        {   return Err(crate::error::Error::InvalidConfiguration(
              "request timeout must be positive".to_string()
            ));
        }
        Ok(config)
    }

    pub fn flash(&self) -> Duration
    {   Duration::from_millis(self.flash_ms)
    }

    pub fn request_timeout(&self) -> Duration
    {   Duration::from_secs(self.request_timeout_secs)
    }

    pub fn staging_dir(&self) -> PathBuf
    {   self.staging_dir
          .clone()
          .unwrap_or_else(std::env::temp_dir)
    }
}

fn parse_var<T>(name: &str, raw: &str)
  -> Result<T, crate::error::Error>
where
  T: std::str::FromStr
{   raw.trim().parse().map_err(|_| {
      crate::error::Error::InvalidConfiguration(
        format!("{} has an invalid value: {}", name, raw)
      )
    })
}

fn parse_flag(name: &str, raw: &str)
  -> Result<bool, crate::error::Error>
{   match raw.trim().to_ascii_lowercase().as_str()
    {   "1" | "true" | "yes" | "on" => Ok(true)
      , "0" | "false" | "no" | "off" | "" => Ok(false)
      , _ => Err(crate::error::Error::InvalidConfiguration(
          format!("{} must be a boolean, got: {}", name, raw)
        ))
    }
}

fn parse_cors(raw: &str) -> CorsPolicy
{   let origins: Vec<String> = raw
      .split(',')
      .map(|o| o.trim())
      .filter(|o| !o.is_empty())
      .map(|o| o.to_string())
      .collect();
    if origins.iter().any(|o| o == "*")
    {   CorsPolicy::AnyOrigin
    } else
    {   CorsPolicy::Origins(origins)
    }
}
