use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use log::{debug, trace, error};

/// Sampling temperature for JSON generation
const JSON_TEMPERATURE: f32 = 0.2;

const MAX_RESPONSE_TOKENS: usize = 4096;

// ===== Message Types =====

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage
{   pub role: String
  , pub content: String
}

impl ChatMessage
{   fn system(content: &str) -> Self
    {   ChatMessage
        {   role: "system".to_string()
          , content: content.to_string()
        }
    }

    fn user(content: &str) -> Self
    {   ChatMessage
        {   role: "user".to_string()
          , content: content.to_string()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseFormat
{   #[serde(rename = "type")]
    pub kind: String
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MistralChatRequest
{   pub model: String
  , pub messages: Vec<ChatMessage>
  , #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<usize>
  , #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>
  , #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>
  , #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>
}

#[derive(Debug, Clone, Deserialize)]
pub struct MistralChatResponse
{   pub choices: Vec<Choice>
}

#[derive(Debug, Clone, Deserialize)]
pub struct Choice
{   pub message: ChatMessage
  , pub finish_reason: Option<String>
}

// ===== Mistral Client =====

/// Chat-completions client for Mistral and compatible APIs
#[derive(Debug, Clone)]
pub struct MistralClient
{   api_key: String
  , api_base: String
  , model: String
  , http_client: reqwest::Client
}

impl MistralClient
{   /// Build a client; `timeout` bounds each HTTP exchange
    pub fn new(
      api_key: String
    , api_base: String
    , model: String
    , timeout: std::time::Duration
    ) -> Result<Self, crate::error::Error>
    {   debug!("Creating MistralClient for model: {}", model);
        if api_key.trim().is_empty()
        {   error!("No API key for model: {}", model);
            return Err(crate::error::Error::MissingApiKey(
              format!("Mistral:{}", model)
            ));
        }
        let http_client = reqwest::Client::builder()
          .timeout(timeout)
          .build()
          .map_err(|e| {
            error!("Failed to build HTTP client: {}", e);
            crate::error::Error::HttpError(e.to_string())
          })?;
        Ok(MistralClient
        {   api_key
          , api_base: api_base.trim_end_matches('/').to_string()
          , model
          , http_client
        })
    }

    /// Build from the proxy configuration
    pub fn from_config(
      config: &crate::config::ProxyConfig
    ) -> Result<Self, crate::error::Error>
    {   MistralClient::new(
          config.api_key.clone()
        , config.api_base.clone()
        , config.model.clone()
        , config.upstream_timeout()
        )
    }

    pub fn model(&self) -> &str
    {   &self.model
    }

    fn chat_request(
      &self
    , system_instruction: &str
    , user_prompt: &str
    ) -> MistralChatRequest
    {   MistralChatRequest
        {   model: self.model.clone()
          , messages: vec![
              ChatMessage::system(system_instruction)
            , ChatMessage::user(user_prompt)
            ]
          , max_tokens: Some(MAX_RESPONSE_TOKENS)
          , temperature: Some(JSON_TEMPERATURE)
          , response_format: Some(ResponseFormat
            {   kind: "json_object".to_string()
            })
          , stream: Some(false)
        }
    }
}

#[async_trait]
impl crate::providers::TextGenerator for MistralClient
{   async fn generate(
      &self
    , system_instruction: &str
    , user_prompt: &str
    ) -> Result<String, crate::error::Error>
    {   debug!("Handling generate for: {}", self.model);

        let request = self.chat_request(system_instruction, user_prompt);
        trace!("Mistral request: {:?}", request);

        let response = self.http_client
          .post(format!("{}/chat/completions", self.api_base))
          .header("Authorization", format!("Bearer {}", self.api_key))
          .header("Content-Type", "application/json")
          .json(&request)
          .send()
          .await
          .map_err(|e| {
            error!("HTTP error: {}", e);
            if e.is_timeout()
            {   crate::error::Error::Timeout
            } else
            {   crate::error::Error::HttpError(e.to_string())
            }
          })?;

        let status = response.status();
        trace!("Mistral response status: {}", status);

        if !status.is_success()
        {   let error_text = response.text().await
              .unwrap_or_else(|_|
                "Unknown error".to_string()
              );
            error!("Mistral API error ({}): {}", status, error_text);
            return Err(crate::error::Error::ApiError(
              format!("Mistral error ({}): {}", status, error_text)
            ));
        }

        let chat_response: MistralChatResponse
          = response.json().await.map_err(|e| {
            error!("Parse error: {}", e);
            crate::error::Error::ParseError(e.to_string())
          })?;

        chat_response.choices.into_iter().next()
          .map(|c| {
            trace!("Finish reason: {:?}", c.finish_reason);
            c.message.content
          })
          .ok_or_else(|| {
            error!("No choices in response");
            crate::error::Error::NoChoicesInResponse
          })
    }
}
