use serde::{Deserialize, Serialize};

/// Shown inline when the prompt is blank
pub const PROMPT_REQUIRED_MESSAGE: &str
  = "Please enter your instructions before generating.";

/// Shown when the proxy cannot be reached or answers without an error text
pub const CONNECTION_FAILURE_MESSAGE: &str
  = "Failed to fetch response. Please try again.";

/// Returned with HTTP 429
pub const RATE_LIMIT_MESSAGE: &str
  = "Too many requests, please try again later.";

/// Returned with HTTP 500; upstream causes are only logged
pub const GENERATION_FAILURE_MESSAGE: &str
  = "Internal error while generating JSON.";

/// Instruction the client sends along with the question. The proxy
/// accepts it but always substitutes its own system instruction.
pub const CLIENT_INSTRUCTION: &str
  = "You are an agent that extracts or gathers information to generate a JSON document.";

/// Body of `POST /`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest
{   /// Client-side instruction (ignored by the proxy)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instruction: Option<String>
  , /// The user's prompt
    pub question: String
}

impl GenerationRequest
{   pub fn new(prompt: &crate::Prompt) -> Self
    {   GenerationRequest
        {   instruction: Some(CLIENT_INSTRUCTION.to_string())
          , question: prompt.as_str().to_string()
        }
    }
}

/// Successful response envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationEnvelope
{   pub success: bool
  , pub data: serde_json::Value
}

impl GenerationEnvelope
{   pub fn ok(data: serde_json::Value) -> Self
    {   GenerationEnvelope
        {   success: true
          , data
        }
    }
}

/// Error response body, shared by every non-2xx status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody
{   pub error: String
}
