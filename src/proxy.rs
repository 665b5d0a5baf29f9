use std::sync::Arc;
use std::time::Duration;
use serde_json::Value;
use log::{debug, error, info, trace};

/// Fixed system instruction. Client-supplied instructions never replace it.
pub const SYSTEM_INSTRUCTION: &str = "\
You are a JSON generator. Read the user's request and answer with exactly one \
JSON object or JSON array that fulfils it. Output only the JSON document: no \
prose, no explanations, no comments, no markdown code fences. When the user \
asks for a list, wrap it in an object or return an array. Use realistic \
values and consistent key names.";

/// Calls the model and enforces that it answered with JSON
#[derive(Clone)]
pub struct GenerationProxy
{   generator: Arc<dyn crate::providers::TextGenerator>
  , timeout: Duration
}

impl GenerationProxy
{   pub fn new(
      generator: Arc<dyn crate::providers::TextGenerator>
    , timeout: Duration
    ) -> Self
    {   GenerationProxy
        {   generator
          , timeout
        }
    }

    /// Generate a JSON document for `question`.
    ///
    /// Every failure returned here is an upstream failure; callers are
    /// expected to log it and answer with the generic message.
    pub async fn generate_json(
      &self
    , question: &str
    ) -> Result<Value, crate::error::Error>
    {   debug!("Generating JSON for a {}-byte prompt", question.len());

        let raw = tokio::time::timeout(
            self.timeout
          , self.generator.generate(SYSTEM_INSTRUCTION, question)
          )
          .await
          .map_err(|_| {
            error!("Model call exceeded {:?}", self.timeout);
            crate::error::Error::Timeout
          })??;

        trace!("Raw model output: {}", raw);
        let value = parse_generated(&raw)?;
        info!("Generated JSON document ({} bytes)", raw.len());
        Ok(value)
    }
}

/// Parse model output, accepting only a JSON object or array
pub fn parse_generated(raw: &str) -> Result<Value, crate::error::Error>
{   let value: Value = serde_json::from_str(raw.trim()).map_err(|e| {
      error!("Model returned invalid JSON: {}", e);
      crate::error::Error::ParseError(e.to_string())
    })?;
    match value
    {   Value::Object(_) | Value::Array(_) => Ok(value)
      , other => {
          error!("Model returned a bare JSON {}", json_type_name(&other));
          Err(crate::error::Error::ParseError(format!(
            "expected a JSON object or array, got {}",
            json_type_name(&other)
          )))
        }
    }
}

/// Name of a JSON value's type, safe to echo back to clients
pub fn json_type_name(value: &Value) -> &'static str
{   match value
    {   Value::Null => "null"
      , Value::Bool(_) => "boolean"
      , Value::Number(_) => "number"
      , Value::String(_) => "string"
      , Value::Array(_) => "array"
      , Value::Object(_) => "object"
    }
}
