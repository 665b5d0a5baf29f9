use std::fmt;

/// Custom error type for jsongen operations
/// Implements Clone for sending through channels
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error
{   /// Prompt was empty after trimming
    Validation(String)
  , /// A generation is already in flight
    Busy
  , /// Submission disabled until the cooldown elapses
    CoolingDown(u32)
  , /// Per-client request window exhausted
    RateLimitExceeded
  , /// API key is missing for the model provider
    MissingApiKey(String)
  , /// HTTP request error
    HttpError(String)
  , /// API returned an error response
    ApiError(String)
  , /// Failed to parse a response or the generated payload
    ParseError(String)
  , /// No choices in API response
    NoChoicesInResponse
  , /// Invalid configuration
    InvalidConfiguration(String)
  , /// Timeout error
    Timeout
  , /// Clipboard could not be reached or written
    Clipboard(String)
  , /// Filesystem error while staging or saving a download
    Io(String)
  , /// Controller task is gone
    Disconnected
  , /// Generic error
    Other(String)
}

impl Error
{   /// Whether this error came from the model call and must be
    /// collapsed to the generic message before leaving the server.
    pub fn is_upstream(&self) -> bool
    {   matches!(
          self
        , Error::MissingApiKey(_)
          | Error::HttpError(_)
          | Error::ApiError(_)
          | Error::ParseError(_)
          | Error::NoChoicesInResponse
          | Error::Timeout
        )
    }
}

impl fmt::Display for Error
{   fn fmt(&self, f: &mut fmt::Formatter<'_>)
      -> fmt::Result
    {   match self
        {   Error::Validation(msg) => {
              write!(f, "{}", msg)
            }
          , Error::Busy => {
              write!(f, "A generation is already in progress")
            }
          , Error::CoolingDown(secs) => {
              write!(f,
                "Please wait {} seconds before generating again",
                secs
              )
            }
          , Error::RateLimitExceeded => {
              write!(f, "{}", crate::request::RATE_LIMIT_MESSAGE)
            }
          , Error::MissingApiKey(provider) => {
              write!(f, "Missing API key for: {}", provider)
            }
          , Error::HttpError(msg) => {
              write!(f, "HTTP error: {}", msg)
            }
          , Error::ApiError(msg) => {
              write!(f, "API error: {}", msg)
            }
          , Error::ParseError(msg) => {
              write!(f, "Parse error: {}", msg)
            }
          , Error::NoChoicesInResponse => {
              write!(f, "API response contained no choices")
            }
          , Error::InvalidConfiguration(msg) => {
              write!(f, "Invalid configuration: {}", msg)
            }
          , Error::Timeout => {
              write!(f, "Request timed out")
            }
          , Error::Clipboard(msg) => {
              write!(f, "Clipboard error: {}", msg)
            }
          , Error::Io(msg) => {
              write!(f, "I/O error: {}", msg)
            }
          , Error::Disconnected => {
              write!(f, "Controller disconnected")
            }
          , Error::Other(msg) => {
              write!(f, "Error: {}", msg)
            }
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error
{   fn from(e: std::io::Error) -> Self
    {   Error::Io(e.to_string())
    }
}

impl From<String> for Error
{   fn from(s: String) -> Self
    {   Error::Other(s)
    }
}

impl From<&str> for Error
{   fn from(s: &str) -> Self
    {   Error::Other(s.to_string())
    }
}
