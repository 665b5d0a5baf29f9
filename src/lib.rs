pub mod error;
pub mod config;
pub mod providers;
pub mod request;
pub mod rate_limit;
pub mod proxy;
pub mod server;
pub mod client;
pub mod artifact;
pub mod controller;

pub use controller::{ClientController, ControllerSnapshot, UiState};
pub use proxy::GenerationProxy;
pub use rate_limit::RateLimiter;

/*

jsongen turns a natural-language description into a JSON document.

jsongen/
├── src/
│   ├── lib.rs          # Shared types and controller message API
│   ├── error.rs        # Error type shared by client and server
│   ├── config.rs       # Proxy and client configuration
│   ├── request.rs      # Wire types and user-facing messages
│   ├── providers/      # Model providers behind `TextGenerator`
│   ├── proxy.rs        # Model call + JSON output contract
│   ├── rate_limit.rs   # Fixed-window limiter per client
│   ├── server.rs       # axum route for the proxy
│   ├── client.rs       # HTTP transport to the proxy
│   ├── artifact.rs     # Display, clipboard and download forms
│   ├── controller.rs   # Client state machine task
│   └── bin/            # jsongen-proxy and jsongen
└── tests/

*/

/// JSONGEN STRUCTURES:

/// User prompt, guaranteed non-empty after trimming
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt(String);

impl Prompt
{   /// Trim `input`; fails with a validation error when nothing is left
    pub fn parse(input: &str) -> Result<Self, crate::error::Error>
    {   let trimmed = input.trim();
        if trimmed.is_empty()
        {   return Err(crate::error::Error::Validation(
              crate::request::PROMPT_REQUIRED_MESSAGE.to_string()
            ));
        }
        Ok(Prompt(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str
    {   &self.0
    }
}

/// Outcome of one generation request
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationResult
{   /// The generated document
    Success(serde_json::Value)
  , /// Message to show the user
    Failure(String)
}

impl GenerationResult
{   pub fn is_success(&self) -> bool
    {   matches!(self, GenerationResult::Success(_))
    }
}

/// CONTROLLER API:

// ===== Submit =====

pub type SubmitReply = Result<(), crate::error::Error>;
pub type SubmitReplySender
  = tokio::sync::mpsc::UnboundedSender<SubmitReply>;

pub struct SubmitArgs
{   pub input: String
  , pub reply: SubmitReplySender
}

// ===== CopyToClipboard =====

/// `Ok(false)` when there was nothing to copy
pub type CopyReply = Result<bool, crate::error::Error>;
pub type CopyReplySender
  = tokio::sync::mpsc::UnboundedSender<CopyReply>;

pub struct CopyArgs
{   pub reply: CopyReplySender
}

// ===== DownloadAsFile =====

/// `Ok(None)` when there was nothing to save or the target cancelled
pub type DownloadReply
  = Result<Option<std::path::PathBuf>, crate::error::Error>;
pub type DownloadReplySender
  = tokio::sync::mpsc::UnboundedSender<DownloadReply>;

pub struct DownloadArgs
{   pub target: Box<dyn crate::artifact::SaveTarget>
  , pub reply: DownloadReplySender
}

// ===== Shutdown =====

pub type ShutdownReply = Result<(), crate::error::Error>;
pub type ShutdownReplySender
  = tokio::sync::mpsc::UnboundedSender<ShutdownReply>;

pub struct ShutdownArgs
{   pub reply: ShutdownReplySender
}

// ===== ControllerHand (sender side) =====

pub struct ControllerHand
{   pub submit_tx
      : tokio::sync::mpsc::UnboundedSender<SubmitArgs>
  , pub copy_tx
      : tokio::sync::mpsc::UnboundedSender<CopyArgs>
  , pub download_tx
      : tokio::sync::mpsc::UnboundedSender<DownloadArgs>
  , pub shutdown_tx
      : tokio::sync::mpsc::UnboundedSender<ShutdownArgs>
}

// ===== ControllerFoot (receiver side) =====

pub struct ControllerFoot
{   pub submit_rx
      : tokio::sync::mpsc::UnboundedReceiver<SubmitArgs>
  , pub copy_rx
      : tokio::sync::mpsc::UnboundedReceiver<CopyArgs>
  , pub download_rx
      : tokio::sync::mpsc::UnboundedReceiver<DownloadArgs>
  , pub shutdown_rx
      : tokio::sync::mpsc::UnboundedReceiver<ShutdownArgs>
}

// ===== Key handling =====

/// Keys the prompt box reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key
{   Enter
  , Other
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyPress
{   pub key: Key
  , /// Newline modifier held
    pub shift: bool
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction
{   Submit
  , InsertNewline
  , Ignore
}

impl KeyPress
{   pub fn enter() -> Self
    {   KeyPress
        {   key: Key::Enter
          , shift: false
        }
    }

    pub fn shift_enter() -> Self
    {   KeyPress
        {   key: Key::Enter
          , shift: true
        }
    }

    /// Enter submits; Shift+Enter inserts a line break
    pub fn action(&self) -> KeyAction
    {   match (self.key, self.shift)
        {   (Key::Enter, false) => KeyAction::Submit
          , (Key::Enter, true) => KeyAction::InsertNewline
          , (Key::Other, _) => KeyAction::Ignore
        }
    }
}
