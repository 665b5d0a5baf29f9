use std::io::Write;
use std::path::{Path, PathBuf};
use serde_json::Value;
use log::{debug, error, info};

pub const JSON_MEDIA_TYPE: &str = "application/json";

/// Render a payload as 2-space indented JSON.
///
/// A string payload holding JSON text is parsed and pretty-printed; any
/// other string is returned unchanged.
pub fn format_for_display(payload: &Value) -> String
{   match payload
    {   Value::String(s) => match serde_json::from_str::<Value>(s)
        {   Ok(inner) => pretty(&inner)
          , Err(_) => s.clone()
        }
      , other => pretty(other)
    }
}

fn pretty(value: &Value) -> String
{   serde_json::to_string_pretty(value)
      .unwrap_or_else(|_| value.to_string())
}

/// Formatted text of a successful result, `None` otherwise
pub fn display_text(result: Option<&crate::GenerationResult>) -> Option<String>
{   match result
    {   Some(crate::GenerationResult::Success(payload)) => {
          Some(format_for_display(payload))
        }
      , _ => None
    }
}

/// A downloadable document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonArtifact
{   pub file_name: String
  , pub media_type: &'static str
  , pub bytes: Vec<u8>
}

impl JsonArtifact
{   pub fn new(file_name: impl Into<String>, text: String) -> Self
    {   JsonArtifact
        {   file_name: file_name.into()
          , media_type: JSON_MEDIA_TYPE
          , bytes: text.into_bytes()
        }
    }
}

// ===== Clipboard =====

/// Destination for copied text
pub trait ClipboardSink: Send
{   fn set_text(&mut self, text: &str) -> Result<(), crate::error::Error>;
}

/// The desktop clipboard
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClipboard;

impl ClipboardSink for SystemClipboard
{   fn set_text(&mut self, text: &str) -> Result<(), crate::error::Error>
    {   let mut clipboard = arboard::Clipboard::new().map_err(|e| {
          error!("Failed to initialize clipboard: {}", e);
          crate::error::Error::Clipboard(e.to_string())
        })?;
        clipboard.set_text(text).map_err(|e| {
          error!("Failed to set clipboard text: {}", e);
          crate::error::Error::Clipboard(e.to_string())
        })
    }
}

// ===== Download =====

/// Picks where a download goes; `None` means the user cancelled
pub trait SaveTarget: Send
{   fn choose(&mut self, suggested_name: &str) -> Option<PathBuf>;
}

/// Saves under a fixed directory using the suggested name
#[derive(Debug, Clone)]
pub struct DirectoryTarget
{   dir: PathBuf
}

impl DirectoryTarget
{   pub fn new(dir: impl Into<PathBuf>) -> Self
    {   DirectoryTarget
        {   dir: dir.into()
        }
    }
}

impl SaveTarget for DirectoryTarget
{   fn choose(&mut self, suggested_name: &str) -> Option<PathBuf>
    {   Some(self.dir.join(suggested_name))
    }
}

/// Stage `artifact` in a temporary file, then copy it where `target` says.
///
/// The staged file lives only for this call and is removed on every path,
/// including cancellation and copy failure. Returns the saved path, or
/// `None` when the target cancelled.
pub fn save_artifact(
  artifact: &JsonArtifact
, staging_dir: &Path
, target: &mut dyn SaveTarget
) -> Result<Option<PathBuf>, crate::error::Error>
{   let mut staged = tempfile::Builder::new()
      .prefix("jsongen-")
      .suffix(".json")
      .tempfile_in(staging_dir)?;
    staged.write_all(&artifact.bytes)?;
    staged.flush()?;
    debug!(
      "Staged {} ({} bytes) at {}"
    , artifact.file_name
    , artifact.bytes.len()
    , staged.path().display()
    );

    let dest = match target.choose(&artifact.file_name)
    {   Some(path) => path
      , None => {
          debug!("Download of {} cancelled", artifact.file_name);
          return Ok(None);
        }
    };

    std::fs::copy(staged.path(), &dest)?;
    info!("Saved {} to {}", artifact.media_type, dest.display());
    Ok(Some(dest))
}
