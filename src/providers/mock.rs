use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use async_trait::async_trait;
use log::debug;

/// What a [`MockGenerator`] does when called
#[derive(Debug, Clone)]
pub enum MockBehavior
{   /// Return this raw text
    Reply(String)
  , /// Fail with this error
    Fail(crate::error::Error)
  , /// Never answer
    Stall
}

/// Scripted generator for tests and offline runs
#[derive(Debug)]
pub struct MockGenerator
{   behavior: MockBehavior
  , calls: AtomicUsize
  , last_prompt: Mutex<Option<(String, String)>>
}

impl MockGenerator
{   pub fn new(behavior: MockBehavior) -> Self
    {   MockGenerator
        {   behavior
          , calls: AtomicUsize::new(0)
          , last_prompt: Mutex::new(None)
        }
    }

    pub fn replying(text: impl Into<String>) -> Self
    {   MockGenerator::new(MockBehavior::Reply(text.into()))
    }

    pub fn failing(error: crate::error::Error) -> Self
    {   MockGenerator::new(MockBehavior::Fail(error))
    }

    pub fn stalled() -> Self
    {   MockGenerator::new(MockBehavior::Stall)
    }

    /// Number of times `generate` was entered
    pub fn calls(&self) -> usize
    {   self.calls.load(Ordering::SeqCst)
    }

    /// `(system_instruction, user_prompt)` of the latest call
    pub fn last_prompt(&self) -> Option<(String, String)>
    {   self.last_prompt
          .lock()
          .unwrap_or_else(|p| p.into_inner())
          .clone()
    }
}

#[async_trait]
impl crate::providers::TextGenerator for MockGenerator
{   async fn generate(
      &self
    , system_instruction: &str
    , user_prompt: &str
    ) -> Result<String, crate::error::Error>
    {   let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("MockGenerator call #{}", call);
        *self.last_prompt
          .lock()
          .unwrap_or_else(|p| p.into_inner())
          = Some((system_instruction.to_string(), user_prompt.to_string()));

        match &self.behavior
        {   MockBehavior::Reply(text) => Ok(text.clone())
          , MockBehavior::Fail(e) => Err(e.clone())
          , MockBehavior::Stall => {
              std::future::pending::<()>().await;
              Err(crate::error::Error::Timeout)
            }
        }
    }
}
