use async_trait::async_trait;

pub mod mistral;
pub mod mock;

// Re-export for convenience
pub use mistral::MistralClient;
pub use mock::MockGenerator;

/// The one capability the proxy needs from a model
#[async_trait]
pub trait TextGenerator: Send + Sync
{   /// Run one completion and return the model's raw text
    async fn generate(
      &self
    , system_instruction: &str
    , user_prompt: &str
    ) -> Result<String, crate::error::Error>;
}
