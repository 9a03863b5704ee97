//! LLM 客户端抽象与命令分类器

pub mod classifier;
pub mod mock;
pub mod openai;
pub mod traits;

pub use classifier::CommandClassifier;
pub use mock::MockLlmClient;
pub use openai::OpenAiClient;
pub use traits::{LlmClient, Message, Role};
