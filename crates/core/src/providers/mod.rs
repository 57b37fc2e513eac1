pub mod openai;

pub use openai::{OpenAiChatClient, OpenAiConfig, OpenAiEmbedder};
