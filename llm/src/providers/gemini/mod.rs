mod chat;
pub(crate) mod provider;

pub use chat::model::GeminiChatModel;
pub use provider::{DEFAULT_BASE_URL, GeminiProvider};
