pub mod interface;
pub mod mock;
pub mod openai_client;

pub use interface::{ImageUpload, VisionService};
pub use mock::MockVisionClient;
pub use openai_client::OpenAIVisionClient;
