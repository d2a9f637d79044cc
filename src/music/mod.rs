pub mod interface;
pub mod mock;
pub mod output;
pub mod replicate_client;

pub use interface::{AudioPrompt, MusicService};
pub use mock::MockMusicClient;
pub use output::AudioOutput;
pub use replicate_client::ReplicateMusicClient;
