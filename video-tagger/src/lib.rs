pub mod types;
pub mod env;
pub mod traits;
pub mod client;
pub mod mock;
pub mod tag_meta_sync;
pub mod tagger;
pub mod scenario;

pub use types::*;
pub use traits::AnnotationApi;
pub use client::HttpApi;
pub use mock::MockPlatform;
pub use tag_meta_sync::{ensure_tag_meta, require_id};
pub use tagger::{ObjectTags, VideoTags};
pub use scenario::{run_scenario, ScenarioOptions, ScenarioReport};
