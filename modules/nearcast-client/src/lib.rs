pub mod commands;
pub mod driver;
pub mod fetcher;
pub mod push;
pub mod sequence;
pub mod surface;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use driver::{DriverStats, FeedDriver, ViewerCommand};
pub use fetcher::{HttpPostFetcher, PostFetcher};
pub use push::{PushHub, PushSignal};
pub use sequence::RequestSequence;
pub use surface::TracingSurface;
