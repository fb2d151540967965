pub mod client;
pub mod error;
pub mod model;
pub mod retry;
pub mod shapes;

pub use client::{FolderQuery, TestpadApi, TestpadClient};
pub use error::TestpadError;
pub use retry::{with_backoff, RetryPolicy};
