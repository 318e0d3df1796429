mod config;
pub use config::SyncConfig;

mod controller;
pub use controller::{Gateways, Submitted, ThreadSync};

pub mod dispatch;

mod error;
pub use error::{DispatchError, SubmitError};

mod feed;
pub use feed::{FeedHandle, RealtimeMerge};

mod order;
pub use order::{dedup_replies, DisplayRepliesExt};

pub mod state;
pub use state::SyncState;

pub mod tree;
pub use tree::{Tree, TreeError};

pub mod api {
    pub use parlor_api::*;
}

pub mod prelude {
    pub use crate::DisplayRepliesExt;
}
