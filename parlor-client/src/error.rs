use crate::api::{self, CommentId};

/// Why a submission did not go through, each of these is meant to be shown to the user
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error(transparent)]
    Validation(#[from] api::Error),

    #[error("The comment you are replying to is no longer available ({0:?})")]
    UnknownParent(CommentId),

    #[error("Could not set up your account: {0:#}")]
    Provisioning(anyhow::Error),

    #[error("Could not post your comment: {0:#}")]
    Persistence(anyhow::Error),
}

/// Failure of a post-commit notification, only ever logged
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("parent comment {0:?} of the committed reply is not in the tree")]
    UnknownParent(CommentId),

    #[error(transparent)]
    Gateway(#[from] anyhow::Error),
}
