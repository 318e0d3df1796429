use chrono::Utc;

pub use uuid::Uuid;
pub type Time = chrono::DateTime<Utc>;

/// Longest comment, in characters, that the backend accepts
pub const MAX_CONTENT_LEN: usize = 1000;

mod comment;
pub use comment::{Author, Comment, CommentId, CommentSync, NewComment};

mod error;
pub use error::Error;

mod feed;
pub use feed::FeedMessage;

mod gateway;
pub use gateway::{AccountProvisioner, CommentFeed, NotificationGateway, PersistenceGateway};

mod notification;
pub use notification::{Notification, NotificationKind};

mod thread;
pub use thread::{Thread, ThreadId};

mod user;
pub use user::{Identity, UserId};

// Strings are stored as-is by the backend, which does not support null bytes
pub fn validate_string(s: &str) -> Result<(), Error> {
    if s.contains('\0') {
        return Err(Error::NullByteInString(String::from(s)));
    }
    Ok(())
}

/// Checks comment content, after trimming, against the emptiness and length rules
pub fn validate_content(content: &str, max_len: usize) -> Result<(), Error> {
    let content = content.trim();
    if content.is_empty() {
        return Err(Error::EmptyContent);
    }
    let len = content.chars().count();
    if len > max_len {
        return Err(Error::ContentTooLong { len, max: max_len });
    }
    validate_string(content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_validation() {
        assert_eq!(validate_content("Hello", MAX_CONTENT_LEN), Ok(()));
        assert_eq!(validate_content("  padded  ", MAX_CONTENT_LEN), Ok(()));
        assert_eq!(validate_content("", MAX_CONTENT_LEN), Err(Error::EmptyContent));
        assert_eq!(validate_content(" \n\t ", MAX_CONTENT_LEN), Err(Error::EmptyContent));
        assert_eq!(
            validate_content("a\0b", MAX_CONTENT_LEN),
            Err(Error::NullByteInString(String::from("a\0b"))),
        );
    }

    #[test]
    fn content_length_is_counted_in_characters() {
        let exact = "é".repeat(MAX_CONTENT_LEN);
        assert_eq!(validate_content(&exact, MAX_CONTENT_LEN), Ok(()));
        let over = "x".repeat(MAX_CONTENT_LEN + 1);
        assert_eq!(
            validate_content(&over, MAX_CONTENT_LEN),
            Err(Error::ContentTooLong {
                len: MAX_CONTENT_LEN + 1,
                max: MAX_CONTENT_LEN,
            }),
        );
        // surrounding whitespace does not count against the ceiling
        let padded = format!("   {}   ", exact);
        assert_eq!(validate_content(&padded, MAX_CONTENT_LEN), Ok(()));
    }
}
