use uuid::Uuid;

use crate::Author;

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct UserId(pub Uuid);

/// The acting user of a session, as known by the authentication layer
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Identity {
    pub id: UserId,
    pub username: String,
    pub avatar: Option<String>,
}

impl Identity {
    pub fn new(username: impl Into<String>) -> Identity {
        Identity {
            id: UserId(Uuid::new_v4()),
            username: username.into(),
            avatar: None,
        }
    }

    pub fn author(&self) -> Author {
        Author {
            id: self.id,
            username: self.username.clone(),
            avatar: self.avatar.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identities_project_to_authors() {
        let mut alice = Identity::new("alice");
        alice.avatar = Some(String::from("alice.png"));
        let a = alice.author();
        assert_eq!(a.id, alice.id);
        assert_eq!(a.username, "alice");
        assert_eq!(a.avatar.as_deref(), Some("alice.png"));
        assert_ne!(Identity::new("alice").id, alice.id);
    }
}
