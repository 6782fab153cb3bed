//! Local user directory used to denormalize sender display fields.

use std::collections::HashMap;

use movesplash_shared::{Message, Profile, UserId};

#[derive(Debug, Clone, Default)]
pub struct UserDirectory {
    profiles: HashMap<UserId, Profile>,
}

impl UserDirectory {
    pub fn new(profiles: impl IntoIterator<Item = Profile>) -> Self {
        let mut directory = Self::default();
        directory.extend(profiles);
        directory
    }

    pub fn upsert(&mut self, profile: Profile) {
        self.profiles.insert(profile.id.clone(), profile);
    }

    pub fn extend(&mut self, profiles: impl IntoIterator<Item = Profile>) {
        for profile in profiles {
            self.upsert(profile);
        }
    }

    pub fn get(&self, id: &UserId) -> Option<&Profile> {
        self.profiles.get(id)
    }

    /// Display name and avatar for a sender.
    ///
    /// Directory entry first, then whatever the payload embedded, then the
    /// sender id and a generated placeholder avatar.
    pub fn resolve(&self, sender: &UserId, embedded_name: &str, embedded_avatar: &str) -> (String, String) {
        let known = self.profiles.get(sender);

        let name = known
            .map(|p| p.display_name.as_str())
            .filter(|n| !n.trim().is_empty())
            .or_else(|| Some(embedded_name).filter(|n| !n.trim().is_empty()))
            .map(str::to_string)
            .unwrap_or_else(|| {
                if sender.as_str().is_empty() {
                    "Unknown".to_string()
                } else {
                    sender.to_string()
                }
            });

        let avatar = known
            .and_then(|p| p.avatar_url.as_deref())
            .filter(|a| !a.trim().is_empty())
            .or_else(|| Some(embedded_avatar).filter(|a| !a.trim().is_empty()))
            .map(str::to_string)
            .unwrap_or_else(|| {
                if sender.as_str().is_empty() {
                    UserId::from("unknown").placeholder_avatar()
                } else {
                    sender.placeholder_avatar()
                }
            });

        (name, avatar)
    }

    /// Rewrite a message's sender display fields in place.
    pub fn apply(&self, message: &mut Message) {
        let (name, avatar) = self.resolve(&message.sender_id, &message.sender_name, &message.sender_avatar);
        message.sender_name = name;
        message.sender_avatar = avatar;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ana() -> Profile {
        Profile {
            id: "u1".into(),
            display_name: "Ana".into(),
            avatar_url: Some("https://cdn/ana.png".into()),
        }
    }

    #[test]
    fn directory_wins_over_embedded() {
        let dir = UserDirectory::new([ana()]);
        let (name, avatar) = dir.resolve(&"u1".into(), "old name", "https://cdn/old.png");
        assert_eq!(name, "Ana");
        assert_eq!(avatar, "https://cdn/ana.png");
    }

    #[test]
    fn embedded_metadata_is_second() {
        let dir = UserDirectory::default();
        let (name, avatar) = dir.resolve(&"u2".into(), "Bo", "https://cdn/bo.png");
        assert_eq!(name, "Bo");
        assert_eq!(avatar, "https://cdn/bo.png");
    }

    #[test]
    fn placeholder_when_nothing_is_known() {
        let dir = UserDirectory::new([Profile {
            id: "u3".into(),
            display_name: String::new(),
            avatar_url: None,
        }]);
        let (name, avatar) = dir.resolve(&"u3".into(), "", "");
        assert_eq!(name, "u3");
        assert_eq!(avatar, UserId::from("u3").placeholder_avatar());

        let (name, _) = dir.resolve(&"".into(), "", "");
        assert_eq!(name, "Unknown");
    }
}
