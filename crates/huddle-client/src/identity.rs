//! Self identity and the persisted resume record.

use serde::{Deserialize, Serialize};

use crate::error::SessionError;

/// Shortest accepted nickname, in characters, after trimming.
pub const NICKNAME_MIN_CHARS: usize = 2;

/// Longest accepted nickname, in characters, after trimming.
pub const NICKNAME_MAX_CHARS: usize = 20;

/// How the user appears to other participants.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    /// Display name, already trimmed
    pub nickname: String,
    /// Avatar glyph
    pub icon: String,
}

impl Identity {
    /// Validate and normalize a nickname/icon pair.
    ///
    /// # Errors
    ///
    /// - `SessionError::InvalidIdentity` if the trimmed nickname is outside
    ///   2..=20 characters or the icon is blank
    pub fn new(nickname: &str, icon: &str) -> Result<Self, SessionError> {
        let nickname = nickname.trim();
        let len = nickname.chars().count();

        if len < NICKNAME_MIN_CHARS {
            return Err(SessionError::InvalidIdentity {
                reason: format!("nickname must be at least {NICKNAME_MIN_CHARS} characters"),
            });
        }
        if len > NICKNAME_MAX_CHARS {
            return Err(SessionError::InvalidIdentity {
                reason: format!("nickname must be at most {NICKNAME_MAX_CHARS} characters"),
            });
        }

        let icon = icon.trim();
        if icon.is_empty() {
            return Err(SessionError::InvalidIdentity { reason: "icon is required".to_string() });
        }

        Ok(Self { nickname: nickname.to_string(), icon: icon.to_string() })
    }
}

/// Room membership persisted across restarts so a relaunch can resume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeRecord {
    /// Room to rejoin
    pub room_id: String,
    /// Nickname used in that room
    pub nickname: String,
    /// Icon used in that room
    pub icon: String,
}

impl ResumeRecord {
    /// Record for `identity` in `room_id`.
    pub fn new(room_id: impl Into<String>, identity: &Identity) -> Self {
        Self {
            room_id: room_id.into(),
            nickname: identity.nickname.clone(),
            icon: identity.icon.clone(),
        }
    }

    /// The identity stored in this record.
    pub fn identity(&self) -> Identity {
        Identity { nickname: self.nickname.clone(), icon: self.icon.clone() }
    }
}
