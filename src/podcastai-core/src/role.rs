//! Speaking roles.
//!
//! A role is a named persona in the conversation together with the voice
//! selector used to synthesize its lines.

use serde::{Deserialize, Serialize};

use crate::error::PodcastError;

/// A named speaking persona.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Role {
    /// Name as it appears in speaker labels (e.g. "Brian").
    pub name: String,
    /// Voice selector passed to the speech backend.
    pub voice: String,
    /// What this role does in the show; used when prompting the generator.
    #[serde(default)]
    pub description: String,
}

impl Role {
    pub fn new(name: impl Into<String>, voice: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            voice: voice.into(),
            description: String::new(),
        }
    }

    /// Set the role description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// The ordered set of roles taking part in one conversation.
///
/// The order matters: unlabeled lines rotate through the roles in the
/// order given here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleSet {
    roles: Vec<Role>,
    default_speaker: usize,
}

impl RoleSet {
    /// Build a role set, validating names, voices and the default speaker.
    pub fn new(roles: Vec<Role>, default_speaker: &str) -> Result<Self, PodcastError> {
        if roles.len() < 2 {
            return Err(PodcastError::ConfigError(format!(
                "At least 2 roles are required, got {}",
                roles.len()
            )));
        }

        for (i, role) in roles.iter().enumerate() {
            if role.name.trim().is_empty() {
                return Err(PodcastError::ConfigError(format!(
                    "Role #{} has an empty name",
                    i + 1
                )));
            }
            if role.name.contains(':') {
                return Err(PodcastError::ConfigError(format!(
                    "Role name '{}' must not contain ':'",
                    role.name
                )));
            }
            if role.voice.trim().is_empty() {
                return Err(PodcastError::ConfigError(format!(
                    "Role '{}' has no voice selector",
                    role.name
                )));
            }
            if roles[..i].iter().any(|r| r.name == role.name) {
                return Err(PodcastError::ConfigError(format!(
                    "Duplicate role name '{}'",
                    role.name
                )));
            }
        }

        let default_speaker = roles
            .iter()
            .position(|r| r.name == default_speaker)
            .ok_or_else(|| {
                PodcastError::ConfigError(format!(
                    "Default speaker '{}' is not one of the configured roles",
                    default_speaker
                ))
            })?;

        Ok(Self {
            roles,
            default_speaker,
        })
    }

    /// All roles in rotation order.
    pub fn roles(&self) -> &[Role] {
        &self.roles
    }

    /// Role names in rotation order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.roles.iter().map(|r| r.name.as_str())
    }

    pub fn get(&self, name: &str) -> Option<&Role> {
        self.roles.iter().find(|r| r.name == name)
    }

    /// Voice selector for a speaker, if the speaker is a known role.
    pub fn voice_for(&self, name: &str) -> Option<&str> {
        self.get(name).map(|r| r.voice.as_str())
    }

    /// Speaker of the first unlabeled line when no label has been seen yet.
    pub fn default_speaker(&self) -> &str {
        &self.roles[self.default_speaker].name
    }

    /// The role that speaks after `name` in round-robin order.
    ///
    /// Unknown names restart the rotation at the default speaker.
    pub fn next_after(&self, name: &str) -> &str {
        match self.roles.iter().position(|r| r.name == name) {
            Some(i) => &self.roles[(i + 1) % self.roles.len()].name,
            None => self.default_speaker(),
        }
    }

    /// Human readable list of names, e.g. "Brian and Marina" or "A, B and C".
    pub fn joined_names(&self) -> String {
        let names: Vec<&str> = self.names().collect();
        match names.split_last() {
            Some((last, rest)) if !rest.is_empty() => format!("{} and {}", rest.join(", "), last),
            Some((last, _)) => last.to_string(),
            None => String::new(),
        }
    }
}
