//! Turn parsing.
//!
//! Turns a block of generated dialogue into an ordered [`Conversation`].
//! Lines labeled `Name: utterance` are attributed to the named role; any
//! other non-blank line goes to the role whose turn it is next, which then
//! rotates. A label always resets the rotation so that the following
//! unlabeled line belongs to the role after the labeled one.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::PodcastError;
use crate::role::RoleSet;

/// One attributed utterance with its fixed position in the conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Turn {
    /// Zero-based position; assigned once by the parser.
    pub index: usize,
    pub speaker: String,
    pub text: String,
}

/// An ordered, immutable sequence of turns.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Conversation {
    turns: Vec<Turn>,
}

impl Conversation {
    /// Build a conversation from turns that already carry their indices.
    ///
    /// Indices must be exactly `0..N` in order and every text non-empty.
    pub fn from_turns(turns: Vec<Turn>) -> Result<Self, PodcastError> {
        for (position, turn) in turns.iter().enumerate() {
            if turn.index != position {
                return Err(PodcastError::ConfigError(format!(
                    "Turn at position {} has index {}",
                    position, turn.index
                )));
            }
            if turn.text.trim().is_empty() {
                return Err(PodcastError::ConfigError(format!(
                    "Turn {} has no text",
                    turn.index
                )));
            }
        }
        Ok(Self { turns })
    }

    /// Load a conversation previously saved with `serde_json`.
    pub fn from_json(json: &str) -> Result<Self, PodcastError> {
        let turns: Vec<Turn> = serde_json::from_str(json)
            .map_err(|e| PodcastError::ConfigError(format!("Invalid transcript: {}", e)))?;
        Self::from_turns(turns)
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Turn> {
        self.turns.iter()
    }

    /// Distinct speakers in order of first appearance.
    pub fn speakers_used(&self) -> Vec<&str> {
        let mut speakers: Vec<&str> = Vec::new();
        for turn in &self.turns {
            if !speakers.contains(&turn.speaker.as_str()) {
                speakers.push(&turn.speaker);
            }
        }
        speakers
    }
}

impl<'a> IntoIterator for &'a Conversation {
    type Item = &'a Turn;
    type IntoIter = std::slice::Iter<'a, Turn>;

    fn into_iter(self) -> Self::IntoIter {
        self.turns.iter()
    }
}

/// Rotation state threaded through the lines.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ParseState<'r> {
    next_speaker: &'r str,
}

impl<'r> ParseState<'r> {
    fn start(roles: &'r RoleSet) -> Self {
        Self {
            next_speaker: roles.default_speaker(),
        }
    }

    /// Consume one line, returning the new state and the `(speaker, text)`
    /// pair to emit, if any.
    fn step(
        self,
        line: &str,
        labels: &Regex,
        roles: &'r RoleSet,
    ) -> (Self, Option<(&'r str, String)>) {
        let line = line.trim();
        if line.is_empty() {
            return (self, None);
        }

        if let Some(caps) = labels.captures(line) {
            let label = caps.name("speaker").map_or("", |m| m.as_str());
            // Label came from the role set, so the lookup only fails on a
            // regex/roles mismatch; fall back to treating it as unlabeled.
            if let Some(role) = roles.get(label) {
                let speaker = role.name.as_str();
                let text = caps.name("text").map_or("", |m| m.as_str()).trim();
                let next = Self {
                    next_speaker: roles.next_after(speaker),
                };
                let turn = (!text.is_empty()).then(|| (speaker, text.to_string()));
                return (next, turn);
            }
        }

        let speaker = self.next_speaker;
        let next = Self {
            next_speaker: roles.next_after(speaker),
        };
        (next, Some((speaker, line.to_string())))
    }
}

/// Build the `Name: utterance` matcher for a role set.
fn label_pattern(roles: &RoleSet) -> Result<Regex, PodcastError> {
    let names: Vec<String> = roles.names().map(regex::escape).collect();
    let pattern = format!(r"^(?P<speaker>{})\s*:\s*(?P<text>.*)$", names.join("|"));
    Regex::new(&pattern)
        .map_err(|e| PodcastError::ConfigError(format!("Invalid speaker label pattern: {}", e)))
}

/// Parse raw dialogue text into a conversation.
pub fn parse_conversation(text: &str, roles: &RoleSet) -> Result<Conversation, PodcastError> {
    let labels = label_pattern(roles)?;

    let turns = text
        .lines()
        .scan(ParseState::start(roles), |state, line| {
            let (next, emitted) = state.clone().step(line, &labels, roles);
            *state = next;
            Some(emitted)
        })
        .flatten()
        .enumerate()
        .map(|(index, (speaker, text))| Turn {
            index,
            speaker: speaker.to_string(),
            text,
        })
        .collect();

    Ok(Conversation { turns })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::role::Role;

    fn roles() -> RoleSet {
        RoleSet::new(
            vec![Role::new("Brian", "voice-b"), Role::new("Marina", "voice-m")],
            "Brian",
        )
        .unwrap()
    }

    fn pairs(conversation: &Conversation) -> Vec<(&str, &str)> {
        conversation
            .iter()
            .map(|t| (t.speaker.as_str(), t.text.as_str()))
            .collect()
    }

    #[test]
    fn test_unlabeled_lines_alternate() {
        let text = "Hello there\nWhat do you think?\nI think it's great";
        let conversation = parse_conversation(text, &roles()).unwrap();

        assert_eq!(
            pairs(&conversation),
            vec![
                ("Brian", "Hello there"),
                ("Marina", "What do you think?"),
                ("Brian", "I think it's great"),
            ]
        );
    }

    #[test]
    fn test_mixed_labels_and_alternation() {
        let text = "Brian: Welcome to the show.\nWhat's new today?\nMarina: Tell me more.\nSure, happy to.";
        let conversation = parse_conversation(text, &roles()).unwrap();

        assert_eq!(
            pairs(&conversation),
            vec![
                ("Brian", "Welcome to the show."),
                ("Marina", "What's new today?"),
                ("Marina", "Tell me more."),
                ("Brian", "Sure, happy to."),
            ]
        );
        let indices: Vec<usize> = conversation.iter().map(|t| t.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_label_overrides_alternation_state() {
        // After "one" the rotation points at Marina, the label forces Brian.
        let text = "one\nBrian: Hello\ntwo";
        let conversation = parse_conversation(text, &roles()).unwrap();

        assert_eq!(
            pairs(&conversation),
            vec![("Brian", "one"), ("Brian", "Hello"), ("Marina", "two")]
        );
    }

    #[test]
    fn test_indices_are_positions() {
        let text = "Marina: a\n\nb\nc\n\n\nBrian: d\ne\n";
        let conversation = parse_conversation(text, &roles()).unwrap();

        assert_eq!(conversation.len(), 5);
        for (i, turn) in conversation.iter().enumerate() {
            assert_eq!(turn.index, i);
        }
    }

    #[test]
    fn test_blank_lines_do_not_rotate() {
        let text = "first\n\n   \nsecond";
        let conversation = parse_conversation(text, &roles()).unwrap();

        assert_eq!(
            pairs(&conversation),
            vec![("Brian", "first"), ("Marina", "second")]
        );
    }

    #[test]
    fn test_utterance_is_trimmed() {
        let conversation = parse_conversation("  Marina:    spaced out   ", &roles()).unwrap();
        assert_eq!(pairs(&conversation), vec![("Marina", "spaced out")]);
    }

    #[test]
    fn test_unknown_label_is_plain_text() {
        let conversation = parse_conversation("Charlie: hi", &roles()).unwrap();
        assert_eq!(pairs(&conversation), vec![("Brian", "Charlie: hi")]);
    }

    #[test]
    fn test_empty_labeled_line_resets_without_turn() {
        let conversation = parse_conversation("Marina:\nright", &roles()).unwrap();
        assert_eq!(pairs(&conversation), vec![("Brian", "right")]);
    }

    #[test]
    fn test_configurable_default_speaker() {
        let roles = RoleSet::new(
            vec![Role::new("Brian", "voice-b"), Role::new("Marina", "voice-m")],
            "Marina",
        )
        .unwrap();
        let conversation = parse_conversation("a\nb", &roles).unwrap();
        assert_eq!(pairs(&conversation), vec![("Marina", "a"), ("Brian", "b")]);
    }

    #[test]
    fn test_three_roles_round_robin() {
        let roles = RoleSet::new(
            vec![
                Role::new("Ann", "a"),
                Role::new("Bob", "b"),
                Role::new("Cy", "c"),
            ],
            "Ann",
        )
        .unwrap();
        let conversation = parse_conversation("1\n2\n3\nBob: 4\n5", &roles).unwrap();

        let speakers: Vec<&str> = conversation.iter().map(|t| t.speaker.as_str()).collect();
        assert_eq!(speakers, vec!["Ann", "Bob", "Cy", "Bob", "Cy"]);
    }

    #[test]
    fn test_blank_text_gives_empty_conversation() {
        let conversation = parse_conversation("\n\n  \n", &roles()).unwrap();
        assert!(conversation.is_empty());
    }

    #[test]
    fn test_from_json_validates_indices() {
        let ok = r#"[{"index":0,"speaker":"Brian","text":"hi"},{"index":1,"speaker":"Marina","text":"yo"}]"#;
        let conversation = Conversation::from_json(ok).unwrap();
        assert_eq!(conversation.speakers_used(), vec!["Brian", "Marina"]);

        let bad = r#"[{"index":1,"speaker":"Brian","text":"hi"}]"#;
        assert!(Conversation::from_json(bad).is_err());
    }

    #[test]
    fn test_serializes_as_turn_list() {
        let conversation = parse_conversation("Brian: hi", &roles()).unwrap();
        let json = serde_json::to_string(&conversation).unwrap();
        assert_eq!(json, r#"[{"index":0,"speaker":"Brian","text":"hi"}]"#);
    }
}
