//! Prompt preference profile

use thiserror::Error;

use super::catalog::{PresetFamily, DEFAULT_PERSONALITY, NO_PRESET};
use super::compile::compile;

/// Maximum length of custom instructions, in characters
pub const MAX_CUSTOM_INSTRUCTIONS_CHARS: usize = 1000;

/// Maximum length of the free-form "about you" details, in characters
pub const MAX_ABOUT_DETAILS_CHARS: usize = 600;

/// Profile validation errors
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ProfileError {
    /// A field exceeds its character limit
    #[error("{field} is {actual} characters (max: {max})")]
    TooLong {
        /// Offending field
        field: &'static str,
        /// Configured limit
        max: usize,
        /// Actual length
        actual: usize,
    },
}

/// A user's behavior preferences for one context
///
/// Every field is independent; [`compile`] merges them into the single
/// instruction string sent with each turn.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PromptProfile {
    /// Preset table the context offers (comes from the bot, not from storage)
    pub preset_family: PresetFamily,
    /// Selected preset key ("none" for no preset)
    pub preset_key: String,
    /// Free-form instructions; takes precedence over the preset when non-empty
    pub custom_instructions: String,
    /// Selected personality key ("default" contributes nothing)
    pub personality_key: String,
    /// Selected instruction tags, in selection order, without duplicates
    pub instruction_tag_keys: Vec<String>,
    /// How the assistant should address the user
    pub nickname: String,
    /// The user's occupation
    pub profession: String,
    /// Anything else the user wants the assistant to know
    pub about_details: String,
}

impl Default for PromptProfile {
    fn default() -> Self {
        Self::new(PresetFamily::default())
    }
}

impl PromptProfile {
    /// Empty profile for a preset family
    #[must_use]
    pub fn new(preset_family: PresetFamily) -> Self {
        Self {
            preset_family,
            preset_key: NO_PRESET.to_string(),
            custom_instructions: String::new(),
            personality_key: DEFAULT_PERSONALITY.to_string(),
            instruction_tag_keys: Vec::new(),
            nickname: String::new(),
            profession: String::new(),
            about_details: String::new(),
        }
    }

    /// Profile recovered from the legacy flat-string format
    #[must_use]
    pub fn from_legacy(preset_family: PresetFamily, prompt: impl Into<String>) -> Self {
        Self {
            custom_instructions: prompt.into(),
            ..Self::new(preset_family)
        }
    }

    /// The compiled instruction string
    #[must_use]
    pub fn compiled(&self) -> String {
        compile(self)
    }

    /// Check character limits
    pub fn validate(&self) -> Result<(), ProfileError> {
        check_len(
            "custom instructions",
            &self.custom_instructions,
            MAX_CUSTOM_INSTRUCTIONS_CHARS,
        )?;
        check_len("about details", &self.about_details, MAX_ABOUT_DETAILS_CHARS)
    }

    /// Select a preset the way the settings editor does
    ///
    /// A real preset copies its text into the custom instructions so the user
    /// can edit from there; "none" clears them.
    pub fn select_preset(&mut self, key: &str) {
        key.clone_into(&mut self.preset_key);
        if key == NO_PRESET {
            self.custom_instructions.clear();
        } else if let Some(preset) = self.preset_family.preset(key) {
            if !preset.prompt.is_empty() {
                preset.prompt.clone_into(&mut self.custom_instructions);
            }
        }
    }

    /// Add a tag if absent, remove it if present
    pub fn toggle_tag(&mut self, key: &str) {
        if let Some(pos) = self.instruction_tag_keys.iter().position(|k| k == key) {
            self.instruction_tag_keys.remove(pos);
        } else {
            self.instruction_tag_keys.push(key.to_string());
        }
    }

    /// Restore every field to its default, keeping the preset family
    pub fn reset(&mut self) {
        *self = Self::new(self.preset_family);
    }

    /// Collapse duplicate tags (first occurrence wins) and fill blank keys
    #[must_use]
    pub fn normalized(mut self) -> Self {
        if self.preset_key.is_empty() {
            self.preset_key = NO_PRESET.to_string();
        }
        if self.personality_key.is_empty() {
            self.personality_key = DEFAULT_PERSONALITY.to_string();
        }
        let mut seen = Vec::with_capacity(self.instruction_tag_keys.len());
        self.instruction_tag_keys.retain(|key| {
            if seen.contains(key) {
                false
            } else {
                seen.push(key.clone());
                true
            }
        });
        self
    }
}

fn check_len(field: &'static str, value: &str, max: usize) -> Result<(), ProfileError> {
    let actual = value.chars().count();
    if actual > max {
        return Err(ProfileError::TooLong { field, max, actual });
    }
    Ok(())
}
