//! Versioned profile storage
//!
//! Two on-disk formats exist. The current one is a structured settings object;
//! the older one is a single flat prompt string. Loading walks
//! [`LOAD_ORDER`] and takes the first source that yields a profile, falling
//! back to defaults. Saving always writes both, in one batch, so older readers
//! keep working.

use serde::{Deserialize, Serialize};

use super::catalog::PresetFamily;
use super::profile::{ProfileError, PromptProfile};
use crate::messages::ContextKey;
use crate::store::{keys, KeyValueStore, StoreError};

/// Where a profile can be loaded from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProfileSource {
    /// `customSettings_<context>` JSON object
    StructuredSettings,
    /// `customPrompt_<context>` flat string
    LegacyFlatPrompt,
}

/// Loaders tried in order; the first hit wins
pub const LOAD_ORDER: [ProfileSource; 2] = [
    ProfileSource::StructuredSettings,
    ProfileSource::LegacyFlatPrompt,
];

/// Persisted settings record
///
/// Every field is optional on read so that records written by older or
/// partial writers still load.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredSettings {
    #[serde(default)]
    preset_key: Option<String>,
    #[serde(default)]
    custom_instructions: Option<String>,
    #[serde(default)]
    personality_key: Option<String>,
    #[serde(default)]
    instruction_tag_keys: Option<Vec<String>>,
    #[serde(default)]
    nickname: Option<String>,
    #[serde(default)]
    profession: Option<String>,
    #[serde(default)]
    about_details: Option<String>,
    #[serde(default)]
    compiled_prompt: Option<String>,
}

impl StoredSettings {
    fn from_profile(profile: &PromptProfile, compiled: &str) -> Self {
        Self {
            preset_key: Some(profile.preset_key.clone()),
            custom_instructions: Some(profile.custom_instructions.clone()),
            personality_key: Some(profile.personality_key.clone()),
            instruction_tag_keys: Some(profile.instruction_tag_keys.clone()),
            nickname: Some(profile.nickname.clone()),
            profession: Some(profile.profession.clone()),
            about_details: Some(profile.about_details.clone()),
            compiled_prompt: Some(compiled.to_string()),
        }
    }

    fn into_profile(self, preset_family: PresetFamily) -> PromptProfile {
        let defaults = PromptProfile::new(preset_family);
        PromptProfile {
            preset_family,
            preset_key: self.preset_key.unwrap_or(defaults.preset_key),
            custom_instructions: self.custom_instructions.unwrap_or_default(),
            personality_key: self.personality_key.unwrap_or(defaults.personality_key),
            instruction_tag_keys: self.instruction_tag_keys.unwrap_or_default(),
            nickname: self.nickname.unwrap_or_default(),
            profession: self.profession.unwrap_or_default(),
            about_details: self.about_details.unwrap_or_default(),
        }
        .normalized()
    }
}

impl ProfileSource {
    /// Try to load a profile from this source
    ///
    /// Unreadable data is logged and reported as a miss so the next source
    /// gets a chance.
    pub fn load(
        self,
        store: &dyn KeyValueStore,
        context: &ContextKey,
        preset_family: PresetFamily,
    ) -> Result<Option<PromptProfile>, StoreError> {
        match self {
            Self::StructuredSettings => {
                let Some(raw) = store.load(&keys::custom_settings(context))? else {
                    return Ok(None);
                };
                match serde_json::from_str::<StoredSettings>(&raw) {
                    Ok(settings) => Ok(Some(settings.into_profile(preset_family))),
                    Err(e) => {
                        tracing::warn!(
                            context = %context,
                            error = %e,
                            "Failed to parse saved prompt settings, trying older format"
                        );
                        Ok(None)
                    }
                }
            }
            Self::LegacyFlatPrompt => Ok(store
                .load(&keys::custom_prompt(context))?
                .filter(|prompt| !prompt.is_empty())
                .map(|prompt| PromptProfile::from_legacy(preset_family, prompt))),
        }
    }
}

/// Load a context's profile: structured, then legacy, then defaults
pub fn load_profile(
    store: &dyn KeyValueStore,
    context: &ContextKey,
    preset_family: PresetFamily,
) -> Result<PromptProfile, StoreError> {
    for source in LOAD_ORDER {
        if let Some(profile) = source.load(store, context, preset_family)? {
            tracing::debug!(context = %context, source = ?source, "Loaded prompt profile");
            return Ok(profile);
        }
    }
    Ok(PromptProfile::new(preset_family))
}

/// Errors from saving a profile
#[derive(Debug, thiserror::Error)]
pub enum SaveError {
    /// Profile failed validation; nothing was written
    #[error(transparent)]
    Invalid(#[from] ProfileError),
    /// Store rejected the write
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Settings could not be encoded
    #[error("failed to encode settings: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Validate and persist a profile, returning its compiled prompt
///
/// The structured record and the flat compiled string are written in a single
/// batch.
pub fn save_profile(
    store: &dyn KeyValueStore,
    context: &ContextKey,
    profile: &PromptProfile,
) -> Result<String, SaveError> {
    profile.validate()?;

    let compiled = profile.compiled();
    let settings = serde_json::to_string(&StoredSettings::from_profile(profile, &compiled))?;
    let settings_key = keys::custom_settings(context);
    let prompt_key = keys::custom_prompt(context);

    store.save_batch(&[(&settings_key, &settings), (&prompt_key, &compiled)])?;
    tracing::info!(context = %context, chars = compiled.chars().count(), "Saved prompt profile");
    Ok(compiled)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::store::MemoryStore;

    fn ctx() -> ContextKey {
        ContextKey::new("bot")
    }

    #[test]
    fn test_no_data_yields_defaults() {
        let store = MemoryStore::new();
        let profile = load_profile(&store, &ctx(), PresetFamily::X).unwrap();
        assert_eq!(profile, PromptProfile::new(PresetFamily::X));
    }

    #[test]
    fn test_legacy_string_becomes_custom_instructions() {
        let store = MemoryStore::new();
        store.save("customPrompt_bot", "Talk like a pirate").unwrap();

        let profile = load_profile(&store, &ctx(), PresetFamily::General).unwrap();
        assert_eq!(profile.custom_instructions, "Talk like a pirate");
        assert_eq!(profile.preset_key, "none");
        assert_eq!(profile.personality_key, "default");
        assert!(profile.instruction_tag_keys.is_empty());
        assert!(profile.nickname.is_empty());
    }

    #[test]
    fn test_structured_wins_over_legacy() {
        let store = MemoryStore::new();
        store.save("customPrompt_bot", "old").unwrap();
        store
            .save(
                "customSettings_bot",
                r#"{"presetKey":"teacher","customInstructions":"new","instructionTagKeys":["witty"]}"#,
            )
            .unwrap();

        let profile = load_profile(&store, &ctx(), PresetFamily::General).unwrap();
        assert_eq!(profile.custom_instructions, "new");
        assert_eq!(profile.preset_key, "teacher");
        assert_eq!(profile.personality_key, "default");
        assert_eq!(profile.instruction_tag_keys, vec!["witty"]);
    }

    #[test]
    fn test_corrupt_structured_falls_back_to_legacy() {
        let store = MemoryStore::new();
        store.save("customSettings_bot", "{not json").unwrap();
        store.save("customPrompt_bot", "legacy").unwrap();

        let profile = load_profile(&store, &ctx(), PresetFamily::General).unwrap();
        assert_eq!(profile.custom_instructions, "legacy");
    }

    #[test]
    fn test_null_fields_take_defaults() {
        let store = MemoryStore::new();
        store
            .save(
                "customSettings_bot",
                r#"{"presetKey":null,"nickname":null,"instructionTagKeys":["a","a"]}"#,
            )
            .unwrap();

        let profile = load_profile(&store, &ctx(), PresetFamily::General).unwrap();
        assert_eq!(profile.preset_key, "none");
        assert_eq!(profile.nickname, "");
        assert_eq!(profile.instruction_tag_keys, vec!["a"]);
    }

    #[test]
    fn test_save_writes_both_formats_and_reloads() {
        let store = MemoryStore::new();
        let mut profile = PromptProfile::new(PresetFamily::General);
        profile.preset_key = "professional".into();
        profile.instruction_tag_keys = vec!["concise".into()];
        profile.nickname = "Sam".into();

        let compiled = save_profile(&store, &ctx(), &profile).unwrap();
        assert_eq!(compiled, profile.compiled());
        assert_eq!(store.load("customPrompt_bot").unwrap(), Some(compiled.clone()));

        let raw = store.load("customSettings_bot").unwrap().unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json["compiledPrompt"], compiled.as_str());
        assert_eq!(json["presetKey"], "professional");

        let reloaded = load_profile(&store, &ctx(), PresetFamily::General).unwrap();
        assert_eq!(reloaded, profile);
    }

    #[test]
    fn test_invalid_profile_writes_nothing() {
        let store = MemoryStore::new();
        let mut profile = PromptProfile::default();
        profile.custom_instructions = "x".repeat(1001);

        assert!(matches!(
            save_profile(&store, &ctx(), &profile),
            Err(SaveError::Invalid(_))
        ));
        assert!(store.is_empty());
    }
}
