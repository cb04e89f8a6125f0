//! Canned instruction texts
//!
//! Presets, personalities and instruction tags are fixed tables looked up by
//! key. Lookups of unknown keys return `None`; the compiler treats that as
//! "contributes nothing".

use serde::{Deserialize, Serialize};

/// Key of the "no preset" entry present in every family
pub const NO_PRESET: &str = "none";

/// Key of the personality that contributes no text
pub const DEFAULT_PERSONALITY: &str = "default";

/// A named starting point for custom instructions
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Preset {
    /// Lookup key
    pub key: &'static str,
    /// Display name
    pub name: &'static str,
    /// Instruction text (empty for "none")
    pub prompt: &'static str,
}

/// A conversational tone
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Personality {
    /// Lookup key
    pub key: &'static str,
    /// Display label
    pub label: &'static str,
    /// One-line description for pickers
    pub description: &'static str,
    /// Instruction text (empty for "default")
    pub prompt: &'static str,
}

/// A small behavioral modifier that can be combined with others
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InstructionTag {
    /// Lookup key
    pub key: &'static str,
    /// Display label
    pub label: &'static str,
    /// Instruction text
    pub prompt: &'static str,
}

/// Which preset table a bot offers
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresetFamily {
    /// General-purpose assistant presets
    #[default]
    General,
    /// Short social posts for X
    X,
    /// Facebook posts
    Facebook,
    /// Self-introduction / profile writing
    Profile,
}

impl PresetFamily {
    /// All presets of this family, "none" first
    #[must_use]
    pub fn presets(self) -> &'static [Preset] {
        match self {
            Self::General => GENERAL_PRESETS,
            Self::X => X_PRESETS,
            Self::Facebook => FACEBOOK_PRESETS,
            Self::Profile => PROFILE_PRESETS,
        }
    }

    /// Look up a preset by key
    #[must_use]
    pub fn preset(self, key: &str) -> Option<&'static Preset> {
        self.presets().iter().find(|p| p.key == key)
    }
}

const GENERAL_PRESETS: &[Preset] = &[
    Preset {
        key: NO_PRESET,
        name: "No preset",
        prompt: "",
    },
    Preset {
        key: "default",
        name: "Default",
        prompt: "You are a kind and knowledgeable AI assistant. Give accurate, useful answers to the user's questions.",
    },
    Preset {
        key: "professional",
        name: "Professional",
        prompt: "You are a business expert. Answer business questions in a formal, professional tone, use polite language, and give concrete advice.",
    },
    Preset {
        key: "friendly",
        name: "Friendly",
        prompt: "You are an approachable assistant who talks like a friend. Keep the conversation casual and fun, and feel free to use emoji.",
    },
    Preset {
        key: "teacher",
        name: "Teacher",
        prompt: "You are an excellent teacher. Explain things clearly, use examples to aid understanding, and ask questions that encourage the learner.",
    },
    Preset {
        key: "creative",
        name: "Creative",
        prompt: "You are an assistant who generates creative ideas. Make original, innovative suggestions and think beyond conventional approaches.",
    },
    Preset {
        key: "technical",
        name: "Technical",
        prompt: "You are a technical expert. Answer questions about programming, IT and engineering accurately and in technical detail, including code examples.",
    },
];

const X_PRESETS: &[Preset] = &[
    Preset {
        key: NO_PRESET,
        name: "No preset",
        prompt: "",
    },
    Preset {
        key: "viral",
        name: "Go viral",
        prompt: "Write X (Twitter) posts that are likely to spread. Follow current trends, aim for relatable content that invites reposts, and suggest fitting hashtags.",
    },
    Preset {
        key: "business",
        name: "Business announcement",
        prompt: "Write professional X posts for business. Summarize the information concisely, include a call to action, and encourage follower engagement.",
    },
    Preset {
        key: "casual",
        name: "Casual",
        prompt: "Write casual, approachable X posts about everyday topics that bring followers closer.",
    },
];

const FACEBOOK_PRESETS: &[Preset] = &[
    Preset {
        key: NO_PRESET,
        name: "No preset",
        prompt: "",
    },
    Preset {
        key: "engagement",
        name: "Engagement first",
        prompt: "Write Facebook posts that drive engagement. Ask questions, invite comments, and make the post easy to like and share.",
    },
    Preset {
        key: "storytelling",
        name: "Storytelling",
        prompt: "Write Facebook posts with a narrative. Appeal to the reader's emotions and tell it as a relatable story.",
    },
    Preset {
        key: "informative",
        name: "Informative",
        prompt: "Write Facebook posts that share useful information. Organize valuable knowledge and tips so readers can follow them easily.",
    },
];

const PROFILE_PRESETS: &[Preset] = &[
    Preset {
        key: NO_PRESET,
        name: "No preset",
        prompt: "",
    },
    Preset {
        key: "professional",
        name: "Professional",
        prompt: "Write a professional self-introduction for LinkedIn or business use. Highlight achievements, skills and experience to build credibility.",
    },
    Preset {
        key: "creative",
        name: "Creative",
        prompt: "Write a creative, distinctive self-introduction that puts individuality first and is easy to remember.",
    },
    Preset {
        key: "concise",
        name: "Concise",
        prompt: "Write a concise self-introduction that keeps only the most important information in an easy-to-read format.",
    },
];

/// All personalities, "default" first
pub const PERSONALITIES: &[Personality] = &[
    Personality {
        key: DEFAULT_PERSONALITY,
        label: "Default",
        description: "A balanced, standard tone that adapts to the situation.",
        prompt: "",
    },
    Personality {
        key: "friendly",
        label: "Friendly",
        description: "Chatty and approachable, with the occasional emoji.",
        prompt: "Keep the conversation friendly and warm, and use emoji where appropriate.",
    },
    Personality {
        key: "professional",
        label: "Professional",
        description: "A calm register suited to business and formal settings.",
        prompt: "Answer in a calm, formal tone as a business expert, and state your reasoning clearly.",
    },
    Personality {
        key: "teacher",
        label: "Teacher",
        description: "Guides patiently with explanations, like a teacher.",
        prompt: "As an excellent teacher, explain carefully with concrete examples and supplementary notes.",
    },
    Personality {
        key: "creative",
        label: "Creative",
        description: "Livens up the conversation with free-flowing ideas.",
        prompt: "Bring in creative perspectives and actively offer original suggestions.",
    },
    Personality {
        key: "technical",
        label: "Technical",
        description: "A technical style that leans on terminology and evidence.",
        prompt: "Answer in detail as a specialist, making the technical background and evidence explicit.",
    },
];

/// All instruction tags
pub const INSTRUCTION_TAGS: &[InstructionTag] = &[
    InstructionTag {
        key: "chatty",
        label: "Chatty",
        prompt: "Keep the conversation friendly and move it along at a chatty pace.",
    },
    InstructionTag {
        key: "witty",
        label: "Witty",
        prompt: "Mix in humor and wit, and add clever remarks.",
    },
    InstructionTag {
        key: "direct",
        label: "Direct",
        prompt: "Lead with the conclusion and answer frankly and clearly.",
    },
    InstructionTag {
        key: "encourage",
        label: "Encouraging",
        prompt: "Be encouraging and add positive feedback.",
    },
    InstructionTag {
        key: "genZ",
        label: "Gen Z",
        prompt: "Use casual Gen Z expressions and trending terms in moderation.",
    },
    InstructionTag {
        key: "polite",
        label: "Polite",
        prompt: "Answer courteously, using polite and respectful language.",
    },
    InstructionTag {
        key: "concise",
        label: "Concise",
        prompt: "Keep the main points short and avoid redundant phrasing.",
    },
];

/// Look up a personality by key
#[must_use]
pub fn personality(key: &str) -> Option<&'static Personality> {
    PERSONALITIES.iter().find(|p| p.key == key)
}

/// Look up an instruction tag by key
#[must_use]
pub fn instruction_tag(key: &str) -> Option<&'static InstructionTag> {
    INSTRUCTION_TAGS.iter().find(|t| t.key == key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_family_starts_with_none() {
        for family in [
            PresetFamily::General,
            PresetFamily::X,
            PresetFamily::Facebook,
            PresetFamily::Profile,
        ] {
            let first = family.presets()[0];
            assert_eq!(first.key, NO_PRESET);
            assert!(first.prompt.is_empty());
        }
    }

    #[test]
    fn test_preset_lookup_is_family_scoped() {
        assert!(PresetFamily::General.preset("technical").is_some());
        assert!(PresetFamily::X.preset("technical").is_none());
        assert!(PresetFamily::X.preset("viral").is_some());
    }

    #[test]
    fn test_default_personality_is_silent() {
        assert!(personality(DEFAULT_PERSONALITY).unwrap().prompt.is_empty());
        assert!(personality("unknown").is_none());
    }

    #[test]
    fn test_tag_keys_are_unique() {
        let mut keys: Vec<_> = INSTRUCTION_TAGS.iter().map(|t| t.key).collect();
        keys.sort_unstable();
        keys.dedup();
        assert_eq!(keys.len(), INSTRUCTION_TAGS.len());
        assert!(instruction_tag("genZ").is_some());
    }

    #[test]
    fn test_family_serde_lowercase() {
        let family: PresetFamily = serde_json::from_str("\"facebook\"").unwrap();
        assert_eq!(family, PresetFamily::Facebook);
    }
}
