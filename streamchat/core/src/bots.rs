//! Bot Registry
//!
//! Every context key the client knows about is a bot: a display name, the
//! endpoint its turns are posted to, and the preset family its settings
//! editor offers. Contexts never share state, so adding a bot is purely
//! declarative.

use serde::{Deserialize, Serialize};

use crate::messages::ContextKey;
use crate::prompt::PresetFamily;

/// Endpoint used by the built-in bots
pub const DEFAULT_ENDPOINT: &str = "/api/chat-stream";

/// Instruction string for the project visualizer when the user set none
pub const PROJECT_VISUALIZER_PROMPT: &str = "You are the Project Visualizer bot.\n\n\
Carefully draw out the user's project goals, stakeholders, tasks, deadlines and dependencies, and present them in a structured form.\n\
Where useful, break the work down into a WBS, milestones, risks and priorities at a granularity that fits a Gantt chart, and propose the concrete next actions to take.";

/// One conversational context
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotDefinition {
    /// Context key (also the persistence key suffix)
    pub key: ContextKey,
    /// Display name
    pub name: String,
    /// One-line description
    #[serde(default)]
    pub description: String,
    /// Input hint
    #[serde(default)]
    pub placeholder: String,
    /// Path the turns are posted to
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Preset table offered for this bot
    #[serde(default)]
    pub preset_family: PresetFamily,
    /// Instruction string used when the compiled prompt is empty
    #[serde(default)]
    pub default_prompt: Option<String>,
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

impl BotDefinition {
    /// Create a bot on the default endpoint with the general preset family
    pub fn new(key: impl Into<ContextKey>, name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            description: String::new(),
            placeholder: String::new(),
            endpoint: default_endpoint(),
            preset_family: PresetFamily::General,
            default_prompt: None,
        }
    }

    /// The system prompt to send, given the user's compiled prompt
    ///
    /// Falls back to the bot's default; `None` means omit the field.
    #[must_use]
    pub fn effective_prompt(&self, compiled: &str) -> Option<String> {
        if compiled.is_empty() {
            self.default_prompt.clone().filter(|p| !p.is_empty())
        } else {
            Some(compiled.to_string())
        }
    }
}

/// Ordered set of known bots
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BotRegistry {
    bots: Vec<BotDefinition>,
}

impl Default for BotRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl BotRegistry {
    /// The bots shipped with the client
    #[must_use]
    pub fn builtin() -> Self {
        Self {
            bots: vec![
                BotDefinition {
                    description: "Helps visualize project structure, tasks and dependencies".into(),
                    placeholder: "Describe your project or its tasks...".into(),
                    default_prompt: Some(PROJECT_VISUALIZER_PROMPT.into()),
                    ..BotDefinition::new("project-visualizer", "Project Visualizer")
                },
                BotDefinition {
                    description: "Drafts posts for X".into(),
                    placeholder: "What should the post be about?".into(),
                    preset_family: PresetFamily::X,
                    ..BotDefinition::new("x", "X Post Writer")
                },
                BotDefinition {
                    description: "Drafts Facebook posts".into(),
                    placeholder: "What should the post be about?".into(),
                    preset_family: PresetFamily::Facebook,
                    ..BotDefinition::new("facebook", "Facebook Post Writer")
                },
                BotDefinition {
                    description: "Writes self-introductions and profiles".into(),
                    placeholder: "Tell me about yourself...".into(),
                    preset_family: PresetFamily::Profile,
                    ..BotDefinition::new("profile", "Profile Writer")
                },
            ],
        }
    }

    /// Registry from configured bots; an empty list means the built-in set
    ///
    /// Later duplicates of a key are dropped.
    #[must_use]
    pub fn from_definitions(definitions: Vec<BotDefinition>) -> Self {
        if definitions.is_empty() {
            return Self::builtin();
        }
        let mut bots: Vec<BotDefinition> = Vec::with_capacity(definitions.len());
        for bot in definitions {
            if bots.iter().any(|b| b.key == bot.key) {
                tracing::warn!(context = %bot.key, "Duplicate bot definition ignored");
                continue;
            }
            bots.push(bot);
        }
        Self { bots }
    }

    /// Look up a bot
    #[must_use]
    pub fn get(&self, key: &ContextKey) -> Option<&BotDefinition> {
        self.bots.iter().find(|b| &b.key == key)
    }

    /// Whether a key is registered
    #[must_use]
    pub fn contains(&self, key: &ContextKey) -> bool {
        self.get(key).is_some()
    }

    /// First registered bot
    #[must_use]
    pub fn first(&self) -> Option<&BotDefinition> {
        self.bots.first()
    }

    /// All bots in registration order
    pub fn iter(&self) -> impl Iterator<Item = &BotDefinition> {
        self.bots.iter()
    }

    /// Number of bots
    #[must_use]
    pub fn len(&self) -> usize {
        self.bots.len()
    }

    /// Whether the registry is empty (never true for a built registry)
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bots.is_empty()
    }
}
