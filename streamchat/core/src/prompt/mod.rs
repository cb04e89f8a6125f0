//! Prompt Compilation
//!
//! Turns a user's layered preferences into the single instruction string sent
//! with every turn.
//!
//! # Layers
//!
//! ```text
//!   custom instructions ──┐ (else preset text)
//!   personality ──────────┤
//!   instruction tags ─────┼──► compile() ──► "seed\n\npersonality\n\ntags\n\nUser profile:\n..."
//!   nickname/profession/  │
//!   about details ────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use streamchat_core::prompt::{compile, PresetFamily, PromptProfile};
//!
//! let mut profile = PromptProfile::new(PresetFamily::General);
//! profile.custom_instructions = "Answer briefly.".into();
//! profile.nickname = "Sam".into();
//!
//! assert_eq!(compile(&profile), "Answer briefly.\n\nUser profile:\nNickname: Sam");
//! ```

mod catalog;
mod compile;
mod persist;
mod profile;

pub use catalog::{
    instruction_tag, personality, InstructionTag, Personality, Preset, PresetFamily,
    DEFAULT_PERSONALITY, INSTRUCTION_TAGS, NO_PRESET, PERSONALITIES,
};
pub use compile::{compile, DETAILS_LABEL, NICKNAME_LABEL, PROFESSION_LABEL, PROFILE_HEADER};
pub use persist::{load_profile, save_profile, ProfileSource, SaveError, LOAD_ORDER};
pub use profile::{
    ProfileError, PromptProfile, MAX_ABOUT_DETAILS_CHARS, MAX_CUSTOM_INSTRUCTIONS_CHARS,
};
