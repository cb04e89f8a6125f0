//! Prompt compilation
//!
//! `compile` is pure and total: the output depends only on the profile, and
//! the parts always appear in the same order so equal profiles compile to
//! byte-identical strings.

use super::catalog::{instruction_tag, personality, NO_PRESET};
use super::profile::PromptProfile;

/// Header of the profile block
pub const PROFILE_HEADER: &str = "User profile:";
/// Label for the nickname line
pub const NICKNAME_LABEL: &str = "Nickname";
/// Label for the profession line
pub const PROFESSION_LABEL: &str = "Profession";
/// Label for the about-details line
pub const DETAILS_LABEL: &str = "Details";

/// Merge every layer of a profile into one instruction string
///
/// Order: behavioral seed, personality, instruction tags, profile block.
/// Parts are trimmed, empty parts are skipped, and the rest are joined by a
/// blank line.
#[must_use]
pub fn compile(profile: &PromptProfile) -> String {
    let parts = [
        behavioral_seed(profile),
        personality_text(profile),
        tag_block(profile),
        profile_block(profile),
    ];

    parts
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn behavioral_seed(profile: &PromptProfile) -> Option<String> {
    let custom = profile.custom_instructions.trim();
    if !custom.is_empty() {
        return Some(custom.to_string());
    }
    if profile.preset_key == NO_PRESET {
        return None;
    }
    profile
        .preset_family
        .preset(&profile.preset_key)
        .and_then(|preset| non_empty(preset.prompt))
}

fn personality_text(profile: &PromptProfile) -> Option<String> {
    personality(&profile.personality_key).and_then(|p| non_empty(p.prompt))
}

fn tag_block(profile: &PromptProfile) -> Option<String> {
    let lines: Vec<&str> = profile
        .instruction_tag_keys
        .iter()
        .filter_map(|key| instruction_tag(key))
        .map(|tag| tag.prompt.trim())
        .filter(|text| !text.is_empty())
        .collect();

    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

fn profile_block(profile: &PromptProfile) -> Option<String> {
    let fields = [
        (NICKNAME_LABEL, &profile.nickname),
        (PROFESSION_LABEL, &profile.profession),
        (DETAILS_LABEL, &profile.about_details),
    ];

    let lines: Vec<String> = fields
        .iter()
        .filter_map(|(label, value)| {
            let value = value.trim();
            (!value.is_empty()).then(|| format!("{label}: {value}"))
        })
        .collect();

    if lines.is_empty() {
        None
    } else {
        Some(format!("{PROFILE_HEADER}\n{}", lines.join("\n")))
    }
}

fn non_empty(text: &str) -> Option<String> {
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}
