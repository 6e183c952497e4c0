use promptstudio_contracts::photography::{PhotographySession, Shot};
use promptstudio_contracts::prompt::{FieldKey, PromptWeights, StructuredPrompt, DEFAULT_WEIGHT};
use promptstudio_contracts::scenes::{SceneDefinition, UserMode};
use similar::{ChangeTag, TextDiff};

/// Constraints appended to every photography prompt and prefixed to every
/// render request.
pub const AESTHETIC_GUARD: &str = "Eastern aesthetic, high-end Chinese style, refined Chinese features (approx. 25 years old), porcelain skin, no Western/Japanese elements, 8k professional photography, Hasselblad/ARRI look.";

pub const ENTRY_SEPARATOR: &str = ", ";

/// Declared keys ascending by priority. Ties keep declaration order.
pub fn field_order(scene: &SceneDefinition) -> Vec<FieldKey> {
    let mut keyed = scene
        .fields
        .iter()
        .map(|(key, schema)| (*key, schema.priority))
        .collect::<Vec<_>>();
    keyed.sort_by_key(|(_, priority)| *priority);
    keyed.into_iter().map(|(key, _)| key).collect()
}

/// `(value:1.5)` for 150. One decimal, halves rounded up.
pub fn format_weighted(value: &str, percent: u32) -> String {
    let tenths = (percent + 5) / 10;
    format!("({value}:{}.{})", tenths / 10, tenths % 10)
}

pub fn compile(
    values: &StructuredPrompt,
    order: &[FieldKey],
    mode: UserMode,
    weights: &PromptWeights,
) -> String {
    let mut entries = Vec::new();
    for key in order {
        let Some(value) = values.value(*key) else {
            continue;
        };
        let entry = match weights.get(*key) {
            Some(weight) if mode == UserMode::Expert && weight != DEFAULT_WEIGHT => {
                format_weighted(value, weight)
            }
            _ => value.to_string(),
        };
        entries.push(entry);
    }
    let compiled = entries.join(ENTRY_SEPARATOR);
    tracing::debug!(entries = entries.len(), "compiled prompt");
    compiled
}

/// Sectioned prompt for the photography flow. Every labeled entry is
/// emitted even when empty.
pub fn compile_layered(session: &PhotographySession, shot: &Shot) -> String {
    let system = &session.system;
    let persona = &session.persona;
    let raw = format!(
        "[HARDWARE] Camera: {}, Lens: {}, Lighting: {}, Color Science: {}. \
         [PERSONA] Features: {}, Outfit: {}, Temperament: {}. \
         [SHOT] Composition: {}, Pose: {}, Narrative: {}. \
         [AESTHETIC GUARD] {}",
        system.camera_body,
        system.lens,
        system.lighting_rig,
        system.color_science,
        persona.features,
        persona.outfit,
        persona.temperament,
        shot.composition,
        shot.pose,
        shot.narrative,
        AESTHETIC_GUARD,
    );
    collapse_whitespace(&raw)
}

pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Prefixes the aesthetic guard unless the prompt already carries it.
pub fn with_aesthetic_guard(prompt: &str) -> String {
    let trimmed = prompt.trim();
    if trimmed.contains(AESTHETIC_GUARD) {
        return trimmed.to_string();
    }
    if trimmed.is_empty() {
        return AESTHETIC_GUARD.to_string();
    }
    format!("{AESTHETIC_GUARD}, {trimmed}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffTag {
    Kept,
    Removed,
    Added,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffLine {
    pub tag: DiffTag,
    pub entry: String,
}

/// Entry-level diff of two compiled prompts.
pub fn diff_compiled(base: &str, optimized: &str) -> Vec<DiffLine> {
    let to_lines = |text: &str| {
        text.split(ENTRY_SEPARATOR)
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(|entry| format!("{entry}\n"))
            .collect::<String>()
    };
    let old = to_lines(base);
    let new = to_lines(optimized);
    TextDiff::from_lines(&old, &new)
        .iter_all_changes()
        .map(|change| DiffLine {
            tag: match change.tag() {
                ChangeTag::Equal => DiffTag::Kept,
                ChangeTag::Delete => DiffTag::Removed,
                ChangeTag::Insert => DiffTag::Added,
            },
            entry: change.value().trim_end_matches('\n').to_string(),
        })
        .collect()
}
