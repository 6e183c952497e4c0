use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Every field a structured prompt can carry, in canonical declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldKey {
    Subject,
    Environment,
    Composition,
    Camera,
    CameraSettings,
    Lighting,
    Color,
    Mood,
    Style,
    Medium,
    Quality,
    Genre,
}

impl FieldKey {
    pub const ALL: [FieldKey; 12] = [
        FieldKey::Subject,
        FieldKey::Environment,
        FieldKey::Composition,
        FieldKey::Camera,
        FieldKey::CameraSettings,
        FieldKey::Lighting,
        FieldKey::Color,
        FieldKey::Mood,
        FieldKey::Style,
        FieldKey::Medium,
        FieldKey::Quality,
        FieldKey::Genre,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FieldKey::Subject => "subject",
            FieldKey::Environment => "environment",
            FieldKey::Composition => "composition",
            FieldKey::Camera => "camera",
            FieldKey::CameraSettings => "cameraSettings",
            FieldKey::Lighting => "lighting",
            FieldKey::Color => "color",
            FieldKey::Mood => "mood",
            FieldKey::Style => "style",
            FieldKey::Medium => "medium",
            FieldKey::Quality => "quality",
            FieldKey::Genre => "genre",
        }
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldKey {
    type Err = String;

    /// Accepts the camelCase wire name as well as snake_case and
    /// hyphenated spellings typed at a prompt.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().replace(['_', '-'], "").to_ascii_lowercase();
        FieldKey::ALL
            .into_iter()
            .find(|key| key.as_str().to_ascii_lowercase() == normalized)
            .ok_or_else(|| format!("unknown field '{}'", raw.trim()))
    }
}

/// Partial record of prompt field values.
///
/// Absent keys and keys holding an empty string are both "unset" for the
/// purposes of merging; see [`StructuredPrompt::value`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StructuredPrompt {
    fields: BTreeMap<FieldKey, String>,
}

impl StructuredPrompt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw stored value, including whitespace-only entries.
    pub fn get(&self, key: FieldKey) -> Option<&str> {
        self.fields.get(&key).map(String::as_str)
    }

    /// Trimmed value, `None` when absent or blank.
    pub fn value(&self, key: FieldKey) -> Option<&str> {
        self.get(key).map(str::trim).filter(|value| !value.is_empty())
    }

    pub fn contains(&self, key: FieldKey) -> bool {
        self.fields.contains_key(&key)
    }

    pub fn set(&mut self, key: FieldKey, value: impl Into<String>) {
        self.fields.insert(key, value.into());
    }

    pub fn remove(&mut self, key: FieldKey) -> Option<String> {
        self.fields.remove(&key)
    }

    pub fn clear(&mut self) {
        self.fields.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn keys(&self) -> impl Iterator<Item = FieldKey> + '_ {
        self.fields.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (FieldKey, &str)> + '_ {
        self.fields.iter().map(|(key, value)| (*key, value.as_str()))
    }

    /// Copies every non-blank entry of `other` over `self`.
    pub fn overlay(&mut self, other: &StructuredPrompt) {
        for (key, value) in other.iter() {
            if !value.trim().is_empty() {
                self.set(key, value);
            }
        }
    }

    /// Lenient reader for model output: keeps string members whose names
    /// are known field keys and ignores everything else.
    pub fn from_json_lenient(value: &Value) -> Self {
        let mut prompt = Self::new();
        let Some(object) = value.as_object() else {
            return prompt;
        };
        for (name, item) in object {
            let Ok(key) = name.parse::<FieldKey>() else {
                continue;
            };
            if let Some(text) = item.as_str() {
                prompt.set(key, text);
            }
        }
        prompt
    }
}

impl FromIterator<(FieldKey, String)> for StructuredPrompt {
    fn from_iter<I: IntoIterator<Item = (FieldKey, String)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

pub const DEFAULT_WEIGHT: u32 = 100;
pub const MAX_WEIGHT: u32 = 200;

/// Per-field emphasis percentages. Only rendered in expert mode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PromptWeights {
    weights: BTreeMap<FieldKey, u32>,
}

impl PromptWeights {
    /// Every key starts at [`DEFAULT_WEIGHT`].
    pub fn reset_for(keys: impl IntoIterator<Item = FieldKey>) -> Self {
        Self {
            weights: keys.into_iter().map(|key| (key, DEFAULT_WEIGHT)).collect(),
        }
    }

    pub fn get(&self, key: FieldKey) -> Option<u32> {
        self.weights.get(&key).copied()
    }

    pub fn set(&mut self, key: FieldKey, percent: u32) {
        self.weights.insert(key, percent);
    }

    pub fn iter(&self) -> impl Iterator<Item = (FieldKey, u32)> + '_ {
        self.weights.iter().map(|(key, weight)| (*key, *weight))
    }
}

/// Where a field's current value stands relative to the active preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    OriginalFromPreset,
    ModifiedFromPreset,
    Plain,
}

impl Provenance {
    pub fn classify(preset_value: Option<&str>, current: Option<&str>) -> Self {
        match preset_value {
            None => Provenance::Plain,
            Some(expected) if current == Some(expected) => Provenance::OriginalFromPreset,
            Some(_) => Provenance::ModifiedFromPreset,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Provenance::OriginalFromPreset => "preset",
            Provenance::ModifiedFromPreset => "modified",
            Provenance::Plain => "plain",
        }
    }
}
