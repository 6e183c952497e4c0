use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::prompt::{FieldKey, StructuredPrompt};

/// Three-tier user mode. Ordering follows rank.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum UserMode {
    #[default]
    Beginner,
    Advanced,
    Expert,
}

impl UserMode {
    pub const ALL: [UserMode; 3] = [UserMode::Beginner, UserMode::Advanced, UserMode::Expert];

    pub fn rank(self) -> u8 {
        match self {
            UserMode::Beginner => 1,
            UserMode::Advanced => 2,
            UserMode::Expert => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            UserMode::Beginner => "beginner",
            UserMode::Advanced => "advanced",
            UserMode::Expert => "expert",
        }
    }
}

impl fmt::Display for UserMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserMode {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "beginner" => Ok(UserMode::Beginner),
            "advanced" => Ok(UserMode::Advanced),
            "expert" => Ok(UserMode::Expert),
            other => Err(format!(
                "unknown mode '{other}' (expected beginner, advanced or expert)"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldValueType {
    Text,
    Enum,
    Range,
    Multi,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayType {
    Tags,
    Grid,
    Dropdown,
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldOption {
    pub label: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_weight: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSchema {
    pub label: String,
    pub value_type: FieldValueType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_type: Option<DisplayType>,
    #[serde(default)]
    pub is_required: bool,
    #[serde(default)]
    pub is_recommended: bool,
    pub min_visibility: UserMode,
    pub min_editable: UserMode,
    #[serde(default)]
    pub editable_weight_in_expert: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<FieldOption>,
    pub priority: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
}

impl FieldSchema {
    pub fn option_for_value(&self, value: &str) -> Option<&FieldOption> {
        self.options.iter().find(|option| option.value == value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneDefinition {
    pub id: String,
    pub name: String,
    pub name_en: String,
    pub description: String,
    pub icon: String,
    #[serde(default = "default_available")]
    pub is_available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub official_title: Option<String>,
    pub fields: IndexMap<FieldKey, FieldSchema>,
    #[serde(default)]
    pub defaults: StructuredPrompt,
}

fn default_available() -> bool {
    true
}

impl SceneDefinition {
    pub fn field(&self, key: FieldKey) -> Option<&FieldSchema> {
        self.fields.get(&key)
    }

    pub fn declares(&self, key: FieldKey) -> bool {
        self.fields.contains_key(&key)
    }

    pub fn declared_keys(&self) -> impl Iterator<Item = FieldKey> + '_ {
        self.fields.keys().copied()
    }

    pub fn required_keys(&self) -> impl Iterator<Item = FieldKey> + '_ {
        self.fields
            .iter()
            .filter(|(_, schema)| schema.is_required)
            .map(|(key, _)| *key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresetKind {
    Official,
    Community,
    Highlight,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preset {
    pub id: String,
    pub title: String,
    pub author: String,
    pub scene_id: String,
    pub kind: PresetKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub likes: Option<String>,
    pub data: StructuredPrompt,
}

/// Curated collection featuring one or more presets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Highlight {
    pub id: String,
    pub title: String,
    pub sub_title: String,
    pub description: String,
    pub featured_preset_ids: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_number: Option<String>,
}

impl Highlight {
    pub fn primary_preset_id(&self) -> Option<&str> {
        self.featured_preset_ids.first().map(String::as_str)
    }
}
