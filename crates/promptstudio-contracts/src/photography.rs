use std::fmt;
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::prompt::FieldKey;
use crate::scenes::{Highlight, SceneRegistry};

pub const DEFAULT_CAMERA_BODY: &str = "Hasselblad H6D-100c";
pub const DEFAULT_LENS: &str = "HC 80mm f/1.9";
pub const DEFAULT_LIGHTING_RIG: &str = "Cinematic Studio Light";
pub const DEFAULT_COLOR_SCIENCE: &str = "Professional Color Matrix";
pub const DEFAULT_FEATURES: &str = "Refined Oriental model";
pub const DEFAULT_OUTFIT: &str = "High-end fashion";
pub const DEFAULT_MODEL_ID: &str = "default-model";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareSystem {
    pub camera_body: String,
    pub lens: String,
    pub lighting_rig: String,
    pub color_science: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Persona {
    pub model_id: String,
    pub features: String,
    pub outfit: String,
    pub temperament: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shot {
    pub id: String,
    pub label: String,
    pub composition: String,
    pub pose: String,
    pub narrative: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhotographySession {
    pub id: String,
    pub title: String,
    pub system: HardwareSystem,
    pub persona: Persona,
    pub shots: Vec<Shot>,
}

impl PhotographySession {
    /// Builds a shooting session from a highlight collection, filling the
    /// hardware and persona layers from its primary preset.
    pub fn from_highlight(highlight: &Highlight, registry: &SceneRegistry) -> Result<Self> {
        let preset = highlight
            .primary_preset_id()
            .and_then(|id| registry.preset(id))
            .with_context(|| format!("highlight '{}' has no usable preset", highlight.id))?;
        let pick = |key: FieldKey, fallback: &str| {
            preset
                .data
                .value(key)
                .unwrap_or(fallback)
                .to_string()
        };

        let shot = |idx: usize, label: &str, composition: &str, pose: &str, narrative: &str| Shot {
            id: format!("{}-{}", highlight.id, idx),
            label: label.to_string(),
            composition: composition.to_string(),
            pose: pose.to_string(),
            narrative: narrative.to_string(),
            preview_url: highlight.cover_url.clone(),
        };

        Ok(Self {
            id: highlight.id.clone(),
            title: highlight.title.clone(),
            system: HardwareSystem {
                camera_body: pick(FieldKey::Camera, DEFAULT_CAMERA_BODY),
                lens: pick(FieldKey::CameraSettings, DEFAULT_LENS),
                lighting_rig: pick(FieldKey::Lighting, DEFAULT_LIGHTING_RIG),
                color_science: DEFAULT_COLOR_SCIENCE.to_string(),
            },
            persona: Persona {
                model_id: DEFAULT_MODEL_ID.to_string(),
                features: pick(FieldKey::Subject, DEFAULT_FEATURES),
                outfit: pick(FieldKey::Style, DEFAULT_OUTFIT),
                temperament: highlight.sub_title.clone(),
            },
            shots: vec![
                shot(
                    1,
                    "分镜 - 特写",
                    "Extreme Close-up",
                    "Facing Camera",
                    "聚焦神韵与细节",
                ),
                shot(2, "分镜 - 中景", "Medium Shot", "Side Profile", "展现姿态与环境互动"),
                shot(3, "分镜 - 远景", "Wide Shot", "Atmospheric", "整体氛围与叙事"),
            ],
        })
    }

    pub fn shot(&self, shot_id: &str) -> Option<&Shot> {
        self.shots.iter().find(|shot| shot.id == shot_id)
    }

    pub fn first_shot(&self) -> Option<&Shot> {
        self.shots.first()
    }
}

/// One session per highlight, in highlight order.
pub fn sessions_from_registry(registry: &SceneRegistry) -> Result<Vec<PhotographySession>> {
    registry
        .highlights()
        .map(|highlight| PhotographySession::from_highlight(highlight, registry))
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhotographyMode {
    #[default]
    Script,
    Portrait,
}

impl fmt::Display for PhotographyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PhotographyMode::Script => "script",
            PhotographyMode::Portrait => "portrait",
        })
    }
}

impl FromStr for PhotographyMode {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "script" => Ok(PhotographyMode::Script),
            "portrait" => Ok(PhotographyMode::Portrait),
            other => Err(format!("unknown photography mode '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_from_highlight_uses_preset_then_defaults() -> anyhow::Result<()> {
        let registry = SceneRegistry::builtin()?;
        let highlight = registry
            .highlight("col-monochrome")
            .ok_or_else(|| anyhow::anyhow!("missing highlight"))?;
        let session = PhotographySession::from_highlight(highlight, &registry)?;

        assert_eq!(session.system.camera_body, "Leica M11 Monochrom");
        assert_eq!(session.system.lens, DEFAULT_LENS);
        assert_eq!(session.system.lighting_rig, "precise studio key light");
        assert_eq!(session.system.color_science, DEFAULT_COLOR_SCIENCE);
        assert_eq!(session.persona.outfit, DEFAULT_OUTFIT);
        assert_eq!(session.persona.temperament, "Studio Monochrome");
        let ids = session
            .shots
            .iter()
            .map(|shot| shot.id.as_str())
            .collect::<Vec<_>>();
        assert_eq!(
            ids,
            vec!["col-monochrome-1", "col-monochrome-2", "col-monochrome-3"]
        );
        Ok(())
    }

    #[test]
    fn every_highlight_yields_a_session() -> anyhow::Result<()> {
        let registry = SceneRegistry::builtin()?;
        let sessions = sessions_from_registry(&registry)?;
        assert_eq!(sessions.len(), registry.highlights().count());
        assert!(sessions.iter().all(|session| session.shots.len() == 3));
        Ok(())
    }

    #[test]
    fn photography_mode_parses() {
        assert_eq!(
            "Portrait".parse::<PhotographyMode>(),
            Ok(PhotographyMode::Portrait)
        );
        assert!("video".parse::<PhotographyMode>().is_err());
    }
}
