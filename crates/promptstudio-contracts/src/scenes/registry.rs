use anyhow::{bail, Context, Result};
use indexmap::IndexMap;

use super::schema::{Highlight, Preset, PresetKind, SceneDefinition};

const DEFAULT_SCENES_JSON: &str = include_str!("../../resources/scenes.json");
const DEFAULT_PRESETS_JSON: &str = include_str!("../../resources/presets.json");
const DEFAULT_HIGHLIGHTS_JSON: &str = include_str!("../../resources/highlights.json");

pub const OFFICIAL_PRESET_AUTHOR: &str = "PromptStudio Official";

/// Static scene, preset and highlight data. Immutable once loaded.
#[derive(Debug, Clone)]
pub struct SceneRegistry {
    scenes: IndexMap<String, SceneDefinition>,
    presets: IndexMap<String, Preset>,
    highlights: IndexMap<String, Highlight>,
}

impl SceneRegistry {
    /// Registry backed by the bundled resources.
    pub fn builtin() -> Result<Self> {
        Self::from_json(
            DEFAULT_SCENES_JSON,
            DEFAULT_PRESETS_JSON,
            DEFAULT_HIGHLIGHTS_JSON,
        )
        .context("bundled scene resources are invalid")
    }

    pub fn from_json(scenes_json: &str, presets_json: &str, highlights_json: &str) -> Result<Self> {
        let scenes: Vec<SceneDefinition> =
            serde_json::from_str(scenes_json).context("failed to parse scene definitions")?;
        let presets: Vec<Preset> =
            serde_json::from_str(presets_json).context("failed to parse presets")?;
        let highlights: Vec<Highlight> =
            serde_json::from_str(highlights_json).context("failed to parse highlights")?;
        Self::from_parts(scenes, presets, highlights)
    }

    /// Builds and validates a registry. Official presets are derived from
    /// each scene's defaults and listed ahead of the supplied presets.
    pub fn from_parts(
        scenes: Vec<SceneDefinition>,
        presets: Vec<Preset>,
        highlights: Vec<Highlight>,
    ) -> Result<Self> {
        let mut scene_map = IndexMap::new();
        for scene in scenes {
            for key in scene.defaults.keys() {
                if !scene.declares(key) {
                    bail!(
                        "scene '{}' has a default for undeclared field '{}'",
                        scene.id,
                        key
                    );
                }
            }
            if scene_map.contains_key(&scene.id) {
                bail!("duplicate scene id '{}'", scene.id);
            }
            scene_map.insert(scene.id.clone(), scene);
        }

        let mut preset_map = IndexMap::new();
        for scene in scene_map.values() {
            let official = official_preset_for(scene);
            preset_map.insert(official.id.clone(), official);
        }
        for preset in presets {
            if preset.kind == PresetKind::Official {
                bail!(
                    "preset '{}' is marked official; official presets derive from scene defaults",
                    preset.id
                );
            }
            let Some(scene) = scene_map.get(&preset.scene_id) else {
                bail!(
                    "preset '{}' references unknown scene '{}'",
                    preset.id,
                    preset.scene_id
                );
            };
            for key in preset.data.keys() {
                if !scene.declares(key) {
                    bail!(
                        "preset '{}' sets field '{}' which scene '{}' does not declare",
                        preset.id,
                        key,
                        scene.id
                    );
                }
            }
            if preset_map.contains_key(&preset.id) {
                bail!("duplicate preset id '{}'", preset.id);
            }
            preset_map.insert(preset.id.clone(), preset);
        }

        let mut highlight_map = IndexMap::new();
        for highlight in highlights {
            if highlight.featured_preset_ids.is_empty() {
                bail!("highlight '{}' features no presets", highlight.id);
            }
            for preset_id in &highlight.featured_preset_ids {
                if !preset_map.contains_key(preset_id) {
                    bail!(
                        "highlight '{}' references unknown preset '{}'",
                        highlight.id,
                        preset_id
                    );
                }
            }
            highlight_map.insert(highlight.id.clone(), highlight);
        }

        Ok(Self {
            scenes: scene_map,
            presets: preset_map,
            highlights: highlight_map,
        })
    }

    pub fn get(&self, scene_id: &str) -> Option<&SceneDefinition> {
        self.scenes.get(scene_id)
    }

    pub fn list(&self) -> impl Iterator<Item = &SceneDefinition> {
        self.scenes.values()
    }

    pub fn available(&self) -> impl Iterator<Item = &SceneDefinition> {
        self.scenes.values().filter(|scene| scene.is_available)
    }

    /// First scene in declaration order.
    pub fn default_scene(&self) -> Option<&SceneDefinition> {
        self.scenes.values().next()
    }

    pub fn preset(&self, preset_id: &str) -> Option<&Preset> {
        self.presets.get(preset_id)
    }

    pub fn presets(&self) -> impl Iterator<Item = &Preset> {
        self.presets.values()
    }

    pub fn presets_for_scene<'a>(&'a self, scene_id: &'a str) -> impl Iterator<Item = &'a Preset> {
        self.presets
            .values()
            .filter(move |preset| preset.scene_id == scene_id)
    }

    pub fn official_preset(&self, scene_id: &str) -> Option<&Preset> {
        self.presets.get(&official_preset_id(scene_id))
    }

    pub fn highlight(&self, highlight_id: &str) -> Option<&Highlight> {
        self.highlights.get(highlight_id)
    }

    pub fn highlights(&self) -> impl Iterator<Item = &Highlight> {
        self.highlights.values()
    }
}

pub fn official_preset_id(scene_id: &str) -> String {
    format!("official-{scene_id}")
}

fn official_preset_for(scene: &SceneDefinition) -> Preset {
    Preset {
        id: official_preset_id(&scene.id),
        title: scene
            .official_title
            .clone()
            .unwrap_or_else(|| scene.name.clone()),
        author: OFFICIAL_PRESET_AUTHOR.to_string(),
        scene_id: scene.id.clone(),
        kind: PresetKind::Official,
        likes: None,
        data: scene.defaults.clone(),
    }
}
