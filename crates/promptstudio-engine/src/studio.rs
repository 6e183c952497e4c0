use std::sync::Arc;

use anyhow::Result;
use promptstudio_contracts::chat::CompileView;
use promptstudio_contracts::events::EventWriter;
use promptstudio_contracts::logs::{DebugKind, DebugLog, HistoryItem, RenderHistory};
use promptstudio_contracts::prompt::{
    FieldKey, PromptWeights, Provenance, StructuredPrompt, DEFAULT_WEIGHT, MAX_WEIGHT,
};
use promptstudio_contracts::scenes::{
    is_editable, visible_fields, FieldSchema, Preset, SceneDefinition, SceneRegistry, UserMode,
};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::compiler::{self, field_order, with_aesthetic_guard};
use crate::error::{StudioError, StudioResult};
use crate::gateway::{ImageGateway, ImageRequest, TextGateway, PLACEHOLDER_IMAGE_URL};

/// Row of the field panel for the current scene and mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldView {
    pub key: FieldKey,
    pub label: String,
    pub editable: bool,
    pub required: bool,
    pub user_value: Option<String>,
    pub effective_value: Option<String>,
    /// The effective value comes from scene defaults.
    pub ghost: bool,
    pub provenance: Provenance,
    pub weight: u32,
}

#[derive(Debug)]
pub struct OptimizeTicket {
    id: u64,
    epoch: u64,
    raw: String,
}

impl OptimizeTicket {
    pub fn raw(&self) -> &str {
        &self.raw
    }
}

#[derive(Debug)]
pub struct RenderTicket {
    id: u64,
    request: ImageRequest,
    data: StructuredPrompt,
}

impl RenderTicket {
    pub fn request(&self) -> &ImageRequest {
        &self.request
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOutcome {
    pub url: String,
    pub history_id: Option<String>,
    pub fell_back: bool,
}

/// Single owner of one studio session: scene, mode, user entries, weights,
/// active preset, optimized result and the bounded logs.
pub struct StudioEngine {
    registry: Arc<SceneRegistry>,
    scene: SceneDefinition,
    mode: UserMode,
    prompt_data: StructuredPrompt,
    weights: PromptWeights,
    active_preset: Option<Preset>,
    optimized: Option<StructuredPrompt>,
    history: RenderHistory,
    debug_log: DebugLog,
    optimize_in_flight: Option<u64>,
    render_in_flight: Option<u64>,
    next_ticket: u64,
    // bumped whenever entries are replaced wholesale; stale optimize results are dropped
    epoch: u64,
    journal: Option<EventWriter>,
}

impl StudioEngine {
    /// Starts on the registry's first scene in beginner mode.
    pub fn new(registry: Arc<SceneRegistry>) -> Result<Self> {
        let scene = registry
            .default_scene()
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("scene registry is empty"))?;
        let weights = PromptWeights::reset_for(scene.declared_keys());
        Ok(Self {
            registry,
            scene,
            mode: UserMode::Beginner,
            prompt_data: StructuredPrompt::new(),
            weights,
            active_preset: None,
            optimized: None,
            history: RenderHistory::default(),
            debug_log: DebugLog::default(),
            optimize_in_flight: None,
            render_in_flight: None,
            next_ticket: 1,
            epoch: 0,
            journal: None,
        })
    }

    pub fn with_journal(mut self, journal: EventWriter) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn registry(&self) -> &SceneRegistry {
        &self.registry
    }

    pub fn scene(&self) -> &SceneDefinition {
        &self.scene
    }

    pub fn mode(&self) -> UserMode {
        self.mode
    }

    pub fn prompt_data(&self) -> &StructuredPrompt {
        &self.prompt_data
    }

    pub fn weights(&self) -> &PromptWeights {
        &self.weights
    }

    pub fn active_preset(&self) -> Option<&Preset> {
        self.active_preset.as_ref()
    }

    pub fn optimized(&self) -> Option<&StructuredPrompt> {
        self.optimized.as_ref()
    }

    pub fn history(&self) -> &RenderHistory {
        &self.history
    }

    pub fn debug_log(&self) -> &DebugLog {
        &self.debug_log
    }

    pub fn is_optimizing(&self) -> bool {
        self.optimize_in_flight.is_some()
    }

    pub fn is_rendering(&self) -> bool {
        self.render_in_flight.is_some()
    }

    /// Returns `false` when `scene_id` is already active.
    pub fn change_scene(&mut self, scene_id: &str) -> StudioResult<bool> {
        if scene_id == self.scene.id {
            return Ok(false);
        }
        let scene = self
            .registry
            .get(scene_id)
            .cloned()
            .ok_or_else(|| StudioError::UnknownScene(scene_id.to_string()))?;
        self.weights = PromptWeights::reset_for(scene.declared_keys());
        self.scene = scene;
        self.clear_entries();
        info!(scene = %self.scene.id, "scene changed");
        self.journal("scene_changed", json!({ "scene": self.scene.id }));
        Ok(true)
    }

    pub fn set_mode(&mut self, mode: UserMode) {
        if self.mode == mode {
            return;
        }
        self.mode = mode;
        info!(%mode, "mode changed");
        self.journal("mode_changed", json!({ "mode": mode }));
    }

    /// Writes a user entry. Choosing an option that carries a default
    /// weight also sets that field's weight.
    pub fn set_field(&mut self, key: FieldKey, value: impl Into<String>) -> StudioResult<()> {
        let schema = self.schema(key)?;
        if !is_editable(schema, self.mode) {
            return Err(StudioError::FieldLocked {
                key,
                required: schema.min_editable,
                current: self.mode,
            });
        }
        let value = value.into();
        let option_weight = schema
            .option_for_value(&value)
            .and_then(|option| option.default_weight);
        if let Some(weight) = option_weight {
            self.weights.set(key, weight);
        }
        self.prompt_data.set(key, value);
        Ok(())
    }

    /// Expert-only manual weight. Returns the stored (clamped) percentage.
    pub fn set_weight(&mut self, key: FieldKey, percent: u32) -> StudioResult<u32> {
        let schema = self.schema(key)?;
        if self.mode != UserMode::Expert || !schema.editable_weight_in_expert {
            return Err(StudioError::WeightLocked { key });
        }
        let clamped = percent.min(MAX_WEIGHT);
        self.weights.set(key, clamped);
        Ok(clamped)
    }

    /// Loads a preset's entries, switching scene first when needed, and
    /// raises the mode to advanced.
    pub fn apply_preset(&mut self, preset_id: &str) -> StudioResult<()> {
        let preset = self
            .registry
            .preset(preset_id)
            .cloned()
            .ok_or_else(|| StudioError::UnknownPreset(preset_id.to_string()))?;
        self.change_scene(&preset.scene_id)?;
        self.prompt_data = preset.data.clone();
        self.optimized = None;
        self.epoch += 1;
        self.mode = UserMode::Advanced;
        info!(preset = %preset.id, scene = %preset.scene_id, "preset applied");
        self.journal(
            "preset_applied",
            json!({ "preset": preset.id, "scene": preset.scene_id, "mode": self.mode }),
        );
        self.active_preset = Some(preset);
        Ok(())
    }

    /// Restores the active preset's value. Allowed whatever the field's
    /// editability. Returns `false` when the preset does not set `key`.
    pub fn revert_field(&mut self, key: FieldKey) -> StudioResult<bool> {
        self.schema(key)?;
        let Some(value) = self
            .active_preset
            .as_ref()
            .and_then(|preset| preset.data.get(key))
            .map(str::to_string)
        else {
            return Ok(false);
        };
        self.prompt_data.set(key, value);
        Ok(true)
    }

    /// Clears entries, preset and optimized data. Scene and mode stay.
    pub fn reset(&mut self) {
        self.clear_entries();
        self.journal("reset", json!({ "scene": self.scene.id }));
    }

    pub fn provenance(&self, key: FieldKey) -> Provenance {
        let preset_value = self
            .active_preset
            .as_ref()
            .and_then(|preset| preset.data.get(key));
        Provenance::classify(preset_value, self.prompt_data.get(key))
    }

    /// Required fields whose user entry is blank, in output order.
    pub fn missing_fields(&self) -> Vec<FieldKey> {
        field_order(&self.scene)
            .into_iter()
            .filter(|key| {
                self.scene
                    .field(*key)
                    .is_some_and(|schema| schema.is_required)
            })
            .filter(|key| self.prompt_data.value(*key).is_none())
            .collect()
    }

    pub fn is_valid(&self) -> bool {
        self.missing_fields().is_empty()
    }

    pub fn effective_values(&self, view: CompileView) -> StructuredPrompt {
        let mut values = StructuredPrompt::new();
        for key in self.scene.declared_keys() {
            if let Some(value) = self.scene.defaults.value(key) {
                values.set(key, value);
            }
        }
        values.overlay(&self.prompt_data);
        if view == CompileView::Optimized {
            if let Some(optimized) = self.optimized.as_ref() {
                values.overlay(optimized);
            }
        }
        values
    }

    pub fn compile(&self, view: CompileView) -> String {
        compiler::compile(
            &self.effective_values(view),
            &field_order(&self.scene),
            self.mode,
            &self.weights,
        )
    }

    pub fn field_views(&self) -> Vec<FieldView> {
        let effective = self.effective_values(CompileView::Base);
        visible_fields(&self.scene, self.mode)
            .into_iter()
            .map(|(key, schema)| {
                let user_value = self.prompt_data.value(key).map(str::to_string);
                let effective_value = effective.value(key).map(str::to_string);
                FieldView {
                    key,
                    label: schema.label.clone(),
                    editable: is_editable(schema, self.mode),
                    required: schema.is_required,
                    ghost: user_value.is_none() && effective_value.is_some(),
                    user_value,
                    effective_value,
                    provenance: self.provenance(key),
                    weight: self.weights.get(key).unwrap_or(DEFAULT_WEIGHT),
                }
            })
            .collect()
    }

    pub fn begin_optimize(&mut self) -> StudioResult<OptimizeTicket> {
        if self.optimize_in_flight.is_some() {
            return Err(StudioError::Busy("optimize"));
        }
        let missing = self.missing_fields();
        if !missing.is_empty() {
            return Err(StudioError::MissingRequired(missing));
        }
        let merged = self.effective_values(CompileView::Base);
        let raw = self.compile(CompileView::Base);
        self.push_debug(
            DebugKind::Request,
            json!({ "action": "optimize", "prompt": raw, "data": merged }),
        );
        let id = self.take_ticket();
        self.optimize_in_flight = Some(id);
        Ok(OptimizeTicket {
            id,
            epoch: self.epoch,
            raw,
        })
    }

    /// Stores the optimize result. Gateway failures become an empty record.
    pub fn finish_optimize(
        &mut self,
        ticket: OptimizeTicket,
        outcome: Result<StructuredPrompt>,
    ) -> StudioResult<StructuredPrompt> {
        if self.optimize_in_flight != Some(ticket.id) {
            return Err(StudioError::StaleTicket("optimize"));
        }
        self.optimize_in_flight = None;
        let result = match outcome {
            Ok(result) => result,
            Err(err) => {
                let message = format!("{err:#}");
                warn!(error = %message, "optimize failed; keeping prompt unchanged");
                self.push_debug(DebugKind::Error, json!({ "action": "optimize", "error": message }));
                StructuredPrompt::new()
            }
        };
        self.push_debug(
            DebugKind::Response,
            serde_json::to_value(&result).unwrap_or_default(),
        );
        if ticket.epoch == self.epoch {
            self.optimized = Some(result.clone());
        } else {
            debug!("dropping optimize result for replaced entries");
        }
        Ok(result)
    }

    pub fn optimize<G: TextGateway + ?Sized>(&mut self, gateway: &G) -> StudioResult<StructuredPrompt> {
        let ticket = self.begin_optimize()?;
        let outcome = gateway.optimize_structured(ticket.raw());
        self.finish_optimize(ticket, outcome)
    }

    pub fn begin_render(&mut self) -> StudioResult<RenderTicket> {
        if self.render_in_flight.is_some() {
            return Err(StudioError::Busy("render"));
        }
        let prompt = with_aesthetic_guard(&self.compile(CompileView::Optimized));
        let data = match self.optimized.as_ref() {
            Some(optimized) if !optimized.is_empty() => optimized.clone(),
            _ => self.prompt_data.clone(),
        };
        self.push_debug(
            DebugKind::Request,
            json!({ "action": "render", "prompt": prompt }),
        );
        let id = self.take_ticket();
        self.render_in_flight = Some(id);
        Ok(RenderTicket {
            id,
            request: ImageRequest::new(prompt),
            data,
        })
    }

    /// Records a successful render in history; a failed one falls back to
    /// the placeholder image.
    pub fn finish_render(
        &mut self,
        ticket: RenderTicket,
        outcome: Result<String>,
    ) -> StudioResult<RenderOutcome> {
        if self.render_in_flight != Some(ticket.id) {
            return Err(StudioError::StaleTicket("render"));
        }
        self.render_in_flight = None;
        match outcome {
            Ok(url) => {
                self.push_debug(
                    DebugKind::Response,
                    json!({ "action": "render", "url": abbreviate_url(&url) }),
                );
                let history_id = self.history.record(url.clone(), ticket.data);
                Ok(RenderOutcome {
                    url,
                    history_id: Some(history_id),
                    fell_back: false,
                })
            }
            Err(err) => {
                let message = format!("{err:#}");
                warn!(error = %message, "render failed; showing placeholder");
                self.push_debug(DebugKind::Error, json!({ "action": "render", "error": message }));
                Ok(RenderOutcome {
                    url: PLACEHOLDER_IMAGE_URL.to_string(),
                    history_id: None,
                    fell_back: true,
                })
            }
        }
    }

    pub fn render<G: ImageGateway + ?Sized>(&mut self, gateway: &G) -> StudioResult<RenderOutcome> {
        let ticket = self.begin_render()?;
        let outcome = gateway.generate_image(ticket.request());
        self.finish_render(ticket, outcome)
    }

    pub fn restore_from_history(&mut self, item_id: &str) -> StudioResult<()> {
        let item: HistoryItem = self
            .history
            .get(item_id)
            .cloned()
            .ok_or_else(|| StudioError::UnknownHistoryItem(item_id.to_string()))?;
        self.prompt_data = item.data;
        self.optimized = None;
        self.active_preset = None;
        self.epoch += 1;
        self.journal("history_restored", json!({ "id": item.id }));
        Ok(())
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
        self.journal("history_cleared", json!({}));
    }

    fn schema(&self, key: FieldKey) -> StudioResult<&FieldSchema> {
        self.scene
            .field(key)
            .ok_or_else(|| StudioError::UndeclaredField {
                scene: self.scene.id.clone(),
                key,
            })
    }

    fn clear_entries(&mut self) {
        self.prompt_data.clear();
        self.optimized = None;
        self.active_preset = None;
        self.epoch += 1;
    }

    fn take_ticket(&mut self) -> u64 {
        let id = self.next_ticket;
        self.next_ticket += 1;
        id
    }

    fn push_debug(&mut self, kind: DebugKind, content: Value) {
        let entry = self.debug_log.push(kind, content);
        if let Some(journal) = self.journal.as_ref() {
            if let Err(err) = journal.emit_debug(&entry) {
                warn!(error = %err, "failed to journal debug entry");
            }
        }
    }

    fn journal(&self, event_type: &str, payload: Value) {
        let Some(journal) = self.journal.as_ref() else {
            return;
        };
        if let Err(err) = journal.emit_record(event_type, &payload) {
            warn!(event = event_type, error = %err, "failed to journal event");
        }
    }
}

fn abbreviate_url(url: &str) -> String {
    const MAX_CHARS: usize = 96;
    if url.chars().count() <= MAX_CHARS {
        return url.to_string();
    }
    let head = url.chars().take(MAX_CHARS).collect::<String>();
    format!("{head}…")
}

#[cfg(test)]
mod tests {
    use promptstudio_contracts::logs::HISTORY_CAPACITY;
    use serde_json::Value;

    use super::*;
    use crate::compiler::AESTHETIC_GUARD;
    use crate::testing::ScriptedGateway;

    const WEIGHTED_SCENES: &str = r#"[
        {
            "id": "studio",
            "name": "Studio",
            "nameEn": "Studio",
            "description": "",
            "icon": "S",
            "defaults": {"subject": "a vase"},
            "fields": {
                "subject": {
                    "label": "Subject",
                    "valueType": "text",
                    "isRequired": true,
                    "minVisibility": "beginner",
                    "minEditable": "beginner",
                    "editableWeightInExpert": true,
                    "priority": 1
                },
                "lighting": {
                    "label": "Lighting",
                    "valueType": "enum",
                    "minVisibility": "beginner",
                    "minEditable": "beginner",
                    "editableWeightInExpert": true,
                    "priority": 2,
                    "options": [
                        {"label": "Hard", "value": "hard side light", "defaultWeight": 120},
                        {"label": "Soft", "value": "soft window light"}
                    ]
                }
            }
        }
    ]"#;

    fn engine() -> anyhow::Result<StudioEngine> {
        StudioEngine::new(Arc::new(SceneRegistry::builtin()?))
    }

    fn optimized(pairs: &[(FieldKey, &str)]) -> StructuredPrompt {
        pairs
            .iter()
            .map(|(key, value)| (*key, value.to_string()))
            .collect()
    }

    #[test]
    fn starts_on_first_scene_in_beginner_mode() -> anyhow::Result<()> {
        let engine = engine()?;
        assert_eq!(engine.scene().id, "portrait");
        assert_eq!(engine.mode(), UserMode::Beginner);
        assert!(engine.prompt_data().is_empty());
        assert!(engine
            .scene()
            .declared_keys()
            .all(|key| engine.weights().get(key) == Some(DEFAULT_WEIGHT)));
        Ok(())
    }

    #[test]
    fn set_field_enforces_declaration_and_editability() -> anyhow::Result<()> {
        let mut engine = engine()?;
        engine.set_field(FieldKey::Subject, "a crane")?;
        assert_eq!(engine.prompt_data().get(FieldKey::Subject), Some("a crane"));

        assert_eq!(
            engine.set_field(FieldKey::Camera, "Leica"),
            Err(StudioError::FieldLocked {
                key: FieldKey::Camera,
                required: UserMode::Expert,
                current: UserMode::Beginner,
            })
        );
        assert!(matches!(
            engine.set_field(FieldKey::Mood, "calm"),
            Err(StudioError::UndeclaredField { key: FieldKey::Mood, .. })
        ));
        assert!(!engine.prompt_data().contains(FieldKey::Camera));
        Ok(())
    }

    #[test]
    fn choosing_an_option_applies_its_default_weight() -> anyhow::Result<()> {
        let registry = SceneRegistry::from_json(WEIGHTED_SCENES, "[]", "[]")?;
        let mut engine = StudioEngine::new(Arc::new(registry))?;
        assert_eq!(engine.weights().get(FieldKey::Lighting), Some(DEFAULT_WEIGHT));

        engine.set_field(FieldKey::Lighting, "soft window light")?;
        assert_eq!(engine.weights().get(FieldKey::Lighting), Some(DEFAULT_WEIGHT));

        engine.set_field(FieldKey::Lighting, "hard side light")?;
        assert_eq!(engine.weights().get(FieldKey::Lighting), Some(120));

        engine.set_field(FieldKey::Lighting, "candle light")?;
        assert_eq!(engine.weights().get(FieldKey::Lighting), Some(120));
        Ok(())
    }

    #[test]
    fn builtin_options_leave_weights_at_default() -> anyhow::Result<()> {
        let mut engine = engine()?;
        engine.set_field(
            FieldKey::Lighting,
            "high-contrast dramatic side lighting, sharp shadows, chiaroscuro effect",
        )?;
        assert_eq!(engine.weights().get(FieldKey::Lighting), Some(DEFAULT_WEIGHT));
        Ok(())
    }

    #[test]
    fn weights_are_expert_only_and_clamped() -> anyhow::Result<()> {
        let mut engine = engine()?;
        assert_eq!(
            engine.set_weight(FieldKey::Subject, 150),
            Err(StudioError::WeightLocked { key: FieldKey::Subject })
        );

        engine.set_mode(UserMode::Expert);
        assert_eq!(engine.set_weight(FieldKey::Subject, 350)?, MAX_WEIGHT);
        assert_eq!(
            engine.set_weight(FieldKey::Medium, 150),
            Err(StudioError::WeightLocked { key: FieldKey::Medium })
        );

        engine.set_field(FieldKey::Subject, "cat")?;
        engine.set_weight(FieldKey::Subject, 150)?;
        assert!(engine.compile(CompileView::Base).starts_with("(cat:1.5), "));
        Ok(())
    }

    #[test]
    fn changing_to_the_same_scene_keeps_preset_and_weights() -> anyhow::Result<()> {
        let mut engine = engine()?;
        engine.apply_preset("p1")?;
        engine.set_mode(UserMode::Expert);
        engine.set_weight(FieldKey::Subject, 150)?;
        engine.set_field(FieldKey::Camera, "Leica SL2")?;
        let data = engine.prompt_data().clone();
        let weights = engine.weights().clone();

        assert!(!engine.change_scene("portrait")?);
        assert_eq!(engine.active_preset().map(|preset| preset.id.as_str()), Some("p1"));
        assert_eq!(engine.weights(), &weights);
        assert_eq!(engine.weights().get(FieldKey::Subject), Some(150));
        assert_eq!(engine.prompt_data(), &data);
        assert_eq!(engine.mode(), UserMode::Expert);
        assert_eq!(engine.provenance(FieldKey::Camera), Provenance::ModifiedFromPreset);
        Ok(())
    }

    #[test]
    fn changing_to_the_same_scene_keeps_entries() -> anyhow::Result<()> {
        let mut engine = engine()?;
        engine.set_field(FieldKey::Subject, "a crane")?;
        assert!(!engine.change_scene("portrait")?);
        assert_eq!(engine.prompt_data().get(FieldKey::Subject), Some("a crane"));

        assert!(engine.change_scene("nature")?);
        assert!(engine.weights().iter().all(|(_, weight)| weight == DEFAULT_WEIGHT));
        assert!(engine.prompt_data().is_empty());
        assert_eq!(engine.scene().id, "nature");
        assert_eq!(
            engine.change_scene("moon"),
            Err(StudioError::UnknownScene("moon".to_string()))
        );
        Ok(())
    }

    #[test]
    fn preset_switches_scene_and_tracks_provenance() -> anyhow::Result<()> {
        let mut engine = engine()?;
        engine.apply_preset("p2")?;
        assert_eq!(engine.scene().id, "nature");
        assert_eq!(engine.mode(), UserMode::Advanced);
        assert_eq!(engine.provenance(FieldKey::Subject), Provenance::OriginalFromPreset);
        assert_eq!(engine.provenance(FieldKey::Style), Provenance::Plain);

        engine.set_field(FieldKey::Subject, "a lone pine")?;
        assert_eq!(engine.provenance(FieldKey::Subject), Provenance::ModifiedFromPreset);

        assert!(engine.revert_field(FieldKey::Subject)?);
        assert_eq!(engine.provenance(FieldKey::Subject), Provenance::OriginalFromPreset);
        assert!(!engine.revert_field(FieldKey::Style)?);
        Ok(())
    }

    #[test]
    fn revert_ignores_edit_locks() -> anyhow::Result<()> {
        let mut engine = engine()?;
        engine.apply_preset("p1")?;
        engine.set_mode(UserMode::Expert);
        engine.set_field(FieldKey::Camera, "Leica SL2")?;
        engine.set_mode(UserMode::Beginner);

        assert!(engine.revert_field(FieldKey::Camera)?);
        assert_eq!(
            engine.prompt_data().get(FieldKey::Camera),
            Some("Sony A7R V, FE 85mm f/1.2 GM")
        );
        Ok(())
    }

    #[test]
    fn defaults_fill_blank_entries_as_ghost_values() -> anyhow::Result<()> {
        let mut engine = engine()?;
        engine.set_field(FieldKey::Subject, "a crane")?;
        let base = engine.compile(CompileView::Base);
        assert!(base.starts_with("a crane, classic Rembrandt lighting"));

        let views = engine.field_views();
        let lighting = views
            .iter()
            .find(|view| view.key == FieldKey::Lighting)
            .ok_or_else(|| anyhow::anyhow!("lighting row"))?;
        assert!(lighting.ghost);
        assert!(lighting.user_value.is_none());
        assert!(views.iter().all(|view| view.key != FieldKey::Medium));
        Ok(())
    }

    #[test]
    fn whitespace_entries_count_as_missing() -> anyhow::Result<()> {
        let mut engine = engine()?;
        engine.set_field(FieldKey::Subject, "   ")?;
        assert_eq!(engine.missing_fields(), vec![FieldKey::Subject]);
        assert!(!engine.is_valid());
        assert_eq!(
            engine.begin_optimize().err(),
            Some(StudioError::MissingRequired(vec![FieldKey::Subject]))
        );
        assert!(!engine.is_optimizing());
        Ok(())
    }

    #[test]
    fn optimize_merges_over_base_values() -> anyhow::Result<()> {
        let mut engine = engine()?;
        engine.set_field(FieldKey::Subject, "a crane")?;
        let gateway = ScriptedGateway::default();
        gateway.push_optimize(Ok(optimized(&[
            (FieldKey::Lighting, "moonlight"),
            (FieldKey::Environment, " "),
        ])));

        engine.optimize(&gateway)?;
        assert_eq!(gateway.raw_prompts(), vec![engine.compile(CompileView::Base)]);
        let compiled = engine.compile(CompileView::Optimized);
        assert!(compiled.contains("a crane, moonlight"));
        assert!(compiled.contains("high-end zen-style studio"));
        assert!(!engine.compile(CompileView::Base).contains("moonlight"));
        Ok(())
    }

    #[test]
    fn optimize_failure_yields_an_empty_result() -> anyhow::Result<()> {
        let mut engine = engine()?;
        engine.set_field(FieldKey::Subject, "a crane")?;
        let gateway = ScriptedGateway::default();
        gateway.push_optimize(Err("quota exceeded".to_string()));

        let result = engine.optimize(&gateway)?;
        assert!(result.is_empty());
        assert_eq!(engine.optimized(), Some(&StructuredPrompt::new()));
        assert_eq!(
            engine.compile(CompileView::Optimized),
            engine.compile(CompileView::Base)
        );
        let kinds = engine
            .debug_log()
            .entries()
            .map(|entry| entry.kind)
            .collect::<Vec<_>>();
        assert_eq!(kinds, vec![DebugKind::Response, DebugKind::Error, DebugKind::Request]);
        Ok(())
    }

    #[test]
    fn only_one_call_of_each_kind_in_flight() -> anyhow::Result<()> {
        let mut engine = engine()?;
        engine.set_field(FieldKey::Subject, "a crane")?;

        let optimize = engine.begin_optimize()?;
        assert_eq!(engine.begin_optimize().err(), Some(StudioError::Busy("optimize")));
        let render = engine.begin_render()?;
        assert_eq!(engine.begin_render().err(), Some(StudioError::Busy("render")));

        let stale = OptimizeTicket {
            id: optimize.id + 100,
            epoch: optimize.epoch,
            raw: String::new(),
        };
        assert_eq!(
            engine.finish_optimize(stale, Ok(StructuredPrompt::new())).err(),
            Some(StudioError::StaleTicket("optimize"))
        );

        engine.finish_optimize(optimize, Ok(StructuredPrompt::new()))?;
        engine.finish_render(render, Ok("https://img/1".to_string()))?;
        assert!(!engine.is_optimizing());
        assert!(!engine.is_rendering());
        engine.begin_optimize()?;
        Ok(())
    }

    #[test]
    fn optimize_result_is_dropped_after_scene_change() -> anyhow::Result<()> {
        let mut engine = engine()?;
        engine.set_field(FieldKey::Subject, "a crane")?;
        let ticket = engine.begin_optimize()?;
        engine.change_scene("nature")?;

        let result = engine.finish_optimize(ticket, Ok(optimized(&[(FieldKey::Lighting, "dusk")])))?;
        assert_eq!(result.get(FieldKey::Lighting), Some("dusk"));
        assert!(engine.optimized().is_none());
        Ok(())
    }

    #[test]
    fn render_failure_falls_back_to_placeholder() -> anyhow::Result<()> {
        let mut engine = engine()?;
        engine.set_field(FieldKey::Subject, "a crane")?;
        let gateway = ScriptedGateway::default();
        gateway.push_image(Err("safety block".to_string()));

        let outcome = engine.render(&gateway)?;
        assert!(outcome.fell_back);
        assert_eq!(outcome.url, PLACEHOLDER_IMAGE_URL);
        assert!(outcome.history_id.is_none());
        assert!(engine.history().is_empty());
        assert_eq!(
            engine.debug_log().entries().next().map(|entry| entry.kind),
            Some(DebugKind::Error)
        );
        Ok(())
    }

    #[test]
    fn render_sends_guarded_prompt_and_records_history() -> anyhow::Result<()> {
        let mut engine = engine()?;
        engine.set_field(FieldKey::Subject, "a crane")?;
        let gateway = ScriptedGateway::default();
        gateway.push_optimize(Ok(optimized(&[(FieldKey::Lighting, "moonlight")])));
        engine.optimize(&gateway)?;

        let outcome = engine.render(&gateway)?;
        let prompts = gateway.image_prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].starts_with(AESTHETIC_GUARD));
        assert!(prompts[0].contains("moonlight"));

        let item = engine
            .history()
            .latest()
            .ok_or_else(|| anyhow::anyhow!("history item"))?;
        assert_eq!(Some(&item.id), outcome.history_id.as_ref());
        assert_eq!(item.data.get(FieldKey::Lighting), Some("moonlight"));
        assert!(!item.data.contains(FieldKey::Subject));
        Ok(())
    }

    #[test]
    fn history_keeps_the_latest_renders() -> anyhow::Result<()> {
        let mut engine = engine()?;
        let gateway = ScriptedGateway::default();
        for idx in 0..HISTORY_CAPACITY + 2 {
            engine.set_field(FieldKey::Subject, format!("crane {idx}"))?;
            gateway.push_image(Ok(format!("https://img/{idx}")));
            engine.render(&gateway)?;
        }
        assert_eq!(engine.history().len(), HISTORY_CAPACITY);
        assert_eq!(
            engine.history().latest().map(|item| item.url.as_str()),
            Some("https://img/11")
        );
        assert!(engine.history().items().all(|item| item.url != "https://img/0"));
        Ok(())
    }

    #[test]
    fn restore_replaces_entries_and_clears_preset() -> anyhow::Result<()> {
        let mut engine = engine()?;
        engine.set_field(FieldKey::Subject, "a crane")?;
        let outcome = engine.render(&ScriptedGateway::default())?;
        let id = outcome
            .history_id
            .ok_or_else(|| anyhow::anyhow!("history id"))?;

        engine.apply_preset("p1")?;
        engine.restore_from_history(&id)?;
        assert_eq!(engine.prompt_data().get(FieldKey::Subject), Some("a crane"));
        assert!(engine.active_preset().is_none());
        assert_eq!(
            engine.restore_from_history("nope"),
            Err(StudioError::UnknownHistoryItem("nope".to_string()))
        );

        engine.clear_history();
        assert!(engine.history().is_empty());
        Ok(())
    }

    #[test]
    fn reset_keeps_scene_and_mode() -> anyhow::Result<()> {
        let mut engine = engine()?;
        engine.apply_preset("p2")?;
        engine.reset();
        assert_eq!(engine.scene().id, "nature");
        assert_eq!(engine.mode(), UserMode::Advanced);
        assert!(engine.prompt_data().is_empty());
        assert!(engine.active_preset().is_none());
        Ok(())
    }

    #[test]
    fn journal_mirrors_state_changes_and_debug_entries() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("events.jsonl");
        let mut engine = engine()?.with_journal(EventWriter::new(&path, "session-1"));
        engine.apply_preset("p1")?;
        engine.optimize(&ScriptedGateway::default())?;

        let raw = std::fs::read_to_string(&path)?;
        let types = raw
            .lines()
            .filter_map(|line| serde_json::from_str::<Value>(line).ok())
            .filter_map(|row| row.get("type").and_then(Value::as_str).map(str::to_string))
            .collect::<Vec<_>>();
        assert_eq!(types, vec!["preset_applied", "debug_request", "debug_response"]);
        Ok(())
    }
}
