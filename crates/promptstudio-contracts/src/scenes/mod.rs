pub mod registry;
pub mod schema;
pub mod visibility;

pub use registry::{official_preset_id, SceneRegistry};
pub use schema::{
    DisplayType, FieldOption, FieldSchema, FieldValueType, Highlight, Preset, PresetKind,
    SceneDefinition, UserMode,
};
pub use visibility::{is_editable, is_visible, visible_fields};
