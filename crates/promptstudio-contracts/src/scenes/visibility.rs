use super::schema::{FieldSchema, SceneDefinition, UserMode};
use crate::prompt::FieldKey;

pub fn is_visible(schema: &FieldSchema, mode: UserMode) -> bool {
    mode.rank() >= schema.min_visibility.rank()
}

pub fn is_editable(schema: &FieldSchema, mode: UserMode) -> bool {
    mode.rank() >= schema.min_editable.rank()
}

/// Fields shown at `mode`, ascending by priority (stable on ties).
pub fn visible_fields(scene: &SceneDefinition, mode: UserMode) -> Vec<(FieldKey, &FieldSchema)> {
    let mut fields = scene
        .fields
        .iter()
        .filter(|(_, schema)| is_visible(schema, mode))
        .map(|(key, schema)| (*key, schema))
        .collect::<Vec<_>>();
    fields.sort_by_key(|(_, schema)| schema.priority);
    fields
}
