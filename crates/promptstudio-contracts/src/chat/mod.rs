mod command_registry;
pub mod intent_parser;

pub use command_registry::help_rows;
pub use intent_parser::{parse_command, CompileView, StudioCommand};
