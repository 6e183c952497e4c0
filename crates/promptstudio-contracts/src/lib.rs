pub mod chat;
pub mod events;
pub mod logs;
pub mod photography;
pub mod prompt;
pub mod scenes;
