mod bounded;
pub mod debug;
pub mod history;

pub use bounded::BoundedLog;
pub use debug::{DebugEntry, DebugKind, DebugLog, DEBUG_LOG_CAPACITY};
pub use history::{HistoryItem, RenderHistory, HISTORY_CAPACITY};
