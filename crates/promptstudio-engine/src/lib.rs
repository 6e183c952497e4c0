//! Rule engine for the prompt studio: scene-aware field editing, prompt
//! compilation, and the optimize/render/shoot calls against a generation
//! gateway.

pub mod compiler;
pub mod config;
pub mod error;
pub mod gateway;
pub mod photo_studio;
pub mod studio;

#[cfg(test)]
mod testing;

pub use compiler::{compile, compile_layered, diff_compiled, with_aesthetic_guard, AESTHETIC_GUARD};
pub use config::{GenerationMode, StudioConfig};
pub use error::{StudioError, StudioResult};
pub use gateway::{
    gateway_from_config, Gateway, GeminiGateway, ImageGateway, ImageRequest, SimulatedGateway,
    TextGateway, PLACEHOLDER_IMAGE_URL,
};
pub use photo_studio::{PhotoStudio, ShotResult};
pub use studio::{FieldView, RenderOutcome, StudioEngine};
