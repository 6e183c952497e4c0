use std::collections::VecDeque;
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use promptstudio_contracts::prompt::StructuredPrompt;

use crate::gateway::{ImageGateway, ImageRequest, TextGateway};

/// Replays queued outcomes and records what it was asked. An empty
/// optimize queue answers with an empty record; an empty image queue
/// answers with a fixed URL.
#[derive(Default)]
pub(crate) struct ScriptedGateway {
    optimize: Mutex<VecDeque<Result<StructuredPrompt, String>>>,
    images: Mutex<VecDeque<Result<String, String>>>,
    raw_prompts: Mutex<Vec<String>>,
    image_prompts: Mutex<Vec<String>>,
}

impl ScriptedGateway {
    pub(crate) fn push_optimize(&self, outcome: Result<StructuredPrompt, String>) {
        self.optimize.lock().unwrap().push_back(outcome);
    }

    pub(crate) fn push_image(&self, outcome: Result<String, String>) {
        self.images.lock().unwrap().push_back(outcome);
    }

    pub(crate) fn raw_prompts(&self) -> Vec<String> {
        self.raw_prompts.lock().unwrap().clone()
    }

    pub(crate) fn image_prompts(&self) -> Vec<String> {
        self.image_prompts.lock().unwrap().clone()
    }
}

impl TextGateway for ScriptedGateway {
    fn name(&self) -> &str {
        "scripted"
    }

    fn optimize_structured(&self, raw: &str) -> Result<StructuredPrompt> {
        self.raw_prompts.lock().unwrap().push(raw.to_string());
        match self.optimize.lock().unwrap().pop_front() {
            Some(Ok(prompt)) => Ok(prompt),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Ok(StructuredPrompt::new()),
        }
    }
}

impl ImageGateway for ScriptedGateway {
    fn name(&self) -> &str {
        "scripted"
    }

    fn generate_image(&self, request: &ImageRequest) -> Result<String> {
        self.image_prompts
            .lock()
            .unwrap()
            .push(request.prompt.clone());
        match self.images.lock().unwrap().pop_front() {
            Some(Ok(url)) => Ok(url),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Ok("https://img/scripted".to_string()),
        }
    }
}
