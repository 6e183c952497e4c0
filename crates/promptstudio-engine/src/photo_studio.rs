use std::collections::BTreeMap;

use anyhow::{anyhow, Result};
use promptstudio_contracts::logs::{DebugKind, DebugLog};
use promptstudio_contracts::photography::{
    sessions_from_registry, PhotographyMode, PhotographySession, Shot,
};
use promptstudio_contracts::scenes::SceneRegistry;
use serde_json::json;
use tracing::{info, warn};

use crate::compiler::{compile_layered, with_aesthetic_guard};
use crate::error::{StudioError, StudioResult};
use crate::gateway::{ImageGateway, ImageRequest, PLACEHOLDER_IMAGE_URL};

#[derive(Debug)]
pub struct ShootTicket {
    id: u64,
    key: String,
    request: ImageRequest,
}

impl ShootTicket {
    pub fn request(&self) -> &ImageRequest {
        &self.request
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShotResult {
    /// `{session}-{shot}`
    pub key: String,
    pub url: String,
    pub fell_back: bool,
}

/// Layered photography flow over the highlight-derived sessions.
pub struct PhotoStudio {
    sessions: Vec<PhotographySession>,
    active_session: usize,
    active_shot: String,
    mode: PhotographyMode,
    reference_image: Option<String>,
    reference_locked: bool,
    results: BTreeMap<String, String>,
    shoot_in_flight: Option<u64>,
    next_ticket: u64,
    debug_log: DebugLog,
}

impl PhotoStudio {
    pub fn new(sessions: Vec<PhotographySession>) -> Result<Self> {
        let first = sessions
            .first()
            .ok_or_else(|| anyhow!("no photography sessions"))?;
        let active_shot = first
            .first_shot()
            .map(|shot| shot.id.clone())
            .ok_or_else(|| anyhow!("session '{}' has no shots", first.id))?;
        Ok(Self {
            sessions,
            active_session: 0,
            active_shot,
            mode: PhotographyMode::default(),
            reference_image: None,
            reference_locked: false,
            results: BTreeMap::new(),
            shoot_in_flight: None,
            next_ticket: 1,
            debug_log: DebugLog::default(),
        })
    }

    pub fn from_registry(registry: &SceneRegistry) -> Result<Self> {
        Self::new(sessions_from_registry(registry)?)
    }

    pub fn sessions(&self) -> &[PhotographySession] {
        &self.sessions
    }

    pub fn active_session(&self) -> &PhotographySession {
        &self.sessions[self.active_session]
    }

    pub fn active_shot(&self) -> Option<&Shot> {
        self.active_session().shot(&self.active_shot)
    }

    pub fn mode(&self) -> PhotographyMode {
        self.mode
    }

    pub fn reference_image(&self) -> Option<&str> {
        self.reference_image.as_deref()
    }

    pub fn is_reference_locked(&self) -> bool {
        self.reference_locked
    }

    pub fn is_shooting(&self) -> bool {
        self.shoot_in_flight.is_some()
    }

    pub fn debug_log(&self) -> &DebugLog {
        &self.debug_log
    }

    /// Switches session and moves to its first shot.
    pub fn select_session(&mut self, session_id: &str) -> StudioResult<()> {
        let (index, session) = self
            .sessions
            .iter()
            .enumerate()
            .find(|(_, session)| session.id == session_id)
            .ok_or_else(|| StudioError::UnknownSession(session_id.to_string()))?;
        let shot = session
            .first_shot()
            .map(|shot| shot.id.clone())
            .ok_or_else(|| StudioError::UnknownShot {
                session: session_id.to_string(),
                shot: String::new(),
            })?;
        self.active_session = index;
        self.active_shot = shot;
        info!(session = session_id, "photography session selected");
        Ok(())
    }

    pub fn select_shot(&mut self, shot_id: &str) -> StudioResult<()> {
        let session = self.active_session();
        if session.shot(shot_id).is_none() {
            return Err(StudioError::UnknownShot {
                session: session.id.clone(),
                shot: shot_id.to_string(),
            });
        }
        self.active_shot = shot_id.to_string();
        Ok(())
    }

    pub fn set_mode(&mut self, mode: PhotographyMode) {
        self.mode = mode;
    }

    /// Stores and locks the reference image. A locked reference must be
    /// cleared before another upload.
    pub fn upload_reference(&mut self, image: impl Into<String>) -> StudioResult<()> {
        if self.reference_locked {
            return Err(StudioError::ReferenceLocked);
        }
        self.reference_image = Some(image.into());
        self.reference_locked = true;
        Ok(())
    }

    pub fn clear_reference(&mut self) {
        self.reference_image = None;
        self.reference_locked = false;
    }

    pub fn compiled_prompt(&self) -> String {
        match self.active_shot() {
            Some(shot) => compile_layered(self.active_session(), shot),
            None => String::new(),
        }
    }

    pub fn result_for(&self, session_id: &str, shot_id: &str) -> Option<&str> {
        self.results
            .get(&result_key(session_id, shot_id))
            .map(String::as_str)
    }

    pub fn results(&self) -> impl Iterator<Item = (&str, &str)> {
        self.results
            .iter()
            .map(|(key, url)| (key.as_str(), url.as_str()))
    }

    pub fn begin_shoot(&mut self) -> StudioResult<ShootTicket> {
        if self.mode == PhotographyMode::Portrait && self.reference_image.is_none() {
            return Err(StudioError::ReferenceImageRequired);
        }
        if self.shoot_in_flight.is_some() {
            return Err(StudioError::Busy("shoot"));
        }
        let prompt = with_aesthetic_guard(&self.compiled_prompt());
        let key = result_key(&self.active_session().id, &self.active_shot);
        self.debug_log.push(
            DebugKind::Request,
            json!({ "action": "shoot", "key": key, "mode": self.mode, "prompt": prompt }),
        );
        let id = self.next_ticket;
        self.next_ticket += 1;
        self.shoot_in_flight = Some(id);
        Ok(ShootTicket {
            id,
            key,
            request: ImageRequest::new(prompt),
        })
    }

    /// Stores the image under the ticket's shot. Failures store the
    /// placeholder.
    pub fn finish_shoot(
        &mut self,
        ticket: ShootTicket,
        outcome: Result<String>,
    ) -> StudioResult<ShotResult> {
        if self.shoot_in_flight != Some(ticket.id) {
            return Err(StudioError::StaleTicket("shoot"));
        }
        self.shoot_in_flight = None;
        let (url, fell_back) = match outcome {
            Ok(url) => {
                self.debug_log
                    .push(DebugKind::Response, json!({ "action": "shoot", "key": ticket.key }));
                (url, false)
            }
            Err(err) => {
                let message = format!("{err:#}");
                warn!(key = %ticket.key, error = %message, "shoot failed; storing placeholder");
                self.debug_log.push(
                    DebugKind::Error,
                    json!({ "action": "shoot", "key": ticket.key, "error": message }),
                );
                (PLACEHOLDER_IMAGE_URL.to_string(), true)
            }
        };
        self.results.insert(ticket.key.clone(), url.clone());
        Ok(ShotResult {
            key: ticket.key,
            url,
            fell_back,
        })
    }

    pub fn shoot<G: ImageGateway + ?Sized>(&mut self, gateway: &G) -> StudioResult<ShotResult> {
        let ticket = self.begin_shoot()?;
        let outcome = gateway.generate_image(ticket.request());
        self.finish_shoot(ticket, outcome)
    }
}

fn result_key(session_id: &str, shot_id: &str) -> String {
    format!("{session_id}-{shot_id}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedGateway;

    fn studio() -> anyhow::Result<PhotoStudio> {
        PhotoStudio::from_registry(&SceneRegistry::builtin()?)
    }

    #[test]
    fn starts_on_first_session_and_shot() -> anyhow::Result<()> {
        let studio = studio()?;
        assert_eq!(studio.active_session().id, "col-shanshui");
        assert_eq!(studio.active_shot().map(|shot| shot.id.as_str()), Some("col-shanshui-1"));
        assert!(studio.compiled_prompt().starts_with("[HARDWARE] Camera:"));
        Ok(())
    }

    #[test]
    fn selecting_a_session_resets_the_shot() -> anyhow::Result<()> {
        let mut studio = studio()?;
        studio.select_shot("col-shanshui-3")?;
        studio.select_session("col-monochrome")?;
        assert_eq!(
            studio.active_shot().map(|shot| shot.id.as_str()),
            Some("col-monochrome-1")
        );
        assert!(studio.compiled_prompt().contains("Leica M11 Monochrom"));

        assert_eq!(
            studio.select_session("missing"),
            Err(StudioError::UnknownSession("missing".to_string()))
        );
        assert!(matches!(
            studio.select_shot("col-shanshui-1"),
            Err(StudioError::UnknownShot { .. })
        ));
        Ok(())
    }

    #[test]
    fn portrait_mode_needs_a_reference() -> anyhow::Result<()> {
        let mut studio = studio()?;
        studio.set_mode(PhotographyMode::Portrait);
        let gateway = ScriptedGateway::default();
        assert_eq!(studio.shoot(&gateway).err(), Some(StudioError::ReferenceImageRequired));

        studio.upload_reference("face.png")?;
        assert!(studio.is_reference_locked());
        assert_eq!(studio.upload_reference("other.png"), Err(StudioError::ReferenceLocked));

        gateway.push_image(Ok("https://img/1".to_string()));
        let result = studio.shoot(&gateway)?;
        assert_eq!(result.key, "col-shanshui-col-shanshui-1");
        assert!(!result.fell_back);

        studio.clear_reference();
        studio.upload_reference("other.png")?;
        assert_eq!(studio.reference_image(), Some("other.png"));
        Ok(())
    }

    #[test]
    fn results_are_keyed_per_shot_and_fall_back_on_failure() -> anyhow::Result<()> {
        let mut studio = studio()?;
        let gateway = ScriptedGateway::default();
        gateway.push_image(Ok("https://img/close".to_string()));
        gateway.push_image(Err("quota".to_string()));

        studio.shoot(&gateway)?;
        studio.select_shot("col-shanshui-2")?;
        let failed = studio.shoot(&gateway)?;

        assert!(failed.fell_back);
        assert_eq!(failed.url, PLACEHOLDER_IMAGE_URL);
        assert_eq!(
            studio.result_for("col-shanshui", "col-shanshui-1"),
            Some("https://img/close")
        );
        assert_eq!(
            studio.result_for("col-shanshui", "col-shanshui-2"),
            Some(PLACEHOLDER_IMAGE_URL)
        );
        assert_eq!(studio.results().count(), 2);

        let prompts = gateway.image_prompts();
        assert!(prompts.iter().all(|prompt| prompt.contains("[AESTHETIC GUARD]")));
        Ok(())
    }

    #[test]
    fn only_one_shoot_in_flight() -> anyhow::Result<()> {
        let mut studio = studio()?;
        let ticket = studio.begin_shoot()?;
        assert!(studio.is_shooting());
        assert_eq!(studio.begin_shoot().err(), Some(StudioError::Busy("shoot")));

        studio.finish_shoot(ticket, Ok("https://img/a".to_string()))?;
        assert!(!studio.is_shooting());
        let again = studio.begin_shoot()?;
        studio.finish_shoot(again, Ok("https://img/b".to_string()))?;
        assert_eq!(
            studio.result_for("col-shanshui", "col-shanshui-1"),
            Some("https://img/b")
        );
        Ok(())
    }
}
