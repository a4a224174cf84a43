use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::StorageError;
use crate::storage::Storage;

/// Storage key of the team id → base64 PNG map.
pub const TEAM_LOGOS_KEY: &str = "milbTeamLogos";
/// Image shown when a team has no cached logo.
pub const DEFAULT_TEAM_IMAGE: &str = "/default-team.png";

/// Cached minor-league team logos.
#[derive(Debug)]
pub struct TeamLogoCache<S> {
    storage: Arc<S>,
}

impl<S> Clone for TeamLogoCache<S> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
        }
    }
}

impl<S: Storage> TeamLogoCache<S> {
    /// Logo cache over a shared storage handle.
    pub const fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }

    /// The cached map, or `None` when nothing usable is stored.
    pub fn logos(&self) -> Option<HashMap<String, String>> {
        let raw = match self.storage.get_item(TEAM_LOGOS_KEY) {
            Ok(raw) => raw?,
            Err(err) => {
                warn!(%err, "Team logo read failed");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(map) => Some(map),
            Err(err) => {
                debug!(%err, "Ignoring undecodable team logos");
                None
            }
        }
    }

    /// Replace the cached map. Failures are logged and dropped.
    pub fn store(&self, logos: &HashMap<String, String>) {
        let written = serde_json::to_string(logos)
            .map_err(StorageError::from)
            .and_then(|body| self.storage.set_item(TEAM_LOGOS_KEY, &body));
        if let Err(err) = written {
            warn!(key = TEAM_LOGOS_KEY, %err, "Cache storage failed");
        }
    }

    /// Image source for `team_id`: an inline PNG when a logo is cached,
    /// otherwise [`DEFAULT_TEAM_IMAGE`].
    pub fn logo_for(&self, team_id: Option<&str>) -> String {
        team_id
            .filter(|id| !id.is_empty())
            .and_then(|id| self.logos()?.remove(id))
            .filter(|image| !image.is_empty())
            .map_or_else(|| DEFAULT_TEAM_IMAGE.to_owned(), |image| format!("data:image/png;base64,{image}"))
    }
}
