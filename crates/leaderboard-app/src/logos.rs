use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use leaderboard_core::TeamLogo;
use leaderboard_store::{Storage, TeamLogoCache};
use tracing::{debug, error};

use crate::remote::{HttpRemote, RemoteError};

/// Where team logos come from when the cache is cold.
pub trait LogoSource: Send + Sync {
    /// Fetch every logo.
    fn fetch_team_logos(&self) -> impl Future<Output = Result<Vec<TeamLogo>, RemoteError>> + Send;
}

impl LogoSource for HttpRemote {
    fn fetch_team_logos(&self) -> impl Future<Output = Result<Vec<TeamLogo>, RemoteError>> + Send {
        Self::fetch_team_logos(self)
    }
}

/// Loads the team id → logo map once and keeps it cached.
pub struct TeamLogoLoader<R, S> {
    source: R,
    cache: TeamLogoCache<S>,
}

impl<R: LogoSource, S: Storage> TeamLogoLoader<R, S> {
    /// Loader fetching from `source` into `storage`.
    pub const fn new(source: R, storage: Arc<S>) -> Self {
        Self {
            source,
            cache: TeamLogoCache::new(storage),
        }
    }

    /// Cache used for lookups.
    pub const fn cache(&self) -> &TeamLogoCache<S> {
        &self.cache
    }

    /// The cached map, fetching and caching it first when absent.
    ///
    /// A failed fetch is logged and yields an empty map, so every team
    /// falls back to the default image.
    pub async fn load(&self) -> HashMap<String, String> {
        if let Some(logos) = self.cache.logos() {
            debug!(teams = logos.len(), "Team logos served from cache");
            return logos;
        }
        match self.source.fetch_team_logos().await {
            Ok(logos) => {
                let map: HashMap<String, String> = logos
                    .into_iter()
                    .filter(|logo| !logo.id.is_empty())
                    .map(|logo| (logo.id, logo.image))
                    .collect();
                self.cache.store(&map);
                map
            }
            Err(err) => {
                error!(%err, "Error fetching team logos");
                HashMap::new()
            }
        }
    }
}
