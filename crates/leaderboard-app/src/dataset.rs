use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use leaderboard_core::{Listing, Milb, Mlb, TeamLogo};
use serde::de::DeserializeOwned;
use tracing::{info, warn};

use crate::listing_service::MemoryCollection;

/// Collections served by the API, loaded from JSON arrays in a data
/// directory.
#[derive(Clone, Default)]
pub struct Dataset {
    pub milb: Arc<MemoryCollection<Milb>>,
    pub mlb: Arc<MemoryCollection<Mlb>>,
    pub team_logos: Arc<Vec<TeamLogo>>,
}

impl Dataset {
    /// Load `<collection>.json` for every collection under `dir`. Missing
    /// files leave that collection empty.
    pub async fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let milb = read_collection(dir, Milb::COLLECTION).await?;
        let mlb = read_collection(dir, Mlb::COLLECTION).await?;
        let team_logos: Vec<TeamLogo> = read_collection(dir, "milb_team_logos").await?;
        info!(
            data_dir = %dir.display(),
            milb = milb.len(),
            mlb = mlb.len(),
            logos = team_logos.len(),
            "Loaded dataset"
        );
        Ok(Self {
            milb: Arc::new(MemoryCollection::new(milb)),
            mlb: Arc::new(MemoryCollection::new(mlb)),
            team_logos: Arc::new(team_logos),
        })
    }
}

async fn read_collection<T: DeserializeOwned>(dir: &Path, name: &str) -> Result<Vec<T>> {
    let path = dir.join(format!("{name}.json"));
    match tokio::fs::read(&path).await {
        Ok(bytes) => serde_json::from_slice(&bytes).with_context(|| format!("failed to parse {}", path.display())),
        Err(err) if err.kind() == ErrorKind::NotFound => {
            warn!(path = %path.display(), "Collection file missing, serving it empty");
            Ok(Vec::new())
        }
        Err(err) => Err(err).with_context(|| format!("failed to read {}", path.display())),
    }
}
