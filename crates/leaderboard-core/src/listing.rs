use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hash;
use std::str::FromStr;
use thiserror::Error;

use crate::player::{PlayerMilb, PlayerMlb};
use crate::sort::FieldValue;

/// Sort field name not offered by a listing.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Invalid sort field: {0}")]
pub struct UnknownSortField(pub String);

/// How a listing turns its last row into a cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorStyle {
    /// `{"value": …, "id": …}` with the document id as a tie-breaker.
    Composite,
    /// The bare sort value rendered as text.
    Scalar,
}

/// When a controller warms neighbouring pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PrefetchPolicy {
    /// After cache hits and after network fetches.
    Always,
    /// Only after a page came from the network.
    AfterFetch,
    /// Never.
    Never,
}

impl PrefetchPolicy {
    /// Whether a page served from cache should prefetch its neighbours.
    #[must_use]
    pub const fn on_cache_hit(self) -> bool {
        matches!(self, Self::Always)
    }

    /// Whether a freshly fetched page should prefetch its neighbours.
    #[must_use]
    pub const fn after_fetch(self) -> bool {
        matches!(self, Self::Always | Self::AfterFetch)
    }
}

/// Sortable attribute of a listing, named by its document path.
pub trait SortField:
    Copy + Eq + Hash + Default + fmt::Debug + fmt::Display + Send + Sync + 'static
{
    /// Every field the listing accepts.
    const ALL: &'static [Self];

    /// Document path, e.g. `team.name`.
    fn as_str(self) -> &'static str;

    /// Whether values of this field are numbers.
    fn is_numeric(self) -> bool;

    /// Look up a field by its document path.
    ///
    /// # Errors
    /// Returns [`UnknownSortField`] when the listing does not offer `raw`.
    fn parse(raw: &str) -> Result<Self, UnknownSortField> {
        Self::ALL
            .iter()
            .copied()
            .find(|field| field.as_str() == raw)
            .ok_or_else(|| UnknownSortField(raw.to_owned()))
    }
}

/// Static description of one listing type: entity schema, sort fields,
/// cache namespace and cursor strategy.
pub trait Listing: Send + Sync + 'static {
    /// Record shown in the listing.
    type Entity: Clone + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static;
    /// Fields the listing can be sorted by.
    type SortField: SortField;

    /// Prefix isolating this listing's page records (`<ns>_…`) and its API path.
    const NAMESPACE: &'static str;
    /// Storage key of the entity-by-id map.
    const ENTITY_MAP_KEY: &'static str;
    /// Document collection backing the listing.
    const COLLECTION: &'static str;
    /// Cursor encoding strategy.
    const CURSOR_STYLE: CursorStyle;
    /// Prefetch behaviour when configuration does not override it.
    const DEFAULT_PREFETCH: PrefetchPolicy;

    /// Stable identifier of a record.
    fn entity_id(entity: &Self::Entity) -> &str;

    /// Value of `field` for `entity`.
    fn sort_value(entity: &Self::Entity, field: Self::SortField) -> FieldValue;
}

/// Minor-league prospect listing.
#[derive(Debug, Clone, Copy, Default)]
pub struct Milb;

/// Major-league player-season listing.
#[derive(Debug, Clone, Copy, Default)]
pub struct Mlb;

/// Sort fields of the MiLB listing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum MilbSortField {
    /// `rank`
    #[default]
    Rank,
    /// `lastName`
    LastName,
    /// `team.name`
    TeamName,
    /// `stat.mWar`
    MWar,
}

impl SortField for MilbSortField {
    const ALL: &'static [Self] = &[Self::Rank, Self::LastName, Self::TeamName, Self::MWar];

    fn as_str(self) -> &'static str {
        match self {
            Self::Rank => "rank",
            Self::LastName => "lastName",
            Self::TeamName => "team.name",
            Self::MWar => "stat.mWar",
        }
    }

    fn is_numeric(self) -> bool {
        matches!(self, Self::Rank | Self::MWar)
    }
}

/// Sort fields of the MLB listing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum MlbSortField {
    /// `season`
    #[default]
    Season,
    /// `team.name`
    TeamName,
    /// `stat.war`
    War,
    /// `stat.mWar`
    MWar,
    /// `stat.mWarError`
    MWarError,
}

impl SortField for MlbSortField {
    const ALL: &'static [Self] = &[
        Self::Season,
        Self::TeamName,
        Self::War,
        Self::MWar,
        Self::MWarError,
    ];

    fn as_str(self) -> &'static str {
        match self {
            Self::Season => "season",
            Self::TeamName => "team.name",
            Self::War => "stat.war",
            Self::MWar => "stat.mWar",
            Self::MWarError => "stat.mWarError",
        }
    }

    fn is_numeric(self) -> bool {
        !matches!(self, Self::TeamName)
    }
}

macro_rules! sort_field_text {
    ($($ty:ty),*) => {$(
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = UnknownSortField;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                <Self as SortField>::parse(s)
            }
        }
    )*};
}

sort_field_text!(MilbSortField, MlbSortField);

impl Listing for Milb {
    type Entity = PlayerMilb;
    type SortField = MilbSortField;

    const NAMESPACE: &'static str = "milb";
    const ENTITY_MAP_KEY: &'static str = "milbPlayersById";
    const COLLECTION: &'static str = "milb_players";
    const CURSOR_STYLE: CursorStyle = CursorStyle::Composite;
    const DEFAULT_PREFETCH: PrefetchPolicy = PrefetchPolicy::Always;

    fn entity_id(entity: &PlayerMilb) -> &str {
        &entity.id
    }

    fn sort_value(entity: &PlayerMilb, field: MilbSortField) -> FieldValue {
        match field {
            MilbSortField::Rank => FieldValue::Number(f64::from(entity.rank)),
            MilbSortField::LastName => FieldValue::Text(entity.last_name.clone()),
            MilbSortField::TeamName => FieldValue::Text(entity.team.name.clone()),
            MilbSortField::MWar => FieldValue::Number(entity.stat.m_war),
        }
    }
}

impl Listing for Mlb {
    type Entity = PlayerMlb;
    type SortField = MlbSortField;

    const NAMESPACE: &'static str = "mlb";
    // Upstream spelled this key differently from the MiLB one; kept for
    // compatibility with data already in storage.
    const ENTITY_MAP_KEY: &'static str = "mlbPlayersByID";
    const COLLECTION: &'static str = "mlb_players";
    const CURSOR_STYLE: CursorStyle = CursorStyle::Scalar;
    const DEFAULT_PREFETCH: PrefetchPolicy = PrefetchPolicy::Never;

    fn entity_id(entity: &PlayerMlb) -> &str {
        &entity.id
    }

    fn sort_value(entity: &PlayerMlb, field: MlbSortField) -> FieldValue {
        match field {
            MlbSortField::Season => FieldValue::Number(f64::from(entity.season)),
            MlbSortField::TeamName => FieldValue::Text(entity.team.name.clone()),
            MlbSortField::War => FieldValue::Number(entity.stat.war),
            MlbSortField::MWar => FieldValue::Number(entity.stat.m_war),
            MlbSortField::MWarError => FieldValue::Number(entity.stat.m_war_error),
        }
    }
}
