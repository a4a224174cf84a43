use serde::{Deserialize, Deserializer, Serialize};

/// Team reference embedded in every player record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TeamRef {
    /// Team document id.
    pub id: String,
    /// Display name; sortable as `team.name`.
    pub name: String,
    /// Logo URL or base64 payload.
    pub image: String,
}

/// Pitching line and bWAR for a minor-league player.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MilbStat {
    /// Games played.
    pub games_played: u32,
    /// Wins.
    pub wins: u32,
    /// Losses.
    pub losses: u32,
    /// Innings pitched.
    pub innings_pitched: f64,
    /// Strikeouts.
    pub strike_outs: u32,
    /// Shutouts.
    pub shutouts: u32,
    /// bWAR, computed upstream.
    pub m_war: f64,
    /// Change in bWAR since the previous snapshot.
    pub m_war_change: f64,
}

/// Minor-league player record as stored in `milb_players`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PlayerMilb {
    /// Document id.
    pub id: String,
    /// Prospect rank.
    pub rank: u32,
    /// Headshot URL.
    pub image: String,
    /// Full display name.
    pub full_name: String,
    /// Given name.
    pub first_name: String,
    /// Family name; sortable as `lastName`.
    pub last_name: String,
    /// Birth date as stored upstream.
    pub birth_date: String,
    /// Current team.
    pub team: TeamRef,
    /// Season line.
    pub stat: MilbStat,
}

/// WAR figures for a major-league player-season.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MlbStat {
    /// Conventional WAR.
    pub war: f64,
    /// bWAR, computed upstream.
    pub m_war: f64,
    /// Error estimate of the bWAR figure.
    pub m_war_error: f64,
}

/// Major-league player-season record as stored in `mlb_players`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PlayerMlb {
    /// Document id.
    pub id: String,
    /// Season year. Upstream documents carry it either as a number or a numeric string.
    #[serde(deserialize_with = "season_from_number_or_text")]
    pub season: u16,
    /// Full display name.
    pub full_name: String,
    /// Given name.
    pub first_name: String,
    /// Family name.
    pub last_name: String,
    /// Team for the season.
    pub team: TeamRef,
    /// WAR figures.
    pub stat: MlbStat,
}

/// Team logo document as stored in `milb_team_logos`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TeamLogo {
    /// Team id the logo belongs to.
    pub id: String,
    /// Base64 encoded PNG.
    pub image: String,
}

fn season_from_number_or_text<'de, D>(d: D) -> Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u16),
        Text(String),
    }

    match Raw::deserialize(d)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}
