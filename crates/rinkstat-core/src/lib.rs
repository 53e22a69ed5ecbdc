//! Core domain model for rinkstat: players, seasons, season-level stat lines and
//! the dimension rows they reference.

use std::fmt;

use serde::{Deserialize, Serialize};

pub const CRATE_NAME: &str = "rinkstat-core";

/// Stored name for a club or age group that the source leaves undefined.
pub const UNSPECIFIED_DIMENSION: &str = "-";

pub type RowId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Goaltender,
    Skater,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Goaltender => "goaltender",
            Role::Skater => "skater",
        }
    }

    /// Maps the position label shown on a player profile to a role.
    ///
    /// Forwards and defenders are both skaters.
    pub fn from_position_label(label: &str) -> Option<Self> {
        match label.trim() {
            "Maalivahti" => Some(Role::Goaltender),
            "Kenttäpelaaja" | "Hyökkääjä" | "Puolustaja" => Some(Role::Skater),
            _ => None,
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "goaltender" => Some(Role::Goaltender),
            "skater" => Some(Role::Skater),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source identity of a player, as discovered from a team roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSeed {
    /// "LASTNAME Firstname", as the source writes it.
    pub sjl_name: String,
    /// "Firstname Lastname".
    pub ep_name: String,
    pub sjl_link: String,
}

// Raw field-parser output. Values stay strings so the source formatting is
// preserved until normalization.

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoaltenderTotalsRaw {
    pub games: String,
    pub played: String,
    pub goals_allowed: String,
    pub time_on_ice: String,
    pub gaa: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkaterTotalsRaw {
    pub games: String,
    pub goals: String,
    pub assists: String,
    pub points: String,
    pub penalty_minutes: String,
    pub pp_goals: String,
    pub sh_goals: String,
    pub so_goals: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SeasonTotalsRaw {
    Goaltender(GoaltenderTotalsRaw),
    Skater(SkaterTotalsRaw),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoaltenderLevelRaw {
    pub team_label: String,
    pub level_label: String,
    pub games: String,
    pub played: String,
    pub goals_allowed: String,
    pub saves: String,
    pub save_percentage: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkaterLevelRaw {
    pub team_label: String,
    pub level_label: String,
    pub games: String,
    pub goals: String,
    pub assists: String,
    pub points: String,
    pub penalty_minutes: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LevelRowRaw {
    Goaltender(GoaltenderLevelRaw),
    Skater(SkaterLevelRaw),
}

impl LevelRowRaw {
    pub fn team_label(&self) -> &str {
        match self {
            LevelRowRaw::Goaltender(row) => &row.team_label,
            LevelRowRaw::Skater(row) => &row.team_label,
        }
    }

    pub fn level_label(&self) -> &str {
        match self {
            LevelRowRaw::Goaltender(row) => &row.level_label,
            LevelRowRaw::Skater(row) => &row.level_label,
        }
    }
}

// Typed counters.

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GoaltenderTotals {
    pub games: i32,
    pub played: i32,
    pub goals_allowed: i32,
    /// Time on ice in fractional minutes.
    pub minutes: f64,
    pub gaa: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SkaterTotals {
    pub games: i32,
    pub goals: i32,
    pub assists: i32,
    pub points: i32,
    pub penalty_minutes: i32,
    pub pp_goals: i32,
    pub sh_goals: i32,
    pub so_goals: i32,
}

/// Whole-season totals; the variant always matches the player's role.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum SeasonTotals {
    Goaltender(GoaltenderTotals),
    Skater(SkaterTotals),
}

impl SeasonTotals {
    pub fn zeroed(role: Role) -> Self {
        match role {
            Role::Goaltender => SeasonTotals::Goaltender(GoaltenderTotals::default()),
            Role::Skater => SeasonTotals::Skater(SkaterTotals::default()),
        }
    }

    pub fn role(&self) -> Role {
        match self {
            SeasonTotals::Goaltender(_) => Role::Goaltender,
            SeasonTotals::Skater(_) => Role::Skater,
        }
    }

    pub fn games(&self) -> i32 {
        match self {
            SeasonTotals::Goaltender(t) => t.games,
            SeasonTotals::Skater(t) => t.games,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GoaltenderLevelStats {
    pub games: i32,
    pub played: i32,
    pub goals_allowed: i32,
    pub saves: i32,
    pub save_percentage: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SkaterLevelStats {
    pub games: i32,
    pub goals: i32,
    pub assists: i32,
    pub points: i32,
    pub penalty_minutes: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum LevelStats {
    Goaltender(GoaltenderLevelStats),
    Skater(SkaterLevelStats),
}

impl LevelStats {
    pub fn role(&self) -> Role {
        match self {
            LevelStats::Goaltender(_) => Role::Goaltender,
            LevelStats::Skater(_) => Role::Skater,
        }
    }

    pub fn games(&self) -> i32 {
        match self {
            LevelStats::Goaltender(s) => s.games,
            LevelStats::Skater(s) => s.games,
        }
    }
}

/// Composite key approximating one participation within a season.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LevelKey {
    pub level: String,
    pub age_group: String,
}

impl LevelKey {
    pub fn new(level: impl Into<String>, age_group: Option<&str>) -> Self {
        Self {
            level: level.into(),
            age_group: age_group.unwrap_or(UNSPECIFIED_DIMENSION).to_string(),
        }
    }
}

impl fmt::Display for LevelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.age_group, self.level)
    }
}

/// A normalized stat line at one club/level/age group within a season.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonLevelEntry {
    pub team_label: String,
    pub level_label: String,
    pub club: Option<String>,
    pub level: String,
    pub age_group: Option<String>,
    pub stats: LevelStats,
}

impl SeasonLevelEntry {
    pub fn key(&self) -> LevelKey {
        LevelKey::new(self.level.clone(), self.age_group.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CareerSeason {
    pub year: i32,
    pub totals: SeasonTotals,
    /// False when the totals region never rendered and `totals` holds zeroes.
    pub totals_observed: bool,
    pub levels: Vec<SeasonLevelEntry>,
}

/// A walked career with role and birth year resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Career {
    pub seed: PlayerSeed,
    pub birth_year: i32,
    pub role: Role,
    pub seasons: Vec<CareerSeason>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DimensionKind {
    Club,
    Level,
    AgeGroup,
}

impl DimensionKind {
    pub fn table(self) -> &'static str {
        match self {
            DimensionKind::Club => "clubs",
            DimensionKind::Level => "levels",
            DimensionKind::AgeGroup => "age_groups",
        }
    }
}

impl fmt::Display for DimensionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DimensionKind::Club => "club",
            DimensionKind::Level => "level",
            DimensionKind::AgeGroup => "age group",
        })
    }
}

// Persisted rows.

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerRow {
    pub id: RowId,
    pub sjl_name: String,
    pub ep_name: String,
    pub sjl_link: String,
    pub birth_year: i32,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonRow {
    pub id: RowId,
    pub player_id: RowId,
    pub year: i32,
    pub totals: SeasonTotals,
}

impl SeasonRow {
    pub fn role(&self) -> Role {
        self.totals.role()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonLevelRow {
    pub id: RowId,
    pub season_id: RowId,
    pub player_id: RowId,
    pub club_id: RowId,
    pub level_id: RowId,
    pub age_group_id: RowId,
    pub stats: LevelStats,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionRow {
    pub id: RowId,
    pub kind: DimensionKind,
    pub name: String,
}

/// Insert payload for a season-level row once its dimensions are resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSeasonLevel {
    pub season_id: RowId,
    pub player_id: RowId,
    pub club_id: RowId,
    pub level_id: RowId,
    pub age_group_id: RowId,
    pub stats: LevelStats,
}
