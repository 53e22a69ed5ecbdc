use std::path::Path;

use anyhow::Context;
use rinkstat_core::{
    GoaltenderLevelStats, GoaltenderTotals, LevelRowRaw, LevelStats, SeasonLevelEntry, SeasonTotals, SeasonTotalsRaw,
    SkaterLevelStats, SkaterTotals,
};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("level label {label:?} does not split into an age group and a level")]
    UnparseableLevelLabel { label: String },
    #[error("field {field} has non-numeric value {value:?}")]
    InvalidNumber { field: &'static str, value: String },
}

/// How the club is derived for a level label that bypasses the age group split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClubRule {
    /// First space-delimited token of the team label, trailing commas removed.
    FirstToken,
    TeamLabel,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    #[default]
    Exact,
    Contains,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LevelException {
    pub label: String,
    #[serde(default, rename = "match")]
    pub match_kind: MatchKind,
    pub club: ClubRule,
}

impl LevelException {
    fn matches(&self, label: &str) -> bool {
        match self.match_kind {
            MatchKind::Exact => label == self.label,
            MatchKind::Contains => label.contains(self.label.as_str()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct LevelRulesFile {
    #[allow(dead_code)]
    version: u32,
    #[serde(default)]
    exceptions: Vec<LevelException>,
}

/// Non-competitive level labels that are stored verbatim with no age group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelRules {
    exceptions: Vec<LevelException>,
}

impl Default for LevelRules {
    fn default() -> Self {
        Self::builtin()
    }
}

impl LevelRules {
    pub fn builtin() -> Self {
        let rule = |label: &str, match_kind, club| LevelException {
            label: label.to_string(),
            match_kind,
            club,
        };
        Self {
            exceptions: vec![
                rule("Harjoitusottelut", MatchKind::Exact, ClubRule::FirstToken),
                rule("Pohjola-leiri", MatchKind::Exact, ClubRule::None),
                rule("Kartoitustapahtumat", MatchKind::Exact, ClubRule::TeamLabel),
                rule("maaottelut", MatchKind::Contains, ClubRule::TeamLabel),
            ],
        }
    }

    pub fn new(exceptions: Vec<LevelException>) -> Self {
        Self { exceptions }
    }

    pub fn from_yaml_str(text: &str) -> anyhow::Result<Self> {
        let file: LevelRulesFile = serde_yaml::from_str(text).context("parsing level exception rules")?;
        Ok(Self::new(file.exceptions))
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        Self::from_yaml_str(&text).with_context(|| format!("loading {}", path.display()))
    }

    /// Rules from `path` when it exists, otherwise the built-in set.
    pub fn load_or_builtin(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::from_yaml_file(path)
        } else {
            tracing::debug!(path = %path.display(), "no level rules file, using built-in exceptions");
            Ok(Self::builtin())
        }
    }

    pub fn exceptions(&self) -> &[LevelException] {
        &self.exceptions
    }

    fn exception_for(&self, label: &str) -> Option<&LevelException> {
        self.exceptions.iter().find(|e| e.matches(label))
    }
}

fn first_token_club(team_label: &str) -> Option<String> {
    let token = team_label.trim().split(' ').next().unwrap_or_default().trim_end_matches(',');
    (!token.is_empty()).then(|| token.to_string())
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn is_blank(value: &str) -> bool {
    value.is_empty() || value == "-"
}

pub fn coerce_count(field: &'static str, value: &str) -> Result<i32, NormalizeError> {
    let trimmed = value.trim();
    if is_blank(trimmed) {
        return Ok(0);
    }
    trimmed.parse().map_err(|_| NormalizeError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}

/// Accepts `,` as decimal separator and a trailing `%`.
pub fn coerce_decimal(field: &'static str, value: &str) -> Result<f64, NormalizeError> {
    let trimmed = value.trim();
    if is_blank(trimmed) {
        return Ok(0.0);
    }
    let cleaned = trimmed.trim_end_matches('%').trim().replace(',', ".");
    cleaned
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
        .ok_or_else(|| NormalizeError::InvalidNumber {
            field,
            value: value.to_string(),
        })
}

/// `mm:ss` to fractional minutes; plain numbers pass through as minutes.
pub fn coerce_minutes(field: &'static str, value: &str) -> Result<f64, NormalizeError> {
    let trimmed = value.trim();
    let Some((minutes, seconds)) = trimmed.split_once(':') else {
        return coerce_decimal(field, trimmed);
    };
    let invalid = || NormalizeError::InvalidNumber {
        field,
        value: value.to_string(),
    };
    let minutes: u32 = minutes.trim().parse().map_err(|_| invalid())?;
    let seconds: u32 = seconds.trim().parse().map_err(|_| invalid())?;
    if seconds >= 60 {
        return Err(invalid());
    }
    let total = minutes
        .checked_mul(60)
        .and_then(|secs| secs.checked_add(seconds))
        .ok_or_else(invalid)?;
    Ok(f64::from(total) / 60.0)
}

fn level_stats(raw: &LevelRowRaw) -> Result<LevelStats, NormalizeError> {
    Ok(match raw {
        LevelRowRaw::Goaltender(row) => LevelStats::Goaltender(GoaltenderLevelStats {
            games: coerce_count("games", &row.games)?,
            played: coerce_count("played", &row.played)?,
            goals_allowed: coerce_count("goals_allowed", &row.goals_allowed)?,
            saves: coerce_count("saves", &row.saves)?,
            save_percentage: coerce_decimal("save_percentage", &row.save_percentage)?,
        }),
        LevelRowRaw::Skater(row) => LevelStats::Skater(SkaterLevelStats {
            games: coerce_count("games", &row.games)?,
            goals: coerce_count("goals", &row.goals)?,
            assists: coerce_count("assists", &row.assists)?,
            points: coerce_count("points", &row.points)?,
            penalty_minutes: coerce_count("penalty_minutes", &row.penalty_minutes)?,
        }),
    })
}

/// Derives club, level and age group from the labels of one level row and
/// coerces its counters.
pub fn normalize_level_row(raw: &LevelRowRaw, rules: &LevelRules) -> Result<SeasonLevelEntry, NormalizeError> {
    let team_label = raw.team_label().trim();
    let level_label = raw.level_label().trim();

    let (club, level, age_group) = match rules.exception_for(level_label) {
        Some(exception) => {
            let club = match exception.club {
                ClubRule::FirstToken => first_token_club(team_label),
                ClubRule::TeamLabel => non_empty(team_label),
                ClubRule::None => None,
            };
            (club, level_label.to_string(), None)
        }
        None => {
            let tokens: Vec<&str> = level_label.split(' ').collect();
            match tokens.as_slice() {
                [age_group, level] if !age_group.is_empty() && !level.is_empty() => (
                    first_token_club(team_label),
                    level.to_string(),
                    Some(age_group.to_string()),
                ),
                _ => {
                    return Err(NormalizeError::UnparseableLevelLabel {
                        label: level_label.to_string(),
                    })
                }
            }
        }
    };

    Ok(SeasonLevelEntry {
        team_label: team_label.to_string(),
        level_label: level_label.to_string(),
        club,
        level,
        age_group,
        stats: level_stats(raw)?,
    })
}

pub fn normalize_totals(raw: &SeasonTotalsRaw) -> Result<SeasonTotals, NormalizeError> {
    Ok(match raw {
        SeasonTotalsRaw::Goaltender(t) => SeasonTotals::Goaltender(GoaltenderTotals {
            games: coerce_count("games", &t.games)?,
            played: coerce_count("played", &t.played)?,
            goals_allowed: coerce_count("goals_allowed", &t.goals_allowed)?,
            minutes: coerce_minutes("time_on_ice", &t.time_on_ice)?,
            gaa: coerce_decimal("gaa", &t.gaa)?,
        }),
        SeasonTotalsRaw::Skater(t) => SeasonTotals::Skater(SkaterTotals {
            games: coerce_count("games", &t.games)?,
            goals: coerce_count("goals", &t.goals)?,
            assists: coerce_count("assists", &t.assists)?,
            points: coerce_count("points", &t.points)?,
            penalty_minutes: coerce_count("penalty_minutes", &t.penalty_minutes)?,
            pp_goals: coerce_count("pp_goals", &t.pp_goals)?,
            sh_goals: coerce_count("sh_goals", &t.sh_goals)?,
            so_goals: coerce_count("so_goals", &t.so_goals)?,
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rinkstat_core::{GoaltenderLevelRaw, GoaltenderTotalsRaw, SkaterLevelRaw};
    use std::io::Write;

    fn skater(team: &str, level: &str, games: &str) -> LevelRowRaw {
        LevelRowRaw::Skater(SkaterLevelRaw {
            team_label: team.into(),
            level_label: level.into(),
            games: games.into(),
            goals: "1".into(),
            assists: "-".into(),
            points: "1".into(),
            penalty_minutes: "".into(),
        })
    }

    #[test]
    fn regular_label_splits_into_age_group_and_level() {
        let entry = normalize_level_row(&skater("Kiekko-Espoo, sininen", "U16 AAA", "10"), &LevelRules::builtin())
            .unwrap();
        assert_eq!(entry.club.as_deref(), Some("Kiekko-Espoo"));
        assert_eq!(entry.level, "AAA");
        assert_eq!(entry.age_group.as_deref(), Some("U16"));
        assert_eq!(
            entry.stats,
            LevelStats::Skater(SkaterLevelStats {
                games: 10,
                goals: 1,
                assists: 0,
                points: 1,
                penalty_minutes: 0,
            })
        );
    }

    #[test]
    fn exception_labels_follow_their_club_rule() {
        let rules = LevelRules::builtin();
        let cases = [
            ("HIFK, punainen", "Harjoitusottelut", Some("HIFK")),
            ("Leijonat U16", "Pohjola-leiri", None),
            ("Etelä-Suomi", "Kartoitustapahtumat", Some("Etelä-Suomi")),
            ("Suomi U17", "U17 maaottelut", Some("Suomi U17")),
        ];
        for (team, label, club) in cases {
            let entry = normalize_level_row(&skater(team, label, "2"), &rules).unwrap();
            assert_eq!(entry.club.as_deref(), club, "{label}");
            assert_eq!(entry.level, label);
            assert_eq!(entry.age_group, None, "{label}");
        }
    }

    #[test]
    fn labels_with_wrong_token_count_are_errors() {
        let rules = LevelRules::builtin();
        for label in ["Mestis", "U20 SM sarja", "U16  AAA", ""] {
            let err = normalize_level_row(&skater("TPS", label, "1"), &rules).unwrap_err();
            assert_eq!(err, NormalizeError::UnparseableLevelLabel { label: label.trim().into() });
        }
    }

    #[test]
    fn non_numeric_counter_names_the_field() {
        let err = normalize_level_row(&skater("TPS", "U18 AA", "ten"), &LevelRules::builtin()).unwrap_err();
        assert_eq!(
            err,
            NormalizeError::InvalidNumber {
                field: "games",
                value: "ten".into()
            }
        );
    }

    #[test]
    fn goaltender_rows_accept_comma_percentages() {
        let raw = LevelRowRaw::Goaltender(GoaltenderLevelRaw {
            team_label: "Ilves".into(),
            level_label: "U15 AA".into(),
            games: "12".into(),
            played: "11".into(),
            goals_allowed: "20".into(),
            saves: "230".into(),
            save_percentage: "92,0 %".into(),
        });
        let entry = normalize_level_row(&raw, &LevelRules::builtin()).unwrap();
        let LevelStats::Goaltender(stats) = entry.stats else {
            panic!("expected goaltender stats");
        };
        assert!((stats.save_percentage - 92.0).abs() < 1e-9);
    }

    #[test]
    fn time_on_ice_converts_to_fractional_minutes() {
        assert!((coerce_minutes("toi", "90:30").unwrap() - 90.5).abs() < 1e-9);
        assert!((coerce_minutes("toi", "45").unwrap() - 45.0).abs() < 1e-9);
        assert!(coerce_minutes("toi", "12:75").is_err());
        assert!(matches!(
            coerce_minutes("toi", "80000000:00"),
            Err(NormalizeError::InvalidNumber { field: "toi", .. })
        ));

        let totals = normalize_totals(&SeasonTotalsRaw::Goaltender(GoaltenderTotalsRaw {
            games: "5".into(),
            played: "4".into(),
            goals_allowed: "9".into(),
            time_on_ice: "240:00".into(),
            gaa: "2,25".into(),
        }))
        .unwrap();
        assert_eq!(
            totals,
            SeasonTotals::Goaltender(GoaltenderTotals {
                games: 5,
                played: 4,
                goals_allowed: 9,
                minutes: 240.0,
                gaa: 2.25,
            })
        );
    }

    #[test]
    fn decimals_reject_non_finite_values() {
        assert!(coerce_decimal("gaa", "NaN").is_err());
        assert_eq!(coerce_decimal("gaa", " - ").unwrap(), 0.0);
    }

    #[test]
    fn yaml_rules_replace_builtins() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "version: 1\nexceptions:\n  - label: Turnaus\n    club: team_label\n  - label: leiri\n    match: contains\n    club: none\n"
        )
        .unwrap();

        let rules = LevelRules::from_yaml_file(file.path()).unwrap();
        assert_eq!(rules.exceptions().len(), 2);

        let entry = normalize_level_row(&skater("Kalpa", "Turnaus", "1"), &rules).unwrap();
        assert_eq!(entry.club.as_deref(), Some("Kalpa"));
        let camp = normalize_level_row(&skater("Kalpa", "Kesä-leiri", "1"), &rules).unwrap();
        assert_eq!(camp.club, None);
        assert!(normalize_level_row(&skater("Kalpa", "Harjoitusottelut", "1"), &rules).is_err());
    }

    #[test]
    fn missing_rules_file_falls_back_to_builtins() {
        let dir = tempfile::tempdir().unwrap();
        let rules = LevelRules::load_or_builtin(dir.path().join("absent.yaml")).unwrap();
        assert_eq!(rules, LevelRules::builtin());
    }
}
