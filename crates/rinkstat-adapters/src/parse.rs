use std::collections::HashSet;

use rinkstat_core::{
    GoaltenderLevelRaw, GoaltenderTotalsRaw, LevelRowRaw, PlayerSeed, Role, SeasonTotalsRaw, SkaterLevelRaw,
    SkaterTotalsRaw,
};
use scraper::{ElementRef, Html};

use crate::{element_text, parse_selector, require_text, select_first_text, selectors, AdapterError};

/// Roster links are relative to this prefix.
pub const DEFAULT_ROSTER_LINK_PREFIX: &str = "https://www.leijonat.fi/index.php/index.php/";

const STAFF_ROLE: &str = "Toimihenkilö";
const LEVEL_STAT_CELLS: usize = 5;

pub fn parse_date_of_birth(markup: &str) -> Result<String, AdapterError> {
    let document = Html::parse_fragment(markup);
    require_text(&document, selectors::DATE_OF_BIRTH)
}

/// Last four-digit run in a date string such as `12.03.2009`.
pub fn birth_year_from_date(date: &str) -> Option<i32> {
    date.split(|c: char| !c.is_ascii_digit())
        .filter(|run| run.len() == 4)
        .last()
        .and_then(|run| run.parse().ok())
}

/// Second whitespace token of the position cell, e.g. `Pelipaikka Maalivahti`.
pub fn parse_position_label(markup: &str) -> Result<String, AdapterError> {
    let document = Html::parse_fragment(markup);
    let text = element_text(document.root_element());
    text.split_whitespace()
        .nth(1)
        .map(str::to_string)
        .ok_or_else(|| AdapterError::Message(format!("position cell {text:?} has no label")))
}

pub fn parse_player_age(markup: &str) -> Result<i32, AdapterError> {
    let document = Html::parse_fragment(markup);
    let text = select_first_text(&document, selectors::PLAYER_AGE)?
        .unwrap_or_else(|| element_text(document.root_element()));
    text.parse()
        .map_err(|_| AdapterError::Message(format!("player age {text:?} is not a number")))
}

pub fn parse_goaltender_totals(markup: &str) -> Result<GoaltenderTotalsRaw, AdapterError> {
    let document = Html::parse_fragment(markup);
    Ok(GoaltenderTotalsRaw {
        games: require_text(&document, "#pcas-goalie-games")?,
        played: require_text(&document, "#pcas-goalie-played-games")?,
        goals_allowed: require_text(&document, "#pcas-goalie-goals-against")?,
        time_on_ice: require_text(&document, "#pcas-goalie-toi")?,
        gaa: require_text(&document, "#pcas-goalie-gaa")?,
    })
}

pub fn parse_skater_totals(markup: &str) -> Result<SkaterTotalsRaw, AdapterError> {
    let document = Html::parse_fragment(markup);
    Ok(SkaterTotalsRaw {
        games: require_text(&document, "#pcas-skater-games")?,
        goals: require_text(&document, "#pcas-skater-goals")?,
        assists: require_text(&document, "#pcas-skater-assists")?,
        points: require_text(&document, "#pcas-skater-points")?,
        penalty_minutes: require_text(&document, "#pcas-skater-penalty-minutes")?,
        pp_goals: require_text(&document, "#pcas-skater-goals-pp")?,
        sh_goals: require_text(&document, "#pcas-skater-goals-sh")?,
        so_goals: require_text(&document, "#pcas-skater-goals-ws")?,
    })
}

pub fn parse_totals(markup: &str, role: Role) -> Result<SeasonTotalsRaw, AdapterError> {
    match role {
        Role::Goaltender => parse_goaltender_totals(markup).map(SeasonTotalsRaw::Goaltender),
        Role::Skater => parse_skater_totals(markup).map(SeasonTotalsRaw::Skater),
    }
}

struct LevelCells {
    team_label: String,
    level_label: String,
    stats: [String; LEVEL_STAT_CELLS],
}

fn level_rows(markup: &str) -> Result<Vec<LevelCells>, AdapterError> {
    let document = Html::parse_fragment(markup);
    let row_sel = parse_selector(selectors::LEVEL_ROW)?;
    let team_sel = parse_selector(selectors::LEVEL_TEAM)?;
    let name_sel = parse_selector(selectors::LEVEL_NAME)?;
    let stat_sel = parse_selector(selectors::LEVEL_STAT)?;

    let mut rows = Vec::new();
    for row in document.select(&row_sel) {
        let first = |sel: &scraper::Selector, name: &str| -> Result<String, AdapterError> {
            row.select(sel)
                .next()
                .map(element_text)
                .ok_or_else(|| AdapterError::not_found(name))
        };
        let team_label = first(&team_sel, selectors::LEVEL_TEAM)?;
        let level_label = first(&name_sel, selectors::LEVEL_NAME)?;
        let cells: Vec<String> = row.select(&stat_sel).map(element_text).collect();
        let stats: [String; LEVEL_STAT_CELLS] = cells.try_into().map_err(|cells: Vec<String>| {
            AdapterError::Message(format!(
                "level row {team_label:?} / {level_label:?} has {} stat cells, expected {LEVEL_STAT_CELLS}",
                cells.len()
            ))
        })?;
        rows.push(LevelCells {
            team_label,
            level_label,
            stats,
        });
    }
    Ok(rows)
}

pub fn parse_goaltender_levels(markup: &str) -> Result<Vec<GoaltenderLevelRaw>, AdapterError> {
    Ok(level_rows(markup)?
        .into_iter()
        .map(|row| {
            let [games, played, goals_allowed, saves, save_percentage] = row.stats;
            GoaltenderLevelRaw {
                team_label: row.team_label,
                level_label: row.level_label,
                games,
                played,
                goals_allowed,
                saves,
                save_percentage,
            }
        })
        .collect())
}

pub fn parse_skater_levels(markup: &str) -> Result<Vec<SkaterLevelRaw>, AdapterError> {
    Ok(level_rows(markup)?
        .into_iter()
        .map(|row| {
            let [games, goals, assists, points, penalty_minutes] = row.stats;
            SkaterLevelRaw {
                team_label: row.team_label,
                level_label: row.level_label,
                games,
                goals,
                assists,
                points,
                penalty_minutes,
            }
        })
        .collect())
}

pub fn parse_levels(markup: &str, role: Role) -> Result<Vec<LevelRowRaw>, AdapterError> {
    Ok(match role {
        Role::Goaltender => parse_goaltender_levels(markup)?
            .into_iter()
            .map(LevelRowRaw::Goaltender)
            .collect(),
        Role::Skater => parse_skater_levels(markup)?
            .into_iter()
            .map(LevelRowRaw::Skater)
            .collect(),
    })
}

/// Whether the region element in `markup` has any child markup or text.
pub fn region_has_content(markup: &str) -> bool {
    let document = Html::parse_fragment(markup);
    let root = document.root_element();
    let region = root.children().filter_map(ElementRef::wrap).next().unwrap_or(root);
    region.children().any(|child| match child.value() {
        scraper::Node::Element(_) => true,
        scraper::Node::Text(text) => !text.trim().is_empty(),
        _ => false,
    })
}

/// `VIRTANEN Aku` -> `Aku Virtanen`.
fn display_name(sjl_name: &str) -> Option<String> {
    let mut parts = sjl_name.split_whitespace();
    let last = parts.next()?;
    let first: Vec<&str> = parts.collect();
    if first.is_empty() {
        return None;
    }
    let last = last.split('-').map(capitalize).collect::<Vec<_>>().join("-");
    Some(format!("{} {last}", first.join(" ")))
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(head) => head.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

fn roster_seed(row: ElementRef<'_>, link_sel: &scraper::Selector, link_prefix: &str) -> Option<PlayerSeed> {
    let link = row.select(link_sel).next()?;
    let sjl_name = element_text(link);
    let ep_name = display_name(&sjl_name)?;
    let href = link.value().attr("href")?.trim();
    let sjl_link = if href.starts_with("http://") || href.starts_with("https://") {
        href.to_string()
    } else {
        format!("{link_prefix}{}", href.trim_start_matches('/'))
    };
    Some(PlayerSeed {
        sjl_name,
        ep_name,
        sjl_link,
    })
}

/// Player seeds from a team roster container, skipping staff and repeated names.
pub fn parse_roster(markup: &str, link_prefix: &str) -> Result<Vec<PlayerSeed>, AdapterError> {
    let document = Html::parse_fragment(markup);
    let row_sel = parse_selector(selectors::ROSTER_ROW)?;
    let role_sel = parse_selector(selectors::ROSTER_ROLE)?;
    let link_sel = parse_selector(selectors::ROSTER_NAME_LINK)?;

    let mut seen = HashSet::new();
    let mut seeds = Vec::new();
    for row in document.select(&row_sel) {
        let is_staff = row
            .select(&role_sel)
            .next()
            .is_some_and(|role| element_text(role) == STAFF_ROLE);
        if is_staff {
            continue;
        }
        let Some(seed) = roster_seed(row, &link_sel, link_prefix) else {
            tracing::debug!(row = %element_text(row), "skipping roster row without a player link");
            continue;
        };
        if seen.insert(seed.sjl_name.clone()) {
            seeds.push(seed);
        }
    }
    Ok(seeds)
}
