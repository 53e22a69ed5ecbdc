//! Page session contracts, markup field parsers and the season/level normalizer.

mod fixture;
mod http;
mod normalize;
mod parse;

use std::time::Duration;

use async_trait::async_trait;
use rinkstat_storage::FetchError;
use scraper::{ElementRef, Html, Selector};
use thiserror::Error;

pub use fixture::{FixturePage, FixtureSession, FixtureSet};
pub use http::{HttpPageSession, HttpSessionConfig};
pub use normalize::{
    coerce_count, coerce_decimal, coerce_minutes, normalize_level_row, normalize_totals, ClubRule, LevelException,
    LevelRules, MatchKind, NormalizeError,
};
pub use parse::{
    birth_year_from_date, parse_date_of_birth, parse_goaltender_levels, parse_goaltender_totals, parse_player_age,
    parse_levels, parse_position_label, parse_roster, parse_skater_levels, parse_skater_totals, parse_totals,
    region_has_content, DEFAULT_ROSTER_LINK_PREFIX,
};

pub const CRATE_NAME: &str = "rinkstat-adapters";

/// Markup regions of the federation's player and team pages.
pub mod selectors {
    pub const PERSONAL_DETAILS: &str = ".pcm-basic-col";
    pub const DATE_OF_BIRTH: &str = "div#pcm-player-dob";
    pub const POSITION: &str = "td.person-position";
    pub const PLAYER_AGE: &str = "#pcm-player-age";
    pub const SEASON_SELECT: &str = "select#pcss-season-select";
    pub const SEASON_TEAMS: &str = "#pcss-player-season-teams";

    pub const GOALTENDER_TOTALS: &str = "#pcm-all-stats-container";
    pub const SKATER_TOTALS: &str = "#psac-all-skater-stats-container";
    /// Shown instead of [`SKATER_TOTALS`] on a goaltender's profile.
    pub const GOALTENDER_ROLE_MARKER: &str = "#psac-all-goalie-stats-container";
    pub const SKATER_ROLE_MARKER: &str = SKATER_TOTALS;

    pub const GOALTENDER_LEVELS: &str = "#pcss-goalie-serie-stats-series-container";
    pub const SKATER_LEVELS: &str = "#pcss-skater-serie-stats-series-container";
    pub const LEVEL_ROW: &str = "div.pcss-level-title-row";
    pub const LEVEL_TEAM: &str = "div.pcss-level-team-name-col";
    pub const LEVEL_NAME: &str = "div.pcss-level-name-col";
    pub const LEVEL_STAT: &str = "div.pcss-level-stat-col";

    pub const ROSTER_ROW: &str = "div.tcst-row";
    pub const ROSTER_ROLE: &str = "div.col-xs-4";
    pub const ROSTER_NAME_LINK: &str = "div.col-xs-6 a";
}

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("region {selector} not found")]
    NotFound { selector: String },
    #[error("{0}")]
    Message(String),
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

impl AdapterError {
    pub fn not_found(selector: impl Into<String>) -> Self {
        AdapterError::NotFound {
            selector: selector.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, AdapterError::NotFound { .. })
    }
}

/// One open view onto the source site.
///
/// A session holds a single current page. `text` returns the markup of the
/// first element matching a region selector on that page; regions that do not
/// exist yield [`AdapterError::NotFound`].
#[async_trait]
pub trait PageSession: Send {
    async fn fetch(&mut self, url: &str) -> Result<(), AdapterError>;

    async fn text(&mut self, region: &str) -> Result<String, AdapterError>;

    async fn select_option(&mut self, selector: &str, value: &str) -> Result<(), AdapterError>;

    /// Returns whether `selector` is visible, waiting up to `timeout` for it to appear.
    async fn wait_until_visible(&mut self, selector: &str, timeout: Duration) -> Result<bool, AdapterError>;
}

fn parse_selector(selector: &str) -> Result<Selector, AdapterError> {
    Selector::parse(selector).map_err(|e| AdapterError::Message(e.to_string()))
}

fn text_or_none(value: String) -> Option<String> {
    let trimmed = value.trim().to_string();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

fn select_first_text(document: &Html, selector: &str) -> Result<Option<String>, AdapterError> {
    let sel = parse_selector(selector)?;
    Ok(document
        .select(&sel)
        .next()
        .and_then(|n| text_or_none(n.text().collect::<String>())))
}

/// Like [`select_first_text`] but an absent element is an error.
fn require_text(document: &Html, selector: &str) -> Result<String, AdapterError> {
    let sel = parse_selector(selector)?;
    document
        .select(&sel)
        .next()
        .map(element_text)
        .ok_or_else(|| AdapterError::not_found(selector))
}

/// Outer markup of the first element matching `selector`, if any.
pub fn select_region_html(markup: &str, selector: &str) -> Result<Option<String>, AdapterError> {
    let document = Html::parse_document(markup);
    let sel = parse_selector(selector)?;
    Ok(document.select(&sel).next().map(|n| n.html()))
}
