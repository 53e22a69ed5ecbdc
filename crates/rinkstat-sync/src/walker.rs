use std::time::Duration;

use rinkstat_adapters::{
    birth_year_from_date, normalize_level_row, normalize_totals, parse_date_of_birth, parse_levels, parse_player_age,
    parse_position_label, parse_totals, region_has_content, selectors, AdapterError, LevelRules, NormalizeError,
    PageSession,
};
use rinkstat_core::{Career, CareerSeason, LevelRowRaw, PlayerSeed, Role, SeasonTotals};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Seasons examined per player.
pub const MAX_SEASONS: usize = 10;
/// Earliest age at which a season is recorded.
pub const MIN_PLAYING_AGE: i32 = 13;
/// Birth year used to open the full window when scanning for a retired player's last season.
pub const RETIRED_SCAN_BIRTH_YEAR: i32 = 2000;

/// Seasons from `start_year` backwards while the player is at least
/// [`MIN_PLAYING_AGE`], capped at [`MAX_SEASONS`].
pub fn seasons_to_walk(birth_year: i32, start_year: i32) -> Vec<i32> {
    (0..)
        .map(|offset| start_year - offset)
        .take_while(|season| season - birth_year >= MIN_PLAYING_AGE)
        .take(MAX_SEASONS)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelRetryPolicy {
    pub goaltender_attempts: u32,
    pub skater_attempts: u32,
    /// Pause between level reads.
    pub pause: Duration,
    /// Wait after selecting a season.
    pub settle: Duration,
    /// Wait after selecting a season while scanning for a retired player's last season.
    pub retired_settle: Duration,
    pub profile_timeout: Duration,
}

impl Default for LevelRetryPolicy {
    fn default() -> Self {
        Self {
            goaltender_attempts: 30,
            skater_attempts: 15,
            pause: Duration::from_millis(100),
            settle: Duration::from_millis(500),
            retired_settle: Duration::from_millis(800),
            profile_timeout: Duration::from_secs(5),
        }
    }
}

impl LevelRetryPolicy {
    /// Same attempt bounds with every wait removed.
    pub fn immediate() -> Self {
        Self {
            pause: Duration::ZERO,
            settle: Duration::ZERO,
            retired_settle: Duration::ZERO,
            profile_timeout: Duration::ZERO,
            ..Self::default()
        }
    }

    pub fn attempts_for(&self, role: Role) -> u32 {
        match role {
            Role::Goaltender => self.goaltender_attempts,
            Role::Skater => self.skater_attempts,
        }
    }
}

#[derive(Debug, Error)]
pub enum WalkError {
    #[error("cannot determine role: {reason}")]
    AmbiguousRole { reason: String },
    #[error("no active season found in the last {MAX_SEASONS} seasons")]
    NoActiveSeason,
    #[error("no birth year in date of birth {value:?}")]
    BirthYear { value: String },
    #[error("season {year}: {source}")]
    Season {
        year: i32,
        #[source]
        source: NormalizeError,
    },
    #[error(transparent)]
    Adapter(#[from] AdapterError),
}

fn totals_region(role: Role) -> &'static str {
    match role {
        Role::Goaltender => selectors::GOALTENDER_TOTALS,
        Role::Skater => selectors::SKATER_TOTALS,
    }
}

fn levels_region(role: Role) -> &'static str {
    match role {
        Role::Goaltender => selectors::GOALTENDER_LEVELS,
        Role::Skater => selectors::SKATER_LEVELS,
    }
}

/// Reads one player's career from the profile pages.
#[derive(Debug, Clone)]
pub struct CareerWalker {
    rules: LevelRules,
    policy: LevelRetryPolicy,
    current_year: i32,
}

impl CareerWalker {
    pub fn new(rules: LevelRules, policy: LevelRetryPolicy, current_year: i32) -> Self {
        Self {
            rules,
            policy,
            current_year,
        }
    }

    pub fn current_year(&self) -> i32 {
        self.current_year
    }

    pub async fn walk<S>(&self, session: &mut S, seed: &PlayerSeed) -> Result<Career, WalkError>
    where
        S: PageSession + ?Sized,
    {
        session.fetch(&seed.sjl_link).await?;
        session
            .wait_until_visible(selectors::PERSONAL_DETAILS, self.policy.profile_timeout)
            .await?;

        let position = match session.text(selectors::POSITION).await {
            Ok(markup) => parse_position_label(&markup)
                .inspect_err(|err| debug!(player = %seed.sjl_name, error = %err, "position unreadable"))
                .ok(),
            Err(err) if err.is_not_found() => None,
            Err(err) => return Err(err.into()),
        };

        let (role, birth_year, start_year) = match position {
            Some(label) => {
                let role = Role::from_position_label(&label).ok_or_else(|| WalkError::AmbiguousRole {
                    reason: format!("unknown position {label:?}"),
                })?;
                let details = session.text(selectors::PERSONAL_DETAILS).await?;
                let date = parse_date_of_birth(&details)?;
                let birth_year = birth_year_from_date(&date).ok_or(WalkError::BirthYear { value: date })?;
                (role, birth_year, self.current_year)
            }
            None => {
                info!(player = %seed.sjl_name, "no current-season profile, scanning for last active season");
                self.find_last_active_season(session).await?
            }
        };

        let mut seasons = Vec::new();
        for year in seasons_to_walk(birth_year, start_year) {
            seasons.push(self.scrape_season(session, year, role).await?);
        }
        info!(player = %seed.sjl_name, %role, birth_year, seasons = seasons.len(), "career walked");

        Ok(Career {
            seed: seed.clone(),
            birth_year,
            role,
            seasons,
        })
    }

    /// Returns role, inferred birth year and the last season with team data.
    async fn find_last_active_season<S>(&self, session: &mut S) -> Result<(Role, i32, i32), WalkError>
    where
        S: PageSession + ?Sized,
    {
        for season in seasons_to_walk(RETIRED_SCAN_BIRTH_YEAR, self.current_year) {
            session
                .select_option(selectors::SEASON_SELECT, &season.to_string())
                .await?;
            tokio::time::sleep(self.policy.retired_settle).await;

            let teams = match session.text(selectors::SEASON_TEAMS).await {
                Ok(markup) => markup,
                Err(err) if err.is_not_found() => String::new(),
                Err(err) => return Err(err.into()),
            };
            if !region_has_content(&teams) {
                debug!(season, "no teams listed");
                continue;
            }

            let role = self.visible_role(session).await?;
            let age = parse_player_age(&session.text(selectors::PLAYER_AGE).await?)?;
            let birth_year = self.current_year - age;
            info!(season, %role, birth_year, "last active season found");
            return Ok((role, birth_year, season));
        }
        Err(WalkError::NoActiveSeason)
    }

    async fn visible_role<S>(&self, session: &mut S) -> Result<Role, WalkError>
    where
        S: PageSession + ?Sized,
    {
        let goaltender = session
            .wait_until_visible(selectors::GOALTENDER_ROLE_MARKER, Duration::ZERO)
            .await?;
        let skater = session
            .wait_until_visible(selectors::SKATER_ROLE_MARKER, Duration::ZERO)
            .await?;
        match (goaltender, skater) {
            (true, false) => Ok(Role::Goaltender),
            (false, true) => Ok(Role::Skater),
            (true, true) => Err(WalkError::AmbiguousRole {
                reason: "both goaltender and skater stats are shown".to_string(),
            }),
            (false, false) => Err(WalkError::AmbiguousRole {
                reason: "neither goaltender nor skater stats are shown".to_string(),
            }),
        }
    }

    /// Re-reads one season of a stored player, e.g. the current one during a refresh.
    pub async fn rescrape_season<S>(
        &self,
        session: &mut S,
        sjl_link: &str,
        year: i32,
        role: Role,
    ) -> Result<CareerSeason, WalkError>
    where
        S: PageSession + ?Sized,
    {
        session.fetch(sjl_link).await?;
        self.scrape_season(session, year, role).await
    }

    pub async fn scrape_season<S>(&self, session: &mut S, year: i32, role: Role) -> Result<CareerSeason, WalkError>
    where
        S: PageSession + ?Sized,
    {
        session
            .select_option(selectors::SEASON_SELECT, &year.to_string())
            .await?;
        tokio::time::sleep(self.policy.settle).await;

        let (totals, totals_observed) = match self.read_totals(session, year, role).await? {
            Some(totals) => (totals, true),
            None => {
                debug!(year, %role, "totals unavailable, recording zeroes");
                (SeasonTotals::zeroed(role), false)
            }
        };

        let raw_levels = self.read_levels(session, year, role).await?;
        let levels = raw_levels
            .iter()
            .map(|raw| normalize_level_row(raw, &self.rules))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|source| WalkError::Season { year, source })?;

        Ok(CareerSeason {
            year,
            totals,
            totals_observed,
            levels,
        })
    }

    async fn read_totals<S>(&self, session: &mut S, year: i32, role: Role) -> Result<Option<SeasonTotals>, WalkError>
    where
        S: PageSession + ?Sized,
    {
        let markup = match session.text(totals_region(role)).await {
            Ok(markup) => markup,
            Err(err) if err.is_not_found() => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let raw = match parse_totals(&markup, role) {
            Ok(raw) => raw,
            Err(err) => {
                debug!(error = %err, "totals region unreadable");
                return Ok(None);
            }
        };
        normalize_totals(&raw)
            .map(Some)
            .map_err(|source| WalkError::Season { year, source })
    }

    async fn read_levels<S>(&self, session: &mut S, year: i32, role: Role) -> Result<Vec<LevelRowRaw>, WalkError>
    where
        S: PageSession + ?Sized,
    {
        let attempts = self.policy.attempts_for(role);
        for attempt in 1..=attempts {
            let rows = match session.text(levels_region(role)).await {
                Ok(markup) => parse_levels(&markup, role)?,
                Err(err) if err.is_not_found() => Vec::new(),
                Err(err) => return Err(err.into()),
            };
            if !rows.is_empty() {
                debug!(year, attempt, rows = rows.len(), "level rows read");
                return Ok(rows);
            }
            if attempt < attempts {
                tokio::time::sleep(self.policy.pause).await;
            }
        }
        warn!(year, %role, attempts, "no level rows after retries, recording none");
        Ok(Vec::new())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use rinkstat_adapters::{FixturePage, FixtureSession, FixtureSet};

    pub const YEAR: i32 = 2025;

    pub fn profile(label: &str) -> FixturePage {
        FixturePage::new()
            .region(
                selectors::PERSONAL_DETAILS,
                r#"<div class="pcm-basic-col"><div id="pcm-player-dob">14.02.2010</div></div>"#,
            )
            .region(
                selectors::POSITION,
                format!(r#"<table><tr><td class="person-position">Pelipaikka {label}</td></tr></table>"#),
            )
    }

    pub fn skater_totals(games: u32) -> String {
        format!(
            r#"<div id="psac-all-skater-stats-container">
                <div id="pcas-skater-games">{games}</div><div id="pcas-skater-goals">4</div>
                <div id="pcas-skater-assists">5</div><div id="pcas-skater-points">9</div>
                <div id="pcas-skater-penalty-minutes">2</div><div id="pcas-skater-goals-pp">1</div>
                <div id="pcas-skater-goals-sh">0</div><div id="pcas-skater-goals-ws">-</div>
            </div>"#
        )
    }

    pub fn goaltender_totals() -> String {
        r#"<div id="pcm-all-stats-container">
            <div id="pcas-goalie-games">8</div><div id="pcas-goalie-played-games">7</div>
            <div id="pcas-goalie-goals-against">15</div><div id="pcas-goalie-toi">420:00</div>
            <div id="pcas-goalie-gaa">2,14</div>
        </div>"#
            .to_string()
    }

    pub fn level_rows(container: &str, rows: &[(&str, &str, u32)]) -> String {
        let body: String = rows
            .iter()
            .map(|(team, level, games)| {
                format!(
                    r#"<div class="pcss-level-title-row">
                        <div class="pcss-level-team-name-col">{team}</div>
                        <div class="pcss-level-name-col">{level}</div>
                        <div class="pcss-level-stat-col">{games}</div><div class="pcss-level-stat-col">1</div>
                        <div class="pcss-level-stat-col">2</div><div class="pcss-level-stat-col">3</div>
                        <div class="pcss-level-stat-col">0</div>
                    </div>"#
                )
            })
            .collect();
        format!(r#"<div id="{container}">{body}</div>"#)
    }

    pub fn walker() -> CareerWalker {
        CareerWalker::new(LevelRules::builtin(), LevelRetryPolicy::immediate(), YEAR)
    }

    pub fn seed(link: &str) -> PlayerSeed {
        PlayerSeed {
            sjl_name: "LAINE Eetu".into(),
            ep_name: "Eetu Laine".into(),
            sjl_link: link.into(),
        }
    }

    #[test]
    fn season_window_is_bounded_by_age_and_cap() {
        assert_eq!(seasons_to_walk(2010, 2025), vec![2025, 2024, 2023]);
        assert_eq!(seasons_to_walk(2000, 2025).len(), MAX_SEASONS);
        assert_eq!(seasons_to_walk(2000, 2025).last(), Some(&2016));
        assert!(seasons_to_walk(2013, 2025).is_empty());
        for birth in 1990..2020 {
            let expected = (YEAR - birth - MIN_PLAYING_AGE + 1).clamp(0, MAX_SEASONS as i32) as usize;
            assert_eq!(seasons_to_walk(birth, YEAR).len(), expected, "born {birth}");
        }
    }

    #[tokio::test]
    async fn active_skater_career_is_walked() {
        let link = "https://example.test/pelaaja/10";
        let page = profile("Hyökkääjä")
            .season_region(YEAR, selectors::SKATER_TOTALS, skater_totals(12))
            .season_region(
                YEAR,
                selectors::SKATER_LEVELS,
                level_rows(
                    "pcss-skater-serie-stats-series-container",
                    &[("Tappara, sininen", "U16 AAA", 10), ("Tappara", "Harjoitusottelut", 2)],
                ),
            )
            .season_region(2024, selectors::SKATER_TOTALS, skater_totals(20))
            .season_region(
                2024,
                selectors::SKATER_LEVELS,
                level_rows("pcss-skater-serie-stats-series-container", &[("Tappara", "U15 AA", 20)]),
            )
            .empty_reads(selectors::SKATER_LEVELS, 2);
        let mut session = FixtureSession::new(FixtureSet::new().page(link, page));

        let career = walker().walk(&mut session, &seed(link)).await.unwrap();
        assert_eq!(career.role, Role::Skater);
        assert_eq!(career.birth_year, 2010);
        let years: Vec<i32> = career.seasons.iter().map(|s| s.year).collect();
        assert_eq!(years, vec![2025, 2024, 2023]);

        let current = &career.seasons[0];
        assert_eq!(current.totals.games(), 12);
        assert_eq!(current.levels.len(), 2);
        assert_eq!(current.levels[0].club.as_deref(), Some("Tappara"));
        assert_eq!(current.levels[1].age_group, None);

        assert!(current.totals_observed);

        // 2023 has no regions at all: zero totals, no levels.
        assert_eq!(career.seasons[2].totals, SeasonTotals::zeroed(Role::Skater));
        assert!(!career.seasons[2].totals_observed);
        assert!(career.seasons[2].levels.is_empty());
    }

    #[tokio::test]
    async fn exhausted_level_retries_record_no_levels() {
        let link = "https://example.test/pelaaja/11";
        let page = profile("Maalivahti")
            .season_region(YEAR, selectors::GOALTENDER_TOTALS, goaltender_totals())
            .season_region(
                YEAR,
                selectors::GOALTENDER_LEVELS,
                level_rows("pcss-goalie-serie-stats-series-container", &[("Ilves", "U16 AA", 8)]),
            )
            .empty_reads(selectors::GOALTENDER_LEVELS, 100);
        let mut session = FixtureSession::new(FixtureSet::new().page(link, page));

        let season = walker().rescrape_season(&mut session, link, YEAR, Role::Goaltender).await.unwrap();
        assert!(season.levels.is_empty());
        assert_eq!(season.totals.games(), 8);
        assert_eq!(session.read_count(selectors::GOALTENDER_LEVELS), 30);
    }

    #[tokio::test]
    async fn retired_player_is_found_by_backward_scan() {
        let link = "https://example.test/pelaaja/12";
        let page = FixturePage::new()
            .region(selectors::PERSONAL_DETAILS, r#"<div class="pcm-basic-col"></div>"#)
            .region(selectors::SEASON_TEAMS, r#"<div id="pcss-player-season-teams"></div>"#)
            .region(selectors::PLAYER_AGE, r#"<span id="pcm-player-age">19</span>"#)
            .season_region(2022, selectors::SEASON_TEAMS, r#"<div id="pcss-player-season-teams"><a>KooKoo</a></div>"#)
            .season_region(2022, selectors::GOALTENDER_ROLE_MARKER, r#"<div id="psac-all-goalie-stats-container">x</div>"#)
            .season_region(2022, selectors::GOALTENDER_TOTALS, goaltender_totals());
        let mut session = FixtureSession::new(FixtureSet::new().page(link, page));

        let career = walker().walk(&mut session, &seed(link)).await.unwrap();
        assert_eq!(career.role, Role::Goaltender);
        assert_eq!(career.birth_year, YEAR - 19);
        let years: Vec<i32> = career.seasons.iter().map(|s| s.year).collect();
        assert_eq!(years, seasons_to_walk(YEAR - 19, 2022));
        assert_eq!(career.seasons[0].totals.games(), 8);
    }

    #[tokio::test]
    async fn retired_player_with_both_markers_is_ambiguous() {
        let link = "https://example.test/pelaaja/13";
        let page = FixturePage::new()
            .region(selectors::PLAYER_AGE, r#"<span id="pcm-player-age">20</span>"#)
            .season_region(YEAR, selectors::SEASON_TEAMS, r#"<div id="pcss-player-season-teams">Lukko</div>"#)
            .season_region(YEAR, selectors::GOALTENDER_ROLE_MARKER, r#"<div>x</div>"#)
            .season_region(YEAR, selectors::SKATER_ROLE_MARKER, r#"<div>y</div>"#);
        let mut session = FixtureSession::new(FixtureSet::new().page(link, page));

        let err = walker().walk(&mut session, &seed(link)).await.unwrap_err();
        assert!(matches!(err, WalkError::AmbiguousRole { .. }));
    }

    #[tokio::test]
    async fn retired_player_without_any_season_fails() {
        let link = "https://example.test/pelaaja/14";
        let mut session = FixtureSession::new(FixtureSet::new().page(link, FixturePage::new()));
        let err = walker().walk(&mut session, &seed(link)).await.unwrap_err();
        assert!(matches!(err, WalkError::NoActiveSeason));
    }

    #[tokio::test]
    async fn unknown_position_is_ambiguous() {
        let link = "https://example.test/pelaaja/15";
        let mut session = FixtureSession::new(FixtureSet::new().page(link, profile("Valmentaja")));
        let err = walker().walk(&mut session, &seed(link)).await.unwrap_err();
        assert!(matches!(err, WalkError::AmbiguousRole { reason } if reason.contains("Valmentaja")));
    }

    #[tokio::test]
    async fn unlabeled_position_falls_back_to_backward_scan() {
        let link = "https://example.test/pelaaja/17";
        let page = FixturePage::new()
            .region(
                selectors::POSITION,
                r#"<table><tr><td class="person-position">Pelipaikka</td></tr></table>"#,
            )
            .region(selectors::PLAYER_AGE, r#"<span id="pcm-player-age">18</span>"#)
            .season_region(2024, selectors::SEASON_TEAMS, r#"<div id="pcss-player-season-teams"><a>Lukko</a></div>"#)
            .season_region(2024, selectors::SKATER_ROLE_MARKER, skater_totals(6))
            .season_region(2024, selectors::SKATER_TOTALS, skater_totals(6));
        let mut session = FixtureSession::new(FixtureSet::new().page(link, page));

        let career = walker().walk(&mut session, &seed(link)).await.unwrap();
        assert_eq!(career.role, Role::Skater);
        assert_eq!(career.birth_year, YEAR - 18);
        assert_eq!(career.seasons[0].year, 2024);
        assert_eq!(career.seasons[0].totals.games(), 6);
    }

    #[tokio::test]
    async fn unparseable_level_label_fails_the_season() {
        let link = "https://example.test/pelaaja/16";
        let page = profile("Puolustaja").season_region(
            YEAR,
            selectors::SKATER_LEVELS,
            level_rows("pcss-skater-serie-stats-series-container", &[("HPK", "Mestis", 3)]),
        );
        let mut session = FixtureSession::new(FixtureSet::new().page(link, page));
        let err = walker().walk(&mut session, &seed(link)).await.unwrap_err();
        assert!(matches!(
            err,
            WalkError::Season { year: YEAR, source: NormalizeError::UnparseableLevelLabel { .. } }
        ));
    }
}
