use std::collections::{HashMap, VecDeque};

use rinkstat_core::{
    CareerSeason, DimensionKind, LevelKey, NewSeasonLevel, Role, RowId, SeasonLevelEntry, SeasonLevelRow, SeasonRow,
};
use rinkstat_storage::{StoreError, StoreTx};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::resolver::DimensionResolver;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("season {season_id} is stored as {stored} but was scraped as {scraped}")]
    RoleMismatch {
        season_id: RowId,
        stored: Role,
        scraped: Role,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ReconcileError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, ReconcileError::Store(err) if err.is_conflict())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileOutcome {
    pub updated: usize,
    pub inserted: usize,
    pub unchanged: usize,
    /// Season totals were rewritten.
    pub season_refreshed: bool,
}

/// Decision for one freshly scraped entry.
#[derive(Debug, Clone, PartialEq)]
pub enum LevelAction<'a> {
    Update {
        row: &'a SeasonLevelRow,
        entry: &'a SeasonLevelEntry,
    },
    Unchanged {
        row: &'a SeasonLevelRow,
    },
    Insert {
        entry: &'a SeasonLevelEntry,
    },
}

/// Matches fresh entries to stored rows by (level, age group).
///
/// Stored rows sharing a key are consumed oldest first, one per fresh entry
/// with that key; fresh entries left over once their key is exhausted become
/// inserts. A matched row is updated only when its game count differs.
pub fn plan_reconciliation<'a>(
    stored: &'a [(LevelKey, SeasonLevelRow)],
    fresh: &'a [SeasonLevelEntry],
) -> Vec<LevelAction<'a>> {
    let mut sorted: Vec<&(LevelKey, SeasonLevelRow)> = stored.iter().collect();
    sorted.sort_by_key(|(_, row)| row.id);

    let mut index: HashMap<&LevelKey, VecDeque<&SeasonLevelRow>> = HashMap::new();
    for (key, row) in sorted {
        index.entry(key).or_default().push_back(row);
    }

    fresh
        .iter()
        .map(|entry| {
            let key = entry.key();
            match index.get_mut(&key).and_then(VecDeque::pop_front) {
                Some(row) if row.stats.games() != entry.stats.games() => LevelAction::Update { row, entry },
                Some(row) => LevelAction::Unchanged { row },
                None => LevelAction::Insert { entry },
            }
        })
        .collect()
}

async fn dimension_name(
    tx: &mut (dyn StoreTx + '_),
    names: &mut HashMap<(DimensionKind, RowId), String>,
    kind: DimensionKind,
    id: RowId,
) -> Result<String, StoreError> {
    if let Some(name) = names.get(&(kind, id)) {
        return Ok(name.clone());
    }
    let row = tx
        .dimension_by_id(kind, id)
        .await?
        .ok_or(StoreError::Missing { entity: kind.table(), id })?;
    names.insert((kind, id), row.name.clone());
    Ok(row.name)
}

/// Stored level rows of `season` keyed by their level and age group names.
async fn stored_keys(
    tx: &mut (dyn StoreTx + '_),
    season: &SeasonRow,
) -> Result<Vec<(LevelKey, SeasonLevelRow)>, StoreError> {
    let rows = tx.season_levels_for_season(season).await?;
    let mut names = HashMap::new();
    let mut keyed = Vec::with_capacity(rows.len());
    for row in rows {
        let level = dimension_name(tx, &mut names, DimensionKind::Level, row.level_id).await?;
        let age_group = dimension_name(tx, &mut names, DimensionKind::AgeGroup, row.age_group_id).await?;
        keyed.push((LevelKey { level, age_group }, row));
    }
    Ok(keyed)
}

/// Brings one stored season in line with a fresh scrape of the same season.
pub async fn reconcile_season(
    tx: &mut (dyn StoreTx + '_),
    resolver: &mut DimensionResolver,
    season: &SeasonRow,
    fresh: &CareerSeason,
) -> Result<ReconcileOutcome, ReconcileError> {
    let scraped = fresh.totals.role();
    let mismatch = fresh.levels.iter().any(|entry| entry.stats.role() != season.role());
    if scraped != season.role() || mismatch {
        return Err(ReconcileError::RoleMismatch {
            season_id: season.id,
            stored: season.role(),
            scraped,
        });
    }

    let stored = stored_keys(tx, season).await?;
    let mut outcome = ReconcileOutcome::default();
    for action in plan_reconciliation(&stored, &fresh.levels) {
        match action {
            LevelAction::Update { row, entry } => {
                debug!(row = row.id, key = %entry.key(), from = row.stats.games(), to = entry.stats.games(), "updating level");
                tx.update_season_level_stats(row, &entry.stats).await?;
                outcome.updated += 1;
            }
            LevelAction::Unchanged { .. } => outcome.unchanged += 1,
            LevelAction::Insert { entry } => {
                let ids = resolver.resolve_entry(tx, entry).await?;
                tx.create_season_level(&NewSeasonLevel {
                    season_id: season.id,
                    player_id: season.player_id,
                    club_id: ids.club_id,
                    level_id: ids.level_id,
                    age_group_id: ids.age_group_id,
                    stats: entry.stats,
                })
                .await?;
                outcome.inserted += 1;
            }
        }
    }

    if !fresh.totals_observed {
        debug!(season = season.id, "totals not rendered, keeping stored values");
    } else if season.totals != fresh.totals {
        tx.update_season_totals(season, &fresh.totals).await?;
        outcome.season_refreshed = true;
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rinkstat_core::{GoaltenderTotals, LevelStats, PlayerSeed, SeasonTotals, SkaterLevelStats, SkaterTotals};
    use rinkstat_storage::{CareerStore, MemoryStore};

    fn entry(level: &str, age_group: Option<&str>, games: i32) -> SeasonLevelEntry {
        SeasonLevelEntry {
            team_label: "Pelicans".into(),
            level_label: format!("{} {level}", age_group.unwrap_or_default()),
            club: Some("Pelicans".into()),
            level: level.into(),
            age_group: age_group.map(str::to_string),
            stats: LevelStats::Skater(SkaterLevelStats {
                games,
                ..Default::default()
            }),
        }
    }

    fn row(id: RowId, games: i32) -> SeasonLevelRow {
        SeasonLevelRow {
            id,
            season_id: 1,
            player_id: 1,
            club_id: 1,
            level_id: 1,
            age_group_id: 1,
            stats: LevelStats::Skater(SkaterLevelStats {
                games,
                ..Default::default()
            }),
        }
    }

    fn totals(games: i32) -> SeasonTotals {
        SeasonTotals::Skater(SkaterTotals {
            games,
            ..Default::default()
        })
    }

    #[test]
    fn changed_game_count_plans_one_update() {
        let stored = vec![(LevelKey::new("AAA", Some("U16")), row(7, 10))];
        let fresh = vec![entry("AAA", Some("U16"), 12)];
        let plan = plan_reconciliation(&stored, &fresh);
        assert_eq!(plan.len(), 1);
        assert!(matches!(plan[0], LevelAction::Update { row, .. } if row.id == 7));
    }

    #[test]
    fn repeated_keys_consume_stored_rows_in_order() {
        let stored = vec![
            (LevelKey::new("AA", Some("U14")), row(9, 4)),
            (LevelKey::new("AA", Some("U14")), row(3, 2)),
        ];
        let fresh = vec![
            entry("AA", Some("U14"), 2),
            entry("AA", Some("U14"), 5),
            entry("AA", Some("U14"), 1),
        ];
        let plan = plan_reconciliation(&stored, &fresh);
        assert!(matches!(plan[0], LevelAction::Unchanged { row } if row.id == 3));
        assert!(matches!(plan[1], LevelAction::Update { row, .. } if row.id == 9));
        assert!(matches!(plan[2], LevelAction::Insert { .. }));
    }

    #[test]
    fn undefined_age_group_matches_placeholder_key() {
        let stored = vec![(LevelKey::new("Harjoitusottelut", None), row(1, 3))];
        let fresh = vec![entry("Harjoitusottelut", None, 3)];
        assert!(matches!(
            plan_reconciliation(&stored, &fresh)[0],
            LevelAction::Unchanged { .. }
        ));
    }

    async fn stored_season(store: &MemoryStore, levels: &[SeasonLevelEntry]) -> SeasonRow {
        let mut tx = store.begin().await.unwrap();
        let seed = PlayerSeed {
            sjl_name: "NIEMI Otto".into(),
            ep_name: "Otto Niemi".into(),
            sjl_link: "p/1".into(),
        };
        let player = tx.create_player(&seed, 2009, Role::Skater).await.unwrap();
        let season = tx.create_season(player.id, 2025, &totals(10)).await.unwrap();
        let mut resolver = DimensionResolver::new();
        for level in levels {
            let ids = resolver.resolve_entry(tx.as_mut(), level).await.unwrap();
            tx.create_season_level(&NewSeasonLevel {
                season_id: season.id,
                player_id: player.id,
                club_id: ids.club_id,
                level_id: ids.level_id,
                age_group_id: ids.age_group_id,
                stats: level.stats,
            })
            .await
            .unwrap();
        }
        tx.commit().await.unwrap();
        season
    }

    async fn reconcile(store: &MemoryStore, season: &SeasonRow, fresh: &CareerSeason) -> ReconcileOutcome {
        let mut tx = store.begin().await.unwrap();
        let season = tx
            .seasons_for_player(season.player_id)
            .await
            .unwrap()
            .into_iter()
            .find(|s| s.id == season.id)
            .unwrap();
        let mut resolver = DimensionResolver::new();
        let outcome = reconcile_season(tx.as_mut(), &mut resolver, &season, fresh).await.unwrap();
        tx.commit().await.unwrap();
        outcome
    }

    #[tokio::test]
    async fn update_then_identical_pass_is_a_no_op() {
        let store = MemoryStore::new();
        let season = stored_season(&store, &[entry("AAA", Some("U16"), 10)]).await;
        let fresh = CareerSeason {
            year: 2025,
            totals: totals(14),
            totals_observed: true,
            levels: vec![entry("AAA", Some("U16"), 12), entry("Harjoitusottelut", None, 2)],
        };

        let first = reconcile(&store, &season, &fresh).await;
        assert_eq!(
            first,
            ReconcileOutcome {
                updated: 1,
                inserted: 1,
                unchanged: 0,
                season_refreshed: true,
            }
        );
        let games: Vec<i32> = store.season_levels().await.iter().map(|r| r.stats.games()).collect();
        assert_eq!(games, vec![12, 2]);

        let second = reconcile(&store, &season, &fresh).await;
        assert_eq!(
            second,
            ReconcileOutcome {
                updated: 0,
                inserted: 0,
                unchanged: 2,
                season_refreshed: false,
            }
        );
        assert_eq!(store.counts().await.season_levels, 2);
    }

    #[tokio::test]
    async fn unrendered_totals_keep_stored_values() {
        let store = MemoryStore::new();
        let season = stored_season(&store, &[entry("AAA", Some("U16"), 10)]).await;
        let fresh = CareerSeason {
            year: 2025,
            totals: SeasonTotals::zeroed(Role::Skater),
            totals_observed: false,
            levels: vec![entry("AAA", Some("U16"), 10)],
        };

        let outcome = reconcile(&store, &season, &fresh).await;
        assert!(!outcome.season_refreshed);
        assert_eq!(outcome.unchanged, 1);
        let mut tx = store.begin().await.unwrap();
        let stored = tx.seasons_for_year(2025).await.unwrap();
        assert_eq!(stored[0].totals.games(), 10);
    }

    #[tokio::test]
    async fn role_mismatch_is_rejected() {
        let store = MemoryStore::new();
        let season = stored_season(&store, &[]).await;
        let fresh = CareerSeason {
            year: 2025,
            totals: SeasonTotals::Goaltender(GoaltenderTotals::default()),
            totals_observed: true,
            levels: Vec::new(),
        };
        let mut tx = store.begin().await.unwrap();
        let err = reconcile_season(tx.as_mut(), &mut DimensionResolver::new(), &season, &fresh)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ReconcileError::RoleMismatch {
                stored: Role::Skater,
                scraped: Role::Goaltender,
                ..
            }
        ));
    }
}
