use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use rinkstat_core::{
    DimensionKind, DimensionRow, LevelStats, NewSeasonLevel, PlayerRow, PlayerSeed, Role, RowId,
    SeasonLevelRow, SeasonRow, SeasonTotals,
};
use tokio::sync::Mutex;

use crate::{CareerStore, StoreError, StoreTx};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    version: u64,
    next_id: RowId,
    players: BTreeMap<RowId, PlayerRow>,
    seasons: BTreeMap<RowId, SeasonRow>,
    season_levels: BTreeMap<RowId, SeasonLevelRow>,
    dimensions: BTreeMap<RowId, DimensionRow>,
}

impl MemoryState {
    fn allocate_id(&mut self) -> RowId {
        self.next_id += 1;
        self.next_id
    }

    fn counts(&self) -> StoreCounts {
        let dims = |kind: DimensionKind| self.dimensions.values().filter(|d| d.kind == kind).count();
        StoreCounts {
            players: self.players.len(),
            seasons: self.seasons.len(),
            season_levels: self.season_levels.len(),
            clubs: dims(DimensionKind::Club),
            levels: dims(DimensionKind::Level),
            age_groups: dims(DimensionKind::AgeGroup),
        }
    }
}

/// Row counts per table, for inspection in tests and dry runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreCounts {
    pub players: usize,
    pub seasons: usize,
    pub season_levels: usize,
    pub clubs: usize,
    pub levels: usize,
    pub age_groups: usize,
}

/// Snapshot-isolated in-memory store.
///
/// Each transaction works on a private copy of the state. Commit succeeds only
/// if nothing else committed since the transaction began; otherwise it fails
/// with [`StoreError::Conflict`] and the caller retries the whole unit.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn counts(&self) -> StoreCounts {
        self.state.lock().await.counts()
    }

    pub async fn season_levels(&self) -> Vec<SeasonLevelRow> {
        self.state.lock().await.season_levels.values().cloned().collect()
    }

    pub async fn dimensions(&self, kind: DimensionKind) -> Vec<DimensionRow> {
        self.state
            .lock()
            .await
            .dimensions
            .values()
            .filter(|d| d.kind == kind)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl CareerStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx + '_>, StoreError> {
        let working = self.state.lock().await.clone();
        Ok(Box::new(MemoryTx {
            shared: Arc::clone(&self.state),
            base_version: working.version,
            working,
        }))
    }
}

struct MemoryTx {
    shared: Arc<Mutex<MemoryState>>,
    base_version: u64,
    working: MemoryState,
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn create_player(
        &mut self,
        seed: &PlayerSeed,
        birth_year: i32,
        role: Role,
    ) -> Result<PlayerRow, StoreError> {
        if self.working.players.values().any(|p| p.sjl_link == seed.sjl_link) {
            return Err(StoreError::Conflict {
                entity: "player",
                detail: format!("sjl_link {} already stored", seed.sjl_link),
            });
        }
        let row = PlayerRow {
            id: self.working.allocate_id(),
            sjl_name: seed.sjl_name.clone(),
            ep_name: seed.ep_name.clone(),
            sjl_link: seed.sjl_link.clone(),
            birth_year,
            role,
        };
        self.working.players.insert(row.id, row.clone());
        Ok(row)
    }

    async fn player_by_id(&mut self, id: RowId) -> Result<Option<PlayerRow>, StoreError> {
        Ok(self.working.players.get(&id).cloned())
    }

    async fn player_by_link(&mut self, sjl_link: &str) -> Result<Option<PlayerRow>, StoreError> {
        Ok(self
            .working
            .players
            .values()
            .find(|p| p.sjl_link == sjl_link)
            .cloned())
    }

    async fn create_season(
        &mut self,
        player_id: RowId,
        year: i32,
        totals: &SeasonTotals,
    ) -> Result<SeasonRow, StoreError> {
        if !self.working.players.contains_key(&player_id) {
            return Err(StoreError::Missing { entity: "player", id: player_id });
        }
        if self
            .working
            .seasons
            .values()
            .any(|s| s.player_id == player_id && s.year == year)
        {
            return Err(StoreError::Conflict {
                entity: "season",
                detail: format!("player {player_id} already has season {year}"),
            });
        }
        let row = SeasonRow {
            id: self.working.allocate_id(),
            player_id,
            year,
            totals: *totals,
        };
        self.working.seasons.insert(row.id, row.clone());
        Ok(row)
    }

    async fn update_season_totals(&mut self, season: &SeasonRow, totals: &SeasonTotals) -> Result<(), StoreError> {
        let stored = self
            .working
            .seasons
            .get_mut(&season.id)
            .ok_or(StoreError::Missing { entity: "season", id: season.id })?;
        if stored.totals.role() != totals.role() {
            return Err(StoreError::Corrupt {
                table: "seasons",
                detail: format!("season {} is {}, got {} totals", season.id, stored.role(), totals.role()),
            });
        }
        stored.totals = *totals;
        Ok(())
    }

    async fn seasons_for_year(&mut self, year: i32) -> Result<Vec<SeasonRow>, StoreError> {
        Ok(self
            .working
            .seasons
            .values()
            .filter(|s| s.year == year)
            .cloned()
            .collect())
    }

    async fn seasons_for_player(&mut self, player_id: RowId) -> Result<Vec<SeasonRow>, StoreError> {
        Ok(self
            .working
            .seasons
            .values()
            .filter(|s| s.player_id == player_id)
            .cloned()
            .collect())
    }

    async fn create_season_level(&mut self, new: &NewSeasonLevel) -> Result<SeasonLevelRow, StoreError> {
        let season = self
            .working
            .seasons
            .get(&new.season_id)
            .ok_or(StoreError::Missing { entity: "season", id: new.season_id })?;
        if season.role() != new.stats.role() {
            return Err(StoreError::Corrupt {
                table: "season_levels",
                detail: format!("{} stats for {} season {}", new.stats.role(), season.role(), season.id),
            });
        }
        for (kind, id) in [
            (DimensionKind::Club, new.club_id),
            (DimensionKind::Level, new.level_id),
            (DimensionKind::AgeGroup, new.age_group_id),
        ] {
            if !self.working.dimensions.get(&id).is_some_and(|d| d.kind == kind) {
                return Err(StoreError::Missing { entity: "dimension", id });
            }
        }
        let row = SeasonLevelRow {
            id: self.working.allocate_id(),
            season_id: new.season_id,
            player_id: new.player_id,
            club_id: new.club_id,
            level_id: new.level_id,
            age_group_id: new.age_group_id,
            stats: new.stats,
        };
        self.working.season_levels.insert(row.id, row.clone());
        Ok(row)
    }

    async fn update_season_level_stats(&mut self, row: &SeasonLevelRow, stats: &LevelStats) -> Result<(), StoreError> {
        let stored = self
            .working
            .season_levels
            .get_mut(&row.id)
            .ok_or(StoreError::Missing { entity: "season level", id: row.id })?;
        if stored.stats.role() != stats.role() {
            return Err(StoreError::Corrupt {
                table: "season_levels",
                detail: format!("row {} is {}, got {} stats", row.id, stored.stats.role(), stats.role()),
            });
        }
        stored.stats = *stats;
        Ok(())
    }

    async fn season_levels_for_season(&mut self, season: &SeasonRow) -> Result<Vec<SeasonLevelRow>, StoreError> {
        Ok(self
            .working
            .season_levels
            .values()
            .filter(|l| l.season_id == season.id)
            .cloned()
            .collect())
    }

    async fn dimension_by_id(&mut self, kind: DimensionKind, id: RowId) -> Result<Option<DimensionRow>, StoreError> {
        Ok(self
            .working
            .dimensions
            .get(&id)
            .filter(|d| d.kind == kind)
            .cloned())
    }

    async fn dimension_by_name(
        &mut self,
        kind: DimensionKind,
        name: &str,
    ) -> Result<Option<DimensionRow>, StoreError> {
        Ok(self
            .working
            .dimensions
            .values()
            .find(|d| d.kind == kind && d.name == name)
            .cloned())
    }

    async fn create_dimension(&mut self, kind: DimensionKind, name: &str) -> Result<DimensionRow, StoreError> {
        if self
            .working
            .dimensions
            .values()
            .any(|d| d.kind == kind && d.name == name)
        {
            return Err(StoreError::Conflict {
                entity: "dimension",
                detail: format!("{kind} {name:?} already exists"),
            });
        }
        let row = DimensionRow {
            id: self.working.allocate_id(),
            kind,
            name: name.to_string(),
        };
        self.working.dimensions.insert(row.id, row.clone());
        Ok(row)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryTx {
            shared,
            base_version,
            mut working,
        } = *self;
        let mut state = shared.lock().await;
        if state.version != base_version {
            return Err(StoreError::Conflict {
                entity: "transaction",
                detail: format!("store moved from version {base_version} to {}", state.version),
            });
        }
        working.version = base_version + 1;
        *state = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}
