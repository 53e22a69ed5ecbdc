//! Persistence contracts, store implementations and HTTP fetch utilities for rinkstat.

mod http;
mod memory;
mod postgres;

use async_trait::async_trait;
use rinkstat_core::{
    DimensionKind, DimensionRow, LevelStats, NewSeasonLevel, PlayerRow, PlayerSeed, Role, RowId,
    SeasonLevelRow, SeasonRow, SeasonTotals,
};
use thiserror::Error;

pub use http::{
    classify_reqwest_error, classify_status, BackoffPolicy, FetchError, FetchedResponse, HttpClientConfig,
    HttpFetcher, RetryDisposition,
};
pub use memory::{MemoryStore, StoreCounts};
pub use postgres::PgCareerStore;

pub const CRATE_NAME: &str = "rinkstat-storage";

#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique constraint or a concurrent commit rejected the write.
    #[error("conflict writing {entity}: {detail}")]
    Conflict { entity: &'static str, detail: String },
    #[error("{entity} {id} not found")]
    Missing { entity: &'static str, id: RowId },
    #[error("corrupt row in {table}: {detail}")]
    Corrupt { table: &'static str, detail: String },
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

/// One open unit of work against the store.
///
/// Writes are visible to later reads on the same transaction and become visible
/// to other transactions only after [`StoreTx::commit`]. Dropping a transaction
/// without committing discards its writes.
#[async_trait]
pub trait StoreTx: Send {
    async fn create_player(
        &mut self,
        seed: &PlayerSeed,
        birth_year: i32,
        role: Role,
    ) -> Result<PlayerRow, StoreError>;

    async fn player_by_id(&mut self, id: RowId) -> Result<Option<PlayerRow>, StoreError>;

    async fn player_by_link(&mut self, sjl_link: &str) -> Result<Option<PlayerRow>, StoreError>;

    async fn create_season(
        &mut self,
        player_id: RowId,
        year: i32,
        totals: &SeasonTotals,
    ) -> Result<SeasonRow, StoreError>;

    /// Overwrites the totals of `season`; the variant of `totals` must match the season's role.
    async fn update_season_totals(&mut self, season: &SeasonRow, totals: &SeasonTotals) -> Result<(), StoreError>;

    async fn seasons_for_year(&mut self, year: i32) -> Result<Vec<SeasonRow>, StoreError>;

    async fn seasons_for_player(&mut self, player_id: RowId) -> Result<Vec<SeasonRow>, StoreError>;

    async fn create_season_level(&mut self, new: &NewSeasonLevel) -> Result<SeasonLevelRow, StoreError>;

    async fn update_season_level_stats(&mut self, row: &SeasonLevelRow, stats: &LevelStats) -> Result<(), StoreError>;

    async fn season_levels_for_season(&mut self, season: &SeasonRow) -> Result<Vec<SeasonLevelRow>, StoreError>;

    async fn dimension_by_id(&mut self, kind: DimensionKind, id: RowId) -> Result<Option<DimensionRow>, StoreError>;

    async fn dimension_by_name(
        &mut self,
        kind: DimensionKind,
        name: &str,
    ) -> Result<Option<DimensionRow>, StoreError>;

    /// Inserts a dimension row. Fails with [`StoreError::Conflict`] if the name already exists.
    async fn create_dimension(&mut self, kind: DimensionKind, name: &str) -> Result<DimensionRow, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

#[async_trait]
pub trait CareerStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn StoreTx + '_>, StoreError>;
}
