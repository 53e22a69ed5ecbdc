use async_trait::async_trait;
use rinkstat_core::{
    DimensionKind, DimensionRow, GoaltenderLevelStats, GoaltenderTotals, LevelStats, NewSeasonLevel, PlayerRow,
    PlayerSeed, Role, RowId, SeasonLevelRow, SeasonRow, SeasonTotals, SkaterLevelStats, SkaterTotals,
};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, Row, Transaction};
use tracing::info;

use crate::{CareerStore, StoreError, StoreTx};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS players (
        id BIGSERIAL PRIMARY KEY,
        sjl_name TEXT NOT NULL,
        ep_name TEXT NOT NULL,
        sjl_link TEXT NOT NULL UNIQUE,
        birth_year INTEGER NOT NULL,
        position TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS clubs (id BIGSERIAL PRIMARY KEY, name TEXT NOT NULL UNIQUE)",
    "CREATE TABLE IF NOT EXISTS levels (id BIGSERIAL PRIMARY KEY, name TEXT NOT NULL UNIQUE)",
    "CREATE TABLE IF NOT EXISTS age_groups (id BIGSERIAL PRIMARY KEY, name TEXT NOT NULL UNIQUE)",
    "CREATE TABLE IF NOT EXISTS goaltender_seasons (
        id BIGSERIAL PRIMARY KEY,
        player_id BIGINT NOT NULL REFERENCES players(id),
        year INTEGER NOT NULL,
        games INTEGER NOT NULL,
        played INTEGER NOT NULL,
        goals_allowed INTEGER NOT NULL,
        minutes DOUBLE PRECISION NOT NULL,
        gaa DOUBLE PRECISION NOT NULL,
        UNIQUE (player_id, year)
    )",
    "CREATE TABLE IF NOT EXISTS skater_seasons (
        id BIGSERIAL PRIMARY KEY,
        player_id BIGINT NOT NULL REFERENCES players(id),
        year INTEGER NOT NULL,
        games INTEGER NOT NULL,
        goals INTEGER NOT NULL,
        assists INTEGER NOT NULL,
        points INTEGER NOT NULL,
        penalty_minutes INTEGER NOT NULL,
        pp_goals INTEGER NOT NULL,
        sh_goals INTEGER NOT NULL,
        so_goals INTEGER NOT NULL,
        UNIQUE (player_id, year)
    )",
    "CREATE TABLE IF NOT EXISTS goaltender_season_levels (
        id BIGSERIAL PRIMARY KEY,
        season_id BIGINT NOT NULL REFERENCES goaltender_seasons(id),
        player_id BIGINT NOT NULL REFERENCES players(id),
        club_id BIGINT NOT NULL REFERENCES clubs(id),
        level_id BIGINT NOT NULL REFERENCES levels(id),
        age_group_id BIGINT NOT NULL REFERENCES age_groups(id),
        games INTEGER NOT NULL,
        played INTEGER NOT NULL,
        goals_allowed INTEGER NOT NULL,
        saves INTEGER NOT NULL,
        save_percentage DOUBLE PRECISION NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS skater_season_levels (
        id BIGSERIAL PRIMARY KEY,
        season_id BIGINT NOT NULL REFERENCES skater_seasons(id),
        player_id BIGINT NOT NULL REFERENCES players(id),
        club_id BIGINT NOT NULL REFERENCES clubs(id),
        level_id BIGINT NOT NULL REFERENCES levels(id),
        age_group_id BIGINT NOT NULL REFERENCES age_groups(id),
        games INTEGER NOT NULL,
        goals INTEGER NOT NULL,
        assists INTEGER NOT NULL,
        points INTEGER NOT NULL,
        penalty_minutes INTEGER NOT NULL
    )",
];

const SEASON_COLUMNS_GOALTENDER: &str = "id, player_id, year, games, played, goals_allowed, minutes, gaa";
const SEASON_COLUMNS_SKATER: &str =
    "id, player_id, year, games, goals, assists, points, penalty_minutes, pp_goals, sh_goals, so_goals";
const LEVEL_COLUMNS_GOALTENDER: &str =
    "id, season_id, player_id, club_id, level_id, age_group_id, games, played, goals_allowed, saves, save_percentage";
const LEVEL_COLUMNS_SKATER: &str =
    "id, season_id, player_id, club_id, level_id, age_group_id, games, goals, assists, points, penalty_minutes";

/// Postgres-backed career store. One [`StoreTx`] maps to one database transaction.
#[derive(Debug, Clone)]
pub struct PgCareerStore {
    pool: PgPool,
}

impl PgCareerStore {
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new().max_connections(5).connect(database_url).await?;
        Ok(Self { pool })
    }

    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        info!(tables = SCHEMA.len(), "schema ensured");
        Ok(())
    }
}

#[async_trait]
impl CareerStore for PgCareerStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx + '_>, StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ")
            .execute(&mut *tx)
            .await?;
        Ok(Box::new(PgStoreTx { tx }))
    }
}

struct PgStoreTx {
    tx: Transaction<'static, Postgres>,
}

/// Unique violations and serialization failures surface as conflicts so the
/// caller can retry the unit.
fn write_error(entity: &'static str, err: sqlx::Error) -> StoreError {
    if let Some(db) = err.as_database_error() {
        if db.is_unique_violation() || db.code().as_deref() == Some("40001") {
            return StoreError::Conflict {
                entity,
                detail: db.message().to_string(),
            };
        }
    }
    StoreError::Database(err)
}

fn season_table(role: Role) -> (&'static str, &'static str) {
    match role {
        Role::Goaltender => ("goaltender_seasons", SEASON_COLUMNS_GOALTENDER),
        Role::Skater => ("skater_seasons", SEASON_COLUMNS_SKATER),
    }
}

fn level_table(role: Role) -> (&'static str, &'static str) {
    match role {
        Role::Goaltender => ("goaltender_season_levels", LEVEL_COLUMNS_GOALTENDER),
        Role::Skater => ("skater_season_levels", LEVEL_COLUMNS_SKATER),
    }
}

fn player_from_row(row: &PgRow) -> Result<PlayerRow, StoreError> {
    let position: String = row.try_get("position")?;
    let role = Role::parse(&position).ok_or_else(|| StoreError::Corrupt {
        table: "players",
        detail: format!("unknown position {position:?}"),
    })?;
    Ok(PlayerRow {
        id: row.try_get("id")?,
        sjl_name: row.try_get("sjl_name")?,
        ep_name: row.try_get("ep_name")?,
        sjl_link: row.try_get("sjl_link")?,
        birth_year: row.try_get("birth_year")?,
        role,
    })
}

fn season_from_row(role: Role, row: &PgRow) -> Result<SeasonRow, StoreError> {
    let totals = match role {
        Role::Goaltender => SeasonTotals::Goaltender(GoaltenderTotals {
            games: row.try_get("games")?,
            played: row.try_get("played")?,
            goals_allowed: row.try_get("goals_allowed")?,
            minutes: row.try_get("minutes")?,
            gaa: row.try_get("gaa")?,
        }),
        Role::Skater => SeasonTotals::Skater(SkaterTotals {
            games: row.try_get("games")?,
            goals: row.try_get("goals")?,
            assists: row.try_get("assists")?,
            points: row.try_get("points")?,
            penalty_minutes: row.try_get("penalty_minutes")?,
            pp_goals: row.try_get("pp_goals")?,
            sh_goals: row.try_get("sh_goals")?,
            so_goals: row.try_get("so_goals")?,
        }),
    };
    Ok(SeasonRow {
        id: row.try_get("id")?,
        player_id: row.try_get("player_id")?,
        year: row.try_get("year")?,
        totals,
    })
}

fn season_level_from_row(role: Role, row: &PgRow) -> Result<SeasonLevelRow, StoreError> {
    let stats = match role {
        Role::Goaltender => LevelStats::Goaltender(GoaltenderLevelStats {
            games: row.try_get("games")?,
            played: row.try_get("played")?,
            goals_allowed: row.try_get("goals_allowed")?,
            saves: row.try_get("saves")?,
            save_percentage: row.try_get("save_percentage")?,
        }),
        Role::Skater => LevelStats::Skater(SkaterLevelStats {
            games: row.try_get("games")?,
            goals: row.try_get("goals")?,
            assists: row.try_get("assists")?,
            points: row.try_get("points")?,
            penalty_minutes: row.try_get("penalty_minutes")?,
        }),
    };
    Ok(SeasonLevelRow {
        id: row.try_get("id")?,
        season_id: row.try_get("season_id")?,
        player_id: row.try_get("player_id")?,
        club_id: row.try_get("club_id")?,
        level_id: row.try_get("level_id")?,
        age_group_id: row.try_get("age_group_id")?,
        stats,
    })
}

fn dimension_from_row(kind: DimensionKind, row: &PgRow) -> Result<DimensionRow, StoreError> {
    Ok(DimensionRow {
        id: row.try_get("id")?,
        kind,
        name: row.try_get("name")?,
    })
}

impl PgStoreTx {
    async fn seasons_where(&mut self, clause: &str, value: i64) -> Result<Vec<SeasonRow>, StoreError> {
        let mut seasons = Vec::new();
        for role in [Role::Goaltender, Role::Skater] {
            let (table, columns) = season_table(role);
            let sql = format!("SELECT {columns} FROM {table} WHERE {clause} = $1 ORDER BY id");
            let rows = sqlx::query(&sql).bind(value).fetch_all(&mut *self.tx).await?;
            for row in &rows {
                seasons.push(season_from_row(role, row)?);
            }
        }
        Ok(seasons)
    }
}

#[async_trait]
impl StoreTx for PgStoreTx {
    async fn create_player(
        &mut self,
        seed: &PlayerSeed,
        birth_year: i32,
        role: Role,
    ) -> Result<PlayerRow, StoreError> {
        let row = sqlx::query(
            "INSERT INTO players (sjl_name, ep_name, sjl_link, birth_year, position)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING id, sjl_name, ep_name, sjl_link, birth_year, position",
        )
        .bind(&seed.sjl_name)
        .bind(&seed.ep_name)
        .bind(&seed.sjl_link)
        .bind(birth_year)
        .bind(role.as_str())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|err| write_error("player", err))?;
        player_from_row(&row)
    }

    async fn player_by_id(&mut self, id: RowId) -> Result<Option<PlayerRow>, StoreError> {
        let row = sqlx::query("SELECT id, sjl_name, ep_name, sjl_link, birth_year, position FROM players WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(player_from_row).transpose()
    }

    async fn player_by_link(&mut self, sjl_link: &str) -> Result<Option<PlayerRow>, StoreError> {
        let row = sqlx::query(
            "SELECT id, sjl_name, ep_name, sjl_link, birth_year, position FROM players WHERE sjl_link = $1",
        )
        .bind(sjl_link)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.as_ref().map(player_from_row).transpose()
    }

    async fn create_season(
        &mut self,
        player_id: RowId,
        year: i32,
        totals: &SeasonTotals,
    ) -> Result<SeasonRow, StoreError> {
        let (table, columns) = season_table(totals.role());
        let row = match totals {
            SeasonTotals::Goaltender(t) => {
                let sql = format!(
                    "INSERT INTO {table} (player_id, year, games, played, goals_allowed, minutes, gaa)
                     VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {columns}"
                );
                sqlx::query(&sql)
                    .bind(player_id)
                    .bind(year)
                    .bind(t.games)
                    .bind(t.played)
                    .bind(t.goals_allowed)
                    .bind(t.minutes)
                    .bind(t.gaa)
                    .fetch_one(&mut *self.tx)
                    .await
            }
            SeasonTotals::Skater(t) => {
                let sql = format!(
                    "INSERT INTO {table} (player_id, year, games, goals, assists, points, penalty_minutes, pp_goals, sh_goals, so_goals)
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) RETURNING {columns}"
                );
                sqlx::query(&sql)
                    .bind(player_id)
                    .bind(year)
                    .bind(t.games)
                    .bind(t.goals)
                    .bind(t.assists)
                    .bind(t.points)
                    .bind(t.penalty_minutes)
                    .bind(t.pp_goals)
                    .bind(t.sh_goals)
                    .bind(t.so_goals)
                    .fetch_one(&mut *self.tx)
                    .await
            }
        }
        .map_err(|err| write_error("season", err))?;
        season_from_row(totals.role(), &row)
    }

    async fn update_season_totals(&mut self, season: &SeasonRow, totals: &SeasonTotals) -> Result<(), StoreError> {
        if season.role() != totals.role() {
            return Err(StoreError::Corrupt {
                table: season_table(season.role()).0,
                detail: format!("season {} is {}, got {} totals", season.id, season.role(), totals.role()),
            });
        }
        let result = match totals {
            SeasonTotals::Goaltender(t) => {
                sqlx::query(
                    "UPDATE goaltender_seasons SET games = $2, played = $3, goals_allowed = $4, minutes = $5, gaa = $6
                     WHERE id = $1",
                )
                .bind(season.id)
                .bind(t.games)
                .bind(t.played)
                .bind(t.goals_allowed)
                .bind(t.minutes)
                .bind(t.gaa)
                .execute(&mut *self.tx)
                .await
            }
            SeasonTotals::Skater(t) => {
                sqlx::query(
                    "UPDATE skater_seasons SET games = $2, goals = $3, assists = $4, points = $5,
                     penalty_minutes = $6, pp_goals = $7, sh_goals = $8, so_goals = $9 WHERE id = $1",
                )
                .bind(season.id)
                .bind(t.games)
                .bind(t.goals)
                .bind(t.assists)
                .bind(t.points)
                .bind(t.penalty_minutes)
                .bind(t.pp_goals)
                .bind(t.sh_goals)
                .bind(t.so_goals)
                .execute(&mut *self.tx)
                .await
            }
        }
        .map_err(|err| write_error("season", err))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::Missing { entity: "season", id: season.id });
        }
        Ok(())
    }

    async fn seasons_for_year(&mut self, year: i32) -> Result<Vec<SeasonRow>, StoreError> {
        self.seasons_where("year", i64::from(year)).await
    }

    async fn seasons_for_player(&mut self, player_id: RowId) -> Result<Vec<SeasonRow>, StoreError> {
        self.seasons_where("player_id", player_id).await
    }

    async fn create_season_level(&mut self, new: &NewSeasonLevel) -> Result<SeasonLevelRow, StoreError> {
        let role = new.stats.role();
        let (table, columns) = level_table(role);
        let row = match &new.stats {
            LevelStats::Goaltender(s) => {
                let sql = format!(
                    "INSERT INTO {table} (season_id, player_id, club_id, level_id, age_group_id,
                     games, played, goals_allowed, saves, save_percentage)
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) RETURNING {columns}"
                );
                sqlx::query(&sql)
                    .bind(new.season_id)
                    .bind(new.player_id)
                    .bind(new.club_id)
                    .bind(new.level_id)
                    .bind(new.age_group_id)
                    .bind(s.games)
                    .bind(s.played)
                    .bind(s.goals_allowed)
                    .bind(s.saves)
                    .bind(s.save_percentage)
                    .fetch_one(&mut *self.tx)
                    .await
            }
            LevelStats::Skater(s) => {
                let sql = format!(
                    "INSERT INTO {table} (season_id, player_id, club_id, level_id, age_group_id,
                     games, goals, assists, points, penalty_minutes)
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) RETURNING {columns}"
                );
                sqlx::query(&sql)
                    .bind(new.season_id)
                    .bind(new.player_id)
                    .bind(new.club_id)
                    .bind(new.level_id)
                    .bind(new.age_group_id)
                    .bind(s.games)
                    .bind(s.goals)
                    .bind(s.assists)
                    .bind(s.points)
                    .bind(s.penalty_minutes)
                    .fetch_one(&mut *self.tx)
                    .await
            }
        }
        .map_err(|err| write_error("season level", err))?;
        season_level_from_row(role, &row)
    }

    async fn update_season_level_stats(&mut self, row: &SeasonLevelRow, stats: &LevelStats) -> Result<(), StoreError> {
        if row.stats.role() != stats.role() {
            return Err(StoreError::Corrupt {
                table: level_table(row.stats.role()).0,
                detail: format!("row {} is {}, got {} stats", row.id, row.stats.role(), stats.role()),
            });
        }
        let result = match stats {
            LevelStats::Goaltender(s) => {
                sqlx::query(
                    "UPDATE goaltender_season_levels SET games = $2, played = $3, goals_allowed = $4,
                     saves = $5, save_percentage = $6 WHERE id = $1",
                )
                .bind(row.id)
                .bind(s.games)
                .bind(s.played)
                .bind(s.goals_allowed)
                .bind(s.saves)
                .bind(s.save_percentage)
                .execute(&mut *self.tx)
                .await
            }
            LevelStats::Skater(s) => {
                sqlx::query(
                    "UPDATE skater_season_levels SET games = $2, goals = $3, assists = $4, points = $5,
                     penalty_minutes = $6 WHERE id = $1",
                )
                .bind(row.id)
                .bind(s.games)
                .bind(s.goals)
                .bind(s.assists)
                .bind(s.points)
                .bind(s.penalty_minutes)
                .execute(&mut *self.tx)
                .await
            }
        }
        .map_err(|err| write_error("season level", err))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::Missing { entity: "season level", id: row.id });
        }
        Ok(())
    }

    async fn season_levels_for_season(&mut self, season: &SeasonRow) -> Result<Vec<SeasonLevelRow>, StoreError> {
        let role = season.role();
        let (table, columns) = level_table(role);
        let sql = format!("SELECT {columns} FROM {table} WHERE season_id = $1 ORDER BY id");
        let rows = sqlx::query(&sql).bind(season.id).fetch_all(&mut *self.tx).await?;
        rows.iter().map(|row| season_level_from_row(role, row)).collect()
    }

    async fn dimension_by_id(&mut self, kind: DimensionKind, id: RowId) -> Result<Option<DimensionRow>, StoreError> {
        let sql = format!("SELECT id, name FROM {} WHERE id = $1", kind.table());
        let row = sqlx::query(&sql).bind(id).fetch_optional(&mut *self.tx).await?;
        row.as_ref().map(|row| dimension_from_row(kind, row)).transpose()
    }

    async fn dimension_by_name(
        &mut self,
        kind: DimensionKind,
        name: &str,
    ) -> Result<Option<DimensionRow>, StoreError> {
        let sql = format!("SELECT id, name FROM {} WHERE name = $1", kind.table());
        let row = sqlx::query(&sql).bind(name).fetch_optional(&mut *self.tx).await?;
        row.as_ref().map(|row| dimension_from_row(kind, row)).transpose()
    }

    async fn create_dimension(&mut self, kind: DimensionKind, name: &str) -> Result<DimensionRow, StoreError> {
        let sql = format!("INSERT INTO {} (name) VALUES ($1) RETURNING id, name", kind.table());
        let row = sqlx::query(&sql)
            .bind(name)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|err| write_error("dimension", err))?;
        dimension_from_row(kind, &row)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await.map_err(|err| write_error("transaction", err))
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
