use std::collections::HashMap;

use rinkstat_core::{DimensionKind, RowId, SeasonLevelEntry, UNSPECIFIED_DIMENSION};
use rinkstat_storage::{StoreError, StoreTx};
use tracing::debug;

/// Resolved dimension ids of one season-level entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DimensionIds {
    pub club_id: RowId,
    pub level_id: RowId,
    pub age_group_id: RowId,
}

/// Get-or-create for clubs, levels and age groups.
///
/// Holds an identity map for the lifetime of one transaction; build a fresh
/// resolver for every unit of work so ids from a rolled-back attempt are never
/// reused.
#[derive(Debug, Default)]
pub struct DimensionResolver {
    ids: HashMap<(DimensionKind, String), RowId>,
    created: usize,
}

impl DimensionResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows created through this resolver.
    pub fn created(&self) -> usize {
        self.created
    }

    /// Id of the `kind` row named `name`; an undefined or blank name maps to the placeholder row.
    pub async fn resolve(
        &mut self,
        tx: &mut (dyn StoreTx + '_),
        kind: DimensionKind,
        name: Option<&str>,
    ) -> Result<RowId, StoreError> {
        let name = name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(UNSPECIFIED_DIMENSION);
        if let Some(id) = self.ids.get(&(kind, name.to_string())) {
            return Ok(*id);
        }

        let id = match tx.dimension_by_name(kind, name).await? {
            Some(row) => row.id,
            None => {
                let row = tx.create_dimension(kind, name).await?;
                debug!(%kind, name, id = row.id, "dimension created");
                self.created += 1;
                row.id
            }
        };
        self.ids.insert((kind, name.to_string()), id);
        Ok(id)
    }

    pub async fn resolve_entry(
        &mut self,
        tx: &mut (dyn StoreTx + '_),
        entry: &SeasonLevelEntry,
    ) -> Result<DimensionIds, StoreError> {
        Ok(DimensionIds {
            club_id: self.resolve(tx, DimensionKind::Club, entry.club.as_deref()).await?,
            level_id: self.resolve(tx, DimensionKind::Level, Some(&entry.level)).await?,
            age_group_id: self
                .resolve(tx, DimensionKind::AgeGroup, entry.age_group.as_deref())
                .await?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rinkstat_core::{LevelStats, SkaterLevelStats};
    use rinkstat_storage::{CareerStore, MemoryStore};

    #[tokio::test]
    async fn same_name_resolves_to_same_row() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let mut resolver = DimensionResolver::new();

        let first = resolver.resolve(tx.as_mut(), DimensionKind::Club, Some("Tappara")).await.unwrap();
        let second = resolver.resolve(tx.as_mut(), DimensionKind::Club, Some(" Tappara ")).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(resolver.created(), 1);

        // A new resolver in a later unit finds the committed row instead of creating one.
        tx.commit().await.unwrap();
        let mut tx = store.begin().await.unwrap();
        let mut later = DimensionResolver::new();
        let third = later.resolve(tx.as_mut(), DimensionKind::Club, Some("Tappara")).await.unwrap();
        assert_eq!(third, first);
        assert_eq!(later.created(), 0);
        tx.commit().await.unwrap();

        assert_eq!(store.dimensions(DimensionKind::Club).await.len(), 1);
    }

    #[tokio::test]
    async fn undefined_club_and_age_group_share_placeholder_rows() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let mut resolver = DimensionResolver::new();
        let entry = SeasonLevelEntry {
            team_label: "Leijonat".into(),
            level_label: "Pohjola-leiri".into(),
            club: None,
            level: "Pohjola-leiri".into(),
            age_group: None,
            stats: LevelStats::Skater(SkaterLevelStats::default()),
        };

        let ids = resolver.resolve_entry(tx.as_mut(), &entry).await.unwrap();
        let again = resolver.resolve(tx.as_mut(), DimensionKind::Club, Some("")).await.unwrap();
        assert_eq!(ids.club_id, again);

        let club = tx.dimension_by_id(DimensionKind::Club, ids.club_id).await.unwrap().unwrap();
        let age = tx.dimension_by_id(DimensionKind::AgeGroup, ids.age_group_id).await.unwrap().unwrap();
        assert_eq!(club.name, UNSPECIFIED_DIMENSION);
        assert_eq!(age.name, UNSPECIFIED_DIMENSION);
    }
}
