//! Relationship repository - map membership edges
//!
//! Assigning is idempotent: the `(map_id, type_id, object_id)` unique key
//! plus `ON CONFLICT DO NOTHING` makes repeats a no-op. Every operation
//! returns the number of rows actually inserted or deleted.

use std::sync::Arc;

use sqlx::{PgPool, Postgres, QueryBuilder};

use super::{rows_per_statement, DbError, Tables};
use crate::models::{positive_id, IdList, RelationType};

/// Relationship repository
#[derive(Clone)]
pub struct RelationshipRepo {
    pool: PgPool,
    tables: Arc<Tables>,
}

impl RelationshipRepo {
    pub fn new(pool: PgPool, tables: Arc<Tables>) -> Self {
        Self { pool, tables }
    }

    /// Assign an object of any kind to a map.
    pub async fn assign(&self, map_id: i64, kind: RelationType, object_id: i64) -> Result<u64, DbError> {
        let map_id = positive_id("map_id", map_id)?;
        let object_id = positive_id("object_id", object_id)?;
        self.insert_pairs(kind, &[(map_id, object_id)]).await
    }

    pub async fn assign_marker(&self, map_id: i64, marker_id: i64) -> Result<u64, DbError> {
        self.assign(map_id, RelationType::MARKER, marker_id).await
    }

    /// Assign several markers to one map.
    pub async fn assign_markers(&self, map_id: i64, marker_ids: &IdList) -> Result<u64, DbError> {
        let map_id = positive_id("map_id", map_id)?;
        let pairs: Vec<_> = marker_ids.as_slice().iter().map(|&m| (map_id, m)).collect();
        self.insert_pairs(RelationType::MARKER, &pairs).await
    }

    /// Assign one marker to several maps.
    pub async fn assign_maps_marker(&self, map_ids: &IdList, marker_id: i64) -> Result<u64, DbError> {
        let marker_id = positive_id("marker_id", marker_id)?;
        let pairs: Vec<_> = map_ids.as_slice().iter().map(|&m| (m, marker_id)).collect();
        self.insert_pairs(RelationType::MARKER, &pairs).await
    }

    /// Assign every marker to every map.
    pub async fn assign_maps_markers(&self, map_ids: &IdList, marker_ids: &IdList) -> Result<u64, DbError> {
        self.insert_pairs(RelationType::MARKER, &cross(map_ids, marker_ids)).await
    }

    async fn insert_pairs(&self, kind: RelationType, pairs: &[(i32, i32)]) -> Result<u64, DbError> {
        if pairs.is_empty() {
            return Err(DbError::EmptyBatch {
                resource: "relationships",
            });
        }

        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;
        for chunk in pairs.chunks(rows_per_statement(3)) {
            let mut qb: QueryBuilder<Postgres> =
                QueryBuilder::new(format!("INSERT INTO {} (map_id, type_id, object_id) ", self.tables.rels));
            qb.push_values(chunk, |mut row, &(map_id, object_id)| {
                row.push_bind(map_id).push_bind(kind.as_i16()).push_bind(object_id);
            });
            qb.push(" ON CONFLICT DO NOTHING");
            inserted += qb.build().execute(&mut *tx).await?.rows_affected();
        }
        tx.commit().await?;

        tracing::debug!(requested = pairs.len(), inserted, "relationships assigned");
        Ok(inserted)
    }

    /// Remove an object of any kind from a map.
    pub async fn unassign(&self, map_id: i64, kind: RelationType, object_id: i64) -> Result<u64, DbError> {
        let map_id = positive_id("map_id", map_id)?;
        let object_id = positive_id("object_id", object_id)?;
        self.delete_matching(kind, &[map_id], Some(&[object_id][..])).await
    }

    pub async fn unassign_marker(&self, map_id: i64, marker_id: i64) -> Result<u64, DbError> {
        self.unassign(map_id, RelationType::MARKER, marker_id).await
    }

    pub async fn unassign_markers(&self, map_id: i64, marker_ids: &IdList) -> Result<u64, DbError> {
        let map_id = positive_id("map_id", map_id)?;
        non_empty(marker_ids)?;
        self.delete_matching(RelationType::MARKER, &[map_id], Some(marker_ids.as_slice()))
            .await
    }

    pub async fn unassign_maps_marker(&self, map_ids: &IdList, marker_id: i64) -> Result<u64, DbError> {
        let marker_id = positive_id("marker_id", marker_id)?;
        non_empty(map_ids)?;
        self.delete_matching(RelationType::MARKER, map_ids.as_slice(), Some(&[marker_id][..]))
            .await
    }

    pub async fn unassign_maps_markers(&self, map_ids: &IdList, marker_ids: &IdList) -> Result<u64, DbError> {
        non_empty(map_ids)?;
        non_empty(marker_ids)?;
        self.delete_matching(RelationType::MARKER, map_ids.as_slice(), Some(marker_ids.as_slice()))
            .await
    }

    /// Remove every marker from a map.
    pub async fn unassign_all_markers(&self, map_id: i64) -> Result<u64, DbError> {
        let map_id = positive_id("map_id", map_id)?;
        self.delete_matching(RelationType::MARKER, &[map_id], None).await
    }

    async fn delete_matching(
        &self,
        kind: RelationType,
        map_ids: &[i32],
        object_ids: Option<&[i32]>,
    ) -> Result<u64, DbError> {
        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("DELETE FROM {} WHERE type_id = ", self.tables.rels));
        qb.push_bind(kind.as_i16());
        qb.push(" AND map_id = ANY(");
        qb.push_bind(map_ids);
        qb.push(")");
        if let Some(object_ids) = object_ids {
            qb.push(" AND object_id = ANY(");
            qb.push_bind(object_ids);
            qb.push(")");
        }

        let deleted = qb.build().execute(&self.pool).await?.rows_affected();
        tracing::debug!(deleted, "relationships removed");
        Ok(deleted)
    }
}

/// Every `(map, object)` pair, maps outermost.
fn cross(map_ids: &IdList, object_ids: &IdList) -> Vec<(i32, i32)> {
    map_ids
        .as_slice()
        .iter()
        .flat_map(|&map| object_ids.as_slice().iter().map(move |&object| (map, object)))
        .collect()
}

fn non_empty(ids: &IdList) -> Result<(), DbError> {
    if ids.is_empty() {
        return Err(DbError::EmptyBatch {
            resource: "relationships",
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::testing::TestStore;
    use super::*;

    #[test]
    fn cross_product_of_maps_and_markers() {
        let pairs = cross(&IdList::from(vec![2, 1]), &IdList::from(vec![5, 6]));
        assert_eq!(pairs, vec![(1, 5), (1, 6), (2, 5), (2, 6)]);
        assert!(cross(&IdList::from(vec![1]), &IdList::default()).is_empty());
    }

    #[tokio::test]
    async fn bad_input_never_reaches_the_database() {
        let store = TestStore::lazy();
        let rels = &store.relationships;

        assert!(matches!(rels.assign_marker(0, 4).await, Err(DbError::Validation(_))));
        assert!(matches!(
            rels.assign_markers(3, &IdList::from("x,0")).await,
            Err(DbError::EmptyBatch { .. })
        ));
        assert!(matches!(
            rels.unassign_maps_markers(&IdList::default(), &IdList::from("1")).await,
            Err(DbError::EmptyBatch { .. })
        ));
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn assign_is_idempotent() {
        let store = TestStore::connect().await;
        let rels = &store.relationships;

        assert_eq!(rels.assign_marker(1, 10).await.unwrap(), 1);
        assert_eq!(rels.assign_marker(1, 10).await.unwrap(), 0);
        assert_eq!(
            rels.assign_markers(1, &IdList::from("10,11,12")).await.unwrap(),
            2
        );
        assert_eq!(store.rel_count(1).await, 3);

        store.teardown().await;
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn unassign_mirrors_assign() {
        let store = TestStore::connect().await;
        let rels = &store.relationships;

        let maps = IdList::from("1,2");
        let markers = IdList::from("10,11");
        assert_eq!(rels.assign_maps_markers(&maps, &markers).await.unwrap(), 4);

        assert_eq!(rels.unassign_marker(1, 10).await.unwrap(), 1);
        assert_eq!(rels.unassign_maps_marker(&maps, 11).await.unwrap(), 2);
        assert_eq!(store.rel_count(2).await, 1);
        assert_eq!(rels.unassign_all_markers(2).await.unwrap(), 1);
        assert_eq!(rels.unassign_all_markers(2).await.unwrap(), 0);

        store.teardown().await;
    }
}
