//! In-memory session
//!
//! An in-process store for tests and embedding. Tables keep insertion order,
//! timestamps come from a monotonic microsecond clock, and `unique` fields
//! are enforced on flush.

use async_trait::async_trait;
use chrono::{DateTime, Duration, DurationRound, Utc};
use std::collections::HashMap;

use crate::entity::{EntityDescriptor, EntityId, FieldMap, Record, Timestamps};
use crate::session::{PendingChange, Session};
use crate::PersistenceError;

/// Row storage backing a [`MemorySession`]
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: HashMap<&'static str, Vec<Record>>,
    last_tick: Option<DateTime<Utc>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows currently stored in `table`
    pub fn len(&self, table: &str) -> usize {
        self.tables.get(table).map(Vec::len).unwrap_or(0)
    }

    pub fn is_empty(&self, table: &str) -> bool {
        self.len(table) == 0
    }

    /// Store clock: strictly increasing, microsecond resolution
    fn tick(&mut self) -> DateTime<Utc> {
        let now = Utc::now()
            .duration_trunc(Duration::microseconds(1))
            .unwrap_or_else(|_| Utc::now());
        let next = match self.last_tick {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_tick = Some(next);
        next
    }

    fn rows(&self, table: &str) -> &[Record] {
        self.tables.get(table).map(Vec::as_slice).unwrap_or(&[])
    }

    fn check_unique(
        &self,
        descriptor: &'static EntityDescriptor,
        id: EntityId,
        values: &FieldMap,
    ) -> Result<(), PersistenceError> {
        for def in descriptor.fields.iter().filter(|f| f.unique) {
            let Some(value) = values.get(def.name).filter(|v| !v.is_null()) else {
                continue;
            };
            let taken = self
                .rows(descriptor.table)
                .iter()
                .any(|row| row.id != id && row.values.get(def.name) == Some(value));
            if taken {
                return Err(PersistenceError::ConstraintViolation {
                    table: descriptor.table,
                    field: def.name,
                    message: format!("duplicate value for unique field {}", def.name),
                });
            }
        }
        Ok(())
    }

    fn apply(&mut self, change: PendingChange) -> Result<(), PersistenceError> {
        match change {
            PendingChange::Insert {
                descriptor,
                id,
                values,
            } => {
                if self.rows(descriptor.table).iter().any(|row| row.id == id) {
                    return Err(PersistenceError::ConstraintViolation {
                        table: descriptor.table,
                        field: "id",
                        message: format!("duplicate primary key {id}"),
                    });
                }
                self.check_unique(descriptor, id, &values)?;

                let now = self.tick();
                self.tables
                    .entry(descriptor.table)
                    .or_default()
                    .push(Record {
                        table: descriptor.table,
                        id,
                        timestamps: Timestamps {
                            created_at: now,
                            updated_at: now,
                        },
                        values,
                    });
            }
            PendingChange::Update {
                descriptor,
                id,
                values,
            } => {
                let position = self.position(descriptor, id)?;
                self.check_unique(descriptor, id, &values)?;

                let now = self.tick();
                if let Some(row) = self
                    .tables
                    .get_mut(descriptor.table)
                    .and_then(|rows| rows.get_mut(position))
                {
                    row.values.extend(values);
                    row.timestamps.updated_at = now;
                }
            }
            PendingChange::Delete { descriptor, id } => {
                let position = self.position(descriptor, id)?;
                if let Some(rows) = self.tables.get_mut(descriptor.table) {
                    rows.remove(position);
                }
            }
        }
        Ok(())
    }

    fn position(
        &self,
        descriptor: &'static EntityDescriptor,
        id: EntityId,
    ) -> Result<usize, PersistenceError> {
        self.rows(descriptor.table)
            .iter()
            .position(|row| row.id == id)
            .ok_or(PersistenceError::StaleRow {
                table: descriptor.table,
                id,
            })
    }
}

/// [`Session`] over a [`MemoryStore`]
#[derive(Debug, Default)]
pub struct MemorySession {
    store: MemoryStore,
    pending: Vec<PendingChange>,
}

impl MemorySession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_store(store: MemoryStore) -> Self {
        Self {
            store,
            pending: Vec::new(),
        }
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    pub fn into_store(self) -> MemoryStore {
        self.store
    }
}

#[async_trait]
impl Session for MemorySession {
    async fn find(
        &mut self,
        descriptor: &'static EntityDescriptor,
        id: EntityId,
    ) -> Result<Option<Record>, PersistenceError> {
        self.flush().await?;
        Ok(self
            .store
            .rows(descriptor.table)
            .iter()
            .find(|row| row.id == id)
            .cloned())
    }

    async fn count(
        &mut self,
        descriptor: &'static EntityDescriptor,
    ) -> Result<u64, PersistenceError> {
        self.flush().await?;
        Ok(self.store.len(descriptor.table) as u64)
    }

    async fn fetch_window(
        &mut self,
        descriptor: &'static EntityDescriptor,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<Record>, PersistenceError> {
        self.flush().await?;
        let offset = usize::try_from(offset).unwrap_or(usize::MAX);
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        Ok(self
            .store
            .rows(descriptor.table)
            .iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    fn stage(&mut self, change: PendingChange) {
        self.pending.push(change);
    }

    fn pending(&self) -> usize {
        self.pending.len()
    }

    async fn flush(&mut self) -> Result<(), PersistenceError> {
        for change in std::mem::take(&mut self.pending) {
            self.store.apply(change)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{FieldDef, FieldKind, FieldValue};

    static TAGS: EntityDescriptor = EntityDescriptor {
        table: "tags",
        fields: &[
            FieldDef::required("name", FieldKind::Text).unique(),
            FieldDef::optional("colour", FieldKind::Text),
        ],
    };

    fn tag(name: &str) -> FieldMap {
        [
            ("name".to_string(), FieldValue::from(name)),
            ("colour".to_string(), FieldValue::Null),
        ]
        .into_iter()
        .collect()
    }

    fn insert(id: EntityId, name: &str) -> PendingChange {
        PendingChange::Insert {
            descriptor: &TAGS,
            id,
            values: tag(name),
        }
    }

    #[test]
    fn test_clock_is_strictly_increasing() {
        let mut store = MemoryStore::new();
        let mut last = store.tick();
        for _ in 0..1000 {
            let next = store.tick();
            assert!(next > last);
            last = next;
        }
    }

    #[tokio::test]
    async fn test_staged_changes_wait_for_flush() {
        let mut session = MemorySession::new();
        session.stage(insert(EntityId::new(), "rust"));

        assert_eq!(session.pending(), 1);
        assert!(session.store().is_empty("tags"));

        session.flush().await.unwrap();
        assert_eq!(session.pending(), 0);
        assert_eq!(session.store().len("tags"), 1);
    }

    #[tokio::test]
    async fn test_reads_autoflush() {
        let mut session = MemorySession::new();
        let id = EntityId::new();
        session.stage(insert(id, "rust"));

        let record = session.find(&TAGS, id).await.unwrap().unwrap();
        assert_eq!(record.values.get("name"), Some(&FieldValue::from("rust")));
        assert_eq!(
            record.timestamps.created_at,
            record.timestamps.updated_at
        );
    }

    #[tokio::test]
    async fn test_unique_violation_discards_remaining_changes() {
        let mut session = MemorySession::new();
        session.stage(insert(EntityId::new(), "rust"));
        session.stage(insert(EntityId::new(), "rust"));
        session.stage(insert(EntityId::new(), "go"));

        let err = session.flush().await.unwrap_err();
        assert!(err.is_constraint_violation());
        assert_eq!(session.pending(), 0);
        assert_eq!(session.count(&TAGS).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_update_and_delete_missing_row_are_stale() {
        let mut session = MemorySession::new();
        let id = EntityId::new();

        session.stage(PendingChange::Delete {
            descriptor: &TAGS,
            id,
        });
        let err = session.flush().await.unwrap_err();
        assert!(matches!(err, PersistenceError::StaleRow { table: "tags", .. }));

        session.stage(PendingChange::Update {
            descriptor: &TAGS,
            id,
            values: FieldMap::new(),
        });
        assert!(session.flush().await.is_err());
    }

    #[tokio::test]
    async fn test_window_preserves_insertion_order() {
        let mut session = MemorySession::new();
        let names = ["a", "b", "c", "d", "e"];
        for name in names {
            session.stage(insert(EntityId::new(), name));
        }

        let window = session.fetch_window(&TAGS, 1, 3).await.unwrap();
        let got: Vec<_> = window
            .iter()
            .map(|r| r.values.get("name").cloned())
            .collect();
        assert_eq!(
            got,
            vec![
                Some(FieldValue::from("b")),
                Some(FieldValue::from("c")),
                Some(FieldValue::from("d")),
            ]
        );

        assert!(session.fetch_window(&TAGS, 10, 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_store_outlives_session() {
        let mut session = MemorySession::new();
        let id = EntityId::new();
        session.stage(insert(id, "rust"));
        session.flush().await.unwrap();

        let mut next = MemorySession::with_store(session.into_store());
        assert_eq!(next.pending(), 0);
        assert!(next.find(&TAGS, id).await.unwrap().is_some());

        next.stage(insert(EntityId::new(), "rust"));
        assert!(next.flush().await.unwrap_err().is_constraint_violation());
    }

    #[tokio::test]
    async fn test_refresh_missing_row() {
        let mut session = MemorySession::new();
        let err = session.refresh(&TAGS, EntityId::new()).await.unwrap_err();
        assert!(matches!(err, PersistenceError::StaleRow { .. }));
    }
}
