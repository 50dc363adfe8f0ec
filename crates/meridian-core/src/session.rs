//! Session abstraction consumed by the repository
//!
//! A session is the caller-owned handle to the persistence engine. The
//! repository borrows it for each operation and never begins, commits or
//! rolls back a transaction itself.

use async_trait::async_trait;

use crate::entity::{EntityDescriptor, EntityId, FieldMap, Record};
use crate::PersistenceError;

/// A change staged on a session, applied on the next flush
#[derive(Debug, Clone, PartialEq)]
pub enum PendingChange {
    Insert {
        descriptor: &'static EntityDescriptor,
        id: EntityId,
        values: FieldMap,
    },
    Update {
        descriptor: &'static EntityDescriptor,
        id: EntityId,
        values: FieldMap,
    },
    Delete {
        descriptor: &'static EntityDescriptor,
        id: EntityId,
    },
}

impl PendingChange {
    pub fn descriptor(&self) -> &'static EntityDescriptor {
        match self {
            Self::Insert { descriptor, .. }
            | Self::Update { descriptor, .. }
            | Self::Delete { descriptor, .. } => descriptor,
        }
    }

    pub fn id(&self) -> EntityId {
        match self {
            Self::Insert { id, .. } | Self::Update { id, .. } | Self::Delete { id, .. } => *id,
        }
    }
}

/// Transactional handle to a persistence engine
///
/// Reads flush any staged changes first, so a query always observes the
/// session's own writes. When a flush fails the remaining staged changes are
/// discarded; the caller is expected to roll back the enclosing transaction.
///
/// Implementations serialize their own statement execution. Driving one
/// session from several tasks concurrently is not supported.
#[async_trait]
pub trait Session: Send {
    /// Point lookup by identifier
    async fn find(
        &mut self,
        descriptor: &'static EntityDescriptor,
        id: EntityId,
    ) -> Result<Option<Record>, PersistenceError>;

    /// Count of all rows in the collection
    async fn count(&mut self, descriptor: &'static EntityDescriptor)
        -> Result<u64, PersistenceError>;

    /// Rows in `[offset, offset + limit)` of the default iteration order
    async fn fetch_window(
        &mut self,
        descriptor: &'static EntityDescriptor,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<Record>, PersistenceError>;

    /// Queue a change without touching the store
    fn stage(&mut self, change: PendingChange);

    /// Number of changes waiting for the next flush
    fn pending(&self) -> usize;

    /// Force staged changes to take effect, in staging order
    async fn flush(&mut self) -> Result<(), PersistenceError>;

    /// Re-read a row that must exist
    async fn refresh(
        &mut self,
        descriptor: &'static EntityDescriptor,
        id: EntityId,
    ) -> Result<Record, PersistenceError> {
        self.find(descriptor, id)
            .await?
            .ok_or(PersistenceError::StaleRow {
                table: descriptor.table,
                id,
            })
    }
}
