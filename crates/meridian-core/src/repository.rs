//! Generic repository
//!
//! [`Repository`] provides get, paginated list, create, update and delete
//! for any [`Entity`] over any [`Session`]. It holds no state besides the
//! borrowed session and performs no transaction management.

use std::marker::PhantomData;
use tracing::debug;

use crate::entity::{Changes, Entity, EntityId};
use crate::session::{PendingChange, Session};
use crate::{RepositoryError, Result};

/// Data-access object bound to one entity type
///
/// Construction does not touch the store. Every operation that does is an
/// await point; store failures propagate unmodified as
/// [`RepositoryError::Persistence`].
pub struct Repository<'s, E, S: ?Sized> {
    session: &'s mut S,
    _entity: PhantomData<fn() -> E>,
}

impl<'s, E, S> Repository<'s, E, S>
where
    E: Entity,
    S: Session + ?Sized,
{
    pub fn new(session: &'s mut S) -> Self {
        Self {
            session,
            _entity: PhantomData,
        }
    }

    /// Fetch one entity; `None` when no row matches
    pub async fn get(&mut self, id: EntityId) -> Result<Option<E>> {
        let descriptor = E::descriptor();
        debug!(table = descriptor.table, %id, "get");

        self.session
            .find(descriptor, id)
            .await?
            .map(E::from_record)
            .transpose()
    }

    /// Fetch one page and the total row count
    ///
    /// Issues two round trips: a count over the whole collection, then the
    /// windowed fetch at `offset = (page - 1) * page_size`. Without snapshot
    /// isolation between them, concurrent writers can make `total` and the
    /// window disagree.
    pub async fn get_all(&mut self, page: u32, page_size: u32) -> Result<(Vec<E>, u64)> {
        if page == 0 || page_size == 0 {
            return Err(RepositoryError::InvalidPagination { page, page_size });
        }

        let descriptor = E::descriptor();
        let offset = u64::from(page - 1) * u64::from(page_size);
        debug!(table = descriptor.table, page, page_size, offset, "get_all");

        let total = self.session.count(descriptor).await?;
        let items = self
            .session
            .fetch_window(descriptor, offset, u64::from(page_size))
            .await?
            .into_iter()
            .map(E::from_record)
            .collect::<Result<Vec<_>>>()?;

        Ok((items, total))
    }

    /// Insert a new entity and return it with store-assigned values
    ///
    /// Does not commit the enclosing transaction.
    pub async fn create(&mut self, fields: Changes) -> Result<E> {
        let descriptor = E::descriptor();
        let values = descriptor.validate_insert(fields)?;
        let id = EntityId::new();
        debug!(table = descriptor.table, %id, "create");

        self.session.stage(PendingChange::Insert {
            descriptor,
            id,
            values,
        });
        self.session.flush().await?;

        let record = self.session.refresh(descriptor, id).await?;
        E::from_record(record)
    }

    /// Overwrite fields of a loaded entity and return the refreshed instance
    ///
    /// An empty change set stages nothing and only re-reads the row.
    pub async fn update(&mut self, mut instance: E, changes: Changes) -> Result<E> {
        let descriptor = E::descriptor();
        let values = descriptor.validate(changes)?;
        let id = instance.id();
        debug!(table = descriptor.table, %id, fields = values.len(), "update");

        for (name, value) in &values {
            instance.apply(name, value.clone())?;
        }

        if !values.is_empty() {
            self.session.stage(PendingChange::Update {
                descriptor,
                id,
                values,
            });
            self.session.flush().await?;
        }

        let record = self.session.refresh(descriptor, id).await?;
        E::from_record(record)
    }

    /// Remove an entity; the removal is visible to later operations at once
    pub async fn delete(&mut self, instance: E) -> Result<()> {
        let descriptor = E::descriptor();
        let id = instance.id();
        debug!(table = descriptor.table, %id, "delete");

        self.session.stage(PendingChange::Delete { descriptor, id });
        self.session.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemorySession;
    use crate::models::{User, UserRepository};
    use crate::pagination::{PageRequest, Paginated};
    use crate::PersistenceError;
    use proptest::prelude::*;

    fn user(n: usize) -> Changes {
        Changes::new()
            .set("email", format!("user{n}@example.com"))
            .set("hashed_password", "$argon2id$v=19$stub")
            .set("is_active", true)
    }

    async fn seed(session: &mut MemorySession, n: usize) {
        let mut repo = Repository::<User, _>::new(session);
        for i in 0..n {
            repo.create(user(i)).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_construction_does_not_touch_store() {
        let mut session = MemorySession::new();
        {
            let _repo = Repository::<User, _>::new(&mut session);
        }
        assert_eq!(session.pending(), 0);
        assert!(session.store().is_empty("users"));
    }

    #[tokio::test]
    async fn test_create_then_get_returns_equal_entity() {
        let mut session = MemorySession::new();
        let mut repo = Repository::<User, _>::new(&mut session);

        let created = repo
            .create(user(1).set("full_name", "Ada Lovelace"))
            .await
            .unwrap();
        assert_eq!(created.timestamps.created_at, created.timestamps.updated_at);

        let fetched = repo.get(created.id).await.unwrap().unwrap();
        assert_eq!(fetched, created);
        assert_eq!(fetched.full_name.as_deref(), Some("Ada Lovelace"));
    }

    #[tokio::test]
    async fn test_get_unknown_id_returns_none() {
        let mut session = MemorySession::new();
        seed(&mut session, 3).await;

        let mut repo = Repository::<User, _>::new(&mut session);
        assert!(repo.get(EntityId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_pagination_over_25_entities() {
        let mut session = MemorySession::new();
        seed(&mut session, 25).await;
        let mut repo = Repository::<User, _>::new(&mut session);

        let (items, total) = repo.get_all(2, 10).await.unwrap();
        assert_eq!((items.len(), total), (10, 25));

        let (items, total) = repo.get_all(3, 10).await.unwrap();
        assert_eq!((items.len(), total), (5, 25));

        let (items, total) = repo.get_all(4, 10).await.unwrap();
        assert_eq!((items.len(), total), (0, 25));
    }

    #[tokio::test]
    async fn test_page_envelope_from_get_all() {
        let mut session = MemorySession::new();
        seed(&mut session, 25).await;
        let mut repo = UserRepository::new(&mut session);

        let request = PageRequest {
            page: 3,
            page_size: 10,
        };
        let page = Paginated::from_parts(
            repo.get_all(request.page, request.page_size).await.unwrap(),
            request,
        );
        assert_eq!(page.items.len(), 5);
        assert_eq!((page.total, page.pages, page.page), (25, 3, 3));

        let emails = page.map(|u| u.email);
        assert!(emails.items.iter().all(|e| e.ends_with("@example.com")));
    }

    #[tokio::test]
    async fn test_pagination_windows_do_not_overlap() {
        let mut session = MemorySession::new();
        seed(&mut session, 7).await;
        let mut repo = Repository::<User, _>::new(&mut session);

        let (first, _) = repo.get_all(1, 4).await.unwrap();
        let (second, _) = repo.get_all(2, 4).await.unwrap();
        assert_eq!(first.len() + second.len(), 7);
        assert!(first.iter().all(|a| second.iter().all(|b| a.id != b.id)));
    }

    #[tokio::test]
    async fn test_pagination_rejects_zero() {
        let mut session = MemorySession::new();
        let mut repo = Repository::<User, _>::new(&mut session);

        assert!(matches!(
            repo.get_all(0, 10).await,
            Err(RepositoryError::InvalidPagination { page: 0, .. })
        ));
        assert!(matches!(
            repo.get_all(1, 0).await,
            Err(RepositoryError::InvalidPagination { page_size: 0, .. })
        ));
    }

    #[tokio::test]
    async fn test_update_refreshes_updated_at() {
        let mut session = MemorySession::new();
        let mut repo = Repository::<User, _>::new(&mut session);

        let created = repo.create(user(1)).await.unwrap();
        let before = created.timestamps;
        let id = created.id;

        let updated = repo
            .update(created, Changes::new().set("full_name", "Grace Hopper"))
            .await
            .unwrap();
        assert_eq!(updated.full_name.as_deref(), Some("Grace Hopper"));
        assert_eq!(updated.timestamps.created_at, before.created_at);
        assert!(updated.timestamps.updated_at > before.updated_at);

        let fetched = repo.get(id).await.unwrap().unwrap();
        assert_eq!(fetched.full_name.as_deref(), Some("Grace Hopper"));
        assert_eq!(fetched.timestamps, updated.timestamps);
    }

    #[tokio::test]
    async fn test_empty_update_only_refreshes() {
        let mut session = MemorySession::new();
        let mut repo = Repository::<User, _>::new(&mut session);

        let created = repo.create(user(1)).await.unwrap();
        let expected = created.clone();
        let refreshed = repo.update(created, Changes::new()).await.unwrap();
        assert_eq!(refreshed, expected);
    }

    #[tokio::test]
    async fn test_update_rejects_unknown_and_managed_fields() {
        let mut session = MemorySession::new();
        let mut repo = Repository::<User, _>::new(&mut session);
        let created = repo.create(user(1)).await.unwrap();

        let err = repo
            .update(created.clone(), Changes::new().set("is_admin", true))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::UnknownField { .. }));

        let err = repo
            .update(created.clone(), Changes::new().set("id", EntityId::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::ReadOnlyField { .. }));

        // Nothing was written
        let fetched = repo.get(created.id).await.unwrap().unwrap();
        assert_eq!(fetched, created);
    }

    #[tokio::test]
    async fn test_delete_then_get_returns_none() {
        let mut session = MemorySession::new();
        let mut repo = Repository::<User, _>::new(&mut session);

        let created = repo.create(user(1)).await.unwrap();
        let id = created.id;
        repo.delete(created).await.unwrap();

        assert!(repo.get(id).await.unwrap().is_none());
        let (_, total) = repo.get_all(1, 10).await.unwrap();
        assert_eq!(total, 0);
    }

    #[tokio::test]
    async fn test_delete_twice_is_a_persistence_error() {
        let mut session = MemorySession::new();
        let mut repo = Repository::<User, _>::new(&mut session);

        let created = repo.create(user(1)).await.unwrap();
        let copy = created.clone();
        repo.delete(created).await.unwrap();

        let err = repo.delete(copy).await.unwrap_err();
        assert!(matches!(
            err,
            RepositoryError::Persistence(PersistenceError::StaleRow { .. })
        ));
    }

    #[tokio::test]
    async fn test_create_propagates_constraint_violation() {
        let mut session = MemorySession::new();
        let mut repo = Repository::<User, _>::new(&mut session);

        repo.create(user(1)).await.unwrap();
        let err = repo.create(user(1)).await.unwrap_err();
        match err {
            RepositoryError::Persistence(e) => assert!(e.is_constraint_violation()),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_create_requires_fields() {
        let mut session = MemorySession::new();
        let mut repo = Repository::<User, _>::new(&mut session);

        let err = repo
            .create(Changes::new().set("email", "x@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::MissingField { .. }));
        assert!(session.store().is_empty("users"));
    }

    #[tokio::test]
    async fn test_repository_over_dyn_session() {
        let mut session = MemorySession::new();
        let dyn_session: &mut dyn Session = &mut session;
        let mut repo = Repository::<User, _>::new(dyn_session);

        let created = repo.create(user(1)).await.unwrap();
        assert!(repo.get(created.id).await.unwrap().is_some());
    }

    proptest! {
        #[test]
        fn prop_window_length_and_total(n in 0usize..40, page in 1u32..7, page_size in 1u32..12) {
            let (len, total) = tokio_test::block_on(async {
                let mut session = MemorySession::new();
                seed(&mut session, n).await;
                let mut repo = Repository::<User, _>::new(&mut session);
                let (items, total) = repo.get_all(page, page_size).await.unwrap();
                (items.len(), total)
            });

            let skipped = (page as usize - 1) * page_size as usize;
            let expected = (page_size as usize).min(n.saturating_sub(skipped));
            prop_assert_eq!(total, n as u64);
            prop_assert_eq!(len, expected);
        }
    }
}
