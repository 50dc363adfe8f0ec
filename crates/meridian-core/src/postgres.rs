//! PostgreSQL session
//!
//! Renders SQL from static entity descriptors with `sqlx::QueryBuilder`.
//! Column types by [`FieldKind`]:
//!
//! | kind        | column type          |
//! |-------------|----------------------|
//! | `Bool`      | `BOOLEAN`            |
//! | `Int`       | `BIGINT`             |
//! | `Float`     | `DOUBLE PRECISION`   |
//! | `Text`      | `TEXT`               |
//! | `Uuid`      | `UUID`               |
//! | `Timestamp` | `TIMESTAMPTZ`        |
//! | `Json`      | `JSONB`              |
//!
//! Every table also carries `id UUID PRIMARY KEY`, `created_at TIMESTAMPTZ`
//! and `updated_at TIMESTAMPTZ`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnection, PgRow};
use sqlx::{Postgres, QueryBuilder, Row};
use uuid::Uuid;

use crate::entity::{
    EntityDescriptor, EntityId, FieldKind, FieldMap, FieldValue, Record, Timestamps,
    CREATED_AT_FIELD, ID_FIELD, UPDATED_AT_FIELD,
};
use crate::session::{PendingChange, Session};
use crate::PersistenceError;

/// [`Session`] over a borrowed PostgreSQL connection
///
/// Pass a pooled connection or a transaction (which derefs to a
/// connection). Commit and rollback stay with the caller.
///
/// # Example
///
/// ```no_run
/// # async fn demo(pool: sqlx::PgPool) -> Result<(), Box<dyn std::error::Error>> {
/// use meridian_core::{models::User, Changes, PgSession, Repository};
///
/// let mut tx = pool.begin().await?;
/// let mut session = PgSession::new(&mut tx);
/// let mut users = Repository::<User, _>::new(&mut session);
///
/// let user = users
///     .create(
///         Changes::new()
///             .set("email", "ada@example.com")
///             .set("hashed_password", "$argon2id$...")
///             .set("is_active", true),
///     )
///     .await?;
/// println!("created {}", user.id);
///
/// tx.commit().await?;
/// # Ok(())
/// # }
/// ```
pub struct PgSession<'c> {
    conn: &'c mut PgConnection,
    pending: Vec<PendingChange>,
}

impl<'c> PgSession<'c> {
    pub fn new(conn: &'c mut PgConnection) -> Self {
        Self {
            conn,
            pending: Vec::new(),
        }
    }

    async fn execute(&mut self, change: PendingChange) -> Result<(), PersistenceError> {
        let descriptor = change.descriptor();
        let id = change.id();

        let mut query = match change {
            PendingChange::Insert { values, .. } => insert_query(descriptor, id, values),
            PendingChange::Update { values, .. } => update_query(descriptor, id, values),
            PendingChange::Delete { .. } => delete_query(descriptor, id),
        };

        let result = query.build().execute(&mut *self.conn).await?;
        if result.rows_affected() == 0 {
            return Err(PersistenceError::StaleRow {
                table: descriptor.table,
                id,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Session for PgSession<'_> {
    async fn find(
        &mut self,
        descriptor: &'static EntityDescriptor,
        id: EntityId,
    ) -> Result<Option<Record>, PersistenceError> {
        self.flush().await?;

        let mut query = select_query(descriptor);
        query.push(" WHERE ");
        query.push(quote(ID_FIELD));
        query.push(" = ");
        query.push_bind(id.as_uuid());

        let row = query.build().fetch_optional(&mut *self.conn).await?;
        row.map(|row| decode_record(descriptor, &row)).transpose()
    }

    async fn count(
        &mut self,
        descriptor: &'static EntityDescriptor,
    ) -> Result<u64, PersistenceError> {
        self.flush().await?;

        let sql = format!("SELECT COUNT(*) FROM {}", quote(descriptor.table));
        let total: i64 = sqlx::query_scalar(&sql)
            .fetch_one(&mut *self.conn)
            .await?;
        Ok(u64::try_from(total).unwrap_or(0))
    }

    async fn fetch_window(
        &mut self,
        descriptor: &'static EntityDescriptor,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<Record>, PersistenceError> {
        self.flush().await?;

        let mut query = select_query(descriptor);
        query.push(" LIMIT ");
        query.push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
        query.push(" OFFSET ");
        query.push_bind(i64::try_from(offset).unwrap_or(i64::MAX));

        let rows = query.build().fetch_all(&mut *self.conn).await?;
        rows.iter()
            .map(|row| decode_record(descriptor, row))
            .collect()
    }

    fn stage(&mut self, change: PendingChange) {
        self.pending.push(change);
    }

    fn pending(&self) -> usize {
        self.pending.len()
    }

    async fn flush(&mut self) -> Result<(), PersistenceError> {
        for change in std::mem::take(&mut self.pending) {
            self.execute(change).await?;
        }
        Ok(())
    }
}

/// Double-quote an identifier taken from a static descriptor
fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn column_list(descriptor: &EntityDescriptor) -> String {
    [ID_FIELD, CREATED_AT_FIELD, UPDATED_AT_FIELD]
        .into_iter()
        .chain(descriptor.fields.iter().map(|f| f.name))
        .map(quote)
        .collect::<Vec<_>>()
        .join(", ")
}

fn select_query(descriptor: &EntityDescriptor) -> QueryBuilder<'static, Postgres> {
    let mut query = QueryBuilder::new("SELECT ");
    query.push(column_list(descriptor));
    query.push(" FROM ");
    query.push(quote(descriptor.table));
    query
}

fn insert_query(
    descriptor: &EntityDescriptor,
    id: EntityId,
    mut values: FieldMap,
) -> QueryBuilder<'static, Postgres> {
    let mut query = QueryBuilder::new("INSERT INTO ");
    query.push(quote(descriptor.table));
    query.push(" (");
    query.push(column_list(descriptor));
    query.push(") VALUES (");
    query.push_bind(id.as_uuid());
    // Both timestamps come from the store clock
    query.push(", now(), now()");
    for def in descriptor.fields {
        query.push(", ");
        let value = values.remove(def.name).unwrap_or(FieldValue::Null);
        push_value(&mut query, def.kind, value);
    }
    query.push(")");
    query
}

fn update_query(
    descriptor: &EntityDescriptor,
    id: EntityId,
    values: FieldMap,
) -> QueryBuilder<'static, Postgres> {
    let mut query = QueryBuilder::new("UPDATE ");
    query.push(quote(descriptor.table));
    query.push(" SET ");
    for (name, value) in values {
        let Some(def) = descriptor.field(&name) else {
            continue;
        };
        query.push(quote(def.name));
        query.push(" = ");
        push_value(&mut query, def.kind, value);
        query.push(", ");
    }
    // clock_timestamp() rather than now(): now() is frozen at transaction start
    query.push(quote(UPDATED_AT_FIELD));
    query.push(" = clock_timestamp() WHERE ");
    query.push(quote(ID_FIELD));
    query.push(" = ");
    query.push_bind(id.as_uuid());
    query
}

fn delete_query(descriptor: &EntityDescriptor, id: EntityId) -> QueryBuilder<'static, Postgres> {
    let mut query = QueryBuilder::new("DELETE FROM ");
    query.push(quote(descriptor.table));
    query.push(" WHERE ");
    query.push(quote(ID_FIELD));
    query.push(" = ");
    query.push_bind(id.as_uuid());
    query
}

/// Bind a value; nulls are typed by the declared column kind
fn push_value(query: &mut QueryBuilder<'static, Postgres>, kind: FieldKind, value: FieldValue) {
    match value {
        FieldValue::Null => match kind {
            FieldKind::Bool => query.push_bind(None::<bool>),
            FieldKind::Int => query.push_bind(None::<i64>),
            FieldKind::Float => query.push_bind(None::<f64>),
            FieldKind::Text => query.push_bind(None::<String>),
            FieldKind::Uuid => query.push_bind(None::<Uuid>),
            FieldKind::Timestamp => query.push_bind(None::<DateTime<Utc>>),
            FieldKind::Json => query.push_bind(None::<serde_json::Value>),
        },
        FieldValue::Bool(v) => query.push_bind(v),
        FieldValue::Int(v) => query.push_bind(v),
        FieldValue::Float(v) => query.push_bind(v),
        FieldValue::Text(v) => query.push_bind(v),
        FieldValue::Uuid(v) => query.push_bind(v),
        FieldValue::Timestamp(v) => query.push_bind(v),
        FieldValue::Json(v) => query.push_bind(v),
    };
}

fn decode_record(
    descriptor: &'static EntityDescriptor,
    row: &PgRow,
) -> Result<Record, PersistenceError> {
    let id: Uuid = row.try_get(ID_FIELD)?;
    let created_at: DateTime<Utc> = row.try_get(CREATED_AT_FIELD)?;
    let updated_at: DateTime<Utc> = row.try_get(UPDATED_AT_FIELD)?;

    let mut values = FieldMap::new();
    for def in descriptor.fields {
        let name = def.name;
        let value = match def.kind {
            FieldKind::Bool => row.try_get::<Option<bool>, _>(name)?.map(FieldValue::Bool),
            FieldKind::Int => row.try_get::<Option<i64>, _>(name)?.map(FieldValue::Int),
            FieldKind::Float => row.try_get::<Option<f64>, _>(name)?.map(FieldValue::Float),
            FieldKind::Text => row.try_get::<Option<String>, _>(name)?.map(FieldValue::Text),
            FieldKind::Uuid => row.try_get::<Option<Uuid>, _>(name)?.map(FieldValue::Uuid),
            FieldKind::Timestamp => row
                .try_get::<Option<DateTime<Utc>>, _>(name)?
                .map(FieldValue::Timestamp),
            FieldKind::Json => row
                .try_get::<Option<serde_json::Value>, _>(name)?
                .map(FieldValue::Json),
        };
        values.insert(name.to_string(), value.unwrap_or(FieldValue::Null));
    }

    Ok(Record {
        table: descriptor.table,
        id: EntityId::from_uuid(id),
        timestamps: Timestamps {
            created_at,
            updated_at,
        },
        values,
    })
}
