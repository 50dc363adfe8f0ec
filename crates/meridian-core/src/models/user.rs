//! User account entity
//!
//! Maps to the `users` table:
//!
//! ```sql
//! CREATE TABLE users (
//!     id              UUID PRIMARY KEY,
//!     created_at      TIMESTAMPTZ NOT NULL DEFAULT now(),
//!     updated_at      TIMESTAMPTZ NOT NULL DEFAULT now(),
//!     email           TEXT NOT NULL UNIQUE,
//!     hashed_password TEXT NOT NULL,
//!     full_name       TEXT,
//!     is_active       BOOLEAN NOT NULL
//! );
//! ```

use serde::Serialize;

use crate::entity::{
    field_value, Entity, EntityDescriptor, EntityId, FieldDef, FieldKind, FieldValue, Record,
    Timestamps,
};
use crate::repository::Repository;
use crate::{RepositoryError, Result};

static USER_DESCRIPTOR: EntityDescriptor = EntityDescriptor {
    table: "users",
    fields: &[
        FieldDef::required("email", FieldKind::Text).unique(),
        FieldDef::required("hashed_password", FieldKind::Text),
        FieldDef::optional("full_name", FieldKind::Text),
        FieldDef::required("is_active", FieldKind::Bool),
    ],
};

/// User account
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    pub id: EntityId,

    #[serde(flatten)]
    pub timestamps: Timestamps,

    /// Login address (unique)
    pub email: String,

    /// Argon2id PHC string; never serialized
    #[serde(skip_serializing)]
    pub hashed_password: String,

    pub full_name: Option<String>,

    pub is_active: bool,
}

/// Repository for [`User`] rows
pub type UserRepository<'s, S> = Repository<'s, User, S>;

impl Entity for User {
    fn descriptor() -> &'static EntityDescriptor {
        &USER_DESCRIPTOR
    }

    fn id(&self) -> EntityId {
        self.id
    }

    fn timestamps(&self) -> &Timestamps {
        &self.timestamps
    }

    fn from_record(mut record: Record) -> Result<Self> {
        Ok(Self {
            id: record.id,
            timestamps: record.timestamps,
            email: record.take("email")?,
            hashed_password: record.take("hashed_password")?,
            full_name: record.take("full_name")?,
            is_active: record.take("is_active")?,
        })
    }

    fn apply(&mut self, field: &str, value: FieldValue) -> Result<()> {
        let table = USER_DESCRIPTOR.table;
        match field {
            "email" => self.email = field_value(table, field, value)?,
            "hashed_password" => self.hashed_password = field_value(table, field, value)?,
            "full_name" => self.full_name = field_value(table, field, value)?,
            "is_active" => self.is_active = field_value(table, field, value)?,
            other => {
                return Err(RepositoryError::UnknownField {
                    entity: table,
                    field: other.to_string(),
                })
            }
        }
        Ok(())
    }
}
