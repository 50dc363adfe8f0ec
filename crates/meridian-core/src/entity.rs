//! Entity identity, descriptors, and field values
//!
//! Entities compose an [`EntityId`] and a [`Timestamps`] pair as plain fields.
//! Each entity type publishes a static [`EntityDescriptor`] naming its table
//! and writable fields; the repository validates every [`Changes`] request
//! against it before anything reaches the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use crate::{RepositoryError, Result};

/// Column holding the identifier of every entity table.
pub const ID_FIELD: &str = "id";
/// Column set once at insertion by the store.
pub const CREATED_AT_FIELD: &str = "created_at";
/// Column refreshed by the store on every mutation.
pub const UPDATED_AT_FIELD: &str = "updated_at";

const MANAGED_FIELDS: [&str; 3] = [ID_FIELD, CREATED_AT_FIELD, UPDATED_AT_FIELD];

// ============================================================================
// Identity and timestamps
// ============================================================================

/// Globally unique, randomly generated 128-bit entity identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(Uuid);

impl EntityId {
    /// Generate a fresh random (v4) identifier
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for EntityId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for EntityId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Store-assigned creation and modification times
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamps {
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// Field values
// ============================================================================

/// Storage kind of a writable field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Bool,
    Int,
    Float,
    Text,
    Uuid,
    Timestamp,
    Json,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::Text => "text",
            Self::Uuid => "uuid",
            Self::Timestamp => "timestamp",
            Self::Json => "json",
        };
        f.write_str(name)
    }
}

/// A single field value travelling between entities and sessions
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Uuid(Uuid),
    Timestamp(DateTime<Utc>),
    Json(serde_json::Value),
}

impl FieldValue {
    /// Kind of a non-null value
    pub fn kind(&self) -> Option<FieldKind> {
        match self {
            Self::Null => None,
            Self::Bool(_) => Some(FieldKind::Bool),
            Self::Int(_) => Some(FieldKind::Int),
            Self::Float(_) => Some(FieldKind::Float),
            Self::Text(_) => Some(FieldKind::Text),
            Self::Uuid(_) => Some(FieldKind::Uuid),
            Self::Timestamp(_) => Some(FieldKind::Timestamp),
            Self::Json(_) => Some(FieldKind::Json),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    fn kind_name(&self) -> String {
        self.kind()
            .map(|k| k.to_string())
            .unwrap_or_else(|| "null".to_string())
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<Uuid> for FieldValue {
    fn from(v: Uuid) -> Self {
        Self::Uuid(v)
    }
}

impl From<EntityId> for FieldValue {
    fn from(v: EntityId) -> Self {
        Self::Uuid(v.as_uuid())
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(v: DateTime<Utc>) -> Self {
        Self::Timestamp(v)
    }
}

impl From<serde_json::Value> for FieldValue {
    fn from(v: serde_json::Value) -> Self {
        Self::Json(v)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Self::Null)
    }
}

/// Conversion from a stored [`FieldValue`] back into a Rust field type
pub trait FromField: Sized {
    const KIND: FieldKind;

    /// Returns the value back on mismatch so the caller can report it
    fn from_field(value: FieldValue) -> std::result::Result<Self, FieldValue>;

    /// Whether `Null` is an acceptable stored value
    fn accepts_null() -> bool {
        false
    }

    fn from_null() -> Option<Self> {
        None
    }
}

macro_rules! impl_from_field {
    ($ty:ty, $kind:ident, $variant:ident) => {
        impl FromField for $ty {
            const KIND: FieldKind = FieldKind::$kind;

            fn from_field(value: FieldValue) -> std::result::Result<Self, FieldValue> {
                match value {
                    FieldValue::$variant(v) => Ok(v),
                    other => Err(other),
                }
            }
        }
    };
}

impl_from_field!(bool, Bool, Bool);
impl_from_field!(i64, Int, Int);
impl_from_field!(f64, Float, Float);
impl_from_field!(String, Text, Text);
impl_from_field!(Uuid, Uuid, Uuid);
impl_from_field!(DateTime<Utc>, Timestamp, Timestamp);
impl_from_field!(serde_json::Value, Json, Json);

impl<T: FromField> FromField for Option<T> {
    const KIND: FieldKind = T::KIND;

    fn from_field(value: FieldValue) -> std::result::Result<Self, FieldValue> {
        match value {
            FieldValue::Null => Ok(None),
            other => T::from_field(other).map(Some),
        }
    }

    fn accepts_null() -> bool {
        true
    }

    fn from_null() -> Option<Self> {
        Some(None)
    }
}

/// Field name to value mapping
pub type FieldMap = BTreeMap<String, FieldValue>;

// ============================================================================
// Descriptors
// ============================================================================

/// Declaration of one writable column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDef {
    pub name: &'static str,
    pub kind: FieldKind,
    pub nullable: bool,
    pub unique: bool,
}

impl FieldDef {
    /// A non-null, non-unique field
    pub const fn required(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            nullable: false,
            unique: false,
        }
    }

    pub const fn optional(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            nullable: true,
            unique: false,
        }
    }

    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

/// Static description of an entity table
///
/// The identifier column is always `id` and the timestamp columns are always
/// `created_at` / `updated_at`; `fields` lists only the caller-writable columns.
#[derive(Debug, PartialEq, Eq)]
pub struct EntityDescriptor {
    pub table: &'static str,
    pub fields: &'static [FieldDef],
}

impl EntityDescriptor {
    pub fn field(&self, name: &str) -> Option<&'static FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Validate a change set field by field.
    ///
    /// Rejects unknown names, store-managed columns, kind mismatches and
    /// nulls in non-nullable fields.
    pub fn validate(&self, changes: Changes) -> Result<FieldMap> {
        let mut validated = FieldMap::new();

        for (name, value) in changes.values {
            if MANAGED_FIELDS.contains(&name.as_str()) {
                return Err(RepositoryError::ReadOnlyField {
                    entity: self.table,
                    field: name,
                });
            }

            let def = self
                .field(&name)
                .ok_or_else(|| RepositoryError::UnknownField {
                    entity: self.table,
                    field: name.clone(),
                })?;

            let accepted = match value.kind() {
                None => def.nullable,
                Some(kind) => kind == def.kind,
            };
            if !accepted {
                return Err(RepositoryError::TypeMismatch {
                    entity: self.table,
                    field: name,
                    expected: expected_kind(def),
                    actual: value.kind_name(),
                });
            }

            validated.insert(name, value);
        }

        Ok(validated)
    }

    /// Validate a change set for insertion.
    ///
    /// Every non-nullable field must be present; omitted nullable fields are
    /// filled with `Null` so the stored row is complete.
    pub fn validate_insert(&self, changes: Changes) -> Result<FieldMap> {
        let mut values = self.validate(changes)?;

        for def in self.fields {
            if values.contains_key(def.name) {
                continue;
            }
            if !def.nullable {
                return Err(RepositoryError::MissingField {
                    entity: self.table,
                    field: def.name,
                });
            }
            values.insert(def.name.to_string(), FieldValue::Null);
        }

        Ok(values)
    }
}

fn expected_kind(def: &FieldDef) -> String {
    if def.nullable {
        format!("{} or null", def.kind)
    } else {
        def.kind.to_string()
    }
}

// ============================================================================
// Change sets
// ============================================================================

/// Explicit partial record used by `create` and `update`
///
/// # Example
///
/// ```
/// use meridian_core::Changes;
///
/// let changes = Changes::new()
///     .set("email", "ada@example.com")
///     .set("is_active", true);
/// assert_eq!(changes.len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Changes {
    values: FieldMap,
}

impl Changes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field; a later call for the same name replaces the earlier one
    pub fn set(mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.values.insert(field.into(), value.into());
        self
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.values.get(field)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Into<String>, V: Into<FieldValue>> FromIterator<(K, V)> for Changes {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

// ============================================================================
// Records
// ============================================================================

/// A row as read back from a session
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub table: &'static str,
    pub id: EntityId,
    pub timestamps: Timestamps,
    pub values: FieldMap,
}

impl Record {
    /// Remove a field and convert it to the requested Rust type
    pub fn take<T: FromField>(&mut self, field: &'static str) -> Result<T> {
        match self.values.remove(field) {
            Some(value) => T::from_field(value).map_err(|got| RepositoryError::TypeMismatch {
                entity: self.table,
                field: field.to_string(),
                expected: T::KIND.to_string(),
                actual: got.kind_name(),
            }),
            None => T::from_null().ok_or(RepositoryError::MissingField {
                entity: self.table,
                field,
            }),
        }
    }
}

// ============================================================================
// Entity trait
// ============================================================================

/// A persisted record type managed by a [`Repository`](crate::Repository)
///
/// Implementors provide a static descriptor, construction from a [`Record`],
/// and application of a single validated field value.
pub trait Entity: Sized + Send + Sync + 'static {
    fn descriptor() -> &'static EntityDescriptor;

    fn id(&self) -> EntityId;

    fn timestamps(&self) -> &Timestamps;

    /// Build an instance from a row read back from the store
    fn from_record(record: Record) -> Result<Self>;

    /// Overwrite one writable field on this instance
    fn apply(&mut self, field: &str, value: FieldValue) -> Result<()>;
}

/// Convert a validated value for use inside [`Entity::apply`]
pub fn field_value<T: FromField>(
    entity: &'static str,
    field: &str,
    value: FieldValue,
) -> Result<T> {
    if value.is_null() && !T::accepts_null() {
        return Err(RepositoryError::TypeMismatch {
            entity,
            field: field.to_string(),
            expected: T::KIND.to_string(),
            actual: "null".to_string(),
        });
    }
    T::from_field(value).map_err(|got| RepositoryError::TypeMismatch {
        entity,
        field: field.to_string(),
        expected: T::KIND.to_string(),
        actual: got.kind_name(),
    })
}
