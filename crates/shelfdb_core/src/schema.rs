//! Schema registry.
//!
//! A [`Schema`] maps collection names to field definitions. It is fixed
//! for the life of an [`Engine`](crate::Engine) and drives store creation
//! whenever the database is opened at a newer version.

use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::record::Record;
use serde::{Deserialize, Serialize};
use shelfdb_codec::Value;
use shelfdb_storage::{IndexSpec, StorageResult, StoreOptions, VersionChange};
use std::collections::BTreeMap;
use std::fmt;

/// Semantic type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    /// 64-bit signed integer.
    #[serde(rename = "integer", alias = "int")]
    Integer,
    /// UTF-8 text.
    #[serde(rename = "string", alias = "str")]
    String,
    /// Anything else; never type checked.
    #[serde(rename = "other")]
    Other,
}

impl FieldType {
    /// Returns true if `value` has this type. `Null` never matches.
    #[must_use]
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            FieldType::Integer => matches!(value, Value::Integer(_)),
            FieldType::String => matches!(value, Value::Text(_)),
            FieldType::Other => !value.is_null(),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Integer => write!(f, "integer"),
            FieldType::String => write!(f, "string"),
            FieldType::Other => write!(f, "other"),
        }
    }
}

/// Definition of one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldDef {
    /// Semantic type.
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Whether this field is the collection's primary key.
    #[serde(default, skip_serializing_if = "is_false")]
    pub primary: bool,
    /// Whether a lookup index is kept for this field.
    #[serde(default, skip_serializing_if = "is_false")]
    pub indexed: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl FieldDef {
    /// Creates a field definition of the given type.
    #[must_use]
    pub const fn new(field_type: FieldType) -> Self {
        Self {
            field_type,
            primary: false,
            indexed: false,
        }
    }

    /// An integer field.
    #[must_use]
    pub const fn integer() -> Self {
        Self::new(FieldType::Integer)
    }

    /// A string field.
    #[must_use]
    pub const fn string() -> Self {
        Self::new(FieldType::String)
    }

    /// An untyped field.
    #[must_use]
    pub const fn other() -> Self {
        Self::new(FieldType::Other)
    }

    /// Marks the field as the primary key.
    #[must_use]
    pub const fn primary(mut self) -> Self {
        self.primary = true;
        self
    }

    /// Marks the field as indexed.
    #[must_use]
    pub const fn indexed(mut self) -> Self {
        self.indexed = true;
        self
    }
}

/// Field definitions for one collection, before validation.
///
/// ```rust
/// use shelfdb_core::{CollectionDef, FieldDef};
///
/// let user = CollectionDef::new()
///     .field("id", FieldDef::integer().primary())
///     .field("name", FieldDef::string().indexed())
///     .field("age", FieldDef::integer());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CollectionDef {
    fields: BTreeMap<String, FieldDef>,
    auto_increment: Option<bool>,
}

impl CollectionDef {
    /// Creates an empty definition.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a field.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, def: FieldDef) -> Self {
        self.fields.insert(name.into(), def);
        self
    }

    /// Overrides key generation. Defaults to on for integer primary keys.
    #[must_use]
    pub fn auto_increment(mut self, value: bool) -> Self {
        self.auto_increment = Some(value);
        self
    }
}

impl From<BTreeMap<String, FieldDef>> for CollectionDef {
    fn from(fields: BTreeMap<String, FieldDef>) -> Self {
        Self {
            fields,
            auto_increment: None,
        }
    }
}

/// A validated collection schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionSchema {
    name: String,
    fields: BTreeMap<String, FieldDef>,
    primary_key: String,
    auto_increment: bool,
}

impl CollectionSchema {
    fn build(name: String, def: CollectionDef) -> CoreResult<Self> {
        if name.is_empty() {
            return Err(CoreError::schema("collection name must not be empty"));
        }

        let primaries: Vec<&String> = def
            .fields
            .iter()
            .filter(|(_, field)| field.primary)
            .map(|(field, _)| field)
            .collect();
        let primary_key = match primaries.as_slice() {
            [single] => (*single).clone(),
            [] => {
                return Err(CoreError::schema(format!(
                    "collection '{name}' has no primary field"
                )))
            }
            many => {
                return Err(CoreError::schema(format!(
                    "collection '{name}' has {} primary fields, expected exactly one",
                    many.len()
                )))
            }
        };

        let key_type = def.fields[&primary_key].field_type;
        let auto_increment = def
            .auto_increment
            .unwrap_or(key_type == FieldType::Integer);
        if auto_increment && key_type != FieldType::Integer {
            return Err(CoreError::schema(format!(
                "collection '{name}': only integer primary keys can auto-increment"
            )));
        }

        Ok(Self {
            name,
            fields: def.fields,
            primary_key,
            auto_increment,
        })
    }

    /// Collection name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the primary key field.
    #[must_use]
    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    /// Whether missing keys are generated.
    #[must_use]
    pub fn auto_increment(&self) -> bool {
        self.auto_increment
    }

    /// Returns a field definition.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.get(name)
    }

    /// Iterates over field definitions in name order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldDef)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Names of indexed fields.
    pub fn indexed_fields(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(|(_, def)| def.indexed)
            .map(|(name, _)| name.as_str())
    }

    /// Returns true if `field` has a declared index.
    #[must_use]
    pub fn is_indexed(&self, field: &str) -> bool {
        self.fields.get(field).is_some_and(|def| def.indexed)
    }

    /// Checks a record about to be written.
    ///
    /// The primary key must hold a value of its declared type, or be absent
    /// when keys are generated. Other fields are checked per `config`.
    pub fn validate(&self, record: &Record, config: &Config) -> CoreResult<()> {
        let key_def = &self.fields[&self.primary_key];
        match record.get(&self.primary_key) {
            None | Some(Value::Null) if self.auto_increment => {}
            None | Some(Value::Null) => {
                return Err(CoreError::validation(
                    &self.name,
                    format!("missing primary key '{}'", self.primary_key),
                ))
            }
            Some(key) if !key_def.field_type.accepts(key) => {
                return Err(self.type_mismatch(&self.primary_key, key_def, key));
            }
            Some(Value::Integer(_) | Value::Text(_) | Value::Bytes(_)) => {}
            Some(other) => {
                return Err(CoreError::validation(
                    &self.name,
                    format!("{} cannot be a primary key", other.type_name()),
                ))
            }
        }

        for (field, value) in record.iter() {
            match self.fields.get(field) {
                Some(def) => {
                    if config.validate_records && !value.is_null() && !def.field_type.accepts(value)
                    {
                        return Err(self.type_mismatch(field, def, value));
                    }
                }
                None if config.reject_unknown_fields => {
                    return Err(CoreError::validation(
                        &self.name,
                        format!("unknown field '{field}'"),
                    ));
                }
                None => {}
            }
        }
        Ok(())
    }

    fn type_mismatch(&self, field: &str, def: &FieldDef, value: &Value) -> CoreError {
        CoreError::validation(
            &self.name,
            format!(
                "field '{field}' expects {}, found {}",
                def.field_type,
                value.type_name()
            ),
        )
    }

    fn store_options(&self) -> StoreOptions {
        StoreOptions {
            key_path: self.primary_key.clone(),
            auto_increment: self.auto_increment,
        }
    }
}

/// The full set of collection schemas for one database.
///
/// ```rust
/// use shelfdb_core::{CollectionDef, FieldDef, Schema};
///
/// let schema = Schema::define([(
///     "user",
///     CollectionDef::new()
///         .field("id", FieldDef::integer().primary())
///         .field("name", FieldDef::string()),
/// )])
/// .unwrap();
/// assert_eq!(schema.collection("user").unwrap().primary_key(), "id");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    collections: BTreeMap<String, CollectionSchema>,
}

impl Schema {
    /// Validates and builds a schema.
    ///
    /// # Errors
    ///
    /// Fails with `Schema` if a collection has zero or several primary
    /// fields, or a collection name repeats.
    pub fn define<I, N>(collections: I) -> CoreResult<Self>
    where
        I: IntoIterator<Item = (N, CollectionDef)>,
        N: Into<String>,
    {
        let mut built = BTreeMap::new();
        for (name, def) in collections {
            let name = name.into();
            if built.contains_key(&name) {
                return Err(CoreError::schema(format!(
                    "collection '{name}' defined twice"
                )));
            }
            let schema = CollectionSchema::build(name.clone(), def)?;
            built.insert(name, schema);
        }
        Ok(Self {
            collections: built,
        })
    }

    /// Parses a schema from JSON of the form
    /// `{"user": {"id": {"type": "int", "primary": true}}}`.
    pub fn from_json(json: &str) -> CoreResult<Self> {
        let raw: BTreeMap<String, BTreeMap<String, FieldDef>> = serde_json::from_str(json)
            .map_err(|e| CoreError::schema(format!("invalid schema JSON: {e}")))?;
        Self::define(
            raw.into_iter()
                .map(|(name, fields)| (name, CollectionDef::from(fields))),
        )
    }

    /// Renders the schema as pretty JSON.
    pub fn to_json(&self) -> CoreResult<String> {
        let raw: BTreeMap<&str, &BTreeMap<String, FieldDef>> = self
            .collections
            .iter()
            .map(|(name, schema)| (name.as_str(), &schema.fields))
            .collect();
        serde_json::to_string_pretty(&raw)
            .map_err(|e| CoreError::schema(format!("cannot render schema: {e}")))
    }

    /// Returns one collection's schema.
    #[must_use]
    pub fn collection(&self, name: &str) -> Option<&CollectionSchema> {
        self.collections.get(name)
    }

    /// Returns one collection's schema or a query error.
    pub fn require(&self, name: &str) -> CoreResult<&CollectionSchema> {
        self.collection(name)
            .ok_or_else(|| CoreError::unknown_collection(name))
    }

    /// Collection names in order.
    pub fn collection_names(&self) -> impl Iterator<Item = &str> {
        self.collections.keys().map(String::as_str)
    }

    /// Iterates over collection schemas.
    pub fn collections(&self) -> impl Iterator<Item = &CollectionSchema> {
        self.collections.values()
    }

    /// Brings a backing database up to this schema.
    ///
    /// Creates missing stores and missing indexes; existing ones are left
    /// alone, so running it again is a no-op. Nothing is ever dropped.
    pub fn upgrade(&self, change: &mut dyn VersionChange) -> StorageResult<()> {
        tracing::debug!(
            old_version = change.old_version(),
            new_version = change.new_version(),
            "applying schema upgrade"
        );
        for schema in self.collections.values() {
            if !change.contains_store(&schema.name) {
                change.create_store(&schema.name, schema.store_options())?;
            }
            for field in schema.indexed_fields() {
                if !change.contains_index(&schema.name, field) {
                    change.create_index(&schema.name, IndexSpec::on_field(field))?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shelfdb_storage::{BackingEngine, LocalEngine, TxMode};

    fn user_def() -> CollectionDef {
        CollectionDef::new()
            .field("id", FieldDef::integer().primary())
            .field("name", FieldDef::string().indexed())
            .field("age", FieldDef::integer())
    }

    fn user_schema() -> Schema {
        Schema::define([("user", user_def())]).unwrap()
    }

    #[test]
    fn exactly_one_primary_required() {
        let none = CollectionDef::new().field("name", FieldDef::string());
        assert!(matches!(
            Schema::define([("user", none)]),
            Err(CoreError::Schema { .. })
        ));

        let two = CollectionDef::new()
            .field("id", FieldDef::integer().primary())
            .field("email", FieldDef::string().primary());
        assert!(matches!(
            Schema::define([("user", two)]),
            Err(CoreError::Schema { .. })
        ));

        assert!(matches!(
            Schema::define([("user", user_def()), ("user", user_def())]),
            Err(CoreError::Schema { .. })
        ));
    }

    #[test]
    fn auto_increment_follows_key_type() {
        let schema = Schema::define([
            ("user", user_def()),
            (
                "tag",
                CollectionDef::new().field("label", FieldDef::string().primary()),
            ),
        ])
        .unwrap();
        assert!(schema.collection("user").unwrap().auto_increment());
        assert!(!schema.collection("tag").unwrap().auto_increment());

        let bad = CollectionDef::new()
            .field("label", FieldDef::string().primary())
            .auto_increment(true);
        assert!(Schema::define([("tag", bad)]).is_err());
    }

    #[test]
    fn from_json_accepts_short_type_names() {
        let schema = Schema::from_json(
            r#"{"user": {
                "id": {"type": "int", "primary": true},
                "name": {"type": "str", "indexed": true},
                "meta": {"type": "other"}
            }}"#,
        )
        .unwrap();
        let user = schema.collection("user").unwrap();
        assert_eq!(user.primary_key(), "id");
        assert!(user.is_indexed("name"));
        assert_eq!(user.field("meta").unwrap().field_type, FieldType::Other);

        let again = Schema::from_json(&schema.to_json().unwrap()).unwrap();
        assert_eq!(again, schema);

        assert!(Schema::from_json(r#"{"user": {"id": {"type": "float"}}}"#).is_err());
    }

    #[test]
    fn validate_checks_types() {
        let schema = user_schema();
        let user = schema.collection("user").unwrap();
        let config = Config::default();

        let ok = Record::new().with("name", "Marcus").with("age", 30);
        user.validate(&ok, &config).unwrap();

        let bad_age = Record::new().with("name", "Marcus").with("age", "thirty");
        assert!(matches!(
            user.validate(&bad_age, &config),
            Err(CoreError::Validation { .. })
        ));
        user.validate(&bad_age, &Config::new().validate_records(false))
            .unwrap();

        let bad_key = Record::new().with("id", "one");
        assert!(user
            .validate(&bad_key, &Config::new().validate_records(false))
            .is_err());
    }

    #[test]
    fn validate_unknown_fields() {
        let schema = user_schema();
        let user = schema.collection("user").unwrap();
        let record = Record::new().with("name", "Marcus").with("nickname", "M");

        user.validate(&record, &Config::default()).unwrap();
        assert!(user
            .validate(&record, &Config::new().reject_unknown_fields(true))
            .is_err());
    }

    #[test]
    fn missing_key_without_generator() {
        let schema = Schema::define([(
            "tag",
            CollectionDef::new().field("label", FieldDef::string().primary()),
        )])
        .unwrap();
        let tag = schema.collection("tag").unwrap();
        assert!(tag.validate(&Record::new(), &Config::default()).is_err());
        tag.validate(&Record::new().with("label", "red"), &Config::default())
            .unwrap();
    }

    #[test]
    fn upgrade_is_idempotent() {
        let schema = user_schema();
        let engine = LocalEngine::in_memory();
        engine
            .open("app", 1, &mut |change| schema.upgrade(change))
            .unwrap();

        let mut runs = 0;
        let db = engine
            .open("app", 2, &mut |change| {
                runs += 1;
                assert!(change.contains_store("user"));
                assert!(change.contains_index("user", "name"));
                schema.upgrade(change)
            })
            .unwrap();
        assert_eq!(runs, 1);
        assert_eq!(db.store_names(), vec!["user".to_string()]);
        db.transaction(&["user"], TxMode::ReadOnly).unwrap();
    }

    #[test]
    fn upgrade_adds_index_to_existing_store() {
        let engine = LocalEngine::in_memory();
        let plain = Schema::define([(
            "user",
            CollectionDef::new()
                .field("id", FieldDef::integer().primary())
                .field("name", FieldDef::string()),
        )])
        .unwrap();
        engine
            .open("app", 1, &mut |change| plain.upgrade(change))
            .unwrap();

        let indexed = user_schema();
        engine
            .open("app", 2, &mut |change| {
                assert!(!change.contains_index("user", "name"));
                indexed.upgrade(change)?;
                assert!(change.contains_index("user", "name"));
                Ok(())
            })
            .unwrap();
    }
}
