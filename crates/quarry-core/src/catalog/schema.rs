//! Schema builder - collects tables, associations and scopes, then
//! validates them into a [`Catalog`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::association::{AssociationDef, AssociationKind, ResolvedAssociation};
use super::catalog::Catalog;
use super::table::TableDef;
use crate::error::Error;
use crate::query::Query;

/// Name of the scope applied by [`Catalog::query`] at construction.
pub const DEFAULT_SCOPE: &str = "defaults";

/// A named query transformation registered on a table.
pub type ScopeFn = Arc<dyn Fn(Query) -> Query + Send + Sync>;

/// Mutable schema description, consumed by [`Schema::build`].
#[derive(Clone, Default)]
pub struct Schema {
    /// Table definitions keyed by name.
    pub tables: HashMap<String, TableDef>,
    /// Association declarations.
    pub associations: Vec<AssociationDef>,
    scopes: HashMap<(String, String), ScopeFn>,
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut scopes: Vec<String> = self
            .scopes
            .keys()
            .map(|(table, name)| format!("{}.{}", table, name))
            .collect();
        scopes.sort();
        f.debug_struct("Schema")
            .field("tables", &self.tables)
            .field("associations", &self.associations)
            .field("scopes", &scopes)
            .finish()
    }
}

impl Schema {
    /// Create an empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a table.
    pub fn with_table(mut self, table: TableDef) -> Self {
        self.tables.insert(table.name.clone(), table);
        self
    }

    /// Add an association.
    pub fn with_association(mut self, association: AssociationDef) -> Self {
        self.associations.push(association);
        self
    }

    /// Register a named scope on a table.
    pub fn with_scope<F>(mut self, table: impl Into<String>, name: impl Into<String>, scope: F) -> Self
    where
        F: Fn(Query) -> Query + Send + Sync + 'static,
    {
        self.scopes.insert((table.into(), name.into()), Arc::new(scope));
        self
    }

    /// Register the scope applied whenever a query on `table` is created.
    pub fn with_default_scope<F>(self, table: impl Into<String>, scope: F) -> Self
    where
        F: Fn(Query) -> Query + Send + Sync + 'static,
    {
        self.with_scope(table, DEFAULT_SCOPE, scope)
    }

    /// Validate the schema and freeze it into a shareable catalog.
    pub fn build(self) -> Result<Arc<Catalog>, Error> {
        for table in self.tables.values() {
            if let Some(pk) = &table.primary_key {
                if table.get_column(pk).is_none() {
                    return Err(Error::InvalidSchema(format!(
                        "primary key {}.{} is not a declared column",
                        table.name, pk
                    )));
                }
            }
        }

        let mut associations = HashMap::new();
        for def in &self.associations {
            let resolved = self.resolve(def)?;
            let key = (def.source_table.clone(), def.name.clone());
            if associations.insert(key, resolved).is_some() {
                return Err(Error::InvalidSchema(format!(
                    "association `{}` declared twice on {}",
                    def.name, def.source_table
                )));
            }
        }

        for (table, scope) in self.scopes.keys() {
            if !self.tables.contains_key(table) {
                return Err(Error::InvalidSchema(format!(
                    "scope `{}` registered on unknown table {}",
                    scope, table
                )));
            }
        }

        Ok(Arc::new(Catalog::from_parts(
            self.tables,
            associations,
            self.scopes,
        )))
    }

    fn resolve(&self, def: &AssociationDef) -> Result<ResolvedAssociation, Error> {
        let source = self.table_for(def, &def.source_table)?;
        let target = self.table_for(def, &def.target_table)?;

        // `has_*` keeps the foreign key on the target; `belongs_to` on the source.
        let (key_table, fk_table) = match def.kind {
            AssociationKind::HasMany | AssociationKind::HasOne => (source, target),
            AssociationKind::BelongsTo => (target, source),
        };

        let key_name = match &def.local_key {
            Some(key) => key.as_str(),
            None => key_table.primary_key.as_deref().ok_or_else(|| {
                Error::InvalidSchema(format!(
                    "association `{}` on {} needs a local key: {} has no primary key",
                    def.name, def.source_table, key_table.name
                ))
            })?,
        };

        let key = key_table.column_ref(key_name).ok_or_else(|| {
            Error::InvalidSchema(format!(
                "association `{}` on {}: key column {}.{} does not exist",
                def.name, def.source_table, key_table.name, key_name
            ))
        })?;
        let fk = fk_table.column_ref(&def.foreign_key).ok_or_else(|| {
            Error::InvalidSchema(format!(
                "association `{}` on {}: foreign key {}.{} does not exist",
                def.name, def.source_table, fk_table.name, def.foreign_key
            ))
        })?;

        let (source_col, target_col) = match def.kind {
            AssociationKind::HasMany | AssociationKind::HasOne => (key, fk),
            AssociationKind::BelongsTo => (fk, key),
        };

        Ok(ResolvedAssociation {
            def: def.clone(),
            source: source_col,
            target: target_col,
        })
    }

    fn table_for(&self, def: &AssociationDef, name: &str) -> Result<&TableDef, Error> {
        self.tables.get(name).ok_or_else(|| {
            Error::InvalidSchema(format!(
                "association `{}` on {} references unknown table {}",
                def.name, def.source_table, name
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ScalarType;

    fn users() -> TableDef {
        TableDef::new("users")
            .with_primary_key("id")
            .column("id", ScalarType::Int64)
            .column("name", ScalarType::String)
    }

    fn posts() -> TableDef {
        TableDef::new("posts")
            .with_primary_key("id")
            .column("id", ScalarType::Int64)
            .column("user_id", ScalarType::Int64)
    }

    #[test]
    fn test_schema_builds_catalog() {
        let catalog = Schema::new()
            .with_table(users())
            .with_table(posts())
            .with_association(AssociationDef::has_many("users", "posts", "posts", "user_id"))
            .with_association(AssociationDef::belongs_to("posts", "user", "users", "user_id"))
            .build()
            .unwrap();

        let posts = catalog.association("users", "posts").unwrap();
        assert_eq!(posts.source.qualified(), "users.id");
        assert_eq!(posts.target.qualified(), "posts.user_id");

        let user = catalog.association("posts", "user").unwrap();
        assert_eq!(user.source.qualified(), "posts.user_id");
        assert_eq!(user.target.qualified(), "users.id");
    }

    #[test]
    fn test_rejects_missing_primary_key_column() {
        let table = TableDef::new("users").with_primary_key("id");
        let err = Schema::new().with_table(table).build().unwrap_err();
        assert!(matches!(err, Error::InvalidSchema(_)));
    }

    #[test]
    fn test_rejects_unknown_target() {
        let err = Schema::new()
            .with_table(users())
            .with_association(AssociationDef::has_many("users", "posts", "posts", "user_id"))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("unknown table posts"));
    }

    #[test]
    fn test_rejects_missing_foreign_key() {
        let err = Schema::new()
            .with_table(users())
            .with_table(posts())
            .with_association(AssociationDef::has_many("users", "posts", "posts", "author_id"))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("posts.author_id"));
    }

    #[test]
    fn test_rejects_keyless_association() {
        let logs = TableDef::new("logs").column("user_id", ScalarType::Int64);
        let keyless_users = TableDef::new("users").column("id", ScalarType::Int64);
        let err = Schema::new()
            .with_table(keyless_users)
            .with_table(logs)
            .with_association(AssociationDef::has_many("users", "logs", "logs", "user_id"))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("needs a local key"));
    }

    #[test]
    fn test_rejects_scope_on_unknown_table() {
        let err = Schema::new()
            .with_table(users())
            .with_scope("accounts", "active", |q| q)
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidSchema(_)));
    }
}
