//! Validated, immutable schema catalog.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use quarry_proto::{ColumnRef, Descriptor};

use super::association::ResolvedAssociation;
use super::schema::{ScopeFn, DEFAULT_SCOPE};
use super::table::TableDef;
use crate::error::Error;
use crate::query::Query;

/// A table together with the column handles every descriptor shares.
struct TableEntry {
    def: TableDef,
    columns: Arc<Vec<ColumnRef>>,
    primary_key: Option<ColumnRef>,
}

/// The schema the query engine resolves names against.
///
/// Built once through [`Schema::build`](super::Schema::build) and shared
/// behind an `Arc`; queries keep a handle to it for column and association
/// lookups.
pub struct Catalog {
    tables: HashMap<String, TableEntry>,
    associations: HashMap<(String, String), ResolvedAssociation>,
    scopes: HashMap<(String, String), ScopeFn>,
}

impl fmt::Debug for Catalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Catalog")
            .field("tables", &self.table_names())
            .field("associations", &self.associations.len())
            .field("scopes", &self.scopes.len())
            .finish()
    }
}

impl Catalog {
    pub(crate) fn from_parts(
        tables: HashMap<String, TableDef>,
        associations: HashMap<(String, String), ResolvedAssociation>,
        scopes: HashMap<(String, String), ScopeFn>,
    ) -> Self {
        let tables = tables
            .into_iter()
            .map(|(name, def)| {
                let entry = TableEntry {
                    columns: Arc::new(def.column_refs()),
                    primary_key: def.primary_key_ref(),
                    def,
                };
                (name, entry)
            })
            .collect();

        Self {
            tables,
            associations,
            scopes,
        }
    }

    /// Get a table definition by name.
    pub fn table(&self, name: &str) -> Option<&TableDef> {
        self.tables.get(name).map(|e| &e.def)
    }

    /// All table names, sorted.
    pub fn table_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tables.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Resolve a column on a table.
    pub fn column(&self, table: &str, column: &str) -> Result<ColumnRef, Error> {
        let entry = self.entry(table)?;
        entry
            .columns
            .iter()
            .find(|c| c.name == column)
            .cloned()
            .ok_or_else(|| Error::UnknownColumn {
                table: table.to_string(),
                column: column.to_string(),
            })
    }

    /// Column handles of a table, in declaration order.
    pub fn columns(&self, table: &str) -> Result<Arc<Vec<ColumnRef>>, Error> {
        Ok(self.entry(table)?.columns.clone())
    }

    /// Primary key of a table, if it declares one.
    pub fn primary_key(&self, table: &str) -> Result<Option<ColumnRef>, Error> {
        Ok(self.entry(table)?.primary_key.clone())
    }

    /// Look up an association declared on `table`.
    pub fn association(&self, table: &str, name: &str) -> Option<&ResolvedAssociation> {
        self.associations
            .get(&(table.to_string(), name.to_string()))
    }

    /// Look up an association or fail with [`Error::UnknownAssociation`].
    pub fn resolve_association(
        &self,
        table: &str,
        name: &str,
    ) -> Result<&ResolvedAssociation, Error> {
        self.association(table, name)
            .ok_or_else(|| Error::UnknownAssociation {
                table: table.to_string(),
                association: name.to_string(),
            })
    }

    /// Associations declared on `table`, sorted by name.
    pub fn associations_of(&self, table: &str) -> Vec<&ResolvedAssociation> {
        let mut out: Vec<&ResolvedAssociation> = self
            .associations
            .iter()
            .filter(|((source, _), _)| source == table)
            .map(|(_, assoc)| assoc)
            .collect();
        out.sort_by(|a, b| a.name().cmp(b.name()));
        out
    }

    /// Look up a named scope.
    pub fn scope(&self, table: &str, name: &str) -> Option<&ScopeFn> {
        self.scopes.get(&(table.to_string(), name.to_string()))
    }

    /// An unconstrained descriptor over `table`.
    pub fn descriptor(&self, table: &str) -> Result<Descriptor, Error> {
        let entry = self.entry(table)?;
        Ok(Descriptor::new(
            table,
            entry.columns.clone(),
            entry.primary_key.clone(),
        ))
    }

    /// Start a query on `table`, applying its `defaults` scope once.
    pub fn query(self: &Arc<Self>, table: &str) -> Result<Query, Error> {
        let query = self.unscoped(table)?;
        Ok(match self.scope(table, DEFAULT_SCOPE) {
            Some(scope) => scope(query),
            None => query,
        })
    }

    /// Start a query on `table` without applying any scope.
    pub fn unscoped(self: &Arc<Self>, table: &str) -> Result<Query, Error> {
        let descriptor = self.descriptor(table)?;
        Ok(Query::from_descriptor(self.clone(), descriptor))
    }

    fn entry(&self, table: &str) -> Result<&TableEntry, Error> {
        self.tables
            .get(table)
            .ok_or_else(|| Error::UnknownTable(table.to_string()))
    }
}
