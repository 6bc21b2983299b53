//! Association declarations between tables.

use quarry_proto::ColumnRef;
use serde::{Deserialize, Serialize};

/// Kind of association.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssociationKind {
    /// Many target rows carry a foreign key to this row.
    HasMany,
    /// One target row carries a foreign key to this row.
    HasOne,
    /// This row carries a foreign key to one target row.
    BelongsTo,
}

impl AssociationKind {
    /// Whether the association yields a collection.
    pub fn is_collection(&self) -> bool {
        matches!(self, AssociationKind::HasMany)
    }
}

/// An association declared on a source table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssociationDef {
    /// Association name (unique per source table).
    pub name: String,
    /// Table declaring the association.
    pub source_table: String,
    /// Association kind.
    pub kind: AssociationKind,
    /// Associated table.
    pub target_table: String,
    /// Foreign key column. Lives on the target for `has_*`, on the source
    /// for `belongs_to`.
    pub foreign_key: String,
    /// Key the foreign key points at. Defaults to the primary key of the
    /// referenced side.
    pub local_key: Option<String>,
}

impl AssociationDef {
    /// Create a has-many association.
    pub fn has_many(
        source_table: impl Into<String>,
        name: impl Into<String>,
        target_table: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self::new(AssociationKind::HasMany, source_table, name, target_table, foreign_key)
    }

    /// Create a has-one association.
    pub fn has_one(
        source_table: impl Into<String>,
        name: impl Into<String>,
        target_table: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self::new(AssociationKind::HasOne, source_table, name, target_table, foreign_key)
    }

    /// Create a belongs-to association.
    pub fn belongs_to(
        source_table: impl Into<String>,
        name: impl Into<String>,
        target_table: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self::new(AssociationKind::BelongsTo, source_table, name, target_table, foreign_key)
    }

    fn new(
        kind: AssociationKind,
        source_table: impl Into<String>,
        name: impl Into<String>,
        target_table: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            source_table: source_table.into(),
            kind,
            target_table: target_table.into(),
            foreign_key: foreign_key.into(),
            local_key: None,
        }
    }

    /// Override the referenced key.
    pub fn with_local_key(mut self, key: impl Into<String>) -> Self {
        self.local_key = Some(key.into());
        self
    }
}

/// An association with both key columns resolved against the catalog.
///
/// For every kind the association holds where `source = target`; preloads
/// select target rows whose `target` column is in the parents' `source`
/// values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAssociation {
    /// The declaration.
    pub def: AssociationDef,
    /// Key column on the source table.
    pub source: ColumnRef,
    /// Matching column on the target table.
    pub target: ColumnRef,
}

impl ResolvedAssociation {
    /// Association name.
    pub fn name(&self) -> &str {
        &self.def.name
    }

    /// Target table name.
    pub fn target_table(&self) -> &str {
        &self.def.target_table
    }
}
