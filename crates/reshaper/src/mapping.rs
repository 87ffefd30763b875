//! Declarative mapping definitions.
//!
//! A [`Mapping`] describes how one source table becomes one destination
//! table: which columns copy across, which are constants, which are foreign
//! keys requiring recursive resolution, and which fan out into relation
//! tables. Mappings are built explicitly with chained builder methods; the
//! field declaration order is the resolution order.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use reshaper::{Field, Mapping};
//!
//! let author = Arc::new(
//!     Mapping::new("author", "new_author")
//!         .source_table("author")
//!         .link_column("author_id")
//!         .field("author_name", Field::direct("name"))
//!         .field("author_age", Field::direct("age")),
//! );
//!
//! let movie = Mapping::new("movie", "new_movie")
//!     .source_table("movie")
//!     .field("title", Field::direct("title"))
//!     .field(
//!         "author_id",
//!         Field::relation("author_id", "movie_author", "movie_id").via(author),
//!     );
//! ```

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::value::Value;

/// A pure value-transforming function applied during field evaluation.
///
/// Filters chain left-to-right: the output of one feeds the next.
pub type Filter = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// A side-effecting function invoked with the final filtered value.
///
/// Actions never alter the resolved value.
pub type Action = Arc<dyn Fn(&Value) + Send + Sync>;

/// Deduplication strategy for a mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dedup {
    /// Always insert a fresh destination row.
    #[default]
    Insert,

    /// Look the row up by the mapping's unique key first and reuse the
    /// existing destination primary key when found.
    GetOrCreate,
}

/// Where a resolved related key lands in a relation (join) table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationTarget {
    /// Relation table receiving the deferred row.
    pub table: String,

    /// Column of the relation table that carries the parent's generated key.
    pub parent_column: String,
}

/// Behavior variant of a field. Exactly one applies per declared attribute.
#[derive(Clone)]
pub enum FieldKind {
    /// Copy the (filtered) source value straight into the payload.
    Direct,

    /// Emit a fixed value regardless of the source row.
    Constant(Value),

    /// Resolve a foreign key, recursing into `mapping` when present.
    ForeignKey {
        /// Mapping for the referenced table. When absent the raw source
        /// value is reused verbatim as the destination key.
        mapping: Option<Arc<Mapping>>,
        /// Insert a new related row (`true`) or only look one up (`false`).
        create: bool,
        /// When set, the resolved key is staged into this relation table
        /// instead of occupying a column of the parent payload.
        through: Option<RelationTarget>,
    },

    /// Fan the source value out into one or more relation-table rows.
    Relation {
        /// Join table and parent link column.
        target: RelationTarget,
        /// Nested mappings; each stages its own relation-table row.
        mappings: Vec<Arc<Mapping>>,
    },
}

/// One column-level rule within a [`Mapping`].
#[derive(Clone)]
pub struct Field {
    pub(crate) source_column: Option<String>,
    pub(crate) destination_column: Option<String>,
    pub(crate) filters: Vec<Filter>,
    pub(crate) actions: Vec<Action>,
    pub(crate) kind: FieldKind,
}

impl Field {
    fn with_kind(source_column: Option<String>, kind: FieldKind) -> Self {
        Self {
            source_column,
            destination_column: None,
            filters: Vec::new(),
            actions: Vec::new(),
            kind,
        }
    }

    /// A direct-copy field reading from `source_column`.
    pub fn direct(source_column: impl Into<String>) -> Self {
        Self::with_kind(Some(source_column.into()), FieldKind::Direct)
    }

    /// A constant-value field; the source row is never consulted.
    pub fn constant(value: impl Into<Value>) -> Self {
        Self::with_kind(None, FieldKind::Constant(value.into()))
    }

    /// A foreign-key field reading the raw key from `source_column`.
    pub fn foreign_key(source_column: impl Into<String>) -> Self {
        Self::with_kind(
            Some(source_column.into()),
            FieldKind::ForeignKey {
                mapping: None,
                create: true,
                through: None,
            },
        )
    }

    /// A relation field staging rows into `relation_table`, where
    /// `parent_column` names the relation-table column that will carry the
    /// parent row's generated key.
    pub fn relation(
        source_column: impl Into<String>,
        relation_table: impl Into<String>,
        parent_column: impl Into<String>,
    ) -> Self {
        Self::with_kind(
            Some(source_column.into()),
            FieldKind::Relation {
                target: RelationTarget {
                    table: relation_table.into(),
                    parent_column: parent_column.into(),
                },
                mappings: Vec::new(),
            },
        )
    }

    /// Override the output column name (defaults to the attribute name).
    pub fn destination(mut self, column: impl Into<String>) -> Self {
        self.destination_column = Some(column.into());
        self
    }

    /// Append a pure value filter; filters apply in declaration order.
    pub fn filter(mut self, f: impl Fn(Value) -> Value + Send + Sync + 'static) -> Self {
        self.filters.push(Arc::new(f));
        self
    }

    /// Append a side-effecting action; actions run after all filters.
    pub fn action(mut self, a: impl Fn(&Value) + Send + Sync + 'static) -> Self {
        self.actions.push(Arc::new(a));
        self
    }

    /// Attach the mapping for the referenced table (foreign-key fields).
    ///
    /// # Panics
    ///
    /// Panics if called on a non-foreign-key field; this is a mapping
    /// declaration bug, not a runtime condition.
    pub fn resolve_with(mut self, nested: Arc<Mapping>) -> Self {
        match &mut self.kind {
            FieldKind::ForeignKey { mapping, .. } => *mapping = Some(nested),
            _ => panic!("resolve_with only applies to foreign-key fields"),
        }
        self
    }

    /// Only look up the related destination row, never insert one
    /// (foreign-key fields).
    pub fn lookup_only(mut self) -> Self {
        match &mut self.kind {
            FieldKind::ForeignKey { create, .. } => *create = false,
            _ => panic!("lookup_only only applies to foreign-key fields"),
        }
        self
    }

    /// Route the resolved key through a relation table instead of a parent
    /// column (foreign-key fields).
    pub fn through(
        mut self,
        relation_table: impl Into<String>,
        parent_column: impl Into<String>,
    ) -> Self {
        match &mut self.kind {
            FieldKind::ForeignKey { through, .. } => {
                *through = Some(RelationTarget {
                    table: relation_table.into(),
                    parent_column: parent_column.into(),
                })
            }
            _ => panic!("through only applies to foreign-key fields"),
        }
        self
    }

    /// Add a nested mapping to a relation field. May be called repeatedly;
    /// each mapping fans out into its own relation-table row.
    pub fn via(mut self, nested: Arc<Mapping>) -> Self {
        match &mut self.kind {
            FieldKind::Relation { mappings, .. } => mappings.push(nested),
            _ => panic!("via only applies to relation fields"),
        }
        self
    }

    /// Pipe `raw` through the filter chain without running actions.
    pub(crate) fn apply_filters(&self, raw: Value) -> Value {
        let mut value = raw;
        for filter in &self.filters {
            value = filter(value);
        }
        value
    }

    /// Apply this field's filter chain, then run its actions.
    ///
    /// Filters pipe left-to-right; actions receive the final value and
    /// cannot change it. A field with neither yields the raw value.
    pub fn evaluate(&self, raw: Value) -> Value {
        let value = self.apply_filters(raw);
        for action in &self.actions {
            action(&value);
        }
        value
    }
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.kind {
            FieldKind::Direct => "direct",
            FieldKind::Constant(_) => "constant",
            FieldKind::ForeignKey { .. } => "foreign_key",
            FieldKind::Relation { .. } => "relation",
        };
        f.debug_struct("Field")
            .field("kind", &kind)
            .field("source_column", &self.source_column)
            .field("destination_column", &self.destination_column)
            .field("filters", &self.filters.len())
            .field("actions", &self.actions.len())
            .finish()
    }
}

/// Declarative description of how one source table maps to one destination
/// table.
#[derive(Clone)]
pub struct Mapping {
    name: String,
    source_table: Option<String>,
    destination_table: String,
    unique_key: Option<String>,
    link_column: Option<String>,
    commit: bool,
    method: Dedup,
    fields: IndexMap<String, Field>,
}

impl Mapping {
    /// Start a mapping named `name` that writes into `destination_table`.
    ///
    /// The name identifies the mapping in checkpoint keys and logs.
    pub fn new(name: impl Into<String>, destination_table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source_table: None,
            destination_table: destination_table.into(),
            unique_key: None,
            link_column: None,
            commit: true,
            method: Dedup::Insert,
            fields: IndexMap::new(),
        }
    }

    /// Set the source table to scan. Optional: nested building-block
    /// mappings may be fed rows directly by their parent.
    pub fn source_table(mut self, table: impl Into<String>) -> Self {
        self.source_table = Some(table.into());
        self
    }

    /// Set the source column used for get-or-create lookups against the
    /// destination.
    pub fn unique_key(mut self, column: impl Into<String>) -> Self {
        self.unique_key = Some(column.into());
        self
    }

    /// Set the relation-table column that carries this mapping's generated
    /// key when it is staged through a relation table.
    pub fn link_column(mut self, column: impl Into<String>) -> Self {
        self.link_column = Some(column.into());
        self
    }

    /// Resolve rows in memory only; never insert into the destination.
    ///
    /// Used when this mapping is a pure data-shaping step for a parent.
    pub fn uncommitted(mut self) -> Self {
        self.commit = false;
        self
    }

    /// Deduplicate via unique-key lookup before every insert.
    ///
    /// Requires [`unique_key`](Mapping::unique_key); the absence is
    /// reported as a configuration error when the mapping is resolved.
    pub fn get_or_create(mut self) -> Self {
        self.method = Dedup::GetOrCreate;
        self
    }

    /// Declare a named field. Declaration order is resolution order.
    pub fn field(mut self, attribute: impl Into<String>, field: Field) -> Self {
        self.fields.insert(attribute.into(), field);
        self
    }

    /// Mapping name (checkpoint namespace).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Source table, if this mapping scans one.
    pub fn source(&self) -> Option<&str> {
        self.source_table.as_deref()
    }

    /// Destination table.
    pub fn destination(&self) -> &str {
        &self.destination_table
    }

    /// Unique-key source column, if declared.
    pub fn unique(&self) -> Option<&str> {
        self.unique_key.as_deref()
    }

    /// Relation-table column carrying this mapping's generated key.
    pub fn link(&self) -> Option<&str> {
        self.link_column.as_deref()
    }

    /// Whether resolving this mapping performs a destination insert.
    pub fn commits(&self) -> bool {
        self.commit
    }

    /// Deduplication strategy.
    pub fn method(&self) -> Dedup {
        self.method
    }

    /// Declared fields in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Field)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Destination column that a given source column resolves to.
    ///
    /// Falls back to the source column name when no field reads from it,
    /// so unique-key lookups still work for pass-through schemas.
    pub fn destination_column_for(&self, source_column: &str) -> String {
        for (attribute, field) in &self.fields {
            if field.source_column.as_deref() == Some(source_column) {
                return field
                    .destination_column
                    .clone()
                    .unwrap_or_else(|| attribute.clone());
            }
        }
        source_column.to_string()
    }
}

impl fmt::Debug for Mapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mapping")
            .field("name", &self.name)
            .field("source_table", &self.source_table)
            .field("destination_table", &self.destination_table)
            .field("unique_key", &self.unique_key)
            .field("commit", &self.commit)
            .field("method", &self.method)
            .field("fields", &self.fields.keys().collect::<Vec<_>>())
            .finish()
    }
}
