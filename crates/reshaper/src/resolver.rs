//! Recursive row resolution.
//!
//! The resolver walks a row's foreign-key and relation graph bottom-up:
//! every related row is resolved (and, where applicable, inserted) before
//! the row itself, and relation-table rows are written only after the row's
//! own generated key is known. Relation writes accumulate in a pending list
//! local to one resolution pass and are flushed immediately after the
//! parent insert, so nothing leaks across rows.

use std::sync::Arc;

use async_recursion::async_recursion;
use tracing::{debug, warn};

use crate::db::{Database, PK_COLUMN};
use crate::error::{ReshapeError, Result};
use crate::mapping::{Dedup, FieldKind, Mapping, RelationTarget};
use crate::value::{Row, Value};

/// Outcome of resolving one row against a mapping.
#[derive(Debug, PartialEq)]
pub enum Resolved {
    /// The row was written; this is its generated primary key.
    Key(i64),

    /// The mapping does not commit; this is the fully resolved payload.
    Row(Row),
}

/// A relation-table row awaiting the parent's generated key.
struct PendingRelation {
    table: String,
    parent_column: String,
    row: Row,
}

/// Resolves source rows into destination inserts.
pub struct Resolver {
    source: Arc<dyn Database>,
    destination: Arc<dyn Database>,
}

impl Resolver {
    /// Create a resolver over a source and a destination database.
    pub fn new(source: Arc<dyn Database>, destination: Arc<dyn Database>) -> Self {
        Self {
            source,
            destination,
        }
    }

    /// Resolve `row` against `mapping` and, when the mapping commits,
    /// insert the result into the destination.
    ///
    /// Foreign keys and relation rows are fully resolved before the row's
    /// own insert; staged relation rows are flushed right after it.
    #[async_recursion]
    pub async fn insert(&self, mapping: &Mapping, row: &Row) -> Result<Resolved> {
        if mapping.method() == Dedup::GetOrCreate {
            return self.get_or_create(mapping, row).await.map(Resolved::Key);
        }

        let mut pending = Vec::new();
        let payload = self.resolve_fields(mapping, row, &mut pending).await?;

        if !mapping.commits() {
            return Ok(Resolved::Row(payload));
        }

        let pk = self
            .destination
            .insert_row(mapping.destination(), payload)
            .await?;
        debug!(mapping = mapping.name(), pk, "inserted destination row");
        self.flush_relations(&mut pending, pk).await?;
        Ok(Resolved::Key(pk))
    }

    /// Look the row up by the mapping's unique key, resolving and inserting
    /// only when no destination row matches. A lookup hit performs no
    /// nested resolution at all, so a unique-keyed entity's dependencies
    /// are written exactly once no matter how often it is referenced.
    #[async_recursion]
    async fn get_or_create(&self, mapping: &Mapping, row: &Row) -> Result<i64> {
        let unique = mapping.unique().ok_or_else(|| {
            ReshapeError::config(format!(
                "mapping {} uses get-or-create but declares no unique_key",
                mapping.name()
            ))
        })?;

        let column = mapping.destination_column_for(unique);
        let probe = probe_value(mapping, unique, row);
        // An absent unique value probes as the empty scalar, matching what
        // a committed row stores for a missing direct column.
        let probe = if probe.is_empty() && mapping.commits() {
            Value::Text(String::new())
        } else {
            probe
        };

        if let Some(existing) = self
            .destination
            .get_row_by_field(mapping.destination(), &column, &probe)
            .await?
        {
            let pk = existing.get(PK_COLUMN).and_then(Value::as_int).ok_or_else(|| {
                ReshapeError::query(mapping.destination(), "existing row has no integer id")
            })?;
            debug!(
                mapping = mapping.name(),
                column = %column,
                pk,
                "reusing existing destination row"
            );
            return Ok(pk);
        }

        if !mapping.commits() {
            return Err(ReshapeError::config(format!(
                "mapping {} is uncommitted and no destination row matches {} = {}",
                mapping.name(),
                column,
                probe
            )));
        }

        let mut pending = Vec::new();
        let payload = self.resolve_fields(mapping, row, &mut pending).await?;
        let pk = self
            .destination
            .insert_row(mapping.destination(), payload)
            .await?;
        self.flush_relations(&mut pending, pk).await?;
        Ok(pk)
    }

    /// Dispatch every declared field by its descriptor type, assembling the
    /// destination payload and staging deferred relation rows.
    async fn resolve_fields(
        &self,
        mapping: &Mapping,
        row: &Row,
        pending: &mut Vec<PendingRelation>,
    ) -> Result<Row> {
        let mut payload = Row::new();

        for (attribute, field) in mapping.fields() {
            // Missing source columns resolve to the empty scalar, never an
            // error: asymmetric schemas still migrate.
            let raw = match &field.kind {
                FieldKind::Constant(v) => v.clone(),
                _ => field
                    .source_column
                    .as_ref()
                    .and_then(|c| row.get(c))
                    .cloned()
                    .unwrap_or(Value::Null),
            };
            let value = field.evaluate(raw);
            let column = field
                .destination_column
                .clone()
                .unwrap_or_else(|| attribute.to_string());

            match &field.kind {
                FieldKind::Direct => {
                    let value = if value.is_empty() && mapping.commits() {
                        Value::Text(String::new())
                    } else {
                        value
                    };
                    payload.insert(column, value);
                }
                FieldKind::Constant(_) => {
                    payload.insert(column, value);
                }
                FieldKind::ForeignKey {
                    mapping: nested,
                    create,
                    through,
                } => {
                    let Some(key) = self
                        .resolve_foreign_key(nested.as_deref(), *create, &value)
                        .await?
                    else {
                        continue;
                    };
                    match through {
                        None => {
                            payload.insert(column, key);
                        }
                        Some(target) => {
                            let nested = nested.as_deref().ok_or_else(|| {
                                ReshapeError::config(format!(
                                    "foreign key {} routes through {} but has no mapping",
                                    attribute, target.table
                                ))
                            })?;
                            stage_key(pending, target, nested, &key)?;
                        }
                    }
                }
                FieldKind::Relation { target, mappings } => {
                    self.resolve_relation(row, &value, target, mappings, pending)
                        .await?;
                }
            }
        }

        Ok(payload)
    }

    /// Resolve a foreign-key value to a destination key.
    ///
    /// Empty values short-circuit to `None`; a field without a nested
    /// mapping reuses the raw value verbatim (identical identifiers are
    /// assumed across source and destination for that table).
    async fn resolve_foreign_key(
        &self,
        nested: Option<&Mapping>,
        create: bool,
        value: &Value,
    ) -> Result<Option<Value>> {
        if value.is_empty() {
            return Ok(None);
        }
        let Some(nested) = nested else {
            return Ok(Some(value.clone()));
        };

        let related = self.fetch_source_row(nested, value).await?;
        let resolved = if !create && nested.unique().is_some() {
            Resolved::Key(self.get_or_create(nested, &related).await?)
        } else {
            self.insert(nested, &related).await?
        };

        match resolved {
            Resolved::Key(pk) => Ok(Some(Value::Int(pk))),
            Resolved::Row(_) => Err(ReshapeError::config(format!(
                "mapping {} is uncommitted and cannot produce a foreign key",
                nested.name()
            ))),
        }
    }

    /// Resolve a relation field: insert (or look up) each nested mapping's
    /// row and stage the relation-table entries. Contributes nothing to the
    /// parent payload; the relation rows wait for the parent's key.
    async fn resolve_relation(
        &self,
        parent_row: &Row,
        value: &Value,
        target: &RelationTarget,
        mappings: &[Arc<Mapping>],
        pending: &mut Vec<PendingRelation>,
    ) -> Result<()> {
        if value.is_empty() {
            return Ok(());
        }
        if target.table.is_empty() {
            return Err(ReshapeError::config(
                "relation field is missing a relation table name",
            ));
        }
        if mappings.is_empty() {
            return Err(ReshapeError::config(format!(
                "relation field into {} declares no nested mappings",
                target.table
            )));
        }

        for nested in mappings {
            let related = if nested.source().is_some() {
                self.fetch_source_row(nested, value).await?
            } else {
                // Building-block mapping: shaped directly from the parent row.
                parent_row.clone()
            };

            match self.insert(nested, &related).await? {
                Resolved::Row(row) => pending.push(PendingRelation {
                    table: target.table.clone(),
                    parent_column: target.parent_column.clone(),
                    row,
                }),
                Resolved::Key(pk) => stage_key(pending, target, nested, &Value::Int(pk))?,
            }
        }
        Ok(())
    }

    /// Fetch the source row a foreign-key or relation value points at.
    async fn fetch_source_row(&self, nested: &Mapping, value: &Value) -> Result<Row> {
        let table = nested.source().ok_or_else(|| {
            ReshapeError::config(format!(
                "mapping {} has no source table to resolve from",
                nested.name()
            ))
        })?;
        let pk = value.as_int().ok_or_else(|| {
            ReshapeError::config(format!(
                "foreign key value {} into {} is not an integer",
                value, table
            ))
        })?;
        self.source
            .get_row_by_pk(table, pk)
            .await?
            .ok_or_else(|| ReshapeError::query(table, format!("no row with id {}", pk)))
    }

    /// Write every staged relation row with the parent's key merged in.
    ///
    /// Best-effort: each entry is attempted, the list is cleared
    /// unconditionally, and the first failure is returned afterwards. The
    /// parent row stays committed either way.
    async fn flush_relations(
        &self,
        pending: &mut Vec<PendingRelation>,
        parent_pk: i64,
    ) -> Result<()> {
        let mut first_err = None;
        for entry in pending.drain(..) {
            let mut row = entry.row;
            row.insert(entry.parent_column, Value::Int(parent_pk));
            if let Err(err) = self.destination.insert_row(&entry.table, row).await {
                warn!(
                    table = %entry.table,
                    error = %err,
                    "relation insert failed after parent commit"
                );
                if first_err.is_none() {
                    first_err = Some(err);
                }
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Value a get-or-create lookup probes with: the unique source column's
/// raw value piped through its field's filters. Actions and nested
/// resolution only run on a lookup miss.
fn probe_value(mapping: &Mapping, unique: &str, row: &Row) -> Value {
    let raw = row.get(unique).cloned().unwrap_or(Value::Null);
    match mapping
        .fields()
        .find(|(_, field)| field.source_column.as_deref() == Some(unique))
    {
        Some((_, field)) => field.apply_filters(raw),
        None => raw,
    }
}

/// Stage a `{link_column: key}` relation row for a committed nested mapping.
fn stage_key(
    pending: &mut Vec<PendingRelation>,
    target: &RelationTarget,
    nested: &Mapping,
    key: &Value,
) -> Result<()> {
    let link = nested.link().ok_or_else(|| {
        ReshapeError::config(format!(
            "mapping {} is staged into {} but declares no link_column",
            nested.name(),
            target.table
        ))
    })?;
    let mut row = Row::new();
    row.insert(link.to_string(), key.clone());
    pending.push(PendingRelation {
        table: target.table.clone(),
        parent_column: target.parent_column.clone(),
        row,
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::db::MemoryDb;
    use crate::mapping::Field;
    use crate::value::row;

    fn resolver(src: &Arc<MemoryDb>, dst: &Arc<MemoryDb>) -> Resolver {
        Resolver::new(src.clone(), dst.clone())
    }

    /// Destination that rejects every insert into one table.
    struct FlakyDb {
        inner: MemoryDb,
        fail_table: String,
        rejected: AtomicUsize,
    }

    impl FlakyDb {
        fn failing_on(table: &str) -> Self {
            Self {
                inner: MemoryDb::new(),
                fail_table: table.to_string(),
                rejected: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Database for FlakyDb {
        async fn get_table_rows(&self, table: &str, after: Option<i64>) -> Result<Vec<Row>> {
            self.inner.get_table_rows(table, after).await
        }

        async fn get_table_row_count(&self, table: &str, after: Option<i64>) -> Result<i64> {
            self.inner.get_table_row_count(table, after).await
        }

        async fn get_row_by_pk(&self, table: &str, pk: i64) -> Result<Option<Row>> {
            self.inner.get_row_by_pk(table, pk).await
        }

        async fn get_row_by_field(
            &self,
            table: &str,
            field: &str,
            value: &Value,
        ) -> Result<Option<Row>> {
            self.inner.get_row_by_field(table, field, value).await
        }

        async fn insert_row(&self, table: &str, row: Row) -> Result<i64> {
            if table == self.fail_table {
                self.rejected.fetch_add(1, Ordering::SeqCst);
                return Err(ReshapeError::query(table, "insert rejected"));
            }
            self.inner.insert_row(table, row).await
        }
    }

    #[tokio::test]
    async fn test_uncommitted_mapping_returns_payload() {
        let src = Arc::new(MemoryDb::new());
        let dst = Arc::new(MemoryDb::new());
        let mapping = Mapping::new("shape", "unused")
            .uncommitted()
            .field("author_name", Field::direct("name"));

        let resolved = resolver(&src, &dst)
            .insert(&mapping, &row([("name", Value::from("King"))]))
            .await
            .unwrap();
        assert_eq!(
            resolved,
            Resolved::Row(row([("author_name", Value::from("King"))]))
        );
        // Nothing was written.
        assert!(dst.rows("unused").is_empty());
    }

    #[tokio::test]
    async fn test_get_or_create_without_unique_key_is_config_error() {
        let src = Arc::new(MemoryDb::new());
        let dst = Arc::new(MemoryDb::new());
        let mapping = Mapping::new("bad", "t")
            .get_or_create()
            .field("name", Field::direct("name"));

        let err = resolver(&src, &dst)
            .insert(&mapping, &row([("name", Value::from("x"))]))
            .await
            .unwrap_err();
        assert!(matches!(err, ReshapeError::Config(_)));
    }

    #[tokio::test]
    async fn test_missing_source_column_becomes_empty_text() {
        let src = Arc::new(MemoryDb::new());
        let dst = Arc::new(MemoryDb::new());
        let mapping = Mapping::new("m", "out").field("nick", Field::direct("alias"));

        resolver(&src, &dst)
            .insert(&mapping, &row([("name", Value::from("King"))]))
            .await
            .unwrap();
        let rows = dst.rows("out");
        assert_eq!(rows[0].get("nick"), Some(&Value::Text(String::new())));
    }

    #[tokio::test]
    async fn test_constant_field_lands_in_payload() {
        let src = Arc::new(MemoryDb::new());
        let dst = Arc::new(MemoryDb::new());
        let mapping = Mapping::new("m", "out")
            .field("name", Field::direct("name"))
            .field("source_system", Field::constant("legacy"))
            .field(
                "schema_version",
                Field::constant(2).filter(|v| Value::Text(format!("v{}", v))),
            );

        resolver(&src, &dst)
            .insert(&mapping, &row([("name", Value::from("King"))]))
            .await
            .unwrap();
        let out = &dst.rows("out")[0];
        assert_eq!(out.get("source_system"), Some(&Value::from("legacy")));
        // Filters apply to constants the same as to copied columns.
        assert_eq!(out.get("schema_version"), Some(&Value::from("v2")));
    }

    #[tokio::test]
    async fn test_relation_flush_failure_keeps_parent_and_returns_first_error() {
        let src = Arc::new(MemoryDb::new());
        let dst = Arc::new(FlakyDb::failing_on("movie_author"));

        let author = Arc::new(
            Mapping::new("author", "new_author")
                .link_column("author_id")
                .field("author_name", Field::direct("name")),
        );
        let editor = Arc::new(
            Mapping::new("editor", "new_editor")
                .link_column("editor_id")
                .field("editor_name", Field::direct("name")),
        );
        let movie = Mapping::new("movie", "new_movie")
            .field("title", Field::direct("title"))
            .field(
                "people",
                Field::relation("author_id", "movie_author", "movie_id")
                    .via(author)
                    .via(editor),
            );

        let err = Resolver::new(src, dst.clone())
            .insert(
                &movie,
                &row([
                    ("title", Value::from("IT")),
                    ("name", Value::from("Stephen King")),
                    ("author_id", Value::Int(1)),
                ]),
            )
            .await
            .unwrap_err();

        // The parent commit stands, every staged entry was attempted, and
        // the first failure came back.
        assert!(matches!(err, ReshapeError::Query { table, .. } if table == "movie_author"));
        assert_eq!(dst.rejected.load(Ordering::SeqCst), 2);
        assert_eq!(dst.inner.rows("new_movie").len(), 1);
        assert_eq!(dst.inner.rows("new_author").len(), 1);
        assert_eq!(dst.inner.rows("new_editor").len(), 1);
        assert!(dst.inner.rows("movie_author").is_empty());
    }

    #[tokio::test]
    async fn test_foreign_key_without_mapping_passes_raw_value() {
        let src = Arc::new(MemoryDb::new());
        let dst = Arc::new(MemoryDb::new());
        let mapping = Mapping::new("m", "out").field("country_id", Field::foreign_key("country_id"));

        resolver(&src, &dst)
            .insert(&mapping, &row([("country_id", Value::Int(9))]))
            .await
            .unwrap();
        assert_eq!(dst.rows("out")[0].get("country_id"), Some(&Value::Int(9)));
    }

    #[tokio::test]
    async fn test_empty_foreign_key_short_circuits() {
        let src = Arc::new(MemoryDb::new());
        let dst = Arc::new(MemoryDb::new());
        let nested = Arc::new(
            Mapping::new("country", "new_country")
                .source_table("country")
                .field("name", Field::direct("name")),
        );
        let mapping = Mapping::new("m", "out")
            .field("name", Field::direct("name"))
            .field(
                "country_id",
                Field::foreign_key("country_id").resolve_with(nested),
            );

        resolver(&src, &dst)
            .insert(
                &mapping,
                &row([("name", Value::from("x")), ("country_id", Value::Null)]),
            )
            .await
            .unwrap();
        // No recursive work happened and the column is absent.
        let out = &dst.rows("out")[0];
        assert!(out.get("country_id").is_none());
    }
}
