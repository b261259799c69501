//! Statement synthesis for the three write modes.
//!
//! Upserts bind every cell as its own positional parameter, updates pass the
//! whole batch as one JSON array through `json_populate_recordset`, deletes
//! bind one array of identifier strings. The column named `id` is the conflict
//! and match key and never appears in a SET list.

use std::collections::HashSet;

use indexmap::IndexSet;
use pg_escape::quote_identifier;

use pypeline_utils::error::{ConfigError, Error};
use pypeline_utils::{PypelineResult, Record, Value};

/// PostgreSQL rejects statements with more bind parameters than this.
pub const MAX_BIND_PARAMS: usize = 65_535;

/// Conflict and match key of every upsert and update.
pub const KEY_COLUMN: &str = "id";

#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Value(Value),
    Json(serde_json::Value),
    Array(Vec<Value>),
}

/// SQL text plus its positional (`$n`) parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<SqlParam>,
}

impl Statement {
    /// A statement without parameters, e.g. a hydrated post query.
    pub fn raw(sql: impl Into<String>) -> Self {
        Self { sql: sql.into(), params: Vec::new() }
    }
}

/// Quote a possibly schema-qualified table name part by part.
pub fn quote_table(table: &str) -> String {
    table
        .split('.')
        .map(|part| quote_identifier(part).into_owned())
        .collect::<Vec<_>>()
        .join(".")
}

fn set_fields<'a>(fields: &'a [String], excluded: &HashSet<String>) -> Vec<&'a String> {
    fields
        .iter()
        .filter(|f| f.as_str() != KEY_COLUMN && !excluded.contains(f.as_str()))
        .collect()
}

fn project<'r>(record: &'r Record, fields: &[String]) -> PypelineResult<Vec<&'r Value>> {
    fields
        .iter()
        .map(|field| {
            record.get(field).ok_or_else(|| {
                Error::storage(format!("record is missing field `{field}` of the batch field list"))
            })
        })
        .collect()
}

#[derive(Debug, Clone)]
enum LoadKind {
    Upsert { header: String, conflict: String },
    Update { sql: String },
}

/// A write statement shape built once per pype run and bound per batch.
#[derive(Debug, Clone)]
pub struct LoadQuery {
    fields: Vec<String>,
    kind: LoadKind,
}

impl LoadQuery {
    /// `INSERT ... VALUES ... ON CONFLICT (id) DO UPDATE SET ...`
    ///
    /// `excluded` narrows the SET list only; excluded fields are still inserted.
    pub fn upsert(table: &str, fields: Vec<String>, excluded: &HashSet<String>) -> PypelineResult<Self> {
        if fields.is_empty() {
            return Err(Error::storage(format!("no fields to write into `{table}`")));
        }

        let columns = fields
            .iter()
            .map(|f| quote_identifier(f).into_owned())
            .collect::<Vec<_>>()
            .join(", ");
        let header = format!("INSERT INTO {} ({columns}) VALUES ", quote_table(table));

        let updates: Vec<String> = set_fields(&fields, excluded)
            .into_iter()
            .map(|f| {
                let f = quote_identifier(f);
                format!("{f} = excluded.{f}")
            })
            .collect();
        let conflict = if updates.is_empty() {
            format!(" ON CONFLICT ({KEY_COLUMN}) DO NOTHING")
        } else {
            format!(" ON CONFLICT ({KEY_COLUMN}) DO UPDATE SET {}", updates.join(", "))
        };

        Ok(Self { fields, kind: LoadKind::Upsert { header, conflict } })
    }

    /// `UPDATE ... FROM json_populate_recordset(...) WHERE target.id = records.id`
    pub fn update(table: &str, fields: Vec<String>, excluded: &HashSet<String>) -> PypelineResult<Self> {
        let updates: Vec<String> = set_fields(&fields, excluded)
            .into_iter()
            .map(|f| {
                let f = quote_identifier(f);
                format!("{f} = records.{f}")
            })
            .collect();
        if updates.is_empty() {
            return Err(ConfigError::NoUpdatableFields(table.to_string()).into());
        }

        let table = quote_table(table);
        let sql = format!(
            "UPDATE {table} AS target SET {} FROM (SELECT * FROM json_populate_recordset(null::{table}, $1)) AS records WHERE target.{KEY_COLUMN} = records.{KEY_COLUMN}",
            updates.join(", ")
        );

        Ok(Self { fields, kind: LoadKind::Update { sql } })
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Bind a batch. Upserts that would exceed [`MAX_BIND_PARAMS`] are split
    /// into several statements; every other batch yields exactly one.
    pub fn bind(&self, records: &[Record]) -> PypelineResult<Vec<Statement>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        match &self.kind {
            LoadKind::Upsert { header, conflict } => {
                let rows_per_statement = (MAX_BIND_PARAMS / self.fields.len()).max(1);
                records
                    .chunks(rows_per_statement)
                    .map(|chunk| self.bind_upsert(header, conflict, chunk))
                    .collect()
            }
            LoadKind::Update { sql } => {
                let rows = records
                    .iter()
                    .map(|record| -> PypelineResult<serde_json::Value> {
                        let values = project(record, &self.fields)?;
                        let object: serde_json::Map<String, serde_json::Value> = self
                            .fields
                            .iter()
                            .zip(values)
                            .map(|(f, v)| -> PypelineResult<(String, serde_json::Value)> {
                                Ok((f.clone(), serde_json::to_value(v)?))
                            })
                            .collect::<PypelineResult<_>>()?;
                        Ok(serde_json::Value::Object(object))
                    })
                    .collect::<PypelineResult<Vec<_>>>()?;

                Ok(vec![Statement {
                    sql: sql.clone(),
                    params: vec![SqlParam::Json(serde_json::Value::Array(rows))],
                }])
            }
        }
    }

    fn bind_upsert(&self, header: &str, conflict: &str, records: &[Record]) -> PypelineResult<Statement> {
        let mut sql = String::with_capacity(header.len() + records.len() * self.fields.len() * 6 + conflict.len());
        sql.push_str(header);
        let mut params = Vec::with_capacity(records.len() * self.fields.len());

        for (row, record) in records.iter().enumerate() {
            if row > 0 {
                sql.push_str(", ");
            }
            sql.push('(');
            for (pos, value) in project(record, &self.fields)?.into_iter().enumerate() {
                if pos > 0 {
                    sql.push_str(", ");
                }
                params.push(SqlParam::Value(value.clone()));
                sql.push('$');
                sql.push_str(&params.len().to_string());
            }
            sql.push(')');
        }
        sql.push_str(conflict);

        Ok(Statement { sql, params })
    }
}

/// `DELETE FROM <table> WHERE <identifier_column> = ANY($1)`
///
/// Identifiers are bound in their string form, de-duplicated in first-seen
/// order. Null identifiers match nothing and are skipped; `None` means the
/// batch has nothing to delete.
pub fn delete_statement(
    table: &str,
    identifier_column: &str,
    records: &[Record],
) -> PypelineResult<Option<Statement>> {
    let mut ids: IndexSet<String> = IndexSet::new();
    for record in records {
        let value = record.get(identifier_column).ok_or_else(|| {
            Error::storage(format!("record is missing identifier column `{identifier_column}`"))
        })?;
        if !value.is_null() {
            ids.insert(value.to_string());
        }
    }
    if ids.is_empty() {
        return Ok(None);
    }

    let sql = format!(
        "DELETE FROM {} WHERE {} = ANY($1)",
        quote_table(table),
        quote_identifier(identifier_column)
    );
    let ids = ids.into_iter().map(Value::Text).collect();

    Ok(Some(Statement { sql, params: vec![SqlParam::Array(ids)] }))
}
