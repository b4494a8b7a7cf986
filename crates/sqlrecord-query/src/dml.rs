//! INSERT, UPDATE, DELETE and upsert compilation.
//!
//! DML shares the builder's table, dialect and WHERE state; values are always
//! bound, and `Value::Default` renders the `DEFAULT` keyword.

use crate::builder::QueryBuilder;
use crate::expr::bind;
use sqlrecord_core::{Attributes, Dialect, Error, Result, Value};

impl QueryBuilder {
    /// `INSERT INTO t (cols) VALUES (...)` for one row.
    #[allow(clippy::result_large_err)]
    pub fn compile_insert(&self, attributes: &Attributes) -> Result<(String, Vec<Value>)> {
        let dialect = self.dialect();
        let table = self.quoted_table(dialect)?;
        if attributes.is_empty() {
            let sql = if dialect.is_mysql_family() {
                format!("INSERT INTO {table} () VALUES ()")
            } else {
                format!("INSERT INTO {table} DEFAULT VALUES")
            };
            return Ok((sql, Vec::new()));
        }
        let columns: Vec<&str> = attributes.keys().map(String::as_str).collect();
        let mut params = Vec::with_capacity(attributes.len());
        let values = row_placeholders(dialect, attributes, &mut params);
        let sql = format!(
            "INSERT INTO {table} ({}) VALUES {values}",
            quote_list(dialect, &columns)
        );
        tracing::trace!(table = %self.table(), sql = %sql, "Compiled INSERT");
        Ok((sql, params))
    }

    /// Multi-row INSERT. Every row must carry the first row's columns.
    #[allow(clippy::result_large_err)]
    pub fn compile_insert_many(&self, rows: &[Attributes]) -> Result<(String, Vec<Value>)> {
        let (columns, tuples, params) = self.batch_values(rows)?;
        let sql = format!(
            "INSERT INTO {} ({}) VALUES {}",
            self.quoted_table(self.dialect())?,
            quote_list(self.dialect(), &columns),
            tuples.join(", ")
        );
        tracing::trace!(table = %self.table(), rows = rows.len(), "Compiled batch INSERT");
        Ok((sql, params))
    }

    /// `UPDATE t SET ... WHERE ...`; SET values are bound before WHERE values.
    #[allow(clippy::result_large_err)]
    pub fn compile_update(&self, assignments: &Attributes) -> Result<(String, Vec<Value>)> {
        if assignments.is_empty() {
            return Err(Error::compilation(format!(
                "UPDATE on '{}' has no assignments",
                self.table()
            )));
        }
        let dialect = self.dialect();
        let mut params = Vec::with_capacity(assignments.len());
        let sets: Vec<String> = assignments
            .iter()
            .map(|(column, value)| {
                format!(
                    "{} = {}",
                    dialect.quote_identifier(column),
                    bind(dialect, &mut params, 0, value.clone())
                )
            })
            .collect();
        let mut sql = format!(
            "UPDATE {} SET {}",
            self.quoted_table(dialect)?,
            sets.join(", ")
        );
        if let Some(condition) = self.compile_where_into(dialect, &mut params, 0)? {
            sql.push_str(" WHERE ");
            sql.push_str(&condition);
        }
        tracing::trace!(table = %self.table(), sql = %sql, "Compiled UPDATE");
        Ok((sql, params))
    }

    /// `DELETE FROM t WHERE ...`
    #[allow(clippy::result_large_err)]
    pub fn compile_delete(&self) -> Result<(String, Vec<Value>)> {
        let dialect = self.dialect();
        let mut params = Vec::new();
        let mut sql = format!("DELETE FROM {}", self.quoted_table(dialect)?);
        if let Some(condition) = self.compile_where_into(dialect, &mut params, 0)? {
            sql.push_str(" WHERE ");
            sql.push_str(&condition);
        }
        tracing::trace!(table = %self.table(), sql = %sql, "Compiled DELETE");
        Ok((sql, params))
    }

    /// Batch INSERT that updates `update_columns` when a row collides on
    /// `unique_by`.
    #[allow(clippy::result_large_err)]
    pub fn compile_upsert(
        &self,
        rows: &[Attributes],
        unique_by: &[&str],
        update_columns: &[&str],
    ) -> Result<(String, Vec<Value>)> {
        if unique_by.is_empty() {
            return Err(Error::compilation("upsert requires at least one unique column"));
        }
        let (mut sql, params) = self.compile_insert_many(rows)?;
        let dialect = self.dialect();
        if dialect.is_mysql_family() {
            let updates: Vec<String> = if update_columns.is_empty() {
                let first = dialect.quote_identifier(unique_by[0]);
                vec![format!("{first} = {first}")]
            } else {
                update_columns
                    .iter()
                    .map(|c| {
                        let column = dialect.quote_identifier(c);
                        format!("{column} = VALUES({column})")
                    })
                    .collect()
            };
            sql.push_str(" ON DUPLICATE KEY UPDATE ");
            sql.push_str(&updates.join(", "));
        } else {
            sql.push_str(&format!(" ON CONFLICT ({})", quote_list(dialect, unique_by)));
            if update_columns.is_empty() {
                sql.push_str(" DO NOTHING");
            } else {
                let updates: Vec<String> = update_columns
                    .iter()
                    .map(|c| {
                        let column = dialect.quote_identifier(c);
                        format!("{column} = EXCLUDED.{column}")
                    })
                    .collect();
                sql.push_str(" DO UPDATE SET ");
                sql.push_str(&updates.join(", "));
            }
        }
        Ok((sql, params))
    }

    #[allow(clippy::result_large_err, clippy::type_complexity)]
    fn batch_values<'r>(
        &self,
        rows: &'r [Attributes],
    ) -> Result<(Vec<&'r str>, Vec<String>, Vec<Value>)> {
        let Some(first) = rows.first() else {
            return Err(Error::compilation(format!(
                "batch INSERT into '{}' has no rows",
                self.table()
            )));
        };
        if first.is_empty() {
            return Err(Error::compilation("batch INSERT rows have no columns"));
        }
        let columns: Vec<&str> = first.keys().map(String::as_str).collect();
        let dialect = self.dialect();
        let mut params = Vec::with_capacity(rows.len() * columns.len());
        let mut tuples = Vec::with_capacity(rows.len());
        for (index, row) in rows.iter().enumerate() {
            if row.len() != columns.len() || !columns.iter().all(|c| row.contains_key(*c)) {
                return Err(Error::compilation(format!(
                    "batch INSERT row {} has a different column set than the first row",
                    index
                )));
            }
            tuples.push(row_placeholders(dialect, row, &mut params));
        }
        Ok((columns, tuples, params))
    }
}

/// `(p1, p2, ...)` in attribute key order.
fn row_placeholders(dialect: Dialect, row: &Attributes, params: &mut Vec<Value>) -> String {
    let placeholders: Vec<String> = row
        .values()
        .map(|value| bind(dialect, params, 0, value.clone()))
        .collect();
    format!("({})", placeholders.join(", "))
}

fn quote_list(dialect: Dialect, columns: &[&str]) -> String {
    columns
        .iter()
        .map(|c| dialect.quote_identifier(c))
        .collect::<Vec<_>>()
        .join(", ")
}
