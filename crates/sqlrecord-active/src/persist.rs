//! Record persistence: save, destroy, restore and friends.
//!
//! [`ActiveRecord`] is implemented for [`Record`]. Every method takes the
//! session explicitly; hooks are dispatched through the session's
//! [`HookBus`](sqlrecord_core::HookBus) and an `Err` from a hook aborts the
//! operation before any statement is issued.

use sqlrecord_core::cast::now_timestamp;
use sqlrecord_core::{
    Attributes, Connection, Cx, Error, HookPhase, KeyStrategy, ModelSchema, Outcome, Record,
    Result, Session, Value, try_outcome, try_result,
};
use sqlrecord_query::QueryBuilder;
use sqlrecord_relation::Relation;

/// Options for [`ActiveRecord::destroy`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DestroyOptions {
    /// Issue a real DELETE even when the model soft-deletes.
    pub force: bool,
}

impl DestroyOptions {
    pub fn force() -> Self {
        Self { force: true }
    }
}

/// Query on the record's own table keyed by its primary key.
pub(crate) fn table_query<C: Connection>(
    schema: &'static ModelSchema,
    session: &Session<C>,
) -> QueryBuilder {
    QueryBuilder::new(schema.table_name(), session.dialect()).key_name(schema.primary_key())
}

#[allow(clippy::result_large_err)]
fn persisted_key(record: &Record) -> Result<Value> {
    record.original_key().cloned().ok_or_else(|| {
        Error::config(format!(
            "record of '{}' has no primary key to address",
            record.schema().table_name()
        ))
    })
}

fn stamp_for_insert(record: &mut Record) {
    let Some(timestamps) = record.schema().timestamps() else {
        return;
    };
    let now = now_timestamp();
    if record.value(&timestamps.created_at).is_null() {
        record.set(timestamps.created_at.clone(), now.clone());
    }
    record.set(timestamps.updated_at.clone(), now);
}

fn stamp_for_update(record: &mut Record) {
    if let Some(timestamps) = record.schema().timestamps() {
        if !record.is_attribute_dirty(&timestamps.updated_at) {
            record.set(timestamps.updated_at.clone(), now_timestamp());
        }
    }
}

/// Persistence operations on a model instance.
#[allow(async_fn_in_trait)]
pub trait ActiveRecord {
    /// INSERT a new record or UPDATE the dirty attributes of an existing one.
    ///
    /// Returns whether a statement was issued. `BeforeSave` hooks always run
    /// first, so a hook may dirty an otherwise clean record; a record that is
    /// still clean afterwards issues nothing and skips `AfterSave`.
    async fn save<C: Connection>(&mut self, cx: &Cx, session: &Session<C>) -> Outcome<bool, Error>;

    /// Soft-delete, or DELETE when forced or the model has no soft-delete
    /// column. Returns `false` for a record that was never saved.
    async fn destroy<C: Connection>(
        &mut self,
        cx: &Cx,
        session: &Session<C>,
        options: DestroyOptions,
    ) -> Outcome<bool, Error>;

    /// Clear the soft-delete column and save.
    async fn restore<C: Connection>(
        &mut self,
        cx: &Cx,
        session: &Session<C>,
    ) -> Outcome<bool, Error>;

    /// Re-read every attribute from the database.
    async fn refresh<C: Connection>(&mut self, cx: &Cx, session: &Session<C>)
    -> Outcome<(), Error>;

    /// Eager load relation paths into this record.
    async fn load<C: Connection>(
        &mut self,
        cx: &Cx,
        session: &Session<C>,
        paths: &[&str],
    ) -> Outcome<(), Error>;

    /// Bind one declared relation to this record.
    #[allow(clippy::result_large_err)]
    fn related<C: Connection>(&self, session: &Session<C>, name: &str) -> Result<Relation>;
}

impl ActiveRecord for Record {
    #[tracing::instrument(level = "debug", skip_all, fields(table = self.schema().table_name(), new = self.is_new()))]
    async fn save<C: Connection>(&mut self, cx: &Cx, session: &Session<C>) -> Outcome<bool, Error> {
        try_result!(session.hooks().execute_hooks(self, HookPhase::BeforeSave));

        let schema = self.schema();
        let primary_key = schema.primary_key();
        let query = table_query(schema, session);

        if self.is_new() {
            if self.key().is_none() && schema.key_strategy() == KeyStrategy::Uuid {
                self.set(primary_key, uuid::Uuid::new_v4().to_string());
            }
            stamp_for_insert(self);

            let mut attributes: Attributes = self.attributes().clone();
            if self.key().is_none() {
                attributes.remove(primary_key);
            }
            let result = try_outcome!(query.insert(cx, session, &attributes).await);
            if self.key().is_none() && schema.key_strategy() == KeyStrategy::AutoIncrement {
                if let Some(id) = result.insert_id {
                    self.set(primary_key, id);
                }
            }
            tracing::debug!(key = ?self.key(), "Inserted record");
        } else {
            if !self.is_dirty() {
                tracing::trace!("Nothing dirty; skipping update");
                return Outcome::Ok(false);
            }
            stamp_for_update(self);
            let key = try_result!(persisted_key(self));
            let dirty = self.dirty();
            try_outcome!(
                query
                    .where_eq(primary_key, key.clone())
                    .update(cx, session, &dirty)
                    .await
            );
            tracing::debug!(?key, columns = dirty.len(), "Updated record");
        }

        self.mark_persisted();
        try_result!(session.hooks().execute_hooks(self, HookPhase::AfterSave));
        Outcome::Ok(true)
    }

    #[tracing::instrument(level = "debug", skip_all, fields(table = self.schema().table_name(), force = options.force))]
    async fn destroy<C: Connection>(
        &mut self,
        cx: &Cx,
        session: &Session<C>,
        options: DestroyOptions,
    ) -> Outcome<bool, Error> {
        if self.is_new() {
            return Outcome::Ok(false);
        }
        try_result!(session.hooks().execute_hooks(self, HookPhase::BeforeDelete));

        let schema = self.schema();
        let key = try_result!(persisted_key(self));
        let query = table_query(schema, session).where_eq(schema.primary_key(), key.clone());

        match schema.soft_delete_column() {
            Some(column) if !options.force => {
                let now = now_timestamp();
                self.set(column, now.clone());
                let mut assignments = Attributes::new();
                assignments.insert(column.to_string(), now.clone());
                if let Some(timestamps) = schema.timestamps() {
                    self.set(timestamps.updated_at.clone(), now.clone());
                    assignments.insert(timestamps.updated_at.clone(), now);
                }
                try_outcome!(query.update(cx, session, &assignments).await);
                let written: Vec<&String> = assignments.keys().collect();
                self.sync_attributes(&written);
                tracing::debug!(?key, "Soft-deleted record");
            }
            _ => {
                try_outcome!(query.delete(cx, session).await);
                self.mark_deleted();
                tracing::debug!(?key, "Deleted record");
            }
        }

        try_result!(session.hooks().execute_hooks(self, HookPhase::AfterDelete));
        Outcome::Ok(true)
    }

    async fn restore<C: Connection>(
        &mut self,
        cx: &Cx,
        session: &Session<C>,
    ) -> Outcome<bool, Error> {
        let Some(column) = self.schema().soft_delete_column() else {
            return Outcome::Err(Error::config(format!(
                "'{}' does not use soft deletes; nothing to restore",
                self.schema().table_name()
            )));
        };
        self.set(column, Value::Null);
        let saved = try_outcome!(self.save(cx, session).await);
        if saved {
            tracing::debug!(table = self.schema().table_name(), key = ?self.key(), "Restored record");
        }
        Outcome::Ok(saved)
    }

    async fn refresh<C: Connection>(
        &mut self,
        cx: &Cx,
        session: &Session<C>,
    ) -> Outcome<(), Error> {
        let schema = self.schema();
        let key = try_result!(persisted_key(self));
        let row = try_outcome!(table_query(schema, session).find(cx, session, key.clone()).await);
        match row {
            Some(row) => {
                self.refill_from(&row);
                Outcome::Ok(())
            }
            None => Outcome::Err(Error::record_not_found(
                schema.table_name(),
                format!("no row with {} = {}", schema.primary_key(), key),
            )),
        }
    }

    async fn load<C: Connection>(
        &mut self,
        cx: &Cx,
        session: &Session<C>,
        paths: &[&str],
    ) -> Outcome<(), Error> {
        sqlrecord_relation::load(cx, session, std::slice::from_mut(self), paths).await
    }

    fn related<C: Connection>(&self, session: &Session<C>, name: &str) -> Result<Relation> {
        Relation::of(session, self, name)
    }
}
