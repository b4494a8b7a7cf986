//! Lifecycle hooks.
//!
//! Persistence calls dispatch every phase through a [`HookBus`]. The bus is
//! owned by the session, so tests and applications can swap it freely.
//! [`HookRegistry`] is the stock implementation: it runs the named hooks a
//! schema lists for the phase, then every global listener for that phase.
//!
//! Returning `Err` from a hook aborts the surrounding save or destroy.

use crate::error::{Error, Result};
use crate::record::Record;
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Lifecycle phase a hook runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HookPhase {
    BeforeSave,
    AfterSave,
    BeforeDelete,
    AfterDelete,
}

impl HookPhase {
    pub const fn name(self) -> &'static str {
        match self {
            HookPhase::BeforeSave => "before_save",
            HookPhase::AfterSave => "after_save",
            HookPhase::BeforeDelete => "before_delete",
            HookPhase::AfterDelete => "after_delete",
        }
    }
}

impl fmt::Display for HookPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Dispatches lifecycle hooks for a record.
pub trait HookBus: Send + Sync {
    #[allow(clippy::result_large_err)]
    fn execute_hooks(&self, record: &mut Record, phase: HookPhase) -> Result<()>;
}

/// A bus that runs nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHooks;

impl HookBus for NoopHooks {
    fn execute_hooks(&self, _record: &mut Record, _phase: HookPhase) -> Result<()> {
        Ok(())
    }
}

/// Type alias for hook callbacks.
pub type HookFn = Arc<dyn Fn(&mut Record) -> Result<()> + Send + Sync>;

fn hook_name_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_.:-]*$").ok())
        .as_ref()
}

/// Named hooks plus global per-phase listeners.
#[derive(Clone, Default)]
pub struct HookRegistry {
    named: HashMap<String, HookFn>,
    listeners: Vec<(HookPhase, HookFn)>,
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.named.keys().collect();
        names.sort();
        f.debug_struct("HookRegistry")
            .field("named", &names)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a hook that schemas can list by name.
    ///
    /// Names must look like identifiers (`normalize_email`, `audit.write`).
    #[allow(clippy::result_large_err)]
    pub fn register(
        &mut self,
        name: impl Into<String>,
        hook: impl Fn(&mut Record) -> Result<()> + Send + Sync + 'static,
    ) -> Result<&mut Self> {
        let name = name.into();
        if !hook_name_pattern().is_some_and(|re| re.is_match(&name)) {
            return Err(Error::config(format!("invalid hook name '{}'", name)));
        }
        tracing::trace!(hook = %name, "Registering named hook");
        self.named.insert(name, Arc::new(hook));
        Ok(self)
    }

    /// Register a listener that runs for every record in `phase`.
    pub fn listen(
        &mut self,
        phase: HookPhase,
        hook: impl Fn(&mut Record) -> Result<()> + Send + Sync + 'static,
    ) -> &mut Self {
        self.listeners.push((phase, Arc::new(hook)));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.named.contains_key(name)
    }
}

impl HookBus for HookRegistry {
    fn execute_hooks(&self, record: &mut Record, phase: HookPhase) -> Result<()> {
        let schema = record.schema();
        for name in schema.hooks_for(phase) {
            let hook = self.named.get(name).ok_or_else(|| {
                Error::config(format!(
                    "hook '{}' listed for {} on '{}' is not registered",
                    name,
                    phase,
                    schema.table_name()
                ))
            })?;
            tracing::trace!(hook = %name, %phase, table = schema.table_name(), "Running hook");
            hook(record)?;
        }
        for (listener_phase, hook) in &self.listeners {
            if *listener_phase == phase {
                hook(record)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ModelSchema;
    use crate::value::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn users() -> &'static ModelSchema {
        static SCHEMA: OnceLock<ModelSchema> = OnceLock::new();
        SCHEMA.get_or_init(|| {
            ModelSchema::builder("users")
                .hook(HookPhase::BeforeSave, "normalize")
                .build()
        })
    }

    fn ghosts() -> &'static ModelSchema {
        static SCHEMA: OnceLock<ModelSchema> = OnceLock::new();
        SCHEMA.get_or_init(|| {
            ModelSchema::builder("ghosts")
                .hook(HookPhase::AfterDelete, "haunt")
                .build()
        })
    }

    #[test]
    fn named_hooks_run_before_listeners() {
        let seen = Arc::new(AtomicUsize::new(0));
        let mut registry = HookRegistry::new();
        registry
            .register("normalize", |record| {
                record.set("name", "normalized");
                Ok(())
            })
            .unwrap();
        let counter = Arc::clone(&seen);
        registry.listen(HookPhase::BeforeSave, move |record| {
            assert_eq!(record.get("name"), Some(&Value::from("normalized")));
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let mut record = Record::new(users());
        registry.execute_hooks(&mut record, HookPhase::BeforeSave).unwrap();
        registry.execute_hooks(&mut record, HookPhase::AfterSave).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unregistered_name_is_config_error() {
        let registry = HookRegistry::new();
        let mut record = Record::new(ghosts());
        assert!(registry.execute_hooks(&mut record, HookPhase::BeforeSave).is_ok());
        let err = registry
            .execute_hooks(&mut record, HookPhase::AfterDelete)
            .unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn failing_hook_propagates() {
        let mut registry = HookRegistry::new();
        registry.listen(HookPhase::BeforeDelete, |_| Err(Error::Custom("nope".into())));
        let mut record = Record::new(users());
        let err = registry
            .execute_hooks(&mut record, HookPhase::BeforeDelete)
            .unwrap_err();
        assert_eq!(err.to_string(), "nope");
    }

    #[test]
    fn rejects_malformed_names() {
        let mut registry = HookRegistry::new();
        assert!(registry.register("has space", |_| Ok(())).is_err());
        assert!(registry.register("audit.write", |_| Ok(())).is_ok());
        assert!(registry.contains("audit.write"));
    }
}
