//! Rule registry — the set of rules known to a dispatching context.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::error::RuleError;
use crate::rules::Rule;
use crate::rules::builtin::{AnyRule, TruthRule};

/// Registry of named rules.
///
/// Registration and prefix flushes are serialized behind one mutex, so a
/// flush never interleaves with a registration.
#[derive(Debug)]
pub struct RuleRegistry {
    rules: Mutex<HashMap<String, Arc<dyn Rule>>>,
    /// Next sequence number for generated rule names.
    sequence: AtomicU64,
}

impl RuleRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            rules: Mutex::new(HashMap::new()),
            sequence: AtomicU64::new(1),
        }
    }

    /// Create a registry holding the built-in `any` and `truth` rules.
    pub fn with_builtin() -> Self {
        let registry = Self::new();
        let builtins: [Arc<dyn Rule>; 2] = [Arc::new(AnyRule), Arc::new(TruthRule)];
        let mut rules = registry.lock();
        for rule in builtins {
            rules.insert(rule.name().to_string(), rule);
        }
        drop(rules);
        registry
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<dyn Rule>>> {
        self.rules.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a rule. Fails if the name is taken.
    pub fn register(&self, rule: Arc<dyn Rule>) -> Result<(), RuleError> {
        let name = rule.name().to_string();
        let mut rules = self.lock();
        if rules.contains_key(&name) {
            return Err(RuleError::Duplicate {
                name,
                description: rule.description().to_string(),
            });
        }
        rules.insert(name.clone(), rule);
        debug!(rule = %name, "Registered rule");
        Ok(())
    }

    /// Unregister a rule.
    pub fn unregister(&self, name: &str) -> Option<Arc<dyn Rule>> {
        self.lock().remove(name)
    }

    /// Remove every rule whose name starts with `prefix`.
    /// Returns the number removed.
    pub fn flush_prefix(&self, prefix: &str) -> usize {
        let mut rules = self.lock();
        let before = rules.len();
        rules.retain(|name, _| !name.starts_with(prefix));
        let removed = before - rules.len();
        debug!(prefix, removed, "Flushed rules");
        removed
    }

    /// Get a rule by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Rule>> {
        self.lock().get(name).cloned()
    }

    /// Get a rule by name, failing if it is missing.
    pub fn require(&self, name: &str) -> Result<Arc<dyn Rule>, RuleError> {
        self.get(name).ok_or_else(|| RuleError::Unknown {
            name: name.to_string(),
        })
    }

    /// Check if a rule exists.
    pub fn has(&self, name: &str) -> bool {
        self.lock().contains_key(name)
    }

    /// List all rule names, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Get the number of registered rules.
    pub fn count(&self) -> usize {
        self.lock().len()
    }

    /// Next value of the name sequence. Never reused, even after a flush.
    pub fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for RuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}
