//! The header-match chain.
//!
//! Links come from three sources, produced in this order on every walk:
//! 1. site-wide `header: pattern` lines from configuration (defer)
//! 2. links added at runtime with `extend()` (defer)
//! 3. a catch-all `any` link jumping to the configured jump chain
//! 4. the list's persisted header matches, in position order
//!
//! The catch-all sits before the list-specific matches so that site-wide
//! header checks always take precedence over per-list rules.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tracing::{debug, error};

use crate::chains::{Chain, Link};
use crate::config::{ChainConfig, HEADER_MATCH_CHAIN};
use crate::error::{ChainError, RuleError};
use crate::list::MailingList;
use crate::message::{Message, MessageData};
use crate::rules::header_match::HEADER_MATCH_PREFIX;
use crate::rules::{HeaderMatchRule, RuleRegistry};
use crate::store::Database;

/// Create a header-match rule and wrap it in a link.
///
/// Without `chain` the link defers, so the match is only recorded and the
/// catch-all link acts on it later. With `chain` the link jumps there.
pub fn make_link(
    registry: &RuleRegistry,
    header: &str,
    pattern: &str,
    chain: Option<&str>,
) -> Result<Link, RuleError> {
    let rule = HeaderMatchRule::register(registry, header, pattern)?;
    Ok(match chain {
        None => Link::defer(rule),
        Some(target) => Link::jump(rule, Some(target)),
    })
}

/// Parse configuration text into `(header, pattern)` pairs.
///
/// Blank lines are skipped. Lines without a colon, or with an empty header
/// or pattern, are logged and skipped.
pub fn parse_header_checks(text: &str) -> Vec<(String, String)> {
    let mut checks = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match line.split_once(':') {
            Some((header, pattern))
                if !header.trim().is_empty() && !pattern.trim().is_empty() =>
            {
                checks.push((header.trim().to_string(), pattern.trim_start().to_string()));
            }
            _ => {
                error!(line = %line, "Configuration error: header_checks contains bogus line");
            }
        }
    }
    checks
}

/// Built-in chain of header pattern checks.
pub struct HeaderMatchChain {
    registry: Arc<RuleRegistry>,
    store: Arc<dyn Database>,
    header_checks: String,
    jump_chain: String,
    extended: Mutex<Vec<Link>>,
}

impl HeaderMatchChain {
    pub fn new(registry: Arc<RuleRegistry>, store: Arc<dyn Database>, config: &ChainConfig) -> Self {
        Self {
            registry,
            store,
            header_checks: config.header_checks.clone(),
            jump_chain: config.jump_chain.clone(),
            extended: Mutex::new(Vec::new()),
        }
    }

    fn extended(&self) -> MutexGuard<'_, Vec<Link>> {
        self.extended.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a deferring header check. Repeated calls add duplicate links.
    ///
    /// Returns the generated rule name.
    pub fn extend(&self, header: &str, pattern: &str) -> Result<String, RuleError> {
        // Held across registration so a concurrent flush sees both or neither.
        let mut extended = self.extended();
        let link = make_link(&self.registry, header, pattern, None)?;
        let name = link.rule.name().to_string();
        extended.push(link);
        drop(extended);
        debug!(rule = %name, header, pattern, "Header-match chain extended");
        Ok(name)
    }

    /// Drop every extension and unregister all header-match rules.
    pub fn flush(&self) {
        let mut extended = self.extended();
        let removed = self.registry.flush_prefix(HEADER_MATCH_PREFIX);
        extended.clear();
        debug!(removed, "Header-match chain flushed");
    }

    pub fn extension_count(&self) -> usize {
        self.extended().len()
    }

    /// Build a link, skipping (with a log) patterns that do not compile.
    fn push_link(
        &self,
        links: &mut Vec<Link>,
        header: &str,
        pattern: &str,
        chain: Option<&str>,
        source: &str,
    ) -> Result<(), RuleError> {
        match make_link(&self.registry, header, pattern, chain) {
            Ok(link) => {
                links.push(link);
                Ok(())
            }
            Err(RuleError::InvalidPattern { pattern, reason }) => {
                error!(source, header, pattern = %pattern, reason = %reason, "Skipping header check with invalid pattern");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl Chain for HeaderMatchChain {
    fn name(&self) -> &str {
        HEADER_MATCH_CHAIN
    }

    fn description(&self) -> &str {
        "The built-in header matching chain"
    }

    async fn links(
        &self,
        mlist: &MailingList,
        _msg: &Message,
        _msgdata: &MessageData,
    ) -> Result<Vec<Link>, ChainError> {
        let mut links = Vec::new();

        for (header, pattern) in parse_header_checks(&self.header_checks) {
            self.push_link(&mut links, &header, &pattern, None, "config")?;
        }

        links.extend(self.extended().iter().cloned());

        let any = self.registry.require("any")?;
        links.push(Link::jump(any, Some(&self.jump_chain)));

        for entry in self.store.header_matches(mlist.list_id()).await? {
            self.push_link(
                &mut links,
                &entry.header,
                &entry.pattern,
                entry.chain.as_deref(),
                "list",
            )?;
        }

        Ok(links)
    }

    fn release(&self, links: &[Link]) {
        let extended = self.extended();
        let mut released = 0;
        for link in links {
            let name = link.rule.name();
            if !name.starts_with(HEADER_MATCH_PREFIX)
                || extended.iter().any(|e| e.rule.name() == name)
            {
                continue;
            }
            if self.registry.unregister(name).is_some() {
                released += 1;
            }
        }
        debug!(released, "Released per-walk header-match rules");
    }
}
