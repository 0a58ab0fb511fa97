//! Chain dispatcher — walks chains against a message.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::chains::{Chain, Disposition, HeaderMatchChain, Link, LinkAction, TerminalChain};
use crate::config::ChainConfig;
use crate::error::ChainError;
use crate::list::MailingList;
use crate::message::{Message, MessageData};
use crate::rules::RuleRegistry;
use crate::store::Database;

/// Header listing the rules that matched, stamped on terminal dispositions.
pub const RULE_HITS_HEADER: &str = "X-List-Rule-Hits";
/// Header listing the recording rules that did not match.
pub const RULE_MISSES_HEADER: &str = "X-List-Rule-Misses";

/// Result of walking a message through the chains.
#[derive(Debug, Clone, Serialize)]
pub struct WalkOutcome {
    /// Chain the walk ended in.
    pub final_chain: String,
    /// Disposition of the final chain. `None` when processing stopped in, or
    /// ran off the end of, a non-terminal chain; the caller's default applies.
    pub disposition: Option<Disposition>,
    /// Whether a stop link ended processing (as opposed to running out of
    /// links).
    pub stopped: bool,
    pub hits: Vec<String>,
    pub misses: Vec<String>,
    /// Chains entered, in order.
    pub visited: Vec<String>,
}

/// Registry of named chains plus the walking algorithm.
pub struct Dispatcher {
    chains: HashMap<String, Arc<dyn Chain>>,
    default_jump: String,
    header_match: Option<Arc<HeaderMatchChain>>,
}

impl Dispatcher {
    /// Create a dispatcher with no chains.
    pub fn new(config: &ChainConfig) -> Self {
        Self {
            chains: HashMap::new(),
            default_jump: config.jump_chain.clone(),
            header_match: None,
        }
    }

    /// Create a dispatcher with the terminal chains and the header-match
    /// chain installed.
    pub fn builtin(
        registry: Arc<RuleRegistry>,
        store: Arc<dyn Database>,
        config: &ChainConfig,
    ) -> Result<Self, ChainError> {
        let mut dispatcher = Self::new(config);
        for disposition in Disposition::all() {
            dispatcher.register(Arc::new(TerminalChain::new(disposition, &registry)?))?;
        }
        let header_match = Arc::new(HeaderMatchChain::new(registry, store, config));
        dispatcher.register(header_match.clone())?;
        dispatcher.header_match = Some(header_match);
        Ok(dispatcher)
    }

    /// Register a chain. Fails if the name is taken.
    pub fn register(&mut self, chain: Arc<dyn Chain>) -> Result<(), ChainError> {
        let name = chain.name().to_string();
        if self.chains.contains_key(&name) {
            return Err(ChainError::DuplicateChain { name });
        }
        debug!(chain = %name, "Registered chain");
        self.chains.insert(name, chain);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Chain>> {
        self.chains.get(name).cloned()
    }

    /// The built-in header-match chain, for runtime `extend()`/`flush()`.
    pub fn header_match(&self) -> Option<&Arc<HeaderMatchChain>> {
        self.header_match.as_ref()
    }

    /// List chain names, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.chains.keys().cloned().collect();
        names.sort();
        names
    }

    fn resolve(&self, name: &str) -> Result<Arc<dyn Chain>, ChainError> {
        self.get(name).ok_or_else(|| ChainError::UnknownChain {
            name: name.to_string(),
        })
    }

    /// Walk `msg` through the chains starting at `start`.
    ///
    /// Hits and misses accumulate in `msgdata` across jumps. A jump to a
    /// chain already visited in this walk is a configuration error.
    pub async fn process(
        &self,
        mlist: &MailingList,
        msg: &mut Message,
        msgdata: &mut MessageData,
        start: &str,
    ) -> Result<WalkOutcome, ChainError> {
        let mut chain = self.resolve(start)?;
        let mut visited = vec![chain.name().to_string()];
        let mut seen: HashSet<String> = visited.iter().cloned().collect();
        let mut stopped = false;

        loop {
            let links = chain.links(mlist, msg, msgdata).await?;
            let step = run_links(chain.name(), &links, mlist, msg, msgdata);
            chain.release(&links);

            match step {
                Step::Stop => {
                    stopped = true;
                    break;
                }
                Step::Jump(target) => {
                    let target = target.unwrap_or_else(|| self.default_jump.clone());
                    if !seen.insert(target.clone()) {
                        return Err(ChainError::Cycle {
                            target,
                            path: visited,
                        });
                    }
                    chain = self.resolve(&target)?;
                    visited.push(target);
                }
                // Ran out of links without a terminal action.
                Step::End => break,
            }
        }

        let disposition = if stopped { chain.disposition() } else { None };
        if disposition.is_some() {
            stamp_rule_headers(msg, msgdata);
        }

        let outcome = WalkOutcome {
            final_chain: chain.name().to_string(),
            disposition,
            stopped,
            hits: msgdata.rule_hits.clone(),
            misses: msgdata.rule_misses.clone(),
            visited,
        };
        info!(
            list = %mlist.list_id(),
            chain = %outcome.final_chain,
            disposition = ?outcome.disposition,
            hits = outcome.hits.len(),
            "Message walk complete"
        );
        Ok(outcome)
    }
}

/// What a chain visit ended with.
enum Step {
    Stop,
    Jump(Option<String>),
    End,
}

/// Evaluate one visit's links in order, recording hits and misses.
fn run_links(
    chain: &str,
    links: &[Link],
    mlist: &MailingList,
    msg: &Message,
    msgdata: &mut MessageData,
) -> Step {
    for link in links {
        let rule = &link.rule;
        if !rule.check(mlist, msg, msgdata) {
            if rule.record() {
                msgdata.rule_misses.push(rule.name().to_string());
            }
            continue;
        }
        if rule.record() {
            msgdata.rule_hits.push(rule.name().to_string());
        }
        debug!(chain, rule = %rule.name(), action = ?link.action, "Rule matched");

        match link.action {
            LinkAction::Defer => {}
            LinkAction::Stop => return Step::Stop,
            LinkAction::Jump => return Step::Jump(link.chain.clone()),
        }
    }
    Step::End
}

/// Record hit and miss rule names on the message.
fn stamp_rule_headers(msg: &mut Message, msgdata: &MessageData) {
    msg.remove_header(RULE_HITS_HEADER);
    msg.remove_header(RULE_MISSES_HEADER);
    if !msgdata.rule_hits.is_empty() {
        msg.add_header(RULE_HITS_HEADER, &msgdata.rule_hits.join("; "));
    }
    if !msgdata.rule_misses.is_empty() {
        msg.add_header(RULE_MISSES_HEADER, &msgdata.rule_misses.join("; "));
    }
}
