//! Chains — named, ordered sequences of links applied to a message.
//!
//! A chain produces its links afresh on every walk; link sources such as
//! configuration text and persisted per-list records can change between
//! walks, so callers must not assume two walks see the same links.
//!
//! Flow: `Dispatcher::process()` walks the start chain. Each link's rule is
//! checked; a match either defers (continue), jumps to another chain, or
//! stops. Terminal chains (`accept`, `hold`, `reject`, `discard`) stop
//! unconditionally and carry the final disposition.

pub mod dispatcher;
pub mod header_match;
pub mod static_chain;
pub mod terminal;

pub use dispatcher::{Dispatcher, WalkOutcome};
pub use header_match::{HeaderMatchChain, make_link};
pub use static_chain::StaticChain;
pub use terminal::TerminalChain;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ChainError;
use crate::list::MailingList;
use crate::message::{Message, MessageData};
use crate::rules::Rule;

// ── Links ───────────────────────────────────────────────────────────

/// What a link does when its rule matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkAction {
    /// Continue with the next link in the current chain.
    Defer,
    /// Continue with the first link of another chain.
    Jump,
    /// End processing.
    Stop,
}

/// A rule bound to an action.
#[derive(Debug, Clone)]
pub struct Link {
    pub rule: Arc<dyn Rule>,
    pub action: LinkAction,
    /// Jump target. `None` on a jump link means the configured default.
    pub chain: Option<String>,
}

impl Link {
    pub fn defer(rule: Arc<dyn Rule>) -> Self {
        Self {
            rule,
            action: LinkAction::Defer,
            chain: None,
        }
    }

    pub fn jump(rule: Arc<dyn Rule>, chain: Option<&str>) -> Self {
        Self {
            rule,
            action: LinkAction::Jump,
            chain: chain.map(String::from),
        }
    }

    pub fn stop(rule: Arc<dyn Rule>) -> Self {
        Self {
            rule,
            action: LinkAction::Stop,
            chain: None,
        }
    }
}

// ── Dispositions ────────────────────────────────────────────────────

/// Final fate of a message, decided by a terminal chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// Deliver to the list.
    Accept,
    /// Hold for moderator approval.
    Hold,
    /// Bounce back to the sender.
    Reject,
    /// Drop silently.
    Discard,
}

impl Disposition {
    /// Name of the terminal chain for this disposition.
    pub fn chain_name(&self) -> &'static str {
        match self {
            Self::Accept => "accept",
            Self::Hold => "hold",
            Self::Reject => "reject",
            Self::Discard => "discard",
        }
    }

    pub fn all() -> [Disposition; 4] {
        [Self::Accept, Self::Hold, Self::Reject, Self::Discard]
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.chain_name())
    }
}

// ── Chain trait ─────────────────────────────────────────────────────

/// A named source of links.
#[async_trait]
pub trait Chain: Send + Sync {
    /// Unique chain name.
    fn name(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str;

    /// Produce the ordered links for this message. Called once per visit.
    async fn links(
        &self,
        mlist: &MailingList,
        msg: &Message,
        msgdata: &MessageData,
    ) -> Result<Vec<Link>, ChainError>;

    /// Disposition applied when processing stops in this chain.
    fn disposition(&self) -> Option<Disposition> {
        None
    }

    /// Called once the walk has finished with the links of one visit.
    /// Chains that register rules per visit unregister them here.
    fn release(&self, _links: &[Link]) {}
}
