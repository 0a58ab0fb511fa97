//! Rules — named predicates over a message.
//!
//! Rules never mutate the message. A chain link decides what happens when a
//! rule matches; the dispatcher records the hit for rules with `record()`.

pub mod builtin;
pub mod header_match;
pub mod registry;

pub use builtin::{AnyRule, TruthRule};
pub use header_match::HeaderMatchRule;
pub use registry::RuleRegistry;

use crate::list::MailingList;
use crate::message::{Message, MessageData};

/// A named predicate evaluated against an inbound message.
pub trait Rule: Send + Sync + std::fmt::Debug {
    /// Unique name within a registry.
    fn name(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str;

    /// Whether hits and misses on this rule are recorded in the routing
    /// metadata.
    fn record(&self) -> bool {
        true
    }

    /// Does the rule match?
    fn check(&self, mlist: &MailingList, msg: &Message, msgdata: &MessageData) -> bool;
}
