//! Built-in rules shared by every chain.

use crate::list::MailingList;
use crate::message::{Message, MessageData};
use crate::rules::Rule;

/// Matches when any earlier rule in the current walk recorded a hit.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnyRule;

impl Rule for AnyRule {
    fn name(&self) -> &str {
        "any"
    }

    fn description(&self) -> &str {
        "Look for any previous rule hit."
    }

    fn record(&self) -> bool {
        false
    }

    fn check(&self, _mlist: &MailingList, _msg: &Message, msgdata: &MessageData) -> bool {
        !msgdata.rule_hits.is_empty()
    }
}

/// Always matches. Terminal chains use it to stop unconditionally.
#[derive(Debug, Clone, Copy, Default)]
pub struct TruthRule;

impl Rule for TruthRule {
    fn name(&self) -> &str {
        "truth"
    }

    fn description(&self) -> &str {
        "A rule which always matches."
    }

    fn record(&self) -> bool {
        false
    }

    fn check(&self, _mlist: &MailingList, _msg: &Message, _msgdata: &MessageData) -> bool {
        true
    }
}
