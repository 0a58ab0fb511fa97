//! Header pattern rule used by the header-match chain.

use std::sync::Arc;

use regex::{Regex, RegexBuilder};

use crate::error::RuleError;
use crate::list::MailingList;
use crate::message::{Message, MessageData};
use crate::rules::{Rule, RuleRegistry};

/// Name prefix shared by every dynamically created header-match rule.
pub const HEADER_MATCH_PREFIX: &str = "header-match-";

/// Matches when any occurrence of `header` matches `pattern`.
///
/// The header name is case-insensitive; the pattern is an unanchored,
/// case-insensitive regular expression.
#[derive(Debug)]
pub struct HeaderMatchRule {
    name: String,
    description: String,
    header: String,
    pattern: String,
    regex: Regex,
}

impl HeaderMatchRule {
    /// Compile the pattern, assign the next `header-match-NN` name and
    /// register the rule.
    pub fn register(
        registry: &RuleRegistry,
        header: &str,
        pattern: &str,
    ) -> Result<Arc<Self>, RuleError> {
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| RuleError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })?;

        let rule = Arc::new(Self {
            name: format!("{HEADER_MATCH_PREFIX}{:02}", registry.next_sequence()),
            description: format!("{header}: {pattern}"),
            header: header.to_string(),
            pattern: pattern.to_string(),
            regex,
        });
        registry.register(rule.clone())?;
        Ok(rule)
    }

    pub fn header(&self) -> &str {
        &self.header
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

impl Rule for HeaderMatchRule {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn check(&self, _mlist: &MailingList, msg: &Message, _msgdata: &MessageData) -> bool {
        msg.get_all(&self.header)
            .any(|value| self.regex.is_match(value))
    }
}
