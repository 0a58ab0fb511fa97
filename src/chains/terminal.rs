//! Terminal chains — stop unconditionally with a fixed disposition.

use std::sync::Arc;

use async_trait::async_trait;

use crate::chains::{Chain, Disposition, Link};
use crate::error::{ChainError, RuleError};
use crate::list::MailingList;
use crate::message::{Message, MessageData};
use crate::rules::{Rule, RuleRegistry};

/// A chain with a single `truth` → stop link.
pub struct TerminalChain {
    disposition: Disposition,
    description: &'static str,
    truth: Arc<dyn Rule>,
}

impl TerminalChain {
    /// Build the terminal chain for a disposition, using the registry's
    /// `truth` rule.
    pub fn new(disposition: Disposition, registry: &RuleRegistry) -> Result<Self, RuleError> {
        let description = match disposition {
            Disposition::Accept => "Accept a message.",
            Disposition::Hold => "Hold a message and stop processing.",
            Disposition::Reject => "Reject/bounce a message and stop processing.",
            Disposition::Discard => "Discard a message and stop processing.",
        };
        Ok(Self {
            disposition,
            description,
            truth: registry.require("truth")?,
        })
    }
}

#[async_trait]
impl Chain for TerminalChain {
    fn name(&self) -> &str {
        self.disposition.chain_name()
    }

    fn description(&self) -> &str {
        self.description
    }

    async fn links(
        &self,
        _mlist: &MailingList,
        _msg: &Message,
        _msgdata: &MessageData,
    ) -> Result<Vec<Link>, ChainError> {
        Ok(vec![Link::stop(Arc::clone(&self.truth))])
    }

    fn disposition(&self) -> Option<Disposition> {
        Some(self.disposition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chains::LinkAction;

    #[tokio::test]
    async fn single_stop_link() {
        let registry = RuleRegistry::with_builtin();
        let chain = TerminalChain::new(Disposition::Hold, &registry).unwrap();
        assert_eq!(chain.name(), "hold");
        assert_eq!(chain.disposition(), Some(Disposition::Hold));

        let mlist = MailingList::new("test@example.com", "Test");
        let links = chain
            .links(&mlist, &Message::new(), &MessageData::default())
            .await
            .unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].action, LinkAction::Stop);
        assert_eq!(links[0].rule.name(), "truth");
    }

    #[test]
    fn requires_truth_rule() {
        let registry = RuleRegistry::new();
        assert!(TerminalChain::new(Disposition::Accept, &registry).is_err());
    }
}
