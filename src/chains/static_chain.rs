//! Statically configured chains — a fixed list of rule names and actions.

use std::sync::Arc;

use async_trait::async_trait;

use crate::chains::{Chain, Link, LinkAction};
use crate::error::ChainError;
use crate::list::MailingList;
use crate::message::{Message, MessageData};
use crate::rules::RuleRegistry;

/// One configured link: rule name, action, optional jump target.
#[derive(Debug, Clone)]
pub struct LinkSpec {
    pub rule: String,
    pub action: LinkAction,
    pub chain: Option<String>,
}

/// A chain whose links are named rules resolved against the registry on
/// every walk.
pub struct StaticChain {
    name: String,
    description: String,
    specs: Vec<LinkSpec>,
    registry: Arc<RuleRegistry>,
}

impl StaticChain {
    pub fn new(name: &str, description: &str, registry: Arc<RuleRegistry>) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            specs: Vec::new(),
            registry,
        }
    }

    /// Append a link.
    pub fn with_link(mut self, rule: &str, action: LinkAction, chain: Option<&str>) -> Self {
        self.specs.push(LinkSpec {
            rule: rule.to_string(),
            action,
            chain: chain.map(String::from),
        });
        self
    }
}

#[async_trait]
impl Chain for StaticChain {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn links(
        &self,
        _mlist: &MailingList,
        _msg: &Message,
        _msgdata: &MessageData,
    ) -> Result<Vec<Link>, ChainError> {
        self.specs
            .iter()
            .map(|spec| -> Result<Link, ChainError> {
                let rule = self.registry.require(&spec.rule)?;
                Ok(Link {
                    rule,
                    action: spec.action,
                    chain: spec.chain.clone(),
                })
            })
            .collect()
    }
}
