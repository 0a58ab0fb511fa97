//! Mailing list settings consumed by the chains and the autoresponder.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Per-list settings.
///
/// Owned by the list directory (external); this crate only reads them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailingList {
    /// Fully qualified posting address, e.g. `test@example.com`.
    pub fqdn_listname: String,
    /// Human-readable list name.
    pub display_name: String,
    /// Public list information page.
    #[serde(default)]
    pub listinfo_uri: String,
    /// Reply to messages sent to the owner/admin addresses.
    #[serde(default)]
    pub autorespond_owner: bool,
    /// Reply to messages sent to the request address.
    #[serde(default)]
    pub autorespond_requests: bool,
    /// Reply to postings.
    #[serde(default)]
    pub autorespond_postings: bool,
    /// Days during which repeat replies to the same sender are suppressed.
    /// Zero or negative disables throttling.
    #[serde(default)]
    pub autoresponse_grace_period: i64,
    #[serde(default)]
    pub autoresponse_owner_text: String,
    #[serde(default)]
    pub autoresponse_request_text: String,
    #[serde(default)]
    pub autoresponse_postings_text: String,
}

impl MailingList {
    /// Create a list with autoresponses disabled.
    pub fn new(fqdn_listname: &str, display_name: &str) -> Self {
        Self {
            fqdn_listname: fqdn_listname.to_string(),
            display_name: display_name.to_string(),
            listinfo_uri: String::new(),
            autorespond_owner: false,
            autorespond_requests: false,
            autorespond_postings: false,
            autoresponse_grace_period: 0,
            autoresponse_owner_text: String::new(),
            autoresponse_request_text: String::new(),
            autoresponse_postings_text: String::new(),
        }
    }

    /// Load list settings from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        serde_json::from_str(&raw).map_err(|e| {
            ConfigError::ParseError(format!("{}: {e}", path.as_ref().display()))
        })
    }

    /// Identifier used to scope persisted records.
    pub fn list_id(&self) -> &str {
        &self.fqdn_listname
    }

    pub fn local_part(&self) -> &str {
        self.fqdn_listname
            .split_once('@')
            .map(|(local, _)| local)
            .unwrap_or(&self.fqdn_listname)
    }

    pub fn mail_host(&self) -> &str {
        self.fqdn_listname
            .split_once('@')
            .map(|(_, host)| host)
            .unwrap_or("")
    }

    pub fn posting_address(&self) -> &str {
        &self.fqdn_listname
    }

    pub fn request_address(&self) -> String {
        self.sub_address("request")
    }

    pub fn owner_address(&self) -> String {
        self.sub_address("owner")
    }

    /// Administrative address; auto-replies are sent from here.
    pub fn admin_address(&self) -> String {
        self.sub_address("admin")
    }

    fn sub_address(&self, suffix: &str) -> String {
        format!("{}-{}@{}", self.local_part(), suffix, self.mail_host())
    }
}
