//! The autoresponder: decide whether to answer a message, answer it, and
//! throttle repeat answers to the same sender.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::autorespond::template::Substitutions;
use crate::delivery::{Notification, Notifier};
use crate::error::ResponderError;
use crate::list::MailingList;
use crate::message::{Message, MessageData};
use crate::store::{Database, Reservation};

/// Header that controls automatic replies. Outgoing replies carry `X-Ack: No`.
pub const ACK_HEADER: &str = "X-Ack";
/// `X-Mailer` value on outgoing replies.
pub const MAILER: &str = "list-chains autoresponder";

const SECONDS_PER_DAY: i64 = 86_400;

/// Which of the list's addresses a message was sent to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseCategory {
    /// The owner or admin address.
    Owner,
    /// The request (command) address.
    Request,
    /// The posting address.
    Postings,
}

impl ResponseCategory {
    /// Owner/admin routing wins over request routing; everything else is a
    /// posting.
    pub fn for_message(msgdata: &MessageData) -> Self {
        if msgdata.to_admin || msgdata.to_owner {
            Self::Owner
        } else if msgdata.to_request {
            Self::Request
        } else {
            Self::Postings
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Request => "request",
            Self::Postings => "postings",
        }
    }

    fn enabled(&self, mlist: &MailingList) -> bool {
        match self {
            Self::Owner => mlist.autorespond_owner,
            Self::Request => mlist.autorespond_requests,
            Self::Postings => mlist.autorespond_postings,
        }
    }

    fn template<'a>(&self, mlist: &'a MailingList) -> &'a str {
        match self {
            Self::Owner => &mlist.autoresponse_owner_text,
            Self::Request => &mlist.autoresponse_request_text,
            Self::Postings => &mlist.autoresponse_postings_text,
        }
    }
}

/// The inbound message's `X-Ack` instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOverride {
    /// `X-Ack: no` — never answer this message.
    OptOut,
    /// `X-Ack: yes` — answer even inside the grace period.
    Force,
    /// Absent or any other value.
    None,
}

impl AckOverride {
    pub fn from_message(msg: &Message) -> Self {
        match msg.get(ACK_HEADER).map(|v| v.trim().to_ascii_lowercase()) {
            Some(v) if v == "no" => Self::OptOut,
            Some(v) if v == "yes" => Self::Force,
            _ => Self::None,
        }
    }
}

/// Why no reply was sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SuppressReason {
    OptOut,
    NoAck,
    Disabled(ResponseCategory),
    NoSender,
    Throttled { quiet_until: i64 },
}

/// What the autoresponder did with a message.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseDecision {
    Sent {
        notification: Notification,
        /// New quiet-until time, when the list throttles replies.
        quiet_until: Option<i64>,
    },
    Suppressed(SuppressReason),
}

impl ResponseDecision {
    pub fn is_sent(&self) -> bool {
        matches!(self, Self::Sent { .. })
    }
}

/// Sends throttled automatic replies.
pub struct Autoresponder {
    store: Arc<dyn Database>,
    notifier: Arc<dyn Notifier>,
}

impl Autoresponder {
    pub fn new(store: Arc<dyn Database>, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    pub async fn process(
        &self,
        mlist: &MailingList,
        msg: &Message,
        msgdata: &MessageData,
    ) -> Result<ResponseDecision, ResponderError> {
        self.process_at(mlist, msg, msgdata, Utc::now()).await
    }

    /// Like `process`, with the current time supplied.
    pub async fn process_at(
        &self,
        mlist: &MailingList,
        msg: &Message,
        msgdata: &MessageData,
        now: DateTime<Utc>,
    ) -> Result<ResponseDecision, ResponderError> {
        let ack = AckOverride::from_message(msg);
        if ack == AckOverride::OptOut {
            debug!(list = %mlist.list_id(), "Autoresponse declined by X-Ack");
            return Ok(ResponseDecision::Suppressed(SuppressReason::OptOut));
        }
        if msgdata.noack {
            return Ok(ResponseDecision::Suppressed(SuppressReason::NoAck));
        }

        let category = ResponseCategory::for_message(msgdata);
        if !category.enabled(mlist) {
            return Ok(ResponseDecision::Suppressed(SuppressReason::Disabled(category)));
        }

        let Some(sender) = msg.sender() else {
            warn!(list = %mlist.list_id(), "No sender address, not autoresponding");
            return Ok(ResponseDecision::Suppressed(SuppressReason::NoSender));
        };

        let now = now.timestamp();
        let grace = mlist.autoresponse_grace_period;
        // Saturates so an oversized grace period means "quiet forever".
        let quiet_until =
            (grace > 0).then(|| now.saturating_add(grace.saturating_mul(SECONDS_PER_DAY)));
        let list_id = mlist.list_id();
        let kind = category.as_str();

        // Claim the slot before sending so concurrent messages from the same
        // sender cannot both get through.
        let mut undo = None;
        if let Some(until) = quiet_until
            && ack != AckOverride::Force
        {
            match self
                .store
                .reserve_response(list_id, kind, &sender, now, until)
                .await?
            {
                Reservation::Granted { previous } => undo = Some(previous),
                Reservation::Throttled { quiet_until } => {
                    debug!(list = %list_id, category = kind, sender = %sender, quiet_until, "Autoresponse throttled");
                    return Ok(ResponseDecision::Suppressed(SuppressReason::Throttled {
                        quiet_until,
                    }));
                }
            }
        }

        let notification = compose(mlist, msg, category, &sender);

        if let Err(e) = self.notifier.send(&notification).await {
            if let Some(previous) = undo {
                self.store
                    .restore_quiet_until(list_id, kind, &sender, previous)
                    .await?;
            }
            warn!(list = %list_id, sender = %sender, error = %e, "Autoresponse delivery failed");
            return Err(e.into());
        }

        if let Some(until) = quiet_until
            && ack == AckOverride::Force
        {
            self.store
                .set_quiet_until(list_id, kind, &sender, until)
                .await?;
        }

        info!(
            list = %list_id,
            category = kind,
            sender = %sender,
            notifier = self.notifier.name(),
            "Autoresponse sent"
        );
        Ok(ResponseDecision::Sent {
            notification,
            quiet_until,
        })
    }
}

/// Build the reply for `sender`.
fn compose(
    mlist: &MailingList,
    msg: &Message,
    category: ResponseCategory,
    sender: &str,
) -> Notification {
    let subject = match msg.get("To") {
        Some(to) => format!("Auto-response for your message to {to}"),
        None => format!(
            "Auto-response for your message to the \"{}\" mailing list",
            mlist.display_name
        ),
    };

    let template = category.template(mlist);
    let body = match Substitutions::for_list(mlist).render(template) {
        Ok(rendered) => {
            if !rendered.missing.is_empty() {
                debug!(list = %mlist.list_id(), missing = ?rendered.missing, "Autoresponse template has unknown placeholders");
            }
            rendered.text
        }
        Err(e) => {
            error!(list = %mlist.list_id(), template = %template, error = %e, "Bad autoresponse text for list");
            template.to_string()
        }
    };

    Notification::new(sender, &mlist.admin_address(), &subject, &body)
        .with_header("X-Mailer", MAILER)
        .with_header(ACK_HEADER, "No")
}
