//! Bounce detection contract.
//!
//! A detector inspects a message that came back to the list and reports the
//! addresses that bounced. Detectors are tried in order by `scan()`.

use std::collections::BTreeSet;
use std::fmt;

use crate::message::Message;

/// What a detector found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BounceResult {
    /// Bouncing addresses. Empty means "not recognised, try the next one".
    Addresses(BTreeSet<String>),
    /// Addresses were found but the failures are not fatal. Halt bounce
    /// processing without registering anything.
    NonFatal,
    /// Discard the message without registering a bounce or forwarding it
    /// (e.g. a delivery-delay warning).
    Stop,
}

impl BounceResult {
    pub fn none() -> Self {
        Self::Addresses(BTreeSet::new())
    }

    /// Whether this result ends the scan.
    pub fn is_conclusive(&self) -> bool {
        match self {
            Self::Addresses(addresses) => !addresses.is_empty(),
            Self::NonFatal | Self::Stop => true,
        }
    }
}

/// Detects bounce addresses in one message format.
pub trait BounceDetector: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Scan `msg`. Must not fail: unrecognised input yields an empty set.
    fn process(&self, msg: &Message) -> BounceResult;
}

/// Run detectors in order and return the first conclusive result, or an
/// empty set when none recognise the message.
pub fn scan(detectors: &[Box<dyn BounceDetector>], msg: &Message) -> BounceResult {
    for detector in detectors {
        let result = detector.process(msg);
        if result.is_conclusive() {
            tracing::debug!(detector = detector.name(), result = ?result, "Bounce detected");
            return result;
        }
    }
    BounceResult::none()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Reads the comma-separated `X-Failed-Recipients` header.
    #[derive(Debug)]
    struct FailedRecipients;

    impl BounceDetector for FailedRecipients {
        fn name(&self) -> &str {
            "failed-recipients"
        }

        fn process(&self, msg: &Message) -> BounceResult {
            BounceResult::Addresses(
                msg.get_all("X-Failed-Recipients")
                    .flat_map(|v| v.split(','))
                    .map(|a| a.trim().to_lowercase())
                    .filter(|a| !a.is_empty())
                    .collect(),
            )
        }
    }

    #[derive(Debug)]
    struct Fixed(BounceResult);

    impl BounceDetector for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        fn process(&self, _msg: &Message) -> BounceResult {
            self.0.clone()
        }
    }

    #[test]
    fn first_conclusive_detector_wins() {
        let detectors: Vec<Box<dyn BounceDetector>> = vec![
            Box::new(FailedRecipients),
            Box::new(Fixed(BounceResult::Stop)),
        ];
        let msg = Message::new().with_header("X-Failed-Recipients", "A@example.com, b@example.com");
        let expected: BTreeSet<String> = ["a@example.com", "b@example.com"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(scan(&detectors, &msg), BounceResult::Addresses(expected));
    }

    #[test]
    fn empty_results_fall_through() {
        let detectors: Vec<Box<dyn BounceDetector>> = vec![
            Box::new(FailedRecipients),
            Box::new(Fixed(BounceResult::NonFatal)),
        ];
        assert_eq!(scan(&detectors, &Message::new()), BounceResult::NonFatal);
    }

    #[test]
    fn unrecognised_message_yields_empty_set() {
        let detectors: Vec<Box<dyn BounceDetector>> = vec![Box::new(FailedRecipients)];
        assert_eq!(scan(&detectors, &Message::new()), BounceResult::none());
        assert_eq!(scan(&[], &Message::new()), BounceResult::none());
    }
}
