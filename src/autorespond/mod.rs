//! Automatic replies to list mail, throttled per sender.

pub mod responder;
pub mod template;

pub use responder::{
    ACK_HEADER, AckOverride, Autoresponder, ResponseCategory, ResponseDecision, SuppressReason,
};
pub use template::{Lookup, Rendered, Substitutions, render};
