//! list-chains — inbound rule chains and autoresponses for mailing lists.

pub mod autorespond;
pub mod bounce;
pub mod chains;
pub mod config;
pub mod delivery;
pub mod error;
pub mod list;
pub mod message;
pub mod rules;
pub mod store;
