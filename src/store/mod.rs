//! Persistence layer — libSQL-backed storage for header matches and
//! autoresponse throttling.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::{Database, HeaderMatch, Reservation};
