//! Protocol implementations.
//!
//! - `mysql`: MySQL client/server protocol, enough to greet, accept a login
//!   and answer queries with a local file request

pub mod mysql;
