//! Database layer - client lifecycle and the typed collection handle

pub mod connection;

pub use connection::{Catalog, ConnectArgs, ConnectArgsBuilder, connect};
