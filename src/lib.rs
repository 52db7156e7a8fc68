pub mod cli;
pub mod push;

pub use push::{ConnectionConfig, ConnectionManager, PushError, PushResult};
