/// Push connection for mail notifications
///
/// Keeps a persistent push connection to the mail backend alive and turns the
/// server's mailbox events into intents for the application store:
///
/// - Bounded retry of failed connects
/// - Debounced reconnects on server request or sign-in
/// - Periodic idle reconnects of healthy connections
/// - New-mail notifications with sender and subject cleanup
pub mod config;
pub mod credentials;
pub mod error;
pub mod manager;
pub mod timer;
pub mod translate;
pub mod transport;
pub mod types;

pub use config::ConnectionConfig;
pub use credentials::HttpCredentialProvider;
pub use error::{PushError, PushResult};
pub use manager::{ConnectionManager, ManagerChannels};
pub use translate::{resolve_sender, translate_message};
pub use transport::{CredentialProvider, EventSender, PushTransport};
pub use types::*;
