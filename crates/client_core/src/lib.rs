//! Client side of the vocabulary trainer: the per-user vocabulary session,
//! word entry, phrase generation and replication with a remote server.

pub mod error;
pub mod form;
pub mod generator;
pub mod remote;
pub mod session;
pub mod sync;

pub use error::VocabError;
pub use form::WordForm;
pub use generator::{generate, generate_phrase, Phrase, PhraseBlock, PhraseOptions};
pub use remote::RemoteStore;
pub use session::VocabularySession;
pub use sync::{follow_remote_changes, SyncConfig, SyncCoordinator, SyncEvent};
