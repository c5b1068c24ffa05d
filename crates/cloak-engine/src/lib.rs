//! The messaging and moderation engine.
//!
//! Components are cheap to clone (they share the store and the bus) and
//! synchronous, apart from the consent gate and the blob store, which do I/O
//! on disk. Async callers should run the synchronous ones on the blocking pool.

pub mod accounts;
pub mod blob;
pub mod consent;
mod convert;
pub mod directory;
pub mod error;
pub mod identity;
pub mod ledger;
pub mod moderation;
pub mod resolver;
pub mod social;
pub mod store;

use std::sync::Arc;

use cloak_db::Database;
use cloak_gateway::Dispatcher;

pub use accounts::Accounts;
pub use blob::BlobStore;
pub use consent::{ConsentGate, ConsentGates, PendingFile};
pub use directory::GroupDirectory;
pub use error::{CloakError, Result, ValidationError};
pub use identity::{Identity, SessionContext};
pub use ledger::StatusLedger;
pub use moderation::ModerationEngine;
pub use resolver::ConversationResolver;
pub use social::SocialGraph;
pub use store::MessageStore;

/// Every engine component wired to one store, one bus and one blob store.
pub struct Engine {
    pub accounts: Accounts,
    pub directory: GroupDirectory,
    pub resolver: ConversationResolver,
    pub messages: MessageStore,
    pub statuses: StatusLedger,
    pub moderation: ModerationEngine,
    pub social: SocialGraph,
    pub gates: ConsentGates,
    pub dispatcher: Dispatcher,
    pub blobs: Arc<BlobStore>,
    db: Arc<Database>,
}

impl Engine {
    pub fn new(db: Arc<Database>, dispatcher: Dispatcher, blobs: Arc<BlobStore>) -> Self {
        let messages = MessageStore::new(db.clone(), dispatcher.clone());
        Self {
            accounts: Accounts::new(db.clone(), dispatcher.clone()),
            directory: GroupDirectory::new(db.clone()),
            resolver: ConversationResolver::new(db.clone()),
            statuses: StatusLedger::new(db.clone(), dispatcher.clone()),
            moderation: ModerationEngine::new(db.clone(), dispatcher.clone()),
            social: SocialGraph::new(db.clone()),
            gates: ConsentGates::new(messages.clone(), blobs.clone()),
            messages,
            dispatcher,
            blobs,
            db,
        }
    }

    pub fn db(&self) -> &Arc<Database> {
        &self.db
    }
}
