//! Store implementations backed by MongoDB, plus the contact profile seam
//!
//! [`Stores`] bundles one implementation of every persistence trait the
//! service needs, either all MongoDB or all in-memory.

mod chat;
mod reputation;
mod subscription;
mod users;

pub use self::chat::MongoSessionStore;
pub use self::reputation::{MongoActivityLog, MongoReputationStore};
pub use self::subscription::MongoSubscriptionStore;
pub use self::users::{MongoUserDirectory, UserProfiles};

use std::sync::Arc;

use ::reputation::{ActivityLog, InMemoryActivityLog, InMemoryReputationStore, ReputationStore};
use ::subscription::{InMemorySubscriptionStore, SubscriptionStore};
use notify::{ContactDirectory, InMemoryContacts};
use tutor_agent::{InMemorySessionStore, SessionStore};

use crate::db::MongoClient;
use crate::server::StorageMode;
use crate::types::Result;

pub struct Stores {
    pub mode: StorageMode,
    pub subscriptions: Arc<dyn SubscriptionStore>,
    pub reputation: Arc<dyn ReputationStore>,
    pub activity: Arc<dyn ActivityLog>,
    pub sessions: Arc<dyn SessionStore>,
    pub contacts: Arc<dyn ContactDirectory>,
    pub profiles: Arc<dyn UserProfiles>,
}

impl Stores {
    /// Collections in `mongo`, creating their indexes.
    pub async fn mongo(mongo: &MongoClient) -> Result<Self> {
        let users = Arc::new(MongoUserDirectory::new(mongo).await?);
        Ok(Self {
            mode: StorageMode::Mongo,
            subscriptions: Arc::new(MongoSubscriptionStore::new(mongo).await?),
            reputation: Arc::new(MongoReputationStore::new(mongo).await?),
            activity: Arc::new(MongoActivityLog::new(mongo).await?),
            sessions: Arc::new(MongoSessionStore::new(mongo).await?),
            contacts: users.clone(),
            profiles: users,
        })
    }

    pub fn in_memory() -> Self {
        let contacts = Arc::new(InMemoryContacts::new());
        Self {
            mode: StorageMode::Memory,
            subscriptions: Arc::new(InMemorySubscriptionStore::new()),
            reputation: Arc::new(InMemoryReputationStore::new()),
            activity: Arc::new(InMemoryActivityLog::new()),
            sessions: Arc::new(InMemorySessionStore::new()),
            contacts: contacts.clone(),
            profiles: contacts,
        }
    }
}
