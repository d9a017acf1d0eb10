//! TravelsBud core: mutual-like matching and conversation fan-out over the
//! document store, plus the profile, meetup and group chat flows that share it.

pub mod blobs;
pub mod error;
pub mod fanout;
pub mod group_chats;
pub mod identity;
pub mod inbox;
pub mod matcher;
pub mod meetups;
pub mod paths;
pub mod profiles;
pub mod push;
pub mod receipts;

pub use blobs::BlobStore;
pub use error::CoreError;
pub use fanout::Fanout;
pub use group_chats::GroupChats;
pub use identity::{IdentityProvider, Session};
pub use inbox::Inbox;
pub use matcher::{LikeOutcome, Matcher, is_mutual_match};
pub use meetups::Meetups;
pub use profiles::Profiles;
pub use push::{FcmPushGateway, NullPushGateway, PushError, PushGateway};

use std::sync::Arc;

use travelsbud_db::{Database, StoreError};

/// Every service, wired to one store. Constructed once at startup and passed
/// down explicitly.
#[derive(Clone)]
pub struct Services {
    pub db: Arc<Database>,
    pub blobs: Arc<BlobStore>,
    pub matcher: Matcher,
    pub fanout: Fanout,
    pub inbox: Inbox,
    pub profiles: Profiles,
    pub meetups: Meetups,
    pub group_chats: GroupChats,
}

impl Services {
    pub fn new(db: Arc<Database>, push: Arc<dyn PushGateway>, blobs: Arc<BlobStore>) -> Self {
        Self {
            matcher: Matcher::new(db.clone()),
            fanout: Fanout::new(db.clone(), push),
            inbox: Inbox::new(db.clone()),
            profiles: Profiles::new(db.clone(), blobs.clone()),
            meetups: Meetups::new(db.clone()),
            group_chats: GroupChats::new(db.clone()),
            db,
            blobs,
        }
    }
}

/// Run a blocking store call off the async runtime.
pub(crate) async fn blocking<F, T>(db: &Arc<Database>, f: F) -> Result<T, CoreError>
where
    F: FnOnce(&Database) -> Result<T, CoreError> + Send + 'static,
    T: Send + 'static,
{
    let db = db.clone();
    tokio::task::spawn_blocking(move || f(&db))
        .await
        .map_err(|e| CoreError::from(StoreError::Background(e.to_string())))?
}
