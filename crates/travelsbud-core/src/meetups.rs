use std::sync::Arc;

use futures_util::{Stream, StreamExt};
use serde_json::json;
use tracing::{info, warn};

use travelsbud_db::{
    Database, Direction, Document, Query, array_remove, array_union, fields, format_timestamp, watch,
};
use travelsbud_types::api::CreateMeetupRequest;
use travelsbud_types::models::Meetup;

use crate::error::CoreError;
use crate::identity::{IdentityProvider, require_user};
use crate::{blocking, paths};

const MAX_TITLE_LEN: usize = 120;

#[derive(Clone)]
pub struct Meetups {
    db: Arc<Database>,
}

impl Meetups {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Create a meetup with the caller as its first attendee.
    pub async fn create_meetup<I: IdentityProvider + ?Sized>(
        &self,
        identity: &I,
        req: CreateMeetupRequest,
    ) -> Result<String, CoreError> {
        let user_id = require_user(identity)?.to_string();
        let title = req.title.trim().to_string();
        if title.is_empty() || title.len() > MAX_TITLE_LEN {
            return Err(CoreError::InvalidInput(format!(
                "meetup title must be 1-{} characters",
                MAX_TITLE_LEN
            )));
        }

        let body = fields(json!({
            "title": title,
            "description": req.description,
            "location": req.location,
            "timestamp": format_timestamp(req.date),
            "creatorID": user_id,
            "attendees": [user_id],
        }));
        let meetup_id = blocking(&self.db, move |db| {
            db.add_document(paths::MEETUPS, body)
                .map_err(CoreError::write("create meetup"))
        })
        .await?;

        info!("Meetup {} created by {}", meetup_id, user_id);
        Ok(meetup_id)
    }

    /// Ascending by meetup date.
    pub async fn list_meetups(&self) -> Result<Vec<Meetup>, CoreError> {
        let docs = blocking(&self.db, move |db| {
            db.query(&meetups_query()).map_err(CoreError::read("list meetups"))
        })
        .await?;
        Ok(decode_meetups(&docs))
    }

    pub fn watch_meetups(&self) -> impl Stream<Item = Result<Vec<Meetup>, CoreError>> + Send + use<> {
        watch(self.db.clone(), meetups_query()).map(|snapshot| {
            snapshot
                .map(|docs| decode_meetups(&docs))
                .map_err(CoreError::read("watch meetups"))
        })
    }

    pub async fn join_meetup<I: IdentityProvider + ?Sized>(
        &self,
        identity: &I,
        meetup_id: &str,
    ) -> Result<(), CoreError> {
        let user_id = require_user(identity)?.to_string();
        self.update_attendees(meetup_id, array_union([user_id.as_str()]))
            .await?;
        info!("{} joined meetup {}", user_id, meetup_id);
        Ok(())
    }

    pub async fn leave_meetup<I: IdentityProvider + ?Sized>(
        &self,
        identity: &I,
        meetup_id: &str,
    ) -> Result<(), CoreError> {
        let user_id = require_user(identity)?.to_string();
        self.update_attendees(meetup_id, array_remove([user_id.as_str()]))
            .await?;
        info!("{} left meetup {}", user_id, meetup_id);
        Ok(())
    }

    async fn update_attendees(
        &self,
        meetup_id: &str,
        change: serde_json::Value,
    ) -> Result<(), CoreError> {
        paths::check_id("meetup", meetup_id)?;
        let path = paths::meetup(meetup_id);
        blocking(&self.db, move |db| {
            db.update(&path, fields(json!({ "attendees": change })))
                .map_err(CoreError::write("update attendees"))
        })
        .await
    }
}

fn meetups_query() -> Query {
    Query::new(paths::MEETUPS).order_by("timestamp", Direction::Ascending)
}

fn decode_meetups(docs: &[Document]) -> Vec<Meetup> {
    docs.iter()
        .filter_map(|doc| match doc.decode::<Meetup>() {
            Ok(meetup) => Some(meetup),
            Err(e) => {
                warn!("Skipping malformed meetup: {}", e);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Session;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn request(title: &str, date: DateTime<Utc>) -> CreateMeetupRequest {
        CreateMeetupRequest {
            title: title.into(),
            description: "Street food crawl".into(),
            location: "Bangkok".into(),
            date,
        }
    }

    #[tokio::test]
    async fn meetups_list_by_date_and_track_attendees() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let meetups = Meetups::new(db);
        let alice = Session::signed_in("alice");
        let bob = Session::signed_in("bob");

        let later = Utc.with_ymd_and_hms(2030, 6, 2, 18, 0, 0).unwrap();
        let sooner = later - Duration::days(1);
        let late_id = meetups.create_meetup(&alice, request("Night market", later)).await.unwrap();
        let soon_id = meetups.create_meetup(&alice, request("Temple walk", sooner)).await.unwrap();

        meetups.join_meetup(&bob, &late_id).await.unwrap();
        meetups.join_meetup(&bob, &late_id).await.unwrap();

        let listed = meetups.list_meetups().await.unwrap();
        let ids: Vec<_> = listed.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec![soon_id.as_str(), late_id.as_str()]);
        assert_eq!(listed[1].attendees, vec!["alice", "bob"]);
        assert_eq!(listed[1].creator_id, "alice");

        meetups.leave_meetup(&bob, &late_id).await.unwrap();
        let listed = meetups.list_meetups().await.unwrap();
        assert_eq!(listed[1].attendees, vec!["alice"]);
    }

    #[tokio::test]
    async fn title_is_required_and_unknown_meetups_fail() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let meetups = Meetups::new(db);
        let alice = Session::signed_in("alice");

        assert!(matches!(
            meetups.create_meetup(&alice, request("  ", Utc::now())).await,
            Err(CoreError::InvalidInput(_))
        ));
        assert!(matches!(
            meetups.join_meetup(&alice, "missing").await,
            Err(CoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn watch_emits_new_meetups() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let meetups = Meetups::new(db);
        let mut stream = Box::pin(meetups.watch_meetups());
        assert!(stream.next().await.unwrap().unwrap().is_empty());

        meetups
            .create_meetup(&Session::signed_in("alice"), request("Hike", Utc::now()))
            .await
            .unwrap();
        let snapshot = stream.next().await.unwrap().unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].title, "Hike");
    }
}
