//! Profile setup and the swipe deck.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::json;
use tracing::{info, warn};

use travelsbud_db::{Database, Query, fields};
use travelsbud_types::api::SaveProfileRequest;
use travelsbud_types::models::UserProfile;

use crate::blobs::BlobStore;
use crate::error::CoreError;
use crate::identity::{IdentityProvider, require_user};
use crate::{blocking, paths};

const MIN_AGE: u32 = 18;
const MAX_USERNAME_LEN: usize = 64;
const MAX_BIO_LEN: usize = 1000;

/// Raster formats accepted for profile photos. Nothing scriptable is stored.
pub const PHOTO_CONTENT_TYPES: &[&str] = &["image/jpeg", "image/png", "image/webp"];

#[derive(Clone)]
pub struct Profiles {
    db: Arc<Database>,
    blobs: Arc<BlobStore>,
}

impl Profiles {
    pub fn new(db: Arc<Database>, blobs: Arc<BlobStore>) -> Self {
        Self { db, blobs }
    }

    /// Write the editable profile fields. Photo URL and device token are
    /// left as they are.
    pub async fn save_profile<I: IdentityProvider + ?Sized>(
        &self,
        identity: &I,
        req: SaveProfileRequest,
    ) -> Result<(), CoreError> {
        let user_id = require_user(identity)?.to_string();
        validate_profile(&req)?;

        let path = paths::user(&user_id);
        let body = fields(json!({
            "username": req.username.trim(),
            "age": req.age.trim(),
            "interests": req.interests,
            "gender": req.gender,
            "bio": req.bio,
        }));
        blocking(&self.db, move |db| {
            db.merge(&path, body).map_err(CoreError::write("save profile"))
        })
        .await?;

        info!("Profile saved for {}", user_id);
        Ok(())
    }

    pub async fn get_profile(&self, user_id: &str) -> Result<UserProfile, CoreError> {
        paths::check_id("user", user_id)?;
        let path = paths::user(user_id);
        blocking(&self.db, move |db| {
            db.get(&path)
                .map_err(CoreError::read("read profile"))?
                .ok_or(CoreError::NotFound(path))?
                .decode()
                .map_err(CoreError::read("decode profile"))
        })
        .await
    }

    /// Every profile except the caller's own and those the caller already
    /// liked.
    pub async fn swipe_candidates<I: IdentityProvider + ?Sized>(
        &self,
        identity: &I,
    ) -> Result<Vec<UserProfile>, CoreError> {
        let user_id = require_user(identity)?.to_string();

        blocking(&self.db, move |db| {
            let liked: HashSet<String> = db
                .query(&Query::new(paths::likes(&user_id)))
                .map_err(CoreError::read("read likes"))?
                .into_iter()
                .filter(|doc| doc.get_bool("liked").unwrap_or(false))
                .map(|doc| doc.id)
                .collect();

            let profiles = db
                .query(&Query::new(paths::USERS))
                .map_err(CoreError::read("read profiles"))?;

            Ok(profiles
                .iter()
                .filter(|doc| doc.id != user_id && !liked.contains(&doc.id))
                .filter_map(|doc| match doc.decode::<UserProfile>() {
                    Ok(profile) => Some(profile),
                    Err(e) => {
                        warn!("Skipping malformed profile: {}", e);
                        None
                    }
                })
                .collect())
        })
        .await
    }

    /// Store the caller's profile photo and point `photoURL` at it.
    pub async fn upload_photo<I: IdentityProvider + ?Sized>(
        &self,
        identity: &I,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<String, CoreError> {
        let user_id = require_user(identity)?.to_string();
        let content_type = photo_content_type(content_type).ok_or_else(|| {
            CoreError::InvalidInput(format!(
                "profile photo must be one of {}, got {}",
                PHOTO_CONTENT_TYPES.join(", "),
                content_type
            ))
        })?;

        let url = self
            .blobs
            .upload(&format!("profile_images/{}.jpg", user_id), bytes, content_type)
            .await?;

        let path = paths::user(&user_id);
        let body = fields(json!({ "photoURL": url }));
        blocking(&self.db, move |db| {
            db.merge(&path, body).map_err(CoreError::write("save photo url"))
        })
        .await?;

        info!("Profile photo updated for {}", user_id);
        Ok(url)
    }

    /// Remember the device that should receive the caller's push
    /// notifications.
    pub async fn register_device_token<I: IdentityProvider + ?Sized>(
        &self,
        identity: &I,
        token: &str,
    ) -> Result<(), CoreError> {
        let user_id = require_user(identity)?.to_string();
        let token = token.trim();
        if token.is_empty() {
            return Err(CoreError::InvalidInput("device token is empty".into()));
        }

        let path = paths::user(&user_id);
        let body = fields(json!({ "fcmToken": token }));
        blocking(&self.db, move |db| {
            db.merge(&path, body).map_err(CoreError::write("save device token"))
        })
        .await?;

        info!("Device token registered for {}", user_id);
        Ok(())
    }
}

/// The canonical accepted type for a Content-Type header value, ignoring
/// parameters and case.
fn photo_content_type(header: &str) -> Option<&'static str> {
    let essence = header.split(';').next().unwrap_or_default().trim();
    PHOTO_CONTENT_TYPES
        .iter()
        .copied()
        .find(|allowed| allowed.eq_ignore_ascii_case(essence))
}

fn validate_profile(req: &SaveProfileRequest) -> Result<(), CoreError> {
    let username = req.username.trim();
    if username.is_empty() || username.len() > MAX_USERNAME_LEN {
        return Err(CoreError::InvalidInput(format!(
            "username must be 1-{} characters",
            MAX_USERNAME_LEN
        )));
    }

    // Age is optional, but when given it has to be a real adult age.
    let age = req.age.trim();
    if !age.is_empty() {
        match age.parse::<u32>() {
            Ok(n) if n >= MIN_AGE => {}
            _ => {
                return Err(CoreError::InvalidInput(format!(
                    "age must be a number of at least {}",
                    MIN_AGE
                )));
            }
        }
    }

    if req.bio.len() > MAX_BIO_LEN {
        return Err(CoreError::InvalidInput(format!(
            "bio is limited to {} characters",
            MAX_BIO_LEN
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Session;

    async fn profiles() -> (Profiles, Arc<Database>, std::path::PathBuf) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let dir = std::env::temp_dir().join(format!(
            "travelsbud-profiles-{}-{}",
            std::process::id(),
            chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
        ));
        let blobs = Arc::new(BlobStore::new(dir.clone(), "http://localhost:3000").await.unwrap());
        (Profiles::new(db.clone(), blobs), db, dir)
    }

    fn request(username: &str, age: &str) -> SaveProfileRequest {
        SaveProfileRequest {
            username: username.into(),
            age: age.into(),
            interests: vec!["hiking".into()],
            gender: "female".into(),
            bio: "Backpacking through Asia".into(),
        }
    }

    #[tokio::test]
    async fn saving_keeps_photo_and_device_token() {
        let (profiles, db, dir) = profiles().await;
        let alice = Session::signed_in("alice");

        profiles.register_device_token(&alice, "tok-1").await.unwrap();
        let url = profiles.upload_photo(&alice, b"jpeg", "image/jpeg").await.unwrap();
        profiles.save_profile(&alice, request("Alice", "29")).await.unwrap();

        let profile = profiles.get_profile("alice").await.unwrap();
        assert_eq!(profile.username, "Alice");
        assert_eq!(profile.age, "29");
        assert_eq!(profile.photo_url.as_deref(), Some(url.as_str()));
        let doc = db.get("users/alice").unwrap().unwrap();
        assert_eq!(doc.get_str("fcmToken"), Some("tok-1"));

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn invalid_profiles_are_rejected() {
        let (profiles, _db, dir) = profiles().await;
        let alice = Session::signed_in("alice");

        for (username, age) in [("", "30"), ("Alice", "17"), ("Alice", "old")] {
            assert!(matches!(
                profiles.save_profile(&alice, request(username, age)).await,
                Err(CoreError::InvalidInput(_))
            ));
        }
        assert!(profiles.save_profile(&alice, request("Alice", "")).await.is_ok());
        assert!(matches!(
            profiles.save_profile(&Session::anonymous(), request("Alice", "30")).await,
            Err(CoreError::Unauthenticated)
        ));
        assert!(matches!(
            profiles.upload_photo(&alice, b"%PDF", "application/pdf").await,
            Err(CoreError::InvalidInput(_))
        ));

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn only_raster_photos_are_stored() {
        let (profiles, db, dir) = profiles().await;
        let mallory = Session::signed_in("mallory");

        for content_type in ["image/svg+xml", "text/html", "image/", ""] {
            assert!(
                matches!(
                    profiles
                        .upload_photo(&mallory, b"<svg><script>alert(1)</script></svg>", content_type)
                        .await,
                    Err(CoreError::InvalidInput(_))
                ),
                "accepted {:?}",
                content_type
            );
        }
        assert!(db.get("users/mallory").unwrap().is_none());

        profiles
            .upload_photo(&mallory, b"png-bytes", "Image/PNG; charset=binary")
            .await
            .unwrap();
        let (_, stored) = profiles.blobs.read("profile_images/mallory.jpg").await.unwrap();
        assert_eq!(stored, "image/png");

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn candidates_skip_self_and_liked_users() {
        let (profiles, db, dir) = profiles().await;
        for name in ["alice", "bob", "carol"] {
            profiles
                .save_profile(&Session::signed_in(name), request(name, "30"))
                .await
                .unwrap();
        }
        db.set(&paths::like_edge("alice", "bob"), fields(json!({ "liked": true })))
            .unwrap();

        let candidates = profiles
            .swipe_candidates(&Session::signed_in("alice"))
            .await
            .unwrap();
        let ids: Vec<_> = candidates.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["carol"]);

        let _ = std::fs::remove_dir_all(dir);
    }
}
