use axum::{Extension, Json};

use crate::auth::middleware::MaybeIdentity;
use crate::config::Config;
use crate::rating::{RatingEngine, RatingsView, RemoteSync};
use crate::routes::RemoteProfiles;
use crate::store::LocalStore;

/// Rating engine for `user_id`, or the guest record when anonymous. Remote
/// sync only applies to authenticated identities.
pub async fn load_ratings(config: &Config, remote: &RemoteProfiles, user_id: Option<i64>) -> RatingEngine {
    let local = LocalStore::for_identity(&config.ratings_dir, user_id);
    let sync = match (&remote.0, user_id) {
        (Some(store), Some(user_id)) => Some(RemoteSync {
            store: store.clone(),
            user_id,
        }),
        _ => None,
    };
    RatingEngine::load(config.rating_floor, local, sync).await
}

/// GET /api/ratings
pub async fn get_ratings(
    Extension(config): Extension<Config>,
    Extension(remote): Extension<RemoteProfiles>,
    MaybeIdentity(user_id): MaybeIdentity,
) -> Json<RatingsView> {
    Json(load_ratings(&config, &remote, user_id).await.view())
}
