//! Session-start reads against the record store.

use anyhow::Result;
use layout::{overlay_map, OverlayMap, RecordStore};
use shared::domain::{CatalogItem, UserId, UserProfile};
use tracing::{debug, warn};

/// Shared catalog in creation order. Callers degrade a failure to an empty
/// catalog; nothing is retried here.
pub async fn fetch_catalog(store: &dyn RecordStore) -> Result<Vec<CatalogItem>> {
    let items = store.list_catalog_items().await?;
    debug!(items = items.len(), "fetch: catalog loaded");
    Ok(items)
}

/// The user's overlay keyed by item. Missing personalization never blocks the
/// catalog, so failures come back as an empty overlay.
pub async fn fetch_overlay(store: &dyn RecordStore, user_id: Option<UserId>) -> OverlayMap {
    let Some(user_id) = user_id else {
        return OverlayMap::new();
    };
    match store.list_overlay_entries(user_id).await {
        Ok(entries) => {
            debug!(user_id = %user_id, entries = entries.len(), "fetch: overlay loaded");
            overlay_map(entries)
        }
        Err(err) => {
            warn!(user_id = %user_id, "fetch: overlay unavailable, using defaults: {err:#}");
            OverlayMap::new()
        }
    }
}

/// Profile for the signed-in user, or [`UserProfile::fallback`].
pub async fn fetch_profile(store: &dyn RecordStore, user_id: UserId) -> UserProfile {
    match store.load_user_profile(user_id).await {
        Ok(Some(profile)) => profile,
        Ok(None) => {
            debug!(user_id = %user_id, "fetch: no profile stored, using fallback");
            UserProfile::fallback()
        }
        Err(err) => {
            warn!(user_id = %user_id, "fetch: profile load failed: {err:#}");
            UserProfile::fallback()
        }
    }
}
