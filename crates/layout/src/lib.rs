//! Personalized layout engine: merges the shared catalog with one user's
//! overlay of positions and pinned flags, and plans the view transitions for
//! reorder and pin gestures.
//!
//! Everything here is synchronous and side-effect free except the
//! [`RecordStore`] seam, which storage backends implement.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use shared::{
    domain::{CatalogItem, ItemId, LayoutOverlayEntry, UserId, UserProfile},
    protocol::CatalogItemDraft,
};

pub mod access;
pub mod pin;
pub mod reconcile;
pub mod reorder;

pub use access::{filter_visible, is_visible, AccessPolicy, SearchQuery, Viewer};
pub use pin::{plan_pin_toggle, PinPlan};
pub use reconcile::{overlay_from_view, reconcile, sort_view};
pub use reorder::{plan_reorder, ReorderPlan};

/// One user's overlay, keyed by catalog item.
pub type OverlayMap = HashMap<ItemId, LayoutOverlayEntry>;

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Shared catalog ordered by creation time, oldest first.
    async fn list_catalog_items(&self) -> Result<Vec<CatalogItem>>;
    async fn create_catalog_item(&self, draft: &CatalogItemDraft) -> Result<CatalogItem>;
    async fn update_catalog_item(&self, item_id: ItemId, draft: &CatalogItemDraft) -> Result<()>;
    async fn delete_catalog_item(&self, item_id: ItemId) -> Result<()>;
    async fn list_overlay_entries(&self, user_id: UserId) -> Result<Vec<LayoutOverlayEntry>>;
    /// Inserts or updates entries keyed by (user_id, item_id).
    async fn upsert_overlay_entries(&self, entries: &[LayoutOverlayEntry]) -> Result<()>;
    async fn load_user_profile(&self, user_id: UserId) -> Result<Option<UserProfile>>;
}

/// A catalog item joined with the viewer's resolved layout state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergedViewItem {
    pub item: CatalogItem,
    pub pinned: bool,
    pub position: i64,
}

impl MergedViewItem {
    pub fn id(&self) -> ItemId {
        self.item.id
    }

    pub fn overlay_entry(&self, user_id: UserId) -> LayoutOverlayEntry {
        LayoutOverlayEntry {
            user_id,
            item_id: self.item.id,
            position: self.position,
            pinned: self.pinned,
        }
    }

    /// Pinned first, then ascending position.
    fn sort_key(&self) -> (bool, i64) {
        (!self.pinned, self.position)
    }
}

pub fn overlay_map(entries: impl IntoIterator<Item = LayoutOverlayEntry>) -> OverlayMap {
    entries
        .into_iter()
        .map(|entry| (entry.item_id, entry))
        .collect()
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
