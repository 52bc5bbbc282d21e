use std::collections::HashSet;

use shared::domain::{CatalogItem, UserId};
use tracing::debug;

use crate::{MergedViewItem, OverlayMap};

/// Builds the merged view for one user.
///
/// Items with an overlay entry keep its position and pinned flag. Items the
/// user never touched get `pinned = false` and a position above every known
/// overlay position, handed out in catalog order, so they sort after touched
/// items and relative to each other by creation order. Overlay entries for
/// items no longer in the catalog are ignored.
pub fn reconcile(catalog: Vec<CatalogItem>, overlay: &OverlayMap) -> Vec<MergedViewItem> {
    let max_position = overlay
        .values()
        .map(|entry| entry.position)
        .max()
        .unwrap_or(0);

    let mut seen = HashSet::with_capacity(catalog.len());
    let (mut view, _) = catalog.into_iter().fold(
        (Vec::new(), max_position),
        |(mut view, running_max): (Vec<MergedViewItem>, i64), item| {
            if !seen.insert(item.id) {
                debug!(item_id = %item.id, "layout: dropping duplicate catalog item");
                return (view, running_max);
            }
            match overlay.get(&item.id) {
                Some(entry) => {
                    view.push(MergedViewItem {
                        item,
                        pinned: entry.pinned,
                        position: entry.position,
                    });
                    (view, running_max)
                }
                None => {
                    // Saturates at i64::MAX; ties then fall back to catalog order.
                    let position = running_max.saturating_add(1);
                    view.push(MergedViewItem {
                        item,
                        pinned: false,
                        position,
                    });
                    (view, position)
                }
            }
        },
    );

    sort_view(&mut view);
    view
}

/// Stable sort: pinned first, then ascending position; ties keep their order.
pub fn sort_view(view: &mut [MergedViewItem]) {
    view.sort_by_key(MergedViewItem::sort_key);
}

/// Overlay equivalent of the current view, used to re-reconcile after the
/// catalog changes without losing local layout state.
pub fn overlay_from_view(user_id: UserId, view: &[MergedViewItem]) -> OverlayMap {
    view.iter()
        .map(|entry| (entry.id(), entry.overlay_entry(user_id)))
        .collect()
}
