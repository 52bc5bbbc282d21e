use shared::domain::{ItemId, LayoutOverlayEntry, UserId};

use crate::{reconcile::sort_view, MergedViewItem};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinPlan {
    pub view: Vec<MergedViewItem>,
    pub upsert: LayoutOverlayEntry,
}

/// Sets the item's pinned flag to `!current_pinned` and re-sorts the view.
///
/// The item keeps its position, so unpinning drops it back to where it sat
/// among the unpinned items. Returns `None` when the item is not in the view.
pub fn plan_pin_toggle(
    view: &[MergedViewItem],
    item_id: ItemId,
    current_pinned: bool,
    user_id: UserId,
) -> Option<PinPlan> {
    let index = view.iter().position(|entry| entry.id() == item_id)?;

    let mut next = view.to_vec();
    next[index].pinned = !current_pinned;
    let upsert = next[index].overlay_entry(user_id);
    sort_view(&mut next);

    Some(PinPlan { view: next, upsert })
}
