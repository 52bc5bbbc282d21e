use shared::domain::{ItemId, LayoutOverlayEntry, UserId};

use crate::{reconcile::sort_view, MergedViewItem};

/// Result of a reorder gesture: the next working view and the overlay rows
/// that persist it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReorderPlan {
    pub view: Vec<MergedViewItem>,
    pub upserts: Vec<LayoutOverlayEntry>,
}

/// Moves `source` to the slot currently held by `target`.
///
/// Both ids must be in `visible`, the sequence the user is actually dragging
/// within; otherwise, or when they are equal, nothing happens. The move is
/// applied to the full working view so hidden items keep their relative
/// order. Positions are renumbered `1..=N` in the new order with pinned flags
/// untouched, and the pinned-first ordering is re-established afterwards.
pub fn plan_reorder(
    view: &[MergedViewItem],
    visible: &[ItemId],
    source: ItemId,
    target: ItemId,
    user_id: UserId,
) -> Option<ReorderPlan> {
    if source == target || !visible.contains(&source) || !visible.contains(&target) {
        return None;
    }

    let from = view.iter().position(|entry| entry.id() == source)?;
    let to = view.iter().position(|entry| entry.id() == target)?;

    let mut next = view.to_vec();
    let moved = next.remove(from);
    next.insert(to, moved);

    for (index, entry) in next.iter_mut().enumerate() {
        entry.position = index as i64 + 1;
    }
    sort_view(&mut next);

    let upserts = next
        .iter()
        .map(|entry| entry.overlay_entry(user_id))
        .collect();
    Some(ReorderPlan {
        view: next,
        upserts,
    })
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use shared::domain::{CardColor, CatalogItem, IconRef};
    use uuid::Uuid;

    use super::*;

    fn view_of(rows: &[(i64, bool)]) -> Vec<MergedViewItem> {
        rows.iter()
            .enumerate()
            .map(|(index, (id, pinned))| MergedViewItem {
                item: CatalogItem {
                    id: ItemId(*id),
                    title: format!("app-{id}"),
                    description: String::new(),
                    icon: IconRef::default(),
                    card_color: CardColor::default(),
                    target_url: None,
                    created_at: Utc::now(),
                    access_list: Vec::new(),
                },
                pinned: *pinned,
                position: index as i64 + 1,
            })
            .collect()
    }

    fn ids(view: &[MergedViewItem]) -> Vec<i64> {
        view.iter().map(|entry| entry.id().0).collect()
    }

    fn all_ids(view: &[MergedViewItem]) -> Vec<ItemId> {
        view.iter().map(MergedViewItem::id).collect()
    }

    #[test]
    fn moving_forward_relocates_instead_of_swapping() {
        let view = view_of(&[(1, false), (2, false), (3, false), (4, false)]);
        let user = UserId(Uuid::new_v4());
        let plan = plan_reorder(&view, &all_ids(&view), ItemId(1), ItemId(3), user)
            .expect("plan");
        assert_eq!(ids(&plan.view), vec![2, 3, 1, 4]);
        assert_eq!(
            plan.view.iter().map(|e| e.position).collect::<Vec<_>>(),
            vec![1, 2, 3, 4]
        );
    }

    #[test]
    fn moving_backward_inserts_before_target() {
        let view = view_of(&[(1, false), (2, false), (3, false), (4, false)]);
        let user = UserId(Uuid::new_v4());
        let plan = plan_reorder(&view, &all_ids(&view), ItemId(4), ItemId(2), user)
            .expect("plan");
        assert_eq!(ids(&plan.view), vec![1, 4, 2, 3]);
    }

    #[test]
    fn emits_one_upsert_per_item_keyed_by_user() {
        let view = view_of(&[(1, true), (2, false), (3, false)]);
        let user = UserId(Uuid::new_v4());
        let plan = plan_reorder(&view, &all_ids(&view), ItemId(3), ItemId(2), user)
            .expect("plan");

        assert_eq!(plan.upserts.len(), 3);
        assert!(plan.upserts.iter().all(|row| row.user_id == user));
        let pinned_row = plan
            .upserts
            .iter()
            .find(|row| row.item_id == ItemId(1))
            .expect("row for pinned item");
        assert!(pinned_row.pinned);
        assert_eq!(ids(&plan.view), vec![1, 3, 2]);
    }

    #[test]
    fn same_source_and_target_is_a_noop() {
        let view = view_of(&[(1, false), (2, false)]);
        let user = UserId(Uuid::new_v4());
        assert!(plan_reorder(&view, &all_ids(&view), ItemId(2), ItemId(2), user).is_none());
    }

    #[test]
    fn target_outside_visible_sequence_is_a_noop() {
        let view = view_of(&[(1, false), (2, false), (3, false)]);
        let user = UserId(Uuid::new_v4());
        let visible = vec![ItemId(1), ItemId(2)];
        assert!(plan_reorder(&view, &visible, ItemId(1), ItemId(3), user).is_none());
        assert!(plan_reorder(&view, &visible, ItemId(1), ItemId(42), user).is_none());
    }

    #[test]
    fn hidden_items_keep_their_relative_order() {
        let view = view_of(&[(1, false), (2, false), (3, false), (4, false), (5, false)]);
        let user = UserId(Uuid::new_v4());
        let visible = vec![ItemId(1), ItemId(3), ItemId(5)];
        let plan = plan_reorder(&view, &visible, ItemId(5), ItemId(1), user).expect("plan");
        assert_eq!(ids(&plan.view), vec![5, 1, 2, 3, 4]);
    }

    #[test]
    fn unpinned_item_dropped_among_pinned_heads_the_unpinned_run() {
        let view = view_of(&[(1, true), (2, true), (3, false), (4, false)]);
        let user = UserId(Uuid::new_v4());
        let plan = plan_reorder(&view, &all_ids(&view), ItemId(4), ItemId(1), user)
            .expect("plan");
        assert_eq!(ids(&plan.view), vec![1, 2, 4, 3]);
        assert!(plan.view[0].pinned && plan.view[1].pinned);
    }
}
