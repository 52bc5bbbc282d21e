use chrono::{TimeZone, Utc};
use shared::domain::{CardColor, CatalogItem, IconRef, Role, UserId};
use uuid::Uuid;

use super::*;

fn catalog(ids: &[i64]) -> Vec<CatalogItem> {
    ids.iter()
        .map(|id| CatalogItem {
            id: ItemId(*id),
            title: format!("app-{id}"),
            description: format!("description {id}"),
            icon: IconRef::default(),
            card_color: CardColor::default(),
            target_url: Some(format!("https://app{id}.example.com")),
            created_at: Utc.timestamp_opt(1_700_000_000 + id, 0).unwrap(),
            access_list: Vec::new(),
        })
        .collect()
}

fn ids(view: &[MergedViewItem]) -> Vec<i64> {
    view.iter().map(|entry| entry.id().0).collect()
}

fn visible_ids(view: &[MergedViewItem]) -> Vec<ItemId> {
    view.iter().map(MergedViewItem::id).collect()
}

#[test]
fn worked_example_two_items_then_pin() {
    let user = UserId(Uuid::new_v4());
    let view = reconcile(catalog(&[1, 2]), &OverlayMap::new());
    assert_eq!(ids(&view), vec![1, 2]);
    assert_eq!((view[0].position, view[0].pinned), (1, false));
    assert_eq!((view[1].position, view[1].pinned), (2, false));

    let plan = plan_pin_toggle(&view, ItemId(2), false, user).expect("toggle");
    assert_eq!(ids(&plan.view), vec![2, 1]);
    assert_eq!((plan.view[0].position, plan.view[0].pinned), (2, true));
    assert_eq!((plan.view[1].position, plan.view[1].pinned), (1, false));
}

#[test]
fn reconcile_is_deterministic() {
    let user = UserId(Uuid::new_v4());
    let overlay = overlay_map([
        LayoutOverlayEntry {
            user_id: user,
            item_id: ItemId(4),
            position: 2,
            pinned: true,
        },
        LayoutOverlayEntry {
            user_id: user,
            item_id: ItemId(2),
            position: 2,
            pinned: false,
        },
    ]);
    let first = reconcile(catalog(&[1, 2, 3, 4, 5]), &overlay);
    let second = reconcile(catalog(&[1, 2, 3, 4, 5]), &overlay);
    assert_eq!(first, second);
    assert_eq!(ids(&first), vec![4, 2, 1, 3, 5]);
}

#[test]
fn reorder_survives_reload_for_every_source_target_pair() {
    let user = UserId(Uuid::new_v4());
    let seed = overlay_map([LayoutOverlayEntry {
        user_id: user,
        item_id: ItemId(3),
        position: 1,
        pinned: true,
    }]);
    let view = reconcile(catalog(&[1, 2, 3, 4]), &seed);
    let visible = visible_ids(&view);

    for source in &visible {
        for target in &visible {
            let Some(plan) = plan_reorder(&view, &visible, *source, *target, user) else {
                assert_eq!(source, target);
                continue;
            };
            let reloaded = reconcile(catalog(&[1, 2, 3, 4]), &overlay_map(plan.upserts.clone()));
            assert_eq!(
                ids(&reloaded),
                ids(&plan.view),
                "reload diverged for {source} -> {target}"
            );
        }
    }
}

#[test]
fn pin_then_reload_matches_optimistic_view() {
    let user = UserId(Uuid::new_v4());
    let view = reconcile(catalog(&[1, 2, 3]), &OverlayMap::new());
    let plan = plan_pin_toggle(&view, ItemId(3), false, user).expect("toggle");

    let reloaded = reconcile(catalog(&[1, 2, 3]), &overlay_map([plan.upsert]));
    assert_eq!(ids(&reloaded), ids(&plan.view));
}

#[test]
fn filtered_view_preserves_merged_order() {
    let member = Viewer {
        user_id: UserId(Uuid::new_v4()),
        role: Role(1),
    };
    let mut items = catalog(&[1, 2, 3]);
    items[0].access_list.push(member.user_id);
    items[2].access_list.push(member.user_id);

    let overlay = overlay_map([LayoutOverlayEntry {
        user_id: member.user_id,
        item_id: ItemId(3),
        position: 1,
        pinned: true,
    }]);
    let view = reconcile(items, &overlay);
    let visible = filter_visible(&view, &member, &AccessPolicy::default(), &SearchQuery::default());
    assert_eq!(ids(&visible), vec![3, 1]);
}
