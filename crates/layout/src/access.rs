use shared::domain::{CatalogItem, Role, UserId, ADMIN_ROLE_THRESHOLD};

use crate::MergedViewItem;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessPolicy {
    pub admin_threshold: Role,
}

impl Default for AccessPolicy {
    fn default() -> Self {
        Self {
            admin_threshold: ADMIN_ROLE_THRESHOLD,
        }
    }
}

impl AccessPolicy {
    pub fn is_admin(&self, role: Role) -> bool {
        role >= self.admin_threshold
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewer {
    pub user_id: UserId,
    pub role: Role,
}

/// Case-insensitive substring filter over title and description.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchQuery {
    raw: String,
    needle: Option<String>,
}

impl SearchQuery {
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let needle = (!raw.trim().is_empty()).then(|| raw.to_lowercase());
        Self { raw, needle }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn is_active(&self) -> bool {
        self.needle.is_some()
    }

    pub fn matches(&self, item: &CatalogItem) -> bool {
        let Some(needle) = &self.needle else {
            return true;
        };
        item.title.to_lowercase().contains(needle)
            || item.description.to_lowercase().contains(needle)
    }
}

/// Search first, then access: admins see everything, everyone else only
/// items whose access list names them.
pub fn is_visible(
    item: &CatalogItem,
    viewer: &Viewer,
    policy: &AccessPolicy,
    query: &SearchQuery,
) -> bool {
    if !query.matches(item) {
        return false;
    }
    if policy.is_admin(viewer.role) {
        return true;
    }
    item.grants(viewer.user_id)
}

pub fn filter_visible(
    view: &[MergedViewItem],
    viewer: &Viewer,
    policy: &AccessPolicy,
    query: &SearchQuery,
) -> Vec<MergedViewItem> {
    view.iter()
        .filter(|entry| is_visible(&entry.item, viewer, policy, query))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use shared::domain::{CardColor, IconRef, ItemId};
    use uuid::Uuid;

    use super::*;

    fn item(id: i64, title: &str, description: &str, access_list: Vec<UserId>) -> CatalogItem {
        CatalogItem {
            id: ItemId(id),
            title: title.into(),
            description: description.into(),
            icon: IconRef::default(),
            card_color: CardColor::default(),
            target_url: None,
            created_at: Utc::now(),
            access_list,
        }
    }

    #[test]
    fn admins_see_items_with_empty_access_lists() {
        let admin = Viewer {
            user_id: UserId(Uuid::new_v4()),
            role: Role(6),
        };
        let policy = AccessPolicy::default();
        let restricted = item(1, "Payroll", "", Vec::new());
        assert!(is_visible(&restricted, &admin, &policy, &SearchQuery::default()));
    }

    #[test]
    fn members_need_to_be_on_the_access_list() {
        let member = Viewer {
            user_id: UserId(Uuid::new_v4()),
            role: Role(2),
        };
        let policy = AccessPolicy::default();
        let granted = item(1, "Wiki", "", vec![member.user_id]);
        let other = item(2, "Payroll", "", vec![UserId(Uuid::new_v4())]);
        let admins_only = item(3, "Admin", "", Vec::new());

        let query = SearchQuery::default();
        assert!(is_visible(&granted, &member, &policy, &query));
        assert!(!is_visible(&other, &member, &policy, &query));
        assert!(!is_visible(&admins_only, &member, &policy, &query));
    }

    #[test]
    fn search_is_case_insensitive_over_title_and_description() {
        let admin = Viewer {
            user_id: UserId(Uuid::new_v4()),
            role: Role(9),
        };
        let policy = AccessPolicy::default();
        let wiki = item(1, "Team Wiki", "Internal docs", Vec::new());

        assert!(is_visible(&wiki, &admin, &policy, &SearchQuery::new("WIKI")));
        assert!(is_visible(&wiki, &admin, &policy, &SearchQuery::new("l DOCS")));
        assert!(!is_visible(&wiki, &admin, &policy, &SearchQuery::new("wiki ")));
        assert!(!is_visible(&wiki, &admin, &policy, &SearchQuery::new("mail")));
    }

    #[test]
    fn search_match_does_not_bypass_access() {
        let member = Viewer {
            user_id: UserId(Uuid::new_v4()),
            role: Role(0),
        };
        let policy = AccessPolicy::default();
        let hidden = item(1, "Mail", "mail", Vec::new());
        for term in ["", "mail", "MAIL", "zzz"] {
            assert!(!is_visible(&hidden, &member, &policy, &SearchQuery::new(term)));
        }
    }

    #[test]
    fn blank_query_is_inactive() {
        assert!(!SearchQuery::new("   ").is_active());
        assert!(SearchQuery::new("a").is_active());
        assert_eq!(SearchQuery::new(" A ").as_str(), " A ");
    }

    #[test]
    fn custom_threshold_is_respected() {
        let policy = AccessPolicy {
            admin_threshold: Role(3),
        };
        assert!(policy.is_admin(Role(3)));
        assert!(!policy.is_admin(Role(2)));
    }
}
