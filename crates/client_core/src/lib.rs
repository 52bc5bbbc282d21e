use std::sync::Arc;

use anyhow::Result;
use layout::{
    is_visible, overlay_from_view, plan_pin_toggle, plan_reorder, reconcile, AccessPolicy,
    MergedViewItem, OverlayMap, PinPlan, RecordStore, ReorderPlan, SearchQuery, Viewer,
};
use shared::{
    domain::{CatalogItem, ItemId, Role, UserId, UserProfile},
    error::HubError,
    protocol::CatalogItemDraft,
};
use thiserror::Error;
use tokio::{
    sync::{broadcast, broadcast::error::RecvError, Mutex},
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};

pub mod fetch;
mod persist;
pub mod rest_store;

pub use rest_store::{RestRecordStore, RestStoreConfig};

/// Identity reported by the authentication provider.
///
/// `role` is set when the provider carries one; otherwise the stored profile
/// decides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthIdentity {
    pub user_id: UserId,
    pub role: Option<Role>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn(AuthIdentity),
    SignedOut,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: UserId,
    pub role: Role,
    pub profile: UserProfile,
}

impl Session {
    pub fn viewer(&self) -> Viewer {
        Viewer {
            user_id: self.user_id,
            role: self.role,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutFailure {
    #[error("failed to fetch catalog: {0}")]
    CatalogFetch(String),
    #[error("failed to persist {entries} overlay entries for user {user_id}: {reason}")]
    Persist {
        user_id: UserId,
        entries: usize,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    SessionStarted { user_id: UserId, role: Role },
    SessionEnded,
    /// The working view, the search term or the session changed.
    ViewChanged,
    EditModeChanged(bool),
    LayoutPersisted { user_id: UserId, entries: usize },
    Failure(LayoutFailure),
}

/// Holds one user's working view of the catalog and applies layout gestures
/// to it. Gestures update the view synchronously and persist in the
/// background.
pub struct HubClient {
    store: Arc<dyn RecordStore>,
    policy: AccessPolicy,
    inner: Mutex<HubClientState>,
    events: broadcast::Sender<ClientEvent>,
}

#[derive(Default)]
struct HubClientState {
    session: Option<Session>,
    /// Bumped on every session change; fetch results carrying an older value
    /// are dropped.
    generation: u64,
    view: Vec<MergedViewItem>,
    search: SearchQuery,
    edit_mode: bool,
}

impl HubClient {
    pub fn new(store: Arc<dyn RecordStore>) -> Arc<Self> {
        Self::new_with_policy(store, AccessPolicy::default())
    }

    pub fn new_with_policy(store: Arc<dyn RecordStore>, policy: AccessPolicy) -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        Arc::new(Self {
            store,
            policy,
            inner: Mutex::new(HubClientState::default()),
            events,
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    pub fn policy(&self) -> AccessPolicy {
        self.policy
    }

    /// Replaces any current session and loads catalog, overlay and profile
    /// concurrently. Returns `None` when another session change overtook this
    /// one before the fetches finished.
    pub async fn start_session(&self, identity: AuthIdentity) -> Option<Session> {
        let (generation, was_editing) = {
            let mut inner = self.inner.lock().await;
            inner.generation += 1;
            inner.session = None;
            inner.view.clear();
            (inner.generation, std::mem::take(&mut inner.edit_mode))
        };
        if was_editing {
            self.emit(ClientEvent::EditModeChanged(false));
        }
        info!(user_id = %identity.user_id, generation, "session: loading layout");

        let store = self.store.as_ref();
        let (catalog, overlay, profile) = tokio::join!(
            fetch::fetch_catalog(store),
            fetch::fetch_overlay(store, Some(identity.user_id)),
            fetch::fetch_profile(store, identity.user_id),
        );

        let session = {
            let mut inner = self.inner.lock().await;
            if inner.generation != generation {
                debug!(user_id = %identity.user_id, generation, "session: discarding stale fetch");
                return None;
            }
            let catalog = self.catalog_or_empty(catalog);
            let role = identity.role.unwrap_or(profile.role);
            let session = Session {
                user_id: identity.user_id,
                role,
                profile,
            };
            inner.view = reconcile(catalog, &overlay);
            inner.session = Some(session.clone());
            info!(
                user_id = %session.user_id,
                role = session.role.0,
                items = inner.view.len(),
                "session: layout ready"
            );
            session
        };

        self.emit(ClientEvent::SessionStarted {
            user_id: session.user_id,
            role: session.role,
        });
        self.emit(ClientEvent::ViewChanged);
        Some(session)
    }

    /// Drops the session and its view. In-flight fetches are abandoned and
    /// in-flight persistence is left to finish on its own.
    pub async fn end_session(&self) {
        let (ended, was_editing) = {
            let mut inner = self.inner.lock().await;
            inner.generation += 1;
            inner.view.clear();
            (
                inner.session.take(),
                std::mem::take(&mut inner.edit_mode),
            )
        };
        if was_editing {
            self.emit(ClientEvent::EditModeChanged(false));
        }
        if let Some(session) = ended {
            info!(user_id = %session.user_id, "session: signed out");
            self.emit(ClientEvent::SessionEnded);
            self.emit(ClientEvent::ViewChanged);
        }
    }

    pub async fn handle_auth_event(&self, event: AuthEvent) {
        match event {
            AuthEvent::SignedIn(identity) => {
                self.start_session(identity).await;
            }
            AuthEvent::SignedOut => self.end_session().await,
        }
    }

    /// Follows the auth provider until its channel closes.
    pub fn watch_auth(self: &Arc<Self>, mut auth_events: broadcast::Receiver<AuthEvent>) -> JoinHandle<()> {
        let client = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match auth_events.recv().await {
                    Ok(event) => client.handle_auth_event(event).await,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "session: auth events lagged");
                    }
                    Err(RecvError::Closed) => {
                        debug!("session: auth channel closed");
                        break;
                    }
                }
            }
        })
    }

    /// Re-reads catalog and overlay from the store and rebuilds the view from
    /// persisted state only. Returns false without a session or when the
    /// session changed mid-fetch.
    pub async fn reload(&self) -> bool {
        let Some((generation, user_id)) = self.current_session_key().await else {
            return false;
        };
        let store = self.store.as_ref();
        let (catalog, overlay) = tokio::join!(
            fetch::fetch_catalog(store),
            fetch::fetch_overlay(store, Some(user_id)),
        );
        self.install_catalog(generation, catalog, Some(overlay))
            .await
    }

    pub async fn session(&self) -> Option<Session> {
        self.inner.lock().await.session.clone()
    }

    /// Full view in display order, before access and search filtering.
    pub async fn working_view(&self) -> Vec<MergedViewItem> {
        self.inner.lock().await.view.clone()
    }

    /// What the signed-in user sees: the working view narrowed by search and
    /// access. Empty without a session.
    pub async fn visible_items(&self) -> Vec<MergedViewItem> {
        let inner = self.inner.lock().await;
        let Some(viewer) = inner.session.as_ref().map(Session::viewer) else {
            return Vec::new();
        };
        inner
            .view
            .iter()
            .filter(|entry| is_visible(&entry.item, &viewer, &self.policy, &inner.search))
            .cloned()
            .collect()
    }

    pub async fn on_set_search_term(&self, text: impl Into<String>) {
        let search = SearchQuery::new(text);
        {
            let mut inner = self.inner.lock().await;
            if inner.search == search {
                return;
            }
            inner.search = search;
        }
        self.emit(ClientEvent::ViewChanged);
    }

    pub async fn search_term(&self) -> String {
        self.inner.lock().await.search.as_str().to_owned()
    }

    pub async fn is_admin(&self) -> bool {
        let inner = self.inner.lock().await;
        inner
            .session
            .as_ref()
            .is_some_and(|session| self.policy.is_admin(session.role))
    }

    pub async fn is_edit_mode(&self) -> bool {
        self.inner.lock().await.edit_mode
    }

    /// Only admins may turn edit mode on; anyone with a session may turn it
    /// off.
    pub async fn set_edit_mode(&self, enabled: bool) -> Result<(), HubError> {
        {
            let mut inner = self.inner.lock().await;
            let Some(session) = inner.session.as_ref() else {
                return Err(HubError::unauthorized("sign in before changing edit mode"));
            };
            if enabled && !self.policy.is_admin(session.role) {
                warn!(user_id = %session.user_id, role = session.role.0, "edit mode: rejected for non-admin");
                return Err(HubError::forbidden("edit mode requires an admin role"));
            }
            if inner.edit_mode == enabled {
                return Ok(());
            }
            inner.edit_mode = enabled;
        }
        debug!(enabled, "edit mode: toggled");
        self.emit(ClientEvent::EditModeChanged(enabled));
        Ok(())
    }

    /// Moves `source` into `target`'s slot within the visible sequence.
    ///
    /// Returns the persistence task when the gesture applied, `None` when it
    /// was ignored (no session, edit mode on, equal ids or an id that is not
    /// visible). Awaiting the handle is optional.
    pub async fn on_reorder(&self, source: ItemId, target: ItemId) -> Option<JoinHandle<()>> {
        let upserts = {
            let mut inner = self.inner.lock().await;
            if inner.edit_mode {
                debug!(source = %source, target = %target, "reorder: ignored in edit mode");
                return None;
            }
            let viewer = inner.session.as_ref()?.viewer();
            let visible: Vec<ItemId> = inner
                .view
                .iter()
                .filter(|entry| is_visible(&entry.item, &viewer, &self.policy, &inner.search))
                .map(MergedViewItem::id)
                .collect();
            let Some(ReorderPlan { view, upserts }) =
                plan_reorder(&inner.view, &visible, source, target, viewer.user_id)
            else {
                debug!(source = %source, target = %target, "reorder: ignored");
                return None;
            };
            inner.view = view;
            upserts
        };

        debug!(source = %source, target = %target, entries = upserts.len(), "reorder: applied");
        self.emit(ClientEvent::ViewChanged);
        Some(persist::spawn_overlay_upsert(
            Arc::clone(&self.store),
            upserts,
            self.events.clone(),
        ))
    }

    /// Flips the item's pinned flag to `!current_pinned`.
    pub async fn on_toggle_pinned(&self, item_id: ItemId, current_pinned: bool) -> Option<JoinHandle<()>> {
        let upsert = {
            let mut inner = self.inner.lock().await;
            let user_id = inner.session.as_ref()?.user_id;
            let Some(PinPlan { view, upsert }) =
                plan_pin_toggle(&inner.view, item_id, current_pinned, user_id)
            else {
                debug!(item_id = %item_id, "pin: item not in view");
                return None;
            };
            inner.view = view;
            upsert
        };

        debug!(item_id = %item_id, pinned = upsert.pinned, "pin: toggled");
        self.emit(ClientEvent::ViewChanged);
        Some(persist::spawn_overlay_upsert(
            Arc::clone(&self.store),
            vec![upsert],
            self.events.clone(),
        ))
    }

    pub async fn create_catalog_item(&self, draft: CatalogItemDraft) -> Result<CatalogItem, HubError> {
        self.require_catalog_editor().await?;
        let draft = draft.normalized()?;
        let created = self.store.create_catalog_item(&draft).await?;
        info!(item_id = %created.id, title = %created.title, "catalog: item created");
        self.refresh_catalog().await;
        Ok(created)
    }

    pub async fn update_catalog_item(&self, item_id: ItemId, draft: CatalogItemDraft) -> Result<(), HubError> {
        self.require_catalog_editor().await?;
        self.require_known_item(item_id).await?;
        let draft = draft.normalized()?;
        self.store.update_catalog_item(item_id, &draft).await?;
        info!(item_id = %item_id, "catalog: item updated");
        self.refresh_catalog().await;
        Ok(())
    }

    pub async fn delete_catalog_item(&self, item_id: ItemId) -> Result<(), HubError> {
        self.require_catalog_editor().await?;
        self.require_known_item(item_id).await?;
        self.store.delete_catalog_item(item_id).await?;
        info!(item_id = %item_id, "catalog: item deleted");
        self.refresh_catalog().await;
        Ok(())
    }

    async fn require_catalog_editor(&self) -> Result<(), HubError> {
        let inner = self.inner.lock().await;
        let Some(session) = inner.session.as_ref() else {
            return Err(HubError::unauthorized("sign in before editing the catalog"));
        };
        if !self.policy.is_admin(session.role) {
            return Err(HubError::forbidden("catalog changes require an admin role"));
        }
        if !inner.edit_mode {
            return Err(HubError::forbidden("enable edit mode before editing the catalog"));
        }
        Ok(())
    }

    async fn require_known_item(&self, item_id: ItemId) -> Result<(), HubError> {
        let inner = self.inner.lock().await;
        if inner.view.iter().any(|entry| entry.id() == item_id) {
            Ok(())
        } else {
            Err(HubError::not_found(format!("catalog item {item_id} not found")))
        }
    }

    /// Re-fetches the catalog and reconciles it against the overlay implied by
    /// the current view, keeping optimistic layout changes that may not have
    /// been persisted yet.
    async fn refresh_catalog(&self) -> bool {
        let Some((generation, _)) = self.current_session_key().await else {
            return false;
        };
        let catalog = fetch::fetch_catalog(self.store.as_ref()).await;
        self.install_catalog(generation, catalog, None).await
    }

    async fn current_session_key(&self) -> Option<(u64, UserId)> {
        let inner = self.inner.lock().await;
        inner
            .session
            .as_ref()
            .map(|session| (inner.generation, session.user_id))
    }

    /// Swaps in a freshly fetched catalog if the session is unchanged. Without
    /// an explicit overlay the current view supplies one.
    async fn install_catalog(
        &self,
        generation: u64,
        catalog: Result<Vec<CatalogItem>>,
        overlay: Option<OverlayMap>,
    ) -> bool {
        {
            let mut inner = self.inner.lock().await;
            if inner.generation != generation {
                debug!(generation, "catalog: discarding stale fetch");
                return false;
            }
            let Some(user_id) = inner.session.as_ref().map(|session| session.user_id) else {
                return false;
            };
            let catalog = self.catalog_or_empty(catalog);
            let overlay = overlay.unwrap_or_else(|| overlay_from_view(user_id, &inner.view));
            inner.view = reconcile(catalog, &overlay);
        }
        self.emit(ClientEvent::ViewChanged);
        true
    }

    fn catalog_or_empty(&self, catalog: Result<Vec<CatalogItem>>) -> Vec<CatalogItem> {
        match catalog {
            Ok(items) => items,
            Err(err) => {
                error!("catalog: fetch failed: {err:#}");
                self.emit(ClientEvent::Failure(LayoutFailure::CatalogFetch(format!("{err:#}"))));
                Vec::new()
            }
        }
    }

    fn emit(&self, event: ClientEvent) {
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
