//! Fire-and-forget overlay persistence.

use std::sync::Arc;

use layout::RecordStore;
use shared::domain::LayoutOverlayEntry;
use tokio::{sync::broadcast, task::JoinHandle};
use tracing::{debug, warn};

use crate::{ClientEvent, LayoutFailure};

/// Spawns the upsert and returns immediately. The local view has already been
/// updated by the caller; a failure is logged and reported as an event but
/// never rolled back.
pub(crate) fn spawn_overlay_upsert(
    store: Arc<dyn RecordStore>,
    entries: Vec<LayoutOverlayEntry>,
    events: broadcast::Sender<ClientEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let Some(user_id) = entries.first().map(|entry| entry.user_id) else {
            return;
        };
        match store.upsert_overlay_entries(&entries).await {
            Ok(()) => {
                debug!(user_id = %user_id, entries = entries.len(), "persist: overlay saved");
                let _ = events.send(ClientEvent::LayoutPersisted {
                    user_id,
                    entries: entries.len(),
                });
            }
            Err(err) => {
                warn!(user_id = %user_id, entries = entries.len(), "persist: overlay upsert failed: {err:#}");
                let _ = events.send(ClientEvent::Failure(LayoutFailure::Persist {
                    user_id,
                    entries: entries.len(),
                    reason: format!("{err:#}"),
                }));
            }
        }
    })
}
