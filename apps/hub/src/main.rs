use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use client_core::{
    AuthIdentity, ClientEvent, HubClient, LayoutFailure, RestRecordStore, RestStoreConfig,
};
use layout::{AccessPolicy, MergedViewItem, RecordStore};
use shared::domain::{IconSource, ItemId, Role, UserId};
use storage::Storage;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod config;

use config::{load_settings, normalize_database_url, Settings, StoreBackend};

#[derive(Parser, Debug)]
#[command(name = "hub", about = "Personalized app catalog")]
struct Cli {
    /// User id (UUID) to sign in as.
    #[arg(long)]
    user: String,
    /// Role reported by the identity provider; the stored profile decides
    /// when omitted.
    #[arg(long)]
    role: Option<i32>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the visible catalog in layout order.
    List {
        #[arg(long)]
        search: Option<String>,
    },
    /// Move one item into another item's slot.
    Move { source: i64, target: i64 },
    /// Toggle an item's pinned flag.
    Pin { item: i64 },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let settings = load_settings();
    let store = open_store(&settings).await?;
    let policy = AccessPolicy {
        admin_threshold: Role(settings.admin_role_threshold),
    };
    let client = HubClient::new_with_policy(store, policy);
    let mut events = client.subscribe_events();

    let user_id = UserId::parse(&cli.user)
        .with_context(|| format!("'{}' is not a valid user id", cli.user))?;
    let session = client
        .start_session(AuthIdentity {
            user_id,
            role: cli.role.map(Role),
        })
        .await
        .context("session was replaced before it finished loading")?;
    info!(user_id = %session.user_id, username = %session.profile.username, role = session.role.0, "signed in");

    match cli.command {
        Command::List { search } => {
            if let Some(search) = search {
                client.on_set_search_term(search).await;
            }
        }
        Command::Move { source, target } => {
            let Some(persist) = client.on_reorder(ItemId(source), ItemId(target)).await else {
                bail!("cannot move {source} onto {target}: both items must be visible and distinct");
            };
            persist.await.context("persist task panicked")?;
        }
        Command::Pin { item } => {
            let item_id = ItemId(item);
            let Some(current) = client
                .visible_items()
                .await
                .iter()
                .find(|entry| entry.id() == item_id)
                .map(|entry| entry.pinned)
            else {
                bail!("item {item} is not visible to this user");
            };
            let Some(persist) = client.on_toggle_pinned(item_id, current).await else {
                bail!("item {item} is not in the layout");
            };
            persist.await.context("persist task panicked")?;
        }
    }

    report_failures(&mut events)?;
    print_items(&client.visible_items().await);
    Ok(())
}

async fn open_store(settings: &Settings) -> Result<Arc<dyn RecordStore>> {
    match settings.store_backend {
        StoreBackend::Sqlite => {
            let database_url = normalize_database_url(&settings.database_url);
            let storage = Storage::new(&database_url).await.map_err(|error| {
                error!(
                    %database_url,
                    %error,
                    "failed to open SQLite database; verify parent directory exists and permissions are correct"
                );
                error
            })?;
            Ok(Arc::new(storage))
        }
        StoreBackend::Rest => {
            let rest_url = settings
                .rest_url
                .as_deref()
                .context("rest_url is required for the rest backend")?;
            let api_key = settings
                .rest_api_key
                .clone()
                .context("rest_api_key is required for the rest backend")?;
            let mut config = RestStoreConfig::new(rest_url, api_key)?;
            if let Some(token) = &settings.rest_access_token {
                config = config.with_access_token(token.clone());
            }
            Ok(Arc::new(RestRecordStore::new(config)))
        }
    }
}

/// Layout changes are already applied locally; a failed save only matters to
/// the exit status.
fn report_failures(events: &mut broadcast::Receiver<ClientEvent>) -> Result<()> {
    while let Ok(event) = events.try_recv() {
        if let ClientEvent::Failure(failure @ LayoutFailure::Persist { .. }) = event {
            bail!(failure);
        }
    }
    Ok(())
}

fn print_items(items: &[MergedViewItem]) {
    if items.is_empty() {
        println!("(no items)");
        return;
    }
    for entry in items {
        let marker = if entry.pinned { "*" } else { " " };
        let icon = match entry.item.icon_source() {
            IconSource::Favicon(url) | IconSource::Image(url) => url,
            IconSource::Symbol(name) => name.to_string(),
        };
        println!(
            "{marker} {:>4}  {:<24} {}  [{icon}]",
            entry.id(),
            entry.item.title,
            entry.item.target_url.as_deref().unwrap_or("-"),
        );
    }
}
