use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use layout::RecordStore;
use shared::{
    domain::{CardColor, IconRef, ItemId, Role, UserId, UserProfile},
    protocol::CatalogItemDraft,
};
use storage::Storage;

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, default_value = "sqlite://./data/hub.db")]
    database_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    AddItem {
        title: String,
        #[arg(long, default_value = "")]
        description: String,
        /// Symbol name, image url, or `favicon`.
        #[arg(long, default_value = "Bot")]
        icon: String,
        #[arg(long)]
        color: Option<String>,
        #[arg(long)]
        url: Option<String>,
        /// Repeat to grant several users; omit for admins only.
        #[arg(long = "grant")]
        grants: Vec<String>,
    },
    RemoveItem {
        item_id: i64,
    },
    SetProfile {
        user_id: String,
        username: String,
        #[arg(long, default_value_t = 0)]
        role: i32,
        #[arg(long)]
        avatar_url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let storage = Storage::new(&cli.database_url).await?;

    match cli.command {
        Command::AddItem {
            title,
            description,
            icon,
            color,
            url,
            grants,
        } => {
            let access_list = grants
                .iter()
                .map(|raw| parse_user(raw))
                .collect::<Result<Vec<_>>>()?;
            let draft = CatalogItemDraft {
                title,
                description,
                icon: IconRef::parse(&icon),
                card_color: CardColor::parse(color.as_deref()),
                target_url: url,
                access_list,
            }
            .normalized()?;
            let item = storage.create_catalog_item(&draft).await?;
            println!("created item_id={}", item.id);
        }
        Command::RemoveItem { item_id } => {
            storage.delete_catalog_item(ItemId(item_id)).await?;
            println!("removed item_id={item_id}");
        }
        Command::SetProfile {
            user_id,
            username,
            role,
            avatar_url,
        } => {
            let user_id = parse_user(&user_id)?;
            storage
                .upsert_user_profile(
                    user_id,
                    &UserProfile {
                        username,
                        avatar_url,
                        role: Role(role),
                    },
                )
                .await?;
            println!("saved profile for user_id={user_id} role={role}");
        }
    }

    Ok(())
}

fn parse_user(raw: &str) -> Result<UserId> {
    UserId::parse(raw).with_context(|| format!("'{raw}' is not a valid user id"))
}
