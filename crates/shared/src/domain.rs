use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! id_newtype {
    ($name:ident, $inner:ty) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub $inner);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }
    };
}

id_newtype!(ItemId, i64);
id_newtype!(UserId, Uuid);

impl UserId {
    pub fn parse(raw: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(raw.trim()).map(Self)
    }
}

/// Numeric privilege level; higher is more privileged.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Role(pub i32);

/// Lowest role that sees the whole catalog and may edit it.
pub const ADMIN_ROLE_THRESHOLD: Role = Role(6);

pub const DEFAULT_CARD_COLOR: &str = "bg-white";
pub const FALLBACK_ICON_SYMBOL: &str = "Bot";
pub const FAVICON_ICON_TOKEN: &str = "favicon";

pub const KNOWN_ICON_SYMBOLS: &[&str] = &[
    "Bot",
    "Mail",
    "Shield",
    "Cloud",
    "Layout",
    "FileText",
    "Calendar",
    "Database",
    "Globe",
    "Lock",
    "MessageCircle",
    "Monitor",
];

/// Icon reference as stored alongside a catalog item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum IconRef {
    Named(String),
    ImageUrl(String),
    /// Derive the icon from the item's target URL.
    FromTargetUrl,
}

impl IconRef {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw == FAVICON_ICON_TOKEN {
            Self::FromTargetUrl
        } else if raw.starts_with("http") {
            Self::ImageUrl(raw.to_string())
        } else if raw.is_empty() {
            Self::Named(FALLBACK_ICON_SYMBOL.to_string())
        } else {
            Self::Named(raw.to_string())
        }
    }

    pub fn as_stored(&self) -> &str {
        match self {
            Self::Named(name) => name,
            Self::ImageUrl(url) => url,
            Self::FromTargetUrl => FAVICON_ICON_TOKEN,
        }
    }
}

impl Default for IconRef {
    fn default() -> Self {
        Self::Named(FALLBACK_ICON_SYMBOL.to_string())
    }
}

impl From<String> for IconRef {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<IconRef> for String {
    fn from(value: IconRef) -> Self {
        value.as_stored().to_string()
    }
}

/// What a presentation layer should draw for an item's icon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IconSource {
    Favicon(String),
    Image(String),
    Symbol(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CardColor(pub String);

impl Default for CardColor {
    fn default() -> Self {
        Self(DEFAULT_CARD_COLOR.to_string())
    }
}

impl CardColor {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some(token) if !token.is_empty() => Self(token.to_string()),
            _ => Self::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: ItemId,
    pub title: String,
    pub description: String,
    pub icon: IconRef,
    pub card_color: CardColor,
    pub target_url: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Users granted access; empty means admins only.
    #[serde(default)]
    pub access_list: Vec<UserId>,
}

impl CatalogItem {
    pub fn grants(&self, user_id: UserId) -> bool {
        self.access_list.contains(&user_id)
    }

    pub fn icon_source(&self) -> IconSource {
        match &self.icon {
            IconRef::FromTargetUrl => match self.target_url.as_deref() {
                Some(target) if !target.is_empty() => IconSource::Favicon(format!(
                    "https://www.google.com/s2/favicons?domain={target}&sz=64"
                )),
                _ => IconSource::Symbol(FALLBACK_ICON_SYMBOL),
            },
            IconRef::ImageUrl(url) => IconSource::Image(url.clone()),
            IconRef::Named(name) => IconSource::Symbol(
                KNOWN_ICON_SYMBOLS
                    .iter()
                    .copied()
                    .find(|known| *known == name.as_str())
                    .unwrap_or(FALLBACK_ICON_SYMBOL),
            ),
        }
    }
}

/// One user's display position and pinned flag for one catalog item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutOverlayEntry {
    pub user_id: UserId,
    pub item_id: ItemId,
    pub position: i64,
    pub pinned: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub username: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
    pub role: Role,
}

impl UserProfile {
    /// Stand-in used when the profile cannot be loaded.
    pub fn fallback() -> Self {
        Self {
            username: "User".into(),
            avatar_url: None,
            role: Role(0),
        }
    }
}
