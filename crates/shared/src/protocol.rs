use serde::{Deserialize, Serialize};

use crate::{
    domain::{CardColor, IconRef, UserId},
    error::HubError,
};

/// Editable fields of a catalog item, as submitted by an admin.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItemDraft {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub icon: IconRef,
    #[serde(default)]
    pub card_color: CardColor,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_url: Option<String>,
    #[serde(default)]
    pub access_list: Vec<UserId>,
}

impl CatalogItemDraft {
    /// Trims text fields and rejects drafts that cannot be shown.
    pub fn normalized(mut self) -> Result<Self, HubError> {
        self.title = self.title.trim().to_string();
        if self.title.is_empty() {
            return Err(HubError::validation("catalog item title must not be empty"));
        }
        self.description = self.description.trim().to_string();
        self.target_url = self
            .target_url
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty());
        self.card_color = CardColor::parse(Some(&self.card_color.0));
        self.access_list.sort();
        self.access_list.dedup();
        Ok(self)
    }
}
