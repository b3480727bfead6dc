//! The closed set of purchasable items.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PaymentError;

/// Invoice currency (Telegram Stars).
pub const CURRENCY: &str = "XTR";

/// A purchasable capability. The serialized form is the invoice payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CatalogItem {
    /// One AI profile summary.
    #[serde(rename = "about_user_dict")]
    AboutUser,
    /// One month of free access to every paid command.
    #[serde(rename = "vip")]
    Vip,
    /// One team search.
    #[serde(rename = "find_team")]
    FindTeam,
}

impl CatalogItem {
    /// Every item, in shop order.
    pub const ALL: [CatalogItem; 3] = [Self::AboutUser, Self::Vip, Self::FindTeam];

    /// Stable identifier used as callback data and invoice payload.
    pub fn id(&self) -> &'static str {
        match self {
            Self::AboutUser => "about_user_dict",
            Self::Vip => "vip",
            Self::FindTeam => "find_team",
        }
    }

    /// Invoice title.
    pub fn title(&self) -> &'static str {
        match self {
            Self::AboutUser => "about_user_dict",
            Self::Vip => "vip",
            Self::FindTeam => "teamfinder_function",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::AboutUser => "AI-generated summary of your profile",
            Self::Vip => "1 month subscription for all features",
            Self::FindTeam => "Payment for finding a team",
        }
    }

    /// Price in Stars.
    pub fn price(&self) -> u32 {
        match self {
            Self::AboutUser => 1,
            Self::Vip => 50,
            Self::FindTeam => 3,
        }
    }

    /// Button caption for gated-command offers.
    pub fn offer_label(&self) -> String {
        let what = match self {
            Self::AboutUser => "Purchase summary",
            Self::Vip => "Get VIP subscription",
            Self::FindTeam => "Purchase team finding",
        };
        format!("{what} - {} Stars", self.price())
    }

    /// Button caption in the shop listing.
    pub fn shop_label(&self) -> String {
        format!("{} - {} Stars", self.title(), self.price())
    }
}

impl FromStr for CatalogItem {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|item| item.id() == s)
            .ok_or_else(|| PaymentError::UnknownItem(s.to_string()))
    }
}

impl std::fmt::Display for CatalogItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id())
    }
}
