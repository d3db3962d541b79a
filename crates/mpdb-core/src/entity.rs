use std::collections::{BTreeMap, HashSet};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{ConfigError, CoreError};

/// Entity types that become target collections, in load order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Account,
    User,
    Campaign,
    Strategy,
    LineItem,
    MediaBuy,
}

impl EntityKind {
    /// Every entity kind in dependency order: parents always precede children.
    pub const LOAD_ORDER: [EntityKind; 6] = [
        EntityKind::Account,
        EntityKind::User,
        EntityKind::Campaign,
        EntityKind::Strategy,
        EntityKind::LineItem,
        EntityKind::MediaBuy,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Account => "account",
            EntityKind::User => "user",
            EntityKind::Campaign => "campaign",
            EntityKind::Strategy => "strategy",
            EntityKind::LineItem => "line_item",
            EntityKind::MediaBuy => "media_buy",
        }
    }

    /// Name of the target collection this entity is loaded into.
    #[must_use]
    pub fn collection(self) -> &'static str {
        match self {
            EntityKind::Account => "accounts",
            EntityKind::User => "users",
            EntityKind::Campaign => "campaigns",
            EntityKind::Strategy => "strategies",
            EntityKind::LineItem => "line_items",
            EntityKind::MediaBuy => "media_buys",
        }
    }

    /// Source file set holding this entity's rows.
    #[must_use]
    pub fn source(self) -> SourceSet {
        match self {
            EntityKind::Account => SourceSet::Accounts,
            EntityKind::User => SourceSet::Users,
            EntityKind::Campaign => SourceSet::Campaigns,
            EntityKind::Strategy => SourceSet::Strategies,
            EntityKind::LineItem => SourceSet::LineItems,
            EntityKind::MediaBuy => SourceSet::MediaBuys,
        }
    }

    /// Source field carrying the durable business id.
    #[must_use]
    pub fn business_id_field(self) -> &'static str {
        match self {
            EntityKind::Account => "account_id",
            EntityKind::User => "user_id",
            EntityKind::Campaign => "campaign_id",
            EntityKind::Strategy => "strategy_id",
            EntityKind::LineItem => "line_item_id",
            EntityKind::MediaBuy => "media_buy_id",
        }
    }

    /// Entity kinds whose identity maps must be complete before this kind is
    /// transformed.
    #[must_use]
    pub fn dependencies(self) -> &'static [EntityKind] {
        match self {
            EntityKind::Account | EntityKind::User => &[],
            EntityKind::Campaign => &[EntityKind::Account, EntityKind::User],
            EntityKind::Strategy => &[EntityKind::Campaign],
            EntityKind::LineItem => &[EntityKind::Strategy],
            EntityKind::MediaBuy => &[EntityKind::LineItem],
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityKind::LOAD_ORDER
            .into_iter()
            .find(|kind| kind.as_str() == s || kind.collection() == s)
            .ok_or_else(|| CoreError::UnknownEntity(s.to_string()))
    }
}

/// A source file in the export, including the auxiliary sets that never
/// become collections of their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceSet {
    Accounts,
    Users,
    Campaigns,
    Strategies,
    LineItems,
    MediaBuys,
    Platforms,
    LineItemMediaBuys,
    DailyPerformance,
}

impl SourceSet {
    pub const ALL: [SourceSet; 9] = [
        SourceSet::Accounts,
        SourceSet::Users,
        SourceSet::Campaigns,
        SourceSet::Strategies,
        SourceSet::LineItems,
        SourceSet::MediaBuys,
        SourceSet::Platforms,
        SourceSet::LineItemMediaBuys,
        SourceSet::DailyPerformance,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SourceSet::Accounts => "accounts",
            SourceSet::Users => "users",
            SourceSet::Campaigns => "campaigns",
            SourceSet::Strategies => "strategies",
            SourceSet::LineItems => "line_items",
            SourceSet::MediaBuys => "media_buys",
            SourceSet::Platforms => "platforms",
            SourceSet::LineItemMediaBuys => "line_item_media_buys",
            SourceSet::DailyPerformance => "daily_performance",
        }
    }

    #[must_use]
    pub fn default_file_name(self) -> String {
        format!("{}.json", self.as_str())
    }

    /// Optional sets read as empty when their file is absent.
    #[must_use]
    pub fn is_optional(self) -> bool {
        matches!(
            self,
            SourceSet::Users
                | SourceSet::Platforms
                | SourceSet::LineItemMediaBuys
                | SourceSet::DailyPerformance
        )
    }
}

impl std::fmt::Display for SourceSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// File-name overrides for source sets, e.g. loaded from a YAML layout file:
///
/// ```yaml
/// files:
///   line_items: lineitems_export.json
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLayout {
    #[serde(default)]
    pub files: BTreeMap<SourceSet, String>,
}

impl SourceLayout {
    #[must_use]
    pub fn file_name(&self, set: SourceSet) -> String {
        self.files
            .get(&set)
            .cloned()
            .unwrap_or_else(|| set.default_file_name())
    }

    /// Rejects empty names and two sets pointing at the same file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for set in SourceSet::ALL {
            let name = self.file_name(set);
            if name.trim().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "file name for '{set}' must be non-empty"
                )));
            }
            if !seen.insert(name.clone()) {
                return Err(ConfigError::Validation(format!(
                    "file '{name}' is mapped to more than one source set"
                )));
            }
        }
        Ok(())
    }
}
