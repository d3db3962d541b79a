//! Denormalized documents written to the target collections.
//!
//! Financial fields are [`Decimal`] values already normalized to the
//! configured scale; they serialize as strings so no precision is lost in the
//! JSON bodies.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::status::{DisplayStatus, LifecycleStatus, MediaBuyStatus};

/// Stable key a document is stored under in the target collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentKey(String);

impl DocumentKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reference from one document to another.
///
/// `id` is always the raw business id from the source row. `key` is `None`
/// when that id did not resolve to a known parent (an orphan reference).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    pub id: String,
    pub key: Option<DocumentKey>,
}

impl EntityRef {
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.key.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamMember {
    pub id: String,
    pub name: Option<String>,
    pub key: Option<DocumentKey>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub account_manager: Option<TeamMember>,
    pub senior_traders: Vec<TeamMember>,
    pub traders: Vec<TeamMember>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    /// Whether `day` falls inside the range. Unresolved bounds are open.
    #[must_use]
    pub fn contains(&self, day: NaiveDate) -> bool {
        self.start.is_none_or(|start| start <= day) && self.end.is_none_or(|end| day <= end)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    pub target_amount: Decimal,
    pub actual_amount: Decimal,
    pub remaining_amount: Decimal,
    /// ISO 4217 code, upper-cased.
    pub currency: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinancialTerms {
    pub referral_rate: Decimal,
    pub markup_rate: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountMetrics {
    pub campaign_count: usize,
    /// Sum of the actual amounts of the account's campaigns.
    pub total_revenue: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRecord {
    pub account_id: String,
    pub name: String,
    pub contact: Contact,
    pub terms: FinancialTerms,
    pub metrics: AccountMetrics,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub user_id: String,
    pub name: String,
    pub email: Option<String>,
    pub role: Option<String>,
}

/// Distinct channel, platform, and format values seen under a parent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaMix {
    pub channels: BTreeSet<String>,
    pub platforms: BTreeSet<String>,
    pub formats: BTreeSet<String>,
}

impl MediaMix {
    pub fn observe(
        &mut self,
        channel: Option<&str>,
        platform: Option<&str>,
        format: Option<&str>,
    ) {
        for (set, value) in [
            (&mut self.channels, channel),
            (&mut self.platforms, platform),
            (&mut self.formats, format),
        ] {
            if let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) {
                set.insert(value.to_string());
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignMetrics {
    pub strategy_count: usize,
    pub line_item_count: usize,
    pub active_line_item_count: usize,
    pub allocated_budget: Decimal,
    pub media_mix: MediaMix,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignRecord {
    pub campaign_id: String,
    pub campaign_number: Option<String>,
    pub name: String,
    pub status: LifecycleStatus,
    pub display_status: DisplayStatus,
    pub account: Option<EntityRef>,
    pub team: Team,
    pub dates: DateRange,
    pub price: Price,
    pub metrics: CampaignMetrics,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyRecord {
    pub strategy_id: String,
    pub campaign: Option<EntityRef>,
    pub name: String,
    pub status: LifecycleStatus,
    pub display_status: DisplayStatus,
    pub budget: Decimal,
    pub margin_target: Decimal,
    /// Sum of the strategy's line item budgets.
    pub allocated_amount: Decimal,
    /// `budget - allocated_amount`; negative when over-allocated.
    pub budget_variance: Decimal,
    pub line_item_count: usize,
    pub media_mix: MediaMix,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineItemKind {
    Standard,
    ManagementFee,
    ZeroDollar,
    ZeroMargin,
}

impl std::fmt::Display for LineItemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LineItemKind::Standard => write!(f, "standard"),
            LineItemKind::ManagementFee => write!(f, "management_fee"),
            LineItemKind::ZeroDollar => write!(f, "zero_dollar"),
            LineItemKind::ZeroMargin => write!(f, "zero_margin"),
        }
    }
}

/// Kind-specific financials of a line item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LineItemDetails {
    Standard {
        unit_type: Option<String>,
        unit_price: Decimal,
        quantity: Decimal,
        budget: Decimal,
        target_margin: Decimal,
        /// Budget net of the target margin.
        media_cost: Decimal,
    },
    ManagementFee {
        fee_rate: Decimal,
        fee_amount: Decimal,
    },
    ZeroDollar {
        unit_type: Option<String>,
        bonus_quantity: Decimal,
    },
    ZeroMargin {
        unit_type: Option<String>,
        unit_price: Decimal,
        quantity: Decimal,
        budget: Decimal,
    },
}

impl LineItemDetails {
    #[must_use]
    pub fn kind(&self) -> LineItemKind {
        match self {
            LineItemDetails::Standard { .. } => LineItemKind::Standard,
            LineItemDetails::ManagementFee { .. } => LineItemKind::ManagementFee,
            LineItemDetails::ZeroDollar { .. } => LineItemKind::ZeroDollar,
            LineItemDetails::ZeroMargin { .. } => LineItemKind::ZeroMargin,
        }
    }

    /// Amount the line item contributes to its parents' allocations.
    #[must_use]
    pub fn budget(&self) -> Decimal {
        match self {
            LineItemDetails::Standard { budget, .. } | LineItemDetails::ZeroMargin { budget, .. } => {
                *budget
            }
            LineItemDetails::ManagementFee { fee_amount, .. } => *fee_amount,
            LineItemDetails::ZeroDollar { .. } => Decimal::ZERO,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItemRecord {
    pub line_item_id: String,
    pub strategy: Option<EntityRef>,
    /// Campaign the owning strategy belongs to, copied for single-hop reads.
    pub campaign: Option<EntityRef>,
    pub name: String,
    pub status: LifecycleStatus,
    pub display_status: DisplayStatus,
    pub financials: LineItemDetails,
    pub flight: DateRange,
    pub channel: Option<String>,
    pub platform: Option<String>,
    pub format: Option<String>,
    pub trader_ids: Vec<String>,
    pub senior_trader_ids: Vec<String>,
    pub media_buy_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryTotals {
    pub days: usize,
    pub impressions: u64,
    pub clicks: u64,
    pub spend: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaBuyRecord {
    pub media_buy_id: String,
    pub line_item: Option<EntityRef>,
    /// Share of the line item allocated to this buy, from the association row.
    pub allocation_pct: Decimal,
    pub name: String,
    pub platform_id: Option<String>,
    pub platform_name: Option<String>,
    pub budget: Decimal,
    pub spend: Decimal,
    pub spend_ratio: Decimal,
    pub status: MediaBuyStatus,
    pub flight: DateRange,
    pub delivery: DeliveryTotals,
}
