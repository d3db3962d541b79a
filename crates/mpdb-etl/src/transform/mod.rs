//! Row → record transformation.
//!
//! Every function here is pure apart from the warnings it records. A field
//! that fails to coerce gets a safe default and a [`Diagnostics`] entry; a
//! row is never dropped for a bad field.

pub mod classify;
pub mod dates;
pub mod diagnostics;
pub mod numbers;
pub mod status;

use std::collections::BTreeSet;

use chrono::NaiveDate;
use mpdb_core::{
    AccountMetrics, AccountRecord, CampaignMetrics, CampaignRecord, Contact, DateRange,
    DeliveryTotals, EntityKind, EntityRef, FinancialTerms, LifecycleStatus, LineItemDetails, LineItemKind,
    LineItemRecord, MediaBuyRecord, MediaBuyStatus, PipelineConfig, Price, StrategyRecord, Team,
    TeamMember, UserRecord,
};
use rust_decimal::Decimal;
use serde_json::Value;

use crate::aggregate::{LineItemFacts, StrategyRollup};
use crate::reader::{field_str, value_str, Row};

use self::classify::{ClassifierInput, LineItemClassifier};
pub use self::diagnostics::{Diagnostics, FieldWarning, WarningKind};
use self::numbers::{coerce_count, Coerced, DecimalFormat};

const DEFAULT_CURRENCY: &str = "USD";
const THOUSAND: Decimal = Decimal::ONE_THOUSAND;
const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// An arithmetic result, or zero with a [`WarningKind::NumericOverflow`] when
/// it left the representable range.
fn in_range(result: Option<Decimal>, id: &str, field: &str, diag: &mut Diagnostics) -> Decimal {
    result.unwrap_or_else(|| {
        diag.warn(
            id,
            field,
            WarningKind::NumericOverflow,
            "result out of range, zero substituted".to_string(),
        );
        Decimal::ZERO
    })
}

/// Media buy ↔ line item association resolved by the pipeline.
#[derive(Debug, Clone, Default)]
pub struct MediaBuyLink {
    pub line_item: Option<EntityRef>,
    pub allocation_pct: Option<Decimal>,
}

#[derive(Debug, Clone)]
pub struct Transformer {
    format: DecimalFormat,
    horizon_days: u32,
    as_of: NaiveDate,
    classifier: LineItemClassifier,
}

impl Transformer {
    /// # Errors
    ///
    /// Returns [`regex::Error`] if the classifier rules fail to compile.
    pub fn new(config: &PipelineConfig, as_of: NaiveDate) -> Result<Self, regex::Error> {
        Ok(Self {
            format: DecimalFormat::from_config(config),
            horizon_days: config.end_date_horizon_days,
            as_of,
            classifier: LineItemClassifier::new()?,
        })
    }

    #[must_use]
    pub fn as_of(&self) -> NaiveDate {
        self.as_of
    }

    #[must_use]
    pub fn format(&self) -> DecimalFormat {
        self.format
    }

    // -----------------------------------------------------------------------
    // Field helpers
    // -----------------------------------------------------------------------

    /// Decimal field that may legitimately be absent.
    fn optional_decimal(
        &self,
        row: &Row,
        field: &str,
        id: &str,
        diag: &mut Diagnostics,
    ) -> Option<Decimal> {
        match self.format.coerce(row.get(field)) {
            Coerced::Value(d) => Some(d),
            Coerced::Absent => None,
            Coerced::Invalid(raw) => {
                diag.warn(id, field, WarningKind::UnparseableNumber, raw);
                Some(Decimal::ZERO)
            }
        }
    }

    fn decimal(&self, row: &Row, field: &str, id: &str, diag: &mut Diagnostics) -> Decimal {
        self.optional_decimal(row, field, id, diag)
            .unwrap_or(Decimal::ZERO)
    }

    /// Rate given either as a fraction (`0.15`) or a percentage (`15`).
    fn rate(&self, row: &Row, field: &str, id: &str, diag: &mut Diagnostics) -> Option<Decimal> {
        self.optional_decimal(row, field, id, diag)
            .map(|r| if r > Decimal::ONE { self.format.round(r / HUNDRED) } else { r })
    }

    fn date(&self, row: &Row, field: &str, id: &str, diag: &mut Diagnostics) -> Option<NaiveDate> {
        match dates::coerce_date(row.get(field)) {
            Coerced::Value(d) => Some(d),
            Coerced::Absent => None,
            Coerced::Invalid(raw) => {
                diag.warn(id, field, WarningKind::UnparseableDate, raw);
                None
            }
        }
    }

    /// `start_date`/`end_date` with the horizon applied to a missing end.
    fn flight(&self, row: &Row, id: &str, diag: &mut Diagnostics) -> DateRange {
        let start = self.date(row, "start_date", id, diag);
        let end = self.date(row, "end_date", id, diag);
        let end = dates::resolve_end(start, end, self.horizon_days);
        if let (Some(s), Some(e)) = (start, end) {
            if e < s {
                diag.warn(
                    id,
                    "end_date",
                    WarningKind::InvertedFlight,
                    format!("{e} precedes {s}"),
                );
            }
        }
        DateRange { start, end }
    }

    fn status(&self, row: &Row, id: &str, diag: &mut Diagnostics) -> LifecycleStatus {
        let raw = field_str(row, "status").unwrap_or_default();
        status::lookup_status(&raw).unwrap_or_else(|| {
            diag.warn(id, "status", WarningKind::UnknownStatus, raw);
            LifecycleStatus::Draft
        })
    }

    fn count(&self, row: &Row, field: &str, id: &str, diag: &mut Diagnostics) -> u64 {
        match coerce_count(row.get(field)) {
            Coerced::Value(n) => n,
            Coerced::Absent => 0,
            Coerced::Invalid(raw) => {
                diag.warn(id, field, WarningKind::UnparseableNumber, raw);
                0
            }
        }
    }

    // -----------------------------------------------------------------------
    // Entities
    // -----------------------------------------------------------------------

    #[must_use]
    pub fn account(
        &self,
        row: &Row,
        id: &str,
        metrics: AccountMetrics,
        diag: &mut Diagnostics,
    ) -> AccountRecord {
        AccountRecord {
            account_id: id.to_string(),
            name: field_str(row, "name").unwrap_or_else(|| id.to_string()),
            contact: Contact {
                name: field_str(row, "contact_name"),
                email: field_str(row, "contact_email"),
                phone: field_str(row, "contact_phone"),
            },
            terms: FinancialTerms {
                referral_rate: self.rate(row, "referral_rate", id, diag).unwrap_or_default(),
                markup_rate: self.rate(row, "markup_rate", id, diag).unwrap_or_default(),
            },
            metrics,
        }
    }

    #[must_use]
    pub fn user(&self, row: &Row, id: &str) -> UserRecord {
        UserRecord {
            user_id: id.to_string(),
            name: user_display_name(row).unwrap_or_else(|| id.to_string()),
            email: field_str(row, "email"),
            role: field_str(row, "role"),
        }
    }

    /// Campaign's own actual amount, used by the account roll-up.
    #[must_use]
    pub fn campaign_actual(&self, row: &Row) -> Decimal {
        self.format
            .coerce(row.get("actual_amount"))
            .ok()
            .unwrap_or_default()
    }

    #[must_use]
    pub fn campaign(
        &self,
        row: &Row,
        id: &str,
        account: Option<EntityRef>,
        team: Team,
        metrics: CampaignMetrics,
        diag: &mut Diagnostics,
    ) -> CampaignRecord {
        let status = self.status(row, id, diag);
        let target_amount = self.decimal(row, "target_amount", id, diag);
        let actual_amount = self.decimal(row, "actual_amount", id, diag);
        CampaignRecord {
            campaign_id: id.to_string(),
            campaign_number: field_str(row, "campaign_number"),
            name: field_str(row, "name").unwrap_or_else(|| id.to_string()),
            status,
            display_status: status.display(),
            account,
            team,
            dates: self.flight(row, id, diag),
            price: Price {
                target_amount,
                actual_amount,
                remaining_amount: in_range(
                    target_amount.checked_sub(actual_amount),
                    id,
                    "remaining_amount",
                    diag,
                ),
                currency: field_str(row, "currency")
                    .map_or_else(|| DEFAULT_CURRENCY.to_string(), |c| c.to_ascii_uppercase()),
            },
            metrics,
        }
    }

    #[must_use]
    pub fn strategy(
        &self,
        row: &Row,
        id: &str,
        campaign: Option<EntityRef>,
        rollup: StrategyRollup,
        diag: &mut Diagnostics,
    ) -> StrategyRecord {
        let status = self.status(row, id, diag);
        let budget = self.decimal(row, "budget", id, diag);
        let budget_variance = in_range(
            budget.checked_sub(rollup.allocated_amount),
            id,
            "budget_variance",
            diag,
        );
        StrategyRecord {
            strategy_id: id.to_string(),
            campaign,
            name: field_str(row, "name").unwrap_or_else(|| id.to_string()),
            status,
            display_status: status.display(),
            budget,
            margin_target: self.rate(row, "margin_target", id, diag).unwrap_or_default(),
            allocated_amount: rollup.allocated_amount,
            budget_variance,
            line_item_count: rollup.line_item_count,
            media_mix: rollup.media_mix,
        }
    }

    /// Classify a line item and read its kind-specific financials.
    #[must_use]
    pub fn line_item_details(&self, row: &Row, id: &str, diag: &mut Diagnostics) -> LineItemDetails {
        let name = field_str(row, "name").unwrap_or_default();
        let type_hint = field_str(row, "line_item_type");
        let unit_type = field_str(row, "unit_type");
        let unit_price = self.decimal(row, "unit_price", id, diag);
        let quantity = self.decimal(row, "quantity", id, diag);
        let target_margin = self.rate(row, "target_margin", id, diag);

        let kind = self.classifier.classify(&ClassifierInput {
            name: &name,
            type_hint: type_hint.as_deref(),
            unit_type: unit_type.as_deref(),
            unit_price,
            target_margin,
        });

        match kind {
            LineItemKind::ManagementFee => LineItemDetails::ManagementFee {
                fee_rate: self.rate(row, "fee_rate", id, diag).unwrap_or_default(),
                fee_amount: self.decimal(row, "budget", id, diag),
            },
            LineItemKind::ZeroDollar => LineItemDetails::ZeroDollar {
                bonus_quantity: self
                    .optional_decimal(row, "bonus_quantity", id, diag)
                    .unwrap_or(quantity),
                unit_type,
            },
            LineItemKind::ZeroMargin => LineItemDetails::ZeroMargin {
                budget: self.line_item_budget(row, id, unit_type.as_deref(), unit_price, quantity, diag),
                unit_type,
                unit_price,
                quantity,
            },
            LineItemKind::Standard => {
                let budget =
                    self.line_item_budget(row, id, unit_type.as_deref(), unit_price, quantity, diag);
                let margin = target_margin.unwrap_or_default();
                let media_cost = Decimal::ONE
                    .checked_sub(margin)
                    .and_then(|net| budget.checked_mul(net));
                LineItemDetails::Standard {
                    media_cost: self.format.round(in_range(media_cost, id, "media_cost", diag)),
                    budget,
                    target_margin: margin,
                    unit_type,
                    unit_price,
                    quantity,
                }
            }
        }
    }

    /// `budget` field, else unit price × quantity (per thousand for CPM).
    fn line_item_budget(
        &self,
        row: &Row,
        id: &str,
        unit_type: Option<&str>,
        unit_price: Decimal,
        quantity: Decimal,
        diag: &mut Diagnostics,
    ) -> Decimal {
        if let Some(budget) = self.format.coerce(row.get("budget")).ok() {
            return budget;
        }
        let gross = in_range(unit_price.checked_mul(quantity), id, "budget", diag);
        let is_cpm = unit_type.is_some_and(|u| u.eq_ignore_ascii_case("cpm"));
        self.format.round(if is_cpm { gross / THOUSAND } else { gross })
    }

    /// What this line item rolls up into its strategy and campaign.
    ///
    /// Uses a throwaway diagnostics sink: the same fields are reported when
    /// the line item itself is transformed.
    #[must_use]
    pub fn line_item_facts(&self, row: &Row) -> LineItemFacts {
        let id = field_str(row, "line_item_id").unwrap_or_default();
        let mut scratch = Diagnostics::new(EntityKind::LineItem, 0);
        LineItemFacts {
            traders: parse_members(row.get("traders")),
            senior_traders: parse_members(row.get("senior_traders")),
            flight: self.flight(row, &id, &mut scratch),
            channel: field_str(row, "channel"),
            platform: field_str(row, "platform"),
            format: field_str(row, "format"),
            budget: self.line_item_details(row, &id, &mut scratch).budget(),
        }
    }

    #[must_use]
    pub fn line_item(
        &self,
        row: &Row,
        id: &str,
        strategy: Option<EntityRef>,
        campaign: Option<EntityRef>,
        media_buy_count: usize,
        diag: &mut Diagnostics,
    ) -> LineItemRecord {
        let status = self.status(row, id, diag);
        let member_ids = |field: &str| -> Vec<String> {
            let ids: BTreeSet<String> = parse_members(row.get(field))
                .into_iter()
                .map(|m| m.id)
                .collect();
            ids.into_iter().collect()
        };
        LineItemRecord {
            line_item_id: id.to_string(),
            strategy,
            campaign,
            name: field_str(row, "name").unwrap_or_else(|| id.to_string()),
            status,
            display_status: status.display(),
            financials: self.line_item_details(row, id, diag),
            flight: self.flight(row, id, diag),
            channel: field_str(row, "channel"),
            platform: field_str(row, "platform"),
            format: field_str(row, "format"),
            trader_ids: member_ids("traders"),
            senior_trader_ids: member_ids("senior_traders"),
            media_buy_count,
        }
    }

    /// Roll daily performance rows up to delivery totals.
    #[must_use]
    pub fn delivery(&self, rows: &[&Row], id: &str, diag: &mut Diagnostics) -> DeliveryTotals {
        let mut days = BTreeSet::new();
        let mut totals = DeliveryTotals::default();
        for row in rows {
            if let Some(day) = self.date(row, "date", id, diag) {
                days.insert(day);
            }
            let impressions = self.count(row, "impressions", id, diag);
            let clicks = self.count(row, "clicks", id, diag);
            let spend = self.decimal(row, "spend", id, diag);
            totals.impressions = checked_count(totals.impressions, impressions, id, "impressions", diag);
            totals.clicks = checked_count(totals.clicks, clicks, id, "clicks", diag);
            totals.spend = in_range(totals.spend.checked_add(spend), id, "spend", diag);
        }
        totals.days = days.len();
        totals
    }

    #[must_use]
    pub fn media_buy(
        &self,
        row: &Row,
        id: &str,
        link: MediaBuyLink,
        platform_name: Option<String>,
        delivery: Option<DeliveryTotals>,
        diag: &mut Diagnostics,
    ) -> MediaBuyRecord {
        let budget = self.decimal(row, "budget", id, diag);
        let spend = match &delivery {
            Some(totals) => totals.spend,
            None => self.decimal(row, "spend", id, diag),
        };
        let flight = self.flight(row, id, diag);
        let (spend_ratio, status) = if budget.is_zero() {
            let status = if spend > Decimal::ZERO {
                MediaBuyStatus::Overspent
            } else {
                status::media_buy_status(&flight, Decimal::ZERO, self.as_of)
            };
            (Decimal::ZERO, status)
        } else {
            let ratio = self
                .format
                .round(in_range(spend.checked_div(budget), id, "spend_ratio", diag));
            (ratio, status::media_buy_status(&flight, ratio, self.as_of))
        };

        MediaBuyRecord {
            media_buy_id: id.to_string(),
            line_item: link.line_item,
            allocation_pct: link.allocation_pct.unwrap_or(HUNDRED),
            name: field_str(row, "name").unwrap_or_else(|| id.to_string()),
            platform_id: field_str(row, "platform_id"),
            platform_name: platform_name.or_else(|| field_str(row, "platform_name")),
            budget,
            spend,
            spend_ratio,
            status,
            flight,
            delivery: delivery.unwrap_or_default(),
        }
    }

    /// Allocation percentage from an association row.
    #[must_use]
    pub fn allocation_pct(&self, row: &Row, id: &str, diag: &mut Diagnostics) -> Option<Decimal> {
        self.optional_decimal(row, "allocation_pct", id, diag)
    }
}

fn checked_count(total: u64, value: u64, id: &str, field: &str, diag: &mut Diagnostics) -> u64 {
    total.checked_add(value).unwrap_or_else(|| {
        diag.warn(
            id,
            field,
            WarningKind::NumericOverflow,
            "total out of range, zero substituted".to_string(),
        );
        0
    })
}

/// Display name of a user row: `name`, else `first_name last_name`.
#[must_use]
pub fn user_display_name(row: &Row) -> Option<String> {
    field_str(row, "name").or_else(|| {
        let parts: Vec<String> = ["first_name", "last_name"]
            .iter()
            .filter_map(|f| field_str(row, f))
            .collect();
        (!parts.is_empty()).then(|| parts.join(" "))
    })
}

/// Team members from a trader assignment field.
///
/// Accepts an array of ids, an array of `{user_id|id, name}` objects, or a
/// comma-separated string of ids. Entries without an id are skipped.
#[must_use]
pub fn parse_members(value: Option<&Value>) -> Vec<TeamMember> {
    let member = |id: String, name: Option<String>| TeamMember { id, name, key: None };
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::Object(obj) => {
                    let id = field_str(obj, "user_id").or_else(|| field_str(obj, "id"))?;
                    Some(member(id, user_display_name(obj)))
                }
                other => value_str(other).map(|id| member(id, None)),
            })
            .collect(),
        Some(Value::String(s)) => s
            .split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(|id| member(id.to_string(), None))
            .collect(),
        Some(Value::Number(n)) => vec![member(n.to_string(), None)],
        _ => Vec::new(),
    }
}

#[cfg(test)]
#[path = "transform_test.rs"]
mod tests;
