//! Roll-ups of descendant facts onto parent entities.
//!
//! Traversal follows the one-to-many indices in source row order, so the
//! same index contents always produce the same result.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use mpdb_core::{AccountMetrics, CampaignMetrics, DateRange, MediaMix, TeamMember};
use rust_decimal::Decimal;

use crate::index::OneToManyIndex;

/// What a line item contributes to its parents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineItemFacts {
    pub traders: Vec<TeamMember>,
    pub senior_traders: Vec<TeamMember>,
    pub flight: DateRange,
    pub channel: Option<String>,
    pub platform: Option<String>,
    pub format: Option<String>,
    pub budget: Decimal,
}

/// Team members deduplicated by business id in first-seen order.
///
/// The first non-empty display name seen for an id is kept.
#[derive(Debug, Clone, Default)]
pub struct MemberSet {
    members: Vec<TeamMember>,
    positions: HashMap<String, usize>,
}

impl MemberSet {
    pub fn add(&mut self, member: &TeamMember) {
        if let Some(&pos) = self.positions.get(&member.id) {
            let existing = &mut self.members[pos];
            if existing.name.is_none() {
                existing.name.clone_from(&member.name);
            }
            return;
        }
        self.positions.insert(member.id.clone(), self.members.len());
        self.members.push(member.clone());
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<TeamMember> {
        self.members
    }
}

/// Adds `value` into `total`. Once the sum leaves the representable range the
/// total is zeroed and `overflowed` stays set.
fn accumulate(total: &mut Decimal, value: Decimal, overflowed: &mut bool) {
    if *overflowed {
        return;
    }
    match total.checked_add(value) {
        Some(sum) => *total = sum,
        None => {
            *total = Decimal::ZERO;
            *overflowed = true;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CampaignRollup {
    pub traders: Vec<TeamMember>,
    pub senior_traders: Vec<TeamMember>,
    pub metrics: CampaignMetrics,
    /// The allocated budget overflowed and was zeroed.
    pub overflowed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StrategyRollup {
    pub allocated_amount: Decimal,
    pub line_item_count: usize,
    pub media_mix: MediaMix,
    /// The allocated amount overflowed and was zeroed.
    pub overflowed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountRollup {
    pub metrics: AccountMetrics,
    /// Total revenue overflowed and was zeroed.
    pub overflowed: bool,
}

/// Campaign → strategies → line items, as position indices.
#[derive(Debug, Clone, Copy)]
pub struct Hierarchy<'a> {
    /// Business id of each strategy row, by row position.
    pub strategy_ids: &'a [Option<String>],
    pub strategies_by_campaign: &'a OneToManyIndex,
    pub line_items_by_strategy: &'a OneToManyIndex,
    /// Facts of each line item row, by row position.
    pub line_items: &'a [LineItemFacts],
}

impl<'a> Hierarchy<'a> {
    fn line_item_facts(&self, strategy_id: &str) -> Vec<&'a LineItemFacts> {
        let line_items = self.line_items;
        self.line_items_by_strategy
            .children(strategy_id)
            .iter()
            .filter_map(|&pos| line_items.get(pos))
            .collect()
    }

    /// Walk every line item under `campaign_id` and accumulate its roll-up.
    ///
    /// A campaign with no strategies, or strategies with no line items,
    /// yields an all-empty result.
    #[must_use]
    pub fn aggregate_campaign(&self, campaign_id: &str, as_of: NaiveDate) -> CampaignRollup {
        let mut traders = MemberSet::default();
        let mut senior_traders = MemberSet::default();
        let mut metrics = CampaignMetrics::default();
        let mut overflowed = false;
        // A strategy id repeated in the source must not count its line items twice.
        let mut visited: HashSet<&str> = HashSet::new();

        for &strategy_pos in self.strategies_by_campaign.children(campaign_id) {
            let Some(Some(strategy_id)) = self.strategy_ids.get(strategy_pos) else {
                continue;
            };
            if !visited.insert(strategy_id.as_str()) {
                continue;
            }
            metrics.strategy_count += 1;

            for facts in self.line_item_facts(strategy_id) {
                for member in &facts.traders {
                    traders.add(member);
                }
                for member in &facts.senior_traders {
                    senior_traders.add(member);
                }
                metrics.line_item_count += 1;
                if facts.flight.contains(as_of) {
                    metrics.active_line_item_count += 1;
                }
                metrics.media_mix.observe(
                    facts.channel.as_deref(),
                    facts.platform.as_deref(),
                    facts.format.as_deref(),
                );
                accumulate(&mut metrics.allocated_budget, facts.budget, &mut overflowed);
            }
        }

        CampaignRollup {
            traders: traders.into_vec(),
            senior_traders: senior_traders.into_vec(),
            metrics,
            overflowed,
        }
    }

    /// One-level roll-up of a strategy's line items.
    #[must_use]
    pub fn aggregate_strategy(&self, strategy_id: &str) -> StrategyRollup {
        let mut rollup = StrategyRollup::default();
        for facts in self.line_item_facts(strategy_id) {
            rollup.line_item_count += 1;
            accumulate(
                &mut rollup.allocated_amount,
                facts.budget,
                &mut rollup.overflowed,
            );
            rollup.media_mix.observe(
                facts.channel.as_deref(),
                facts.platform.as_deref(),
                facts.format.as_deref(),
            );
        }
        rollup
    }
}

/// Campaign count and revenue for one account.
///
/// `campaign_actuals` holds each campaign row's actual amount by position.
#[must_use]
pub fn aggregate_account(
    campaigns_by_account: &OneToManyIndex,
    campaign_actuals: &[Decimal],
    account_id: &str,
) -> AccountRollup {
    let children = campaigns_by_account.children(account_id);
    let mut rollup = AccountRollup::default();
    rollup.metrics.campaign_count = children.len();
    for actual in children.iter().filter_map(|&pos| campaign_actuals.get(pos)) {
        accumulate(
            &mut rollup.metrics.total_revenue,
            *actual,
            &mut rollup.overflowed,
        );
    }
    rollup
}

#[cfg(test)]
#[path = "aggregate_test.rs"]
mod tests;
