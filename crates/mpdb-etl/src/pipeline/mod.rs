//! Drives every entity type through read, index, aggregate, transform,
//! identity resolution and load, in dependency order.

pub mod report;
pub mod state;

use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use mpdb_core::{EntityKind, EntityRef, PipelineConfig, SourceSet, Team, TeamMember};
use mpdb_db::{
    verify_collection, write_json_atomic, BatchLoader, CancelFlag, Document,
    DocumentStore, LoadMode, LoaderConfig,
};
use rust_decimal::Decimal;
use serde::Serialize;

pub use self::report::{
    AcceptAll, EntityReport, PipelineReport, RecordValidator, ReportSink, TracingSink,
};
pub use self::state::{EntityRun, RunState};

use crate::aggregate::{aggregate_account, Hierarchy, LineItemFacts};
use crate::error::{IdentityError, PipelineError, SourceError};
use crate::identity::{document_key, IdentityResolver};
use crate::index::{latest_positions, lookup, OneToManyIndex, PointIndex};
use crate::reader::{field_str, RecordReader, Row};
use crate::transform::{
    user_display_name, Diagnostics, MediaBuyLink, Transformer, WarningKind,
};

/// Per-run switches, usually set from the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    pub mode: LoadMode,
    /// Re-read every collection after loading and compare keys.
    pub verify: bool,
    /// Transform and resolve identity but write nothing.
    pub dry_run: bool,
    /// Reference date for flight-based statuses and active counts.
    pub as_of: NaiveDate,
    /// When set, each entity's business id → key map is written here.
    pub id_map_dir: Option<PathBuf>,
}

impl RunOptions {
    #[must_use]
    pub fn new(as_of: NaiveDate) -> Self {
        Self {
            mode: LoadMode::Upsert,
            verify: false,
            dry_run: false,
            as_of,
            id_map_dir: None,
        }
    }
}

/// A transformed row, keyed and serialized, waiting for validation.
struct Staged {
    row: usize,
    doc: Document,
}

fn stage<T: Serialize>(
    kind: EntityKind,
    row: usize,
    business_id: String,
    record: &T,
) -> Result<Staged, PipelineError> {
    let key = document_key(kind, &business_id).ok_or(IdentityError::MissingBusinessId {
        entity: kind,
        field: kind.business_id_field(),
        row,
    })?;
    let doc = Document::from_record(key, business_id, record)?;
    Ok(Staged { row, doc })
}

/// Positions of the `kind` rows that become documents, the last row per
/// business id. Roll-ups read only these, so a repeated id counts once.
fn latest(rows: &[Row], kind: EntityKind) -> Vec<usize> {
    latest_positions(rows, kind.business_id_field())
}

fn flag_overflow(diag: &mut Diagnostics, id: &str, field: &str, overflowed: bool) {
    if overflowed {
        diag.warn(
            id,
            field,
            WarningKind::NumericOverflow,
            "roll-up total out of range, zero substituted".to_string(),
        );
    }
}

fn reject(report: &mut EntityReport, keep: usize, reason: String) {
    report.rejected += 1;
    if report.rejection_reasons.len() < keep {
        report.rejection_reasons.push(reason);
    }
}

pub struct Pipeline<'a, S: DocumentStore> {
    config: &'a PipelineConfig,
    store: &'a S,
    options: RunOptions,
    reader: RecordReader,
    transformer: Transformer,
    resolver: IdentityResolver,
    cache: HashMap<SourceSet, Arc<Vec<Row>>>,
    validator: Box<dyn RecordValidator + 'a>,
    sink: Box<dyn ReportSink + 'a>,
    cancel: CancelFlag,
}

impl<'a, S: DocumentStore> Pipeline<'a, S> {
    /// # Errors
    ///
    /// Returns [`PipelineError::Classifier`] if the line item rules fail to
    /// compile.
    pub fn new(
        config: &'a PipelineConfig,
        store: &'a S,
        options: RunOptions,
    ) -> Result<Self, PipelineError> {
        Ok(Self {
            config,
            store,
            reader: RecordReader::new(config.source_dir.clone(), config.layout.clone()),
            transformer: Transformer::new(config, options.as_of)?,
            options,
            resolver: IdentityResolver::new(),
            cache: HashMap::new(),
            validator: Box::new(AcceptAll),
            sink: Box::new(TracingSink),
            cancel: CancelFlag::new(),
        })
    }

    #[must_use]
    pub fn with_validator(mut self, validator: impl RecordValidator + 'a) -> Self {
        self.validator = Box::new(validator);
        self
    }

    #[must_use]
    pub fn with_sink(mut self, sink: impl ReportSink + 'a) -> Self {
        self.sink = Box::new(sink);
        self
    }

    #[must_use]
    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run every entity type in load order.
    ///
    /// A failing entity type never stops the run; it fails its dependents
    /// and the outcome is recorded in the returned report.
    pub async fn run(&mut self) -> PipelineReport {
        let mut report = PipelineReport {
            namespace: self.config.namespace.clone(),
            dry_run: self.options.dry_run,
            entities: Vec::with_capacity(EntityKind::LOAD_ORDER.len()),
        };
        tracing::info!(
            namespace = %self.config.namespace,
            source = %self.config.source_dir.display(),
            as_of = %self.options.as_of,
            mode = ?self.options.mode,
            dry_run = self.options.dry_run,
            "reconcile started"
        );

        for kind in EntityKind::LOAD_ORDER {
            let entity = self.run_entity(kind, &report).await;
            self.sink.entity_finished(&entity);
            report.entities.push(entity);
        }

        self.sink.run_finished(&report);
        report
    }

    async fn run_entity(&mut self, kind: EntityKind, done: &PipelineReport) -> EntityReport {
        let mut run = EntityRun::new(kind);
        let mut report = EntityReport::new(kind);
        let mut diag = Diagnostics::new(kind, self.config.max_failure_reasons);

        if let Err(e) = self.drive(kind, &mut run, &mut report, &mut diag, done).await {
            run.fail(e.to_string());
        }

        report.orphans = diag.count(WarningKind::OrphanRecord);
        report.duplicates = diag.count(WarningKind::DuplicateBusinessId);
        report.warnings = diag.counts().clone();
        report.warning_samples = diag.samples().to_vec();
        report.state = run.into_state();
        report
    }

    async fn drive(
        &mut self,
        kind: EntityKind,
        run: &mut EntityRun,
        report: &mut EntityReport,
        diag: &mut Diagnostics,
        done: &PipelineReport,
    ) -> Result<(), PipelineError> {
        if let Some(&dependency) = kind
            .dependencies()
            .iter()
            .find(|dep| done.entity(**dep).is_some_and(|e| e.state.is_failed()))
        {
            return Err(PipelineError::DependencyFailed {
                entity: kind,
                dependency,
            });
        }
        if self.cancel.is_cancelled() {
            return Err(PipelineError::Aborted { entity: kind });
        }

        run.advance(RunState::Reading)?;
        let rows = self.rows(kind.source()).await?;
        report.rows_read = rows.len();

        let staged = match kind {
            EntityKind::Account => {
                let campaigns = self.aux_rows(SourceSet::Campaigns, report).await;
                self.stage_accounts(&rows, &campaigns, run, report, diag)?
            }
            EntityKind::User => self.stage_users(&rows, run, report)?,
            EntityKind::Campaign => {
                let strategies = self.aux_rows(SourceSet::Strategies, report).await;
                let line_items = self.aux_rows(SourceSet::LineItems, report).await;
                let users = self.aux_rows(SourceSet::Users, report).await;
                self.stage_campaigns(&rows, &strategies, &line_items, &users, run, report, diag)?
            }
            EntityKind::Strategy => {
                let line_items = self.aux_rows(SourceSet::LineItems, report).await;
                self.stage_strategies(&rows, &line_items, run, report, diag)?
            }
            EntityKind::LineItem => {
                let strategies = self.aux_rows(SourceSet::Strategies, report).await;
                let links = self.aux_rows(SourceSet::LineItemMediaBuys, report).await;
                self.stage_line_items(&rows, &strategies, &links, run, report, diag)?
            }
            EntityKind::MediaBuy => {
                let links = self.aux_rows(SourceSet::LineItemMediaBuys, report).await;
                let platforms = self.aux_rows(SourceSet::Platforms, report).await;
                let performance = self.aux_rows(SourceSet::DailyPerformance, report).await;
                self.stage_media_buys(&rows, &links, &platforms, &performance, run, report, diag)?
            }
        };
        report.transformed = staged.len();

        run.advance(RunState::ResolvingIdentity)?;
        let docs = self.resolve(kind, staged, report, diag)?;

        if self.options.dry_run {
            tracing::info!(entity = %kind, documents = docs.len(), "dry run, nothing written");
            run.advance(RunState::Done {
                with_errors: report.rejected > 0,
            })?;
            return Ok(());
        }

        run.advance(RunState::Loading)?;
        let loader = BatchLoader::new(self.store, LoaderConfig::from_pipeline_config(self.config));
        let load = loader
            .load(kind.collection(), &docs, self.options.mode, &self.cancel)
            .await?;
        let failed = load.failed();
        let aborted = load.aborted;
        let fatal = load.is_fatal().then(|| match &load.flush_error {
            Some(e) => format!("flush failed: {e}"),
            None => format!("{} batch(es) rejected by the store", load.rejected_batches()),
        });
        report.load = Some(load);
        if aborted {
            return Err(PipelineError::Aborted { entity: kind });
        }
        if let Some(reason) = fatal {
            return Err(PipelineError::LoadIncomplete {
                entity: kind,
                reason,
            });
        }

        let mut incomplete = false;
        if self.options.verify {
            let expected: BTreeSet<String> =
                docs.iter().map(|d| d.key.as_str().to_string()).collect();
            let verify = verify_collection(self.store, kind.collection(), &expected).await?;
            incomplete = !verify.is_complete();
            report.verify = Some(verify);
        }

        if let Some(dir) = &self.options.id_map_dir {
            let path = dir.join(format!("{}.json", kind.collection()));
            write_json_atomic(&path, &self.resolver.snapshot(kind)).await?;
        }

        run.advance(RunState::Done {
            with_errors: failed > 0 || report.rejected > 0 || incomplete,
        })?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Inputs
    // -----------------------------------------------------------------------

    async fn rows(&mut self, set: SourceSet) -> Result<Arc<Vec<Row>>, SourceError> {
        if let Some(rows) = self.cache.get(&set) {
            return Ok(Arc::clone(rows));
        }
        let rows = Arc::new(self.reader.read(set).await?);
        self.cache.insert(set, Arc::clone(&rows));
        Ok(rows)
    }

    /// Rows of a set the entity only rolls up from. A set that cannot be read
    /// degrades to empty instead of failing the entity. The failure is not
    /// cached, so the entity that owns the set still fails on it.
    async fn aux_rows(&mut self, set: SourceSet, report: &mut EntityReport) -> Arc<Vec<Row>> {
        match self.rows(set).await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(
                    entity = %report.entity,
                    input = %set,
                    kind = e.kind(),
                    error = %e,
                    "auxiliary input unavailable, treating as empty"
                );
                report.degraded_inputs.push(format!("{set}: {e}"));
                Arc::new(Vec::new())
            }
        }
    }

    /// Rows carrying a business id; the rest are rejected.
    fn identified<'r>(
        &self,
        kind: EntityKind,
        rows: &'r [Row],
        report: &mut EntityReport,
    ) -> Vec<(usize, String, &'r Row)> {
        let field = kind.business_id_field();
        let mut out = Vec::with_capacity(rows.len());
        for (pos, row) in rows.iter().enumerate() {
            match field_str(row, field) {
                Some(id) => out.push((pos, id, row)),
                None => {
                    let err = IdentityError::MissingBusinessId {
                        entity: kind,
                        field,
                        row: pos,
                    };
                    tracing::warn!(entity = %kind, row = pos, "{err}");
                    reject(report, self.config.max_failure_reasons, err.to_string());
                }
            }
        }
        out
    }

    /// Reference to a parent, flagging the child as an orphan when the
    /// foreign key is absent or points at nothing known.
    fn parent_ref(
        &self,
        parent: EntityKind,
        foreign_key: Option<String>,
        field: &str,
        id: &str,
        diag: &mut Diagnostics,
    ) -> Option<EntityRef> {
        let Some(foreign_key) = foreign_key else {
            diag.warn(
                id,
                field,
                WarningKind::OrphanRecord,
                format!("no {parent} reference"),
            );
            return None;
        };
        let reference = self.resolver.reference(parent, Some(&foreign_key));
        if !reference.as_ref().is_some_and(EntityRef::is_resolved) {
            diag.warn(
                id,
                field,
                WarningKind::OrphanRecord,
                format!("{parent} '{foreign_key}' not found"),
            );
        }
        reference
    }

    fn team_member(&self, mut member: TeamMember, users: &[Row], index: &PointIndex) -> TeamMember {
        if member.name.is_none() {
            member.name = lookup(users, index, &member.id).and_then(user_display_name);
        }
        member.key = self.resolver.lookup(EntityKind::User, &member.id).cloned();
        member
    }

    fn line_item_facts(&self, line_items: &[Row]) -> Vec<LineItemFacts> {
        line_items
            .iter()
            .map(|row| self.transformer.line_item_facts(row))
            .collect()
    }

    // -----------------------------------------------------------------------
    // Entities
    // -----------------------------------------------------------------------

    fn stage_accounts(
        &self,
        rows: &[Row],
        campaigns: &[Row],
        run: &mut EntityRun,
        report: &mut EntityReport,
        diag: &mut Diagnostics,
    ) -> Result<Vec<Staged>, PipelineError> {
        run.advance(RunState::Indexing)?;
        let by_account = OneToManyIndex::build_at(
            campaigns,
            latest(campaigns, EntityKind::Campaign),
            "account_id",
        );
        report.unattributed = by_account.orphans().len();

        run.advance(RunState::Aggregating)?;
        let actuals: Vec<Decimal> = campaigns
            .iter()
            .map(|row| self.transformer.campaign_actual(row))
            .collect();

        run.advance(RunState::Transforming)?;
        let mut out = Vec::with_capacity(rows.len());
        for (pos, id, row) in self.identified(EntityKind::Account, rows, report) {
            let rollup = aggregate_account(&by_account, &actuals, &id);
            flag_overflow(diag, &id, "total_revenue", rollup.overflowed);
            let record = self.transformer.account(row, &id, rollup.metrics, diag);
            out.push(stage(EntityKind::Account, pos, id, &record)?);
        }
        Ok(out)
    }

    fn stage_users(
        &self,
        rows: &[Row],
        run: &mut EntityRun,
        report: &mut EntityReport,
    ) -> Result<Vec<Staged>, PipelineError> {
        run.advance(RunState::Indexing)?;
        run.advance(RunState::Transforming)?;
        let mut out = Vec::with_capacity(rows.len());
        for (pos, id, row) in self.identified(EntityKind::User, rows, report) {
            let record = self.transformer.user(row, &id);
            out.push(stage(EntityKind::User, pos, id, &record)?);
        }
        Ok(out)
    }

    #[allow(clippy::too_many_arguments)]
    fn stage_campaigns(
        &self,
        rows: &[Row],
        strategies: &[Row],
        line_items: &[Row],
        users: &[Row],
        run: &mut EntityRun,
        report: &mut EntityReport,
        diag: &mut Diagnostics,
    ) -> Result<Vec<Staged>, PipelineError> {
        run.advance(RunState::Indexing)?;
        let strategy_ids: Vec<Option<String>> = strategies
            .iter()
            .map(|row| field_str(row, "strategy_id"))
            .collect();
        let strategies_by_campaign = OneToManyIndex::build_at(
            strategies,
            latest(strategies, EntityKind::Strategy),
            "campaign_id",
        );
        let line_items_by_strategy = OneToManyIndex::build_at(
            line_items,
            latest(line_items, EntityKind::LineItem),
            "strategy_id",
        );
        let users_by_id = PointIndex::build_at(users, latest(users, EntityKind::User), "user_id");
        report.unattributed =
            strategies_by_campaign.orphans().len() + line_items_by_strategy.orphans().len();

        run.advance(RunState::Aggregating)?;
        let facts = self.line_item_facts(line_items);
        let hierarchy = Hierarchy {
            strategy_ids: &strategy_ids,
            strategies_by_campaign: &strategies_by_campaign,
            line_items_by_strategy: &line_items_by_strategy,
            line_items: &facts,
        };

        run.advance(RunState::Transforming)?;
        let as_of = self.transformer.as_of();
        let mut out = Vec::with_capacity(rows.len());
        for (pos, id, row) in self.identified(EntityKind::Campaign, rows, report) {
            let rollup = hierarchy.aggregate_campaign(&id, as_of);
            flag_overflow(diag, &id, "allocated_budget", rollup.overflowed);
            let account = self.parent_ref(
                EntityKind::Account,
                field_str(row, "account_id"),
                "account_id",
                &id,
                diag,
            );
            let enrich = |m: TeamMember| self.team_member(m, users, &users_by_id);
            let team = Team {
                account_manager: field_str(row, "account_manager_id").map(|manager| {
                    enrich(TeamMember {
                        id: manager,
                        name: None,
                        key: None,
                    })
                }),
                senior_traders: rollup.senior_traders.into_iter().map(enrich).collect(),
                traders: rollup.traders.into_iter().map(enrich).collect(),
            };
            let record = self
                .transformer
                .campaign(row, &id, account, team, rollup.metrics, diag);
            out.push(stage(EntityKind::Campaign, pos, id, &record)?);
        }
        Ok(out)
    }

    fn stage_strategies(
        &self,
        rows: &[Row],
        line_items: &[Row],
        run: &mut EntityRun,
        report: &mut EntityReport,
        diag: &mut Diagnostics,
    ) -> Result<Vec<Staged>, PipelineError> {
        run.advance(RunState::Indexing)?;
        let line_items_by_strategy = OneToManyIndex::build_at(
            line_items,
            latest(line_items, EntityKind::LineItem),
            "strategy_id",
        );
        report.unattributed = line_items_by_strategy.orphans().len();
        let no_campaigns = OneToManyIndex::default();

        run.advance(RunState::Aggregating)?;
        let facts = self.line_item_facts(line_items);
        let hierarchy = Hierarchy {
            strategy_ids: &[],
            strategies_by_campaign: &no_campaigns,
            line_items_by_strategy: &line_items_by_strategy,
            line_items: &facts,
        };

        run.advance(RunState::Transforming)?;
        let mut out = Vec::with_capacity(rows.len());
        for (pos, id, row) in self.identified(EntityKind::Strategy, rows, report) {
            let rollup = hierarchy.aggregate_strategy(&id);
            flag_overflow(diag, &id, "allocated_amount", rollup.overflowed);
            let campaign = self.parent_ref(
                EntityKind::Campaign,
                field_str(row, "campaign_id"),
                "campaign_id",
                &id,
                diag,
            );
            let record = self.transformer.strategy(row, &id, campaign, rollup, diag);
            out.push(stage(EntityKind::Strategy, pos, id, &record)?);
        }
        Ok(out)
    }

    fn stage_line_items(
        &self,
        rows: &[Row],
        strategies: &[Row],
        links: &[Row],
        run: &mut EntityRun,
        report: &mut EntityReport,
        diag: &mut Diagnostics,
    ) -> Result<Vec<Staged>, PipelineError> {
        run.advance(RunState::Indexing)?;
        let strategies_by_id =
            PointIndex::build_at(strategies, latest(strategies, EntityKind::Strategy), "strategy_id");
        let buys_by_line_item = OneToManyIndex::build(links, "line_item_id");

        run.advance(RunState::Transforming)?;
        let mut out = Vec::with_capacity(rows.len());
        for (pos, id, row) in self.identified(EntityKind::LineItem, rows, report) {
            let strategy_id = field_str(row, "strategy_id");
            let campaign_id = strategy_id
                .as_deref()
                .and_then(|sid| lookup(strategies, &strategies_by_id, sid))
                .and_then(|strategy| field_str(strategy, "campaign_id"));
            let strategy =
                self.parent_ref(EntityKind::Strategy, strategy_id, "strategy_id", &id, diag);
            let campaign = self
                .resolver
                .reference(EntityKind::Campaign, campaign_id.as_deref());
            let media_buy_count = buys_by_line_item.children(&id).len();
            let record =
                self.transformer
                    .line_item(row, &id, strategy, campaign, media_buy_count, diag);
            out.push(stage(EntityKind::LineItem, pos, id, &record)?);
        }
        Ok(out)
    }

    #[allow(clippy::too_many_arguments)]
    fn stage_media_buys(
        &self,
        rows: &[Row],
        links: &[Row],
        platforms: &[Row],
        performance: &[Row],
        run: &mut EntityRun,
        report: &mut EntityReport,
        diag: &mut Diagnostics,
    ) -> Result<Vec<Staged>, PipelineError> {
        run.advance(RunState::Indexing)?;
        let links_by_buy = OneToManyIndex::build(links, "media_buy_id");
        let platforms_by_id = PointIndex::build(platforms, "platform_id");
        if let Some((platform, _)) = platforms_by_id.duplicates().first() {
            tracing::warn!(
                entity = %EntityKind::MediaBuy,
                duplicates = platforms_by_id.duplicates().len(),
                first = %platform,
                "repeated platform ids, first row kept"
            );
        }
        let performance_by_buy = OneToManyIndex::build(performance, "media_buy_id");

        run.advance(RunState::Transforming)?;
        let mut out = Vec::with_capacity(rows.len());
        for (pos, id, row) in self.identified(EntityKind::MediaBuy, rows, report) {
            let buy_links = links_by_buy.children(&id);
            if buy_links.len() > 1 {
                diag.warn(
                    &id,
                    "line_item_id",
                    WarningKind::AmbiguousAssociation,
                    format!("{} line item links, first one kept", buy_links.len()),
                );
            }
            let (line_item_id, allocation_pct) = match buy_links.first() {
                Some(&link) => (
                    field_str(&links[link], "line_item_id"),
                    self.transformer.allocation_pct(&links[link], &id, diag),
                ),
                None => (field_str(row, "line_item_id"), None),
            };
            let link = MediaBuyLink {
                line_item: self.parent_ref(
                    EntityKind::LineItem,
                    line_item_id,
                    "line_item_id",
                    &id,
                    diag,
                ),
                allocation_pct,
            };

            let platform_name = field_str(row, "platform_id")
                .and_then(|pid| lookup(platforms, &platforms_by_id, &pid))
                .and_then(|platform| field_str(platform, "name"));

            let daily: Vec<&Row> = performance_by_buy
                .children(&id)
                .iter()
                .map(|&i| &performance[i])
                .collect();
            let delivery =
                (!daily.is_empty()).then(|| self.transformer.delivery(&daily, &id, diag));

            let record = self
                .transformer
                .media_buy(row, &id, link, platform_name, delivery, diag);
            out.push(stage(EntityKind::MediaBuy, pos, id, &record)?);
        }
        Ok(out)
    }

    // -----------------------------------------------------------------------
    // Identity
    // -----------------------------------------------------------------------

    /// Validate and register staged records. A repeated business id
    /// replaces the earlier document in place, so the last row wins.
    fn resolve(
        &mut self,
        kind: EntityKind,
        staged: Vec<Staged>,
        report: &mut EntityReport,
        diag: &mut Diagnostics,
    ) -> Result<Vec<Document>, PipelineError> {
        let keep = self.config.max_failure_reasons;
        let mut docs: Vec<Document> = Vec::with_capacity(staged.len());
        let mut positions: HashMap<String, usize> = HashMap::new();

        for Staged { row, doc } in staged {
            let business_id = doc.business_id.clone();
            if let Err(reason) = self.validator.validate(kind, &doc) {
                tracing::warn!(entity = %kind, %business_id, %reason, "record rejected");
                reject(report, keep, format!("{business_id}: {reason}"));
                continue;
            }

            let registration = self.resolver.register(kind, &business_id, row)?;
            if registration.duplicate {
                diag.warn(
                    &business_id,
                    kind.business_id_field(),
                    WarningKind::DuplicateBusinessId,
                    format!("row {row} repeats an earlier row"),
                );
            }
            match positions.get(doc.key.as_str()) {
                Some(&at) => docs[at] = doc,
                None => {
                    positions.insert(doc.key.as_str().to_string(), docs.len());
                    docs.push(doc);
                }
            }
        }
        Ok(docs)
    }
}
