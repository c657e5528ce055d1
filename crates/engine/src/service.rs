//! Thread-safe facade over [`CargoStore`].
//!
//! `CargoService` owns the store and the audit ledger and serializes access
//! the same way for every operation:
//!
//! ```text
//! simulation (read; write for day advance)
//!   ↓
//! container locks (ascending id order)
//!   ↓
//! store (read while planning, short write to commit)
//!   ↓
//! ledger append (own lock; failures are logged, never rolled back)
//! ```
//!
//! Placement and retrieval searches hold only a read guard on the store, so
//! independent containers are planned in parallel; the write guard is taken
//! for the commit alone.

use std::collections::BTreeSet;
use std::io::{Read, Write};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::json;
use tracing::{debug, info, instrument, warn};

use stowage_cargo::{ContainerSpec, ItemSpec};
use stowage_core::{ContainerId, DomainError, DomainResult, Entity, ItemId, UserId};
use stowage_ledger::{ActionType, AuditLedger, InMemoryLedger, NewLogEntry};

use crate::config::EngineConfig;
use crate::dto::{
    ItemView, LogsRequest, LogsResponse, PlaceRequest, PlaceResponse, PlacementRequest,
    PlacementResponse, PlacementView, RearrangementView, RetrieveRequest, RetrieveResponse,
    ReturnPlanRequest, ReturnPlanResponse, SearchRequest, SearchResponse, SimulateRequest,
    SimulateResponse, SimulationChanges, StowRequest, StowResponse, UnplacedView,
    UndockingRequest, UndockingResponse, WasteItemView, WasteResponse,
};
use crate::interchange::{self, ImportReport, InterchangeError, RowError};
use crate::lifecycle;
use crate::locks::ContainerLocks;
use crate::placement::{self, PlacementPolicy};
use crate::retrieval;
use crate::returns;
use crate::store::CargoStore;

/// How often a retrieval re-resolves its container when the item moved
/// between lookup and lock.
const LOCK_ATTEMPTS: usize = 3;

pub struct CargoService<L: AuditLedger = InMemoryLedger> {
    config: EngineConfig,
    policy: PlacementPolicy,
    simulation: RwLock<()>,
    locks: ContainerLocks,
    store: RwLock<CargoStore>,
    ledger: L,
}

impl CargoService<InMemoryLedger> {
    /// Service with an in-memory ledger sized from `config`.
    pub fn new(config: EngineConfig) -> Self {
        let ledger = match config.ledger_capacity {
            Some(capacity) => InMemoryLedger::with_capacity(capacity),
            None => InMemoryLedger::new(),
        };
        Self::with_ledger(config, ledger)
    }
}

impl<L: AuditLedger> CargoService<L> {
    pub fn with_ledger(config: EngineConfig, ledger: L) -> Self {
        let policy = config.placement_policy();
        let store = CargoStore::new(config.start_date);
        Self {
            config,
            policy,
            simulation: RwLock::new(()),
            locks: ContainerLocks::new(),
            store: RwLock::new(store),
            ledger,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// A consistent copy of the whole cargo state.
    pub fn snapshot(&self) -> DomainResult<CargoStore> {
        let _sim = self.sim_read()?;
        Ok(self.read_store()?.clone())
    }

    // ---- registration ----

    #[instrument(skip(self, spec), fields(container = %spec.container_id))]
    pub fn register_container(&self, spec: ContainerSpec) -> DomainResult<()> {
        let _sim = self.sim_read()?;
        let locks = self.locks.handles([&spec.container_id])?;
        let _guards = locks.lock()?;
        self.write_store()?.register_container(spec)?;
        info!("container registered");
        Ok(())
    }

    #[instrument(skip(self, spec), fields(item = %spec.item_id))]
    pub fn register_item(&self, spec: ItemSpec) -> DomainResult<()> {
        let _sim = self.sim_read()?;
        self.write_store()?.register_item(spec)?;
        info!("item registered");
        Ok(())
    }

    // ---- search / stow / place / retrieve ----

    #[instrument(skip(self))]
    pub fn search(&self, request: SearchRequest) -> DomainResult<SearchResponse> {
        request.validate()?;
        let _sim = self.sim_read()?;
        let store = self.read_store()?;

        let item = match (&request.item_id, request.item_name.as_deref()) {
            (Some(id), _) => store.item(id).ok(),
            (None, Some(name)) => store.find_by_name(name),
            (None, None) => None,
        };
        let Some(item) = item else {
            debug!("no match");
            return Ok(SearchResponse {
                found: false,
                item: None,
                retrieval_steps: Vec::new(),
            });
        };

        let location = store.claim_location(item.id());
        let zone = location
            .and_then(|(cid, _)| store.container(cid).ok())
            .map(|c| c.zone().to_string());
        let retrieval_steps = if item.is_stowed() {
            retrieval::plan_retrieval(&store, item.id(), &BTreeSet::new())?
        } else {
            Vec::new()
        };
        Ok(SearchResponse {
            found: true,
            item: Some(ItemView {
                item_id: item.id().clone(),
                name: item.name().to_string(),
                status: item.status(),
                container_id: location.map(|(cid, _)| cid.clone()),
                zone,
                position: location.map(|(_, bbox)| *bbox),
                remaining_uses: item.remaining_uses(),
            }),
            retrieval_steps,
        })
    }

    /// Automatic placement: search under a read guard while the candidate
    /// containers are locked, then commit.
    #[instrument(skip(self, request), fields(item = %request.item_id, user = %request.user_id))]
    pub fn stow(&self, request: StowRequest) -> DomainResult<StowResponse> {
        let _sim = self.sim_read()?;
        let candidates = match request.containers {
            Some(ids) if !ids.is_empty() => ids,
            _ => self.read_store()?.container_ids(),
        };
        let locks = self.locks.handles(&candidates)?;
        let _guards = locks.lock()?;

        let plan = {
            let store = self.read_store()?;
            placement::plan_placement(&store, &request.item_id, &candidates, &self.policy)?
        };
        placement::commit_placement(&mut *self.write_store()?, &plan)?;

        info!(
            container = %plan.placement.container_id,
            rearranged = plan.relocation.is_some(),
            "item stowed"
        );
        self.record(
            NewLogEntry::new(ActionType::Placement)
                .by(Some(request.user_id.clone()))
                .item(request.item_id.clone())
                .at(request.timestamp)
                .details(json!({
                    "containerId": plan.placement.container_id,
                    "position": plan.placement.position,
                    "orientation": plan.placement.orientation,
                })),
        );
        if let Some(moved) = &plan.relocation {
            self.record(
                NewLogEntry::new(ActionType::Rearrangement)
                    .by(Some(request.user_id))
                    .item(moved.item_id.clone())
                    .at(request.timestamp)
                    .details(json!({
                        "fromContainer": moved.from.container_id,
                        "fromPosition": moved.from.position,
                        "toContainer": moved.to.container_id,
                        "toPosition": moved.to.position,
                        "reason": format!("make room for {}", request.item_id),
                    })),
            );
        }
        Ok(StowResponse {
            placement: plan.placement,
            rearrangement: plan.relocation,
        })
    }

    /// Manual placement at a caller-chosen box.
    #[instrument(skip(self, request), fields(item = %request.item_id, container = %request.container_id))]
    pub fn place(&self, request: PlaceRequest) -> DomainResult<PlaceResponse> {
        let _sim = self.sim_read()?;
        let locks = self.locks.handles([&request.container_id])?;
        let _guards = locks.lock()?;
        let placement = self.write_store()?.place_at(
            &request.item_id,
            &request.container_id,
            request.position,
        )?;

        info!("item placed");
        self.record(
            NewLogEntry::new(ActionType::Placement)
                .by(Some(request.user_id))
                .item(request.item_id)
                .at(request.timestamp)
                .details(json!({
                    "containerId": placement.container_id,
                    "position": placement.position,
                    "orientation": placement.orientation,
                    "manual": true,
                })),
        );
        Ok(PlaceResponse {
            success: true,
            placement,
        })
    }

    #[instrument(skip(self, request), fields(item = %request.item_id, user = %request.user_id))]
    pub fn retrieve(&self, request: RetrieveRequest) -> DomainResult<RetrieveResponse> {
        let _sim = self.sim_read()?;

        for _ in 0..LOCK_ATTEMPTS {
            let container_id = self.container_of(&request.item_id)?;
            let locks = self.locks.handles([&container_id])?;
            let _guards = locks.lock()?;

            let mut store = self.write_store()?;
            let still_there = store
                .claim_location(&request.item_id)
                .is_some_and(|(cid, _)| cid == &container_id);
            if !still_there {
                debug!(container = %container_id, "item moved before lock, retrying");
                continue;
            }
            let outcome = retrieval::retrieve(&mut store, &request.item_id)?;
            drop(store);

            info!(
                container = %container_id,
                steps = outcome.steps.len(),
                remaining_uses = ?outcome.remaining_uses,
                "item retrieved"
            );
            self.record(
                NewLogEntry::new(ActionType::Retrieval)
                    .by(Some(request.user_id))
                    .item(request.item_id)
                    .at(request.timestamp)
                    .details(json!({
                        "fromContainer": outcome.vacated.container_id,
                        "fromPosition": outcome.vacated.position,
                        "steps": outcome.steps.len(),
                        "remainingUses": outcome.remaining_uses,
                    })),
            );
            return Ok(RetrieveResponse {
                success: true,
                retrieval_steps: outcome.steps,
                remaining_uses: outcome.remaining_uses,
            });
        }
        Err(DomainError::conflict(format!(
            "item {} kept moving during retrieval",
            request.item_id
        )))
    }

    fn container_of(&self, item_id: &ItemId) -> DomainResult<ContainerId> {
        let store = self.read_store()?;
        let item = store.item(item_id)?;
        if !item.is_stowed() {
            return Err(item.not_stowed());
        }
        store
            .claim_location(item_id)
            .map(|(cid, _)| cid.clone())
            .ok_or_else(|| item.not_stowed())
    }

    /// What-if placement of a batch on a copy of the current state. Nothing
    /// is committed and nothing is logged in the ledger.
    #[instrument(skip(self, request), fields(items = request.items.len(), containers = request.containers.len()))]
    pub fn placement(&self, request: PlacementRequest) -> DomainResult<PlacementResponse> {
        let _sim = self.sim_read()?;
        let mut scratch = self.read_store()?.clone();

        let mut candidates = Vec::with_capacity(request.containers.len());
        for spec in request.containers {
            candidates.push(spec.container_id.clone());
            scratch.register_container(spec)?;
        }
        if candidates.is_empty() {
            candidates = scratch.container_ids();
        }

        let mut unplaced = Vec::new();
        let mut ids = Vec::with_capacity(request.items.len());
        for spec in request.items {
            let item_id = spec.item_id.clone();
            match scratch.register_item(spec) {
                Ok(()) => ids.push(item_id),
                Err(err) => unplaced.push(UnplacedView {
                    item_id,
                    reason: err.to_string(),
                }),
            }
        }

        let outcome = placement::place_batch(&mut scratch, &ids, &candidates, &self.policy);
        let rearrangements = outcome
            .placements
            .iter()
            .filter_map(|plan| plan.relocation.as_ref())
            .enumerate()
            .map(|(n, r)| RearrangementView::from_relocation(n + 1, r))
            .collect();
        let placements = outcome
            .placements
            .into_iter()
            .map(|plan| PlacementView {
                item_id: plan.item_id,
                container_id: plan.placement.container_id,
                position: plan.placement.position,
            })
            .collect();
        unplaced.extend(
            outcome
                .unplaced
                .into_iter()
                .map(|(item_id, reason)| UnplacedView { item_id, reason }),
        );

        debug!(unplaced = unplaced.len(), "what-if placement done");
        Ok(PlacementResponse {
            success: unplaced.is_empty(),
            placements,
            rearrangements,
            unplaced,
        })
    }

    // ---- lifecycle ----

    /// Advance the mission clock. Runs exclusively: every other operation
    /// waits on the simulation lock.
    #[instrument(skip(self, request), fields(days = ?request.num_of_days, to = ?request.to_timestamp))]
    pub fn simulate(&self, request: SimulateRequest) -> DomainResult<SimulateResponse> {
        request.validate()?;
        let _sim = self.sim_write()?;
        let mut store = self.write_store()?;

        let mut scratch = store.clone();
        let report = match (request.num_of_days, request.to_timestamp) {
            (Some(days), _) => {
                lifecycle::advance(&mut scratch, days, &request.items_to_be_used_per_day)?
            }
            (None, Some(to)) => lifecycle::advance_to(
                &mut scratch,
                to.date_naive(),
                &request.items_to_be_used_per_day,
            )?,
            (None, None) => return Err(DomainError::validation("nothing to simulate")),
        };
        let moved_from = store.today();
        *store = scratch;
        drop(store);

        info!(
            new_date = %report.new_date,
            used = report.items_used.len(),
            expired = report.items_expired.len(),
            depleted = report.items_depleted.len(),
            "clock advanced"
        );
        for (change, reason) in report.wasted() {
            self.record(
                NewLogEntry::new(ActionType::Waste)
                    .item(change.item_id.clone())
                    .details(json!({ "reason": reason, "date": change.date })),
            );
        }
        self.record(NewLogEntry::new(ActionType::Simulation).details(json!({
            "from": moved_from,
            "to": report.new_date,
            "itemsUsed": report.items_used.len(),
            "itemsExpired": report.items_expired.len(),
            "itemsDepleted": report.items_depleted.len(),
        })));

        Ok(SimulateResponse {
            success: true,
            new_date: report.new_date,
            changes: SimulationChanges {
                items_used: report.items_used,
                items_expired: report.items_expired,
                items_depleted: report.items_depleted,
            },
        })
    }

    // ---- waste and returns ----

    #[instrument(skip(self))]
    pub fn identify_waste(&self) -> DomainResult<WasteResponse> {
        let _sim = self.sim_read()?;
        let store = self.read_store()?;
        let waste_items = store
            .waste_records()
            .into_iter()
            .map(|record| {
                let item = store.item(&record.item_id)?;
                Ok(WasteItemView {
                    item_id: record.item_id.clone(),
                    name: item.name().to_string(),
                    reason: record.reason,
                    container_id: record.container_id.clone(),
                    position: record.position,
                    mass: item.mass(),
                    volume: item.volume(),
                    created_at: record.created_at,
                })
            })
            .collect::<DomainResult<Vec<_>>>()?;
        Ok(WasteResponse {
            success: true,
            waste_items,
        })
    }

    #[instrument(skip(self, request), fields(undocking = %request.undocking_container_id, max_weight = request.max_weight))]
    pub fn return_plan(&self, request: ReturnPlanRequest) -> DomainResult<ReturnPlanResponse> {
        let _sim = self.sim_read()?;
        let locks = self.locks.handles([&request.undocking_container_id])?;
        let _guards = locks.lock()?;
        let manifest = returns::build_return_plan(
            &mut *self.write_store()?,
            &request.undocking_container_id,
            request.undocking_date,
            request.max_weight,
        )?;

        info!(
            items = manifest.items.len(),
            total_mass = manifest.total_mass,
            "return manifest built"
        );
        self.record(
            NewLogEntry::new(ActionType::ReturnPlan)
                .by(request.user_id)
                .details(json!({
                    "undockingContainerId": manifest.undocking_container_id,
                    "undockingDate": manifest.undocking_date,
                    "items": manifest.item_ids().collect::<Vec<_>>(),
                    "totalMass": manifest.total_mass,
                    "totalVolume": manifest.total_volume,
                })),
        );
        Ok(ReturnPlanResponse {
            success: true,
            return_plan: manifest.return_plan.clone(),
            retrieval_steps: manifest.retrieval_steps.clone(),
            return_manifest: manifest,
        })
    }

    #[instrument(skip(self, request), fields(undocking = %request.undocking_container_id))]
    pub fn complete_undocking(&self, request: UndockingRequest) -> DomainResult<UndockingResponse> {
        let _sim = self.sim_read()?;
        let undocking = &request.undocking_container_id;

        let mut completed = None;
        for _ in 0..LOCK_ATTEMPTS {
            let involved = undocking_containers(&*self.read_store()?, undocking)?;
            let locks = self.locks.handles(&involved)?;
            let _guards = locks.lock()?;

            let mut store = self.write_store()?;
            if !undocking_containers(&store, undocking)?.is_subset(&involved) {
                debug!(container = %undocking, "manifest changed before lock, retrying");
                continue;
            }
            completed = Some(returns::complete_undocking(&mut store, undocking)?);
            break;
        }
        let report = completed.ok_or_else(|| {
            DomainError::conflict(format!("manifest for {undocking} kept changing during undocking"))
        })?;

        info!(
            items_removed = report.items_removed,
            total_mass = report.total_mass,
            "undocking completed"
        );
        for item_id in &report.removed {
            self.record(
                NewLogEntry::new(ActionType::Disposal)
                    .by(request.user_id.clone())
                    .item(item_id.clone())
                    .at(request.timestamp)
                    .details(json!({ "undockingContainerId": undocking })),
            );
        }
        self.record(
            NewLogEntry::new(ActionType::Undocking)
                .by(request.user_id.clone())
                .at(request.timestamp)
                .details(json!({
                    "undockingContainerId": undocking,
                    "itemsRemoved": report.items_removed,
                    "totalMass": report.total_mass,
                })),
        );
        Ok(UndockingResponse {
            success: true,
            items_removed: report.items_removed,
        })
    }

    // ---- ledger ----

    pub fn logs(&self, request: LogsRequest) -> DomainResult<LogsResponse> {
        request.validate()?;
        let logs = self.ledger.query(request.into()).to_vec();
        Ok(LogsResponse { logs })
    }

    // ---- interchange ----

    /// Import items. Exported rows keep their counters and status; a row
    /// that clashes with an item already in play is reported and skipped.
    #[instrument(skip(self, input, user_id))]
    pub fn import_items<R: Read>(
        &self,
        input: R,
        user_id: Option<UserId>,
    ) -> Result<ImportReport, InterchangeError> {
        let parsed = interchange::read_items(input)?;
        let _sim = self.sim_read()?;
        let mut report = ImportReport {
            imported: 0,
            errors: parsed.errors,
        };
        // Waste records are numbered in the order they are restored, so the
        // oldest must go in first.
        let mut rows = parsed.rows;
        rows.sort_by_key(|(_, r)| r.waste_recorded_at);
        {
            let mut store = self.write_store()?;
            let midnight = store.midnight();
            for (row, imported) in rows {
                let recorded_at = imported.waste_recorded_at.unwrap_or(midnight);
                match store.restore_item(imported.item, recorded_at) {
                    Ok(()) => report.imported += 1,
                    Err(err) => report.errors.push(RowError::new(row, err.to_string())),
                }
            }
        }
        report.errors.sort_by_key(|e| e.row);
        self.finish_import("items", user_id, &mut report);
        Ok(report)
    }

    #[instrument(skip(self, input, user_id))]
    pub fn import_containers<R: Read>(
        &self,
        input: R,
        user_id: Option<UserId>,
    ) -> Result<ImportReport, InterchangeError> {
        let parsed = interchange::read_containers(input)?;
        let _sim = self.sim_read()?;
        let locks = self
            .locks
            .handles(parsed.rows.iter().map(|(_, spec)| &spec.container_id))?;
        let _guards = locks.lock()?;
        let mut report = ImportReport {
            imported: 0,
            errors: parsed.errors,
        };
        {
            let mut store = self.write_store()?;
            for (row, spec) in parsed.rows {
                match store.register_container(spec) {
                    Ok(()) => report.imported += 1,
                    Err(err) => report.errors.push(RowError::new(row, err.to_string())),
                }
            }
        }
        self.finish_import("containers", user_id, &mut report);
        Ok(report)
    }

    /// Import an arrangement: each row re-creates one claim. Items and
    /// containers must already be imported.
    #[instrument(skip(self, input, user_id))]
    pub fn import_arrangement<R: Read>(
        &self,
        input: R,
        user_id: Option<UserId>,
    ) -> Result<ImportReport, InterchangeError> {
        let parsed = interchange::read_arrangement(input)?;
        let _sim = self.sim_read()?;
        let locks = self
            .locks
            .handles(parsed.rows.iter().map(|(_, row)| &row.container_id))?;
        let _guards = locks.lock()?;
        let mut report = ImportReport {
            imported: 0,
            errors: parsed.errors,
        };
        {
            let mut store = self.write_store()?;
            for (row, entry) in parsed.rows {
                match store.restore_claim(&entry.item_id, &entry.container_id, entry.position) {
                    Ok(()) => report.imported += 1,
                    Err(err) => report.errors.push(RowError::new(row, err.to_string())),
                }
            }
        }
        self.finish_import("arrangement", user_id, &mut report);
        Ok(report)
    }

    fn finish_import(&self, kind: &str, user_id: Option<UserId>, report: &mut ImportReport) {
        report.errors.sort_by_key(|e| e.row);
        if report.is_clean() {
            info!(kind, imported = report.imported, "import finished");
        } else {
            warn!(
                kind,
                imported = report.imported,
                rejected = report.errors.len(),
                "import finished with rejected rows"
            );
        }
        self.record(NewLogEntry::new(ActionType::Import).by(user_id).details(json!({
            "kind": kind,
            "imported": report.imported,
            "rejected": report.errors.len(),
        })));
    }

    pub fn export_items<W: Write>(&self, output: W) -> Result<(), InterchangeError> {
        let _sim = self.sim_read()?;
        let store = self.read_store()?;
        let mut rows: Vec<_> = store
            .items()
            .map(|item| {
                let waste = store.waste_record(item.id()).map(|r| (r.created_at, r.sequence));
                (item, waste)
            })
            .collect();
        rows.sort_by_key(|(_, waste)| *waste);
        let rows = rows
            .into_iter()
            .map(|(item, waste)| (item, waste.map(|(at, _)| at)));
        interchange::write_items(output, rows)
    }

    pub fn export_containers<W: Write>(&self, output: W) -> Result<(), InterchangeError> {
        let _sim = self.sim_read()?;
        let store = self.read_store()?;
        interchange::write_containers(output, store.containers())
    }

    pub fn export_arrangement<W: Write>(&self, output: W) -> Result<(), InterchangeError> {
        let _sim = self.sim_read()?;
        let store = self.read_store()?;
        interchange::write_arrangement(output, store.containers())
    }

    // ---- plumbing ----

    fn record(&self, entry: NewLogEntry) {
        let action = entry.action_type;
        if let Err(err) = self.ledger.append(entry) {
            warn!(action = action.as_str(), error = %err, "audit ledger rejected entry");
        }
    }

    fn sim_read(&self) -> DomainResult<RwLockReadGuard<'_, ()>> {
        self.simulation.read().map_err(poisoned)
    }

    fn sim_write(&self) -> DomainResult<RwLockWriteGuard<'_, ()>> {
        self.simulation.write().map_err(poisoned)
    }

    fn read_store(&self) -> DomainResult<RwLockReadGuard<'_, CargoStore>> {
        self.store.read().map_err(poisoned)
    }

    fn write_store(&self) -> DomainResult<RwLockWriteGuard<'_, CargoStore>> {
        self.store.write().map_err(poisoned)
    }
}

fn poisoned<T>(_: PoisonError<T>) -> DomainError {
    DomainError::conflict("cargo state lock poisoned")
}

/// The undocking module plus every container holding an item of its active
/// manifest.
fn undocking_containers(
    store: &CargoStore,
    undocking: &ContainerId,
) -> DomainResult<BTreeSet<ContainerId>> {
    let manifest = store
        .manifest(undocking)
        .ok_or_else(|| DomainError::NoActiveManifest(undocking.clone()))?;
    let mut involved: BTreeSet<ContainerId> = manifest
        .item_ids()
        .filter_map(|id| store.claim_location(id).map(|(cid, _)| cid.clone()))
        .collect();
    involved.insert(undocking.clone());
    Ok(involved)
}
