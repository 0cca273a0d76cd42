//! Diff-and-apply: move a server city onto a target assignment.
//!
//! Requests go out in four passes so that no citizen is ever needed before
//! it has been freed:
//! 1. take workers off tiles the target does not use
//! 2. turn surplus non-default specialists into default ones
//! 3. put workers on tiles the target uses
//! 4. turn default specialists into the missing non-default ones
//!
//! Every worker taken off a tile is assumed to become a default specialist.
//! A server that does otherwise is only caught by the final comparison.

use cma_protocol::{City, CityId, CityMapPos, RequestRange, SpecialistType, TileState};
use tracing::{debug, warn};

use crate::governor::{ControlMode, Governor};
use crate::host::{AgentHost, Oracle, WaitError};
use crate::result::{results_are_equal, CmResult};

/// One labor mutation, as sent to the server.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CityChange {
    RemoveWorker(CityMapPos),
    /// Convert one specialist of this role to the default role.
    ToDefault(SpecialistType),
    PlaceWorker(CityMapPos),
    /// Convert one default specialist to this role.
    FromDefault(SpecialistType),
}

/// Requests that turn the current assignment of `city` into `target`, in
/// the order they must be sent.
pub fn plan_changes(city: &City, target: &CmResult) -> Vec<CityChange> {
    let mut changes = Vec::new();

    for pos in CityMapPos::workable() {
        if city.is_worked(pos) && !target.is_worked(pos) {
            changes.push(CityChange::RemoveWorker(pos));
        }
    }

    for sp in SpecialistType::non_default() {
        let excess = city
            .specialist_count(sp)
            .saturating_sub(target.specialists[sp.index()]);
        changes.extend((0..excess).map(|_| CityChange::ToDefault(sp)));
    }

    for pos in CityMapPos::workable() {
        if target.is_worked(pos) && !city.is_worked(pos) {
            assert_eq!(
                city.tile_state(pos),
                TileState::Empty,
                "target for city {} works tile {pos} which is not free",
                city.id
            );
            changes.push(CityChange::PlaceWorker(pos));
        }
    }

    for sp in SpecialistType::non_default() {
        let deficit = target.specialists[sp.index()].saturating_sub(city.specialist_count(sp));
        changes.extend((0..deficit).map(|_| CityChange::FromDefault(sp)));
    }

    changes
}

/// How an apply call ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The city already matched; nothing was sent.
    Unchanged,
    /// Requests were processed and the city now matches.
    Converged,
    /// Requests were processed but the city does not match.
    Diverged,
    /// The city stopped qualifying while we waited.
    CityLost,
    /// The server never acknowledged the batch.
    Stalled(WaitError),
}

impl ApplyOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ApplyOutcome::Unchanged | ApplyOutcome::Converged)
    }
}

impl<O: Oracle> Governor<O> {
    /// Bring the server-side city `city_id` to `target` and verify it.
    pub(crate) fn apply_result_on_server<H: AgentHost + ?Sized>(
        &mut self,
        host: &mut H,
        city_id: CityId,
        target: &CmResult,
        mode: ControlMode,
    ) -> ApplyOutcome {
        assert!(target.found_a_valid, "applying an invalid result to {city_id}");

        let Some(city) = host.city(city_id).cloned() else {
            return ApplyOutcome::CityLost;
        };
        let current = CmResult::from_city(&city);

        if results_are_equal(&city, target, &current) && !self.config.always_apply {
            self.stats.apply_result_ignored += 1;
            return ApplyOutcome::Unchanged;
        }

        self.stats.apply_result_applied += 1;
        debug!(city = %city.id, name = %city.name, "apply_result");

        if city.size as u32 != target.population() {
            panic!(
                "target for city {} ({}) accounts for {} citizens at size {}\ncity:\n{}\ntarget:\n{}",
                city.name,
                city.id,
                target.population(),
                city.size,
                current,
                target
            );
        }

        host.buffer();

        let mut range: Option<RequestRange> = None;
        for change in plan_changes(&city, target) {
            debug!(city = %city.id, ?change, "sending");
            let id = match change {
                CityChange::RemoveWorker(pos) | CityChange::PlaceWorker(pos) => {
                    host.toggle_worker(city_id, pos)
                }
                CityChange::ToDefault(sp) => {
                    host.change_specialist(city_id, sp, SpecialistType::DEFAULT)
                }
                CityChange::FromDefault(sp) => {
                    host.change_specialist(city_id, SpecialistType::DEFAULT, sp)
                }
            };
            RequestRange::push(&mut range, id);
        }

        // Nothing to send although the results differ: client and server
        // disagree on the outcome of the same assignment. Resync.
        let range = match (range, self.config.always_apply) {
            (Some(range), false) => range,
            (range, _) => {
                let id = host.request_refresh(city_id);
                self.stats.refresh_forced += 1;
                range.map_or(RequestRange::single(id), |r| RequestRange { last: id, ..r })
            }
        };

        // Freeze while the batch is still buffered: no report may redraw on a
        // half-applied city once the first request leaves.
        host.freeze_reports_till(range.last);
        host.unbuffer();

        if let Err(err) = host.wait_for_requests(range, self.config.ack_timeout()) {
            warn!(city = %city_id, "giving up on apply: {err}");
            host.force_thaw_reports();
            return ApplyOutcome::Stalled(err);
        }

        if !self.still_eligible(host, city_id, mode) {
            return ApplyOutcome::CityLost;
        }

        let Some(city) = host.city(city_id) else {
            return ApplyOutcome::CityLost;
        };
        let current = CmResult::from_city(city);
        debug!(city = %city_id, "apply_result: return");

        if results_are_equal(city, target, &current) {
            return ApplyOutcome::Converged;
        }

        if self.config.show_apply_errors {
            warn!(city = %city_id, "apply diverged\nexpected:\n{target}\ngot:\n{current}");
        }
        self.oracle.clear_cache(city_id);
        ApplyOutcome::Diverged
    }
}
