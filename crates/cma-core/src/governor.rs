//! The citizen governor: per-city optimize, apply and verify cycles.

use cma_protocol::CityId;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::agents::Agent;
use crate::apply::ApplyOutcome;
use crate::codec::{decode_parameter, encode_parameter};
use crate::config::{CorruptParameterPolicy, GovernorConfig};
use crate::host::{AgentHost, AttributeStore, CityAttribute, NoticeKind, Oracle, WaitError};
use crate::parameter::Parameter;
use crate::result::CmResult;
use crate::stats::ApplyStats;

/// Name the governor registers under.
pub const GOVERNOR_AGENT_NAME: &str = "CMA";

/// Phase of one reconciliation cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum CycleState {
    Idle,
    Optimizing,
    AwaitingApply,
    Converged,
    Abandoned,
}

/// Why a city does not qualify for governing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Ineligible {
    NoCity,
    NotUnderAgent,
    /// Owned by someone else; control was released.
    ForeignOwner,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AbandonReason {
    NotEligible(Ineligible),
    /// The city stopped qualifying while an apply was in flight.
    EligibilityLost,
    Infeasible,
    RetriesExhausted,
    Stalled(WaitError),
}

/// What one call to [`Governor::handle_city`] did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CycleReport {
    pub city: CityId,
    /// Optimize/apply attempts started.
    pub attempts: u32,
    pub state: CycleState,
    pub reason: Option<AbandonReason>,
    /// Every state entered, starting with `Idle`.
    pub trace: Vec<CycleState>,
}

impl CycleReport {
    fn new(city: CityId) -> Self {
        Self {
            city,
            attempts: 0,
            state: CycleState::Idle,
            reason: None,
            trace: vec![CycleState::Idle],
        }
    }

    fn enter(&mut self, state: CycleState) {
        self.state = state;
        self.trace.push(state);
    }

    fn converged(mut self) -> Self {
        self.enter(CycleState::Converged);
        self
    }

    fn abandon(mut self, reason: AbandonReason) -> Self {
        self.enter(CycleState::Abandoned);
        self.reason = Some(reason);
        self
    }
}

/// Running totals of cycle endings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CycleTally {
    pub cycles: u32,
    pub idle: u32,
    pub converged: u32,
    pub infeasible: u32,
    pub exhausted: u32,
    pub stalled: u32,
    pub released: u32,
}

impl CycleTally {
    fn record(&mut self, report: &CycleReport) {
        self.cycles += 1;
        match (&report.state, &report.reason) {
            (CycleState::Converged, _) => self.converged += 1,
            (_, Some(AbandonReason::Infeasible)) => self.infeasible += 1,
            (_, Some(AbandonReason::RetriesExhausted)) => self.exhausted += 1,
            (_, Some(AbandonReason::Stalled(_))) => self.stalled += 1,
            (_, Some(_)) => self.released += 1,
            (_, None) => self.idle += 1,
        }
    }
}

/// Which eligibility rule applies after an apply wait.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ControlMode {
    /// The city must still be governed.
    Agent,
    /// One-shot apply for a city the player controls.
    Direct,
}

/// The city management agent.
pub struct Governor<O> {
    pub(crate) oracle: O,
    pub(crate) config: GovernorConfig,
    pub(crate) stats: ApplyStats,
    tally: CycleTally,
}

impl<O: Oracle> Governor<O> {
    pub fn new(oracle: O, config: GovernorConfig) -> Self {
        Self {
            oracle,
            config,
            stats: ApplyStats::new(),
            tally: CycleTally::default(),
        }
    }

    /// Reset statistics, as at client start.
    pub fn init(&mut self) {
        self.stats.reset();
        self.tally = CycleTally::default();
    }

    pub fn config(&self) -> &GovernorConfig {
        &self.config
    }

    pub fn stats(&self) -> &ApplyStats {
        &self.stats
    }

    pub fn tally(&self) -> &CycleTally {
        &self.tally
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    pub fn oracle_mut(&mut self) -> &mut O {
        &mut self.oracle
    }

    /// Stored goal of a city, if it is governed.
    pub fn is_city_under_agent<H: AttributeStore + ?Sized>(
        &self,
        host: &H,
        city: CityId,
    ) -> Option<Parameter> {
        let decoded = decode_parameter(host.get_attribute(CityAttribute::CmaParameter, city)?);
        match decoded {
            Ok(parameter) => Some(parameter),
            Err(err) => match self.config.corrupt_parameter {
                CorruptParameterPolicy::Fault => {
                    panic!("stored governor parameter of city {city} is corrupt: {err}")
                }
                CorruptParameterPolicy::Discard => {
                    warn!(%city, "ignoring corrupt governor parameter: {err}");
                    None
                }
            },
        }
    }

    /// Store `parameter` for a city of ours and start governing it.
    ///
    /// Panics if the city is unknown or foreign.
    pub fn put_city_under_agent<H: AgentHost + ?Sized>(
        &mut self,
        host: &mut H,
        city: CityId,
        parameter: &Parameter,
    ) -> CycleReport {
        let owner = host.city(city).map(|c| c.owner);
        assert_eq!(
            owner,
            Some(host.local_player()),
            "city {city} is not ours to govern"
        );

        info!(%city, "putting city under agent");
        host.set_attribute(CityAttribute::CmaParameter, city, &encode_parameter(parameter));
        self.city_changed(host, city)
    }

    /// Stop governing a city and give it back to the player.
    pub fn release_city<H: AgentHost + ?Sized>(&self, host: &mut H, city: CityId) {
        info!(%city, "releasing city");
        host.remove_attribute(CityAttribute::CmaParameter, city);
        host.refresh_city_dialog(city);
    }

    /// One-shot apply for a city the player controls.
    ///
    /// An invalid result is a no-op. Panics if the city is governed.
    pub fn apply_result<H: AgentHost + ?Sized>(
        &mut self,
        host: &mut H,
        city: CityId,
        result: &CmResult,
    ) -> ApplyOutcome {
        assert!(
            self.is_city_under_agent(&*host, city).is_none(),
            "city {city} is under the agent"
        );
        if !result.found_a_valid {
            return ApplyOutcome::Unchanged;
        }
        self.apply_result_on_server(host, city, result, ControlMode::Direct)
    }

    /// The goal of `city` if it may be governed right now.
    fn check_city<H: AgentHost + ?Sized>(
        &self,
        host: &mut H,
        id: CityId,
    ) -> Result<Parameter, Ineligible> {
        let owner = host.city(id).ok_or(Ineligible::NoCity)?.owner;
        let parameter = self
            .is_city_under_agent(&*host, id)
            .ok_or(Ineligible::NotUnderAgent)?;

        if owner != host.local_player() {
            self.release_city(host, id);
            return Err(Ineligible::ForeignOwner);
        }
        Ok(parameter)
    }

    pub(crate) fn still_eligible<H: AgentHost + ?Sized>(
        &self,
        host: &mut H,
        id: CityId,
        mode: ControlMode,
    ) -> bool {
        match mode {
            ControlMode::Agent => self.check_city(host, id).is_ok(),
            ControlMode::Direct => {
                let local = host.local_player();
                host.city(id).is_some_and(|c| c.owner == local)
            }
        }
    }

    fn city_changed<H: AgentHost + ?Sized>(&mut self, host: &mut H, city: CityId) -> CycleReport {
        self.oracle.clear_cache(city);
        self.handle_city(host, city)
    }

    /// Run optimize/apply attempts for a city until it matches the oracle's
    /// answer, the goal turns out infeasible, or the attempts run out.
    pub fn handle_city<H: AgentHost + ?Sized>(&mut self, host: &mut H, id: CityId) -> CycleReport {
        let report = self.run_cycle(host, id);
        self.tally.record(&report);
        debug!(city = %id, state = ?report.state, attempts = report.attempts, "END handle city");
        report
    }

    fn run_cycle<H: AgentHost + ?Sized>(&mut self, host: &mut H, id: CityId) -> CycleReport {
        debug!(city = %id, "START handle city");
        let mut report = CycleReport::new(id);

        // A city is always tried at least once, whatever the config says.
        for attempt in 0..self.config.max_attempts.max(1) {
            debug!(city = %id, attempt, "try");

            let parameter = match self.check_city(host, id) {
                Ok(parameter) => parameter,
                Err(Ineligible::ForeignOwner) => {
                    return report.abandon(AbandonReason::NotEligible(Ineligible::ForeignOwner))
                }
                Err(reason) if attempt == 0 => {
                    debug!(city = %id, ?reason, "not governed");
                    return report;
                }
                Err(reason) => return report.abandon(AbandonReason::NotEligible(reason)),
            };

            report.attempts += 1;
            report.enter(CycleState::Optimizing);
            let Some(city) = host.city(id) else {
                return report.abandon(AbandonReason::NotEligible(Ineligible::NoCity));
            };
            let name = city.name.clone();
            let result = self.oracle.query_result(city, &parameter);

            if !result.found_a_valid {
                debug!(city = %id, "no valid result found");
                self.release_city(host, id);
                host.notify(
                    id,
                    NoticeKind::Infeasible,
                    format!(
                        "The citizen governor can't fulfill the requirements for {name}. \
                         Passing back control."
                    ),
                );
                return report.abandon(AbandonReason::Infeasible);
            }

            report.enter(CycleState::AwaitingApply);
            match self.apply_result_on_server(host, id, &result, ControlMode::Agent) {
                ApplyOutcome::Unchanged | ApplyOutcome::Converged => {
                    debug!(city = %id, "ok");
                    return report.converged();
                }
                ApplyOutcome::CityLost => {
                    return report.abandon(AbandonReason::EligibilityLost);
                }
                ApplyOutcome::Stalled(err) => {
                    return report.abandon(AbandonReason::Stalled(err));
                }
                ApplyOutcome::Diverged => {
                    debug!(city = %id, "doesn't cleanly apply");
                    if attempt == 0 && self.check_city(host, id).is_ok() {
                        host.notify(id, NoticeKind::Confused, confused_message(&name));
                    }
                }
            }
        }

        let name = host
            .city(id)
            .map_or_else(|| id.to_string(), |city| city.name.clone());
        host.notify(id, NoticeKind::Confused, confused_message(&name));
        self.release_city(host, id);

        error!(
            city = %id,
            "{name} has changed multiple times. This may be an error in the client or bad luck. \
             The governor will detach itself from the city now."
        );
        error!("Please report this message together with the log.");

        report.abandon(AbandonReason::RetriesExhausted)
    }
}

fn confused_message(name: &str) -> String {
    format!("The citizen governor has gotten confused dealing with {name}. You may want to have a look.")
}

impl<H, O> Agent<H> for Governor<O>
where
    H: AgentHost + ?Sized,
    O: Oracle + 'static,
{
    fn name(&self) -> &'static str {
        GOVERNOR_AGENT_NAME
    }

    fn on_city_changed(&mut self, host: &mut H, city: CityId) {
        if host.city(city).is_some() {
            self.city_changed(host, city);
        }
    }

    fn on_city_removed(&mut self, host: &mut H, city: CityId) {
        host.remove_attribute(CityAttribute::CmaParameter, city);
    }

    fn on_turn_started(&mut self, _host: &mut H) {
        if self.config.show_time_stats {
            info!("governor: {}", self.stats.report());
        }
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use cma_protocol::{OutputType, PlayerId};
    use cma_server::RequestPolicy;

    use super::*;
    use crate::test_support::{FakeHost, LossOnWait, ScriptedOracle};

    fn governor() -> Governor<ScriptedOracle> {
        Governor::new(ScriptedOracle::default(), GovernorConfig::default())
    }

    #[test]
    fn reachable_target_converges_in_one_attempt() {
        let mut host = FakeHost::new();
        let city = host.found_city("Alpha", 4);
        let mut governor = governor();
        governor
            .oracle_mut()
            .push(host.evaluated_target(city, &[1, 2], [1, 0, 1]));

        let report = governor.put_city_under_agent(&mut host, city, &Parameter::default());

        assert_eq!(report.state, CycleState::Converged);
        assert_eq!(report.attempts, 1);
        assert_eq!(
            report.trace,
            vec![
                CycleState::Idle,
                CycleState::Optimizing,
                CycleState::AwaitingApply,
                CycleState::Converged
            ]
        );
        assert!(host.notices.is_empty());
        assert!(governor.is_city_under_agent(&host, city).is_some());
    }

    #[test]
    fn infeasible_goal_releases_once_without_applying() {
        let mut host = FakeHost::new();
        let city = host.found_city("Alpha", 3);
        let mut governor = governor();
        governor.oracle_mut().push(CmResult::invalid());

        let report = governor.put_city_under_agent(&mut host, city, &Parameter::default());

        assert_eq!(report.reason, Some(AbandonReason::Infeasible));
        assert_eq!(report.attempts, 1);
        assert_eq!(host.releases(city), 1);
        assert_eq!(host.requests_sent(), 0);
        assert_eq!(host.notices.len(), 1);
        assert_eq!(host.notices[0].1, NoticeKind::Infeasible);
        assert!(governor.is_city_under_agent(&host, city).is_none());
    }

    #[test]
    fn ignored_requests_exhaust_exactly_five_attempts() {
        let mut host = FakeHost::new();
        let city = host.found_city("Alpha", 3);
        host.set_request_policy(RequestPolicy::Ignore);
        let mut governor = governor();
        let target = host.evaluated_target(city, &[1], [2, 0, 0]);
        governor.oracle_mut().repeat(target);

        let report = governor.put_city_under_agent(&mut host, city, &Parameter::default());

        assert_eq!(report.state, CycleState::Abandoned);
        assert_eq!(report.reason, Some(AbandonReason::RetriesExhausted));
        assert_eq!(report.attempts, 5);
        assert_eq!(governor.oracle().queries, 5);
        assert_eq!(host.waits.len(), 5);
        assert_eq!(host.releases(city), 1);
        // Once after the first failure, once when giving up.
        let confused = host
            .notices
            .iter()
            .filter(|(_, kind, _)| *kind == NoticeKind::Confused)
            .count();
        assert_eq!(confused, 2);
        assert_eq!(governor.tally().exhausted, 1);
    }

    #[test]
    fn divergence_then_success_notifies_once() {
        let mut host = FakeHost::new();
        let city = host.found_city("Alpha", 2);
        let mut governor = governor();
        let mut wrong = host.evaluated_target(city, &[1], [1, 0, 0]);
        wrong.surplus[OutputType::Food.index()] += 1;
        governor.oracle_mut().push(wrong);
        governor
            .oracle_mut()
            .push(host.evaluated_target(city, &[1], [1, 0, 0]));

        let report = governor.put_city_under_agent(&mut host, city, &Parameter::default());

        assert_eq!(report.state, CycleState::Converged);
        assert_eq!(report.attempts, 2);
        assert_eq!(host.notices.len(), 1);
        assert_eq!(host.notices[0].1, NoticeKind::Confused);
        assert!(governor.oracle().cleared.len() >= 2);
    }

    #[test]
    fn foreign_city_is_released_silently() {
        let mut host = FakeHost::new();
        let city = host.found_city("Alpha", 2);
        let mut governor = governor();
        governor.put_city_under_agent(&mut host, city, &Parameter::default());
        host.transfer_city(city, PlayerId(3));

        let report = governor.handle_city(&mut host, city);

        assert_eq!(
            report.reason,
            Some(AbandonReason::NotEligible(Ineligible::ForeignOwner))
        );
        assert!(host.notices.is_empty());
        assert_eq!(host.releases(city), 1);
        assert_eq!(host.dialog_refreshes, vec![city]);
    }

    #[test]
    fn ungoverned_city_stays_idle() {
        let mut host = FakeHost::new();
        let city = host.found_city("Alpha", 2);
        let mut governor = governor();

        let report = governor.handle_city(&mut host, city);

        assert_eq!(report.state, CycleState::Idle);
        assert_eq!(report.attempts, 0);
        assert_eq!(governor.oracle().queries, 0);
    }

    #[test]
    fn stalled_apply_keeps_the_city_governed() {
        let mut host = FakeHost::new();
        let city = host.found_city("Alpha", 2);
        host.fail_wait = Some(WaitError::ConnectionLost);
        let mut governor = governor();
        governor
            .oracle_mut()
            .push(host.evaluated_target(city, &[1], [1, 0, 0]));

        let report = governor.put_city_under_agent(&mut host, city, &Parameter::default());

        assert_eq!(
            report.reason,
            Some(AbandonReason::Stalled(WaitError::ConnectionLost))
        );
        assert_eq!(report.attempts, 1);
        assert_eq!(host.releases(city), 0);
        assert!(governor.is_city_under_agent(&host, city).is_some());
    }

    #[test]
    #[should_panic(expected = "corrupt")]
    fn corrupt_parameter_is_a_fault_by_default() {
        let mut host = FakeHost::new();
        let city = host.found_city("Alpha", 2);
        host.set_attribute(CityAttribute::CmaParameter, city, &[2, 0, 0]);
        governor().handle_city(&mut host, city);
    }

    #[test]
    fn corrupt_parameter_can_be_discarded() {
        let mut host = FakeHost::new();
        let city = host.found_city("Alpha", 2);
        host.set_attribute(CityAttribute::CmaParameter, city, &[9; 29]);
        let config = GovernorConfig {
            corrupt_parameter: CorruptParameterPolicy::Discard,
            ..GovernorConfig::default()
        };
        let mut governor = Governor::new(ScriptedOracle::default(), config);

        let report = governor.handle_city(&mut host, city);
        assert_eq!(report.state, CycleState::Idle);
    }

    #[test]
    #[should_panic(expected = "under the agent")]
    fn direct_apply_on_governed_city_is_a_fault() {
        let mut host = FakeHost::new();
        let city = host.found_city("Alpha", 2);
        let mut governor = governor();
        governor.put_city_under_agent(&mut host, city, &Parameter::default());

        let target = host.evaluated_target(city, &[1], [1, 0, 0]);
        governor.apply_result(&mut host, city, &target);
    }

    #[test]
    fn direct_apply_of_invalid_result_does_nothing() {
        let mut host = FakeHost::new();
        let city = host.found_city("Alpha", 2);
        let mut governor = governor();

        let outcome = governor.apply_result(&mut host, city, &CmResult::invalid());
        assert_eq!(outcome, ApplyOutcome::Unchanged);
        assert_eq!(host.requests_sent(), 0);
    }

    #[test]
    #[should_panic(expected = "not ours")]
    fn governing_a_foreign_city_is_a_fault() {
        let mut host = FakeHost::new();
        let city = host.found_city("Alpha", 2);
        host.transfer_city(city, PlayerId(1));
        governor().put_city_under_agent(&mut host, city, &Parameter::default());
    }

    #[test]
    fn removed_city_loses_its_parameter() {
        let mut host = FakeHost::new();
        let city = host.found_city("Alpha", 2);
        let mut governor = governor();
        governor.put_city_under_agent(&mut host, city, &Parameter::default());

        Agent::<FakeHost>::on_city_removed(&mut governor, &mut host, city);
        assert!(governor.is_city_under_agent(&host, city).is_none());
    }

    #[test]
    fn city_transferred_during_apply_ends_quietly() {
        let mut host = FakeHost::new();
        let city = host.found_city("Alpha", 3);
        let mut governor = governor();
        governor
            .oracle_mut()
            .repeat(host.evaluated_target(city, &[1, 2], [1, 0, 0]));
        host.lose_on_wait = Some((city, LossOnWait::Transfer(PlayerId(2))));

        let report = governor.put_city_under_agent(&mut host, city, &Parameter::default());

        assert_eq!(report.reason, Some(AbandonReason::EligibilityLost));
        assert_eq!(report.attempts, 1);
        assert_eq!(host.waits.len(), 1);
        assert!(host.notices.is_empty());
        assert_eq!(host.releases(city), 1);
        assert!(governor.oracle().cleared.iter().all(|&c| c == city));
        assert_eq!(governor.oracle().queries, 1);
    }

    #[test]
    fn city_destroyed_during_apply_ends_quietly() {
        let mut host = FakeHost::new();
        let city = host.found_city("Alpha", 3);
        let mut governor = governor();
        governor
            .oracle_mut()
            .repeat(host.evaluated_target(city, &[1], [2, 0, 0]));
        host.lose_on_wait = Some((city, LossOnWait::Destroy));

        let report = governor.put_city_under_agent(&mut host, city, &Parameter::default());

        assert_eq!(report.reason, Some(AbandonReason::EligibilityLost));
        assert_eq!(report.attempts, 1);
        assert!(host.notices.is_empty());
        assert_eq!(governor.tally().released, 1);
    }

    #[test]
    fn zero_attempts_still_tries_once() {
        let mut host = FakeHost::new();
        let governed = host.found_city("Alpha", 2);
        let idle = host.found_city("Beta", 2);
        let config = GovernorConfig {
            max_attempts: 0,
            ..GovernorConfig::default()
        };
        let mut governor = Governor::new(ScriptedOracle::default(), config);

        let report = governor.handle_city(&mut host, idle);
        assert_eq!(report.state, CycleState::Idle);
        assert_eq!(host.releases(idle), 0);
        assert!(host.notices.is_empty());

        let report = governor.put_city_under_agent(&mut host, governed, &Parameter::default());
        assert_eq!(report.state, CycleState::Converged);
        assert_eq!(report.attempts, 1);
    }
}
