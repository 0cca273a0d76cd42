//! Agent registration and event dispatch.
//!
//! Hosts queue city lifecycle events as packets arrive; the registry drains
//! the queue after each handler returns, so an agent never sees an event
//! while it is still handling another one.

use std::any::Any;

use cma_protocol::CityId;
use tracing::{debug, trace};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AgentEvent {
    CityCreated(CityId),
    CityChanged(CityId),
    CityRemoved(CityId),
    TurnStarted,
}

/// A client-side automation reacting to city lifecycle events.
pub trait Agent<H: ?Sized>: Any {
    fn name(&self) -> &'static str;

    /// Lower levels are notified first.
    fn level(&self) -> u8 {
        1
    }

    fn on_city_changed(&mut self, _host: &mut H, _city: CityId) {}

    fn on_city_created(&mut self, host: &mut H, city: CityId) {
        self.on_city_changed(host, city);
    }

    fn on_city_removed(&mut self, _host: &mut H, _city: CityId) {}

    fn on_turn_started(&mut self, _host: &mut H) {}

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Source of queued lifecycle events.
pub trait EventSource {
    /// Everything queued since the last call, oldest first.
    fn take_events(&mut self) -> Vec<AgentEvent>;
}

pub struct AgentRegistry<H: ?Sized + 'static> {
    agents: Vec<Box<dyn Agent<H>>>,
}

impl<H: ?Sized + 'static> Default for AgentRegistry<H> {
    fn default() -> Self {
        Self { agents: Vec::new() }
    }
}

impl<H: EventSource + ?Sized + 'static> AgentRegistry<H> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, agent: Box<dyn Agent<H>>) {
        debug!(agent = agent.name(), level = agent.level(), "registering agent");
        let at = self
            .agents
            .partition_point(|other| other.level() <= agent.level());
        self.agents.insert(at, agent);
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// The registered agent of type `A`.
    pub fn get_mut<A: Agent<H>>(&mut self) -> Option<&mut A> {
        self.agents
            .iter_mut()
            .find_map(|agent| agent.as_any_mut().downcast_mut::<A>())
    }

    /// Deliver queued events until the host has nothing more to report.
    ///
    /// Returns how many events were delivered.
    pub fn process(&mut self, host: &mut H) -> usize {
        let mut delivered = 0;
        loop {
            let mut events = host.take_events();
            if events.is_empty() {
                return delivered;
            }
            coalesce(&mut events);
            for event in events {
                self.dispatch(host, event);
                delivered += 1;
            }
        }
    }

    /// Notify one agent, by name, that a city changed.
    pub fn cause_city_changed(&mut self, host: &mut H, name: &str, city: CityId) {
        for agent in self.agents.iter_mut().filter(|a| a.name() == name) {
            agent.on_city_changed(host, city);
        }
    }

    fn dispatch(&mut self, host: &mut H, event: AgentEvent) {
        trace!(?event, "dispatch");
        for agent in &mut self.agents {
            match event {
                AgentEvent::CityCreated(city) => agent.on_city_created(host, city),
                AgentEvent::CityChanged(city) => agent.on_city_changed(host, city),
                AgentEvent::CityRemoved(city) => agent.on_city_removed(host, city),
                AgentEvent::TurnStarted => agent.on_turn_started(host),
            }
        }
    }
}

/// Drop repeated change notices for a city that has a later one pending.
fn coalesce(events: &mut Vec<AgentEvent>) {
    let mut kept: Vec<AgentEvent> = Vec::with_capacity(events.len());
    for (i, event) in events.iter().enumerate() {
        if let AgentEvent::CityChanged(city) = event {
            let later = events[i + 1..].iter().any(|e| {
                matches!(e, AgentEvent::CityChanged(c) | AgentEvent::CityRemoved(c) if c == city)
            });
            if later {
                continue;
            }
        }
        kept.push(*event);
    }
    *events = kept;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Queue {
        pending: Vec<AgentEvent>,
        log: Vec<String>,
    }

    impl EventSource for Queue {
        fn take_events(&mut self) -> Vec<AgentEvent> {
            std::mem::take(&mut self.pending)
        }
    }

    struct Recorder {
        name: &'static str,
        level: u8,
        /// Queue a change for this city when it is first created.
        echo: Option<CityId>,
        seen: u32,
    }

    impl Agent<Queue> for Recorder {
        fn name(&self) -> &'static str {
            self.name
        }

        fn level(&self) -> u8 {
            self.level
        }

        fn on_city_changed(&mut self, host: &mut Queue, city: CityId) {
            self.seen += 1;
            host.log.push(format!("{} changed {city}", self.name));
        }

        fn on_city_created(&mut self, host: &mut Queue, city: CityId) {
            host.log.push(format!("{} created {city}", self.name));
            if self.echo == Some(city) {
                host.pending.push(AgentEvent::CityChanged(city));
            }
        }

        fn on_city_removed(&mut self, host: &mut Queue, city: CityId) {
            host.log.push(format!("{} removed {city}", self.name));
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    fn recorder(name: &'static str, level: u8) -> Box<Recorder> {
        Box::new(Recorder {
            name,
            level,
            echo: None,
            seen: 0,
        })
    }

    #[test]
    fn lower_levels_are_notified_first() {
        let mut registry = AgentRegistry::new();
        registry.register(recorder("late", 2));
        registry.register(recorder("early", 0));

        let mut host = Queue::default();
        host.pending.push(AgentEvent::CityRemoved(CityId(4)));
        registry.process(&mut host);

        assert_eq!(host.log, vec!["early removed #4", "late removed #4"]);
    }

    #[test]
    fn events_raised_while_handling_are_delivered_afterwards() {
        let mut registry = AgentRegistry::new();
        let mut agent = recorder("a", 1);
        agent.echo = Some(CityId(1));
        registry.register(agent);

        let mut host = Queue::default();
        host.pending.push(AgentEvent::CityCreated(CityId(1)));
        let delivered = registry.process(&mut host);

        assert_eq!(delivered, 2);
        assert_eq!(host.log, vec!["a created #1", "a changed #1"]);
    }

    #[test]
    fn repeated_changes_are_coalesced() {
        let mut registry = AgentRegistry::new();
        registry.register(recorder("a", 1));

        let mut host = Queue::default();
        host.pending.extend([
            AgentEvent::CityChanged(CityId(1)),
            AgentEvent::CityChanged(CityId(2)),
            AgentEvent::CityChanged(CityId(1)),
        ]);
        registry.process(&mut host);

        assert_eq!(host.log, vec!["a changed #2", "a changed #1"]);
        assert_eq!(registry.get_mut::<Recorder>().map(|r| r.seen), Some(2));
    }

    #[test]
    fn cause_city_changed_targets_one_agent() {
        let mut registry = AgentRegistry::new();
        registry.register(recorder("a", 1));
        registry.register(recorder("b", 1));

        let mut host = Queue::default();
        registry.cause_city_changed(&mut host, "b", CityId(9));
        assert_eq!(host.log, vec!["b changed #9"]);
    }
}
