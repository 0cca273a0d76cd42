//! Collaborators the governor runs against.
//!
//! The client session implements all of these; tests use in-memory fakes.

use std::time::Duration;

use cma_protocol::{City, CityId, CityMapPos, PlayerId, RequestId, RequestRange, SpecialistType};
use serde::Serialize;
use thiserror::Error;

use crate::{CmResult, Parameter};

/// Read access to the client's copy of the game.
pub trait GameView {
    fn local_player(&self) -> PlayerId;

    /// Latest server-confirmed state of a city, if it is known.
    fn city(&self, id: CityId) -> Option<&City>;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WaitError {
    #[error("requests {}..={} not acknowledged within {waited:?}", .range.first, .range.last)]
    Timeout { range: RequestRange, waited: Duration },
    #[error("connection to the server lost")]
    ConnectionLost,
}

/// Request side of the connection to the authoritative server.
///
/// Every request returns the id it was sent under; ids only grow.
pub trait ServerLink {
    fn toggle_worker(&mut self, city: CityId, pos: CityMapPos) -> RequestId;

    fn change_specialist(
        &mut self,
        city: CityId,
        from: SpecialistType,
        to: SpecialistType,
    ) -> RequestId;

    fn request_refresh(&mut self, city: CityId) -> RequestId;

    /// Hold outgoing requests until [`ServerLink::unbuffer`].
    fn buffer(&mut self);

    /// Flush everything held since [`ServerLink::buffer`].
    fn unbuffer(&mut self);

    /// Block until the server processed every request in `range`.
    ///
    /// Packets arriving meanwhile are applied to the client state.
    fn wait_for_requests(&mut self, range: RequestRange, timeout: Duration)
        -> Result<(), WaitError>;
}

/// Keys of the per-city attribute store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CityAttribute {
    CmaParameter,
}

/// Opaque per-city blobs, saved with the game.
pub trait AttributeStore {
    fn get_attribute(&self, attr: CityAttribute, city: CityId) -> Option<&[u8]>;

    fn set_attribute(&mut self, attr: CityAttribute, city: CityId, data: &[u8]);

    fn remove_attribute(&mut self, attr: CityAttribute, city: CityId);
}

/// Player-visible governor messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum NoticeKind {
    /// The goal cannot be met; control goes back to the player.
    Infeasible,
    /// Applying a result did not produce the expected city.
    Confused,
}

/// Player-facing side effects.
pub trait Reports {
    /// Keep reports from redrawing until `request` has been processed.
    fn freeze_reports_till(&mut self, request: RequestId);

    fn force_thaw_reports(&mut self);

    fn notify(&mut self, city: CityId, kind: NoticeKind, message: String);

    fn refresh_city_dialog(&mut self, city: CityId);
}

/// Everything the governor needs from its environment.
pub trait AgentHost: GameView + ServerLink + AttributeStore + Reports {}

impl<T: GameView + ServerLink + AttributeStore + Reports + ?Sized> AgentHost for T {}

/// The combinatorial solver. Treated as a black box.
pub trait Oracle {
    /// Best assignment for `city` under `parameter`, or a result with
    /// `found_a_valid == false` when no assignment meets the goal.
    fn query_result(&mut self, city: &City, parameter: &Parameter) -> CmResult;

    /// Forget anything remembered about `city`.
    fn clear_cache(&mut self, city: CityId);
}
