use serde::{Deserialize, Serialize};

use crate::{City, CityId, CityMapPos, RequestId, SpecialistType};

/// All client→server city labor requests. Fully serializable.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientPacket {
    /// Put a citizen on an empty tile, or take the worker off a worked one.
    CityToggleWorker { city: CityId, pos: CityMapPos },
    /// Move one citizen between specialist roles.
    CityChangeSpecialist {
        city: CityId,
        from: SpecialistType,
        to: SpecialistType,
    },
    /// Ask the server to recompute the city and resend it.
    CityRefresh { city: CityId },
}

impl ClientPacket {
    pub fn city(&self) -> CityId {
        match self {
            ClientPacket::CityToggleWorker { city, .. }
            | ClientPacket::CityChangeSpecialist { city, .. }
            | ClientPacket::CityRefresh { city } => *city,
        }
    }
}

/// A client packet tagged with the id the server acknowledges it under.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub id: RequestId,
    pub packet: ClientPacket,
}

/// All server→client packets relevant to city labor. Fully serializable.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerPacket {
    /// The server began handling a request.
    ProcessingStarted { request: RequestId },
    /// Every effect of the request has been sent.
    ProcessingFinished { request: RequestId },
    /// Full, authoritative state of one city.
    CityInfo { city: City },
    /// The city no longer exists or is no longer visible.
    CityRemove { city: CityId },
    TurnStarted { turn: u32 },
}
