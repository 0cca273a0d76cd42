use serde::{Deserialize, Serialize};

/// City identifier as assigned by the server.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CityId(pub u32);

impl std::fmt::Display for CityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Player ID is a simple index (max 16 players)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub u8);

/// Per-connection request identifier. Zero means "no request".
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RequestId(pub u32);

impl RequestId {
    pub const NONE: RequestId = RequestId(0);

    #[inline]
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn next(self) -> Self {
        RequestId(self.0.wrapping_add(1))
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Inclusive, contiguous range of request ids issued by one batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestRange {
    pub first: RequestId,
    pub last: RequestId,
}

impl RequestRange {
    pub const fn single(id: RequestId) -> Self {
        Self { first: id, last: id }
    }

    pub fn contains(&self, id: RequestId) -> bool {
        self.first <= id && id <= self.last
    }

    /// Extend with a freshly issued id, starting the range if it was empty.
    pub fn push(range: &mut Option<RequestRange>, id: RequestId) {
        match range {
            Some(r) => r.last = id,
            None => *range = Some(RequestRange::single(id)),
        }
    }
}
