use serde::{Deserialize, Serialize};

pub const OUTPUT_COUNT: usize = 6;
pub const SPECIALIST_COUNT: usize = 3;

/// Per-output-category values, indexed by [`OutputType::index`].
pub type OutputArray<T> = [T; OUTPUT_COUNT];

/// Per-specialist-category values, indexed by [`SpecialistType::index`].
pub type SpecialistArray<T> = [T; SPECIALIST_COUNT];

/// City output categories. The declaration order is the persisted order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OutputType {
    Food,
    Shield,
    Trade,
    Gold,
    Luxury,
    Science,
}

impl OutputType {
    pub const ALL: [OutputType; OUTPUT_COUNT] = [
        OutputType::Food,
        OutputType::Shield,
        OutputType::Trade,
        OutputType::Gold,
        OutputType::Luxury,
        OutputType::Science,
    ];

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn name(self) -> &'static str {
        match self {
            OutputType::Food => "food",
            OutputType::Shield => "shield",
            OutputType::Trade => "trade",
            OutputType::Gold => "gold",
            OutputType::Luxury => "luxury",
            OutputType::Science => "science",
        }
    }
}

/// Specialist roles for citizens that do not work a tile.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SpecialistType {
    Entertainer,
    Taxman,
    Scientist,
}

impl SpecialistType {
    /// Role a citizen falls back to when taken off a tile.
    pub const DEFAULT: SpecialistType = SpecialistType::Entertainer;

    pub const ALL: [SpecialistType; SPECIALIST_COUNT] = [
        SpecialistType::Entertainer,
        SpecialistType::Taxman,
        SpecialistType::Scientist,
    ];

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    #[inline]
    pub fn is_default(self) -> bool {
        self == Self::DEFAULT
    }

    /// Every category except the default one, in declaration order.
    pub fn non_default() -> impl Iterator<Item = SpecialistType> {
        Self::ALL.into_iter().filter(|sp| !sp.is_default())
    }

    pub const fn name(self) -> &'static str {
        match self {
            SpecialistType::Entertainer => "entertainer",
            SpecialistType::Taxman => "taxman",
            SpecialistType::Scientist => "scientist",
        }
    }
}

/// Labor state of one position of the city map.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TileState {
    /// Workable, nobody assigned.
    #[default]
    Empty,
    /// A citizen works the tile.
    Worker,
    /// Outside the map, enemy territory or worked by another city.
    Unavailable,
}
