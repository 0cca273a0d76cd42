use serde::{Deserialize, Serialize};

/// Work radius of a city, in hexes.
pub const CITY_RADIUS: i32 = 2;

/// Number of positions inside the work radius (center included).
pub const CITY_MAP_TILES: usize = 19;

/// Axial offset (q, r) relative to the city center. The implicit cube coordinate is `s = -q - r`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hex {
    pub q: i32,
    pub r: i32,
}

impl Hex {
    pub const ORIGIN: Hex = Hex { q: 0, r: 0 };

    pub const DIRECTIONS: [Hex; 6] = [
        Hex { q: 1, r: 0 },  // East
        Hex { q: 1, r: -1 }, // Northeast
        Hex { q: 0, r: -1 }, // Northwest
        Hex { q: -1, r: 0 }, // West
        Hex { q: -1, r: 1 }, // Southwest
        Hex { q: 0, r: 1 },  // Southeast
    ];

    #[inline]
    pub const fn s(self) -> i32 {
        -self.q - self.r
    }

    #[inline]
    pub fn distance(self, other: Hex) -> i32 {
        ((self.q - other.q).abs() + (self.r - other.r).abs() + (self.s() - other.s()).abs()) / 2
    }

    /// All hexes at exactly `radius` distance, in a deterministic ring order.
    pub fn ring(self, radius: i32) -> impl Iterator<Item = Hex> {
        RingIter::new(self, radius)
    }
}

impl std::ops::Add for Hex {
    type Output = Hex;

    fn add(self, other: Hex) -> Hex {
        Hex {
            q: self.q + other.q,
            r: self.r + other.r,
        }
    }
}

impl std::ops::Mul<i32> for Hex {
    type Output = Hex;

    fn mul(self, rhs: i32) -> Self::Output {
        Hex {
            q: self.q * rhs,
            r: self.r * rhs,
        }
    }
}

struct RingIter {
    radius: i32,
    side: usize,
    step: i32,
    current: Option<Hex>,
}

impl RingIter {
    fn new(center: Hex, radius: i32) -> Self {
        if radius <= 0 {
            return Self {
                radius,
                side: 0,
                step: 0,
                current: None,
            };
        }

        let start = center + Hex::DIRECTIONS[4] * radius;
        Self {
            radius,
            side: 0,
            step: 0,
            current: Some(start),
        }
    }
}

impl Iterator for RingIter {
    type Item = Hex;

    fn next(&mut self) -> Option<Self::Item> {
        let hex = self.current?;

        // Walk `radius` steps along each side, turning after the last one.
        self.current = Some(hex + Hex::DIRECTIONS[self.side]);
        self.step += 1;
        if self.step >= self.radius {
            self.step = 0;
            self.side += 1;
            if self.side >= 6 {
                self.current = None;
            }
        }
        Some(hex)
    }
}

/// Index of a position inside the city work radius.
///
/// `0` is the city center, `1..=6` the first ring and `7..=18` the second
/// ring, both in [`Hex::ring`] order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CityMapPos(pub u8);

impl CityMapPos {
    pub const CENTER: CityMapPos = CityMapPos(0);

    pub fn new(index: usize) -> Option<Self> {
        (index < CITY_MAP_TILES).then_some(CityMapPos(index as u8))
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// The center is always worked for free and never assigned a citizen.
    #[inline]
    pub const fn is_free_worked(self) -> bool {
        self.0 == 0
    }

    /// Every position of the work radius, center included.
    pub fn all() -> impl Iterator<Item = CityMapPos> {
        (0..CITY_MAP_TILES as u8).map(CityMapPos)
    }

    /// Positions a citizen can be assigned to (the free center excluded).
    pub fn workable() -> impl Iterator<Item = CityMapPos> {
        Self::all().filter(|pos| !pos.is_free_worked())
    }

    /// Offset of this position from the city center, `None` outside the
    /// work radius.
    pub fn offset(self) -> Option<Hex> {
        match self.0 {
            0 => Some(Hex::ORIGIN),
            1..=6 => Hex::ORIGIN.ring(1).nth((self.0 - 1) as usize),
            _ => Hex::ORIGIN.ring(2).nth((self.0 - 7) as usize),
        }
    }

    pub fn from_offset(offset: Hex) -> Option<Self> {
        Self::all().find(|pos| pos.offset() == Some(offset))
    }
}

impl std::fmt::Display for CityMapPos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.offset() {
            Some(hex) => write!(f, "({},{})", hex.q, hex.r),
            None => write!(f, "#{}", self.0),
        }
    }
}
