use std::fmt;

use cma_protocol::{
    City, CityMapPos, OutputArray, OutputType, SpecialistArray, SpecialistType, CITY_MAP_TILES,
    OUTPUT_COUNT, SPECIALIST_COUNT,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A labor assignment for one city plus the statistics it produces.
///
/// Produced by the [`Oracle`](crate::Oracle) as a target, or read off a
/// city with [`CmResult::from_city`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CmResult {
    /// The assignment satisfies the goal it was computed for.
    pub found_a_valid: bool,
    pub disorder: bool,
    pub happy: bool,
    pub surplus: OutputArray<i32>,
    /// Indexed by [`CityMapPos::index`]. The center flag is never compared.
    pub worker_positions_used: [bool; CITY_MAP_TILES],
    pub specialists: SpecialistArray<u8>,
}

impl CmResult {
    /// The answer for a goal no assignment can meet.
    pub fn invalid() -> Self {
        Self {
            found_a_valid: false,
            disorder: false,
            happy: false,
            surplus: [0; OUTPUT_COUNT],
            worker_positions_used: [false; CITY_MAP_TILES],
            specialists: [0; SPECIALIST_COUNT],
        }
    }

    /// Snapshot the current, server-confirmed assignment of a city.
    ///
    /// Panics if workers and specialists do not add up to the city size.
    pub fn from_city(city: &City) -> Self {
        let mut result = Self::invalid();

        let mut workers = 0u32;
        for pos in CityMapPos::workable() {
            let worked = city.is_worked(pos);
            result.worker_positions_used[pos.index()] = worked;
            workers += worked as u32;
        }

        let mut specialists = 0u32;
        for sp in SpecialistType::ALL {
            result.specialists[sp.index()] = city.specialist_count(sp);
            specialists += city.specialist_count(sp) as u32;
        }

        assert_eq!(
            workers + specialists,
            city.size as u32,
            "city {} ({}) has {workers} workers and {specialists} specialists at size {}",
            city.name,
            city.id,
            city.size
        );

        result.found_a_valid = true;
        result.surplus = city.surplus;
        result.disorder = city.disorder;
        result.happy = city.happy;
        result
    }

    pub fn is_worked(&self, pos: CityMapPos) -> bool {
        self.worker_positions_used[pos.index()]
    }

    pub fn count_workers(&self) -> u32 {
        CityMapPos::workable()
            .filter(|&pos| self.is_worked(pos))
            .count() as u32
    }

    pub fn count_specialists(&self) -> u32 {
        self.specialists.iter().map(|&n| n as u32).sum()
    }

    /// Citizens this assignment accounts for.
    pub fn population(&self) -> u32 {
        self.count_workers() + self.count_specialists()
    }
}

/// Whether two results for `city` describe the same assignment and outcome.
///
/// Compares disorder, happiness, every specialist count, every surplus and
/// every worked flag except the free center.
pub fn results_are_equal(city: &City, result1: &CmResult, result2: &CmResult) -> bool {
    macro_rules! differs {
        ($field:ident) => {
            if result1.$field != result2.$field {
                debug!(city = %city.id, field = stringify!($field), "results differ");
                return false;
            }
        };
    }

    differs!(disorder);
    differs!(happy);
    differs!(specialists);
    differs!(surplus);

    for pos in CityMapPos::workable() {
        if result1.is_worked(pos) != result2.is_worked(pos) {
            debug!(city = %city.id, %pos, "results differ in worker_positions_used");
            return false;
        }
    }

    true
}

impl fmt::Display for CmResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "valid={} disorder={} happy={}",
            self.found_a_valid, self.disorder, self.happy
        )?;

        write!(f, "  workers ({}):", self.count_workers())?;
        for pos in CityMapPos::workable().filter(|&pos| self.is_worked(pos)) {
            write!(f, " {pos}")?;
        }
        writeln!(f)?;

        write!(f, "  specialists:")?;
        for sp in SpecialistType::ALL {
            write!(f, " {}={}", sp.name(), self.specialists[sp.index()])?;
        }
        writeln!(f)?;

        write!(f, "  surplus:")?;
        for output in OutputType::ALL {
            write!(f, " {}={:+}", output.name(), self.surplus[output.index()])?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use cma_protocol::{CityId, PlayerId, TileState};

    use super::*;

    fn city() -> City {
        let mut city = City::new(CityId(1), "Alpha", PlayerId(0));
        city.size = 4;
        city.tiles[2].state = TileState::Worker;
        city.tiles[11].state = TileState::Worker;
        city.specialists = [1, 0, 1];
        city.surplus = [2, 1, 3, 1, 2, 4];
        city
    }

    #[test]
    fn snapshot_reads_the_live_assignment() {
        let city = city();
        let result = CmResult::from_city(&city);
        assert!(result.found_a_valid);
        assert!(result.is_worked(CityMapPos(2)));
        assert!(result.is_worked(CityMapPos(11)));
        assert!(!result.is_worked(CityMapPos::CENTER));
        assert_eq!(result.specialists, [1, 0, 1]);
        assert_eq!(result.surplus, city.surplus);
        assert_eq!(result.population(), 4);
    }

    #[test]
    #[should_panic(expected = "workers")]
    fn snapshot_of_inconsistent_city_panics() {
        let mut city = city();
        city.size = 5;
        CmResult::from_city(&city);
    }

    #[test]
    fn snapshot_equals_itself() {
        let city = city();
        let a = CmResult::from_city(&city);
        let b = CmResult::from_city(&city);
        assert!(results_are_equal(&city, &a, &b));
    }

    #[test]
    fn any_single_difference_breaks_equality() {
        let city = city();
        let base = CmResult::from_city(&city);

        for pos in CityMapPos::workable() {
            let mut other = base.clone();
            other.worker_positions_used[pos.index()] ^= true;
            assert!(!results_are_equal(&city, &base, &other), "tile {pos}");
        }
        for sp in SpecialistType::ALL {
            let mut other = base.clone();
            other.specialists[sp.index()] += 1;
            assert!(!results_are_equal(&city, &base, &other));
        }
        for output in OutputType::ALL {
            let mut other = base.clone();
            other.surplus[output.index()] -= 1;
            assert!(!results_are_equal(&city, &base, &other));
        }

        let mut other = base.clone();
        other.disorder = true;
        assert!(!results_are_equal(&city, &base, &other));

        let mut other = base.clone();
        other.happy = true;
        assert!(!results_are_equal(&city, &base, &other));
    }

    #[test]
    fn center_flag_and_validity_are_not_compared() {
        let city = city();
        let base = CmResult::from_city(&city);
        let mut other = base.clone();
        other.worker_positions_used[CityMapPos::CENTER.index()] = true;
        other.found_a_valid = false;
        assert!(results_are_equal(&city, &base, &other));
    }

    #[test]
    fn display_lists_workers_and_surplus() {
        let text = CmResult::from_city(&city()).to_string();
        assert!(text.contains("workers (2)"));
        assert!(text.contains("scientist=1"));
        assert!(text.contains("food=+2"));
    }
}
