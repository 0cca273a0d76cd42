//! City output and happiness rules shared by the server authority and the
//! client-side optimizer.

use serde::{Deserialize, Serialize};

use crate::{
    City, CityMapPos, OutputArray, OutputType, SpecialistArray, SpecialistType, TileSnapshot,
    TileState, CITY_MAP_TILES, OUTPUT_COUNT,
};

/// Output a single specialist contributes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecialistYield {
    pub output: OutputType,
    pub amount: i32,
}

/// Trade split, in percent. Science receives the remainder.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxRates {
    pub gold: u8,
    pub luxury: u8,
}

impl Default for TaxRates {
    fn default() -> Self {
        Self { gold: 30, luxury: 0 }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CityRules {
    /// Food eaten by each citizen per turn.
    pub food_per_citizen: i32,
    /// Shields spent on unit support per turn.
    pub shield_upkeep: i32,
    pub tax_rates: TaxRates,
    pub specialist_output: SpecialistArray<SpecialistYield>,
    /// Working citizens born content; the rest are unhappy.
    pub content_base: u8,
    /// Luxury needed to make one citizen one step happier.
    pub luxury_per_step: i32,
    /// Minimum size for a city to celebrate.
    pub celebrate_size: u8,
}

impl Default for CityRules {
    fn default() -> Self {
        Self {
            food_per_citizen: 2,
            shield_upkeep: 1,
            tax_rates: TaxRates::default(),
            specialist_output: [
                SpecialistYield {
                    output: OutputType::Luxury,
                    amount: 2,
                },
                SpecialistYield {
                    output: OutputType::Gold,
                    amount: 3,
                },
                SpecialistYield {
                    output: OutputType::Science,
                    amount: 3,
                },
            ],
            content_base: 4,
            luxury_per_step: 2,
            celebrate_size: 3,
        }
    }
}

/// Derived statistics of one labor assignment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CityStats {
    pub surplus: OutputArray<i32>,
    pub disorder: bool,
    pub happy: bool,
}

impl CityRules {
    /// Evaluate an assignment. `worked` is indexed by [`CityMapPos::index`];
    /// the center is always counted whatever its flag says.
    pub fn evaluate(
        &self,
        tiles: &[TileSnapshot; CITY_MAP_TILES],
        worked: &[bool; CITY_MAP_TILES],
        specialists: &SpecialistArray<u8>,
    ) -> CityStats {
        let mut output = [0i32; OUTPUT_COUNT];
        let mut workers = 0i32;

        for pos in CityMapPos::all() {
            if pos.is_free_worked() || worked[pos.index()] {
                let tile = &tiles[pos.index()];
                for (total, value) in output.iter_mut().zip(tile.output.iter()) {
                    *total += value;
                }
                if !pos.is_free_worked() {
                    workers += 1;
                }
            }
        }

        let trade = output[OutputType::Trade.index()];
        let gold = trade * self.tax_rates.gold as i32 / 100;
        let luxury = trade * self.tax_rates.luxury as i32 / 100;
        output[OutputType::Gold.index()] += gold;
        output[OutputType::Luxury.index()] += luxury;
        output[OutputType::Science.index()] += trade - gold - luxury;

        let mut specialist_total = 0i32;
        for sp in SpecialistType::ALL {
            let count = specialists[sp.index()] as i32;
            let bonus = self.specialist_output[sp.index()];
            output[bonus.output.index()] += bonus.amount * count;
            specialist_total += count;
        }

        let size = workers + specialist_total;
        let mut surplus = output;
        surplus[OutputType::Food.index()] -= self.food_per_citizen * size;
        surplus[OutputType::Shield.index()] -= self.shield_upkeep;

        let (happy, _content, unhappy) =
            self.citizen_moods(workers, output[OutputType::Luxury.index()]);

        CityStats {
            surplus,
            disorder: unhappy > happy,
            happy: size >= self.celebrate_size as i32
                && unhappy == 0
                && happy >= (size + 1) / 2,
        }
    }

    /// Evaluate the assignment a city currently has.
    pub fn evaluate_city(&self, city: &City) -> CityStats {
        let worked = std::array::from_fn(|i| city.tiles[i].state == TileState::Worker);
        self.evaluate(&city.tiles, &worked, &city.specialists)
    }

    /// Returns (happy, content, unhappy) counts among working citizens.
    fn citizen_moods(&self, workers: i32, mut luxury: i32) -> (i32, i32, i32) {
        let mut content = workers.min(self.content_base as i32);
        let mut unhappy = workers - content;
        let mut happy = 0;

        while self.luxury_per_step > 0 && luxury >= self.luxury_per_step {
            if content > 0 {
                content -= 1;
                happy += 1;
            } else if unhappy > 0 {
                unhappy -= 1;
                content += 1;
            } else {
                break;
            }
            luxury -= self.luxury_per_step;
        }

        (happy, content, unhappy)
    }
}
