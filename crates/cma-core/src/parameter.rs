use cma_protocol::{OutputArray, OutputType, OUTPUT_COUNT};
use serde::{Deserialize, Serialize};

/// A player goal for one city.
///
/// `Default` is the general initialization every parameter goes through;
/// decoding a persisted goal starts from it and overwrites the stored subset.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Parameter {
    /// Lowest acceptable surplus per output category.
    pub minimal_surplus: OutputArray<i16>,
    /// Weight of each output category in the objective.
    pub factor: OutputArray<i16>,
    /// Weight of the city celebrating.
    pub happy_factor: i16,
    /// Only accept assignments in which the city celebrates.
    pub require_happy: bool,
    /// Not persisted.
    pub allow_disorder: bool,
    /// Not persisted.
    pub allow_specialists: bool,
}

impl Default for Parameter {
    fn default() -> Self {
        Self {
            minimal_surplus: [0; OUTPUT_COUNT],
            factor: [1; OUTPUT_COUNT],
            happy_factor: 1,
            require_happy: false,
            allow_disorder: false,
            allow_specialists: true,
        }
    }
}

impl Parameter {
    pub fn with_minimal_surplus(mut self, output: OutputType, value: i16) -> Self {
        self.minimal_surplus[output.index()] = value;
        self
    }

    pub fn with_factor(mut self, output: OutputType, value: i16) -> Self {
        self.factor[output.index()] = value;
        self
    }

    pub fn minimal_surplus(&self, output: OutputType) -> i16 {
        self.minimal_surplus[output.index()]
    }

    pub fn factor(&self, output: OutputType) -> i16 {
        self.factor[output.index()]
    }
}
