mod city;
mod city_map;
mod ids;
mod packet;
mod rules;
mod types;
pub mod wire;

pub use crate::city::*;
pub use crate::city_map::*;
pub use crate::ids::*;
pub use crate::packet::*;
pub use crate::rules::*;
pub use crate::types::*;
