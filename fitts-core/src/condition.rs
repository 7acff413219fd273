use serde::{Deserialize, Serialize};

/// One amplitude/width pairing of the Fitts' Law design, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Condition {
    pub amplitude: u32,
    pub width: u32,
}

impl Condition {
    pub fn new(amplitude: u32, width: u32) -> Self {
        Self { amplitude, width }
    }
}

/// Cross product of the distance and width sets, distance-major.
pub fn condition_universe(distances: &[u32], widths: &[u32]) -> Vec<Condition> {
    distances
        .iter()
        .flat_map(|&amplitude| widths.iter().map(move |&width| Condition::new(amplitude, width)))
        .collect()
}
