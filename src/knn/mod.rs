use std::cmp::Ordering;

pub mod kd_index;

pub use kd_index::KdIndex;

/// A scored index entry. Ordered ascending by distance, with equal distances
/// broken by ascending label so that rankings are deterministic.
#[derive(Clone, Debug, PartialEq)]
pub struct Neighbor {
    pub label: String,
    pub distance: f64,
}

impl Neighbor {
    pub fn new(label: String, distance: f64) -> Self {
        Neighbor { label, distance }
    }
}

impl Eq for Neighbor {}

impl Ord for Neighbor {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.distance.partial_cmp(&other.distance) {
            Some(Ordering::Less) => Ordering::Less,
            Some(Ordering::Greater) => Ordering::Greater,
            _ => self.label.cmp(&other.label),
        }
    }
}

impl PartialOrd for Neighbor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
