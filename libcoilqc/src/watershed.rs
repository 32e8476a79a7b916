//! Marker-controlled watershed by priority flooding
//!
//! Seeds spread their labels over the intensity surface in order of increasing
//! surface value, so each unlabelled pixel joins whichever seed reaches it
//! through the lowest path first.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use ndarray::Array2;

/// Label for pixels no seed could reach
pub const UNLABELLED: u8 = 0;

/// 4-connected neighbour offsets (row, col)
const NEIGHBOUR_OFFSETS: [(isize, isize); 4] = [(-1, 0), (1, 0), (0, -1), (0, 1)];

/// Queue entry: lowest surface value first, then insertion order
#[derive(Debug, Clone, Copy)]
struct FloodItem {
    value: f64,
    age: u64,
    row: usize,
    col: usize,
}

impl PartialEq for FloodItem {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for FloodItem {}

impl PartialOrd for FloodItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FloodItem {
    // Reversed so `BinaryHeap` pops the smallest value / oldest entry
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .value
            .total_cmp(&self.value)
            .then_with(|| other.age.cmp(&self.age))
    }
}

/// Flood `surface` from the non-zero labels in `markers`
///
/// Returns a label map of the same shape. Every pixel connected to at least
/// one seed receives a seed label; with no seeds everything stays
/// [`UNLABELLED`].
///
/// # Panics
/// Panics if `surface` and `markers` have different shapes.
pub fn watershed(surface: &Array2<f64>, markers: &Array2<u8>) -> Array2<u8> {
    assert_eq!(
        surface.dim(),
        markers.dim(),
        "surface and marker arrays must share a shape"
    );
    let (rows, cols) = surface.dim();
    let mut labels = markers.clone();
    let mut queue = BinaryHeap::new();
    let mut age = 0u64;

    for ((row, col), &label) in markers.indexed_iter() {
        if label != UNLABELLED {
            queue.push(FloodItem {
                value: surface[[row, col]],
                age,
                row,
                col,
            });
            age += 1;
        }
    }

    while let Some(item) = queue.pop() {
        let label = labels[[item.row, item.col]];
        for &(dr, dc) in &NEIGHBOUR_OFFSETS {
            let nr = item.row as isize + dr;
            let nc = item.col as isize + dc;
            if nr < 0 || nc < 0 || nr >= rows as isize || nc >= cols as isize {
                continue;
            }
            let (nr, nc) = (nr as usize, nc as usize);
            if labels[[nr, nc]] != UNLABELLED {
                continue;
            }
            labels[[nr, nc]] = label;
            queue.push(FloodItem {
                value: surface[[nr, nc]],
                age,
                row: nr,
                col: nc,
            });
            age += 1;
        }
    }

    labels
}
