//! Cell firings and the per-event hit buffer.

use serde::{Deserialize, Serialize};

/// What caused a cell to fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HitOrigin {
    /// A detected incident photon.
    Photoelectron,
    /// A thermal firing independent of light.
    DarkCount,
    /// A neighbour cell triggered by a firing cell, same instant.
    OpticalCrosstalk,
    /// A delayed re-firing of the same cell with reduced amplitude.
    AfterPulse,
}

/// One cell firing: time, pulse amplitude, grid position and origin.
///
/// Everything but the amplitude is fixed at construction; the amplitude is
/// rewritten by the recharge resolver when the same cell fires repeatedly.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    /// Firing time in nanoseconds from the event start.
    pub time: f64,
    /// Pulse amplitude in units of a fully recharged cell.
    pub amplitude: f64,
    /// Cell row, in `[0, n_side_cells)`.
    pub row: u32,
    /// Cell column, in `[0, n_side_cells)`.
    pub col: u32,
    /// What caused the firing.
    pub origin: HitOrigin,
}

impl Hit {
    pub fn new(time: f64, amplitude: f64, row: u32, col: u32, origin: HitOrigin) -> Self {
        Self {
            time,
            amplitude,
            row,
            col,
            origin,
        }
    }

    /// Flat cell index on a grid with `n_side` cells per side.
    pub fn cell_id(&self, n_side: u32) -> u32 {
        self.row * n_side + self.col
    }
}

/// Append-only list of the hits of one event, with one parent index per
/// hit (`-1` for photoelectrons and dark counts).
///
/// The correlated-noise passes walk the buffer by index while appending to
/// it, so entries must never be referenced across an append. Sorting keeps
/// the parent indices valid by remapping them through the sort
/// permutation.
#[derive(Debug, Clone, Default)]
pub struct HitBuffer {
    hits: Vec<Hit>,
    parents: Vec<i32>,
}

impl HitBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove all hits.
    pub fn clear(&mut self) {
        self.hits.clear();
        self.parents.clear();
    }

    /// Reserve room for `additional` more hits.
    pub fn reserve(&mut self, additional: usize) {
        self.hits.reserve(additional);
        self.parents.reserve(additional);
    }

    /// Append a hit and record its parent index, returning the new hit's
    /// index.
    pub fn push(&mut self, hit: Hit, parent: i32) -> usize {
        self.hits.push(hit);
        self.parents.push(parent);
        self.hits.len() - 1
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    /// All hits, in buffer order.
    pub fn hits(&self) -> &[Hit] {
        &self.hits
    }

    /// Parent index per hit, `-1` for primaries and dark counts.
    pub fn parents(&self) -> &[i32] {
        &self.parents
    }

    pub(crate) fn get(&self, index: usize) -> &Hit {
        &self.hits[index]
    }

    pub(crate) fn hits_mut(&mut self) -> &mut [Hit] {
        &mut self.hits
    }

    /// Stable sort by ascending time, ties keeping insertion order.
    ///
    /// Parent indices are remapped through the sort permutation so the hit
    /// graph refers to the same firings afterwards.
    pub fn sort_by_time(&mut self) {
        let mut order: Vec<usize> = (0..self.hits.len()).collect();
        order.sort_by(|&a, &b| self.hits[a].time.total_cmp(&self.hits[b].time));

        let mut new_index = vec![0i32; order.len()];
        for (new_pos, &old_pos) in order.iter().enumerate() {
            new_index[old_pos] = new_pos as i32;
        }

        let sorted_hits: Vec<Hit> = order.iter().map(|&i| self.hits[i]).collect();
        let sorted_parents: Vec<i32> = order
            .iter()
            .map(|&i| {
                let parent = self.parents[i];
                if parent < 0 {
                    -1
                } else {
                    new_index[parent as usize]
                }
            })
            .collect();
        self.hits = sorted_hits;
        self.parents = sorted_parents;
    }
}
