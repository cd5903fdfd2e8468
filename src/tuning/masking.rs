//! Seeded masking of observed cells for mask-and-score validation

use crate::config::Scoring;
use ndarray::Array2;
use rand::seq::index::sample;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Picks which originally-observed cells to hide
#[derive(Debug, Clone, Copy)]
pub struct MaskSampler {
    fraction: f64,
    max_cells: usize,
    seed: u64,
}

impl MaskSampler {
    pub fn new(fraction: f64, max_cells: usize, seed: u64) -> Self {
        Self {
            fraction,
            max_cells,
            seed,
        }
    }

    /// Number of cells hidden out of `observed`:
    /// `min(round(fraction * observed), max_cells)`
    pub fn target_count(&self, observed: usize) -> usize {
        let raw = (self.fraction * observed as f64).round() as usize;
        raw.min(self.max_cells).min(observed)
    }

    /// Sampled `(row, col)` cells in row-major order
    pub fn sample(&self, mask: &Array2<bool>) -> Vec<(usize, usize)> {
        let observed: Vec<(usize, usize)> = mask
            .indexed_iter()
            .filter(|(_, &missing)| !missing)
            .map(|(idx, _)| idx)
            .collect();

        let n = self.target_count(observed.len());
        if n == 0 {
            return Vec::new();
        }

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut picked = sample(&mut rng, observed.len(), n).into_vec();
        picked.sort_unstable();
        picked.into_iter().map(|i| observed[i]).collect()
    }
}

/// Original mask with the sampled cells also marked missing
pub fn hide_cells(mask: &Array2<bool>, cells: &[(usize, usize)]) -> Array2<bool> {
    let mut hidden = mask.clone();
    for &cell in cells {
        hidden[cell] = true;
    }
    hidden
}

/// Error over a set of masked cells
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaskedScore {
    /// `NaN` when no cell could be scored
    pub score: f64,
    pub scored: usize,
    /// Masked cells the executor left unfilled
    pub skipped: usize,
}

/// Score imputed against true values at the given cells.
///
/// Cells the executor could not fill (still `NaN`) are left out of the
/// score and counted in `skipped`.
pub fn score_cells(
    scoring: Scoring,
    imputed: &Array2<f64>,
    truth: &Array2<f64>,
    cells: &[(usize, usize)],
) -> MaskedScore {
    let (pred, actual): (Vec<f64>, Vec<f64>) = cells
        .iter()
        .filter(|&&cell| imputed[cell].is_finite())
        .map(|&cell| (imputed[cell], truth[cell]))
        .unzip();
    MaskedScore {
        score: scoring.score(&pred, &actual),
        scored: pred.len(),
        skipped: cells.len() - pred.len(),
    }
}
