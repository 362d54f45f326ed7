//! Kuhn-Munkres (Hungarian) minimum-cost assignment.
//!
//! The classical six-step formulation: reduce rows, star independent
//! zeros, cover starred columns, prime uncovered zeros, flip the
//! alternating star/prime path, relax the uncovered costs, repeat. Runs on
//! a square working copy; rectangular inputs are padded with the largest
//! entry and pairs that land in the padding are discarded.

use ndarray::prelude::*;

use crate::error::TrackError;

const STAR: u8 = 1;
const PRIME: u8 = 2;

/// Which step of the state machine runs next.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Step {
    ReduceRows,
    StarZeros,
    CoverStarredColumns,
    PrimeZeros,
    AugmentPath,
    RelaxCosts,
    Done,
}

/// Minimum-cost assignment solver over dense cost matrices.
pub struct HungarianSolver;

impl HungarianSolver {
    /// Optimal assignment for a rectangular cost matrix of finite entries.
    ///
    /// Returns min(m, n) (row, column) pairs minimising the summed cost,
    /// each row and column used at most once, in lexicographic order.
    /// A matrix that cannot be reduced any further (only possible with
    /// non-finite entries) yields [`TrackError::UnsolvableMatrix`].
    pub fn solve(cost: ArrayView2<f32>) -> Result<Vec<(usize, usize)>, TrackError> {
        let (rows, cols) = cost.dim();
        if rows == 0 || cols == 0 {
            return Ok(Vec::new());
        }

        let mut state = SolverState::new(cost);
        let mut step = Step::ReduceRows;
        while step != Step::Done {
            step = match step {
                Step::ReduceRows => state.reduce_rows(),
                Step::StarZeros => state.star_zeros(),
                Step::CoverStarredColumns => state.cover_starred_columns(),
                Step::PrimeZeros => state.prime_zeros(),
                Step::AugmentPath => state.augment_path(),
                Step::RelaxCosts => state.relax_costs()?,
                Step::Done => Step::Done,
            };
        }

        Ok(state.starred_pairs(rows, cols))
    }

    /// Turn a profit matrix into a cost matrix via `global max - profit`.
    pub fn make_cost_matrix(profit: ArrayView2<f32>) -> Array2<f32> {
        let max = profit.iter().copied().fold(f32::MIN, f32::max);
        profit.mapv(|p| max - p)
    }

    /// Turn a profit matrix into a cost matrix with a caller-supplied
    /// monotonic decreasing transform.
    pub fn make_cost_matrix_with<F>(profit: ArrayView2<f32>, invert: F) -> Array2<f32>
    where
        F: Fn(f32) -> f32,
    {
        profit.mapv(invert)
    }
}

/// Working state of one solve: the padded cost copy, star/prime marks,
/// and the row/column covers.
struct SolverState {
    n: usize,
    c: Array2<f32>,
    marked: Array2<u8>,
    row_covered: Vec<bool>,
    col_covered: Vec<bool>,
    /// last primed zero with no star in its row; the path in step 5 starts here
    z0: (usize, usize),
    path: Vec<(usize, usize)>,
}

impl SolverState {
    fn new(cost: ArrayView2<f32>) -> Self {
        let (rows, cols) = cost.dim();
        let n = rows.max(cols);
        let pad = cost.iter().copied().fold(f32::MIN, f32::max);
        let c = Array2::from_shape_fn((n, n), |(i, j)| {
            if i < rows && j < cols {
                cost[[i, j]]
            } else {
                pad
            }
        });

        Self {
            n,
            c,
            marked: Array2::zeros((n, n)),
            row_covered: vec![false; n],
            col_covered: vec![false; n],
            z0: (0, 0),
            path: Vec::new(),
        }
    }

    /// Step 1: subtract each row's minimum from that row.
    fn reduce_rows(&mut self) -> Step {
        for i in 0..self.n {
            let min = self.c.row(i).iter().copied().fold(f32::MAX, f32::min);
            for j in 0..self.n {
                self.c[[i, j]] -= min;
            }
        }
        Step::StarZeros
    }

    /// Step 2: star one independent zero per row/column, greedily.
    fn star_zeros(&mut self) -> Step {
        for i in 0..self.n {
            for j in 0..self.n {
                if self.c[[i, j]] == 0.0 && !self.row_covered[i] && !self.col_covered[j] {
                    self.marked[[i, j]] = STAR;
                    self.row_covered[i] = true;
                    self.col_covered[j] = true;
                    break;
                }
            }
        }
        self.clear_covers();
        Step::CoverStarredColumns
    }

    /// Step 3: cover every column holding a star; done once all n are covered.
    fn cover_starred_columns(&mut self) -> Step {
        let mut count = 0;
        for i in 0..self.n {
            for j in 0..self.n {
                if self.marked[[i, j]] == STAR && !self.col_covered[j] {
                    self.col_covered[j] = true;
                    count += 1;
                }
            }
        }
        if count >= self.n {
            Step::Done
        } else {
            Step::PrimeZeros
        }
    }

    /// Step 4: prime uncovered zeros, shuffling covers along starred rows,
    /// until a primed zero has no star in its row (go augment) or no
    /// uncovered zero remains (go relax).
    fn prime_zeros(&mut self) -> Step {
        loop {
            let (row, col) = match self.find_uncovered_zero() {
                Some(z) => z,
                None => return Step::RelaxCosts,
            };

            self.marked[[row, col]] = PRIME;
            match self.find_star_in_row(row) {
                Some(star_col) => {
                    self.row_covered[row] = true;
                    self.col_covered[star_col] = false;
                }
                None => {
                    self.z0 = (row, col);
                    return Step::AugmentPath;
                }
            }
        }
    }

    /// Step 5: walk the alternating path prime/star/prime/... from z0,
    /// flip its stars and primes, then reset covers and primes.
    fn augment_path(&mut self) -> Step {
        self.path.clear();
        self.path.push(self.z0);

        let mut col = self.z0.1;
        while let Some(row) = self.find_star_in_col(col) {
            self.path.push((row, col));
            // a covered row reached through a star always holds a prime
            match self.find_prime_in_row(row) {
                Some(prime_col) => {
                    self.path.push((row, prime_col));
                    col = prime_col;
                }
                None => break,
            }
        }

        for &(i, j) in &self.path {
            self.marked[[i, j]] = if self.marked[[i, j]] == STAR { 0 } else { STAR };
        }
        self.clear_covers();
        self.erase_primes();
        Step::CoverStarredColumns
    }

    /// Step 6: add the smallest uncovered entry to covered rows and
    /// subtract it from uncovered columns.
    fn relax_costs(&mut self) -> Result<Step, TrackError> {
        let delta = self.find_smallest()?;

        // count the entries that actually move; a zero net change means the
        // matrix cannot be relaxed and the solve must be abandoned
        let mut events: isize = 0;
        for i in 0..self.n {
            for j in 0..self.n {
                if self.row_covered[i] {
                    self.c[[i, j]] += delta;
                    events += 1;
                }
                if !self.col_covered[j] {
                    self.c[[i, j]] -= delta;
                    events += 1;
                }
                if self.row_covered[i] && !self.col_covered[j] {
                    events -= 2;
                }
            }
        }
        if events == 0 {
            return Err(TrackError::UnsolvableMatrix);
        }
        Ok(Step::PrimeZeros)
    }

    /// Smallest finite entry not covered by any row or column.
    fn find_smallest(&self) -> Result<f32, TrackError> {
        let mut min: Option<f32> = None;
        for i in 0..self.n {
            if self.row_covered[i] {
                continue;
            }
            for j in 0..self.n {
                if self.col_covered[j] {
                    continue;
                }
                let v = self.c[[i, j]];
                if v.is_finite() && min.map_or(true, |m| v < m) {
                    min = Some(v);
                }
            }
        }
        min.ok_or(TrackError::UnsolvableMatrix)
    }

    /// First uncovered zero in lexicographic (row, column) order.
    fn find_uncovered_zero(&self) -> Option<(usize, usize)> {
        for i in 0..self.n {
            if self.row_covered[i] {
                continue;
            }
            for j in 0..self.n {
                if !self.col_covered[j] && self.c[[i, j]] == 0.0 {
                    return Some((i, j));
                }
            }
        }
        None
    }

    fn find_star_in_row(&self, row: usize) -> Option<usize> {
        (0..self.n).find(|&j| self.marked[[row, j]] == STAR)
    }

    fn find_star_in_col(&self, col: usize) -> Option<usize> {
        (0..self.n).find(|&i| self.marked[[i, col]] == STAR)
    }

    fn find_prime_in_row(&self, row: usize) -> Option<usize> {
        (0..self.n).find(|&j| self.marked[[row, j]] == PRIME)
    }

    fn clear_covers(&mut self) {
        self.row_covered.fill(false);
        self.col_covered.fill(false);
    }

    fn erase_primes(&mut self) {
        self.marked.mapv_inplace(|m| if m == PRIME { 0 } else { m });
    }

    /// Starred pairs inside the original (unpadded) bounds.
    fn starred_pairs(&self, rows: usize, cols: usize) -> Vec<(usize, usize)> {
        let mut pairs = Vec::with_capacity(rows.min(cols));
        for i in 0..rows {
            for j in 0..cols {
                if self.marked[[i, j]] == STAR {
                    pairs.push((i, j));
                }
            }
        }
        pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn total_cost(cost: &Array2<f32>, pairs: &[(usize, usize)]) -> f32 {
        pairs.iter().map(|&(i, j)| cost[[i, j]]).sum()
    }

    #[test]
    fn test_diagonal_matrix() {
        let cost = array![[0.0_f32, 1.0, 1.0], [1.0, 0.0, 1.0], [1.0, 1.0, 0.0]];
        let pairs = HungarianSolver::solve(cost.view()).unwrap();
        assert_eq!(pairs, vec![(0, 0), (1, 1), (2, 2)]);
    }

    #[test]
    fn test_square_matrix() {
        let cost = array![[4.0_f32, 1.0, 3.0], [2.0, 0.0, 5.0], [3.0, 2.0, 2.0]];
        let pairs = HungarianSolver::solve(cost.view()).unwrap();
        assert_eq!(pairs, vec![(0, 1), (1, 0), (2, 2)]);
        assert_abs_diff_eq!(total_cost(&cost, &pairs), 5.0, epsilon = 1e-6);
    }

    #[test]
    fn test_wide_matrix_pads_rows() {
        let cost = array![[1.0_f32, 2.0, 3.0], [2.0, 4.0, 6.0]];
        let pairs = HungarianSolver::solve(cost.view()).unwrap();
        assert_eq!(pairs.len(), 2);
        assert_abs_diff_eq!(total_cost(&cost, &pairs), 4.0, epsilon = 1e-6);
        assert!(pairs.contains(&(0, 1)));
        assert!(pairs.contains(&(1, 0)));
    }

    #[test]
    fn test_tall_matrix_pads_columns() {
        let cost = array![[1.0_f32, 10.0], [10.0, 1.0], [2.0, 2.0]];
        let pairs = HungarianSolver::solve(cost.view()).unwrap();
        assert_eq!(pairs.len(), 2);
        // rows 0 and 1 take their cheap columns; row 2 lands in the padding
        assert_abs_diff_eq!(total_cost(&cost, &pairs), 2.0, epsilon = 1e-6);
    }

    #[test]
    fn test_empty_matrix() {
        let cost = Array2::<f32>::zeros((0, 3));
        assert_eq!(HungarianSolver::solve(cost.view()).unwrap(), vec![]);
    }

    #[test]
    fn test_single_cell() {
        let cost = array![[7.0_f32]];
        assert_eq!(HungarianSolver::solve(cost.view()).unwrap(), vec![(0, 0)]);
    }

    #[test]
    fn test_non_finite_matrix_is_unsolvable() {
        let cost = array![[f32::INFINITY]];
        assert_eq!(
            HungarianSolver::solve(cost.view()),
            Err(TrackError::UnsolvableMatrix)
        );
    }

    #[test]
    fn test_make_cost_matrix_default_transform() {
        let profit = array![[1.0_f32, 2.0], [4.0, 3.0]];
        let cost = HungarianSolver::make_cost_matrix(profit.view());
        assert_eq!(cost, array![[3.0, 2.0], [0.0, 1.0]]);

        // maximising profit picks 2 + 4
        let pairs = HungarianSolver::solve(cost.view()).unwrap();
        assert_eq!(pairs, vec![(0, 1), (1, 0)]);
    }

    #[test]
    fn test_make_cost_matrix_custom_transform() {
        let profit = array![[0.9_f32, 0.1], [0.2, 0.8]];
        let cost = HungarianSolver::make_cost_matrix_with(profit.view(), |p| 1.0 - p);
        let pairs = HungarianSolver::solve(cost.view()).unwrap();
        assert_eq!(pairs, vec![(0, 0), (1, 1)]);
    }
}
