use anyhow::Result;
use ndarray::array;
use sortrack::HungarianSolver;

fn main() -> Result<()> {
    let cost = array![[4.0_f32, 1.0, 3.0], [2.0, 0.0, 5.0], [3.0, 2.0, 2.0]];
    let pairs = HungarianSolver::solve(cost.view())?;
    let total: f32 = pairs.iter().map(|&(i, j)| cost[[i, j]]).sum();
    println!("square assignment: {pairs:?} (total cost {total})");

    // rectangular input: two rows against three columns
    let wide = array![[1.0_f32, 2.0, 3.0], [2.0, 4.0, 6.0]];
    let pairs = HungarianSolver::solve(wide.view())?;
    println!("rectangular assignment: {pairs:?}");

    // profit maximisation via the cost conversion helper
    let profit = array![[0.9_f32, 0.1], [0.2, 0.8]];
    let cost = HungarianSolver::make_cost_matrix(profit.view());
    let pairs = HungarianSolver::solve(cost.view())?;
    println!("profit assignment: {pairs:?}");

    Ok(())
}
