//! Python binding layer for rSPR distance calculations.
//!
//! Exposes the distance, the maximum agreement forest and the pairwise
//! matrix to Python. Trees are passed as Newick strings.

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use rayon::prelude::*;

use crate::{Config, Distance, Problem};

fn build_problem(newick1: &str, newick2: &str) -> PyResult<Problem> {
    Problem::from_newick(newick1, newick2).map_err(|e| PyValueError::new_err(e.to_string()))
}

fn config(max_k: usize, cluster: bool, memoize: bool) -> Config {
    Config {
        cluster_reduction: cluster,
        memoize,
        max_k,
        ..Config::default()
    }
}

/// Exact rooted SPR distance between two Newick trees.
///
/// Returns -1 if the distance exceeds `max_k`.
///
/// Raises:
///     ValueError: If a tree cannot be parsed, is not binary, or the
///     trees share no leaf labels.
#[pyfunction]
#[pyo3(signature = (newick1, newick2, max_k=1000, cluster=false, memoize=false))]
fn spr_distance(
    newick1: &str,
    newick2: &str,
    max_k: usize,
    cluster: bool,
    memoize: bool,
) -> PyResult<i64> {
    let problem = build_problem(newick1, newick2)?;
    let solution = problem.solve(&config(max_k, cluster, memoize));
    Ok(match solution.distance {
        Distance::Exact(d) => d as i64,
        Distance::ExceedsMax => -1,
    })
}

/// Exact distance plus the witnessing maximum agreement forest.
///
/// Returns:
///     A tuple `(distance, f1_components, f2_components)`; the component
///     lists are empty when the distance exceeds `max_k`.
#[pyfunction]
#[pyo3(signature = (newick1, newick2, max_k=1000, cluster=false, memoize=false))]
fn spr_maf(
    newick1: &str,
    newick2: &str,
    max_k: usize,
    cluster: bool,
    memoize: bool,
) -> PyResult<(i64, Vec<String>, Vec<String>)> {
    let problem = build_problem(newick1, newick2)?;
    let solution = problem.solve(&config(max_k, cluster, memoize));
    Ok(match solution.distance {
        Distance::Exact(d) => (d as i64, solution.f1_components, solution.f2_components),
        Distance::ExceedsMax => (-1, Vec::new(), Vec::new()),
    })
}

/// Linear-time 3-approximation: an upper bound at most three times the
/// exact distance, with its agreement forest.
#[pyfunction]
#[pyo3(signature = (newick1, newick2))]
fn spr_approx(newick1: &str, newick2: &str) -> PyResult<(usize, Vec<String>, Vec<String>)> {
    let problem = build_problem(newick1, newick2)?;
    Ok(problem.approx(false))
}

/// Pairwise exact rSPR distance matrix over a list of Newick trees.
///
/// Pairs are solved in parallel, each in its own search session; entries
/// are -1 where the distance exceeds `max_k`.
#[pyfunction]
#[pyo3(signature = (newicks, max_k=1000, cluster=false))]
fn pairwise_spr(newicks: Vec<String>, max_k: usize, cluster: bool) -> PyResult<Vec<Vec<i64>>> {
    if newicks.len() < 2 {
        return Err(PyValueError::new_err(
            "Need at least 2 trees to compute pairwise distances",
        ));
    }
    let n = newicks.len();
    let cfg = config(max_k, cluster, false);
    let pairs: Vec<(usize, usize, i64)> = (0..n)
        .into_par_iter()
        .flat_map_iter(|i| (i + 1..n).map(move |j| (i, j)))
        .map(|(i, j)| {
            let d = match Problem::from_newick(&newicks[i], &newicks[j]) {
                Ok(problem) => match problem.solve(&cfg).distance {
                    Distance::Exact(d) => d as i64,
                    Distance::ExceedsMax => -1,
                },
                Err(_) => -1,
            };
            (i, j, d)
        })
        .collect();

    let mut matrix = vec![vec![0i64; n]; n];
    for (i, j, d) in pairs {
        matrix[i][j] = d;
        matrix[j][i] = d;
    }
    Ok(matrix)
}

/// Python module definition
#[pymodule]
fn rspr_tree_distances(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(spr_distance, m)?)?;
    m.add_function(wrap_pyfunction!(spr_maf, m)?)?;
    m.add_function(wrap_pyfunction!(spr_approx, m)?)?;
    m.add_function(wrap_pyfunction!(pairwise_spr, m)?)?;
    Ok(())
}
