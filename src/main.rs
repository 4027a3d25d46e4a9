use clap::Parser;
use itertools::Itertools;
use rayon::prelude::*;
use rspr_tree_distances::io::{read_newick_trees, write_matrix_tsv};
use rspr_tree_distances::{Config, Distance, Problem};
use std::path::PathBuf;
use std::process::exit;
use std::time::Instant;

/// Compute rooted SPR distances and maximum agreement forests between
/// binary Newick trees. With exactly two input trees the distance and the
/// witnessing forest are printed; with more, a pairwise distance matrix
/// (TSV) is written where row/column names are tree names.
#[derive(Parser, Debug)]
#[command(name = "rspr-dists", version, about = "rSPR distance and MAF for rooted binary trees")]
struct Args {
    /// Path to a file of `;`-terminated Newick trees (one per line)
    #[arg(short = 'i', long = "input")]
    input: PathBuf,

    /// Output path for the pairwise TSV matrix (gzip if it ends in .gz)
    #[arg(short = 'o', long = "output")]
    output: Option<PathBuf>,

    /// Only run the linear-time 3-approximation
    #[arg(long = "approx", default_value_t = false)]
    approx: bool,

    /// Enable cluster decomposition
    #[arg(long = "cluster", default_value_t = false)]
    cluster: bool,

    /// Cap on simultaneously open cluster decompositions
    #[arg(long = "max-clusters")]
    max_clusters: Option<usize>,

    /// Disable approximation-based branch pruning
    #[arg(long = "no-prune", default_value_t = false)]
    no_prune: bool,

    /// Explore only the cut-b branch when b lies between a and c
    #[arg(long = "cut-one-b", default_value_t = false)]
    cut_one_b: bool,

    /// Keep cutting b in branches spawned by a cut-b branch
    #[arg(long = "cut-all-b", default_value_t = false)]
    cut_all_b: bool,

    /// Skip the cut-c branch when b lies between a and c
    #[arg(long = "cut-one-ab", default_value_t = false)]
    cut_one_ab: bool,

    /// Skip the cut-b branch when a and c are in separate components
    #[arg(long = "separate-components", default_value_t = false)]
    separate_components: bool,

    /// Component check inside the approximation
    #[arg(long = "check-component", default_value_t = false)]
    check_component: bool,

    /// Collect every optimal agreement forest instead of the first
    #[arg(long = "all-mafs", default_value_t = false)]
    all_mafs: bool,

    /// Prefer agreement forests that use the rho placeholder
    #[arg(long = "prefer-rho", default_value_t = false)]
    prefer_rho: bool,

    /// Memoize solved cluster instances
    #[arg(long = "memoize", default_value_t = false)]
    memoize: bool,

    /// Iterative deepening cap
    #[arg(long = "max-k", default_value_t = 1000)]
    max_k: usize,

    /// Quiet mode: suppresses progress messages on stdout
    #[arg(short = 'q', long = "quiet", default_value_t = false)]
    quiet: bool,
}

fn main() {
    let args = Args::parse();

    let t0 = Instant::now();
    let trees = match read_newick_trees(&args.input) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("Failed to read {:?}: {e}", args.input);
            exit(2);
        }
    };
    if trees.len() < 2 {
        eprintln!("Need at least two trees in {:?}.", args.input);
        exit(2);
    }
    let read_s = t0.elapsed().as_secs_f64();
    log_if(!args.quiet, format!("Read {} trees in {read_s:.3}s", trees.len()));

    let cfg = config_from(&args);
    if trees.len() == 2 {
        run_pair(&args, &cfg, &trees);
    } else {
        run_matrix(&args, &cfg, &trees);
    }
}

fn config_from(args: &Args) -> Config {
    Config {
        bb_prune: !args.no_prune,
        approx_check_component: args.check_component,
        cut_one_b: args.cut_one_b,
        cut_all_b: args.cut_all_b,
        cut_one_ab: args.cut_one_ab,
        cut_ac_separate_components: args.separate_components,
        cluster_reduction: args.cluster,
        max_clusters: args.max_clusters,
        prefer_rho: args.prefer_rho,
        memoize: args.memoize,
        all_mafs: args.all_mafs,
        max_k: args.max_k,
        verbose: false,
    }
}

fn run_pair(args: &Args, cfg: &Config, trees: &[(String, String)]) {
    let problem = match Problem::from_newick(&trees[0].1, &trees[1].1) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Failed to build instance: {e}");
            exit(3);
        }
    };
    log_if(
        !args.quiet,
        format!("Synchronized {} shared leaves", problem.shared_leaves()),
    );

    let t1 = Instant::now();
    if args.approx {
        let (count, af1, af2) = problem.approx(args.check_component);
        let approx_s = t1.elapsed().as_secs_f64();
        log_if(!args.quiet, format!("Approximation in {approx_s:.3}s"));
        println!("approx drSPR <= {count}");
        println!("F1: {}", af1.join(" "));
        println!("F2: {}", af2.join(" "));
        return;
    }

    let mut cfg = cfg.clone();
    cfg.verbose = !args.quiet;
    if cfg.verbose {
        print!("k:");
    }
    let solution = problem.solve(&cfg);
    let solve_s = t1.elapsed().as_secs_f64();
    log_if(!args.quiet, format!("Exact search in {solve_s:.3}s"));

    match solution.distance {
        Distance::Exact(d) => {
            println!("{} vs {}", trees[0].0, trees[1].0);
            println!("drSPR = {d}");
            println!("F1: {}", solution.f1_components.join(" "));
            println!("F2: {}", solution.f2_components.join(" "));
            if cfg.all_mafs {
                println!("{} optimal agreement forests:", solution.all_mafs.len());
                for (c1, c2) in &solution.all_mafs {
                    println!("  F1: {}", c1.join(" "));
                    println!("  F2: {}", c2.join(" "));
                }
            }
        }
        Distance::ExceedsMax => {
            println!("drSPR > {} (increase --max-k)", cfg.max_k);
            exit(4);
        }
    }
}

fn run_matrix(args: &Args, cfg: &Config, trees: &[(String, String)]) {
    let Some(output) = &args.output else {
        eprintln!("Matrix mode needs -o/--output.");
        exit(2);
    };
    let n = trees.len();
    log_if(
        !args.quiet,
        format!("Computing {} pairwise distances", n * (n - 1) / 2),
    );

    let t1 = Instant::now();
    let index_pairs: Vec<(usize, usize)> = (0..n).tuple_combinations().collect();
    // each pair gets its own independent single-threaded search session
    let pairs: Vec<(usize, usize, i64)> = index_pairs
        .into_par_iter()
        .map(|(i, j)| {
            let d = match Problem::from_newick(&trees[i].1, &trees[j].1) {
                Ok(problem) if args.approx => problem.approx(args.check_component).0 as i64,
                Ok(problem) => match problem.solve(cfg).distance {
                    Distance::Exact(d) => d as i64,
                    Distance::ExceedsMax => -1,
                },
                Err(e) => {
                    eprintln!("{} vs {}: {e}", trees[i].0, trees[j].0);
                    -1
                }
            };
            (i, j, d)
        })
        .collect();
    let comp_s = t1.elapsed().as_secs_f64();
    log_if(!args.quiet, format!("Determining distances {comp_s:.3}s"));

    let mut mat = vec![vec![0i64; n]; n];
    for (i, j, d) in pairs {
        mat[i][j] = d;
        mat[j][i] = d;
    }

    let names: Vec<String> = trees.iter().map(|(name, _)| name.clone()).collect();
    let t2 = Instant::now();
    if let Err(e) = write_matrix_tsv(output, &names, &mat) {
        eprintln!("Failed to write output {output:?}: {e}");
        exit(4);
    }
    let write_s = t2.elapsed().as_secs_f64();
    log_if(!args.quiet, format!("Writing to output {write_s:.3}s"));
}

fn log_if(show: bool, msg: String) {
    if show {
        println!("{}", msg);
    }
}
