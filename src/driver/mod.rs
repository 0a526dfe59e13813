//! The benchmark loop: runs the distributed multiplication for every configured size.
//!
//! Every worker of the group runs [`run_benchmark`] with the same configuration. Only the
//! coordinator generates inputs, measures time and writes files.
mod generate;
mod persist;
mod trace;

use matbench_kernels::reference_matmul;
use std::time::{Duration, Instant};

use self::trace::BenchmarkTrace;
use crate::network::Communicator;
use crate::prelude::*;
use crate::types::{BenchmarkConfig, Matrix};
use crate::worker::{multiply, PhaseTimings};

pub use self::generate::{generate_matrix, matrix_rng, VALUE_RANGE};
pub use self::persist::{
    format_timing_line, matrix_path, parse_matrix, parse_timing_log, read_matrix,
    timing_log_path, write_matrix, MatrixKind, TimingLog,
};

/// Outcome of one benchmarked size, as observed by the coordinator.
#[derive(Debug, Clone)]
pub struct SizeReport {
    pub size: usize,
    pub num_workers: usize,
    /// Wall time from the start of distribution until the result was assembled.
    pub elapsed: Duration,
    pub timings: PhaseTimings,
    pub verified: bool,
}

/// Files written by the coordinator during a run.
#[derive(Debug, Default)]
struct Outputs {
    timing_log: Option<TimingLog>,
    trace: Option<BenchmarkTrace>,
}

impl Outputs {
    fn open<C: Communicator>(comm: &C, config: &BenchmarkConfig) -> Result<Self> {
        let mut out = Self::default();
        if !comm.is_coordinator() {
            return Ok(out);
        }

        if config.persist {
            std::fs::create_dir_all(&config.output_dir).with_context(|| {
                format!("failed to create output directory {:?}", config.output_dir)
            })?;

            let path = timing_log_path(&config.output_dir, comm.num_workers());
            out.timing_log = Some(TimingLog::create(path)?);
        }

        if let Some(path) = &config.trace_file {
            out.trace = Some(BenchmarkTrace::new(path)?);
        }

        Ok(out)
    }
}

/// Runs the benchmark for every size of `config.sizes`, in order.
///
/// Returns one report per size on the coordinator and an empty list on every other worker.
/// A failure aborts the whole run: the workers proceed in lock-step, so a size that failed
/// on one worker cannot be resumed by the others. The failure is logged by the worker on
/// which it happened before the error is returned.
pub fn run_benchmark<C: Communicator>(
    comm: &C,
    config: &BenchmarkConfig,
) -> Result<Vec<SizeReport>> {
    let result = run_sizes(comm, config);

    if let Err(e) = &result {
        error!("worker {} aborted the benchmark: {:?}", comm.my_id(), e);
    }

    result
}

fn run_sizes<C: Communicator>(comm: &C, config: &BenchmarkConfig) -> Result<Vec<SizeReport>> {
    config.validate()?;

    let mut outputs = Outputs::open(comm, config)?;
    let mut reports = vec![];

    for &n in &config.sizes {
        let report = run_size(comm, config, n, &mut outputs)
            .with_context(|| format!("benchmark for matrix size {}x{} failed", n, n))?;

        reports.extend(report);
    }

    Ok(reports)
}

fn run_size<C: Communicator>(
    comm: &C,
    config: &BenchmarkConfig,
    n: usize,
    outputs: &mut Outputs,
) -> Result<Option<SizeReport>> {
    let mut reference = None;

    let inputs = if comm.is_coordinator() {
        let mut rng = matrix_rng(config.seed, n);
        let a = generate_matrix(&mut rng, n);
        let b = generate_matrix(&mut rng, n);

        if config.persist {
            write_matrix(&matrix_path(&config.output_dir, n, MatrixKind::A), &a)?;
            write_matrix(&matrix_path(&config.output_dir, n, MatrixKind::B), &b)?;
        }

        if config.verify {
            reference = Some(reference_matmul(&a, &b)?);
        }

        Some((a, b))
    } else {
        None
    };

    let before = Instant::now();
    if comm.is_coordinator() {
        info!(
            "computing {}x{} matrix product on {} workers",
            n,
            n,
            comm.num_workers()
        );
    }

    let outcome = multiply(comm, n, inputs, config.collect_order)?;
    let elapsed = before.elapsed();

    let c = match outcome.result {
        Some(c) => c,
        None => return Ok(None),
    };

    let verified = match &reference {
        Some(expected) => {
            verify_result(&c, expected)?;
            true
        }
        None => false,
    };

    if config.persist {
        write_matrix(&matrix_path(&config.output_dir, n, MatrixKind::Result), &c)?;
    }

    if let Some(log) = &mut outputs.timing_log {
        log.append(n, elapsed)?;
    }

    let report = SizeReport {
        size: n,
        num_workers: comm.num_workers(),
        elapsed,
        timings: outcome.timings,
        verified,
    };

    if let Some(trace) = &mut outputs.trace {
        trace.add(&report);
    }

    info!(
        "{}x{} matrix product finished in {} ms",
        n,
        n,
        elapsed.as_millis()
    );

    Ok(Some(report))
}

fn verify_result(actual: &Matrix<i64>, expected: &Matrix<i64>) -> Result {
    let n = expected.dim();

    if actual.dim() != n {
        bail!(
            "distributed result is {}x{}, expected {}x{}",
            actual.dim(),
            actual.dim(),
            n,
            n
        );
    }

    for (index, (x, y)) in enumerate(zip(actual.as_slice(), expected.as_slice())) {
        if x != y {
            bail!(
                "distributed result differs from reference at ({}, {}): {} != {}",
                index / n,
                index % n,
                x,
                y
            );
        }
    }

    debug!("verified {}x{} result against reference", n, n);
    Ok(())
}
