use anyhow::{Context, Result};
use log::info;

use matbench::driver::run_benchmark;
use matbench::network::{execute_local, NetworkError};
use matbench::types::{Config, Transport};

fn main() -> Result<()> {
    matbench::initialize_logger();

    let config = Config::from_env().context("invalid configuration")?;
    info!("starting benchmark: {:?}", config);

    match config.transport {
        Transport::Local => {
            let results = execute_local(config.num_workers, |comm| {
                run_benchmark(&comm, &config.benchmark)
            })?;

            let mut errors = results
                .into_iter()
                .filter_map(|result| result.err())
                .collect::<Vec<_>>();

            // Workers that only failed because a peer left are a consequence of the root
            // cause, report that one instead.
            if let Some(index) = errors.iter().position(|e| !caused_by_departure(e)) {
                return Err(errors.swap_remove(index));
            }

            if let Some(e) = errors.pop() {
                return Err(e);
            }
        }
        Transport::Mpi => run_mpi(&config)?,
    }

    Ok(())
}

fn caused_by_departure(e: &anyhow::Error) -> bool {
    e.chain()
        .filter_map(|cause| cause.downcast_ref::<NetworkError>())
        .any(NetworkError::is_departure)
}

#[cfg(feature = "mpi")]
fn run_mpi(config: &Config) -> Result<()> {
    use matbench::network::MpiCommunicator;

    let comm = MpiCommunicator::initialize()?;

    // The peers may be blocked in a transfer this process will never enter.
    match run_benchmark(&comm, &config.benchmark) {
        Ok(_) => Ok(()),
        Err(_) => comm.abort(1),
    }
}

#[cfg(not(feature = "mpi"))]
fn run_mpi(_config: &Config) -> Result<()> {
    Err(anyhow::anyhow!(
        "matbench was built without MPI support, rebuild with `--features mpi`"
    ))
}
