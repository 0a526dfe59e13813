use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::prelude::*;
use crate::worker::CollectOrder;

/// Matrix sizes benchmarked when `MATBENCH_SIZES` is not set.
pub const DEFAULT_SIZES: [usize; 13] = [
    10, 50, 100, 500, 600, 700, 800, 900, 1000, 1200, 1400, 1600, 1800,
];

/// Group size of the in-process transport when `MATBENCH_WORKERS` is not set.
pub const DEFAULT_NUM_WORKERS: usize = 4;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid matrix size {0:?}")]
    InvalidSize(String),

    #[error("matrix size cannot be negative, got {0}")]
    NegativeSize(i64),

    #[error("at least one matrix size is required")]
    NoSizes,

    #[error("invalid number of workers {0:?}, expected a positive integer")]
    InvalidWorkerCount(String),

    #[error("invalid seed {0:?}")]
    InvalidSeed(String),

    #[error("unknown transport {0:?}, expected \"local\" or \"mpi\"")]
    UnknownTransport(String),

    #[error("unknown collect order {0:?}, expected \"rank\" or \"arrival\"")]
    UnknownCollectOrder(String),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Transport {
    /// All workers are threads of this process.
    Local,
    /// One worker per MPI process.
    Mpi,
}

impl FromStr for Transport {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, ConfigError> {
        match s.trim() {
            "local" | "" => Ok(Transport::Local),
            "mpi" => Ok(Transport::Mpi),
            other => Err(ConfigError::UnknownTransport(other.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub transport: Transport,
    /// Only used by [`Transport::Local`]; with MPI the group size is given by `mpirun`.
    pub num_workers: usize,
    pub benchmark: BenchmarkConfig,
}

impl Config {
    pub fn new(transport: Transport, num_workers: usize, benchmark: BenchmarkConfig) -> Self {
        Self {
            transport,
            num_workers,
            benchmark,
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Reads the configuration through `var`, which maps a variable name to its value.
    pub fn from_vars<F>(var: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut out = Self::new(Transport::Local, DEFAULT_NUM_WORKERS, default());

        if let Some(transport) = var("MATBENCH_TRANSPORT") {
            out.transport = transport.parse()?;
        }

        if let Some(workers) = var("MATBENCH_WORKERS") {
            out.num_workers = match workers.trim().parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => return Err(ConfigError::InvalidWorkerCount(workers)),
            };
        }

        out.benchmark = BenchmarkConfig::from_vars(var)?;
        out.validate()?;
        Ok(out)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_workers == 0 {
            return Err(ConfigError::InvalidWorkerCount("0".into()));
        }

        self.benchmark.validate()
    }
}

#[derive(Debug, Clone)]
pub struct BenchmarkConfig {
    /// Matrix dimensions, benchmarked in this order.
    pub sizes: Vec<usize>,
    pub output_dir: PathBuf,
    /// Write the input and output matrices and the timing log to `output_dir`.
    pub persist: bool,
    /// Seed for the input matrices. Random inputs are drawn from entropy if `None`.
    pub seed: Option<u64>,
    pub trace_file: Option<PathBuf>,
    /// Compare every distributed result against a single-process multiplication.
    pub verify: bool,
    pub collect_order: CollectOrder,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            sizes: DEFAULT_SIZES.to_vec(),
            output_dir: PathBuf::from("."),
            persist: true,
            seed: None,
            trace_file: None,
            verify: false,
            collect_order: CollectOrder::RankOrder,
        }
    }
}

impl BenchmarkConfig {
    pub fn from_vars<F>(var: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut out = Self::default();

        if let Some(sizes) = var("MATBENCH_SIZES") {
            out.sizes = parse_sizes(&sizes)?;
        }

        if let Some(dir) = var("MATBENCH_OUTPUT_DIR") {
            let dir = dir.trim();

            if !dir.is_empty() {
                out.output_dir = dir.into();
            }
        }

        if let Some(flag) = var("MATBENCH_PERSIST") {
            out.persist = parse_flag("MATBENCH_PERSIST", &flag, out.persist);
        }

        if let Some(flag) = var("MATBENCH_VERIFY") {
            out.verify = parse_flag("MATBENCH_VERIFY", &flag, out.verify);
        }

        if let Some(seed) = var("MATBENCH_SEED") {
            let seed = seed.trim();

            if !seed.is_empty() {
                out.seed = Some(
                    seed.parse()
                        .map_err(|_| ConfigError::InvalidSeed(seed.to_string()))?,
                );
            }
        }

        if let Some(filename) = var("MATBENCH_TRACE") {
            let filename = filename.trim();

            if !filename.is_empty() {
                info!("writing trace to {:?}", filename);
                out.trace_file = Some(filename.into());
            }
        }

        if let Some(order) = var("MATBENCH_COLLECT") {
            out.collect_order = order.parse()?;
        }

        Ok(out)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sizes.is_empty() {
            return Err(ConfigError::NoSizes);
        }

        Ok(())
    }
}

/// Parses a comma or whitespace separated list of matrix dimensions.
pub fn parse_sizes(input: &str) -> Result<Vec<usize>, ConfigError> {
    let mut sizes = vec![];

    for item in input.split(|c: char| c == ',' || c.is_whitespace()) {
        if item.is_empty() {
            continue;
        }

        let value = item
            .parse::<i64>()
            .map_err(|_| ConfigError::InvalidSize(item.to_string()))?;

        if value < 0 {
            return Err(ConfigError::NegativeSize(value));
        }

        let size =
            usize::try_from(value).map_err(|_| ConfigError::InvalidSize(item.to_string()))?;
        sizes.push(size);
    }

    if sizes.is_empty() {
        return Err(ConfigError::NoSizes);
    }

    Ok(sizes)
}

fn parse_flag(key: &str, value: &str, fallback: bool) -> bool {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        "" => fallback,
        s => {
            warn!("unknown value {:?} for {}, reverting to {}", s, key, fallback);
            fallback
        }
    }
}
