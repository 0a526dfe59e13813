use crossbeam::channel;
use std::path::Path;
use std::time::Duration;

use matbench::driver::{
    matrix_path, parse_timing_log, read_matrix, run_benchmark, timing_log_path, MatrixKind,
    SizeReport,
};
use matbench::network::{
    execute_local, Communicator, LocalCommunicator, NetworkError, Tag, RESULT_TAG,
};
use matbench::types::{BenchmarkConfig, HasDataType, Matrix, WorkerId};
use matbench::worker::{CollectOrder, ProtocolError};
use matbench_kernels::reference_matmul;

fn config(dir: &Path, sizes: &[usize]) -> BenchmarkConfig {
    BenchmarkConfig {
        sizes: sizes.to_vec(),
        output_dir: dir.to_path_buf(),
        persist: true,
        seed: Some(1234),
        trace_file: None,
        verify: true,
        collect_order: CollectOrder::RankOrder,
    }
}

#[test]
fn test_benchmark_writes_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(dir.path(), &[3, 10, 1]);
    config.trace_file = Some(dir.path().join("trace.jsonl"));

    let results = execute_local(4, |comm| run_benchmark(&comm, &config)).unwrap();
    let mut results = results.into_iter().map(|r| r.unwrap());

    let reports = results.next().unwrap();
    assert_eq!(
        reports.iter().map(|r| r.size).collect::<Vec<_>>(),
        vec![3, 10, 1]
    );
    assert!(reports.iter().all(|r| r.verified && r.num_workers == 4));
    assert!(results.all(|r| r.is_empty()));

    for &n in &[3, 10, 1] {
        let a = read_matrix::<i32>(&matrix_path(dir.path(), n, MatrixKind::A)).unwrap();
        let b = read_matrix::<i32>(&matrix_path(dir.path(), n, MatrixKind::B)).unwrap();
        let c = read_matrix::<i64>(&matrix_path(dir.path(), n, MatrixKind::Result)).unwrap();

        assert_eq!(a.dim(), n);
        assert!(a.as_slice().iter().all(|v| (-100..=100).contains(v)));
        assert_eq!(c, reference_matmul(&a, &b).unwrap());
    }

    let log = std::fs::read_to_string(timing_log_path(dir.path(), 4)).unwrap();
    let sizes = parse_timing_log(&log)
        .unwrap()
        .into_iter()
        .map(|(size, _)| size)
        .collect::<Vec<_>>();
    assert_eq!(sizes, vec![3, 10, 1]);

    let trace = std::fs::read_to_string(dir.path().join("trace.jsonl")).unwrap();
    assert_eq!(trace.lines().count(), 3);
}

#[test]
fn test_result_independent_of_worker_count() {
    let mut outputs: Vec<Matrix<i64>> = vec![];

    for &p in &[1, 2, 5] {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path(), &[12]);
        config.collect_order = CollectOrder::Arrival;

        for result in execute_local(p, |comm| run_benchmark(&comm, &config)).unwrap() {
            result.unwrap();
        }

        let path = matrix_path(dir.path(), 12, MatrixKind::Result);
        outputs.push(read_matrix(&path).unwrap());
    }

    assert_eq!(outputs[0], outputs[1]);
    assert_eq!(outputs[0], outputs[2]);
}

#[test]
fn test_without_persistence_nothing_is_written() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(dir.path(), &[0, 4]);
    config.persist = false;

    let results = execute_local(2, |comm| run_benchmark(&comm, &config)).unwrap();
    assert_eq!(results[0].as_ref().unwrap().len(), 2);

    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn test_empty_size_list_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), &[]);

    let results = execute_local(2, |comm| run_benchmark(&comm, &config)).unwrap();
    assert!(results.iter().all(|r| r.is_err()));
}

type Outcome = Vec<anyhow::Result<Vec<SizeReport>>>;

/// Runs `f` on a separate thread and fails the test if it does not finish in time.
fn with_deadline<F>(f: F) -> Outcome
where
    F: FnOnce() -> Outcome + Send + 'static,
{
    let (sender, receiver) = channel::bounded(1);
    std::thread::spawn(move || {
        let _ = sender.send(f());
    });

    receiver
        .recv_timeout(Duration::from_secs(60))
        .expect("benchmark did not terminate")
}

fn left_group(e: &anyhow::Error) -> bool {
    e.chain()
        .filter_map(|cause| cause.downcast_ref::<NetworkError>())
        .any(NetworkError::is_departure)
}

#[test]
fn test_coordinator_setup_failure_ends_run() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("not-a-directory");
    std::fs::write(&blocker, "").unwrap();

    let config = config(&blocker, &[4, 4]);
    let results = with_deadline(move || {
        execute_local(2, |comm| run_benchmark(&comm, &config)).unwrap()
    });

    let err = results[0].as_ref().unwrap_err();
    assert!(format!("{:?}", err).contains("failed to create output directory"));
    assert!(!left_group(err));

    assert!(left_group(results[1].as_ref().unwrap_err()));
}

#[test]
fn test_failed_size_aborts_remaining_sizes() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(matrix_path(dir.path(), 4, MatrixKind::A)).unwrap();

    let config = config(dir.path(), &[2, 4, 6]);
    let results = with_deadline(move || {
        execute_local(3, |comm| run_benchmark(&comm, &config)).unwrap()
    });

    let err = results[0].as_ref().unwrap_err();
    assert!(err.to_string().contains("4x4"));
    assert!(results[1..]
        .iter()
        .all(|r| left_group(r.as_ref().unwrap_err())));

    let log = std::fs::read_to_string(timing_log_path(dir.path(), 3)).unwrap();
    let sizes = parse_timing_log(&log)
        .unwrap()
        .into_iter()
        .map(|(size, _)| size)
        .collect::<Vec<_>>();
    assert_eq!(sizes, vec![2]);
    assert!(!matrix_path(dir.path(), 6, MatrixKind::A).exists());
}

/// Delegates to a [`LocalCommunicator`], but rank 1 sends only half of every result block.
struct ShortBlocks(LocalCommunicator);

impl Communicator for ShortBlocks {
    fn my_id(&self) -> WorkerId {
        self.0.my_id()
    }

    fn num_workers(&self) -> usize {
        self.0.num_workers()
    }

    fn broadcast<T: HasDataType>(
        &self,
        root: WorkerId,
        buffer: &mut [T],
    ) -> Result<(), NetworkError> {
        self.0.broadcast(root, buffer)
    }

    fn send<T: HasDataType>(
        &self,
        dst: WorkerId,
        tag: Tag,
        buffer: &[T],
    ) -> Result<(), NetworkError> {
        if self.my_id() == WorkerId(1) && tag == RESULT_TAG {
            self.0.send(dst, tag, &buffer[..buffer.len() / 2])
        } else {
            self.0.send(dst, tag, buffer)
        }
    }

    fn probe<T: HasDataType>(
        &self,
        src: Option<WorkerId>,
        tag: Tag,
    ) -> Result<(WorkerId, usize), NetworkError> {
        self.0.probe::<T>(src, tag)
    }

    fn recv<T: HasDataType>(
        &self,
        src: WorkerId,
        tag: Tag,
        buffer: &mut [T],
    ) -> Result<(), NetworkError> {
        self.0.recv(src, tag, buffer)
    }

    fn barrier(&self) -> Result<(), NetworkError> {
        self.0.barrier()
    }
}

#[test]
fn test_block_size_mismatch_aborts_run() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(dir.path(), &[4, 4]);
    config.persist = false;

    let results = with_deadline(move || {
        execute_local(2, |comm| run_benchmark(&ShortBlocks(comm), &config)).unwrap()
    });

    let err = results[0].as_ref().unwrap_err();
    match err.chain().find_map(|cause| cause.downcast_ref::<ProtocolError>()) {
        Some(ProtocolError::BlockSizeMismatch {
            rank,
            expected,
            actual,
            ..
        }) => {
            assert_eq!(*rank, WorkerId(1));
            assert_eq!(*expected, 8);
            assert_eq!(*actual, 4);
        }
        other => panic!("unexpected error: {:?}", other),
    }

    // Rank 1 went on to the second size and was waiting for its inputs.
    let err = results[1].as_ref().unwrap_err();
    assert!(matches!(
        err.chain().find_map(|cause| cause.downcast_ref::<NetworkError>()),
        Some(NetworkError::PeerLeft(WorkerId(0)))
    ));
}
