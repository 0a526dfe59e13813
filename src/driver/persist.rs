//! Plain-text files written by the coordinator: matrices and the timing log.
use std::fmt::Display;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::prelude::*;
use crate::types::{HasDataType, Matrix};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MatrixKind {
    A,
    B,
    Result,
}

pub fn matrix_path(dir: &Path, n: usize, kind: MatrixKind) -> PathBuf {
    let filename = match kind {
        MatrixKind::A => format!("matrix_{}_A.txt", n),
        MatrixKind::B => format!("matrix_{}_B.txt", n),
        MatrixKind::Result => format!("matrixRes_{}.txt", n),
    };

    dir.join(filename)
}

pub fn timing_log_path(dir: &Path, num_workers: usize) -> PathBuf {
    dir.join(format!("ResultExperimentMPI_{}thread.txt", num_workers))
}

/// Writes one row per line, every element followed by a single space.
pub fn write_matrix<T>(path: &Path, matrix: &Matrix<T>) -> Result
where
    T: HasDataType + Display,
{
    let file = File::create(path).with_context(|| format!("failed to create {:?}", path))?;
    let mut writer = BufWriter::new(file);

    for row in matrix.iter_rows() {
        for value in row {
            write!(writer, "{} ", value)?;
        }

        writeln!(writer)?;
    }

    writer
        .flush()
        .with_context(|| format!("failed to write {:?}", path))?;
    Ok(())
}

/// Parses a matrix written by [`write_matrix`]. Any whitespace separates elements; the
/// number of lines determines the dimension.
pub fn parse_matrix<T>(text: &str) -> Result<Matrix<T>>
where
    T: HasDataType + FromStr,
    <T as FromStr>::Err: StdError + Send + Sync + 'static,
{
    let mut rows = vec![];

    for (index, line) in enumerate(text.lines()) {
        if line.trim().is_empty() {
            continue;
        }

        let row = line
            .split_whitespace()
            .map(|v| v.parse::<T>())
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("invalid element on line {}", index + 1))?;

        rows.push(row);
    }

    Ok(Matrix::from_rows(&rows)?)
}

pub fn read_matrix<T>(path: &Path) -> Result<Matrix<T>>
where
    T: HasDataType + FromStr,
    <T as FromStr>::Err: StdError + Send + Sync + 'static,
{
    let text =
        std::fs::read_to_string(path).with_context(|| format!("failed to read {:?}", path))?;
    parse_matrix(&text).with_context(|| format!("failed to parse {:?}", path))
}

pub fn format_timing_line(n: usize, elapsed: Duration) -> String {
    format!("For matrix size{}x{} time -  {} ms", n, n, elapsed.as_millis())
}

/// Parses the lines written by [`TimingLog`] into `(size, milliseconds)` pairs.
pub fn parse_timing_log(text: &str) -> Result<Vec<(usize, u64)>> {
    let mut entries = vec![];

    for (index, line) in enumerate(text.lines()) {
        if line.trim().is_empty() {
            continue;
        }

        let entry = try_parse_timing_line(line)
            .ok_or_else(|| anyhow!("malformed timing entry on line {}: {:?}", index + 1, line))?;
        entries.push(entry);
    }

    Ok(entries)
}

fn try_parse_timing_line(line: &str) -> Option<(usize, u64)> {
    let (_, rest) = line.split_once("size")?;
    let (size, _) = rest.split_once('x')?;
    let (_, rest) = rest.split_once('-')?;
    let (millis, _) = rest.split_once("ms")?;

    Some((size.trim().parse().ok()?, millis.trim().parse().ok()?))
}

/// Timing log of a benchmark run, one line per matrix size.
#[derive(Debug)]
pub struct TimingLog {
    path: PathBuf,
    file: File,
}

impl TimingLog {
    /// Creates (or truncates) the log file.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .with_context(|| format!("failed to create timing log {:?}", path))?;

        info!("writing timing log to {:?}", path);
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&mut self, n: usize, elapsed: Duration) -> Result {
        writeln!(self.file, "{}", format_timing_line(n, elapsed))
            .and_then(|_| self.file.flush())
            .with_context(|| format!("failed to write timing log {:?}", self.path))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_matrix_text_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = matrix_path(dir.path(), 2, MatrixKind::A);
        assert!(path.ends_with("matrix_2_A.txt"));

        let m = Matrix::<i32>::from_rows(&[[1, -2], [30, 4]]).unwrap();
        write_matrix(&path, &m).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "1 -2 \n30 4 \n");
        assert_eq!(read_matrix::<i32>(&path).unwrap(), m);
    }

    #[test]
    fn test_parse_matrix_errors() {
        parse_matrix::<i32>("1 2\n3\n").unwrap_err();
        parse_matrix::<i32>("1 x\n3 4\n").unwrap_err();
        assert!(parse_matrix::<i64>("").unwrap().is_empty());
    }

    #[test]
    fn test_timing_log() {
        let line = format_timing_line(500, Duration::from_millis(1234));
        assert_eq!(line, "For matrix size500x500 time -  1234 ms");

        let dir = tempfile::tempdir().unwrap();
        let path = timing_log_path(dir.path(), 4);
        assert!(path.ends_with("ResultExperimentMPI_4thread.txt"));

        let mut log = TimingLog::create(&path).unwrap();
        log.append(10, Duration::from_millis(3)).unwrap();
        log.append(1800, Duration::from_secs(2)).unwrap();

        let text = std::fs::read_to_string(log.path()).unwrap();
        assert_eq!(
            parse_timing_log(&text).unwrap(),
            vec![(10, 3), (1800, 2000)]
        );

        parse_timing_log("For matrix size10x10 time - fast").unwrap_err();
    }
}
