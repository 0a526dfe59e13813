use serde_json::{json, Value as Json};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use super::SizeReport;
use crate::prelude::*;

/// JSON-lines trace with the phase timings of every benchmarked size.
#[derive(Debug)]
pub(super) struct BenchmarkTrace {
    file: File,
}

impl BenchmarkTrace {
    pub(super) fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file =
            File::create(path).with_context(|| format!("failed to create trace {:?}", path))?;
        info!("writing trace to: {:?}", path);

        Ok(Self { file })
    }

    pub(super) fn add(&mut self, report: &SizeReport) {
        let record = convert_report(report);

        if let Err(e) = serde_json::to_writer(&self.file, &record) {
            warn!("writing trace failed: {}", e);
        }

        let _ = self.file.write(&[b'\n']);
    }
}

fn millis(d: Duration) -> f64 {
    d.as_micros() as f64 / 1000.0
}

fn convert_report(report: &SizeReport) -> Json {
    json!({
        "size": report.size,
        "num_workers": report.num_workers,
        "host": crate::hostname(),
        "elapsed_ms": millis(report.elapsed),
        "phases": {
            "distribute_ms": millis(report.timings.distribute),
            "compute_ms": millis(report.timings.compute),
            "collect_ms": millis(report.timings.collect),
        },
        "verified": report.verified,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::worker::PhaseTimings;

    #[test]
    fn test_trace_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.json");
        let mut trace = BenchmarkTrace::new(&path).unwrap();

        for &size in [3, 5].iter() {
            trace.add(&SizeReport {
                size,
                num_workers: 2,
                elapsed: Duration::from_millis(4),
                timings: PhaseTimings {
                    distribute: Duration::from_millis(1),
                    compute: Duration::from_millis(2),
                    collect: Duration::from_millis(1),
                },
                verified: false,
            });
        }

        let text = std::fs::read_to_string(&path).unwrap();
        let records = text
            .lines()
            .map(|l| serde_json::from_str::<Json>(l).unwrap())
            .collect::<Vec<_>>();

        assert_eq!(records.len(), 2);
        assert_eq!(records[1]["size"], 5);
        assert_eq!(records[0]["phases"]["compute_ms"], 2.0);
    }
}
