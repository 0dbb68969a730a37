//! Benchmarking harness for the external solver.
//!
//! Runs instance × agent-count configurations strictly sequentially (so
//! elapsed-time measurements stay meaningful), certifies single-agent runs
//! against the reference database, and persists the record list to JSON
//! after every configuration so a crash mid-run preserves prior results.
//! The first certification violation aborts the whole run.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};

use crate::certify::BoundCertifier;
use crate::error::Error;
use crate::instance::{AgentSet, Instance, OptimizationMode};
use crate::solver::{RawMtspSolver, SolveOptions, SolverGateway};
use crate::tours::Bounds;

/// Result of one (instance, agent count, mode) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkRecord {
    pub name: String,
    #[serde(rename = "N")]
    pub nodes: usize,
    #[serde(rename = "A")]
    pub agents: usize,
    pub mode: OptimizationMode,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lower_bound: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upper_bound: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gap: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path_lengths: Option<Vec<i64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One instance to benchmark, tagged with its kind ("tsp", "atsp", "sop").
/// The kind selects the reference-database section and the agent anchoring.
#[derive(Debug, Clone)]
pub struct BenchmarkInstance {
    pub kind: String,
    pub name: String,
    pub instance: Instance,
}

impl BenchmarkInstance {
    pub fn new(kind: impl Into<String>, name: impl Into<String>, instance: Instance) -> Self {
        BenchmarkInstance { kind: kind.into(), name: name.into(), instance }
    }

    /// Start/end anchors for `agents` agents, following the conventions of
    /// the reference data: sequential-ordering instances run 0 -> N-1 for
    /// every agent, all others give agent `a` the closed depot `a + 1`.
    pub fn agent_set(&self, agents: usize) -> Result<AgentSet, Error> {
        let n = self.instance.n();
        let set = if self.kind == "sop" {
            AgentSet::new(vec![0; agents], vec![n - 1; agents])?
        } else {
            let anchors: Vec<usize> = (1..=agents).collect();
            AgentSet::new(anchors.clone(), anchors)?
        };
        Ok(set)
    }
}

/// Harness configuration.
#[derive(Debug, Clone)]
pub struct BenchmarkConfig {
    /// Agent counts to sweep per instance.
    pub agent_counts: Vec<usize>,
    pub mode: OptimizationMode,
    /// Per-solve timeout.
    pub timeout: Duration,
    pub threads: usize,
    /// Where the JSON record list is persisted after every configuration.
    pub output_path: PathBuf,
    /// Draw a progress bar over the configuration sweep.
    pub progress: bool,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        BenchmarkConfig {
            agent_counts: vec![1, 2, 4, 8],
            mode: OptimizationMode::Sum,
            timeout: Duration::from_secs(5 * 60),
            threads: 1,
            output_path: PathBuf::from("bench.json"),
            progress: true,
        }
    }
}

/// Benchmarking engine: a gateway, a certifier, and the accumulated records.
pub struct Benchmark<S> {
    gateway: SolverGateway<S>,
    certifier: BoundCertifier,
    config: BenchmarkConfig,
    records: Vec<BenchmarkRecord>,
}

impl<S: RawMtspSolver> Benchmark<S> {
    pub fn new(gateway: SolverGateway<S>, certifier: BoundCertifier, config: BenchmarkConfig) -> Self {
        Benchmark { gateway, certifier, config, records: Vec::new() }
    }

    /// Run the full sweep. Stops at the first certification violation,
    /// after persisting everything recorded so far.
    pub fn run(&mut self, instances: &[BenchmarkInstance]) -> Result<(), Error> {
        let total = (instances.len() * self.config.agent_counts.len()) as u64;
        let bar = if self.config.progress {
            let bar = ProgressBar::new(total);
            if let Ok(style) =
                ProgressStyle::with_template("{msg:30} [{bar:40}] {pos}/{len} ({elapsed})")
            {
                bar.set_style(style);
            }
            bar
        } else {
            ProgressBar::hidden()
        };

        let agent_counts = self.config.agent_counts.clone();
        for bench in instances {
            for &agents in &agent_counts {
                bar.set_message(format!("{} A={}", bench.name, agents));
                self.run_configuration(bench, agents)?;
                bar.inc(1);
            }
        }
        bar.finish_and_clear();
        Ok(())
    }

    fn run_configuration(&mut self, bench: &BenchmarkInstance, agents: usize) -> Result<(), Error> {
        let agent_set = bench.agent_set(agents)?;
        let options = SolveOptions {
            mode: self.config.mode,
            timeout: self.config.timeout,
            threads: self.config.threads,
            snapshot_stride: None,
            allow_shared_starts: true,
        };

        let mut record = BenchmarkRecord {
            name: bench.name.clone(),
            nodes: bench.instance.n(),
            agents,
            mode: self.config.mode,
            timestamp: chrono::Local::now().to_rfc3339(),
            seconds: None,
            lower_bound: None,
            upper_bound: None,
            gap: None,
            path_lengths: None,
            error: None,
        };

        match self.gateway.solve(&bench.instance, &agent_set, &options) {
            Ok(outcome) => {
                let result = outcome.result;
                let bounds = result.bounds;

                if let Err(violation) =
                    self.certifier.certify(&bench.kind, &bench.name, agents, bounds)
                {
                    // A correctness regression, not transient noise: persist
                    // what we have and halt the run.
                    log::error!("{}", violation);
                    self.persist()?;
                    return Err(violation.into());
                }

                record.seconds = Some(result.elapsed.as_secs_f64());
                record.lower_bound = Some(bounds.lower);
                record.upper_bound = Some(bounds.upper);
                record.gap = Some(bounds.gap());
                record.path_lengths = Some(result.lengths);
                log::info!(
                    "{} A={}: bounds {} gap {:.2}% in {:.1}s",
                    bench.name,
                    agents,
                    bounds,
                    bounds.gap() * 100.0,
                    result.elapsed.as_secs_f64(),
                );
            }
            Err(Error::Solve(e)) => {
                log::warn!("{} A={}: {}", bench.name, agents, e);
                record.error = Some(e.to_string());
            }
            Err(other) => return Err(other),
        }

        self.records.push(record);
        self.persist()
    }

    fn persist(&self) -> Result<(), Error> {
        let file = File::create(&self.config.output_path)?;
        serde_json::to_writer_pretty(BufWriter::new(file), &self.records)?;
        Ok(())
    }

    pub fn records(&self) -> &[BenchmarkRecord] {
        &self.records
    }

    /// Bounds of a successful record, if both ends were filled in.
    pub fn record_bounds(record: &BenchmarkRecord) -> Option<Bounds> {
        match (record.lower_bound, record.upper_bound) {
            (Some(lb), Some(ub)) => Some(Bounds::new(lb, ub)),
            _ => None,
        }
    }

    /// Export the records as CSV, with per-agent lengths joined by spaces.
    pub fn export_csv<P: AsRef<Path>>(&self, path: P) -> Result<(), Error> {
        let file = File::create(path)?;
        let mut writer = csv::Writer::from_writer(file);

        writer.write_record([
            "name", "N", "A", "mode", "timestamp", "seconds", "lower_bound", "upper_bound", "gap",
            "path_lengths", "error",
        ])?;
        for r in &self.records {
            let lengths = r
                .path_lengths
                .as_ref()
                .map(|ls| ls.iter().map(i64::to_string).collect::<Vec<_>>().join(" "));
            writer.write_record([
                r.name.clone(),
                r.nodes.to_string(),
                r.agents.to_string(),
                r.mode.to_string(),
                r.timestamp.clone(),
                r.seconds.map(|s| format!("{:.3}", s)).unwrap_or_default(),
                r.lower_bound.map(|b| b.to_string()).unwrap_or_default(),
                r.upper_bound.map(|b| b.to_string()).unwrap_or_default(),
                r.gap.map(|g| g.to_string()).unwrap_or_default(),
                lengths.unwrap_or_default(),
                r.error.clone().unwrap_or_default(),
            ])?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Plain-text summary of all recorded configurations.
    pub fn generate_report(&self) -> String {
        let mut report = String::new();
        report.push_str(&format!(
            "{:<20} {:>6} {:>4} {:>12} {:>12} {:>9} {:>9}\n",
            "Instance", "N", "A", "Lower", "Upper", "Gap%", "Time"
        ));
        report.push_str(&"-".repeat(78));
        report.push('\n');
        for r in &self.records {
            match &r.error {
                Some(e) => {
                    report.push_str(&format!(
                        "{:<20} {:>6} {:>4} error: {}\n",
                        r.name, r.nodes, r.agents, e
                    ));
                }
                None => {
                    report.push_str(&format!(
                        "{:<20} {:>6} {:>4} {:>12.2} {:>12.2} {:>9.2} {:>9.1}\n",
                        r.name,
                        r.nodes,
                        r.agents,
                        r.lower_bound.unwrap_or(f64::NAN),
                        r.upper_bound.unwrap_or(f64::NAN),
                        r.gap.unwrap_or(f64::NAN) * 100.0,
                        r.seconds.unwrap_or(f64::NAN),
                    ));
                }
            }
        }
        report
    }
}
