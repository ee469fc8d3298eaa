//! Per-task performance sampling, appended to a rolling daily CSV under
//! `logs/performance/` (spec §4.6, §6). Sampling failures are swallowed —
//! a missed metrics row must never fail the task it's measuring.

use aoi_model::{TaskKind, TaskStatus};
use chrono::Utc;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use sysinfo::{Pid, ProcessesToUpdate, System};
use uuid::Uuid;

pub struct PerfLog {
    dir: PathBuf,
}

impl PerfLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn record(
        &self,
        function: TaskKind,
        product_id: &str,
        lot_id: Option<&str>,
        station: Option<&str>,
        task_id: Uuid,
        status: TaskStatus,
        elapsed: Duration,
    ) {
        if let Err(err) = self.try_record(function, product_id, lot_id, station, task_id, status, elapsed) {
            tracing::warn!(error = %err, "performance sample dropped");
        }
    }

    fn try_record(
        &self,
        function: TaskKind,
        product_id: &str,
        lot_id: Option<&str>,
        station: Option<&str>,
        task_id: Uuid,
        status: TaskStatus,
        elapsed: Duration,
    ) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for_today();
        let is_new = !path.exists();
        let mut file = std::fs::OpenOptions::new().create(true).append(true).open(&path)?;
        if is_new {
            writeln!(file, "timestamp,function,product_id,lot_id,station,task_id,status,elapsed_time,memory_usage_mb,cpu_percent,thread_count")?;
        }
        let (memory_mb, cpu_percent, thread_count) = sample_process();
        writeln!(
            file,
            "{},{},{},{},{},{},{},{:.3},{:.1},{:.1},{}",
            Utc::now().to_rfc3339(),
            function,
            product_id,
            lot_id.unwrap_or(""),
            station.unwrap_or(""),
            task_id,
            status_label(status),
            elapsed.as_secs_f64(),
            memory_mb,
            cpu_percent,
            thread_count,
        )
    }

    fn path_for_today(&self) -> PathBuf {
        self.dir.join(format!("perf_{}.csv", Utc::now().format("%Y%m%d")))
    }
}

fn status_label(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Pending => "pending",
        TaskStatus::Running => "running",
        TaskStatus::Completed => "completed",
        TaskStatus::Failed => "failed",
    }
}

/// Best-effort self-process sampling via `sysinfo`'s process table, the
/// same crate `StorageTierMover` uses for disk usage. A fresh `System` per
/// call means `cpu_usage` reflects a single instantaneous snapshot rather
/// than a delta over the task's runtime; still useful as a relative signal
/// across rows in the same CSV.
fn sample_process() -> (f64, f64, usize) {
    let threads = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
    let pid = Pid::from_u32(std::process::id());
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::Some(&[pid]));
    let Some(process) = system.process(pid) else {
        return (0.0, 0.0, threads);
    };
    let memory_mb = process.memory() as f64 / (1024.0 * 1024.0);
    let cpu_percent = process.cpu_usage() as f64;
    (memory_mb, cpu_percent, threads)
}
