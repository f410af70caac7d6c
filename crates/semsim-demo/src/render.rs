//! Text frames for the terminal view.
//!
//! Everything here is a pure function of a snapshot, so frames can be
//! tested without a runtime.

use std::fmt::Write as _;
use std::time::Duration;

use semsim_core::query::StateSnapshot;
use semsim_core::simulation::RunReport;
use semsim_core::state::WorkerRecord;
use semsim_core::status::WorkerStatus;

/// Width of the progress bar, in cells.
pub const BAR_WIDTH: usize = 20;

pub const EXPLANATION: &str = "\
Explanation:
- Each row is a process. The number on the left is its ID.
- The bar on a running process shows how much of its task is done.
- 'Waiting': the process is queued for a resource.
- 'Running': the process holds a resource and is working.
- 'Finished': the process completed its task and released the resource.
- 'Interrupted': the process was interrupted while queued or running.
A semaphore controls access, limiting how many processes run at once.";

/// Single-character marker for a status, standing in for a colour.
pub fn marker(status: WorkerStatus) -> char {
    match status {
        WorkerStatus::Waiting => '~',
        WorkerStatus::Running => '>',
        WorkerStatus::Finished => '=',
        WorkerStatus::Interrupted => 'x',
    }
}

/// Bar for a completion fraction in 0..=1.
pub fn progress_bar(fraction: f64) -> String {
    let fraction = fraction.clamp(0.0, 1.0);
    let filled = (fraction * BAR_WIDTH as f64) as usize;
    format!(
        "[{}{}] {:>3}%",
        "#".repeat(filled),
        ".".repeat(BAR_WIDTH - filled),
        (fraction * 100.0).round() as u32
    )
}

pub fn row(record: &WorkerRecord) -> String {
    let mut line = format!(
        "{} {:>4}  {:<11}",
        marker(record.status),
        record.id.0,
        record.status.label()
    );
    if record.status == WorkerStatus::Running {
        line.push(' ');
        line.push_str(&progress_bar(record.progress_fraction()));
    }
    line
}

pub fn legend() -> String {
    WorkerStatus::ALL
        .iter()
        .map(|&s| format!("{} {}", marker(s), s.label()))
        .collect::<Vec<_>>()
        .join("   ")
}

/// A full frame: header, one row per worker in id order, and a tally line.
pub fn frame(run: u64, elapsed: Duration, capacity: usize, snapshot: &StateSnapshot) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "run {run}  t={}ms  permits={capacity}  processes={}  task={}ms",
        elapsed.as_millis(),
        snapshot.len(),
        snapshot.task_duration().as_millis()
    );
    for record in snapshot.records() {
        let _ = writeln!(out, "{}", row(record));
    }
    let tally = snapshot
        .tally()
        .iter()
        .map(|(status, n)| format!("{}={n}", status.label()))
        .collect::<Vec<_>>()
        .join(" ");
    let _ = writeln!(out, "{tally}");
    out
}

pub fn summary(run: u64, report: &RunReport, available: usize, capacity: usize) -> String {
    format!(
        "run {run} complete: {} finished, {} interrupted ({} while running), permits {available}/{capacity} available",
        report.finished(),
        report.interrupted(),
        report.interrupted_while_running(),
    )
}
