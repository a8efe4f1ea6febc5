//! Durable per-task checkpoint records.
//!
//! Each path task directory holds one `status.json`, a flat human-readable
//! key-value document. The record is safe to delete to force a full re-run of
//! that task, and a corrupt record is silently replaced by defaults so the
//! pipeline always makes forward progress.
//!
//! Writes are read-modify-write over the whole record. That is safe only
//! under the pipeline's strictly sequential, one-directory-per-task execution
//! model; concurrent writers would need per-directory locking.

use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;
use tracing::warn;

pub const STATUS_FILENAME: &str = "status.json";

/// The checkpoint record for one path task.
///
/// Boolean flags are monotonic: once set they are never reset by the
/// pipeline. A step counter of zero means the stage has not been attempted.
/// The barrier and prefactor values are written together with their
/// completion flags, exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TaskStatus {
    pub initial_relax_complete: bool,
    pub final_relax_complete: bool,
    pub neb_steps_taken: u64,
    pub neb_climb_steps_taken: u64,
    pub neb_analysis_complete: bool,
    pub prefactor_complete: bool,
    #[serde(rename = "neb_barrier_eV")]
    pub neb_barrier_ev: Option<f64>,
    #[serde(rename = "prefactor_THz")]
    pub prefactor_thz: Option<f64>,
}

/// A mutation of exactly one field of a [`TaskStatus`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StatusUpdate {
    InitialRelaxComplete(bool),
    FinalRelaxComplete(bool),
    NebStepsTaken(u64),
    NebClimbStepsTaken(u64),
    NebAnalysisComplete(bool),
    PrefactorComplete(bool),
    NebBarrierEv(f64),
    PrefactorThz(f64),
}

impl StatusUpdate {
    fn apply(self, status: &mut TaskStatus) {
        match self {
            StatusUpdate::InitialRelaxComplete(v) => status.initial_relax_complete = v,
            StatusUpdate::FinalRelaxComplete(v) => status.final_relax_complete = v,
            StatusUpdate::NebStepsTaken(v) => status.neb_steps_taken = v,
            StatusUpdate::NebClimbStepsTaken(v) => status.neb_climb_steps_taken = v,
            StatusUpdate::NebAnalysisComplete(v) => status.neb_analysis_complete = v,
            StatusUpdate::PrefactorComplete(v) => status.prefactor_complete = v,
            StatusUpdate::NebBarrierEv(v) => status.neb_barrier_ev = Some(v),
            StatusUpdate::PrefactorThz(v) => status.prefactor_thz = Some(v),
        }
    }
}

fn persist(directory: &Path, status: &TaskStatus) -> io::Result<()> {
    let path = directory.join(STATUS_FILENAME);
    let tmp = directory.join(format!("{STATUS_FILENAME}.tmp"));
    let body = serde_json::to_string_pretty(status).map_err(io::Error::other)?;
    std::fs::write(&tmp, body)?;
    std::fs::rename(&tmp, &path)
}

/// Reads the status record for a task directory.
///
/// If the record does not exist yet, the defaults are persisted and returned,
/// so the file's existence becomes a side effect of the first read. If it
/// exists but cannot be parsed, it is discarded and replaced with defaults:
/// repair is silent, losing checkpoint data is preferred over halting.
/// Fields added to the schema after a record was written are merged in as
/// defaults on every read.
pub fn read(directory: &Path) -> io::Result<TaskStatus> {
    let path = directory.join(STATUS_FILENAME);
    if !path.exists() {
        let status = TaskStatus::default();
        persist(directory, &status)?;
        return Ok(status);
    }

    let content = std::fs::read_to_string(&path)?;
    match serde_json::from_str::<TaskStatus>(&content) {
        Ok(status) => Ok(status),
        Err(error) => {
            warn!(
                directory = %directory.display(),
                %error,
                "Corrupted status file; resetting to defaults"
            );
            let status = TaskStatus::default();
            persist(directory, &status)?;
            Ok(status)
        }
    }
}

/// Applies a single-field mutation: re-reads the full current record, applies
/// the update, writes the whole record back.
pub fn update(directory: &Path, change: StatusUpdate) -> io::Result<TaskStatus> {
    let mut status = read(directory)?;
    change.apply(&mut status);
    persist(directory, &status)?;
    Ok(status)
}
