//! Running one operation on a worker thread.
//!
//! Progress crosses back to the caller over an mpsc channel; the caller
//! drains [`BackgroundRun::events`] and finally calls
//! [`BackgroundRun::wait`] for the report.

use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::debug;

use crate::error::{CoreError, CoreResult};
use crate::orchestrator::Orchestrator;
use crate::progress::ProgressObserver;
use crate::report::OperationReport;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ProgressEvent {
    Fraction(f64),
    BeginIndeterminate,
    EndIndeterminate,
}

/// Forwards progress to a channel. A dropped receiver is not an error.
struct ChannelObserver {
    tx: Sender<ProgressEvent>,
}

impl ProgressObserver for ChannelObserver {
    fn set_fraction(&mut self, fraction: f64) {
        let _ = self.tx.send(ProgressEvent::Fraction(fraction));
    }

    fn begin_indeterminate(&mut self) {
        let _ = self.tx.send(ProgressEvent::BeginIndeterminate);
    }

    fn end_indeterminate(&mut self) {
        let _ = self.tx.send(ProgressEvent::EndIndeterminate);
    }
}

/// An operation to run in the background.
#[derive(Clone, Debug)]
pub enum Job {
    Decompile {
        rom: PathBuf,
        project: PathBuf,
    },
    DecompilePartial {
        rom: PathBuf,
        project: PathBuf,
    },
    Compile {
        project: PathBuf,
        base_rom: PathBuf,
        output: PathBuf,
    },
    Upgrade {
        project: PathBuf,
        base_rom: PathBuf,
    },
}

impl Job {
    fn run(&self, orchestrator: &Orchestrator, observer: &mut dyn ProgressObserver) -> CoreResult<OperationReport> {
        match self {
            Self::Decompile { rom, project } => orchestrator.decompile(rom, project, observer),
            Self::DecompilePartial { rom, project } => orchestrator.decompile_partial(rom, project, observer),
            Self::Compile {
                project,
                base_rom,
                output,
            } => orchestrator.compile(project, base_rom, output, observer),
            Self::Upgrade { project, base_rom } => orchestrator.upgrade(project, base_rom, observer),
        }
    }
}

/// Handle to a job running on its own thread.
pub struct BackgroundRun {
    events: Receiver<ProgressEvent>,
    handle: JoinHandle<CoreResult<OperationReport>>,
}

impl BackgroundRun {
    /// Progress events; the iterator ends when the job finishes.
    pub fn events(&self) -> &Receiver<ProgressEvent> {
        &self.events
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Block until the job ends and return its result.
    pub fn wait(self) -> CoreResult<OperationReport> {
        self.handle.join().map_err(|_| CoreError::WorkerPanicked)?
    }
}

/// Start `job` on a new thread.
pub fn spawn(orchestrator: Arc<Orchestrator>, job: Job) -> BackgroundRun {
    let (tx, rx) = mpsc::channel();
    let handle = thread::spawn(move || {
        debug!(?job, "background job started");
        let mut observer = ChannelObserver { tx };
        job.run(&orchestrator, &mut observer)
    });
    BackgroundRun { events: rx, handle }
}
