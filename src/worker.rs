use std::{
    collections::BTreeSet,
    path::PathBuf,
    sync::{
        mpsc::{self, RecvTimeoutError},
        Arc, PoisonError, RwLock,
    },
    thread,
    time::Duration,
};

use crate::config::ProjectConfig;
use crate::index::{Index, IndexError};
use crate::progress::Progress;
use crate::source::{LocalCopies, SourceFiles};

/// Requests to the worker thread.
#[derive(Debug)]
enum Request {
    FullScan(LocalCopies),
    Edited { file: PathBuf, local_copies: LocalCopies },
    Shutdown,
}

/// Events not taken out with [`IndexWorker::next_event`] pile up to this many, newer ones are
/// dropped.
pub const EVENT_CAPACITY: usize = 1024;

/// What the worker reports back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    /// Number of steps of the run that just started.
    MaximumFound(usize),
    /// A step is about to be started.
    ProgressMade { step: usize, description: String },
    /// A new index is available, with that many definitions.
    Published { definitions: usize },
    /// The run failed, the previous index stays.
    Failed(String),
}

/// Sends without blocking. A full queue or nobody listening loses the event.
fn report(events: &mpsc::SyncSender<WorkerEvent>, event: WorkerEvent) {
    if let Err(mpsc::TrySendError::Full(event)) = events.try_send(event) {
        tracing::debug!("Event queue is full, dropping {:?}", event);
    }
}

impl Progress for mpsc::SyncSender<WorkerEvent> {
    fn maximum_found(&self, steps: usize) {
        report(self, WorkerEvent::MaximumFound(steps));
    }

    fn progress_made(&self, step: usize, description: &str) {
        report(
            self,
            WorkerEvent::ProgressMade {
                step,
                description: description.to_owned(),
            },
        );
    }
}

/// One run of the worker, merged from the requests that came in during the debounce delay.
#[derive(Debug, Default)]
struct Job {
    full: bool,
    changed: BTreeSet<PathBuf>,
    local_copies: LocalCopies,
}

impl Job {
    /// Takes a request in. Returns false on shutdown.
    fn merge(&mut self, request: Request) -> bool {
        match request {
            Request::FullScan(local_copies) => {
                self.full = true;
                self.local_copies = local_copies;
            }
            Request::Edited { file, local_copies } => {
                self.changed.insert(file);
                self.local_copies = local_copies;
            }
            Request::Shutdown => return false,
        }
        true
    }
}

/// Everything the worker thread owns.
struct Runner {
    files: SourceFiles,
    config: ProjectConfig,
    published: Arc<RwLock<Arc<Index>>>,
    /// Whether a full scan has been published. Until then edits are run as full scans.
    complete: bool,
    events: mpsc::SyncSender<WorkerEvent>,
}

impl Runner {
    fn run(mut self, receiver: mpsc::Receiver<Request>) {
        let delay = self.config.reparse_delay();

        while let Ok(request) = receiver.recv() {
            let mut job = Job::default();
            if !job.merge(request) {
                break;
            }

            // Wait until the edits stop coming in, a full scan starts right away
            let mut shutdown = false;
            while !job.full {
                match receiver.recv_timeout(delay) {
                    Ok(request) => {
                        if !job.merge(request) {
                            shutdown = true;
                            break;
                        }
                    }
                    Err(RecvTimeoutError::Timeout) => break,
                    Err(RecvTimeoutError::Disconnected) => {
                        shutdown = true;
                        break;
                    }
                }
            }

            self.execute(job);
            if shutdown {
                break;
            }
        }

        tracing::debug!("Index worker stopped");
    }

    #[tracing::instrument(skip_all, fields(full = job.full, changed = job.changed.len()))]
    fn execute(&mut self, mut job: Job) {
        if !self.complete && !job.full {
            tracing::debug!("No full scan published yet, rescanning everything");
            job.full = true;
        }

        let full = job.full;
        match self.build(job) {
            Ok(index) => {
                let definitions = index.len();
                *self
                    .published
                    .write()
                    .unwrap_or_else(PoisonError::into_inner) = index;
                self.complete |= full;
                report(&self.events, WorkerEvent::Published { definitions });
            }
            Err(err) => {
                tracing::warn!("Indexing failed: {}", err);
                report(&self.events, WorkerEvent::Failed(err.to_string()));
            }
        }
    }

    /// Builds the next index on the side, the published one is only replaced when all went well.
    fn build(&self, job: Job) -> Result<Arc<Index>, IndexError> {
        let files = self.files.overlaid(job.local_copies);

        if job.full {
            return Ok(Arc::new(Index::full_scan(&files, &self.config, &self.events)?));
        }

        let mut index = Arc::clone(&self.published.read().unwrap_or_else(PoisonError::into_inner));
        for file in &job.changed {
            index = Arc::new(index.rescan_file(&files, &self.config, file, &self.events)?);
        }
        Ok(index)
    }
}

/// Keeps an [`Index`] up to date on a background thread.
///
/// Edits are debounced by the configured reparse delay and runs never overlap. Readers always see
/// the last index that was built without errors.
pub struct IndexWorker {
    sender: mpsc::Sender<Request>,
    events: mpsc::Receiver<WorkerEvent>,
    published: Arc<RwLock<Arc<Index>>>,
    handler: Option<thread::JoinHandle<()>>,
}

impl IndexWorker {
    /// Starts the worker thread. `files` gives access to the files on disk, the local copies of
    /// each request are layered on top of it.
    pub fn spawn(files: SourceFiles, config: ProjectConfig) -> Self {
        let (sender, receiver) = mpsc::channel();
        let (event_sender, events) = mpsc::sync_channel(EVENT_CAPACITY);
        let published = Arc::new(RwLock::new(Arc::new(Index::new())));

        let runner = Runner {
            files,
            config,
            published: Arc::clone(&published),
            complete: false,
            events: event_sender,
        };
        let handler = thread::spawn(move || runner.run(receiver));

        Self {
            sender,
            events,
            published,
            handler: Some(handler),
        }
    }

    /// Rebuilds the whole index, without waiting for the debounce delay.
    pub fn full_scan(&self, local_copies: LocalCopies) {
        self.send(Request::FullScan(local_copies));
    }

    /// Schedules a rescan of `file`. `local_copies` is the snapshot of all unsaved files.
    pub fn file_edited(&self, file: impl Into<PathBuf>, local_copies: LocalCopies) {
        self.send(Request::Edited {
            file: file.into(),
            local_copies,
        });
    }

    fn send(&self, request: Request) {
        if self.sender.send(request).is_err() {
            tracing::warn!("Index worker is not running");
        }
    }

    /// The last published index.
    pub fn index(&self) -> Arc<Index> {
        Arc::clone(&self.published.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Next event, waiting at most `timeout`. Only the first [`EVENT_CAPACITY`] events that are
    /// not taken out are kept.
    pub fn next_event(&self, timeout: Duration) -> Option<WorkerEvent> {
        self.events.recv_timeout(timeout).ok()
    }

    /// Lets a queued run finish and stops the thread.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let _ = self.sender.send(Request::Shutdown);
        if let Some(handler) = self.handler.take() {
            if handler.join().is_err() {
                tracing::error!("Index worker panicked");
            }
        }
    }
}

impl Drop for IndexWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn test_job_merge() {
        let mut job = Job::default();
        let copies: LocalCopies = [("PRG/prg000.asm", "A = 1\n")].into_iter().collect();

        assert!(job.merge(Request::Edited {
            file: PathBuf::from("PRG/prg000.asm"),
            local_copies: LocalCopies::new(),
        }));
        assert!(job.merge(Request::Edited {
            file: PathBuf::from("PRG/prg000.asm"),
            local_copies: copies.clone(),
        }));
        assert!(!job.merge(Request::Shutdown));

        assert!(!job.full);
        assert_eq!(job.changed.len(), 1);
        assert_eq!(job.local_copies, copies);
    }

    #[test]
    fn test_full_event_queue_drops_events() {
        let (sender, receiver) = mpsc::sync_channel(1);
        sender.maximum_found(3);
        sender.progress_made(0, "Parsing: smb3.asm");

        assert_eq!(receiver.try_recv(), Ok(WorkerEvent::MaximumFound(3)));
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn test_events_as_progress() {
        let (sender, receiver) = mpsc::sync_channel(EVENT_CAPACITY);
        sender.maximum_found(3);
        sender.progress_made(0, "Parsing: smb3.asm");

        assert_eq!(receiver.recv().unwrap(), WorkerEvent::MaximumFound(3));
        assert_eq!(
            receiver.recv().unwrap(),
            WorkerEvent::ProgressMade {
                step: 0,
                description: "Parsing: smb3.asm".to_owned()
            }
        );
    }
}
