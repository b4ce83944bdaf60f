//! Terrain dataset ingestion and the per-scenario background worker.

use std::io::Read;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};

use mission_common::{CoreError, CoreResult, TerrainFile};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Metadata about a terrain file that was read successfully.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerrainDataset {
    pub name: String,
    pub file: TerrainFile,
    pub bytes: u64,
    /// Hex SHA-256 of the file contents.
    pub digest: String,
}

/// Read a terrain file end to end and fingerprint it.
///
/// Blocking; scenarios call this from their terrain worker.
pub fn ingest(file: &TerrainFile) -> CoreResult<TerrainDataset> {
    let _span = tracing::info_span!("terrain_ingest", path = %file.path().display()).entered();
    let name = file.name()?;
    let io_err = |source| CoreError::Io {
        path: file.path().to_path_buf(),
        source,
    };

    let mut reader = std::fs::File::open(file.path()).map_err(io_err)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    let mut bytes = 0u64;
    loop {
        let n = reader.read(&mut buf).map_err(io_err)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        bytes += n as u64;
    }
    let digest = hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<String>();

    tracing::debug!(%name, bytes, "terrain ingested");
    Ok(TerrainDataset {
        name,
        file: file.clone(),
        bytes,
        digest,
    })
}

/// Completion handle for a queued terrain load.
#[derive(Debug)]
pub struct TerrainTicket {
    rx: mpsc::Receiver<CoreResult<TerrainDataset>>,
}

impl TerrainTicket {
    pub(crate) fn new(rx: mpsc::Receiver<CoreResult<TerrainDataset>>) -> Self {
        Self { rx }
    }

    /// Block until the load finishes.
    ///
    /// Fails with `InvalidState` if the job was dropped without running,
    /// e.g. because its scenario went away first.
    pub fn wait(self) -> CoreResult<TerrainDataset> {
        self.rx.recv().map_err(|_| {
            CoreError::InvalidState("terrain load was dropped before completing".into())
        })?
    }

    /// Non-blocking poll. `None` while the load is still queued or running.
    pub fn try_result(&self) -> Option<CoreResult<TerrainDataset>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(mpsc::TryRecvError::Empty) => None,
            Err(mpsc::TryRecvError::Disconnected) => Some(Err(CoreError::InvalidState(
                "terrain load was dropped before completing".into(),
            ))),
        }
    }
}

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Single background thread running terrain jobs one at a time.
///
/// The thread is spawned on first use and exits once the worker is dropped
/// and its queue drained.
#[derive(Debug)]
pub(crate) struct TerrainWorker {
    name: String,
    inner: Mutex<Option<(mpsc::Sender<Job>, JoinHandle<()>)>>,
}

impl TerrainWorker {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inner: Mutex::new(None),
        }
    }

    pub(crate) fn submit(&self, job: Job) -> CoreResult<()> {
        let mut inner = self.inner.lock();
        if inner.is_none() {
            *inner = Some(self.spawn()?);
        }
        let Some((tx, _)) = inner.as_ref() else {
            return Err(CoreError::InvalidState("terrain worker unavailable".into()));
        };
        tx.send(job)
            .map_err(|_| CoreError::InvalidState("terrain worker has shut down".into()))
    }

    fn spawn(&self) -> CoreResult<(mpsc::Sender<Job>, JoinHandle<()>)> {
        let (tx, rx) = mpsc::channel::<Job>();
        let thread_name = format!("terrain-{}", self.name);
        let handle = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                while let Ok(job) = rx.recv() {
                    if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                        tracing::warn!(worker = %thread_name, "terrain job panicked");
                    }
                }
                tracing::trace!(worker = %thread_name, "terrain worker exiting");
            })
            .map_err(|e| {
                CoreError::InvalidState(format!("cannot spawn terrain worker: {e}"))
            })?;
        tracing::debug!(worker = %self.name, "terrain worker started");
        Ok((tx, handle))
    }
}

impl Drop for TerrainWorker {
    fn drop(&mut self) {
        let Some((tx, handle)) = self.inner.get_mut().take() else {
            return;
        };
        drop(tx);
        // The last scenario handle can be released by a job on the worker
        // itself; joining there would deadlock.
        if handle.thread().id() != thread::current().id() {
            let _ = handle.join();
        }
    }
}
