//! The operation engine: GET / CREATE / UPDATE / DELETE against a
//! remote Git repository, with write serialization, store sweeping,
//! and retry on stale pushes.

use std::sync::{Arc, Condvar, Mutex, RwLock};
use std::thread;
use std::time::Duration;

use bstr::BString;
use gitkv_hash::ObjectId;
use gitkv_object::{Commit, ObjectType, Signature};
use gitkv_protocol::push::{PushReport, RefStatus, RefUpdate};
use gitkv_store::MemoryStore;

use crate::config::Config;
use crate::context::OpContext;
use crate::error::{ApiError, ErrorKind};
use crate::retry::{run_with_retry, BackoffPolicy};
use crate::session::Session;
use crate::tree::{load_tree, resolve_path, set_path, split_path};
use crate::walk::build_pack;

/// The branch all state lives on.
pub const MAIN_REF: &str = "refs/heads/main";

/// Outcome receipt: how many failed attempts preceded success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Receipt {
    pub retries: u32,
}

/// Existence precondition for a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Precondition {
    MustExist,
    MustNotExist,
}

/// Key→blob storage backed by a remote Git repository.
///
/// All operations are safe to call from multiple threads. Writes are
/// funneled through an in-process serializer by default; cross-process
/// races resolve through the remote's ref-update atomicity plus the
/// retry loop.
#[derive(Debug)]
pub struct Backend {
    session: Session,
    /// Session lock: operations hold it for reading, the sweeper holds
    /// it for writing while swapping in a fresh store.
    store: Arc<RwLock<Arc<MemoryStore>>>,
    write_serializer: Mutex<()>,
    config: Config,
    sweeper: Option<Sweeper>,
}

impl Backend {
    /// Open a backend against the configured endpoint.
    ///
    /// With `warm_up` enabled (the default) both service handshakes are
    /// performed eagerly so misconfiguration fails here, not on first
    /// use.
    pub fn open(config: Config) -> Result<Self, ApiError> {
        let session = Session::open(&config.endpoint, config.credentials.clone())?;
        let store = Arc::new(RwLock::new(Arc::new(MemoryStore::new())));
        let sweeper = Sweeper::spawn(Arc::clone(&store), config.sweep_period);

        let backend = Self {
            session,
            store,
            write_serializer: Mutex::new(()),
            config,
            sweeper: Some(sweeper),
        };

        if backend.config.warm_up {
            let ctx = OpContext::background();
            backend.session.read_connection(&ctx)?.close();
            backend.session.write_connection(&ctx)?.close();
        }

        Ok(backend)
    }

    /// Read the blob at `path` from the current main tip.
    pub fn get(&self, ctx: &OpContext, path: &str) -> Result<(Vec<u8>, Receipt), ApiError> {
        ctx.check()?;
        let segments = split_path(path)?;

        let lease = self.store.read().unwrap();
        let store = Arc::clone(&lease);

        let data = self.get_inner(ctx, &store, &segments)?;
        drop(lease);
        Ok((data, Receipt { retries: 0 }))
    }

    /// Store `body` at `path`; the path must not already exist.
    pub fn create(&self, ctx: &OpContext, path: &str, body: &[u8]) -> Result<Receipt, ApiError> {
        self.write(ctx, path, Some(body), Precondition::MustNotExist)
    }

    /// Overwrite the blob at `path`; the path must exist.
    pub fn update(&self, ctx: &OpContext, path: &str, body: &[u8]) -> Result<Receipt, ApiError> {
        self.write(ctx, path, Some(body), Precondition::MustExist)
    }

    /// Remove the entry at `path`; the path must exist.
    pub fn delete(&self, ctx: &OpContext, path: &str) -> Result<Receipt, ApiError> {
        self.write(ctx, path, None, Precondition::MustExist)
    }

    fn get_inner(
        &self,
        ctx: &OpContext,
        store: &MemoryStore,
        segments: &[BString],
    ) -> Result<Vec<u8>, ApiError> {
        let mut conn = self.session.read_connection(ctx)?;
        let Some(tip) = conn.ref_oid(MAIN_REF) else {
            // Absent ref: empty or brand-new repository.
            return Err(ApiError::with_source(
                ErrorKind::NotFound,
                format!("{MAIN_REF} not advertised"),
            ));
        };

        conn.fetch(ctx, store, &[tip], self.config.blob_filter_on_fetch)?;
        conn.close();

        let commit = load_commit(store, &tip)?;
        let tree = load_tree(store, &commit.tree)?;
        let oid = resolve_path(store, &tree, segments)?
            .ok_or_else(|| ApiError::new(ErrorKind::NotFound))?;

        match store.get(ObjectType::Blob, &oid) {
            Some(blob) => Ok(blob.payload().to_vec()),
            None => {
                // Blob-filtered fetch left the content behind; fetch it
                // by OID on a fresh connection (upload-pack is
                // one-shot). An empty pack means it arrived with an
                // earlier fetch after all, so re-check the store.
                let mut blob_conn = self.session.read_connection(ctx)?;
                blob_conn.fetch(ctx, store, &[oid], false)?;
                blob_conn.close();
                store
                    .get(ObjectType::Blob, &oid)
                    .map(|blob| blob.payload().to_vec())
                    .ok_or_else(|| {
                        ApiError::internal(format!("blob {oid} still missing after fetch"))
                    })
            }
        }
    }

    fn write(
        &self,
        ctx: &OpContext,
        path: &str,
        body: Option<&[u8]>,
        precondition: Precondition,
    ) -> Result<Receipt, ApiError> {
        ctx.check()?;
        let segments = split_path(path)?;
        let path = path.strip_prefix('/').unwrap_or(path);

        // Lock order: session lease, then write serializer; the store
        // mutex is only ever taken inside an attempt.
        let lease = self.store.read().unwrap();
        let store = Arc::clone(&lease);
        let _serialized = self
            .config
            .serialize_writes
            .then(|| self.write_serializer.lock().unwrap());

        let policy = BackoffPolicy {
            initial: self.config.backoff_initial,
            max: self.config.backoff_max,
        };

        let result = run_with_retry(ctx, &policy, |_| {
            self.attempt_write(ctx, &store, &segments, path, body, precondition)
        });
        drop(lease);

        let ((), retries) = result?;
        Ok(Receipt { retries })
    }

    /// One write attempt: observe the tip, check the precondition,
    /// rebuild the tree, commit, pack, push.
    fn attempt_write(
        &self,
        ctx: &OpContext,
        store: &MemoryStore,
        segments: &[BString],
        path: &str,
        body: Option<&[u8]>,
        precondition: Precondition,
    ) -> Result<(), ApiError> {
        let mut conn = self.session.read_connection(ctx)?;
        let Some(old) = conn.ref_oid(MAIN_REF) else {
            // Writes need an existing branch to extend; forging the
            // initial commit is out of scope.
            return Err(ApiError::with_source(
                ErrorKind::NotFound,
                format!("{MAIN_REF} not advertised; cannot extend an empty repository"),
            ));
        };

        conn.fetch(ctx, store, &[old], self.config.blob_filter_on_fetch)?;
        conn.close();

        let tip_commit = load_commit(store, &old)?;
        let tree = load_tree(store, &tip_commit.tree)?;

        let existing = resolve_path(store, &tree, segments)?;
        match precondition {
            Precondition::MustNotExist if existing.is_some() => {
                return Err(ApiError::new(ErrorKind::Conflict));
            }
            Precondition::MustExist if existing.is_none() => {
                return Err(ApiError::new(ErrorKind::NotFound));
            }
            _ => {}
        }

        let blob_oid = match body {
            Some(data) => Some(
                store
                    .put_raw(ObjectType::Blob, data)
                    .map_err(|e| ApiError::with_source(ErrorKind::Internal, e))?,
            ),
            None => None,
        };

        let new_tree = set_path(store, &tree, segments, blob_oid)?;
        let commit_oid = self.make_commit(store, old, new_tree, path, body.is_some())?;

        ctx.check()?;
        let pack = build_pack(store, &commit_oid)?;

        let mut push_conn = self.session.write_connection(ctx)?;
        let update = RefUpdate {
            refname: MAIN_REF.to_string(),
            old,
            new: commit_oid,
        };
        let report = push_conn.push(ctx, &update, &pack, true)?;
        push_conn.close();

        classify_report(report)?;
        tracing::info!(old = %old, new = %commit_oid, path, "push accepted");
        Ok(())
    }

    fn make_commit(
        &self,
        store: &MemoryStore,
        parent: ObjectId,
        tree: ObjectId,
        path: &str,
        is_write: bool,
    ) -> Result<ObjectId, ApiError> {
        let verb = if is_write { "write" } else { "delete" };
        let signature = Signature::now(
            self.config.committer.name.clone(),
            self.config.committer.email.clone(),
        );
        let commit = Commit {
            tree,
            parents: vec![parent],
            author: signature.clone(),
            committer: signature,
            extra_headers: Vec::new(),
            message: format!("{verb} {path}\n").into(),
        };
        store
            .put_raw(ObjectType::Commit, &commit.serialize())
            .map_err(|e| ApiError::with_source(ErrorKind::Internal, e))
    }
}

fn load_commit(store: &MemoryStore, oid: &ObjectId) -> Result<Commit, ApiError> {
    let obj = store
        .get(ObjectType::Commit, oid)
        .ok_or_else(|| ApiError::internal(format!("commit {oid} missing from store")))?;
    Commit::parse(obj.payload()).map_err(|e| ApiError::with_source(ErrorKind::Internal, e))
}

/// Map a push report onto the error taxonomy.
fn classify_report(report: PushReport) -> Result<(), ApiError> {
    if !report.unpack_ok {
        return Err(ApiError::internal("server failed to unpack the pushed pack"));
    }
    match report.status {
        RefStatus::Ok => Ok(()),
        RefStatus::Rejected(reason) => {
            let kind = classify_rejection(&reason);
            Err(ApiError::with_source(kind, reason))
        }
    }
}

/// Distinguish stale-tip races (retry) from other server rejections.
fn classify_rejection(reason: &str) -> ErrorKind {
    let reason = reason.to_ascii_lowercase();
    const STALE_MARKERS: [&str; 5] = [
        "non-fast-forward",
        "fetch first",
        "cannot lock ref",
        "failed to update ref",
        "stale info",
    ];
    if STALE_MARKERS.iter().any(|marker| reason.contains(marker)) {
        ErrorKind::RefNotCurrent
    } else {
        ErrorKind::Conflict
    }
}

/// Background thread that periodically swaps in a fresh store.
///
/// The swap takes the session lock in write mode, so it waits out any
/// in-flight operation; operations that started earlier keep their own
/// `Arc` to the old store.
#[derive(Debug)]
struct Sweeper {
    signal: Arc<(Mutex<bool>, Condvar)>,
    handle: Option<thread::JoinHandle<()>>,
}

impl Sweeper {
    fn spawn(store: Arc<RwLock<Arc<MemoryStore>>>, period: Duration) -> Self {
        let signal = Arc::new((Mutex::new(false), Condvar::new()));
        let thread_signal = Arc::clone(&signal);
        let handle = thread::Builder::new()
            .name("gitkv-sweeper".into())
            .spawn(move || {
                let (stop_flag, wakeup) = &*thread_signal;
                let mut stopped = stop_flag.lock().unwrap();
                while !*stopped {
                    let (guard, timeout) = wakeup.wait_timeout(stopped, period).unwrap();
                    stopped = guard;
                    if *stopped {
                        break;
                    }
                    if timeout.timed_out() {
                        let mut slot = store.write().unwrap();
                        let dropped = slot.len();
                        *slot = Arc::new(MemoryStore::new());
                        tracing::debug!(objects_dropped = dropped, "object store swept");
                    }
                }
            })
            .expect("failed to spawn sweeper thread");
        Self {
            signal,
            handle: Some(handle),
        }
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        let (stop_flag, wakeup) = &*self.signal;
        *stop_flag.lock().unwrap() = true;
        wakeup.notify_all();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Backend {
    fn drop(&mut self) {
        self.sweeper.take();
    }
}
