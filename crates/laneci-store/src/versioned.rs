//! Git working copy backing every JSON collection.

use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{
    Cred, ErrorClass, ErrorCode, FetchOptions, IndexAddOption, PushOptions, RemoteCallbacks,
    Repository, RepositoryInitOptions, Signature, StatusOptions,
};
use laneci_core::{Credential, ProviderCredential};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

use crate::{RemoteSyncError, StoreError, StoreResult};

const REMOTE_NAME: &str = "origin";
const DEFAULT_COMMIT_MESSAGE: &str = "Automatic commit by laneci";

/// Author and committer of every commit laneci makes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitIdentity {
    pub name: String,
    pub email: String,
}

impl CommitIdentity {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }
}

/// Outcome of [`VersionedStore::pull`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullOutcome {
    UpToDate,
    FastForwarded,
}

/// A local working copy bound to one remote and credential.
///
/// Cloning the handle shares the working-copy lock, which serializes every write,
/// commit, push and pull on this directory. Data sources acquire their own lock
/// first and this one second, never the other way round.
#[derive(Debug, Clone)]
pub struct VersionedStore {
    root: PathBuf,
    branch: String,
    identity: CommitIdentity,
    credential: Option<ProviderCredential>,
    lock: Arc<Mutex<()>>,
}

impl VersionedStore {
    /// Bind a working copy location. Does not touch the disk.
    pub fn new(root: impl Into<PathBuf>, branch: impl Into<String>, identity: CommitIdentity) -> Self {
        Self {
            root: root.into(),
            branch: branch.into(),
            identity,
            credential: None,
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// Credential used to authenticate fetch and push.
    pub fn with_credential(mut self, credential: ProviderCredential) -> Self {
        self.credential = Some(credential);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    /// Absolute path of a file in the working copy.
    pub fn file_path(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.root.join(relative)
    }

    /// Whether a working copy has been initialized or cloned at the root.
    pub fn exists(&self) -> bool {
        Repository::open(&self.root).is_ok()
    }

    /// Create an empty working copy on the configured branch.
    pub fn init(&self) -> StoreResult<()> {
        let _guard = self.lock();
        std::fs::create_dir_all(&self.root)?;
        let mut opts = RepositoryInitOptions::new();
        opts.initial_head(&self.branch);
        Repository::init_opts(&self.root, &opts)?;
        info!(path = %self.root.display(), branch = %self.branch, "Initialized working copy");
        Ok(())
    }

    /// Clone `url` into the root.
    pub fn clone_from_remote(&self, url: &str) -> StoreResult<()> {
        let _guard = self.lock();
        info!(path = %self.root.display(), "Cloning configuration repository");

        let mut fetch = FetchOptions::new();
        fetch.remote_callbacks(remote_callbacks(self.credential.as_ref()));

        RepoBuilder::new()
            .branch(&self.branch)
            .fetch_options(fetch)
            .clone(url, &self.root)
            .map_err(RemoteSyncError::from)?;

        info!(path = %self.root.display(), "Configuration repository cloned");
        Ok(())
    }

    /// Point `origin` at `url`, creating the remote if needed.
    pub fn set_origin(&self, url: &str) -> StoreResult<()> {
        let _guard = self.lock();
        let repo = self.repository()?;
        if repo.find_remote(REMOTE_NAME).is_ok() {
            repo.remote_set_url(REMOTE_NAME, url)?;
        } else {
            repo.remote(REMOTE_NAME, url)?;
        }
        Ok(())
    }

    /// Current commit id, `None` before the first commit.
    pub fn head(&self) -> Option<String> {
        let repo = Repository::open(&self.root).ok()?;
        let head = repo.head().ok()?;
        head.target().map(|oid| oid.to_string())
    }

    /// Stage everything and commit. Returns `None` when there was nothing to commit.
    pub fn commit_changes(&self, message: Option<&str>) -> StoreResult<Option<String>> {
        let _guard = self.lock();
        self.commit_locked(message.unwrap_or(DEFAULT_COMMIT_MESSAGE))
    }

    /// Replace a file and commit it as one unit.
    ///
    /// If the commit fails the previous file content is put back, so the working
    /// copy never holds an uncommitted write.
    pub fn write_and_commit(
        &self,
        relative: impl AsRef<Path>,
        contents: &[u8],
        message: &str,
    ) -> StoreResult<Option<String>> {
        self.locked().write_and_commit(relative, contents, message)
    }

    /// Take the working-copy lock for a read-modify-write. Blocks the thread
    /// until every other write, commit, push and pull has finished.
    pub fn locked(&self) -> LockedStore<'_> {
        LockedStore {
            store: self,
            _guard: self.lock(),
        }
    }

    /// Push the branch to `origin`. Never forces.
    pub fn push(&self) -> StoreResult<()> {
        let _guard = self.lock();
        let repo = self.repository()?;
        let mut remote = repo
            .find_remote(REMOTE_NAME)
            .map_err(|_| RemoteSyncError::MissingRemote(REMOTE_NAME.to_string()))?;

        let refspec = format!("refs/heads/{0}:refs/heads/{0}", self.branch);
        let mut rejection: Option<(String, String)> = None;
        {
            let mut callbacks = remote_callbacks(self.credential.as_ref());
            callbacks.push_update_reference(|reference, status| {
                if let Some(message) = status {
                    rejection = Some((reference.to_string(), message.to_string()));
                }
                Ok(())
            });
            let mut opts = PushOptions::new();
            opts.remote_callbacks(callbacks);
            remote
                .push(&[refspec.as_str()], Some(&mut opts))
                .map_err(RemoteSyncError::from)?;
        }

        if let Some((reference, message)) = rejection {
            warn!(%reference, %message, "Push rejected");
            return Err(RemoteSyncError::Rejected { reference, message }.into());
        }

        info!(branch = %self.branch, "Pushed configuration repository");
        Ok(())
    }

    /// Fetch `origin` and fast-forward. Diverged history is reported, never merged or reset.
    pub fn pull(&self) -> StoreResult<PullOutcome> {
        let _guard = self.lock();
        let repo = self.repository()?;

        if is_dirty(&repo)? {
            return Err(RemoteSyncError::DirtyWorkingCopy.into());
        }

        let mut remote = repo
            .find_remote(REMOTE_NAME)
            .map_err(|_| RemoteSyncError::MissingRemote(REMOTE_NAME.to_string()))?;
        let mut fetch = FetchOptions::new();
        fetch.remote_callbacks(remote_callbacks(self.credential.as_ref()));
        remote
            .fetch(&[self.branch.as_str()], Some(&mut fetch), None)
            .map_err(RemoteSyncError::from)?;

        let fetch_head = repo.find_reference("FETCH_HEAD")?;
        let fetch_commit = repo.reference_to_annotated_commit(&fetch_head)?;
        let (analysis, _) = repo.merge_analysis(&[&fetch_commit])?;

        if analysis.is_up_to_date() {
            debug!(branch = %self.branch, "Already up to date");
            return Ok(PullOutcome::UpToDate);
        }

        if !analysis.is_fast_forward() && !analysis.is_unborn() {
            warn!(branch = %self.branch, "Local and remote history diverged");
            return Err(RemoteSyncError::Diverged(self.branch.clone()).into());
        }

        let refname = format!("refs/heads/{}", self.branch);
        match repo.find_reference(&refname) {
            Ok(mut reference) => {
                reference.set_target(fetch_commit.id(), "laneci: fast-forward")?;
            }
            Err(_) => {
                repo.reference(&refname, fetch_commit.id(), true, "laneci: fast-forward")?;
            }
        }
        repo.set_head(&refname)?;
        repo.checkout_head(Some(CheckoutBuilder::default().force()))?;

        info!(branch = %self.branch, commit = %fetch_commit.id(), "Fast-forwarded working copy");
        Ok(PullOutcome::FastForwarded)
    }

    fn repository(&self) -> StoreResult<Repository> {
        Repository::open(&self.root).map_err(StoreError::from)
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn commit_locked(&self, message: &str) -> StoreResult<Option<String>> {
        let repo = self.repository()?;
        let mut index = repo.index()?;
        index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None)?;
        index.update_all(["*"].iter(), None)?;
        index.write()?;

        let tree_id = index.write_tree()?;
        let tree = repo.find_tree(tree_id)?;
        let parent = repo.head().ok().and_then(|head| head.peel_to_commit().ok());

        let unchanged = match &parent {
            Some(parent) => parent.tree_id() == tree_id,
            None => tree.is_empty(),
        };
        if unchanged {
            debug!(path = %self.root.display(), "Nothing to commit");
            return Ok(None);
        }

        let signature = Signature::now(&self.identity.name, &self.identity.email)?;
        let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();
        let oid = repo.commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)?;

        debug!(commit = %oid, %message, "Committed working copy");
        Ok(Some(oid.to_string()))
    }
}

/// Exclusive access to the working copy, released on drop.
pub struct LockedStore<'a> {
    store: &'a VersionedStore,
    _guard: MutexGuard<'a, ()>,
}

impl LockedStore<'_> {
    /// File contents, `None` when the file does not exist.
    pub fn read(&self, relative: impl AsRef<Path>) -> StoreResult<Option<Vec<u8>>> {
        match std::fs::read(self.store.file_path(relative)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// See [`VersionedStore::write_and_commit`].
    pub fn write_and_commit(
        &self,
        relative: impl AsRef<Path>,
        contents: &[u8],
        message: &str,
    ) -> StoreResult<Option<String>> {
        let path = self.store.file_path(relative.as_ref());
        let previous = self.read(relative)?;

        atomic_write(&path, contents)?;

        match self.store.commit_locked(message) {
            Ok(commit) => Ok(commit),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Commit failed, restoring previous file");
                let restored = match previous {
                    Some(bytes) => atomic_write(&path, &bytes),
                    None => std::fs::remove_file(&path),
                };
                if let Err(restore_err) = restored {
                    warn!(path = %path.display(), error = %restore_err, "Failed to restore file");
                }
                Err(e)
            }
        }
    }
}

fn remote_callbacks<'a>(credential: Option<&ProviderCredential>) -> RemoteCallbacks<'a> {
    let mut callbacks = RemoteCallbacks::new();
    if let Some(credential) = credential {
        let token = credential.token().to_string();
        let mut attempts = 0;
        callbacks.credentials(move |_url, _username, _allowed| {
            attempts += 1;
            if attempts > 1 {
                // libgit2 keeps asking while the server rejects the credential.
                return Err(git2::Error::new(
                    ErrorCode::Auth,
                    ErrorClass::Http,
                    "remote rejected the configured credential",
                ));
            }
            Cred::userpass_plaintext(&token, "x-oauth-basic")
        });
    }
    callbacks
}

fn is_dirty(repo: &Repository) -> StoreResult<bool> {
    let mut opts = StatusOptions::new();
    opts.include_untracked(true).recurse_untracked_dirs(true);
    let statuses = repo.statuses(Some(&mut opts))?;
    Ok(!statuses.is_empty())
}

/// Write via a `.tmp` sibling and rename over the target.
fn atomic_write(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    std::fs::write(&tmp, contents)?;
    std::fs::rename(&tmp, path)
}
