//! Capacity-bounded resource pool backed by a directory
//!
//! Every filesystem mutation of a pool happens while its count lock is held, so the
//! tracked live count and the directory contents move together. Random eviction is
//! used for overflow because buffered poison material is interchangeable.

use crate::error::{Error, Result};
use rand::seq::SliceRandom;
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;
use tracing::{debug, info, warn};

/// Fixed set of pools the service manages
///
/// Declaration order is also the lock order for operations touching two pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PoolName {
    Image,
    Audio,
    Corpus,
    Intake,
    Delivery,
}

impl PoolName {
    pub const ALL: [PoolName; 5] = [
        PoolName::Image,
        PoolName::Audio,
        PoolName::Corpus,
        PoolName::Intake,
        PoolName::Delivery,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PoolName::Image => "image",
            PoolName::Audio => "audio",
            PoolName::Corpus => "corpus",
            PoolName::Intake => "intake",
            PoolName::Delivery => "delivery",
        }
    }

    /// Transient pools only hold files mid-pipeline and are emptied at startup
    pub fn is_transient(&self) -> bool {
        matches!(self, PoolName::Intake | PoolName::Delivery)
    }
}

impl fmt::Display for PoolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of checking whether one more resource fits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotStatus {
    /// Within capacity
    Ok,
    /// Above capacity but at most 1.5x: evict later, after in-flight reads finish
    WouldOverflow,
    /// Above 1.5x capacity: evict now
    SeverelyOverflow,
}

/// A named, capacity-bounded directory of resource files
pub struct BufferPool {
    name: PoolName,
    location: PathBuf,
    max_count: Option<usize>,
    live_count: Mutex<usize>,
}

impl fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferPool")
            .field("name", &self.name)
            .field("location", &self.location)
            .field("max_count", &self.max_count)
            .field("live_count", &self.live_count())
            .finish()
    }
}

impl BufferPool {
    /// Open a pool over an existing directory
    ///
    /// A missing directory is a configuration error: the service must refuse to start
    /// rather than fail on every request. `max_count` of `None` means unbounded.
    pub fn open(name: PoolName, location: impl Into<PathBuf>, max_count: Option<usize>) -> Result<Self> {
        let location = location.into();
        if !location.is_dir() {
            return Err(Error::Config(format!(
                "Directory for {} pool does not exist: {}",
                name,
                location.display()
            )));
        }

        let count = list_files(&location)?.len();
        debug!("Opened {} pool at {} with {} files", name, location.display(), count);

        Ok(Self {
            name,
            location,
            max_count,
            live_count: Mutex::new(count),
        })
    }

    pub fn name(&self) -> PoolName {
        self.name
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    pub fn max_count(&self) -> Option<usize> {
        self.max_count
    }

    /// Tracked number of resources in the pool
    pub fn live_count(&self) -> usize {
        *self.lock()
    }

    /// Whether `path` names a file directly inside this pool's directory
    pub fn contains(&self, path: &Path) -> bool {
        path.parent() == Some(self.location.as_path())
    }

    fn lock(&self) -> MutexGuard<'_, usize> {
        self.live_count.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn classify(&self, count: usize) -> SlotStatus {
        match self.max_count {
            None => SlotStatus::Ok,
            Some(max) if count <= max => SlotStatus::Ok,
            // count <= 1.5 * max without floating point
            Some(max) if count * 2 <= max * 3 => SlotStatus::WouldOverflow,
            Some(_) => SlotStatus::SeverelyOverflow,
        }
    }

    /// Check the pool size (plus one if `adding`) against capacity
    pub fn try_reserve_slot(&self, adding: bool) -> SlotStatus {
        let count = *self.lock();
        self.classify(count + usize::from(adding))
    }

    /// Enumerate files (not subdirectories) currently in the pool
    pub fn list(&self) -> Result<Vec<PathBuf>> {
        list_files(&self.location)
    }

    fn path_for(&self, file_name: &str) -> Result<PathBuf> {
        if file_name.is_empty() || file_name.contains(|c: char| c == '/' || c == '\\') || file_name == ".." {
            return Err(Error::Internal(format!(
                "Invalid resource file name for {} pool: {:?}",
                self.name, file_name
            )));
        }
        Ok(self.location.join(file_name))
    }

    /// Write `payload` as `file_name` and count it
    pub fn add(&self, file_name: &str, payload: &[u8]) -> Result<PathBuf> {
        let mut count = self.lock();
        let path = self.path_for(file_name)?;
        std::fs::write(&path, payload)?;
        *count += 1;
        debug!("Added {} to {} pool ({} files)", path.display(), self.name, *count);
        Ok(path)
    }

    /// Add a resource while enforcing capacity
    ///
    /// A severe overflow evicts a random resource before the write, so the pool never
    /// durably exceeds 1.5x capacity. The returned status tells the caller whether a
    /// deferred eviction is still owed.
    pub fn admit(&self, file_name: &str, payload: &[u8]) -> Result<(PathBuf, SlotStatus)> {
        let mut count = self.lock();
        let path = self.path_for(file_name)?;

        let status = self.classify(*count + 1);
        if status == SlotStatus::SeverelyOverflow {
            warn!(
                "{} pool severely over capacity ({} files, max {:?}), evicting immediately",
                self.name, *count, self.max_count
            );
            self.evict_random_locked(&mut count, None)?;
        }

        std::fs::write(&path, payload)?;
        *count += 1;
        debug!("Admitted {} to {} pool ({} files)", path.display(), self.name, *count);

        Ok((path, status))
    }

    fn evict_random_locked(
        &self,
        count: &mut MutexGuard<'_, usize>,
        keep: Option<&Path>,
    ) -> Result<Option<PathBuf>> {
        let candidates: Vec<PathBuf> = list_files(&self.location)?
            .into_iter()
            .filter(|p| Some(p.as_path()) != keep)
            .collect();

        let Some(victim) = candidates.choose(&mut rand::thread_rng()).cloned() else {
            debug!("No evictable files in {} pool", self.name);
            return Ok(None);
        };

        match std::fs::remove_file(&victim) {
            Ok(()) => {
                **count = count.saturating_sub(1);
                info!("Evicted {} from {} pool ({} files)", victim.display(), self.name, **count);
                Ok(Some(victim))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                // Removed behind our back; trust the directory over the counter
                **count = list_files(&self.location)?.len();
                warn!("Eviction candidate {} vanished, resynced {} pool to {}", victim.display(), self.name, **count);
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Delete a uniformly random resource
    pub fn evict_random(&self) -> Result<Option<PathBuf>> {
        let mut count = self.lock();
        self.evict_random_locked(&mut count, None)
    }

    /// Delete a random resource only if the pool is still above capacity
    pub fn evict_if_over_capacity(&self) -> Result<Option<PathBuf>> {
        let mut count = self.lock();
        match self.max_count {
            Some(max) if *count > max => self.evict_random_locked(&mut count, None),
            _ => Ok(None),
        }
    }

    /// Delete `path` if present
    ///
    /// Returns false (and logs) when the file is already gone; a missing file is never
    /// an error.
    pub fn remove(&self, path: &Path) -> bool {
        let mut count = self.lock();
        match std::fs::remove_file(path) {
            Ok(()) => {
                *count = count.saturating_sub(1);
                info!("File at {} successfully deleted ({} pool: {} files)", path.display(), self.name, *count);
                true
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!("File at {} cannot be deleted, does not exist", path.display());
                false
            }
            Err(e) => {
                warn!("Failed to delete {}: {}", path.display(), e);
                false
            }
        }
    }

    /// Reset the live count to the number of files on disk
    pub fn resync(&self) -> Result<usize> {
        let mut count = self.lock();
        *count = list_files(&self.location)?.len();
        Ok(*count)
    }

    /// Randomly evict until at most `max` files remain, never touching `keep`
    pub fn trim_to_capacity(&self, max: usize, keep: Option<&Path>) -> Result<usize> {
        let mut count = self.lock();
        *count = list_files(&self.location)?.len();

        while *count > max {
            if self.evict_random_locked(&mut count, keep)?.is_none() {
                break;
            }
        }

        info!("{} pool trimmed to {} files (max {})", self.name, *count, max);
        Ok(*count)
    }

    /// Delete every file in the pool
    pub fn clear(&self) -> Result<usize> {
        let mut count = self.lock();
        let mut removed = 0;
        for path in list_files(&self.location)? {
            match std::fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        *count = 0;
        if removed > 0 {
            info!("Cleared {} leftover files from {} pool", removed, self.name);
        }
        Ok(removed)
    }

    /// Delete the oldest files (by modification time, then name) while over `max`
    ///
    /// Stops when only `min_remaining` files are left. `keep` is never deleted and is
    /// still counted towards `min_remaining`.
    pub fn prune_oldest(
        &self,
        max: usize,
        min_remaining: usize,
        keep: Option<&Path>,
    ) -> Result<Vec<PathBuf>> {
        let mut count = self.lock();
        let mut removed = Vec::new();
        if *count <= max {
            return Ok(removed);
        }

        let files = list_files(&self.location)?;
        let mut remaining = files.len();
        let mut oldest_first: Vec<(SystemTime, PathBuf)> = files
            .into_iter()
            .filter(|p| Some(p.as_path()) != keep)
            .map(|p| {
                let modified = std::fs::metadata(&p)
                    .and_then(|m| m.modified())
                    .unwrap_or(SystemTime::UNIX_EPOCH);
                (modified, p)
            })
            .collect();
        oldest_first.sort();

        for (_, path) in oldest_first {
            if *count <= max || remaining <= min_remaining {
                break;
            }
            match std::fs::remove_file(&path) {
                Ok(()) => {
                    *count = count.saturating_sub(1);
                    remaining -= 1;
                    info!("File '{}' deleted from {} pool", path.display(), self.name);
                    removed.push(path);
                }
                Err(e) => warn!("Error deleting file '{}': {}", path.display(), e),
            }
        }

        Ok(removed)
    }

    /// Move a uniformly random resource into `dest`, keeping its file name
    pub fn move_random_to(&self, dest: &BufferPool) -> Result<Option<PathBuf>> {
        self.with_both_locked(dest, |own, theirs| {
            let files = list_files(&self.location)?;
            let Some(source) = files.choose(&mut rand::thread_rng()).cloned() else {
                return Ok(None);
            };
            self.rename_locked(&source, dest, own, theirs).map(Some)
        })
    }

    /// Move a specific resource into `dest`, keeping its file name
    pub fn move_to(&self, path: &Path, dest: &BufferPool) -> Result<PathBuf> {
        if !self.contains(path) {
            return Err(Error::Internal(format!(
                "{} is not managed by the {} pool",
                path.display(),
                self.name
            )));
        }
        self.with_both_locked(dest, |own, theirs| self.rename_locked(path, dest, own, theirs))
    }

    fn rename_locked(
        &self,
        source: &Path,
        dest: &BufferPool,
        own: &mut usize,
        theirs: &mut usize,
    ) -> Result<PathBuf> {
        let file_name = source
            .file_name()
            .ok_or_else(|| Error::Internal(format!("No file name in {}", source.display())))?;
        let target = dest.location.join(file_name);

        std::fs::rename(source, &target)?;
        *own = own.saturating_sub(1);
        *theirs += 1;
        debug!("Moved {} from {} pool to {} pool", target.display(), self.name, dest.name);
        Ok(target)
    }

    fn with_both_locked<T>(
        &self,
        dest: &BufferPool,
        f: impl FnOnce(&mut usize, &mut usize) -> Result<T>,
    ) -> Result<T> {
        if std::ptr::eq(self, dest) {
            return Err(Error::Internal(format!(
                "Cannot move within the {} pool",
                self.name
            )));
        }

        // Fixed lock order prevents two opposite moves from deadlocking
        if self.name <= dest.name {
            let mut own = self.lock();
            let mut theirs = dest.lock();
            f(&mut *own, &mut *theirs)
        } else {
            let mut theirs = dest.lock();
            let mut own = self.lock();
            f(&mut *own, &mut *theirs)
        }
    }
}

/// List regular files directly inside `dir`, sorted by name
fn list_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}
