//! Task-scoped reentrant mutex.
//!
//! Ownership is keyed to a logical task rather than an OS thread: async tasks
//! hop between worker threads, and a thread-keyed lock would both deadlock a
//! task against itself and let two tasks on the same thread in together.
//!
//! A task gets its identity from [`task_scope`], which installs a
//! `tokio::task_local!` token for the duration of a future. Every public index
//! operation runs inside a scope, so nested calls made by one operation (for
//! example an upsert that deletes the previous slot while holding the global
//! lock) re-enter locks they already own. Spawned tasks do not inherit the
//! token and get a fresh identity when they enter a scope.

use parking_lot::Mutex;
use std::future::Future;
use std::mem::ManuallyDrop;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio::sync::Semaphore;

tokio::task_local! {
    static CURRENT_TASK: TaskId;
}

/// Identity of a logical task, as seen by [`ReentrantMutex`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

impl TaskId {
    /// The identity of the enclosing [`task_scope`], if any.
    pub fn current() -> Option<TaskId> {
        CURRENT_TASK.try_with(|id| *id).ok()
    }

    fn next() -> TaskId {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        TaskId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Runs `fut` with a task identity.
///
/// Reuses the enclosing identity when called inside an existing scope, so
/// nesting is free and keeps reentrancy intact.
pub async fn task_scope<F: Future>(fut: F) -> F::Output {
    if TaskId::current().is_some() {
        fut.await
    } else {
        CURRENT_TASK.scope(TaskId::next(), fut).await
    }
}

/// Misuse of the locking protocol. These indicate a broken invariant rather
/// than a recoverable runtime condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LockError {
    /// Acquired or released outside of any [`task_scope`].
    #[error("reentrant lock used outside of a task scope")]
    NoTaskContext,
    /// Released by a task that does not own it.
    #[error("reentrant lock is not held by the calling task")]
    NotOwner,
    /// The underlying semaphore was closed.
    #[error("reentrant lock is closed")]
    Closed,
}

#[derive(Debug, Default)]
struct Ownership {
    owner: Option<TaskId>,
    depth: usize,
}

/// An async mutual-exclusion lock that the owning task may re-acquire.
///
/// The exclusive part is a single-permit semaphore, so waiting is a
/// suspension point, never a spin. `depth` counts nested acquisitions by the
/// owner; the permit is returned when it drops back to zero.
#[derive(Debug)]
pub struct ReentrantMutex {
    permit: Semaphore,
    ownership: Mutex<Ownership>,
}

impl Default for ReentrantMutex {
    fn default() -> Self {
        Self::new()
    }
}

impl ReentrantMutex {
    pub fn new() -> Self {
        Self {
            permit: Semaphore::new(1),
            ownership: Mutex::new(Ownership::default()),
        }
    }

    /// Acquires the lock for the current task, re-entering if already owned.
    ///
    /// The returned guard releases one level of ownership when dropped.
    pub async fn lock(&self) -> Result<ReentrantGuard<'_>, LockError> {
        let task = TaskId::current().ok_or(LockError::NoTaskContext)?;
        self.acquire_as(task).await?;
        Ok(ReentrantGuard { mutex: self, task })
    }

    /// Releases one level of ownership held by the current task.
    ///
    /// Pairs with [`ReentrantGuard::leak`] for locks held past their guard.
    pub fn unlock(&self) -> Result<(), LockError> {
        let task = TaskId::current().ok_or(LockError::NoTaskContext)?;
        self.release_as(task)
    }

    /// Runs `body` while holding the lock.
    pub async fn with_lock<F: Future>(&self, body: F) -> Result<F::Output, LockError> {
        let _guard = self.lock().await?;
        Ok(body.await)
    }

    /// Returns `true` if the current task owns the lock.
    pub fn holds_lock(&self) -> bool {
        TaskId::current().is_some_and(|task| self.ownership.lock().owner == Some(task))
    }

    /// Returns `true` if any task owns the lock.
    pub fn is_locked(&self) -> bool {
        self.ownership.lock().owner.is_some()
    }

    async fn acquire_as(&self, task: TaskId) -> Result<(), LockError> {
        {
            let mut state = self.ownership.lock();
            if state.owner == Some(task) {
                state.depth += 1;
                return Ok(());
            }
        }

        // Only one task can observe the permit, so ownership is written once
        // per exclusive acquisition with no await in between.
        self.permit
            .acquire()
            .await
            .map_err(|_| LockError::Closed)?
            .forget();
        let mut state = self.ownership.lock();
        state.owner = Some(task);
        state.depth = 1;
        Ok(())
    }

    fn release_as(&self, task: TaskId) -> Result<(), LockError> {
        let mut state = self.ownership.lock();
        if state.owner != Some(task) || state.depth == 0 {
            return Err(LockError::NotOwner);
        }
        state.depth -= 1;
        if state.depth == 0 {
            state.owner = None;
            drop(state);
            self.permit.add_permits(1);
        }
        Ok(())
    }
}

/// Scoped ownership of one level of a [`ReentrantMutex`].
///
/// Remembers the task that acquired it, so dropping it from a cancelled
/// future (outside the task scope) still releases correctly.
#[must_use = "dropping the guard releases the lock immediately"]
pub struct ReentrantGuard<'a> {
    mutex: &'a ReentrantMutex,
    task: TaskId,
}

impl ReentrantGuard<'_> {
    /// Releases this level of ownership explicitly.
    pub fn unlock(self) -> Result<(), LockError> {
        let guard = ManuallyDrop::new(self);
        guard.mutex.release_as(guard.task)
    }

    /// Keeps the lock held after the guard goes away. The owning task must
    /// later call [`ReentrantMutex::unlock`].
    pub fn leak(self) {
        std::mem::forget(self);
    }
}

impl Drop for ReentrantGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.mutex.release_as(self.task) {
            tracing::error!(error = %e, "reentrant guard dropped without ownership");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_reentrant_lock_same_task() {
        let mutex = ReentrantMutex::new();
        task_scope(async {
            let outer = mutex.lock().await.unwrap();
            let inner = mutex.lock().await.unwrap();
            assert!(mutex.holds_lock());
            drop(inner);
            assert!(mutex.holds_lock(), "outer level still held");
            drop(outer);
            assert!(!mutex.holds_lock());
            assert!(!mutex.is_locked());
        })
        .await;
    }

    #[tokio::test]
    async fn test_lock_outside_scope_fails() {
        let mutex = ReentrantMutex::new();
        assert_eq!(mutex.lock().await.err(), Some(LockError::NoTaskContext));
        assert_eq!(mutex.unlock(), Err(LockError::NoTaskContext));
        assert!(!mutex.holds_lock());
    }

    #[tokio::test]
    async fn test_nested_scope_keeps_identity() {
        let mutex = ReentrantMutex::new();
        task_scope(async {
            let outer = TaskId::current();
            let _guard = mutex.lock().await.unwrap();
            task_scope(async {
                assert_eq!(TaskId::current(), outer);
                assert!(mutex.holds_lock());
            })
            .await;
        })
        .await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_other_task_waits_for_release() {
        let mutex = Arc::new(ReentrantMutex::new());
        let holder = Arc::clone(&mutex);
        task_scope(async move {
            let guard = holder.lock().await.unwrap();

            let contender = Arc::clone(&holder);
            let waiter = tokio::spawn(task_scope(async move {
                let _guard = contender.lock().await.unwrap();
                contender.holds_lock()
            }));

            tokio::time::sleep(Duration::from_millis(50)).await;
            assert!(!waiter.is_finished(), "second task must block");
            drop(guard);
            assert!(waiter.await.unwrap());
        })
        .await;
        assert!(!mutex.is_locked());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_unlock_by_non_owner_fails() {
        let mutex = Arc::new(ReentrantMutex::new());
        task_scope(async {
            mutex.lock().await.unwrap().leak();
            assert!(mutex.holds_lock());
        })
        .await;

        let other = Arc::clone(&mutex);
        let result = tokio::spawn(task_scope(async move { other.unlock() }))
            .await
            .unwrap();
        assert_eq!(result, Err(LockError::NotOwner));
        assert!(mutex.is_locked());
    }

    #[tokio::test]
    async fn test_explicit_unlock_and_leak() {
        let mutex = ReentrantMutex::new();
        task_scope(async {
            mutex.lock().await.unwrap().leak();
            let guard = mutex.lock().await.unwrap();
            guard.unlock().unwrap();
            assert!(mutex.holds_lock());
            mutex.unlock().unwrap();
            assert!(!mutex.is_locked());
            assert_eq!(mutex.unlock(), Err(LockError::NotOwner));
        })
        .await;
    }

    #[tokio::test]
    async fn test_with_lock_returns_body_output() {
        let mutex = ReentrantMutex::new();
        let value = task_scope(async {
            mutex
                .with_lock(async {
                    let nested = mutex.with_lock(async { 21 }).await.unwrap();
                    nested * 2
                })
                .await
        })
        .await
        .unwrap();
        assert_eq!(value, 42);
        assert!(!mutex.is_locked());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancelled_waiter_does_not_take_lock() {
        let mutex = Arc::new(ReentrantMutex::new());
        let holder = Arc::clone(&mutex);
        task_scope(async move {
            let guard = holder.lock().await.unwrap();
            let contender = Arc::clone(&holder);
            let attempt = tokio::spawn(task_scope(async move {
                tokio::time::timeout(Duration::from_millis(20), contender.lock())
                    .await
                    .is_err()
            }));
            assert!(attempt.await.unwrap(), "waiter should time out");
            drop(guard);
        })
        .await;

        task_scope(async {
            let _guard = mutex.lock().await.unwrap();
            assert!(mutex.holds_lock());
        })
        .await;
    }
}
