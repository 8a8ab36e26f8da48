//! Cross-process synchronization for one channel.
//!
//! Every operation follows the same order: take a token (the only place a
//! caller may block for long), take the mutex, touch the region, release the
//! mutex, signal the complementary token. Taking the mutex first would let a
//! producer waiting for space hold the lock the consumer needs to make space.

use crate::names::ChannelNames;
use crate::semaphore::{Semaphore, SemaphoreError};
use std::time::Duration;

/// Which counting semaphore an operation draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    /// Permission to fill one slot.
    Empty,
    /// Permission to drain one slot.
    Full,
}

impl Token {
    pub fn complement(self) -> Self {
        match self {
            Token::Empty => Token::Full,
            Token::Full => Token::Empty,
        }
    }
}

/// Named binary semaphore used as a process-shared mutex.
#[derive(Debug)]
pub struct NamedMutex {
    sem: Semaphore,
}

impl NamedMutex {
    pub fn create(name: &str) -> Result<Self, SemaphoreError> {
        Ok(Self {
            sem: Semaphore::create(name, 1)?,
        })
    }

    pub fn open(name: &str) -> Result<Self, SemaphoreError> {
        Ok(Self {
            sem: Semaphore::open(name)?,
        })
    }

    pub fn lock(&self) -> Result<MutexGuard<'_>, SemaphoreError> {
        self.sem.wait()?;
        Ok(MutexGuard {
            mutex: self,
            released: false,
        })
    }

    pub fn try_lock(&self) -> Result<Option<MutexGuard<'_>>, SemaphoreError> {
        if self.sem.try_wait()? {
            Ok(Some(MutexGuard {
                mutex: self,
                released: false,
            }))
        } else {
            Ok(None)
        }
    }
}

/// Held mutex; released on drop.
#[derive(Debug)]
pub struct MutexGuard<'a> {
    mutex: &'a NamedMutex,
    released: bool,
}

impl MutexGuard<'_> {
    /// Release explicitly, surfacing the error that `drop` would only log.
    pub fn unlock(mut self) -> Result<(), SemaphoreError> {
        self.released = true;
        self.mutex.sem.post()
    }
}

impl Drop for MutexGuard<'_> {
    fn drop(&mut self) {
        if !self.released
            && let Err(e) = self.mutex.sem.post()
        {
            tracing::error!(error = %e, mutex = self.mutex.sem.name(), "Failed to release mutex");
        }
    }
}

/// The three named primitives of a channel.
#[derive(Debug)]
pub struct SyncSet {
    empty: Semaphore,
    full: Semaphore,
    mutex: NamedMutex,
}

impl SyncSet {
    /// Create all primitives with their initial counts: `queue_size` empty
    /// tokens, no full tokens, unlocked mutex. On failure the names created
    /// so far are removed again.
    pub fn create(names: &ChannelNames, queue_size: usize) -> Result<Self, SemaphoreError> {
        // SlotLayout bounds queue_size to i32::MAX.
        let empty = Semaphore::create(&names.empty, queue_size as u32)?;
        let full = Semaphore::create(&names.full, 0)
            .inspect_err(|_| unlink_quietly(&[names.empty.as_str()]))?;
        let mutex = NamedMutex::create(&names.mutex)
            .inspect_err(|_| unlink_quietly(&[names.empty.as_str(), names.full.as_str()]))?;

        Ok(Self { empty, full, mutex })
    }

    pub fn open(names: &ChannelNames) -> Result<Self, SemaphoreError> {
        Ok(Self {
            empty: Semaphore::open(&names.empty)?,
            full: Semaphore::open(&names.full)?,
            mutex: NamedMutex::open(&names.mutex)?,
        })
    }

    /// Remove all three names; missing names are ignored.
    pub fn unlink(names: &ChannelNames) -> Result<(), SemaphoreError> {
        Semaphore::unlink(&names.empty)?;
        Semaphore::unlink(&names.full)?;
        Semaphore::unlink(&names.mutex)?;
        Ok(())
    }

    fn semaphore(&self, token: Token) -> &Semaphore {
        match token {
            Token::Empty => &self.empty,
            Token::Full => &self.full,
        }
    }

    /// Take one token, waiting indefinitely or up to `timeout`.
    /// Returns `false` if the timeout expired.
    pub fn acquire(&self, token: Token, timeout: Option<Duration>) -> Result<bool, SemaphoreError> {
        let sem = self.semaphore(token);
        match timeout {
            None => sem.wait().map(|_| true),
            Some(timeout) => sem.timed_wait(timeout),
        }
    }

    pub fn signal(&self, token: Token) -> Result<(), SemaphoreError> {
        self.semaphore(token).post()
    }

    pub fn lock(&self) -> Result<MutexGuard<'_>, SemaphoreError> {
        self.mutex.lock()
    }

    pub fn try_lock(&self) -> Result<Option<MutexGuard<'_>>, SemaphoreError> {
        self.mutex.try_lock()
    }

    /// Current count of `token`.
    pub fn available(&self, token: Token) -> Result<i32, SemaphoreError> {
        self.semaphore(token).value()
    }
}

fn unlink_quietly(names: &[&str]) {
    for name in names {
        if let Err(e) = Semaphore::unlink(name) {
            tracing::warn!(error = %e, semaphore = *name, "Failed to remove semaphore after partial create");
        }
    }
}
