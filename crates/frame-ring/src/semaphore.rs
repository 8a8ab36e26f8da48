use nix::errno::Errno;
use nix::libc;
use nix::sys::time::TimeSpec;
use nix::time::{ClockId, clock_gettime};
use std::ffi::CString;
use std::os::raw::c_int;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SemaphoreError {
    #[error("Failed to open semaphore {name}: {errno}")]
    OpenFailed { name: String, errno: Errno },

    #[error("Semaphore operation failed: {0}")]
    OperationFailed(Errno),

    #[error("Invalid semaphore name")]
    InvalidName,
}

impl SemaphoreError {
    /// The named semaphore does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, SemaphoreError::OpenFailed { errno: Errno::ENOENT, .. })
    }

    /// The handle no longer refers to a valid semaphore.
    pub fn is_invalidated(&self) -> bool {
        matches!(self, SemaphoreError::OperationFailed(Errno::EINVAL))
    }
}

/// POSIX named counting semaphore.
#[derive(Debug)]
pub struct Semaphore {
    sem: *mut libc::sem_t,
    name: String,
}

impl Semaphore {
    /// Create a fresh semaphore, failing if the name is already taken.
    pub fn create(name: &str, initial_value: u32) -> Result<Self, SemaphoreError> {
        Self::open_with(
            name,
            libc::O_CREAT | libc::O_EXCL,
            Some(initial_value),
        )
    }

    /// Open an existing semaphore.
    pub fn open(name: &str) -> Result<Self, SemaphoreError> {
        Self::open_with(name, 0, None)
    }

    fn open_with(
        name: &str,
        oflag: c_int,
        initial_value: Option<u32>,
    ) -> Result<Self, SemaphoreError> {
        let c_name = CString::new(name).map_err(|_| SemaphoreError::InvalidName)?;

        let sem = match initial_value {
            Some(value) => unsafe {
                libc::sem_open(
                    c_name.as_ptr(),
                    oflag,
                    0o600 as libc::c_uint,
                    value as libc::c_uint,
                )
            },
            None => unsafe { libc::sem_open(c_name.as_ptr(), oflag) },
        };

        if sem == libc::SEM_FAILED {
            return Err(SemaphoreError::OpenFailed {
                name: name.to_string(),
                errno: Errno::last(),
            });
        }

        Ok(Self {
            sem,
            name: name.to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Block until a token is available. Interrupted waits are resumed.
    pub fn wait(&self) -> Result<(), SemaphoreError> {
        loop {
            let ret = unsafe { libc::sem_wait(self.sem) };
            if ret == 0 {
                return Ok(());
            }
            match Errno::last() {
                Errno::EINTR => continue,
                errno => return Err(SemaphoreError::OperationFailed(errno)),
            }
        }
    }

    /// Wait at most `timeout` for a token. Returns `false` on expiry.
    ///
    /// The deadline is absolute on `CLOCK_REALTIME`, as `sem_timedwait`
    /// requires, so stepping the wall clock shifts it. A timeout past the
    /// clock's range waits without a deadline.
    pub fn timed_wait(&self, timeout: Duration) -> Result<bool, SemaphoreError> {
        let now = clock_gettime(ClockId::CLOCK_REALTIME).map_err(SemaphoreError::OperationFailed)?;
        let Some(deadline) = deadline_after(now, timeout) else {
            return self.wait().map(|()| true);
        };

        loop {
            let ret = unsafe { libc::sem_timedwait(self.sem, deadline.as_ref()) };
            if ret == 0 {
                return Ok(true);
            }
            match Errno::last() {
                Errno::EINTR => continue,
                Errno::ETIMEDOUT => return Ok(false),
                errno => return Err(SemaphoreError::OperationFailed(errno)),
            }
        }
    }

    pub fn try_wait(&self) -> Result<bool, SemaphoreError> {
        let ret = unsafe { libc::sem_trywait(self.sem) };
        if ret == 0 {
            Ok(true)
        } else {
            let errno = Errno::last();
            if errno == Errno::EAGAIN {
                Ok(false)
            } else {
                Err(SemaphoreError::OperationFailed(errno))
            }
        }
    }

    pub fn post(&self) -> Result<(), SemaphoreError> {
        let ret = unsafe { libc::sem_post(self.sem) };
        if ret != 0 {
            return Err(SemaphoreError::OperationFailed(Errno::last()));
        }
        Ok(())
    }

    pub fn value(&self) -> Result<i32, SemaphoreError> {
        let mut val: c_int = 0;
        let ret = unsafe { libc::sem_getvalue(self.sem, &mut val) };
        if ret != 0 {
            return Err(SemaphoreError::OperationFailed(Errno::last()));
        }
        Ok(val)
    }

    /// Remove the name. Open handles stay usable; a missing name is not an error.
    pub fn unlink(name: &str) -> Result<(), SemaphoreError> {
        let c_name = CString::new(name).map_err(|_| SemaphoreError::InvalidName)?;
        let ret = unsafe { libc::sem_unlink(c_name.as_ptr()) };
        if ret != 0 {
            let errno = Errno::last();
            if errno != Errno::ENOENT {
                return Err(SemaphoreError::OperationFailed(errno));
            }
        }
        Ok(())
    }
}

const NANOS_PER_SEC: i64 = 1_000_000_000;

/// `now + timeout`, or `None` if the sum does not fit in a `timespec`.
fn deadline_after(now: TimeSpec, timeout: Duration) -> Option<TimeSpec> {
    let secs = libc::time_t::try_from(timeout.as_secs()).ok()?;
    let mut sec = now.tv_sec().checked_add(secs)?;
    let mut nsec = i64::from(now.tv_nsec()) + i64::from(timeout.subsec_nanos());
    if nsec >= NANOS_PER_SEC {
        sec = sec.checked_add(1)?;
        nsec -= NANOS_PER_SEC;
    }
    Some(TimeSpec::new(sec, nsec as _))
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            libc::sem_close(self.sem);
        }
    }
}

unsafe impl Send for Semaphore {}
unsafe impl Sync for Semaphore {}
