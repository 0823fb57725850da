//! File Descriptor Limit
//!
//! Every association source stays open for the whole merge, so a run over
//! thousands of sources needs the soft `RLIMIT_NOFILE` raised before any
//! file is opened. Only the soft limit is changed; the hard limit is the
//! ceiling.

use crate::matrix::MatrixError;
use tracing::{debug, info};

/// Descriptor limits before and after adjustment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FdLimit {
    /// Soft limit found at startup
    pub previous: u64,
    /// Soft limit now in effect
    pub current: u64,
    /// Hard limit (`u64::MAX` when unlimited)
    pub hard: u64,
}

/// Make sure at least `required` descriptors can be open at once.
///
/// Fails with a resource error if the hard limit is too low or the limit
/// cannot be changed.
#[cfg(unix)]
pub fn ensure_open_file_limit(required: u64) -> Result<FdLimit, MatrixError> {
    let mut rlim = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    // SAFETY: getrlimit only writes to the struct we pass in
    if unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, &mut rlim) } != 0 {
        return Err(MatrixError::Resource(format!(
            "getrlimit(RLIMIT_NOFILE) failed: {}",
            std::io::Error::last_os_error()
        )));
    }

    let previous = rlim_to_u64(rlim.rlim_cur);
    let hard = rlim_to_u64(rlim.rlim_max);
    if previous >= required {
        debug!(soft = previous, required, "open file limit already sufficient");
        return Ok(FdLimit {
            previous,
            current: previous,
            hard,
        });
    }

    if hard < required {
        return Err(MatrixError::Resource(format!(
            "need {} open files but the hard limit is {}",
            required, hard
        )));
    }

    rlim.rlim_cur = required as libc::rlim_t;
    // SAFETY: the struct is fully initialised and only read by setrlimit
    if unsafe { libc::setrlimit(libc::RLIMIT_NOFILE, &rlim) } != 0 {
        return Err(MatrixError::Resource(format!(
            "setrlimit(RLIMIT_NOFILE, {}) failed: {}",
            required,
            std::io::Error::last_os_error()
        )));
    }

    info!(previous, current = required, hard, "raised open file limit");
    Ok(FdLimit {
        previous,
        current: required,
        hard,
    })
}

#[cfg(unix)]
fn rlim_to_u64(value: libc::rlim_t) -> u64 {
    if value == libc::RLIM_INFINITY {
        u64::MAX
    } else {
        value as u64
    }
}

/// No descriptor limit to manage on this platform
#[cfg(not(unix))]
pub fn ensure_open_file_limit(required: u64) -> Result<FdLimit, MatrixError> {
    debug!(required, "open file limit not managed on this platform");
    Ok(FdLimit {
        previous: u64::MAX,
        current: u64::MAX,
        hard: u64::MAX,
    })
}
