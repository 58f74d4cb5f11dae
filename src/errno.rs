// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::convert::From;
use std::convert::TryInto;
use std::fmt;
use std::fmt::Display;
use std::io;
use std::result;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

/// A system error, retrieved from errno (man 3 errno), set by a libc function that returned an
/// error.
#[derive(Error, Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(transparent)]
pub struct Error(i32);
pub type Result<T> = result::Result<T, Error>;

impl Error {
    /// Constructs a new error with the given error number.
    pub fn new<T: TryInto<i32>>(e: T) -> Error {
        // A value outside the bounds of an i32 will never be a valid errno.
        Error(e.try_into().unwrap_or_default())
    }

    /// Constructs an Error from the most recent system error.
    ///
    /// The result of this only has any meaning just after a libc call that returned a value
    /// indicating errno was set.
    pub fn last() -> Error {
        Error(io::Error::last_os_error().raw_os_error().unwrap_or_default())
    }

    /// Gets the errno for this error
    pub fn errno(self) -> i32 {
        self.0
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error(e.raw_os_error().unwrap_or_default())
    }
}

impl From<Error> for io::Error {
    fn from(e: Error) -> io::Error {
        io::Error::from_raw_os_error(e.0)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        Into::<io::Error>::into(*self).fmt(f)
    }
}

/// Returns the last errno as a Result that is always an error.
pub fn errno_result<T>() -> Result<T> {
    Err(Error::last())
}

/// Retries the given expression every time it fails with `EINTR`.
///
/// For libc calls that signal errors by returning `-1` and setting `errno`.
#[macro_export]
macro_rules! handle_eintr_errno {
    ($x:expr) => {{
        use libc::EINTR;
        use $crate::errno::Error;
        let mut res;
        loop {
            res = $x;
            if res != -1 || Error::last() != Error::new(EINTR) {
                break;
            }
        }
        res
    }};
}

#[cfg(test)]
mod tests {
    use libc::EBADF;
    use libc::EINTR;
    use libc::ENOTTY;

    use super::*;

    fn set_errno(e: i32) {
        #[cfg(target_os = "android")]
        // SAFETY: errno is thread-local and always valid to write.
        unsafe {
            *libc::__errno() = e;
        }
        #[cfg(not(target_os = "android"))]
        // SAFETY: errno is thread-local and always valid to write.
        unsafe {
            *libc::__errno_location() = e;
        }
    }

    #[test]
    fn converts_to_io_error() {
        let e: io::Error = Error::new(ENOTTY).into();
        assert_eq!(e.raw_os_error(), Some(ENOTTY));
        assert_eq!(Error::from(e), Error::new(ENOTTY));
    }

    #[test]
    fn out_of_range_errno_is_zero() {
        assert_eq!(Error::new(u64::MAX).errno(), 0);
    }

    #[test]
    fn last_reads_errno() {
        set_errno(EBADF);
        assert_eq!(Error::last(), Error::new(EBADF));
    }

    #[test]
    fn eintr_errno_retries() {
        let mut count = 3;
        let mut dummy = || {
            count -= 1;
            if count > 0 {
                set_errno(EINTR);
                -1
            } else {
                0
            }
        };
        let res = handle_eintr_errno!(dummy());
        assert_eq!(res, 0);
        assert_eq!(count, 0);
    }

    #[test]
    fn eintr_errno_stops_on_other_errors() {
        let mut count = 0;
        let mut dummy = || {
            count += 1;
            set_errno(EBADF);
            -1
        };
        let res = handle_eintr_errno!(dummy());
        assert_eq!(res, -1);
        assert_eq!(count, 1);
    }
}
