//! POSIX errno values reported by the thread layer.
//!
//! Linux numbering, with the BSD-derived values on Apple and FreeBSD targets.

/// No such process (thread already reaped or never existed).
pub const ESRCH: i32 = 3;
/// Resource temporarily unavailable.
#[cfg(not(any(target_vendor = "apple", target_os = "freebsd")))]
pub const EAGAIN: i32 = 11;
#[cfg(any(target_vendor = "apple", target_os = "freebsd"))]
pub const EAGAIN: i32 = 35;
/// Cannot allocate memory.
pub const ENOMEM: i32 = 12;
/// Device or resource busy.
pub const EBUSY: i32 = 16;
/// Invalid argument.
pub const EINVAL: i32 = 22;
/// Resource deadlock would occur.
#[cfg(not(any(target_vendor = "apple", target_os = "freebsd")))]
pub const EDEADLK: i32 = 35;
#[cfg(any(target_vendor = "apple", target_os = "freebsd"))]
pub const EDEADLK: i32 = 11;
/// Operation canceled.
#[cfg(not(any(target_vendor = "apple", target_os = "freebsd")))]
pub const ECANCELED: i32 = 125;
#[cfg(target_vendor = "apple")]
pub const ECANCELED: i32 = 89;
#[cfg(target_os = "freebsd")]
pub const ECANCELED: i32 = 85;
