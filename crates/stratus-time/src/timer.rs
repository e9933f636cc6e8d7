//! Periodic signal timer
//!
//! Fallback trigger for clock refreshes when the poller may sleep longer
//! than wanted. The timer counts the calling thread's CPU time when the
//! kernel supports it, wall time otherwise.

use std::io;
use std::time::Duration;

use stratus_core::{StratusError, StratusResult};

/// An armed POSIX timer, deleted on drop
#[derive(Debug)]
pub struct SignalTimer {
    #[cfg(target_os = "linux")]
    id: libc::timer_t,
    signal: i32,
    interval: Duration,
}

impl SignalTimer {
    /// Arm a timer delivering `signal` every `interval`, with `value` in
    /// the signal payload so handlers can tell timers apart.
    #[cfg(target_os = "linux")]
    pub fn setup(signal: i32, value: i32, interval: Duration) -> StratusResult<Self> {
        if signal <= 0 || signal >= 65 || interval.is_zero() {
            return Err(StratusError::TimerSetup(io::Error::from(io::ErrorKind::InvalidInput)));
        }

        // SAFETY: the set is initialised by sigemptyset before use and only
        // modifies this thread's mask.
        unsafe {
            let mut set: libc::sigset_t = std::mem::zeroed();
            libc::sigemptyset(&mut set);
            libc::sigaddset(&mut set, signal);
            libc::pthread_sigmask(libc::SIG_UNBLOCK, &set, std::ptr::null_mut());
        }

        // SAFETY: sigevent is plain data; all-zero is a valid starting point.
        let mut sev: libc::sigevent = unsafe { std::mem::zeroed() };
        sev.sigev_notify = libc::SIGEV_SIGNAL;
        sev.sigev_signo = signal;
        sev.sigev_value = libc::sigval {
            sival_ptr: value as isize as *mut libc::c_void,
        };

        let mut id: libc::timer_t = std::ptr::null_mut();
        // SAFETY: both pointers are valid for the duration of the call.
        let created = unsafe {
            libc::timer_create(libc::CLOCK_THREAD_CPUTIME_ID, &mut sev, &mut id) == 0
                || libc::timer_create(libc::CLOCK_REALTIME, &mut sev, &mut id) == 0
        };
        if !created {
            return Err(StratusError::TimerSetup(io::Error::last_os_error()));
        }

        let period = libc::timespec {
            tv_sec: interval.as_secs() as libc::time_t,
            tv_nsec: interval.subsec_nanos() as libc::c_long,
        };
        let its = libc::itimerspec {
            it_interval: period,
            it_value: period,
        };
        // SAFETY: `id` was returned by a successful timer_create.
        if unsafe { libc::timer_settime(id, 0, &its, std::ptr::null_mut()) } != 0 {
            let err = io::Error::last_os_error();
            // SAFETY: same timer, deleted exactly once.
            unsafe { libc::timer_delete(id) };
            return Err(StratusError::TimerSetup(err));
        }

        Ok(SignalTimer {
            id,
            signal,
            interval,
        })
    }

    #[cfg(not(target_os = "linux"))]
    pub fn setup(_signal: i32, _value: i32, _interval: Duration) -> StratusResult<Self> {
        Err(StratusError::TimerUnsupported)
    }

    pub fn signal(&self) -> i32 {
        self.signal
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

#[cfg(target_os = "linux")]
impl Drop for SignalTimer {
    fn drop(&mut self) {
        // SAFETY: the timer is owned by this value and deleted only here.
        unsafe { libc::timer_delete(self.id) };
    }
}
