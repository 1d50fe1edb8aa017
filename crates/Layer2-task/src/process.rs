//! Child processes and their output pipes
//!
//! `SpawnedProcess` owns everything the OS handed out for one task: the pid and
//! the read ends of its pipes. Read ends are `File`s, so they are closed exactly
//! once, either by `close_pipes` or when the handle is dropped (including the
//! spawn-failure path, where the handle never comes into existence).

use serde::{Deserialize, Serialize};
use std::ffi::{CStr, OsString};
use std::fs::File;
use std::io::{self, Read};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::process::ExitStatusExt;
use std::process::{Command, ExitStatus, Stdio};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

const READ_CHUNK: usize = 16 * 1024;

/// Result of draining a pipe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Drain {
    /// Everything available was read; the writer may produce more
    Pending,
    /// The writer closed its end
    Closed,
}

/// How a child terminated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Termination {
    /// Normal exit with a status code
    Exited(i32),
    /// Killed by a signal
    Signalled(Signal),
}

impl Termination {
    pub fn from_status(status: ExitStatus) -> Self {
        if let Some(code) = status.code() {
            Termination::Exited(code)
        } else if let Some(number) = status.signal() {
            Termination::Signalled(Signal::new(number, status.core_dumped()))
        } else {
            // stopped/continued are never requested from wait4
            Termination::Exited(status.into_raw())
        }
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Termination::Exited(code) => Some(*code),
            Termination::Signalled(_) => None,
        }
    }

    pub fn signal(&self) -> Option<&Signal> {
        match self {
            Termination::Exited(_) => None,
            Termination::Signalled(signal) => Some(signal),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Termination::Exited(0))
    }
}

impl std::fmt::Display for Termination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Termination::Exited(code) => write!(f, "exited with code {}", code),
            Termination::Signalled(signal) => write!(f, "terminated by {}", signal),
        }
    }
}

/// A terminating signal with its human-readable description
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signal {
    pub number: i32,
    pub description: String,
    pub core_dumped: bool,
}

impl Signal {
    pub fn new(number: i32, core_dumped: bool) -> Self {
        Self {
            number,
            description: describe_signal(number),
            core_dumped,
        }
    }
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "signal {} ({})", self.number, self.description)?;
        if self.core_dumped {
            write!(f, ", core dumped")?;
        }
        Ok(())
    }
}

/// Platform description of a signal number, e.g. "Killed" for 9
pub fn describe_signal(number: i32) -> String {
    // strsignal may hand back a shared static buffer, so the copy happens under the lock
    let _guard = STRSIGNAL_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
    let ptr = unsafe { libc::strsignal(number) };
    if ptr.is_null() {
        return format!("Unknown signal {}", number);
    }
    unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
}

static STRSIGNAL_LOCK: Mutex<()> = Mutex::new(());

/// CPU time and peak memory reported by `wait4`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceUsage {
    pub user_time: Duration,
    pub system_time: Duration,
    /// Peak resident set size in KiB
    pub max_rss_kib: u64,
}

impl ResourceUsage {
    fn from_rusage(usage: &libc::rusage) -> Self {
        Self {
            user_time: timeval_to_duration(usage.ru_utime),
            system_time: timeval_to_duration(usage.ru_stime),
            max_rss_kib: max_rss_kib(usage.ru_maxrss as i64),
        }
    }
}

fn timeval_to_duration(tv: libc::timeval) -> Duration {
    Duration::from_secs(tv.tv_sec.max(0) as u64) + Duration::from_micros(tv.tv_usec.max(0) as u64)
}

#[cfg(any(target_os = "macos", target_os = "ios"))]
fn max_rss_kib(raw: i64) -> u64 {
    // Darwin reports bytes
    raw.max(0) as u64 / 1024
}

#[cfg(not(any(target_os = "macos", target_os = "ios")))]
fn max_rss_kib(raw: i64) -> u64 {
    raw.max(0) as u64
}

/// A running (or exited but not yet reaped) child and the read ends of its pipes
#[derive(Debug)]
pub(crate) struct SpawnedProcess {
    pid: u32,
    stdout: Option<File>,
    stderr: Option<File>,
}

impl SpawnedProcess {
    /// Spawn `program` with stdout on a fresh pipe and stderr either on its own pipe
    /// or merged into stdout.
    pub(crate) fn spawn(
        program: &str,
        args: &[String],
        env: &[(OsString, OsString)],
        separate_errors: bool,
    ) -> io::Result<Self> {
        let (stdout_read, stdout_write) = cloexec_pipe()?;
        let (stderr_read, stderr_write) = if separate_errors {
            let (read, write) = cloexec_pipe()?;
            (Some(read), write)
        } else {
            // Same pipe as stdout so the child's writes keep their relative order
            (None, stdout_write.try_clone()?)
        };

        // Only the read ends are non-blocking; the child's write ends stay blocking
        set_nonblocking(&stdout_read, true)?;
        if let Some(read) = &stderr_read {
            set_nonblocking(read, true)?;
        }

        let child = {
            let mut command = Command::new(program);
            command
                .args(args)
                .env_clear()
                .envs(env.iter().map(|(key, value)| (key, value)))
                .stdout(Stdio::from(stdout_write))
                .stderr(Stdio::from(stderr_write));
            command.spawn()?
            // `command` drops here, closing the parent's copies of the write ends
        };

        Ok(Self {
            pid: child.id(),
            stdout: Some(File::from(stdout_read)),
            stderr: stderr_read.map(File::from),
        })
    }

    pub(crate) fn pid(&self) -> u32 {
        self.pid
    }

    pub(crate) fn stdout_fd(&self) -> Option<RawFd> {
        self.stdout.as_ref().map(AsRawFd::as_raw_fd)
    }

    pub(crate) fn has_open_pipes(&self) -> bool {
        self.stdout.is_some() || self.stderr.is_some()
    }

    /// Drain whatever is currently readable. Reports whether stdout reached EOF.
    pub(crate) fn read_available(
        &mut self,
        output: &mut Vec<u8>,
        errors: &mut Vec<u8>,
    ) -> io::Result<Drain> {
        let stdout = match self.stdout.as_mut() {
            Some(pipe) => drain(pipe, output)?,
            None => Drain::Closed,
        };
        if let Some(pipe) = self.stderr.as_mut() {
            drain(pipe, errors)?;
        }
        Ok(stdout)
    }

    /// Block until every writer has closed both pipes, keeping whatever arrives.
    ///
    /// Stdout is read to EOF before stderr, so a child that fills a separate stderr
    /// pipe while keeping stdout open stalls here just as it does under `poll`.
    pub(crate) fn read_to_close(
        &mut self,
        output: &mut Vec<u8>,
        errors: &mut Vec<u8>,
    ) -> io::Result<()> {
        if let Some(pipe) = self.stdout.as_mut() {
            set_nonblocking(pipe, false)?;
            pipe.read_to_end(output)?;
        }
        if let Some(pipe) = self.stderr.as_mut() {
            set_nonblocking(pipe, false)?;
            pipe.read_to_end(errors)?;
        }
        Ok(())
    }

    /// Close both read ends. Safe to call more than once.
    pub(crate) fn close_pipes(&mut self) {
        self.stdout.take();
        self.stderr.take();
    }

    /// Block until the child exits, retrying interrupted waits
    pub(crate) fn wait(&self) -> io::Result<(ExitStatus, ResourceUsage)> {
        let mut status: libc::c_int = 0;
        // SAFETY: rusage is plain old data; all-zero is a valid value
        let mut usage: libc::rusage = unsafe { std::mem::zeroed() };

        loop {
            let ret = unsafe { libc::wait4(self.pid as libc::pid_t, &mut status, 0, &mut usage) };
            if ret >= 0 {
                break;
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err);
            }
        }

        Ok((
            ExitStatus::from_raw(status),
            ResourceUsage::from_rusage(&usage),
        ))
    }
}

fn drain(pipe: &mut File, into: &mut Vec<u8>) -> io::Result<Drain> {
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        match pipe.read(&mut chunk) {
            Ok(0) => return Ok(Drain::Closed),
            Ok(n) => into.extend_from_slice(&chunk[..n]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(Drain::Pending),
            Err(e) => return Err(e),
        }
    }
}

/// Create a pipe whose ends are close-on-exec, so siblings spawned later never
/// inherit another task's write end.
pub(crate) fn cloexec_pipe() -> io::Result<(OwnedFd, OwnedFd)> {
    let mut fds: [RawFd; 2] = [-1; 2];

    #[cfg(any(
        target_os = "linux",
        target_os = "android",
        target_os = "freebsd",
        target_os = "netbsd",
        target_os = "openbsd",
        target_os = "dragonfly"
    ))]
    {
        if unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) } < 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: pipe2 succeeded, both descriptors are fresh and owned by us
        Ok(unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) })
    }

    #[cfg(not(any(
        target_os = "linux",
        target_os = "android",
        target_os = "freebsd",
        target_os = "netbsd",
        target_os = "openbsd",
        target_os = "dragonfly"
    )))]
    {
        if unsafe { libc::pipe(fds.as_mut_ptr()) } < 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: pipe succeeded, both descriptors are fresh and owned by us
        let (read, write) = unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };
        set_cloexec(&read)?;
        set_cloexec(&write)?;
        Ok((read, write))
    }
}

#[cfg(not(any(
    target_os = "linux",
    target_os = "android",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "dragonfly"
)))]
fn set_cloexec(fd: &OwnedFd) -> io::Result<()> {
    let raw = fd.as_raw_fd();
    let flags = unsafe { libc::fcntl(raw, libc::F_GETFD) };
    if flags < 0 || unsafe { libc::fcntl(raw, libc::F_SETFD, flags | libc::FD_CLOEXEC) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn set_nonblocking(fd: &impl AsRawFd, enabled: bool) -> io::Result<()> {
    let raw = fd.as_raw_fd();
    let flags = unsafe { libc::fcntl(raw, libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    let flags = if enabled {
        flags | libc::O_NONBLOCK
    } else {
        flags & !libc::O_NONBLOCK
    };
    if unsafe { libc::fcntl(raw, libc::F_SETFL, flags) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}
