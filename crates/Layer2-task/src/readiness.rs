//! Readiness set - one `poll(2)` across every executing task's stdout

use crate::task::TaskId;
use std::io;
use std::os::fd::RawFd;

/// A descriptor that `poll` reported on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ReadyEvent {
    /// Position in the set, used to mark the entry finished
    pub index: usize,
    pub owner: TaskId,
    pub readable: bool,
    /// Hang-up, error or invalid descriptor
    pub hung_up: bool,
}

/// Descriptors being watched, each tagged with the task that owns it.
///
/// Entries are only removed by `compact`, so indices reported by `wait` stay valid
/// until then.
// pollfd only implements Debug with libc's extra_traits feature
#[derive(Default)]
pub(crate) struct ReadinessSet {
    fds: Vec<libc::pollfd>,
    owners: Vec<TaskId>,
    finished: Vec<bool>,
}

impl ReadinessSet {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(&mut self, fd: RawFd, owner: TaskId) {
        self.fds.push(libc::pollfd {
            fd,
            events: libc::POLLIN,
            revents: 0,
        });
        self.owners.push(owner);
        self.finished.push(false);
    }

    pub(crate) fn len(&self) -> usize {
        self.fds.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.fds.is_empty()
    }

    /// Block until at least one descriptor is ready. Interrupted waits are retried.
    pub(crate) fn wait(&mut self) -> io::Result<Vec<ReadyEvent>> {
        if self.is_empty() {
            return Ok(Vec::new());
        }

        loop {
            for pfd in &mut self.fds {
                pfd.revents = 0;
            }
            let ret = unsafe {
                libc::poll(
                    self.fds.as_mut_ptr(),
                    self.fds.len() as libc::nfds_t,
                    -1,
                )
            };
            if ret >= 0 {
                break;
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err);
            }
        }

        let events = self
            .fds
            .iter()
            .enumerate()
            .filter(|(index, pfd)| pfd.revents != 0 && !self.finished[*index])
            .map(|(index, pfd)| ReadyEvent {
                index,
                owner: self.owners[index],
                readable: pfd.revents & libc::POLLIN != 0,
                hung_up: pfd.revents & (libc::POLLHUP | libc::POLLERR | libc::POLLNVAL) != 0,
            })
            .collect();
        Ok(events)
    }

    /// Mark an entry for removal at the next `compact`
    pub(crate) fn mark_finished(&mut self, index: usize) {
        if let Some(flag) = self.finished.get_mut(index) {
            *flag = true;
        }
    }

    /// Drop every entry marked finished
    pub(crate) fn compact(&mut self) {
        let mut index = 0;
        let finished = &self.finished;
        self.fds.retain(|_| {
            let keep = !finished[index];
            index += 1;
            keep
        });
        index = 0;
        self.owners.retain(|_| {
            let keep = !finished[index];
            index += 1;
            keep
        });
        self.finished.retain(|done| !done);
    }

    /// Forget every entry without touching the descriptors themselves
    pub(crate) fn clear(&mut self) {
        self.fds.clear();
        self.owners.clear();
        self.finished.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::cloexec_pipe;
    use std::fs::File;
    use std::io::Write;
    use std::os::fd::AsRawFd;

    #[test]
    fn test_readable_and_hangup() {
        let (read_a, write_a) = cloexec_pipe().unwrap();
        let (read_b, write_b) = cloexec_pipe().unwrap();
        let a = TaskId::new();
        let b = TaskId::new();

        let mut set = ReadinessSet::new();
        set.register(read_a.as_raw_fd(), a);
        set.register(read_b.as_raw_fd(), b);

        let mut writer = File::from(write_a);
        writer.write_all(b"x").unwrap();

        let events = set.wait().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].owner, a);
        assert!(events[0].readable);
        assert!(!events[0].hung_up);

        drop(write_b);
        let events = set.wait().unwrap();
        let hung: Vec<_> = events.iter().filter(|e| e.hung_up).collect();
        assert_eq!(hung.len(), 1);
        assert_eq!(hung[0].owner, b);
    }

    #[test]
    fn test_compact_keeps_owners_aligned() {
        let pipes: Vec<_> = (0..3).map(|_| cloexec_pipe().unwrap()).collect();
        let ids: Vec<_> = (0..3).map(|_| TaskId::new()).collect();

        let mut set = ReadinessSet::new();
        for ((read, _), id) in pipes.iter().zip(&ids) {
            set.register(read.as_raw_fd(), *id);
        }

        set.mark_finished(1);
        set.compact();
        assert_eq!(set.len(), 2);

        // Data on the last pipe must still map to its own owner after compaction
        let (_, write_last) = &pipes[2];
        let mut writer = File::from(write_last.try_clone().unwrap());
        writer.write_all(b"y").unwrap();

        let events = set.wait().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].owner, ids[2]);
        assert_eq!(events[0].index, 1);
    }

    #[test]
    fn test_empty_set_does_not_block() {
        let mut set = ReadinessSet::new();
        assert!(set.is_empty());
        assert!(set.wait().unwrap().is_empty());
    }
}
