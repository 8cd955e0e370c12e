//! File descriptors the plugin wants watched.
//!
//! Each registered descriptor has a read watcher and a write watcher that
//! are enabled or disabled from the protocol's interest flags. The idle pass
//! polls the enabled watchers without blocking and re-enters the plugin's
//! `on_fd` with the directions that fired.

use clap_sys::ext::posix_fd_support::{
    CLAP_POSIX_FD_ERROR, CLAP_POSIX_FD_READ, CLAP_POSIX_FD_WRITE,
};
use smallvec::SmallVec;
use std::collections::BTreeMap;
use std::os::raw::c_int;

pub type RawFd = c_int;

const KNOWN_FLAGS: u32 = CLAP_POSIX_FD_READ | CLAP_POSIX_FD_WRITE | CLAP_POSIX_FD_ERROR;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FdWatchers {
    pub read: bool,
    pub write: bool,
}

impl FdWatchers {
    fn from_flags(flags: u32) -> Self {
        Self {
            read: flags & CLAP_POSIX_FD_READ != 0,
            write: flags & CLAP_POSIX_FD_WRITE != 0,
        }
    }

    pub fn flags(self) -> u32 {
        let mut flags = 0;
        if self.read {
            flags |= CLAP_POSIX_FD_READ;
        }
        if self.write {
            flags |= CLAP_POSIX_FD_WRITE;
        }
        flags
    }
}

/// A readiness notification for one descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FdEvent {
    pub fd: RawFd,
    /// `CLAP_POSIX_FD_*` bits that fired
    pub flags: u32,
}

#[derive(Debug, Default)]
pub struct FdRegistry {
    fds: BTreeMap<RawFd, FdWatchers>,
}

impl FdRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start watching `fd`. Fails for negative or already-registered
    /// descriptors and for unknown flag bits.
    pub fn register(&mut self, fd: RawFd, flags: u32) -> bool {
        if fd < 0 || flags & !KNOWN_FLAGS != 0 || self.fds.contains_key(&fd) {
            return false;
        }
        self.fds.insert(fd, FdWatchers::from_flags(flags));
        true
    }

    /// Change the interest set of a registered descriptor.
    pub fn modify(&mut self, fd: RawFd, flags: u32) -> bool {
        if flags & !KNOWN_FLAGS != 0 {
            return false;
        }
        match self.fds.get_mut(&fd) {
            Some(watchers) => {
                *watchers = FdWatchers::from_flags(flags);
                true
            }
            None => false,
        }
    }

    pub fn unregister(&mut self, fd: RawFd) -> bool {
        self.fds.remove(&fd).is_some()
    }

    pub fn watchers(&self, fd: RawFd) -> Option<FdWatchers> {
        self.fds.get(&fd).copied()
    }

    /// Every registered descriptor with its interest flags, for hosts that
    /// integrate the descriptors into their own event loop.
    pub fn iter(&self) -> impl Iterator<Item = (RawFd, FdWatchers)> + '_ {
        self.fds.iter().map(|(&fd, &w)| (fd, w))
    }

    pub fn len(&self) -> usize {
        self.fds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fds.is_empty()
    }

    /// Poll every enabled watcher without blocking.
    #[cfg(unix)]
    pub fn poll_ready(&self) -> std::io::Result<SmallVec<[FdEvent; 8]>> {
        let mut pollfds: SmallVec<[libc::pollfd; 8]> = self
            .fds
            .iter()
            .filter(|(_, w)| w.read || w.write)
            .map(|(&fd, w)| {
                let mut events = 0;
                if w.read {
                    events |= libc::POLLIN;
                }
                if w.write {
                    events |= libc::POLLOUT;
                }
                libc::pollfd {
                    fd,
                    events,
                    revents: 0,
                }
            })
            .collect();

        let mut ready = SmallVec::new();
        if pollfds.is_empty() {
            return Ok(ready);
        }

        // Safety: `pollfds` is a valid, exclusively borrowed array of the given length.
        let n = unsafe { libc::poll(pollfds.as_mut_ptr(), pollfds.len() as libc::nfds_t, 0) };
        if n < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::Interrupted {
                return Ok(ready);
            }
            return Err(err);
        }

        for pfd in pollfds.iter().filter(|p| p.revents != 0) {
            let mut flags = 0;
            if pfd.revents & libc::POLLIN != 0 {
                flags |= CLAP_POSIX_FD_READ;
            }
            if pfd.revents & libc::POLLOUT != 0 {
                flags |= CLAP_POSIX_FD_WRITE;
            }
            if pfd.revents & (libc::POLLERR | libc::POLLHUP | libc::POLLNVAL) != 0 {
                flags |= CLAP_POSIX_FD_ERROR;
            }
            ready.push(FdEvent { fd: pfd.fd, flags });
        }
        Ok(ready)
    }

    #[cfg(not(unix))]
    pub fn poll_ready(&self) -> std::io::Result<SmallVec<[FdEvent; 8]>> {
        Ok(SmallVec::new())
    }

    pub(crate) fn clear(&mut self) {
        self.fds.clear();
    }
}
