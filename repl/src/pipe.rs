//! Turns the raw pipe file descriptors `cellbox_sandbox::spawn_isolated` hands
//! back into awaitable stdio. The REPL needs to send/receive many
//! request/response frames across the lifetime of one process, unlike the
//! one-shot executor which only writes stdin once and reads stdout/stderr to
//! EOF — so these pipes are wrapped with `tokio::io::unix::AsyncFd` rather
//! than drained synchronously on a blocking thread.

use std::io;
use std::os::fd::{AsRawFd, OwnedFd};

use nix::fcntl::{fcntl, FcntlArg, OFlag};
use tokio::io::unix::AsyncFd;

fn set_nonblocking(fd: &OwnedFd) -> io::Result<()> {
    let raw = fd.as_raw_fd();
    let current = fcntl(raw, FcntlArg::F_GETFL).map_err(io::Error::from)?;
    let mut flags = OFlag::from_bits_truncate(current);
    flags.insert(OFlag::O_NONBLOCK);
    fcntl(raw, FcntlArg::F_SETFL(flags)).map_err(io::Error::from)?;
    Ok(())
}

pub struct AsyncPipeWriter {
    inner: AsyncFd<OwnedFd>,
}

impl AsyncPipeWriter {
    pub fn new(fd: OwnedFd) -> io::Result<Self> {
        set_nonblocking(&fd)?;
        Ok(Self {
            inner: AsyncFd::new(fd)?,
        })
    }

    pub async fn write_all(&mut self, mut data: &[u8]) -> io::Result<()> {
        while !data.is_empty() {
            let mut guard = self.inner.writable().await?;
            let result = guard.try_io(|inner| {
                let raw = inner.get_ref().as_raw_fd();
                let n =
                    unsafe { libc::write(raw, data.as_ptr() as *const libc::c_void, data.len()) };
                if n < 0 {
                    Err(io::Error::last_os_error())
                } else {
                    Ok(n as usize)
                }
            });
            match result {
                Ok(Ok(n)) => data = &data[n..],
                Ok(Err(e)) => return Err(e),
                Err(_would_block) => continue,
            }
        }
        Ok(())
    }
}

pub struct AsyncPipeReader {
    inner: AsyncFd<OwnedFd>,
}

impl AsyncPipeReader {
    pub fn new(fd: OwnedFd) -> io::Result<Self> {
        set_nonblocking(&fd)?;
        Ok(Self {
            inner: AsyncFd::new(fd)?,
        })
    }

    /// Reads whatever is immediately available (at least one byte, unless
    /// EOF) and appends it to `buf`. Returns the number of bytes read; `0`
    /// means the writer end has closed.
    pub async fn read_some(&mut self, buf: &mut Vec<u8>) -> io::Result<usize> {
        let mut tmp = [0u8; 8192];
        loop {
            let mut guard = self.inner.readable().await?;
            let result = guard.try_io(|inner| {
                let raw = inner.get_ref().as_raw_fd();
                let n = unsafe {
                    libc::read(raw, tmp.as_mut_ptr() as *mut libc::c_void, tmp.len())
                };
                if n < 0 {
                    Err(io::Error::last_os_error())
                } else {
                    Ok(n as usize)
                }
            });
            match result {
                Ok(Ok(n)) => {
                    buf.extend_from_slice(&tmp[..n]);
                    return Ok(n);
                }
                Ok(Err(e)) => return Err(e),
                Err(_would_block) => continue,
            }
        }
    }

    /// Reads until `find_frame` can extract one full frame, returning the
    /// decoded-but-not-yet-parsed body and draining the consumed bytes
    /// (including the delimiter) from the internal carry-over buffer.
    pub async fn read_frame(
        &mut self,
        carry: &mut Vec<u8>,
    ) -> io::Result<Option<Vec<u8>>> {
        loop {
            if let Some((body, consumed)) = cellbox_protocol::repl::find_frame(carry) {
                let body = body.to_vec();
                carry.drain(..consumed);
                return Ok(Some(body));
            }
            if self.read_some(carry).await? == 0 {
                return Ok(None);
            }
        }
    }
}
