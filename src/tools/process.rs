//! Shell subprocesses for tools and command goals
//!
//! Every shell starts as the leader of its own process group so a timeout can
//! take down whatever it forked, not just `sh`. Pipe reads are bounded: output
//! past the limit is drained and counted but never held in memory.

use std::io;
use std::path::Path;
use std::process::Stdio;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};

const READ_CHUNK: usize = 8192;

/// `sh -c <command>` in `cwd` with piped output and no stdin
pub(crate) fn shell(command: &str, cwd: &Path) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c")
        .arg(command)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);
    cmd
}

/// Kills a child's whole process group when dropped, unless released first
pub(crate) struct GroupKill {
    pgid: Option<u32>,
}

impl GroupKill {
    /// Guard for a child spawned by [`shell`]; its pid is its group id
    pub fn new(child: &Child) -> Self {
        Self { pgid: child.id() }
    }

    pub fn kill(&mut self) {
        if let Some(pgid) = self.pgid.take() {
            kill_group(pgid);
        }
    }

    /// The child exited on its own; leave the group alone
    pub fn release(mut self) {
        self.pgid = None;
    }
}

impl Drop for GroupKill {
    fn drop(&mut self) {
        self.kill();
    }
}

#[cfg(unix)]
fn kill_group(pgid: u32) {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    match killpg(Pid::from_raw(pgid as i32), Signal::SIGKILL) {
        Ok(()) => log::debug!("killed process group {}", pgid),
        Err(Errno::ESRCH) => {}
        Err(e) => log::warn!("Failed to kill process group {}: {}", pgid, e),
    }
}

#[cfg(not(unix))]
fn kill_group(_pgid: u32) {}

/// Which end of an oversized stream survives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Keep {
    Head,
    Tail,
}

/// What was kept from one stream, and how much was thrown away
#[derive(Debug, Default)]
pub(crate) struct Captured {
    pub bytes: Vec<u8>,
    pub discarded: u64,
}

impl Captured {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

/// Read `reader` to EOF holding at most `limit` bytes
pub(crate) async fn read_capped<R>(mut reader: R, limit: usize, keep: Keep) -> io::Result<Captured>
where
    R: AsyncRead + Unpin,
{
    let mut captured = Captured::default();
    let mut chunk = vec![0u8; READ_CHUNK];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        captured.bytes.extend_from_slice(&chunk[..n]);
        if captured.bytes.len() > limit {
            let excess = captured.bytes.len() - limit;
            match keep {
                Keep::Head => captured.bytes.truncate(limit),
                Keep::Tail => {
                    captured.bytes.drain(..excess);
                }
            }
            captured.discarded += excess as u64;
        }
    }
    Ok(captured)
}

/// Read both pipes of a [`shell`] child concurrently, then reap it
pub(crate) async fn collect(
    child: &mut Child,
    limit: usize,
    keep: Keep,
) -> io::Result<(Captured, Captured, std::process::ExitStatus)> {
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let (out, err) = tokio::join!(
        async {
            match stdout {
                Some(pipe) => read_capped(pipe, limit, keep).await,
                None => Ok(Captured::default()),
            }
        },
        async {
            match stderr {
                Some(pipe) => read_capped(pipe, limit, keep).await,
                None => Ok(Captured::default()),
            }
        }
    );
    let status = child.wait().await?;
    Ok((out?, err?, status))
}
