//! Mount-namespace wrapper described in §4.2: every command, one-shot or
//! REPL startup, runs inside a private mount namespace so it sees only its
//! own `/mnt/data` and cannot observe other sessions' directories or the
//! host's sensitive paths. Grounded on the namespace/mount syscalls in
//! `diggerhq-opensandbox`'s `sandbox` module, adapted from its single
//! chrooted-rootfs model to bind-mounting `/mnt/data` over an existing image
//! (this service runs its workers inside an already-provisioned container,
//! so there is no separate guest rootfs to assemble).

use std::path::{Path, PathBuf};

use nix::mount::{mount, umount2, MntFlags, MsFlags};
use nix::sched::CloneFlags;
use nix::unistd::{Gid, Uid};

use crate::error::{Result, SandboxError};

/// Host paths overlaid with empty tmpfs mounts inside the child's private
/// mount namespace so they read as empty rather than leaking host state
/// (§4.2 step 3).
pub fn masked_host_paths(sandboxes_root: &Path, metrics_dir: &Path, log_dir: &Path, ssl_dir: &Path, dashboard_dir: &Path, app_src_dir: &Path) -> Vec<PathBuf> {
    vec![
        sandboxes_root.to_path_buf(),
        metrics_dir.to_path_buf(),
        log_dir.to_path_buf(),
        ssl_dir.to_path_buf(),
        dashboard_dir.to_path_buf(),
        app_src_dir.to_path_buf(),
    ]
}

pub struct IsolationPlan {
    pub data_dir: PathBuf,
    pub mask_paths: Vec<PathBuf>,
    pub mask_proc: bool,
    pub enable_network: bool,
    pub uid: u32,
    pub gid: u32,
}

impl IsolationPlan {
    /// Builds the plan for a freshly created sandbox from its language's
    /// registry entry: `/proc` stays masked unless the language is a
    /// documented exception (§4.2 step 4), and the UID/GID drop matches the
    /// language's dedicated owner (§4.1).
    pub fn for_language(data_dir: PathBuf, mask_paths: Vec<PathBuf>, spec: &cellbox_langs::LanguageSpec, enable_network: bool) -> Self {
        Self {
            data_dir,
            mask_paths,
            mask_proc: !spec.needs_proc,
            enable_network,
            uid: spec.uid,
            gid: spec.gid,
        }
    }
}

impl IsolationPlan {
    /// `CLONE_NEWPID | CLONE_NEWNS | CLONE_NEWUTS | CLONE_NEWIPC`, plus
    /// `CLONE_NEWNET` unless networking was explicitly enabled (§4.2 step 5:
    /// "network is disabled unless explicitly enabled").
    pub fn clone_flags(&self) -> CloneFlags {
        let mut flags = CloneFlags::CLONE_NEWPID
            | CloneFlags::CLONE_NEWNS
            | CloneFlags::CLONE_NEWUTS
            | CloneFlags::CLONE_NEWIPC;
        if !self.enable_network {
            flags |= CloneFlags::CLONE_NEWNET;
        }
        flags
    }

    /// Runs entirely inside the freshly cloned child, before exec. Order
    /// matters: mounts first (they need the still-privileged UID), hostname
    /// next, then the irreversible UID/GID drop last so nothing after it
    /// needs privilege.
    pub fn apply(&self) -> Result<()> {
        bind_mount(&self.data_dir, Path::new("/mnt/data"))?;

        for path in &self.mask_paths {
            if path.exists() {
                mount_empty_tmpfs(path)?;
            }
        }

        if self.mask_proc {
            bind_mount(Path::new("/dev/null"), Path::new("/proc"))
                .or_else(|e| {
                    // /proc may be a mountpoint rather than a plain file; a
                    // masking tmpfs works equally well for the "leaks no
                    // information" requirement.
                    mount_empty_tmpfs(Path::new("/proc")).map_err(|_| e)
                })?;
        }

        nix::unistd::sethostname("sandbox").map_err(|e| SandboxError::Isolation(format!("sethostname: {e}")))?;

        nix::unistd::setgid(Gid::from_raw(self.gid)).map_err(|e| SandboxError::Isolation(format!("setgid: {e}")))?;
        nix::unistd::setuid(Uid::from_raw(self.uid)).map_err(|e| SandboxError::Isolation(format!("setuid: {e}")))?;
        // Linux clears the permitted/effective capability sets on a setuid()
        // away from root, so no separate capability-drop call is needed
        // (§4.2 step 5: "all Linux capabilities are dropped").

        std::env::set_current_dir("/mnt/data").map_err(|e| SandboxError::Isolation(format!("chdir /mnt/data: {e}")))?;

        Ok(())
    }
}

fn bind_mount(source: &Path, target: &Path) -> Result<()> {
    mount(
        Some(source),
        target,
        None::<&str>,
        MsFlags::MS_BIND | MsFlags::MS_REC,
        None::<&str>,
    )
    .map_err(|source_err| SandboxError::Mount {
        target: target.to_path_buf(),
        source: source_err,
    })
}

fn mount_empty_tmpfs(target: &Path) -> Result<()> {
    mount(
        Some("tmpfs"),
        target,
        Some("tmpfs"),
        MsFlags::MS_NOSUID | MsFlags::MS_NODEV,
        Some("size=1k,mode=000"),
    )
    .map_err(|source| SandboxError::Mount {
        target: target.to_path_buf(),
        source,
    })
}

/// Best-effort unwind of the masking mounts. Only meaningful when the
/// private mount namespace itself somehow outlives the child (it normally
/// does not — namespace teardown happens automatically when the last task
/// inside it exits).
pub fn unmount_all(paths: &[PathBuf]) {
    for path in paths {
        let _ = umount2(path.as_path(), MntFlags::MNT_DETACH);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clone_flags_include_newnet_unless_networking_enabled() {
        let plan = IsolationPlan {
            data_dir: PathBuf::from("/tmp"),
            mask_paths: vec![],
            mask_proc: true,
            enable_network: false,
            uid: 1001,
            gid: 1001,
        };
        assert!(plan.clone_flags().contains(CloneFlags::CLONE_NEWNET));

        let networked = IsolationPlan {
            enable_network: true,
            ..plan
        };
        assert!(!networked.clone_flags().contains(CloneFlags::CLONE_NEWNET));
    }

    #[test]
    fn clone_flags_always_include_pid_ns_uts_ipc_mount() {
        let plan = IsolationPlan {
            data_dir: PathBuf::from("/tmp"),
            mask_paths: vec![],
            mask_proc: true,
            enable_network: false,
            uid: 1001,
            gid: 1001,
        };
        let flags = plan.clone_flags();
        assert!(flags.contains(CloneFlags::CLONE_NEWPID));
        assert!(flags.contains(CloneFlags::CLONE_NEWNS));
        assert!(flags.contains(CloneFlags::CLONE_NEWUTS));
        assert!(flags.contains(CloneFlags::CLONE_NEWIPC));
    }
}
