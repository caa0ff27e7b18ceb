use std::io;

/// Makes the running executable `r-x------` and tries to give it to root.
#[cfg(unix)]
pub fn harden_executable() -> io::Result<()> {
    use log::debug;
    use std::fs;
    use std::os::unix::fs::{lchown, PermissionsExt};

    const MODE: u32 = 0o500;

    let exec_path = std::env::current_exe()?;
    let metadata = fs::metadata(&exec_path)?;

    if metadata.permissions().mode() & 0o777 != MODE {
        debug!("Setting permissions of {} to {:o}", exec_path.display(), MODE);
        fs::set_permissions(&exec_path, fs::Permissions::from_mode(MODE))?;
    }

    lchown(&exec_path, Some(0), Some(0))
}

#[cfg(not(unix))]
pub fn harden_executable() -> io::Result<()> {
    Ok(())
}
