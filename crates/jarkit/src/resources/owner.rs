//! User and group name lookup

use anyhow::{Context, Result, bail};
use std::ffi::CString;

/// Buffer size for the reentrant passwd/group lookups
const LOOKUP_BUF_SIZE: usize = 16 * 1024;

/// Resolve a user name (or numeric id) to a uid
pub fn lookup_uid(user: &str) -> Result<u32> {
    if let Ok(uid) = user.parse::<u32>() {
        return Ok(uid);
    }

    let name = CString::new(user).context("user name contains a NUL byte")?;
    let mut buf = vec![0 as libc::c_char; LOOKUP_BUF_SIZE];
    // SAFETY: passwd is a plain C struct; an all-zero value is valid
    let mut pwd: libc::passwd = unsafe { std::mem::zeroed() };
    let mut found: *mut libc::passwd = std::ptr::null_mut();

    // SAFETY: every pointer refers to a live local of the declared size
    let rc = unsafe {
        libc::getpwnam_r(
            name.as_ptr(),
            &mut pwd,
            buf.as_mut_ptr(),
            buf.len(),
            &mut found,
        )
    };

    if rc != 0 || found.is_null() {
        bail!("unknown user '{user}'");
    }
    Ok(pwd.pw_uid)
}

/// Resolve a group name (or numeric id) to a gid
pub fn lookup_gid(group: &str) -> Result<u32> {
    if let Ok(gid) = group.parse::<u32>() {
        return Ok(gid);
    }

    let name = CString::new(group).context("group name contains a NUL byte")?;
    let mut buf = vec![0 as libc::c_char; LOOKUP_BUF_SIZE];
    // SAFETY: group is a plain C struct; an all-zero value is valid
    let mut grp: libc::group = unsafe { std::mem::zeroed() };
    let mut found: *mut libc::group = std::ptr::null_mut();

    // SAFETY: every pointer refers to a live local of the declared size
    let rc = unsafe {
        libc::getgrnam_r(
            name.as_ptr(),
            &mut grp,
            buf.as_mut_ptr(),
            buf.len(),
            &mut found,
        )
    };

    if rc != 0 || found.is_null() {
        bail!("unknown group '{group}'");
    }
    Ok(grp.gr_gid)
}
