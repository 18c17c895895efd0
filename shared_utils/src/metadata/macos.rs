//! macOS-only creation-date handling via `setattrlist(2)`.
//!
//! `filetime` only covers atime/mtime; birthtime (`kMDItemFSCreationDate`)
//! needs the raw syscall. Gated behind `cfg(target_os = "macos")` and only
//! ever called from the Darwin branch of the timestamp-fallback tier.

use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::time::SystemTime;

#[repr(C)]
struct AttrList {
    bitmapcount: libc::c_ushort,
    reserved: libc::c_ushort,
    commonattr: libc::c_ulong,
    volattr: libc::c_ulong,
    dirattr: libc::c_ulong,
    fileattr: libc::c_ulong,
    forkattr: libc::c_ulong,
}

const ATTR_BIT_MAP_COUNT: libc::c_ushort = 5;
const ATTR_CMN_CRTIME: libc::c_ulong = 0x0000_0200;

pub fn set_creation_time(path: &Path, time: SystemTime) -> io::Result<()> {
    let dur = time
        .duration_since(SystemTime::UNIX_EPOCH)
        .map_err(|e| io::Error::other(e.to_string()))?;
    let spec = libc::timespec {
        tv_sec: dur.as_secs() as libc::time_t,
        tv_nsec: dur.subsec_nanos() as libc::c_long,
    };

    let mut attrs = AttrList {
        bitmapcount: ATTR_BIT_MAP_COUNT,
        reserved: 0,
        commonattr: ATTR_CMN_CRTIME,
        volattr: 0,
        dirattr: 0,
        fileattr: 0,
        forkattr: 0,
    };

    let c_path = std::ffi::CString::new(path.as_os_str().as_bytes())
        .map_err(|e| io::Error::other(e.to_string()))?;

    let ret = unsafe {
        setattrlist(
            c_path.as_ptr(),
            &mut attrs as *mut AttrList as *mut libc::c_void,
            &spec as *const libc::timespec as *mut libc::c_void,
            std::mem::size_of::<libc::timespec>(),
            0,
        )
    };

    if ret != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

extern "C" {
    fn setattrlist(
        path: *const libc::c_char,
        attr_list: *mut libc::c_void,
        attr_buf: *mut libc::c_void,
        attr_buf_size: libc::size_t,
        options: libc::c_ulong,
    ) -> libc::c_int;
}
