//! SQLite VFS Bridge
//!
//! Exposes any [`Vfs`] to SQLite by filling in a `sqlite3_vfs` and a
//! `sqlite3_io_methods` table whose callbacks forward into the Rust traits.
//!
//! Each registration leaks one allocation holding the Rust VFS, its name and
//! its io-methods table. SQLite keeps raw pointers to all three for the rest
//! of the process, so they are never freed.

use std::ffi::{c_char, c_int, c_void, CStr, CString};
use std::mem;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::ptr;
use std::slice;

use rusqlite::{ffi, Connection, OpenFlags as ConnectionFlags};
use tracing::{debug, info, warn};

use crate::errors::{Error, Result};
use crate::vfs::{AccessFlag, LockKind, OpenFlags, SyncFlags, Vfs, VfsFile};

/// Longest pathname SQLite will hand to `xFullPathname`
const MAX_PATHNAME: c_int = 1024;

/// Everything a registered VFS needs to outlive SQLite's use of it
struct AppData<V: Vfs> {
    vfs: V,
    name: CString,
    io_methods: ffi::sqlite3_io_methods,
    /// Platform VFS used for randomness, time and sleep
    fallback: *mut ffi::sqlite3_vfs,
}

/// SQLite-allocated file object; `szOsFile` bytes of this layout
#[repr(C)]
struct FileState<F> {
    base: ffi::sqlite3_file,
    file: *mut F,
}

/// Handle to a VFS registered with SQLite for the life of the process
pub struct Registration<V: Vfs + 'static> {
    name: String,
    vfs: &'static V,
}

impl<V: Vfs + 'static> Registration<V> {
    /// Name the VFS is registered under
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The registered VFS
    pub fn vfs(&self) -> &'static V {
        self.vfs
    }

    /// Open a read-only connection that reads through this VFS.
    ///
    /// The registration name doubles as the database path handed to `xOpen`.
    /// Temp storage is kept in memory: sorts and other spills would otherwise
    /// open temp files through this VFS, which only serves the main database.
    pub fn open_connection(&self) -> Result<Connection> {
        let flags = ConnectionFlags::SQLITE_OPEN_READ_ONLY
            | ConnectionFlags::SQLITE_OPEN_URI
            | ConnectionFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags_and_vfs(&self.name, flags, &self.name)?;
        conn.pragma_update(None, "temp_store", "memory")?;
        debug!(vfs = %self.name, "Opened connection");
        Ok(conn)
    }
}

impl<V: Vfs + 'static> Clone for Registration<V> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            vfs: self.vfs,
        }
    }
}

impl<V: Vfs + 'static> std::fmt::Debug for Registration<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Register `vfs` with SQLite under `name`.
///
/// The VFS is never made the default; connections select it by name.
/// Registering a name that SQLite already knows fails.
pub fn register<V: Vfs + 'static>(name: &str, vfs: V) -> Result<Registration<V>> {
    let c_name = CString::new(name)
        .map_err(|_| Error::Config(format!("VFS name '{}' contains a NUL byte", name)))?;

    // sqlite3_vfs_find initializes the library on first use
    if !unsafe { ffi::sqlite3_vfs_find(c_name.as_ptr()) }.is_null() {
        return Err(Error::AlreadyRegistered(name.to_string()));
    }
    let fallback = unsafe { ffi::sqlite3_vfs_find(ptr::null()) };
    if fallback.is_null() {
        return Err(Error::Unsupported("no default SQLite VFS".into()));
    }

    let app_ptr = Box::into_raw(Box::new(AppData {
        vfs,
        name: c_name,
        io_methods: io_methods::<V::File>(),
        fallback,
    }));
    let app: &'static AppData<V> = unsafe { &*app_ptr };

    let raw: &'static mut ffi::sqlite3_vfs = Box::leak(Box::new(ffi::sqlite3_vfs {
        iVersion: 2,
        szOsFile: mem::size_of::<FileState<V::File>>() as c_int,
        mxPathname: MAX_PATHNAME,
        pNext: ptr::null_mut(),
        zName: app.name.as_ptr(),
        pAppData: app_ptr as *mut c_void,
        xOpen: Some(x_open::<V>),
        xDelete: Some(x_delete::<V>),
        xAccess: Some(x_access::<V>),
        xFullPathname: Some(x_full_pathname::<V>),
        xDlOpen: None,
        xDlError: None,
        xDlSym: None,
        xDlClose: None,
        xRandomness: Some(x_randomness::<V>),
        xSleep: Some(x_sleep::<V>),
        xCurrentTime: Some(x_current_time::<V>),
        xGetLastError: Some(x_get_last_error::<V>),
        xCurrentTimeInt64: Some(x_current_time_int64::<V>),
        xSetSystemCall: None,
        xGetSystemCall: None,
        xNextSystemCall: None,
    }));

    let rc = unsafe { ffi::sqlite3_vfs_register(raw, 0) };
    if rc != ffi::SQLITE_OK {
        return Err(Error::Sqlite(rusqlite::Error::SqliteFailure(
            ffi::Error::new(rc),
            Some(format!("registering VFS '{}'", name)),
        )));
    }

    info!(vfs = name, "Registered SQLite VFS");
    Ok(Registration {
        name: name.to_string(),
        vfs: &app.vfs,
    })
}

fn io_methods<F: VfsFile>() -> ffi::sqlite3_io_methods {
    ffi::sqlite3_io_methods {
        iVersion: 1,
        xClose: Some(x_close::<F>),
        xRead: Some(x_read::<F>),
        xWrite: Some(x_write::<F>),
        xTruncate: Some(x_truncate::<F>),
        xSync: Some(x_sync::<F>),
        xFileSize: Some(x_file_size::<F>),
        xLock: Some(x_lock::<F>),
        xUnlock: Some(x_unlock::<F>),
        xCheckReservedLock: Some(x_check_reserved_lock::<F>),
        xFileControl: Some(x_file_control::<F>),
        xSectorSize: Some(x_sector_size::<F>),
        xDeviceCharacteristics: Some(x_device_characteristics::<F>),
        xShmMap: None,
        xShmLock: None,
        xShmBarrier: None,
        xShmUnmap: None,
        xFetch: None,
        xUnfetch: None,
    }
}

/// Run a callback body, turning a panic into `code` instead of unwinding into C
fn guard<F: FnOnce() -> c_int>(code: c_int, f: F) -> c_int {
    catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|_| {
        warn!(code = code, "Panic in VFS callback");
        code
    })
}

fn result_code(result: Result<()>) -> c_int {
    match result {
        Ok(()) => ffi::SQLITE_OK,
        Err(e) => e.to_sqlite_code(),
    }
}

unsafe fn app_data<'a, V: Vfs>(p_vfs: *mut ffi::sqlite3_vfs) -> &'a AppData<V> {
    &*((*p_vfs).pAppData as *const AppData<V>)
}

unsafe fn fallback<V: Vfs>(p_vfs: *mut ffi::sqlite3_vfs) -> *mut ffi::sqlite3_vfs {
    app_data::<V>(p_vfs).fallback
}

unsafe fn name_arg<'a>(z_name: *const c_char) -> Option<&'a str> {
    if z_name.is_null() {
        return Some("");
    }
    CStr::from_ptr(z_name).to_str().ok()
}

unsafe fn file_mut<'a, F>(p_file: *mut ffi::sqlite3_file) -> Option<&'a mut F> {
    let state = p_file as *mut FileState<F>;
    (*state).file.as_mut()
}

// VFS callbacks

unsafe extern "C" fn x_open<V: Vfs>(
    p_vfs: *mut ffi::sqlite3_vfs,
    z_name: *const c_char,
    p_file: *mut ffi::sqlite3_file,
    flags: c_int,
    p_out_flags: *mut c_int,
) -> c_int {
    // pMethods must be NULL on failure so SQLite skips xClose
    let state = p_file as *mut FileState<V::File>;
    (*state).base.pMethods = ptr::null();
    (*state).file = ptr::null_mut();

    guard(ffi::SQLITE_CANTOPEN, || {
        let app = app_data::<V>(p_vfs);
        let Some(name) = name_arg(z_name) else {
            return ffi::SQLITE_CANTOPEN;
        };

        match app.vfs.open(name, OpenFlags::from_bits(flags)) {
            Ok(file) => {
                (*state).file = Box::into_raw(Box::new(file));
                (*state).base.pMethods = &app.io_methods;
                if !p_out_flags.is_null() {
                    *p_out_flags = (flags
                        & !(ffi::SQLITE_OPEN_READWRITE | ffi::SQLITE_OPEN_CREATE))
                        | ffi::SQLITE_OPEN_READONLY;
                }
                ffi::SQLITE_OK
            }
            Err(e) => {
                warn!(name = name, error = %e, "xOpen failed");
                ffi::SQLITE_CANTOPEN
            }
        }
    })
}

unsafe extern "C" fn x_delete<V: Vfs>(
    p_vfs: *mut ffi::sqlite3_vfs,
    z_name: *const c_char,
    sync_dir: c_int,
) -> c_int {
    guard(ffi::SQLITE_IOERR_DELETE, || {
        let app = app_data::<V>(p_vfs);
        match name_arg(z_name) {
            Some(name) => result_code(app.vfs.delete(name, sync_dir != 0)),
            None => ffi::SQLITE_IOERR_DELETE,
        }
    })
}

unsafe extern "C" fn x_access<V: Vfs>(
    p_vfs: *mut ffi::sqlite3_vfs,
    z_name: *const c_char,
    flags: c_int,
    p_res_out: *mut c_int,
) -> c_int {
    guard(ffi::SQLITE_IOERR_ACCESS, || {
        let app = app_data::<V>(p_vfs);
        let Some(name) = name_arg(z_name) else {
            return ffi::SQLITE_IOERR_ACCESS;
        };
        match app.vfs.access(name, AccessFlag::from_raw(flags)) {
            Ok(exists) => {
                *p_res_out = exists as c_int;
                ffi::SQLITE_OK
            }
            Err(e) => e.to_sqlite_code(),
        }
    })
}

unsafe extern "C" fn x_full_pathname<V: Vfs>(
    p_vfs: *mut ffi::sqlite3_vfs,
    z_name: *const c_char,
    n_out: c_int,
    z_out: *mut c_char,
) -> c_int {
    guard(ffi::SQLITE_CANTOPEN, || {
        let app = app_data::<V>(p_vfs);
        let Some(name) = name_arg(z_name) else {
            return ffi::SQLITE_CANTOPEN;
        };
        let full = app.vfs.full_pathname(name);
        let bytes = full.as_bytes();
        if bytes.len() + 1 > n_out.max(0) as usize {
            return ffi::SQLITE_CANTOPEN;
        }

        let out = slice::from_raw_parts_mut(z_out as *mut u8, bytes.len() + 1);
        out[..bytes.len()].copy_from_slice(bytes);
        out[bytes.len()] = 0;
        ffi::SQLITE_OK
    })
}

unsafe extern "C" fn x_randomness<V: Vfs>(
    p_vfs: *mut ffi::sqlite3_vfs,
    n_byte: c_int,
    z_out: *mut c_char,
) -> c_int {
    let platform = fallback::<V>(p_vfs);
    match (*platform).xRandomness {
        Some(f) => f(platform, n_byte, z_out),
        None => 0,
    }
}

unsafe extern "C" fn x_sleep<V: Vfs>(p_vfs: *mut ffi::sqlite3_vfs, microseconds: c_int) -> c_int {
    let platform = fallback::<V>(p_vfs);
    match (*platform).xSleep {
        Some(f) => f(platform, microseconds),
        None => 0,
    }
}

unsafe extern "C" fn x_current_time<V: Vfs>(p_vfs: *mut ffi::sqlite3_vfs, p_time: *mut f64) -> c_int {
    let platform = fallback::<V>(p_vfs);
    match (*platform).xCurrentTime {
        Some(f) => f(platform, p_time),
        None => ffi::SQLITE_ERROR,
    }
}

unsafe extern "C" fn x_current_time_int64<V: Vfs>(
    p_vfs: *mut ffi::sqlite3_vfs,
    p_time: *mut ffi::sqlite3_int64,
) -> c_int {
    let platform = fallback::<V>(p_vfs);
    match (*platform).xCurrentTimeInt64 {
        Some(f) if (*platform).iVersion >= 2 => f(platform, p_time),
        _ => ffi::SQLITE_ERROR,
    }
}

unsafe extern "C" fn x_get_last_error<V: Vfs>(
    p_vfs: *mut ffi::sqlite3_vfs,
    n_byte: c_int,
    z_out: *mut c_char,
) -> c_int {
    let platform = fallback::<V>(p_vfs);
    match (*platform).xGetLastError {
        Some(f) => f(platform, n_byte, z_out),
        None => 0,
    }
}

// File callbacks

unsafe extern "C" fn x_close<F: VfsFile>(p_file: *mut ffi::sqlite3_file) -> c_int {
    let state = p_file as *mut FileState<F>;
    let raw = mem::replace(&mut (*state).file, ptr::null_mut());
    if raw.is_null() {
        return ffi::SQLITE_OK;
    }

    guard(ffi::SQLITE_IOERR_CLOSE, || {
        let mut file = Box::from_raw(raw);
        result_code(file.close())
    })
}

unsafe extern "C" fn x_read<F: VfsFile>(
    p_file: *mut ffi::sqlite3_file,
    buf: *mut c_void,
    i_amt: c_int,
    i_ofst: ffi::sqlite3_int64,
) -> c_int {
    guard(ffi::SQLITE_IOERR_READ, || {
        let Some(file) = file_mut::<F>(p_file) else {
            return ffi::SQLITE_IOERR_READ;
        };
        let dest = slice::from_raw_parts_mut(buf as *mut u8, i_amt.max(0) as usize);
        match file.read_at(dest, i_ofst) {
            Ok(()) => ffi::SQLITE_OK,
            Err(e @ Error::ShortRead { .. }) => e.to_sqlite_code(),
            Err(e) => {
                warn!(offset = i_ofst, len = i_amt, error = %e, "xRead failed");
                e.to_sqlite_code()
            }
        }
    })
}

unsafe extern "C" fn x_write<F: VfsFile>(
    p_file: *mut ffi::sqlite3_file,
    buf: *const c_void,
    i_amt: c_int,
    i_ofst: ffi::sqlite3_int64,
) -> c_int {
    guard(ffi::SQLITE_IOERR_WRITE, || {
        let Some(file) = file_mut::<F>(p_file) else {
            return ffi::SQLITE_IOERR_WRITE;
        };
        let src = slice::from_raw_parts(buf as *const u8, i_amt.max(0) as usize);
        result_code(file.write_at(src, i_ofst))
    })
}

unsafe extern "C" fn x_truncate<F: VfsFile>(
    p_file: *mut ffi::sqlite3_file,
    size: ffi::sqlite3_int64,
) -> c_int {
    guard(ffi::SQLITE_IOERR_TRUNCATE, || match file_mut::<F>(p_file) {
        Some(file) => result_code(file.truncate(size)),
        None => ffi::SQLITE_IOERR_TRUNCATE,
    })
}

unsafe extern "C" fn x_sync<F: VfsFile>(p_file: *mut ffi::sqlite3_file, flags: c_int) -> c_int {
    guard(ffi::SQLITE_IOERR_FSYNC, || match file_mut::<F>(p_file) {
        Some(file) => result_code(file.sync(SyncFlags::from_bits(flags))),
        None => ffi::SQLITE_IOERR_FSYNC,
    })
}

unsafe extern "C" fn x_file_size<F: VfsFile>(
    p_file: *mut ffi::sqlite3_file,
    p_size: *mut ffi::sqlite3_int64,
) -> c_int {
    guard(ffi::SQLITE_IOERR_FSTAT, || {
        let Some(file) = file_mut::<F>(p_file) else {
            return ffi::SQLITE_IOERR_FSTAT;
        };
        match file.file_size() {
            Ok(size) => {
                *p_size = size as ffi::sqlite3_int64;
                ffi::SQLITE_OK
            }
            Err(e) => e.to_sqlite_code(),
        }
    })
}

unsafe extern "C" fn x_lock<F: VfsFile>(p_file: *mut ffi::sqlite3_file, lock: c_int) -> c_int {
    guard(ffi::SQLITE_IOERR_LOCK, || match file_mut::<F>(p_file) {
        Some(file) => result_code(file.lock(LockKind::from_raw(lock))),
        None => ffi::SQLITE_IOERR_LOCK,
    })
}

unsafe extern "C" fn x_unlock<F: VfsFile>(p_file: *mut ffi::sqlite3_file, lock: c_int) -> c_int {
    guard(ffi::SQLITE_IOERR_UNLOCK, || match file_mut::<F>(p_file) {
        Some(file) => result_code(file.unlock(LockKind::from_raw(lock))),
        None => ffi::SQLITE_IOERR_UNLOCK,
    })
}

unsafe extern "C" fn x_check_reserved_lock<F: VfsFile>(
    p_file: *mut ffi::sqlite3_file,
    p_res_out: *mut c_int,
) -> c_int {
    guard(ffi::SQLITE_IOERR_CHECKRESERVEDLOCK, || {
        let Some(file) = file_mut::<F>(p_file) else {
            return ffi::SQLITE_IOERR_CHECKRESERVEDLOCK;
        };
        match file.check_reserved_lock() {
            Ok(reserved) => {
                *p_res_out = reserved as c_int;
                ffi::SQLITE_OK
            }
            Err(e) => e.to_sqlite_code(),
        }
    })
}

unsafe extern "C" fn x_file_control<F: VfsFile>(
    _p_file: *mut ffi::sqlite3_file,
    _op: c_int,
    _p_arg: *mut c_void,
) -> c_int {
    ffi::SQLITE_NOTFOUND
}

unsafe extern "C" fn x_sector_size<F: VfsFile>(p_file: *mut ffi::sqlite3_file) -> c_int {
    guard(0, || file_mut::<F>(p_file).map_or(0, |file| file.sector_size()))
}

unsafe extern "C" fn x_device_characteristics<F: VfsFile>(p_file: *mut ffi::sqlite3_file) -> c_int {
    guard(0, || {
        file_mut::<F>(p_file).map_or(0, |file| file.device_characteristics().bits())
    })
}
