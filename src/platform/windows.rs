//! Windows implementations of the platform capabilities.

use super::{
    LaunchMode, LaunchRequest, ProcessLauncher, RegistryReader, VersionResourceReader,
    spawn_command, wait_for_child,
};
use crate::core::UpdaterError;
use crate::models::{RegistryHive, RegistryView, VersionResource};
use semver::Version;
use std::ffi::{OsStr, c_void};
use std::iter::once;
use std::os::windows::ffi::OsStrExt;
use std::path::Path;
use std::ptr::{null, null_mut};
use windows_sys::Win32::Foundation::{CloseHandle, ERROR_SUCCESS, GetLastError};
use windows_sys::Win32::Storage::FileSystem::{
    GetFileVersionInfoSizeW, GetFileVersionInfoW, MOVEFILE_DELAY_UNTIL_REBOOT, MoveFileExW,
    VS_FIXEDFILEINFO, VerQueryValueW,
};
use windows_sys::Win32::System::Registry::{
    HKEY, HKEY_CLASSES_ROOT, HKEY_CURRENT_USER, HKEY_LOCAL_MACHINE, KEY_WRITE, REG_BINARY,
    REG_OPTION_VOLATILE, RRF_RT_REG_BINARY, RRF_RT_REG_SZ, RRF_SUBKEY_WOW6432KEY,
    RRF_SUBKEY_WOW6464KEY, RegCloseKey, RegCreateKeyExW, RegDeleteKeyValueW, RegGetValueW,
    RegSetValueExW,
};
use windows_sys::Win32::System::Threading::{GetExitCodeProcess, INFINITE, WaitForSingleObject};
use windows_sys::Win32::UI::Shell::{
    SEE_MASK_NOASYNC, SEE_MASK_NOCLOSEPROCESS, SHELLEXECUTEINFOW, ShellExecuteExW,
};
use windows_sys::Win32::UI::WindowsAndMessaging::{
    MB_ICONERROR, MB_OK, MessageBoxW, SW_SHOWNORMAL,
};

/// Encode a string as a NUL terminated UTF-16 buffer.
fn wide(value: impl AsRef<OsStr>) -> Vec<u16> {
    value.as_ref().encode_wide().chain(once(0)).collect()
}

const fn hive_handle(hive: RegistryHive) -> HKEY {
    match hive {
        RegistryHive::CurrentUser => HKEY_CURRENT_USER,
        RegistryHive::LocalMachine => HKEY_LOCAL_MACHINE,
        RegistryHive::ClassesRoot => HKEY_CLASSES_ROOT,
    }
}

const fn view_flags(view: RegistryView) -> u32 {
    match view {
        RegistryView::Default => 0,
        RegistryView::Wow64_64 => RRF_SUBKEY_WOW6464KEY,
        RegistryView::Wow64_32 => RRF_SUBKEY_WOW6432KEY,
    }
}

/// Read a raw registry value of the given type filter.
fn read_value_bytes(
    hive: HKEY,
    key: &str,
    value: &str,
    flags: u32,
) -> Result<Vec<u8>, u32> {
    let key_w = wide(key);
    let value_w = wide(value);
    let mut size: u32 = 0;

    // First call reports the required buffer size
    let status = unsafe {
        RegGetValueW(hive, key_w.as_ptr(), value_w.as_ptr(), flags, null_mut(), null_mut(), &mut size)
    };
    if status != ERROR_SUCCESS {
        return Err(status);
    }

    let mut buffer = vec![0_u8; size as usize];
    let status = unsafe {
        RegGetValueW(
            hive,
            key_w.as_ptr(),
            value_w.as_ptr(),
            flags,
            null_mut(),
            buffer.as_mut_ptr().cast::<c_void>(),
            &mut size,
        )
    };
    if status != ERROR_SUCCESS {
        return Err(status);
    }

    buffer.truncate(size as usize);
    Ok(buffer)
}

/// Registry access through `RegGetValueW`.
pub struct WindowsRegistry;

impl RegistryReader for WindowsRegistry {
    fn read_string(
        &self,
        hive: RegistryHive,
        view: RegistryView,
        key: &str,
        value: &str,
    ) -> Result<String, UpdaterError> {
        let bytes = read_value_bytes(hive_handle(hive), key, value, RRF_RT_REG_SZ | view_flags(view))
            .map_err(|status| UpdaterError::RegistryAccess {
                key: format!("{}\\{key}\\{value}", hive.as_str()),
                reason: std::io::Error::from_raw_os_error(status as i32).to_string(),
            })?;

        let units: Vec<u16> =
            bytes.chunks_exact(2).map(|pair| u16::from_le_bytes([pair[0], pair[1]])).collect();
        let end = units.iter().position(|&c| c == 0).unwrap_or(units.len());

        Ok(String::from_utf16_lossy(&units[..end]))
    }
}

/// Store `data` as a binary value below a volatile HKCU key.
///
/// Volatile keys live in memory only and disappear on reboot.
pub fn write_volatile_blob(key: &str, value: &str, data: &[u8]) -> std::io::Result<()> {
    let key_w = wide(key);
    let value_w = wide(value);
    let mut handle: HKEY = null_mut();

    let status = unsafe {
        RegCreateKeyExW(
            HKEY_CURRENT_USER,
            key_w.as_ptr(),
            0,
            null(),
            REG_OPTION_VOLATILE,
            KEY_WRITE,
            null(),
            &mut handle,
            null_mut(),
        )
    };
    if status != ERROR_SUCCESS {
        return Err(std::io::Error::from_raw_os_error(status as i32));
    }

    let status = unsafe {
        RegSetValueExW(handle, value_w.as_ptr(), 0, REG_BINARY, data.as_ptr(), data.len() as u32)
    };
    unsafe { RegCloseKey(handle) };

    if status == ERROR_SUCCESS {
        Ok(())
    } else {
        Err(std::io::Error::from_raw_os_error(status as i32))
    }
}

/// Read a binary value below HKCU, `None` if it does not exist.
pub fn read_blob(key: &str, value: &str) -> Option<Vec<u8>> {
    read_value_bytes(HKEY_CURRENT_USER, key, value, RRF_RT_REG_BINARY).ok()
}

/// Delete a value below HKCU. Returns whether a value was removed.
pub fn delete_value(key: &str, value: &str) -> bool {
    let key_w = wide(key);
    let value_w = wide(value);
    unsafe { RegDeleteKeyValueW(HKEY_CURRENT_USER, key_w.as_ptr(), value_w.as_ptr()) == ERROR_SUCCESS }
}

/// Version resources through the version info API.
pub struct WindowsVersionResources;

impl VersionResourceReader for WindowsVersionResources {
    fn read_version(&self, path: &Path, which: VersionResource) -> Result<Version, UpdaterError> {
        let not_found = || UpdaterError::VersionParse {
            input: format!("version resource of {}", path.display()),
        };

        let path_w = wide(path);
        let mut handle: u32 = 0;
        let size = unsafe { GetFileVersionInfoSizeW(path_w.as_ptr(), &mut handle) };
        if size == 0 {
            return Err(not_found());
        }

        let mut data = vec![0_u8; size as usize];
        let ok = unsafe {
            GetFileVersionInfoW(path_w.as_ptr(), 0, size, data.as_mut_ptr().cast::<c_void>())
        };
        if ok == 0 {
            return Err(not_found());
        }

        let root = wide("\\");
        let mut info: *mut c_void = null_mut();
        let mut info_len: u32 = 0;
        let ok = unsafe {
            VerQueryValueW(data.as_ptr().cast::<c_void>(), root.as_ptr(), &mut info, &mut info_len)
        };
        if ok == 0 || info.is_null() || (info_len as usize) < size_of::<VS_FIXEDFILEINFO>() {
            return Err(not_found());
        }

        // `info` points into `data`, which outlives this read
        let fixed = unsafe { &*info.cast::<VS_FIXEDFILEINFO>() };
        let (ms, ls) = match which {
            VersionResource::FileVersion => (fixed.dwFileVersionMS, fixed.dwFileVersionLS),
            VersionResource::ProductVersion => (fixed.dwProductVersionMS, fixed.dwProductVersionLS),
        };

        Ok(crate::version::from_four_part(
            (ms >> 16) as u16,
            (ms & 0xFFFF) as u16,
            (ls >> 16) as u16,
            (ls & 0xFFFF) as u16,
        ))
    }
}

/// Process creation through `CreateProcess` and `ShellExecuteExW`.
pub struct WindowsLauncher;

impl WindowsLauncher {
    /// Run `ShellExecuteExW` and return the process handle, if any.
    fn shell_execute(request: &LaunchRequest) -> Result<*mut c_void, UpdaterError> {
        let verb = wide(if request.mode == LaunchMode::Elevated { "runas" } else { "open" });
        let file = wide(&request.program);
        let parameters = wide(request.command_line());
        let directory = request.effective_working_dir().map(wide);

        let mut info: SHELLEXECUTEINFOW = unsafe { std::mem::zeroed() };
        info.cbSize = size_of::<SHELLEXECUTEINFOW>() as u32;
        info.fMask = SEE_MASK_NOCLOSEPROCESS | SEE_MASK_NOASYNC;
        info.lpVerb = verb.as_ptr();
        info.lpFile = file.as_ptr();
        info.lpParameters = parameters.as_ptr();
        info.lpDirectory = directory.as_ref().map_or(null(), |d| d.as_ptr());
        info.nShow = SW_SHOWNORMAL;

        let ok = unsafe { ShellExecuteExW(&mut info) };
        if ok == 0 {
            let error = unsafe { GetLastError() };
            return Err(UpdaterError::Launch {
                path: request.program.display().to_string(),
                win32_error: error,
            });
        }

        Ok(info.hProcess)
    }
}

impl ProcessLauncher for WindowsLauncher {
    fn spawn_detached(&self, request: &LaunchRequest) -> Result<(), UpdaterError> {
        match request.mode {
            LaunchMode::Direct => spawn_command(request).map(|_| ()),
            LaunchMode::Shell | LaunchMode::Elevated => {
                let process = Self::shell_execute(request)?;
                if !process.is_null() {
                    unsafe { CloseHandle(process) };
                }
                Ok(())
            }
        }
    }

    fn run_to_completion(&self, request: &LaunchRequest) -> Result<i32, UpdaterError> {
        match request.mode {
            LaunchMode::Direct => {
                let child = spawn_command(request)?;
                wait_for_child(request, child)
            }
            LaunchMode::Shell | LaunchMode::Elevated => {
                let process = Self::shell_execute(request)?;
                // Handled by an already running process (DDE), nothing to wait for
                if process.is_null() {
                    return Ok(0);
                }

                let mut exit_code: u32 = 0;
                unsafe {
                    WaitForSingleObject(process, INFINITE);
                    GetExitCodeProcess(process, &mut exit_code);
                    CloseHandle(process);
                }
                Ok(exit_code as i32)
            }
        }
    }
}

/// Ask the OS to delete `path` on the next reboot.
pub fn schedule_delete_on_reboot(path: &Path) -> std::io::Result<()> {
    let path_w = wide(path);
    let ok = unsafe { MoveFileExW(path_w.as_ptr(), null(), MOVEFILE_DELAY_UNTIL_REBOOT) };
    if ok == 0 { Err(std::io::Error::last_os_error()) } else { Ok(()) }
}

/// Show a modal error message box.
pub fn show_error_dialog(title: &str, message: &str) {
    let title_w = wide(title);
    let message_w = wide(message);
    unsafe {
        MessageBoxW(null_mut(), message_w.as_ptr(), title_w.as_ptr(), MB_OK | MB_ICONERROR);
    }
}
