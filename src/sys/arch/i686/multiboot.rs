//! Multiboot (v1) — header constants and the bits of the boot info we use
//!
//! The info structure and everything it points to sits in low memory that
//! the kernel directory does not map, so it has to be read before paging
//! is switched on.

use core::fmt;

pub const HEADER_MAGIC: u32 = 0x1BAD_B002;
/// Page-aligned modules, memory info
pub const HEADER_FLAGS: u32 = 0b11;
pub const HEADER_CHECKSUM: u32 = 0u32.wrapping_sub(HEADER_MAGIC).wrapping_sub(HEADER_FLAGS);

/// Value in EAX when a multiboot loader jumps to us
pub const BOOTLOADER_MAGIC: u32 = 0x2BAD_B002;

const INFO_CMDLINE: u32 = 1 << 2;
const INFO_MODS:    u32 = 1 << 3;

#[repr(C)]
struct RawInfo {
    flags:       u32,
    _mem_lower:   u32,
    _mem_upper:   u32,
    _boot_device: u32,
    cmdline:     u32,
    mods_count:  u32,
    mods_addr:   u32,
}

#[repr(C)]
#[derive(Clone, Copy)]
struct RawModule {
    start:    u32,
    end:      u32,
    _string:   u32,
    _reserved: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BootError {
    BadMagic(u32),
    NoModule,
}

impl fmt::Display for BootError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            BootError::BadMagic(m) => write!(f, "not loaded by multiboot (magic {:#010x})", m),
            BootError::NoModule    => write!(f, "no filesystem module"),
        }
    }
}

/// What the kernel keeps from the loader
pub struct BootInfo {
    pub cmdline:      &'static str,
    /// Physical range [start, end) of the first module: the boot filesystem
    pub module_start: u32,
    pub module_end:   u32,
}

/// # Safety
/// `info` must be the pointer the loader passed in EBX, with paging off.
pub unsafe fn parse(magic: u32, info: u32) -> Result<BootInfo, BootError> {
    if magic != BOOTLOADER_MAGIC {
        return Err(BootError::BadMagic(magic));
    }
    let raw = unsafe { &*(info as *const RawInfo) };

    let cmdline = if raw.flags & INFO_CMDLINE != 0 && raw.cmdline != 0 {
        unsafe { c_str(raw.cmdline) }
    } else {
        ""
    };

    if raw.flags & INFO_MODS == 0 || raw.mods_count == 0 {
        return Err(BootError::NoModule);
    }
    let module = unsafe { *(raw.mods_addr as *const RawModule) };

    Ok(BootInfo { cmdline, module_start: module.start, module_end: module.end })
}

/// The loader's command line; anything that is not UTF-8 is dropped
unsafe fn c_str(addr: u32) -> &'static str {
    let ptr = addr as *const u8;
    let mut len = 0;
    while unsafe { *ptr.add(len) } != 0 {
        len += 1;
    }
    let bytes = unsafe { core::slice::from_raw_parts(ptr, len) };
    core::str::from_utf8(bytes).unwrap_or("")
}
