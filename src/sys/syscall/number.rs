//! Syscall numbers — `int 0x80`, number in EAX, args in EBX, ECX, EDX

pub const HALT:        u32 = 0x01;
pub const EXECUTE:     u32 = 0x02;
pub const READ:        u32 = 0x03;
pub const WRITE:       u32 = 0x04;
pub const OPEN:        u32 = 0x05;
pub const CLOSE:       u32 = 0x06;
pub const GETARGS:     u32 = 0x07;
pub const VIDMAP:      u32 = 0x08;
pub const SET_HANDLER: u32 = 0x09;
pub const SIGRETURN:   u32 = 0x0A;

pub const VECTOR: u8 = 0x80;
