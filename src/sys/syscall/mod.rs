//! Syscall dispatcher — `int 0x80`
//!
//! Every call works on the record of the process the scheduler has on
//! the running terminal. Errors of any kind come back to user space as -1
//! and are logged at warn level; nothing a process passes in can make the
//! kernel panic.

pub mod number;

use crate::sys::fs::FILENAME_MAX;
use crate::sys::kernel::{BadPointer, Kernel};
use crate::sys::machine::Machine;
use crate::sys::mem::{in_user_page, USER_PAGE, VIDMAP_ADDR};
use crate::sys::proc::fd::{Drivers, FileError, Transfer, Wait};
use crate::sys::proc::pcb::{KernelContext, ARGS_MAX};
use crate::sys::proc::process::{ExecError, Halted, Launch};
use crate::sys::proc::Pid;

use core::fmt;

/// Longest command `execute` reads from user memory: name, one space, args
const COMMAND_MAX: usize = FILENAME_MAX + 1 + ARGS_MAX;
/// Bounce buffer for writes
const CHUNK: usize = 256;

/// What the `int 0x80` glue does next
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Put the value in EAX and iret
    Return(i32),
    /// Save the caller's context into its exec slot and enter the child
    Launch { caller: Pid, launch: Launch },
    /// Continue a parent inside its `execute`
    Resume { status: i32, context: KernelContext },
    /// Base shell restarted; drop the current stack and enter it
    Respawn(Launch),
    /// Nothing to read yet: release the lock, idle, call again
    Pending(Wait),
}

impl From<Halted> for Outcome {
    fn from(h: Halted) -> Self {
        match h {
            Halted::Resume { status, context, .. } => Outcome::Resume { status, context },
            Halted::Respawn(launch) => Outcome::Respawn(launch),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyscallError {
    Unknown(u32),
    NoProcess,
    BadPointer(u32),
    BadLength(i32),
    NoArgs,
    File(FileError),
    Exec(ExecError),
    Unsupported,
}

impl From<BadPointer> for SyscallError {
    fn from(e: BadPointer) -> Self { SyscallError::BadPointer(e.0) }
}

impl From<FileError> for SyscallError {
    fn from(e: FileError) -> Self { SyscallError::File(e) }
}

impl From<ExecError> for SyscallError {
    fn from(e: ExecError) -> Self { SyscallError::Exec(e) }
}

impl fmt::Display for SyscallError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SyscallError::Unknown(n)    => write!(f, "unknown syscall {}", n),
            SyscallError::NoProcess     => write!(f, "no process is running"),
            SyscallError::BadPointer(p) => write!(f, "bad user pointer {:#010x}", p),
            SyscallError::BadLength(n)  => write!(f, "bad length {}", n),
            SyscallError::NoArgs        => write!(f, "no arguments, or buffer too small"),
            SyscallError::File(e)       => write!(f, "{}", e),
            SyscallError::Exec(e)       => write!(f, "{}", e),
            SyscallError::Unsupported   => write!(f, "not supported"),
        }
    }
}

type SysResult<T> = Result<T, SyscallError>;

impl<'k, M: Machine> Kernel<'k, M> {
    /// Entry from the `int 0x80` gate: EAX, EBX, ECX, EDX
    pub fn syscall(&mut self, num: u32, a1: u32, a2: u32, a3: u32) -> Outcome {
        match self.dispatch(num, a1, a2, a3) {
            Ok(outcome) => outcome,
            Err(e) => {
                kwarn!("syscall {} from pid {:?}: {}", num, self.current_pid(), e);
                Outcome::Return(-1)
            }
        }
    }

    fn dispatch(&mut self, num: u32, a1: u32, a2: u32, a3: u32) -> SysResult<Outcome> {
        let pid = self.current_pid().ok_or(SyscallError::NoProcess)?;

        let value = match num {
            number::HALT => return Ok(self.halt(pid, (a1 & 0xFF) as i32).into()),
            number::EXECUTE => {
                let launch = self.sys_execute(pid, a1)?;
                return Ok(Outcome::Launch { caller: pid, launch });
            }
            number::READ => match self.sys_read(pid, a1 as i32, a2, a3 as i32)? {
                Transfer::Done(n) => n as i32,
                Transfer::Pending(wait) => return Ok(Outcome::Pending(wait)),
            },
            number::WRITE       => self.sys_write(pid, a1 as i32, a2, a3 as i32)?,
            number::OPEN        => self.sys_open(pid, a1)?,
            number::CLOSE       => self.sys_close(pid, a1 as i32)?,
            number::GETARGS     => self.sys_getargs(pid, a1, a2 as i32)?,
            number::VIDMAP      => self.sys_vidmap(pid, a1)?,
            number::SET_HANDLER => return Err(SyscallError::Unsupported),
            number::SIGRETURN   => return Err(SyscallError::Unsupported),
            _ => return Err(SyscallError::Unknown(num)),
        };
        Ok(Outcome::Return(value))
    }

    fn sys_execute(&mut self, pid: Pid, command: u32) -> SysResult<Launch> {
        let mut buf = [0u8; COMMAND_MAX + 1];
        let len = self.read_user_str(command, &mut buf)?;
        let terminal = self.procs.live(pid).terminal;
        Ok(self.execute(Some(pid), terminal, &buf[..len])?)
    }

    fn sys_read(&mut self, pid: Pid, fd: i32, buf: u32, nbytes: i32) -> SysResult<Transfer> {
        let len = user_len(nbytes)?;
        if !in_user_page(buf, len) {
            return Err(SyscallError::BadPointer(buf));
        }
        let off = (buf - USER_PAGE) as usize;

        let Kernel { machine, procs, fs, terms, rtc, .. } = self;
        let pcb = procs.live(pid);
        let terminal = pcb.terminal;
        let file = pcb.files.get_mut(fd)?;
        let mut drv = Drivers { fs, terms, rtc, terminal };
        let dst = &mut machine.user_page()[off..off + len];
        Ok(file.read(&mut drv, dst)?)
    }

    fn sys_write(&mut self, pid: Pid, fd: i32, buf: u32, nbytes: i32) -> SysResult<i32> {
        let len = user_len(nbytes)?;
        if !in_user_page(buf, len) {
            return Err(SyscallError::BadPointer(buf));
        }
        let off = (buf - USER_PAGE) as usize;

        let Kernel { machine, procs, fs, terms, rtc, .. } = self;
        let pcb = procs.live(pid);
        let terminal = pcb.terminal;
        let file = pcb.files.get_mut(fd)?;
        let mut drv = Drivers { fs, terms, rtc, terminal };

        let mut chunk = [0u8; CHUNK];
        let mut done = 0;
        let mut total = 0;
        loop {
            let n = (len - done).min(CHUNK);
            chunk[..n].copy_from_slice(&machine.user_page()[off + done..off + done + n]);
            total += file.write(&mut drv, &mut *machine, &chunk[..n])?;
            done += n;
            if done >= len {
                break;
            }
        }
        Ok(total as i32)
    }

    fn sys_open(&mut self, pid: Pid, filename: u32) -> SysResult<i32> {
        let mut name = [0u8; FILENAME_MAX + 1];
        let len = self.read_user_str(filename, &mut name)?;
        let fd = self.procs.live(pid).files.open(&self.fs, &name[..len])?;
        Ok(fd as i32)
    }

    fn sys_close(&mut self, pid: Pid, fd: i32) -> SysResult<i32> {
        self.procs.live(pid).files.close(fd)?;
        Ok(0)
    }

    fn sys_getargs(&mut self, pid: Pid, buf: u32, nbytes: i32) -> SysResult<i32> {
        let len = user_len(nbytes)?;
        let pcb = self.procs.live(pid);
        let args_len = pcb.args().len();
        if args_len == 0 || args_len + 1 > len {
            return Err(SyscallError::NoArgs);
        }

        let mut out = [0u8; ARGS_MAX + 1];
        out[..args_len].copy_from_slice(pcb.args());
        self.copy_to_user(buf, &out[..args_len + 1])?;
        Ok(0)
    }

    fn sys_vidmap(&mut self, pid: Pid, screen_start: u32) -> SysResult<i32> {
        if !in_user_page(screen_start, 4) {
            return Err(SyscallError::BadPointer(screen_start));
        }
        let terminal = self.procs.live(pid).terminal;

        self.spaces.map_vidmap(pid, &mut self.machine);
        let frame = self.terms.frame_of(terminal);
        self.spaces.point_vidmap(frame, &mut self.machine);
        self.procs.live(pid).vidmap = true;

        self.copy_to_user(screen_start, &VIDMAP_ADDR.to_le_bytes())?;
        Ok(0)
    }
}

fn user_len(nbytes: i32) -> SysResult<usize> {
    usize::try_from(nbytes).map_err(|_| SyscallError::BadLength(nbytes))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sys::kernel::testing::*;
    use crate::sys::mem::{backing_frame, IMAGE_ADDR, USER_STACK_TOP};
    use crate::sys::proc::fd::MAX_FILES;
    use crate::sys::terminal::LINE_MAX;

    /// Scratch area in the caller's user page, clear of the loaded image
    const SCRATCH: u32 = IMAGE_ADDR + 0x10_0000;

    fn put_str(k: &mut TestKernel, at: u32, s: &[u8]) {
        k.copy_to_user(at, s).unwrap();
        k.copy_to_user(at + s.len() as u32, &[0]).unwrap();
    }

    fn call(k: &mut TestKernel, num: u32, a1: u32, a2: u32, a3: u32) -> i32 {
        match k.syscall(num, a1, a2, a3) {
            Outcome::Return(v) => v,
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn open_read_close_regular_file() {
        let img = standard_image();
        booted(&img, |k| {
            put_str(k, SCRATCH, b"frame0.txt");
            let fd = call(k, number::OPEN, SCRATCH, 0, 0);
            assert_eq!(fd, 2);

            let buf = SCRATCH + 0x100;
            assert_eq!(call(k, number::READ, fd as u32, buf, 4), 4);
            assert_eq!(call(k, number::READ, fd as u32, buf + 4, 100), 10);
            assert_eq!(call(k, number::READ, fd as u32, buf, 100), 0);
            let mut text = [0u8; 14];
            k.copy_from_user(buf, &mut text).unwrap();
            assert_eq!(&text, b"fish fish fish");

            assert_eq!(call(k, number::CLOSE, fd as u32, 0, 0), 0);
            assert_eq!(call(k, number::CLOSE, fd as u32, 0, 0), -1);
        });
    }

    #[test]
    fn bad_arguments_return_minus_one() {
        let img = standard_image();
        booted(&img, |k| {
            assert_eq!(call(k, number::OPEN, 0, 0, 0), -1);
            put_str(k, SCRATCH, b"missing");
            assert_eq!(call(k, number::OPEN, SCRATCH, 0, 0), -1);
            assert_eq!(call(k, number::READ, 9, SCRATCH, 4), -1);
            assert_eq!(call(k, number::READ, 0, 0, 4), -1);
            assert_eq!(call(k, number::READ, 0, SCRATCH, -1i32 as u32), -1);
            assert_eq!(call(k, number::WRITE, 1, USER_STACK_TOP, 8), -1);
            assert_eq!(call(k, number::CLOSE, 0, 0, 0), -1);
            assert_eq!(call(k, number::CLOSE, 1, 0, 0), -1);
            assert_eq!(call(k, number::SET_HANDLER, 0, 0, 0), -1);
            assert_eq!(call(k, number::SIGRETURN, 0, 0, 0), -1);
            assert_eq!(call(k, 0, 0, 0, 0), -1);
            assert_eq!(call(k, 99, 0, 0, 0), -1);
        });
    }

    #[test]
    fn full_table_open_fails_cleanly() {
        let img = standard_image();
        booted(&img, |k| {
            put_str(k, SCRATCH, b"rtc");
            for expected in 2..MAX_FILES as i32 {
                assert_eq!(call(k, number::OPEN, SCRATCH, 0, 0), expected);
            }
            let pid = k.current_pid().unwrap();
            let before = k.procs().record_for(pid).files;
            assert_eq!(call(k, number::OPEN, SCRATCH, 0, 0), -1);
            assert_eq!(k.procs().record_for(pid).files, before);
        });
    }

    #[test]
    fn write_to_stdout_draws_on_own_terminal() {
        let img = standard_image();
        booted(&img, |k| {
            // running terminal is 2, not displayed
            let text = [b'x'; 300];
            k.copy_to_user(SCRATCH, &text).unwrap();
            assert_eq!(call(k, number::WRITE, 1, SCRATCH, 300), 300);
            let screen = k.machine.screen_text(backing_frame(2));
            assert_eq!(screen[0].len(), 80);
            assert_eq!(screen[3].len(), 300 - 240);
        });
    }

    #[test]
    fn terminal_read_waits_for_enter() {
        let img = standard_image();
        booted(&img, |k| {
            // move to terminal 0, which is the displayed one
            k.tick();
            assert_eq!(k.scheduler().running(), 0);

            assert_eq!(k.syscall(number::READ, 0, SCRATCH, LINE_MAX as u32), Outcome::Pending(Wait::Line(0)));
            for code in [0x1E, 0x9E, 0x1C, 0x9C] {
                // 'a' down/up, enter down/up
                k.on_scancode(code);
            }
            assert_eq!(call(k, number::READ, 0, SCRATCH, LINE_MAX as u32), 2);
            let mut line = [0u8; 2];
            k.copy_from_user(SCRATCH, &mut line).unwrap();
            assert_eq!(&line, b"a\n");
        });
    }

    #[test]
    fn execute_and_halt_through_syscalls() {
        let img = standard_image();
        booted(&img, |k| {
            let shell = k.current_pid().unwrap();
            put_str(k, SCRATCH, b"testprint  one two ");
            let child = match k.syscall(number::EXECUTE, SCRATCH, 0, 0) {
                Outcome::Launch { caller, launch } => {
                    assert_eq!(caller, shell);
                    launch.pid
                }
                other => panic!("{:?}", other),
            };
            assert_eq!(k.current_pid(), Some(child));

            let buf = SCRATCH;
            assert_eq!(call(k, number::GETARGS, buf, 3, 0), -1);
            assert_eq!(call(k, number::GETARGS, buf, 8, 0), 0);
            let mut args = [0u8; 8];
            k.copy_from_user(buf, &mut args).unwrap();
            assert_eq!(&args, b"one two\0");

            match k.syscall(number::HALT, 0x1_07, 0, 0) {
                Outcome::Resume { status, .. } => assert_eq!(status, 7),
                other => panic!("{:?}", other),
            }
            assert_eq!(k.current_pid(), Some(shell));
        });
    }

    #[test]
    fn failed_execute_returns_minus_one() {
        let img = standard_image();
        booted(&img, |k| {
            put_str(k, SCRATCH, b"frame0.txt");
            assert_eq!(k.syscall(number::EXECUTE, SCRATCH, 0, 0), Outcome::Return(-1));
            assert_eq!(k.syscall(number::EXECUTE, 0, 0, 0), Outcome::Return(-1));
        });
    }

    #[test]
    fn getargs_without_args_fails() {
        let img = standard_image();
        booted(&img, |k| {
            assert_eq!(call(k, number::GETARGS, SCRATCH, 64, 0), -1);
        });
    }

    #[test]
    fn vidmap_maps_screen_of_own_terminal() {
        let img = standard_image();
        booted(&img, |k| {
            assert_eq!(call(k, number::VIDMAP, 0x0040_0000, 0, 0), -1);
            assert_eq!(call(k, number::VIDMAP, SCRATCH, 0, 0), 0);
            let mut ptr = [0u8; 4];
            k.copy_from_user(SCRATCH, &mut ptr).unwrap();
            assert_eq!(u32::from_le_bytes(ptr), VIDMAP_ADDR);
            assert_eq!(k.spaces().translate(VIDMAP_ADDR), Some(backing_frame(2)));
            assert!(k.procs().record_for(k.current_pid().unwrap()).vidmap);
        });
    }

    #[test]
    fn syscall_before_boot_fails() {
        let img = standard_image();
        with_kernel(&img, |k| {
            assert_eq!(k.syscall(number::WRITE, 1, IMAGE_ADDR, 1), Outcome::Return(-1));
        });
    }
}
