//! Process lifecycle — execute / halt
//!
//! `execute` builds a child in a fresh address space and hands back a
//! `Launch` for the arch glue: the caller's kernel context gets saved in its
//! record and the CPU irets into the child. `halt` undoes all of it and
//! tells the glue whose saved context to resume, with the status as the
//! return value of the parent's `execute`.
//!
//! Format binary: ELF32 i386, loaded flat (file offset 0 → 0x0804_8000).

use super::pcb::{KernelContext, Pcb, ARGS_MAX};
use super::Pid;
use crate::sys::fs::{FileType, FsError, FILENAME_MAX};
use crate::sys::kernel::Kernel;
use crate::sys::machine::Machine;
use crate::sys::mem::{
    in_user_page, PagingError, Space, IMAGE_ADDR, USER_PAGE, USER_PAGE_SIZE, USER_STACK_TOP,
};

use core::fmt;
use object::elf::{FileHeader32, EM_386, ET_EXEC};
use object::read::elf::FileHeader;
use object::Endianness;

/// Status of a process killed by a CPU exception
pub const EXCEPTION_STATUS: i32 = 256;

const ELF_HEADER_SIZE: usize = 52;
const IMAGE_OFFSET: usize = (IMAGE_ADDR - USER_PAGE) as usize;
/// The image has to fit between its load address and the end of the page
const IMAGE_MAX: usize = USER_PAGE_SIZE as usize - IMAGE_OFFSET;

// ---------------------------------------------------------------------------
// Results & errors
// ---------------------------------------------------------------------------

/// Everything the glue needs to drop into a new process
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Launch {
    pub pid:          Pid,
    pub entry:        u32,
    pub user_stack:   u32,
    pub kernel_stack: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Halted {
    /// Continue the parent inside its `execute`
    Resume { parent: Pid, status: i32, context: KernelContext },
    /// A base shell exited and was started again
    Respawn(Launch),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecError {
    EmptyCommand,
    NameTooLong,
    ArgsTooLong,
    Fs(FsError),
    NotRegular,
    NotExecutable,
    BadEntry(u32),
    TooLarge(u32),
    Paging(PagingError),
}

impl From<FsError> for ExecError {
    fn from(e: FsError) -> Self { ExecError::Fs(e) }
}

impl From<PagingError> for ExecError {
    fn from(e: PagingError) -> Self { ExecError::Paging(e) }
}

impl fmt::Display for ExecError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ExecError::EmptyCommand  => write!(f, "empty command"),
            ExecError::NameTooLong   => write!(f, "program name longer than {} bytes", FILENAME_MAX),
            ExecError::ArgsTooLong   => write!(f, "arguments longer than {} bytes", ARGS_MAX),
            ExecError::Fs(e)         => write!(f, "{}", e),
            ExecError::NotRegular    => write!(f, "not a regular file"),
            ExecError::NotExecutable => write!(f, "not an i386 ELF executable"),
            ExecError::BadEntry(a)   => write!(f, "entry point {:#010x} outside the user page", a),
            ExecError::TooLarge(n)   => write!(f, "image of {} bytes does not fit", n),
            ExecError::Paging(e)     => write!(f, "{}", e),
        }
    }
}

// ---------------------------------------------------------------------------
// Command line & image header
// ---------------------------------------------------------------------------

/// `"  cat   frame0.txt "` → (`cat`, `frame0.txt`)
pub fn parse_command(command: &[u8]) -> Result<(&[u8], &[u8]), ExecError> {
    let start = command.iter().position(|&b| b != b' ').ok_or(ExecError::EmptyCommand)?;
    let command = &command[start..];

    let (name, rest) = match command.iter().position(|&b| b == b' ') {
        Some(i) => (&command[..i], &command[i + 1..]),
        None => (command, &command[command.len()..]),
    };
    let args = rest.trim_ascii();

    if name.len() > FILENAME_MAX {
        return Err(ExecError::NameTooLong);
    }
    if args.len() > ARGS_MAX {
        return Err(ExecError::ArgsTooLong);
    }
    Ok((name, args))
}

#[repr(C, align(8))]
struct HeaderBuf([u8; ELF_HEADER_SIZE]);

/// Entry point of an ELF32 i386 executable
pub fn entry_point(header: &[u8]) -> Result<u32, ExecError> {
    let mut buf = HeaderBuf([0; ELF_HEADER_SIZE]);
    let n = header.len().min(ELF_HEADER_SIZE);
    buf.0[..n].copy_from_slice(&header[..n]);

    let elf = FileHeader32::<Endianness>::parse(&buf.0[..])
        .map_err(|_| ExecError::NotExecutable)?;
    let endian = elf.endian().map_err(|_| ExecError::NotExecutable)?;
    if elf.e_type(endian) != ET_EXEC || elf.e_machine(endian) != EM_386 {
        return Err(ExecError::NotExecutable);
    }

    let entry = elf.e_entry(endian);
    if !in_user_page(entry, 1) {
        return Err(ExecError::BadEntry(entry));
    }
    Ok(entry)
}

pub fn exception_name(vector: u8) -> &'static str {
    match vector {
        0  => "divide error",
        1  => "debug",
        2  => "non-maskable interrupt",
        3  => "breakpoint",
        4  => "overflow",
        5  => "bound range exceeded",
        6  => "invalid opcode",
        7  => "device not available",
        8  => "double fault",
        9  => "coprocessor segment overrun",
        10 => "invalid TSS",
        11 => "segment not present",
        12 => "stack-segment fault",
        13 => "general protection fault",
        14 => "page fault",
        16 => "x87 floating-point exception",
        17 => "alignment check",
        18 => "machine check",
        19 => "SIMD floating-point exception",
        _  => "reserved",
    }
}

// ---------------------------------------------------------------------------
// execute / halt
// ---------------------------------------------------------------------------

impl<'k, M: Machine> Kernel<'k, M> {
    /// Start `command` on `terminal` as a child of `caller` (`None` for a
    /// base shell). On success the child's directory is loaded and its
    /// kernel stack is in the TSS.
    pub fn execute(
        &mut self,
        caller: Option<Pid>,
        terminal: usize,
        command: &[u8],
    ) -> Result<Launch, ExecError> {
        let (name, args) = parse_command(command)?;

        let dentry = self.fs.resolve(name)?;
        if dentry.kind != FileType::Regular {
            return Err(ExecError::NotRegular);
        }
        let size = self.fs.size(dentry.inode)?;
        if size as usize > IMAGE_MAX {
            return Err(ExecError::TooLarge(size));
        }
        let mut header = [0u8; ELF_HEADER_SIZE];
        let n = self.fs.read(dentry.inode, 0, &mut header)?;
        let entry = entry_point(&header[..n])?;

        let pid = self.spaces.allocate()?;
        if let Err(e) = self.load_image(pid, dentry.inode, size) {
            self.spaces.activate(caller.map_or(Space::Kernel, Space::Process), &mut self.machine);
            // slot was allocated just above
            let _ = self.spaces.deallocate(pid);
            return Err(e);
        }

        self.procs.install(Pcb::new(pid, caller, terminal, name, args));
        self.sched.set_slot(terminal, pid);

        let kernel_stack = self.procs.kernel_stack_top(pid);
        self.machine.set_kernel_stack(kernel_stack);

        klog!("exec: pid {} '{}' on terminal {} (parent {:?})",
            pid, self.procs.record_for(pid).name_str(), terminal, caller);

        Ok(Launch { pid, entry, user_stack: USER_STACK_TOP, kernel_stack })
    }

    fn load_image(&mut self, pid: Pid, inode: u32, size: u32) -> Result<(), ExecError> {
        self.spaces.activate(Space::Process(pid), &mut self.machine);
        let page = self.machine.user_page();
        page.fill(0);

        let dst = &mut page[IMAGE_OFFSET..IMAGE_OFFSET + size as usize];
        let n = self.fs.read(inode, 0, dst)?;
        if n != size as usize {
            return Err(ExecError::Fs(FsError::Truncated));
        }
        Ok(())
    }

    /// Tear `pid` down. Its parent resumes, or a base shell starts over.
    pub fn halt(&mut self, pid: Pid, status: i32) -> Halted {
        let pcb = self.procs.live(pid);
        pcb.files.close_all();
        let parent = pcb.parent;
        let terminal = pcb.terminal;

        klog!("halt: pid {} '{}' status {}", pid, pcb.name_str(), status);

        match parent {
            None => {
                self.spaces.activate(Space::Kernel, &mut self.machine);
                self.release(pid);

                let config = self.config;
                match self.execute(None, terminal, config.shell()) {
                    Ok(launch) => Halted::Respawn(launch),
                    Err(e) => panic!("terminal {}: cannot restart shell: {}", terminal, e),
                }
            }
            Some(parent) => {
                self.spaces.activate(Space::Process(parent), &mut self.machine);
                self.release(pid);

                self.machine.set_kernel_stack(self.procs.kernel_stack_top(parent));
                self.sched.set_slot(terminal, parent);

                let context = self.procs.live(parent).exec_ctx;
                Halted::Resume { parent, status, context }
            }
        }
    }

    fn release(&mut self, pid: Pid) {
        if let Err(e) = self.spaces.deallocate(pid) {
            panic!("halt: {}", e);
        }
        self.procs.clear(pid);
    }

    /// CPU exception raised in user mode: report it and kill the process.
    /// `None` when nothing is running yet.
    pub fn fault(&mut self, vector: u8) -> Option<Halted> {
        let pid = self.current_pid()?;
        let terminal = self.procs.live(pid).terminal;
        kwarn!("fault: pid {} raised {} ({})", pid, vector, exception_name(vector));

        self.print(terminal, b"\nexception: ");
        self.print(terminal, exception_name(vector).as_bytes());
        self.print(terminal, b"\n");
        Some(self.halt(pid, EXCEPTION_STATUS))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sys::kernel::testing::*;
    use crate::sys::proc::pcb::Saved;

    #[test]
    fn command_splitting() {
        assert_eq!(parse_command(b"ls"), Ok((&b"ls"[..], &b""[..])));
        assert_eq!(parse_command(b"  cat   frame0.txt  "), Ok((&b"cat"[..], &b"frame0.txt"[..])));
        assert_eq!(parse_command(b"grep a b c"), Ok((&b"grep"[..], &b"a b c"[..])));
        assert_eq!(parse_command(b"    "), Err(ExecError::EmptyCommand));
        assert_eq!(parse_command(&[b'x'; 33]), Err(ExecError::NameTooLong));

        let mut long = std::vec::Vec::from(&b"cat "[..]);
        long.extend_from_slice(&[b'a'; 128]);
        assert_eq!(parse_command(&long), Err(ExecError::ArgsTooLong));
    }

    #[test]
    fn elf_header_checks() {
        assert_eq!(entry_point(&elf(0x0804_8094, b"")), Ok(0x0804_8094));
        assert_eq!(entry_point(&elf(0x0010_0000, b"")), Err(ExecError::BadEntry(0x0010_0000)));
        assert_eq!(entry_point(b"\x7fELF"), Err(ExecError::NotExecutable));
        assert_eq!(entry_point(&[0u8; 64]), Err(ExecError::NotExecutable));
    }

    #[test]
    fn execute_then_halt_returns_status_to_parent() {
        let img = standard_image();
        booted(&img, |k| {
            let shell = k.current_pid().unwrap();
            let terminal = k.procs().record_for(shell).terminal;
            let parent_dir = k.spaces().directory_phys(Space::Process(shell));
            let fd = k.procs.live(shell).files.open(&k.fs, b"frame0.txt").unwrap();
            let files_before = k.procs().record_for(shell).files;
            k.procs.record_for_mut(shell).exec_ctx = KernelContext { esp: 0x1234, ebp: 0x5678 };

            let launch = k.execute(Some(shell), terminal, b"testprint  hello world ").unwrap();
            assert_eq!(launch.entry, 0x0804_8200);
            assert_eq!(launch.user_stack, USER_STACK_TOP);
            assert_eq!(k.machine().kernel_stack, Some(launch.kernel_stack));
            assert_eq!(k.current_pid(), Some(launch.pid));
            let child = k.procs().record_for(launch.pid);
            assert_eq!(child.parent, Some(shell));
            assert_eq!(child.args(), b"hello world");

            // image landed at 0x0804_8000 of the child's page
            let mut magic = [0u8; 4];
            k.copy_from_user(IMAGE_ADDR, &mut magic).unwrap();
            assert_eq!(&magic, b"\x7fELF");

            match k.halt(launch.pid, 42) {
                Halted::Resume { parent, status, context } => {
                    assert_eq!(parent, shell);
                    assert_eq!(status, 42);
                    assert_eq!(context, k.saved_context(shell, Saved::Exec));
                    assert_eq!(context.esp, 0x1234);
                }
                other => panic!("{:?}", other),
            }
            assert_eq!(k.procs().record_for(shell).files, files_before);
            assert!(k.procs().record_for(shell).files.is_open(fd));
            assert_eq!(k.machine().directory, Some(parent_dir));
            assert_eq!(k.machine().kernel_stack, Some(k.kernel_stack_top(shell)));
            assert_eq!(k.current_pid(), Some(shell));
            assert!(!k.spaces().is_allocated(launch.pid));
            assert!(!k.procs().record_for(launch.pid).live);
        });
    }

    #[test]
    fn failed_execute_has_no_side_effects() {
        let img = standard_image();
        booted(&img, |k| {
            let shell = k.current_pid().unwrap();
            let before = k.machine().loads.len();
            let dir = k.machine().directory;

            assert_eq!(k.execute(Some(shell), 2, b"nothere"), Err(ExecError::Fs(FsError::NotFound)));
            assert_eq!(k.execute(Some(shell), 2, b"notelf"), Err(ExecError::NotExecutable));
            assert_eq!(k.execute(Some(shell), 2, b"badentry"), Err(ExecError::BadEntry(0x0010_0000)));
            assert_eq!(k.execute(Some(shell), 2, b"rtc"), Err(ExecError::NotRegular));
            assert_eq!(k.execute(Some(shell), 2, b"."), Err(ExecError::NotRegular));

            // none of these got as far as touching page tables
            assert_eq!(k.machine().loads.len(), before);
            assert_eq!(k.machine().directory, dir);
            assert_eq!(k.current_pid(), Some(shell));
        });
    }

    #[test]
    fn execute_fails_when_pool_is_empty() {
        let img = standard_image();
        booted(&img, |k| {
            // three shells are up; three more fit
            let mut parent = k.current_pid().unwrap();
            for _ in 0..3 {
                parent = k.execute(Some(parent), 2, b"testprint").unwrap().pid;
            }
            assert_eq!(
                k.execute(Some(parent), 2, b"testprint"),
                Err(ExecError::Paging(PagingError::Exhausted))
            );
            assert_eq!(k.current_pid(), Some(parent));
        });
    }

    #[test]
    fn base_shell_halt_respawns() {
        let img = standard_image();
        booted(&img, |k| {
            let shell = k.current_pid().unwrap();
            match k.halt(shell, 0) {
                Halted::Respawn(launch) => {
                    assert_eq!(launch.entry, SHELL_ENTRY);
                    assert_eq!(k.scheduler().slot(2), Some(launch.pid));
                    let pcb = k.procs().record_for(launch.pid);
                    assert!(pcb.live && pcb.parent.is_none() && pcb.terminal == 2);
                }
                other => panic!("{:?}", other),
            }
        });
    }

    #[test]
    fn user_fault_halts_with_256() {
        let img = standard_image();
        booted(&img, |k| {
            let shell = k.current_pid().unwrap();
            let child = k.execute(Some(shell), 2, b"testprint").unwrap().pid;
            match k.fault(14) {
                Some(Halted::Resume { parent, status, .. }) => {
                    assert_eq!(parent, shell);
                    assert_eq!(status, EXCEPTION_STATUS);
                }
                other => panic!("{:?}", other),
            }
            assert!(!k.spaces().is_allocated(child));
        });
    }
}
