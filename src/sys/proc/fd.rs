//! Descriptor table — 8 open streams per process
//!
//!   fd 0      terminal input  (always open)
//!   fd 1      terminal output (always open)
//!   fd 2..8   free for `open`
//!
//! Every stream is one of a closed set of driver kinds; read/write/close
//! dispatch with an exhaustive match on the kind.

use crate::sys::fs::{BootFs, FileType, FsError, FILENAME_MAX};
use crate::sys::machine::Machine;
use crate::sys::rtc::{self, Rtc, RtcError, DEFAULT_RATE};
use crate::sys::terminal::Terminals;

use core::fmt;

pub const MAX_FILES: usize = 8;
pub const STDIN:     usize = 0;
pub const STDOUT:    usize = 1;
const FIRST_FREE:    usize = 2;

// ---------------------------------------------------------------------------
// Kinds & entries
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileKind {
    Stdin,
    Stdout,
    /// `deadline` is set while a read is waiting for the next virtual tick
    Rtc { rate: u32, deadline: Option<u64> },
    Directory,
    Regular,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OpenFile {
    pub kind:     FileKind,
    pub inode:    u32,
    /// Byte offset for files, entry index for the directory
    pub position: u32,
}

impl OpenFile {
    pub const fn new(kind: FileKind, inode: u32) -> Self {
        Self { kind, inode, position: 0 }
    }
}

/// Why a read could not finish yet
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Wait {
    /// Terminal has no complete line
    Line(usize),
    /// RTC descriptor waiting for the given hardware tick
    Rtc(u64),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transfer {
    Done(usize),
    Pending(Wait),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileError {
    BadFd(i32),
    NotOpen(usize),
    /// fd 0 and 1 cannot be closed
    Reserved(usize),
    TableFull,
    /// Operation makes no sense for this kind (e.g. write to a file)
    Unsupported,
    Fs(FsError),
    Rtc(RtcError),
}

impl From<FsError> for FileError {
    fn from(e: FsError) -> Self { FileError::Fs(e) }
}

impl From<RtcError> for FileError {
    fn from(e: RtcError) -> Self { FileError::Rtc(e) }
}

impl fmt::Display for FileError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FileError::BadFd(fd)    => write!(f, "descriptor {} out of range", fd),
            FileError::NotOpen(fd)  => write!(f, "descriptor {} is not open", fd),
            FileError::Reserved(fd) => write!(f, "descriptor {} cannot be closed", fd),
            FileError::TableFull    => write!(f, "descriptor table full"),
            FileError::Unsupported  => write!(f, "operation not supported"),
            FileError::Fs(e)        => write!(f, "{}", e),
            FileError::Rtc(e)       => write!(f, "{}", e),
        }
    }
}

// ---------------------------------------------------------------------------
// Drivers — the collaborators a stream needs
// ---------------------------------------------------------------------------

pub struct Drivers<'a, 'k> {
    pub fs:       &'a BootFs<'k>,
    pub terms:    &'a mut Terminals,
    pub rtc:      &'a Rtc,
    /// Terminal of the process doing the I/O
    pub terminal: usize,
}

impl OpenFile {
    fn on_open(&mut self) {
        if let FileKind::Rtc { rate, deadline } = &mut self.kind {
            *rate = DEFAULT_RATE;
            *deadline = None;
        }
    }

    fn on_close(&mut self) {
        self.position = 0;
    }

    pub fn read(&mut self, drv: &mut Drivers, buf: &mut [u8]) -> Result<Transfer, FileError> {
        match &mut self.kind {
            FileKind::Stdin => match drv.terms.read_line(drv.terminal, buf) {
                Some(n) => Ok(Transfer::Done(n)),
                None => Ok(Transfer::Pending(Wait::Line(drv.terminal))),
            },
            FileKind::Stdout => Err(FileError::Unsupported),
            FileKind::Rtc { rate, deadline } => {
                let due = *deadline.get_or_insert_with(|| drv.rtc.next_deadline(*rate));
                if drv.rtc.now() >= due {
                    *deadline = None;
                    Ok(Transfer::Done(0))
                } else {
                    Ok(Transfer::Pending(Wait::Rtc(due)))
                }
            }
            FileKind::Directory => {
                if self.position >= drv.fs.dir_count() {
                    return Ok(Transfer::Done(0));
                }
                let dentry = drv.fs.dentry(self.position)?;
                let name = dentry.name();
                let n = name.len().min(buf.len()).min(FILENAME_MAX);
                buf[..n].copy_from_slice(&name[..n]);
                self.position += 1;
                Ok(Transfer::Done(n))
            }
            FileKind::Regular => {
                let n = drv.fs.read(self.inode, self.position, buf)?;
                self.position += n as u32;
                Ok(Transfer::Done(n))
            }
        }
    }

    pub fn write(
        &mut self,
        drv: &mut Drivers,
        machine: &mut impl Machine,
        buf: &[u8],
    ) -> Result<usize, FileError> {
        match &mut self.kind {
            FileKind::Stdout => Ok(drv.terms.write(drv.terminal, buf, machine)),
            FileKind::Rtc { rate, deadline } => {
                let raw: [u8; 4] = buf.try_into().map_err(|_| RtcError::BadLength(buf.len()))?;
                *rate = rtc::validate_rate(u32::from_le_bytes(raw))?;
                *deadline = None;
                Ok(0)
            }
            FileKind::Stdin | FileKind::Directory | FileKind::Regular => {
                Err(FileError::Unsupported)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// FdTable
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FdTable {
    entries: [Option<OpenFile>; MAX_FILES],
}

impl FdTable {
    pub const EMPTY: Self = Self { entries: [None; MAX_FILES] };

    /// Fresh table with terminal input/output installed
    pub fn with_std() -> Self {
        let mut table = Self::EMPTY;
        table.entries[STDIN] = Some(OpenFile::new(FileKind::Stdin, 0));
        table.entries[STDOUT] = Some(OpenFile::new(FileKind::Stdout, 0));
        table
    }

    pub fn get_mut(&mut self, fd: i32) -> Result<&mut OpenFile, FileError> {
        let idx = index(fd)?;
        self.entries[idx].as_mut().ok_or(FileError::NotOpen(idx))
    }

    pub fn is_open(&self, fd: usize) -> bool {
        fd < MAX_FILES && self.entries[fd].is_some()
    }

    pub fn open_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_some()).count()
    }

    /// Resolve `name`, bind the first free descriptor to it, run the open
    /// hook. On error the table is not touched.
    pub fn open(&mut self, fs: &BootFs, name: &[u8]) -> Result<usize, FileError> {
        let dentry = fs.resolve(name)?;
        let slot = (FIRST_FREE..MAX_FILES)
            .find(|&i| self.entries[i].is_none())
            .ok_or(FileError::TableFull)?;

        let kind = match dentry.kind {
            FileType::Rtc => FileKind::Rtc { rate: DEFAULT_RATE, deadline: None },
            FileType::Directory => FileKind::Directory,
            FileType::Regular => FileKind::Regular,
        };
        let mut file = OpenFile::new(kind, dentry.inode);
        file.on_open();
        self.entries[slot] = Some(file);
        Ok(slot)
    }

    pub fn close(&mut self, fd: i32) -> Result<(), FileError> {
        let idx = index(fd)?;
        if idx == STDIN || idx == STDOUT {
            return Err(FileError::Reserved(idx));
        }
        let mut file = self.entries[idx].take().ok_or(FileError::NotOpen(idx))?;
        file.on_close();
        Ok(())
    }

    /// Run every close hook (0 and 1 included) and empty the table
    pub fn close_all(&mut self) {
        for entry in self.entries.iter_mut() {
            if let Some(mut file) = entry.take() {
                file.on_close();
            }
        }
    }
}

fn index(fd: i32) -> Result<usize, FileError> {
    usize::try_from(fd)
        .ok()
        .filter(|&i| i < MAX_FILES)
        .ok_or(FileError::BadFd(fd))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sys::fs::image::ImageBuilder;
    use crate::sys::machine::mock::MockMachine;

    fn image() -> std::vec::Vec<u8> {
        ImageBuilder::new()
            .directory(".")
            .rtc("rtc")
            .file("hello", b"hello world")
            .build()
    }

    #[test]
    fn missing_file_leaves_table_alone() {
        let img = image();
        let fs = BootFs::mount(&img).unwrap();
        let mut table = FdTable::with_std();
        let before = table;
        assert_eq!(table.open(&fs, b"nope"), Err(FileError::Fs(FsError::NotFound)));
        assert_eq!(table, before);
    }

    #[test]
    fn std_descriptors_cannot_be_closed() {
        let mut table = FdTable::with_std();
        assert_eq!(table.close(0), Err(FileError::Reserved(0)));
        assert_eq!(table.close(1), Err(FileError::Reserved(1)));
        assert_eq!(table.close(5), Err(FileError::NotOpen(5)));
        assert_eq!(table.close(8), Err(FileError::BadFd(8)));
        assert_eq!(table.close(-1), Err(FileError::BadFd(-1)));
        assert!(table.is_open(0) && table.is_open(1));
    }

    #[test]
    fn full_table_rejects_open_without_damage() {
        let img = image();
        let fs = BootFs::mount(&img).unwrap();
        let mut table = FdTable::with_std();
        for expected in 2..MAX_FILES {
            assert_eq!(table.open(&fs, b"hello"), Ok(expected));
        }
        let full = table;
        assert_eq!(table.open(&fs, b"rtc"), Err(FileError::TableFull));
        assert_eq!(table, full);
        assert_eq!(table.open_count(), MAX_FILES);

        table.close(4).unwrap();
        assert_eq!(table.open(&fs, b"rtc"), Ok(4));
    }

    #[test]
    fn file_and_directory_reads() {
        let img = image();
        let fs = BootFs::mount(&img).unwrap();
        let mut terms = Terminals::new();
        let rtc = Rtc::new();
        let mut table = FdTable::with_std();
        let f = table.open(&fs, b"hello").unwrap() as i32;
        let d = table.open(&fs, b".").unwrap() as i32;

        let mut drv = Drivers { fs: &fs, terms: &mut terms, rtc: &rtc, terminal: 0 };
        let mut buf = [0u8; 6];
        let file = table.get_mut(f).unwrap();
        assert_eq!(file.read(&mut drv, &mut buf), Ok(Transfer::Done(6)));
        assert_eq!(&buf, b"hello ");
        assert_eq!(file.read(&mut drv, &mut buf), Ok(Transfer::Done(5)));
        assert_eq!(file.read(&mut drv, &mut buf), Ok(Transfer::Done(0)));

        let mut name = [0u8; 32];
        let dir = table.get_mut(d).unwrap();
        let names: std::vec::Vec<std::vec::Vec<u8>> = (0..4)
            .map(|_| match dir.read(&mut drv, &mut name) {
                Ok(Transfer::Done(n)) => name[..n].to_vec(),
                other => panic!("{:?}", other),
            })
            .collect();
        assert_eq!(names, [b".".to_vec(), b"rtc".to_vec(), b"hello".to_vec(), std::vec![]]);
    }

    #[test]
    fn wrong_direction_is_rejected() {
        let img = image();
        let fs = BootFs::mount(&img).unwrap();
        let mut m = MockMachine::default();
        let mut terms = Terminals::new();
        let rtc = Rtc::new();
        let mut table = FdTable::with_std();
        let f = table.open(&fs, b"hello").unwrap() as i32;
        let mut drv = Drivers { fs: &fs, terms: &mut terms, rtc: &rtc, terminal: 0 };

        let mut buf = [0u8; 4];
        assert_eq!(table.get_mut(1).unwrap().read(&mut drv, &mut buf), Err(FileError::Unsupported));
        assert_eq!(table.get_mut(0).unwrap().write(&mut drv, &mut m, b"x"), Err(FileError::Unsupported));
        assert_eq!(table.get_mut(f).unwrap().write(&mut drv, &mut m, b"x"), Err(FileError::Unsupported));
        assert_eq!(table.get_mut(1).unwrap().write(&mut drv, &mut m, b"ok"), Ok(2));
    }

    #[test]
    fn rtc_waits_for_its_own_rate() {
        let img = image();
        let fs = BootFs::mount(&img).unwrap();
        let mut m = MockMachine::default();
        let mut terms = Terminals::new();
        let mut rtc = Rtc::new();
        let mut table = FdTable::with_std();
        let r = table.open(&fs, b"rtc").unwrap() as i32;

        {
            let mut drv = Drivers { fs: &fs, terms: &mut terms, rtc: &rtc, terminal: 0 };
            let file = table.get_mut(r).unwrap();
            assert_eq!(file.write(&mut drv, &mut m, &3u32.to_le_bytes()), Err(FileError::Rtc(RtcError::BadRate(3))));
            assert_eq!(file.write(&mut drv, &mut m, &[0, 1]), Err(FileError::Rtc(RtcError::BadLength(2))));
            assert_eq!(file.write(&mut drv, &mut m, &512u32.to_le_bytes()), Ok(0));
            assert_eq!(file.read(&mut drv, &mut []), Ok(Transfer::Pending(Wait::Rtc(2))));
        }
        rtc.tick();
        rtc.tick();
        let mut drv = Drivers { fs: &fs, terms: &mut terms, rtc: &rtc, terminal: 0 };
        assert_eq!(table.get_mut(r).unwrap().read(&mut drv, &mut []), Ok(Transfer::Done(0)));
    }
}
