//! Boot configuration — parsed from the multiboot command line
//!
//! Format: whitespace separated `key=value` pairs.
//!   shell=<name>   program launched on every terminal (default `shell`)
//!   log=<level>    error | warn | info (default info)
//!   hz=<n>         scheduler tick frequency, 19..=1000 (default 100)

use crate::sys::fs::FILENAME_MAX;
use crate::sys::log::Level;

pub const DEFAULT_SHELL: &str = "shell";
pub const DEFAULT_TICK_HZ: u32 = 100;

/// PIT cannot go below ~18.2 Hz; above 1 kHz we spend the CPU on switching
const TICK_HZ_RANGE: core::ops::RangeInclusive<u32> = 19..=1000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BootConfig {
    shell:     [u8; FILENAME_MAX],
    shell_len: usize,
    pub log_level: Level,
    pub tick_hz:   u32,
}

impl Default for BootConfig {
    fn default() -> Self {
        let mut cfg = Self {
            shell:     [0; FILENAME_MAX],
            shell_len: 0,
            log_level: Level::Info,
            tick_hz:   DEFAULT_TICK_HZ,
        };
        cfg.set_shell(DEFAULT_SHELL);
        cfg
    }
}

impl BootConfig {
    pub fn parse(cmdline: &str) -> Self {
        let mut cfg = Self::default();

        for word in cmdline.split_whitespace() {
            let (key, value) = match word.split_once('=') {
                Some(kv) => kv,
                None => (word, ""),
            };

            match key {
                "shell" if !value.is_empty() && value.len() <= FILENAME_MAX => {
                    cfg.set_shell(value);
                }
                "log" => match Level::parse(value) {
                    Some(level) => cfg.log_level = level,
                    None => kwarn!("config: unknown log level '{}'", value),
                },
                "hz" => match value.parse::<u32>() {
                    Ok(hz) if TICK_HZ_RANGE.contains(&hz) => cfg.tick_hz = hz,
                    _ => kwarn!("config: bad tick frequency '{}'", value),
                },
                _ => kwarn!("config: ignoring '{}'", word),
            }
        }
        cfg
    }

    /// Program name launched on every terminal
    pub fn shell(&self) -> &[u8] {
        &self.shell[..self.shell_len]
    }

    fn set_shell(&mut self, name: &str) {
        let n = name.len().min(FILENAME_MAX);
        self.shell = [0; FILENAME_MAX];
        self.shell[..n].copy_from_slice(&name.as_bytes()[..n]);
        self.shell_len = n;
    }
}
