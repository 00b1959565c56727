//! Terminal — three text terminals over one VGA screen
//!
//! Each terminal owns a line buffer and a screen. Only the displayed one
//! lives in VGA memory; the others are drawn into their backing pages and
//! copied in and out on Alt+F1..F3.
//!
//! Keys always go to the displayed terminal. A `read` from a process on
//! terminal `t` consumes terminal `t`'s finished line.

use crate::sys::machine::Machine;
use crate::sys::mem::{backing_frame, PhysAddr, VGA_FRAME};

use pc_keyboard::{
    layouts::Us104Key, DecodedKey, HandleControl, KeyCode, KeyEvent, KeyState, Keyboard,
    ScancodeSet1,
};

pub const TERMINALS: usize = 3;
pub const LINE_MAX:  usize = 128;
pub const COLS:      usize = 80;
pub const ROWS:      usize = 25;
const CELLS:         usize = COLS * ROWS;

/// Light grey on black
const ATTR: u16 = 0x07 << 8;
const BLANK: u16 = ATTR | b' ' as u16;

#[derive(Clone, Copy)]
struct Term {
    line:  [u8; LINE_MAX],
    len:   usize,
    ready: bool,
    row:   usize,
    col:   usize,
}

impl Term {
    const fn new() -> Self {
        Self { line: [0; LINE_MAX], len: 0, ready: false, row: 0, col: 0 }
    }
}

pub struct Terminals {
    terms:     [Term; TERMINALS],
    displayed: usize,
    running:   usize,
    keyboard:  Keyboard<Us104Key, ScancodeSet1>,
    alt:       bool,
    ctrl:      bool,
}

impl Terminals {
    pub fn new() -> Self {
        Self {
            terms:     [Term::new(); TERMINALS],
            displayed: 0,
            running:   0,
            keyboard:  Keyboard::new(ScancodeSet1::new(), Us104Key, HandleControl::Ignore),
            alt:       false,
            ctrl:      false,
        }
    }

    /// Blank every screen and put the cursor home
    pub fn init(&mut self, machine: &mut impl Machine) {
        for t in 0..TERMINALS {
            self.clear(t, machine);
        }
    }

    pub fn displayed(&self) -> usize { self.displayed }
    pub fn running(&self) -> usize { self.running }

    /// Terminal whose process is on the CPU (its buffer is the active one)
    pub fn set_running(&mut self, t: usize) {
        assert!(t < TERMINALS);
        self.running = t;
    }

    /// Frame terminal `t` draws into right now
    pub fn frame_of(&self, t: usize) -> PhysAddr {
        if t == self.displayed { VGA_FRAME } else { backing_frame(t) }
    }

    // -----------------------------------------------------------------------
    // Output
    // -----------------------------------------------------------------------

    pub fn write(&mut self, t: usize, bytes: &[u8], machine: &mut impl Machine) -> usize {
        let frame = self.frame_of(t);
        let term = &mut self.terms[t];
        let cells = machine.video_frame(frame);
        for &b in bytes {
            put_byte(term, cells, b);
        }
        if t == self.displayed {
            machine.set_cursor(term.row * COLS + term.col);
        }
        bytes.len()
    }

    pub fn clear(&mut self, t: usize, machine: &mut impl Machine) {
        let frame = self.frame_of(t);
        machine.video_frame(frame)[..CELLS].fill(BLANK);
        let term = &mut self.terms[t];
        term.row = 0;
        term.col = 0;
        if t == self.displayed {
            machine.set_cursor(0);
        }
    }

    // -----------------------------------------------------------------------
    // Input
    // -----------------------------------------------------------------------

    /// Take terminal `t`'s finished line (newline included).
    /// `None` while the user is still typing.
    pub fn read_line(&mut self, t: usize, buf: &mut [u8]) -> Option<usize> {
        let term = &mut self.terms[t];
        if !term.ready {
            return None;
        }
        let n = term.len.min(buf.len());
        buf[..n].copy_from_slice(&term.line[..n]);
        term.len = 0;
        term.ready = false;
        Some(n)
    }

    /// Feed one byte from port 0x60. Returns the newly displayed terminal
    /// when the key was a terminal switch.
    pub fn on_scancode(&mut self, scancode: u8, machine: &mut impl Machine) -> Option<usize> {
        let event = match self.keyboard.add_byte(scancode) {
            Ok(Some(event)) => event,
            _ => return None,
        };
        self.track_modifiers(&event);

        if self.alt && event.state == KeyState::Down {
            let target = match event.code {
                KeyCode::F1 => Some(0),
                KeyCode::F2 => Some(1),
                KeyCode::F3 => Some(2),
                _ => None,
            };
            if let Some(t) = target {
                self.show(t, machine);
                return Some(t);
            }
        }

        match self.keyboard.process_keyevent(event) {
            Some(DecodedKey::Unicode(c)) => self.on_char(c, machine),
            Some(DecodedKey::RawKey(_)) | None => {}
        }
        None
    }

    fn track_modifiers(&mut self, event: &KeyEvent) {
        let down = event.state != KeyState::Up;
        match event.code {
            KeyCode::LAlt | KeyCode::RAltGr => self.alt = down,
            KeyCode::LControl | KeyCode::RControl => self.ctrl = down,
            _ => {}
        }
    }

    fn on_char(&mut self, c: char, machine: &mut impl Machine) {
        let t = self.displayed;

        if self.ctrl {
            if c == 'l' || c == 'L' {
                self.clear(t, machine);
                // keep what was typed so far visible
                let term = self.terms[t];
                self.write(t, &term.line[..term.len], machine);
            }
            return;
        }

        if self.terms[t].ready {
            // previous line not consumed yet
            return;
        }

        match c {
            '\n' | '\r' => {
                let term = &mut self.terms[t];
                term.line[term.len] = b'\n';
                term.len += 1;
                term.ready = true;
                self.write(t, b"\n", machine);
            }
            '\u{8}' => {
                if self.terms[t].len > 0 {
                    self.terms[t].len -= 1;
                    self.write(t, b"\x08", machine);
                }
            }
            c if c.is_ascii() && !c.is_ascii_control() || c == '\t' => {
                let term = &mut self.terms[t];
                // one byte is kept for the newline
                if term.len < LINE_MAX - 1 {
                    term.line[term.len] = c as u8;
                    term.len += 1;
                    self.write(t, &[c as u8], machine);
                }
            }
            _ => {}
        }
    }

    /// Make `to` the displayed terminal
    pub fn show(&mut self, to: usize, machine: &mut impl Machine) {
        assert!(to < TERMINALS);
        let from = self.displayed;
        if from == to {
            return;
        }

        let mut scratch = [0u16; CELLS];
        scratch.copy_from_slice(&machine.video_frame(VGA_FRAME)[..CELLS]);
        machine.video_frame(backing_frame(from))[..CELLS].copy_from_slice(&scratch);

        scratch.copy_from_slice(&machine.video_frame(backing_frame(to))[..CELLS]);
        machine.video_frame(VGA_FRAME)[..CELLS].copy_from_slice(&scratch);

        self.displayed = to;
        let term = &self.terms[to];
        machine.set_cursor(term.row * COLS + term.col);
        klog!("terminal: showing {}", to);
    }
}

impl Default for Terminals {
    fn default() -> Self {
        Self::new()
    }
}

fn put_byte(term: &mut Term, cells: &mut [u16], b: u8) {
    match b {
        b'\n' => {
            term.col = 0;
            term.row += 1;
        }
        0x08 => {
            if term.col > 0 {
                term.col -= 1;
            } else if term.row > 0 {
                term.row -= 1;
                term.col = COLS - 1;
            }
            cells[term.row * COLS + term.col] = BLANK;
        }
        _ => {
            cells[term.row * COLS + term.col] = ATTR | b as u16;
            term.col += 1;
            if term.col == COLS {
                term.col = 0;
                term.row += 1;
            }
        }
    }

    if term.row == ROWS {
        cells.copy_within(COLS..CELLS, 0);
        cells[CELLS - COLS..CELLS].fill(BLANK);
        term.row = ROWS - 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sys::machine::mock::MockMachine;

    // scancode set 1 make/break codes
    const H: u8 = 0x23;
    const I: u8 = 0x17;
    const L: u8 = 0x26;
    const ENTER: u8 = 0x1C;
    const BACKSPACE: u8 = 0x0E;
    const LALT: u8 = 0x38;
    const LCTRL: u8 = 0x1D;
    const F2: u8 = 0x3C;

    fn release(code: u8) -> u8 { code | 0x80 }

    fn press(terms: &mut Terminals, m: &mut MockMachine, codes: &[u8]) {
        for &c in codes {
            terms.on_scancode(c, m);
            terms.on_scancode(release(c), m);
        }
    }

    #[test]
    fn typed_line_is_echoed_and_read_once() {
        let mut m = MockMachine::default();
        let mut terms = Terminals::new();
        terms.init(&mut m);

        let mut buf = [0u8; LINE_MAX];
        press(&mut terms, &mut m, &[H, I, I, BACKSPACE]);
        assert_eq!(terms.read_line(0, &mut buf), None);
        press(&mut terms, &mut m, &[ENTER]);

        assert_eq!(terms.read_line(0, &mut buf), Some(3));
        assert_eq!(&buf[..3], b"hi\n");
        assert_eq!(terms.read_line(0, &mut buf), None);
        assert_eq!(m.screen_text(VGA_FRAME)[0], "hi");
    }

    #[test]
    fn long_lines_are_capped() {
        let mut m = MockMachine::default();
        let mut terms = Terminals::new();
        terms.init(&mut m);
        for _ in 0..200 {
            press(&mut terms, &mut m, &[H]);
        }
        press(&mut terms, &mut m, &[ENTER]);
        let mut buf = [0u8; 256];
        assert_eq!(terms.read_line(0, &mut buf), Some(LINE_MAX));
        assert_eq!(buf[LINE_MAX - 1], b'\n');
    }

    #[test]
    fn hidden_terminal_draws_into_backing_page() {
        let mut m = MockMachine::default();
        let mut terms = Terminals::new();
        terms.init(&mut m);
        terms.write(1, b"two", &mut m);
        assert_eq!(m.screen_text(backing_frame(1))[0], "two");
        assert_eq!(m.screen_text(VGA_FRAME)[0], "");
    }

    #[test]
    fn alt_f2_swaps_screens() {
        let mut m = MockMachine::default();
        let mut terms = Terminals::new();
        terms.init(&mut m);
        terms.write(0, b"zero", &mut m);
        terms.write(1, b"one", &mut m);

        terms.on_scancode(LALT, &mut m);
        assert_eq!(terms.on_scancode(F2, &mut m), Some(1));
        terms.on_scancode(release(F2), &mut m);
        terms.on_scancode(release(LALT), &mut m);

        assert_eq!(terms.displayed(), 1);
        assert_eq!(m.screen_text(VGA_FRAME)[0], "one");
        assert_eq!(m.screen_text(backing_frame(0))[0], "zero");

        // typing now lands on terminal 1
        press(&mut terms, &mut m, &[H, ENTER]);
        let mut buf = [0u8; 8];
        assert_eq!(terms.read_line(0, &mut buf), None);
        assert_eq!(terms.read_line(1, &mut buf), Some(2));
    }

    #[test]
    fn ctrl_l_clears_screen() {
        let mut m = MockMachine::default();
        let mut terms = Terminals::new();
        terms.init(&mut m);
        terms.write(0, b"junk\nmore junk\n", &mut m);
        terms.on_scancode(LCTRL, &mut m);
        press(&mut terms, &mut m, &[L]);
        terms.on_scancode(release(LCTRL), &mut m);
        assert!(m.screen_text(VGA_FRAME).iter().all(|row| row.is_empty()));
        assert_eq!(m.cursor, 0);
    }

    #[test]
    fn output_scrolls_at_bottom() {
        let mut m = MockMachine::default();
        let mut terms = Terminals::new();
        terms.init(&mut m);
        for i in 0..ROWS + 1 {
            let line = std::format!("line{}\n", i);
            terms.write(0, line.as_bytes(), &mut m);
        }
        let text = m.screen_text(VGA_FRAME);
        assert_eq!(text[0], "line2");
        assert_eq!(text[ROWS - 2], "line25");
    }
}
