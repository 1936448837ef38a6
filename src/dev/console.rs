//! Console output modes and raw input.
//!
//! Every value leaving the machine passes through the console under its
//! current mode. A mode is stored on the wire as its low base-27 digit
//! (mode 0 is digit -13), which is what DSET/DGET traffic in.
//!
//! Dense text packs two ASCII characters into one cell as
//! `128 * a + b - 9841`; NUL halves are skipped on output, and TELL input
//! reverses the packing from two raw characters.

use crate::ternary::{TFloat, Trint, Tryte};
use std::io::{Read, Write};
use std::sync::{Arc, Mutex};

/// Console rendering mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Base-27 machine text.
    Raw,
    /// `-0+` ternary strings.
    Ternary,
    /// Decimal values, space separated.
    Numeric,
    /// Two ASCII characters per cell.
    DenseText,
    /// One ASCII character per cell.
    WideText,
    /// Reserved for a framebuffer device.
    Graphics,
}

impl Mode {
    /// Mode from its index 0..6.
    pub fn from_index(index: usize) -> Option<Mode> {
        match index {
            0 => Some(Mode::Raw),
            1 => Some(Mode::Ternary),
            2 => Some(Mode::Numeric),
            3 => Some(Mode::DenseText),
            4 => Some(Mode::WideText),
            5 => Some(Mode::Graphics),
            _ => None,
        }
    }

    /// The index 0..6.
    pub fn index(&self) -> usize {
        match self {
            Mode::Raw => 0,
            Mode::Ternary => 1,
            Mode::Numeric => 2,
            Mode::DenseText => 3,
            Mode::WideText => 4,
            Mode::Graphics => 5,
        }
    }
}

/// The machine console: an output sink with an encoding mode and a raw
/// character input source.
pub struct Console {
    mode: Mode,
    input: Box<dyn Read + Send>,
    output: Box<dyn Write + Send>,
}

impl Console {
    /// Console over the process stdio.
    pub fn stdio() -> Self {
        Self::with_io(Box::new(std::io::stdin()), Box::new(std::io::stdout()))
    }

    /// Console over arbitrary reader/writer pairs.
    pub fn with_io(input: Box<dyn Read + Send>, output: Box<dyn Write + Send>) -> Self {
        Self {
            mode: Mode::Raw,
            input,
            output,
        }
    }

    /// The current mode.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Switch mode.
    pub fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }

    /// Render one cell under the current mode.
    pub fn write_tryte(&mut self, cell: &Tryte) {
        let text = match self.mode {
            // TODO: route graphics-mode cells to a framebuffer device
            // instead of the text console
            Mode::Raw | Mode::Graphics => cell.base27_string(),
            Mode::Ternary => cell.ternary_string(),
            Mode::Numeric => format!("{} ", cell.value()),
            Mode::DenseText => {
                let code = cell.value() as i32 + 9841;
                let mut s = String::new();
                let first = (code / 128) as u8;
                let second = (code % 128) as u8;
                if first != 0 {
                    s.push(first as char);
                }
                if second != 0 {
                    s.push(second as char);
                }
                s
            }
            Mode::WideText => {
                let code = ((cell.value() as i32 + 9841) % 128) as u8;
                String::from(code as char)
            }
        };
        let _ = self.output.write_all(text.as_bytes());
        let _ = self.output.flush();
    }

    /// Render a wide value under the current mode.
    pub fn write_trint(&mut self, value: &Trint<3>) {
        match self.mode {
            Mode::Numeric => {
                let _ = write!(self.output, "{} ", value.value());
                let _ = self.output.flush();
            }
            _ => {
                for i in 0..3 {
                    let tryte = value.tryte(i);
                    self.write_tryte(&tryte);
                }
            }
        }
    }

    /// Render a float under the current mode.
    pub fn write_float(&mut self, value: &TFloat) {
        match self.mode {
            Mode::Numeric => {
                let _ = write!(self.output, "{} ", value.to_f64());
            }
            _ => {
                let _ = write!(self.output, "{}", value);
            }
        }
        let _ = self.output.flush();
    }

    /// Plain text passthrough (used by the machine dump).
    pub fn write_str(&mut self, text: &str) {
        let _ = self.output.write_all(text.as_bytes());
        let _ = self.output.flush();
    }

    /// Read the next two raw non-whitespace characters; a drained input
    /// supplies zeroes.
    pub fn read_code(&mut self) -> (u8, u8) {
        (self.read_char(), self.read_char())
    }

    fn read_char(&mut self) -> u8 {
        let mut byte = [0u8; 1];
        loop {
            match self.input.read_exact(&mut byte) {
                Ok(()) => {
                    if !byte[0].is_ascii_whitespace() {
                        return byte[0];
                    }
                }
                Err(_) => return 0,
            }
        }
    }
}

impl std::fmt::Debug for Console {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Console").field("mode", &self.mode).finish()
    }
}

/// A clonable in-memory writer for capturing console output (tests and
/// embedding).
#[derive(Clone, Default)]
pub struct CaptureBuffer(Arc<Mutex<Vec<u8>>>);

impl CaptureBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, lossily decoded.
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().expect("capture buffer poisoned")).into_owned()
    }
}

impl Write for CaptureBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0
            .lock()
            .expect("capture buffer poisoned")
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn capture() -> (Console, CaptureBuffer) {
        let buf = CaptureBuffer::new();
        let console = Console::with_io(Box::new(Cursor::new(Vec::new())), Box::new(buf.clone()));
        (console, buf)
    }

    #[test]
    fn raw_mode_prints_base27() {
        let (mut console, out) = capture();
        console.write_tryte(&Tryte::from_int(1000));
        assert_eq!(out.contents(), "aja");
    }

    #[test]
    fn ternary_and_numeric_modes() {
        let (mut console, out) = capture();
        console.set_mode(Mode::Ternary);
        console.write_tryte(&Tryte::from_int(1));
        console.set_mode(Mode::Numeric);
        console.write_tryte(&Tryte::from_int(-42));
        assert_eq!(out.contents(), "00000000+-42 ");
    }

    #[test]
    fn dense_text_packs_two_chars() {
        let (mut console, out) = capture();
        console.set_mode(Mode::DenseText);
        // 'H' = 72, 'i' = 105: cell = 128*72 + 105 - 9841
        console.write_tryte(&Tryte::from_int(128 * 72 + 105 - 9841));
        assert_eq!(out.contents(), "Hi");
    }

    #[test]
    fn mode_indices_round_trip() {
        for i in 0..6 {
            assert_eq!(Mode::from_index(i).unwrap().index(), i);
        }
        assert_eq!(Mode::from_index(6), None);
    }

    #[test]
    fn read_code_skips_whitespace_and_zero_fills() {
        let mut console = Console::with_io(
            Box::new(Cursor::new(b" H i".to_vec())),
            Box::new(std::io::sink()),
        );
        assert_eq!(console.read_code(), (b'H', b'i'));
        // drained input reads as zeroes
        assert_eq!(console.read_code(), (0, 0));
    }
}
