//! Operator memory inspection and patching.
//!
//! Console reads block on the operator, so the control lock is only taken
//! around each individual memory access, never across a read.

use std::fmt::{self, Write as _};
use std::io::{self, BufRead, Write};

use log::warn;

use crate::engine::{split_data_address, CoreEngine, DataWidth};
use crate::error::DebugInputError;
use crate::state::ControlContext;

/// Bytes shown per dump row.
pub const DUMP_BYTES_PER_ROW: u32 = 16;

/// Bytes dumped by an inspect session.
pub const INSPECT_LEN: u32 = 128;

/// Width of the hex column, up to the `|` separator.
const HEX_COLUMN_WIDTH: usize = DUMP_BYTES_PER_ROW as usize * 3;

const ADDRESS_DIGITS: usize = 6;
const BYTE_DIGITS: usize = 2;

/// One row of a hex dump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpRow {
    /// Address of the first byte.
    pub base: u32,
    /// Up to [`DUMP_BYTES_PER_ROW`] bytes.
    pub bytes: Vec<u8>,
}

impl fmt::Display for DumpRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut hex = String::with_capacity(HEX_COLUMN_WIDTH);
        let mut ascii = String::with_capacity(self.bytes.len());
        for &byte in &self.bytes {
            let _ = write!(hex, "{byte:02X} ");
            ascii.push(if (0x20..=0x7E).contains(&byte) {
                char::from(byte)
            } else {
                '.'
            });
        }
        write!(
            f,
            "{:06X}h:\t{hex:<width$}| {ascii}",
            self.base,
            width = HEX_COLUMN_WIDTH
        )
    }
}

/// Reads `count` bytes from `base` through the engine's data accessor.
///
/// Each row is read under its own brief lock, so a long dump never stalls
/// the scheduler for more than one row.
#[must_use]
pub fn dump<E: CoreEngine>(ctx: &ControlContext<E>, base: u32, count: u32) -> Vec<DumpRow> {
    let mut rows = Vec::new();
    let mut address = base;
    let mut remaining = count;
    while remaining > 0 {
        let len = remaining.min(DUMP_BYTES_PER_ROW);
        let core = ctx.lock();
        let bytes = (0..len)
            .map(|idx| {
                let (segment, offset) = split_data_address(address.wrapping_add(idx));
                core.engine().read_data(segment, offset, DataWidth::Byte).to_le_bytes()[0]
            })
            .collect();
        drop(core);
        rows.push(DumpRow {
            base: address,
            bytes,
        });
        address = address.wrapping_add(len);
        remaining -= len;
    }
    rows
}

/// Renders rows one per line.
#[must_use]
pub fn format_dump(rows: &[DumpRow]) -> String {
    rows.iter().fold(String::new(), |mut out, row| {
        let _ = writeln!(out, "{row}");
        out
    })
}

fn is_hex_token(token: &str, max_digits: usize) -> bool {
    (1..=max_digits).contains(&token.len()) && token.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Parses a data address of 1 to 6 hex digits.
///
/// # Errors
///
/// Returns [`DebugInputError::MalformedAddress`] for anything else.
pub fn parse_address(token: &str) -> Result<u32, DebugInputError> {
    let token = token.trim();
    if !is_hex_token(token, ADDRESS_DIGITS) {
        return Err(DebugInputError::MalformedAddress(token.to_owned()));
    }
    u32::from_str_radix(token, 16).map_err(|_| DebugInputError::MalformedAddress(token.to_owned()))
}

/// Parses `AAAAAA,NNN`: hex address, decimal byte count.
///
/// # Errors
///
/// Returns [`DebugInputError::MalformedPatchHeader`] if either half is invalid.
pub fn parse_patch_header(line: &str) -> Result<(u32, u32), DebugInputError> {
    let malformed = || DebugInputError::MalformedPatchHeader(line.trim().to_owned());
    let (address, count) = line.trim().split_once(',').ok_or_else(malformed)?;
    let address = parse_address(address).map_err(|_| malformed())?;
    let count = count.trim().parse::<u32>().map_err(|_| malformed())?;
    Ok((address, count))
}

/// Parses a byte token of 1 or 2 hex digits.
///
/// # Errors
///
/// Returns [`DebugInputError::MalformedByte`] for anything else.
pub fn parse_byte(token: &str) -> Result<u8, DebugInputError> {
    if !is_hex_token(token, BYTE_DIGITS) {
        return Err(DebugInputError::MalformedByte(token.to_owned()));
    }
    u8::from_str_radix(token, 16).map_err(|_| DebugInputError::MalformedByte(token.to_owned()))
}

/// Line-oriented operator console.
pub trait DebugConsole {
    /// Next input line without its terminator, or `None` at end of input.
    ///
    /// # Errors
    ///
    /// Returns any underlying read failure.
    fn read_line(&mut self) -> io::Result<Option<String>>;

    /// Writes `text` without a newline and flushes it.
    ///
    /// # Errors
    ///
    /// Returns any underlying write failure.
    fn prompt(&mut self, text: &str) -> io::Result<()>;

    /// Writes one line of output.
    ///
    /// # Errors
    ///
    /// Returns any underlying write failure.
    fn print(&mut self, line: &str) -> io::Result<()>;
}

/// Console over any buffered reader and writer (stdin/stdout in production).
#[derive(Debug)]
pub struct LineConsole<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> LineConsole<R, W> {
    /// Wraps a reader and a writer.
    #[must_use]
    pub const fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Returns the wrapped writer.
    #[must_use]
    pub fn into_output(self) -> W {
        self.output
    }
}

impl<R: BufRead, W: Write> DebugConsole for LineConsole<R, W> {
    fn read_line(&mut self) -> io::Result<Option<String>> {
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_owned()))
    }

    fn prompt(&mut self, text: &str) -> io::Result<()> {
        self.output.write_all(text.as_bytes())?;
        self.output.flush()
    }

    fn print(&mut self, line: &str) -> io::Result<()> {
        writeln!(self.output, "{line}")
    }
}

/// Prompts until `parse` accepts a line; malformed lines are reported and
/// re-prompted.
fn prompt_until<T, C: DebugConsole + ?Sized>(
    console: &mut C,
    prompt: &str,
    eof_remaining: u32,
    parse: impl Fn(&str) -> Result<T, DebugInputError>,
) -> Result<T, DebugInputError> {
    loop {
        console.prompt(prompt)?;
        let line = console
            .read_line()?
            .ok_or(DebugInputError::Eof {
                remaining: eof_remaining,
            })?;
        match parse(&line) {
            Ok(value) => return Ok(value),
            Err(err) => {
                warn!("{err}");
                console.print(&format!("{err}; try again"))?;
            }
        }
    }
}

/// Asks for an address and dumps [`INSPECT_LEN`] bytes from it.
///
/// # Errors
///
/// Returns [`DebugInputError::Eof`] or [`DebugInputError::Io`] if the
/// console fails; malformed addresses are re-prompted.
pub fn inspect<E: CoreEngine, C: DebugConsole + ?Sized>(
    ctx: &ControlContext<E>,
    console: &mut C,
) -> Result<Vec<DumpRow>, DebugInputError> {
    let base = prompt_until(
        console,
        "Input a 6-digit data memory address: ",
        INSPECT_LEN,
        parse_address,
    )?;
    let rows = dump(ctx, base, INSPECT_LEN);
    console.print(format_dump(&rows).trim_end())?;
    Ok(rows)
}

/// Outcome of a patch session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchReport {
    /// First patched address.
    pub base: u32,
    /// Bytes written.
    pub written: u32,
    /// Malformed tokens discarded along the way.
    pub rejected: u32,
}

/// Asks for `AAAAAA,NNN`, then patches NNN bytes; see [`patch_bytes`].
///
/// # Errors
///
/// As [`patch_bytes`]; malformed headers are re-prompted.
pub fn patch<E: CoreEngine, C: DebugConsole + ?Sized>(
    ctx: &ControlContext<E>,
    console: &mut C,
) -> Result<PatchReport, DebugInputError> {
    let (base, count) = prompt_until(
        console,
        "Input `address(6-digit HEX),size(decimal)` to patch: ",
        0,
        parse_patch_header,
    )?;
    patch_bytes(ctx, console, base, count)
}

/// Reads `count` hex byte tokens and writes each one as soon as it parses.
///
/// Tokens are whitespace separated and may span several lines. A malformed
/// token discards the rest of its line and the operator is asked to retype
/// the remaining bytes. Bytes already written stay written: a session that
/// ends early leaves a partial patch in memory.
///
/// # Errors
///
/// Returns [`DebugInputError::Eof`] with the outstanding count if input ends
/// first, or [`DebugInputError::Io`] on console failure.
pub fn patch_bytes<E: CoreEngine, C: DebugConsole + ?Sized>(
    ctx: &ControlContext<E>,
    console: &mut C,
    base: u32,
    count: u32,
) -> Result<PatchReport, DebugInputError> {
    console.print(&format!(
        "Type {count} 2-digit hexadecimals, stored from {base:06X}h:"
    ))?;
    let mut report = PatchReport {
        base,
        written: 0,
        rejected: 0,
    };
    let mut address = base;
    while report.written < count {
        let remaining = count - report.written;
        let line = console
            .read_line()?
            .ok_or(DebugInputError::Eof { remaining })?;
        for token in line.split_whitespace() {
            match parse_byte(token) {
                Ok(byte) => {
                    let (segment, offset) = split_data_address(address);
                    ctx.lock()
                        .engine_mut()
                        .write_data(segment, offset, DataWidth::Byte, u32::from(byte));
                    console.print(&format!("\t{address:06X}h <-- {byte:02X}h"))?;
                    address = address.wrapping_add(1);
                    report.written += 1;
                    if report.written == count {
                        break;
                    }
                }
                Err(err) => {
                    warn!("{err}");
                    report.rejected += 1;
                    console.print(&format!(
                        "Unable to read byte {token:?}; {} byte(s) remaining, \
                         please type them again:",
                        count - report.written
                    ))?;
                    break;
                }
            }
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::{parse_address, parse_byte, parse_patch_header, DumpRow};
    use crate::error::DebugInputError;

    #[test]
    fn dump_row_aligns_ascii_column() {
        let row = DumpRow {
            base: 0x8000,
            bytes: b"Hi\x00\x7F".to_vec(),
        };
        let text = row.to_string();
        assert!(text.starts_with("008000h:\t48 69 00 7F "));
        let (_, ascii) = text.split_once('|').expect("separator");
        assert_eq!(ascii, " Hi..");
        assert_eq!(text.find('|'), Some("008000h:\t".len() + 48));
    }

    #[rstest]
    #[case("8000", Some(0x8000))]
    #[case("00F800", Some(0xF800))]
    #[case(" 1 ", Some(1))]
    #[case("1000000", None)]
    #[case("", None)]
    #[case("80g0", None)]
    fn address_tokens(#[case] token: &str, #[case] expected: Option<u32>) {
        assert_eq!(parse_address(token).ok(), expected);
    }

    #[rstest]
    #[case("FF", Some(0xFF))]
    #[case("a", Some(0x0A))]
    #[case("100", None)]
    #[case("x1", None)]
    fn byte_tokens(#[case] token: &str, #[case] expected: Option<u8>) {
        assert_eq!(parse_byte(token).ok(), expected);
    }

    #[test]
    fn patch_header_needs_hex_address_and_decimal_count() {
        assert_eq!(parse_patch_header("008154,16").ok(), Some((0x8154, 16)));
        assert_eq!(parse_patch_header("8154, 3").ok(), Some((0x8154, 3)));
        assert!(matches!(
            parse_patch_header("8154"),
            Err(DebugInputError::MalformedPatchHeader(_))
        ));
        assert!(parse_patch_header("8154,0x10").is_err());
    }
}
