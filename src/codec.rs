//! Text and binary forms of schema values.
//!
//! - `text`: delimited text chunk ⇄ `Value`, per schema node
//! - `binary`: fixed-width little-endian form of flat values and keys
//! - `num`, `utf16`: primitive token rules shared by both

pub mod binary;
pub mod num;
pub mod text;
pub mod utf16;

pub use text::{decode, encode};

/// Byte cursor over one text chunk.
#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn rest(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    pub fn only_whitespace_left(&self) -> bool {
        self.rest().iter().all(u8::is_ascii_whitespace)
    }

    pub fn peek(&self) -> Option<u8> {
        self.buf.get(self.pos).copied()
    }

    pub fn next_byte(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    pub fn advance(&mut self, n: usize) {
        self.pos = (self.pos + n).min(self.buf.len());
    }

    pub fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(|b| b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    pub fn position(&self) -> usize {
        self.pos
    }
}
