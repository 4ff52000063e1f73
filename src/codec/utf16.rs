// One UTF-16 code unit carried as UTF-8 text.

use crate::codec::Cursor;
use crate::error::DecodeError;

pub const REPLACEMENT: u16 = 0xFFFD;

fn is_continuation(b: u8) -> bool {
    b & 0xC0 == 0x80
}

fn continuation(cur: &mut Cursor<'_>) -> Result<Option<u16>, DecodeError> {
    let b = cur.next_byte().ok_or(DecodeError::UnexpectedEnd)?;
    Ok(is_continuation(b).then_some(u16::from(b & 0x3F)))
}

/// Read one UTF-8 sequence and return the code unit it stands for.
///
/// Malformed sequences yield `0xFFFD`; a bad continuation byte is consumed.
/// Four-byte sequences do not fit in one unit and also yield `0xFFFD`.
pub fn decode_unit(cur: &mut Cursor<'_>) -> Result<u16, DecodeError> {
    let lead = cur.next_byte().ok_or(DecodeError::UnexpectedEnd)?;
    match lead {
        0x00..=0x7F => Ok(u16::from(lead)),
        0x80..=0xC1 => Ok(REPLACEMENT),
        0xC2..=0xDF => {
            let Some(b1) = continuation(cur)? else { return Ok(REPLACEMENT) };
            Ok((u16::from(lead & 0x1F) << 6) | b1)
        }
        0xE0..=0xEF => {
            let Some(b1) = continuation(cur)? else { return Ok(REPLACEMENT) };
            let Some(b2) = continuation(cur)? else { return Ok(REPLACEMENT) };
            let unit = (u16::from(lead & 0x0F) << 12) | (b1 << 6) | b2;
            Ok(if unit < 0x800 { REPLACEMENT } else { unit })
        }
        0xF0..=0xF7 => {
            for _ in 0..3 {
                if continuation(cur)?.is_none() {
                    break;
                }
            }
            Ok(REPLACEMENT)
        }
        _ => Ok(REPLACEMENT),
    }
}

/// Write `unit` as 1 to 3 UTF-8 bytes (surrogates are written as-is).
pub fn encode_unit(unit: u16, out: &mut Vec<u8>) {
    match unit {
        0x0000..=0x007F => out.push(unit as u8),
        0x0080..=0x07FF => {
            out.push(0xC0 | (unit >> 6) as u8);
            out.push(0x80 | (unit & 0x3F) as u8);
        }
        _ => {
            out.push(0xE0 | (unit >> 12) as u8);
            out.push(0x80 | ((unit >> 6) & 0x3F) as u8);
            out.push(0x80 | (unit & 0x3F) as u8);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(bytes: &[u8]) -> Result<(u16, usize), DecodeError> {
        let mut cur = Cursor::new(bytes);
        let unit = decode_unit(&mut cur)?;
        Ok((unit, cur.position()))
    }

    #[test]
    fn valid_sequences() {
        assert_eq!(decode(b"A").unwrap(), (0x41, 1));
        assert_eq!(decode("é".as_bytes()).unwrap(), (0xE9, 2));
        assert_eq!(decode("€".as_bytes()).unwrap(), (0x20AC, 3));
        assert_eq!(decode("中x".as_bytes()).unwrap(), (0x4E2D, 3));
    }

    #[test]
    fn malformed_sequences() {
        // Lone continuation byte.
        assert_eq!(decode(&[0x80]).unwrap(), (REPLACEMENT, 1));
        // Overlong two-byte lead.
        assert_eq!(decode(&[0xC0, 0xAF]).unwrap(), (REPLACEMENT, 1));
        // Bad continuation is consumed.
        assert_eq!(decode(&[0xC3, 0x41]).unwrap(), (REPLACEMENT, 2));
        assert_eq!(decode(&[0xE2, 0x82, 0x41]).unwrap(), (REPLACEMENT, 3));
        // Overlong three-byte form of '/'.
        assert_eq!(decode(&[0xE0, 0x80, 0xAF]).unwrap(), (REPLACEMENT, 3));
        // Four-byte sequence does not fit.
        assert_eq!(decode("😀".as_bytes()).unwrap(), (REPLACEMENT, 4));
        assert_eq!(decode(&[0xF8]).unwrap(), (REPLACEMENT, 1));
        // Four-byte lead cut short: stops after the first bad byte.
        assert_eq!(decode(b"\xF0abcd").unwrap(), (REPLACEMENT, 2));
        assert_eq!(decode(b"\xF0\x9Fab").unwrap(), (REPLACEMENT, 3));
    }

    #[test]
    fn truncated_sequences_fail() {
        assert_eq!(decode(&[]), Err(DecodeError::UnexpectedEnd));
        assert_eq!(decode(&[0xE2, 0x82]), Err(DecodeError::UnexpectedEnd));
        assert_eq!(decode(&[0xF0, 0x9F]), Err(DecodeError::UnexpectedEnd));
    }

    #[test]
    fn units_after_a_short_four_byte_lead_survive() {
        let mut cur = Cursor::new(b"\xF0abcd");
        let units: Vec<u16> = std::iter::from_fn(|| decode_unit(&mut cur).ok()).collect();
        assert_eq!(units, vec![REPLACEMENT, 0x62, 0x63, 0x64]);
    }

    #[test]
    fn encode_matches_std() {
        for unit in [0x41u16, 0xE9, 0x7FF, 0x800, 0x20AC, 0xFFFD] {
            let mut out = Vec::new();
            encode_unit(unit, &mut out);
            let c = char::from_u32(u32::from(unit)).unwrap();
            assert_eq!(out, c.to_string().into_bytes());
            assert_eq!(decode(&out).unwrap().0, unit);
        }
    }
}
