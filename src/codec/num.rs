// Numeric tokens in text: integer/float scanning and %g-style float output.

use crate::codec::Cursor;
use crate::error::DecodeError;

fn bad(code: char, token: &[u8]) -> DecodeError {
    DecodeError::BadNumber {
        code,
        token: String::from_utf8_lossy(token).into_owned(),
    }
}

/// Skip whitespace, then read `[sign]digits` and check it fits `min..=max`.
/// `signed = false` rejects a leading `-`.
pub fn read_integer(
    cur: &mut Cursor<'_>,
    code: char,
    signed: bool,
    min: i128,
    max: i128,
) -> Result<i128, DecodeError> {
    cur.skip_whitespace();
    let rest = cur.rest();
    let mut len = 0;
    if matches!(rest.first(), Some(b'+') | Some(b'-')) {
        if rest[0] == b'-' && !signed {
            return Err(bad(code, &rest[..1]));
        }
        len = 1;
    }
    let digits = rest[len..].iter().take_while(|b| b.is_ascii_digit()).count();
    if digits == 0 {
        return Err(if rest.is_empty() {
            DecodeError::UnexpectedEnd
        } else {
            bad(code, &rest[..(len + 1).min(rest.len())])
        });
    }
    len += digits;
    let token = &rest[..len];

    let text = std::str::from_utf8(token).map_err(|_| bad(code, token))?;
    let value: i128 = text.parse().map_err(|_| bad(code, token))?;
    if value < min || value > max {
        return Err(bad(code, token));
    }
    cur.advance(len);
    Ok(value)
}

/// Skip whitespace and return the longest float token at the cursor:
/// `[sign] digits [. digits] [e [sign] digits]` or `inf`/`infinity`/`nan`.
pub fn scan_float<'a>(cur: &mut Cursor<'a>, code: char) -> Result<&'a str, DecodeError> {
    cur.skip_whitespace();
    let rest = cur.rest();
    if rest.is_empty() {
        return Err(DecodeError::UnexpectedEnd);
    }
    let mut len = usize::from(matches!(rest[0], b'+' | b'-'));

    let word_len = ["infinity", "inf", "nan"].iter().find_map(|word| {
        let end = len + word.len();
        (rest.len() >= end && rest[len..end].eq_ignore_ascii_case(word.as_bytes())).then_some(end)
    });

    if let Some(end) = word_len {
        len = end;
    } else {
        let int_digits = count_digits(&rest[len..]);
        len += int_digits;
        let mut frac_digits = 0;
        if rest.get(len) == Some(&b'.') {
            frac_digits = count_digits(&rest[len + 1..]);
            if int_digits + frac_digits > 0 {
                len += 1 + frac_digits;
            }
        }
        if int_digits + frac_digits == 0 {
            return Err(bad(code, &rest[..(len + 1).min(rest.len())]));
        }
        if matches!(rest.get(len), Some(b'e') | Some(b'E')) {
            let mut exp = len + 1;
            if matches!(rest.get(exp), Some(b'+') | Some(b'-')) {
                exp += 1;
            }
            let exp_digits = count_digits(&rest[exp.min(rest.len())..]);
            if exp_digits > 0 {
                len = exp + exp_digits;
            }
        }
    }

    let token = &rest[..len];
    let text = std::str::from_utf8(token).map_err(|_| bad(code, token))?;
    cur.advance(len);
    Ok(text)
}

fn count_digits(bytes: &[u8]) -> usize {
    bytes.iter().take_while(|b| b.is_ascii_digit()).count()
}

fn is_infinity_word(token: &str) -> bool {
    let t = token.trim_start_matches(['+', '-']);
    t.eq_ignore_ascii_case("inf") || t.eq_ignore_ascii_case("infinity")
}

pub fn read_f32(cur: &mut Cursor<'_>) -> Result<f32, DecodeError> {
    let token = scan_float(cur, 'f')?;
    let v: f32 = token.parse().map_err(|_| bad('f', token.as_bytes()))?;
    // Finite text that overflows is out of range, not infinity.
    if v.is_infinite() && !is_infinity_word(token) {
        return Err(bad('f', token.as_bytes()));
    }
    Ok(v)
}

pub fn read_f64(cur: &mut Cursor<'_>) -> Result<f64, DecodeError> {
    let token = scan_float(cur, 'd')?;
    let v: f64 = token.parse().map_err(|_| bad('d', token.as_bytes()))?;
    if v.is_infinite() && !is_infinity_word(token) {
        return Err(bad('d', token.as_bytes()));
    }
    Ok(v)
}

/// Significant digits written for `f` and `d`.
pub const F32_PRECISION: usize = 9;
pub const F64_PRECISION: usize = 17;

/// `%.{precision}g`, spelled the way C prints it.
pub fn format_g(v: f64, precision: usize) -> String {
    let p = precision.max(1);
    if v.is_nan() {
        return "nan".to_string();
    }
    if v.is_infinite() {
        return if v < 0.0 { "-inf" } else { "inf" }.to_string();
    }
    if v == 0.0 {
        return if v.is_sign_negative() { "-0" } else { "0" }.to_string();
    }

    let sci = format!("{:.*e}", p - 1, v);
    let (mantissa, exp) = match sci.split_once('e') {
        Some(parts) => parts,
        None => return sci,
    };
    let x: i32 = exp.parse().unwrap_or(0);

    if x < -4 || x >= p as i32 {
        let mantissa = trim_fraction(mantissa);
        let sign = if x < 0 { '-' } else { '+' };
        format!("{mantissa}e{sign}{:02}", x.unsigned_abs())
    } else {
        let decimals = (p as i32 - 1 - x).max(0) as usize;
        trim_fraction(&format!("{v:.decimals$}")).to_string()
    }
}

fn trim_fraction(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}
