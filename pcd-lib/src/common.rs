use crate::error::PcdError;
use serde::Serialize;

/// Byte order of every multi-byte value in a PCD payload.
pub const PCD_BYTE_ORDER: ByteOrder = ByteOrder::Little;

/// Size of the `compressed_size` / `decompressed_size` prefix of a
/// `binary_compressed` payload.
pub const COMPRESSED_PREFIX_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    #[inline]
    pub(crate) fn read_f32(self, data: &[u8], offset: usize) -> Result<f32, PcdError> {
        let bytes = read_array::<4>(data, offset)?;
        Ok(match self {
            ByteOrder::Little => f32::from_le_bytes(bytes),
            ByteOrder::Big => f32::from_be_bytes(bytes),
        })
    }

    #[inline]
    pub(crate) fn read_i32(self, data: &[u8], offset: usize) -> Result<i32, PcdError> {
        let bytes = read_array::<4>(data, offset)?;
        Ok(match self {
            ByteOrder::Little => i32::from_le_bytes(bytes),
            ByteOrder::Big => i32::from_be_bytes(bytes),
        })
    }

    #[inline]
    pub(crate) fn read_u32(self, data: &[u8], offset: usize) -> Result<u32, PcdError> {
        let bytes = read_array::<4>(data, offset)?;
        Ok(match self {
            ByteOrder::Little => u32::from_le_bytes(bytes),
            ByteOrder::Big => u32::from_be_bytes(bytes),
        })
    }

    /// Memory image of `value` as it would sit in a payload of this byte order.
    #[inline]
    pub(crate) fn f32_bytes(self, value: f32) -> [u8; 4] {
        match self {
            ByteOrder::Little => value.to_le_bytes(),
            ByteOrder::Big => value.to_be_bytes(),
        }
    }
}

#[inline]
pub(crate) fn byte_slice(data: &[u8], offset: usize, len: usize) -> Result<&[u8], PcdError> {
    offset
        .checked_add(len)
        .and_then(|end| data.get(offset..end))
        .ok_or(PcdError::OutOfBounds {
            offset,
            len,
            available: data.len(),
        })
}

#[inline(always)]
pub(crate) fn read_array<const N: usize>(data: &[u8], offset: usize) -> Result<[u8; N], PcdError> {
    let bytes = byte_slice(data, offset, N)?;
    let mut out = [0u8; N];
    out.copy_from_slice(bytes);
    Ok(out)
}

#[inline]
pub(crate) fn read_u8(data: &[u8], offset: usize) -> Result<u8, PcdError> {
    data.get(offset).copied().ok_or(PcdError::OutOfBounds {
        offset,
        len: 1,
        available: data.len(),
    })
}

#[inline]
pub(crate) fn next_line<'b>(buffer: &'b [u8], offset: &mut usize) -> Option<&'b [u8]> {
    if *offset >= buffer.len() {
        return None;
    }
    let start = *offset;

    match memchr::memchr(b'\n', &buffer[*offset..]) {
        Some(pos) => {
            *offset = start + pos + 1;
            Some(&buffer[start..start + pos])
        }
        None => {
            *offset = buffer.len();
            Some(&buffer[start..])
        }
    }
}

/// Length of the longest prefix of `s` that reads as a decimal literal
/// (sign, digits, fraction, exponent), or 0 when there is none.
fn decimal_prefix_len(s: &[u8]) -> usize {
    let digits_from = |mut i: usize| {
        while i < s.len() && s[i].is_ascii_digit() {
            i += 1;
        }
        i
    };

    let sign = usize::from(matches!(s.first(), Some(b'+') | Some(b'-')));
    let int_end = digits_from(sign);
    let mut end = int_end;
    let mut mantissa_digits = int_end - sign;

    if s.get(end) == Some(&b'.') {
        let frac_end = digits_from(end + 1);
        mantissa_digits += frac_end - (end + 1);
        end = frac_end;
    }
    if mantissa_digits == 0 {
        return 0;
    }

    if matches!(s.get(end), Some(b'e') | Some(b'E')) {
        let exp_sign = usize::from(matches!(s.get(end + 1), Some(b'+') | Some(b'-')));
        let exp_end = digits_from(end + 1 + exp_sign);
        if exp_end > end + 1 + exp_sign {
            end = exp_end;
        }
    }
    end
}

/// Reads a number the way a lenient text reader does: leading whitespace is
/// skipped, the longest numeric prefix is used and anything else yields NaN.
pub(crate) fn parse_float_prefix(token: &str) -> f64 {
    let s = token.trim_start();
    let unsigned = s.strip_prefix(['+', '-']).unwrap_or(s);
    if unsigned.starts_with("Infinity") {
        return if s.starts_with('-') {
            f64::NEG_INFINITY
        } else {
            f64::INFINITY
        };
    }

    match decimal_prefix_len(s.as_bytes()) {
        0 => f64::NAN,
        end => s[..end].parse().unwrap_or(f64::NAN),
    }
}

/// Integer counterpart of [`parse_float_prefix`]: `"12px"` reads as 12,
/// `"px"` as `None`.
pub(crate) fn parse_int_prefix(token: &str) -> Option<i64> {
    let s = token.trim_start();
    let bytes = s.as_bytes();
    let sign = usize::from(matches!(bytes.first(), Some(b'+') | Some(b'-')));
    let end = sign
        + bytes[sign..]
            .iter()
            .take_while(|b| b.is_ascii_digit())
            .count();
    if end == sign {
        return None;
    }
    s[..end].parse().ok()
}

/// Numeric to `u8` conversion with typed-array semantics: truncate toward
/// zero, wrap modulo 256, non-finite values become 0.
#[inline]
pub(crate) fn wrap_u8(x: f64) -> u8 {
    if !x.is_finite() {
        return 0;
    }
    (x.trunc() % 256.0).rem_euclid(256.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_float_prefix() {
        assert_eq!(parse_float_prefix("1.5"), 1.5);
        assert_eq!(parse_float_prefix("  -2e3"), -2000.0);
        assert_eq!(parse_float_prefix("3.25\r"), 3.25);
        assert_eq!(parse_float_prefix(".5"), 0.5);
        assert_eq!(parse_float_prefix("7."), 7.0);
        assert_eq!(parse_float_prefix("4e"), 4.0);
        assert_eq!(parse_float_prefix("-Infinity"), f64::NEG_INFINITY);
        assert!(parse_float_prefix("").is_nan());
        assert!(parse_float_prefix("abc").is_nan());
        assert!(parse_float_prefix("-.").is_nan());
    }

    #[test]
    fn test_parse_int_prefix() {
        assert_eq!(parse_int_prefix("4"), Some(4));
        assert_eq!(parse_int_prefix(" 12abc"), Some(12));
        assert_eq!(parse_int_prefix("-3"), Some(-3));
        assert_eq!(parse_int_prefix("1.9"), Some(1));
        assert_eq!(parse_int_prefix("x1"), None);
        assert_eq!(parse_int_prefix("-"), None);
    }

    #[test]
    fn test_wrap_u8() {
        assert_eq!(wrap_u8(12.9), 12);
        assert_eq!(wrap_u8(256.0), 0);
        assert_eq!(wrap_u8(300.0), 44);
        assert_eq!(wrap_u8(-1.0), 255);
        assert_eq!(wrap_u8(f64::NAN), 0);
        assert_eq!(wrap_u8(f64::INFINITY), 0);
        assert_eq!(wrap_u8(0.5), 0);
    }

    #[test]
    fn test_reads_are_bounds_checked() {
        let data = [0u8, 0, 128, 63, 7];
        assert_eq!(PCD_BYTE_ORDER.read_f32(&data, 0).unwrap(), 1.0);
        assert_eq!(read_u8(&data, 4).unwrap(), 7);
        assert!(matches!(
            PCD_BYTE_ORDER.read_f32(&data, 2),
            Err(PcdError::OutOfBounds {
                offset: 2,
                len: 4,
                available: 5
            })
        ));
        assert!(matches!(
            byte_slice(&data, usize::MAX, 2),
            Err(PcdError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_next_line() {
        let buf = b"a b\n\nc";
        let mut offset = 0;
        assert_eq!(next_line(buf, &mut offset), Some(&b"a b"[..]));
        assert_eq!(next_line(buf, &mut offset), Some(&b""[..]));
        assert_eq!(next_line(buf, &mut offset), Some(&b"c"[..]));
        assert_eq!(next_line(buf, &mut offset), None);
    }
}
