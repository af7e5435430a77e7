//! LZF block decoder.
//!
//! A stream is a sequence of control bytes. `ctrl < 32` starts a literal run
//! of `ctrl + 1` bytes. Anything else is a back reference: the top three bits
//! hold the match length minus two (7 means "add the next byte"), the low five
//! bits and the byte after the length hold the distance minus one.

use crate::error::PcdError;

const MAX_LITERAL_CTRL: u8 = 1 << 5;
const LONG_MATCH: usize = 7;
/// Most output a single input byte can produce (264-byte match in 3 bytes).
const MAX_EXPANSION: usize = 88;

/// Decompresses `input` into a buffer of exactly `decompressed_size` bytes.
#[inline(never)]
pub fn decompress_lzf(input: &[u8], decompressed_size: usize) -> Result<Vec<u8>, PcdError> {
    let mut out: Vec<u8> =
        Vec::with_capacity(decompressed_size.min(input.len().saturating_mul(MAX_EXPANSION)));
    let mut ip = 0;

    while ip < input.len() {
        let ctrl = input[ip];
        ip += 1;

        if ctrl < MAX_LITERAL_CTRL {
            let run = ctrl as usize + 1;
            if out.len() + run > decompressed_size {
                return Err(PcdError::CorruptStream(format!(
                    "literal run of {} bytes at output {} exceeds declared size {}",
                    run,
                    out.len(),
                    decompressed_size
                )));
            }
            let literal = input.get(ip..ip + run).ok_or_else(|| {
                PcdError::CorruptStream(format!(
                    "literal run of {} bytes at input {} passes the end of the block",
                    run, ip
                ))
            })?;
            out.extend_from_slice(literal);
            ip += run;
            continue;
        }

        let mut len = (ctrl >> 5) as usize;
        if len == LONG_MATCH {
            let extra = *input.get(ip).ok_or_else(|| truncated_reference(ip))?;
            len += extra as usize;
            ip += 1;
        }
        let low = *input.get(ip).ok_or_else(|| truncated_reference(ip))?;
        ip += 1;

        let distance = (((ctrl & 0x1f) as usize) << 8) + low as usize + 1;
        let copy_len = len + 2;
        if out.len() + copy_len > decompressed_size {
            return Err(PcdError::CorruptStream(format!(
                "back reference of {} bytes at output {} exceeds declared size {}",
                copy_len,
                out.len(),
                decompressed_size
            )));
        }
        if distance > out.len() {
            return Err(PcdError::CorruptStream(format!(
                "back reference distance {} reaches before the start of the output ({} bytes produced)",
                distance,
                out.len()
            )));
        }

        let start = out.len() - distance;
        if distance >= copy_len {
            out.extend_from_within(start..start + copy_len);
        } else {
            // Overlapping match: the source grows while it is copied.
            for i in start..start + copy_len {
                let b = out[i];
                out.push(b);
            }
        }
    }

    if out.len() != decompressed_size {
        return Err(PcdError::Decompression(format!(
            "stream ended after {} of {} bytes",
            out.len(),
            decompressed_size
        )));
    }
    Ok(out)
}

#[inline]
fn truncated_reference(ip: usize) -> PcdError {
    PcdError::CorruptStream(format!("back reference truncated at input {}", ip))
}
