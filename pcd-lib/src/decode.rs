use crate::common::{
    byte_slice, next_line, parse_float_prefix, parse_int_prefix, read_u8, ByteOrder,
    COMPRESSED_PREFIX_LEN,
};
use crate::error::PcdError;
use crate::lzf::decompress_lzf;
use crate::structures::{PcdHeader, RawAttributes};

const POSITION_FIELDS: [&str; 3] = ["x", "y", "z"];
const NORMAL_FIELDS: [&str; 3] = ["normal_x", "normal_y", "normal_z"];

/// Where the value of a field for a given point lives in a binary payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Layout {
    /// One packed row of `stride` bytes per point.
    RowMajor { stride: usize },
    /// One contiguous run per field, `points` values long.
    Columnar { points: usize },
}

/// Location of one field inside the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FieldSlot {
    pub offset: usize,
    pub size: usize,
}

impl Layout {
    #[inline(always)]
    pub(crate) fn locate(self, slot: FieldSlot, point: usize) -> usize {
        match self {
            // Saturated offsets fail the bounds check instead of wrapping.
            Layout::RowMajor { stride } => point.saturating_mul(stride).saturating_add(slot.offset),
            Layout::Columnar { points } => points
                .saturating_mul(slot.offset)
                .saturating_add(slot.size.saturating_mul(point)),
        }
    }
}

/// Scale applied to color channel bytes by the binary decoders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ColorScale {
    Raw,
    Unit,
}

impl ColorScale {
    #[inline(always)]
    fn apply(self, channel: u8) -> f32 {
        match self {
            ColorScale::Raw => channel as f32,
            ColorScale::Unit => channel as f32 / 255.0,
        }
    }
}

fn slot(header: &PcdHeader, field: &str) -> Option<FieldSlot> {
    let offset = header.offset_of(field)?;
    let size = header.size_of(field).unwrap_or(0);
    Some(FieldSlot { offset, size })
}

/// A three-component group is read when its first field is declared; a
/// missing sibling reads as NaN.
fn slot_group(header: &PcdHeader, fields: [&str; 3]) -> Option<[Option<FieldSlot>; 3]> {
    slot(header, fields[0])?;
    Some(fields.map(|name| slot(header, name)))
}

#[inline(always)]
fn read_component(
    data: &[u8],
    slot: Option<FieldSlot>,
    layout: Layout,
    point: usize,
    byte_order: ByteOrder,
) -> Result<f32, PcdError> {
    match slot {
        Some(s) => byte_order.read_f32(data, layout.locate(s, point)),
        None => Ok(f32::NAN),
    }
}

/// Reads the fields known to the attribute set out of a binary payload.
fn decode_packed(
    data: &[u8],
    header: &PcdHeader,
    layout: Layout,
    colors: ColorScale,
    byte_order: ByteOrder,
) -> Result<RawAttributes, PcdError> {
    let points = header.points.unwrap_or(0);
    let position = slot_group(header, POSITION_FIELDS);
    let normal = slot_group(header, NORMAL_FIELDS);
    let rgb = slot(header, "rgb");
    let intensity = slot(header, "intensity");
    let label = slot(header, "label");

    let mut attrs = RawAttributes::with_capacity(if position.is_some() {
        points.min(data.len())
    } else {
        0
    });
    if position.is_none()
        && normal.is_none()
        && rgb.is_none()
        && intensity.is_none()
        && label.is_none()
    {
        return Ok(attrs);
    }

    for i in 0..points {
        if let Some(slots) = position {
            for s in slots {
                attrs
                    .position
                    .push(read_component(data, s, layout, i, byte_order)?);
            }
        }

        if let Some(s) = rgb {
            let at = layout.locate(s, i);
            for channel in 0..3 {
                attrs
                    .color
                    .push(colors.apply(read_u8(data, at.saturating_add(channel))?));
            }
        }

        if let Some(slots) = normal {
            for s in slots {
                attrs
                    .normal
                    .push(read_component(data, s, layout, i, byte_order)?);
            }
        }

        if let Some(s) = intensity {
            attrs
                .intensity
                .push(byte_order.read_f32(data, layout.locate(s, i))?);
        }

        if let Some(s) = label {
            attrs
                .label
                .push(byte_order.read_i32(data, layout.locate(s, i))?);
        }
    }

    Ok(attrs)
}

/// Whitespace-separated rows, one point per non-empty row.
#[inline(never)]
pub(crate) fn decode_ascii(
    raw: &[u8],
    header: &PcdHeader,
    byte_order: ByteOrder,
) -> Result<RawAttributes, PcdError> {
    let payload = raw.get(header.header_len..).unwrap_or_default();
    let column = |name: &str| header.offset_of(name);
    let group = |names: [&str; 3]| column(names[0]).map(|_| names.map(column));

    let position = group(POSITION_FIELDS);
    let normal = group(NORMAL_FIELDS);
    let rgb = column("rgb");
    let intensity = column("intensity");
    let label = column("label");

    let mut attrs = RawAttributes::with_capacity(if position.is_some() {
        header.points.unwrap_or(0).min(payload.len())
    } else {
        0
    });
    let mut offset = 0;
    while let Some(line) = next_line(payload, &mut offset) {
        let text = String::from_utf8_lossy(line);
        let line = text.strip_suffix('\r').unwrap_or(&text);
        if line.is_empty() {
            continue;
        }

        let tokens: Vec<&str> = line.split(' ').collect();
        let float_at = |col: Option<usize>| {
            col.and_then(|c| tokens.get(c))
                .map_or(f64::NAN, |t| parse_float_prefix(t))
        };

        if let Some(cols) = position {
            for col in cols {
                attrs.position.push(float_at(col) as f32);
            }
        }

        if let Some(col) = rgb {
            // Packed color: the float's memory image holds the channel bytes.
            let packed = byte_order.f32_bytes(float_at(Some(col)) as f32);
            attrs
                .color
                .extend(packed[..3].iter().map(|&channel| channel as f32));
        }

        if let Some(cols) = normal {
            for col in cols {
                attrs.normal.push(float_at(col) as f32);
            }
        }

        if let Some(col) = intensity {
            attrs.intensity.push(float_at(Some(col)) as f32);
        }

        if let Some(col) = label {
            let value = tokens
                .get(col)
                .and_then(|t| parse_int_prefix(t))
                .and_then(|v| i32::try_from(v).ok())
                .unwrap_or(0);
            attrs.label.push(value);
        }
    }

    Ok(attrs)
}

/// Row-major packed payload directly after the header.
#[inline(never)]
pub(crate) fn decode_binary(
    raw: &[u8],
    header: &PcdHeader,
    byte_order: ByteOrder,
) -> Result<RawAttributes, PcdError> {
    let payload = raw.get(header.header_len..).unwrap_or_default();
    decode_packed(
        payload,
        header,
        Layout::RowMajor {
            stride: header.row_size,
        },
        ColorScale::Raw,
        byte_order,
    )
}

/// LZF block prefixed by its compressed and decompressed sizes, holding a
/// columnar payload.
#[inline(never)]
pub(crate) fn decode_binary_compressed(
    raw: &[u8],
    header: &PcdHeader,
    byte_order: ByteOrder,
) -> Result<RawAttributes, PcdError> {
    let start = header.header_len;
    let compressed_size = byte_order.read_u32(raw, start)? as usize;
    let decompressed_size = byte_order.read_u32(raw, start + 4)? as usize;
    tracing::trace!(compressed_size, decompressed_size, "LZF block");

    let block = byte_slice(raw, start + COMPRESSED_PREFIX_LEN, compressed_size)?;
    let decompressed = decompress_lzf(block, decompressed_size)?;

    decode_packed(
        &decompressed,
        header,
        Layout::Columnar {
            points: header.points.unwrap_or(0),
        },
        ColorScale::Unit,
        byte_order,
    )
}
