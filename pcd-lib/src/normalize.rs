use crate::common::wrap_u8;
use crate::structures::{
    BoundingBox, MeshAttribute, MeshAttributes, MeshHeader, PcdHeader, RawAttributes,
};

/// Wraps the raw lists into the fixed attribute schema.
///
/// `COLOR_0` comes from the first non-empty source among color, intensity
/// and label. Single-channel sources are replicated into all three channels.
pub fn mesh_attributes(raw: RawAttributes) -> MeshAttributes {
    let color = if !raw.color.is_empty() {
        Some(raw.color.iter().map(|&c| wrap_u8(c as f64)).collect())
    } else if !raw.intensity.is_empty() {
        Some(grey(raw.intensity.iter().map(|&v| v as f64)))
    } else if !raw.label.is_empty() {
        Some(grey(raw.label.iter().map(|&v| v as f64)))
    } else {
        None
    };

    MeshAttributes {
        position: MeshAttribute {
            value: raw.position,
            size: 3,
        },
        normal: (!raw.normal.is_empty()).then(|| MeshAttribute {
            value: raw.normal,
            size: 3,
        }),
        color: color.map(|value| MeshAttribute { value, size: 3 }),
    }
}

fn grey(values: impl Iterator<Item = f64>) -> Vec<u8> {
    values.flat_map(|v| [wrap_u8(v); 3]).collect()
}

/// Per-axis extents of the position triples. NaN components never replace a
/// bound; no positions leave the box inverted at infinity.
pub fn bounding_box(position: &[f32]) -> BoundingBox {
    let mut min = [f32::INFINITY; 3];
    let mut max = [f32::NEG_INFINITY; 3];
    for p in position.chunks_exact(3) {
        for axis in 0..3 {
            let v = p[axis];
            if v < min[axis] {
                min[axis] = v;
            }
            if v > max[axis] {
                max[axis] = v;
            }
        }
    }
    [min, max]
}

/// Point count from the header (WIDTH × HEIGHT already folded in), else the
/// number of decoded positions.
pub fn mesh_header(header: &PcdHeader, attributes: &MeshAttributes) -> MeshHeader {
    let position = &attributes.position.value;
    MeshHeader {
        vertex_count: header.points.unwrap_or(position.len() / 3),
        bounding_box: bounding_box(position),
    }
}
