use crate::common::{ByteOrder, PCD_BYTE_ORDER};
use foldhash::HashMap;
use serde::Serialize;
use std::collections::BTreeMap;

pub const LOADER_ID: &str = "pcd";
pub const POINT_LIST_MODE: u32 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Encoding {
    Ascii,
    Binary,
    BinaryCompressed,
}

impl Encoding {
    pub fn from_tag(tag: &str) -> Option<Self> {
        if tag.eq_ignore_ascii_case("ascii") {
            Some(Encoding::Ascii)
        } else if tag.eq_ignore_ascii_case("binary") {
            Some(Encoding::Binary)
        } else if tag.eq_ignore_ascii_case("binary_compressed") {
            Some(Encoding::BinaryCompressed)
        } else {
            None
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Encoding::Ascii => "ascii",
            Encoding::Binary => "binary",
            Encoding::BinaryCompressed => "binary_compressed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum FieldType {
    Float,
    Signed,
    Unsigned,
    Other(String),
}

impl FieldType {
    pub fn from_token(token: &str) -> Self {
        match token {
            "F" | "f" => FieldType::Float,
            "I" | "i" => FieldType::Signed,
            "U" | "u" => FieldType::Unsigned,
            other => FieldType::Other(other.to_string()),
        }
    }
}

/// Acquisition viewpoint: translation followed by an orientation quaternion
/// (w, x, y, z).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Viewpoint {
    pub translation: [f64; 3],
    pub rotation: [f64; 4],
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum HeaderPolicy {
    /// Accept FIELDS/SIZE/TYPE/COUNT length mismatches; fields without a
    /// declared size get no binary offset.
    #[default]
    Lenient,
    /// Reject headers whose per-field lists disagree in length.
    Strict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DecodeOptions {
    pub byte_order: ByteOrder,
    pub header_policy: HeaderPolicy,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        DecodeOptions {
            byte_order: PCD_BYTE_ORDER,
            header_policy: HeaderPolicy::Lenient,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PcdHeader {
    pub data: Encoding,
    /// Byte offset of the first payload byte.
    pub header_len: usize,
    /// Header block up to and including the DATA line, comments removed.
    pub text: String,
    pub version: Option<f64>,
    pub fields: Vec<String>,
    pub size: Vec<usize>,
    pub field_type: Vec<FieldType>,
    pub count: Vec<usize>,
    pub width: Option<usize>,
    pub height: Option<usize>,
    pub viewpoint: Option<String>,
    pub points: Option<usize>,
    /// Byte offset within a row (binary encodings) or column index (ascii).
    pub offset: HashMap<String, usize>,
    /// Sum of the field sizes; 0 for ascii.
    pub row_size: usize,
}

impl PcdHeader {
    #[inline]
    pub fn offset_of(&self, field: &str) -> Option<usize> {
        self.offset.get(field).copied()
    }

    /// Declared byte size of `field`.
    pub fn size_of(&self, field: &str) -> Option<usize> {
        self.fields
            .iter()
            .position(|f| f == field)
            .and_then(|i| self.size.get(i).copied())
    }

    pub fn viewpoint_pose(&self) -> Option<Viewpoint> {
        let values: Vec<f64> = self
            .viewpoint
            .as_deref()?
            .split_whitespace()
            .map(|v| v.parse::<f64>())
            .collect::<Result<_, _>>()
            .ok()?;
        match values[..] {
            [tx, ty, tz, qw, qx, qy, qz] => Some(Viewpoint {
                translation: [tx, ty, tz],
                rotation: [qw, qx, qy, qz],
            }),
            _ => None,
        }
    }
}

/// Per-attribute numeric lists filled by one payload decoder.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RawAttributes {
    pub position: Vec<f32>,
    pub normal: Vec<f32>,
    pub color: Vec<f32>,
    pub intensity: Vec<f32>,
    pub label: Vec<i32>,
}

impl RawAttributes {
    pub(crate) fn with_capacity(points: usize) -> Self {
        RawAttributes {
            position: Vec::with_capacity(points.saturating_mul(3)),
            normal: Vec::new(),
            color: Vec::new(),
            intensity: Vec::new(),
            label: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeshAttribute<T> {
    pub value: Vec<T>,
    pub size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeshAttributes {
    #[serde(rename = "POSITION")]
    pub position: MeshAttribute<f32>,
    #[serde(rename = "NORMAL", skip_serializing_if = "Option::is_none")]
    pub normal: Option<MeshAttribute<f32>>,
    #[serde(rename = "COLOR_0", skip_serializing_if = "Option::is_none")]
    pub color: Option<MeshAttribute<u8>>,
}

/// `[min, max]` corners.
pub type BoundingBox = [[f32; 3]; 2];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeshHeader {
    pub vertex_count: usize,
    pub bounding_box: BoundingBox,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarType {
    Float32,
    Uint8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaField {
    pub name: String,
    pub list_size: usize,
    pub child_name: String,
    pub child_type: ScalarType,
    pub nullable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Schema {
    pub fields: Vec<SchemaField>,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Topology {
    #[serde(rename = "point-list")]
    PointList,
}

impl Topology {
    pub fn as_str(self) -> &'static str {
        match self {
            Topology::PointList => "point-list",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PcdMesh {
    pub loader: &'static str,
    pub loader_data: PcdHeader,
    pub header: MeshHeader,
    pub schema: Schema,
    pub topology: Topology,
    pub mode: u32,
    pub attributes: MeshAttributes,
}
