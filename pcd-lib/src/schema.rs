use crate::error::PcdError;
use crate::structures::{
    MeshHeader, PcdHeader, ScalarType, Schema, SchemaField, Topology, POINT_LIST_MODE,
};
use std::collections::BTreeMap;

fn vector_field(name: &str, child_name: &str, child_type: ScalarType) -> SchemaField {
    SchemaField {
        name: name.to_string(),
        list_size: 3,
        child_name: child_name.to_string(),
        child_type,
        nullable: false,
    }
}

/// Key/value metadata attached to every decoded cloud.
pub fn schema_metadata(header: &MeshHeader) -> Result<BTreeMap<String, String>, PcdError> {
    let bounding_box = serde_json::to_string(&header.bounding_box)
        .map_err(|e| PcdError::SerializeMetadata(e.to_string()))?;
    Ok(BTreeMap::from([
        ("topology".to_string(), Topology::PointList.as_str().to_string()),
        ("mode".to_string(), POINT_LIST_MODE.to_string()),
        ("boundingBox".to_string(), bounding_box),
    ]))
}

/// Columns a renderer can expect, derived from the declared fields.
pub fn pcd_schema(header: &PcdHeader, metadata: BTreeMap<String, String>) -> Schema {
    let mut fields = Vec::new();
    if header.offset_of("x").is_some() {
        fields.push(vector_field("POSITION", "xyz", ScalarType::Float32));
    }
    if header.offset_of("normal_x").is_some() {
        fields.push(vector_field("NORMAL", "xyz", ScalarType::Float32));
    }
    if header.offset_of("rgb").is_some() {
        fields.push(vector_field("COLOR_0", "rgb", ScalarType::Uint8));
    }
    Schema { fields, metadata }
}
