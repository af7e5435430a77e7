pub mod common;
pub mod error;
mod decode;
mod header;
mod lzf;
mod normalize;
mod schema;
mod structures;

use decode::decode_ascii;
use decode::decode_binary;
use decode::decode_binary_compressed;
use error::PcdError;
use normalize::mesh_attributes;
use normalize::mesh_header;
use schema::pcd_schema;
use schema::schema_metadata;

pub use header::parse_pcd_header;
pub use lzf::decompress_lzf;
pub use normalize::bounding_box;
pub use structures::{
    BoundingBox, DecodeOptions, Encoding, FieldType, HeaderPolicy, MeshAttribute,
    MeshAttributes, MeshHeader, PcdHeader, PcdMesh, RawAttributes, ScalarType, Schema,
    SchemaField, Topology, Viewpoint, LOADER_ID, POINT_LIST_MODE,
};

/// Decodes a complete PCD file with the default options.
pub fn parse_pcd(data: &[u8]) -> Result<PcdMesh, PcdError> {
    parse_pcd_with(data, &DecodeOptions::default())
}

#[inline(never)]
pub fn parse_pcd_with(data: &[u8], options: &DecodeOptions) -> Result<PcdMesh, PcdError> {
    let pcd_header = parse_pcd_header(data, options)?;

    let raw = match pcd_header.data {
        Encoding::Ascii => decode_ascii(data, &pcd_header, options.byte_order)?,
        Encoding::Binary => decode_binary(data, &pcd_header, options.byte_order)?,
        Encoding::BinaryCompressed => {
            decode_binary_compressed(data, &pcd_header, options.byte_order)?
        }
    };
    tracing::debug!(
        encoding = pcd_header.data.as_str(),
        points = raw.position.len() / 3,
        normals = !raw.normal.is_empty(),
        colors = !raw.color.is_empty(),
        "decoded PCD payload"
    );

    let attributes = mesh_attributes(raw);
    let header = mesh_header(&pcd_header, &attributes);
    let metadata = schema_metadata(&header)?;
    let schema = pcd_schema(&pcd_header, metadata);

    Ok(PcdMesh {
        loader: LOADER_ID,
        loader_data: pcd_header,
        header,
        schema,
        topology: Topology::PointList,
        mode: POINT_LIST_MODE,
        attributes,
    })
}

cfg_if::cfg_if! {
if #[cfg(feature = "async")] {
    use std::path::Path;

    /// Loads `path` and decodes it on the blocking pool.
    #[inline(never)]
    pub async fn parse_pcd_file_async(
        path: impl AsRef<Path>,
        options: DecodeOptions,
    ) -> Result<PcdMesh, PcdError> {
        let data = tokio::fs::read(path).await.map_err(PcdError::IoError)?;
        tokio::task::spawn_blocking(move || parse_pcd_with(&data, &options))
            .await
            .map_err(|e| PcdError::TaskJoin(e.to_string()))?
    }
}
}
