use crate::common::{parse_float_prefix, parse_int_prefix};
use crate::error::PcdError;
use crate::structures::{DecodeOptions, Encoding, FieldType, HeaderPolicy, PcdHeader};
use foldhash::HashMap;
use foldhash::HashMapExt;
use std::borrow::Cow;

/// Position of the `DATA <tag>` marker inside the raw file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DataMarker<'a> {
    pub tag: Cow<'a, str>,
    /// First byte after the whitespace that terminates the tag.
    pub payload_start: usize,
}

/// Finds the first line break followed by `DATA`, one whitespace byte, the
/// encoding tag and one terminating whitespace byte.
pub(crate) fn find_data_marker(raw: &[u8]) -> Option<DataMarker<'_>> {
    for nl in memchr::memchr2_iter(b'\n', b'\r', raw) {
        let keyword = nl + 1;
        let Some(word) = raw.get(keyword..keyword + 4) else {
            break;
        };
        if !word.eq_ignore_ascii_case(b"DATA") {
            continue;
        }
        if !raw.get(keyword + 4).is_some_and(u8::is_ascii_whitespace) {
            continue;
        }

        let tag_start = keyword + 5;
        let tag_len = raw[tag_start..]
            .iter()
            .take_while(|b| !b.is_ascii_whitespace())
            .count();
        let terminator = tag_start + tag_len;
        let Some(&term) = raw.get(terminator) else {
            continue;
        };

        let mut payload_start = terminator + 1;
        if term == b'\r' && raw.get(payload_start) == Some(&b'\n') {
            payload_start += 1;
        }
        return Some(DataMarker {
            tag: String::from_utf8_lossy(&raw[tag_start..terminator]),
            payload_start,
        });
    }
    None
}

/// Removes `#` comments (up to the end of their line).
fn strip_comments(text: &str) -> String {
    text.split_inclusive('\n')
        .map(|line| match line.find('#') {
            Some(pos) if line.ends_with('\n') => format!("{}\n", &line[..pos]),
            Some(pos) => line[..pos].to_string(),
            None => line.to_string(),
        })
        .collect()
}

/// Value of the first line that starts with `keyword` followed by a space.
fn keyword_value<'t>(text: &'t str, keyword: &str) -> Option<&'t str> {
    text.lines().find_map(|line| {
        let line = line.trim_start();
        let head = line.get(..keyword.len())?;
        if !head.eq_ignore_ascii_case(keyword) {
            return None;
        }
        line[keyword.len()..]
            .strip_prefix(' ')
            .map(|value| value.trim_end())
    })
}

fn integer_token(keyword: &str, token: &str) -> Result<usize, PcdError> {
    parse_int_prefix(token)
        .and_then(|v| usize::try_from(v).ok())
        .ok_or_else(|| {
            PcdError::MalformedHeader(format!("invalid {} value: {:?}", keyword, token))
        })
}

fn integer_value(text: &str, keyword: &str) -> Result<Option<usize>, PcdError> {
    keyword_value(text, keyword)
        .map(|value| integer_token(keyword, value))
        .transpose()
}

fn integer_list(text: &str, keyword: &str) -> Result<Option<Vec<usize>>, PcdError> {
    keyword_value(text, keyword)
        .map(|value| {
            value
                .split_whitespace()
                .map(|token| integer_token(keyword, token))
                .collect()
        })
        .transpose()
}

pub(crate) fn parse_version(text: &str) -> Option<f64> {
    keyword_value(text, "VERSION")
        .map(parse_float_prefix)
        .filter(|v| !v.is_nan())
}

pub(crate) fn parse_fields(text: &str) -> Vec<String> {
    keyword_value(text, "FIELDS")
        .map(|value| value.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}

pub(crate) fn parse_sizes(text: &str) -> Result<Vec<usize>, PcdError> {
    Ok(integer_list(text, "SIZE")?.unwrap_or_default())
}

pub(crate) fn parse_types(text: &str) -> Vec<FieldType> {
    keyword_value(text, "TYPE")
        .map(|value| value.split_whitespace().map(FieldType::from_token).collect())
        .unwrap_or_default()
}

/// Falls back to one element per field when the COUNT line is absent.
pub(crate) fn parse_counts(text: &str, field_count: usize) -> Result<Vec<usize>, PcdError> {
    Ok(integer_list(text, "COUNT")?.unwrap_or_else(|| vec![1; field_count]))
}

pub(crate) fn parse_width(text: &str) -> Result<Option<usize>, PcdError> {
    integer_value(text, "WIDTH")
}

pub(crate) fn parse_height(text: &str) -> Result<Option<usize>, PcdError> {
    integer_value(text, "HEIGHT")
}

pub(crate) fn parse_viewpoint(text: &str) -> Option<String> {
    keyword_value(text, "VIEWPOINT").map(str::to_string)
}

pub(crate) fn parse_points(text: &str) -> Result<Option<usize>, PcdError> {
    integer_value(text, "POINTS")
}

/// Column index per field for ascii, running byte offset otherwise. Returns
/// the table and the row size.
pub(crate) fn field_offsets(
    encoding: Encoding,
    fields: &[String],
    size: &[usize],
) -> Result<(HashMap<String, usize>, usize), PcdError> {
    let mut offset = HashMap::with_capacity(fields.len());
    if encoding == Encoding::Ascii {
        for (column, name) in fields.iter().enumerate() {
            offset.insert(name.clone(), column);
        }
        return Ok((offset, 0));
    }

    let mut row_size: usize = 0;
    for (name, &bytes) in fields.iter().zip(size) {
        offset.insert(name.clone(), row_size);
        row_size = row_size.checked_add(bytes).ok_or_else(|| {
            PcdError::MalformedHeader(format!("row size overflows at field {}", name))
        })?;
    }
    Ok((offset, row_size))
}

fn check_lengths(
    fields: &[String],
    size: &[usize],
    field_type: &[FieldType],
    count: &[usize],
) -> Result<(), PcdError> {
    let n = fields.len();
    let mismatch = |name: &str, len: usize| {
        PcdError::MalformedHeader(format!(
            "{} declares {} entries for {} fields",
            name, len, n
        ))
    };
    if size.len() != n {
        return Err(mismatch("SIZE", size.len()));
    }
    if !field_type.is_empty() && field_type.len() != n {
        return Err(mismatch("TYPE", field_type.len()));
    }
    if count.len() != n {
        return Err(mismatch("COUNT", count.len()));
    }
    Ok(())
}

/// Parses the header of a PCD file held entirely in memory.
pub fn parse_pcd_header(raw: &[u8], options: &DecodeOptions) -> Result<PcdHeader, PcdError> {
    let marker = find_data_marker(raw)
        .ok_or_else(|| PcdError::MalformedHeader("missing DATA line".to_string()))?;
    let data = Encoding::from_tag(&marker.tag)
        .ok_or_else(|| PcdError::UnsupportedEncoding(marker.tag.to_string()))?;

    let text = strip_comments(&String::from_utf8_lossy(&raw[..marker.payload_start]));

    let fields = parse_fields(&text);
    let size = parse_sizes(&text)?;
    let field_type = parse_types(&text);
    let count = parse_counts(&text, fields.len())?;
    let width = parse_width(&text)?;
    let height = parse_height(&text)?;
    let points = match (parse_points(&text)?, width, height) {
        (Some(points), _, _) => Some(points),
        (None, Some(w), Some(h)) => Some(w.checked_mul(h).ok_or_else(|| {
            PcdError::MalformedHeader(format!("WIDTH {} x HEIGHT {} overflows", w, h))
        })?),
        _ => None,
    };

    if options.header_policy == HeaderPolicy::Strict {
        check_lengths(&fields, &size, &field_type, &count)?;
    }
    let (offset, row_size) = field_offsets(data, &fields, &size)?;

    tracing::trace!(
        encoding = data.as_str(),
        fields = fields.len(),
        row_size,
        header_len = marker.payload_start,
        "parsed PCD header"
    );

    Ok(PcdHeader {
        data,
        header_len: marker.payload_start,
        version: parse_version(&text),
        viewpoint: parse_viewpoint(&text),
        text,
        fields,
        size,
        field_type,
        count,
        width,
        height,
        points,
        offset,
        row_size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structures::Viewpoint;

    const HEADER: &str = "# .PCD v0.7 - Point Cloud Data file format
VERSION 0.7
FIELDS x y z rgb
SIZE 4 4 4 4
TYPE F F F U
COUNT 1 1 1 1
WIDTH 213
HEIGHT 1
VIEWPOINT 0 0 0 1 0 0 0
POINTS 213
DATA binary
";

    #[test]
    fn test_parse_full_header() {
        let header = parse_pcd_header(HEADER.as_bytes(), &DecodeOptions::default()).unwrap();
        assert_eq!(header.data, Encoding::Binary);
        assert_eq!(header.header_len, HEADER.len());
        assert_eq!(header.version, Some(0.7));
        assert_eq!(header.fields, vec!["x", "y", "z", "rgb"]);
        assert_eq!(header.size, vec![4, 4, 4, 4]);
        assert_eq!(
            header.field_type,
            vec![
                FieldType::Float,
                FieldType::Float,
                FieldType::Float,
                FieldType::Unsigned
            ]
        );
        assert_eq!(header.count, vec![1, 1, 1, 1]);
        assert_eq!(header.width, Some(213));
        assert_eq!(header.height, Some(1));
        assert_eq!(header.points, Some(213));
        assert_eq!(header.offset_of("x"), Some(0));
        assert_eq!(header.offset_of("z"), Some(8));
        assert_eq!(header.offset_of("rgb"), Some(12));
        assert_eq!(header.row_size, 16);
        assert_eq!(
            header.viewpoint_pose(),
            Some(Viewpoint {
                translation: [0.0, 0.0, 0.0],
                rotation: [1.0, 0.0, 0.0, 0.0],
            })
        );
        assert!(!header.text.contains("Point Cloud Data file format"));
    }

    #[test]
    fn test_ascii_offsets_are_column_indices() {
        let text = "FIELDS x y z normal_x\nSIZE 4 4 8 4\nDATA ascii\n1 2 3 4\n";
        let header = parse_pcd_header(text.as_bytes(), &DecodeOptions::default()).unwrap();
        assert_eq!(header.data, Encoding::Ascii);
        assert_eq!(header.offset_of("x"), Some(0));
        assert_eq!(header.offset_of("z"), Some(2));
        assert_eq!(header.offset_of("normal_x"), Some(3));
        assert_eq!(header.row_size, 0);
        assert_eq!(&text[header.header_len..], "1 2 3 4\n");
    }

    #[test]
    fn test_binary_offsets_ignore_count() {
        let text = "FIELDS x y z label\nSIZE 4 4 4 2\nCOUNT 1 1 1 3\nDATA binary\n";
        let header = parse_pcd_header(text.as_bytes(), &DecodeOptions::default()).unwrap();
        assert_eq!(header.offset_of("label"), Some(12));
        assert_eq!(header.row_size, 14);
        assert_eq!(header.count, vec![1, 1, 1, 3]);
    }

    #[test]
    fn test_missing_count_defaults_to_one() {
        let text = "FIELDS x y z\nSIZE 4 4 4\nDATA ascii\n";
        let header = parse_pcd_header(text.as_bytes(), &DecodeOptions::default()).unwrap();
        assert_eq!(header.count, vec![1, 1, 1]);
    }

    #[test]
    fn test_points_derived_from_grid() {
        let text = "FIELDS x y z\nSIZE 4 4 4\nWIDTH 4\nHEIGHT 2\nDATA ascii\n";
        let header = parse_pcd_header(text.as_bytes(), &DecodeOptions::default()).unwrap();
        assert_eq!(header.points, Some(8));

        let text = "FIELDS x y z\nWIDTH 4\nDATA ascii\n";
        let header = parse_pcd_header(text.as_bytes(), &DecodeOptions::default()).unwrap();
        assert_eq!(header.points, None);
    }

    #[test]
    fn test_missing_data_line() {
        let text = "VERSION 0.7\nFIELDS x y z\nSIZE 4 4 4\nPOINTS 1\n";
        let result = parse_pcd_header(text.as_bytes(), &DecodeOptions::default());
        assert!(matches!(result, Err(PcdError::MalformedHeader(_))));
    }

    #[test]
    fn test_data_keyword_must_start_a_line() {
        let text = "FIELDS x y z\nMETADATA ascii\n";
        let result = parse_pcd_header(text.as_bytes(), &DecodeOptions::default());
        assert!(matches!(result, Err(PcdError::MalformedHeader(_))));
    }

    #[test]
    fn test_unsupported_encoding_names_tag() {
        let text = "FIELDS x y z\nDATA foo\n";
        match parse_pcd_header(text.as_bytes(), &DecodeOptions::default()) {
            Err(PcdError::UnsupportedEncoding(tag)) => assert_eq!(tag, "foo"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_keywords_are_case_insensitive() {
        let text = "fields x y z\nsize 4 4 4\npoints 2\ndata Binary_Compressed\n";
        let header = parse_pcd_header(text.as_bytes(), &DecodeOptions::default()).unwrap();
        assert_eq!(header.data, Encoding::BinaryCompressed);
        assert_eq!(header.points, Some(2));
        assert_eq!(header.fields.len(), 3);
    }

    #[test]
    fn test_crlf_header() {
        let text = "FIELDS x y z\r\nSIZE 4 4 4\r\nPOINTS 1\r\nDATA binary\r\nPAYLOAD";
        let header = parse_pcd_header(text.as_bytes(), &DecodeOptions::default()).unwrap();
        assert_eq!(header.points, Some(1));
        assert_eq!(header.size, vec![4, 4, 4]);
        assert_eq!(&text[header.header_len..], "PAYLOAD");
    }

    #[test]
    fn test_header_with_binary_payload() {
        let mut raw = b"FIELDS x\nSIZE 4\nPOINTS 1\nDATA binary\n".to_vec();
        let header_len = raw.len();
        raw.extend_from_slice(&[0xff, 0xfe, b'\n', 0x80]);
        let header = parse_pcd_header(&raw, &DecodeOptions::default()).unwrap();
        assert_eq!(header.header_len, header_len);
    }

    #[test]
    fn test_inline_comments_are_removed() {
        let text = "FIELDS x y z # xyz only\nSIZE 4 4 4\n# POINTS 99\nDATA ascii\n";
        let header = parse_pcd_header(text.as_bytes(), &DecodeOptions::default()).unwrap();
        assert_eq!(header.fields, vec!["x", "y", "z"]);
        assert_eq!(header.points, None);
    }

    #[test]
    fn test_invalid_integer_is_malformed() {
        let text = "FIELDS x y z\nSIZE 4 four 4\nDATA binary\n";
        let result = parse_pcd_header(text.as_bytes(), &DecodeOptions::default());
        assert!(matches!(result, Err(PcdError::MalformedHeader(_))));
    }

    #[test]
    fn test_grid_overflow_is_malformed() {
        let text =
            "FIELDS x y z\nSIZE 4 4 4\nWIDTH 4294967296\nHEIGHT 4294967296\nDATA binary\n";
        let result = parse_pcd_header(text.as_bytes(), &DecodeOptions::default());
        assert!(matches!(result, Err(PcdError::MalformedHeader(_))));
    }

    #[test]
    fn test_row_size_overflow_is_malformed() {
        let text = "FIELDS x y z\nSIZE 9223372036854775807 9223372036854775807 4\n\
                    POINTS 1\nDATA binary\n";
        let result = parse_pcd_header(text.as_bytes(), &DecodeOptions::default());
        assert!(matches!(result, Err(PcdError::MalformedHeader(_))));
    }

    #[test]
    fn test_length_mismatch_policy() {
        let text = "FIELDS x y z intensity\nSIZE 4 4 4\nDATA binary\n";

        let header = parse_pcd_header(text.as_bytes(), &DecodeOptions::default()).unwrap();
        assert_eq!(header.offset_of("intensity"), None);
        assert_eq!(header.row_size, 12);

        let strict = DecodeOptions {
            header_policy: HeaderPolicy::Strict,
            ..DecodeOptions::default()
        };
        let result = parse_pcd_header(text.as_bytes(), &strict);
        assert!(matches!(result, Err(PcdError::MalformedHeader(_))));
    }

    #[test]
    fn test_strict_accepts_consistent_header() {
        let strict = DecodeOptions {
            header_policy: HeaderPolicy::Strict,
            ..DecodeOptions::default()
        };
        assert!(parse_pcd_header(HEADER.as_bytes(), &strict).is_ok());
    }

    #[test]
    fn test_offsets_are_monotonic() {
        let header = parse_pcd_header(HEADER.as_bytes(), &DecodeOptions::default()).unwrap();
        let offsets: Vec<usize> = header
            .fields
            .iter()
            .map(|f| header.offset_of(f).unwrap())
            .collect();
        assert!(offsets.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(offsets[3] + header.size[3], header.row_size);
    }
}
