//! Image metadata parsing: the EXIF `UserComment` field and the
//! `<label>: <number>` value embedded in it by the capture device.

use exif::{In, Reader, Tag, Value};
use regex::Regex;
use std::io::Cursor;

/// Why no auxiliary value could be read from an image
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("image metadata could not be parsed: {0}")]
    Exif(#[from] exif::Error),

    #[error("image has no user comment")]
    MissingComment,

    #[error("user comment has no '{label}: <number>' entry")]
    MissingValue { label: String },

    #[error("invalid label pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Read the EXIF user comment from a JPEG, TIFF, PNG, HEIF or WebP image
pub fn user_comment(image: &[u8]) -> Result<String, MetadataError> {
    let exif = Reader::new().read_from_container(&mut Cursor::new(image))?;

    let field = exif
        .get_field(Tag::UserComment, In::PRIMARY)
        .ok_or(MetadataError::MissingComment)?;

    match &field.value {
        Value::Undefined(bytes, _) => Ok(decode_user_comment(bytes)),
        Value::Ascii(parts) => Ok(parts
            .iter()
            .map(|part| String::from_utf8_lossy(part).into_owned())
            .collect::<Vec<_>>()
            .join(" ")),
        _ => Err(MetadataError::MissingComment),
    }
}

/// Strip the 8-byte character code that prefixes a `UserComment` value
fn decode_user_comment(bytes: &[u8]) -> String {
    if bytes.len() < 8 {
        return String::from_utf8_lossy(bytes).trim_end_matches('\0').to_string();
    }

    let (code, text) = bytes.split_at(8);
    let decoded = match code {
        b"UNICODE\0" => decode_ucs2(text),
        _ => String::from_utf8_lossy(text).into_owned(),
    };
    decoded.trim_end_matches(['\0', ' ']).to_string()
}

/// UCS-2 in either byte order; ASCII-range text has a zero high byte, which
/// tells the two apart
fn decode_ucs2(text: &[u8]) -> String {
    let little_endian = text.len() >= 2 && text[0] != 0 && text[1] == 0;
    let units: Vec<u16> = text
        .chunks_exact(2)
        .map(|pair| {
            if little_endian {
                u16::from_le_bytes([pair[0], pair[1]])
            } else {
                u16::from_be_bytes([pair[0], pair[1]])
            }
        })
        .collect();
    String::from_utf16_lossy(&units)
}

/// Find `<label>: <number>` in `comment`
pub fn labelled_value(comment: &str, label: &str) -> Result<f64, MetadataError> {
    let pattern = Regex::new(&format!(
        r"{}\s*:\s*([-+]?(?:\d+(?:\.\d*)?|\.\d+)(?:[eE][-+]?\d+)?)",
        regex::escape(label)
    ))?;

    pattern
        .captures(comment)
        .and_then(|captures| captures.get(1))
        .and_then(|number| number.as_str().parse::<f64>().ok())
        .filter(|value| value.is_finite())
        .ok_or_else(|| MetadataError::MissingValue {
            label: label.to_string(),
        })
}

/// Extract the labelled auxiliary value from an image's metadata
pub fn extract_labelled_value(image: &[u8], label: &str) -> Result<f64, MetadataError> {
    let comment = user_comment(image)?;
    labelled_value(&comment, label)
}
