//! Reader for MATLAB level 5 MAT files.
//!
//! Covers the array classes annotation files use: numeric, char, cell and
//! struct arrays, each optionally zlib-compressed. Sparse and object arrays
//! are rejected, as are v7.3 files, which are HDF5 containers.
//!
//! Arrays are stored column-major. Imaginary parts of complex numeric arrays
//! are dropped and every numeric class is widened to `f64`.

use std::io::Read;

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use flate2::read::ZlibDecoder;

use crate::error::DatasetError;

const HEADER_LEN: usize = 128;

/// Deepest cell or struct nesting accepted.
const MAX_DEPTH: usize = 32;

// Data element types.
const MI_INT8: u32 = 1;
const MI_UINT8: u32 = 2;
const MI_INT16: u32 = 3;
const MI_UINT16: u32 = 4;
const MI_INT32: u32 = 5;
const MI_UINT32: u32 = 6;
const MI_SINGLE: u32 = 7;
const MI_DOUBLE: u32 = 9;
const MI_INT64: u32 = 12;
const MI_UINT64: u32 = 13;
const MI_MATRIX: u32 = 14;
const MI_COMPRESSED: u32 = 15;
const MI_UTF8: u32 = 16;
const MI_UTF16: u32 = 17;
const MI_UTF32: u32 = 18;

// Array classes.
const MX_CELL: u32 = 1;
const MX_STRUCT: u32 = 2;
const MX_OBJECT: u32 = 3;
const MX_CHAR: u32 = 4;
const MX_SPARSE: u32 = 5;

/// One decoded MATLAB array.
#[derive(Clone, Debug, PartialEq)]
pub enum MatArray {
    Numeric {
        dims: Vec<usize>,
        data: Vec<f64>,
    },
    Char {
        dims: Vec<usize>,
        text: String,
    },
    Cell {
        dims: Vec<usize>,
        items: Vec<MatArray>,
    },
    /// `elements[i][j]` is field `fields[j]` of element `i`.
    Struct {
        dims: Vec<usize>,
        fields: Vec<String>,
        elements: Vec<Vec<MatArray>>,
    },
}

impl MatArray {
    pub fn dims(&self) -> &[usize] {
        match self {
            MatArray::Numeric { dims, .. }
            | MatArray::Char { dims, .. }
            | MatArray::Cell { dims, .. }
            | MatArray::Struct { dims, .. } => dims,
        }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.dims().iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Field `name` of struct element `index`; `None` for other classes.
    pub fn field(&self, index: usize, name: &str) -> Option<&MatArray> {
        let MatArray::Struct {
            fields, elements, ..
        } = self
        else {
            return None;
        };
        let position = fields.iter().position(|f| f == name)?;
        elements.get(index)?.get(position)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            MatArray::Char { text, .. } => Some(text),
            _ => None,
        }
    }

    pub fn numeric(&self) -> Option<&[f64]> {
        match self {
            MatArray::Numeric { data, .. } => Some(data),
            _ => None,
        }
    }

    /// The first value of a numeric array.
    pub fn scalar(&self) -> Option<f64> {
        self.numeric()?.first().copied()
    }
}

/// The named variables of a MAT file, in file order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MatFile {
    variables: Vec<(String, MatArray)>,
}

impl MatFile {
    pub fn parse(bytes: &[u8]) -> Result<Self, DatasetError> {
        if bytes.starts_with(b"MATLAB 7.3") {
            return Err(mat_error("v7.3 MAT files (HDF5) are not supported"));
        }
        let header = bytes
            .get(..HEADER_LEN)
            .ok_or_else(|| mat_error("file is shorter than the 128-byte header"))?;
        let body = &bytes[HEADER_LEN..];
        match &header[126..] {
            b"IM" => parse_body::<LittleEndian>(body),
            b"MI" => parse_body::<BigEndian>(body),
            _ => Err(mat_error("missing endian indicator")),
        }
    }

    pub fn get(&self, name: &str) -> Option<&MatArray> {
        self.variables
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, array)| array)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.variables.iter().map(|(name, _)| name.as_str())
    }
}

fn mat_error(message: impl Into<String>) -> DatasetError {
    DatasetError::MatDecode {
        message: message.into(),
    }
}

fn take(data: &[u8], start: usize, len: usize) -> Result<&[u8], DatasetError> {
    start
        .checked_add(len)
        .and_then(|end| data.get(start..end))
        .ok_or_else(|| mat_error("truncated data element"))
}

/// Splits the next data element off `data`: `(type, payload, rest)`.
fn next_element<B: ByteOrder>(data: &[u8]) -> Result<(u32, &[u8], &[u8]), DatasetError> {
    let first = B::read_u32(take(data, 0, 4)?);
    if first >> 16 != 0 {
        // Small element: size and type share the tag, data sits in the next 4 bytes.
        let size = (first >> 16) as usize;
        if size > 4 {
            return Err(mat_error(format!("small element of {size} bytes")));
        }
        let payload = take(data, 4, size)?;
        let rest = data.get(8..).unwrap_or_default();
        return Ok((first & 0xFFFF, payload, rest));
    }

    let size = B::read_u32(take(data, 4, 4)?) as usize;
    let payload = take(data, 8, size)?;
    let padded = if first == MI_COMPRESSED {
        size
    } else {
        size + (8 - size % 8) % 8
    };
    let rest = data.get(8 + padded..).unwrap_or_default();
    Ok((first, payload, rest))
}

fn parse_body<B: ByteOrder>(mut data: &[u8]) -> Result<MatFile, DatasetError> {
    let mut variables = Vec::new();
    while !data.is_empty() {
        let (ty, payload, rest) = next_element::<B>(data)?;
        data = rest;
        if let Some(variable) = read_variable::<B>(ty, payload)? {
            variables.push(variable);
        }
    }
    Ok(MatFile { variables })
}

/// Decodes a top-level element. Elements other than arrays are skipped.
fn read_variable<B: ByteOrder>(
    ty: u32,
    payload: &[u8],
) -> Result<Option<(String, MatArray)>, DatasetError> {
    match ty {
        MI_COMPRESSED => {
            let mut inflated = Vec::new();
            ZlibDecoder::new(payload)
                .read_to_end(&mut inflated)
                .map_err(|e| mat_error(format!("corrupt compressed element: {e}")))?;
            let (ty, inner, _) = next_element::<B>(&inflated)?;
            read_variable::<B>(ty, inner)
        }
        MI_MATRIX => read_matrix::<B>(payload, 0).map(Some),
        _ => Ok(None),
    }
}

fn expect_type(found: u32, expected: u32, what: &str) -> Result<(), DatasetError> {
    if found == expected {
        Ok(())
    } else {
        Err(mat_error(format!(
            "{what} has element type {found}, expected {expected}"
        )))
    }
}

/// Reads a child array element, as found inside cell and struct arrays.
fn read_child<B: ByteOrder>(
    data: &[u8],
    depth: usize,
) -> Result<(MatArray, &[u8]), DatasetError> {
    if depth > MAX_DEPTH {
        return Err(mat_error(format!("arrays nested deeper than {MAX_DEPTH}")));
    }
    let (ty, payload, rest) = next_element::<B>(data)?;
    expect_type(ty, MI_MATRIX, "array element")?;
    let (_, array) = read_matrix::<B>(payload, depth)?;
    Ok((array, rest))
}

fn read_matrix<B: ByteOrder>(
    payload: &[u8],
    depth: usize,
) -> Result<(String, MatArray), DatasetError> {
    if payload.is_empty() {
        return Ok((
            String::new(),
            MatArray::Numeric {
                dims: vec![0, 0],
                data: Vec::new(),
            },
        ));
    }

    let (ty, flags, rest) = next_element::<B>(payload)?;
    expect_type(ty, MI_UINT32, "array flags")?;
    let class = B::read_u32(take(flags, 0, 4)?) & 0xFF;

    let (ty, dims_bytes, rest) = next_element::<B>(rest)?;
    expect_type(ty, MI_INT32, "dimensions")?;
    let dims = dims_bytes
        .chunks_exact(4)
        .map(|chunk| {
            usize::try_from(B::read_i32(chunk))
                .map_err(|_| mat_error("negative array dimension"))
        })
        .collect::<Result<Vec<_>, _>>()?;
    let count = dims
        .iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d))
        .ok_or_else(|| mat_error("array dimensions overflow"))?;

    let (ty, name_bytes, mut rest) = next_element::<B>(rest)?;
    expect_type(ty, MI_INT8, "array name")?;
    let name = String::from_utf8_lossy(name_bytes).into_owned();

    let array = match class {
        MX_CELL => {
            let mut items = Vec::new();
            for _ in 0..count {
                let (item, next) = read_child::<B>(rest, depth + 1)?;
                items.push(item);
                rest = next;
            }
            MatArray::Cell { dims, items }
        }
        MX_STRUCT => {
            let (ty, len_bytes, next) = next_element::<B>(rest)?;
            expect_type(ty, MI_INT32, "field name length")?;
            let name_len = usize::try_from(B::read_i32(take(len_bytes, 0, 4)?))
                .map_err(|_| mat_error("negative field name length"))?;
            let (ty, names_bytes, next) = next_element::<B>(next)?;
            expect_type(ty, MI_INT8, "field names")?;
            rest = next;

            let fields: Vec<String> = if name_len == 0 {
                Vec::new()
            } else {
                names_bytes
                    .chunks(name_len)
                    .map(|chunk| {
                        let end = chunk.iter().position(|&b| b == 0).unwrap_or(chunk.len());
                        String::from_utf8_lossy(&chunk[..end]).into_owned()
                    })
                    .collect()
            };
            if fields.is_empty() && count > payload.len() {
                return Err(mat_error("struct dimensions exceed the element data"));
            }

            let mut elements = Vec::new();
            for _ in 0..count {
                let mut values = Vec::with_capacity(fields.len());
                for _ in &fields {
                    let (value, next) = read_child::<B>(rest, depth + 1)?;
                    values.push(value);
                    rest = next;
                }
                elements.push(values);
            }
            MatArray::Struct {
                dims,
                fields,
                elements,
            }
        }
        MX_CHAR => {
            let text = if rest.is_empty() {
                String::new()
            } else {
                let (ty, bytes, _) = next_element::<B>(rest)?;
                decode_text::<B>(ty, bytes)?
            };
            MatArray::Char { dims, text }
        }
        MX_OBJECT | MX_SPARSE => {
            return Err(mat_error(format!(
                "array '{name}' has unsupported class {class}"
            )));
        }
        6..=15 => {
            let data = if rest.is_empty() {
                Vec::new()
            } else {
                let (ty, bytes, _) = next_element::<B>(rest)?;
                decode_numeric::<B>(ty, bytes)?
            };
            if data.len() != count {
                return Err(mat_error(format!(
                    "array '{name}' holds {} values for {count} elements",
                    data.len()
                )));
            }
            MatArray::Numeric { dims, data }
        }
        other => return Err(mat_error(format!("unknown array class {other}"))),
    };
    Ok((name, array))
}

fn decode_text<B: ByteOrder>(ty: u32, bytes: &[u8]) -> Result<String, DatasetError> {
    match ty {
        MI_UINT16 | MI_UTF16 => {
            let units: Vec<u16> = bytes.chunks_exact(2).map(B::read_u16).collect();
            Ok(String::from_utf16_lossy(&units))
        }
        MI_INT8 | MI_UINT8 | MI_UTF8 => Ok(String::from_utf8_lossy(bytes).into_owned()),
        MI_UTF32 => Ok(bytes
            .chunks_exact(4)
            .map(|c| char::from_u32(B::read_u32(c)).unwrap_or(char::REPLACEMENT_CHARACTER))
            .collect()),
        other => Err(mat_error(format!("char data has element type {other}"))),
    }
}

fn decode_numeric<B: ByteOrder>(ty: u32, bytes: &[u8]) -> Result<Vec<f64>, DatasetError> {
    let width = match ty {
        MI_INT8 | MI_UINT8 => 1,
        MI_INT16 | MI_UINT16 => 2,
        MI_INT32 | MI_UINT32 | MI_SINGLE => 4,
        MI_DOUBLE | MI_INT64 | MI_UINT64 => 8,
        other => return Err(mat_error(format!("numeric data has element type {other}"))),
    };
    if bytes.len() % width != 0 {
        return Err(mat_error(format!(
            "{} bytes of numeric data are not a multiple of {width}",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(width)
        .map(|c| match ty {
            MI_INT8 => f64::from(c[0] as i8),
            MI_UINT8 => f64::from(c[0]),
            MI_INT16 => f64::from(B::read_i16(c)),
            MI_UINT16 => f64::from(B::read_u16(c)),
            MI_INT32 => f64::from(B::read_i32(c)),
            MI_UINT32 => f64::from(B::read_u32(c)),
            MI_SINGLE => f64::from(B::read_f32(c)),
            MI_DOUBLE => B::read_f64(c),
            MI_INT64 => B::read_i64(c) as f64,
            _ => B::read_u64(c) as f64,
        })
        .collect())
}
