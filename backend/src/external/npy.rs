//! NPY array decoding for raster payloads.
//!
//! Accepts format versions 1.0 to 3.0 in C order, with either a plain
//! numeric dtype and shape `(H, W)` / `(H, W, B)`, or a structured dtype
//! whose fields are the bands and shape `(H, W)`. Every sample is widened
//! to `f64`.

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use shared::{sample_count, CaptureMetadata, PipelineError, PipelineResult, RawCapture};

const MAGIC: &[u8] = b"\x93NUMPY";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    F32,
    F64,
}

impl ScalarKind {
    pub fn size(&self) -> usize {
        match self {
            ScalarKind::U8 | ScalarKind::I8 => 1,
            ScalarKind::U16 | ScalarKind::I16 => 2,
            ScalarKind::U32 | ScalarKind::I32 | ScalarKind::F32 => 4,
            ScalarKind::U64 | ScalarKind::I64 | ScalarKind::F64 => 8,
        }
    }
}

/// One numeric dtype such as `<u2`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dtype {
    pub kind: ScalarKind,
    pub endian: Endian,
}

/// Parsed array header
#[derive(Debug, Clone, PartialEq)]
pub struct NpyHeader {
    /// One entry for plain arrays, one per field for structured arrays
    pub fields: Vec<Dtype>,
    pub structured: bool,
    pub shape: Vec<usize>,
    /// Offset of the first data byte
    pub data_offset: usize,
}

impl NpyHeader {
    /// `(height, width, bands)` of the array as a raster
    pub fn raster_shape(&self) -> PipelineResult<(usize, usize, usize)> {
        match (self.structured, self.shape.as_slice()) {
            (true, [h, w]) => Ok((*h, *w, self.fields.len())),
            (false, [h, w]) => Ok((*h, *w, 1)),
            (false, [h, w, b]) => Ok((*h, *w, *b)),
            _ => Err(malformed(format!(
                "unsupported array shape {:?}{}",
                self.shape,
                if self.structured { " for structured dtype" } else { "" }
            ))),
        }
    }

    fn record_size(&self) -> usize {
        self.fields.iter().map(|d| d.kind.size()).sum()
    }
}

fn malformed(reason: impl Into<String>) -> PipelineError {
    PipelineError::MalformedRaster(reason.into())
}

/// Parse the preamble and header dictionary
pub fn parse_header(bytes: &[u8]) -> PipelineResult<NpyHeader> {
    if bytes.len() < 10 || &bytes[..6] != MAGIC {
        return Err(malformed("missing NPY magic string"));
    }

    let major = bytes[6];
    let (header_len, header_start) = match major {
        1 => (LittleEndian::read_u16(&bytes[8..10]) as usize, 10),
        2 | 3 => {
            if bytes.len() < 12 {
                return Err(malformed("truncated NPY preamble"));
            }
            (LittleEndian::read_u32(&bytes[8..12]) as usize, 12)
        }
        v => return Err(malformed(format!("unsupported NPY version {}", v))),
    };

    let data_offset = header_start + header_len;
    let header = bytes
        .get(header_start..data_offset)
        .ok_or_else(|| malformed("truncated NPY header"))?;
    let header = std::str::from_utf8(header).map_err(|_| malformed("NPY header is not text"))?;

    let descr = dict_value(header, "descr")?;
    let (fields, structured) = if descr.starts_with('[') {
        (parse_structured_descr(descr)?, true)
    } else {
        (vec![parse_dtype(&parse_quoted(descr)?)?], false)
    };

    let fortran = dict_value(header, "fortran_order")?;
    if fortran.starts_with("True") {
        return Err(malformed("Fortran-ordered arrays are not supported"));
    }

    let shape = parse_shape(dict_value(header, "shape")?)?;

    Ok(NpyHeader {
        fields,
        structured,
        shape,
        data_offset,
    })
}

/// Decode a whole NPY payload into a raw capture
pub fn decode_raster(bytes: &[u8], metadata: CaptureMetadata) -> PipelineResult<RawCapture> {
    let header = parse_header(bytes)?;
    let (height, width, bands) = header.raster_shape()?;

    let data = &bytes[header.data_offset.min(bytes.len())..];
    let samples = sample_count(width, height, bands)?;
    let expected_bytes = if header.structured {
        sample_count(width, height, 1)?.checked_mul(header.record_size())
    } else {
        samples.checked_mul(header.fields[0].kind.size())
    }
    .ok_or_else(|| malformed(format!("shape {:?} overflows the payload size", header.shape)))?;
    if data.len() < expected_bytes {
        return Err(malformed(format!(
            "expected {} data bytes for shape {:?}, got {}",
            expected_bytes,
            header.shape,
            data.len()
        )));
    }

    let mut values = Vec::with_capacity(samples);
    let mut offset = 0;
    for i in 0..samples {
        let dtype = header.fields[i % header.fields.len()];
        let size = dtype.kind.size();
        values.push(read_sample(dtype, &data[offset..offset + size]));
        offset += size;
    }

    tracing::debug!(
        capture_id = %metadata.id,
        height,
        width,
        bands,
        "Decoded raster payload"
    );

    RawCapture::new(metadata, width, height, bands, values)
}

// ---- Header dictionary helpers ----

/// Text following `'key':` up to the end of the header
fn dict_value<'a>(header: &'a str, key: &str) -> PipelineResult<&'a str> {
    let pattern = format!("'{}':", key);
    let start = header
        .find(&pattern)
        .ok_or_else(|| malformed(format!("NPY header lacks '{}'", key)))?;
    Ok(header[start + pattern.len()..].trim_start())
}

fn parse_quoted(text: &str) -> PipelineResult<String> {
    let quote = text
        .chars()
        .next()
        .filter(|c| *c == '\'' || *c == '"')
        .ok_or_else(|| malformed("expected quoted dtype"))?;
    let rest = &text[1..];
    let end = rest
        .find(quote)
        .ok_or_else(|| malformed("unterminated dtype string"))?;
    Ok(rest[..end].to_string())
}

fn parse_dtype(descr: &str) -> PipelineResult<Dtype> {
    let (endian, code) = match descr.chars().next() {
        Some('<') | Some('=') => (Endian::Little, &descr[1..]),
        Some('>') => (Endian::Big, &descr[1..]),
        Some('|') => (Endian::Little, &descr[1..]),
        _ => (Endian::Little, descr),
    };

    let kind = match code {
        "u1" | "B" => ScalarKind::U8,
        "i1" | "b" => ScalarKind::I8,
        "u2" => ScalarKind::U16,
        "i2" => ScalarKind::I16,
        "u4" => ScalarKind::U32,
        "i4" => ScalarKind::I32,
        "u8" => ScalarKind::U64,
        "i8" => ScalarKind::I64,
        "f4" => ScalarKind::F32,
        "f8" => ScalarKind::F64,
        other => return Err(malformed(format!("unsupported dtype '{}'", other))),
    };

    Ok(Dtype { kind, endian })
}

/// `[('R', '<u2'), ('G', '<u2'), ('B', '<u2')]`
fn parse_structured_descr(text: &str) -> PipelineResult<Vec<Dtype>> {
    let end = text
        .find(']')
        .ok_or_else(|| malformed("unterminated structured dtype"))?;
    let body = &text[1..end];

    let mut fields = Vec::new();
    for entry in body.split('(').skip(1) {
        let entry = entry.split(')').next().unwrap_or_default();
        let parts: Vec<&str> = entry.split(',').map(str::trim).collect();
        let [_, dtype, ..] = parts.as_slice() else {
            return Err(malformed(format!("bad structured field '{}'", entry)));
        };
        if parts.len() > 2 && !parts[2].is_empty() {
            return Err(malformed("sub-array fields are not supported"));
        }
        fields.push(parse_dtype(&parse_quoted(dtype)?)?);
    }

    if fields.is_empty() {
        return Err(malformed("structured dtype has no fields"));
    }
    Ok(fields)
}

/// `(400, 400, 3)` or `(400,)`
fn parse_shape(text: &str) -> PipelineResult<Vec<usize>> {
    let body = text
        .strip_prefix('(')
        .and_then(|t| t.find(')').map(|end| &t[..end]))
        .ok_or_else(|| malformed("bad shape tuple"))?;

    body.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<usize>()
                .map_err(|_| malformed(format!("bad shape dimension '{}'", s)))
        })
        .collect()
}

// ---- Sample readers ----

fn read_sample(dtype: Dtype, data: &[u8]) -> f64 {
    match dtype.endian {
        Endian::Little => read_with::<LittleEndian>(dtype.kind, data),
        Endian::Big => read_with::<BigEndian>(dtype.kind, data),
    }
}

fn read_with<B: ByteOrder>(kind: ScalarKind, data: &[u8]) -> f64 {
    match kind {
        ScalarKind::U8 => data[0] as f64,
        ScalarKind::I8 => data[0] as i8 as f64,
        ScalarKind::U16 => B::read_u16(data) as f64,
        ScalarKind::I16 => B::read_i16(data) as f64,
        ScalarKind::U32 => B::read_u32(data) as f64,
        ScalarKind::I32 => B::read_i32(data) as f64,
        ScalarKind::U64 => B::read_u64(data) as f64,
        ScalarKind::I64 => B::read_i64(data) as f64,
        ScalarKind::F32 => B::read_f32(data) as f64,
        ScalarKind::F64 => B::read_f64(data),
    }
}
