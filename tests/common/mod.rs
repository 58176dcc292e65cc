//! Minimal reference reader for the integration tests.
//!
//! The production decoder is a separate system; this reader implements just
//! enough of the wire format to verify the encoder's observable properties:
//! framing, scalar payloads, backreference targets, sharing structure, and
//! compression framing. It panics on malformed input, which in a test is
//! exactly what we want.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use sereal_encoder::protocol as p;

/// Shared handle to a decoded value, so sharing can be asserted with
/// `Rc::ptr_eq`.
pub type DRc = Rc<RefCell<DVal>>;

/// A decoded value.
#[derive(Debug, Clone)]
pub enum DVal {
    Undef,
    CanonicalUndef,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f32),
    Double(f64),
    Bytes(Vec<u8>),
    Text(String),
    Array(Vec<DRc>),
    Map(Vec<(DVal, DRc)>),
    Ref(DRc),
    /// `None` is the dedicated dangling marker.
    Weak(Option<DRc>),
    Object {
        class: String,
        inner: DRc,
        frozen: bool,
    },
}

impl DVal {
    pub fn into_rc(self) -> DRc {
        Rc::new(RefCell::new(self))
    }
}

/// A fully parsed document.
pub struct Document {
    pub protocol_version: u8,
    pub encoding_id: u8,
    pub user_header: Option<DRc>,
    pub root: DRc,
    /// Decompressed body bytes, for size assertions.
    pub body: Vec<u8>,
}

pub fn read_document(bytes: &[u8]) -> Document {
    assert!(
        bytes[0..4] == p::MAGIC_V2 || bytes[0..4] == p::MAGIC_V3,
        "bad magic: {:?}",
        &bytes[0..4]
    );
    let protocol_version = bytes[4] & 0x0F;
    let encoding_id = bytes[4] >> 4;

    let mut pos = 5;
    let suffix_len = read_varint(bytes, &mut pos) as usize;
    let user_header = if suffix_len > 0 {
        let flags = bytes[pos];
        let header_bytes = &bytes[pos + 1..pos + suffix_len];
        if flags & 0x01 != 0 {
            Some(BodyReader::new(header_bytes).parse_value())
        } else {
            None
        }
    } else {
        None
    };
    pos += suffix_len;

    let body = decompress_body(encoding_id, &bytes[pos..]);
    let root = BodyReader::new(&body).parse_value();

    Document {
        protocol_version,
        encoding_id,
        user_header,
        root,
        body,
    }
}

fn decompress_body(encoding_id: u8, raw: &[u8]) -> Vec<u8> {
    match encoding_id {
        p::encoding::NONE => raw.to_vec(),
        #[cfg(feature = "snappy")]
        p::encoding::SNAPPY => {
            let mut pos = 0;
            let uncompressed_len = read_varint(raw, &mut pos) as usize;
            let compressed_len = read_varint(raw, &mut pos) as usize;
            let out = snap::raw::Decoder::new()
                .decompress_vec(&raw[pos..pos + compressed_len])
                .expect("snappy body");
            assert_eq!(out.len(), uncompressed_len);
            out
        }
        #[cfg(feature = "snappy")]
        p::encoding::SNAPPY_INCREMENTAL => {
            let mut out = Vec::new();
            let mut pos = 0;
            while pos < raw.len() {
                let uncompressed_len = read_varint(raw, &mut pos) as usize;
                let compressed_len = read_varint(raw, &mut pos) as usize;
                let chunk = snap::raw::Decoder::new()
                    .decompress_vec(&raw[pos..pos + compressed_len])
                    .expect("snappy chunk");
                assert_eq!(chunk.len(), uncompressed_len);
                out.extend_from_slice(&chunk);
                pos += compressed_len;
            }
            out
        }
        #[cfg(feature = "zlib")]
        p::encoding::ZLIB => {
            use std::io::Read;
            let mut pos = 0;
            let uncompressed_len = read_varint(raw, &mut pos) as usize;
            let compressed_len = read_varint(raw, &mut pos) as usize;
            let mut out = Vec::new();
            flate2::read::ZlibDecoder::new(&raw[pos..pos + compressed_len])
                .read_to_end(&mut out)
                .expect("zlib body");
            assert_eq!(out.len(), uncompressed_len);
            out
        }
        other => panic!("unknown or uncompiled encoding id {other}"),
    }
}

fn read_varint(bytes: &[u8], pos: &mut usize) -> u64 {
    let mut value = 0u64;
    let mut shift = 0;
    loop {
        let byte = bytes[*pos];
        *pos += 1;
        value |= u64::from(byte & 0x7F) << shift;
        if byte & 0x80 == 0 {
            return value;
        }
        shift += 7;
    }
}

struct BodyReader<'a> {
    body: &'a [u8],
    pos: usize,
    /// 1-based item offset -> decoded item.
    items: HashMap<u64, DRc>,
}

impl<'a> BodyReader<'a> {
    fn new(body: &'a [u8]) -> Self {
        Self {
            body,
            pos: 0,
            items: HashMap::new(),
        }
    }

    fn varint(&mut self) -> u64 {
        read_varint(self.body, &mut self.pos)
    }

    fn take(&mut self, n: usize) -> &'a [u8] {
        let slice = &self.body[self.pos..self.pos + n];
        self.pos += n;
        slice
    }

    fn lookup(&self, offset: u64) -> DRc {
        self.items
            .get(&offset)
            .unwrap_or_else(|| panic!("backreference to unknown offset {offset}"))
            .clone()
    }

    /// Re-parses the item at a prior offset (COPY/OBJECTV targets).
    fn reparse_at(&mut self, offset: u64) -> DRc {
        let saved = self.pos;
        self.pos = (offset - 1) as usize;
        let value = self.parse_value();
        self.pos = saved;
        value
    }

    fn expect_string(value: &DRc) -> String {
        match &*value.borrow() {
            DVal::Text(s) => s.clone(),
            DVal::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
            other => panic!("expected string item, got {other:?}"),
        }
    }

    fn parse_value(&mut self) -> DRc {
        let offset = self.pos as u64 + 1;
        let raw = self.body[self.pos];
        self.pos += 1;
        let tag = raw & !p::TRACK_FLAG;

        let value = match tag {
            0x00..=0x0F => DVal::Int(i64::from(tag)).into_rc(),
            0x10..=0x1F => DVal::Int(i64::from(tag) - 32).into_rc(),
            p::VARINT => {
                let n = self.varint();
                if let Ok(i) = i64::try_from(n) {
                    DVal::Int(i).into_rc()
                } else {
                    DVal::UInt(n).into_rc()
                }
            }
            p::ZIGZAG => {
                let n = self.varint();
                DVal::Int(p::unzigzag(n)).into_rc()
            }
            p::FLOAT => {
                let bytes: [u8; 4] = self.take(4).try_into().expect("float payload");
                DVal::Float(f32::from_le_bytes(bytes)).into_rc()
            }
            p::DOUBLE => {
                let bytes: [u8; 8] = self.take(8).try_into().expect("double payload");
                DVal::Double(f64::from_le_bytes(bytes)).into_rc()
            }
            p::UNDEF => DVal::Undef.into_rc(),
            p::CANONICAL_UNDEF => DVal::CanonicalUndef.into_rc(),
            p::TRUE => DVal::Bool(true).into_rc(),
            p::FALSE => DVal::Bool(false).into_rc(),
            p::BINARY => {
                let len = self.varint() as usize;
                DVal::Bytes(self.take(len).to_vec()).into_rc()
            }
            p::STR_UTF8 => {
                let len = self.varint() as usize;
                let text = String::from_utf8(self.take(len).to_vec()).expect("utf8 payload");
                DVal::Text(text).into_rc()
            }
            tag if (p::SHORT_BINARY_0..=p::SHORT_BINARY_0 + 31).contains(&tag) => {
                let len = (tag - p::SHORT_BINARY_0) as usize;
                DVal::Bytes(self.take(len).to_vec()).into_rc()
            }
            p::COPY => {
                let target = self.varint();
                self.reparse_at(target)
            }
            p::ALIAS => {
                let target = self.varint();
                // Literal storage sharing with the prior occurrence.
                return self.lookup(target);
            }
            p::REFP => {
                let target = self.varint();
                DVal::Ref(self.lookup(target)).into_rc()
            }
            p::REFN => {
                let placeholder = DVal::Undef.into_rc();
                self.items.insert(offset, placeholder.clone());
                let inner = self.parse_value();
                *placeholder.borrow_mut() = DVal::Ref(inner);
                placeholder
            }
            p::ARRAY => {
                let placeholder = DVal::Array(vec![]).into_rc();
                self.items.insert(offset, placeholder.clone());
                let count = self.varint() as usize;
                let elements: Vec<DRc> = (0..count).map(|_| self.parse_value()).collect();
                *placeholder.borrow_mut() = DVal::Array(elements);
                placeholder
            }
            p::HASH => {
                let placeholder = DVal::Map(vec![]).into_rc();
                self.items.insert(offset, placeholder.clone());
                let count = self.varint() as usize;
                let pairs = self.parse_pairs(count);
                *placeholder.borrow_mut() = DVal::Map(pairs);
                placeholder
            }
            tag if (p::ARRAYREF_0..=p::ARRAYREF_0 + 15).contains(&tag) => {
                let count = (tag - p::ARRAYREF_0) as usize;
                let array = DVal::Array(vec![]).into_rc();
                self.items.insert(offset, array.clone());
                let elements: Vec<DRc> = (0..count).map(|_| self.parse_value()).collect();
                *array.borrow_mut() = DVal::Array(elements);
                DVal::Ref(array).into_rc()
            }
            tag if (p::HASHREF_0..=p::HASHREF_0 + 15).contains(&tag) => {
                let count = (tag - p::HASHREF_0) as usize;
                let map = DVal::Map(vec![]).into_rc();
                self.items.insert(offset, map.clone());
                let pairs = self.parse_pairs(count);
                *map.borrow_mut() = DVal::Map(pairs);
                DVal::Ref(map).into_rc()
            }
            p::OBJECT | p::OBJECT_FREEZE => {
                let placeholder = DVal::Undef.into_rc();
                self.items.insert(offset, placeholder.clone());
                let class_item = self.parse_value();
                let class = Self::expect_string(&class_item);
                let inner = self.parse_value();
                *placeholder.borrow_mut() = DVal::Object {
                    class,
                    inner,
                    frozen: tag == p::OBJECT_FREEZE,
                };
                placeholder
            }
            p::OBJECTV | p::OBJECTV_FREEZE => {
                let class_offset = self.varint();
                let placeholder = DVal::Undef.into_rc();
                self.items.insert(offset, placeholder.clone());
                let class_item = self.reparse_at(class_offset);
                let class = Self::expect_string(&class_item);
                let inner = self.parse_value();
                *placeholder.borrow_mut() = DVal::Object {
                    class,
                    inner,
                    frozen: tag == p::OBJECTV_FREEZE,
                };
                placeholder
            }
            p::WEAKEN => {
                let inner = self.parse_value();
                let weak = if matches!(&*inner.borrow(), DVal::CanonicalUndef) {
                    DVal::Weak(None)
                } else {
                    DVal::Weak(Some(inner))
                };
                weak.into_rc()
            }
            p::PAD => return self.parse_value(),
            other => panic!("unknown tag byte 0x{other:02X} at offset {offset}"),
        };

        self.items.entry(offset).or_insert_with(|| value.clone());
        value
    }

    fn parse_pairs(&mut self, count: usize) -> Vec<(DVal, DRc)> {
        (0..count)
            .map(|_| {
                let key_item = self.parse_value();
                let key = key_item.borrow().clone();
                let value = self.parse_value();
                (key, value)
            })
            .collect()
    }
}
