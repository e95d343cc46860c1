//
// dataset.rs
// Dicom-Ingest-rs
//
// Reads the data set of a (possibly truncated) DICOM byte buffer with the dicom-rs token reader,
// collecting elements into an in-memory object and noting where Pixel Data starts.
//
// Thales Matheus Mendonça Santos - October 2026

use std::borrow::Cow;

use dicom::core::header::DataElementHeader;
use dicom::core::value::{DataSetSequence, PrimitiveValue, Value};
use dicom::core::{DataElement, Tag, VR};
use dicom::encoding::text::SpecificCharacterSet;
use dicom::encoding::TransferSyntaxIndex;
use dicom::object::mem::InMemElement;
use dicom::object::InMemDicomObject;
use dicom::transfer_syntax::TransferSyntaxRegistry;
use dicom_dictionary_std::tags;
use dicom_object::meta::FileMetaTable;
use dicom_parser::dataset::{DataSetReader, DataToken};
use tracing::debug;

use crate::error::DatasetError;

const PREAMBLE_LEN: usize = 128;
const MAGIC: &[u8; 4] = b"DICM";

const IMPLICIT_VR_LITTLE_ENDIAN: &str = "1.2.840.10008.1.2";
const EXPLICIT_VR_LITTLE_ENDIAN: &str = "1.2.840.10008.1.2.1";
const EXPLICIT_VR_BIG_ENDIAN: &str = "1.2.840.10008.1.2.2";
const DEFLATED_EXPLICIT_VR_LITTLE_ENDIAN: &str = "1.2.840.10008.1.2.1.99";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelDataLocation {
    pub vr: VR,
    /// `None` for undefined length, i.e. encapsulated pixel data.
    pub length: Option<u32>,
}

/// Top-level elements read from the buffer, up to (and maybe including) Pixel Data.
#[derive(Debug, Clone)]
pub struct DataSet {
    object: InMemDicomObject,
    pixel_data: Option<PixelDataLocation>,
    transfer_syntax: Option<String>,
    truncated: bool,
}

/// Read the header of a buffer, stopping at the Pixel Data element.
///
/// The buffer may be a prefix of the file; a token error ends the read with
/// [`DataSet::truncated`] set instead of failing. Only a buffer where not a
/// single element can be read is an error.
pub fn walk(bytes: &[u8]) -> Result<DataSet, DatasetError> {
    read(bytes, false)
}

/// Like [`walk`], but native Pixel Data values are read into the object too.
pub fn read_with_pixel_data(bytes: &[u8]) -> Result<DataSet, DatasetError> {
    read(bytes, true)
}

fn read(bytes: &[u8], with_pixel_data: bool) -> Result<DataSet, DatasetError> {
    let has_preamble = bytes.len() >= PREAMBLE_LEN + MAGIC.len()
        && &bytes[PREAMBLE_LEN..PREAMBLE_LEN + MAGIC.len()] == MAGIC;

    let (body, transfer_syntax) = if has_preamble {
        let mut rest = &bytes[PREAMBLE_LEN..];
        let meta = FileMetaTable::from_reader(&mut rest)?;
        let uid = meta
            .transfer_syntax()
            .trim_end_matches(|c: char| c == '\0' || c == ' ')
            .to_string();
        (rest, Some(uid))
    } else if let Some(uid) = raw_transfer_syntax(bytes) {
        (bytes, Some(uid.to_string()))
    } else {
        return Err(DatasetError::NotDicom);
    };

    let uid = transfer_syntax.as_deref().unwrap_or(EXPLICIT_VR_LITTLE_ENDIAN);
    if matches!(uid, EXPLICIT_VR_BIG_ENDIAN | DEFLATED_EXPLICIT_VR_LITTLE_ENDIAN) {
        return Err(DatasetError::UnsupportedTransferSyntax(uid.to_string()));
    }
    let ts = TransferSyntaxRegistry
        .get(uid)
        .filter(|ts| !ts.is_unsupported())
        .ok_or_else(|| DatasetError::UnsupportedTransferSyntax(uid.to_string()))?;

    let reader = DataSetReader::new_with_ts_cs(body, ts, SpecificCharacterSet::default())?;
    let mut collector = Collector::new(with_pixel_data);
    for token in reader {
        match token {
            Ok(token) => {
                if !collector.push(token) {
                    break;
                }
            }
            Err(err) => {
                // Raw buffers must yield at least one element to count as DICOM.
                if !has_preamble && collector.is_empty() {
                    return Err(err.into());
                }
                debug!("Stopping read early: {err}");
                collector.truncated = true;
                break;
            }
        }
    }

    let data_set = DataSet {
        object: collector.root,
        pixel_data: collector.pixel_data,
        // Raw buffers report no transfer syntax, as nothing declared one.
        transfer_syntax: transfer_syntax.filter(|_| has_preamble),
        truncated: collector.truncated || !collector.stack.is_empty(),
    };
    if !has_preamble && data_set.is_empty() && data_set.pixel_data.is_none() {
        return Err(DatasetError::NotDicom);
    }
    Ok(data_set)
}

/// Raw data sets (no preamble) are accepted only when they open on the file
/// meta or identifying group. Explicit VR is assumed when the two bytes after
/// the first tag spell a known VR.
fn raw_transfer_syntax(bytes: &[u8]) -> Option<&'static str> {
    let group = bytes.get(0..2).map(|raw| u16::from_le_bytes([raw[0], raw[1]]))?;
    if group != 0x0002 && group != 0x0008 {
        return None;
    }
    let raw = bytes.get(4..8)?;
    let explicit = raw[..2].iter().all(u8::is_ascii_uppercase)
        && VR::from_binary([raw[0], raw[1]]).is_some();
    Some(if explicit {
        EXPLICIT_VR_LITTLE_ENDIAN
    } else {
        IMPLICIT_VR_LITTLE_ENDIAN
    })
}

enum Frame {
    Sequence {
        tag: Tag,
        items: Vec<InMemDicomObject>,
    },
    Item(InMemDicomObject),
    PixelSequence,
}

/// Folds reader tokens back into nested objects.
struct Collector {
    root: InMemDicomObject,
    stack: Vec<Frame>,
    pending: Option<DataElementHeader>,
    pixel_data: Option<PixelDataLocation>,
    with_pixel_data: bool,
    truncated: bool,
}

impl Collector {
    fn new(with_pixel_data: bool) -> Self {
        Self {
            root: InMemDicomObject::new_empty(),
            stack: Vec::new(),
            pending: None,
            pixel_data: None,
            with_pixel_data,
            truncated: false,
        }
    }

    fn is_empty(&self) -> bool {
        self.root.iter().next().is_none() && self.pixel_data.is_none()
    }

    /// Returns `false` once reading should stop.
    fn push(&mut self, token: DataToken) -> bool {
        match token {
            DataToken::ElementHeader(header) => {
                if self.stack.is_empty() && header.tag == tags::PIXEL_DATA {
                    self.pixel_data = Some(PixelDataLocation {
                        vr: header.vr,
                        length: header.len.get(),
                    });
                    if !self.with_pixel_data {
                        return false;
                    }
                }
                self.pending = Some(header);
            }
            DataToken::PrimitiveValue(value) => {
                if let Some(header) = self.pending.take() {
                    self.put(DataElement::new(header.tag, header.vr, value));
                    if self.stack.is_empty() && header.tag == tags::PIXEL_DATA {
                        return false;
                    }
                }
            }
            DataToken::PixelSequenceStart => {
                if self.stack.is_empty() {
                    self.pixel_data = Some(PixelDataLocation {
                        vr: VR::OB,
                        length: None,
                    });
                    return false;
                }
                self.stack.push(Frame::PixelSequence);
            }
            DataToken::SequenceStart { tag, .. } => {
                self.stack.push(Frame::Sequence {
                    tag,
                    items: Vec::new(),
                });
            }
            DataToken::ItemStart { .. } => {
                if matches!(self.stack.last(), Some(Frame::Sequence { .. })) {
                    self.stack.push(Frame::Item(InMemDicomObject::new_empty()));
                }
            }
            DataToken::ItemEnd => {
                if matches!(self.stack.last(), Some(Frame::Item(_))) {
                    if let Some(Frame::Item(item)) = self.stack.pop() {
                        if let Some(Frame::Sequence { items, .. }) = self.stack.last_mut() {
                            items.push(item);
                        }
                    }
                }
            }
            DataToken::SequenceEnd => {
                if let Some(Frame::Sequence { tag, items }) = self.stack.pop() {
                    self.put(DataElement::new(tag, VR::SQ, DataSetSequence::from(items)));
                }
            }
            _ => {}
        }
        true
    }

    fn put(&mut self, element: InMemElement) {
        match self.stack.last_mut() {
            None => {
                self.root.put(element);
            }
            Some(Frame::Item(item)) => {
                item.put(element);
            }
            // fragments of nested encapsulated pixel data
            Some(_) => {}
        }
    }
}

impl DataSet {
    pub fn object(&self) -> &InMemDicomObject {
        &self.object
    }

    pub fn transfer_syntax(&self) -> Option<&str> {
        self.transfer_syntax.as_deref()
    }

    /// Whether the buffer ended before the read reached Pixel Data or a clean end.
    pub fn truncated(&self) -> bool {
        self.truncated
    }

    pub fn pixel_data(&self) -> Option<PixelDataLocation> {
        self.pixel_data
    }

    /// Native Pixel Data value in little endian byte order, when it was read.
    pub fn pixel_bytes(&self) -> Option<Cow<'_, [u8]>> {
        let element = self.element(tags::PIXEL_DATA)?;
        match element.value() {
            Value::Primitive(PrimitiveValue::U8(bytes)) => Some(Cow::Borrowed(&bytes[..])),
            Value::Primitive(PrimitiveValue::U16(words)) => Some(Cow::Owned(
                words.iter().flat_map(|w| w.to_le_bytes()).collect(),
            )),
            Value::Primitive(PrimitiveValue::I16(words)) => Some(Cow::Owned(
                words.iter().flat_map(|w| w.to_le_bytes()).collect(),
            )),
            Value::Primitive(PrimitiveValue::Empty) => Some(Cow::Borrowed(&[])),
            _ => None,
        }
    }

    /// Number of top-level elements read.
    pub fn len(&self) -> usize {
        self.object.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.object.iter().next().is_none()
    }

    pub fn contains(&self, tag: Tag) -> bool {
        self.element(tag).is_some()
    }

    fn element(&self, tag: Tag) -> Option<&InMemElement> {
        self.object.element(tag).ok()
    }

    /// Text value with DICOM space/NUL padding removed; empty values read as absent.
    pub fn string(&self, tag: Tag) -> Option<String> {
        let element = self.element(tag)?;
        let text = element.to_str().ok()?;
        let trimmed = text.trim_matches(|c: char| c == '\0' || c.is_whitespace());
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }

    /// First value of an unsigned integer attribute, decoded by its VR.
    /// Text VRs are parsed, binary ones (US, UL, SS, SL) converted.
    pub fn unsigned(&self, tag: Tag) -> Option<u32> {
        match self.element(tag)?.value() {
            Value::Primitive(PrimitiveValue::Str(_) | PrimitiveValue::Strs(_)) => {
                let text = self.string(tag)?;
                text.split('\\').next()?.trim().parse().ok()
            }
            Value::Primitive(value) => value.to_int::<u32>().ok(),
            _ => None,
        }
    }

    /// Integer String value. `Some(Err(raw))` keeps the offending text so the
    /// caller can report it.
    pub fn integer_string(&self, tag: Tag) -> Option<Result<i32, String>> {
        let text = self.string(tag)?;
        // Multi-valued strings only contribute their first value.
        let first = text.split('\\').next().unwrap_or_default().trim();
        let parsed = first.parse::<i32>().ok().or_else(|| {
            first
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(|v| v.trunc() as i32)
        });
        Some(parsed.ok_or(text))
    }
}
