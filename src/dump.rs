//
// dump.rs
// Dicom-Ingest-rs
//
// Renders a human-readable listing of the header elements, including sequences, resolving names via the standard dictionary.
//
// Thales Matheus Mendonça Santos - October 2026

use std::fmt::Write;

use dicom::core::dictionary::DataDictionary;
use dicom::core::value::Value;
use dicom::core::{PrimitiveValue, Tag, VR};
use dicom::dictionary_std::StandardDataDictionary;
use dicom::object::InMemDicomObject;
use dicom_dictionary_std::tags;

use crate::dataset::DataSet;

pub fn dump_to_string(data_set: &DataSet, max_depth: usize, max_value_len: usize) -> String {
    let mut out = String::new();
    if let Some(uid) = data_set.transfer_syntax() {
        let _ = writeln!(out, "Transfer Syntax: {}", uid);
    }
    dump_object(data_set.object(), 0, max_depth, max_value_len, &mut out);

    // The header read stops before the Pixel Data value, so only its header is shown.
    match data_set.pixel_data() {
        Some(location) => {
            let size = match location.length {
                Some(len) => format!("{} bytes", len),
                None => "encapsulated".to_string(),
            };
            let _ = writeln!(
                out,
                "{} {} {} [{}]",
                format_tag(tags::PIXEL_DATA),
                tag_name(tags::PIXEL_DATA),
                location.vr,
                size
            );
        }
        None if data_set.truncated() => {
            let _ = writeln!(out, "... header window ends here");
        }
        None => {}
    }
    out
}

fn dump_object(
    obj: &InMemDicomObject,
    depth: usize,
    max_depth: usize,
    max_value_len: usize,
    out: &mut String,
) {
    for elem in obj.iter() {
        let tag = elem.header().tag;
        let vr = elem.header().vr;
        let name = tag_name(tag);
        let indent = "  ".repeat(depth);

        match elem.value() {
            Value::Primitive(p) => {
                let preview = preview_primitive(p, vr, max_value_len);
                let _ = writeln!(
                    out,
                    "{}{} {} {} {}",
                    indent,
                    format_tag(tag),
                    name,
                    vr,
                    preview
                );
            }
            Value::Sequence(seq) => {
                let _ = writeln!(
                    out,
                    "{}{} {} {} [sequence: {} item(s)]",
                    indent,
                    format_tag(tag),
                    name,
                    vr,
                    seq.items().len()
                );
                if depth < max_depth {
                    for (idx, item) in seq.items().iter().enumerate() {
                        let _ = writeln!(out, "{}  Item {}", indent, idx + 1);
                        dump_object(item, depth + 2, max_depth, max_value_len, out);
                    }
                }
            }
            Value::PixelSequence(p) => {
                let _ = writeln!(
                    out,
                    "{}{} {} {} [encapsulated: {} fragment(s)]",
                    indent,
                    format_tag(tag),
                    name,
                    vr,
                    p.fragments().len()
                );
            }
        }
    }
}

fn preview_primitive(value: &PrimitiveValue, vr: VR, max_value_len: usize) -> String {
    // Byte streams print as long number lists; a size says more.
    if matches!(vr, VR::OB | VR::OW | VR::UN) {
        return format!("{} bytes", value.to_bytes().len());
    }
    let text = value.to_str();
    if !text.is_empty() {
        return truncate(&text, max_value_len);
    }
    format!("{} bytes", value.to_bytes().len())
}

fn truncate(input: &str, limit: usize) -> String {
    if input.chars().count() <= limit {
        input.to_string()
    } else {
        let mut truncated: String = input.chars().take(limit).collect();
        truncated.push('…');
        truncated
    }
}

fn format_tag(tag: Tag) -> String {
    format!("({:04X},{:04X})", tag.group(), tag.element())
}

fn tag_name(tag: Tag) -> String {
    StandardDataDictionary
        .by_tag(tag)
        .map(|e| e.alias.to_string())
        .unwrap_or_else(|| "UnknownTag".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset;

    #[test]
    fn lists_names_and_values() {
        let mut body = Vec::new();
        body.extend_from_slice(&[0x08, 0x00, 0x60, 0x00, b'C', b'S', 2, 0, b'C', b'T']);
        body.extend_from_slice(&[0x28, 0x00, 0x10, 0x00, b'U', b'S', 2, 0, 0x00, 0x02]);
        let data_set = dataset::walk(&body).expect("walk");

        let out = dump_to_string(&data_set, 4, 64);
        assert!(out.contains("(0008,0060) Modality CS CT"));
        assert!(out.contains("(0028,0010) Rows US 512"));
    }

    #[test]
    fn sequence_items_are_indented() {
        let mut body = Vec::new();
        body.extend_from_slice(&[0x08, 0x00, 0x60, 0x00, b'C', b'S', 2, 0, b'M', b'R']);
        // (0008,1140) SQ, undefined length, one item holding (0008,1155)
        body.extend_from_slice(&[0x08, 0x00, 0x40, 0x11, b'S', b'Q', 0, 0, 0xFF, 0xFF, 0xFF, 0xFF]);
        body.extend_from_slice(&[0xFE, 0xFF, 0x00, 0xE0, 0xFF, 0xFF, 0xFF, 0xFF]);
        body.extend_from_slice(&[0x08, 0x00, 0x55, 0x11, b'U', b'I', 6, 0]);
        body.extend_from_slice(b"1.2.3\0");
        body.extend_from_slice(&[0xFE, 0xFF, 0x0D, 0xE0, 0, 0, 0, 0]);
        body.extend_from_slice(&[0xFE, 0xFF, 0xDD, 0xE0, 0, 0, 0, 0]);
        let data_set = dataset::walk(&body).expect("walk");

        let out = dump_to_string(&data_set, 4, 64);
        assert!(out.contains("[sequence: 1 item(s)]"));
        assert!(out.contains("    (0008,1155) ReferencedSOPInstanceUID UI 1.2.3"));

        let shallow = dump_to_string(&data_set, 0, 64);
        assert!(!shallow.contains("(0008,1155)"));
    }

    #[test]
    fn truncates_long_values() {
        assert_eq!(truncate("abcdef", 3), "abc…");
        assert_eq!(truncate("abc", 3), "abc");
    }
}
