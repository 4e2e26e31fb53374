//! PDF compression with `lopdf`.
//!
//! Pages are copied one by one into a fresh document with a flat page tree.
//! Everything outside the pages (outlines, name trees, forms, metadata) is
//! left behind. Streams are Flate-compressed and the remaining objects are
//! packed into object streams behind a cross-reference stream.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use async_trait::async_trait;
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};

use super::{Compressor, Parameter};
use crate::error::{Error, Result};

/// Object streams need PDF 1.5.
const MIN_VERSION: &str = "1.5";

/// Objects packed into one object stream.
const OBJECTS_PER_STREAM: usize = 100;

/// Page attributes a page may inherit from its ancestors.
const INHERITABLE: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Rewrites PDFs into a compact, stream-compressed document.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfCompressor;

#[async_trait]
impl Compressor for PdfCompressor {
    fn name(&self) -> &'static str {
        "pdf"
    }

    fn parameter(&self, _size: u64) -> Parameter {
        Parameter::StreamCompression
    }

    fn output_extension(&self, _input: &Path) -> String {
        "pdf".to_string()
    }

    async fn compress(&self, input: &Path, output: &Path, _parameter: Parameter) -> Result<()> {
        let input = input.to_path_buf();
        let output = output.to_path_buf();

        tokio::task::spawn_blocking(move || {
            let doc = Document::load(&input)?;
            let pages = rewrite(&doc, &output)?;
            tracing::debug!(pages, file = %input.display(), "Rewrote PDF");
            Ok(())
        })
        .await
        .map_err(|e| Error::Internal(format!("pdf task failed: {e}")))?
    }
}

/// Copy the pages of `doc` into a new document and save it to `output`,
/// returning the page count.
pub fn rewrite(doc: &Document, output: &Path) -> Result<usize> {
    if doc.is_encrypted() {
        return Err(Error::InvalidInput(
            "encrypted PDFs cannot be compressed".to_string(),
        ));
    }

    let pages: Vec<ObjectId> = doc.get_pages().into_values().collect();
    if pages.is_empty() {
        return Err(Error::InvalidInput("PDF has no pages".to_string()));
    }

    let mut copy = copy_pages(doc, &pages)?;
    copy.compress();

    let mut bytes = Vec::new();
    write_packed(&copy, &mut bytes)?;

    tracing::trace!(
        source_objects = doc.objects.len(),
        copied_objects = copy.objects.len(),
        size = bytes.len(),
        "Packed PDF"
    );

    let mut writer = BufWriter::new(File::create(output)?);
    writer.write_all(&bytes)?;
    writer.flush()?;

    Ok(pages.len())
}

/// Build a new document holding only `pages` and what they reference.
fn copy_pages(source: &Document, pages: &[ObjectId]) -> Result<Document> {
    let version = if source.version.as_str() > MIN_VERSION {
        source.version.as_str()
    } else {
        MIN_VERSION
    };
    let mut copier = PageCopier {
        source,
        target: Document::with_version(version),
        ids: HashMap::new(),
        excluded: HashSet::new(),
        queue: VecDeque::new(),
    };

    let pages_id = copier.target.new_object_id();
    if let Ok(root) = source.trailer.get(b"Root").and_then(Object::as_reference) {
        copier.excluded.insert(root);
    }
    for &page in pages {
        let new_id = copier.target.new_object_id();
        copier.ids.insert(page, new_id);
        for ancestor in ancestors(source, page) {
            copier.excluded.insert(ancestor);
        }
    }

    let mut kids = Vec::with_capacity(pages.len());
    for &page in pages {
        let mut dict = source.get_dictionary(page)?.clone();
        for key in INHERITABLE {
            if !dict.has(key) {
                if let Some(value) = inherited(source, page, key) {
                    dict.set(key.to_vec(), value.clone());
                }
            }
        }
        dict.remove(b"Parent");

        let mut dict = copier.map_dictionary(&dict);
        dict.set("Parent", pages_id);

        let new_id = copier.ids[&page];
        copier.target.objects.insert(new_id, Object::Dictionary(dict));
        kids.push(Object::Reference(new_id));
    }
    copier.drain()?;

    let count = i64::try_from(kids.len()).unwrap_or(i64::MAX);
    let mut target = copier.target;
    target.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = target.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    target.trailer.set("Root", catalog_id);

    Ok(target)
}

/// Page tree nodes above `page`.
fn ancestors(doc: &Document, page: ObjectId) -> Vec<ObjectId> {
    let mut found = Vec::new();
    let mut current = page;
    while let Some(parent) = doc
        .get_dictionary(current)
        .ok()
        .and_then(|d| d.get(b"Parent").ok())
        .and_then(|p| p.as_reference().ok())
    {
        if parent == page || found.contains(&parent) {
            break;
        }
        found.push(parent);
        current = parent;
    }
    found
}

fn inherited<'a>(doc: &'a Document, page: ObjectId, key: &[u8]) -> Option<&'a Object> {
    ancestors(doc, page)
        .into_iter()
        .find_map(|node| doc.get_dictionary(node).ok()?.get(key).ok())
}

struct PageCopier<'a> {
    source: &'a Document,
    target: Document,
    /// Source id to target id.
    ids: HashMap<ObjectId, ObjectId>,
    /// Catalog and page tree nodes; references to them become null.
    excluded: HashSet<ObjectId>,
    /// Objects given a target id but not copied yet.
    queue: VecDeque<(ObjectId, ObjectId)>,
}

impl PageCopier<'_> {
    fn drain(&mut self) -> Result<()> {
        while let Some((old, new)) = self.queue.pop_front() {
            let source = self.source;
            let object = source.get_object(old)?;
            let copied = self.map_object(object);
            self.target.objects.insert(new, copied);
        }
        Ok(())
    }

    fn map_reference(&mut self, id: ObjectId) -> Object {
        if let Some(&new) = self.ids.get(&id) {
            return Object::Reference(new);
        }
        if self.excluded.contains(&id) || self.source.get_object(id).is_err() {
            return Object::Null;
        }
        let new = self.target.new_object_id();
        self.ids.insert(id, new);
        self.queue.push_back((id, new));
        Object::Reference(new)
    }

    fn map_object(&mut self, object: &Object) -> Object {
        match object {
            Object::Reference(id) => self.map_reference(*id),
            Object::Array(items) => {
                Object::Array(items.iter().map(|item| self.map_object(item)).collect())
            }
            Object::Dictionary(dict) => Object::Dictionary(self.map_dictionary(dict)),
            Object::Stream(stream) => Object::Stream(Stream {
                dict: self.map_dictionary(&stream.dict),
                content: stream.content.clone(),
                allows_compression: stream.allows_compression,
                start_position: None,
            }),
            other => other.clone(),
        }
    }

    fn map_dictionary(&mut self, dict: &Dictionary) -> Dictionary {
        let mut mapped = Dictionary::new();
        for (key, value) in dict.iter() {
            mapped.set(key.clone(), self.map_object(value));
        }
        mapped
    }
}

enum XrefEntry {
    Offset(usize),
    Packed { container: u32, index: u16 },
}

/// Serialize `doc` with its non-stream objects packed into object streams
/// and a cross-reference stream in place of the xref table.
fn write_packed(doc: &Document, out: &mut Vec<u8>) -> Result<()> {
    writeln!(out, "%PDF-{}", doc.version)?;
    out.extend_from_slice(b"%\xE2\xE3\xCF\xD3\n");

    let mut entries: BTreeMap<u32, XrefEntry> = BTreeMap::new();
    let mut packable = Vec::new();
    for (&(id, generation), object) in &doc.objects {
        if generation == 0 && !matches!(object, Object::Stream(_)) {
            packable.push((id, object));
        } else {
            entries.insert(id, XrefEntry::Offset(out.len()));
            write_indirect(out, (id, generation), object)?;
        }
    }

    let mut next_id = doc.max_id + 1;
    for chunk in packable.chunks(OBJECTS_PER_STREAM) {
        let container = next_id;
        next_id += 1;

        let mut header = Vec::new();
        let mut body = Vec::new();
        for (index, &(id, object)) in (0u16..).zip(chunk) {
            write!(header, "{id} {} ", body.len())?;
            write_object(&mut body, object)?;
            body.push(b'\n');
            entries.insert(id, XrefEntry::Packed { container, index });
        }

        let first = header.len();
        header.extend_from_slice(&body);
        let mut stream = Stream::new(
            dictionary! {
                "Type" => "ObjStm",
                "N" => len_i64(chunk.len()),
                "First" => len_i64(first),
            },
            header,
        );
        stream.compress()?;

        entries.insert(container, XrefEntry::Offset(out.len()));
        write_indirect(out, (container, 0), &Object::Stream(stream))?;
    }

    let xref_id = next_id;
    let xref_offset = out.len();
    entries.insert(xref_id, XrefEntry::Offset(xref_offset));

    let size = xref_id + 1;
    let mut table = Vec::new();
    for id in 0..size {
        let (kind, field, extra): (u8, u32, u16) = match entries.get(&id) {
            Some(XrefEntry::Offset(offset)) => (1, offset_u32(*offset)?, 0),
            Some(XrefEntry::Packed { container, index }) => (2, *container, *index),
            None if id == 0 => (0, 0, u16::MAX),
            None => (0, 0, 0),
        };
        table.push(kind);
        table.extend_from_slice(&field.to_be_bytes());
        table.extend_from_slice(&extra.to_be_bytes());
    }

    let mut dict = dictionary! {
        "Type" => "XRef",
        "Size" => i64::from(size),
        "W" => vec![Object::Integer(1), Object::Integer(4), Object::Integer(2)],
    };
    if let Ok(root) = doc.trailer.get(b"Root") {
        dict.set("Root", root.clone());
    }
    let mut xref = Stream::new(dict, table);
    xref.compress()?;
    write_indirect(out, (xref_id, 0), &Object::Stream(xref))?;

    writeln!(out, "startxref\n{xref_offset}\n%EOF")?;
    Ok(())
}

fn len_i64(len: usize) -> i64 {
    i64::try_from(len).unwrap_or(i64::MAX)
}

fn offset_u32(offset: usize) -> Result<u32> {
    u32::try_from(offset)
        .map_err(|_| Error::InvalidInput("PDF output exceeds 4 GiB".to_string()))
}

fn write_indirect(out: &mut Vec<u8>, (id, generation): ObjectId, object: &Object) -> io::Result<()> {
    writeln!(out, "{id} {generation} obj")?;
    write_object(out, object)?;
    out.extend_from_slice(b"\nendobj\n");
    Ok(())
}

fn write_object(out: &mut Vec<u8>, object: &Object) -> io::Result<()> {
    match object {
        Object::Null => out.extend_from_slice(b"null"),
        Object::Boolean(value) => write!(out, "{value}")?,
        Object::Integer(value) => write!(out, "{value}")?,
        Object::Real(value) if value.is_finite() => write!(out, "{value}")?,
        Object::Real(_) => out.push(b'0'),
        Object::Name(name) => write_name(out, name),
        Object::String(text, StringFormat::Literal) => write_literal(out, text),
        Object::String(text, StringFormat::Hexadecimal) => {
            out.push(b'<');
            for byte in text {
                write!(out, "{byte:02X}")?;
            }
            out.push(b'>');
        }
        Object::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b' ');
                }
                write_object(out, item)?;
            }
            out.push(b']');
        }
        Object::Dictionary(dict) => write_dictionary(out, dict)?,
        Object::Stream(stream) => {
            let mut dict = stream.dict.clone();
            dict.set("Length", len_i64(stream.content.len()));
            write_dictionary(out, &dict)?;
            out.extend_from_slice(b"\nstream\n");
            out.extend_from_slice(&stream.content);
            out.extend_from_slice(b"\nendstream");
        }
        Object::Reference((id, generation)) => write!(out, "{id} {generation} R")?,
    }
    Ok(())
}

fn write_dictionary(out: &mut Vec<u8>, dict: &Dictionary) -> io::Result<()> {
    out.extend_from_slice(b"<<");
    for (key, value) in dict.iter() {
        write_name(out, key);
        out.push(b' ');
        write_object(out, value)?;
        out.push(b' ');
    }
    out.extend_from_slice(b">>");
    Ok(())
}

fn write_name(out: &mut Vec<u8>, name: &[u8]) {
    out.push(b'/');
    for &byte in name {
        if b" \t\n\r\x0C()<>[]{}/%#".contains(&byte) || !(33..=126).contains(&byte) {
            out.extend_from_slice(format!("#{byte:02X}").as_bytes());
        } else {
            out.push(byte);
        }
    }
}

fn write_literal(out: &mut Vec<u8>, text: &[u8]) {
    out.push(b'(');
    for &byte in text {
        match byte {
            b'(' | b')' | b'\\' => out.extend_from_slice(&[b'\\', byte]),
            b'\r' => out.extend_from_slice(b"\\r"),
            _ => out.push(byte),
        }
    }
    out.push(b')');
}
