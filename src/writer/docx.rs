//! DOCX (WordprocessingML) packaging.
//!
//! Writes the minimal OOXML package Word and LibreOffice open without repair:
//!
//! ```text
//! [Content_Types].xml
//! _rels/.rels
//! docProps/core.xml
//! word/document.xml
//! word/_rels/document.xml.rels
//! word/media/image{n}.jpeg
//! ```
//!
//! Paragraph blocks become one `w:p` per line, tables a bordered `w:tbl`,
//! images an inline `wp:inline` drawing scaled to fit the text column, and
//! page breaks a `w:br w:type="page"` run. Every part is emitted as
//! `quick_xml` events.

use crate::pipeline::assemble::{Block, OutputDocument};
use crate::writer::WriteError;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::borrow::Cow;
use std::io::{Seek, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// EMU per pixel at 96 dpi.
const EMU_PER_PX: u64 = 9525;
/// 6 inches: the text column of a Letter page with 1.25" margins.
const MAX_IMAGE_WIDTH_EMU: u64 = 5_486_400;

const NS_W: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
const NS_R: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const NS_WP: &str = "http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing";
const NS_A: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";
const NS_PIC: &str = "http://schemas.openxmlformats.org/drawingml/2006/picture";
const NS_CONTENT_TYPES: &str = "http://schemas.openxmlformats.org/package/2006/content-types";
const NS_PACKAGE_RELS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
const NS_CORE: &str =
    "http://schemas.openxmlformats.org/package/2006/metadata/core-properties";
const NS_DC: &str = "http://purl.org/dc/elements/1.1/";

const REL_DOCUMENT: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument";
const REL_CORE: &str =
    "http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties";
const REL_IMAGE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";

const BORDERS: [&str; 6] = ["w:top", "w:left", "w:bottom", "w:right", "w:insideH", "w:insideV"];

type XmlResult = Result<(), WriteError>;

/// Write `doc` as a DOCX package into `writer`, returning the writer.
pub fn write_docx<W: Write + Seek>(doc: &OutputDocument, writer: W) -> Result<W, WriteError> {
    let mut zip = ZipWriter::new(writer);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let parts = DocumentParts::build(doc)?;

    zip.start_file("[Content_Types].xml", options)?;
    zip.write_all(&content_types()?)?;

    zip.start_file("_rels/.rels", options)?;
    zip.write_all(&package_relationships()?)?;

    zip.start_file("docProps/core.xml", options)?;
    zip.write_all(&core_properties(doc.title.as_deref())?)?;

    zip.start_file("word/document.xml", options)?;
    zip.write_all(&parts.document_xml)?;

    zip.start_file("word/_rels/document.xml.rels", options)?;
    zip.write_all(&parts.relationships_xml)?;

    // JPEG is already compressed.
    let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    for (name, data) in &parts.media {
        zip.start_file(format!("word/media/{name}"), stored)?;
        zip.write_all(data)?;
    }

    Ok(zip.finish()?)
}

// ── Event helpers ────────────────────────────────────────────────────────

fn element<'a>(name: &'a str, attrs: &[(&'a str, &'a str)]) -> BytesStart<'a> {
    let mut elem = BytesStart::new(name);
    for &attr in attrs {
        elem.push_attribute(attr);
    }
    elem
}

fn start<W: Write>(w: &mut Writer<W>, name: &str, attrs: &[(&str, &str)]) -> XmlResult {
    w.write_event(Event::Start(element(name, attrs)))?;
    Ok(())
}

fn empty<W: Write>(w: &mut Writer<W>, name: &str, attrs: &[(&str, &str)]) -> XmlResult {
    w.write_event(Event::Empty(element(name, attrs)))?;
    Ok(())
}

fn end<W: Write>(w: &mut Writer<W>, name: &str) -> XmlResult {
    w.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

fn text<W: Write>(w: &mut Writer<W>, content: &str) -> XmlResult {
    w.write_event(Event::Text(BytesText::new(&xml_chars(content))))?;
    Ok(())
}

fn simple_element<W: Write>(w: &mut Writer<W>, name: &str, content: &str) -> XmlResult {
    start(w, name, &[])?;
    text(w, content)?;
    end(w, name)
}

/// A fresh part with its XML declaration written.
fn part_writer() -> Result<Writer<Vec<u8>>, WriteError> {
    let mut w = Writer::new(Vec::new());
    w.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))?;
    Ok(w)
}

/// Drop code points XML 1.0 does not allow (C0 controls other than
/// tab/LF/CR, U+FFFE, U+FFFF). Markup escaping is left to `BytesText`.
fn xml_chars(text: &str) -> Cow<'_, str> {
    let allowed = |c: char| {
        matches!(c, '\t' | '\n' | '\r') || (c >= ' ' && c != '\u{FFFE}' && c != '\u{FFFF}')
    };
    if text.chars().all(allowed) {
        Cow::Borrowed(text)
    } else {
        Cow::Owned(text.chars().filter(|&c| allowed(c)).collect())
    }
}

// ── Package parts ────────────────────────────────────────────────────────

fn content_types() -> Result<Vec<u8>, WriteError> {
    let mut w = part_writer()?;
    start(&mut w, "Types", &[("xmlns", NS_CONTENT_TYPES)])?;
    for (extension, content_type) in [
        ("rels", "application/vnd.openxmlformats-package.relationships+xml"),
        ("xml", "application/xml"),
        ("jpeg", "image/jpeg"),
    ] {
        empty(
            &mut w,
            "Default",
            &[("Extension", extension), ("ContentType", content_type)],
        )?;
    }
    for (part, content_type) in [
        (
            "/word/document.xml",
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml",
        ),
        (
            "/docProps/core.xml",
            "application/vnd.openxmlformats-package.core-properties+xml",
        ),
    ] {
        empty(
            &mut w,
            "Override",
            &[("PartName", part), ("ContentType", content_type)],
        )?;
    }
    end(&mut w, "Types")?;
    Ok(w.into_inner())
}

fn package_relationships() -> Result<Vec<u8>, WriteError> {
    let mut w = part_writer()?;
    start(&mut w, "Relationships", &[("xmlns", NS_PACKAGE_RELS)])?;
    empty(
        &mut w,
        "Relationship",
        &[("Id", "rId1"), ("Type", REL_DOCUMENT), ("Target", "word/document.xml")],
    )?;
    empty(
        &mut w,
        "Relationship",
        &[("Id", "rId2"), ("Type", REL_CORE), ("Target", "docProps/core.xml")],
    )?;
    end(&mut w, "Relationships")?;
    Ok(w.into_inner())
}

fn core_properties(title: Option<&str>) -> Result<Vec<u8>, WriteError> {
    let mut w = part_writer()?;
    start(
        &mut w,
        "cp:coreProperties",
        &[("xmlns:cp", NS_CORE), ("xmlns:dc", NS_DC)],
    )?;
    if let Some(title) = title {
        simple_element(&mut w, "dc:title", title)?;
    }
    simple_element(&mut w, "dc:creator", "pdf2docx")?;
    end(&mut w, "cp:coreProperties")?;
    Ok(w.into_inner())
}

/// The main document part, its relationships, and the media they reference.
struct DocumentParts<'a> {
    document_xml: Vec<u8>,
    relationships_xml: Vec<u8>,
    media: Vec<(String, &'a [u8])>,
}

impl<'a> DocumentParts<'a> {
    fn build(doc: &'a OutputDocument) -> Result<Self, WriteError> {
        let mut body = part_writer()?;
        let mut rels = part_writer()?;
        let mut media = Vec::new();

        start(
            &mut body,
            "w:document",
            &[
                ("xmlns:w", NS_W),
                ("xmlns:r", NS_R),
                ("xmlns:wp", NS_WP),
                ("xmlns:a", NS_A),
                ("xmlns:pic", NS_PIC),
            ],
        )?;
        start(&mut body, "w:body", &[])?;
        start(&mut rels, "Relationships", &[("xmlns", NS_PACKAGE_RELS)])?;

        for block in doc.blocks() {
            match block {
                Block::Paragraph(text) => write_paragraphs(&mut body, text)?,
                Block::Table(rows) => write_table(&mut body, rows)?,
                Block::Image(image) => {
                    let n = media.len() + 1;
                    let rel_id = format!("rId{n}");
                    let name = format!("image{n}.jpeg");
                    let target = format!("media/{name}");
                    empty(
                        &mut rels,
                        "Relationship",
                        &[("Id", rel_id.as_str()), ("Type", REL_IMAGE), ("Target", target.as_str())],
                    )?;
                    write_image(&mut body, n, &rel_id, &name, image.width, image.height)?;
                    media.push((name, image.data.as_slice()));
                }
                Block::PageBreak => {
                    start(&mut body, "w:p", &[])?;
                    start(&mut body, "w:r", &[])?;
                    empty(&mut body, "w:br", &[("w:type", "page")])?;
                    end(&mut body, "w:r")?;
                    end(&mut body, "w:p")?;
                }
            }
        }

        write_section_properties(&mut body)?;
        end(&mut body, "w:body")?;
        end(&mut body, "w:document")?;
        end(&mut rels, "Relationships")?;

        Ok(Self {
            document_xml: body.into_inner(),
            relationships_xml: rels.into_inner(),
            media,
        })
    }
}

// ── Body content ─────────────────────────────────────────────────────────

fn write_paragraphs<W: Write>(w: &mut Writer<W>, text: &str) -> XmlResult {
    for line in text.lines() {
        if line.trim().is_empty() {
            empty(w, "w:p", &[])?;
        } else {
            start(w, "w:p", &[])?;
            write_run(w, line)?;
            end(w, "w:p")?;
        }
    }
    Ok(())
}

/// One run; tabs become `w:tab` elements between text nodes.
fn write_run<W: Write>(w: &mut Writer<W>, content: &str) -> XmlResult {
    start(w, "w:r", &[])?;
    for (i, piece) in content.split('\t').enumerate() {
        if i > 0 {
            empty(w, "w:tab", &[])?;
        }
        if !piece.is_empty() {
            start(w, "w:t", &[("xml:space", "preserve")])?;
            text(w, piece)?;
            end(w, "w:t")?;
        }
    }
    end(w, "w:r")
}

fn write_table<W: Write>(w: &mut Writer<W>, rows: &[Vec<String>]) -> XmlResult {
    let columns = rows.iter().map(Vec::len).max().unwrap_or(0);
    if columns == 0 {
        return Ok(());
    }

    start(w, "w:tbl", &[])?;
    start(w, "w:tblPr", &[])?;
    empty(w, "w:tblW", &[("w:w", "0"), ("w:type", "auto")])?;
    start(w, "w:tblBorders", &[])?;
    for border in BORDERS {
        empty(
            w,
            border,
            &[("w:val", "single"), ("w:sz", "4"), ("w:space", "0"), ("w:color", "auto")],
        )?;
    }
    end(w, "w:tblBorders")?;
    end(w, "w:tblPr")?;

    start(w, "w:tblGrid", &[])?;
    for _ in 0..columns {
        empty(w, "w:gridCol", &[])?;
    }
    end(w, "w:tblGrid")?;

    for row in rows {
        start(w, "w:tr", &[])?;
        for c in 0..columns {
            start(w, "w:tc", &[])?;
            start(w, "w:tcPr", &[])?;
            empty(w, "w:tcW", &[("w:w", "0"), ("w:type", "auto")])?;
            end(w, "w:tcPr")?;
            start(w, "w:p", &[])?;
            if let Some(cell) = row.get(c).filter(|cell| !cell.is_empty()) {
                write_run(w, &cell.replace('\n', " "))?;
            }
            end(w, "w:p")?;
            end(w, "w:tc")?;
        }
        end(w, "w:tr")?;
    }
    end(w, "w:tbl")?;
    // Word merges a table directly followed by another; keep them apart.
    empty(w, "w:p", &[])
}

fn write_image<W: Write>(
    w: &mut Writer<W>,
    n: usize,
    rel_id: &str,
    name: &str,
    width: u32,
    height: u32,
) -> XmlResult {
    let (cx, cy) = image_extent_emu(width, height);
    let (cx, cy) = (cx.to_string(), cy.to_string());
    let id = n.to_string();
    let label = format!("Picture {n}");

    start(w, "w:p", &[])?;
    start(w, "w:r", &[])?;
    start(w, "w:drawing", &[])?;
    start(
        w,
        "wp:inline",
        &[("distT", "0"), ("distB", "0"), ("distL", "0"), ("distR", "0")],
    )?;
    empty(w, "wp:extent", &[("cx", cx.as_str()), ("cy", cy.as_str())])?;
    empty(w, "wp:docPr", &[("id", id.as_str()), ("name", label.as_str())])?;
    start(w, "a:graphic", &[])?;
    start(w, "a:graphicData", &[("uri", NS_PIC)])?;
    start(w, "pic:pic", &[])?;

    start(w, "pic:nvPicPr", &[])?;
    empty(w, "pic:cNvPr", &[("id", id.as_str()), ("name", name)])?;
    empty(w, "pic:cNvPicPr", &[])?;
    end(w, "pic:nvPicPr")?;

    start(w, "pic:blipFill", &[])?;
    empty(w, "a:blip", &[("r:embed", rel_id)])?;
    start(w, "a:stretch", &[])?;
    empty(w, "a:fillRect", &[])?;
    end(w, "a:stretch")?;
    end(w, "pic:blipFill")?;

    start(w, "pic:spPr", &[])?;
    start(w, "a:xfrm", &[])?;
    empty(w, "a:off", &[("x", "0"), ("y", "0")])?;
    empty(w, "a:ext", &[("cx", cx.as_str()), ("cy", cy.as_str())])?;
    end(w, "a:xfrm")?;
    start(w, "a:prstGeom", &[("prst", "rect")])?;
    empty(w, "a:avLst", &[])?;
    end(w, "a:prstGeom")?;
    end(w, "pic:spPr")?;

    end(w, "pic:pic")?;
    end(w, "a:graphicData")?;
    end(w, "a:graphic")?;
    end(w, "wp:inline")?;
    end(w, "w:drawing")?;
    end(w, "w:r")?;
    end(w, "w:p")
}

/// Letter, 1" margins.
fn write_section_properties<W: Write>(w: &mut Writer<W>) -> XmlResult {
    start(w, "w:sectPr", &[])?;
    empty(w, "w:pgSz", &[("w:w", "12240"), ("w:h", "15840")])?;
    empty(
        w,
        "w:pgMar",
        &[
            ("w:top", "1440"),
            ("w:right", "1440"),
            ("w:bottom", "1440"),
            ("w:left", "1440"),
            ("w:header", "720"),
            ("w:footer", "720"),
            ("w:gutter", "0"),
        ],
    )?;
    end(w, "w:sectPr")
}

/// Pixel size to EMU at 96 dpi, scaled down to the text column width.
fn image_extent_emu(width: u32, height: u32) -> (u64, u64) {
    let cx = u64::from(width.max(1)) * EMU_PER_PX;
    let cy = u64::from(height.max(1)) * EMU_PER_PX;
    if cx <= MAX_IMAGE_WIDTH_EMU {
        (cx, cy)
    } else {
        (MAX_IMAGE_WIDTH_EMU, (cy * MAX_IMAGE_WIDTH_EMU / cx).max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::ExtractedImage;
    use std::io::{Cursor, Read};
    use zip::ZipArchive;

    fn read_part(bytes: &[u8], name: &str) -> String {
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut part = archive.by_name(name).unwrap();
        let mut out = String::new();
        part.read_to_string(&mut out).unwrap();
        out
    }

    fn docx(doc: &OutputDocument) -> Vec<u8> {
        write_docx(doc, Cursor::new(Vec::new())).unwrap().into_inner()
    }

    #[test]
    fn package_has_required_parts() {
        let mut doc = OutputDocument::new(Some("Q3 <Report>".into()));
        doc.push(Block::Paragraph("Hello".into()));
        let bytes = docx(&doc);

        let archive = ZipArchive::new(Cursor::new(bytes.as_slice())).unwrap();
        let names: Vec<&str> = archive.file_names().collect();
        for part in [
            "[Content_Types].xml",
            "_rels/.rels",
            "docProps/core.xml",
            "word/document.xml",
            "word/_rels/document.xml.rels",
        ] {
            assert!(names.contains(&part), "missing {part}");
        }
        assert!(read_part(&bytes, "docProps/core.xml").contains("Q3 &lt;Report&gt;"));
        assert!(read_part(&bytes, "word/document.xml").contains(">Hello</w:t>"));
        assert!(read_part(&bytes, "[Content_Types].xml")
            .starts_with(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#));
    }

    #[test]
    fn table_has_rows_and_cells() {
        let mut doc = OutputDocument::new(None);
        doc.push(Block::Table(vec![
            vec!["a".into(), "b".into()],
            vec!["c".into(), "d".into()],
        ]));
        let xml = read_part(&docx(&doc), "word/document.xml");

        assert_eq!(xml.matches("<w:tbl>").count(), 1);
        assert_eq!(xml.matches("<w:tr>").count(), 2);
        assert_eq!(xml.matches("<w:tc>").count(), 4);
        let a = xml.find(">a<").unwrap();
        let d = xml.find(">d<").unwrap();
        assert!(a < d);
    }

    #[test]
    fn images_are_embedded_and_referenced() {
        let mut doc = OutputDocument::new(None);
        doc.push(Block::Image(ExtractedImage {
            data: vec![0xFF, 0xD8, 0xFF, 0xD9],
            width: 100,
            height: 50,
            mime_type: "image/jpeg",
        }));
        let bytes = docx(&doc);

        let rels = read_part(&bytes, "word/_rels/document.xml.rels");
        assert!(rels.contains(r#"Id="rId1""#));
        assert!(rels.contains("media/image1.jpeg"));

        let xml = read_part(&bytes, "word/document.xml");
        assert!(xml.contains(r#"r:embed="rId1""#));
        assert!(xml.contains(r#"cx="952500" cy="476250""#));

        let mut archive = ZipArchive::new(Cursor::new(bytes.as_slice())).unwrap();
        let mut media = Vec::new();
        archive
            .by_name("word/media/image1.jpeg")
            .unwrap()
            .read_to_end(&mut media)
            .unwrap();
        assert_eq!(media, vec![0xFF, 0xD8, 0xFF, 0xD9]);
    }

    #[test]
    fn page_break_is_emitted() {
        let mut doc = OutputDocument::new(None);
        doc.push(Block::Paragraph("one".into()));
        doc.push(Block::PageBreak);
        doc.push(Block::Paragraph("two".into()));
        let xml = read_part(&docx(&doc), "word/document.xml");
        assert_eq!(xml.matches(r#"<w:br w:type="page"/>"#).count(), 1);
    }

    #[test]
    fn wide_images_are_scaled_to_column() {
        let (cx, cy) = image_extent_emu(1200, 600);
        assert_eq!(cx, MAX_IMAGE_WIDTH_EMU);
        assert_eq!(cy, MAX_IMAGE_WIDTH_EMU / 2);
    }

    #[test]
    fn text_is_escaped_and_invalid_characters_dropped() {
        let mut doc = OutputDocument::new(None);
        doc.push(Block::Paragraph("a\u{0}b\u{7}c & <d>".into()));
        let xml = read_part(&docx(&doc), "word/document.xml");
        assert!(xml.contains(">abc &amp; &lt;d&gt;</w:t>"), "{xml}");
        assert!(!xml.contains('\u{7}'));
    }

    #[test]
    fn tabs_become_tab_elements() {
        let mut doc = OutputDocument::new(None);
        doc.push(Block::Paragraph("left\tright".into()));
        let xml = read_part(&docx(&doc), "word/document.xml");
        assert!(xml.contains(r#">left</w:t><w:tab/><w:t xml:space="preserve">right<"#), "{xml}");
    }

    #[test]
    fn xml_chars_borrows_clean_text() {
        assert!(matches!(xml_chars("plain\ttext"), Cow::Borrowed(_)));
        assert_eq!(xml_chars("x\u{FFFE}y"), "xy");
    }
}
