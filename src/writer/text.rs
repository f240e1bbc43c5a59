//! Plain-text rendering.
//!
//! Blocks within a page are separated by a blank line and pages by a form
//! feed on its own line. Tables become tab-separated rows; images, which have
//! no text form, leave a placeholder so the reader knows something was there.

use crate::pipeline::assemble::{Block, OutputDocument};

const PAGE_SEPARATOR: &str = "\n\x0C\n";

pub fn render_text(doc: &OutputDocument) -> String {
    let mut pages: Vec<Vec<String>> = vec![Vec::new()];

    for block in doc.blocks() {
        let current = match block {
            Block::PageBreak => {
                pages.push(Vec::new());
                continue;
            }
            Block::Paragraph(text) => text.trim_end().to_string(),
            Block::Table(rows) => rows
                .iter()
                .map(|row| {
                    row.iter()
                        .map(|cell| cell.replace(['\t', '\n'], " "))
                        .collect::<Vec<_>>()
                        .join("\t")
                })
                .collect::<Vec<_>>()
                .join("\n"),
            Block::Image(image) => format!("[image {}x{}]", image.width, image.height),
        };
        if let Some(page) = pages.last_mut() {
            page.push(current);
        }
    }

    let mut out = pages
        .iter()
        .map(|blocks| blocks.join("\n\n"))
        .collect::<Vec<_>>()
        .join(PAGE_SEPARATOR);
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::ExtractedImage;

    #[test]
    fn renders_blocks_and_pages() {
        let mut doc = OutputDocument::new(None);
        doc.push(Block::Paragraph("Hello\nworld\n".into()));
        doc.push(Block::Table(vec![
            vec!["a".into(), "b".into()],
            vec!["c".into(), "d".into()],
        ]));
        doc.push(Block::PageBreak);
        doc.push(Block::Image(ExtractedImage {
            data: Vec::new(),
            width: 20,
            height: 10,
            mime_type: "image/jpeg",
        }));

        assert_eq!(
            render_text(&doc),
            "Hello\nworld\n\na\tb\nc\td\n\x0C\n[image 20x10]\n"
        );
    }

    #[test]
    fn cell_tabs_do_not_break_columns() {
        let mut doc = OutputDocument::new(None);
        doc.push(Block::Table(vec![vec!["x\ty".into(), "z".into()]]));
        assert_eq!(render_text(&doc), "x y\tz\n");
    }

    #[test]
    fn empty_document_is_empty() {
        assert_eq!(render_text(&OutputDocument::new(None)), "");
    }
}
