//! Walks the decoded content tree and builds the document body.

use log::{error, info, warn};

use crate::layout::ParagraphStyle;
use crate::media::{EncodedImage, ImageResolver};
use crate::model::{ContentItem, Document, ImageRef};

const DEFAULT_ALT: &str = "no description";

#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Text(String),
    Picture(Picture),
    Break,
}

/// An inline picture referencing `Body::media[media]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Picture {
    pub media: usize,
    pub cx: u64,
    pub cy: u64,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Paragraph {
    pub style: ParagraphStyle,
    pub segments: Vec<Segment>,
}

impl Paragraph {
    pub fn new(style: ParagraphStyle) -> Self {
        Self {
            style,
            segments: Vec::new(),
        }
    }

    pub fn with_text(style: ParagraphStyle, text: &str) -> Self {
        let mut p = Self::new(style);
        p.push_text(text);
        p
    }

    pub fn push_text(&mut self, text: impl Into<String>) {
        self.segments.push(Segment::Text(text.into()));
    }

    pub fn has_runs(&self) -> bool {
        !self.segments.is_empty()
    }

    /// Concatenated text of all text runs.
    pub fn text(&self) -> String {
        self.segments
            .iter()
            .filter_map(|s| match s {
                Segment::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableCell {
    pub blocks: Vec<Block>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    pub cells: Vec<TableCell>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub columns: usize,
    pub rows: Vec<TableRow>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Paragraph(Paragraph),
    Table(Table),
}

/// Everything needed to write `word/document.xml` and its media.
#[derive(Debug, Default)]
pub struct Body {
    pub title: Option<String>,
    pub blocks: Vec<Block>,
    pub media: Vec<EncodedImage>,
}

impl Body {
    /// Top-level paragraphs, skipping tables.
    pub fn paragraphs(&self) -> impl Iterator<Item = &Paragraph> {
        self.blocks.iter().filter_map(|b| match b {
            Block::Paragraph(p) => Some(p),
            Block::Table(_) => None,
        })
    }
}

/// Block list plus the paragraph currently receiving runs.
///
/// The open paragraph is appended to `blocks` when it is closed, so block
/// order always matches the order in which paragraphs were opened.
#[derive(Debug, Default)]
struct Flow {
    blocks: Vec<Block>,
    current: Option<Paragraph>,
}

impl Flow {
    /// Flow whose cursor already sits on an empty paragraph.
    fn seeded(style: ParagraphStyle) -> Self {
        Self {
            blocks: Vec::new(),
            current: Some(Paragraph::new(style)),
        }
    }

    fn reset(&mut self) {
        if let Some(p) = self.current.take() {
            self.blocks.push(Block::Paragraph(p));
        }
    }

    /// The open paragraph, opening one with `style` if there is none.
    fn paragraph(&mut self, style: ParagraphStyle) -> &mut Paragraph {
        self.current.get_or_insert_with(|| Paragraph::new(style))
    }

    fn start(&mut self, style: ParagraphStyle) -> &mut Paragraph {
        self.reset();
        self.current.insert(Paragraph::new(style))
    }

    fn has_runs(&self) -> bool {
        self.current.as_ref().is_some_and(Paragraph::has_runs)
    }

    fn push_block(&mut self, block: Block) {
        self.reset();
        self.blocks.push(block);
    }

    fn finish(mut self) -> Vec<Block> {
        self.reset();
        self.blocks
    }
}

fn text_style(in_options: bool) -> ParagraphStyle {
    if in_options {
        ParagraphStyle::Option
    } else {
        ParagraphStyle::Body
    }
}

pub struct DocumentAssembler<'r> {
    resolver: &'r ImageResolver,
    media: Vec<EncodedImage>,
}

impl<'r> DocumentAssembler<'r> {
    pub fn new(resolver: &'r ImageResolver) -> Self {
        Self {
            resolver,
            media: Vec::new(),
        }
    }

    pub fn assemble(mut self, doc: &Document) -> Body {
        let mut flow = Flow::default();

        if let Some(title) = &doc.title {
            flow.push_block(Block::Paragraph(Paragraph::with_text(
                ParagraphStyle::Title,
                title,
            )));
        }

        for section in &doc.sections {
            flow.reset();
            if let Some(title) = &section.title {
                flow.push_block(Block::Paragraph(Paragraph::with_text(
                    ParagraphStyle::Section,
                    title,
                )));
            }
            for question in &section.questions {
                flow.reset();
                for item in &question.content {
                    self.walk(&mut flow, item, false);
                }
            }
        }

        let blocks = flow.finish();
        info!(
            "assembled {} blocks with {} embedded images",
            blocks.len(),
            self.media.len()
        );
        Body {
            title: doc.title.clone(),
            blocks,
            media: self.media,
        }
    }

    fn walk(&mut self, flow: &mut Flow, item: &ContentItem, in_options: bool) {
        match item {
            ContentItem::Text(text) => flow.paragraph(text_style(in_options)).push_text(text.as_str()),
            ContentItem::Image(image) => self.place_image(flow, image, in_options),
            ContentItem::Options(entries) => {
                for entry in entries {
                    flow.start(ParagraphStyle::Option);
                    self.walk(flow, entry, true);
                }
            }
            ContentItem::Table(rows) => {
                flow.reset();
                if let Some(table) = self.build_table(rows) {
                    flow.push_block(Block::Table(table));
                }
            }
            ContentItem::Nested(items) => {
                for child in items {
                    self.walk(flow, child, in_options);
                }
            }
        }
    }

    fn place_image(&mut self, flow: &mut Flow, image: &ImageRef, in_options: bool) {
        let style = text_style(in_options);
        let alt = image.alt.as_deref();

        let Some(src) = image.src.as_deref() else {
            flow.paragraph(style)
                .push_text(format!("[image: {}]", alt.unwrap_or(DEFAULT_ALT)));
            return;
        };

        let loaded = match self.resolver.load(src) {
            Ok(loaded) => loaded,
            Err(e) => {
                warn!("{e}");
                flow.paragraph(style)
                    .push_text(format!("[image load failed: {}]", alt.unwrap_or(DEFAULT_ALT)));
                return;
            }
        };

        let standalone = loaded.is_standalone(in_options);
        if standalone && flow.has_runs() {
            flow.start(ParagraphStyle::Body);
        }

        let encoded = match loaded.encode() {
            Ok(encoded) => encoded,
            Err(e) => {
                error!("failed to insert image {src}: {e}");
                flow.paragraph(style)
                    .push_text(format!("[image insert failed: {}]", alt.unwrap_or_default()));
                return;
            }
        };

        let (cx, cy) = loaded.extent_emu(in_options);
        self.media.push(encoded);
        let paragraph = flow.paragraph(style);
        paragraph.segments.push(Segment::Picture(Picture {
            media: self.media.len() - 1,
            cx,
            cy,
            description: alt.unwrap_or_default().to_owned(),
        }));
        if standalone {
            paragraph.segments.push(Segment::Break);
        }
    }

    /// Columns follow the widest row; missing cells stay empty.
    fn build_table(&mut self, rows: &[Vec<ContentItem>]) -> Option<Table> {
        let columns = rows.iter().map(Vec::len).max().unwrap_or(0);
        if columns == 0 {
            warn!("skipping table with {} rows and no cells", rows.len());
            return None;
        }

        let mut table = Table {
            columns,
            rows: Vec::with_capacity(rows.len()),
        };
        for row in rows {
            let mut cells = Vec::with_capacity(columns);
            for j in 0..columns {
                let mut cell = Flow::seeded(ParagraphStyle::Normal);
                if let Some(item) = row.get(j) {
                    self.walk(&mut cell, item, false);
                }
                cells.push(TableCell {
                    blocks: cell.finish(),
                });
            }
            table.rows.push(TableRow { cells });
        }
        Some(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use std::path::Path;

    fn assemble(json: &str, dir: &Path) -> Body {
        let doc = Document::from_json_str(json).unwrap();
        let resolver = ImageResolver::with_base_dir(Some(dir.to_path_buf()));
        DocumentAssembler::new(&resolver).assemble(&doc)
    }

    fn write_png(dir: &Path, name: &str, height: u32) {
        RgbImage::from_pixel(10, height, Rgb([0, 0, 0]))
            .save(dir.join(name))
            .unwrap();
    }

    fn paragraph(block: &Block) -> &Paragraph {
        match block {
            Block::Paragraph(p) => p,
            Block::Table(_) => panic!("expected paragraph, found table"),
        }
    }

    fn pictures(p: &Paragraph) -> usize {
        p.segments
            .iter()
            .filter(|s| matches!(s, Segment::Picture(_)))
            .count()
    }

    #[test]
    fn minimal_document_has_only_a_title() {
        let dir = tempfile::tempdir().unwrap();
        let body = assemble(r#"{"title": "T", "sections": []}"#, dir.path());
        assert_eq!(body.blocks.len(), 1);
        let title = paragraph(&body.blocks[0]);
        assert_eq!(title.style, ParagraphStyle::Title);
        assert_eq!(title.text(), "T");
    }

    #[test]
    fn question_text_shares_one_body_paragraph() {
        let dir = tempfile::tempdir().unwrap();
        let body = assemble(
            r#"{"sections": [{"title": "S1", "questions": [
                {"content": ["1. ", {"content": ["what", " is"]}]},
                {"content": ["2. next"]}
            ]}]}"#,
            dir.path(),
        );
        let styles: Vec<_> = body.paragraphs().map(|p| p.style).collect();
        assert_eq!(
            styles,
            vec![ParagraphStyle::Section, ParagraphStyle::Body, ParagraphStyle::Body]
        );
        assert_eq!(paragraph(&body.blocks[1]).text(), "1. what is");
        assert_eq!(paragraph(&body.blocks[2]).text(), "2. next");
    }

    #[test]
    fn each_option_gets_its_own_paragraph() {
        let dir = tempfile::tempdir().unwrap();
        let body = assemble(
            r#"{"sections": [{"questions": [{"content": [
                "Pick one",
                {"type": "options", "content": ["A. x", "B. y", ["C. ", "z"]]},
                "tail"
            ]}]}]}"#,
            dir.path(),
        );
        let texts: Vec<_> = body.paragraphs().map(|p| (p.style, p.text())).collect();
        assert_eq!(
            texts,
            vec![
                (ParagraphStyle::Body, "Pick one".to_string()),
                (ParagraphStyle::Option, "A. x".to_string()),
                (ParagraphStyle::Option, "B. y".to_string()),
                (ParagraphStyle::Option, "C. ztail".to_string()),
            ]
        );
    }

    #[test]
    fn ragged_table_is_padded_and_resets_the_cursor() {
        let dir = tempfile::tempdir().unwrap();
        let body = assemble(
            r#"{"sections": [{"questions": [{"content": [
                "before",
                {"type": "table", "content": [["a", "b"], ["c"]]},
                "after"
            ]}]}]}"#,
            dir.path(),
        );
        assert_eq!(body.blocks.len(), 3);
        let Block::Table(table) = &body.blocks[1] else {
            panic!("expected table");
        };
        assert_eq!(table.columns, 2);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[1].cells.len(), 2);

        let first = paragraph(&table.rows[0].cells[0].blocks[0]);
        assert_eq!(first.style, ParagraphStyle::Normal);
        assert_eq!(first.text(), "a");
        assert_eq!(
            table.rows[1].cells[1].blocks,
            vec![Block::Paragraph(Paragraph::new(ParagraphStyle::Normal))]
        );
        assert_eq!(paragraph(&body.blocks[2]).text(), "after");
    }

    #[test]
    fn empty_tables_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let body = assemble(
            r#"{"sections": [{"questions": [{"content": [
                {"type": "table", "content": []},
                {"type": "table", "content": [[], []]}
            ]}]}]}"#,
            dir.path(),
        );
        assert!(body.blocks.is_empty());
    }

    #[test]
    fn tables_inside_cells_nest() {
        let dir = tempfile::tempdir().unwrap();
        let body = assemble(
            r#"{"sections": [{"questions": [{"content": [
                {"type": "table", "content": [[["x", {"type": "table", "content": [["y"]]}]]]}
            ]}]}]}"#,
            dir.path(),
        );
        let Block::Table(outer) = &body.blocks[0] else {
            panic!("expected table");
        };
        let cell = &outer.rows[0].cells[0].blocks;
        assert_eq!(cell.len(), 2);
        assert_eq!(paragraph(&cell[0]).text(), "x");
        assert!(matches!(cell[1], Block::Table(_)));
    }

    #[test]
    fn missing_images_become_placeholders() {
        let dir = tempfile::tempdir().unwrap();
        let body = assemble(
            r#"{"sections": [{"questions": [{"content": [
                {"type": "image", "src": "gone.png", "alt": "diagram"},
                {"type": "image", "src": "gone.png"},
                {"type": "image", "alt": "nothing"}
            ]}]}]}"#,
            dir.path(),
        );
        assert!(body.media.is_empty());
        assert_eq!(
            paragraph(&body.blocks[0]).text(),
            "[image load failed: diagram][image load failed: no description][image: nothing]"
        );
    }

    #[test]
    fn large_image_after_text_opens_a_new_line() {
        let dir = tempfile::tempdir().unwrap();
        write_png(dir.path(), "big.png", 120);
        let body = assemble(
            r#"{"sections": [{"questions": [{"content": [
                "see figure", {"type": "image", "src": "big.png"}, "below"
            ]}]}]}"#,
            dir.path(),
        );
        assert_eq!(body.media.len(), 1);
        assert_eq!(body.blocks.len(), 2);
        assert_eq!(paragraph(&body.blocks[0]).text(), "see figure");

        let figure = paragraph(&body.blocks[1]);
        assert_eq!(figure.style, ParagraphStyle::Body);
        assert!(matches!(figure.segments[0], Segment::Picture(_)));
        assert_eq!(figure.segments[1], Segment::Break);
        assert_eq!(figure.text(), "below");
    }

    #[test]
    fn small_images_stay_inline() {
        let dir = tempfile::tempdir().unwrap();
        write_png(dir.path(), "small.png", 40);
        let body = assemble(
            r#"{"sections": [{"questions": [{"content": [
                "x = ", {"type": "image", "url": "small.png"}, " cm"
            ]}]}]}"#,
            dir.path(),
        );
        assert_eq!(body.blocks.len(), 1);
        let p = paragraph(&body.blocks[0]);
        assert_eq!(pictures(p), 1);
        assert!(!p.segments.contains(&Segment::Break));
        let Segment::Picture(picture) = &p.segments[1] else {
            panic!("expected picture");
        };
        assert_eq!(picture.cy, crate::layout::inches_to_emu(40.0 * 0.7 / 72.0));
    }

    #[test]
    fn large_images_in_options_never_break() {
        let dir = tempfile::tempdir().unwrap();
        write_png(dir.path(), "big.png", 120);
        let body = assemble(
            r#"{"sections": [{"questions": [{"content": [
                {"type": "options", "content": [["A. ", {"type": "image", "src": "big.png", "alt": "a"}]]}
            ]}]}]}"#,
            dir.path(),
        );
        assert_eq!(body.blocks.len(), 1);
        let option = paragraph(&body.blocks[0]);
        assert_eq!(option.style, ParagraphStyle::Option);
        assert_eq!(pictures(option), 1);
        assert!(!option.segments.contains(&Segment::Break));
    }
}
