//! WordprocessingML parts and the zip package that holds them.

use std::io::{Cursor, Write};

use log::debug;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use crate::assemble::{Block, Body, Paragraph, Picture, Segment, Table};
use crate::error::Result;
use crate::layout::{
    Alignment, PageSetup, ParagraphStyle, EAST_ASIA_FONT, LATIN_FONT, LINE_SPACING,
};
use crate::media::MediaFormat;

/// Media relationship ids start here; lower ids are reserved for fixed parts.
const FIRST_MEDIA_RID: usize = 10;

fn xml_escape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            // Not representable in XML 1.0.
            c if (c as u32) < 0x20 && !matches!(c, '\t' | '\n' | '\r') => {}
            '\u{FFFE}' | '\u{FFFF}' => {}
            _ => out.push(ch),
        }
    }
    out
}

fn media_rid(index: usize) -> String {
    format!("rId{}", index + FIRST_MEDIA_RID)
}

fn media_name(index: usize, format: MediaFormat) -> String {
    format!("image{}.{}", index + 1, format.extension())
}

/// One `<w:r>` for a piece of text. Line feeds become `<w:br/>` and tabs
/// `<w:tab/>`, the way Word itself stores typed text.
fn run_xml(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    let normalized = text.replace("\r\n", "\n");
    let mut out = String::new();
    out.push_str("<w:r>");
    let mut chunk = String::new();
    let flush = |out: &mut String, chunk: &mut String| {
        if !chunk.is_empty() {
            out.push_str("<w:t xml:space=\"preserve\">");
            out.push_str(&xml_escape_text(chunk));
            out.push_str("</w:t>");
            chunk.clear();
        }
    };
    for ch in normalized.chars() {
        match ch {
            '\n' | '\r' => {
                flush(&mut out, &mut chunk);
                out.push_str("<w:br/>");
            }
            '\t' => {
                flush(&mut out, &mut chunk);
                out.push_str("<w:tab/>");
            }
            _ => chunk.push(ch),
        }
    }
    flush(&mut out, &mut chunk);
    out.push_str("</w:r>");
    out
}

fn picture_run_xml(pic: &Picture, format: MediaFormat) -> String {
    let id = pic.media + 1;
    let name = media_name(pic.media, format);
    let descr = xml_escape_text(&pic.description);
    format!(
        concat!(
            r#"<w:r><w:drawing><wp:inline distT="0" distB="0" distL="0" distR="0">"#,
            r#"<wp:extent cx="{cx}" cy="{cy}"/>"#,
            r#"<wp:docPr id="{id}" name="Picture {id}" descr="{descr}"/>"#,
            r#"<wp:cNvGraphicFramePr><a:graphicFrameLocks noChangeAspect="1"/></wp:cNvGraphicFramePr>"#,
            r#"<a:graphic><a:graphicData uri="http://schemas.openxmlformats.org/drawingml/2006/picture">"#,
            r#"<pic:pic><pic:nvPicPr><pic:cNvPr id="0" name="{name}"/><pic:cNvPicPr/></pic:nvPicPr>"#,
            r#"<pic:blipFill><a:blip r:embed="{rid}"/><a:stretch><a:fillRect/></a:stretch></pic:blipFill>"#,
            r#"<pic:spPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="{cx}" cy="{cy}"/></a:xfrm>"#,
            r#"<a:prstGeom prst="rect"><a:avLst/></a:prstGeom></pic:spPr></pic:pic>"#,
            r#"</a:graphicData></a:graphic></wp:inline></w:drawing></w:r>"#
        ),
        cx = pic.cx,
        cy = pic.cy,
        id = id,
        descr = descr,
        name = name,
        rid = media_rid(pic.media),
    )
}

fn paragraph_xml(p: &Paragraph, body: &Body) -> String {
    let mut out = String::new();
    out.push_str("<w:p>");

    if p.style != ParagraphStyle::Normal {
        out.push_str(&format!(
            "<w:pPr><w:pStyle w:val=\"{}\"/></w:pPr>",
            p.style.style_id()
        ));
    }

    for seg in &p.segments {
        match seg {
            Segment::Text(text) => out.push_str(&run_xml(text)),
            Segment::Break => out.push_str("<w:r><w:br/></w:r>"),
            Segment::Picture(pic) => {
                let format = body
                    .media
                    .get(pic.media)
                    .map(|m| m.format)
                    .unwrap_or(MediaFormat::Png);
                out.push_str(&picture_run_xml(pic, format));
            }
        }
    }

    out.push_str("</w:p>");
    out
}

fn blocks_xml(blocks: &[Block], body: &Body, page: &PageSetup) -> String {
    let mut out = String::new();
    for b in blocks {
        match b {
            Block::Paragraph(p) => out.push_str(&paragraph_xml(p, body)),
            Block::Table(t) => out.push_str(&table_xml(t, body, page)),
        }
    }
    out
}

fn table_xml(t: &Table, body: &Body, page: &PageSetup) -> String {
    let col_width = page.text_width() / t.columns.max(1) as u32;

    let mut out = String::new();
    out.push_str("<w:tbl>");
    out.push_str("<w:tblPr>");
    out.push_str("<w:tblW w:w=\"0\" w:type=\"auto\"/>");
    out.push_str(
        r#"<w:tblBorders>
<w:top w:val="single" w:sz="4" w:space="0" w:color="000000"/>
<w:left w:val="single" w:sz="4" w:space="0" w:color="000000"/>
<w:bottom w:val="single" w:sz="4" w:space="0" w:color="000000"/>
<w:right w:val="single" w:sz="4" w:space="0" w:color="000000"/>
<w:insideH w:val="single" w:sz="4" w:space="0" w:color="000000"/>
<w:insideV w:val="single" w:sz="4" w:space="0" w:color="000000"/>
</w:tblBorders>"#,
    );
    out.push_str("<w:tblLook w:val=\"04A0\"/>");
    out.push_str("</w:tblPr>");

    out.push_str("<w:tblGrid>");
    for _ in 0..t.columns {
        out.push_str(&format!("<w:gridCol w:w=\"{col_width}\"/>"));
    }
    out.push_str("</w:tblGrid>");

    for row in &t.rows {
        out.push_str("<w:tr>");
        for cell in &row.cells {
            out.push_str("<w:tc>");
            out.push_str(&format!(
                "<w:tcPr><w:tcW w:w=\"{col_width}\" w:type=\"dxa\"/></w:tcPr>"
            ));
            out.push_str(&blocks_xml(&cell.blocks, body, page));
            // A cell must end with a paragraph.
            if !matches!(cell.blocks.last(), Some(Block::Paragraph(_))) {
                out.push_str("<w:p/>");
            }
            out.push_str("</w:tc>");
        }
        out.push_str("</w:tr>");
    }

    out.push_str("</w:tbl>");
    out
}

pub fn document_xml(body: &Body, page: &PageSetup) -> String {
    let content = blocks_xml(&body.blocks, body, page);

    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"
 xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"
 xmlns:wp="http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing"
 xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main"
 xmlns:pic="http://schemas.openxmlformats.org/drawingml/2006/picture">
  <w:body>
    {content}
    <w:sectPr>
      <w:pgSz w:w="{width}" w:h="{height}"/>
      <w:pgMar w:top="{top}" w:right="{right}" w:bottom="{bottom}" w:left="{left}" w:header="{header}" w:footer="{footer}" w:gutter="0"/>
      <w:cols w:space="425"/>
      <w:docGrid w:linePitch="312"/>
    </w:sectPr>
  </w:body>
</w:document>"#,
        content = content,
        width = page.width,
        height = page.height,
        top = page.top,
        right = page.right,
        bottom = page.bottom,
        left = page.left,
        header = page.header,
        footer = page.footer,
    )
}

fn content_types_xml(body: &Body) -> String {
    let mut out = String::new();
    out.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
    out.push('\n');
    out.push_str(r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#);
    out.push('\n');
    out.push_str(
        r#"  <Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>"#,
    );
    out.push('\n');
    out.push_str(r#"  <Default Extension="xml" ContentType="application/xml"/>"#);
    out.push('\n');
    for format in [MediaFormat::Png, MediaFormat::Jpeg] {
        if body.media.iter().any(|m| m.format == format) {
            out.push_str(&format!(
                r#"  <Default Extension="{}" ContentType="{}"/>"#,
                format.extension(),
                format.content_type()
            ));
            out.push('\n');
        }
    }
    out.push_str(r#"  <Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/>"#);
    out.push('\n');
    out.push_str(r#"  <Override PartName="/word/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.styles+xml"/>"#);
    out.push('\n');
    out.push_str(r#"  <Override PartName="/docProps/core.xml" ContentType="application/vnd.openxmlformats-package.core-properties+xml"/>"#);
    out.push('\n');
    out.push_str("</Types>");
    out
}

fn rels_xml() -> &'static str {
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/>
  <Relationship Id="rId2" Type="http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties" Target="docProps/core.xml"/>
</Relationships>"#
}

fn document_rels_xml(body: &Body) -> String {
    let mut out = String::new();
    out.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
    out.push('\n');
    out.push_str(r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#);
    out.push('\n');
    out.push_str(r#"  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/>"#);
    out.push('\n');
    for (i, media) in body.media.iter().enumerate() {
        out.push_str(&format!(
            r#"  <Relationship Id="{rid}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/image" Target="media/{name}"/>"#,
            rid = media_rid(i),
            name = media_name(i, media.format),
        ));
        out.push('\n');
    }
    out.push_str("</Relationships>");
    out
}

fn style_xml(style: ParagraphStyle) -> String {
    let jc = match style.alignment() {
        Alignment::Center => "center",
        Alignment::Justify => "both",
    };
    let bold = if style.bold() { "<w:b/><w:bCs/>" } else { "" };
    format!(
        r#"  <w:style w:type="paragraph" w:customStyle="1" w:styleId="{id}">
    <w:name w:val="{id}"/>
    <w:basedOn w:val="Normal"/>
    <w:qFormat/>
    <w:pPr>
      <w:spacing w:line="{line}" w:lineRule="auto"/>
      <w:jc w:val="{jc}"/>
    </w:pPr>
    <w:rPr>
      <w:rFonts w:ascii="{latin}" w:hAnsi="{latin}" w:eastAsia="{east}" w:cs="{latin}"/>
      {bold}<w:sz w:val="{size}"/>
      <w:szCs w:val="{size}"/>
    </w:rPr>
  </w:style>
"#,
        id = style.style_id(),
        line = LINE_SPACING,
        jc = jc,
        latin = LATIN_FONT,
        east = EAST_ASIA_FONT,
        bold = bold,
        size = style.half_points(),
    )
}

pub fn styles_xml() -> String {
    let mut out = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:styles xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:docDefaults>
    <w:rPrDefault>
      <w:rPr>
        <w:rFonts w:ascii="{latin}" w:hAnsi="{latin}" w:eastAsia="{east}" w:cs="{latin}"/>
        <w:sz w:val="{size}"/>
        <w:szCs w:val="{size}"/>
      </w:rPr>
    </w:rPrDefault>
    <w:pPrDefault/>
  </w:docDefaults>
  <w:style w:type="paragraph" w:default="1" w:styleId="Normal">
    <w:name w:val="Normal"/>
    <w:qFormat/>
  </w:style>
"#,
        latin = LATIN_FONT,
        east = EAST_ASIA_FONT,
        size = ParagraphStyle::Normal.half_points(),
    );
    for style in ParagraphStyle::NAMED {
        out.push_str(&style_xml(style));
    }
    out.push_str("</w:styles>");
    out
}

fn core_xml(title: Option<&str>) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:dcterms="http://purl.org/dc/terms/" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
  <dc:title>{title}</dc:title>
  <dc:creator>json_to_docx</dc:creator>
</cp:coreProperties>"#,
        title = xml_escape_text(title.unwrap_or_default()),
    )
}

/// Pack `body` into a complete `.docx` archive in memory.
pub fn write_package(body: &Body, page: &PageSetup) -> Result<Vec<u8>> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let opts = SimpleFileOptions::default();

    zip.start_file("[Content_Types].xml", opts)?;
    zip.write_all(content_types_xml(body).as_bytes())?;

    zip.start_file("_rels/.rels", opts)?;
    zip.write_all(rels_xml().as_bytes())?;

    zip.start_file("docProps/core.xml", opts)?;
    zip.write_all(core_xml(body.title.as_deref()).as_bytes())?;

    zip.start_file("word/document.xml", opts)?;
    zip.write_all(document_xml(body, page).as_bytes())?;

    zip.start_file("word/styles.xml", opts)?;
    zip.write_all(styles_xml().as_bytes())?;

    zip.start_file("word/_rels/document.xml.rels", opts)?;
    zip.write_all(document_rels_xml(body).as_bytes())?;

    for (i, media) in body.media.iter().enumerate() {
        zip.start_file(format!("word/media/{}", media_name(i, media.format)), opts)?;
        zip.write_all(&media.data)?;
    }

    let bytes = zip.finish()?.into_inner();
    debug!("packaged {} bytes, {} media parts", bytes.len(), body.media.len());
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assemble::{TableCell, TableRow};
    use crate::media::EncodedImage;
    use std::io::Read;
    use zip::ZipArchive;

    fn body_with(blocks: Vec<Block>) -> Body {
        Body {
            title: None,
            blocks,
            media: Vec::new(),
        }
    }

    #[test]
    fn escapes_markup_and_drops_control_chars() {
        assert_eq!(
            xml_escape_text("a<b & \"c\"\u{1}\u{FFFE}\u{FFFF}"),
            "a&lt;b &amp; &quot;c&quot;"
        );
        assert_eq!(xml_escape_text("\u{FFFD}\u{10000}"), "\u{FFFD}\u{10000}");
    }

    #[test]
    fn runs_translate_line_breaks_and_tabs() {
        assert_eq!(run_xml(""), "");
        assert_eq!(
            run_xml("a\r\nb\tc"),
            "<w:r><w:t xml:space=\"preserve\">a</w:t><w:br/><w:t xml:space=\"preserve\">b</w:t><w:tab/><w:t xml:space=\"preserve\">c</w:t></w:r>"
        );
    }

    #[test]
    fn styled_paragraphs_reference_their_style() {
        let body = body_with(Vec::new());
        let xml = paragraph_xml(&Paragraph::with_text(ParagraphStyle::Option, "A. 1"), &body);
        assert!(xml.starts_with("<w:p><w:pPr><w:pStyle w:val=\"OptionStyle\"/></w:pPr>"));
        assert!(xml.contains(">A. 1</w:t>"));

        let plain = paragraph_xml(&Paragraph::new(ParagraphStyle::Normal), &body);
        assert_eq!(plain, "<w:p></w:p>");
    }

    #[test]
    fn table_cells_always_end_with_a_paragraph() {
        let inner = Table {
            columns: 1,
            rows: vec![TableRow {
                cells: vec![TableCell {
                    blocks: vec![Block::Paragraph(Paragraph::new(ParagraphStyle::Normal))],
                }],
            }],
        };
        let outer = Table {
            columns: 2,
            rows: vec![TableRow {
                cells: vec![
                    TableCell {
                        blocks: vec![Block::Table(inner)],
                    },
                    TableCell { blocks: Vec::new() },
                ],
            }],
        };
        let body = body_with(Vec::new());
        let page = PageSetup::default();
        let xml = table_xml(&outer, &body, &page);
        assert_eq!(xml.matches("<w:gridCol ").count(), 3);
        assert!(xml.contains("</w:tbl><w:p/></w:tc>"));
        assert!(xml.contains("</w:tcPr><w:p/></w:tc>"));
    }

    #[test]
    fn styles_define_all_named_styles() {
        let xml = styles_xml();
        for style in ParagraphStyle::NAMED {
            assert!(xml.contains(&format!("w:styleId=\"{}\"", style.style_id())));
        }
        assert!(xml.contains("w:eastAsia=\"宋体\""));
        assert_eq!(xml.matches("w:line=\"360\"").count(), 4);
    }

    #[test]
    fn package_contains_parts_and_media() {
        let mut body = body_with(vec![Block::Paragraph(Paragraph {
            style: ParagraphStyle::Body,
            segments: vec![Segment::Picture(Picture {
                media: 0,
                cx: 100,
                cy: 200,
                description: "fig <1>".into(),
            })],
        })]);
        body.title = Some("Paper & Key".into());
        body.media.push(EncodedImage {
            format: MediaFormat::Png,
            data: vec![1, 2, 3],
        });

        let bytes = write_package(&body, &PageSetup::default()).unwrap();
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut read = |name: &str| {
            let mut s = String::new();
            archive.by_name(name).unwrap().read_to_string(&mut s).unwrap();
            s
        };

        let document = read("word/document.xml");
        assert!(document.contains(r#"<a:blip r:embed="rId10"/>"#));
        assert!(document.contains(r#"descr="fig &lt;1&gt;""#));
        assert!(document.contains(r#"<wp:extent cx="100" cy="200"/>"#));
        assert!(document.contains(r#"<w:pgSz w:w="11906" w:h="16838"/>"#));

        assert!(read("word/_rels/document.xml.rels").contains(r#"Target="media/image1.png""#));
        assert!(read("[Content_Types].xml").contains(r#"Extension="png""#));
        assert!(read("docProps/core.xml").contains("<dc:title>Paper &amp; Key</dc:title>"));
        assert_eq!(archive.by_name("word/media/image1.png").unwrap().size(), 3);
    }
}
