//! Native PDF assembly with `lopdf`.
//!
//! Each page becomes one image XObject plus a content stream:
//!
//! ```text
//! q  s 0 0 s 0 0 cm                      % pixels → points (s = 72 / dpi)
//!    q  W 0 0 H 0 0 cm  /Im1 Do  Q       % the scan, full page
//!    BT 3 Tr                             % invisible text
//!       /F1 size Tf  Tz  1 0 0 1 x y Tm  <cids> Tj
//!       …
//!    ET
//! Q
//! ```
//!
//! Text positions come straight from [`crate::overlay`] in pixel units, so a
//! single `cm` maps both image and text to PDF space.
//!
//! The text font is a non-embedded Type0 font with `Identity-H` encoding.
//! Every distinct character in the document gets its own two-byte CID, and a
//! `/ToUnicode` CMap maps the CIDs back to Unicode, so text in any script
//! stays searchable. The font is never drawn.

use crate::config::ConversionConfig;
use crate::error::Djvu2PdfError;
use crate::overlay::TextLayer;
use crate::pipeline::encode::{self, EncodedImage};
use crate::pipeline::render::{self, RenderedPage};
use crate::toc::Bookmark;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};
use std::collections::HashMap;
use std::fmt::Write as _;
use tracing::{debug, info};

/// Mappings per `beginbfchar` block; CMap readers expect at most 100.
const BFCHAR_CHUNK: usize = 100;

/// Outline entry resolved against the pages actually written.
#[derive(Debug, Clone, PartialEq)]
pub struct OutlineEntry {
    pub title: String,
    pub depth: usize,
    /// 0-based index into the emitted pages.
    pub page_index: usize,
}

/// Resolve bookmarks to emitted page indices.
///
/// `selected` holds the 1-based source page numbers in output order. A
/// bookmark whose reference is not a page number inherits its parent's page
/// (or page 1 at the top level). A page that was not selected maps to the
/// nearest preceding selected page, or the first one if none precedes it.
pub fn resolve_outline(bookmarks: &[Bookmark], selected: &[usize]) -> Vec<OutlineEntry> {
    if selected.is_empty() {
        return Vec::new();
    }
    let mut parents: Vec<usize> = Vec::new();
    let mut out = Vec::with_capacity(bookmarks.len());

    for b in bookmarks {
        parents.truncate(b.depth);
        let inherited = b.depth.checked_sub(1).and_then(|d| parents.get(d).copied());
        let page = b.page_number().or(inherited).unwrap_or(1);
        parents.push(page);

        let page_index = selected
            .iter()
            .rposition(|&p| p <= page)
            .unwrap_or(0);
        out.push(OutlineEntry {
            title: b.title.clone(),
            depth: b.depth,
            page_index,
        });
    }
    out
}

/// Incremental builder for the output document.
pub struct PdfBuilder {
    doc: Document,
    pages_id: ObjectId,
    font_id: ObjectId,
    cids: CidMap,
    page_ids: Vec<ObjectId>,
    /// Points per pixel.
    scale: f32,
}

impl PdfBuilder {
    pub fn new(dpi: u32) -> Self {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        // Written by `finish`, once every character has a CID.
        let font_id = doc.new_object_id();
        Self {
            doc,
            pages_id,
            font_id,
            cids: CidMap::default(),
            page_ids: Vec::new(),
            scale: 72.0 / dpi.max(1) as f32,
        }
    }

    pub fn page_count(&self) -> usize {
        self.page_ids.len()
    }

    /// Append a page showing `image` with `layer` as its invisible text.
    pub fn add_page(&mut self, image: EncodedImage, layer: &TextLayer) -> Result<(), Djvu2PdfError> {
        let (w, h) = (image.width as f32, image.height as f32);

        let image_id = self.doc.add_object(
            Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => image.width as i64,
                    "Height" => image.height as i64,
                    "ColorSpace" => image.color_space,
                    "BitsPerComponent" => EncodedImage::BITS_PER_COMPONENT,
                    "Filter" => image.filter,
                },
                image.data,
            )
            .with_compression(false),
        );

        let content = page_content(self.scale, w, h, layer, &mut self.cids);
        let content_bytes = content
            .encode()
            .map_err(|e| Djvu2PdfError::AssemblyFailed(format!("content stream: {e}")))?;
        let content_id = self.doc.add_object(Stream::new(Dictionary::new(), content_bytes));

        let media_box: Vec<Object> = vec![0.into(), 0.into(), (w * self.scale).into(), (h * self.scale).into()];
        let page_id = self.doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "MediaBox" => media_box,
            "Contents" => content_id,
            "Resources" => dictionary! {
                "XObject" => dictionary! { "Im1" => image_id },
                "Font" => dictionary! { "F1" => self.font_id },
            },
        });
        self.page_ids.push(page_id);
        Ok(())
    }

    /// Write the page tree, outline and info dictionary, and serialise.
    pub fn finish(mut self, outline: &[OutlineEntry], title: Option<&str>) -> Result<Vec<u8>, Djvu2PdfError> {
        if self.page_ids.is_empty() {
            return Err(Djvu2PdfError::AssemblyFailed("no pages to write".into()));
        }

        self.write_font();

        let kids: Vec<Object> = self.page_ids.iter().map(|id| (*id).into()).collect();
        self.doc.objects.insert(
            self.pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => self.page_ids.len() as i64,
            }),
        );

        let mut catalog = dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        };

        let mut levels: Vec<u32> = Vec::new();
        for entry in outline {
            let Some(&page_id) = self.page_ids.get(entry.page_index) else {
                continue;
            };
            levels.truncate(entry.depth);
            let parent = entry.depth.checked_sub(1).and_then(|d| levels.get(d).copied());
            let id = self.doc.add_bookmark(
                lopdf::Bookmark::new(entry.title.clone(), [0.0, 0.0, 0.0], 0, page_id),
                parent,
            );
            levels.push(id);
        }
        if let Some(outline_id) = self.doc.build_outline() {
            catalog.set("Outlines", outline_id);
            catalog.set("PageMode", "UseOutlines");
            debug!("Wrote outline with {} entries", outline.len());
        }

        let catalog_id = self.doc.add_object(catalog);
        self.doc.trailer.set("Root", catalog_id);

        let mut info = dictionary! {
            "Producer" => Object::string_literal(concat!("djvu2pdf ", env!("CARGO_PKG_VERSION"))),
        };
        if let Some(t) = title {
            info.set("Title", text_string(t));
        }
        let info_id = self.doc.add_object(info);
        self.doc.trailer.set("Info", info_id);

        self.doc.compress();
        let mut buf = Vec::new();
        self.doc
            .save_to(&mut buf)
            .map_err(|e| Djvu2PdfError::AssemblyFailed(format!("serialise: {e}")))?;
        Ok(buf)
    }

    /// Type0 font with an Identity-H CIDFont and the document's ToUnicode map.
    fn write_font(&mut self) {
        let to_unicode_id = self
            .doc
            .add_object(Stream::new(Dictionary::new(), self.cids.to_unicode_cmap()));
        let bbox: Vec<Object> = vec![0.into(), (-200).into(), 1000.into(), 800.into()];
        let descriptor_id = self.doc.add_object(dictionary! {
            "Type" => "FontDescriptor",
            "FontName" => "Helvetica",
            "Flags" => 32,
            "FontBBox" => bbox,
            "ItalicAngle" => 0,
            "Ascent" => 800,
            "Descent" => -200,
            "CapHeight" => 700,
            "StemV" => 80,
        });
        let descendant_id = self.doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "CIDFontType2",
            "BaseFont" => "Helvetica",
            "CIDSystemInfo" => dictionary! {
                "Registry" => Object::string_literal("Adobe"),
                "Ordering" => Object::string_literal("Identity"),
                "Supplement" => 0,
            },
            "FontDescriptor" => descriptor_id,
            // Matches the 0.5 em advance the overlay assumes.
            "DW" => 500,
            "CIDToGIDMap" => "Identity",
        });
        self.doc.objects.insert(
            self.font_id,
            Object::Dictionary(dictionary! {
                "Type" => "Font",
                "Subtype" => "Type0",
                "BaseFont" => "Helvetica",
                "Encoding" => "Identity-H",
                "DescendantFonts" => vec![Object::Reference(descendant_id)],
                "ToUnicode" => to_unicode_id,
            }),
        );
        debug!("Text font maps {} distinct characters", self.cids.len());
    }
}

/// Document-wide character to CID assignment for the Identity-H text font.
///
/// CIDs start at 1; CID 0 is `.notdef` and absorbs characters once the
/// 16-bit space is used up.
#[derive(Debug, Default)]
struct CidMap {
    cids: HashMap<char, u16>,
    /// Characters in CID order, starting at CID 1.
    chars: Vec<char>,
}

impl CidMap {
    fn len(&self) -> usize {
        self.chars.len()
    }

    /// Big-endian two-byte CIDs for `text`, assigning new CIDs on first use.
    fn encode(&mut self, text: &str) -> Vec<u8> {
        let mut out = Vec::with_capacity(text.len() * 2);
        for c in text.chars() {
            out.extend_from_slice(&self.cid(c).to_be_bytes());
        }
        out
    }

    fn cid(&mut self, c: char) -> u16 {
        if let Some(&cid) = self.cids.get(&c) {
            return cid;
        }
        if self.chars.len() >= u16::MAX as usize {
            return 0;
        }
        self.chars.push(c);
        let cid = self.chars.len() as u16;
        self.cids.insert(c, cid);
        cid
    }

    /// The `/ToUnicode` CMap program mapping every assigned CID to UTF-16BE.
    fn to_unicode_cmap(&self) -> Vec<u8> {
        let mut cmap = String::from(
            "/CIDInit /ProcSet findresource begin\n\
             12 dict begin\n\
             begincmap\n\
             /CIDSystemInfo\n\
             << /Registry (Adobe) /Ordering (UCS) /Supplement 0 >> def\n\
             /CMapName /Adobe-Identity-UCS def\n\
             /CMapType 2 def\n\
             1 begincodespacerange\n\
             <0000> <FFFF>\n\
             endcodespacerange\n",
        );
        for (chunk_idx, chunk) in self.chars.chunks(BFCHAR_CHUNK).enumerate() {
            let _ = writeln!(cmap, "{} beginbfchar", chunk.len());
            for (i, c) in chunk.iter().enumerate() {
                let cid = chunk_idx * BFCHAR_CHUNK + i + 1;
                let mut units = [0u16; 2];
                let utf16: String = c
                    .encode_utf16(&mut units)
                    .iter()
                    .map(|u| format!("{u:04X}"))
                    .collect();
                let _ = writeln!(cmap, "<{cid:04X}> <{utf16}>");
            }
            cmap.push_str("endbfchar\n");
        }
        cmap.push_str(
            "endcmap\n\
             CMapName currentdict /CMap defineresource pop\n\
             end\n\
             end\n",
        );
        cmap.into_bytes()
    }
}

fn page_content(scale: f32, width: f32, height: f32, layer: &TextLayer, cids: &mut CidMap) -> Content {
    let mut ops = vec![
        Operation::new("q", vec![]),
        Operation::new("cm", vec![scale.into(), 0.into(), 0.into(), scale.into(), 0.into(), 0.into()]),
        Operation::new("q", vec![]),
        Operation::new("cm", vec![width.into(), 0.into(), 0.into(), height.into(), 0.into(), 0.into()]),
        Operation::new("Do", vec!["Im1".into()]),
        Operation::new("Q", vec![]),
    ];

    if !layer.is_empty() {
        ops.push(Operation::new("BT", vec![]));
        ops.push(Operation::new("Tr", vec![3.into()]));
        for d in &layer.instructions {
            ops.push(Operation::new("Tf", vec!["F1".into(), d.font_size.into()]));
            ops.push(Operation::new("Tz", vec![d.horizontal_scale.into()]));
            ops.push(Operation::new(
                "Tm",
                vec![1.into(), 0.into(), 0.into(), 1.into(), d.x.into(), d.y.into()],
            ));
            ops.push(Operation::new(
                "Tj",
                vec![Object::String(cids.encode(&d.text), StringFormat::Hexadecimal)],
            ));
        }
        ops.push(Operation::new("ET", vec![]));
    }

    ops.push(Operation::new("Q", vec![]));
    Content { operations: ops }
}

/// PDF text string: literal for ASCII, UTF-16BE with BOM otherwise.
fn text_string(s: &str) -> Object {
    if s.is_ascii() {
        return Object::string_literal(s);
    }
    let mut bytes = vec![0xFE, 0xFF];
    for unit in s.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    Object::String(bytes, StringFormat::Hexadecimal)
}

/// Build the whole PDF from rendered pages. Blocking; call from `spawn_blocking`.
pub fn assemble_native(
    pages: &[(RenderedPage, TextLayer)],
    outline: &[OutlineEntry],
    config: &ConversionConfig,
) -> Result<Vec<u8>, Djvu2PdfError> {
    let mut builder = PdfBuilder::new(config.dpi);
    for (page, layer) in pages {
        let img = render::load_image(page)?;
        let encoded = encode::encode_page(&img, config.image_encoding).map_err(|source| {
            Djvu2PdfError::ImageDecode {
                page: page.page_num,
                source,
            }
        })?;
        drop(img);
        builder.add_page(encoded, layer)?;
    }
    let pdf = builder.finish(outline, config.title.as_deref())?;
    info!("Assembled {} pages → {} bytes", pages.len(), pdf.len());
    Ok(pdf)
}
