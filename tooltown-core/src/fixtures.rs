//! Small deterministic documents for tests.
//!
//! Compiled for this crate's unit tests and, behind the `fixtures` feature,
//! for dependent crates' integration tests.

use crate::scope::RequestScope;
use crate::staging::{FileKind, UploadMeta};
use crate::validation::{validate, ValidatedFile};
use bytes::Bytes;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use std::io::{Cursor, Write};
use std::path::Path;

/// A letter-size PDF whose page `i` shows the text `Page i`.
pub fn sample_pdf(pages: usize) -> Vec<u8> {
    let texts: Vec<String> = (1..=pages).map(|i| format!("Page {i}")).collect();
    let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
    pdf_with_texts(&refs)
}

/// One page per entry, each showing that entry in Helvetica.
pub fn pdf_with_texts(texts: &[&str]) -> Vec<u8> {
    build_pdf(texts, None)
}

/// The same document with its `startxref` offset pointing past the end of the file.
pub fn with_broken_startxref(mut bytes: Vec<u8>) -> Vec<u8> {
    let at = bytes
        .windows(9)
        .rposition(|w| w == b"startxref")
        .expect("PDF has a startxref");
    bytes.truncate(at);
    bytes.extend_from_slice(b"startxref\n999999\n%%EOF\n");
    bytes
}

/// Pages that inherit `/Rotate` from the page tree root.
pub fn pdf_with_inherited_rotation(pages: usize, rotation: i64) -> Vec<u8> {
    let texts: Vec<String> = (1..=pages).map(|i| format!("Page {i}")).collect();
    let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
    build_pdf(&refs, Some(rotation))
}

fn build_pdf(texts: &[&str], inherited_rotation: Option<i64>) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id: ObjectId = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });

    let mut kids: Vec<Object> = Vec::new();
    for text in texts {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 24.into()]),
                Operation::new("Td", vec![72.into(), 700.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(
            Dictionary::new(),
            content.encode().expect("encode content"),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Contents" => content_id,
            "Resources" => dictionary! {
                "Font" => dictionary! { "F1" => font_id },
            },
        });
        kids.push(page_id.into());
    }

    let mut pages = dictionary! {
        "Type" => "Pages",
        "Count" => kids.len() as i64,
        "Kids" => kids,
    };
    if let Some(rotation) = inherited_rotation {
        pages.set("Rotate", rotation);
    }
    doc.objects.insert(pages_id, Object::Dictionary(pages));
    finish(doc, pages_id)
}

/// One page with a `width`×`height` RGB image drawn into a 144×72 pt box.
pub fn pdf_with_image(width: u32, height: u32) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id: ObjectId = doc.new_object_id();

    let pixels: Vec<u8> = (0..width * height)
        .flat_map(|i| [(i % 256) as u8, 128, 64])
        .collect();
    let mut encoder = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(&pixels).expect("compress pixels");
    let image_id = doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width as i64,
            "Height" => height as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
            "Filter" => "FlateDecode",
        },
        encoder.finish().expect("finish compression"),
    ));

    let content = b"q 144 0 0 72 100 600 cm /Im1 Do Q".to_vec();
    let content_id = doc.add_object(Stream::new(Dictionary::new(), content));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        "Contents" => content_id,
        "Resources" => dictionary! {
            "XObject" => dictionary! { "Im1" => image_id },
        },
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![Object::from(page_id)],
            "Count" => 1,
        }),
    );
    finish(doc, pages_id)
}

/// One page with an AcroForm: text field `name`, checkbox `agree`, and a
/// `contact` parent with a text child `email`.
pub fn pdf_with_form() -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id: ObjectId = doc.new_object_id();
    let page_id = doc.new_object_id();

    let name_id = doc.add_object(dictionary! {
        "FT" => "Tx",
        "T" => Object::string_literal("name"),
        "V" => Object::string_literal("Ada"),
        "Type" => "Annot",
        "Subtype" => "Widget",
        "Rect" => vec![72.into(), 700.into(), 272.into(), 720.into()],
        "P" => page_id,
    });
    let agree_id = doc.add_object(dictionary! {
        "FT" => "Btn",
        "T" => Object::string_literal("agree"),
        "V" => "Off",
        "Type" => "Annot",
        "Subtype" => "Widget",
        "Rect" => vec![72.into(), 650.into(), 88.into(), 666.into()],
        "P" => page_id,
    });
    let contact_id = doc.new_object_id();
    let email_id = doc.add_object(dictionary! {
        "T" => Object::string_literal("email"),
        "Parent" => contact_id,
        "Type" => "Annot",
        "Subtype" => "Widget",
        "Rect" => vec![72.into(), 600.into(), 272.into(), 620.into()],
        "P" => page_id,
    });
    doc.objects.insert(
        contact_id,
        Object::Dictionary(dictionary! {
            "FT" => "Tx",
            "T" => Object::string_literal("contact"),
            "Kids" => vec![Object::from(email_id)],
        }),
    );

    // Radio group: one widget per choice, each with its own "on" appearance state
    let size_id = doc.new_object_id();
    let glyph_id = doc.add_object(Stream::new(Dictionary::new(), b"".to_vec()));
    let radio = |state: &str, x: i64| {
        dictionary! {
            "Parent" => size_id,
            "Type" => "Annot",
            "Subtype" => "Widget",
            "Rect" => vec![x.into(), 550.into(), (x + 16).into(), 566.into()],
            "P" => page_id,
            "AS" => "Off",
            "AP" => dictionary! {
                "N" => dictionary! { state => glyph_id, "Off" => glyph_id },
            },
        }
    };
    let small_id = doc.add_object(radio("S", 72));
    let large_id = doc.add_object(radio("L", 112));
    doc.objects.insert(
        size_id,
        Object::Dictionary(dictionary! {
            "FT" => "Btn",
            "Ff" => Object::Integer(1 << 15),
            "T" => Object::string_literal("size"),
            "V" => "Off",
            "Kids" => vec![Object::from(small_id), Object::from(large_id)],
        }),
    );

    let content_id = doc.add_object(Stream::new(Dictionary::new(), b"".to_vec()));
    doc.objects.insert(
        page_id,
        Object::Dictionary(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Contents" => content_id,
            "Annots" => vec![
                name_id.into(),
                agree_id.into(),
                email_id.into(),
                small_id.into(),
                large_id.into(),
            ],
        }),
    );
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![Object::from(page_id)],
            "Count" => 1,
        }),
    );

    let acroform_id = doc.add_object(dictionary! {
        "Fields" => vec![
            name_id.into(),
            agree_id.into(),
            contact_id.into(),
            size_id.into(),
        ],
    });
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
        "AcroForm" => acroform_id,
    });
    doc.trailer.set("Root", catalog_id);
    save(doc)
}

fn finish(mut doc: Document, pages_id: ObjectId) -> Vec<u8> {
    let info_id = doc.add_object(dictionary! {
        "Title" => Object::string_literal("Fixture"),
        "Producer" => Object::string_literal("tooltown fixtures"),
    });
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.trailer.set("Info", info_id);
    save(doc)
}

fn save(mut doc: Document) -> Vec<u8> {
    let mut buf = Vec::new();
    doc.save_to(&mut buf).expect("save fixture PDF");
    buf
}

/// A PNG gradient, optionally half transparent.
pub fn png_image(width: u32, height: u32, with_alpha: bool) -> Vec<u8> {
    let image = if with_alpha {
        DynamicImage::ImageRgba8(RgbaImage::from_fn(width, height, |x, _| {
            Rgba([(x * 10 % 256) as u8, 0, 0, 128])
        }))
    } else {
        DynamicImage::ImageRgb8(gradient(width, height))
    };
    encode(&image, ImageFormat::Png)
}

pub fn jpeg_image(width: u32, height: u32) -> Vec<u8> {
    encode(&DynamicImage::ImageRgb8(gradient(width, height)), ImageFormat::Jpeg)
}

fn gradient(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x * 7 % 256) as u8, (y * 5 % 256) as u8, 200])
    })
}

fn encode(image: &DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut buf = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buf), format)
        .expect("encode fixture image");
    buf
}

/// Stages and validates a PDF, panicking if it is rejected.
pub async fn stage_pdf(scope: &RequestScope, name: &str, bytes: Vec<u8>) -> ValidatedFile {
    stage(scope, name, "application/pdf", FileKind::Pdf, bytes).await
}

pub async fn stage_image(
    scope: &RequestScope,
    name: &str,
    content_type: &str,
    bytes: Vec<u8>,
) -> ValidatedFile {
    stage(scope, name, content_type, FileKind::Image, bytes).await
}

async fn stage(
    scope: &RequestScope,
    name: &str,
    content_type: &str,
    kind: FileKind,
    bytes: Vec<u8>,
) -> ValidatedFile {
    let staged = scope
        .stager()
        .stage_bytes(UploadMeta::new(name, content_type), kind, Bytes::from(bytes))
        .await
        .expect("stage fixture");
    let validation = validate(&staged, scope.stager());
    ValidatedFile::accept(staged, validation).expect("fixture should validate")
}

pub fn load(path: &Path) -> Document {
    Document::load(path).expect("load PDF")
}

pub fn page_count(path: &Path) -> usize {
    load(path).get_pages().len()
}

/// Page count of an in-memory PDF, such as a response body.
pub fn page_count_of(bytes: &[u8]) -> usize {
    Document::load_mem(bytes).expect("load PDF").get_pages().len()
}

pub fn page_text(path: &Path, page: u32) -> String {
    load(path).extract_text(&[page]).expect("extract text")
}

/// The page's effective `/Rotate`, following inheritance.
pub fn page_rotation(doc: &Document, page: u32) -> i64 {
    let page_id = doc.get_pages()[&page];
    crate::operations::inherited_attribute(doc, page_id, b"Rotate")
        .and_then(|value| value.as_i64().ok())
        .unwrap_or(0)
}
