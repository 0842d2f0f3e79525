//! Raster images in and out of PDFs.

use super::{
    load_pdf, page_resources, resolve, resolve_dict, save_pdf, select_pages, OperationResult,
    PageSize,
};
use crate::error::{Result, ToolError};
use crate::staging::Stager;
use crate::validation::ValidatedFile;
use base64::Engine;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, ImageFormat, RgbImage};
use lopdf::content::Content;
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use serde::Serialize;
use serde_json::json;
use std::io::{Cursor, Write};

// Upper bound on either side of a rendered image
const MAX_RENDER_SIDE: u32 = 10_000;

/// Current transformation matrix `[a b c d e f]`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Matrix([f32; 6]);

impl Matrix {
    const IDENTITY: Matrix = Matrix([1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);

    /// `self × other`, the order `cm` concatenates in.
    fn then(self, other: Matrix) -> Matrix {
        let [a, b, c, d, e, f] = self.0;
        let [a2, b2, c2, d2, e2, f2] = other.0;
        Matrix([
            a * a2 + b * c2,
            a * b2 + b * d2,
            c * a2 + d * c2,
            c * b2 + d * d2,
            e * a2 + f * c2 + e2,
            e * b2 + f * d2 + f2,
        ])
    }

    /// Size in points of the unit square under this matrix.
    fn placed_size(self) -> (f32, f32) {
        let [a, b, c, d, ..] = self.0;
        (a.hypot(b), c.hypot(d))
    }
}

#[derive(Debug, Serialize)]
struct ExtractedImage {
    page: u32,
    index: usize,
    image_base64: String,
    width: u32,
    height: u32,
}

/// Renders every image XObject drawn on the selected pages at `dpi`.
pub(super) fn extract(
    input: &ValidatedFile,
    pages: Option<&[i64]>,
    dpi: u32,
) -> Result<OperationResult> {
    const OP: &str = "extract images";

    let doc = load_pdf(input, OP)?;
    let page_map = doc.get_pages();
    let selected = select_pages(pages, page_map.len() as u32)?;

    let mut images = Vec::new();
    for (number, page_id) in page_map {
        if !selected.contains(&number) {
            continue;
        }
        for (index, (image_id, ctm)) in placed_images(&doc, page_id)
            .map_err(|e| ToolError::library(OP, e))?
            .into_iter()
            .enumerate()
        {
            let Some(decoded) = decode_image(&doc, image_id) else {
                tracing::debug!(page = number, index, "skipping image with unsupported encoding");
                continue;
            };
            let (width_pt, height_pt) = ctm.placed_size();
            let width = to_pixels(width_pt, dpi);
            let height = to_pixels(height_pt, dpi);
            let rendered = decoded.resize_exact(width, height, FilterType::Triangle);

            let mut png = Vec::new();
            rendered
                .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
                .map_err(|e| ToolError::library(OP, e))?;
            images.push(ExtractedImage {
                page: number,
                index,
                image_base64: base64::engine::general_purpose::STANDARD.encode(&png),
                width,
                height,
            });
        }
    }

    tracing::info!(images = images.len(), dpi, "extracted images");
    Ok(OperationResult::Data(json!({ "images": images })))
}

fn to_pixels(points: f32, dpi: u32) -> u32 {
    ((points * dpi as f32 / 72.0).round() as u32).clamp(1, MAX_RENDER_SIDE)
}

/// Walks the page content and records each image XObject with the CTM in
/// effect at its `Do`.
fn placed_images(doc: &Document, page_id: ObjectId) -> lopdf::Result<Vec<(ObjectId, Matrix)>> {
    let content = Content::decode(&doc.get_page_content(page_id)?)?;
    let resources = page_resources(doc, page_id);
    let xobjects = resources
        .get(b"XObject")
        .ok()
        .and_then(|object| resolve_dict(doc, object));

    let mut ctm = Matrix::IDENTITY;
    let mut saved = Vec::new();
    let mut placed = Vec::new();
    for operation in &content.operations {
        match operation.operator.as_str() {
            "q" => saved.push(ctm),
            "Q" => ctm = saved.pop().unwrap_or(Matrix::IDENTITY),
            "cm" => {
                let values: Vec<f32> = operation
                    .operands
                    .iter()
                    .filter_map(super::object_to_f32)
                    .collect();
                if let Ok(values) = <[f32; 6]>::try_from(values) {
                    ctm = Matrix(values).then(ctm);
                }
            }
            "Do" => {
                let Some(name) = operation.operands.first().and_then(|o| o.as_name().ok()) else {
                    continue;
                };
                let Some(Object::Reference(id)) = xobjects.and_then(|x| x.get(name).ok()) else {
                    continue;
                };
                let is_image = doc
                    .get_object(*id)
                    .and_then(Object::as_stream)
                    .ok()
                    .and_then(|stream| stream.dict.get(b"Subtype").and_then(Object::as_name).ok())
                    == Some(b"Image".as_slice());
                if is_image {
                    placed.push((*id, ctm));
                }
            }
            _ => {}
        }
    }
    Ok(placed)
}

/// Decodes an image XObject into pixels. JPEG data goes through the image
/// crate; otherwise 8-bit Gray/RGB/CMYK samples are read after filters.
fn decode_image(doc: &Document, image_id: ObjectId) -> Option<DynamicImage> {
    let stream = doc.get_object(image_id).ok()?.as_stream().ok()?;
    let dict = &stream.dict;

    let filters: Vec<&[u8]> = match dict.get(b"Filter").ok().map(|f| resolve(doc, f)) {
        Some(Object::Name(name)) => vec![name.as_slice()],
        Some(Object::Array(items)) => items.iter().filter_map(|i| i.as_name().ok()).collect(),
        _ => Vec::new(),
    };
    if filters.last() == Some(&b"DCTDecode".as_slice()) {
        return image::load_from_memory_with_format(&stream.content, ImageFormat::Jpeg).ok();
    }

    let width = u32::try_from(dict.get(b"Width").ok()?.as_i64().ok()?).ok()?;
    let height = u32::try_from(dict.get(b"Height").ok()?.as_i64().ok()?).ok()?;
    let bits = dict.get(b"BitsPerComponent").and_then(Object::as_i64).unwrap_or(8);
    if bits != 8 {
        return None;
    }
    let samples = if filters.is_empty() {
        stream.content.clone()
    } else {
        stream.decompressed_content().ok()?
    };

    match color_components(doc, dict)? {
        1 => GrayImage::from_raw(width, height, truncated(samples, width, height, 1)?)
            .map(DynamicImage::ImageLuma8),
        3 => RgbImage::from_raw(width, height, truncated(samples, width, height, 3)?)
            .map(DynamicImage::ImageRgb8),
        4 => {
            let cmyk = truncated(samples, width, height, 4)?;
            let rgb = cmyk
                .chunks_exact(4)
                .flat_map(|px| {
                    let k = 255 - u16::from(px[3]);
                    [px[0], px[1], px[2]].map(|c| ((255 - u16::from(c)) * k / 255) as u8)
                })
                .collect();
            RgbImage::from_raw(width, height, rgb).map(DynamicImage::ImageRgb8)
        }
        _ => None,
    }
}

fn truncated(mut samples: Vec<u8>, width: u32, height: u32, components: usize) -> Option<Vec<u8>> {
    let needed = width as usize * height as usize * components;
    if samples.len() < needed {
        return None;
    }
    samples.truncate(needed);
    Some(samples)
}

fn color_components(doc: &Document, dict: &Dictionary) -> Option<u8> {
    match resolve(doc, dict.get(b"ColorSpace").ok()?) {
        Object::Name(name) => match name.as_slice() {
            b"DeviceGray" | b"CalGray" | b"G" => Some(1),
            b"DeviceRGB" | b"CalRGB" | b"RGB" => Some(3),
            b"DeviceCMYK" | b"CMYK" => Some(4),
            _ => None,
        },
        Object::Array(items)
            if items.first().and_then(|i| i.as_name().ok()) == Some(b"ICCBased".as_slice()) =>
        {
            let profile = resolve(doc, items.get(1)?).as_stream().ok()?;
            u8::try_from(profile.dict.get(b"N").ok()?.as_i64().ok()?).ok()
        }
        _ => None,
    }
}

/// One page per image, scaled to fit inside the margins and centred.
pub(super) fn images_to_pdf(
    inputs: &[ValidatedFile],
    page_size: PageSize,
    margin: u32,
    stager: &Stager,
) -> Result<OperationResult> {
    const OP: &str = "images to pdf";

    let (page_width, page_height) = page_size.dimensions();
    let margin = margin as f32;
    let (box_width, box_height) = (page_width - 2.0 * margin, page_height - 2.0 * margin);

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let mut kids: Vec<Object> = Vec::with_capacity(inputs.len());

    for input in inputs {
        let decoded = image::open(input.path()).map_err(|e| ToolError::library(OP, e))?;
        let rgb = flatten_onto_white(&decoded);
        let (width, height) = rgb.dimensions();

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(rgb.as_raw())
            .map_err(|e| ToolError::storage(OP, e))?;
        let data = encoder.finish().map_err(|e| ToolError::storage(OP, e))?;
        let image_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => i64::from(width),
                "Height" => i64::from(height),
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
                "Filter" => "FlateDecode",
            },
            data,
        ));

        let scale = (box_width / width as f32).min(box_height / height as f32);
        let (drawn_width, drawn_height) = (width as f32 * scale, height as f32 * scale);
        let x = (page_width - drawn_width) / 2.0;
        let y = (page_height - drawn_height) / 2.0;
        let content =
            format!("q\n{drawn_width:.3} 0 0 {drawn_height:.3} {x:.3} {y:.3} cm\n/Im0 Do\nQ\n");
        let content_id = doc.add_object(Stream::new(Dictionary::new(), content.into_bytes()));

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), page_width.into(), page_height.into()],
            "Contents" => content_id,
            "Resources" => dictionary! {
                "XObject" => dictionary! { "Im0" => image_id },
            },
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let artifact = save_pdf(&mut doc, "images_to_pdf", OP, stager)?;
    tracing::info!(images = inputs.len(), ?page_size, "converted images to PDF");
    Ok(OperationResult::Artifact(artifact))
}

/// Composites any alpha channel onto a white background.
fn flatten_onto_white(image: &DynamicImage) -> RgbImage {
    if !image.color().has_alpha() {
        return image.to_rgb8();
    }
    let rgba = image.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let alpha = u16::from(a);
        let blend = |c: u8| ((u16::from(c) * alpha + 255 * (255 - alpha)) / 255) as u8;
        image::Rgb([blend(r), blend(g), blend(b)])
    })
}
