use super::{load_pdf, save_pdf, strip_structural_streams, OperationResult, SizeReport};
use crate::error::{Result, ToolError};
use crate::staging::Stager;
use crate::validation::ValidatedFile;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use image::codecs::jpeg::JpegEncoder;
use image::{GrayImage, RgbImage};
use lopdf::{Document, Object, ObjectId, Stream};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::Write;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizeOptions {
    pub compress_images: bool,
    /// JPEG quality, 10 to 100
    pub image_quality: u8,
    pub compress_fonts: bool,
    pub remove_metadata: bool,
}

impl Default for OptimizeOptions {
    fn default() -> Self {
        Self {
            compress_images: true,
            image_quality: 80,
            compress_fonts: true,
            remove_metadata: false,
        }
    }
}

pub(super) fn check_quality(quality: u8) -> Result<()> {
    if !(10..=100).contains(&quality) {
        return Err(ToolError::Validation(format!(
            "Quality must be between 10 and 100, got {quality}"
        )));
    }
    Ok(())
}

#[derive(Debug, Default)]
struct Stats {
    images_recoded: usize,
    streams_compressed: usize,
}

/// Re-serializes the document with compressed streams and pruned objects.
///
/// Growth is reported, not rejected.
pub(super) fn run(
    input: &ValidatedFile,
    options: &OptimizeOptions,
    stem: &'static str,
    stager: &Stager,
) -> Result<OperationResult> {
    const OP: &str = "optimize";

    let original_size = input.staged.size();
    let mut doc = load_pdf(input, OP)?;
    strip_structural_streams(&mut doc);

    if options.remove_metadata {
        doc.trailer.remove(b"Info");
        if let Ok(catalog) = super::catalog_mut(&mut doc, OP) {
            catalog.remove(b"Metadata");
        }
    }
    doc.prune_objects();

    let font_files = if options.compress_fonts {
        HashSet::new()
    } else {
        font_file_ids(&doc)
    };

    let mut stats = Stats::default();
    for (id, object) in doc.objects.iter_mut() {
        let Object::Stream(stream) = object else {
            continue;
        };
        if options.compress_images && recode_image(stream, options.image_quality) {
            stats.images_recoded += 1;
            continue;
        }
        if font_files.contains(id) {
            continue;
        }
        if deflate(stream).map_err(|e| ToolError::storage(OP, e))? {
            stats.streams_compressed += 1;
        }
    }
    doc.renumber_objects();

    let mut artifact = save_pdf(&mut doc, stem, OP, stager)?;
    let report = SizeReport {
        original_size,
        result_size: artifact.size,
    };
    tracing::info!(
        original = report.original_size,
        result = report.result_size,
        reduction_percent = report.reduction_percent(),
        images = stats.images_recoded,
        streams = stats.streams_compressed,
        "optimized PDF"
    );
    artifact.report = Some(report);
    Ok(OperationResult::Artifact(artifact))
}

/// Streams referenced as embedded font programs.
fn font_file_ids(doc: &Document) -> HashSet<ObjectId> {
    doc.objects
        .values()
        .filter_map(|object| object.as_dict().ok())
        .filter(|dict| {
            dict.get(b"Type")
                .and_then(Object::as_name)
                .is_ok_and(|t| t == b"FontDescriptor")
        })
        .flat_map(|dict| {
            let keys: [&[u8]; 3] = [b"FontFile", b"FontFile2", b"FontFile3"];
            keys.into_iter()
                .filter_map(move |key| dict.get(key).and_then(Object::as_reference).ok())
        })
        .collect()
}

/// Flate-compresses an unfiltered stream. Returns whether it changed.
fn deflate(stream: &mut Stream) -> std::io::Result<bool> {
    if !stream.allows_compression || stream.dict.has(b"Filter") || stream.content.is_empty() {
        return Ok(false);
    }
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(&stream.content)?;
    let compressed = encoder.finish()?;
    if compressed.len() >= stream.content.len() {
        return Ok(false);
    }
    stream.dict.set("Filter", "FlateDecode");
    stream.set_content(compressed);
    Ok(true)
}

/// Re-encodes an 8-bit RGB or gray raster image as JPEG when that is
/// smaller than its current encoding.
fn recode_image(stream: &mut Stream, quality: u8) -> bool {
    let dict = &stream.dict;
    let is_image = dict.get(b"Subtype").and_then(Object::as_name).is_ok_and(|s| s == b"Image");
    if !is_image || dict.has(b"ImageMask") || dict.has(b"Mask") || dict.has(b"Decode") {
        return false;
    }
    let filter_ok = match dict.get(b"Filter") {
        Err(_) => true,
        Ok(Object::Name(name)) => name == b"FlateDecode",
        Ok(_) => false,
    };
    if !filter_ok || dict.get(b"BitsPerComponent").and_then(Object::as_i64).ok() != Some(8) {
        return false;
    }
    let (Some(width), Some(height)) = (
        dict.get(b"Width").and_then(Object::as_i64).ok().and_then(|w| u32::try_from(w).ok()),
        dict.get(b"Height").and_then(Object::as_i64).ok().and_then(|h| u32::try_from(h).ok()),
    ) else {
        return false;
    };
    let components = match dict.get(b"ColorSpace").and_then(Object::as_name) {
        Ok(b"DeviceRGB") => 3,
        Ok(b"DeviceGray") => 1,
        _ => return false,
    };

    let samples = if dict.has(b"Filter") {
        match stream.decompressed_content() {
            Ok(samples) => samples,
            Err(_) => return false,
        }
    } else {
        stream.content.clone()
    };
    let needed = width as usize * height as usize * components;
    if samples.len() < needed {
        return false;
    }

    let mut jpeg = Vec::new();
    let encoded = {
        let mut encoder = JpegEncoder::new_with_quality(&mut jpeg, quality);
        if components == 3 {
            RgbImage::from_raw(width, height, samples[..needed].to_vec())
                .map(|img| encoder.encode_image(&img))
        } else {
            GrayImage::from_raw(width, height, samples[..needed].to_vec())
                .map(|img| encoder.encode_image(&img))
        }
    };
    if !matches!(encoded, Some(Ok(()))) || jpeg.len() >= stream.content.len() {
        return false;
    }

    stream.dict.set("Filter", "DCTDecode");
    stream.dict.remove(b"DecodeParms");
    stream.set_content(jpeg);
    true
}
