//! PDF document assembly from decoded raster pages.
//!
//! Each page is a JPEG-compressed `DeviceRGB` image XObject drawn to fill
//! the page; page size is derived from the pixel dimensions at the
//! configured DPI. Assembly is deterministic: the same inputs in the same
//! order produce the same object layout.

use std::path::Path;

use image::RgbImage;
use image::codecs::jpeg::JpegEncoder;
use lopdf::{Document, Object, Stream, dictionary};
use tracing::debug;

use super::ConvertError;

/// JPEG quality used for embedded page images.
const JPEG_QUALITY: u8 = 90;

/// PDF points per inch.
const POINTS_PER_INCH: f32 = 72.0;

/// Writes `images` as consecutive pages of a single PDF at `output`.
///
/// The first image is the base page, the rest are appended in order.
/// The caller guarantees `images` is non-empty.
pub(crate) fn write_pdf(
    images: &[RgbImage],
    dpi: u32,
    output: &Path,
) -> Result<(), ConvertError> {
    let mut doc = Document::with_version("1.5");
    let mut page_ids = Vec::with_capacity(images.len());

    for rgb in images {
        let (width_px, height_px) = rgb.dimensions();
        let width_pt = px_to_points(width_px, dpi);
        let height_pt = px_to_points(height_px, dpi);

        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY)
            .encode_image(rgb)
            .map_err(|e| ConvertError::image(output, e))?;

        let xobject_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => i64::from(width_px),
                "Height" => i64::from(height_px),
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => Object::Integer(8),
                "Filter" => "DCTDecode",
            },
            jpeg,
        ));

        let content = format!("q {width_pt:.2} 0 0 {height_pt:.2} 0 0 cm /Im0 Do Q");
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Real(width_pt),
                Object::Real(height_pt),
            ],
            "Contents" => Object::Reference(content_id),
            "Resources" => dictionary! {
                "XObject" => dictionary! {
                    "Im0" => Object::Reference(xobject_id),
                },
            },
        });
        page_ids.push(page_id);
    }

    let kids: Vec<Object> = page_ids.iter().map(|id| Object::Reference(*id)).collect();
    let count = i64::try_from(page_ids.len()).unwrap_or(i64::MAX);
    let pages_id = doc.add_object(dictionary! {
        "Type" => "Pages",
        "Kids" => kids,
        "Count" => count,
    });

    // Page parents can only be set once the pages tree object exists.
    for page_id in &page_ids {
        if let Ok(page_obj) = doc.get_object_mut(*page_id)
            && let Ok(dict) = page_obj.as_dict_mut()
        {
            dict.set("Parent", Object::Reference(pages_id));
        }
    }

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => Object::Reference(pages_id),
    });
    doc.trailer.set("Root", Object::Reference(catalog_id));

    doc.save(output)
        .map_err(|e| ConvertError::pdf(output, lopdf::Error::IO(e)))?;
    debug!(
        path = %output.display(),
        pages = images.len(),
        "PDF written"
    );
    Ok(())
}

fn px_to_points(pixels: u32, dpi: u32) -> f32 {
    let dpi = dpi.max(1);
    pixels as f32 * POINTS_PER_INCH / dpi as f32
}
