//! Image encoding: rendered page → base64 PNG wrapped in `ImageData`.
//!
//! Roll scans are black print on tinted paper. The page is converted to 8-bit
//! grayscale before encoding: colour carries nothing the model needs, and the
//! PNG shrinks to roughly a third of its RGBA size, which keeps request
//! bodies small at 300 DPI. PNG over JPEG because compression artefacts
//! around Devanagari conjuncts confuse vision models.

use crate::pipeline::render::RenderedPage;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Encode a rendered page as a grayscale base64 PNG with `detail: "high"`.
pub fn encode_page(page: &RenderedPage) -> Result<ImageData, image::ImageError> {
    let gray = DynamicImage::ImageLuma8(page.image.to_luma8());

    let mut buf = Vec::new();
    gray.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    drop(gray);

    let b64 = STANDARD.encode(&buf);
    debug!(
        page = page.page_num,
        png_bytes = buf.len(),
        b64_bytes = b64.len(),
        "Encoded page"
    );

    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}
