//! Embedded image extraction.
//!
//! Each image object is decoded and re-encoded as JPEG at the configured
//! quality. One unreadable image costs only that image: it is logged, counted
//! as attempted, and recorded as a page warning.

use crate::error::PageError;
use crate::output::ExtractedImage;
use crate::pipeline::encode::encode_jpeg;
use crate::pipeline::source::EmbeddedImage;
use crate::pipeline::Extraction;
use image::DynamicImage;
use tracing::{debug, warn};

/// Images recovered from one page plus the attempt counters.
#[derive(Debug, Clone, Default)]
pub struct PageImages {
    pub images: Vec<ExtractedImage>,
    pub attempted: usize,
}

impl PageImages {
    pub fn converted(&self) -> usize {
        self.images.len()
    }
}

/// Decode and re-encode the image objects read from page `index`.
pub fn extract_images(
    objects: Result<Vec<EmbeddedImage>, String>,
    index: usize,
    quality: u8,
) -> Extraction<PageImages> {
    let page_num = index + 1;
    let objects = match objects {
        Ok(objects) => objects,
        Err(detail) => {
            warn!("Page {}: image objects unavailable: {}", page_num, detail);
            return Extraction::failed(
                PageImages::default(),
                PageError::ImagesUnavailable {
                    page: page_num,
                    detail,
                },
            );
        }
    };

    let mut out = Extraction::ok(PageImages {
        images: Vec::with_capacity(objects.len()),
        attempted: objects.len(),
    });

    for (i, object) in objects.into_iter().enumerate() {
        match convert_one(object, quality) {
            Ok(image) => out.value.images.push(image),
            Err(detail) => {
                warn!("Page {}: image {} skipped: {}", page_num, i + 1, detail);
                out.failures.push(PageError::ImageFailed {
                    page: page_num,
                    image: i + 1,
                    detail,
                });
            }
        }
    }

    debug!(
        "Page {}: {}/{} images converted",
        page_num,
        out.value.converted(),
        out.value.attempted
    );
    out
}

fn convert_one(object: EmbeddedImage, quality: u8) -> Result<ExtractedImage, String> {
    let decoded: DynamicImage = match object {
        EmbeddedImage::Decoded(img) => img,
        EmbeddedImage::Encoded(bytes) => image::load_from_memory(&bytes).map_err(|e| e.to_string())?,
        EmbeddedImage::Unreadable(detail) => return Err(detail),
    };
    if decoded.width() == 0 || decoded.height() == 0 {
        return Err("image has zero area".to_string());
    }

    let data = encode_jpeg(&decoded, quality).map_err(|e| e.to_string())?;
    Ok(ExtractedImage {
        data,
        width: decoded.width(),
        height: decoded.height(),
        mime_type: "image/jpeg",
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn png_bytes() -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 3, Rgb([0, 128, 255])));
        let mut buf = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn one_bad_image_does_not_cost_the_others() {
        let objects = vec![
            EmbeddedImage::Encoded(png_bytes()),
            EmbeddedImage::Encoded(b"not an image".to_vec()),
            EmbeddedImage::Decoded(DynamicImage::ImageRgb8(RgbImage::new(8, 8))),
        ];
        let out = extract_images(Ok(objects), 0, 80);
        assert_eq!(out.value.attempted, 3);
        assert_eq!(out.value.converted(), 2);
        assert_eq!(out.failures.len(), 1);
        assert!(matches!(
            out.failures[0],
            PageError::ImageFailed { page: 1, image: 2, .. }
        ));

        let first = &out.value.images[0];
        assert_eq!((first.width, first.height), (4, 3));
        assert_eq!(first.mime_type, "image/jpeg");
        assert_eq!(&first.data[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn unreadable_object_is_a_failure() {
        let out = extract_images(Ok(vec![EmbeddedImage::Unreadable("bad filter".into())]), 4, 80);
        assert_eq!(out.value.attempted, 1);
        assert_eq!(out.value.converted(), 0);
        assert_eq!(out.failures[0].page(), 5);
    }

    #[test]
    fn enumeration_failure_is_distinct_from_no_images() {
        let none = extract_images(Ok(Vec::new()), 0, 80);
        assert!(none.is_clean());
        assert_eq!(none.value.attempted, 0);

        let failed = extract_images(Err("object list".into()), 0, 80);
        assert!(matches!(
            failed.failures[0],
            PageError::ImagesUnavailable { page: 1, .. }
        ));
    }
}
