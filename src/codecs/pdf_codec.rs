//! PDF inspection and rasterization.
//!
//! Page geometry comes from the document's `MediaBox` entries via `lopdf`,
//! which needs no native code. Rendering pages to pixels goes through
//! pdfium (`pdfium-render`), bound at call time either from an explicit
//! directory or from the system library search path.

use image::DynamicImage;
use lopdf::{Document, Object, ObjectId};
use pdfium_render::prelude::*;
use std::path::PathBuf;
use tracing::debug;

use super::{CodecError, CodecResult};

/// PDF points per inch.
const PDF_POINTS_PER_INCH: f32 = 72.0;

/// Guard against cyclic `Parent` chains in malformed page trees.
const MAX_PAGE_TREE_DEPTH: usize = 64;

/// Page count and first-page size of a document.
#[derive(Clone, Debug, PartialEq)]
pub struct DocumentInfo {
    pub page_count: u32,
    /// Width of the first page in points.
    pub page_width: f64,
    /// Height of the first page in points.
    pub page_height: f64,
}

pub trait DocumentCodec: Send + Sync {
    /// Parse `bytes` and report page count and first-page dimensions.
    fn inspect(&self, bytes: &[u8]) -> CodecResult<DocumentInfo>;

    /// Render every page in page order, handing each one to `on_page`
    /// before the next is rendered. An error from `on_page` stops rendering
    /// and is returned as-is. Returns the number of pages rendered.
    fn rasterize(&self, bytes: &[u8], on_page: &mut PageSink<'_>) -> CodecResult<u32>;
}

/// Receives rendered pages one at a time, with their zero-based index.
pub type PageSink<'a> = dyn FnMut(u32, DynamicImage) -> CodecResult<()> + 'a;

#[derive(Clone, Debug)]
pub struct PdfCodec {
    /// Directory holding the pdfium shared library; `None` uses the system library.
    pub library_dir: Option<PathBuf>,
    /// Render resolution. 72 yields one pixel per point.
    pub dpi: f32,
}

impl Default for PdfCodec {
    fn default() -> Self {
        Self {
            library_dir: None,
            dpi: PDF_POINTS_PER_INCH,
        }
    }
}

impl PdfCodec {
    pub fn new(library_dir: Option<PathBuf>, dpi: f32) -> Self {
        Self { library_dir, dpi }
    }

    fn bind(&self) -> CodecResult<Pdfium> {
        let bindings = match &self.library_dir {
            Some(dir) => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir)),
            None => Pdfium::bind_to_system_library(),
        }
        .map_err(|e| CodecError::Internal(format!("pdfium library unavailable: {:?}", e)))?;
        Ok(Pdfium::new(bindings))
    }
}

impl DocumentCodec for PdfCodec {
    fn inspect(&self, bytes: &[u8]) -> CodecResult<DocumentInfo> {
        let boxes = page_sizes(bytes)?;
        let (page_width, page_height) = *boxes
            .first()
            .ok_or_else(|| CodecError::Unrecognized("document has no pages".into()))?;

        Ok(DocumentInfo {
            page_count: boxes.len() as u32,
            page_width,
            page_height,
        })
    }

    fn rasterize(&self, bytes: &[u8], on_page: &mut PageSink<'_>) -> CodecResult<u32> {
        let pdfium = self.bind()?;
        let document = pdfium
            .load_pdf_from_byte_slice(bytes, None)
            .map_err(|e| CodecError::Internal(format!("failed to open PDF: {:?}", e)))?;

        let render_config =
            PdfRenderConfig::new().scale_page_by_factor(self.dpi / PDF_POINTS_PER_INCH);

        let mut rendered = 0u32;
        for (index, page) in document.pages().iter().enumerate() {
            let bitmap = page.render_with_config(&render_config).map_err(|e| {
                CodecError::Internal(format!("failed to render page {}: {:?}", index + 1, e))
            })?;

            // Pages are flattened to RGB; alpha from the bitmap is not kept.
            let image = DynamicImage::ImageRgb8(bitmap.as_image().to_rgb8());
            debug!(
                "Rendered page {} → {}x{} px",
                index + 1,
                image.width(),
                image.height()
            );
            on_page(rendered, image)?;
            rendered += 1;
        }

        Ok(rendered)
    }
}

/// Width and height, in points, of every page in page order.
///
/// `MediaBox` is looked up on the page and then up the `Parent` chain,
/// since it is an inheritable attribute.
pub fn page_sizes(bytes: &[u8]) -> CodecResult<Vec<(f64, f64)>> {
    let document =
        Document::load_mem(bytes).map_err(|e| CodecError::Unrecognized(e.to_string()))?;

    document
        .get_pages()
        .values()
        .map(|&page_id| media_box_size(&document, page_id))
        .collect()
}

fn media_box_size(document: &Document, page_id: ObjectId) -> CodecResult<(f64, f64)> {
    let mut node = Some(page_id);
    let mut depth = 0;

    while let Some(id) = node {
        if depth > MAX_PAGE_TREE_DEPTH {
            break;
        }
        let dict = document.get_dictionary(id).map_err(malformed)?;
        if let Ok(media_box) = dict.get(b"MediaBox") {
            return box_size(document, media_box);
        }
        node = dict.get(b"Parent").and_then(Object::as_reference).ok();
        depth += 1;
    }

    Err(CodecError::Unrecognized(format!(
        "page {:?} has no MediaBox",
        page_id
    )))
}

fn box_size(document: &Document, media_box: &Object) -> CodecResult<(f64, f64)> {
    let (_, resolved) = document.dereference(media_box).map_err(malformed)?;
    let coords = resolved
        .as_array()
        .map_err(malformed)?
        .iter()
        .map(|value| {
            let (_, value) = document.dereference(value)?;
            value.as_float()
        })
        .collect::<Result<Vec<f32>, lopdf::Error>>()
        .map_err(malformed)?;

    match coords.as_slice() {
        [llx, lly, urx, ury] => Ok((
            (f64::from(*urx) - f64::from(*llx)).abs(),
            (f64::from(*ury) - f64::from(*lly)).abs(),
        )),
        other => Err(CodecError::Unrecognized(format!(
            "MediaBox has {} entries, expected 4",
            other.len()
        ))),
    }
}

fn malformed(err: lopdf::Error) -> CodecError {
    CodecError::Unrecognized(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{Dictionary, dictionary};

    /// Build a PDF whose pages carry the given MediaBox sizes.
    fn pdf_with_pages(sizes: &[(i64, i64)]) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let kids: Vec<Object> = sizes
            .iter()
            .map(|&(w, h)| {
                let page: Dictionary = dictionary! {
                    "Type" => "Page",
                    "Parent" => pages_id,
                    "MediaBox" => vec![
                        Object::Integer(0),
                        Object::Integer(0),
                        Object::Integer(w),
                        Object::Integer(h),
                    ],
                };
                Object::Reference(doc.add_object(page))
            })
            .collect();

        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => Object::Integer(sizes.len() as i64),
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages));

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buf = Vec::new();
        doc.save_to(&mut buf).unwrap();
        buf
    }

    #[test]
    fn inspects_single_letter_page() {
        let info = PdfCodec::default()
            .inspect(&pdf_with_pages(&[(612, 792)]))
            .unwrap();
        assert_eq!(
            info,
            DocumentInfo {
                page_count: 1,
                page_width: 612.0,
                page_height: 792.0
            }
        );
    }

    #[test]
    fn reports_first_page_size_only() {
        let info = PdfCodec::default()
            .inspect(&pdf_with_pages(&[(595, 842), (612, 792), (100, 100)]))
            .unwrap();
        assert_eq!(info.page_count, 3);
        assert_eq!((info.page_width, info.page_height), (595.0, 842.0));
    }

    #[test]
    fn page_sizes_follow_page_order() {
        let sizes = page_sizes(&pdf_with_pages(&[(10, 20), (30, 40)])).unwrap();
        assert_eq!(sizes, vec![(10.0, 20.0), (30.0, 40.0)]);
    }

    #[test]
    fn media_box_is_inherited_from_page_tree() {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::Reference(page_id)],
                "Count" => Object::Integer(1),
                "MediaBox" => vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Real(419.5),
                    Object::Integer(595),
                ],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        let mut buf = Vec::new();
        doc.save_to(&mut buf).unwrap();

        let info = PdfCodec::default().inspect(&buf).unwrap();
        assert_eq!((info.page_width, info.page_height), (419.5, 595.0));
    }

    #[test]
    fn rejects_non_pdf_bytes() {
        let err = PdfCodec::default().inspect(b"not a pdf at all").unwrap_err();
        assert!(matches!(err, CodecError::Unrecognized(_)), "{err:?}");
    }

    #[test]
    fn rejects_document_without_pages() {
        let err = PdfCodec::default()
            .inspect(&pdf_with_pages(&[]))
            .unwrap_err();
        assert!(matches!(err, CodecError::Unrecognized(_)), "{err:?}");
    }
}
