//! Page codec and document assembly.
//!
//! [`decode_page`] turns the processed bytes of one page into a
//! [`PageObject`]; [`DocumentBuilder`] accumulates page objects into a
//! PDF 1.4 container and serializes the whole document on demand. Every
//! serialization re-applies the document-global metadata (Info dictionary,
//! ID pair, XMP stream, sRGB output intent), so each checkpoint is an
//! independently well-formed document regardless of how many pages have
//! merged so far.

use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use pagepress_metadata::{ColorProfile, DocumentMetadata};
use thiserror::Error;
use tracing::debug;

/// Codec errors
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed page image: {0}")]
    MalformedPage(String),

    #[error("document assembly failed: {0}")]
    Assembly(String),
}

impl From<lopdf::Error> for CodecError {
    fn from(err: lopdf::Error) -> Self {
        CodecError::Assembly(err.to_string())
    }
}

impl From<std::io::Error> for CodecError {
    fn from(err: std::io::Error) -> Self {
        CodecError::Assembly(err.to_string())
    }
}

/// One decoded page: 8-bit RGB raster plus pixel dimensions
#[derive(Debug, Clone)]
pub struct PageObject {
    pub width: u32,
    pub height: u32,
    rgb: Vec<u8>,
}

impl PageObject {
    /// Wrap a raw RGB raster, validating the buffer length
    pub fn new(width: u32, height: u32, rgb: Vec<u8>) -> Result<Self, CodecError> {
        let expected = width as usize * height as usize * 3;
        if rgb.len() != expected {
            return Err(CodecError::MalformedPage(format!(
                "RGB buffer is {} bytes, expected {expected} for {width}x{height}",
                rgb.len()
            )));
        }
        Ok(Self { width, height, rgb })
    }

    /// Page dimensions in PDF points at the given render resolution
    #[must_use]
    pub fn size_points(&self, dpi: u32) -> (f32, f32) {
        let dpi = dpi.max(1) as f32;
        (
            self.width as f32 * 72.0 / dpi,
            self.height as f32 * 72.0 / dpi,
        )
    }
}

/// Decode processed page bytes (any raster format the `image` crate
/// recognizes) into a composable page object.
pub fn decode_page(bytes: &[u8]) -> Result<PageObject, CodecError> {
    let image =
        image::load_from_memory(bytes).map_err(|e| CodecError::MalformedPage(e.to_string()))?;
    let rgb = image.to_rgb8();
    let (width, height) = rgb.dimensions();
    if width == 0 || height == 0 {
        return Err(CodecError::MalformedPage("empty image".to_string()));
    }
    PageObject::new(width, height, rgb.into_raw())
}

/// Assembly configuration
#[derive(Debug, Clone)]
pub struct DocumentConfig {
    /// Resolution the page rasters were produced at; pixel dimensions map
    /// to page size through this value
    pub dpi: u32,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self { dpi: 300 }
    }
}

/// Incremental PDF assembler.
///
/// Pages are appended as they merge; [`DocumentBuilder::checkpoint`]
/// serializes the current state. Metadata objects live in fixed slots that
/// are rewritten on every checkpoint, matching the PDF rule that trailer
/// and catalog entries must be re-set on each write or later writes lose
/// them.
pub struct DocumentBuilder {
    doc: Document,
    pages_id: ObjectId,
    catalog_id: ObjectId,
    info_id: ObjectId,
    metadata_id: ObjectId,
    profile_id: ObjectId,
    intent_id: ObjectId,
    page_ids: Vec<ObjectId>,
    dpi: u32,
}

impl DocumentBuilder {
    #[must_use]
    pub fn new(config: &DocumentConfig) -> Self {
        let mut doc = Document::with_version("1.4");
        let pages_id = doc.new_object_id();
        let catalog_id = doc.new_object_id();
        let info_id = doc.new_object_id();
        let metadata_id = doc.new_object_id();
        let profile_id = doc.new_object_id();
        let intent_id = doc.new_object_id();
        Self {
            doc,
            pages_id,
            catalog_id,
            info_id,
            metadata_id,
            profile_id,
            intent_id,
            page_ids: Vec::new(),
            dpi: config.dpi,
        }
    }

    #[must_use]
    pub fn page_count(&self) -> usize {
        self.page_ids.len()
    }

    /// Append one page: image XObject, content stream, page dictionary
    pub fn append_page(&mut self, page: &PageObject) -> Result<(), CodecError> {
        let image_stream = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => page.width as i64,
                "Height" => page.height as i64,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
            },
            page.rgb.clone(),
        );
        let image_id = self.doc.add_object(image_stream);

        let (width_pt, height_pt) = page.size_points(self.dpi);
        let content = format!("q\n{width_pt:.4} 0 0 {height_pt:.4} 0 0 cm\n/Im0 Do\nQ");
        let content_id = self
            .doc
            .add_object(Stream::new(Dictionary::new(), content.into_bytes()));

        let page_id = self.doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            // whole-point media box; the content matrix carries the exact
            // scale, so rounding up just leaves a sub-point margin
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(width_pt.ceil() as i64),
                Object::Integer(height_pt.ceil() as i64),
            ],
            "Resources" => dictionary! {
                "XObject" => dictionary! { "Im0" => image_id },
            },
            "Contents" => content_id,
        });
        self.page_ids.push(page_id);
        debug!(
            page = self.page_ids.len(),
            width = page.width,
            height = page.height,
            "page appended"
        );
        Ok(())
    }

    /// Re-apply the document-global metadata and serialize the whole
    /// document. Safe to call repeatedly as the document grows.
    pub fn checkpoint(
        &mut self,
        metadata: &DocumentMetadata,
        profile: &ColorProfile,
    ) -> Result<Vec<u8>, CodecError> {
        let kids: Vec<Object> = self
            .page_ids
            .iter()
            .map(|id| Object::Reference(*id))
            .collect();
        self.doc.objects.insert(
            self.pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => self.page_ids.len() as i64,
            }),
        );

        let mut info = Dictionary::new();
        for (key, value) in metadata.info_entries() {
            info.set(key, Object::string_literal(value));
        }
        self.doc
            .objects
            .insert(self.info_id, Object::Dictionary(info));

        // PDF/A requires the XMP stream to stay unfiltered
        let xmp_stream = Stream::new(
            dictionary! {
                "Type" => "Metadata",
                "Subtype" => "XML",
            },
            metadata.xmp_packet().into_bytes(),
        )
        .with_compression(false);
        self.doc
            .objects
            .insert(self.metadata_id, Object::Stream(xmp_stream));

        let profile_stream = Stream::new(
            dictionary! {
                "N" => profile.components(),
                "Alternate" => "DeviceRGB",
            },
            profile.bytes().to_vec(),
        );
        self.doc
            .objects
            .insert(self.profile_id, Object::Stream(profile_stream));
        self.doc.objects.insert(
            self.intent_id,
            Object::Dictionary(dictionary! {
                "Type" => "OutputIntent",
                "S" => "GTS_PDFA1",
                "OutputConditionIdentifier" => Object::string_literal(profile.condition_identifier()),
                "Info" => Object::string_literal(profile.description()),
                "RegistryName" => Object::string_literal(profile.registry()),
                "DestOutputProfile" => self.profile_id,
            }),
        );

        self.doc.objects.insert(
            self.catalog_id,
            Object::Dictionary(dictionary! {
                "Type" => "Catalog",
                "Pages" => self.pages_id,
                "Metadata" => self.metadata_id,
                "OutputIntents" => vec![Object::Reference(self.intent_id)],
            }),
        );

        self.doc.trailer.set("Root", self.catalog_id);
        self.doc.trailer.set("Info", self.info_id);
        let id = Object::string_literal(metadata.identifier().to_string());
        self.doc.trailer.set("ID", vec![id.clone(), id]);

        self.doc.compress();
        let mut bytes = Vec::new();
        self.doc.save_to(&mut bytes)?;
        debug!(
            pages = self.page_ids.len(),
            bytes = bytes.len(),
            "document serialized"
        );
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone};
    use pagepress_metadata::DocumentProperties;
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
        let img = image::RgbImage::from_pixel(width, height, image::Rgb(color));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn test_metadata() -> DocumentMetadata {
        DocumentMetadata::build(DocumentProperties {
            title: "Codec Test".to_string(),
            author: "Tester".to_string(),
            timestamp: Some(
                FixedOffset::east_opt(0)
                    .unwrap()
                    .with_ymd_and_hms(2026, 8, 6, 9, 0, 0)
                    .unwrap(),
            ),
            ..DocumentProperties::default()
        })
    }

    fn info_string(doc: &Document, key: &[u8]) -> Option<String> {
        let info_ref = doc.trailer.get(b"Info").ok()?.as_reference().ok()?;
        let info = doc.get_object(info_ref).ok()?.as_dict().ok()?;
        match info.get(key).ok()? {
            Object::String(bytes, _) => String::from_utf8(bytes.clone()).ok(),
            _ => None,
        }
    }

    #[test]
    fn test_decode_page_png() {
        let page = decode_page(&png_bytes(12, 7, [200, 10, 10])).unwrap();
        assert_eq!(page.width, 12);
        assert_eq!(page.height, 7);
    }

    #[test]
    fn test_decode_page_rejects_garbage() {
        let err = decode_page(b"definitely not an image").unwrap_err();
        assert!(matches!(err, CodecError::MalformedPage(_)));
    }

    #[test]
    fn test_page_object_validates_length() {
        assert!(PageObject::new(2, 2, vec![0; 12]).is_ok());
        assert!(PageObject::new(2, 2, vec![0; 11]).is_err());
    }

    #[test]
    fn test_size_points() {
        let page = PageObject::new(300, 600, vec![0; 300 * 600 * 3]).unwrap();
        let (w, h) = page.size_points(300);
        assert!((w - 72.0).abs() < 0.01);
        assert!((h - 144.0).abs() < 0.01);
    }

    #[test]
    fn test_checkpoint_roundtrip() {
        let metadata = test_metadata();
        let profile = ColorProfile::srgb().unwrap();
        let mut builder = DocumentBuilder::new(&DocumentConfig::default());
        builder
            .append_page(&decode_page(&png_bytes(10, 10, [0, 0, 0])).unwrap())
            .unwrap();
        builder
            .append_page(&decode_page(&png_bytes(20, 10, [255, 255, 255])).unwrap())
            .unwrap();

        let bytes = builder.checkpoint(&metadata, &profile).unwrap();
        let parsed = Document::load_mem(&bytes).unwrap();
        assert_eq!(parsed.get_pages().len(), 2);
        assert_eq!(info_string(&parsed, b"Title").unwrap(), "Codec Test");
        assert_eq!(
            info_string(&parsed, b"CreationDate").unwrap(),
            info_string(&parsed, b"ModDate").unwrap()
        );
    }

    #[test]
    fn test_checkpoint_grows_and_stays_valid() {
        let metadata = test_metadata();
        let profile = ColorProfile::srgb().unwrap();
        let mut builder = DocumentBuilder::new(&DocumentConfig::default());

        builder
            .append_page(&decode_page(&png_bytes(8, 8, [1, 2, 3])).unwrap())
            .unwrap();
        let first = builder.checkpoint(&metadata, &profile).unwrap();
        builder
            .append_page(&decode_page(&png_bytes(8, 8, [4, 5, 6])).unwrap())
            .unwrap();
        let second = builder.checkpoint(&metadata, &profile).unwrap();

        assert_eq!(Document::load_mem(&first).unwrap().get_pages().len(), 1);
        assert_eq!(Document::load_mem(&second).unwrap().get_pages().len(), 2);
    }

    #[test]
    fn test_document_id_doubled_and_stable() {
        let metadata = test_metadata();
        let profile = ColorProfile::srgb().unwrap();
        let mut builder = DocumentBuilder::new(&DocumentConfig::default());
        builder
            .append_page(&decode_page(&png_bytes(4, 4, [9, 9, 9])).unwrap())
            .unwrap();

        let extract_id = |bytes: &[u8]| -> Vec<Vec<u8>> {
            let parsed = Document::load_mem(bytes).unwrap();
            let array = parsed.trailer.get(b"ID").unwrap().as_array().unwrap().clone();
            array
                .iter()
                .map(|obj| match obj {
                    Object::String(s, _) => s.clone(),
                    other => panic!("unexpected ID entry: {other:?}"),
                })
                .collect()
        };

        let first = extract_id(&builder.checkpoint(&metadata, &profile).unwrap());
        builder
            .append_page(&decode_page(&png_bytes(4, 4, [9, 9, 9])).unwrap())
            .unwrap();
        let second = extract_id(&builder.checkpoint(&metadata, &profile).unwrap());

        assert_eq!(first.len(), 2);
        assert_eq!(first[0], first[1]);
        assert_eq!(first, second);
        assert_eq!(first[0], metadata.identifier().as_bytes());
    }

    #[test]
    fn test_xmp_stream_uncompressed() {
        let metadata = test_metadata();
        let profile = ColorProfile::srgb().unwrap();
        let mut builder = DocumentBuilder::new(&DocumentConfig::default());
        builder
            .append_page(&decode_page(&png_bytes(4, 4, [0, 0, 0])).unwrap())
            .unwrap();
        let bytes = builder.checkpoint(&metadata, &profile).unwrap();

        let parsed = Document::load_mem(&bytes).unwrap();
        let root = parsed.trailer.get(b"Root").unwrap().as_reference().unwrap();
        let catalog = parsed.get_object(root).unwrap().as_dict().unwrap();
        let meta_ref = catalog.get(b"Metadata").unwrap().as_reference().unwrap();
        let Object::Stream(stream) = parsed.get_object(meta_ref).unwrap() else {
            panic!("Metadata is not a stream");
        };
        assert!(stream.dict.get(b"Filter").is_err());
        let content = String::from_utf8_lossy(&stream.content);
        assert!(content.contains("<x:xmpmeta"));
        assert!(content.contains("pdfaid:part"));
    }

    #[test]
    fn test_output_intent_present() {
        let metadata = test_metadata();
        let profile = ColorProfile::srgb().unwrap();
        let mut builder = DocumentBuilder::new(&DocumentConfig::default());
        builder
            .append_page(&decode_page(&png_bytes(4, 4, [0, 0, 0])).unwrap())
            .unwrap();
        let bytes = builder.checkpoint(&metadata, &profile).unwrap();

        let parsed = Document::load_mem(&bytes).unwrap();
        let root = parsed.trailer.get(b"Root").unwrap().as_reference().unwrap();
        let catalog = parsed.get_object(root).unwrap().as_dict().unwrap();
        let intents = catalog.get(b"OutputIntents").unwrap().as_array().unwrap();
        assert_eq!(intents.len(), 1);
        let intent_ref = intents[0].as_reference().unwrap();
        let intent = parsed.get_object(intent_ref).unwrap().as_dict().unwrap();
        let profile_ref = intent
            .get(b"DestOutputProfile")
            .unwrap()
            .as_reference()
            .unwrap();
        assert!(matches!(
            parsed.get_object(profile_ref).unwrap(),
            Object::Stream(_)
        ));
    }
}
