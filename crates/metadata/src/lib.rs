//! Document-level metadata for assembled PDFs.
//!
//! The same set of properties has to surface in two places that PDF/A
//! readers cross-check: the flat `/Info` dictionary and the structured XMP
//! packet. [`DocumentMetadata`] holds the properties together with a
//! timestamp and content-derived identifier that are resolved exactly once
//! per run, so every checkpoint of a growing document carries identical
//! dates and an identical ID pair.
//!
//! # Example
//!
//! ```
//! use pagepress_metadata::{DocumentMetadata, DocumentProperties};
//!
//! let properties = DocumentProperties {
//!     title: "A Scanned Document".to_string(),
//!     author: "Example Person".to_string(),
//!     ..DocumentProperties::default()
//! };
//! let metadata = DocumentMetadata::build(properties);
//! assert_eq!(metadata.identifier().len(), 64);
//! ```

mod color;

pub use color::{ColorProfile, ProfileError};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, FixedOffset, Local};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A pre-rendered JPEG thumbnail to embed in the XMP packet
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thumbnail {
    pub width: u32,
    pub height: u32,
    pub jpeg: Vec<u8>,
}

/// User-facing document properties.
///
/// `timestamp` pins the creation/modification date; when `None`, the local
/// time at [`DocumentMetadata::build`] is used. All derived representations
/// stay deterministic for a fixed timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentProperties {
    pub title: String,
    pub author: String,
    pub subject: String,
    pub keywords: Vec<String>,
    pub creator: String,
    pub producer: String,
    pub thumbnail: Option<Thumbnail>,
    pub timestamp: Option<DateTime<FixedOffset>>,
}

impl Default for DocumentProperties {
    fn default() -> Self {
        Self {
            title: String::new(),
            author: String::new(),
            subject: String::new(),
            keywords: Vec::new(),
            creator: String::new(),
            producer: concat!("pagepress ", env!("CARGO_PKG_VERSION")).to_string(),
            thumbnail: None,
            timestamp: None,
        }
    }
}

/// Properties plus the per-run timestamp and identifier.
///
/// Built once per run and shared by reference with every checkpoint write;
/// both halves of the PDF ID pair and both date fields reuse the values
/// computed here.
#[derive(Debug, Clone)]
pub struct DocumentMetadata {
    properties: DocumentProperties,
    timestamp: DateTime<FixedOffset>,
    identifier: String,
}

impl DocumentMetadata {
    /// Resolve the timestamp and compute the content-derived identifier
    #[must_use]
    pub fn build(properties: DocumentProperties) -> Self {
        let timestamp = properties
            .timestamp
            .unwrap_or_else(|| Local::now().fixed_offset());
        let identifier = compute_identifier(&properties, &pdf_date(&timestamp));
        Self {
            properties,
            timestamp,
            identifier,
        }
    }

    /// Hex SHA-256 digest over the canonical property strings and timestamp
    #[must_use]
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// The timestamp in PDF date syntax, e.g. `D:20260806123456+01'00'`
    #[must_use]
    pub fn pdf_timestamp(&self) -> String {
        pdf_date(&self.timestamp)
    }

    /// The timestamp in ISO-8601 syntax for the XMP packet
    #[must_use]
    pub fn xmp_timestamp(&self) -> String {
        self.timestamp.format("%Y-%m-%dT%H:%M:%S%:z").to_string()
    }

    #[must_use]
    pub fn keywords_joined(&self) -> String {
        self.properties.keywords.join(", ")
    }

    /// Flat key/value pairs for the `/Info` dictionary
    #[must_use]
    pub fn info_entries(&self) -> Vec<(&'static str, String)> {
        let date = self.pdf_timestamp();
        vec![
            ("Title", self.properties.title.clone()),
            ("Author", self.properties.author.clone()),
            ("Subject", self.properties.subject.clone()),
            ("Keywords", self.keywords_joined()),
            ("Creator", self.properties.creator.clone()),
            ("Producer", self.properties.producer.clone()),
            ("CreationDate", date.clone()),
            ("ModDate", date),
        ]
    }

    /// Serialize the XMP packet.
    ///
    /// Every required field mirrors the `/Info` dictionary exactly; the
    /// packet additionally carries the PDF/A-1B identification schema and
    /// the document identifier. See the PDF/A-1 predefined XMP property
    /// note (pdfa.org TN0008) for the field set.
    #[must_use]
    pub fn xmp_packet(&self) -> String {
        let date = self.xmp_timestamp();
        let mut packet = String::with_capacity(2048);
        packet.push_str("<?xpacket begin=\"\u{feff}\" id=\"W5M0MpCehiHzreSzNTczkc9d\"?>\n");
        packet.push_str("<x:xmpmeta xmlns:x=\"adobe:ns:meta/\">\n");
        packet.push_str(" <rdf:RDF xmlns:rdf=\"http://www.w3.org/1999/02/22-rdf-syntax-ns#\">\n");
        packet.push_str("  <rdf:Description rdf:about=\"\"\n");
        packet.push_str("    xmlns:dc=\"http://purl.org/dc/elements/1.1/\"\n");
        packet.push_str("    xmlns:pdf=\"http://ns.adobe.com/pdf/1.3/\"\n");
        packet.push_str("    xmlns:pdfaid=\"http://www.aiim.org/pdfa/ns/id/\"\n");
        packet.push_str("    xmlns:xmp=\"http://ns.adobe.com/xap/1.0/\"\n");
        packet.push_str("    xmlns:xmpGImg=\"http://ns.adobe.com/xap/1.0/g/img/\">\n");
        packet.push_str("   <pdfaid:part>1</pdfaid:part>\n");
        packet.push_str("   <pdfaid:conformance>B</pdfaid:conformance>\n");
        packet.push_str(&format!(
            "   <dc:title><rdf:Alt><rdf:li xml:lang=\"x-default\">{}</rdf:li></rdf:Alt></dc:title>\n",
            xml_escape(&self.properties.title)
        ));
        packet.push_str(&format!(
            "   <dc:description><rdf:Alt><rdf:li xml:lang=\"x-default\">{}</rdf:li></rdf:Alt></dc:description>\n",
            xml_escape(&self.properties.subject)
        ));
        packet.push_str(&format!(
            "   <dc:creator><rdf:Seq><rdf:li>{}</rdf:li></rdf:Seq></dc:creator>\n",
            xml_escape(&self.properties.author)
        ));
        packet.push_str(&format!(
            "   <xmp:CreatorTool>{}</xmp:CreatorTool>\n",
            xml_escape(&self.properties.creator)
        ));
        packet.push_str(&format!(
            "   <pdf:Keywords>{}</pdf:Keywords>\n",
            xml_escape(&self.keywords_joined())
        ));
        packet.push_str(&format!(
            "   <pdf:Producer>{}</pdf:Producer>\n",
            xml_escape(&self.properties.producer)
        ));
        packet.push_str("   <pdf:PDFVersion>1.4</pdf:PDFVersion>\n");
        packet.push_str(&format!("   <xmp:CreateDate>{date}</xmp:CreateDate>\n"));
        packet.push_str(&format!("   <xmp:ModifyDate>{date}</xmp:ModifyDate>\n"));
        packet.push_str(&format!(
            "   <xmp:Identifier><rdf:Bag><rdf:li>{}</rdf:li></rdf:Bag></xmp:Identifier>\n",
            self.identifier
        ));
        if let Some(thumbnail) = &self.properties.thumbnail {
            packet.push_str("   <xmp:Thumbnails><rdf:Alt><rdf:li rdf:parseType=\"Resource\">\n");
            packet.push_str("     <xmpGImg:format>JPEG</xmpGImg:format>\n");
            packet.push_str(&format!(
                "     <xmpGImg:width>{}</xmpGImg:width>\n",
                thumbnail.width
            ));
            packet.push_str(&format!(
                "     <xmpGImg:height>{}</xmpGImg:height>\n",
                thumbnail.height
            ));
            packet.push_str(&format!(
                "     <xmpGImg:image>{}</xmpGImg:image>\n",
                STANDARD.encode(&thumbnail.jpeg)
            ));
            packet.push_str("   </rdf:li></rdf:Alt></xmp:Thumbnails>\n");
        }
        packet.push_str("  </rdf:Description>\n");
        packet.push_str(" </rdf:RDF>\n");
        packet.push_str("</x:xmpmeta>\n");
        packet.push_str("<?xpacket end=\"w\"?>");
        packet
    }
}

/// PDF date syntax has its own UTC offset formatting (`+HH'MM'`)
fn pdf_date(timestamp: &DateTime<FixedOffset>) -> String {
    let offset = timestamp.format("%z").to_string();
    format!(
        "D:{}{}'{}'",
        timestamp.format("%Y%m%d%H%M%S"),
        &offset[..3],
        &offset[3..5]
    )
}

fn compute_identifier(properties: &DocumentProperties, pdf_time: &str) -> String {
    let mut hasher = Sha256::new();
    for field in [
        properties.title.as_str(),
        properties.author.as_str(),
        properties.subject.as_str(),
        &properties.keywords.join(", "),
        properties.creator.as_str(),
        properties.producer.as_str(),
        pdf_time,
    ] {
        hasher.update(field.as_bytes());
    }
    hasher
        .finalize()
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

fn xml_escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_timestamp() -> DateTime<FixedOffset> {
        FixedOffset::east_opt(3600)
            .unwrap()
            .with_ymd_and_hms(2026, 8, 6, 12, 34, 56)
            .unwrap()
    }

    fn sample_properties() -> DocumentProperties {
        DocumentProperties {
            title: "A Scanned Document".to_string(),
            author: "Example Person".to_string(),
            subject: "Interesting Stuff".to_string(),
            keywords: vec!["word1".to_string(), "word2".to_string()],
            creator: "scanner".to_string(),
            timestamp: Some(fixed_timestamp()),
            ..DocumentProperties::default()
        }
    }

    #[test]
    fn test_identifier_is_stable() {
        let a = DocumentMetadata::build(sample_properties());
        let b = DocumentMetadata::build(sample_properties());
        assert_eq!(a.identifier(), b.identifier());
        assert_eq!(a.identifier().len(), 64);
    }

    #[test]
    fn test_identifier_tracks_properties() {
        let a = DocumentMetadata::build(sample_properties());
        let mut changed = sample_properties();
        changed.title = "Another Document".to_string();
        let b = DocumentMetadata::build(changed);
        assert_ne!(a.identifier(), b.identifier());
    }

    #[test]
    fn test_pdf_date_format() {
        let metadata = DocumentMetadata::build(sample_properties());
        assert_eq!(metadata.pdf_timestamp(), "D:20260806123456+01'00'");
    }

    #[test]
    fn test_info_dates_match() {
        let metadata = DocumentMetadata::build(sample_properties());
        let entries = metadata.info_entries();
        let get = |key: &str| {
            entries
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.clone())
                .unwrap()
        };
        assert_eq!(get("CreationDate"), get("ModDate"));
        assert_eq!(get("Keywords"), "word1, word2");
    }

    #[test]
    fn test_xmp_mirrors_info() {
        let metadata = DocumentMetadata::build(sample_properties());
        let packet = metadata.xmp_packet();
        assert!(packet.contains("A Scanned Document"));
        assert!(packet.contains("<rdf:li>Example Person</rdf:li>"));
        assert!(packet.contains("<pdf:Keywords>word1, word2</pdf:Keywords>"));
        assert!(packet.contains("<xmp:CreatorTool>scanner</xmp:CreatorTool>"));
        assert!(packet.contains("<xmp:CreateDate>2026-08-06T12:34:56+01:00</xmp:CreateDate>"));
        assert!(packet.contains(metadata.identifier()));
        assert!(packet.contains("<pdfaid:part>1</pdfaid:part>"));
        assert!(packet.contains("<pdfaid:conformance>B</pdfaid:conformance>"));
    }

    #[test]
    fn test_xmp_escapes_markup() {
        let mut properties = sample_properties();
        properties.title = "<Fancy & \"Stuff\">".to_string();
        let metadata = DocumentMetadata::build(properties);
        let packet = metadata.xmp_packet();
        assert!(packet.contains("&lt;Fancy &amp; &quot;Stuff&quot;&gt;"));
        assert!(!packet.contains("<Fancy"));
    }

    #[test]
    fn test_xmp_thumbnail_block() {
        let mut properties = sample_properties();
        properties.thumbnail = Some(Thumbnail {
            width: 300,
            height: 200,
            jpeg: vec![0xff, 0xd8, 0xff, 0xd9],
        });
        let metadata = DocumentMetadata::build(properties);
        let packet = metadata.xmp_packet();
        assert!(packet.contains("<xmpGImg:format>JPEG</xmpGImg:format>"));
        assert!(packet.contains("<xmpGImg:width>300</xmpGImg:width>"));
        assert!(packet.contains(&STANDARD.encode([0xff, 0xd8, 0xff, 0xd9])));
    }

    #[test]
    fn test_explicit_timestamp_reused_everywhere() {
        let metadata = DocumentMetadata::build(sample_properties());
        let packet = metadata.xmp_packet();
        let create = format!("<xmp:CreateDate>{}</xmp:CreateDate>", metadata.xmp_timestamp());
        let modify = format!("<xmp:ModifyDate>{}</xmp:ModifyDate>", metadata.xmp_timestamp());
        assert!(packet.contains(&create));
        assert!(packet.contains(&modify));
    }
}
