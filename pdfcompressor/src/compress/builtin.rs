//! Built-in structural compression.
//!
//! Used when no engine is installed. It cannot resample images; it only
//! rewrites the document structure:
//!
//! - drops zero-length streams and unreferenced objects
//! - renumbers the remaining objects densely
//! - Flate-compresses every stream that allows it
//! - for the aggressive presets, drops the XMP metadata stream

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use lopdf::Document;
use tracing::debug;

use super::error::{CompressionError, CompressionResult};
use super::preset::CompressionPreset;

/// Rewrite `input` into `output`.
///
/// Blocking; run it off the async executor.
pub fn compress_builtin(
    input: &Path,
    output: &Path,
    preset: CompressionPreset,
) -> CompressionResult<()> {
    let mut doc = Document::load(input).map_err(|e| CompressionError::Builtin {
        reason: format!("cannot parse {}: {}", input.display(), e),
    })?;

    if doc.trailer.get(b"Encrypt").is_ok() {
        return Err(CompressionError::Builtin {
            reason: "encrypted documents are not supported".to_string(),
        });
    }

    if preset.strips_metadata() && strip_metadata(&mut doc) {
        debug!("Removed document XMP metadata");
    }

    let empty = doc.delete_zero_length_streams();
    let pruned = doc.prune_objects();
    doc.renumber_objects();
    doc.compress();
    debug!(
        empty_streams = empty.len(),
        pruned_objects = pruned.len(),
        "Rewrote document structure"
    );

    let file = File::create(output).map_err(|e| CompressionError::io(output, e))?;
    let mut writer = BufWriter::new(file);
    doc.save_to(&mut writer)
        .map_err(|e| CompressionError::Builtin {
            reason: format!("cannot write {}: {}", output.display(), e),
        })?;
    writer
        .flush()
        .map_err(|e| CompressionError::io(output, e))?;
    Ok(())
}

/// Remove the catalog's `/Metadata` entry. Returns whether one was present.
fn strip_metadata(doc: &mut Document) -> bool {
    let Ok(catalog_id) = doc.trailer.get(b"Root").and_then(|root| root.as_reference()) else {
        return false;
    };
    match doc
        .get_object_mut(catalog_id)
        .and_then(|catalog| catalog.as_dict_mut())
    {
        Ok(catalog) => catalog.remove(b"Metadata").is_some(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{dictionary, Object, Stream};
    use tempfile::TempDir;

    /// One-page document with a bulky uncompressed content stream, an XMP
    /// metadata stream and an orphaned object.
    fn write_sample_pdf(path: &Path) {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });
        let content = "BT /F1 12 Tf 72 712 Td (Quarterly report) Tj ET\n".repeat(2000);
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            }),
        );
        let metadata_id = doc.add_object(Stream::new(
            dictionary! { "Type" => "Metadata", "Subtype" => "XML" },
            b"<x:xmpmeta xmlns:x='adobe:ns:meta/'/>".to_vec(),
        ));
        doc.add_object(Stream::new(dictionary! {}, vec![b'x'; 4096]));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
            "Metadata" => metadata_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.save(path).unwrap();
    }

    fn has_metadata(doc: &Document) -> bool {
        let catalog_id = doc.trailer.get(b"Root").unwrap().as_reference().unwrap();
        doc.get_dictionary(catalog_id).unwrap().has(b"Metadata")
    }

    #[test]
    fn test_builtin_shrinks_and_keeps_pages() {
        let temp = TempDir::new().unwrap();
        let input = temp.path().join("in.pdf");
        let output = temp.path().join("out.pdf");
        write_sample_pdf(&input);

        compress_builtin(&input, &output, CompressionPreset::Printer).unwrap();

        let before = std::fs::metadata(&input).unwrap().len();
        let after = std::fs::metadata(&output).unwrap().len();
        assert!(after < before, "{} should be below {}", after, before);

        let doc = Document::load(&output).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
        assert!(has_metadata(&doc));
    }

    #[test]
    fn test_screen_strips_metadata() {
        let temp = TempDir::new().unwrap();
        let input = temp.path().join("in.pdf");
        let output = temp.path().join("out.pdf");
        write_sample_pdf(&input);

        compress_builtin(&input, &output, CompressionPreset::Screen).unwrap();

        let doc = Document::load(&output).unwrap();
        assert!(!has_metadata(&doc));
        assert_eq!(doc.get_pages().len(), 1);
    }

    #[test]
    fn test_unparseable_input_is_reported() {
        let temp = TempDir::new().unwrap();
        let input = temp.path().join("broken.pdf");
        std::fs::write(&input, b"not a pdf at all").unwrap();

        let err = compress_builtin(&input, &temp.path().join("out.pdf"), CompressionPreset::Ebook)
            .unwrap_err();
        assert!(matches!(err, CompressionError::Builtin { .. }));
    }
}
