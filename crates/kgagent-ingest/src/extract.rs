//! Plain-text extraction from uploaded files.

use std::path::Path;

use lopdf::content::Content;
use lopdf::{Document as PdfDocument, Object};

use crate::error::{IngestError, Result};

/// Extract the text of a `.txt`, `.md` or `.pdf` file.
///
/// Blocking; callers on the async runtime should use `spawn_blocking`.
pub fn extract_text(path: &Path) -> Result<String> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match extension.as_str() {
        "txt" | "md" => {
            let bytes = std::fs::read(path)?;
            String::from_utf8(bytes)
                .map_err(|e| IngestError::Extraction(format!("File is not valid UTF-8: {e}")))
        }
        "pdf" => read_pdf_text(path),
        other => Err(IngestError::Extraction(format!(
            "Unsupported file type: .{other}"
        ))),
    }
}

/// Text shown by the `Tj`, `TJ`, `'` and `"` operators, one line per text
/// object, pages separated by a newline.
fn read_pdf_text(path: &Path) -> Result<String> {
    let doc = PdfDocument::load(path)
        .map_err(|e| IngestError::Extraction(format!("Failed to open PDF: {e}")))?;

    let mut out = String::new();
    for page_id in doc.get_pages().values() {
        let raw = doc
            .get_page_content(*page_id)
            .map_err(|e| IngestError::Extraction(format!("Failed to read PDF page: {e}")))?;
        let content = Content::decode(&raw)
            .map_err(|e| IngestError::Extraction(format!("Failed to decode PDF page: {e}")))?;

        let mut line = String::new();
        for operation in &content.operations {
            match operation.operator.as_str() {
                "Tj" | "'" | "\"" => {
                    if let Some(Object::String(bytes, _)) = operation.operands.last() {
                        line.push_str(&String::from_utf8_lossy(bytes));
                    }
                }
                "TJ" => {
                    if let Some(Object::Array(items)) = operation.operands.first() {
                        for item in items {
                            if let Object::String(bytes, _) = item {
                                line.push_str(&String::from_utf8_lossy(bytes));
                            }
                        }
                    }
                }
                "ET" | "T*" | "Td" | "TD" => flush_line(&mut out, &mut line),
                _ => {}
            }
        }
        flush_line(&mut out, &mut line);
        out.push('\n');
    }

    Ok(out)
}

fn flush_line(out: &mut String, line: &mut String) {
    let text = line.trim();
    if !text.is_empty() {
        out.push_str(text);
        out.push('\n');
    }
    line.clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::content::Operation;
    use lopdf::{dictionary, Stream};

    fn write_pdf(path: &Path, lines: &[&str]) {
        let mut doc = PdfDocument::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut operations = Vec::new();
        for (i, text) in lines.iter().enumerate() {
            operations.push(Operation::new("BT", vec![]));
            operations.push(Operation::new("Tf", vec!["F1".into(), 12.into()]));
            operations.push(Operation::new(
                "Td",
                vec![72.into(), (700 - 20 * i as i64).into()],
            ));
            operations.push(Operation::new("Tj", vec![Object::string_literal(*text)]));
            operations.push(Operation::new("ET", vec![]));
        }
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
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
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.save(path).unwrap();
    }

    #[test]
    fn test_extract_txt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.TXT");
        std::fs::write(&path, "Ada Lovelace wrote the first program.").unwrap();
        assert_eq!(
            extract_text(&path).unwrap(),
            "Ada Lovelace wrote the first program."
        );
    }

    #[test]
    fn test_invalid_utf8_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.txt");
        std::fs::write(&path, [0xff, 0xfe, 0x00]).unwrap();
        assert!(matches!(
            extract_text(&path),
            Err(IngestError::Extraction(_))
        ));
    }

    #[test]
    fn test_unsupported_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("image.png");
        std::fs::write(&path, b"png").unwrap();
        assert!(extract_text(&path).is_err());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            extract_text(&dir.path().join("gone.txt")),
            Err(IngestError::Io(_))
        ));
    }

    #[test]
    fn test_extract_pdf_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.pdf");
        write_pdf(&path, &["Hello graph", "Second line"]);

        let text = extract_text(&path).unwrap();
        assert!(text.contains("Hello graph"));
        assert!(text.contains("Second line"));
    }
}
