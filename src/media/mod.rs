use base64::{engine::general_purpose::STANDARD, Engine as _};
use log::info;
use pdf2image::{Pages, RenderOptionsBuilder, PDF};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("failed to read image '{}': {}", .path.display(), .source)]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to render PDF '{}': {}", .path.display(), .message)]
    Render { path: PathBuf, message: String },
}

/// Base64-encode an image file as an inline JPEG data URI. The MIME type is
/// always `image/jpeg`, whatever the actual container format.
pub fn encode_image(path: &Path) -> Result<String, MediaError> {
    let bytes = fs::read(path).map_err(|source| MediaError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(format!("data:image/jpeg;base64,{}", STANDARD.encode(bytes)))
}

/// Render the first page of a PDF to a sibling `.jpg` file and return the
/// new path.
pub fn pdf_to_jpg(path: &Path) -> Result<PathBuf, MediaError> {
    let render_err = |message: String| MediaError::Render {
        path: path.to_path_buf(),
        message,
    };

    let pdf = PDF::from_file(path).map_err(|e| render_err(e.to_string()))?;
    let options = RenderOptionsBuilder::default()
        .build()
        .map_err(|e| render_err(e.to_string()))?;
    let mut pages = pdf
        .render(Pages::Range(1..=1), options)
        .map_err(|e| render_err(e.to_string()))?;

    if pages.is_empty() {
        return Err(render_err("no pages rendered".to_string()));
    }

    let jpg_path = path.with_extension("jpg");
    pages
        .remove(0)
        .save(&jpg_path)
        .map_err(|e| render_err(e.to_string()))?;
    info!("rendered {} -> {}", path.display(), jpg_path.display());
    Ok(jpg_path)
}

/// Encode an image for an outgoing request, rendering PDF inputs to a JPEG
/// of their first page beforehand.
pub fn prepare_image(path: &Path) -> Result<String, MediaError> {
    let is_pdf = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false);

    if is_pdf {
        encode_image(&pdf_to_jpg(path)?)
    } else {
        encode_image(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_image_produces_a_jpeg_data_uri() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.jpg");
        fs::write(&path, b"hello").unwrap();

        let uri = encode_image(&path).unwrap();
        let payload = uri.strip_prefix("data:image/jpeg;base64,").unwrap();
        assert_eq!(STANDARD.decode(payload).unwrap(), b"hello");
    }

    #[test]
    fn encode_image_reports_the_missing_path() {
        let err = encode_image(Path::new("/nonexistent/a.jpg")).unwrap_err();
        assert!(matches!(err, MediaError::Read { .. }));
        assert!(err.to_string().contains("/nonexistent/a.jpg"));
    }

    #[test]
    fn prepare_image_passes_non_pdf_files_through() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("drawing.png");
        fs::write(&path, b"png bytes").unwrap();

        let uri = prepare_image(&path).unwrap();
        assert!(uri.starts_with("data:image/jpeg;base64,"));
    }
}
