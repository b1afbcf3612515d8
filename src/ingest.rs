use image::DynamicImage;
use std::io::Cursor;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Empty image payload")]
    EmptyPayload,
    #[error("Failed to decode image: {0}")]
    Undecodable(#[from] image::ImageError),
}

/// Decodes an uploaded payload into pixels. The payload is judged by whether
/// it actually decodes, not by filename or declared content type, and is
/// never written to disk.
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage, IngestError> {
    if bytes.is_empty() {
        return Err(IngestError::EmptyPayload);
    }

    let reader = image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(image::ImageError::IoError)?;

    Ok(reader.decode()?)
}
