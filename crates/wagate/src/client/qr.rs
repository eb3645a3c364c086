//! QR pairing payloads and their data-URL encoding for the dashboard.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use qrcode::QrCode;
use qrcode::render::svg;

/// A pairing code as handed over by the collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QrPayload {
    /// Raw pairing string that still has to be drawn.
    Code(String),
    /// Already rendered image as a `data:` URL.
    Image(String),
}

impl QrPayload {
    /// Produce a `data:` URL the browser can put straight into an `<img>`.
    pub fn to_data_url(&self) -> Result<String, qrcode::types::QrError> {
        match self {
            QrPayload::Image(url) => Ok(url.clone()),
            QrPayload::Code(code) => {
                let qr = QrCode::new(code.as_bytes())?;
                let image = qr
                    .render::<svg::Color<'_>>()
                    .min_dimensions(256, 256)
                    .build();
                Ok(format!(
                    "data:image/svg+xml;base64,{}",
                    STANDARD.encode(image.as_bytes())
                ))
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
