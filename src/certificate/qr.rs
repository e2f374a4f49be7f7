use std::io::Cursor;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::{DynamicImage, GrayImage, ImageFormat, Luma};
use qrcode::{EcLevel, QrCode};
use thiserror::Error;

/// Pixels per QR module.
pub const MODULE_PX: u32 = 8;

/// Quiet zone around the symbol, in modules.
pub const MARGIN_MODULES: u32 = 2;

const DARK: Luma<u8> = Luma([0]);
const LIGHT: Luma<u8> = Luma([255]);

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("qr encoding failed: {0}")]
    Qr(#[from] qrcode::types::QrError),

    #[error("png encoding failed: {0}")]
    Png(#[from] image::ImageError),
}

/// A verification link and its scannable rendering.
#[derive(Debug, Clone)]
pub struct EncodedCode {
    pub url: String,
    pub png: Vec<u8>,
    /// Set when encoding failed and `png` is a 1x1 placeholder.
    pub degraded: bool,
}

impl EncodedCode {
    pub fn base64(&self) -> String {
        STANDARD.encode(&self.png)
    }
}

pub fn verification_url(base_url: &str, token: &str) -> String {
    format!("{}/verify?id={}", base_url.trim_end_matches('/'), token)
}

/// Encode the verification link for `token` as a QR PNG.
///
/// Never fails: an encoder error yields a placeholder image with
/// `degraded` set, so document generation can go ahead.
pub fn encode_verification_code(base_url: &str, token: &str) -> EncodedCode {
    let url = verification_url(base_url, token);

    match render_png(&url) {
        Ok(png) => EncodedCode {
            url,
            png,
            degraded: false,
        },
        Err(e) => {
            tracing::warn!(error = %e, token, "QR encoding failed, embedding placeholder");
            EncodedCode {
                url,
                png: placeholder_png(),
                degraded: true,
            }
        }
    }
}

pub fn render_png(data: &str) -> Result<Vec<u8>, EncodeError> {
    let code = QrCode::with_error_correction_level(data.as_bytes(), EcLevel::M)?;
    let modules = code.width() as u32;
    let colors = code.to_colors();
    let side = (modules + 2 * MARGIN_MODULES) * MODULE_PX;

    let image = GrayImage::from_fn(side, side, |x, y| {
        let mx = (x / MODULE_PX).checked_sub(MARGIN_MODULES);
        let my = (y / MODULE_PX).checked_sub(MARGIN_MODULES);
        match (mx, my) {
            (Some(mx), Some(my)) if mx < modules && my < modules => {
                colors[(my * modules + mx) as usize].select(DARK, LIGHT)
            }
            _ => LIGHT,
        }
    });

    Ok(encode_png(DynamicImage::ImageLuma8(image))?)
}

// The PDF writer rejects alpha channels, so everything is written as RGB.
fn encode_png(image: DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Cursor::new(Vec::new());
    image.to_rgb8().write_to(&mut buf, ImageFormat::Png)?;
    Ok(buf.into_inner())
}

fn placeholder_png() -> Vec<u8> {
    encode_png(DynamicImage::ImageLuma8(GrayImage::from_pixel(1, 1, LIGHT))).unwrap_or_default()
}
