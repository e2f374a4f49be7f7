// Certificate PDF generation
// Uses printpdf builtin Helvetica, so no font files are needed at runtime.
// The page is described as a `CertificateLayout` first and painted second;
// the layout is a pure function of the certificate data. Document dates are
// pinned to the epoch and the file id comes from the token, so the same
// certificate always renders to the same bytes.
mod metrics;

use std::io::Cursor;

use chrono::NaiveDate;
use printpdf::image_crate::codecs::png::PngDecoder;
use printpdf::path::PaintMode;
use printpdf::{
    BuiltinFont, Color, Image, ImageTransform, IndirectFontRef, Line, Mm, OffsetDateTime,
    PdfDocument, PdfLayerReference, Point, Rect, Rgb,
};
use sha2::{Digest, Sha256};

use crate::error::RenderError;
use crate::models::short_id;

/// A4 landscape, millimetres.
pub const PAGE_WIDTH: f32 = 297.0;
pub const PAGE_HEIGHT: f32 = 210.0;

/// Edge length of the embedded QR code.
pub const CODE_SIZE: f32 = 25.0;

const CENTER_X: f32 = PAGE_WIDTH / 2.0;
const MAX_NAME_CHARS: usize = 60;
const MAX_TITLE_CHARS: usize = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb8(pub u8, pub u8, pub u8);

const ACCENT: Rgb8 = Rgb8(34, 197, 94);
const BODY: Rgb8 = Rgb8(71, 85, 105);
const MUTED: Rgb8 = Rgb8(107, 114, 128);

/// Everything printed on one certificate.
#[derive(Debug, Clone)]
pub struct CertificateData<'a> {
    pub participant_name: &'a str,
    pub event_title: &'a str,
    pub event_date: NaiveDate,
    pub token: &'a str,
    /// Shown in the footer ("Powered by ...").
    pub issuer: &'a str,
}

/// One drawing instruction. Coordinates are millimetres from the bottom-left
/// corner of the page; text positions are baselines.
#[derive(Debug, Clone, PartialEq)]
pub enum Mark {
    Frame {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        stroke: f32,
    },
    Rule {
        from: (f32, f32),
        to: (f32, f32),
        stroke: f32,
    },
    Text {
        text: String,
        x: f32,
        y: f32,
        size: f32,
        bold: bool,
        color: Rgb8,
    },
    Code {
        x: f32,
        y: f32,
        size: f32,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CertificateLayout {
    pub marks: Vec<Mark>,
}

impl CertificateLayout {
    pub fn compose(data: &CertificateData<'_>) -> Result<Self, RenderError> {
        let name = data.participant_name.trim();
        if name.is_empty() {
            return Err(RenderError::MissingField("participant name"));
        }
        let title = data.event_title.trim();
        if title.is_empty() {
            return Err(RenderError::MissingField("event title"));
        }
        if data.token.is_empty() {
            return Err(RenderError::MissingField("certificate token"));
        }

        let mut marks = Vec::with_capacity(16);

        marks.push(frame(10.0, 10.0, 277.0, 190.0, 2.0));
        marks.push(frame(15.0, 15.0, 267.0, 180.0, 1.0));

        marks.push(centered("CERTIFICATE OF ACHIEVEMENT", 50.0, 28.0, true, ACCENT));
        marks.push(rule(50.0, 247.0, 60.0));

        marks.push(centered("This is to certify that", 80.0, 14.0, false, BODY));
        marks.push(centered(&truncate(name, MAX_NAME_CHARS), 100.0, 24.0, true, ACCENT));
        marks.push(centered("has successfully completed", 120.0, 14.0, false, BODY));
        marks.push(centered(&truncate(title, MAX_TITLE_CHARS), 140.0, 18.0, true, ACCENT));
        marks.push(centered(
            &format!("Date: {}", format_date(data.event_date)),
            155.0,
            12.0,
            false,
            BODY,
        ));

        marks.push(Mark::Code {
            x: 25.0,
            y: from_top(160.0 + CODE_SIZE),
            size: CODE_SIZE,
        });
        marks.push(text_centered_at("Scan to verify", 25.0 + CODE_SIZE / 2.0, 190.0, 8.0, false, BODY));

        marks.push(centered(
            &format!("Certificate ID: {}", short_id(data.token)),
            175.0,
            10.0,
            false,
            MUTED,
        ));

        marks.push(rule(200.0, 260.0, 165.0));
        marks.push(text_centered_at("Authorized Signature", 230.0, 175.0, 10.0, false, BODY));

        marks.push(centered(&format!("Powered by {}", data.issuer), 195.0, 8.0, true, ACCENT));

        Ok(Self { marks })
    }

    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.marks.iter().filter_map(|m| match m {
            Mark::Text { text, .. } => Some(text.as_str()),
            _ => None,
        })
    }
}

/// Render a one-page certificate PDF embedding `code_png`.
pub fn render_certificate(data: &CertificateData<'_>, code_png: &[u8]) -> Result<Vec<u8>, RenderError> {
    let layout = CertificateLayout::compose(data)?;

    let decoder = PngDecoder::new(Cursor::new(code_png))
        .map_err(|e| RenderError::InvalidImage(e.to_string()))?;
    let code = Image::try_from(decoder).map_err(|e| RenderError::InvalidImage(e.to_string()))?;

    let id = document_id(data.token);
    let (doc, page, layer) = PdfDocument::new(
        "Certificate of Achievement",
        Mm(PAGE_WIDTH),
        Mm(PAGE_HEIGHT),
        "Certificate",
    );
    let doc = doc
        .with_document_id(id.clone())
        .with_creation_date(OffsetDateTime::UNIX_EPOCH)
        .with_mod_date(OffsetDateTime::UNIX_EPOCH)
        .with_metadata_date(OffsetDateTime::UNIX_EPOCH);
    let regular = doc.add_builtin_font(BuiltinFont::Helvetica).map_err(pdf_error)?;
    let bold = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(pdf_error)?;
    let layer = doc.get_page(page).get_layer(layer);

    let fonts = Fonts { regular, bold };
    let mut code = Some(code);
    for mark in &layout.marks {
        paint(&layer, &fonts, mark, &mut code);
    }

    let mut bytes = doc.save_to_bytes().map_err(pdf_error)?;
    if !stamp_file_id(&mut bytes, &id) {
        tracing::warn!(token = data.token, "PDF trailer has no file identifier to stamp");
    }
    Ok(bytes)
}

const FILE_ID_MARKER: &[u8] = b"/ID[(";
const FILE_ID_LEN: usize = 32;

/// 32 hex characters derived from the token.
fn document_id(token: &str) -> String {
    Sha256::digest(token.as_bytes())
        .iter()
        .take(FILE_ID_LEN / 2)
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Overwrite both halves of the trailer `/ID` pair with `id`.
///
/// The serializer fills the pair with random 32-character strings; the
/// replacement has the same length, so xref offsets stay valid. Returns
/// false when the trailer is not laid out as `/ID[(..)(..)]`.
fn stamp_file_id(pdf: &mut [u8], id: &str) -> bool {
    if id.len() != FILE_ID_LEN {
        return false;
    }
    let Some(start) = pdf
        .windows(FILE_ID_MARKER.len())
        .rposition(|w| w == FILE_ID_MARKER)
    else {
        return false;
    };
    let first = start + FILE_ID_MARKER.len();
    let second = first + FILE_ID_LEN + 2;
    let end = second + FILE_ID_LEN;
    if pdf.len() < end + 2
        || &pdf[first + FILE_ID_LEN..second] != b")("
        || &pdf[end..end + 2] != b")]"
    {
        return false;
    }
    pdf[first..first + FILE_ID_LEN].copy_from_slice(id.as_bytes());
    pdf[second..end].copy_from_slice(id.as_bytes());
    true
}

struct Fonts {
    regular: IndirectFontRef,
    bold: IndirectFontRef,
}

fn paint(layer: &PdfLayerReference, fonts: &Fonts, mark: &Mark, code: &mut Option<Image>) {
    match mark {
        Mark::Frame {
            x,
            y,
            width,
            height,
            stroke,
        } => {
            layer.set_outline_color(color(ACCENT));
            layer.set_outline_thickness(mm_to_pt(*stroke));
            let rect = Rect::new(Mm(*x), Mm(*y), Mm(x + width), Mm(y + height))
                .with_mode(PaintMode::Stroke);
            layer.add_rect(rect);
        }
        Mark::Rule { from, to, stroke } => {
            layer.set_outline_color(color(ACCENT));
            layer.set_outline_thickness(mm_to_pt(*stroke));
            layer.add_line(Line {
                points: vec![
                    (Point::new(Mm(from.0), Mm(from.1)), false),
                    (Point::new(Mm(to.0), Mm(to.1)), false),
                ],
                is_closed: false,
            });
        }
        Mark::Text {
            text,
            x,
            y,
            size,
            bold,
            color: rgb,
        } => {
            layer.set_fill_color(color(*rgb));
            let font = if *bold { &fonts.bold } else { &fonts.regular };
            layer.use_text(text.clone(), *size, Mm(*x), Mm(*y), font);
        }
        Mark::Code { x, y, size } => {
            if let Some(image) = code.take() {
                let px = image.image.width.0.max(1) as f32;
                image.add_to_layer(
                    layer.clone(),
                    ImageTransform {
                        translate_x: Some(Mm(*x)),
                        translate_y: Some(Mm(*y)),
                        dpi: Some(px * 25.4 / size),
                        ..Default::default()
                    },
                );
            }
        }
    }
}

pub fn format_date(date: NaiveDate) -> String {
    date.format("%B %-d, %Y").to_string()
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        let head: String = text.chars().take(max_chars).collect();
        format!("{}...", head.trim_end())
    } else {
        text.to_string()
    }
}

fn from_top(y: f32) -> f32 {
    PAGE_HEIGHT - y
}

fn frame(x: f32, top: f32, width: f32, height: f32, stroke: f32) -> Mark {
    Mark::Frame {
        x,
        y: from_top(top + height),
        width,
        height,
        stroke,
    }
}

fn rule(x1: f32, x2: f32, top: f32) -> Mark {
    Mark::Rule {
        from: (x1, from_top(top)),
        to: (x2, from_top(top)),
        stroke: 1.0,
    }
}

fn centered(text: &str, top: f32, size: f32, bold: bool, color: Rgb8) -> Mark {
    text_centered_at(text, CENTER_X, top, size, bold, color)
}

fn text_centered_at(text: &str, center_x: f32, top: f32, size: f32, bold: bool, color: Rgb8) -> Mark {
    let width = metrics::text_width_mm(text, size, bold);
    Mark::Text {
        text: text.to_string(),
        x: center_x - width / 2.0,
        y: from_top(top),
        size,
        bold,
        color,
    }
}

fn color(rgb: Rgb8) -> Color {
    Color::Rgb(Rgb::new(
        f32::from(rgb.0) / 255.0,
        f32::from(rgb.1) / 255.0,
        f32::from(rgb.2) / 255.0,
        None,
    ))
}

fn mm_to_pt(mm: f32) -> f32 {
    mm * 72.0 / 25.4
}

fn pdf_error(err: printpdf::Error) -> RenderError {
    RenderError::Pdf(err.to_string())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::certificate::encode_verification_code;

    const TOKEN: &str = "abcd1234EFGH5678ijkl9012MNOP3456";

    fn data<'a>(name: &'a str) -> CertificateData<'a> {
        CertificateData {
            participant_name: name,
            event_title: "Workshop",
            event_date: NaiveDate::from_ymd_opt(2025, 10, 3).unwrap(),
            token: TOKEN,
            issuer: "EventCert",
        }
    }

    #[test]
    fn layout_is_deterministic() {
        let a = CertificateLayout::compose(&data("Jane Doe")).unwrap();
        let b = CertificateLayout::compose(&data("Jane Doe")).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn layout_prints_participant_event_date_and_short_id() {
        let layout = CertificateLayout::compose(&data("Jane Doe")).unwrap();
        let texts: Vec<&str> = layout.texts().collect();

        assert!(texts.contains(&"Jane Doe"));
        assert!(texts.contains(&"Workshop"));
        assert!(texts.contains(&"Date: October 3, 2025"));
        assert!(texts.contains(&"Certificate ID: ABCD1234"));
        assert!(texts.contains(&"Scan to verify"));
        assert!(texts.contains(&"Authorized Signature"));
    }

    #[test]
    fn code_sits_in_lower_left_corner() {
        let layout = CertificateLayout::compose(&data("Jane Doe")).unwrap();
        let code = layout
            .marks
            .iter()
            .find(|m| matches!(m, Mark::Code { .. }))
            .unwrap();
        assert_eq!(
            code,
            &Mark::Code {
                x: 25.0,
                y: 25.0,
                size: CODE_SIZE
            }
        );
    }

    #[test]
    fn long_titles_are_truncated() {
        let long = "x".repeat(200);
        let mut d = data("Jane Doe");
        d.event_title = &long;
        let layout = CertificateLayout::compose(&d).unwrap();
        assert!(layout
            .texts()
            .any(|t| t.ends_with("...") && t.chars().count() == MAX_TITLE_CHARS + 3));
    }

    #[test]
    fn empty_name_is_rejected() {
        assert_matches!(
            CertificateLayout::compose(&data("   ")),
            Err(RenderError::MissingField("participant name"))
        );
    }

    #[test]
    fn renders_a_pdf_with_embedded_code() {
        let code = encode_verification_code("https://certs.example.org", TOKEN);
        let pdf = render_certificate(&data("Jane Doe"), &code.png).unwrap();
        assert!(pdf.starts_with(b"%PDF"));
    }

    #[test]
    fn same_certificate_renders_to_the_same_bytes() {
        let code = encode_verification_code("https://certs.example.org", TOKEN);
        let first = render_certificate(&data("Jane Doe"), &code.png).unwrap();
        // PDF dates have one-second resolution.
        std::thread::sleep(std::time::Duration::from_millis(1100));
        let second = render_certificate(&data("Jane Doe"), &code.png).unwrap();

        assert!(first == second, "renders differ");
        let id = document_id(TOKEN);
        let trailer = format!("/ID[({id})({id})]");
        assert!(first
            .windows(trailer.len())
            .any(|w| w == trailer.as_bytes()));
    }

    #[test]
    fn file_id_is_stamped_in_place() {
        let mut pdf = b"trailer\n<</ID[(AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA)(BBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBB)]>>".to_vec();
        let len = pdf.len();
        let id = document_id(TOKEN);

        assert!(stamp_file_id(&mut pdf, &id));
        assert_eq!(pdf.len(), len);
        assert!(String::from_utf8(pdf).unwrap().contains(&format!("({id})({id})")));

        let mut other = b"trailer\n<</Size 3>>".to_vec();
        assert!(!stamp_file_id(&mut other, &id));
        assert_ne!(document_id(TOKEN), document_id("another0token0000000000000000000"));
    }

    #[test]
    fn malformed_code_image_is_a_render_error() {
        assert_matches!(
            render_certificate(&data("Jane Doe"), b"not a png"),
            Err(RenderError::InvalidImage(_))
        );
    }
}
