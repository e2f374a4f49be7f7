// Helvetica advance widths (1/1000 em) for printable ASCII, from the
// standard AFM. Bold is approximated with a fixed factor.
const HELVETICA: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // ' '..'/'
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, // '0'..'9'
    278, 278, 584, 584, 584, 556, 1015, // ':'..'@'
    667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, // 'A'..'M'
    722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, // 'N'..'Z'
    278, 278, 278, 469, 556, 333, // '['..'`'
    556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, // 'a'..'m'
    556, 556, 556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, // 'n'..'z'
    334, 260, 334, 584, // '{'..'~'
];

const BOLD_FACTOR: f32 = 1.06;
const FALLBACK_WIDTH: u16 = 556;
const PT_TO_MM: f32 = 25.4 / 72.0;

fn advance(c: char) -> u16 {
    match c as u32 {
        code @ 32..=126 => HELVETICA[(code - 32) as usize],
        _ => FALLBACK_WIDTH,
    }
}

/// Approximate rendered width of `text` in millimetres.
pub fn text_width_mm(text: &str, size_pt: f32, bold: bool) -> f32 {
    let units: u32 = text.chars().map(|c| u32::from(advance(c))).sum();
    let factor = if bold { BOLD_FACTOR } else { 1.0 };
    units as f32 / 1000.0 * size_pt * factor * PT_TO_MM
}
