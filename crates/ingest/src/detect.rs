use statera_core::{IngestError, SourceFormat};

/// Outcome of format sniffing: best-guess format plus confidence in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub format: SourceFormat,
    pub confidence: f32,
}

impl Detection {
    fn new(format: SourceFormat, confidence: f32) -> Self {
        Detection { format, confidence }
    }
}

/// Identify the source format of an uploaded file. Deterministic signals
/// (magic bytes, unambiguous markers) are checked first; content heuristics
/// and the filename extension only break ties.
pub fn detect(data: &[u8], filename: &str) -> Detection {
    if let Some(d) = detect_magic(data) {
        return d;
    }

    let text = String::from_utf8_lossy(&data[..data.len().min(8192)]);

    if let Some(d) = detect_text_markers(&text) {
        return d;
    }

    let csv_conf = csv_confidence(&text);
    let ext = extension_guess(filename);

    match ext {
        // Extension and delimiter analysis agree — strong signal.
        Some(SourceFormat::Csv) if csv_conf > 0.0 => {
            Detection::new(SourceFormat::Csv, (csv_conf + 0.2).min(0.95))
        }
        Some(format) => Detection::new(format, 0.55),
        None if csv_conf >= 0.5 => Detection::new(SourceFormat::Csv, csv_conf),
        None => Detection::new(SourceFormat::Unknown, csv_conf),
    }
}

/// Like [`detect`], but rejects results under the configured floor so the
/// caller must ask for a manual format override.
pub fn detect_or_reject(
    data: &[u8],
    filename: &str,
    floor: f32,
) -> Result<Detection, IngestError> {
    let d = detect(data, filename);
    if d.format == SourceFormat::Unknown || d.confidence < floor {
        return Err(IngestError::UnsupportedFormat { confidence: d.confidence });
    }
    Ok(d)
}

fn detect_magic(data: &[u8]) -> Option<Detection> {
    if data.starts_with(b"%PDF-") {
        return Some(Detection::new(SourceFormat::PdfTable, 0.98));
    }
    if data.starts_with(b"\x89PNG\r\n\x1a\n") {
        return Some(Detection::new(SourceFormat::Image, 0.98));
    }
    if data.starts_with(b"\xff\xd8\xff") {
        return Some(Detection::new(SourceFormat::Image, 0.98));
    }
    // TIFF, both byte orders.
    if data.starts_with(b"II*\x00") || data.starts_with(b"MM\x00*") {
        return Some(Detection::new(SourceFormat::Image, 0.95));
    }
    if data.starts_with(b"RIFF") && data.get(8..12) == Some(b"WEBP") {
        return Some(Detection::new(SourceFormat::Image, 0.95));
    }
    None
}

fn detect_text_markers(text: &str) -> Option<Detection> {
    let upper = text.to_uppercase();
    if upper.starts_with("OFXHEADER") || upper.contains("<OFX>") {
        return Some(Detection::new(SourceFormat::Ofx, 0.95));
    }
    // QIF account-type header, e.g. "!Type:Bank" or "!Type:CCard".
    if text.lines().take(5).any(|l| l.trim_start().starts_with("!Type:")) {
        return Some(Detection::new(SourceFormat::Qif, 0.92));
    }
    None
}

/// Delimiter-frequency analysis over the sampled lines: a delimiter that
/// appears a consistent number of times per line suggests tabular text.
fn csv_confidence(text: &str) -> f32 {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim_end)
        .filter(|l| !l.is_empty())
        .take(20)
        .collect();
    if lines.len() < 2 {
        return 0.0;
    }

    let mut best = 0.0f32;
    for delim in [',', ';', '\t', '|'] {
        let counts: Vec<usize> = lines.iter().map(|l| l.matches(delim).count()).collect();
        let first = counts[0];
        if first == 0 {
            continue;
        }
        let consistent = counts.iter().filter(|&&c| c == first).count();
        let ratio = consistent as f32 / counts.len() as f32;
        // Two columns of agreement across most lines is already convincing.
        let score = 0.5 + 0.4 * ratio * ((first as f32 / 4.0).min(1.0));
        if ratio >= 0.8 && score > best {
            best = score;
        }
    }
    best
}

fn extension_guess(filename: &str) -> Option<SourceFormat> {
    let ext = filename.rsplit('.').next()?.to_lowercase();
    match ext.as_str() {
        "csv" | "tsv" | "txt" => Some(SourceFormat::Csv),
        "ofx" | "qfx" => Some(SourceFormat::Ofx),
        "qif" => Some(SourceFormat::Qif),
        "pdf" => Some(SourceFormat::PdfTable),
        "png" | "jpg" | "jpeg" | "webp" | "tif" | "tiff" | "bmp" => Some(SourceFormat::Image),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pdf_magic_wins_over_extension() {
        let d = detect(b"%PDF-1.7\n...", "statement.csv");
        assert_eq!(d.format, SourceFormat::PdfTable);
        assert!(d.confidence > 0.9);
    }

    #[test]
    fn png_and_jpeg_magic() {
        assert_eq!(
            detect(b"\x89PNG\r\n\x1a\nrest", "scan").format,
            SourceFormat::Image
        );
        assert_eq!(
            detect(b"\xff\xd8\xff\xe0rest", "scan").format,
            SourceFormat::Image
        );
    }

    #[test]
    fn ofx_detected_by_header_or_tag() {
        let d = detect(b"OFXHEADER:100\nDATA:OFXSGML\n", "download");
        assert_eq!(d.format, SourceFormat::Ofx);
        let d = detect(b"junk\n<OFX>\n</OFX>", "download.bin");
        assert_eq!(d.format, SourceFormat::Ofx);
    }

    #[test]
    fn qif_detected_by_type_header() {
        let d = detect(b"!Type:Bank\nD01/15/2024\nT-5.00\n^\n", "export");
        assert_eq!(d.format, SourceFormat::Qif);
        assert!(d.confidence >= 0.9);
    }

    #[test]
    fn csv_detected_by_delimiter_consistency() {
        let data = b"date,description,amount\n2024-01-15,AMAZON,49.99\n2024-01-16,STARBUCKS,-5.00\n";
        let d = detect(data, "january.csv");
        assert_eq!(d.format, SourceFormat::Csv);
        assert!(d.confidence >= 0.8, "confidence was {}", d.confidence);
    }

    #[test]
    fn csv_by_content_without_extension() {
        let data = b"a;b;c\n1;2;3\n4;5;6\n";
        let d = detect(data, "upload");
        assert_eq!(d.format, SourceFormat::Csv);
    }

    #[test]
    fn prose_is_not_csv() {
        let data = b"Dear customer,\nyour statement is attached.\nRegards\n";
        let d = detect(data, "note");
        assert_eq!(d.format, SourceFormat::Unknown);
    }

    #[test]
    fn extension_fallback_is_low_confidence() {
        let d = detect(b"\x00\x01\x02\x03", "weird.qif");
        assert_eq!(d.format, SourceFormat::Qif);
        assert!(d.confidence < 0.6);
    }

    #[test]
    fn reject_below_floor() {
        let err = detect_or_reject(b"\x00\x01\x02", "blob", 0.5).unwrap_err();
        assert!(matches!(err, IngestError::UnsupportedFormat { .. }));
    }

    #[test]
    fn accept_above_floor() {
        let d = detect_or_reject(b"!Type:CCard\n^", "card.qif", 0.5).unwrap();
        assert_eq!(d.format, SourceFormat::Qif);
    }
}
