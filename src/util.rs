//! Private utility module
use std::path::Path;

/// Turn an 8-digit `YYYYMMDD` date into `YYYY-MM-DD`.
/// Anything that is not exactly 8 characters long is returned unchanged.
pub fn normalize_date(date: &str) -> String {
    if date.len() == 8 && date.is_char_boundary(4) && date.is_char_boundary(6) {
        format!("{}-{}-{}", &date[0..4], &date[4..6], &date[6..8])
    } else {
        date.to_string()
    }
}

/// Turn a 6-digit `HHMMSS` time into `HH:MM:SS`.
/// Anything that is not exactly 6 characters long is returned unchanged.
pub fn normalize_time(time: &str) -> String {
    if time.len() == 6 && time.is_char_boundary(2) && time.is_char_boundary(4) {
        format!("{}:{}:{}", &time[0..2], &time[2..4], &time[4..6])
    } else {
        time.to_string()
    }
}

/// Check whether the path points to a gzip-compressed file, by extension.
pub fn is_gz_file<P>(path: P) -> bool
where
    P: AsRef<Path>,
{
    path.as_ref()
        .file_name()
        .map(|a| a.to_string_lossy().ends_with(".gz"))
        .unwrap_or(false)
}

/// Parse a numeric text field as written by DICOM-style modules
/// (`"12.5"`, `" 3 "`). Empty or non-numeric text yields `None`.
pub fn parse_decimal(text: &str) -> Option<f64> {
    let text = text.trim();
    if text.is_empty() {
        None
    } else {
        text.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dates() {
        assert_eq!(normalize_date("20230914"), "2023-09-14");
        assert_eq!(normalize_date("19700101"), "1970-01-01");
        // malformed lengths pass through untouched
        assert_eq!(normalize_date("2023091"), "2023091");
        assert_eq!(normalize_date("202309140"), "202309140");
        assert_eq!(normalize_date(""), "");
        assert_eq!(normalize_date("2023-09-14"), "2023-09-14");
    }

    #[test]
    fn dates_have_expected_shape() {
        for d in &["00000000", "99991231", "20240229"] {
            let n = normalize_date(d);
            assert_eq!(n.len(), 10);
            let bytes = n.as_bytes();
            assert_eq!(bytes[4], b'-');
            assert_eq!(bytes[7], b'-');
            assert!(n.chars().filter(|c| *c != '-').all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn times() {
        assert_eq!(normalize_time("235901"), "23:59:01");
        assert_eq!(normalize_time("000000"), "00:00:00");
        assert_eq!(normalize_time("2359"), "2359");
        assert_eq!(normalize_time("23:59:01"), "23:59:01");
        assert_eq!(normalize_time(""), "");
    }

    #[test]
    fn multibyte_text_is_not_split() {
        // 8 bytes, but byte 6 falls inside a character
        let s = "a\u{20ac}\u{20ac}a";
        assert_eq!(s.len(), 8);
        assert_eq!(normalize_date(s), s);
    }

    #[test]
    fn gz_paths() {
        assert!(is_gz_file("/tmp/out.mrd.gz"));
        assert!(is_gz_file("snapshot.json.gz"));
        assert!(!is_gz_file("snapshot.json"));
        assert!(!is_gz_file("gz"));
        assert!(!is_gz_file("/tmp/gz/"));
    }

    #[test]
    fn decimals() {
        assert_eq!(parse_decimal(" 12.5 "), Some(12.5));
        assert_eq!(parse_decimal("3"), Some(3.0));
        assert_eq!(parse_decimal(""), None);
        assert_eq!(parse_decimal("n/a"), None);
    }
}
