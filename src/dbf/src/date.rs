/// A DBF `D` field's logical content: a plain year/month/day triple, with no
/// validity checking beyond what §4.3 requires (an all-zero date is the NULL
/// sentinel, not an error).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Date {
    pub year: u16,
    pub month: u8,
    pub day: u8,
}

impl Date {
    pub const NULL: Date = Date {
        year: 0,
        month: 0,
        day: 0,
    };

    pub fn new(year: u16, month: u8, day: u8) -> Date {
        Date { year, month, day }
    }

    pub fn is_null(&self) -> bool {
        *self == Date::NULL
    }

    /// Encodes as the fixed 8-byte `"yyyymmdd"` representation (spec §4.3).
    pub fn to_bytes(&self) -> [u8; 8] {
        let mut out = [b'0'; 8];
        let text = format!("{:04}{:02}{:02}", self.year, self.month, self.day);
        let bytes = text.as_bytes();
        let len = bytes.len().min(8);
        out[..len].copy_from_slice(&bytes[..len]);
        out
    }

    /// Decodes an 8-byte date field. Accepts the documented NULL spellings
    /// (`"00000000"`, `"0"`, empty, all-`'0'`) as [`Date::NULL`]; anything
    /// else is parsed digit-by-digit, falling back to `NULL` on malformed
    /// input rather than failing the read (dates have no separate error
    /// path in the spec's null-detection rules).
    pub fn from_bytes(bytes: &[u8]) -> Date {
        let trimmed = trim_spaces(bytes);
        if trimmed.is_empty() || trimmed.iter().all(|&b| b == b'0') {
            return Date::NULL;
        }
        if trimmed.len() != 8 {
            return Date::NULL;
        }
        let text = match std::str::from_utf8(trimmed) {
            Ok(t) => t,
            Err(_) => return Date::NULL,
        };
        let year = text[0..4].parse::<u16>().unwrap_or(0);
        let month = text[4..6].parse::<u8>().unwrap_or(0);
        let day = text[6..8].parse::<u8>().unwrap_or(0);
        Date::new(year, month, day)
    }
}

fn trim_spaces(bytes: &[u8]) -> &[u8] {
    let mut start = 0;
    let mut end = bytes.len();
    while start < end && bytes[start] == b' ' {
        start += 1;
    }
    while end > start && bytes[end - 1] == b' ' {
        end -= 1;
    }
    &bytes[start..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_fixed_width() {
        let date = Date::new(2024, 3, 7);
        assert_eq!(&date.to_bytes(), b"20240307");
    }

    #[test]
    fn all_zero_is_null() {
        let date = Date::from_bytes(b"00000000");
        assert!(date.is_null());
        assert_eq!(date, Date::new(0, 0, 0));
    }

    #[test]
    fn blank_is_null() {
        assert!(Date::from_bytes(b"        ").is_null());
        assert!(Date::from_bytes(b"0").is_null());
        assert!(Date::from_bytes(b"").is_null());
    }

    #[test]
    fn round_trips() {
        let date = Date::new(1995, 7, 26);
        let bytes = date.to_bytes();
        assert_eq!(Date::from_bytes(&bytes), date);
    }
}
