//! Code-page resolution (spec §4.5): CPG sidecar takes priority over the
//! header's language-driver byte.

use std::path::{Path, PathBuf};

use crate::error::DbfResult;
use crate::hooks::IoHooks;

const CPG_MAX_BYTES: usize = 499;

/// Derives the sidecar path for `dbf_path` by swapping its extension for
/// `cpg` (the caller tries both-case variants through `read_sidecar`, since
/// the spec allows `.cpg`/`.CPG`).
pub fn cpg_path(dbf_path: &Path, upper: bool) -> PathBuf {
    dbf_path.with_extension(if upper { "CPG" } else { "cpg" })
}

/// Resolves the code-page string for an opened table: sidecar content first
/// (trimmed at the first CR/LF), then the synthesized `"LDID/<n>"` form when
/// the language-driver byte is non-zero, else `None`.
pub fn resolve<H: IoHooks>(hooks: &H, dbf_path: &Path, language_driver: u8) -> DbfResult<Option<String>> {
    for upper in [false, true] {
        let path = cpg_path(dbf_path, upper);
        if let Some(bytes) = hooks.read_sidecar(&path, CPG_MAX_BYTES)? {
            return Ok(Some(trim_at_newline(&bytes)));
        }
    }
    if language_driver != 0 {
        return Ok(Some(format!("LDID/{language_driver}")));
    }
    Ok(None)
}

fn trim_at_newline(bytes: &[u8]) -> String {
    let end = bytes
        .iter()
        .position(|&b| b == b'\r' || b == b'\n')
        .unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).to_string()
}

/// Parses a caller-supplied `"LDID/<n>"` code-page string into a
/// language-driver byte, for use on create (spec §4.5).
pub fn parse_ldid(code_page: &str) -> Option<u8> {
    let digits = code_page.strip_prefix("LDID/")?;
    digits.parse::<u16>().ok().filter(|&n| n <= 255).map(|n| n as u8)
}

/// Writes (or skips) the CPG sidecar on create, per spec §4.5: when the
/// caller's code-page string parses as `"LDID/<n>"`, no sidecar is written
/// and the integer is stored in the header instead; otherwise the string is
/// written verbatim and the language-driver byte stays zero.
pub fn resolve_for_create<H: IoHooks>(
    hooks: &H,
    dbf_path: &Path,
    code_page: Option<&str>,
) -> DbfResult<u8> {
    match code_page {
        None => Ok(0),
        Some(cp) => match parse_ldid(cp) {
            Some(n) => Ok(n),
            None => {
                hooks.write_sidecar(&cpg_path(dbf_path, false), cp.as_bytes())?;
                Ok(0)
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::MemoryIoHooks;

    #[test]
    fn sidecar_takes_priority_over_ldid() {
        let hooks = MemoryIoHooks::new();
        let dbf = Path::new("t.dbf");
        hooks.seed(cpg_path(dbf, false), b"UTF-8\r\n".to_vec());
        let resolved = resolve(&hooks, dbf, 87).unwrap();
        assert_eq!(resolved.as_deref(), Some("UTF-8"));
    }

    #[test]
    fn falls_back_to_ldid() {
        let hooks = MemoryIoHooks::new();
        let dbf = Path::new("t.dbf");
        let resolved = resolve(&hooks, dbf, 87).unwrap();
        assert_eq!(resolved.as_deref(), Some("LDID/87"));
    }

    #[test]
    fn absent_cpg_and_zero_ldid_is_none() {
        let hooks = MemoryIoHooks::new();
        let dbf = Path::new("t.dbf");
        assert_eq!(resolve(&hooks, dbf, 0).unwrap(), None);
    }

    #[test]
    fn create_with_ldid_skips_sidecar() {
        let hooks = MemoryIoHooks::new();
        let dbf = Path::new("t.dbf");
        let driver = resolve_for_create(&hooks, dbf, Some("LDID/87")).unwrap();
        assert_eq!(driver, 87);
        assert!(hooks.contents(&cpg_path(dbf, false)).is_none());
    }

    #[test]
    fn create_with_other_string_writes_sidecar() {
        let hooks = MemoryIoHooks::new();
        let dbf = Path::new("t.dbf");
        let driver = resolve_for_create(&hooks, dbf, Some("UTF-8")).unwrap();
        assert_eq!(driver, 0);
        assert_eq!(hooks.contents(&cpg_path(dbf, false)).unwrap(), b"UTF-8");
    }
}
