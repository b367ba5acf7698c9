//! Mapping between lock paths and sentinel filenames.
//!
//! Every held lock is a file in the lock directory whose name is a reversible
//! encoding of the locked path:
//!
//! - ASCII alphanumerics, `.`, `_` and `-` are kept as-is
//! - the separator `/` becomes `@`
//! - every other byte becomes `%XX` (upper-case hex)
//! - the name ends in `.lock`
//!
//! So `/data/proj/file.txt` is stored as `@data@proj@file.txt.lock`.
//!
//! [`decode`] only accepts canonical encodings, which keeps the mapping a
//! bijection: a name decodes exactly when it is `encode` of the result.
//! Names longer than [`MAX_NAME_LEN`] are refused instead of truncated, since
//! a truncated name could collide with the sentinel for another path.

use crate::error::{PathLockError, Result};
use crate::path::LockablePath;
use std::fmt::Write;

/// Suffix carried by every sentinel filename.
pub const SENTINEL_SUFFIX: &str = ".lock";

/// Longest filename accepted by common filesystems (ext4, APFS, NTFS).
pub const MAX_NAME_LEN: usize = 255;

const SEPARATOR: u8 = b'@';

fn is_unreserved(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'.' | b'_' | b'-')
}

/// Encode a lock path as a sentinel filename.
pub fn encode(path: &LockablePath) -> Result<String> {
    let raw = path.as_str();
    let mut name = String::with_capacity(raw.len() + SENTINEL_SUFFIX.len());

    for byte in raw.bytes() {
        if byte == b'/' {
            name.push(SEPARATOR as char);
        } else if is_unreserved(byte) {
            name.push(byte as char);
        } else {
            // Writing to a String cannot fail.
            let _ = write!(name, "%{:02X}", byte);
        }
    }
    name.push_str(SENTINEL_SUFFIX);

    if name.len() > MAX_NAME_LEN {
        return Err(PathLockError::NameTooLong {
            path: path.as_path().to_path_buf(),
            len: name.len(),
            max: MAX_NAME_LEN,
        });
    }

    Ok(name)
}

/// Decode a sentinel filename back into the locked path.
///
/// Returns `None` for anything that is not a canonical sentinel name, such as
/// unrelated files that happen to live in the lock directory.
pub fn decode(name: &str) -> Option<LockablePath> {
    let body = name.strip_suffix(SENTINEL_SUFFIX)?;
    let bytes = body.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());

    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            SEPARATOR => {
                decoded.push(b'/');
                i += 1;
            }
            b'%' => {
                let hex = bytes.get(i + 1..i + 3)?;
                let value = decode_hex_pair(hex)?;
                // Escaping a byte that would have been kept is not canonical.
                if value == b'/' || is_unreserved(value) {
                    return None;
                }
                decoded.push(value);
                i += 3;
            }
            byte if is_unreserved(byte) => {
                decoded.push(byte);
                i += 1;
            }
            _ => return None,
        }
    }

    let raw = String::from_utf8(decoded).ok()?;
    let path = LockablePath::new(&raw).ok()?;
    // Rejects non-normalized input such as `@a@@b` or a trailing separator.
    if path.as_str() != raw {
        return None;
    }
    Some(path)
}

fn decode_hex_pair(hex: &[u8]) -> Option<u8> {
    let digit = |b: u8| match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    };
    Some((digit(hex[0])? << 4) | digit(hex[1])?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lp(s: &str) -> LockablePath {
        LockablePath::new(s).unwrap()
    }

    #[test]
    fn test_encode_plain_path() {
        assert_eq!(
            encode(&lp("/data/proj/file.txt")).unwrap(),
            "@data@proj@file.txt.lock"
        );
        assert_eq!(encode(&lp("/")).unwrap(), "@.lock");
    }

    #[test]
    fn test_encode_escapes_reserved_bytes() {
        assert_eq!(
            encode(&lp("/my dir/a@b%c")).unwrap(),
            "@my%20dir@a%40b%25c.lock"
        );
        // Multi-byte UTF-8 is escaped byte by byte.
        assert_eq!(encode(&lp("/é")).unwrap(), "@%C3%A9.lock");
    }

    #[test]
    fn test_decode_inverts_encode() {
        for raw in ["/", "/data/proj", "/my dir/a@b%c", "/é/ü.txt", "/a-b_c.d"] {
            let path = lp(raw);
            let name = encode(&path).unwrap();
            assert_eq!(decode(&name), Some(path), "round trip of {raw}");
        }
    }

    #[test]
    fn test_distinct_paths_get_distinct_names() {
        let a = encode(&lp("/a@b")).unwrap();
        let b = encode(&lp("/a/b")).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_decode_rejects_foreign_and_non_canonical_names() {
        assert_eq!(decode("README.md"), None);
        assert_eq!(decode("data.lock"), None);
        assert_eq!(decode("@a%2Fb.lock"), None);
        assert_eq!(decode("@a%41.lock"), None);
        assert_eq!(decode("@a%c3%a9.lock"), None);
        assert_eq!(decode("@a%2.lock"), None);
        assert_eq!(decode("@a@@b.lock"), None);
        assert_eq!(decode("@a@.lock"), None);
        assert_eq!(decode("@a b.lock"), None);
    }

    #[test]
    fn test_overlong_name_fails_fast() {
        let long = format!("/{}", "x".repeat(MAX_NAME_LEN));
        let err = encode(&lp(&long)).unwrap_err();
        match err {
            PathLockError::NameTooLong { len, max, .. } => {
                assert!(len > max);
                assert_eq!(max, MAX_NAME_LEN);
            }
            other => panic!("expected NameTooLong, got {other:?}"),
        }
    }

    #[test]
    fn test_name_at_limit_is_accepted() {
        let body_len = MAX_NAME_LEN - SENTINEL_SUFFIX.len() - 1;
        let path = format!("/{}", "x".repeat(body_len));
        assert_eq!(encode(&lp(&path)).unwrap().len(), MAX_NAME_LEN);
    }
}
