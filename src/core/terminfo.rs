//! Compiled terminfo reader
//!
//! Only as much of the format as is needed to pull the function key strings
//! out of the entry for `$TERM`. Both the legacy (16-bit numbers) and the
//! ncurses 6 extended (32-bit numbers) layouts are accepted.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use super::keyseq::FunctionKeys;

const MAGIC_LEGACY: u16 = 0o432;
const MAGIC_NUMBER32: u16 = 0o1036;
const HEADER_LEN: usize = 12;

/// String capability indices (ncurses `Caps` order: kf0, kf1, kf10, kf2, ...)
const KEY_F1: usize = 66;
const KEY_F2: usize = 68;
const KEY_F3: usize = 69;
const KEY_F4: usize = 70;

#[derive(Error, Debug)]
pub enum TerminfoError {
    #[error("environment variable TERM not set")]
    TermNotSet,

    #[error("terminfo entry for {0} not found")]
    EntryNotFound(String),

    #[error("Failed to read terminfo entry {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed terminfo entry: {0}")]
    Malformed(&'static str),

    #[error("terminfo entry for {term} has no {capability} capability")]
    MissingCapability { term: String, capability: &'static str },
}

pub type Result<T> = std::result::Result<T, TerminfoError>;

/// Parsed string capabilities of one entry
pub struct Terminfo {
    strings: Vec<Option<Vec<u8>>>,
}

impl Terminfo {
    /// Parse a compiled entry
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_LEN {
            return Err(TerminfoError::Malformed("truncated header"));
        }

        let header: Vec<i16> = data[..HEADER_LEN]
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]))
            .collect();

        let number_width = match header[0] as u16 {
            MAGIC_LEGACY => 2,
            MAGIC_NUMBER32 => 4,
            _ => return Err(TerminfoError::Malformed("bad magic number")),
        };

        let count = |v: i16| usize::try_from(v).map_err(|_| TerminfoError::Malformed("negative section size"));
        let names_len = count(header[1])?;
        let bools_len = count(header[2])?;
        let numbers_len = count(header[3])?;
        let strings_len = count(header[4])?;
        let table_len = count(header[5])?;

        let mut pos = HEADER_LEN + names_len + bools_len;
        // numbers start on an even offset
        if pos % 2 == 1 {
            pos += 1;
        }
        pos += numbers_len * number_width;

        let offsets_end = pos + strings_len * 2;
        let table_end = offsets_end + table_len;
        if data.len() < table_end {
            return Err(TerminfoError::Malformed("truncated string table"));
        }

        let table = &data[offsets_end..table_end];
        let strings = data[pos..offsets_end]
            .chunks_exact(2)
            .map(|c| {
                let offset = i16::from_le_bytes([c[0], c[1]]);
                // -1 absent, -2 cancelled
                let start = usize::try_from(offset).ok()?;
                let rest = table.get(start..)?;
                let end = rest.iter().position(|&b| b == 0)?;
                Some(rest[..end].to_vec())
            })
            .collect();

        Ok(Self { strings })
    }

    /// String capability by index, if present
    pub fn string(&self, index: usize) -> Option<&[u8]> {
        self.strings.get(index)?.as_deref()
    }

    /// F1..F4 sequences
    pub fn function_keys(&self, term: &str) -> Result<FunctionKeys> {
        let get = |index: usize, capability: &'static str| {
            self.string(index)
                .filter(|s| !s.is_empty())
                .map(<[u8]>::to_vec)
                .ok_or_else(|| TerminfoError::MissingCapability {
                    term: term.to_string(),
                    capability,
                })
        };

        Ok(FunctionKeys::new(
            get(KEY_F1, "kf1")?,
            get(KEY_F2, "kf2")?,
            get(KEY_F3, "kf3")?,
            get(KEY_F4, "kf4")?,
        ))
    }
}

impl FunctionKeys {
    /// Look up F1..F4 for the terminal named by `$TERM`
    pub fn from_terminfo() -> Result<Self> {
        let term = env::var("TERM")
            .ok()
            .filter(|t| !t.is_empty())
            .ok_or(TerminfoError::TermNotSet)?;

        let path = find_entry(&term).ok_or_else(|| TerminfoError::EntryNotFound(term.clone()))?;
        debug!("Using terminfo entry {}", path.display());

        let data = fs::read(&path).map_err(|source| TerminfoError::Read {
            path: path.clone(),
            source,
        })?;

        let keys = Terminfo::parse(&data)?.function_keys(&term)?;
        info!("Function keys for {}: {:?}", term, keys);
        Ok(keys)
    }
}

/// Directories searched for compiled entries, in order
fn search_dirs() -> Vec<PathBuf> {
    let mut dirs = Vec::new();

    if let Some(dir) = env::var_os("TERMINFO") {
        dirs.push(PathBuf::from(dir));
    }
    if let Some(home) = env::var_os("HOME") {
        dirs.push(PathBuf::from(home).join(".terminfo"));
    }
    if let Ok(list) = env::var("TERMINFO_DIRS") {
        // an empty element means the system default
        dirs.extend(list.split(':').filter(|d| !d.is_empty()).map(PathBuf::from));
    }
    for dir in ["/etc/terminfo", "/lib/terminfo", "/usr/share/terminfo", "/usr/lib/terminfo"] {
        dirs.push(PathBuf::from(dir));
    }

    dirs
}

fn find_entry(term: &str) -> Option<PathBuf> {
    let first = term.chars().next()?;
    search_dirs()
        .iter()
        .flat_map(|dir| entry_candidates(dir, first, term))
        .find(|p| p.is_file())
}

/// `x/xterm` on most systems, `78/xterm` on macOS
fn entry_candidates(dir: &Path, first: char, term: &str) -> [PathBuf; 2] {
    [
        dir.join(first.to_string()).join(term),
        dir.join(format!("{:02x}", first as u32)).join(term),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::keyseq::FunctionKey;

    /// Build a compiled entry with the given string capabilities
    fn build_entry(magic: u16, strings: &[(usize, &[u8])]) -> Vec<u8> {
        let names = b"test|synthetic terminal\0";
        let bools = [1u8, 0, 1];
        let numbers: [i32; 2] = [80, 24];
        let count = strings.iter().map(|(i, _)| i + 1).max().unwrap_or(0);

        let mut offsets = vec![-1i16; count];
        let mut table = Vec::new();
        for (index, value) in strings {
            offsets[*index] = table.len() as i16;
            table.extend_from_slice(value);
            table.push(0);
        }

        let mut out = Vec::new();
        for v in [
            magic as i16,
            names.len() as i16,
            bools.len() as i16,
            numbers.len() as i16,
            count as i16,
            table.len() as i16,
        ] {
            out.extend_from_slice(&v.to_le_bytes());
        }
        out.extend_from_slice(names);
        out.extend_from_slice(&bools);
        if out.len() % 2 == 1 {
            out.push(0);
        }
        for n in numbers {
            if magic == MAGIC_NUMBER32 {
                out.extend_from_slice(&n.to_le_bytes());
            } else {
                out.extend_from_slice(&(n as i16).to_le_bytes());
            }
        }
        for o in offsets {
            out.extend_from_slice(&o.to_le_bytes());
        }
        out.extend_from_slice(&table);
        out
    }

    fn xterm_strings() -> Vec<(usize, &'static [u8])> {
        vec![
            (1, b"\x07"),
            (KEY_F1, b"\x1bOP"),
            (67, b"\x1b[21~"),
            (KEY_F2, b"\x1bOQ"),
            (KEY_F3, b"\x1bOR"),
            (KEY_F4, b"\x1bOS"),
        ]
    }

    #[test]
    fn test_parse_legacy_entry() {
        let data = build_entry(MAGIC_LEGACY, &xterm_strings());
        let info = Terminfo::parse(&data).unwrap();
        assert_eq!(info.string(1), Some(&b"\x07"[..]));
        assert_eq!(info.string(0), None);
        assert_eq!(info.string(500), None);

        let keys = info.function_keys("test").unwrap();
        assert_eq!(keys.sequence(FunctionKey::F1), b"\x1bOP");
        assert_eq!(keys.sequence(FunctionKey::F4), b"\x1bOS");
    }

    #[test]
    fn test_parse_number32_entry() {
        let data = build_entry(MAGIC_NUMBER32, &xterm_strings());
        let keys = Terminfo::parse(&data).unwrap().function_keys("test").unwrap();
        assert_eq!(keys.sequence(FunctionKey::F2), b"\x1bOQ");
        assert_eq!(keys.sequence(FunctionKey::F3), b"\x1bOR");
    }

    #[test]
    fn test_missing_capability() {
        let data = build_entry(MAGIC_LEGACY, &[(KEY_F1, b"\x1bOP"), (KEY_F2, b"\x1bOQ")]);
        let err = Terminfo::parse(&data).unwrap().function_keys("dumb").unwrap_err();
        assert!(matches!(err, TerminfoError::MissingCapability { capability: "kf3", .. }));
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(matches!(Terminfo::parse(b"xx"), Err(TerminfoError::Malformed(_))));
        assert!(matches!(
            Terminfo::parse(&[0u8; 12]),
            Err(TerminfoError::Malformed("bad magic number"))
        ));

        let mut data = build_entry(MAGIC_LEGACY, &xterm_strings());
        data.truncate(data.len() - 4);
        assert!(matches!(Terminfo::parse(&data), Err(TerminfoError::Malformed(_))));
    }

    #[test]
    fn test_entry_candidates() {
        let [plain, hex] = entry_candidates(Path::new("/usr/share/terminfo"), 'x', "xterm");
        assert_eq!(plain, PathBuf::from("/usr/share/terminfo/x/xterm"));
        assert_eq!(hex, PathBuf::from("/usr/share/terminfo/78/xterm"));
    }
}
