//! Pathname resolution: descending one `\`-separated component at a time
//! against a directory's entries.

use super::dir::{fits_short_name, is_illegal_name_char, DirEntry, EntryState};
use super::table::Cluster;
use crate::error::FsError;

pub const SEPARATOR: u8 = b'\\';

/// Longest single path component this build accepts. 12 without LFN support
/// would be the 8.3-only limit; this crate always supports LFN, so the
/// wider VFAT limit applies.
pub const MAX_COMPONENT_LEN: usize = 260;

/// The root directory, synthesized rather than read off disk: name "ROOT",
/// cluster `root_cluster` for FAT32 or `0` for FAT12/16 (the fixed root
/// region), size 0.
pub fn root_pseudo_entry(root_cluster: Cluster) -> DirEntry {
    let mut name = [0x20u8; 11];
    name[0..4].copy_from_slice(b"ROOT");
    DirEntry::new(name, super::dir::AttributeSet::from_raw(super::dir::Attribute::Directory as u8), root_cluster)
}

/// One `\`-separated component of a path, case-folded for comparison.
pub struct Component<'a> {
    pub raw: &'a str,
}

/// Splits `path` into its components, skipping a leading separator (an
/// absolute path) and collapsing repeated separators.
pub fn components(path: &str) -> impl Iterator<Item = Component<'_>> {
    path.split(SEPARATOR as char).filter(|s| !s.is_empty()).map(|raw| Component { raw })
}

fn ascii_ci_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.to_ascii_uppercase() == y.to_ascii_uppercase())
}

/// Does `entry`'s short name, or `long_name` (the reconstructed LFN, if
/// any), match `component`? Case-insensitive for ASCII.
pub fn entry_matches_component(entry: &DirEntry, long_name: Option<&str>, component: &str) -> bool {
    if let Some(long) = long_name {
        if long.eq_ignore_ascii_case(component) {
            return true;
        }
    }

    if fits_short_name(component) {
        let candidate = short_name_bytes_for_match(component);
        return ascii_ci_eq(&entry.name, &candidate);
    }

    false
}

fn short_name_bytes_for_match(component: &str) -> [u8; 11] {
    let (base, ext) = match component.rsplit_once('.') {
        Some((b, e)) => (b, e),
        None => (component, ""),
    };

    let mut out = [0x20u8; 11];
    for (i, b) in base.bytes().take(8).enumerate() {
        out[i] = b.to_ascii_uppercase();
    }
    for (i, b) in ext.bytes().take(3).enumerate() {
        out[8 + i] = b.to_ascii_uppercase();
    }
    out
}

pub fn validate_component(component: &str) -> Result<(), FsError> {
    if component.is_empty() || component.len() > MAX_COMPONENT_LEN {
        return Err(FsError::InvalidFilename);
    }
    if component.bytes().any(is_illegal_name_char) {
        return Err(FsError::IllegalFilename);
    }
    Ok(())
}

/// The outcome of walking every component but the last: which cluster the
/// parent directory lives in, and the final component's text (still
/// unresolved — the caller looks it up or creates it there).
pub struct ResolvedParent<'a> {
    pub parent_cluster: Cluster,
    pub final_component: &'a str,
}

/// Splits `path` into "every component but the last" (which the caller
/// resolves one lookup at a time starting from `root_cluster`) and the
/// final component name the caller is about to look up or create.
pub fn split_parent(path: &str) -> Result<(&str, &str), FsError> {
    let trimmed = path.trim_start_matches(SEPARATOR as char);
    if trimmed.is_empty() {
        return Err(FsError::InvalidPath);
    }

    match trimmed.rfind(SEPARATOR as char) {
        Some(idx) => Ok((&trimmed[..idx], &trimmed[idx + 1..])),
        None => Ok(("", trimmed)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_parent_and_final_component() {
        assert_eq!(split_parent("a\\b\\c.txt").unwrap(), ("a\\b", "c.txt"));
        assert_eq!(split_parent("c.txt").unwrap(), ("", "c.txt"));
        assert_eq!(split_parent("\\c.txt").unwrap(), ("", "c.txt"));
    }

    #[test]
    fn components_skips_empty_segments() {
        let mut it = components("a\\\\b\\c");
        assert_eq!(it.next().unwrap().raw, "a");
        assert_eq!(it.next().unwrap().raw, "b");
        assert_eq!(it.next().unwrap().raw, "c");
        assert!(it.next().is_none());
    }

    #[test]
    fn validate_component_rejects_reserved_characters() {
        assert_eq!(validate_component("a*b.txt"), Err(FsError::IllegalFilename));
        assert_eq!(validate_component("pipe|name"), Err(FsError::IllegalFilename));
        assert!(validate_component("ok name.txt").is_ok());
    }

    #[test]
    fn matches_short_name_case_insensitively() {
        let entry = DirEntry::new(*b"HELLO   TXT", super::super::dir::AttributeSet::default(), 0);
        assert!(entry_matches_component(&entry, None, "hello.txt"));
        assert!(entry_matches_component(&entry, None, "HELLO.TXT"));
        assert!(!entry_matches_component(&entry, None, "other.txt"));
    }
}
