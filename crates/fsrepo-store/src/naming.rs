//! Deterministic mapping from logical object names to file-system-safe names.
//!
//! A safe name is lower case, portable ASCII, bounded in length and free of
//! reserved device names. Whenever the sanitized form cannot stand in for the
//! full logical name on its own, a truncated blake3 hash of that full name is
//! appended after [`HASH_DELIMITER`], so distinct logical names never share a
//! file even when they sanitize to the same text.

use crate::StoreError;
use std::sync::{Mutex, OnceLock, PoisonError};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Separates the readable part of a safe name from its hash suffix. Never
/// appears anywhere else in a safe name.
pub const HASH_DELIMITER: char = '@';

/// Inserted in the middle of names that had to be shortened.
pub const TRUNCATION_MARKER: &str = "..";

/// Device names that cannot be used as file names on Windows, with or
/// without an extension.
pub const RESERVED_NAMES: [&str; 22] = [
    "con", "prn", "aux", "nul", "com1", "com2", "com3", "com4", "com5", "com6", "com7", "com8",
    "com9", "lpt1", "lpt2", "lpt3", "lpt4", "lpt5", "lpt6", "lpt7", "lpt8", "lpt9",
];

/// Shared digest state. Every hash computation goes through this one lock.
static DIGEST: OnceLock<Mutex<blake3::Hasher>> = OnceLock::new();

/// Compute the safe file name for `name`.
///
/// `full_name` is the logical name the result must stay unique for; it
/// defaults to `name`. The result is at most `max_length` bytes long and
/// carries a `hash_length`-character hex hash of the lower-cased full name
/// whenever the readable part alone would be ambiguous, reserved or too long.
pub fn make_safe_name(
    name: &str,
    full_name: Option<&str>,
    max_length: usize,
    hash_length: usize,
) -> Result<String, StoreError> {
    if name.is_empty() {
        return Err(StoreError::InvalidName("name must not be empty".to_owned()));
    }
    if full_name.is_some_and(str::is_empty) {
        return Err(StoreError::InvalidName(
            "full name must not be empty when given".to_owned(),
        ));
    }
    if hash_length == 0 || max_length <= hash_length.saturating_add(1) {
        return Err(StoreError::InvalidLength {
            max_length,
            hash_length,
        });
    }

    let name = name.to_lowercase();
    let full_name = full_name.map_or_else(|| name.clone(), str::to_lowercase);

    let mut candidate = sanitize(&name);
    escape_reserved_prefix(&mut candidate);

    // The delimiter is replaced during sanitizing, so a name that contained
    // it always differs from its full name here.
    let hash_needed = candidate != full_name || is_reserved(&candidate);

    let max_hashed_length = max_length - (hash_length + 1);
    let mut shortened = false;
    if candidate.len() > max_length || (hash_needed && candidate.len() > max_hashed_length) {
        candidate = shorten_middle(&candidate, max_hashed_length);
        shortened = true;
    }

    if shortened || hash_needed {
        candidate.push(HASH_DELIMITER);
        candidate.push_str(&name_hash(&full_name, hash_length));
    }

    Ok(candidate)
}

/// True when `name` is exactly one of [`RESERVED_NAMES`], ignoring case.
pub fn is_reserved(name: &str) -> bool {
    RESERVED_NAMES
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(name))
}

/// Strip diacritics, replace everything outside `[a-z0-9._-]` with `_`,
/// collapse runs of dots and trim leading/trailing dots and underscores.
fn sanitize(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.nfkd().filter(|c| !is_combining_mark(*c)) {
        let c = if is_portable(c) { c } else { '_' };
        if c == '.' && out.ends_with('.') {
            continue;
        }
        out.push(c);
    }
    out.trim_matches(|c| c == '.' || c == '_').to_owned()
}

fn is_portable(c: char) -> bool {
    c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '-' | '_' | '.')
}

/// `con.txt` would still open the `con` device on Windows; turn the dot
/// after a reserved prefix into a dash.
fn escape_reserved_prefix(candidate: &mut String) {
    if let Some((head, _)) = candidate.split_once('.') {
        if is_reserved(head) {
            let at = head.len();
            candidate.replace_range(at..=at, "-");
        }
    }
}

/// Cut the middle out of `s` so it fits in `target` bytes, leaving
/// [`TRUNCATION_MARKER`] where text was removed. `s` must be ASCII.
fn shorten_middle(s: &str, target: usize) -> String {
    if s.len() <= target {
        return s.to_owned();
    }
    if target < TRUNCATION_MARKER.len() + 2 {
        return s[..target]
            .trim_end_matches(|c| c == '.' || c == '_')
            .to_owned();
    }
    let keep = target - TRUNCATION_MARKER.len();
    let head = keep.div_ceil(2);
    let tail = keep - head;
    format!("{}{TRUNCATION_MARKER}{}", &s[..head], &s[s.len() - tail..])
}

/// Lower-case hex digest of `full_name`, exactly `hash_length` characters.
fn name_hash(full_name: &str, hash_length: usize) -> String {
    let mut bytes = vec![0u8; hash_length.div_ceil(2)];
    {
        let digest = DIGEST.get_or_init(|| Mutex::new(blake3::Hasher::new()));
        let mut hasher = digest.lock().unwrap_or_else(PoisonError::into_inner);
        hasher.reset();
        hasher.update(full_name.as_bytes());
        hasher.finalize_xof().fill(&mut bytes);
    }
    let mut hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
    hex.truncate(hash_length);
    hex
}
