use once_cell::sync::Lazy;
use regex::Regex;

/// Chunked client uploads append `_batchN` to the label of a split location.
static BATCH_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"_batch\d+$").unwrap());

fn is_allowed(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, ' ' | '_' | '-')
}

/// Turn a raw location label into a name safe for archive entries.
///
/// Returns `None` when nothing usable is left, which callers report as a
/// skipped group. The result is a fixed point: normalizing it again yields
/// the same string.
pub fn normalize(raw: &str) -> Option<String> {
    let filtered: String = raw.chars().filter(|c| is_allowed(*c)).collect();
    let mut name = filtered.trim().to_string();
    // Stripping can expose another suffix ("a_batch1_batch2") or trailing space.
    loop {
        let stripped = BATCH_SUFFIX.replace(&name, "").trim().to_string();
        if stripped == name {
            break;
        }
        name = stripped;
    }
    if name.is_empty() { None } else { Some(name) }
}
