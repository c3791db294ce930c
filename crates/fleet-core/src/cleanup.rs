//! Pure helpers for the bootstrap query service's (C9) result cleaning,
//! ported from `init_endpoints.py::clean_entry` / `clean_surrogates`.

/// The time windows (days back from now) tried in order by both expansion
/// modes, per §4.9.
pub const EXPANSION_WINDOWS_DAYS: [i64; 6] = [5, 15, 30, 60, 90, 365];

/// Replaces the Unicode replacement character with `?`.
///
/// The upstream service strips unpaired UTF-16 surrogate code units from
/// string fields before returning them as JSON. A Rust `String` cannot hold
/// an unpaired surrogate at all — `serde_json` already substitutes U+FFFD
/// for one during parsing — so the equivalent cleanup here is replacing that
/// substitution marker with the same `?` placeholder the original emits.
pub fn clean_surrogates(value: &str) -> String {
    if value.contains('\u{FFFD}') {
        value.replace('\u{FFFD}', "?")
    } else {
        value.to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaves_ordinary_strings_untouched() {
        assert_eq!(clean_surrogates("T-100"), "T-100");
    }

    #[test]
    fn replaces_replacement_character_with_question_mark() {
        assert_eq!(clean_surrogates("bad\u{FFFD}plate"), "bad?plate");
    }

    #[test]
    fn expansion_windows_match_spec_order() {
        assert_eq!(EXPANSION_WINDOWS_DAYS, [5, 15, 30, 60, 90, 365]);
    }
}
