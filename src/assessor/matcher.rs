//! Option matching: resolve a free-text target against a dropdown's
//! (value, label) pairs.
//!
//! The ladder below runs top to bottom; the first rule with a hit wins.
//! Rule 5 is a deterministic but arbitrary fallback — it keeps the cascade
//! moving when the caller's text matches nothing, at the cost of possibly
//! selecting an unintended parcel. See DESIGN.md.

/// Resolve the option value to select for `target`.
///
/// 1. Exact case-insensitive label match.
/// 2. Exact case-insensitive value match.
/// 3. Label contains target.
/// 4. Target contains label.
/// 5. First option with a non-empty value.
///
/// Returns `None` only when every option's value is empty.
pub fn resolve_option(target: &str, options: &[(String, String)]) -> Option<String> {
    let want = target.trim().to_lowercase();

    if let Some((value, _)) = options
        .iter()
        .find(|(_, label)| label.trim().to_lowercase() == want)
    {
        return Some(value.clone());
    }

    if let Some((value, _)) = options
        .iter()
        .find(|(value, _)| value.trim().to_lowercase() == want)
    {
        return Some(value.clone());
    }

    if let Some((value, _)) = options
        .iter()
        .find(|(_, label)| label.to_lowercase().contains(&want))
    {
        return Some(value.clone());
    }

    if let Some((value, _)) = options.iter().find(|(_, label)| {
        let label = label.trim().to_lowercase();
        !label.is_empty() && want.contains(&label)
    }) {
        return Some(value.clone());
    }

    options
        .iter()
        .find(|(value, _)| !value.is_empty())
        .map(|(value, _)| value.clone())
}
