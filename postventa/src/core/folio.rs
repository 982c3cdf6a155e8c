//! Claim folio allocation: `<prefix>-<year>-<NNNN>`.

/// Parse the sequence number of a folio issued for `year`, if well formed.
pub fn parse_sequence(folio: &str, prefix: &str, year: i32) -> Option<u32> {
    let rest = folio.strip_prefix(prefix)?.strip_prefix('-')?;
    let (folio_year, number) = rest.split_once('-')?;
    if folio_year.parse::<i32>().ok()? != year {
        return None;
    }
    if number.is_empty() || !number.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    number.parse().ok()
}

/// Next folio for `year`: highest existing sequence plus one, at least four digits.
pub fn next_folio<'a>(existing: impl IntoIterator<Item = &'a str>, prefix: &str, year: i32) -> String {
    let next = existing
        .into_iter()
        .filter_map(|folio| parse_sequence(folio, prefix, year))
        .max()
        .unwrap_or(0)
        + 1;
    format!("{prefix}-{year}-{next:04}")
}
