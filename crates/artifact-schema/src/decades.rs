//! Decade derivation for an artifact's year range.

/// The decade containing `year`, e.g. `1983 -> 1980`.
pub fn decade_of(year: i32) -> i32 {
    year.div_euclid(10) * 10
}

/// Every decade boundary spanned by `[from_year, to_year]`, ascending.
///
/// A missing `to_year` means the artifact belongs to a single year. An
/// inverted range yields nothing.
pub fn decades_spanned(from_year: i32, to_year: Option<i32>) -> Vec<i32> {
    let to_year = to_year.unwrap_or(from_year);
    if to_year < from_year {
        return Vec::new();
    }
    (decade_of(from_year)..=decade_of(to_year)).step_by(10).collect()
}
