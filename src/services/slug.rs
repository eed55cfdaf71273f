/// Lower-case, URL-safe form of a display name.
///
/// Letters are transliterated to ASCII; every other run of characters becomes
/// a single dash.
pub fn slugify(name: &str) -> String {
    ::slug::slugify(name)
}
