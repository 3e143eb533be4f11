/// Language used when nothing has been stored yet.
pub const DEFAULT_LANG: &str = "en";

/// Supported target languages as `(code, display name)`.
pub const LANGUAGES: &[(&str, &str)] = &[
    ("en", "English"),
    ("pcm", "Nigerian Pidgin"),
    ("yo", "Yoruba"),
    ("ig", "Igbo"),
    ("ha", "Hausa"),
];

pub fn is_supported(code: &str) -> bool {
    LANGUAGES.iter().any(|(c, _)| *c == code)
}

/// Display name for `code`, used in prompts. Unknown codes pass through as-is.
pub fn display_name(code: &str) -> &str {
    LANGUAGES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| *name)
        .unwrap_or(code)
}
