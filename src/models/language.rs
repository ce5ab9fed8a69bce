use std::collections::BTreeSet;

/// Language codes subtitles can be written in.
pub const SUPPORTED_LANGUAGES: &[&str] = &[
    "ar", "bg", "bn", "ca", "cs", "da", "de", "el", "en", "eo", "es", "et", "fa", "fi", "fr",
    "he", "hi", "hr", "hu", "id", "it", "ja", "ko", "lt", "lv", "ms", "nl", "no", "pl", "pt",
    "pt-br", "ro", "ru", "sk", "sl", "sr", "sv", "sw", "ta", "th", "tr", "uk", "ur", "vi",
    "zh-cn", "zh-tw",
];

pub fn is_supported(code: &str) -> bool {
    SUPPORTED_LANGUAGES.contains(&code)
}

/// Supported languages minus the ones the team blocked for writing.
pub fn writable_languages<'a>(blocked: impl IntoIterator<Item = &'a str>) -> BTreeSet<String> {
    let blocked: BTreeSet<&str> = blocked.into_iter().collect();
    SUPPORTED_LANGUAGES
        .iter()
        .filter(|code| !blocked.contains(*code))
        .map(|code| code.to_string())
        .collect()
}
