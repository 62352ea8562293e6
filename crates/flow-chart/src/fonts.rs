use std::path::Path;
use std::sync::OnceLock;

/// Family used when no bundled font file is found.
pub const FALLBACK_FONT_FAMILY: &str = "Malgun Gothic";

static CHART_FONT: OnceLock<String> = OnceLock::new();

/// Pick the chart font family once for the whole process.
///
/// A font file at `path` wins and is referred to by its file stem; otherwise
/// the fallback family is used. Later calls return the first choice.
pub fn init_fonts(path: impl AsRef<Path>) -> &'static str {
    CHART_FONT
        .get_or_init(|| {
            let family = resolve_font_family(path.as_ref());
            tracing::info!("Chart font family: {}", family);
            family
        })
        .as_str()
}

/// The configured family, or the fallback if [`init_fonts`] was never called.
pub fn font_family() -> &'static str {
    CHART_FONT.get().map(String::as_str).unwrap_or(FALLBACK_FONT_FAMILY)
}

fn resolve_font_family(path: &Path) -> String {
    if path.is_file() {
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            return stem.to_string();
        }
    }
    FALLBACK_FONT_FAMILY.to_string()
}
