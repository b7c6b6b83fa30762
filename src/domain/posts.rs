use time::{OffsetDateTime, format_description::FormatItem, macros::format_description};

pub const HUMAN_DATE_FORMAT: &[FormatItem<'static>] =
    format_description!("[day padding:none] [month repr:long] [year]");
pub const ISO_DATE_FORMAT: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]");

pub const REQUIRED_MESSAGE: &str = "This field is required.";

/// Strip surrounding whitespace and reject blank bodies.
///
/// Shared by post and comment text fields.
pub fn normalize_text(raw: &str) -> Result<String, &'static str> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(REQUIRED_MESSAGE);
    }
    Ok(trimmed.to_string())
}

/// First `limit` characters of the post body, used for titles and list labels.
pub fn preview(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((index, _)) => text[..index].to_string(),
        None => text.to_string(),
    }
}

pub fn format_human_date(when: OffsetDateTime) -> String {
    when.format(HUMAN_DATE_FORMAT)
        .unwrap_or_else(|_| when.date().to_string())
}

pub fn format_iso_date(when: OffsetDateTime) -> String {
    when.format(ISO_DATE_FORMAT)
        .unwrap_or_else(|_| when.date().to_string())
}
