/// Hide Telegram bot tokens embedded in file download URLs
/// (`https://api.telegram.org/file/bot<token>/<path>`) before logging.
pub fn redact_url(url: &str) -> String {
    let Some(start) = url.find("/bot") else {
        return url.to_string();
    };
    let token_start = start + "/bot".len();
    let Some(len) = url[token_start..].find('/') else {
        return url.to_string();
    };
    format!("{}/bot<redacted>{}", &url[..start], &url[token_start + len..])
}

pub fn truncate_text(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s.to_string();
    }
    let mut out = s.chars().take(max_len).collect::<String>();
    out.push_str("...");
    out
}
