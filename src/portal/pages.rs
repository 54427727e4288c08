//! HTML pages served by the portal.

use crate::time::CalendarTime;
use std::net::Ipv4Addr;

const SETUP_TEMPLATE: &str = include_str!("../../assets/setup.html");
const SUCCESS_TEMPLATE: &str = include_str!("../../assets/success.html");

/// Setup page with an optional error banner and a network to pre-select.
pub fn setup_page(error: Option<&str>, preselected: &str) -> String {
    let banner = match error {
        Some(message) => format!(
            r#"<div id="error-message">{}</div>"#,
            escape_html(message)
        ),
        None => String::new(),
    };

    let preselected = script_string(preselected);

    render(
        SETUP_TEMPLATE,
        &[
            ("ERROR_BANNER", banner.as_str()),
            ("PRESELECTED_JSON", preselected.as_str()),
        ],
    )
}

/// Success page showing the station address and the device's local time.
pub fn success_page(station_ip: Ipv4Addr, local_time: Option<&CalendarTime>) -> String {
    let (display, json) = match local_time {
        Some(time) => (
            time.to_string(),
            serde_json::to_string(time).unwrap_or_else(|_| "null".to_string()),
        ),
        None => ("unavailable".to_string(), "null".to_string()),
    };

    let ip = station_ip.to_string();

    render(
        SUCCESS_TEMPLATE,
        &[
            ("STATION_IP", ip.as_str()),
            ("LOCAL_TIME", display.as_str()),
            ("LOCAL_TIME_JSON", json.as_str()),
        ],
    )
}

/// Replace `{{NAME}}` placeholders in one pass.
///
/// Substituted values are not scanned again. Unknown placeholders are left
/// as they are.
fn render(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len() + 256);
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];

        let value = after.find("}}").and_then(|end| {
            let name = &after[..end];
            values
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (*value, end))
        });

        match value {
            Some((value, end)) => {
                out.push_str(value);
                rest = &after[end + 2..];
            }
            None => {
                out.push_str("{{");
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}

/// Escape text for HTML element content and attribute values.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// A JavaScript string literal safe to place inside `<script>`.
fn script_string(text: &str) -> String {
    // A JSON string is a valid JS literal; `</` must not close the script
    serde_json::Value::from(text)
        .to_string()
        .replace("</", "<\\/")
}
