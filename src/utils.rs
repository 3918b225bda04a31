use chrono::{DateTime, NaiveDateTime, Utc};
use indicatif::{ProgressBar, ProgressStyle};

pub fn progress_style() -> ProgressStyle {
    ProgressStyle::with_template("[{elapsed_precise}] {human_pos}/{human_len} {percent}% ({per_sec})")
        .expect("hardcoded")
}

pub fn progress_bar(len: u64) -> ProgressBar {
    ProgressBar::new(len).with_style(progress_style())
}

/// Lower-case ascii words joined by dashes.
pub fn slug(text: &str) -> String {
    let mut output = String::new();
    for word in text
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|x| !x.is_empty())
    {
        if !output.is_empty() {
            output.push('-');
        }
        output.push_str(&word.to_ascii_lowercase());
    }
    output
}

pub fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// Accepts RFC 3339 and the zone-less ISO timestamps the scrapers write.
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(x) = DateTime::parse_from_rfc3339(text) {
        return Some(x.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|x| x.and_utc())
}
