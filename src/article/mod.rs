//! Article body post-processing.
//!
//! Stored bodies can contain a handful of template macros that only make
//! sense at request time: the article count of the serving database and the
//! current date. They are expanded just before a body goes on the wire.

use chrono::{DateTime, Datelike, TimeZone};

const ARTICLE_COUNT_MACRO: &str = "{{NUMBEROFARTICLES}}";
const DATE_MACRO_PREFIX: &str = "{{CURRENT";

/// Expand `{{NUMBEROFARTICLES}}` and the `{{CURRENT...}}` date macros.
pub fn expand_macros<Tz>(body: &str, article_count: u64, now: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let mut body = body.replace(ARTICLE_COUNT_MACRO, &article_count.to_string());
    if !body.contains(DATE_MACRO_PREFIX) {
        return body;
    }

    let month_name = now.format("%B").to_string();
    let replacements = [
        ("{{CURRENTMONTH}}", now.month().to_string()),
        ("{{CURRENTMONTHNAME}}", month_name.clone()),
        ("{{CURRENTMONTHNAMEGEN}}", month_name),
        ("{{CURRENTDAY}}", now.day().to_string()),
        ("{{CURRENTDAYNAME}}", now.format("%A").to_string()),
        ("{{CURRENTYEAR}}", now.format("%Y").to_string()),
        ("{{CURRENTTIME}}", now.format("%X").to_string()),
    ];
    for (pattern, value) in replacements {
        body = body.replace(pattern, &value);
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn expands_count_and_dates() {
        let now = Utc.with_ymd_and_hms(2004, 7, 5, 13, 4, 5).unwrap();
        let body = "{{NUMBEROFARTICLES}} articles. {{CURRENTDAYNAME}}, {{CURRENTMONTHNAME}} \
                    {{CURRENTDAY}} ({{CURRENTMONTH}}/{{CURRENTYEAR}}) at {{CURRENTTIME}}.";
        assert_eq!(
            expand_macros(body, 250_000, &now),
            "250000 articles. Monday, July 5 (7/2004) at 13:04:05."
        );
    }

    #[test]
    fn plain_bodies_are_untouched() {
        let now = Utc::now();
        assert_eq!(expand_macros("Seattle is a city.", 1, &now), "Seattle is a city.");
        assert_eq!(expand_macros("{{CURRENTSOMETHING}}", 1, &now), "{{CURRENTSOMETHING}}");
    }
}
