//! CSV export of a calendar plan.

use crate::calendar::CalendarPlan;

pub const CSV_HEADER: &str = "Date,Platform,Theme,Idea,Caption,Hashtags,Visual";

/// Standard CSV quoting: fields containing a comma, quote, or newline are
/// wrapped in quotes with internal quotes doubled. Nothing else is escaped.
pub fn escape_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Serialize every post across every day, one row per post.
pub fn to_csv(plan: &CalendarPlan) -> String {
    let mut lines = vec![CSV_HEADER.to_string()];
    for day in &plan.calendar {
        for post in &day.posts {
            let row = [
                &day.date,
                &post.platform,
                &post.theme,
                &post.idea,
                &post.caption,
                &post.hashtags,
                &post.visual,
            ]
            .iter()
            .map(|field| escape_field(field))
            .collect::<Vec<_>>()
            .join(",");
            lines.push(row);
        }
    }
    lines.join("\n")
}

pub fn csv_filename(brand_name: &str, month: &str) -> String {
    format!("{}-{}-content-calendar.csv", brand_name, month)
}
