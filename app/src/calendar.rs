//! Calendar plan model and month-grid layout.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const GRID_COLUMNS: usize = 7;
pub const GRID_ROWS: usize = 5;
pub const GRID_CELLS: usize = GRID_COLUMNS * GRID_ROWS;

const WEEKDAY_LABELS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

const MONTH_NAMES: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

/// One generated post suggestion. Value type, never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostIdea {
    pub platform: String,
    pub theme: String,
    pub idea: String,
    pub caption: String,
    pub hashtags: String,
    pub visual: String,
}

impl PostIdea {
    /// Clipboard-ready block for sharing a single post suggestion.
    pub fn copy_text(&self) -> String {
        format!(
            "Platform: {}\nIdea: {}\n\nCaption:\n{}\n\nHashtags: {}",
            self.platform, self.idea, self.caption, self.hashtags
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarDay {
    /// Human date label, e.g. "October 5".
    pub date: String,
    pub posts: Vec<PostIdea>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarPlan {
    pub calendar: Vec<CalendarDay>,
}

/// 1-based month number for a full English month name, case-insensitive.
pub fn month_number(name: &str) -> Option<u32> {
    let lowered = name.trim().to_lowercase();
    MONTH_NAMES
        .iter()
        .position(|m| *m == lowered)
        .map(|i| i as u32 + 1)
}

pub fn days_in_month(month: u32, year: i32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|d| d.pred_opt())
        .map(|d| d.day())
        .unwrap_or(0)
}

/// Weekday column (0 = Sunday) of the first day of the month.
pub fn first_weekday_offset(month: u32, year: i32) -> usize {
    NaiveDate::from_ymd_opt(year, month, 1)
        .map(|d| d.weekday().num_days_from_sunday() as usize)
        .unwrap_or(0)
}

/// A successful plan for month M carries exactly `days_in_month(M)` entries,
/// each with a non-empty date label (empty post lists are fine).
pub fn validate_full_month(plan: &CalendarPlan, month: u32, year: i32) -> Result<(), PlanError> {
    let expected = days_in_month(month, year) as usize;
    let actual = plan.calendar.len();
    if actual != expected {
        return Err(PlanError::WrongDayCount { expected, actual });
    }
    for (index, day) in plan.calendar.iter().enumerate() {
        if day.date.trim().is_empty() {
            return Err(PlanError::EmptyDateLabel { index });
        }
    }
    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
pub enum PlanError {
    WrongDayCount { expected: usize, actual: usize },
    EmptyDateLabel { index: usize },
}

impl fmt::Display for PlanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanError::WrongDayCount { expected, actual } => {
                write!(f, "plan has {} day entries, expected {}", actual, expected)
            }
            PlanError::EmptyDateLabel { index } => {
                write!(f, "day entry {} has an empty date label", index)
            }
        }
    }
}

impl std::error::Error for PlanError {}

/// Fixed 7x5 month grid. Leading cells before the month's first weekday are
/// blank; days past the 35th cell are dropped.
pub struct MonthGrid {
    pub cells: Vec<Option<CalendarDay>>,
}

pub fn month_grid(plan: &CalendarPlan, month_name: &str, month: u32, year: i32) -> MonthGrid {
    let offset = first_weekday_offset(month, year);
    let total_days = days_in_month(month, year) as usize;

    let mut cells: Vec<Option<CalendarDay>> = vec![None; offset + total_days];

    // Place generated entries by the day number in their date label.
    for day in &plan.calendar {
        if let Some(number) = day_number(&day.date) {
            let index = offset + number - 1;
            if index < cells.len() {
                cells[index] = Some(day.clone());
            }
        }
    }

    // Pad days the plan missed with empty-post entries so the grid always
    // shows the whole month.
    for day in 0..total_days {
        let index = offset + day;
        if cells[index].is_none() {
            cells[index] = Some(CalendarDay {
                date: format!("{} {}", month_name, day + 1),
                posts: Vec::new(),
            });
        }
    }

    cells.resize(GRID_CELLS, None);
    MonthGrid { cells }
}

/// Trailing day number of a label like "October 5".
fn day_number(date_label: &str) -> Option<usize> {
    date_label
        .split_whitespace()
        .last()
        .and_then(|token| token.parse::<usize>().ok())
        .filter(|n| *n >= 1)
}

impl MonthGrid {
    /// Render the grid as fixed-width text for the terminal.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for label in WEEKDAY_LABELS {
            out.push_str(&format!("{:>10}", label));
        }
        out.push('\n');

        for row in self.cells.chunks(GRID_COLUMNS) {
            for cell in row {
                match cell {
                    Some(day) => {
                        let number = day_number(&day.date).unwrap_or(0);
                        let summary = match day.posts.len() {
                            0 => format!("{}", number),
                            1 => format!("{} (1 post)", number),
                            n => format!("{} ({} posts)", number, n),
                        };
                        out.push_str(&format!("{:>10}", summary));
                    }
                    None => out.push_str(&format!("{:>10}", ".")),
                }
            }
            out.push('\n');
        }
        out
    }
}
