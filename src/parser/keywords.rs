//! Locale keyword tables for the capture parser.
//!
//! Order matters: the parser walks each table top to bottom and the first
//! matching entry wins.

use time::Weekday;

use crate::model::Priority;

/// Leading words that turn a capture into a task.
pub const TASK_KEYWORDS: &[&str] = &["todo", "task", "aufgabe"];

/// `!keyword` tokens, highest priority first.
pub const PRIORITY_KEYWORDS: &[(Priority, &[&str])] = &[
    (Priority::High, &["hoch", "wichtig", "high", "1"]),
    (Priority::Medium, &["mittel", "medium", "2"]),
    (Priority::Low, &["niedrig", "low", "3"]),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DueRule {
    Today,
    Tomorrow,
    /// The next occurrence of the weekday strictly after today.
    Next(Weekday),
}

/// `@keyword` tokens.
pub const DUE_DATE_KEYWORDS: &[(DueRule, &[&str])] = &[
    (DueRule::Today, &["heute", "today"]),
    (DueRule::Tomorrow, &["morgen", "tomorrow"]),
    (DueRule::Next(Weekday::Monday), &["montag", "monday"]),
    (DueRule::Next(Weekday::Friday), &["freitag", "friday"]),
];

/// Characters allowed in a `#tag` besides ASCII letters, digits and `_`.
pub const TAG_EXTRA_CHARS: &str = "äöüÄÖÜß-";
