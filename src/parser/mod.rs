//! Single-line capture: `todo Review #work !hoch @morgen`.

use indexmap::IndexSet;
use once_cell::sync::Lazy;
use regex::Regex;
use time::{Date, Duration, Weekday};

use crate::model::{local_today, ItemKind, NewItem, Priority};

pub mod keywords;

use self::keywords::{
    DueRule, DUE_DATE_KEYWORDS, PRIORITY_KEYWORDS, TAG_EXTRA_CHARS, TASK_KEYWORDS,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedResult {
    /// May be empty; callers validate before creating an item.
    pub content: String,
    pub kind: ItemKind,
    pub tags: IndexSet<String>,
    pub priority: Priority,
    pub due_date: Option<Date>,
}

impl From<ParsedResult> for NewItem {
    fn from(parsed: ParsedResult) -> Self {
        NewItem {
            content: parsed.content,
            kind: parsed.kind,
            tags: parsed.tags,
            priority: parsed.priority,
            due_date: parsed.due_date,
            ..NewItem::default()
        }
    }
}

static TASK_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?i)^(?:{})\s+", alternation(TASK_KEYWORDS)))
        .expect("valid task keyword pattern")
});

static TAG_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"#([A-Za-z0-9_{}]+)",
        regex::escape(TAG_EXTRA_CHARS)
    ))
    .expect("valid tag pattern")
});

static PRIORITY_PATTERNS: Lazy<Vec<(Priority, Regex)>> = Lazy::new(|| {
    PRIORITY_KEYWORDS
        .iter()
        .map(|(priority, words)| {
            let regex = Regex::new(&format!(r"(?i)!(?:{})\b", alternation(words)))
                .expect("valid priority pattern");
            (*priority, regex)
        })
        .collect()
});

static DUE_DATE_PATTERNS: Lazy<Vec<(DueRule, Regex)>> = Lazy::new(|| {
    DUE_DATE_KEYWORDS
        .iter()
        .map(|(rule, words)| {
            let regex = Regex::new(&format!(r"(?i)@(?:{})\b", alternation(words)))
                .expect("valid due date pattern");
            (*rule, regex)
        })
        .collect()
});

fn alternation(words: &[&str]) -> String {
    words
        .iter()
        .map(|word| regex::escape(word))
        .collect::<Vec<_>>()
        .join("|")
}

/// Parses `text` relative to the local calendar day.
pub fn parse(text: &str) -> ParsedResult {
    parse_at(text, local_today())
}

/// Parses `text` with relative date keywords resolved against `today`.
pub fn parse_at(text: &str, today: Date) -> ParsedResult {
    let mut working = text.to_string();

    let kind = if TASK_PATTERN.is_match(&working) {
        working = TASK_PATTERN.replacen(&working, 1, "").into_owned();
        ItemKind::Task
    } else {
        ItemKind::Note
    };

    let mut tags = IndexSet::new();
    for captures in TAG_PATTERN.captures_iter(&working) {
        tags.insert(captures[1].to_string());
    }
    if !tags.is_empty() {
        working = TAG_PATTERN.replace_all(&working, "").into_owned();
    }

    let mut priority = Priority::None;
    for (level, pattern) in PRIORITY_PATTERNS.iter() {
        if pattern.is_match(&working) {
            priority = *level;
            working = pattern.replacen(&working, 1, "").into_owned();
            break;
        }
    }

    let mut due_date = None;
    for (rule, pattern) in DUE_DATE_PATTERNS.iter() {
        if pattern.is_match(&working) {
            due_date = Some(resolve_due(*rule, today));
            working = pattern.replacen(&working, 1, "").into_owned();
            break;
        }
    }

    ParsedResult {
        content: normalize_whitespace(&working),
        kind,
        tags,
        priority,
        due_date,
    }
}

fn resolve_due(rule: DueRule, today: Date) -> Date {
    match rule {
        DueRule::Today => today,
        DueRule::Tomorrow => today.saturating_add(Duration::days(1)),
        DueRule::Next(weekday) => next_weekday_after(today, weekday),
    }
}

fn next_weekday_after(today: Date, weekday: Weekday) -> Date {
    let target = i64::from(weekday.number_days_from_monday());
    let current = i64::from(today.weekday().number_days_from_monday());
    let ahead = match (target - current).rem_euclid(7) {
        0 => 7,
        days => days,
    };
    today.saturating_add(Duration::days(ahead))
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    // Wednesday
    const TODAY: Date = date!(2024 - 05 - 15);

    #[test]
    fn full_command_extracts_every_attribute() {
        let parsed = parse_at("todo Review #projectA #projectA !hoch @morgen", TODAY);
        assert_eq!(parsed.kind, ItemKind::Task);
        assert_eq!(parsed.tags.iter().collect::<Vec<_>>(), vec!["projectA"]);
        assert_eq!(parsed.priority, Priority::High);
        assert_eq!(parsed.due_date, Some(date!(2024 - 05 - 16)));
        assert_eq!(parsed.content, "Review");
    }

    #[test]
    fn plain_text_is_a_note() {
        let parsed = parse_at("Buy milk", TODAY);
        assert_eq!(parsed.kind, ItemKind::Note);
        assert!(parsed.tags.is_empty());
        assert_eq!(parsed.priority, Priority::None);
        assert_eq!(parsed.due_date, None);
        assert_eq!(parsed.content, "Buy milk");
    }

    #[test]
    fn first_priority_level_wins_and_others_stay_literal() {
        let parsed = parse_at("x !hoch !niedrig", TODAY);
        assert_eq!(parsed.priority, Priority::High);
        assert_eq!(parsed.content, "x !niedrig");

        let parsed = parse_at("x !low !medium", TODAY);
        assert_eq!(parsed.priority, Priority::Medium);
        assert_eq!(parsed.content, "x !low");
    }

    #[test]
    fn only_one_priority_token_is_consumed() {
        let parsed = parse_at("a !high b !wichtig", TODAY);
        assert_eq!(parsed.priority, Priority::High);
        assert_eq!(parsed.content, "a b !wichtig");
    }

    #[test]
    fn task_keyword_is_case_insensitive_and_needs_whitespace() {
        assert_eq!(parse_at("AUFGABE call mom", TODAY).kind, ItemKind::Task);
        assert_eq!(parse_at("Task call mom", TODAY).content, "call mom");
        let glued = parse_at("todolist cleanup", TODAY);
        assert_eq!(glued.kind, ItemKind::Note);
        assert_eq!(glued.content, "todolist cleanup");
        assert_eq!(parse_at("todo", TODAY).kind, ItemKind::Note);
    }

    #[test]
    fn keyword_is_only_recognised_at_the_start() {
        let parsed = parse_at("remember todo list", TODAY);
        assert_eq!(parsed.kind, ItemKind::Note);
        assert_eq!(parsed.content, "remember todo list");
    }

    #[test]
    fn tags_allow_umlauts_digits_and_hyphens() {
        let parsed = parse_at("Plan #Bücher #q3-plan #straße done", TODAY);
        assert_eq!(
            parsed.tags.iter().collect::<Vec<_>>(),
            vec!["Bücher", "q3-plan", "straße"]
        );
        assert_eq!(parsed.content, "Plan done");
    }

    #[test]
    fn tags_keep_first_seen_order() {
        let parsed = parse_at("#b #a #b #c", TODAY);
        assert_eq!(parsed.tags.iter().collect::<Vec<_>>(), vec!["b", "a", "c"]);
        assert_eq!(parsed.content, "");
    }

    #[test]
    fn due_keywords_resolve_relative_to_today() {
        assert_eq!(parse_at("x @heute", TODAY).due_date, Some(TODAY));
        assert_eq!(parse_at("x @Today", TODAY).due_date, Some(TODAY));
        assert_eq!(
            parse_at("x @tomorrow", TODAY).due_date,
            Some(date!(2024 - 05 - 16))
        );
        assert_eq!(
            parse_at("x @montag", TODAY).due_date,
            Some(date!(2024 - 05 - 20))
        );
        assert_eq!(
            parse_at("x @friday", TODAY).due_date,
            Some(date!(2024 - 05 - 17))
        );
    }

    #[test]
    fn weekday_keyword_on_that_weekday_means_next_week() {
        let friday = date!(2024 - 05 - 17);
        assert_eq!(
            parse_at("x @freitag", friday).due_date,
            Some(date!(2024 - 05 - 24))
        );
        let monday = date!(2024 - 05 - 20);
        assert_eq!(
            parse_at("x @monday", monday).due_date,
            Some(date!(2024 - 05 - 27))
        );
    }

    #[test]
    fn first_due_keyword_in_table_order_wins() {
        let parsed = parse_at("call @morgen @heute", TODAY);
        assert_eq!(parsed.due_date, Some(TODAY));
        assert_eq!(parsed.content, "call @morgen");
    }

    #[test]
    fn keywords_need_a_word_boundary() {
        let parsed = parse_at("release !10 @todayish", TODAY);
        assert_eq!(parsed.priority, Priority::None);
        assert_eq!(parsed.due_date, None);
        assert_eq!(parsed.content, "release !10 @todayish");
    }

    #[test]
    fn content_is_always_normalised() {
        let inputs = [
            "",
            "   ",
            "\t todo \n  a  #x  b  ",
            "todo   #a !1 @heute   ",
            "  many     spaces\there  ",
            "#only #tags",
            "!hoch",
            "ü  ß  #ä",
        ];
        for input in inputs {
            let parsed = parse_at(input, TODAY);
            assert_eq!(parsed.content, parsed.content.trim(), "input {input:?}");
            assert!(!parsed.content.contains("  "), "input {input:?}");
            assert!(!parsed.content.contains('\t'), "input {input:?}");
        }
    }

    #[test]
    fn parsed_result_converts_into_create_request() {
        let parsed = parse_at("todo Ship #release !low @friday", TODAY);
        let draft = NewItem::from(parsed);
        assert_eq!(draft.content, "Ship");
        assert_eq!(draft.kind, ItemKind::Task);
        assert_eq!(draft.priority, Priority::Low);
        assert_eq!(draft.status, None);
        assert!(draft.images.is_empty());
        assert_eq!(draft.due_date, Some(date!(2024 - 05 - 17)));
    }
}
