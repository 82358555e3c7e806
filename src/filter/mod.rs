use std::collections::BTreeSet;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use time::Date;

use crate::model::{Item, ItemKind, ItemStatus, Priority};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum DateBucket {
    Today,
    Overdue,
}

impl DateBucket {
    pub fn contains(self, due: Option<Date>, today: Date) -> bool {
        let Some(due) = due else {
            return false;
        };
        match self {
            DateBucket::Today => due == today,
            DateBucket::Overdue => due < today,
        }
    }
}

/// Active filters; every predicate that is set must hold.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSpec {
    pub tag: Option<String>,
    pub priority: Option<Priority>,
    pub date: Option<DateBucket>,
    pub kind: Option<ItemKind>,
}

impl FilterSpec {
    pub fn is_empty(&self) -> bool {
        self.tag.is_none() && self.priority.is_none() && self.date.is_none() && self.kind.is_none()
    }

    pub fn matches(&self, item: &Item, today: Date) -> bool {
        if let Some(tag) = &self.tag {
            if !item.tags.contains(tag) {
                return false;
            }
        }
        if let Some(priority) = self.priority {
            if item.priority != priority {
                return false;
            }
        }
        if let Some(bucket) = self.date {
            if !bucket.contains(item.due_date, today) {
                return false;
            }
        }
        if let Some(kind) = self.kind {
            if item.kind != kind {
                return false;
            }
        }
        true
    }

    /// Chips for display, in the same `key:value` form `parse_filter` reads.
    pub fn chips(&self) -> Vec<String> {
        let mut chips = Vec::new();
        if let Some(tag) = &self.tag {
            chips.push(format!("tag:{tag}"));
        }
        if let Some(priority) = self.priority {
            chips.push(format!("prio:{priority}"));
        }
        if let Some(date) = self.date {
            chips.push(format!("date:{date}"));
        }
        if let Some(kind) = self.kind {
            chips.push(format!("kind:{kind}"));
        }
        chips
    }
}

/// Items matching `spec`, in their original order. Sorting is up to the caller.
pub fn filter_items<'a, I>(items: I, spec: &FilterSpec, today: Date) -> Vec<&'a Item>
where
    I: IntoIterator<Item = &'a Item>,
{
    items
        .into_iter()
        .filter(|item| spec.matches(item, today))
        .collect()
}

/// Builds a filter from `tag:work prio:high date:today kind:task` tokens.
///
/// Later tokens override earlier ones; unknown keys and values are ignored.
pub fn parse_filter(input: &str) -> FilterSpec {
    let mut spec = FilterSpec::default();
    for raw in input.split_whitespace() {
        let Some((key, value)) = raw.split_once(':') else {
            if let Some(tag) = raw.strip_prefix('#').filter(|tag| !tag.is_empty()) {
                spec.tag = Some(tag.to_string());
            }
            continue;
        };
        if value.is_empty() {
            continue;
        }
        match key.to_ascii_lowercase().as_str() {
            "tag" => spec.tag = Some(value.trim_start_matches('#').to_string()),
            "prio" | "priority" => {
                if let Ok(priority) = Priority::from_str(value) {
                    spec.priority = Some(priority);
                }
            }
            "date" | "due" => {
                if let Ok(bucket) = DateBucket::from_str(value) {
                    spec.date = Some(bucket);
                }
            }
            "kind" | "type" => {
                if let Ok(kind) = ItemKind::from_str(value) {
                    spec.kind = Some(kind);
                }
            }
            _ => {}
        }
    }
    spec
}

/// Distinct tags across `items`, sorted.
pub fn all_tags<'a, I>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a Item>,
{
    items
        .into_iter()
        .flat_map(|item| item.tags.iter().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[derive(Debug, Default)]
pub struct StatusColumns<'a> {
    pub pending: Vec<&'a Item>,
    pub active: Vec<&'a Item>,
    pub done: Vec<&'a Item>,
}

impl<'a> StatusColumns<'a> {
    pub fn column(&self, status: ItemStatus) -> &[&'a Item] {
        match status {
            ItemStatus::Pending => &self.pending,
            ItemStatus::Active => &self.active,
            ItemStatus::Done => &self.done,
        }
    }
}

/// Splits items into board columns, preserving order within each column.
pub fn group_by_status<'a, I>(items: I) -> StatusColumns<'a>
where
    I: IntoIterator<Item = &'a Item>,
{
    let mut columns = StatusColumns::default();
    for item in items {
        match item.status {
            ItemStatus::Pending => columns.pending.push(item),
            ItemStatus::Active => columns.active.push(item),
            ItemStatus::Done => columns.done.push(item),
        }
    }
    columns
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ItemId, NewItem};
    use time::macros::date;
    use time::OffsetDateTime;

    const TODAY: Date = date!(2024 - 05 - 15);

    fn item(id: &str, tags: &[&str], priority: Priority, due: Option<Date>) -> Item {
        let mut draft = NewItem::new(id);
        draft.tags = tags.iter().map(|t| t.to_string()).collect();
        draft.priority = priority;
        draft.due_date = due;
        Item::from_new(ItemId::new(id), &draft, OffsetDateTime::UNIX_EPOCH)
    }

    fn ids(items: &[&Item]) -> Vec<String> {
        items.iter().map(|item| item.id.to_string()).collect()
    }

    #[test]
    fn due_today_is_never_overdue() {
        let items = vec![item("a", &[], Priority::None, Some(TODAY))];
        let overdue = FilterSpec {
            date: Some(DateBucket::Overdue),
            ..FilterSpec::default()
        };
        let today = FilterSpec {
            date: Some(DateBucket::Today),
            ..FilterSpec::default()
        };
        assert!(filter_items(&items, &overdue, TODAY).is_empty());
        assert_eq!(ids(&filter_items(&items, &today, TODAY)), vec!["a"]);
    }

    #[test]
    fn date_buckets_require_a_due_date() {
        let items = vec![
            item("past", &[], Priority::None, Some(date!(2024 - 05 - 14))),
            item("future", &[], Priority::None, Some(date!(2024 - 05 - 16))),
            item("none", &[], Priority::None, None),
        ];
        let overdue = parse_filter("date:overdue");
        assert_eq!(ids(&filter_items(&items, &overdue, TODAY)), vec!["past"]);
        let today = parse_filter("date:today");
        assert!(filter_items(&items, &today, TODAY).is_empty());
    }

    #[test]
    fn predicates_are_anded() {
        let items = vec![
            item("a", &["work"], Priority::High, None),
            item("b", &["work"], Priority::Low, None),
            item("c", &["home"], Priority::High, None),
        ];
        let spec = FilterSpec {
            tag: Some("work".into()),
            priority: Some(Priority::High),
            ..FilterSpec::default()
        };
        assert_eq!(ids(&filter_items(&items, &spec, TODAY)), vec!["a"]);
    }

    #[test]
    fn tag_match_is_exact() {
        let items = vec![item("a", &["Work"], Priority::None, None)];
        let spec = parse_filter("tag:work");
        assert!(filter_items(&items, &spec, TODAY).is_empty());
    }

    #[test]
    fn empty_spec_keeps_everything_in_order() {
        let items = vec![
            item("b", &[], Priority::None, None),
            item("a", &[], Priority::None, None),
        ];
        let spec = FilterSpec::default();
        assert!(spec.is_empty());
        assert_eq!(ids(&filter_items(&items, &spec, TODAY)), vec!["b", "a"]);
    }

    #[test]
    fn parse_filter_reads_known_keys_and_ignores_rest() {
        let spec = parse_filter("tag:#work prio:HIGH due:today kind:task color:red date:later");
        assert_eq!(spec.tag.as_deref(), Some("work"));
        assert_eq!(spec.priority, Some(Priority::High));
        assert_eq!(spec.date, Some(DateBucket::Today));
        assert_eq!(spec.kind, Some(ItemKind::Task));
        assert_eq!(
            spec.chips(),
            vec!["tag:work", "prio:high", "date:today", "kind:todo"]
        );
        assert_eq!(parse_filter("#home").tag.as_deref(), Some("home"));
        assert!(parse_filter("tag: plain words").is_empty());
    }

    #[test]
    fn all_tags_are_distinct_and_sorted() {
        let items = vec![
            item("a", &["zeta", "alpha"], Priority::None, None),
            item("b", &["alpha", "mid"], Priority::None, None),
        ];
        assert_eq!(all_tags(&items), vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn group_by_status_builds_board_columns() {
        let mut active = item("active", &[], Priority::None, None);
        active.status = ItemStatus::Active;
        let mut done = item("done", &[], Priority::None, None);
        done.status = ItemStatus::Done;
        let pending = item("pending", &[], Priority::None, None);
        let items = vec![done, pending, active];
        let columns = group_by_status(&items);
        assert_eq!(ids(columns.column(ItemStatus::Pending)), vec!["pending"]);
        assert_eq!(ids(columns.column(ItemStatus::Active)), vec!["active"]);
        assert_eq!(ids(columns.column(ItemStatus::Done)), vec!["done"]);
    }
}
