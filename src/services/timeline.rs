use std::collections::BTreeSet;

use thiserror::Error;
use time::Date;

pub(crate) const TAG_VOCABULARY: &[&str] =
    &["follow_up", "urgent", "abnormal", "normal", "medication_change", "referral"];

const MAX_REVIEW_CHARS: usize = 4000;

#[derive(Debug, Error, PartialEq, Eq)]
pub(crate) enum TimelineError {
    #[error("Review text must not be empty")]
    EmptyReview,
    #[error("Review text must be at most {MAX_REVIEW_CHARS} characters")]
    ReviewTooLong,
    #[error("Unknown tags: {}", .0.join(", "))]
    UnknownTags(Vec<String>),
    #[error("Invalid timeline entry key: {0}")]
    InvalidEntryKey(String),
    #[error("Timeline entry {0} not found")]
    EntryNotFound(String),
}

/// Anything that can be placed on a timeline.
pub(crate) trait Dated {
    fn date(&self) -> Date;
    fn stable_id(&self) -> Option<i64>;
}

/// Ascending by date; entries sharing a date keep their original order.
pub(crate) fn sorted_entries<T: Dated + Clone>(entries: &[T]) -> Vec<T> {
    let mut sorted = entries.to_vec();
    sorted.sort_by_key(Dated::date);
    sorted
}

/// `id:<id>` when the entry has a stable id, else `idx:<position>` in the
/// sorted view. Positional keys shift if earlier entries are inserted.
pub(crate) fn entry_key<T: Dated>(entry: &T, position: usize) -> String {
    match entry.stable_id() {
        Some(id) => format!("id:{id}"),
        None => format!("idx:{position}"),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EntryKey {
    Id(i64),
    Index(usize),
}

pub(crate) fn parse_entry_key(raw: &str) -> Result<EntryKey, TimelineError> {
    let invalid = || TimelineError::InvalidEntryKey(raw.to_string());
    if let Some(id) = raw.strip_prefix("id:") {
        return id.parse().map(EntryKey::Id).map_err(|_| invalid());
    }
    if let Some(index) = raw.strip_prefix("idx:") {
        return index.parse().map(EntryKey::Index).map_err(|_| invalid());
    }
    Err(invalid())
}

/// Finds the entry a key refers to within the sorted view and returns its
/// canonical key.
pub(crate) fn resolve_entry_key<T: Dated>(
    sorted: &[T],
    raw: &str,
) -> Result<(usize, String), TimelineError> {
    let position = match parse_entry_key(raw)? {
        EntryKey::Id(id) => sorted.iter().position(|entry| entry.stable_id() == Some(id)),
        EntryKey::Index(index) => (index < sorted.len()).then_some(index),
    }
    .ok_or_else(|| TimelineError::EntryNotFound(raw.to_string()))?;

    Ok((position, entry_key(&sorted[position], position)))
}

pub(crate) fn normalize_review(review: &str) -> Result<String, TimelineError> {
    let trimmed = review.trim();
    if trimmed.is_empty() {
        return Err(TimelineError::EmptyReview);
    }
    if trimmed.chars().count() > MAX_REVIEW_CHARS {
        return Err(TimelineError::ReviewTooLong);
    }
    Ok(trimmed.to_string())
}

/// Trims, lower-cases and de-duplicates tags, keeping first-seen order.
pub(crate) fn normalize_tags(tags: &[String]) -> Result<Vec<String>, TimelineError> {
    let mut seen = BTreeSet::new();
    let mut normalized = Vec::new();
    let mut unknown = Vec::new();

    for tag in tags {
        let tag = tag.trim().to_lowercase().replace([' ', '-'], "_");
        if tag.is_empty() || !seen.insert(tag.clone()) {
            continue;
        }
        if TAG_VOCABULARY.contains(&tag.as_str()) {
            normalized.push(tag);
        } else {
            unknown.push(tag);
        }
    }

    if unknown.is_empty() {
        Ok(normalized)
    } else {
        Err(TimelineError::UnknownTags(unknown))
    }
}
