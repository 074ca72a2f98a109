use std::collections::BTreeMap;

use crate::shared::constants::PTS_TAG_KEY;

/// A value stored in a [`PtsTag`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TagValue {
    Int(i64),
    Text(String),
}

/// Per-submission user info that the engine echoes back on completion.
///
/// A small key→value dictionary. Sessions only ever store one entry, the
/// PTS under [`PTS_TAG_KEY`], but engines hand back whatever dictionary they
/// were given, so a tag can arrive without that key or with a value of the
/// wrong type.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PtsTag {
    entries: BTreeMap<String, TagValue>,
}

impl PtsTag {
    /// Creates a tag carrying `pts`.
    pub fn new(pts: i64) -> Self {
        let mut tag = Self::default();
        tag.insert(PTS_TAG_KEY, TagValue::Int(pts));
        tag
    }

    pub fn insert(&mut self, key: &str, value: TagValue) {
        self.entries.insert(key.to_string(), value);
    }

    pub fn get(&self, key: &str) -> Option<&TagValue> {
        self.entries.get(key)
    }

    /// The stored PTS, if the tag holds an integer under the PTS key.
    pub fn pts(&self) -> Option<i64> {
        match self.get(PTS_TAG_KEY) {
            Some(TagValue::Int(pts)) => Some(*pts),
            _ => None,
        }
    }
}

/// Recovers the PTS from a completion's tag.
///
/// A missing or malformed tag yields 0. This is a fallback, not an error:
/// such frames still get queued, at the front.
pub fn recover_pts(tag: Option<&PtsTag>) -> i64 {
    tag.and_then(PtsTag::pts).unwrap_or(0)
}
