//! Crawl units and upstream response decoding

use crate::storage::{StorageResult, StoredRecord};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Why a unit was scheduled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitMode {
    /// Part of the forward walk through the id space
    Forward,
    /// Refilling an item whose stored pages have a gap
    RecoverPages,
    /// Fetching an id absent from the store
    RecoverId,
}

/// One `(id, page)` to resolve; page is always 1 for body collections
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchUnit {
    pub id: i64,
    pub page: u32,
    pub mode: UnitMode,
    /// Page count learned from page 1, carried by later pages
    pub expected_pages: Option<u32>,
}

impl FetchUnit {
    pub fn forward(id: i64) -> Self {
        Self::first_page(id, UnitMode::Forward)
    }

    pub fn recover_pages(id: i64) -> Self {
        Self::first_page(id, UnitMode::RecoverPages)
    }

    pub fn recover_id(id: i64) -> Self {
        Self::first_page(id, UnitMode::RecoverId)
    }

    fn first_page(id: i64, mode: UnitMode) -> Self {
        Self {
            id,
            page: 1,
            mode,
            expected_pages: None,
        }
    }

    /// Same item, another page
    pub fn with_page(&self, page: u32, pages: u32) -> Self {
        Self {
            page,
            expected_pages: Some(pages),
            ..*self
        }
    }

    pub fn is_recovery(&self) -> bool {
        self.mode != UnitMode::Forward
    }

    /// Units to schedule once this one resolved with `num_pages`
    ///
    /// Forward page 1 fans out to every remaining page at once. Recovery
    /// walks the pages one at a time so each gap is reached.
    pub fn follow_ups(&self, num_pages: Option<u32>) -> Vec<FetchUnit> {
        match self.mode {
            UnitMode::Forward if self.page == 1 => match num_pages {
                Some(pages) if pages > 1 => {
                    (2..=pages).map(|page| self.with_page(page, pages)).collect()
                }
                _ => Vec::new(),
            },
            UnitMode::Forward => Vec::new(),
            UnitMode::RecoverPages | UnitMode::RecoverId => {
                let pages = if self.page == 1 {
                    num_pages
                } else {
                    self.expected_pages
                };
                match pages {
                    Some(pages) if self.page < pages => vec![self.with_page(self.page + 1, pages)],
                    _ => Vec::new(),
                }
            }
        }
    }

    /// True when resolving this unit finishes its item
    ///
    /// That is page 1 of a single-page (or failed) item, or the last page of
    /// a multi-page item.
    pub fn completes_item(&self, num_pages: Option<u32>) -> bool {
        if self.page == 1 {
            num_pages.map_or(true, |pages| pages <= 1)
        } else {
            self.expected_pages == Some(self.page)
        }
    }

    /// True when a completed item should be added to the done-ids counter
    ///
    /// Items refilled for page gaps are already counted when the crawl starts.
    pub fn counts_toward_ids(&self) -> bool {
        self.mode != UnitMode::RecoverPages
    }
}

/// One page of the comment API
///
/// Numeric fields arrive as either JSON numbers or numeric strings.
#[derive(Debug, Default, Deserialize)]
pub struct CommentPage {
    #[serde(default)]
    pub content: Option<String>,

    #[serde(default, deserialize_with = "lenient_number")]
    pub num_comments: Option<i64>,

    #[serde(default, deserialize_with = "lenient_number")]
    pub start_index: Option<i64>,

    #[serde(default, deserialize_with = "lenient_number")]
    pub end_index: Option<i64>,

    #[serde(default, deserialize_with = "lenient_number")]
    pub num_pages: Option<i64>,

    #[serde(default, deserialize_with = "lenient_text")]
    pub error: Option<String>,
}

impl CommentPage {
    /// Converts the response into the record stored for `(id, page)`
    ///
    /// An upstream error replaces any content.
    pub fn into_record(self, id: i64, page: u32) -> StorageResult<StoredRecord> {
        if let Some(error) = self.error {
            return Ok(StoredRecord::failure(id, page, error));
        }

        let mut record = StoredRecord::new(id, page).with_content_str(self.content.as_deref())?;
        record.num_comments = self.num_comments;
        record.start_index = self.start_index;
        record.end_index = self.end_index;
        record.num_pages = self.num_pages.and_then(|n| u32::try_from(n).ok());
        Ok(record)
    }
}

fn lenient_number<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}
