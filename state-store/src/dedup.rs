use crate::persist::{load_or_default, save_json};
use chrono::{DateTime, Utc};
use monitor_core::StateError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Default, Serialize, Deserialize)]
struct SeenFile {
    /// Post id to the time it was first seen
    #[serde(default)]
    seen: BTreeMap<String, DateTime<Utc>>,
}

/// Ids of every post already handled. An id is only dropped again when a
/// scan is cut short before it got to that post.
#[derive(Debug)]
pub struct DedupStore {
    path: PathBuf,
    seen: BTreeMap<String, DateTime<Utc>>,
}

impl DedupStore {
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let file: SeenFile = load_or_default(&path);
        info!(path = %path.display(), seen = file.seen.len(), "Loaded seen posts");
        Self {
            path,
            seen: file.seen,
        }
    }

    pub fn is_new(&self, post_id: &str) -> bool {
        !self.seen.contains_key(post_id)
    }

    /// Record every unseen id in `post_ids` and write the file once.
    ///
    /// Returns how many ids were new. Nothing is written when all of them
    /// were already known. On a write error the new ids are dropped again, so
    /// memory never claims more than the file holds.
    pub fn mark_seen<'a, I>(&mut self, post_ids: I) -> Result<usize, StateError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let now = Utc::now();
        let mut added = Vec::new();
        for id in post_ids {
            if self.is_new(id) {
                self.seen.insert(id.to_string(), now);
                added.push(id);
            }
        }
        if added.is_empty() {
            return Ok(0);
        }

        if let Err(e) = self.persist() {
            for id in &added {
                self.seen.remove(*id);
            }
            return Err(e);
        }
        Ok(added.len())
    }

    /// Forget ids that were marked but never handled, and write the file.
    pub fn release<'a, I>(&mut self, post_ids: I) -> Result<usize, StateError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let removed = post_ids
            .into_iter()
            .filter(|id| self.seen.remove(*id).is_some())
            .count();
        if removed > 0 {
            self.persist()?;
        }
        Ok(removed)
    }

    pub fn first_seen(&self, post_id: &str) -> Option<DateTime<Utc>> {
        self.seen.get(post_id).copied()
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    fn persist(&self) -> Result<(), StateError> {
        save_json(&self.path, &SeenFileRef { seen: &self.seen })
    }
}

#[derive(Serialize)]
struct SeenFileRef<'a> {
    seen: &'a BTreeMap<String, DateTime<Utc>>,
}
