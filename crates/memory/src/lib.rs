//! Flat-journal memory store with keyword + recency scored retrieval.
//!
//! Notes live in a single JSON array at
//! `.mini-agent/memory/index.json`.  Retrieval is deliberately simple:
//! lowercase term frequency over content and tags with a recency boost.
//! No embeddings, no vector index.

use std::path::PathBuf;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use ma_domain::error::{Error, Result};

/// Who wrote a note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemorySource {
    User,
    Agent,
    System,
}

/// One journal note.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub id: String,
    pub content: String,
    pub source: MemorySource,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Millisecond creation timestamp.
    pub created_at: i64,
}

/// A retrieval hit with its score.
#[derive(Debug, Clone)]
pub struct MemoryHit {
    pub entry: MemoryEntry,
    pub score: f64,
}

/// Tag matches count more than content matches.
const TAG_WEIGHT: f64 = 2.0;
/// Cap on the recency boost added to keyword scores.
const RECENCY_WEIGHT: f64 = 0.5;
/// Half-life of the recency boost, in days.
const RECENCY_HALF_LIFE_DAYS: f64 = 30.0;

/// Journal-backed memory store.  Access is serialized through the inner
/// lock; the on-disk file is rewritten atomically on each save.
pub struct MemoryStore {
    path: PathBuf,
    entries: RwLock<Vec<MemoryEntry>>,
}

impl MemoryStore {
    /// Load (or lazily create) the journal at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = if path.exists() {
            let raw = std::fs::read_to_string(&path).map_err(Error::Io)?;
            serde_json::from_str(&raw).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "unreadable memory journal, starting empty");
                Vec::new()
            })
        } else {
            Vec::new()
        };

        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    /// Append a note and persist the journal.
    pub fn save(
        &self,
        content: impl Into<String>,
        source: MemorySource,
        tags: Vec<String>,
    ) -> Result<MemoryEntry> {
        let entry = MemoryEntry {
            id: uuid::Uuid::new_v4().to_string(),
            content: content.into(),
            source,
            tags,
            created_at: chrono::Utc::now().timestamp_millis(),
        };

        let mut entries = self.entries.write();
        entries.push(entry.clone());
        self.flush(&entries)?;
        Ok(entry)
    }

    /// Keyword + recency scored search, best first.
    pub fn search(&self, query: &str, limit: usize) -> Vec<MemoryHit> {
        let terms = tokenize(query);
        if terms.is_empty() {
            return Vec::new();
        }

        let now = chrono::Utc::now().timestamp_millis();
        let mut hits: Vec<MemoryHit> = self
            .entries
            .read()
            .iter()
            .filter_map(|entry| {
                let score = score_entry(entry, &terms, now);
                (score > 0.0).then(|| MemoryHit {
                    entry: entry.clone(),
                    score,
                })
            })
            .collect();

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(limit);
        hits
    }

    pub fn list(&self) -> Vec<MemoryEntry> {
        self.entries.read().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn flush(&self, entries: &[MemoryEntry]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(Error::Io)?;
        }
        let json = serde_json::to_string_pretty(entries)?;
        std::fs::write(&self.path, json).map_err(Error::Io)?;
        Ok(())
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() >= 2)
        .map(|w| w.to_string())
        .collect()
}

/// Keyword score: term frequency in content plus weighted tag matches,
/// boosted by an exponentially decaying recency term.  Entries matching
/// no term score zero regardless of age.
fn score_entry(entry: &MemoryEntry, terms: &[String], now_ms: i64) -> f64 {
    let content_words = tokenize(&entry.content);
    let mut keyword_score = 0.0;

    for term in terms {
        let freq = content_words.iter().filter(|w| *w == term).count();
        keyword_score += freq as f64;
        if entry.tags.iter().any(|t| t.eq_ignore_ascii_case(term)) {
            keyword_score += TAG_WEIGHT;
        }
    }

    if keyword_score == 0.0 {
        return 0.0;
    }

    let age_days = ((now_ms - entry.created_at).max(0)) as f64 / 86_400_000.0;
    let recency = RECENCY_WEIGHT * 0.5f64.powf(age_days / RECENCY_HALF_LIFE_DAYS);
    keyword_score + recency
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, MemoryStore) {
        let tmp = tempfile::tempdir().unwrap();
        let store = MemoryStore::open(tmp.path().join("memory/index.json")).unwrap();
        (tmp, store)
    }

    #[test]
    fn save_and_reload() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("memory/index.json");

        let store = MemoryStore::open(&path).unwrap();
        store
            .save("user prefers tabs", MemorySource::User, vec!["style".into()])
            .unwrap();

        let reloaded = MemoryStore::open(&path).unwrap();
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.list()[0].content, "user prefers tabs");
        assert_eq!(reloaded.list()[0].source, MemorySource::User);
    }

    #[test]
    fn keyword_search_ranks_by_frequency() {
        let (_tmp, store) = store();
        store
            .save("rust rust rust everywhere", MemorySource::Agent, vec![])
            .unwrap();
        store.save("one mention of rust", MemorySource::Agent, vec![]).unwrap();
        store.save("nothing relevant", MemorySource::Agent, vec![]).unwrap();

        let hits = store.search("rust", 10);
        assert_eq!(hits.len(), 2);
        assert!(hits[0].entry.content.starts_with("rust rust"));
        assert!(hits[0].score > hits[1].score);
    }

    #[test]
    fn tags_boost_score() {
        let (_tmp, store) = store();
        store.save("a note", MemorySource::User, vec!["deploy".into()]).unwrap();
        store.save("deploy mentioned once", MemorySource::User, vec![]).unwrap();

        let hits = store.search("deploy", 10);
        assert_eq!(hits.len(), 2);
        // Tag weight (2.0) beats a single content occurrence (1.0).
        assert_eq!(hits[0].entry.tags, vec!["deploy"]);
    }

    #[test]
    fn recency_breaks_keyword_ties() {
        let (_tmp, store) = store();
        let old = store.save("topic note", MemorySource::Agent, vec![]).unwrap();
        store.save("topic note", MemorySource::Agent, vec![]).unwrap();

        // Backdate the first entry by 60 days.
        {
            let mut entries = store.entries.write();
            let e = entries.iter_mut().find(|e| e.id == old.id).unwrap();
            e.created_at -= 60 * 86_400_000;
        }

        let hits = store.search("topic", 10);
        assert_eq!(hits.len(), 2);
        assert_ne!(hits[0].entry.id, old.id);
    }

    #[test]
    fn no_match_returns_empty() {
        let (_tmp, store) = store();
        store.save("something", MemorySource::System, vec![]).unwrap();
        assert!(store.search("unrelated", 10).is_empty());
        assert!(store.search("", 10).is_empty());
    }

    #[test]
    fn limit_is_honored() {
        let (_tmp, store) = store();
        for i in 0..5 {
            store.save(format!("note {i} about cache"), MemorySource::Agent, vec![]).unwrap();
        }
        assert_eq!(store.search("cache", 3).len(), 3);
    }
}
