//! Static content the trainer schedules over.
//!
//! Only identifiers, categories and ordering matter here; every other field
//! of the content files is ignored.

use crate::error::CatalogError;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Phrase {
    pub id: String,
    #[serde(default)]
    pub category: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Category {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub order: i64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Recitation {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub order: i64,
    #[serde(default)]
    pub chunks: Vec<Chunk>,
}

impl Recitation {
    pub fn chunk_ids(&self) -> impl Iterator<Item = &str> {
        self.chunks.iter().map(|c| c.id.as_str())
    }

    pub fn has_chunk(&self, chunk_id: &str) -> bool {
        self.chunks.iter().any(|c| c.id == chunk_id)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Chunk {
    pub id: String,
}

#[derive(Debug, Deserialize)]
struct PrayerFile {
    #[serde(default)]
    recitations: Vec<Recitation>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalog {
    /// Phrases in catalog order; new items are introduced in this order.
    pub phrases: Vec<Phrase>,
    /// Categories sorted by `order`.
    pub categories: Vec<Category>,
    /// Recitations sorted by `order`.
    pub recitations: Vec<Recitation>,
}

impl Catalog {
    pub fn new(phrases: Vec<Phrase>, mut categories: Vec<Category>, mut recitations: Vec<Recitation>) -> Self {
        categories.sort_by_key(|c| c.order);
        recitations.sort_by_key(|r| r.order);
        Self {
            phrases,
            categories,
            recitations,
        }
    }

    /// Load `phrases.json`, `categories.json` and `prayer.json` from `dir`.
    ///
    /// Only `phrases.json` is required.
    pub fn load_dir(dir: &Path) -> Result<Self, CatalogError> {
        let phrases: Vec<Phrase> = read_json(&dir.join("phrases.json"))?;
        let categories: Vec<Category> = read_optional(&dir.join("categories.json"))?.unwrap_or_default();
        let recitations = read_optional::<PrayerFile>(&dir.join("prayer.json"))?
            .map(|p| p.recitations)
            .unwrap_or_default();
        Ok(Self::new(phrases, categories, recitations))
    }

    pub fn phrase_ids(&self) -> Vec<&str> {
        self.phrases.iter().map(|p| p.id.as_str()).collect()
    }

    pub fn has_phrase(&self, id: &str) -> bool {
        self.phrases.iter().any(|p| p.id == id)
    }

    pub fn recitation(&self, id: &str) -> Option<&Recitation> {
        self.recitations.iter().find(|r| r.id == id)
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, CatalogError> {
    let content = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| CatalogError::Json {
        path: path.display().to_string(),
        source,
    })
}

fn read_optional<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, CatalogError> {
    if !path.exists() {
        return Ok(None);
    }
    read_json(path).map(Some)
}
