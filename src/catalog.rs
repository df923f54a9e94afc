use crate::{
    storage::{BackendLocal, StorageManager},
    types::BookRequest,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// Keys a purchase link may be stored under, preferred first
const LINK_KEYS: [&str; 4] = ["purchaseLink", "link_acquisto", "purchase_link", "link"];

#[derive(thiserror::Error, Debug)]
pub enum CatalogError {
    #[error("failed to read catalog {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write catalog {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("catalog {path} is not a json array of objects: {source}")]
    Format {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// One catalog entry. Unknown keys survive a rewrite untouched and in order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BookRecord(Map<String, Value>);

impl BookRecord {
    pub fn new(title: &str, author: &str) -> Self {
        let mut fields = Map::new();
        fields.insert("title".to_string(), Value::String(title.to_string()));
        fields.insert("author".to_string(), Value::String(author.to_string()));
        Self(fields)
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn title(&self) -> &str {
        self.str_field("title").unwrap_or_default()
    }

    pub fn author(&self) -> &str {
        self.str_field("author").unwrap_or_default()
    }

    pub fn purchase_link(&self) -> Option<&str> {
        LINK_KEYS.iter().find_map(|key| self.str_field(key))
    }

    pub fn cover(&self) -> Option<&str> {
        self.str_field("cover")
    }

    pub fn set_cover(&mut self, cover: &str) {
        self.0
            .insert("cover".to_string(), Value::String(cover.to_string()));
    }

    pub fn with_field(mut self, key: &str, value: Value) -> Self {
        self.0.insert(key.to_string(), value);
        self
    }

    pub fn request(&self) -> BookRequest {
        let book = BookRequest::new(self.title(), self.author());
        match self.purchase_link() {
            Some(link) => book.with_link(link),
            None => book,
        }
    }
}

/// JSON array of book records, rewritten in place
#[derive(Debug, Clone)]
pub struct Catalog {
    path: PathBuf,
    pub records: Vec<BookRecord>,
}

impl Catalog {
    pub fn new(path: &Path, records: Vec<BookRecord>) -> Self {
        Self {
            path: path.to_path_buf(),
            records,
        }
    }

    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let data = std::fs::read(path).map_err(|source| CatalogError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let records: Vec<BookRecord> =
            serde_json::from_slice(&data).map_err(|source| CatalogError::Format {
                path: path.to_path_buf(),
                source,
            })?;

        Ok(Self::new(path, records))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory holding the catalog, base for relative asset paths
    pub fn dir(&self) -> PathBuf {
        self.path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let mut json = serde_json::to_string_pretty(&self.records)?;
        json.push('\n');
        Ok(json)
    }

    /// Pretty-printed, written through a temp file and renamed into place
    pub fn save(&self) -> Result<(), CatalogError> {
        let write_err = |source| CatalogError::Write {
            path: self.path.clone(),
            source,
        };

        let json = self.to_json().map_err(|source| CatalogError::Format {
            path: self.path.clone(),
            source,
        })?;

        let file_name = self
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                write_err(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "catalog path has no file name",
                ))
            })?;

        let backend = BackendLocal::new(&self.dir()).map_err(write_err)?;
        backend.write(file_name, json.as_bytes()).map_err(write_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_accessors() {
        let record: BookRecord = serde_json::from_value(json!({
            "id": 7,
            "title": " Il nome della rosa ",
            "author": "Umberto Eco",
            "link_acquisto": "https://www.ibs.it/nome-della-rosa",
            "genre": "giallo"
        }))
        .unwrap();

        assert_eq!(record.title(), "Il nome della rosa");
        assert_eq!(record.purchase_link(), Some("https://www.ibs.it/nome-della-rosa"));
        assert_eq!(record.cover(), None);

        let request = record.request();
        assert_eq!(request.title, "Il nome della rosa");
        assert_eq!(request.purchase_link.as_deref(), Some("https://www.ibs.it/nome-della-rosa"));
    }

    #[test]
    fn test_link_key_preference() {
        let record: BookRecord = serde_json::from_value(json!({
            "title": "a",
            "author": "b",
            "link": "https://other.test",
            "purchaseLink": "https://www.amazon.it/dp/1"
        }))
        .unwrap();
        assert_eq!(record.purchase_link(), Some("https://www.amazon.it/dp/1"));
    }

    #[test]
    fn test_missing_fields_are_empty() {
        let record: BookRecord = serde_json::from_value(json!({"title": null})).unwrap();
        assert_eq!(record.title(), "");
        assert_eq!(record.author(), "");
        assert_eq!(record.purchase_link(), None);
    }

    #[test]
    fn test_save_preserves_unknown_keys_and_order() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("libri.json");
        std::fs::write(
            &path,
            r#"[{"id": 1, "title": "Città di vetro", "author": "Paul Auster", "zeta": true, "alpha": [1, 2]}]"#,
        )
        .unwrap();

        let mut catalog = Catalog::load(&path).unwrap();
        catalog.records[0].set_cover("data/book_covers/1.jpg");
        catalog.save().unwrap();

        let saved = std::fs::read_to_string(&path).unwrap();
        assert!(saved.contains("Città di vetro"), "non-ascii must not be escaped");

        let keys = Catalog::load(&path).unwrap().records[0]
            .0
            .keys()
            .cloned()
            .collect::<Vec<_>>();
        assert_eq!(keys, vec!["id", "title", "author", "zeta", "alpha", "cover"]);
    }

    #[test]
    fn test_load_rejects_non_array() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("bad.json");
        std::fs::write(&path, r#"{"title": "x"}"#).unwrap();

        assert!(matches!(Catalog::load(&path), Err(CatalogError::Format { .. })));
        assert!(matches!(
            Catalog::load(&tmp.path().join("missing.json")),
            Err(CatalogError::Read { .. })
        ));
    }
}
