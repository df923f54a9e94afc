use crate::types::BookKey;
use std::{
    io::Write,
    path::{Path, PathBuf},
};

const MAX_FILENAME_CHARS: usize = 80;

/// Every extension a stored cover can get; `find_existing` checks each one
pub const ASSET_EXTENSIONS: [&str; 8] = ["jpg", "png", "webp", "gif", "bmp", "avif", "tif", "ico"];

pub trait StorageManager: Send + Sync {
    fn write(&self, ident: &str, data: &[u8]) -> std::io::Result<()>;
    fn read(&self, ident: &str) -> std::io::Result<Vec<u8>>;
    fn exists(&self, ident: &str) -> bool;
}

#[derive(Clone, Debug)]
pub struct BackendLocal {
    pub base_dir: PathBuf,
}

impl BackendLocal {
    pub fn new(storage_dir: &Path) -> std::io::Result<Self> {
        std::fs::create_dir_all(storage_dir)?;
        Ok(BackendLocal {
            base_dir: storage_dir.to_path_buf(),
        })
    }

    fn path(&self, ident: &str) -> PathBuf {
        self.base_dir.join(ident)
    }
}

impl StorageManager for BackendLocal {
    fn exists(&self, ident: &str) -> bool {
        self.path(ident).is_file()
    }

    fn read(&self, ident: &str) -> std::io::Result<Vec<u8>> {
        std::fs::read(self.path(ident))
    }

    /// Temp file in the same directory, then rename. Readers never see
    /// a partial file.
    fn write(&self, ident: &str, data: &[u8]) -> std::io::Result<()> {
        let mut temp = tempfile::NamedTempFile::new_in(&self.base_dir)?;
        temp.write_all(data)?;
        temp.flush()?;
        temp.persist(self.path(ident)).map_err(|e| e.error)?;
        Ok(())
    }
}

/// Keeps alphanumerics, `-` and `_`; whitespace becomes `_`.
pub fn sanitize_filename(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        if ch.is_alphanumeric() || ch == '-' {
            out.push(ch);
        } else if ch == '_' || ch.is_whitespace() {
            if !out.ends_with('_') {
                out.push('_');
            }
        }
    }

    let out = out
        .trim_matches('_')
        .chars()
        .take(MAX_FILENAME_CHARS)
        .collect::<String>();
    let out = out.trim_end_matches('_');

    if out.is_empty() {
        "unknown".to_string()
    } else {
        out.to_string()
    }
}

/// Maps an extension onto [`ASSET_EXTENSIONS`]
fn known_extension(ext: &str) -> Option<&'static str> {
    let ext = match ext.to_ascii_lowercase().as_str() {
        "jpeg" | "jpe" => "jpg".to_string(),
        "tiff" => "tif".to_string(),
        other => other.to_string(),
    };
    ASSET_EXTENSIONS.into_iter().find(|known| *known == ext)
}

pub fn extension_from_content_type(content_type: &str) -> Option<&'static str> {
    let media = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    match media.as_str() {
        "image/jpeg" | "image/jpg" | "image/pjpeg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/gif" => Some("gif"),
        "image/bmp" => Some("bmp"),
        "image/avif" => Some("avif"),
        "image/tiff" => Some("tif"),
        "image/x-icon" | "image/vnd.microsoft.icon" => Some("ico"),
        _ => None,
    }
}

pub fn guess_filetype(url: &str) -> Option<&'static str> {
    let path = url
        .split(['?', '#'])
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();

    let (_, ext) = path.rsplit_once('/')?.1.rsplit_once('.')?;
    known_extension(ext)
}

/// Content type, then sniffed bytes, then url suffix, then `jpg`.
/// Always one of [`ASSET_EXTENSIONS`].
pub fn asset_extension(content_type: Option<&str>, bytes: &[u8], url: &str) -> &'static str {
    content_type
        .and_then(extension_from_content_type)
        .or_else(|| {
            infer::get(bytes)
                .filter(|t| t.matcher_type() == infer::MatcherType::Image)
                .and_then(|t| known_extension(t.extension()))
        })
        .or_else(|| guess_filetype(url))
        .unwrap_or("jpg")
}

/// Downloaded covers, one file per book key
#[derive(Clone, Debug)]
pub struct AssetStore {
    backend: BackendLocal,
}

impl AssetStore {
    pub fn new(dir: &Path) -> std::io::Result<Self> {
        Ok(Self {
            backend: BackendLocal::new(dir)?,
        })
    }

    /// File name of an existing asset for `key`, if any
    pub fn find_existing(&self, key: &BookKey) -> Option<String> {
        let stem = key.file_stem();
        ASSET_EXTENSIONS
            .iter()
            .map(|ext| format!("{stem}.{ext}"))
            .find(|name| self.backend.exists(name))
    }

    /// Writes the asset and returns its file name
    pub fn store(
        &self,
        key: &BookKey,
        bytes: &[u8],
        content_type: Option<&str>,
        url: &str,
    ) -> std::io::Result<String> {
        let name = format!(
            "{}.{}",
            key.file_stem(),
            asset_extension(content_type, bytes, url)
        );
        self.backend.write(&name, bytes)?;
        Ok(name)
    }
}
