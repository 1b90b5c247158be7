use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::path::Path;

use crate::config::config;
use crate::http::error::{HttpError, Result};
use crate::http::stream::Stream;

/// Upload status codes as reported by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadError {
    Ok = 0,
    IniSize = 1,
    FormSize = 2,
    Partial = 3,
    NoFile = 4,
    NoTmpDir = 6,
    CantWrite = 7,
    Extension = 8,
}

impl UploadError {
    pub fn from_code(code: i32) -> Result<Self> {
        match code {
            0 => Ok(UploadError::Ok),
            1 => Ok(UploadError::IniSize),
            2 => Ok(UploadError::FormSize),
            3 => Ok(UploadError::Partial),
            4 => Ok(UploadError::NoFile),
            6 => Ok(UploadError::NoTmpDir),
            7 => Ok(UploadError::CantWrite),
            8 => Ok(UploadError::Extension),
            _ => Err(HttpError::invalid(format!(
                "invalid error status {code} for uploaded file"
            ))),
        }
    }

    pub fn code(&self) -> i32 {
        *self as i32
    }
}

/// A file received with the request.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    stream: Option<Stream>,
    size: Option<u64>,
    error: UploadError,
    client_filename: Option<String>,
    client_media_type: Option<String>,
    moved: bool,
}

/// Uploaded files keyed by form field, nested for array-style fields.
pub type UploadedFiles = IndexMap<String, UploadedFileNode>;

#[derive(Debug, Clone)]
pub enum UploadedFileNode {
    File(UploadedFile),
    Nested(UploadedFiles),
}

impl UploadedFile {
    /// The stream is dropped when `error` is not [`UploadError::Ok`].
    pub fn from_stream(
        stream: Stream,
        size: Option<u64>,
        error: UploadError,
        client_filename: Option<&str>,
        client_media_type: Option<&str>,
    ) -> Self {
        Self {
            stream: (error == UploadError::Ok).then_some(stream),
            size,
            error,
            client_filename: client_filename.map(str::to_string),
            client_media_type: client_media_type.map(str::to_string),
            moved: false,
        }
    }

    /// Opens the temporary file read-only; nothing is opened on an upload error.
    pub fn from_path(
        path: impl AsRef<Path>,
        size: Option<u64>,
        error: UploadError,
        client_filename: Option<&str>,
        client_media_type: Option<&str>,
    ) -> Result<Self> {
        let stream = match error {
            UploadError::Ok => Some(Stream::open(path, "rb")?),
            _ => None,
        };

        Ok(Self {
            stream,
            size,
            error,
            client_filename: client_filename.map(str::to_string),
            client_media_type: client_media_type.map(str::to_string),
            moved: false,
        })
    }

    pub fn stream(&self) -> Result<&Stream> {
        self.validate_active()?;
        self.stream
            .as_ref()
            .ok_or_else(|| HttpError::runtime("uploaded file has no stream"))
    }

    /// Copies the upload to `target` and releases the source.
    ///
    /// Only one move is allowed, and none when the upload failed.
    pub fn move_to(&mut self, target: impl AsRef<Path>) -> Result<()> {
        self.validate_active()?;
        let target = target.as_ref();
        if target.as_os_str().is_empty() {
            return Err(HttpError::invalid(
                "invalid path provided for move operation; must be a non-empty path",
            ));
        }

        let Some(source) = self.stream.as_mut() else {
            return Err(HttpError::runtime("uploaded file has no stream"));
        };
        let mut dest = Stream::open(target, "w+b")?;

        if source.is_seekable() {
            source.rewind()?;
        }
        let chunk = config().upload_buffer_size.max(1);
        while !source.eof() {
            let buf = source.read(chunk)?;
            if buf.is_empty() {
                break;
            }
            dest.write(&buf)?;
        }

        self.moved = true;
        self.stream = None;
        tracing::debug!(target = %target.display(), "Uploaded file moved");
        Ok(())
    }

    pub fn has_moved(&self) -> bool {
        self.moved
    }

    pub fn size(&self) -> Option<u64> {
        self.size
    }

    pub fn error(&self) -> UploadError {
        self.error
    }

    pub fn client_filename(&self) -> Option<&str> {
        self.client_filename.as_deref()
    }

    pub fn client_media_type(&self) -> Option<&str> {
        self.client_media_type.as_deref()
    }

    fn validate_active(&self) -> Result<()> {
        if self.error != UploadError::Ok {
            return Err(HttpError::runtime("cannot retrieve stream due to upload error"));
        }
        if self.moved {
            return Err(HttpError::runtime(
                "cannot retrieve stream after it has already been moved",
            ));
        }
        Ok(())
    }
}

/// Builds the upload tree from a gateway file description.
///
/// Each field is `{"tmp_name", "size", "error", "name", "type"}`. Nested
/// fields come either as nested objects or, for `files[]` style fields, as
/// one description whose members are all arrays (or objects) indexed the
/// same way.
pub fn normalize_files(files: &Map<String, Value>) -> Result<UploadedFiles> {
    let mut normalized = UploadedFiles::new();

    for (key, value) in files {
        let node = match value {
            Value::Object(desc) if desc.contains_key("tmp_name") => file_from_description(desc)?,
            Value::Object(nested) => UploadedFileNode::Nested(normalize_files(nested)?),
            _ => return Err(HttpError::invalid("invalid value in file description")),
        };
        normalized.insert(key.clone(), node);
    }

    Ok(normalized)
}

const DESCRIPTION_FIELDS: [&str; 5] = ["tmp_name", "size", "error", "name", "type"];

fn file_from_description(desc: &Map<String, Value>) -> Result<UploadedFileNode> {
    if let Some(keys) = desc.get("tmp_name").and_then(indexed_keys) {
        let mut nested = UploadedFiles::new();
        for key in keys {
            let entry: Map<String, Value> = DESCRIPTION_FIELDS
                .iter()
                .filter_map(|field| {
                    let value = indexed(desc.get(*field)?, &key)?;
                    Some((field.to_string(), value.clone()))
                })
                .collect();
            nested.insert(key, file_from_description(&entry)?);
        }
        return Ok(UploadedFileNode::Nested(nested));
    }

    let tmp_name = desc.get("tmp_name").and_then(Value::as_str).unwrap_or_default();
    let size = desc.get("size").and_then(|size| match size {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    });
    let error = match desc.get("error") {
        Some(Value::Number(n)) => n.as_i64().unwrap_or(-1),
        Some(Value::String(s)) => s.parse().unwrap_or(-1),
        _ => 0,
    };
    let error = i32::try_from(error)
        .map_err(|_| HttpError::invalid(format!("invalid error status {error} for uploaded file")))
        .and_then(UploadError::from_code)?;

    let file = UploadedFile::from_path(
        tmp_name,
        size,
        error,
        desc.get("name").and_then(Value::as_str),
        desc.get("type").and_then(Value::as_str),
    )?;
    Ok(UploadedFileNode::File(file))
}

fn indexed_keys(value: &Value) -> Option<Vec<String>> {
    match value {
        Value::Array(items) => Some((0..items.len()).map(|i| i.to_string()).collect()),
        Value::Object(map) => Some(map.keys().cloned().collect()),
        _ => None,
    }
}

fn indexed<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    match value {
        Value::Array(items) => items.get(key.parse::<usize>().ok()?),
        Value::Object(map) => map.get(key),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes() {
        assert_eq!(UploadError::from_code(0).unwrap(), UploadError::Ok);
        assert_eq!(UploadError::from_code(8).unwrap().code(), 8);
        assert!(UploadError::from_code(5).unwrap_err().is_invalid_argument());
        assert!(UploadError::from_code(-1).is_err());
    }

    #[test]
    fn move_copies_once() {
        let target = std::env::temp_dir().join(format!("httpmsg-upload-{}", std::process::id()));
        let mut file = UploadedFile::from_stream(
            Stream::memory("file body"),
            Some(9),
            UploadError::Ok,
            Some("notes.txt"),
            Some("text/plain"),
        );

        assert_eq!(file.client_filename(), Some("notes.txt"));
        assert_eq!(file.client_media_type(), Some("text/plain"));
        assert_eq!(file.stream().unwrap().snapshot().unwrap(), b"file body");

        file.move_to(&target).unwrap();
        assert!(file.has_moved());
        assert_eq!(std::fs::read(&target).unwrap(), b"file body");

        assert!(file.move_to(&target).unwrap_err().is_runtime());
        assert!(file.stream().unwrap_err().is_runtime());

        std::fs::remove_file(&target).unwrap();
    }

    #[test]
    fn failed_upload_has_no_stream() {
        let mut file = UploadedFile::from_stream(
            Stream::memory("partial"),
            None,
            UploadError::Partial,
            None,
            None,
        );
        assert_eq!(file.error(), UploadError::Partial);
        assert!(file.stream().unwrap_err().is_runtime());
        assert!(file.move_to("/tmp/never").unwrap_err().is_runtime());
    }

    #[test]
    fn empty_target_is_rejected() {
        let mut file =
            UploadedFile::from_stream(Stream::memory("x"), Some(1), UploadError::Ok, None, None);
        assert!(file.move_to("").unwrap_err().is_invalid_argument());
        assert!(!file.has_moved());
    }

    #[test]
    fn from_path_skips_open_on_error() {
        let file = UploadedFile::from_path(
            "/nonexistent/upload",
            None,
            UploadError::NoFile,
            None,
            None,
        )
        .unwrap();
        assert!(file.stream().is_err());
        assert!(
            UploadedFile::from_path("/nonexistent/upload", None, UploadError::Ok, None, None)
                .is_err()
        );
    }

    #[test]
    fn normalize_gateway_description() {
        let tmp = std::env::temp_dir().join(format!("httpmsg-normalize-{}", std::process::id()));
        std::fs::write(&tmp, b"avatar").unwrap();
        let tmp = tmp.to_string_lossy().to_string();

        let desc = serde_json::json!({
            "avatar": {"tmp_name": tmp, "size": 6, "error": 0, "name": "a.png", "type": "image/png"},
            "docs": {
                "tmp_name": ["", tmp],
                "size": [0, "6"],
                "error": [4, 0],
                "name": ["", "b.txt"],
                "type": ["", "text/plain"]
            },
            "nested": {"inner": {"tmp_name": "", "error": 4}}
        });
        let Value::Object(desc) = desc else { unreachable!() };
        let files = normalize_files(&desc).unwrap();

        let UploadedFileNode::File(avatar) = &files["avatar"] else { panic!("avatar") };
        assert_eq!(avatar.client_media_type(), Some("image/png"));
        assert_eq!(avatar.stream().unwrap().snapshot().unwrap(), b"avatar");

        let UploadedFileNode::Nested(docs) = &files["docs"] else { panic!("docs") };
        let UploadedFileNode::File(missing) = &docs["0"] else { panic!("docs[0]") };
        assert_eq!(missing.error(), UploadError::NoFile);
        let UploadedFileNode::File(second) = &docs["1"] else { panic!("docs[1]") };
        assert_eq!(second.size(), Some(6));
        assert_eq!(second.client_filename(), Some("b.txt"));

        let UploadedFileNode::Nested(nested) = &files["nested"] else { panic!("nested") };
        assert!(matches!(&nested["inner"], UploadedFileNode::File(f) if f.error() == UploadError::NoFile));

        std::fs::remove_file(&tmp).unwrap();
    }

    #[test]
    fn normalize_rejects_scalars() {
        let desc = serde_json::json!({"avatar": "not a file"});
        let Value::Object(desc) = desc else { unreachable!() };
        assert!(normalize_files(&desc).unwrap_err().is_invalid_argument());
    }
}
