//! Cloud-init user-data loading.
//!
//! Cherry Servers expects user data base64 encoded in the create request. The
//! payload is read from a local file named by configuration.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use camino::Utf8Path;
use cap_std::{ambient_authority, fs_utf8::Dir};
use thiserror::Error;

use crate::util::expand_tilde;

/// Errors raised while resolving user data.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum UserDataError {
    /// Raised when the configured path is blank.
    #[error("user-data file path must not be empty")]
    FilePathEmpty,
    /// Raised when the file contains only whitespace.
    #[error("user-data file `{path}` must not be empty")]
    FileEmpty {
        /// Expanded path of the empty file.
        path: String,
    },
    /// Raised when reading the file fails.
    #[error("failed to read user-data file `{path}`: {message}")]
    FileRead {
        /// Expanded path that failed to read.
        path: String,
        /// Underlying error message.
        message: String,
    },
}

/// Reads the user-data file at `path` and returns its base64 encoding.
///
/// Returns `Ok(None)` when no path is configured.
///
/// # Errors
///
/// Returns [`UserDataError`] when the path is blank, the file cannot be read,
/// or the file is empty.
pub fn load_user_data(path: Option<&str>) -> Result<Option<String>, UserDataError> {
    let Some(raw_path) = path else {
        return Ok(None);
    };
    if raw_path.trim().is_empty() {
        return Err(UserDataError::FilePathEmpty);
    }

    let expanded = expand_tilde(raw_path.trim());
    let content = read_to_string_ambient(&expanded).map_err(|message| UserDataError::FileRead {
        path: expanded.clone(),
        message,
    })?;
    if content.trim().is_empty() {
        return Err(UserDataError::FileEmpty { path: expanded });
    }

    Ok(Some(STANDARD.encode(content.as_bytes())))
}

fn read_to_string_ambient(path: &str) -> Result<String, String> {
    let path_buf = Utf8Path::new(path);

    let (dir_path, file_path) = if path_buf.is_absolute() {
        let parent = path_buf
            .parent()
            .ok_or_else(|| format!("path has no parent directory: {path_buf}"))?;
        let file_name = path_buf
            .file_name()
            .ok_or_else(|| format!("path has no file name: {path_buf}"))?;
        (parent, Utf8Path::new(file_name))
    } else {
        (Utf8Path::new("."), path_buf)
    };

    let dir =
        Dir::open_ambient_dir(dir_path, ambient_authority()).map_err(|err| err.to_string())?;
    dir.read_to_string(file_path).map_err(|err| err.to_string())
}
