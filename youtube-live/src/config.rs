//! Loading OAuth client credentials from `.env`-style files.
//!
//! The format is small: one `key=value` per line, keys are case-insensitive,
//! lines starting with `#` and blank lines are skipped, and a line with no `=` sets its key
//! to the empty string. Only the first `=` splits, so values may contain `=`.
//!
//! ```text
//! # from the Google Cloud console
//! client_id=1234.apps.googleusercontent.com
//! client_secret=GOCSPX-...
//! refresh_token=1//0g...
//! additional_scopes=https://www.googleapis.com/auth/youtube.readonly
//! ```

use crate::error::{Error, Result};
use eyre::WrapErr;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// What is needed to talk to YouTube on a user's behalf.
///
/// Missing keys load as empty values; [`YouTubeLiveBuilder::build`](crate::YouTubeLiveBuilder::build)
/// decides which of them are required.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    /// Empty if the user has not signed in yet.
    pub refresh_token: String,
    pub additional_scopes: Vec<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("additional_scopes", &self.additional_scopes)
            .finish()
    }
}

impl Credentials {
    /// Reads credentials from a `.env`-style file such as `./.env`.
    pub fn from_env_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .wrap_err_with(|| format!("open credentials file {}", path.display()))?;
        Self::from_key_values(BufReader::new(file))
    }

    /// Reads credentials from `key=value` lines.
    pub fn from_key_values(reader: impl BufRead) -> Result<Self> {
        let mut values = read_key_values(reader)?;
        let mut take = |key: &str| values.remove(key).unwrap_or_default();

        let additional_scopes = take("additional_scopes")
            .split(',')
            .map(str::trim)
            .filter(|scope| !scope.is_empty())
            .map(String::from)
            .collect();

        Ok(Self {
            client_id: take("client_id"),
            client_secret: take("client_secret"),
            refresh_token: take("refresh_token"),
            additional_scopes,
        })
    }
}

/// Every key in `reader`, lower-cased, mapped to its trimmed value. Later lines win.
pub(crate) fn read_key_values(reader: impl BufRead) -> Result<HashMap<String, String>> {
    let mut values = HashMap::new();
    for (n, line) in reader.lines().enumerate() {
        let line = line
            .wrap_err_with(|| format!("read line {}", n + 1))
            .map_err(Error::Other)?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (key, value) = line.split_once('=').unwrap_or((line, ""));
        values.insert(key.trim().to_lowercase(), value.trim().to_string());
    }
    Ok(values)
}
