use std::collections::BTreeMap;
use std::io::Read;

use flate2::read::GzDecoder;
use repo_sync::{ContentUnit, DEFAULT_KIND, FetchError, UnitKey, UnitStream};
use serde::Deserialize;

/// Platform value that denotes a platform-independent gem.
const DEFAULT_PLATFORM: &str = "ruby";

/// One entry of a remote listing.
///
/// A listing is a JSON array of these. Fields other than the ones named
/// here are kept as unit attributes.
#[derive(Debug, Deserialize)]
struct ListingEntry {
    name: String,
    version: String,
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    platform: Option<String>,
    #[serde(flatten)]
    extra: BTreeMap<String, serde_json::Value>,
}

impl ListingEntry {
    fn into_unit(self) -> Result<ContentUnit, FetchError> {
        if self.name.trim().is_empty() {
            return Err(FetchError::Malformed("entry with empty name".into()));
        }
        if self.version.trim().is_empty() {
            return Err(FetchError::Malformed(format!(
                "entry '{}' has an empty version",
                self.name
            )));
        }

        let version = match self.platform.as_deref() {
            Some(platform) if !platform.is_empty() && platform != DEFAULT_PLATFORM => {
                format!("{}-{platform}", self.version)
            }
            _ => self.version,
        };
        let kind = self
            .kind
            .filter(|k| !k.is_empty())
            .unwrap_or_else(|| DEFAULT_KIND.to_owned());

        let attributes = self
            .extra
            .into_iter()
            .filter(|(_, value)| !value.is_null())
            .map(|(key, value)| match value {
                serde_json::Value::String(s) => (key, s),
                other => (key, other.to_string()),
            })
            .collect();

        Ok(ContentUnit::new(UnitKey::new(kind, self.name, version)).with_attributes(attributes))
    }
}

/// Whether a listing URL points at a gzip-compressed document.
pub fn is_gzip_url(url: &str) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.to_ascii_lowercase().ends_with(".gz")
}

fn gunzip(bytes: &[u8]) -> Result<Vec<u8>, FetchError> {
    let mut decoded = Vec::new();
    GzDecoder::new(bytes)
        .read_to_end(&mut decoded)
        .map_err(|e| FetchError::Malformed(format!("gzip decode failed: {e}")))?;
    Ok(decoded)
}

/// Decode a listing body into a lazy stream of units.
///
/// The document must be a JSON array; each element is converted as the
/// stream is polled, so a bad entry surfaces as an error item.
pub fn parse(body: &[u8], gzipped: bool) -> Result<UnitStream, FetchError> {
    let decoded;
    let body = if gzipped {
        decoded = gunzip(body)?;
        decoded.as_slice()
    } else {
        body
    };

    let entries: Vec<serde_json::Value> = serde_json::from_slice(body)
        .map_err(|e| FetchError::Malformed(format!("expected a JSON array of units: {e}")))?;

    let units = entries.into_iter().enumerate().map(|(index, value)| {
        serde_json::from_value::<ListingEntry>(value)
            .map_err(|e| FetchError::Malformed(format!("entry {index}: {e}")))
            .and_then(ListingEntry::into_unit)
    });

    Ok(Box::pin(futures::stream::iter(units)))
}
