//! Source position mapping.
//!
//! Stack positions inside diagnostics arrive in bundled-output coordinates;
//! this module translates them back to original source coordinates using
//! the bundle's source map, loaded either from an inline `data:` URL or a
//! sibling `.map` file. Tables are cached per normalized bundle URL.
//!
//! A stale table silently produces wrong line numbers, which is worse than
//! a cache miss, so the cache is never refreshed implicitly: after a
//! rebuild of a bundle the caller must call [`SourceMapper::invalidate`]
//! exactly once for that URL.

use std::collections::HashMap;
use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};

/// Fetches text content for a URL (the bundle itself or its `.map`
/// sibling). Injected so tests and non-HTTP hosts can supply content
/// deterministically.
pub trait MapFetcher: Send + Sync {
    /// Returns the text behind `url`.
    fn fetch(&self, url: &str) -> BoxFuture<'static, Result<String>>;
}

/// An original-source position. `line` and `column` are 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedPosition {
    /// Original source path.
    pub source: String,
    /// 1-based original line.
    pub line: u32,
    /// 1-based original column.
    pub column: u32,
    /// Original identifier at the position, when the map records one.
    pub name: Option<String>,
}

#[derive(Deserialize)]
struct RawSourceMap {
    #[serde(default)]
    sources: Vec<String>,
    #[serde(default)]
    names: Vec<String>,
    mappings: String,
    #[serde(rename = "sourceRoot", default)]
    source_root: Option<String>,
}

/// One decoded mapping segment within a generated line.
#[derive(Debug, Clone, Copy)]
struct Segment {
    generated_column: u32,
    source_index: u32,
    source_line: u32,
    source_column: u32,
    name_index: Option<u32>,
}

/// A decoded position-mapping table for one bundle.
struct SourceMap {
    sources: Vec<String>,
    names: Vec<String>,
    // Segments per generated line, sorted by generated column.
    lines: Vec<Vec<Segment>>,
}

const BASE64_ALPHABET: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

fn base64_digit(byte: u8) -> Result<i64> {
    BASE64_ALPHABET
        .iter()
        .position(|&b| b == byte)
        .map(|i| i as i64)
        .ok_or_else(|| Error::SourceMap(format!("invalid VLQ digit '{}'", byte as char)))
}

/// Decodes one base64 VLQ value, advancing `index`.
fn decode_vlq(bytes: &[u8], index: &mut usize) -> Result<i64> {
    let mut result: i64 = 0;
    let mut shift = 0u32;
    loop {
        let Some(&byte) = bytes.get(*index) else {
            return Err(Error::SourceMap("truncated VLQ sequence".into()));
        };
        *index += 1;
        let digit = base64_digit(byte)?;
        // Valid source map fields fit in 32 bits; a longer continuation run
        // is corrupt input, not a bigger number.
        if shift > 30 {
            return Err(Error::SourceMap("VLQ sequence exceeds 32 bits".into()));
        }
        result += (digit & 0x1f) << shift;
        if digit & 0x20 == 0 {
            break;
        }
        shift += 5;
    }
    let negative = result & 1 == 1;
    result >>= 1;
    Ok(if negative { -result } else { result })
}

impl SourceMap {
    fn decode(raw: RawSourceMap) -> Result<Self> {
        let mut lines = Vec::new();
        // Field values are deltas against the previous segment; source
        // fields carry over across line boundaries, generated column
        // resets per line.
        let mut source_index: i64 = 0;
        let mut source_line: i64 = 0;
        let mut source_column: i64 = 0;
        let mut name_index: i64 = 0;

        for line in raw.mappings.split(';') {
            let mut segments = Vec::new();
            let mut generated_column: i64 = 0;
            for group in line.split(',') {
                if group.is_empty() {
                    continue;
                }
                let bytes = group.as_bytes();
                let mut index = 0;
                generated_column += decode_vlq(bytes, &mut index)?;
                if index >= bytes.len() {
                    // 1-field segment: generated position with no source.
                    continue;
                }
                source_index += decode_vlq(bytes, &mut index)?;
                source_line += decode_vlq(bytes, &mut index)?;
                source_column += decode_vlq(bytes, &mut index)?;
                let name = if index < bytes.len() {
                    name_index += decode_vlq(bytes, &mut index)?;
                    Some(name_index as u32)
                } else {
                    None
                };
                segments.push(Segment {
                    generated_column: generated_column as u32,
                    source_index: source_index as u32,
                    source_line: source_line as u32,
                    source_column: source_column as u32,
                    name_index: name,
                });
            }
            segments.sort_by_key(|s| s.generated_column);
            lines.push(segments);
        }

        let source_root = raw.source_root.unwrap_or_default();
        let sources = raw
            .sources
            .into_iter()
            .map(|s| {
                if source_root.is_empty() {
                    s
                } else {
                    format!("{}/{}", source_root.trim_end_matches('/'), s)
                }
            })
            .collect();

        Ok(Self {
            sources,
            names: raw.names,
            lines,
        })
    }

    /// Greatest segment at or before `column` on the given generated line;
    /// both inputs 0-based.
    fn lookup(&self, line: usize, column: u32) -> Option<&Segment> {
        let segments = self.lines.get(line)?;
        segments
            .iter()
            .take_while(|s| s.generated_column <= column)
            .last()
            .or_else(|| segments.first())
    }
}

/// Strips query and fragment so rebuild cache-busters do not fragment the
/// cache key space.
fn normalize_url(url: &str) -> String {
    let end = url
        .find(['?', '#'])
        .unwrap_or(url.len());
    url[..end].to_string()
}

/// Resolves the `sourceMappingURL` comment of a bundle, if present.
fn source_mapping_url(bundle: &str) -> Option<&str> {
    bundle
        .lines()
        .rev()
        .find_map(|line| line.trim().strip_prefix("//# sourceMappingURL="))
        .map(str::trim)
}

/// Joins a relative map reference against its bundle's URL.
fn resolve_sibling(bundled_url: &str, reference: &str) -> String {
    if reference.contains("://") || reference.starts_with('/') {
        return reference.to_string();
    }
    match bundled_url.rfind('/') {
        Some(slash) => format!("{}/{}", &bundled_url[..slash], reference),
        None => reference.to_string(),
    }
}

/// Maps bundled stack positions back to original source positions.
pub struct SourceMapper {
    fetcher: Arc<dyn MapFetcher>,
    cache: Mutex<HashMap<String, Arc<SourceMap>>>,
}

impl SourceMapper {
    /// Creates a mapper around an injected fetcher.
    pub fn new(fetcher: Arc<dyn MapFetcher>) -> Self {
        Self {
            fetcher,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Drops the cached table for a bundle. Must be called exactly once
    /// after each rebuild of that bundle's content.
    pub fn invalidate(&self, bundled_url: &str) {
        let key = normalize_url(bundled_url);
        if self.cache.lock().remove(&key).is_some() {
            debug!(url = %key, "invalidated source map");
        }
    }

    /// Drops every cached table.
    pub fn clear(&self) {
        self.cache.lock().clear();
    }

    /// Translates a bundled position (`line` and `column` 1-based) to the
    /// original source position.
    pub async fn map_position(
        &self,
        bundled_url: &str,
        line: u32,
        column: u32,
    ) -> Result<MappedPosition> {
        if line == 0 || column == 0 {
            return Err(Error::SourceMap(format!(
                "positions are 1-based, got {line}:{column}"
            )));
        }
        let map = self.load(bundled_url).await?;

        let segment = map
            .lookup(line as usize - 1, column - 1)
            .ok_or_else(|| {
                Error::SourceMap(format!(
                    "no mapping for {bundled_url}:{line}:{column}"
                ))
            })?;
        let source = map
            .sources
            .get(segment.source_index as usize)
            .cloned()
            .ok_or_else(|| {
                Error::SourceMap(format!(
                    "mapping references missing source index {}",
                    segment.source_index
                ))
            })?;
        let name = segment
            .name_index
            .and_then(|i| map.names.get(i as usize).cloned());

        Ok(MappedPosition {
            source,
            line: segment.source_line + 1,
            column: segment.source_column + 1,
            name,
        })
    }

    async fn load(&self, bundled_url: &str) -> Result<Arc<SourceMap>> {
        let key = normalize_url(bundled_url);
        if let Some(map) = self.cache.lock().get(&key).cloned() {
            return Ok(map);
        }

        // Fetch under the normalized key too, so rebuild cache busters in
        // the query string do not defeat the cache or the sibling lookup.
        let bundle = self.fetcher.fetch(&key).await?;
        let reference = source_mapping_url(&bundle).ok_or_else(|| {
            Error::SourceMap(format!("{bundled_url} carries no sourceMappingURL"))
        })?;

        let raw_json = if let Some(data) = reference.strip_prefix("data:") {
            let payload = data.split_once("base64,").map(|(_, p)| p).ok_or_else(|| {
                Error::SourceMap("inline source map is not base64-encoded".into())
            })?;
            let decoded = BASE64
                .decode(payload)
                .map_err(|e| Error::SourceMap(format!("invalid inline source map: {e}")))?;
            String::from_utf8(decoded)
                .map_err(|e| Error::SourceMap(format!("inline source map is not UTF-8: {e}")))?
        } else {
            let sibling = resolve_sibling(&key, reference);
            self.fetcher.fetch(&sibling).await?
        };

        let raw: RawSourceMap = serde_json::from_str(&raw_json)
            .map_err(|e| Error::SourceMap(format!("unparsable source map: {e}")))?;
        let map = Arc::new(SourceMap::decode(raw)?);
        self.cache.lock().insert(key, Arc::clone(&map));
        Ok(map)
    }
}
