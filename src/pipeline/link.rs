//! Link canonicalisation and identifier derivation.
//!
//! Catalog entries point at a preview image (`…/cards/design-p.jpg`); the
//! bundle that belongs to it lives next to it under the same stem with the
//! bundle extension (`…/cards/design.CRDesign`). This module rewrites one into
//! the other and derives the names used for the working folder and the
//! published output. Nothing here touches the network or the disk.

use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::sync::{BundleRequest, CallerId};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Url;
use tracing::debug;

/// Preview-suffix marker right before the extension (`name-p.jpg`).
static PREVIEW_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"-p(\.\w+)$").unwrap());

/// Trailing extension of the last path segment.
static EXTENSION: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.\w+$").unwrap());

/// Longest folder name kept after sanitisation.
const MAX_FOLDER_NAME_CHARS: usize = 20;

/// Folder name used when nothing usable survives sanitisation.
const FALLBACK_FOLDER_NAME: &str = "design";

/// Rewrite a catalog link into the canonical bundle URL.
///
/// 1. A legacy host prefix is replaced by the canonical host.
/// 2. A `-p` right before the extension is removed.
/// 3. The extension is replaced by the bundle extension.
///
/// A link already pointing at a bundle is returned unchanged.
pub fn canonicalize_link(link: &str, config: &SyncConfig) -> Result<Url, SyncError> {
    let link = link.trim();
    let rewritten = rewrite_legacy_host(link, config);

    let mut url = Url::parse(&rewritten).map_err(|e| SyncError::InvalidLink {
        link: link.to_string(),
        reason: e.to_string(),
    })?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(SyncError::InvalidLink {
            link: link.to_string(),
            reason: format!("unsupported scheme '{}'", url.scheme()),
        });
    }

    let path = url.path().to_string();
    let (dir, file) = match path.rfind('/') {
        Some(idx) => path.split_at(idx + 1),
        None => ("/", path.as_str()),
    };
    if file.is_empty() {
        return Err(SyncError::InvalidLink {
            link: link.to_string(),
            reason: "link does not name a file".into(),
        });
    }

    let bundle_suffix = format!(".{}", config.bundle_extension);
    let stem = if file.ends_with(&bundle_suffix) {
        file[..file.len() - bundle_suffix.len()].to_string()
    } else {
        let without_marker = PREVIEW_SUFFIX.replace(file, "$1");
        EXTENSION.replace(&without_marker, "").into_owned()
    };

    url.set_path(&format!("{dir}{stem}{bundle_suffix}"));
    debug!("Canonicalised link {} → {}", link, url);
    Ok(url)
}

fn rewrite_legacy_host(link: &str, config: &SyncConfig) -> String {
    for legacy in &config.legacy_hosts {
        if legacy.is_empty() {
            continue;
        }
        if let Some(rest) = link.strip_prefix(legacy.as_str()) {
            if rest.is_empty() || rest.starts_with('/') {
                return format!("{}{}", config.canonical_host, rest);
            }
        }
    }
    link.to_string()
}

/// File name of the bundle: the last path segment of the canonical URL.
pub fn derived_file_name(url: &Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back().map(str::to_string))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| format!("{FALLBACK_FOLDER_NAME}.bundle"))
}

/// Name of the working folder and of the published output for a request.
///
/// Preference order: image number, caller id, then the last four characters
/// of the bundle file stem. A zero image number or numeric id counts as unset.
pub fn folder_name(request: &BundleRequest, file_name: &str) -> String {
    if let Some(img_no) = request.img_no.filter(|n| *n != 0) {
        return sanitize_name(&img_no.to_string());
    }
    let id = request
        .id
        .as_ref()
        .filter(|id| !matches!(id, CallerId::Number(0)))
        .map(CallerId::to_string);
    if let Some(id) = id.filter(|id| !id.is_empty()) {
        return sanitize_name(&id);
    }
    let stem = file_name
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(file_name);
    let chars: Vec<char> = stem.chars().collect();
    let tail: String = chars[chars.len().saturating_sub(4)..].iter().collect();
    sanitize_name(&tail)
}

/// Keep `[A-Za-z0-9_-]`, then the last 20 characters; `design` if empty.
pub fn sanitize_name(raw: &str) -> String {
    let kept: Vec<char> = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect();
    let start = kept.len().saturating_sub(MAX_FOLDER_NAME_CHARS);
    let name: String = kept[start..].iter().collect();
    if name.is_empty() {
        FALLBACK_FOLDER_NAME.to_string()
    } else {
        name
    }
}
