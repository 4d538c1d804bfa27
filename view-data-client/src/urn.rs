//! URN helpers
//!
//! The viewing service addresses a model by the base64 of its storage object
//! id (`urn:adsk.objects:os.object:<bucket>/<key>`). URL-safe base64 without
//! padding is used so the URN can sit in a path segment as-is.

use anyhow::{Context, Result};
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;

/// Prefix of item URNs inside a manifest
pub const ITEM_URN_PREFIX: &str = "urn:adsk.viewing:fs.file:";

/// Encode a storage object id as a viewing service URN
pub fn to_base64(object_id: &str) -> String {
    URL_SAFE_NO_PAD.encode(object_id.as_bytes())
}

/// Decode a URN back to the object id
///
/// Accepts both the URL-safe form produced by [`to_base64`] and standard
/// padded base64.
pub fn from_base64(urn: &str) -> Result<String> {
    let bytes = URL_SAFE_NO_PAD
        .decode(urn.trim_end_matches('='))
        .or_else(|_| STANDARD.decode(urn))
        .context("URN is not valid base64")?;
    String::from_utf8(bytes).context("URN does not decode to UTF-8")
}
