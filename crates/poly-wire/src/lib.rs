//! Wire types for the Poly asset catalog JSON API.
//!
//! These types mirror the JSON documents returned by the catalog service
//! field for field. They are deliberately permissive: every field is
//! optional or defaulted, so a response only fails to decode when it is not
//! the right shape at all. Validation (required fields, timestamp parsing)
//! happens when the core crate converts them into its own model.
//!
//! # Key types
//!
//! - [`Asset`]: a single catalog entry, as returned by `GET /v1/assets/{id}`
//! - [`ListAssetsResponse`]: one page of results from `GET /v1/assets`
//! - [`Format`]: one packaging of an asset (root file plus resources)
//! - [`File`]: a downloadable file reference

use serde::{Deserialize, Serialize};

/// A catalog asset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    /// Unique resource name, e.g. `assets/5vbJ5vildOq`.
    pub name: Option<String>,
    /// Human-readable title.
    pub display_name: Option<String>,
    /// Name of the asset's creator.
    pub author_name: Option<String>,
    pub description: Option<String>,
    /// RFC 3339 timestamp.
    pub create_time: Option<String>,
    /// RFC 3339 timestamp.
    pub update_time: Option<String>,
    /// Available formats, in catalog order.
    #[serde(default)]
    pub formats: Vec<Format>,
    /// Preview image.
    pub thumbnail: Option<File>,
    /// License identifier, e.g. `CREATIVE_COMMONS_BY`.
    pub license: Option<String>,
    /// `PUBLIC`, `PRIVATE` or `UNLISTED`.
    pub visibility: Option<String>,
    pub is_curated: Option<bool>,
    pub presentation_params: Option<PresentationParams>,
}

/// One export format of an asset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Format {
    /// The main file of the format.
    pub root: Option<File>,
    /// Files the root refers to (materials, textures, buffers).
    #[serde(default)]
    pub resources: Vec<File>,
    /// Format identifier such as `OBJ` or `GLTF2`.
    pub format_type: Option<String>,
    pub format_complexity: Option<FormatComplexity>,
}

/// Complexity hints for a format.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatComplexity {
    /// The service encodes 64-bit integers as strings.
    pub triangle_count: Option<String>,
    /// Relative level of detail; lower is simpler.
    pub lod_hint: Option<i32>,
}

/// A file reference inside a format.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct File {
    /// Path relative to the format's root file.
    pub relative_path: Option<String>,
    /// Download location.
    pub url: Option<String>,
    /// MIME type.
    pub content_type: Option<String>,
}

/// Hints for how an asset should be displayed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresentationParams {
    /// Rotation that orients the model upright.
    pub orienting_rotation: Option<Quaternion>,
    /// `LINEAR` or `GAMMA`.
    pub color_space: Option<String>,
    /// Hex color such as `#FFFFFF`.
    pub background_color: Option<String>,
}

/// A rotation quaternion. Missing components are reported as absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub z: Option<f64>,
    pub w: Option<f64>,
}

/// Response envelope for the asset listing endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListAssetsResponse {
    #[serde(default)]
    pub assets: Vec<Asset>,
    /// Total matches across all pages.
    #[serde(alias = "totalAssetCount")]
    pub total_size: Option<u64>,
    /// Token for the next page; absent on the last one.
    #[serde(alias = "nextPage")]
    pub next_page_token: Option<PageToken>,
}

/// Continuation token for paged listings.
///
/// The service documents this as a string, but older deployments returned a
/// bare page number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PageToken {
    /// Opaque token.
    Text(String),
    /// Page number.
    Number(u64),
}

impl PageToken {
    /// The token in the form expected by the `pageToken` query parameter.
    #[must_use]
    pub fn into_string(self) -> String {
        match self {
            Self::Text(text) => text,
            Self::Number(number) => number.to_string(),
        }
    }
}
