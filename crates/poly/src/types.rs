//! Public types for the catalog client.
//!
//! These are validated views of the wire documents in `poly-wire`: required
//! fields are enforced and timestamps are parsed.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use poly_wire as wire;
use std::{fmt, path::PathBuf, str::FromStr};

/// Resource name prefix used by the catalog for asset identifiers.
const ASSET_PREFIX: &str = "assets/";

/// Strip the `assets/` resource prefix, if any.
#[must_use]
pub fn asset_id(name: &str) -> &str {
    name.strip_prefix(ASSET_PREFIX).unwrap_or(name)
}

/// A catalog asset.
#[derive(Debug, Clone, PartialEq)]
pub struct Asset {
    /// Full resource name, e.g. `assets/5vbJ5vildOq`.
    pub name: String,
    /// Human-readable title.
    pub display_name: Option<String>,
    /// Name of the asset's creator.
    pub author_name: Option<String>,
    /// Free-form description.
    pub description: Option<String>,
    /// When the asset was first published.
    pub create_time: Option<DateTime<Utc>>,
    /// When the asset was last changed.
    pub update_time: Option<DateTime<Utc>>,
    /// Available formats, in the order the catalog listed them.
    pub formats: Vec<Format>,
    /// Preview image.
    pub thumbnail: Option<FileRef>,
    /// License identifier, e.g. `CREATIVE_COMMONS_BY`.
    pub license: Option<String>,
    /// Visibility, e.g. `PUBLIC` or `UNLISTED`.
    pub visibility: Option<String>,
    /// Whether the catalog staff picked this asset.
    pub is_curated: bool,
    /// Display hints.
    pub presentation_params: Option<PresentationParams>,
}

impl Asset {
    /// The identifier without its `assets/` prefix.
    #[must_use]
    pub fn id(&self) -> &str {
        asset_id(&self.name)
    }

    /// The first format, which is the one downloads use.
    #[must_use]
    pub fn primary_format(&self) -> Option<&Format> {
        self.formats.first()
    }

    /// The first format of the given kind.
    #[must_use]
    pub fn format(&self, kind: &FormatKind) -> Option<&Format> {
        self.formats.iter().find(|format| &format.kind == kind)
    }
}

impl TryFrom<wire::Asset> for Asset {
    type Error = Error;

    fn try_from(asset: wire::Asset) -> Result<Self> {
        let name = asset
            .name
            .filter(|name| !name.is_empty())
            .ok_or_else(|| Error::invalid("asset", "missing name"))?;

        Ok(Self {
            create_time: parse_time("createTime", asset.create_time.as_deref())?,
            update_time: parse_time("updateTime", asset.update_time.as_deref())?,
            name,
            display_name: asset.display_name,
            author_name: asset.author_name,
            description: asset.description,
            formats: asset.formats.into_iter().map(Format::from).collect(),
            thumbnail: asset.thumbnail.map(FileRef::from),
            license: asset.license,
            visibility: asset.visibility,
            is_curated: asset.is_curated.unwrap_or(false),
            presentation_params: asset.presentation_params.map(PresentationParams::from),
        })
    }
}

fn parse_time(field: &str, value: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    value
        .map(|value| {
            DateTime::parse_from_rfc3339(value)
                .map(|time| time.with_timezone(&Utc))
                .map_err(|e| Error::invalid("asset", format!("bad {field} {value:?}: {e}")))
        })
        .transpose()
}

/// One packaging of an asset: a root file plus the files it references.
#[derive(Debug, Clone, PartialEq)]
pub struct Format {
    /// The primary file. A format without one can't be downloaded.
    pub root: Option<FileRef>,
    /// Supporting files (materials, textures, buffers), in catalog order.
    pub resources: Vec<FileRef>,
    /// Which export format this is.
    pub kind: FormatKind,
    /// Complexity hints, when the catalog provides them.
    pub complexity: Option<FormatComplexity>,
}

impl Format {
    /// Whether this format has a root file.
    #[must_use]
    pub fn is_downloadable(&self) -> bool {
        self.root.as_ref().is_some_and(|root| root.url.is_some())
    }
}

impl From<wire::Format> for Format {
    fn from(format: wire::Format) -> Self {
        Self {
            root: format.root.map(FileRef::from),
            resources: format.resources.into_iter().map(FileRef::from).collect(),
            kind: format
                .format_type
                .as_deref()
                .map_or(FormatKind::Other(String::new()), FormatKind::parse),
            complexity: format.format_complexity.map(FormatComplexity::from),
        }
    }
}

/// Complexity hints for a format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FormatComplexity {
    /// Approximate triangle count.
    pub triangle_count: Option<u64>,
    /// Relative level of detail; lower is simpler.
    pub lod_hint: Option<i32>,
}

impl From<wire::FormatComplexity> for FormatComplexity {
    fn from(complexity: wire::FormatComplexity) -> Self {
        Self {
            triangle_count: complexity
                .triangle_count
                .and_then(|count| count.parse().ok()),
            lod_hint: complexity.lod_hint,
        }
    }
}

/// A file belonging to a format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRef {
    /// Path relative to the root file, e.g. `materials.mtl`.
    pub relative_path: String,
    /// Download location. Files without one are skipped by downloads.
    pub url: Option<String>,
    /// MIME type, e.g. `image/png`.
    pub content_type: Option<String>,
}

impl From<wire::File> for FileRef {
    fn from(file: wire::File) -> Self {
        Self {
            relative_path: file.relative_path.unwrap_or_default(),
            url: file.url,
            content_type: file.content_type,
        }
    }
}

/// Display hints.
#[derive(Debug, Clone, PartialEq)]
pub struct PresentationParams {
    /// Rotation that orients the model upright, as `[x, y, z, w]`.
    pub orienting_rotation: Option<[f64; 4]>,
    /// `LINEAR` or `GAMMA`.
    pub color_space: Option<String>,
    /// Suggested background, as `#RRGGBB`.
    pub background_color: Option<String>,
}

impl From<wire::PresentationParams> for PresentationParams {
    fn from(params: wire::PresentationParams) -> Self {
        Self {
            // The catalog omits zero components.
            orienting_rotation: params.orienting_rotation.map(|q| {
                [
                    q.x.unwrap_or(0.0),
                    q.y.unwrap_or(0.0),
                    q.z.unwrap_or(0.0),
                    q.w.unwrap_or(0.0),
                ]
            }),
            color_space: params.color_space,
            background_color: params.background_color,
        }
    }
}

/// An export format known to the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FormatKind {
    /// Blocks native format.
    Blocks,
    /// Autodesk FBX.
    Fbx,
    /// glTF 1.0.
    Gltf,
    /// glTF 2.0.
    Gltf2,
    /// Wavefront OBJ with MTL materials.
    Obj,
    /// Tilt Brush sketch.
    Tilt,
    /// Anything else, verbatim.
    Other(String),
}

impl FormatKind {
    /// Parse a catalog format identifier. Unknown identifiers are preserved.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value.to_ascii_uppercase().as_str() {
            "BLOCKS" => Self::Blocks,
            "FBX" => Self::Fbx,
            "GLTF" => Self::Gltf,
            "GLTF2" => Self::Gltf2,
            "OBJ" => Self::Obj,
            "TILT" => Self::Tilt,
            _ => Self::Other(value.to_string()),
        }
    }

    /// The catalog identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Blocks => "BLOCKS",
            Self::Fbx => "FBX",
            Self::Gltf => "GLTF",
            Self::Gltf2 => "GLTF2",
            Self::Obj => "OBJ",
            Self::Tilt => "TILT",
            Self::Other(value) => value,
        }
    }
}

impl fmt::Display for FormatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FormatKind {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

/// Upper bound on model complexity for listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Complexity {
    /// Low-poly models.
    Simple,
    /// Simple and medium-detail models.
    Medium,
    /// No limit.
    Complex,
}

impl Complexity {
    /// The catalog identifier.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Simple => "SIMPLE",
            Self::Medium => "MEDIUM",
            Self::Complex => "COMPLEX",
        }
    }
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Complexity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "SIMPLE" => Ok(Self::Simple),
            "MEDIUM" => Ok(Self::Medium),
            "COMPLEX" => Ok(Self::Complex),
            _ => Err(Error::invalid("complexity", s)),
        }
    }
}

/// Filters for [`Client::list_assets`](crate::Client::list_assets).
///
/// Unset filters are left out of the request entirely.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    /// Search terms, sent joined by single spaces.
    pub keywords: Vec<String>,
    /// Restrict to curated (or uncurated) assets.
    pub curated: Option<bool>,
    /// Category filter, e.g. `animals`.
    pub category: Option<String>,
    /// Most complex models to return.
    pub max_complexity: Option<Complexity>,
    /// Only assets available in this format.
    pub format: Option<FormatKind>,
    /// Continuation token from a previous [`AssetPage`].
    pub page_token: Option<String>,
}

impl ListQuery {
    /// A query for the given keywords.
    #[must_use]
    pub fn keywords<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keywords: keywords.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Filter on curation.
    #[must_use]
    pub fn with_curated(mut self, curated: bool) -> Self {
        self.curated = Some(curated);
        self
    }

    /// Filter on category.
    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Cap model complexity.
    #[must_use]
    pub fn with_max_complexity(mut self, complexity: Complexity) -> Self {
        self.max_complexity = Some(complexity);
        self
    }

    /// Require a format.
    #[must_use]
    pub fn with_format(mut self, format: FormatKind) -> Self {
        self.format = Some(format);
        self
    }

    /// Continue a previous listing.
    #[must_use]
    pub fn with_page_token(mut self, token: impl Into<String>) -> Self {
        self.page_token = Some(token.into());
        self
    }

    /// Query parameters, excluding the API key.
    pub(crate) fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if !self.keywords.is_empty() {
            params.push(("keywords", self.keywords.join(" ")));
        }
        if let Some(curated) = self.curated {
            params.push(("curated", curated.to_string()));
        }
        if let Some(category) = &self.category {
            params.push(("category", category.clone()));
        }
        if let Some(complexity) = self.max_complexity {
            params.push(("maxComplexity", complexity.as_str().to_string()));
        }
        if let Some(format) = &self.format {
            params.push(("format", format.as_str().to_string()));
        }
        if let Some(token) = &self.page_token {
            params.push(("pageToken", token.clone()));
        }
        params
    }
}

/// One page of listing results.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetPage {
    /// Matches on this page.
    pub assets: Vec<Asset>,
    /// Total matches across all pages, when reported.
    pub total_count: Option<u64>,
    /// Pass to [`ListQuery::with_page_token`] to fetch the next page.
    pub next_page_token: Option<String>,
}

impl TryFrom<wire::ListAssetsResponse> for AssetPage {
    type Error = Error;

    fn try_from(response: wire::ListAssetsResponse) -> Result<Self> {
        Ok(Self {
            assets: response
                .assets
                .into_iter()
                .map(Asset::try_from)
                .collect::<Result<_>>()?,
            total_count: response.total_size,
            next_page_token: response
                .next_page_token
                .map(wire::PageToken::into_string)
                .filter(|token| !token.is_empty()),
        })
    }
}

/// Local files produced by a completed download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadResult {
    /// Where the root file was saved.
    pub root: PathBuf,
    /// One path per downloadable resource, in the format's resource order.
    pub resources: Vec<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wire_asset() -> wire::Asset {
        serde_json::from_str(
            r#"{
                "name": "assets/abc",
                "displayName": "Duck",
                "createTime": "2017-11-02T18:22:06.532374Z",
                "formats": [
                    {"root": {"relativePath": "duck.obj", "url": "https://x/duck.obj"},
                     "resources": [{"relativePath": "duck.mtl", "url": "https://x/duck.mtl"}],
                     "formatType": "OBJ",
                     "formatComplexity": {"triangleCount": "1200"}},
                    {"formatType": "GLTF2"}
                ],
                "presentationParams": {"orientingRotation": {"w": 1.0}}
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_asset_from_wire() {
        let asset = Asset::try_from(wire_asset()).unwrap();
        assert_eq!(asset.name, "assets/abc");
        assert_eq!(asset.id(), "abc");
        assert_eq!(asset.display_name.as_deref(), Some("Duck"));
        assert!(!asset.is_curated);
        assert_eq!(
            asset.create_time.unwrap().to_rfc3339(),
            "2017-11-02T18:22:06.532374+00:00"
        );

        let primary = asset.primary_format().unwrap();
        assert_eq!(primary.kind, FormatKind::Obj);
        assert!(primary.is_downloadable());
        assert_eq!(primary.resources[0].relative_path, "duck.mtl");
        assert_eq!(primary.complexity.unwrap().triangle_count, Some(1200));

        let gltf = asset.format(&FormatKind::Gltf2).unwrap();
        assert!(!gltf.is_downloadable());

        assert_eq!(
            asset.presentation_params.unwrap().orienting_rotation,
            Some([0.0, 0.0, 0.0, 1.0])
        );
    }

    #[test]
    fn test_asset_requires_name() {
        let mut asset = wire_asset();
        asset.name = None;
        let err = Asset::try_from(asset).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_asset_rejects_bad_timestamp() {
        let mut asset = wire_asset();
        asset.update_time = Some("yesterday".to_string());
        assert!(matches!(
            Asset::try_from(asset),
            Err(Error::InvalidData { context: "asset", .. })
        ));
    }

    #[test]
    fn test_asset_id() {
        assert_eq!(asset_id("assets/abc"), "abc");
        assert_eq!(asset_id("abc"), "abc");
    }

    #[test]
    fn test_format_kind() {
        assert_eq!(FormatKind::parse("gltf2"), FormatKind::Gltf2);
        assert_eq!(
            FormatKind::parse("USDZ"),
            FormatKind::Other("USDZ".to_string())
        );
        assert_eq!(FormatKind::Tilt.to_string(), "TILT");
    }

    #[test]
    fn test_complexity_parse() {
        assert_eq!("medium".parse::<Complexity>().unwrap(), Complexity::Medium);
        assert!("huge".parse::<Complexity>().is_err());
    }

    #[test]
    fn test_list_query_params() {
        assert!(ListQuery::default().params().is_empty());

        let params = ListQuery::keywords(["red", "car"])
            .with_curated(true)
            .with_max_complexity(Complexity::Simple)
            .with_format(FormatKind::Obj)
            .with_page_token("CAEQAA")
            .params();
        assert_eq!(
            params,
            vec![
                ("keywords", "red car".to_string()),
                ("curated", "true".to_string()),
                ("maxComplexity", "SIMPLE".to_string()),
                ("format", "OBJ".to_string()),
                ("pageToken", "CAEQAA".to_string()),
            ]
        );
    }

    #[test]
    fn test_asset_page_from_wire() {
        let response: wire::ListAssetsResponse = serde_json::from_str(
            r#"{"assets": [{"name": "assets/a"}], "totalSize": 3, "nextPageToken": ""}"#,
        )
        .unwrap();
        let page = AssetPage::try_from(response).unwrap();
        assert_eq!(page.assets.len(), 1);
        assert_eq!(page.total_count, Some(3));
        assert_eq!(page.next_page_token, None);
    }
}
