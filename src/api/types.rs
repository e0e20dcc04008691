use std::fmt;

use serde::de::{IgnoredAny, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

/// A media file returned by the search endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Remote page id (0 when the server omits it)
    pub identifier: i64,
    pub title: String,
    pub namespace: i64,
}

/// Direct download location for a single file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDetails {
    pub title: String,
    pub direct_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description_url: Option<String>,
}

// Wire format of the MediaWiki action API. Only the fields used here are
// modelled; everything else is ignored by serde.

#[derive(Debug, Deserialize)]
pub(crate) struct RemoteError {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub info: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchEnvelope {
    pub query: Option<SearchQuery>,
    pub error: Option<RemoteError>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchQuery {
    #[serde(default)]
    pub search: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchHit {
    pub ns: i64,
    pub title: Option<String>,
    #[serde(default)]
    pub pageid: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DetailEnvelope {
    pub query: Option<DetailQuery>,
    pub error: Option<RemoteError>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DetailQuery {
    /// Pages in the order the server listed them. The wire form is an
    /// object keyed by page id; missing pages use negative ids.
    #[serde(default, deserialize_with = "pages_in_document_order")]
    pub pages: Vec<Page>,
}

fn pages_in_document_order<'de, D>(deserializer: D) -> Result<Vec<Page>, D::Error>
where
    D: Deserializer<'de>,
{
    struct PagesVisitor;

    impl<'de> Visitor<'de> for PagesVisitor {
        type Value = Vec<Page>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("an object of pages keyed by page id")
        }

        fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut pages = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some((IgnoredAny, page)) = map.next_entry::<IgnoredAny, Page>()? {
                pages.push(page);
            }
            Ok(pages)
        }
    }

    deserializer.deserialize_map(PagesVisitor)
}

#[derive(Debug, Deserialize)]
pub(crate) struct Page {
    pub title: String,
    #[serde(default)]
    pub imageinfo: Vec<ImageInfo>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ImageInfo {
    pub url: Option<String>,
    pub descriptionurl: Option<String>,
}
