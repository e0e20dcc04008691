use url::Url;

use crate::config::ApiConfig;
use crate::error::ApiError;

const API_PATH: &str = "w/api.php";
const TOKEN_PARAM: &str = "token";

/// The MediaWiki namespace holding media files
pub const MEDIA_NAMESPACE: i64 = 6;

/// Builds request URLs for the MediaWiki action API.
///
/// Every URL produced here carries the configured token, so individual
/// calls never deal with authentication.
#[derive(Debug, Clone)]
pub struct ApiEndpoint {
    api_url: Url,
    token: Option<String>,
    search_qualifier: String,
    search_limit: u32,
}

impl ApiEndpoint {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self, ApiError> {
        let mut base = Url::parse(base_url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let api_url = base.join(API_PATH)?;

        Ok(Self {
            api_url,
            token: token.filter(|t| !t.is_empty()),
            search_qualifier: "sounds".to_string(),
            search_limit: 20,
        })
    }

    pub fn from_config(config: &ApiConfig) -> Result<Self, ApiError> {
        Ok(Self::new(&config.base_url, config.token.clone())?
            .with_search_qualifier(&config.search_qualifier)
            .with_search_limit(config.search_limit))
    }

    pub fn with_search_qualifier(mut self, qualifier: &str) -> Self {
        self.search_qualifier = qualifier.trim().to_string();
        self
    }

    pub fn with_search_limit(mut self, limit: u32) -> Self {
        self.search_limit = limit;
        self
    }

    /// URL for a full-text search restricted to media files
    pub fn search_url(&self, query: &str) -> Url {
        let term = if self.search_qualifier.is_empty() {
            query.to_string()
        } else {
            format!("{} {}", query, self.search_qualifier)
        };
        let limit = self.search_limit.to_string();
        let namespace = MEDIA_NAMESPACE.to_string();

        self.build(&[
            ("action", "query"),
            ("list", "search"),
            ("srsearch", &term),
            ("srnamespace", &namespace),
            ("format", "json"),
            ("srlimit", &limit),
        ])
    }

    /// URL resolving a file title to its image info
    pub fn details_url(&self, title: &str) -> Url {
        self.build(&[
            ("action", "query"),
            ("prop", "imageinfo"),
            ("titles", title),
            ("iiprop", "url"),
            ("format", "json"),
        ])
    }

    fn build(&self, params: &[(&str, &str)]) -> Url {
        let mut url = self.api_url.clone();
        {
            let mut pairs = url.query_pairs_mut();
            pairs.extend_pairs(params);
            if let Some(token) = &self.token {
                pairs.append_pair(TOKEN_PARAM, token);
            }
        }
        url
    }
}
