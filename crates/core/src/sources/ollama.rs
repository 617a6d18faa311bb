use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::debug;

use super::{check_status, transport_error, FetchRequest, RawRecord, SourceAdapter};
use crate::error::FetchError;
use crate::models::ModelSource;

pub const OLLAMA_LIBRARY_URL: &str = "https://ollama.com";

/// One model variant as advertised on the Ollama library pages.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OllamaListing {
    pub name: String,
    /// Variant tag such as `8b`; `None` for models without advertised sizes.
    pub tag: Option<String>,
    pub description: Option<String>,
    pub capabilities: Vec<String>,
    pub sizes: Vec<String>,
    pub pull_count: Option<String>,
    pub tag_count: Option<String>,
    pub updated: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Page {
    Library,
    Search,
}

/// Reads model listings off `ollama.com/library` or `ollama.com/search`.
pub struct OllamaLibraryAdapter {
    client: Client,
    base_url: String,
    page: Page,
}

impl OllamaLibraryAdapter {
    /// Adapter for the full library listing.
    pub fn library(base_url: &str, timeout: Duration) -> reqwest::Result<Self> {
        Self::build(base_url, timeout, Page::Library)
    }

    /// Adapter for the search page, used as a fallback for the library.
    pub fn search(base_url: &str, timeout: Duration) -> reqwest::Result<Self> {
        Self::build(base_url, timeout, Page::Search)
    }

    fn build(base_url: &str, timeout: Duration, page: Page) -> reqwest::Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("getllm/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            page,
        })
    }

    fn page_url(&self, request: &FetchRequest) -> (String, Vec<(&'static str, String)>) {
        let path = match self.page {
            Page::Library => "library",
            Page::Search => "search",
        };
        let params = request
            .query
            .as_ref()
            .map(|q| vec![("q", q.clone())])
            .unwrap_or_default();
        (format!("{}/{}", self.base_url, path), params)
    }
}

#[async_trait]
impl SourceAdapter for OllamaLibraryAdapter {
    fn source(&self) -> ModelSource {
        ModelSource::Ollama
    }

    fn name(&self) -> &str {
        match self.page {
            Page::Library => "ollama-library",
            Page::Search => "ollama-search",
        }
    }

    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<RawRecord>, FetchError> {
        let (url, params) = self.page_url(request);
        debug!("Loading Ollama listings from {}", url);

        let response = self
            .client
            .get(&url)
            .query(&params)
            .send()
            .await
            .map_err(|e| transport_error(self.name(), e))?;
        let response = check_status(self.name(), response)?;
        let html = response
            .text()
            .await
            .map_err(|e| transport_error(self.name(), e))?;

        let mut models = parse_library_html(&html, &self.base_url);
        if models.is_empty() {
            return Err(FetchError::ParseFailed {
                adapter: self.name().to_string(),
                message: "page contained no model entries".to_string(),
            });
        }
        if let Some(limit) = request.limit {
            models.truncate(limit);
        }

        Ok(models
            .into_iter()
            .flat_map(expand_variants)
            .map(RawRecord::Ollama)
            .collect())
    }
}

/// One listing per advertised size, or the bare model when it lists none.
fn expand_variants(model: OllamaListing) -> Vec<OllamaListing> {
    if model.sizes.is_empty() {
        return vec![model];
    }

    model
        .sizes
        .iter()
        .map(|size| OllamaListing {
            tag: Some(size.clone()),
            ..model.clone()
        })
        .collect()
}

struct Patterns {
    href: Regex,
    title: Regex,
    description: Regex,
    capability: Regex,
    size: Regex,
    pulls: Regex,
    tag_count: Regex,
    updated: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let re = |p: &str| Regex::new(p).expect("listing pattern is valid");
        Patterns {
            href: re(r#"href="/library/([^"?#]+)""#),
            title: re(r"(?s)x-test-search-response-title[^>]*>(.*?)</"),
            description: re(r"(?s)<p[^>]*>(.*?)</p>"),
            capability: re(r"(?s)x-test-capability[^>]*>(.*?)</"),
            size: re(r"(?s)x-test-size[^>]*>(.*?)</"),
            pulls: re(r"(?s)x-test-pull-count[^>]*>(.*?)</"),
            tag_count: re(r"(?s)x-test-tag-count[^>]*>(.*?)</"),
            updated: re(r"(?s)x-test-updated[^>]*>(.*?)</"),
        }
    })
}

/// Extract model entries from an Ollama library or search page.
///
/// Entries are the `<li x-test-model>` items. An item without a recognizable
/// name is still returned, with an empty name, so the normalizer can reject it.
pub fn parse_library_html(html: &str, base_url: &str) -> Vec<OllamaListing> {
    let p = patterns();

    html.split("<li x-test-model")
        .skip(1)
        .map(|item| {
            let item = item.split("</li>").next().unwrap_or(item);
            let name = p
                .href
                .captures(item)
                .or_else(|| p.title.captures(item))
                .map(|c| text(&c[1]))
                .unwrap_or_default();
            let url = (!name.is_empty()).then(|| format!("{}/library/{}", base_url, name));

            OllamaListing {
                tag: None,
                description: description(&p.description, item),
                capabilities: all(&p.capability, item),
                sizes: all(&p.size, item),
                pull_count: first(&p.pulls, item),
                tag_count: first(&p.tag_count, item),
                updated: first(&p.updated, item),
                url,
                name,
            }
        })
        .collect()
}

fn first(re: &Regex, haystack: &str) -> Option<String> {
    re.captures(haystack)
        .map(|c| text(&c[1]))
        .filter(|s| !s.is_empty())
}

/// First paragraph that is prose rather than the stats line of pull and tag
/// counts, which is also a `<p>` on the listing pages.
fn description(re: &Regex, haystack: &str) -> Option<String> {
    re.captures_iter(haystack)
        .filter(|c| !c[1].contains("x-test-"))
        .map(|c| text(&c[1]))
        .find(|s| !s.is_empty())
}

fn all(re: &Regex, haystack: &str) -> Vec<String> {
    re.captures_iter(haystack)
        .map(|c| text(&c[1]))
        .filter(|s| !s.is_empty())
        .collect()
}

/// Strip nested tags, decode the handful of entities the pages use, collapse whitespace.
fn text(fragment: &str) -> String {
    static TAGS: OnceLock<Regex> = OnceLock::new();
    let tags = TAGS.get_or_init(|| Regex::new(r"<[^>]*>").expect("tag pattern is valid"));

    let stripped = tags.replace_all(fragment, "");
    let decoded = stripped
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&amp;", "&");
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
<ul role="list">
  <li x-test-model class="flex items-baseline border-b py-6">
    <a href="/library/llama3.1" class="group w-full">
      <div class="flex flex-col mb-1" title="llama3.1">
        <h2><span x-test-search-response-title>llama3.1</span></h2>
        <p class="max-w-lg break-words">Llama 3.1 is a new state-of-the-art model from Meta &amp; friends.</p>
      </div>
      <div class="flex flex-col">
        <div class="flex flex-wrap space-x-2">
          <span x-test-capability class="text-indigo-600">tools</span>
          <span x-test-size class="text-blue-600">8b</span>
          <span x-test-size class="text-blue-600">70b</span>
        </div>
        <p class="my-1 flex"><span x-test-pull-count>98.5M</span>&nbsp;<span>Pulls</span>
          <span x-test-tag-count>93</span> Tags
          <span x-test-updated>10 months ago</span></p>
      </div>
    </a>
  </li>
  <li x-test-model class="flex items-baseline border-b py-6">
    <a href="/library/nomic-embed-text" class="group w-full">
      <p class="max-w-lg">A high-performing open embedding model.</p>
      <span x-test-capability>embedding</span>
    </a>
  </li>
  <li x-test-model class="broken"><div>no link here</div></li>
</ul>"#;

    #[test]
    fn parses_library_items() {
        let models = parse_library_html(PAGE, "https://ollama.com");
        assert_eq!(models.len(), 3);

        let llama = &models[0];
        assert_eq!(llama.name, "llama3.1");
        assert_eq!(
            llama.description.as_deref(),
            Some("Llama 3.1 is a new state-of-the-art model from Meta & friends.")
        );
        assert_eq!(llama.capabilities, vec!["tools"]);
        assert_eq!(llama.sizes, vec!["8b", "70b"]);
        assert_eq!(llama.pull_count.as_deref(), Some("98.5M"));
        assert_eq!(llama.tag_count.as_deref(), Some("93"));
        assert_eq!(llama.updated.as_deref(), Some("10 months ago"));
        assert_eq!(
            llama.url.as_deref(),
            Some("https://ollama.com/library/llama3.1")
        );

        assert_eq!(models[1].name, "nomic-embed-text");
        assert!(models[1].sizes.is_empty());
        assert_eq!(models[2].name, "");
    }

    #[test]
    fn expands_one_listing_per_size() {
        let models = parse_library_html(PAGE, "https://ollama.com");
        let variants: Vec<_> = models.into_iter().flat_map(expand_variants).collect();
        let tags: Vec<_> = variants
            .iter()
            .map(|v| (v.name.as_str(), v.tag.as_deref()))
            .collect();
        assert_eq!(
            tags,
            vec![
                ("llama3.1", Some("8b")),
                ("llama3.1", Some("70b")),
                ("nomic-embed-text", None),
                ("", None),
            ]
        );
    }

    #[test]
    fn stats_line_is_not_a_description() {
        let page = r#"
  <li x-test-model>
    <a href="/library/qwen3">
      <p class="my-1 flex"><span x-test-pull-count>98.5M</span>&nbsp;<span>Pulls</span>
        <span x-test-updated>2 weeks ago</span></p>
    </a>
  </li>"#;
        let models = parse_library_html(page, "https://ollama.com");
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].description, None);
        assert_eq!(models[0].pull_count.as_deref(), Some("98.5M"));

        let raw = RawRecord::Ollama(models[0].clone());
        let record =
            crate::normalize::normalize(ModelSource::Ollama, &raw, chrono::Utc::now()).unwrap();
        assert_eq!(record.description, None);
        assert_eq!(record.size_label, None);
    }

    #[tokio::test]
    async fn fetch_applies_limit_before_expansion() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/library")
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_body(PAGE)
            .create_async()
            .await;

        let adapter = OllamaLibraryAdapter::library(&server.url(), Duration::from_secs(5)).unwrap();
        let records = adapter
            .fetch(&FetchRequest::new(None, Some(1)))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(records.len(), 2);
        assert!(records
            .iter()
            .all(|r| matches!(r, RawRecord::Ollama(l) if l.name == "llama3.1")));
    }

    #[tokio::test]
    async fn search_page_receives_query() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/search")
            .match_query(mockito::Matcher::UrlEncoded("q".into(), "embed".into()))
            .with_status(200)
            .with_body(PAGE)
            .create_async()
            .await;

        let adapter = OllamaLibraryAdapter::search(&server.url(), Duration::from_secs(5)).unwrap();
        let records = adapter
            .fetch(&FetchRequest::new(Some("embed".into()), None))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(records.len(), 4);
    }

    #[tokio::test]
    async fn page_without_models_is_a_parse_failure() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/library")
            .with_status(200)
            .with_body("<html><body>maintenance</body></html>")
            .create_async()
            .await;

        let adapter = OllamaLibraryAdapter::library(&server.url(), Duration::from_secs(5)).unwrap();
        let err = adapter.fetch(&FetchRequest::default()).await.unwrap_err();
        assert!(matches!(err, FetchError::ParseFailed { .. }));
    }
}
