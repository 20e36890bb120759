use crate::crawler::{parse_html, Response};
use crate::job::{CrawlJob, CrawlTarget};
use crate::spider::{Spider, SpiderError, SpiderOutput};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use url::Url;

/// Splits a URL into its LRU stems
///
/// Stems go from the most general part of the URL to the most specific:
/// scheme, host labels in reverse order (a leading `www` dropped), the port
/// when it is not the scheme default, then path segments.
///
/// # Examples
///
/// ```
/// use ripple_crawl::spider::lru_stems;
/// use url::Url;
///
/// let url = Url::parse("https://www.example.com:8080/a/b").unwrap();
/// assert_eq!(
///     lru_stems(&url),
///     vec!["s:https", "h:com", "h:example", "t:8080", "p:a", "p:b"]
/// );
/// ```
pub fn lru_stems(url: &Url) -> Vec<String> {
    let mut stems = vec![format!("s:{}", url.scheme())];

    if let Some(host) = url.host_str() {
        let host = host.to_lowercase();
        let host = host.strip_prefix("www.").unwrap_or(&host);
        stems.extend(host.rsplit('.').filter(|l| !l.is_empty()).map(|l| format!("h:{}", l)));
    }

    if let Some(port) = url.port() {
        stems.push(format!("t:{}", port));
    }

    if let Some(segments) = url.path_segments() {
        stems.extend(segments.filter(|s| !s.is_empty()).map(|s| format!("p:{}", s)));
    }

    stems
}

/// Stems used as trie keys; http and https share their prefixes
fn trie_key(url: &Url) -> Vec<String> {
    lru_stems(url)
        .into_iter()
        .filter(|stem| !stem.starts_with("s:"))
        .collect()
}

#[derive(Debug, Clone)]
struct TrieNode<T> {
    value: Option<T>,
    children: HashMap<String, TrieNode<T>>,
}

impl<T> Default for TrieNode<T> {
    fn default() -> Self {
        Self {
            value: None,
            children: HashMap::new(),
        }
    }
}

/// A trie over LRU stems answering longest-prefix queries
#[derive(Debug, Clone)]
pub struct LruTrie<T> {
    root: TrieNode<T>,
    len: usize,
}

impl<T> Default for LruTrie<T> {
    fn default() -> Self {
        Self {
            root: TrieNode::default(),
            len: 0,
        }
    }
}

impl<T> LruTrie<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a value at a prefix, returning the value it replaced
    pub fn insert<S: AsRef<str>>(&mut self, stems: &[S], value: T) -> Option<T> {
        let mut node = &mut self.root;
        for stem in stems {
            node = node.children.entry(stem.as_ref().to_string()).or_default();
        }

        let previous = node.value.replace(value);
        if previous.is_none() {
            self.len += 1;
        }
        previous
    }

    /// Value of the longest stored prefix of `stems`
    pub fn longest_match<S: AsRef<str>>(&self, stems: &[S]) -> Option<&T> {
        let mut node = &self.root;
        let mut best = node.value.as_ref();

        for stem in stems {
            match node.children.get(stem.as_ref()) {
                Some(child) => {
                    node = child;
                    if node.value.is_some() {
                        best = node.value.as_ref();
                    }
                }
                None => break,
            }
        }

        best
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Crawl decision attached to a webentity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WebentityStatus {
    In,
    Out,
    Undecided,
}

impl WebentityStatus {
    pub fn from_config_str(s: &str) -> Option<Self> {
        match s {
            "in" => Some(Self::In),
            "out" => Some(Self::Out),
            "undecided" => Some(Self::Undecided),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::In => "in",
            Self::Out => "out",
            Self::Undecided => "undecided",
        }
    }
}

impl fmt::Display for WebentityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named group of URL prefixes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Webentity {
    pub name: String,
    pub prefixes: Vec<String>,
    pub status: WebentityStatus,
}

impl Webentity {
    pub fn new(name: &str, prefixes: Vec<String>, status: WebentityStatus) -> Self {
        Self {
            name: name.to_string(),
            prefixes,
            status,
        }
    }
}

/// Crawls the web as a graph of webentities
///
/// Every URL is attributed to the webentity owning its longest matching
/// prefix. Page data is `{"url", "webentity", "status", "outlinks"}` where
/// `outlinks` counts links per target webentity. Only links landing in an
/// `in` webentity are followed.
#[derive(Debug, Clone)]
pub struct PrefixSpider {
    seeds: Vec<CrawlTarget>,
    entities: Vec<Webentity>,
    trie: LruTrie<usize>,
}

impl PrefixSpider {
    /// Indexes the prefixes of every webentity
    ///
    /// # Returns
    ///
    /// * `Err(SpiderError::InvalidWebentity)` - If a prefix is not an absolute HTTP(S) URL
    pub fn new(seeds: Vec<CrawlTarget>, entities: Vec<Webentity>) -> Result<Self, SpiderError> {
        let mut trie = LruTrie::new();

        for (index, entity) in entities.iter().enumerate() {
            for prefix in &entity.prefixes {
                let url = Url::parse(prefix).map_err(|e| {
                    SpiderError::InvalidWebentity(format!(
                        "'{}' has invalid prefix '{}': {}",
                        entity.name, prefix, e
                    ))
                })?;
                if !matches!(url.scheme(), "http" | "https") {
                    return Err(SpiderError::InvalidWebentity(format!(
                        "'{}' has non-HTTP prefix '{}'",
                        entity.name, prefix
                    )));
                }
                trie.insert(&trie_key(&url), index);
            }
        }

        Ok(Self {
            seeds,
            entities,
            trie,
        })
    }

    /// Webentity owning a URL, if any
    pub fn webentity_of(&self, url: &str) -> Option<&Webentity> {
        let url = Url::parse(url).ok()?;
        self.trie
            .longest_match(&trie_key(&url))
            .and_then(|&index| self.entities.get(index))
    }
}

impl Spider for PrefixSpider {
    fn start(&self) -> Vec<CrawlTarget> {
        self.seeds.clone()
    }

    fn process(&self, _job: &CrawlJob, response: &Response) -> anyhow::Result<Option<SpiderOutput>> {
        if !response.is_success() || !response.is_html() {
            return Ok(None);
        }

        let base = Url::parse(&response.final_url)?;
        let page = parse_html(&response.text(), &base);
        let source = self.webentity_of(&response.final_url);

        let mut outlinks: BTreeMap<String, u64> = BTreeMap::new();
        let mut targets = Vec::new();

        for link in page.links {
            if let Some(entity) = self.webentity_of(&link) {
                *outlinks.entry(entity.name.clone()).or_insert(0) += 1;
                if entity.status == WebentityStatus::In {
                    targets.push(link);
                }
            }
        }

        let data = json!({
            "url": response.final_url,
            "webentity": source.map(|e| e.name.as_str()),
            "status": source.map(|e| e.status.as_str()),
            "outlinks": outlinks,
        });

        Ok(Some(SpiderOutput::new().with_data(data).with_targets(targets)))
    }

    fn tabulate(&self, data: &Value) -> Vec<Vec<String>> {
        let Some(source) = data.get("webentity").and_then(Value::as_str) else {
            return Vec::new();
        };
        let empty = Map::new();
        let outlinks = data
            .get("outlinks")
            .and_then(Value::as_object)
            .unwrap_or(&empty);

        outlinks
            .iter()
            .filter_map(|(target, count)| {
                count
                    .as_u64()
                    .map(|count| vec![source.to_string(), target.clone(), count.to_string()])
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(name: &str, prefixes: &[&str], status: WebentityStatus) -> Webentity {
        Webentity::new(name, prefixes.iter().map(|p| p.to_string()).collect(), status)
    }

    fn spider() -> PrefixSpider {
        PrefixSpider::new(
            vec!["https://example.com/".into()],
            vec![
                entity("example", &["https://example.com/"], WebentityStatus::In),
                entity("example-shop", &["https://example.com/shop"], WebentityStatus::Out),
                entity("other", &["http://other.org/"], WebentityStatus::Undecided),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_lru_stems_drop_www_and_default_port() {
        let url = Url::parse("http://WWW.Example.com:80/a//b/").unwrap();
        assert_eq!(lru_stems(&url), vec!["s:http", "h:com", "h:example", "p:a", "p:b"]);
    }

    #[test]
    fn test_trie_longest_match() {
        let mut trie = LruTrie::new();
        trie.insert(&["h:com", "h:example"], 1);
        trie.insert(&["h:com", "h:example", "p:blog"], 2);

        assert_eq!(trie.longest_match(&["h:com", "h:example", "p:blog", "p:x"]), Some(&2));
        assert_eq!(trie.longest_match(&["h:com", "h:example", "p:shop"]), Some(&1));
        assert_eq!(trie.longest_match(&["h:org"]), None);
        assert_eq!(trie.len(), 2);
        assert_eq!(trie.insert(&["h:com", "h:example"], 3), Some(1));
        assert_eq!(trie.len(), 2);
    }

    #[test]
    fn test_webentity_of() {
        let spider = spider();
        assert_eq!(spider.webentity_of("https://www.example.com/about").unwrap().name, "example");
        assert_eq!(spider.webentity_of("http://example.com/shop/item").unwrap().name, "example-shop");
        assert_eq!(spider.webentity_of("https://other.org/").unwrap().name, "other");
        assert!(spider.webentity_of("https://unknown.net/").is_none());
    }

    #[test]
    fn test_invalid_prefix() {
        let result = PrefixSpider::new(
            Vec::new(),
            vec![entity("bad", &["not a url"], WebentityStatus::In)],
        );
        assert!(matches!(result, Err(SpiderError::InvalidWebentity(_))));

        let result = PrefixSpider::new(
            Vec::new(),
            vec![entity("ftp", &["ftp://example.com/"], WebentityStatus::In)],
        );
        assert!(matches!(result, Err(SpiderError::InvalidWebentity(_))));
    }

    #[test]
    fn test_status_from_config_str() {
        assert_eq!(WebentityStatus::from_config_str("in"), Some(WebentityStatus::In));
        assert_eq!(WebentityStatus::from_config_str("undecided"), Some(WebentityStatus::Undecided));
        assert_eq!(WebentityStatus::from_config_str("IN"), None);
    }

    #[test]
    fn test_process_follows_in_entities_only() {
        let body = r#"<html><body>
            <a href="/about">about</a>
            <a href="/contact">contact</a>
            <a href="/shop/cart">cart</a>
            <a href="https://other.org/page">other</a>
            <a href="https://unknown.net/">unknown</a>
        </body></html>"#;
        let response = Response::new("https://example.com/", 200, body)
            .with_header("content-type", "text/html");
        let job = CrawlJob::new("https://example.com/");

        let output = spider().process(&job, &response).unwrap().unwrap();
        let urls: Vec<&str> = output.targets.iter().map(|t| t.url()).collect();
        assert_eq!(urls, vec!["https://example.com/about", "https://example.com/contact"]);

        let data = output.data.unwrap();
        assert_eq!(data["webentity"], "example");
        assert_eq!(data["status"], "in");
        assert_eq!(data["outlinks"]["example"], 2);
        assert_eq!(data["outlinks"]["example-shop"], 1);
        assert_eq!(data["outlinks"]["other"], 1);
    }

    #[test]
    fn test_tabulate_entity_edges() {
        let data = json!({
            "url": "https://example.com/",
            "webentity": "example",
            "outlinks": {"example": 2, "other": 1},
        });
        assert_eq!(
            spider().tabulate(&data),
            vec![
                vec!["example".to_string(), "example".to_string(), "2".to_string()],
                vec!["example".to_string(), "other".to_string(), "1".to_string()],
            ]
        );
        assert!(spider().tabulate(&json!({"webentity": null})).is_empty());
    }
}
