use crate::crawler::{parse_html, Response};
use crate::job::{CrawlJob, CrawlTarget};
use crate::spider::{Spider, SpiderError, SpiderOutput};
use regex::Regex;
use serde_json::{json, Value};
use url::Url;

/// Marks pages matching a pattern as relevant
///
/// Data is `{"url", "title", "relevant", "matches"}`. Links are followed
/// when they match the follow pattern (all links when there is none), and
/// only from relevant pages if `follow_relevant_only` is set.
#[derive(Debug, Clone)]
pub struct RegexSpider {
    seeds: Vec<CrawlTarget>,
    pattern: Regex,
    follow_pattern: Option<Regex>,
    match_text: bool,
    follow_relevant_only: bool,
}

fn compile(pattern: &str) -> Result<Regex, SpiderError> {
    Regex::new(pattern).map_err(|source| SpiderError::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })
}

impl RegexSpider {
    /// Compiles both patterns
    ///
    /// # Returns
    ///
    /// * `Err(SpiderError::InvalidPattern)` - If either pattern does not compile
    pub fn new(
        seeds: Vec<CrawlTarget>,
        pattern: &str,
        follow_pattern: Option<&str>,
    ) -> Result<Self, SpiderError> {
        Ok(Self {
            seeds,
            pattern: compile(pattern)?,
            follow_pattern: follow_pattern.map(compile).transpose()?,
            match_text: false,
            follow_relevant_only: false,
        })
    }

    /// Match against the visible text instead of the raw body
    pub fn match_text(mut self, match_text: bool) -> Self {
        self.match_text = match_text;
        self
    }

    pub fn follow_relevant_only(mut self, follow_relevant_only: bool) -> Self {
        self.follow_relevant_only = follow_relevant_only;
        self
    }
}

impl Spider for RegexSpider {
    fn start(&self) -> Vec<CrawlTarget> {
        self.seeds.clone()
    }

    fn process(&self, _job: &CrawlJob, response: &Response) -> anyhow::Result<Option<SpiderOutput>> {
        if !response.is_success() || !response.is_html() {
            return Ok(None);
        }

        let base = Url::parse(&response.final_url)?;
        let body = response.text();
        let page = parse_html(&body, &base);

        let haystack = if self.match_text { page.text.as_str() } else { &body };
        let matches = self.pattern.find_iter(haystack).count();
        let relevant = matches > 0;

        let data = json!({
            "url": response.final_url,
            "title": page.title,
            "relevant": relevant,
            "matches": matches,
        });

        let mut output = SpiderOutput::new().with_data(data);

        if relevant || !self.follow_relevant_only {
            output = output.with_targets(page.links.into_iter().filter(|link| {
                self.follow_pattern
                    .as_ref()
                    .map_or(true, |follow| follow.is_match(link))
            }));
        }

        Ok(Some(output))
    }

    fn tabulate(&self, data: &Value) -> Vec<Vec<String>> {
        match (data.get("url"), data.get("relevant"), data.get("matches")) {
            (Some(Value::String(url)), Some(Value::Bool(true)), Some(matches)) => {
                vec![vec![url.clone(), matches.to_string()]]
            }
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><head><title>Rust news</title></head>
        <body><p>All about <b>Rust</b> and rust.</p>
        <a href="/blog/one">one</a><a href="/shop/two">two</a></body></html>"#;

    fn response(body: &str) -> Response {
        Response::new("https://example.com/", 200, body).with_header("content-type", "text/html")
    }

    fn job() -> CrawlJob {
        CrawlJob::new("https://example.com/")
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(matches!(
            RegexSpider::new(Vec::new(), "[", None),
            Err(SpiderError::InvalidPattern { .. })
        ));
        assert!(matches!(
            RegexSpider::new(Vec::new(), "ok", Some("(")),
            Err(SpiderError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_relevant_page() {
        let spider = RegexSpider::new(Vec::new(), "(?i)rust", None).unwrap();
        let output = spider.process(&job(), &response(PAGE)).unwrap().unwrap();
        let data = output.data.unwrap();

        assert_eq!(data["relevant"], true);
        // title + two occurrences in the body
        assert_eq!(data["matches"], 3);
        assert_eq!(output.targets.len(), 2);
    }

    #[test]
    fn test_match_text_ignores_markup() {
        let spider = RegexSpider::new(Vec::new(), "<b>", None)
            .unwrap()
            .match_text(true);
        let output = spider.process(&job(), &response(PAGE)).unwrap().unwrap();
        assert_eq!(output.data.unwrap()["relevant"], false);
    }

    #[test]
    fn test_follow_pattern_filters_links() {
        let spider = RegexSpider::new(Vec::new(), "Rust", Some("/blog/")).unwrap();
        let output = spider.process(&job(), &response(PAGE)).unwrap().unwrap();
        let urls: Vec<&str> = output.targets.iter().map(|t| t.url()).collect();
        assert_eq!(urls, vec!["https://example.com/blog/one"]);
    }

    #[test]
    fn test_follow_relevant_only() {
        let spider = RegexSpider::new(Vec::new(), "python", None)
            .unwrap()
            .follow_relevant_only(true);
        let output = spider.process(&job(), &response(PAGE)).unwrap().unwrap();
        assert!(output.targets.is_empty());

        let lenient = RegexSpider::new(Vec::new(), "python", None).unwrap();
        let output = lenient.process(&job(), &response(PAGE)).unwrap().unwrap();
        assert_eq!(output.targets.len(), 2);
    }

    #[test]
    fn test_tabulate_only_relevant() {
        let spider = RegexSpider::new(Vec::new(), "x", None).unwrap();
        assert_eq!(
            spider.tabulate(&json!({"url": "https://a.com/", "relevant": true, "matches": 2})),
            vec![vec!["https://a.com/".to_string(), "2".to_string()]]
        );
        assert!(spider
            .tabulate(&json!({"url": "https://a.com/", "relevant": false, "matches": 0}))
            .is_empty());
    }
}
