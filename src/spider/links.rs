use crate::crawler::{parse_html, Response};
use crate::job::{CrawlJob, CrawlTarget};
use crate::spider::{Spider, SpiderOutput};
use serde_json::{json, Value};
use url::Url;

/// Follows every link of every HTML page
///
/// Data is `{"url", "title", "links"}` where `links` holds the absolute
/// outgoing URLs; [`tabulate`](Spider::tabulate) turns it into link edges.
#[derive(Debug, Clone, Default)]
pub struct LinkSpider {
    seeds: Vec<CrawlTarget>,
}

impl LinkSpider {
    pub fn new(seeds: Vec<CrawlTarget>) -> Self {
        Self { seeds }
    }
}

impl Spider for LinkSpider {
    fn start(&self) -> Vec<CrawlTarget> {
        self.seeds.clone()
    }

    fn process(&self, _job: &CrawlJob, response: &Response) -> anyhow::Result<Option<SpiderOutput>> {
        if !response.is_success() || !response.is_html() {
            return Ok(None);
        }

        let base = Url::parse(&response.final_url)?;
        let page = parse_html(&response.text(), &base);

        let data = json!({
            "url": response.final_url,
            "title": page.title,
            "links": page.links,
        });

        Ok(Some(
            SpiderOutput::new()
                .with_data(data)
                .with_targets(page.links),
        ))
    }

    fn tabulate(&self, data: &Value) -> Vec<Vec<String>> {
        let Some(source) = data.get("url").and_then(Value::as_str) else {
            return Vec::new();
        };

        data.get("links")
            .and_then(Value::as_array)
            .map(|links| {
                links
                    .iter()
                    .filter_map(Value::as_str)
                    .map(|target| vec![source.to_string(), target.to_string()])
                    .collect()
            })
            .unwrap_or_default()
    }
}
