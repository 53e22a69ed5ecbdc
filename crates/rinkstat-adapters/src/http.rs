use std::time::Duration;

use async_trait::async_trait;
use rinkstat_storage::HttpFetcher;
use tracing::debug;

use crate::{select_region_html, selectors, AdapterError, PageSession};

#[derive(Debug, Clone)]
pub struct HttpSessionConfig {
    /// Query parameter carrying the selected season on a re-fetch.
    pub season_query_param: String,
}

impl Default for HttpSessionConfig {
    fn default() -> Self {
        Self {
            season_query_param: "season".to_string(),
        }
    }
}

/// [`PageSession`] for server-rendered pages fetched over HTTP.
///
/// Selecting a season re-fetches the current page with the season as a query
/// parameter; nothing renders after load, so visibility checks never wait.
#[derive(Debug)]
pub struct HttpPageSession {
    fetcher: HttpFetcher,
    config: HttpSessionConfig,
    page_url: Option<String>,
    body: Option<String>,
}

impl HttpPageSession {
    pub fn new(fetcher: HttpFetcher, config: HttpSessionConfig) -> Self {
        Self {
            fetcher,
            config,
            page_url: None,
            body: None,
        }
    }

    async fn load(&mut self, url: &str) -> Result<(), AdapterError> {
        let response = self.fetcher.fetch_text(url).await?;
        debug!(url, status = %response.status, bytes = response.body.len(), "page loaded");
        self.body = Some(response.body);
        Ok(())
    }

    fn body(&self) -> Result<&str, AdapterError> {
        self.body
            .as_deref()
            .ok_or_else(|| AdapterError::Message("no page loaded".to_string()))
    }

    fn season_url(&self, season: &str) -> Result<String, AdapterError> {
        let base = self
            .page_url
            .as_deref()
            .ok_or_else(|| AdapterError::Message("no page loaded".to_string()))?;
        let separator = if base.contains('?') { '&' } else { '?' };
        Ok(format!("{base}{separator}{}={season}", self.config.season_query_param))
    }
}

#[async_trait]
impl PageSession for HttpPageSession {
    async fn fetch(&mut self, url: &str) -> Result<(), AdapterError> {
        self.load(url).await?;
        self.page_url = Some(url.to_string());
        Ok(())
    }

    async fn text(&mut self, region: &str) -> Result<String, AdapterError> {
        select_region_html(self.body()?, region)?.ok_or_else(|| AdapterError::not_found(region))
    }

    async fn select_option(&mut self, selector: &str, value: &str) -> Result<(), AdapterError> {
        if selector != selectors::SEASON_SELECT {
            return Err(AdapterError::Message(format!(
                "option selection is only supported on {}",
                selectors::SEASON_SELECT
            )));
        }
        let url = self.season_url(value)?;
        self.load(&url).await
    }

    async fn wait_until_visible(&mut self, selector: &str, _timeout: Duration) -> Result<bool, AdapterError> {
        let Some(markup) = select_region_html(self.body()?, selector)? else {
            return Ok(false);
        };
        Ok(!scraper::Html::parse_fragment(&markup)
            .root_element()
            .text()
            .collect::<String>()
            .trim()
            .is_empty())
    }
}
