use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{AdapterError, PageSession};

/// Captured regions of one page.
///
/// `regions` are always present; `seasons` override them once the matching
/// season has been selected. `empty_reads` makes the first N reads of a region
/// (per selected season) come back empty, the way a page still rendering does.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixturePage {
    #[serde(default)]
    pub regions: BTreeMap<String, String>,
    #[serde(default)]
    pub seasons: BTreeMap<String, BTreeMap<String, String>>,
    #[serde(default)]
    pub empty_reads: BTreeMap<String, u32>,
}

impl FixturePage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn region(mut self, selector: &str, markup: impl Into<String>) -> Self {
        self.regions.insert(selector.to_string(), markup.into());
        self
    }

    pub fn season_region(mut self, season: i32, selector: &str, markup: impl Into<String>) -> Self {
        self.seasons
            .entry(season.to_string())
            .or_default()
            .insert(selector.to_string(), markup.into());
        self
    }

    pub fn empty_reads(mut self, selector: &str, reads: u32) -> Self {
        self.empty_reads.insert(selector.to_string(), reads);
        self
    }

    fn lookup(&self, season: Option<&str>, selector: &str) -> Option<&str> {
        season
            .and_then(|s| self.seasons.get(s))
            .and_then(|regions| regions.get(selector))
            .or_else(|| self.regions.get(selector))
            .map(String::as_str)
    }
}

/// Pages keyed by URL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixtureSet {
    #[serde(default)]
    pub pages: BTreeMap<String, FixturePage>,
}

impl FixtureSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, url: &str, page: FixturePage) -> Self {
        self.pages.insert(url.to_string(), page);
        self
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&data).with_context(|| format!("parsing {}", path.display()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ReadKey {
    url: String,
    season: Option<String>,
    selector: String,
}

/// [`PageSession`] over a [`FixtureSet`]. No I/O and no waiting.
#[derive(Debug, Clone)]
pub struct FixtureSession {
    set: FixtureSet,
    current: Option<String>,
    season: Option<String>,
    reads: HashMap<ReadKey, u32>,
}

impl FixtureSession {
    pub fn new(set: FixtureSet) -> Self {
        Self {
            set,
            current: None,
            season: None,
            reads: HashMap::new(),
        }
    }

    /// Total `text` calls made for `selector` across pages and seasons.
    pub fn read_count(&self, selector: &str) -> u32 {
        self.reads
            .iter()
            .filter(|(key, _)| key.selector == selector)
            .map(|(_, count)| *count)
            .sum()
    }

    fn current_page(&self) -> Result<(&str, &FixturePage), AdapterError> {
        let url = self
            .current
            .as_deref()
            .ok_or_else(|| AdapterError::Message("no page loaded".to_string()))?;
        let page = self
            .set
            .pages
            .get(url)
            .ok_or_else(|| AdapterError::Message(format!("no fixture page for {url}")))?;
        Ok((url, page))
    }
}

#[async_trait]
impl PageSession for FixtureSession {
    async fn fetch(&mut self, url: &str) -> Result<(), AdapterError> {
        if !self.set.pages.contains_key(url) {
            return Err(AdapterError::Message(format!("no fixture page for {url}")));
        }
        self.current = Some(url.to_string());
        self.season = None;
        Ok(())
    }

    async fn text(&mut self, region: &str) -> Result<String, AdapterError> {
        let (url, page) = self.current_page()?;
        let season = self.season.clone();
        let markup = page
            .lookup(season.as_deref(), region)
            .map(str::to_string)
            .ok_or_else(|| AdapterError::not_found(region))?;
        let empty_reads = page.empty_reads.get(region).copied().unwrap_or(0);
        let key = ReadKey {
            url: url.to_string(),
            season,
            selector: region.to_string(),
        };

        let count = self.reads.entry(key).or_insert(0);
        *count += 1;
        if *count <= empty_reads {
            return Ok(String::new());
        }
        Ok(markup)
    }

    async fn select_option(&mut self, _selector: &str, value: &str) -> Result<(), AdapterError> {
        self.current_page()?;
        self.season = Some(value.to_string());
        Ok(())
    }

    async fn wait_until_visible(&mut self, selector: &str, _timeout: Duration) -> Result<bool, AdapterError> {
        let (_, page) = self.current_page()?;
        Ok(page
            .lookup(self.season.as_deref(), selector)
            .is_some_and(|markup| !markup.trim().is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const URL: &str = "https://example.test/pelaaja/1";

    fn session() -> FixtureSession {
        FixtureSession::new(
            FixtureSet::new().page(
                URL,
                FixturePage::new()
                    .region("#dob", "<div id=\"dob\">01.01.2008</div>")
                    .region("#teams", "<div id=\"teams\"></div>")
                    .season_region(2024, "#teams", "<div id=\"teams\">Tappara</div>")
                    .empty_reads("#dob", 1),
            ),
        )
    }

    #[tokio::test]
    async fn season_regions_override_base_regions() {
        let mut session = session();
        session.fetch(URL).await.unwrap();
        assert!(!session.wait_until_visible("#teams", Duration::ZERO).await.unwrap());

        session.select_option("select", "2024").await.unwrap();
        assert!(session.text("#teams").await.unwrap().contains("Tappara"));
        assert!(session.wait_until_visible("#teams", Duration::ZERO).await.unwrap());
    }

    #[tokio::test]
    async fn empty_reads_precede_content() {
        let mut session = session();
        session.fetch(URL).await.unwrap();
        assert_eq!(session.text("#dob").await.unwrap(), "");
        assert!(session.text("#dob").await.unwrap().contains("01.01.2008"));
        assert_eq!(session.read_count("#dob"), 2);
    }

    #[tokio::test]
    async fn unknown_regions_and_pages_are_errors() {
        let mut session = session();
        assert!(session.text("#dob").await.is_err());
        assert!(session.fetch("https://example.test/missing").await.is_err());
        session.fetch(URL).await.unwrap();
        assert!(session.text("#age").await.unwrap_err().is_not_found());
    }

    #[test]
    fn fixture_sets_load_from_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r##"{{"pages": {{"{URL}": {{"regions": {{"#dob": "x"}}, "seasons": {{"2025": {{"#teams": "y"}}}}}}}}}}"##
        )
        .unwrap();
        let set = FixtureSet::from_json_file(file.path()).unwrap();
        let page = &set.pages[URL];
        assert_eq!(page.lookup(Some("2025"), "#teams"), Some("y"));
        assert_eq!(page.lookup(None, "#dob"), Some("x"));
        assert!(page.empty_reads.is_empty());
    }
}
