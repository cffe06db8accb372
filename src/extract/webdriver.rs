#![forbid(unsafe_code)]

//! [`PlaylistPage`] backed by a Chrome session driven over WebDriver.
//!
//! A chromedriver (or compatible) endpoint must be listening at
//! [`BrowserSettings::webdriver_url`]. All DOM access goes through small
//! scripts so each round trip returns plain JSON.

use std::time::Duration;

use async_trait::async_trait;
use fantoccini::error::CmdError;
use fantoccini::{Client, ClientBuilder, Locator};
use log::{debug, info, warn};
use serde_json::{Map, Value, json};
use tokio::time::timeout;

use super::{
    ExtractOptions, Extraction, PlaylistPage, PlaylistSource, RawItem, ScrollPolicy,
    extract_from_page, resolvers,
};
use crate::config::{DEFAULT_WEBDRIVER_URL, USER_AGENT};
use crate::error::ExtractError;

pub const ITEM_SELECTOR: &str = "ytd-playlist-video-renderer";

const COUNT_SCRIPT: &str =
    "return document.querySelectorAll('ytd-playlist-video-renderer').length;";

const SCROLL_SCRIPT: &str = "window.scrollTo(0, document.documentElement.scrollHeight);";

const ALTERNATE_SCROLL_SCRIPT: &str = r#"
window.scrollBy(0, window.innerHeight * 3);
const items = document.querySelectorAll('ytd-playlist-video-renderer');
if (items.length) { items[items.length - 1].scrollIntoView({ block: 'end' }); }
"#;

const SHOW_MORE_SCRIPT: &str = r#"
const candidates = document.querySelectorAll(
  'ytd-continuation-item-renderer button, tp-yt-paper-button, button, [role="button"]'
);
for (const el of candidates) {
  const label = ((el.getAttribute('aria-label') || '') + ' ' + (el.textContent || '')).toLowerCase();
  if ((label.includes('show more') || label.includes('load more')) && el.offsetParent !== null) {
    el.click();
    return true;
  }
}
return false;
"#;

const ITEMS_SCRIPT: &str = r#"
return Array.from(document.querySelectorAll('ytd-playlist-video-renderer')).map((el) => {
  const link = el.querySelector('a#video-title');
  return {
    href: link ? link.href : null,
    title: link ? (link.getAttribute('title') || link.textContent || '').trim() : '',
    metadata: Array.from(el.querySelectorAll('#metadata span, #video-info span'))
      .map((span) => (span.textContent || '').trim())
      .filter((text) => text.length > 0),
  };
});
"#;

const SNAPSHOT_SCRIPT: &str = r#"
const [selectors, metaKeys] = arguments;
const selectorTexts = {};
for (const selector of selectors) {
  const el = document.querySelector(selector);
  const text = el ? (el.textContent || '').trim() : '';
  if (text) { selectorTexts[selector] = text; }
}
const meta = {};
for (const key of metaKeys) {
  let el = null;
  if (key.startsWith('itemprop:')) {
    const name = key.slice('itemprop:'.length);
    el = document.querySelector(`[itemprop="${name}"] [itemprop="name"]`)
      || document.querySelector(`[itemprop="${name}"]`);
  } else {
    el = document.querySelector(`meta[property="${key}"]`)
      || document.querySelector(`meta[name="${key}"]`);
  }
  const value = el ? (el.getAttribute('content') || el.textContent || '').trim() : '';
  if (value) { meta[key] = value; }
}
const shortTexts = [];
for (const el of document.querySelectorAll('h1, h2, h3, yt-formatted-string')) {
  const text = (el.textContent || '').trim();
  if (text.length > 3 && text.length < 100) { shortTexts.push(text); }
  if (shortTexts.length >= 50) { break; }
}
return { selectorTexts, meta, documentTitle: document.title, url: location.href, shortTexts };
"#;

/// Where and how to open browser sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserSettings {
    pub webdriver_url: String,
    pub user_agent: String,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            webdriver_url: DEFAULT_WEBDRIVER_URL.to_string(),
            user_agent: USER_AGENT.to_string(),
        }
    }
}

/// Chrome capabilities for a session that looks like a regular desktop browser.
pub fn chrome_capabilities(headless: bool, user_agent: &str) -> Map<String, Value> {
    let mut args = vec![
        "--no-sandbox".to_string(),
        "--disable-setuid-sandbox".to_string(),
        "--disable-dev-shm-usage".to_string(),
        "--disable-blink-features=AutomationControlled".to_string(),
        "--window-size=1920,1080".to_string(),
        format!("--user-agent={user_agent}"),
    ];
    if headless {
        args.push("--headless=new".to_string());
    }

    let mut caps = Map::new();
    caps.insert("browserName".to_string(), json!("chrome"));
    caps.insert("goog:chromeOptions".to_string(), json!({ "args": args }));
    caps
}

fn browser_error(err: CmdError) -> ExtractError {
    ExtractError::Browser(err.to_string())
}

/// One open playlist tab. Closing is idempotent.
pub struct WebDriverPage {
    client: Option<Client>,
}

impl WebDriverPage {
    pub fn new(client: Client) -> Self {
        Self {
            client: Some(client),
        }
    }

    fn client(&self) -> Result<&Client, ExtractError> {
        self.client
            .as_ref()
            .ok_or_else(|| ExtractError::Browser("browser session already closed".into()))
    }

    async fn run(&self, script: &str, args: Vec<Value>) -> Result<Value, ExtractError> {
        self.client()?
            .execute(script, args)
            .await
            .map_err(browser_error)
    }
}

#[async_trait]
impl PlaylistPage for WebDriverPage {
    async fn wait_for_items(&mut self, limit: Duration) -> Result<(), ExtractError> {
        match self
            .client()?
            .wait()
            .at_most(limit)
            .for_element(Locator::Css(ITEM_SELECTOR))
            .await
        {
            Ok(_) => Ok(()),
            Err(CmdError::WaitTimeout) => Err(ExtractError::Timeout {
                timeout_ms: limit.as_millis() as u64,
            }),
            Err(err) => Err(browser_error(err)),
        }
    }

    async fn scroll_to_bottom(&mut self) -> Result<(), ExtractError> {
        self.run(SCROLL_SCRIPT, Vec::new()).await.map(drop)
    }

    async fn scroll_alternate(&mut self) -> Result<(), ExtractError> {
        self.run(ALTERNATE_SCROLL_SCRIPT, Vec::new()).await.map(drop)
    }

    async fn click_show_more(&mut self) -> Result<bool, ExtractError> {
        let clicked = self.run(SHOW_MORE_SCRIPT, Vec::new()).await?;
        Ok(clicked.as_bool().unwrap_or(false))
    }

    async fn item_count(&mut self) -> Result<usize, ExtractError> {
        let count = self.run(COUNT_SCRIPT, Vec::new()).await?;
        count
            .as_u64()
            .map(|count| count as usize)
            .ok_or_else(|| ExtractError::Browser(format!("unexpected item count {count}")))
    }

    async fn items(&mut self) -> Result<Vec<RawItem>, ExtractError> {
        let raw = self.run(ITEMS_SCRIPT, Vec::new()).await?;
        parse_items(raw)
    }

    async fn snapshot(&mut self) -> Result<resolvers::PageSnapshot, ExtractError> {
        let args = vec![
            json!(resolvers::snapshot_selectors()),
            json!(resolvers::META_KEYS),
        ];
        let raw = self.run(SNAPSHOT_SCRIPT, args).await?;
        serde_json::from_value(raw)
            .map_err(|err| ExtractError::Browser(format!("malformed page snapshot: {err}")))
    }

    async fn close(&mut self) -> Result<(), ExtractError> {
        match self.client.take() {
            Some(client) => client.close().await.map_err(browser_error),
            None => Ok(()),
        }
    }
}

fn parse_items(raw: Value) -> Result<Vec<RawItem>, ExtractError> {
    serde_json::from_value(raw)
        .map_err(|err| ExtractError::Browser(format!("malformed playlist items: {err}")))
}

/// [`PlaylistSource`] that opens a fresh browser session per playlist.
#[derive(Debug, Clone, Default)]
pub struct BrowserExtractor {
    settings: BrowserSettings,
    policy: ScrollPolicy,
}

impl BrowserExtractor {
    pub fn new(settings: BrowserSettings) -> Self {
        Self {
            settings,
            policy: ScrollPolicy::default(),
        }
    }

    /// Replaces the default scroll thresholds and settle times.
    pub fn with_policy(mut self, policy: ScrollPolicy) -> Self {
        self.policy = policy;
        self
    }

    async fn connect(&self, headless: bool) -> Result<Client, ExtractError> {
        debug!("opening browser session at {}", self.settings.webdriver_url);
        let mut builder = ClientBuilder::native();
        builder.capabilities(chrome_capabilities(headless, &self.settings.user_agent));
        builder
            .connect(&self.settings.webdriver_url)
            .await
            .map_err(|err| ExtractError::Session {
                endpoint: self.settings.webdriver_url.clone(),
                message: err.to_string(),
            })
    }
}

#[async_trait]
impl PlaylistSource for BrowserExtractor {
    async fn extract(
        &self,
        url: &str,
        options: &ExtractOptions,
    ) -> Result<Extraction, ExtractError> {
        let client = self.connect(options.headless).await?;

        info!("navigating to {url}");
        let navigation = match timeout(options.timeout, client.goto(url)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(ExtractError::Navigation {
                url: url.to_string(),
                message: err.to_string(),
            }),
            Err(_) => Err(ExtractError::Timeout {
                timeout_ms: options.timeout.as_millis() as u64,
            }),
        };

        let mut page = WebDriverPage::new(client);
        if let Err(err) = navigation {
            if let Err(close_err) = page.close().await {
                warn!("could not close browser session: {close_err}");
            }
            return Err(err);
        }

        extract_from_page(&mut page, options, &self.policy).await
    }
}
