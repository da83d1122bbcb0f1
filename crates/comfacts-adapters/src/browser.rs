//! Headless-browser logo lookup for professional-network company pages.

use std::path::PathBuf;
use std::time::Duration;

use scraper::{Html, Selector};

/// Substring of the delayed-load URL that LinkedIn uses for company logos.
pub const LOGO_MARKER: &str = "company-logo";
pub const LOGO_CONTAINER_CLASS: &str = "org-top-card-primary-content__logo-container";

#[derive(Debug, Clone)]
pub struct LocatorConfig {
    /// Fixed wait after navigation so client-rendered markup can populate.
    pub settle: Duration,
    pub navigation_timeout: Duration,
    pub chrome_executable: Option<PathBuf>,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            settle: Duration::from_secs(5),
            navigation_timeout: Duration::from_secs(30),
            chrome_executable: None,
        }
    }
}

/// Scans rendered markup for the company logo, in DOM order.
///
/// Any `<img>` whose `data-delayed-url` carries [`LOGO_MARKER`] wins; failing that,
/// the `src` of the first image inside the first logo container.
pub fn find_logo_url(html: &str) -> Option<String> {
    let document = Html::parse_document(html);

    let delayed = Selector::parse("img[data-delayed-url]").ok()?;
    let marked = document
        .select(&delayed)
        .filter_map(|img| img.value().attr("data-delayed-url"))
        .find(|url| url.contains(LOGO_MARKER));
    if let Some(url) = marked {
        return Some(url.to_string());
    }

    let container = Selector::parse(&format!("div.{LOGO_CONTAINER_CLASS}")).ok()?;
    let img = Selector::parse("img").ok()?;
    document
        .select(&container)
        .next()?
        .select(&img)
        .next()?
        .value()
        .attr("src")
        .filter(|src| !src.is_empty())
        .map(str::to_string)
}

#[cfg(feature = "browser")]
pub use chromium::ChromiumLogoLocator;

#[cfg(feature = "browser")]
mod chromium {
    use async_trait::async_trait;
    use chromiumoxide::{Browser, BrowserConfig};
    use futures::StreamExt;
    use tracing::{debug, warn};

    use super::{find_logo_url, LocatorConfig};
    use crate::{AdapterError, LogoLocator};

    /// Launches a fresh headless Chromium with a throwaway profile for every lookup.
    pub struct ChromiumLogoLocator {
        config: LocatorConfig,
    }

    impl ChromiumLogoLocator {
        pub fn new(config: LocatorConfig) -> Self {
            Self { config }
        }

        async fn render(&self, browser: &Browser, page_url: &str) -> Result<String, AdapterError> {
            let page = browser.new_page(page_url).await?;
            tokio::time::sleep(self.config.settle).await;
            let html = page.content().await;
            if let Err(err) = page.close().await {
                debug!("closing page failed: {err}");
            }
            Ok(html?)
        }
    }

    #[async_trait]
    impl LogoLocator for ChromiumLogoLocator {
        async fn locate_logo(&self, page_url: &str) -> Result<Option<String>, AdapterError> {
            let profile = tempfile::tempdir().map_err(|e| AdapterError::Message(e.to_string()))?;

            let mut builder = BrowserConfig::builder()
                .user_data_dir(profile.path())
                .request_timeout(self.config.navigation_timeout)
                .arg("--disable-gpu")
                .arg("--no-sandbox")
                .arg("--disable-dev-shm-usage")
                .arg("--no-first-run");
            if let Some(path) = &self.config.chrome_executable {
                builder = builder.chrome_executable(path);
            }
            let browser_config = builder.build().map_err(AdapterError::Message)?;

            let (mut browser, mut handler) = Browser::launch(browser_config).await?;
            let events = tokio::spawn(async move {
                while let Some(event) = handler.next().await {
                    if event.is_err() {
                        break;
                    }
                }
            });

            let rendered = self.render(&browser, page_url).await;

            // Teardown runs on every path before the render result is inspected.
            if let Err(err) = browser.close().await {
                warn!(page_url, "closing browser failed: {err}");
            }
            if let Err(err) = browser.wait().await {
                warn!(page_url, "waiting for browser exit failed: {err}");
            }
            events.abort();
            drop(profile);

            let logo = find_logo_url(&rendered?);
            debug!(page_url, found = logo.is_some(), "logo lookup");
            Ok(logo)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delayed_url_marker_wins_in_dom_order() {
        let html = r#"
            <html><body>
              <img data-delayed-url="https://media.licdn.com/banner.jpg">
              <img data-delayed-url="https://media.licdn.com/dms/image/company-logo_200_200/acme.png">
              <img data-delayed-url="https://media.licdn.com/dms/image/company-logo_100_100/other.png">
              <div class="org-top-card-primary-content__logo-container">
                <img src="https://media.licdn.com/container.png">
              </div>
            </body></html>"#;
        assert_eq!(
            find_logo_url(html).as_deref(),
            Some("https://media.licdn.com/dms/image/company-logo_200_200/acme.png")
        );
    }

    #[test]
    fn falls_back_to_logo_container() {
        let html = r#"
            <div class="top-card org-top-card-primary-content__logo-container">
              <span><img alt="Acme" src="https://media.licdn.com/acme-container.png"></span>
            </div>"#;
        assert_eq!(
            find_logo_url(html).as_deref(),
            Some("https://media.licdn.com/acme-container.png")
        );
    }

    #[test]
    fn no_heuristic_match_is_none() {
        assert_eq!(find_logo_url("<img src=\"https://example.com/a.png\">"), None);
        assert_eq!(
            find_logo_url(r#"<div class="org-top-card-primary-content__logo-container"><img alt="x"></div>"#),
            None
        );
    }
}
