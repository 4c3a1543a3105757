//! Headless Chromium driven over CDP.

use std::fmt::Display;
use std::path::Path;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::network::{CookieParam, TimeSinceEpoch};
use chromiumoxide::element::Element;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::{Browser, BrowserConfig, Page};
use epf_protocol::Cookie;
use futures_util::StreamExt;
use tracing::{debug, info};

use super::{BrowserLauncher, Locator, PortalBrowser};
use crate::config::BrowserSettings;
use crate::error::{EpfError, Result};

fn browser_err(action: &str, err: impl Display) -> EpfError {
	EpfError::Browser(format!("{action}: {err}"))
}

/// A launched Chromium process with one working page.
pub struct ChromiumBrowser {
	browser: Browser,
	page: Page,
	handler_task: tokio::task::JoinHandle<()>,
	closed: bool,
}

impl ChromiumBrowser {
	pub async fn launch(settings: &BrowserSettings) -> Result<Self> {
		let mut builder = BrowserConfig::builder()
			.no_sandbox()
			.arg("--disable-dev-shm-usage")
			.arg("--disable-gpu")
			.arg(format!("--user-agent={}", settings.user_agent));
		if !settings.headless {
			builder = builder.with_head();
		}
		if let Some(exe) = &settings.executable {
			builder = builder.chrome_executable(exe);
		}
		let config = builder.build().map_err(|e| browser_err("invalid browser configuration", e))?;

		debug!(target = "epf.browser", headless = settings.headless, "launching chromium");
		let (browser, mut handler) = Browser::launch(config).await.map_err(|e| browser_err("failed to launch chromium", e))?;

		let handler_task = tokio::spawn(async move {
			while let Some(event) = handler.next().await {
				if let Err(e) = event {
					debug!(target = "epf.browser", error = %e, "cdp handler event error");
				}
			}
		});

		let page = browser.new_page("about:blank").await.map_err(|e| browser_err("failed to open page", e))?;
		info!(target = "epf.browser", "headless browser ready");

		Ok(Self {
			browser,
			page,
			handler_task,
			closed: false,
		})
	}

	async fn element(&self, locator: &Locator) -> Result<Element> {
		let found = match locator {
			Locator::Css(sel) => self.page.find_element(sel.as_str()).await,
			Locator::Xpath(expr) => self.page.find_xpath(expr.as_str()).await,
		};
		found.map_err(|e| browser_err(&format!("element {locator} not found"), e))
	}
}

#[async_trait]
impl PortalBrowser for ChromiumBrowser {
	async fn goto(&mut self, url: &str) -> Result<()> {
		self.page.goto(url).await.map_err(|e| browser_err(&format!("navigation to {url} failed"), e))?;
		Ok(())
	}

	async fn current_url(&mut self) -> Result<Option<String>> {
		self.page.url().await.map_err(|e| browser_err("failed to read page url", e))
	}

	async fn is_visible(&mut self, locator: &Locator) -> Result<bool> {
		let js = format!(
			"(() => {{ const el = {}; if (!el) return false; const s = window.getComputedStyle(el); const r = el.getBoundingClientRect(); \
			 return s.visibility !== 'hidden' && s.display !== 'none' && r.width > 0 && r.height > 0; }})()",
			locator.js_lookup()
		);
		match self.page.evaluate(js).await {
			Ok(result) => Ok(result.into_value::<bool>().unwrap_or(false)),
			Err(e) => {
				// Evaluation fails while a navigation swaps the execution context.
				debug!(target = "epf.browser", %locator, error = %e, "visibility probe failed");
				Ok(false)
			}
		}
	}

	async fn click(&mut self, locator: &Locator) -> Result<()> {
		let element = self.element(locator).await?;
		element.click().await.map_err(|e| browser_err(&format!("click on {locator} failed"), e))?;
		Ok(())
	}

	async fn fill(&mut self, locator: &Locator, text: &str) -> Result<()> {
		let element = self.element(locator).await?;
		element.click().await.map_err(|e| browser_err(&format!("focus on {locator} failed"), e))?;
		element.type_str(text).await.map_err(|e| browser_err(&format!("typing into {locator} failed"), e))?;
		Ok(())
	}

	async fn text(&mut self, locator: &Locator) -> Result<String> {
		let element = self.element(locator).await?;
		let text = element.inner_text().await.map_err(|e| browser_err(&format!("reading text of {locator} failed"), e))?;
		Ok(text.unwrap_or_default())
	}

	async fn cookies(&mut self) -> Result<Vec<Cookie>> {
		let cookies = self.page.get_cookies().await.map_err(|e| browser_err("failed to read cookies", e))?;
		Ok(cookies
			.into_iter()
			.map(|c| Cookie {
				name: c.name,
				value: c.value,
				domain: Some(c.domain),
				path: Some(c.path),
				expires: (!c.session).then_some(c.expires),
				http_only: c.http_only,
				secure: c.secure,
			})
			.collect())
	}

	async fn add_cookies(&mut self, cookies: &[Cookie]) -> Result<()> {
		let params: Vec<CookieParam> = cookies
			.iter()
			.map(|c| {
				let mut param = CookieParam::new(c.name.clone(), c.value.clone());
				param.domain = c.domain.clone();
				param.path = c.path.clone();
				param.expires = c.expires.filter(|ts| *ts >= 0.0).map(TimeSinceEpoch::new);
				param.http_only = Some(c.http_only);
				param.secure = Some(c.secure);
				param
			})
			.collect();
		self.page.set_cookies(params).await.map_err(|e| browser_err("failed to set cookies", e))?;
		Ok(())
	}

	async fn set_user_agent(&mut self, user_agent: &str) -> Result<()> {
		self.page.set_user_agent(user_agent).await.map_err(|e| browser_err("failed to override user agent", e))?;
		Ok(())
	}

	async fn screenshot(&mut self, path: &Path) -> Result<()> {
		let params = ScreenshotParams::builder().full_page(true).build();
		self.page.save_screenshot(params, path).await.map_err(|e| browser_err("screenshot failed", e))?;
		Ok(())
	}

	async fn close(&mut self) -> Result<()> {
		if self.closed {
			return Ok(());
		}
		self.closed = true;
		let closed = self.browser.close().await.map(|_| ()).map_err(|e| browser_err("failed to close browser", e));
		let _ = self.browser.wait().await;
		self.handler_task.abort();
		closed
	}
}

impl Drop for ChromiumBrowser {
	fn drop(&mut self) {
		self.handler_task.abort();
	}
}

/// Launches [`ChromiumBrowser`] instances.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChromiumLauncher;

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
	async fn launch(&self, settings: &BrowserSettings) -> Result<Box<dyn PortalBrowser>> {
		Ok(Box::new(ChromiumBrowser::launch(settings).await?))
	}
}
