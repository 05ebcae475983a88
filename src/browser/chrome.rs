//! Chromium implementation of [`OfferPage`] over chromiumoxide.
//!
//! DOM work happens in small scripts evaluated in the page. Arguments are
//! embedded as JSON so selectors and patterns never need escaping.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::Page;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::{CardSnapshot, CardSpec, CardState, Locator, OfferPage};
use crate::config::ResolvedConfig;
use crate::error::SessionError;
use crate::models::Bank;

const SCROLL_STEP: u64 = 650;
const SCROLL_DELAY: Duration = Duration::from_millis(110);

/// Shared helpers for every page script.
const PRELUDE: &str = r#"
const rx = (p) => (p ? new RegExp(p, 'i') : null);
const collapse = (s) => (s || '').replace(/\s+/g, ' ').trim();
const fingerprint = (s) => Array.from(collapse(s)).slice(0, 200).join('');
const visible = (el) => !!(el.offsetWidth || el.offsetHeight || el.getClientRects().length);
const label = (el) => (el.innerText || el.textContent || '') + ' ' + (el.getAttribute('aria-label') || '');
const matches = (loc) => {
  const text = rx(loc.text);
  const within = rx(loc.within);
  return Array.from(document.querySelectorAll(loc.css)).filter((el) => {
    if (!visible(el)) return false;
    if (text && !text.test(label(el))) return false;
    if (within) {
      let p = el.parentElement;
      while (p && !within.test(p.innerText || '')) p = p.parentElement;
      if (!p) return false;
    }
    return true;
  });
};
const rootOf = (el, root) => {
  const start = el.parentElement;
  if (!start) return null;
  if (root.kind === 'closest') return start.closest(root.value);
  if (root.kind === 'class_contains') return start.closest('[class*=' + JSON.stringify(root.value) + ']');
  const pattern = rx(root.value);
  let node = start;
  for (let i = 0; node && i < 8; i += 1, node = node.parentElement) {
    if (pattern.test(node.innerText || '')) return node;
  }
  return null;
};
const cardsOf = (spec) => {
  const seen = new Set();
  const out = [];
  for (const loc of spec.controls) {
    for (const control of matches(loc)) {
      const card = rootOf(control, spec.root) || control.parentElement;
      if (!card || seen.has(card)) continue;
      seen.add(card);
      out.push({ card, control });
    }
  }
  return out;
};
const findCard = (spec, fp) => cardsOf(spec).find((c) => fingerprint(c.card.innerText) === fp);
const press = (el) => {
  const target = el.closest('button,[role="button"]') || el;
  target.scrollIntoView({ block: 'center' });
  target.click();
};
"#;

fn script(args: serde_json::Value, body: &str) -> String {
    format!("(() => {{ const args = {args};\n{PRELUDE}\n{body} }})()")
}

/// Page handle for one portal run.
pub struct ChromePage {
    page: Page,
}

impl ChromePage {
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    async fn eval<T: DeserializeOwned>(&self, js: String) -> Result<T> {
        let result = self
            .page
            .evaluate(js)
            .await
            .context("Failed to evaluate page script")?;
        result
            .into_value()
            .context("Page script returned an unexpected value")
    }
}

/// Same document with only the fragment changed (single-page app routes).
fn same_document(current: &str, target: &str) -> bool {
    match (current.split_once('#'), target.split_once('#')) {
        (Some((a, _)), Some((b, _))) => a == b,
        (None, Some((b, _))) => current == b,
        _ => false,
    }
}

#[async_trait]
impl OfferPage for ChromePage {
    async fn goto(&self, url: &str) -> Result<()> {
        let current = self.current_url().await.unwrap_or_default();
        if same_document(&current, url) {
            let js = format!("(() => {{ window.location.href = {}; return true; }})()", json!(url));
            let _: bool = self.eval(js).await?;
            return Ok(());
        }
        self.page
            .goto(url)
            .await
            .with_context(|| format!("Failed to navigate to {url}"))?;
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.page.url().await?.unwrap_or_default())
    }

    async fn reload(&self) -> Result<()> {
        self.page.reload().await.context("Failed to reload page")?;
        Ok(())
    }

    async fn go_back(&self) -> Result<()> {
        let _: bool = self
            .eval("(() => { window.history.back(); return true; })()".to_string())
            .await?;
        Ok(())
    }

    async fn exists(&self, locator: &Locator) -> Result<bool> {
        self.eval(script(json!({ "loc": locator }), "return matches(args.loc).length > 0;"))
            .await
    }

    async fn click(&self, locator: &Locator) -> Result<bool> {
        self.eval(script(
            json!({ "loc": locator }),
            "const el = matches(args.loc)[0]; if (!el) return false; press(el); return true;",
        ))
        .await
    }

    async fn text_of(&self, locator: &Locator) -> Result<Option<String>> {
        let text: String = self
            .eval(script(
                json!({ "loc": locator }),
                "return matches(args.loc).map((el) => el.innerText || '').filter((t) => t.trim()).join('\\n');",
            ))
            .await?;
        Ok(Some(text).filter(|t| !t.is_empty()))
    }

    async fn page_text(&self) -> Result<String> {
        self.eval("(() => document.body ? document.body.innerText : '')()".to_string())
            .await
    }

    async fn scroll_through(&self) -> Result<()> {
        let height: u64 = self
            .eval(
                "(() => Math.max(document.body.scrollHeight, document.documentElement.scrollHeight))()"
                    .to_string(),
            )
            .await?;
        let mut y = 0;
        while y < height + 400 {
            let _: bool = self
                .eval(format!("(() => {{ window.scrollTo(0, {y}); return true; }})()"))
                .await?;
            tokio::time::sleep(SCROLL_DELAY).await;
            y += SCROLL_STEP;
        }
        let _: bool = self
            .eval("(() => { window.scrollTo(0, 0); return true; })()".to_string())
            .await?;
        Ok(())
    }

    async fn cards(&self, spec: &CardSpec) -> Result<Vec<CardSnapshot>> {
        self.eval(script(
            json!({ "spec": spec }),
            r#"
            const enrolled = rx(args.spec.enrolled_text);
            const pick = (card, css) => {
              if (!css) return null;
              const el = card.querySelector(css);
              const text = el ? (el.innerText || '').trim() : '';
              return text || null;
            };
            return cardsOf(args.spec).map(({ card }) => ({
              text: card.innerText || '',
              heading: pick(card, args.spec.heading),
              expiration: pick(card, args.spec.expiration),
              enrolled: !!(enrolled && enrolled.test(card.innerText || '')),
            }));
            "#,
        ))
        .await
    }

    async fn click_in_card(&self, spec: &CardSpec, fingerprint: &str) -> Result<bool> {
        self.eval(script(
            json!({ "spec": spec, "fp": fingerprint }),
            "const hit = findCard(args.spec, args.fp); if (!hit) return false; press(hit.control); return true;",
        ))
        .await
    }

    async fn card_state(&self, spec: &CardSpec, fingerprint: &str) -> Result<CardState> {
        self.eval(script(
            json!({ "spec": spec, "fp": fingerprint }),
            r#"
            const hit = findCard(args.spec, args.fp);
            if (!hit) return 'gone';
            const enrolled = rx(args.spec.enrolled_text);
            return enrolled && enrolled.test(hit.card.innerText || '') ? 'enrolled' : 'pending';
            "#,
        ))
        .await
    }
}

/// A running (or attached) browser plus the page used for the run.
pub struct BrowserSession {
    browser: Browser,
    handler_task: JoinHandle<()>,
    page: ChromePage,
    close_on_exit: bool,
}

impl BrowserSession {
    /// Launch Chrome on the bank's profile, or attach to `browser.debug_url`.
    pub async fn start(config: &ResolvedConfig, bank: Bank) -> Result<Self> {
        let (browser, mut handler, attached) = match config.browser.debug_url.as_deref() {
            Some(url) => {
                info!(url, "Attaching to running Chrome");
                let (browser, handler) = Browser::connect(url)
                    .await
                    .map_err(|e| SessionError::Launch(e.to_string()))?;
                (browser, handler, true)
            }
            None => {
                let profile_dir = config.profile_path(bank);
                std::fs::create_dir_all(&profile_dir).with_context(|| {
                    format!("Failed to create profile dir: {}", profile_dir.display())
                })?;
                let chrome = match config.browser.chrome_executable.clone() {
                    Some(path) => path,
                    None => find_chrome().ok_or(SessionError::BrowserNotFound)?,
                };
                let (browser, handler) =
                    launch_browser(&chrome, &profile_dir, config.browser.headless).await?;
                (browser, handler, false)
            }
        };

        let handler_task = tokio::spawn(async move { while (handler.next().await).is_some() {} });

        let existing = if attached {
            browser.pages().await.unwrap_or_default().into_iter().next()
        } else {
            None
        };
        let page = match existing {
            Some(page) => page,
            None => browser.new_page("about:blank").await?,
        };

        Ok(Self {
            browser,
            handler_task,
            page: ChromePage::new(page),
            close_on_exit: config.browser.close_on_exit,
        })
    }

    pub fn page(&self) -> &ChromePage {
        &self.page
    }

    /// Close the browser, or keep it open until Ctrl+C when configured to.
    pub async fn finish(self) -> Result<()> {
        if !self.close_on_exit {
            println!("Browser left open. Press Ctrl+C to exit.");
            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for Ctrl+C")?;
        }
        self.close();
        Ok(())
    }

    /// Close the browser now, ignoring `close_on_exit`.
    pub fn close(self) {
        drop(self.page);
        drop(self.browser);
        self.handler_task.abort();
        debug!("Browser session closed");
    }
}

async fn launch_browser(
    chrome: &Path,
    profile_dir: &Path,
    headless: bool,
) -> Result<(Browser, chromiumoxide::handler::Handler)> {
    let mut builder = BrowserConfig::builder()
        .chrome_executable(chrome)
        .viewport(None)
        .user_data_dir(profile_dir)
        .arg("--disable-blink-features=AutomationControlled")
        .arg("--disable-infobars")
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--lang=en-US,en");
    if !headless {
        builder = builder.with_head();
    }
    let config = builder
        .build()
        .map_err(|e| SessionError::Launch(format!("invalid browser config: {e}")))?;

    let (browser, handler) = Browser::launch(config)
        .await
        .map_err(|e| SessionError::Launch(e.to_string()))?;

    Ok((browser, handler))
}

/// Find a Chrome/Chromium executable on PATH or in well-known locations.
pub fn find_chrome() -> Option<PathBuf> {
    for name in ["google-chrome", "google-chrome-stable", "chromium", "chromium-browser"] {
        if let Ok(output) = std::process::Command::new("which").arg(name).output() {
            if output.status.success() {
                let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if !path.is_empty() {
                    return Some(PathBuf::from(path));
                }
            }
        }
    }

    let candidates = [
        "/usr/bin/google-chrome",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        "/snap/bin/chromium",
        "/run/current-system/sw/bin/google-chrome",
        "/run/current-system/sw/bin/chromium",
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
    ];

    candidates
        .into_iter()
        .map(PathBuf::from)
        .find(|candidate| candidate.exists())
}
