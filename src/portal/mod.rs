pub mod parser;
pub mod raw_store;

pub use parser::{page_summary, parse_shift_page};
pub use raw_store::RawPageStore;

use anyhow::{Context, Result};
use chrono::Local;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::PortalConfig;
use crate::portal::parser::{attr, parse_attributes, text_content};
use crate::shift::Shift;

const CONNECT_TIMEOUT_SECS: u64 = 6;
const LOGIN_PATH: &str = "/services/login/";
const DEFAULT_NEXT: &str = "/services/";

static FORM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<form\b([^>]*)>(.*?)</form>").expect("form regex"));
static INPUT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<input\b([^>]*)/?>").expect("input regex"));
static ERRORLIST_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<([a-z][a-z0-9]*)\b[^>]*\bclass\s*=\s*["'][^"']*\berrorlist\b[^"']*["'][^>]*>"#)
        .expect("errorlist regex")
});

#[derive(Debug, Clone, Serialize)]
pub struct LoginOutcome {
    pub success: bool,
    pub message: String,
    pub debug: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ShiftPage {
    pub success: bool,
    #[serde(skip)]
    pub html: String,
    pub shifts: Vec<Shift>,
    pub message: String,
    pub debug: Vec<String>,
}

impl ShiftPage {
    fn failed(message: impl Into<String>, debug: Vec<String>) -> Self {
        Self {
            success: false,
            html: String::new(),
            shifts: Vec::new(),
            message: message.into(),
            debug,
        }
    }
}

/// Session with the member portal. Cookies persist for the life of the client,
/// so one client is one logged-in member.
pub struct PortalClient {
    client: Client,
    base_url: String,
}

#[derive(Debug, Default)]
struct LoginForm {
    action: Option<String>,
    csrf_token: String,
    next: String,
}

impl PortalClient {
    pub fn new(config: &PortalConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .cookie_store(true)
            .timeout(config.timeout())
            .connect_timeout(std::time::Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .context("failed to build portal HTTP client")?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn login(&self, member: &str, password: &str) -> LoginOutcome {
        let mut debug = Vec::new();
        match self.try_login(member, password, &mut debug).await {
            Ok((success, message)) => {
                info!(success, "portal login finished: {message}");
                LoginOutcome {
                    success,
                    message,
                    debug,
                }
            }
            Err(e) => {
                warn!(error = %e, "portal login request failed");
                debug.push(format!("Exception: {e:#}"));
                LoginOutcome {
                    success: false,
                    message: format!("Connection error: {e:#}"),
                    debug,
                }
            }
        }
    }

    async fn try_login(
        &self,
        member: &str,
        password: &str,
        debug: &mut Vec<String>,
    ) -> Result<(bool, String)> {
        let login_url = self.url(LOGIN_PATH);
        let response = self
            .client
            .get(&login_url)
            .send()
            .await
            .with_context(|| format!("failed GET request: {login_url}"))?;
        debug.push(format!("GET {login_url} -> {}", response.status().as_u16()));
        let page = response
            .text()
            .await
            .with_context(|| format!("failed reading response body: {login_url}"))?;

        let Some(form) = find_login_form(&page) else {
            debug.push("No <form> found on page".to_string());
            return Ok((false, "Could not find login form".to_string()));
        };
        let action = self.absolute(form.action.as_deref().unwrap_or(LOGIN_PATH));
        debug.push(format!("Form action: {action}"));
        debug.push(format!(
            "CSRF token: {}",
            if form.csrf_token.is_empty() {
                "MISSING"
            } else {
                "found"
            }
        ));

        let next = if form.next.is_empty() {
            DEFAULT_NEXT
        } else {
            form.next.as_str()
        };
        let fields = [
            ("csrfmiddlewaretoken", form.csrf_token.as_str()),
            ("username", member),
            ("password", password),
            ("next", next),
            ("submit", "Log In"),
        ];
        debug.push(format!(
            "Fields: {:?}",
            fields.iter().map(|(k, _)| *k).collect::<Vec<_>>()
        ));

        let response = self
            .client
            .post(&action)
            .header(reqwest::header::REFERER, login_url.as_str())
            .form(&fields)
            .send()
            .await
            .with_context(|| format!("failed POST request: {action}"))?;
        let final_url = response.url().to_string();
        debug.push(format!(
            "POST -> {}, URL: {final_url}",
            response.status().as_u16()
        ));
        let body = response
            .text()
            .await
            .with_context(|| format!("failed reading response body: {action}"))?;

        Ok(classify_login_response(&body, &final_url, debug))
    }

    /// Checks the session by loading the member home page.
    pub async fn verify_logged_in(&self) -> (bool, String) {
        let url = self.url("/services/home");
        match self.client.get(&url).send().await {
            Ok(resp) if resp.url().path().contains("/login/") => (
                false,
                "Session expired; redirected to login".to_string(),
            ),
            Ok(resp) => (true, format!("Home OK (status {})", resp.status().as_u16())),
            Err(e) => (false, format!("Home check failed: {e}")),
        }
    }

    pub async fn fetch_shifts(&self) -> ShiftPage {
        let mut debug = Vec::new();
        let (logged_in, message) = self.verify_logged_in().await;
        debug.push(format!("Home check: {message}"));
        if !logged_in {
            return ShiftPage::failed(message, debug);
        }

        let today = Local::now().format("%Y-%m-%d");
        let url = self.url(&format!("/services/shifts/0/0/0/{today}/"));
        debug.push(format!("Fetching: {url}"));

        let response = match self.client.get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "shift page request failed");
                debug.push(format!("Exception: {e}"));
                return ShiftPage::failed(format!("Request failed: {e}"), debug);
            }
        };
        let status = response.status();
        let final_url = response.url().clone();
        debug.push(format!("Status: {}, URL: {final_url}", status.as_u16()));

        if final_url.path().contains("/login/") {
            return ShiftPage::failed("Redirected to login; session not valid", debug);
        }
        if status != StatusCode::OK {
            return ShiftPage::failed(format!("HTTP {}", status.as_u16()), debug);
        }

        let html = match response.text().await {
            Ok(html) => html,
            Err(e) => return ShiftPage::failed(format!("Failed reading shift page: {e}"), debug),
        };
        debug.push(format!("HTML size: {} chars", html.len()));
        debug.push(page_summary(&html));

        let shifts = parse_shift_page(&html, &self.base_url);
        debug.push(format!("Parsed {} shifts", shifts.len()));
        debug!(shifts = shifts.len(), "parsed portal shift page");

        ShiftPage {
            success: true,
            html,
            shifts,
            message: "OK".to_string(),
            debug,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn absolute(&self, href: &str) -> String {
        if href.starts_with("http") {
            href.to_string()
        } else {
            self.url(href)
        }
    }
}

fn find_login_form(page: &str) -> Option<LoginForm> {
    let forms = FORM_RE.captures_iter(page).collect::<Vec<_>>();
    let chosen = forms
        .iter()
        .find(|caps| attr(&parse_attributes(&caps[1]), "id") == Some("loginform"))
        .or_else(|| forms.first())?;

    let form_attrs = parse_attributes(&chosen[1]);
    let mut form = LoginForm {
        action: attr(&form_attrs, "action")
            .filter(|a| !a.trim().is_empty())
            .map(str::to_string),
        ..LoginForm::default()
    };
    for input in INPUT_RE.captures_iter(&chosen[2]) {
        let attrs = parse_attributes(&input[1]);
        let value = attr(&attrs, "value").unwrap_or_default().to_string();
        match attr(&attrs, "name") {
            Some("csrfmiddlewaretoken") => form.csrf_token = value,
            Some("next") => form.next = value,
            _ => {}
        }
    }
    Some(form)
}

fn classify_login_response(body: &str, final_url: &str, debug: &mut Vec<String>) -> (bool, String) {
    let page = body.to_lowercase();
    if ["logout", "sign out", "log out"]
        .iter()
        .any(|marker| page.contains(marker))
    {
        return (true, "Login successful".to_string());
    }
    if ["invalid", "incorrect", "error"]
        .iter()
        .any(|marker| page.contains(marker))
    {
        let reason =
            errorlist_text(body).unwrap_or_else(|| "incorrect credentials".to_string());
        debug.push(format!("Error on page: {reason}"));
        return (false, format!("Login failed: {reason}"));
    }
    if final_url.contains("/login/") {
        debug.push("Still on login page after POST".to_string());
        return (false, "Login failed: redirected back to login".to_string());
    }
    (true, "Login successful".to_string())
}

/// Text of the first element carrying the `errorlist` class, whatever its tag.
fn errorlist_text(body: &str) -> Option<String> {
    let caps = ERRORLIST_RE.captures(body)?;
    let open = caps.get(0)?;
    let rest = &body[open.end()..];
    let closing = format!("</{}", caps[1].to_ascii_lowercase());
    let end = rest.to_ascii_lowercase().find(&closing).unwrap_or(rest.len());
    Some(text_content(&rest[..end])).filter(|text| !text.is_empty())
}
