// src/site.rs
//
// Declarative per-site configuration. One immutable SiteConfig replaces the
// original scattered per-site URL tables and subclass overrides: the session
// machine is generic, the config tells it where the pages live and how to
// recognize them.

use std::collections::HashMap;
use std::path::Path;

use crate::error::{Result, ScrapeError};
use crate::keypad::SampleRegion;
use crate::params::{MAX_DELAY_SECS, MAX_RETRIES};

/// Tagged route names. A route's path is path+query starting with `/`;
/// resource paths may contain `{id}`.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum RouteKind {
    /// GET: the page carrying the login form (and keypad, if any).
    LoginForm,
    /// POST target for credentials.
    LoginSubmit,
    /// Logged-in landing page.
    Landing,
    /// Named data resource (accounts list, history, statement, ...).
    Resource(String),
}

/// Immutable name → path table.
#[derive(Clone, Debug, Default)]
pub struct RouteTable {
    routes: Vec<(RouteKind, String)>,
}

impl RouteTable {
    pub fn new(routes: Vec<(RouteKind, String)>) -> Self {
        RouteTable { routes }
    }

    pub fn path(&self, kind: &RouteKind) -> Option<&str> {
        self.routes
            .iter()
            .find(|(k, _)| k == kind)
            .map(|(_, p)| p.as_str())
    }

    pub fn resource(&self, name: &str) -> Result<&str> {
        self.path(&RouteKind::Resource(s!(name)))
            .ok_or_else(|| ScrapeError::UnknownRoute(s!(name)))
    }
}

/// Substring markers that drive the state machine's transition predicates.
#[derive(Clone, Debug)]
pub struct PageMarkers {
    /// Present on any logged-in page (e.g. the sign-off link).
    pub logged_in: String,
    /// Present on the login page; seeing it mid-session means expiry.
    pub login_form: String,
    /// Marker preceding the "next page" link on paginated resources.
    pub next_control: String,
}

/// How the secret is submitted.
#[derive(Clone, Debug)]
pub enum SecretScheme {
    /// Secret goes into the form as-is.
    Plain,
    /// Secret is translated to positional indices via the keypad decoder.
    Keypad(KeypadSpec),
}

#[derive(Clone, Debug)]
pub struct KeypadSpec {
    /// Marker for the HTML section containing the key `<img>` tags.
    pub image_marker: String,
    pub region: SampleRegion,
    pub ink_threshold: u16,
}

impl KeypadSpec {
    /// Stock digit keypad rendering.
    pub fn digits(image_marker: &str) -> Self {
        KeypadSpec {
            image_marker: s!(image_marker),
            region: SampleRegion { x0: 19, y0: 17, width: 8, height: 10 },
            ink_threshold: 450,
        }
    }
}

/// Bounded attempt counter + backoff schedule for one recoverable operation.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    /// Total attempts before giving up.
    pub max_retries: u32,
    /// Ceiling on the exponential backoff, in seconds.
    pub max_delay_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy { max_retries: MAX_RETRIES, max_delay_secs: MAX_DELAY_SECS }
    }
}

impl RetryPolicy {
    /// Delay before retrying after failed attempt `attempt` (0-based):
    /// min(max_delay, 2^attempt) seconds.
    pub fn delay_secs(&self, attempt: u32) -> u64 {
        let exp = if attempt >= 63 { u64::MAX } else { 1u64 << attempt };
        exp.min(self.max_delay_secs)
    }
}

/// Form field names for the login submit.
#[derive(Clone, Debug)]
pub struct LoginFields {
    pub username: String,
    pub secret: String,
    /// Fixed extra fields (e.g. a birth date the site also asks for).
    pub extra: Vec<(String, String)>,
}

/// Everything the session machine needs to drive one site.
#[derive(Clone, Debug)]
pub struct SiteConfig {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub routes: RouteTable,
    pub markers: PageMarkers,
    pub login_fields: LoginFields,
    pub secret: SecretScheme,
    pub retry: RetryPolicy,
}

impl SiteConfig {
    /// Load a site description from a `key = value` file. Unknown keys are
    /// rejected so typos surface early. `route.<name>` keys populate the
    /// resource table.
    pub fn from_file(path: &Path) -> Result<SiteConfig> {
        let text = std::fs::read_to_string(path)?;
        Self::from_str(&text)
    }

    pub fn from_str(text: &str) -> Result<SiteConfig> {
        let mut kv: HashMap<String, String> = HashMap::new();
        let mut routes: Vec<(RouteKind, String)> = Vec::new();
        let mut extra: Vec<(String, String)> = Vec::new();

        for (lineno, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let eq = line.find('=').ok_or_else(|| {
                ScrapeError::Config(format!("line {}: expected key = value", lineno + 1))
            })?;
            let key = line[..eq].trim().to_string();
            let value = line[eq + 1..].trim().to_string();

            if let Some(name) = key.strip_prefix("route.") {
                routes.push((RouteKind::Resource(s!(name)), value));
            } else if let Some(name) = key.strip_prefix("field.") {
                extra.push((s!(name), value));
            } else {
                kv.insert(key, value);
            }
        }

        fn take(kv: &mut HashMap<String, String>, key: &str) -> Result<String> {
            kv.remove(key)
                .ok_or_else(|| ScrapeError::Config(format!("missing key: {key}")))
        }

        let name = take(&mut kv, "name")?;
        let host = take(&mut kv, "host")?;
        let port: u16 = kv
            .remove("port")
            .map(|p| p.parse::<u16>())
            .transpose()
            .map_err(|e| ScrapeError::Config(format!("port: {e}")))?
            .unwrap_or(80);

        routes.push((RouteKind::LoginForm, take(&mut kv, "login_form")?));
        routes.push((RouteKind::LoginSubmit, take(&mut kv, "login_submit")?));
        routes.push((RouteKind::Landing, take(&mut kv, "landing")?));

        let markers = PageMarkers {
            logged_in: take(&mut kv, "marker.logged_in")?,
            login_form: take(&mut kv, "marker.login_form")?,
            next_control: kv.remove("marker.next").unwrap_or_default(),
        };

        let login_fields = LoginFields {
            username: take(&mut kv, "field_username")?,
            secret: take(&mut kv, "field_secret")?,
            extra,
        };

        let secret = match kv.remove("secret_scheme").as_deref() {
            None | Some("plain") => SecretScheme::Plain,
            Some("keypad") => SecretScheme::Keypad(KeypadSpec::digits(&take(&mut kv, "keypad_marker")?)),
            Some(other) => {
                return Err(ScrapeError::Config(format!("unknown secret_scheme: {other}")))
            }
        };

        let retry = RetryPolicy {
            max_retries: kv
                .remove("max_retries")
                .map(|v| v.parse::<u32>())
                .transpose()
                .map_err(|e| ScrapeError::Config(format!("max_retries: {e}")))?
                .unwrap_or(MAX_RETRIES),
            max_delay_secs: kv
                .remove("max_delay_secs")
                .map(|v| v.parse::<u64>())
                .transpose()
                .map_err(|e| ScrapeError::Config(format!("max_delay_secs: {e}")))?
                .unwrap_or(MAX_DELAY_SECS),
        };

        if let Some(stray) = kv.keys().next() {
            return Err(ScrapeError::Config(format!("unknown key: {stray}")));
        }

        Ok(SiteConfig {
            name,
            host,
            port,
            routes: RouteTable::new(routes),
            markers,
            login_fields,
            secret,
            retry,
        })
    }
}
