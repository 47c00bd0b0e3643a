// src/session.rs
//
// Session navigator: one authenticated browsing session against one site,
// driven by its SiteConfig. Login and every fetch go through the same
// state machine:
//
//   ANONYMOUS → AUTHENTICATING → AUTHENTICATED → {FETCHING, PAGINATING}
//
// with EXPIRED detected when a fetch lands back on the login page, and a
// bounded exponential-backoff retry path for transient failures.
//
// One logical session per credential set. Callers serialize access; a
// retry always reuses this session, it never spawns parallel attempts.

use std::time::Duration;

use crate::core::net::{Request, Response, Transport};
use crate::error::{Result, ScrapeError};
use crate::keypad::{decode_key_image, GlyphTable, KeypadDecoder};
use crate::pages;
use crate::params::MAX_REDIRECTS;
use crate::site::{RouteKind, SecretScheme, SiteConfig};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SessionState {
    Anonymous,
    Authenticating,
    Authenticated,
    Fetching,
    Paginating,
    Expired,
}

/// Backoff wait seam. Production sleeps the thread; tests record.
pub trait Sleeper {
    fn sleep(&mut self, d: Duration);
}

pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&mut self, d: Duration) {
        std::thread::sleep(d);
    }
}

#[derive(Clone)]
struct Credentials {
    username: String,
    secret: String,
}

/// Cookie capture/replay for one session. First `k=v` pair of each
/// Set-Cookie, replayed on every request.
#[derive(Default)]
struct CookieJar {
    cookies: Vec<(String, String)>,
}

impl CookieJar {
    fn absorb(&mut self, resp: &Response) {
        for raw in resp.set_cookies() {
            let pair = raw.split(';').next().unwrap_or("");
            if let Some(eq) = pair.find('=') {
                let name = pair[..eq].trim().to_string();
                let value = pair[eq + 1..].trim().to_string();
                match self.cookies.iter_mut().find(|(n, _)| *n == name) {
                    Some((_, v)) => *v = value,
                    None => self.cookies.push((name, value)),
                }
            }
        }
    }

    fn header_value(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|(n, v)| format!("{}={}", n, v))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    fn clear(&mut self) {
        self.cookies.clear();
    }
}

pub struct Session<T: Transport> {
    cfg: SiteConfig,
    transport: T,
    cookies: CookieJar,
    state: SessionState,
    creds: Option<Credentials>,
    sleeper: Box<dyn Sleeper>,
}

impl<T: Transport> Session<T> {
    pub fn new(cfg: SiteConfig, transport: T) -> Self {
        Self::with_sleeper(cfg, transport, Box::new(ThreadSleeper))
    }

    pub fn with_sleeper(cfg: SiteConfig, transport: T, sleeper: Box<dyn Sleeper>) -> Self {
        Session {
            cfg,
            transport,
            cookies: CookieJar::default(),
            state: SessionState::Anonymous,
            creds: None,
            sleeper,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &SiteConfig {
        &self.cfg
    }

    /// Concrete path for a named resource, with `{id}` substituted.
    pub fn resource_path(&self, name: &str, id: &str) -> Result<String> {
        Ok(self.cfg.routes.resource(name)?.replace("{id}", id))
    }

    /// Drop all transport state and return to ANONYMOUS.
    pub fn invalidate(&mut self) {
        self.cookies.clear();
        self.creds = None;
        self.state = SessionState::Anonymous;
    }

    /// Authenticate. Routes the secret through the keypad decoder when the
    /// site's config says so. Credentials are kept for expiry recovery.
    pub fn login(&mut self, username: &str, secret: &str) -> Result<()> {
        self.creds = Some(Credentials { username: s!(username), secret: s!(secret) });
        self.do_login()
    }

    /// Fetch one page of a resource. `resource` is a configured route name,
    /// or a literal path when it starts with `/`. `cursor` is the opaque
    /// continuation returned by the previous call; `None` starts from the
    /// resource's first page. Returns the page body and the next cursor,
    /// `None` on the last page.
    pub fn fetch_page(
        &mut self,
        resource: &str,
        cursor: Option<&str>,
    ) -> Result<(String, Option<String>)> {
        if !self.is_authenticated() {
            return Err(ScrapeError::SessionExpired);
        }
        let path = match cursor {
            Some(c) => s!(c),
            None if resource.starts_with('/') => s!(resource),
            None => s!(self.cfg.routes.resource(resource)?),
        };
        self.state = if cursor.is_some() { SessionState::Paginating } else { SessionState::Fetching };

        let result = self.fetch_with_retry(&path);
        match &result {
            // Exhausting the retry budget does not end the session; the
            // next call may target a healthier resource.
            Ok(_) | Err(ScrapeError::UnrecoverableFetch { .. }) => {
                self.state = SessionState::Authenticated
            }
            Err(_) => self.state = SessionState::Anonymous,
        }
        let body = result?;

        let next = pages::next_cursor(&body, &self.cfg.markers.next_control);
        if next.as_deref() == Some(path.as_str()) {
            return Err(ScrapeError::Parse(s!("next-page link points at the current page")));
        }
        Ok((body, next))
    }

    /// Fetch every page of a resource in server-declared order. A next
    /// link pointing back at an already-visited page is a parse failure,
    /// not an infinite walk.
    pub fn fetch_all(&mut self, resource: &str) -> Result<Vec<String>> {
        let first = if resource.starts_with('/') {
            s!(resource)
        } else {
            s!(self.cfg.routes.resource(resource)?)
        };
        let mut visited = vec![first];
        let mut out = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let (body, next) = self.fetch_page(resource, cursor.as_deref())?;
            out.push(body);
            match next {
                Some(c) => {
                    if visited.iter().any(|v| *v == c) {
                        return Err(ScrapeError::Parse(format!(
                            "next-page link revisits {c}"
                        )));
                    }
                    visited.push(c.clone());
                    cursor = Some(c);
                }
                None => return Ok(out),
            }
        }
    }

    /// Download a binary document and validate it with `is_sane`. A
    /// malformed download is treated like a transient failure, except that
    /// recovery re-drives the whole path from login — the site only
    /// recovers when the browsing sequence is repeated from the top.
    pub fn fetch_document(
        &mut self,
        resource: &str,
        is_sane: &dyn Fn(&[u8]) -> bool,
    ) -> Result<Vec<u8>> {
        if !self.is_authenticated() {
            return Err(ScrapeError::SessionExpired);
        }
        let path = if resource.starts_with('/') {
            s!(resource)
        } else {
            s!(self.cfg.routes.resource(resource)?)
        };

        let mut attempts = 0u32;
        loop {
            self.state = SessionState::Fetching;
            let failure = match self.raw_fetch(&Request::get(&path)) {
                Ok(resp) if is_sane(&resp.body) => {
                    self.state = SessionState::Authenticated;
                    return Ok(resp.body);
                }
                Ok(_) => s!("document failed sanity check"),
                Err(e) if is_transient(&e) => e.to_string(),
                Err(e) => return Err(e),
            };

            attempts += 1;
            if attempts >= self.cfg.retry.max_retries {
                loge!("{}: giving up on {} after {} attempts", self.cfg.name, path, attempts);
                self.state = SessionState::Authenticated;
                return Err(ScrapeError::UnrecoverableFetch { attempts, last: failure });
            }
            let delay = self.cfg.retry.delay_secs(attempts - 1);
            logd!("{}: {} ({}), retrying in {}s", self.cfg.name, path, failure, delay);
            self.sleeper.sleep(Duration::from_secs(delay));

            // Re-drive from the top: login, then landing.
            self.do_login()?;
            let landing = self.route(&RouteKind::Landing)?;
            if let Err(e) = self.raw_fetch(&Request::get(&landing)) {
                logd!("{}: landing refresh failed ({})", self.cfg.name, e);
            }
        }
    }

    /* ---------- internals ---------- */

    fn is_authenticated(&self) -> bool {
        matches!(
            self.state,
            SessionState::Authenticated | SessionState::Fetching | SessionState::Paginating
        )
    }

    fn route(&self, kind: &RouteKind) -> Result<String> {
        self.cfg
            .routes
            .path(kind)
            .map(String::from)
            .ok_or_else(|| ScrapeError::UnknownRoute(format!("{:?}", kind)))
    }

    fn do_login(&mut self) -> Result<()> {
        let result = self.try_login();
        if result.is_err() {
            self.state = SessionState::Anonymous;
        }
        result
    }

    fn try_login(&mut self) -> Result<()> {
        let creds = self.creds.clone().ok_or(ScrapeError::InvalidCredentials)?;
        self.state = SessionState::Authenticating;
        self.cookies.clear();

        let form_path = self.route(&RouteKind::LoginForm)?;
        let page = self.raw_fetch(&Request::get(&form_path))?.body_str();

        let scheme = self.cfg.secret.clone();
        let secret_value = match scheme {
            SecretScheme::Plain => creds.secret.clone(),
            SecretScheme::Keypad(spec) => {
                let urls = pages::keypad_image_urls(&page, &spec.image_marker)?;
                let mut images = Vec::with_capacity(urls.len());
                for url in &urls {
                    let resp = self.raw_fetch(&Request::get(url))?;
                    images.push(decode_key_image(&resp.body)?);
                }
                let decoder =
                    KeypadDecoder::new(GlyphTable::digits(), spec.region, spec.ink_threshold);
                decoder.build_mapping(&images)?.encode(&creds.secret)?
            }
        };

        let mut fields = pages::login_form_fields(&page)?;
        pages::set_field(&mut fields, &self.cfg.login_fields.username, &creds.username);
        pages::set_field(&mut fields, &self.cfg.login_fields.secret, &secret_value);
        for (name, value) in &self.cfg.login_fields.extra {
            pages::set_field(&mut fields, name, value);
        }

        let submit_path = self.route(&RouteKind::LoginSubmit)?;
        let resp = self.raw_fetch(&Request::post_form(&submit_path, &fields))?;

        if resp.body_str().contains(&self.cfg.markers.logged_in) {
            logf!("{}: logged in as {}", self.cfg.name, creds.username);
            self.state = SessionState::Authenticated;
            Ok(())
        } else {
            Err(ScrapeError::InvalidCredentials)
        }
    }

    /// One GET with the transient-retry and expiry-recovery paths applied.
    fn fetch_with_retry(&mut self, path: &str) -> Result<String> {
        let mut attempts = 0u32;
        let mut relogged = false;
        loop {
            match self.raw_fetch(&Request::get(path)) {
                Ok(resp) => {
                    let body = resp.body_str();
                    if body.contains(&self.cfg.markers.login_form) {
                        // Landed back on the login page: session expired.
                        if relogged {
                            return Err(ScrapeError::SessionExpired);
                        }
                        relogged = true;
                        self.state = SessionState::Expired;
                        logd!("{}: session expired, re-authenticating", self.cfg.name);
                        self.do_login()?;
                        continue;
                    }
                    return Ok(body);
                }
                Err(e) if is_transient(&e) => {
                    attempts += 1;
                    if attempts >= self.cfg.retry.max_retries {
                        loge!(
                            "{}: giving up on {} after {} attempts",
                            self.cfg.name,
                            path,
                            attempts
                        );
                        return Err(ScrapeError::UnrecoverableFetch {
                            attempts,
                            last: e.to_string(),
                        });
                    }
                    let delay = self.cfg.retry.delay_secs(attempts - 1);
                    logd!("{}: {} ({}), retrying in {}s", self.cfg.name, path, e, delay);
                    self.sleeper.sleep(Duration::from_secs(delay));
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Send one request with session cookies, absorb Set-Cookie, follow
    /// redirects. Any non-200 final status is a transient failure.
    fn raw_fetch(&mut self, req: &Request) -> Result<Response> {
        let mut method = req.method;
        let mut path = req.path.clone();
        let mut body = req.body.clone();
        let mut extra = req.headers.clone();

        for _ in 0..=MAX_REDIRECTS {
            let mut r = Request { method, path: path.clone(), headers: extra.clone(), body: body.clone() };
            if let Some(cookie) = self.cookies.header_value() {
                r = r.header("Cookie", &cookie);
            }
            let resp = self.transport.fetch(&r)?;
            self.cookies.absorb(&resp);

            match resp.status {
                200 => return Ok(resp),
                301 | 302 | 303 => {
                    let loc = resp.header("location").map(String::from).ok_or_else(|| {
                        ScrapeError::TransientFetch(s!("redirect without Location"))
                    })?;
                    method = crate::core::net::Method::Get;
                    path = loc;
                    body = None;
                    extra.clear();
                }
                other => {
                    return Err(ScrapeError::TransientFetch(format!("HTTP {} on {}", other, path)))
                }
            }
        }
        Err(ScrapeError::TransientFetch(s!("too many redirects")))
    }
}

fn is_transient(e: &ScrapeError) -> bool {
    matches!(e, ScrapeError::TransientFetch(_) | ScrapeError::Io(_))
}
