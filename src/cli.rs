// src/cli.rs
use std::env;
use std::error::Error;
use std::path::PathBuf;

use crate::core::net::TcpTransport;
use crate::pages;
use crate::params::PASSWORD_ENV;
use crate::session::Session;
use crate::site::SiteConfig;

pub struct Params {
    pub site: Option<PathBuf>,       // site config file
    pub user: Option<String>,        // login name
    pub password: Option<String>,    // else taken from SITENAV_PASSWORD
    pub list_accounts: bool,         // print accounts then exit
    pub history: Option<String>,     // account id for history
    pub fetch: Option<String>,       // raw dump of a named resource
}

impl Params {
    pub fn new() -> Self {
        Self {
            site: None,
            user: None,
            password: None,
            list_accounts: false,
            history: None,
            fetch: None,
        }
    }
}

impl Default for Params {
    fn default() -> Self {
        Self::new()
    }
}

pub fn run() -> Result<(), Box<dyn Error>> {
    let mut params = Params::new();
    parse_cli(&mut params)?;

    let site = params.site.ok_or("Missing --site <config>")?;
    let user = params.user.ok_or("Missing --user <name>")?;
    let password = match params.password {
        Some(p) => p,
        None => env::var(PASSWORD_ENV)
            .map_err(|_| format!("Set {} or pass --password", PASSWORD_ENV))?,
    };

    let cfg = SiteConfig::from_file(&site)?;
    let transport = TcpTransport::new(&cfg.host, cfg.port);
    let mut session = Session::new(cfg, transport);
    session.login(&user, &password)?;

    if params.list_accounts {
        for page in session.fetch_all("accounts")? {
            for a in pages::parse_accounts(&page) {
                println!("{},{},{}", a.id, a.label, fmt_cents(a.balance_cents));
            }
        }
        return Ok(());
    }

    if let Some(id) = params.history {
        let path = session.resource_path("history", &id)?;
        let mut cursor: Option<String> = None;
        loop {
            let (page, next) = session.fetch_page(&path, cursor.as_deref())?;
            for t in pages::parse_history(&page) {
                println!("{},{},{:?},{}", t.date, t.label, t.kind, fmt_cents(t.amount_cents));
            }
            match next {
                Some(c) => cursor = Some(c),
                None => break,
            }
        }
        return Ok(());
    }

    if let Some(name) = params.fetch {
        for page in session.fetch_all(&name)? {
            println!("{page}");
        }
        return Ok(());
    }

    Err("Nothing to do: pass --list-accounts, --history <id> or --fetch <resource>".into())
}

fn parse_cli(params: &mut Params) -> Result<(), Box<dyn Error>> {
    let mut args = env::args().skip(1);
    while let Some(a) = args.next() {
        match a.as_str() {
            "-s" | "--site" => {
                params.site = Some(PathBuf::from(args.next().ok_or("Missing site config path")?));
            }
            "-u" | "--user" => params.user = Some(args.next().ok_or("Missing user name")?),
            "--password" => params.password = Some(args.next().ok_or("Missing password")?),
            "--list-accounts" => params.list_accounts = true,
            "--history" => params.history = Some(args.next().ok_or("Missing account id")?),
            "--fetch" => params.fetch = Some(args.next().ok_or("Missing resource name")?),
            "-h" | "--help" => {
                eprintln!(include_str!("cli_help.txt"));
                std::process::exit(0);
            }
            _ => return Err(format!("Unknown arg: {}", a).into()),
        }
    }
    Ok(())
}

fn fmt_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}
