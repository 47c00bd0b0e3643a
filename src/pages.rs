// src/pages.rs
// Page-level extraction on top of core::html: pull keypad images, login
// forms, pagination links and data rows out of fetched markup.

use crate::core::html::{
    attr_value_ci, inner_after_open_tag, next_bare_tag_ci, next_tag_block_ci, strip_tags,
};
use crate::core::sanitize::{normalize_entities, parse_amount_cents};
use crate::error::{Result, ScrapeError};
use crate::model::{Account, Transaction, TxKind};

/// `src` of every key `<img>` inside the section starting at `marker`
/// (e.g. the keypad `<div>`), in on-screen order.
pub fn keypad_image_urls(html: &str, marker: &str) -> Result<Vec<String>> {
    let at = html
        .find(marker)
        .ok_or_else(|| ScrapeError::Parse(format!("keypad marker not found: {marker}")))?;
    let section = &html[at..];
    let section = match section.find("</div>") {
        Some(end) => &section[..end],
        None => section,
    };

    let mut urls = Vec::new();
    let mut pos = 0usize;
    while let Some((s, e)) = next_bare_tag_ci(section, "<img", pos) {
        if let Some(src) = attr_value_ci(&section[s..e], "src") {
            urls.push(src);
        }
        pos = e;
    }
    if urls.is_empty() {
        return Err(ScrapeError::Parse(s!("keypad section has no key images")));
    }
    Ok(urls)
}

/// All named `<input>` fields of the first form on the page, with their
/// pre-filled values. Carries the site's hidden anti-CSRF fields through
/// the submit untouched.
pub fn login_form_fields(html: &str) -> Result<Vec<(String, String)>> {
    let (fs, fe) = next_tag_block_ci(html, "<form", "</form>", 0)
        .ok_or_else(|| ScrapeError::Parse(s!("no form on login page")))?;
    let form = &html[fs..fe];

    let mut fields = Vec::new();
    let mut pos = 0usize;
    while let Some((s, e)) = next_bare_tag_ci(form, "<input", pos) {
        let tag = &form[s..e];
        if let Some(name) = attr_value_ci(tag, "name") {
            let value = attr_value_ci(tag, "value").unwrap_or_default();
            fields.push((name, value));
        }
        pos = e;
    }
    Ok(fields)
}

/// Overwrite or append one form field.
pub fn set_field(fields: &mut Vec<(String, String)>, name: &str, value: &str) {
    match fields.iter_mut().find(|(n, _)| n == name) {
        Some((_, v)) => *v = s!(value),
        None => fields.push((s!(name), s!(value))),
    }
}

/// Relative URL of the "next page" control, when the page signals one.
/// The marker either sits inside the `<a>` tag itself or just before it.
pub fn next_cursor(html: &str, marker: &str) -> Option<String> {
    if marker.is_empty() {
        return None;
    }
    let at = html.find(marker)?;

    // Tag containing the marker.
    let tag_start = html[..at].rfind('<')?;
    let tag_end = html[at..].find('>')? + at + 1;
    if let Some(href) = attr_value_ci(&html[tag_start..tag_end], "href") {
        return Some(href);
    }

    // Otherwise the first <a href> after the marker.
    let (s, e) = next_bare_tag_ci(html, "<a", tag_end)?;
    attr_value_ci(&html[s..e], "href")
}

/// Account rows: `<tr>` with three `<td>` cells — label (optionally
/// linked), account id, balance. Rows that don't fit are skipped, the
/// site mixes decoration rows into the same table.
pub fn parse_accounts(html: &str) -> Vec<Account> {
    let mut out = Vec::new();
    let mut pos = 0usize;
    while let Some((tr_s, tr_e)) = next_tag_block_ci(html, "<tr", "</tr>", pos) {
        let tr = &html[tr_s..tr_e];
        pos = tr_e;

        let cells = td_blocks(tr);
        if cells.len() != 3 {
            continue;
        }

        let link = next_bare_tag_ci(&cells[0], "<a", 0)
            .and_then(|(s, e)| attr_value_ci(&cells[0][s..e], "href"));
        let label = clean_cell(&cells[0]);
        let id = clean_cell(&cells[1]);
        let balance = match parse_amount_cents(&clean_cell(&cells[2])) {
            Some(v) => v,
            None => continue,
        };
        if id.is_empty() || label.is_empty() {
            continue;
        }
        out.push(Account { id, label, balance_cents: balance, link });
    }
    out
}

/// History rows: `<tr>` with at least three `<td>` cells — date, label,
/// then the amount in the last cell.
pub fn parse_history(html: &str) -> Vec<Transaction> {
    let mut out = Vec::new();
    let mut pos = 0usize;
    while let Some((tr_s, tr_e)) = next_tag_block_ci(html, "<tr", "</tr>", pos) {
        let tr = &html[tr_s..tr_e];
        pos = tr_e;

        let cells = td_blocks(tr);
        let last = match cells.len() {
            n if n >= 3 => &cells[n - 1],
            _ => continue,
        };
        let date = clean_cell(&cells[0]);
        let label = clean_cell(&cells[1]);
        let amount = match parse_amount_cents(&clean_cell(last)) {
            Some(v) => v,
            None => continue,
        };
        if date.is_empty() || label.is_empty() {
            continue;
        }
        out.push(Transaction { kind: TxKind::classify(&label), date, label, amount_cents: amount });
    }
    out
}

/* ---------- helpers ---------- */

fn td_blocks(tr: &str) -> Vec<String> {
    let mut cells = Vec::new();
    let mut pos = 0usize;
    while let Some((s, e)) = next_tag_block_ci(tr, "<td", "</td>", pos) {
        cells.push(tr[s..e].to_string());
        pos = e;
    }
    cells
}

fn clean_cell(block: &str) -> String {
    strip_tags(normalize_entities(&inner_after_open_tag(block)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keypad_urls_in_order() {
        let html = r#"
            <div class="m-btn-pin">
              <img src="/k/a.png"><img src="/k/b.png">
              <img src="/k/c.png">
            </div>
            <div><img src="/logo.png"></div>
        "#;
        let urls = keypad_image_urls(html, "m-btn-pin").unwrap();
        assert_eq!(urls, vec!["/k/a.png", "/k/b.png", "/k/c.png"]);
    }

    #[test]
    fn keypad_marker_missing() {
        assert!(keypad_image_urls("<div></div>", "m-btn-pin").is_err());
    }

    #[test]
    fn form_fields_carry_hidden_values() {
        let html = r#"
            <form action="/signon" method=post>
              <input type="hidden" name="csrf" value="tok123">
              <input type="text" name="j_username">
              <input type="password" name="indexes" value="">
              <input type="submit" value="Go">
            </form>
        "#;
        let mut fields = login_form_fields(html).unwrap();
        assert_eq!(
            fields,
            vec![
                (s!("csrf"), s!("tok123")),
                (s!("j_username"), s!()),
                (s!("indexes"), s!()),
            ]
        );
        set_field(&mut fields, "j_username", "alice");
        set_field(&mut fields, "extra", "1");
        assert_eq!(fields[1], (s!("j_username"), s!("alice")));
        assert_eq!(fields[3], (s!("extra"), s!("1")));
    }

    #[test]
    fn next_cursor_marker_inside_anchor() {
        let html = r#"<a class="pager-next" href="/hist?p=2">Next</a>"#;
        assert_eq!(next_cursor(html, "pager-next").as_deref(), Some("/hist?p=2"));
    }

    #[test]
    fn next_cursor_marker_before_anchor() {
        let html = r#"<span id="nextlbl">More</span> <a href="/hist?p=3">&gt;</a>"#;
        assert_eq!(next_cursor(html, "nextlbl").as_deref(), Some("/hist?p=3"));
    }

    #[test]
    fn next_cursor_absent_on_last_page() {
        assert_eq!(next_cursor("<p>end of list</p>", "pager-next"), None);
        assert_eq!(next_cursor("<p>anything</p>", ""), None);
    }

    #[test]
    fn accounts_table_skips_decoration_rows() {
        let html = r#"
            <table class=accounts>
              <tr><th>Account</th><th>Number</th><th>Balance</th></tr>
              <tr><td><a href="/acc/1">Livret A</a></td><td>111222</td><td>1 234,56 &nbsp;€</td></tr>
              <tr><td colspan=3>ads banner</td></tr>
              <tr><td>Compte Courant</td><td>333444</td><td>-12,30 €</td></tr>
            </table>
        "#;
        let accounts = parse_accounts(html);
        assert_eq!(accounts.len(), 2);
        assert_eq!(accounts[0].id, "111222");
        assert_eq!(accounts[0].label, "Livret A");
        assert_eq!(accounts[0].balance_cents, 123_456);
        assert_eq!(accounts[0].link.as_deref(), Some("/acc/1"));
        assert_eq!(accounts[1].balance_cents, -1_230);
        assert_eq!(accounts[1].link, None);
    }

    #[test]
    fn history_rows_classified() {
        let html = r#"
            <table>
              <tr><td>02/05/2024</td><td>VIR SALAIRE ACME</td><td>12/05</td><td>2 100,00</td></tr>
              <tr><td>03/05/2024</td><td>CB SUPERMARCHE</td><td>13/05</td><td>-54,20</td></tr>
            </table>
        "#;
        let txs = parse_history(html);
        assert_eq!(txs.len(), 2);
        assert_eq!(txs[0].kind, TxKind::Transfer);
        assert_eq!(txs[0].amount_cents, 210_000);
        assert_eq!(txs[1].kind, TxKind::Card);
        assert_eq!(txs[1].amount_cents, -5_420);
    }
}
