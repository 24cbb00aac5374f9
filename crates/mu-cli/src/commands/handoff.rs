//! `mu handoff`: dissect handoff URLs.
//!
//! Accepts either a handoff URL itself (proxy page with a `#?=&...` fragment)
//! or a dialog URL that embeds handoffs in its query (`next`, `cancel_url`,
//! `no_session`, ...), and prints the addressing fields of each.

use anyhow::Result;
use mu_core::{decode, parse_handoff_url, unwrap_result, Params};

const FIELDS: [&str; 5] = ["frame", "cb", "relation", "target", "transport"];

fn describe(params: &Params) -> Vec<String> {
    let mut lines: Vec<String> = FIELDS
        .iter()
        .filter_map(|&name| params.get(name).map(|v| format!("  {name:<9} = {v}")))
        .collect();
    if params.contains_key("result") {
        let result = unwrap_result(params.get("result")).unwrap_or_else(|| "(none)".to_string());
        lines.push(format!("  {:<9} = {result}", "result"));
    }
    lines
}

pub fn render(url: &str) -> Result<String> {
    if let Some((base, params)) = parse_handoff_url(url) {
        let mut out = vec![format!("proxy: {base}")];
        out.extend(describe(&params));
        return Ok(out.join("\n"));
    }

    let (page, query) = url.split_once('?').unwrap_or(("", url));
    let mut out = Vec::new();
    for (key, value) in decode(query).iter() {
        if let Some((base, params)) = parse_handoff_url(value) {
            out.push(format!("{key}: {base}"));
            out.extend(describe(&params));
        }
    }
    if out.is_empty() {
        anyhow::bail!("no handoff URL found in input");
    }
    if !page.is_empty() {
        out.insert(0, format!("page: {page}"));
    }
    Ok(out.join("\n"))
}

pub fn run(url: &str) -> Result<()> {
    println!("{}", render(url)?);
    Ok(())
}
