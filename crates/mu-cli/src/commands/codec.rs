//! `mu encode` / `mu decode`: the query-string codec used on the wire.

use anyhow::{Context, Result};
use mu_core::{decode, encode, encode_with, Params};

use crate::config::parse_pair;

/// Encode `key=value` arguments. With `raw`, pairs are left unescaped and
/// concatenated without separators, which is the form request signatures
/// are computed over.
pub fn render_encode(pairs: &[String], raw: bool) -> Result<String> {
    let mut params = Params::new();
    for arg in pairs {
        let (key, value) = parse_pair(arg)?;
        params.set(key, value);
    }
    Ok(if raw {
        encode_with(&params, "", false)
    } else {
        encode(&params)
    })
}

/// Decode a query string into one `key = value` line per pair, or pretty JSON.
pub fn render_decode(query: &str, json: bool) -> Result<String> {
    let query = query
        .split_once('?')
        .map(|(_, q)| q)
        .unwrap_or(query)
        .trim_start_matches('#');
    let params = decode(query);
    if json {
        return serde_json::to_string_pretty(&params).context("failed to serialize parameters");
    }
    Ok(params
        .iter()
        .map(|(k, v)| format!("{k} = {v}"))
        .collect::<Vec<_>>()
        .join("\n"))
}

pub fn run_encode(pairs: &[String], raw: bool) -> Result<()> {
    println!("{}", render_encode(pairs, raw)?);
    Ok(())
}

pub fn run_decode(query: &str, json: bool) -> Result<()> {
    let out = render_decode(query, json)?;
    if !out.is_empty() {
        println!("{out}");
    }
    Ok(())
}
