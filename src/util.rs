use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

const URL_SAFE_ALPHABET: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

pub fn now_utc_string() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn utc_compact_string(ts: DateTime<Utc>) -> String {
    ts.format("%Y%m%dT%H%M%SZ").to_string()
}

pub fn ensure_directory(path: &Path) -> Result<()> {
    fs::create_dir_all(path)
        .with_context(|| format!("failed to create directory: {}", path.display()))
}

pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn write_json_pretty<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            ensure_directory(parent)?;
        }
    }

    let data = serde_json::to_vec_pretty(value)
        .with_context(|| format!("failed to serialize json: {}", path.display()))?;

    let mut file = File::create(path)
        .with_context(|| format!("failed to create json file: {}", path.display()))?;
    file.write_all(&data)
        .with_context(|| format!("failed to write json file: {}", path.display()))?;
    file.write_all(b"\n")
        .with_context(|| format!("failed to finalize json file: {}", path.display()))?;

    Ok(())
}

pub fn write_stdout(text: &str) -> Result<()> {
    let mut output = io::BufWriter::new(io::stdout().lock());
    output.write_all(text.as_bytes())?;
    output.flush()?;
    Ok(())
}

pub fn write_json_stdout<T: Serialize>(value: &T) -> Result<()> {
    let mut output = io::BufWriter::new(io::stdout().lock());
    serde_json::to_writer_pretty(&mut output, value).context("failed to serialize json output")?;
    writeln!(output)?;
    output.flush()?;
    Ok(())
}

/// URL-safe base64 without padding. Document keys must only contain
/// letters, digits, `-` and `_`.
pub fn encode_key(raw: &str) -> String {
    let input = raw.as_bytes();
    let mut out = String::with_capacity(input.len().div_ceil(3) * 4);

    for chunk in input.chunks(3) {
        let b0 = chunk[0] as u32;
        let b1 = chunk.get(1).copied().unwrap_or(0) as u32;
        let b2 = chunk.get(2).copied().unwrap_or(0) as u32;
        let triple = (b0 << 16) | (b1 << 8) | b2;

        out.push(URL_SAFE_ALPHABET[((triple >> 18) & 0x3F) as usize] as char);
        out.push(URL_SAFE_ALPHABET[((triple >> 12) & 0x3F) as usize] as char);
        if chunk.len() > 1 {
            out.push(URL_SAFE_ALPHABET[((triple >> 6) & 0x3F) as usize] as char);
        }
        if chunk.len() > 2 {
            out.push(URL_SAFE_ALPHABET[(triple & 0x3F) as usize] as char);
        }
    }

    out
}

/// Splits `items` into contiguous slices of at most `size` elements.
/// A `size` of zero is treated as one.
pub fn chunk_list<T>(items: &[T], size: usize) -> Vec<&[T]> {
    items.chunks(size.max(1)).collect()
}

pub fn bytes_to_mb(bytes: u64) -> f64 {
    ((bytes as f64 / (1024.0 * 1024.0)) * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_key_matches_url_safe_base64_without_padding() {
        assert_eq!(encode_key(""), "");
        assert_eq!(encode_key("f"), "Zg");
        assert_eq!(encode_key("fo"), "Zm8");
        assert_eq!(encode_key("foo"), "Zm9v");
        assert_eq!(encode_key("<dbpedia:Bird>"), "PGRicGVkaWE6QmlyZD4");
        assert_eq!(encode_key("??>"), "Pz8-");
        assert_eq!(encode_key("???"), "Pz8_");
    }

    #[test]
    fn chunk_list_is_lossless_and_order_preserving() {
        let items = (1..=10).collect::<Vec<i32>>();
        let chunks = chunk_list(&items, 3);

        assert_eq!(
            chunks,
            vec![&[1, 2, 3][..], &[4, 5, 6][..], &[7, 8, 9][..], &[10][..]]
        );
        let rejoined = chunks.concat();
        assert_eq!(rejoined, items);
    }

    #[test]
    fn chunk_list_handles_exact_multiples_and_empty_input() {
        let items = (0..6).collect::<Vec<i32>>();
        assert_eq!(chunk_list(&items, 3).len(), 2);
        assert!(chunk_list::<i32>(&[], 4).is_empty());
        assert_eq!(chunk_list(&items, 0).len(), 6);
    }

    #[test]
    fn bytes_to_mb_rounds_to_four_decimals() {
        assert_eq!(bytes_to_mb(1_048_576), 1.0);
        assert_eq!(bytes_to_mb(0), 0.0);
        assert_eq!(bytes_to_mb(1_500_000), 1.4305);
    }
}
