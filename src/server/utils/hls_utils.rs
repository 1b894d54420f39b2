use std::borrow::Cow;

use tracing::warn;
use url::Url;

use crate::server::error::{AppResult, Error};

const KEY_DIRECTIVE: &str = "#EXT-X-KEY";
const URI_ATTRIBUTE: &str = "URI=\"";

/// `<base>/<host[:port]>/<path>[?<query>]`, the form the m3u8 route maps back to upstream
pub fn proxy_path_for(url: &Url, base: &str) -> String {
    let host = url.host_str().unwrap_or_default();
    let mut proxied = match url.port() {
        Some(port) => format!("{}/{}:{}{}", base, host, port, url.path()),
        None => format!("{}/{}{}", base, host, url.path()),
    };

    if let Some(query) = url.query() {
        proxied.push('?');
        proxied.push_str(query);
    }

    proxied
}

/// inverse of [`proxy_path_for`]: `host/path` plus the raw query back into the upstream url.
/// upstream media is always fetched over https
pub fn upstream_url_from_proxy_path(path: &str, query: Option<&str>) -> AppResult<Url> {
    let path = path.trim_start_matches('/');
    if path.is_empty() {
        return Err(Error::MissingParameter("path".to_string()));
    }

    let mut target = format!("https://{}", path);
    if let Some(query) = query.filter(|q| !q.is_empty()) {
        target.push('?');
        target.push_str(query);
    }

    Url::parse(&target).map_err(|e| Error::BadRequest(format!("invalid upstream url {}: {}", target, e)))
}

/// Rewrites every uri in a playlist so the player comes back through the proxy.
///
/// - `#EXT-X-KEY` lines get only their `URI="..."` value replaced
/// - any other `#` line is left alone
/// - segment lines, absolute or relative, are resolved against `playlist_url` first, so a
///   relative line keeps the host (and directory) of the playlist that referenced it
///
/// Blank lines are dropped and every emitted line ends with `\n`.
pub fn rewrite_playlist(text: &str, playlist_url: &Url, base: &str) -> String {
    let mut rewritten = String::with_capacity(text.len() * 2);

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        let out: Cow<'_, str> = if line.starts_with(KEY_DIRECTIVE) {
            rewrite_key_line(line, playlist_url, base)
        } else if line.starts_with('#') {
            Cow::Borrowed(line)
        } else {
            rewrite_segment_line(line, playlist_url, base)
        };

        rewritten.push_str(&out);
        rewritten.push('\n');
    }

    rewritten
}

fn rewrite_key_line<'a>(line: &'a str, playlist_url: &Url, base: &str) -> Cow<'a, str> {
    let Some(start) = line.find(URI_ATTRIBUTE).map(|i| i + URI_ATTRIBUTE.len()) else {
        return Cow::Borrowed(line);
    };
    let Some(len) = line[start..].find('"') else {
        return Cow::Borrowed(line);
    };

    let uri = &line[start..start + len];
    match playlist_url.join(uri) {
        Ok(resolved) => Cow::Owned(format!(
            "{}{}{}",
            &line[..start],
            proxy_path_for(&resolved, base),
            &line[start + len..]
        )),
        Err(e) => {
            warn!("failed to resolve key uri {}: {}", uri, e);
            Cow::Borrowed(line)
        }
    }
}

fn rewrite_segment_line<'a>(line: &'a str, playlist_url: &Url, base: &str) -> Cow<'a, str> {
    // join() takes absolute lines as they are and resolves relative ones
    match playlist_url.join(line) {
        Ok(resolved) => Cow::Owned(proxy_path_for(&resolved, base)),
        Err(e) => {
            warn!("failed to resolve segment {}: {}", line, e);
            Cow::Borrowed(line)
        }
    }
}

/// content type or requested path says playlist
pub fn is_playlist(content_type: &str, path: &str) -> bool {
    let content_type = content_type.to_ascii_lowercase();
    content_type.contains("mpegurl") || path.to_ascii_lowercase().ends_with(".m3u8")
}
