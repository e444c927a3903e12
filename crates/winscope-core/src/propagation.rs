//! Carrying the window id to the client and back.
//!
//! The id travels in three channels: the `dswid` URL parameter on links and
//! redirects, the `dspwid` hidden field on forms, and a script variable the
//! client-side window handler reads. [`PropagationPlan`] selects the channels
//! for a render mode.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::Serialize;

use crate::client_window::ClientWindowRenderMode;
use crate::request::{POST_WINDOW_ID_PARAMETER, WINDOW_ID_PARAMETER};
use crate::window_id::WindowId;

/// Form encoding leaves alphanumerics and `.-*_` untouched.
const FORM_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'.')
    .remove(b'-')
    .remove(b'*')
    .remove(b'_');

/// Channels that carry the window id for one response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PropagationPlan {
    pub url_parameter: bool,
    pub hidden_field: bool,
    pub script: bool,
    /// Serve the window handler page before the real response
    pub handler_page: bool,
}

impl PropagationPlan {
    #[must_use]
    pub const fn for_mode(mode: ClientWindowRenderMode) -> Self {
        match mode {
            ClientWindowRenderMode::None => Self {
                url_parameter: false,
                hidden_field: false,
                script: false,
                handler_page: false,
            },
            ClientWindowRenderMode::Lazy => Self {
                url_parameter: true,
                hidden_field: true,
                script: true,
                handler_page: false,
            },
            ClientWindowRenderMode::ClientWindow => Self {
                url_parameter: true,
                hidden_field: true,
                script: true,
                handler_page: true,
            },
            ClientWindowRenderMode::Delegated => Self {
                url_parameter: false,
                hidden_field: false,
                script: true,
                handler_page: false,
            },
        }
    }

    /// Whether the window id reaches the client at all.
    #[must_use]
    pub const fn propagates(&self) -> bool {
        self.url_parameter || self.hidden_field || self.script
    }
}

/// Form-url-encode a parameter value (space becomes `+`).
#[must_use]
pub fn encode_parameter_value(value: &str) -> String {
    utf8_percent_encode(value, FORM_VALUE)
        .to_string()
        .replace("%20", "+")
}

fn split_fragment(url: &str) -> (&str, &str) {
    match url.find('#') {
        Some(idx) => url.split_at(idx),
        None => (url, ""),
    }
}

/// `url` with its `dswid` parameter set to `window_id`, replacing any
/// previous value. A fragment stays at the end.
#[must_use]
pub fn add_window_id(url: &str, window_id: &WindowId) -> String {
    let (base, fragment) = split_fragment(url);
    let (path, query) = match base.split_once('?') {
        Some((path, query)) => (path, query),
        None => (base, ""),
    };

    let prefix = format!("{WINDOW_ID_PARAMETER}=");
    let mut params: Vec<&str> = query
        .split('&')
        .filter(|p| !p.is_empty() && !p.starts_with(&prefix) && *p != WINDOW_ID_PARAMETER)
        .collect();
    let own = format!("{prefix}{}", encode_parameter_value(window_id.as_str()));
    params.push(&own);

    format!("{path}?{}{fragment}", params.join("&"))
}

/// Append `params` to `url`, skipping any already present with the same
/// value (plain or encoded). Values are form-url-encoded when `encode` is set.
#[must_use]
pub fn add_page_parameters(url: &str, params: &[(String, String)], encode: bool) -> String {
    let (base, fragment) = split_fragment(url);
    let mut out = String::from(base);
    let mut has_query = base.contains('?');

    for (key, value) in params {
        let encoded = encode_parameter_value(value);
        if base.contains(&format!("{key}={value}")) || base.contains(&format!("{key}={encoded}")) {
            continue;
        }
        if has_query {
            if !out.ends_with('?') && !out.ends_with('&') {
                out.push('&');
            }
        } else {
            out.push('?');
            has_query = true;
        }
        out.push_str(key);
        out.push('=');
        if encode {
            out.push_str(&encoded);
        } else {
            out.push_str(value);
        }
    }
    out.push_str(fragment);
    out
}

/// Escape text for use inside an HTML attribute or element.
#[must_use]
pub fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Hidden form field posting the window id back as `dspwid`.
#[must_use]
pub fn render_hidden_field(window_id: &WindowId) -> String {
    format!(
        r#"<input type="hidden" name="{POST_WINDOW_ID_PARAMETER}" value="{}" />"#,
        escape_html(window_id.as_str())
    )
}

/// Script block exposing the window id to the client-side window handler.
#[must_use]
pub fn render_window_id_script(window_id: &WindowId) -> String {
    // Window ids are restricted to [A-Za-z0-9_-], so no script escaping is needed.
    format!(
        "<script type=\"text/javascript\">window.winscope = window.winscope || {{}}; window.winscope.windowId = '{}';</script>",
        window_id.as_str()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wid(s: &str) -> WindowId {
        WindowId::parse(s).unwrap()
    }

    #[test]
    fn add_window_id_to_plain_url() {
        assert_eq!(add_window_id("/app/page", &wid("w1")), "/app/page?dswid=w1");
    }

    #[test]
    fn add_window_id_keeps_other_params_and_fragment() {
        assert_eq!(
            add_window_id("/p?a=1&b=2#top", &wid("w1")),
            "/p?a=1&b=2&dswid=w1#top"
        );
    }

    #[test]
    fn add_window_id_replaces_previous_value() {
        assert_eq!(
            add_window_id("/p?dswid=old&a=1", &wid("new")),
            "/p?a=1&dswid=new"
        );
        // Parameters that merely share the prefix survive.
        assert_eq!(
            add_window_id("/p?dswidx=1", &wid("w")),
            "/p?dswidx=1&dswid=w"
        );
    }

    #[test]
    fn encode_matches_form_encoding() {
        assert_eq!(encode_parameter_value("a b"), "a+b");
        assert_eq!(encode_parameter_value("x&y=z"), "x%26y%3Dz");
        assert_eq!(encode_parameter_value("safe.-*_"), "safe.-*_");
        assert_eq!(encode_parameter_value("100%"), "100%25");
        assert_eq!(encode_parameter_value("ü"), "%C3%BC");
    }

    #[test]
    fn page_parameters_skip_existing() {
        let params = vec![
            ("q".to_string(), "a b".to_string()),
            ("page".to_string(), "2".to_string()),
        ];
        assert_eq!(
            add_page_parameters("/search?page=2", &params, true),
            "/search?page=2&q=a+b"
        );
        assert_eq!(
            add_page_parameters("/search?q=a+b", &params, true),
            "/search?q=a+b&page=2"
        );
    }

    #[test]
    fn page_parameters_plain_values() {
        let params = vec![("q".to_string(), "a b".to_string())];
        assert_eq!(add_page_parameters("/s", &params, false), "/s?q=a b");
        assert_eq!(add_page_parameters("/s?", &params, true), "/s?q=a+b");
        assert_eq!(add_page_parameters("/s#f", &params, true), "/s?q=a+b#f");
    }

    #[test]
    fn hidden_field_and_script() {
        let id = wid("Ab-1_z");
        assert_eq!(
            render_hidden_field(&id),
            r#"<input type="hidden" name="dspwid" value="Ab-1_z" />"#
        );
        assert!(render_window_id_script(&id).contains("'Ab-1_z'"));
    }

    #[test]
    fn escape_html_covers_specials() {
        assert_eq!(escape_html(r#"<a href="x">&'"#), "&lt;a href=&quot;x&quot;&gt;&amp;&#39;");
    }

    #[test]
    fn plans_per_mode() {
        assert!(!PropagationPlan::for_mode(ClientWindowRenderMode::None).propagates());
        let lazy = PropagationPlan::for_mode(ClientWindowRenderMode::Lazy);
        assert!(lazy.url_parameter && lazy.hidden_field && !lazy.handler_page);
        assert!(PropagationPlan::for_mode(ClientWindowRenderMode::ClientWindow).handler_page);
        let delegated = PropagationPlan::for_mode(ClientWindowRenderMode::Delegated);
        assert!(!delegated.url_parameter && delegated.script);
    }
}
