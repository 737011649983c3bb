//! `Set-Cookie` rendering for session identifiers.

use crate::session::SessionOptions;
use chrono::Utc;
use std::time::Duration;

const EXPIRES_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

fn push_attributes(cookie: &mut String, options: &SessionOptions) {
    cookie.push_str(&format!("; Path={}", options.path));

    if let Some(ref domain) = options.domain {
        cookie.push_str(&format!("; Domain={}", domain));
    }

    if options.secure {
        cookie.push_str("; Secure");
    }

    if options.http_only {
        cookie.push_str("; HttpOnly");
    }

    cookie.push_str(&format!("; SameSite={}", options.same_site));
}

/// Render the cookie carrying a session id
///
/// A positive `max_age` adds both `Max-Age` and `Expires`, a negative one
/// expires the cookie immediately and zero makes it a browser-session cookie.
pub fn session_cookie(name: &str, session_id: &str, options: &SessionOptions) -> String {
    let mut cookie = format!("{}={}", name, session_id);
    push_attributes(&mut cookie, options);

    if options.max_age > 0 {
        cookie.push_str(&format!("; Max-Age={}", options.max_age));
        let expires = chrono::Duration::from_std(Duration::from_secs(options.max_age as u64))
            .ok()
            .and_then(|delta| Utc::now().checked_add_signed(delta));
        if let Some(expires) = expires {
            cookie.push_str(&format!("; Expires={}", expires.format(EXPIRES_FORMAT)));
        }
    } else if options.max_age < 0 {
        cookie.push_str("; Max-Age=0");
        cookie.push_str("; Expires=Thu, 01 Jan 1970 00:00:00 GMT");
    }

    cookie
}

/// Render a cookie that makes the client drop its session id
pub fn expired_cookie(name: &str, options: &SessionOptions) -> String {
    session_cookie(
        name,
        "",
        &SessionOptions {
            max_age: -1,
            ..options.clone()
        },
    )
}
