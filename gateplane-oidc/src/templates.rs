//! HTML pages returned to the browser by the callback listener.

/// Page shown after a successful redirect.
pub const SUCCESS_HTML: &str = r#"<!DOCTYPE html>
<html>
<head><title>Authentication Successful</title></head>
<body style="font-family: system-ui; text-align: center; padding: 50px;">
<h1>Authentication Successful</h1>
<p>You can close this window and return to the CLI.</p>
<script>setTimeout(window.close, 5000);</script>
</body>
</html>"#;

/// Page shown when the redirect carried an error or no code.
pub fn failure_html(message: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><title>Authentication Failed</title></head>
<body style="font-family: system-ui; text-align: center; padding: 50px;">
<h1>Authentication Failed</h1>
<p>{}</p>
<p>You can close this window.</p>
</body>
</html>"#,
        html_escape(message)
    )
}

/// Escape text for inclusion in an HTML element body.
pub fn html_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}
