//! Page-side JavaScript snippets and selector tables.
//!
//! Every snippet is a self-contained expression whose result is JSON
//! serializable, so the driver can evaluate it and hand back a plain value.

/// Candidate selectors for the search input, tried in order.
pub const SEARCH_INPUT_SELECTORS: &[&str] = &[
    r#"textarea[placeholder*="Ask"]"#,
    r#"textarea[placeholder*="Search"]"#,
    "textarea.w-full",
    r#"textarea[rows="1"]"#,
    r#"[role="textbox"]"#,
    "textarea",
];

/// Elements that indicate a bot challenge is being shown.
pub const CAPTCHA_SELECTORS: &[&str] = &[
    r#"[class*="captcha"]"#,
    r#"[id*="captcha"]"#,
    r#"iframe[src*="captcha"]"#,
    r#"iframe[src*="recaptcha"]"#,
    r#"iframe[src*="turnstile"]"#,
    "#challenge-running",
    "#challenge-form",
];

/// Container the target renders answers into.
pub const ANSWER_SELECTOR: &str = ".prose";

/// Cheap round trip used to check the execution context is still alive.
pub const PING: &str = "1";

/// Wait for DOMContentLoaded (or give up after 10s inside the page).
pub const WAIT_FOR_READY: &str = r#"
    new Promise((resolve) => {
        if (document.readyState === 'complete' || document.readyState === 'interactive') {
            resolve(document.readyState);
        } else {
            document.addEventListener('DOMContentLoaded', () => resolve(document.readyState));
            setTimeout(() => resolve('timeout'), 10000);
        }
    })
"#;

pub const DOCUMENT_TITLE: &str = "document.title";

fn quote(selector: &str) -> String {
    serde_json::to_string(selector).unwrap_or_else(|_| "\"\"".to_string())
}

/// True when the element exists, is rendered, enabled and not aria-hidden.
pub fn interactive_check(selector: &str) -> String {
    format!(
        r#"(() => {{
            const el = document.querySelector({sel});
            if (!el) return false;
            const style = window.getComputedStyle(el);
            const rect = el.getBoundingClientRect();
            const visible = style.display !== 'none'
                && style.visibility !== 'hidden'
                && (rect.width > 0 || rect.height > 0);
            return visible
                && !el.disabled
                && el.getAttribute('aria-hidden') !== 'true';
        }})()"#,
        sel = quote(selector)
    )
}

pub fn element_exists(selector: &str) -> String {
    format!("document.querySelector({}) !== null", quote(selector))
}

/// `textContent` of the first match, or null.
pub fn text_of(selector: &str) -> String {
    format!(
        "(() => {{ const el = document.querySelector({}); return el ? el.textContent : null; }})()",
        quote(selector)
    )
}

/// `value` of the first matching form control, or null.
pub fn value_of(selector: &str) -> String {
    format!(
        "(() => {{ const el = document.querySelector({}); return el && 'value' in el ? el.value : null; }})()",
        quote(selector)
    )
}

/// Empty an input before typing into it.
pub fn clear_input(selector: &str) -> String {
    format!(
        r#"(() => {{
            const el = document.querySelector({sel});
            if (!el) return false;
            if ('value' in el) {{ el.value = ''; }} else {{ el.textContent = ''; }}
            el.dispatchEvent(new Event('input', {{ bubbles: true }}));
            return true;
        }})()"#,
        sel = quote(selector)
    )
}

/// Snapshot of all answer containers as `{text, terminal}`.
///
/// Text of every container is joined with blank lines. Links found inside the
/// containers are appended as a `Sources:` list. `terminal` reports whether the
/// last container ends in sentence punctuation.
pub fn answer_sample(selector: &str) -> String {
    format!(
        r#"(() => {{
            const nodes = Array.from(document.querySelectorAll({sel}));
            if (nodes.length === 0) return {{ text: '', terminal: false }};
            let text = nodes.map((n) => (n.innerText || '').trim()).filter((t) => t.length > 0).join('\n\n');
            const links = [];
            for (const n of nodes) {{
                for (const a of n.querySelectorAll('a[href]')) {{
                    if (a.href && !links.includes(a.href)) links.push(a.href);
                }}
            }}
            if (links.length > 0) {{
                text += '\n\nSources:\n' + links.map((h) => '- ' + h).join('\n');
            }}
            const last = (nodes[nodes.length - 1].innerText || '').trim();
            return {{ text, terminal: /[.?!]$/.test(last) }};
        }})()"#,
        sel = quote(selector)
    )
}
