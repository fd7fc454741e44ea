//! In-page scripts shared by engine implementations and callers.
//!
//! Arguments are embedded as JSON literals so every script is a single
//! self-contained expression.

use serde_json::Value;

/// Attribute marking style elements injected by us.
pub const STYLE_MARKER_ATTR: &str = "data-critcss";

fn js_str(value: &str) -> String {
    Value::from(value).to_string()
}

pub fn add_style(id: &str, css: &str) -> String {
    format!(
        "(() => {{ const el = document.createElement('style'); el.setAttribute('{STYLE_MARKER_ATTR}', {id}); \
         el.textContent = {css}; (document.head || document.documentElement).appendChild(el); return true; }})()",
        id = js_str(id),
        css = js_str(css),
    )
}

pub fn remove_style(id: &str) -> String {
    format!(
        "(() => {{ const id = {id}; let removed = 0; \
         for (const el of document.querySelectorAll('style[{STYLE_MARKER_ATTR}]')) {{ \
         if (el.getAttribute('{STYLE_MARKER_ATTR}') === id) {{ el.remove(); removed += 1; }} }} \
         return removed; }})()",
        id = js_str(id),
    )
}

/// Status and URL of the main document, from the navigation timing entry.
pub const NAVIGATION_INFO: &str = "(() => { const nav = performance.getEntriesByType('navigation')[0]; \
     return { status: nav && nav.responseStatus ? nav.responseStatus : null, url: location.href }; })()";

/// The document's own `<style>` blocks and linked stylesheets in document order.
pub const PAGE_STYLES: &str = "(() => Array.from(document.querySelectorAll('style, link[rel~=\"stylesheet\" i]')) \
     .filter((el) => !el.hasAttribute('data-critcss')) \
     .map((el) => el.tagName === 'STYLE' \
         ? { kind: 'inline', text: el.textContent || '' } \
         : { kind: 'link', href: el.href || '' }))()";

/// Read a stylesheet from inside a browsing context.
///
/// When the current document is the engine's text rendering of the resource
/// its text is returned directly; otherwise the resource is fetched through
/// the context with its credentials.
pub fn in_context_fetch(url: &str) -> String {
    format!(
        "(async (url) => {{ \
         const body = document.body; \
         const only = body && body.children.length === 1 ? body.firstElementChild : null; \
         if (location.href === url && only && only.tagName === 'PRE') {{ return {{ text: only.textContent || '', via: 'document' }}; }} \
         if (location.href === url && document.contentType && document.contentType.startsWith('text/css')) {{ \
           return {{ text: document.documentElement.textContent || '', via: 'document' }}; }} \
         const res = await fetch(url, {{ credentials: 'include' }}); \
         if (!res.ok) {{ return {{ error: 'status ' + res.status, status: res.status }}; }} \
         return {{ text: await res.text(), via: 'fetch' }}; \
         }})({url})",
        url = js_str(url),
    )
}
