//! Selectors that are always treated as critical.

use std::sync::LazyLock;

use regex::RegexSet;

/// Root and structural selectors plus class names starting with a conventional
/// above-the-fold prefix (`.navbar` and `.header-tools` count as `nav` and `header`).
static ALWAYS_CRITICAL: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"(?i)(^|[\s>+~(])(html|body|h[1-6])($|[\s>+~.#:\[)])",
        r"(^|[\s>+~(])\*",
        r"(?i):root($|[^\w-])",
        r"(?i)\.(hero|header|nav|menu|logo|critical|above-fold)",
    ])
    .expect("always-critical patterns are valid")
});

/// Whether any selector in a selector list hits the always-critical set.
pub fn is_always_critical(selector_list: &str) -> bool {
    selector_list.split(',').map(str::trim).any(|selector| ALWAYS_CRITICAL.is_match(selector))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_selectors() {
        for selector in ["html", "body", "*", ":root", "html body", "*, *::before", "body > main"] {
            assert!(is_always_critical(selector), "{selector}");
        }
    }

    #[test]
    fn test_headings() {
        for selector in ["h1", "h6", "article h2", "h3.title", "main > h4:first-child"] {
            assert!(is_always_critical(selector), "{selector}");
        }
        assert!(!is_always_critical("h7"));
        assert!(!is_always_critical(".h1-ish"));
    }

    #[test]
    fn test_conventional_classes() {
        for selector in [".hero", ".header", "div.nav", ".menu li", ".logo img", ".critical", ".above-fold"] {
            assert!(is_always_critical(selector), "{selector}");
        }
    }

    #[test]
    fn test_class_prefixes_match() {
        for selector in [".navbar", ".header-tools", ".menu-item", ".logo-img", ".hero__title", "ul.nav-links > li"] {
            assert!(is_always_critical(selector), "{selector}");
        }
    }

    #[test]
    fn test_unrelated_selectors_do_not_match() {
        for selector in [".footer", ".site-nav", "#nav", "nav", "[data-x*=y]", "bodyguard", ".h1-ish"] {
            assert!(!is_always_critical(selector), "{selector}");
        }
    }

    #[test]
    fn test_any_selector_in_list() {
        assert!(is_always_critical(".footer, .hero"));
        assert!(!is_always_critical(".footer, .sidebar"));
    }
}
