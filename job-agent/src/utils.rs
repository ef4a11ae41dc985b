/// Text processing utilities
pub mod text {
    /// Collapse runs of whitespace into single spaces and trim the ends.
    pub fn collapse_whitespace(text: &str) -> String {
        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// Join text fragments one per line, dropping blank ones.
    pub fn join_lines<'a, I>(fragments: I) -> String
    where
        I: IntoIterator<Item = &'a str>,
    {
        fragments
            .into_iter()
            .map(str::trim)
            .filter(|fragment| !fragment.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Keep at most `max_chars` characters. Never splits a code point.
    pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
        match text.char_indices().nth(max_chars) {
            Some((byte_index, _)) => &text[..byte_index],
            None => text,
        }
    }
}

/// URL utilities
pub mod url {
    use url::Url;

    /// Resolve `href` against `base`. Absolute hrefs are returned normalized.
    pub fn resolve_link(base: &str, href: &str) -> Result<String, url::ParseError> {
        let base = Url::parse(base)?;
        Ok(base.join(href.trim())?.to_string())
    }

    /// Drop the query string and fragment, which card-style boards use for tracking.
    pub fn strip_query(link: &str) -> String {
        match Url::parse(link) {
            Ok(mut url) => {
                url.set_query(None);
                url.set_fragment(None);
                url.to_string()
            }
            Err(_) => link.split(['?', '#']).next().unwrap_or(link).to_string(),
        }
    }

    /// Percent-encode a value for use inside a query string.
    pub fn encode_component(value: &str) -> String {
        url::form_urlencoded::byte_serialize(value.as_bytes())
            .collect::<String>()
            .replace('+', "%20")
    }

    /// Fill `{keyword}` and `{location}` placeholders of a search URL template.
    pub fn expand_template(template: &str, keyword: &str, location: &str) -> String {
        template
            .replace("{keyword}", &encode_component(keyword))
            .replace("{location}", &encode_component(location))
    }
}
