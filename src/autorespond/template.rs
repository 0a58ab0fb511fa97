//! `$name` placeholder substitution for response templates.
//!
//! Syntax: `$name` or `${name}` where a name is an ASCII letter or
//! underscore followed by letters, digits or underscores. `$$` is a literal
//! dollar sign. A `$` followed by anything else is copied through.
//!
//! Unknown names are not errors: the placeholder stays in the output as
//! written and the name is reported in `Rendered::missing`.

use std::collections::BTreeMap;

use crate::error::TemplateError;
use crate::list::MailingList;

/// Result of resolving one placeholder name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Found(String),
    Missing,
}

/// Rendered template text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub text: String,
    /// Names left unsubstituted, in order of first appearance.
    pub missing: Vec<String>,
}

/// Named values available to a template.
#[derive(Debug, Clone, Default)]
pub struct Substitutions {
    values: BTreeMap<String, String>,
}

impl Substitutions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.values.insert(key.to_string(), value.into());
        self
    }

    /// The keys offered to autoresponse templates.
    pub fn for_list(mlist: &MailingList) -> Self {
        Self::new()
            .with("list_name", mlist.display_name.clone())
            .with("listinfo_uri", mlist.listinfo_uri.clone())
            .with("request_email", mlist.request_address())
            .with("admin_email", mlist.admin_address())
            .with("owner_email", mlist.owner_address())
    }

    pub fn lookup(&self, key: &str) -> Lookup {
        match self.values.get(key) {
            Some(value) => Lookup::Found(value.clone()),
            None => Lookup::Missing,
        }
    }

    /// Render `template` against these values.
    pub fn render(&self, template: &str) -> Result<Rendered, TemplateError> {
        render(template, |key| self.lookup(key))
    }
}

fn is_name_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if is_name_start(c)) && chars.all(is_name_char)
}

/// Substitute placeholders in `template` using `lookup`.
pub fn render(
    template: &str,
    lookup: impl Fn(&str) -> Lookup,
) -> Result<Rendered, TemplateError> {
    let mut text = String::with_capacity(template.len());
    let mut missing: Vec<String> = Vec::new();
    let mut rest = template;
    let mut offset = 0;

    while let Some(pos) = rest.find('$') {
        text.push_str(&rest[..pos]);
        let start = offset + pos;
        let after = &rest[pos + 1..];

        let (name, raw_len) = if after.starts_with('$') {
            text.push('$');
            rest = &after[1..];
            offset = start + 2;
            continue;
        } else if let Some(braced) = after.strip_prefix('{') {
            let Some(close) = braced.find('}') else {
                return Err(TemplateError::Unterminated { offset: start });
            };
            let name = &braced[..close];
            if !valid_name(name) {
                return Err(TemplateError::InvalidPlaceholder {
                    placeholder: format!("${{{name}}}"),
                    offset: start,
                });
            }
            (name, close + 3)
        } else {
            let len = after
                .char_indices()
                .take_while(|&(i, c)| if i == 0 { is_name_start(c) } else { is_name_char(c) })
                .map(|(i, c)| i + c.len_utf8())
                .last()
                .unwrap_or(0);
            if len == 0 {
                text.push('$');
                rest = after;
                offset = start + 1;
                continue;
            }
            (&after[..len], len + 1)
        };

        match lookup(name) {
            Lookup::Found(value) => text.push_str(&value),
            Lookup::Missing => {
                text.push_str(&rest[pos..pos + raw_len]);
                if !missing.iter().any(|m| m == name) {
                    missing.push(name.to_string());
                }
            }
        }
        rest = &rest[pos + raw_len..];
        offset = start + raw_len;
    }
    text.push_str(rest);

    Ok(Rendered { text, missing })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values() -> Substitutions {
        Substitutions::new()
            .with("list_name", "Test List")
            .with("owner_email", "test-owner@example.com")
    }

    #[test]
    fn substitutes_both_forms() {
        let rendered = values()
            .render("Welcome to $list_name. Mail ${owner_email}s with questions.")
            .unwrap();
        assert_eq!(
            rendered.text,
            "Welcome to Test List. Mail test-owner@example.coms with questions."
        );
        assert!(rendered.missing.is_empty());
    }

    #[test]
    fn missing_keys_stay_literal() {
        let rendered = values()
            .render("See $listinfo_uri or ${listinfo_uri}; ask $nobody.")
            .unwrap();
        assert_eq!(rendered.text, "See $listinfo_uri or ${listinfo_uri}; ask $nobody.");
        assert_eq!(rendered.missing, vec!["listinfo_uri", "nobody"]);
    }

    #[test]
    fn dollar_escapes_and_strays() {
        let rendered = values().render("Costs $$5, $ 3 or $9. End$").unwrap();
        assert_eq!(rendered.text, "Costs $5, $ 3 or $9. End$");
    }

    #[test]
    fn name_stops_at_non_identifier() {
        let rendered = values().render("[$list_name]").unwrap();
        assert_eq!(rendered.text, "[Test List]");
    }

    #[test]
    fn unterminated_brace_is_an_error() {
        assert_eq!(
            values().render("Hello ${list_name"),
            Err(TemplateError::Unterminated { offset: 6 })
        );
    }

    #[test]
    fn invalid_braced_name_is_an_error() {
        assert_eq!(
            values().render("x ${not valid}"),
            Err(TemplateError::InvalidPlaceholder {
                placeholder: "${not valid}".to_string(),
                offset: 2
            })
        );
        assert!(values().render("${}").is_err());
    }

    #[test]
    fn list_keys() {
        let mut mlist = MailingList::new("test@example.com", "Test");
        mlist.listinfo_uri = "https://lists.example.com/test".to_string();
        let rendered = Substitutions::for_list(&mlist)
            .render("$list_name $listinfo_uri $request_email $admin_email $owner_email")
            .unwrap();
        assert_eq!(
            rendered.text,
            "Test https://lists.example.com/test test-request@example.com \
             test-admin@example.com test-owner@example.com"
        );
    }

    #[test]
    fn non_ascii_text_passes_through() {
        let rendered = values().render("Grüße von $list_name — ça va").unwrap();
        assert_eq!(rendered.text, "Grüße von Test List — ça va");
    }
}
