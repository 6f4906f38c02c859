// Varseal - Canonical Form Builder
//
// Derives deterministic strings from an entity's identity fields by
// substituting `{Field}` placeholders in fixed templates. The output is the
// input to row signing, so it must never depend on mutable payload fields
// such as a variable's value.

use super::CryptoError;

/// Capability implemented by every signed entity.
///
/// `TEMPLATES` is ordered newest first: rows are signed with the first
/// template and verified against any of them.
pub trait Canonical {
    const TEMPLATES: &'static [&'static str];

    /// Identity fields available to the templates, in declaration order.
    fn canonical_fields(&self) -> Vec<(&'static str, String)>;

    fn canonical_forms(&self) -> Result<CanonicalForms, CryptoError> {
        CanonicalForms::render(Self::TEMPLATES, &self.canonical_fields())
    }
}

/// One rendered string per declared template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalForms(Vec<String>);

impl CanonicalForms {
    /// Render every template against the given fields.
    pub fn render(
        templates: &[&str],
        fields: &[(&'static str, String)],
    ) -> Result<Self, CryptoError> {
        if templates.is_empty() {
            return Err(CryptoError::Template(
                "at least one canonical template is required".to_string(),
            ));
        }

        templates
            .iter()
            .map(|t| render_one(t, fields))
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }

    /// The current form, used when signing.
    pub fn current(&self) -> &str {
        // render() rejects an empty template list
        &self.0[0]
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn render_one(template: &str, fields: &[(&'static str, String)]) -> Result<String, CryptoError> {
    let mut out = String::with_capacity(template.len() * 2);
    let mut chars = template.chars();

    while let Some(c) = chars.next() {
        match c {
            '{' => {
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some('{') | None => {
                            return Err(CryptoError::Template(format!(
                                "unterminated placeholder in '{}'",
                                template
                            )))
                        }
                        Some(ch) => name.push(ch),
                    }
                }

                let value = fields
                    .iter()
                    .find(|(field, _)| *field == name)
                    .map(|(_, v)| v)
                    .ok_or_else(|| {
                        CryptoError::Template(format!(
                            "unknown field '{}' in '{}'",
                            name, template
                        ))
                    })?;
                out.push_str(value);
            }
            '}' => {
                return Err(CryptoError::Template(format!(
                    "unbalanced '}}' in '{}'",
                    template
                )))
            }
            other => out.push(other),
        }
    }

    Ok(out)
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn fields() -> Vec<(&'static str, String)> {
        vec![
            ("ProjectID", "42".to_string()),
            ("ID", "7".to_string()),
            ("Name", "TOKEN".to_string()),
            ("Type", "password".to_string()),
        ]
    }

    #[test]
    fn test_render_substitutes_in_order() {
        let forms = CanonicalForms::render(&["{ProjectID}{ID}{Name}{Type}"], &fields()).unwrap();
        assert_eq!(forms.current(), "427TOKENpassword");
        assert_eq!(forms.len(), 1);
    }

    #[test]
    fn test_render_is_deterministic() {
        let a = CanonicalForms::render(&["{ProjectID}{ID}{Name}"], &fields()).unwrap();
        let b = CanonicalForms::render(&["{ProjectID}{ID}{Name}"], &fields()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_literal_text_is_kept() {
        let forms = CanonicalForms::render(&["v2:{ID}/{Name}"], &fields()).unwrap();
        assert_eq!(forms.current(), "v2:7/TOKEN");
    }

    #[test]
    fn test_multiple_templates_render_newest_first() {
        let forms =
            CanonicalForms::render(&["{ID}{Name}{Type}", "{ID}{Name}"], &fields()).unwrap();
        let all: Vec<&str> = forms.iter().collect();
        assert_eq!(all, vec!["7TOKENpassword", "7TOKEN"]);
        assert_eq!(forms.current(), "7TOKENpassword");
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let err = CanonicalForms::render(&["{ID}{Value}"], &fields()).unwrap_err();
        assert!(matches!(err, CryptoError::Template(_)));
    }

    #[test]
    fn test_unbalanced_braces_are_rejected() {
        assert!(CanonicalForms::render(&["{ID"], &fields()).is_err());
        assert!(CanonicalForms::render(&["ID}"], &fields()).is_err());
        assert!(CanonicalForms::render(&["{{ID}}"], &fields()).is_err());
    }

    #[test]
    fn test_empty_template_list_is_rejected() {
        assert!(CanonicalForms::render(&[], &fields()).is_err());
    }
}
