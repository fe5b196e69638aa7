use uuid::Uuid;

pub fn generate_schema_name() -> String {
    let uuid_str = Uuid::new_v4().to_string().replace('-', "_");
    format!("tenant_{}", &uuid_str[..8])
}

pub fn sanitize_string(input: &str) -> String {
    input
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || "-_.@".contains(*c))
        .collect()
}

/// Normalizes free text for identity comparison: lowercased, whitespace
/// collapsed, punctuation stripped. Used to key fact deduplication and
/// delta detection off semantically-equivalent strings rather than exact
/// byte matches (e.g. `"John   Doe"` and `"john doe"` canonicalize equal).
pub fn canonicalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_was_space = false;

    for c in text.trim().chars() {
        if c.is_alphanumeric() {
            out.extend(c.to_lowercase());
            last_was_space = false;
        } else if c.is_whitespace() && !last_was_space {
            out.push(' ');
            last_was_space = true;
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalize_collapses_whitespace_and_case() {
        assert_eq!(canonicalize("  John   DOE  "), "john doe");
        assert_eq!(canonicalize("Jane-Doe, Esq."), "jane doe esq");
    }

    #[test]
    fn schema_names_are_unique_and_prefixed() {
        let a = generate_schema_name();
        let b = generate_schema_name();
        assert!(a.starts_with("tenant_"));
        assert_ne!(a, b);
    }
}
