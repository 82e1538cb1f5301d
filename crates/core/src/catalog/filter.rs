//! Restricting which source records a run visits.
//!
//! A filter is a whitespace-separated list of terms. Double quotes keep a
//! term together.
//!
//! - `value` matches the uuid exactly
//! - `field=value` matches the field exactly
//! - `field:value` matches the field with SQL `LIKE`
//! - `field=@null` and `field=@notnull` test for missing values
//!
//! Terms on the same field are ORed, terms on different fields are ANDed.

use std::collections::BTreeMap;

use super::{CatalogError, SourceKind};

const ORIGINAL_FIELDS: &[&str] = &[
    "uuid",
    "relative_path",
    "checksum",
    "size",
    "encoding",
    "puid",
    "action",
    "action_data",
    "processed",
    "parent",
];

const MASTER_FIELDS: &[&str] = &[
    "uuid",
    "original_uuid",
    "sequence",
    "relative_path",
    "checksum",
    "size",
    "encoding",
    "puid",
    "convert_access",
    "convert_statutory",
    "processed",
];

#[derive(Debug, Clone, PartialEq, Eq)]
enum Condition {
    Equals(String),
    Like(String),
    IsNull,
    IsNotNull,
}

/// A parsed file filter. Fields are checked against the table when the
/// filter is rendered, since original and master tables differ.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileFilter {
    terms: BTreeMap<String, Vec<Condition>>,
}

impl FileFilter {
    pub fn parse(query: &str) -> Result<Self, CatalogError> {
        let mut filter = Self::default();
        for token in tokenize(query)? {
            let (field, condition) = parse_term(&token)?;
            filter.terms.entry(field).or_default().push(condition);
        }
        if filter.terms.is_empty() {
            return Err(CatalogError::InvalidQuery("empty query".to_string()));
        }
        Ok(filter)
    }

    /// SQL fragment and its values, with placeholders numbered from `first_param`.
    pub fn to_sql(
        &self,
        kind: SourceKind,
        first_param: usize,
    ) -> Result<(String, Vec<String>), CatalogError> {
        let fields = match kind {
            SourceKind::Original => ORIGINAL_FIELDS,
            SourceKind::Master => MASTER_FIELDS,
        };
        let mut clauses = Vec::new();
        let mut values = Vec::new();
        for (field, conditions) in &self.terms {
            if !fields.contains(&field.as_str()) {
                return Err(CatalogError::InvalidQuery(format!(
                    "unknown field '{field}' for {} files",
                    kind.as_str()
                )));
            }
            let alternatives: Vec<String> = conditions
                .iter()
                .map(|condition| match condition {
                    Condition::IsNull => format!("{field} IS NULL"),
                    Condition::IsNotNull => format!("{field} IS NOT NULL"),
                    Condition::Equals(value) => {
                        values.push(value.clone());
                        format!("{field} = ?{}", first_param + values.len() - 1)
                    }
                    Condition::Like(value) => {
                        values.push(value.clone());
                        format!("{field} LIKE ?{}", first_param + values.len() - 1)
                    }
                })
                .collect();
            clauses.push(format!("({})", alternatives.join(" OR ")));
        }
        Ok((clauses.join(" AND "), values))
    }
}

fn tokenize(query: &str) -> Result<Vec<String>, CatalogError> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut started = false;
    for c in query.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                started = true;
            }
            c if c.is_whitespace() && !quoted => {
                if started {
                    tokens.push(std::mem::take(&mut current));
                    started = false;
                }
            }
            c => {
                current.push(c);
                started = true;
            }
        }
    }
    if quoted {
        return Err(CatalogError::InvalidQuery("unterminated quote".to_string()));
    }
    if started {
        tokens.push(current);
    }
    Ok(tokens)
}

fn parse_term(token: &str) -> Result<(String, Condition), CatalogError> {
    let split = token
        .char_indices()
        .find(|(_, c)| *c == '=' || *c == ':')
        .filter(|(i, _)| token[..*i].chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
    let Some((index, operator)) = split else {
        return Ok(("uuid".to_string(), Condition::Equals(token.to_string())));
    };
    let field = token[..index].to_ascii_lowercase();
    if field.is_empty() {
        return Err(CatalogError::InvalidQuery(format!("missing field in '{token}'")));
    }
    let value = &token[index + 1..];
    let condition = match (operator, value) {
        ('=', "@null") => Condition::IsNull,
        ('=', "@notnull") => Condition::IsNotNull,
        ('=', _) => Condition::Equals(value.to_string()),
        _ => Condition::Like(value.to_string()),
    };
    Ok((field, condition))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_value_matches_uuid() {
        let filter = FileFilter::parse("0b5e5d0c-1a2b-4c3d-8e9f-001122334455").unwrap();
        let (sql, values) = filter.to_sql(SourceKind::Original, 5).unwrap();
        assert_eq!(sql, "(uuid = ?5)");
        assert_eq!(values, vec!["0b5e5d0c-1a2b-4c3d-8e9f-001122334455"]);
    }

    #[test]
    fn test_same_field_is_ored_other_fields_anded() {
        let filter = FileFilter::parse("puid=fmt/18 puid=fmt/19 \"relative_path:docs/%\"").unwrap();
        let (sql, values) = filter.to_sql(SourceKind::Original, 5).unwrap();
        assert_eq!(sql, "(puid = ?5 OR puid = ?6) AND (relative_path LIKE ?7)");
        assert_eq!(values, vec!["fmt/18", "fmt/19", "docs/%"]);
    }

    #[test]
    fn test_null_checks_take_no_values() {
        let filter = FileFilter::parse("puid=@null convert_access=@notnull").unwrap();
        let (sql, values) = filter.to_sql(SourceKind::Master, 1).unwrap();
        assert_eq!(sql, "(convert_access IS NOT NULL) AND (puid IS NULL)");
        assert!(values.is_empty());
    }

    #[test]
    fn test_quoted_values_keep_spaces() {
        let filter = FileFilter::parse("relative_path=\"my docs/a b.txt\"").unwrap();
        let (_, values) = filter.to_sql(SourceKind::Original, 1).unwrap();
        assert_eq!(values, vec!["my docs/a b.txt"]);
    }

    #[test]
    fn test_fields_checked_per_table() {
        let filter = FileFilter::parse("convert_access=@null").unwrap();
        assert!(filter.to_sql(SourceKind::Master, 1).is_ok());
        let err = filter.to_sql(SourceKind::Original, 1).unwrap_err();
        assert!(matches!(err, CatalogError::InvalidQuery(_)));

        let filter = FileFilter::parse("\"drop table; x=y\"").unwrap();
        let (sql, _) = filter.to_sql(SourceKind::Original, 1).unwrap();
        assert_eq!(sql, "(uuid = ?1)");
    }

    #[test]
    fn test_rejects_malformed_queries() {
        assert!(FileFilter::parse("").is_err());
        assert!(FileFilter::parse("   ").is_err());
        assert!(FileFilter::parse("=value").is_err());
        assert!(FileFilter::parse("puid=\"fmt/18").is_err());
    }
}
