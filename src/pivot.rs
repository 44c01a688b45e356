//! Pivot queries over an entity-attribute-value view.
//!
//! The view stores one `(ID, COLUMN_NAME, VALUE)` row per attribute. The model
//! is told to query a logical relation named [`PIVOT_RELATION`] with one column
//! per attribute, and [`PivotQueryBuilder::expand`] swaps that relation for
//! the conditional-aggregation subquery that reconstructs it.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::validator::words;

pub const PIVOT_RELATION: &str = "pivoted";

const CLAUSE_KEYWORDS: &[&str] = &[
    "WHERE", "GROUP", "ORDER", "LIMIT", "OFFSET", "HAVING", "JOIN", "INNER", "LEFT", "RIGHT",
    "FULL", "CROSS", "NATURAL", "ON", "USING", "UNION", "INTERSECT", "EXCEPT", "WINDOW", "FETCH",
];

fn relation_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(&format!(
            r"(?i)\b(FROM|JOIN)\s+{PIVOT_RELATION}\b(?:\s+AS)?(?:\s+([A-Za-z_][A-Za-z0-9_]*))?"
        ))
        .expect("pivot relation regex should compile")
    })
}

/// Column alias for an attribute name: `"Net Fee"` becomes `net_fee`.
pub fn alias_for(attribute: &str) -> String {
    let mut alias = String::with_capacity(attribute.len());
    for c in attribute.trim().chars() {
        if c.is_ascii_alphanumeric() {
            alias.push(c.to_ascii_lowercase());
        } else if !alias.ends_with('_') {
            alias.push('_');
        }
    }
    let alias = alias.trim_matches('_');

    if alias.is_empty() {
        "col".to_string()
    } else if alias.starts_with(|c: char| c.is_ascii_digit()) {
        format!("c_{alias}")
    } else {
        alias.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PivotColumn {
    pub attribute: String,
    pub alias: String,
}

#[derive(Debug, Clone)]
pub struct PivotQueryBuilder {
    view: String,
    columns: Vec<PivotColumn>,
}

impl PivotQueryBuilder {
    pub fn new(view: impl Into<String>, attributes: &[String]) -> Self {
        let mut used: HashSet<String> = HashSet::from(["id".to_string()]);
        let columns = attributes
            .iter()
            .map(|attribute| {
                let base = alias_for(attribute);
                let mut alias = base.clone();
                let mut n = 2;
                while !used.insert(alias.clone()) {
                    alias = format!("{base}_{n}");
                    n += 1;
                }
                PivotColumn {
                    attribute: attribute.clone(),
                    alias,
                }
            })
            .collect();

        Self {
            view: view.into(),
            columns,
        }
    }

    pub fn columns(&self) -> &[PivotColumn] {
        &self.columns
    }

    /// Builds the pivot for the given aliases; unknown aliases are ignored and
    /// an empty selection means every attribute.
    pub fn build(&self, wanted: &[&str]) -> String {
        let selected: Vec<&PivotColumn> = if wanted.is_empty() {
            self.columns.iter().collect()
        } else {
            self.columns
                .iter()
                .filter(|column| wanted.iter().any(|w| w.eq_ignore_ascii_case(&column.alias)))
                .collect()
        };

        let mut select = vec!["ID AS id".to_string()];
        select.extend(selected.iter().map(|column| {
            format!(
                "MAX(CASE WHEN COLUMN_NAME = '{}' THEN VALUE END) AS {}",
                column.attribute.replace('\'', "''"),
                column.alias
            )
        }));

        format!("SELECT {} FROM {} GROUP BY ID", select.join(", "), self.view)
    }

    /// Replaces every `FROM pivoted` / `JOIN pivoted` with the pivot subquery,
    /// keeping any alias the query gave it.
    pub fn expand(&self, sql: &str) -> String {
        if !relation_regex().is_match(sql) {
            return sql.to_string();
        }

        let referenced: Vec<&str> = self
            .columns
            .iter()
            .filter(|column| words(sql).any(|w| w.eq_ignore_ascii_case(&column.alias)))
            .map(|column| column.alias.as_str())
            .collect();
        let pivot = self.build(&referenced);

        relation_regex()
            .replace_all(sql, |caps: &Captures| {
                let keyword = &caps[1];
                match caps.get(2).map(|m| m.as_str()) {
                    Some(word) if CLAUSE_KEYWORDS.iter().any(|k| k.eq_ignore_ascii_case(word)) => {
                        format!("{keyword} ({pivot}) AS {PIVOT_RELATION} {word}")
                    }
                    Some(alias) => format!("{keyword} ({pivot}) AS {alias}"),
                    None => format!("{keyword} ({pivot}) AS {PIVOT_RELATION}"),
                }
            })
            .into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> PivotQueryBuilder {
        PivotQueryBuilder::new(
            "flattened_students",
            &["Name".to_string(), "Net Fee".to_string(), "Email ID".to_string()],
        )
    }

    #[test]
    fn derives_aliases() {
        assert_eq!(alias_for("Net Fee"), "net_fee");
        assert_eq!(alias_for("  Email-ID "), "email_id");
        assert_eq!(alias_for("2024 Batch"), "c_2024_batch");
        assert_eq!(alias_for("%%"), "col");
    }

    #[test]
    fn deduplicates_aliases() {
        let attributes = ["Net Fee".to_string(), "Net-Fee".to_string(), "ID".to_string()];
        let b = PivotQueryBuilder::new("v", &attributes);
        let aliases: Vec<_> = b.columns().iter().map(|c| c.alias.as_str()).collect();
        assert_eq!(aliases, ["net_fee", "net_fee_2", "id_2"]);
    }

    #[test]
    fn builds_only_wanted_columns() {
        assert_eq!(
            builder().build(&["net_fee"]),
            "SELECT ID AS id, MAX(CASE WHEN COLUMN_NAME = 'Net Fee' THEN VALUE END) AS net_fee \
             FROM flattened_students GROUP BY ID"
        );
        assert_eq!(builder().build(&[]).matches("MAX(CASE").count(), 3);
    }

    #[test]
    fn escapes_quotes_in_attribute_names() {
        let b = PivotQueryBuilder::new("v", &["Father's Name".to_string()]);
        assert!(b.build(&[]).contains("COLUMN_NAME = 'Father''s Name'"));
    }

    #[test]
    fn expands_the_logical_relation() {
        let sql = builder().expand("SELECT name, net_fee FROM pivoted WHERE net_fee IS NOT NULL");
        assert_eq!(
            sql,
            "SELECT name, net_fee FROM (SELECT ID AS id, \
             MAX(CASE WHEN COLUMN_NAME = 'Name' THEN VALUE END) AS name, \
             MAX(CASE WHEN COLUMN_NAME = 'Net Fee' THEN VALUE END) AS net_fee \
             FROM flattened_students GROUP BY ID) AS pivoted WHERE net_fee IS NOT NULL"
        );
    }

    #[test]
    fn keeps_query_aliases() {
        let sql = builder().expand("SELECT p.name FROM pivoted p");
        assert!(sql.ends_with("GROUP BY ID) AS p"), "{sql}");

        let sql = builder().expand("SELECT s.name FROM pivoted AS s ORDER BY s.name");
        assert!(sql.contains("GROUP BY ID) AS s ORDER BY"), "{sql}");
    }

    #[test]
    fn leaves_other_queries_untouched() {
        let sql = "SELECT COUNT(*) FROM flattened_students";
        assert_eq!(builder().expand(sql), sql);
    }
}
