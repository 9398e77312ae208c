//! Query shapes and result rows

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt::Write as _;

/// Shape of a search line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryMask {
    /// Prefix match on labels
    Label,
    /// Prefix match on aliases
    Alias,
    /// Exact item identifier
    Identifier,
    /// Recently changed items; input optional
    Recent,
}

impl QueryMask {
    pub const ALL: [QueryMask; 4] = [Self::Label, Self::Alias, Self::Identifier, Self::Recent];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Label => "label",
            Self::Alias => "alias",
            Self::Identifier => "identifier",
            Self::Recent => "recent",
        }
    }

    /// Empty input yields nothing to query
    #[must_use]
    pub const fn requires_input(self) -> bool {
        !matches!(self, Self::Recent)
    }
}

/// Endpoint flavour a query is rendered for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dialect {
    /// SPARQL with optional prefix declarations
    Sparql { prefixes: IndexMap<String, String> },
    /// Wikibase action API parameters as JSON
    Wikibase { language: String },
}

/// Unpaginated query built by a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    /// Search for `input` shaped by `mask`
    Search {
        dialect: Dialect,
        input: String,
        mask: QueryMask,
    },
    /// Details of one item
    Detail { dialect: Dialect, item: String },
}

impl Query {
    /// Render an executable query returning at most `limit` rows
    ///
    /// Returns `None` when there is nothing to query: zero limit, empty input
    /// for masks that need one, or an identifier mask with a non-identifier
    /// input.
    #[must_use]
    pub fn paginate(&self, limit: usize) -> Option<String> {
        if limit == 0 {
            return None;
        }
        match self {
            Self::Search { dialect, input, mask } => {
                let input = input.trim();
                if input.is_empty() && mask.requires_input() {
                    return None;
                }
                if *mask == QueryMask::Identifier && !is_identifier(input) {
                    return None;
                }
                Some(match dialect {
                    Dialect::Sparql { prefixes } => sparql_search(prefixes, input, *mask, limit),
                    Dialect::Wikibase { language } => wikibase_search(language, input, *mask, limit),
                })
            }
            Self::Detail { dialect, item } => {
                if !is_identifier(item) {
                    return None;
                }
                Some(match dialect {
                    Dialect::Sparql { prefixes } => sparql_detail(prefixes, item),
                    Dialect::Wikibase { language } => json!({
                        "action": "wbgetentities",
                        "ids": item,
                        "languages": language,
                        "format": "json",
                    })
                    .to_string(),
                })
            }
        }
    }
}

/// `Q42`, `P31`, `L1-S2` style identifiers
fn is_identifier(input: &str) -> bool {
    let mut chars = input.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_uppercase())
        && input.len() > 1
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '-')
}

fn escape(input: &str) -> String {
    input.replace('\\', "\\\\").replace('"', "\\\"")
}

fn prologue(prefixes: &IndexMap<String, String>) -> String {
    let mut out = String::new();
    for (name, iri) in prefixes {
        let _ = writeln!(out, "PREFIX {name}: <{iri}>");
    }
    out
}

fn sparql_search(prefixes: &IndexMap<String, String>, input: &str, mask: QueryMask, limit: usize) -> String {
    let needle = escape(&input.to_lowercase());
    let body = match mask {
        QueryMask::Label => format!(
            "?item rdfs:label ?label . FILTER(STRSTARTS(LCASE(STR(?label)), \"{needle}\"))"
        ),
        QueryMask::Alias => format!(
            "?item skos:altLabel ?alias . FILTER(STRSTARTS(LCASE(STR(?alias)), \"{needle}\")) ?item rdfs:label ?label ."
        ),
        QueryMask::Identifier => format!(
            "VALUES ?id {{ \"{}\" }} BIND(IRI(CONCAT(STR(wd:), ?id)) AS ?item) ?item rdfs:label ?label .",
            escape(input)
        ),
        QueryMask::Recent => {
            let filter = if needle.is_empty() {
                String::new()
            } else {
                format!(" FILTER(CONTAINS(LCASE(STR(?label)), \"{needle}\"))")
            };
            format!("?item schema:dateModified ?modified ; rdfs:label ?label .{filter}")
        }
    };
    let order = if mask == QueryMask::Recent {
        " ORDER BY DESC(?modified)"
    } else {
        ""
    };
    format!(
        "{}SELECT DISTINCT ?item ?label ?description WHERE {{ {body} OPTIONAL {{ ?item schema:description ?description }} }}{order} LIMIT {limit}",
        prologue(prefixes)
    )
}

fn sparql_detail(prefixes: &IndexMap<String, String>, item: &str) -> String {
    format!(
        "{}SELECT ?property ?value WHERE {{ wd:{} ?property ?value }} LIMIT 500",
        prologue(prefixes),
        escape(item)
    )
}

fn wikibase_search(language: &str, input: &str, mask: QueryMask, limit: usize) -> String {
    let params = match mask {
        QueryMask::Label | QueryMask::Alias => json!({
            "action": "wbsearchentities",
            "search": input,
            "language": language,
            "strictlanguage": mask == QueryMask::Label,
            "type": "item",
            "limit": limit,
            "format": "json",
        }),
        QueryMask::Identifier => json!({
            "action": "wbgetentities",
            "ids": input,
            "languages": language,
            "format": "json",
        }),
        QueryMask::Recent => json!({
            "action": "query",
            "list": "recentchanges",
            "rcnamespace": 0,
            "rctitle": input,
            "rclimit": limit,
            "format": "json",
        }),
    };
    params.to_string()
}

/// One search result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    /// Item identifier
    pub id: String,
    /// Display label
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Endpoint-specific fields
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

impl Row {
    /// Row with id and label only
    #[must_use]
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            description: None,
            extra: Map::new(),
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sparql(input: &str, mask: QueryMask) -> Query {
        let mut prefixes = IndexMap::new();
        prefixes.insert("wd".to_string(), "http://www.wikidata.org/entity/".to_string());
        Query::Search {
            dialect: Dialect::Sparql { prefixes },
            input: input.to_string(),
            mask,
        }
    }

    #[test]
    fn empty_input_needs_recent_mask() {
        assert_eq!(sparql("", QueryMask::Label).paginate(10), None);
        assert_eq!(sparql("   ", QueryMask::Alias).paginate(10), None);
        assert!(sparql("", QueryMask::Recent).paginate(10).is_some());
    }

    #[test]
    fn zero_limit_is_nothing_to_query() {
        assert_eq!(sparql("ab", QueryMask::Label).paginate(0), None);
    }

    #[test]
    fn identifier_mask_needs_identifier() {
        assert_eq!(sparql("douglas", QueryMask::Identifier).paginate(5), None);
        let query = sparql("Q42", QueryMask::Identifier).paginate(5).unwrap();
        assert!(query.contains("\"Q42\""));
    }

    #[test]
    fn sparql_rendering_carries_prefixes_and_limit() {
        let query = sparql("Ab\"c", QueryMask::Label).paginate(7).unwrap();
        assert!(query.starts_with("PREFIX wd: <http://www.wikidata.org/entity/>\n"));
        assert!(query.contains(r#"STRSTARTS(LCASE(STR(?label)), "ab\"c")"#));
        assert!(query.ends_with("LIMIT 7"));
    }

    #[test]
    fn wikibase_rendering_is_json() {
        let query = Query::Search {
            dialect: Dialect::Wikibase { language: "de".into() },
            input: "haus".into(),
            mask: QueryMask::Label,
        };
        let params: Value = serde_json::from_str(&query.paginate(3).unwrap()).unwrap();
        assert_eq!(params["action"], "wbsearchentities");
        assert_eq!(params["language"], "de");
        assert_eq!(params["limit"], 3);
    }

    #[test]
    fn detail_query() {
        let query = Query::Detail {
            dialect: Dialect::Wikibase { language: "en".into() },
            item: "Q1".into(),
        };
        assert!(query.paginate(1).unwrap().contains("wbgetentities"));

        let bad = Query::Detail {
            dialect: Dialect::Wikibase { language: "en".into() },
            item: "not an id".into(),
        };
        assert_eq!(bad.paginate(1), None);
    }

    #[test]
    fn row_serde_skips_empty_fields() {
        let row = Row::new("Q1", "Universe");
        assert_eq!(serde_json::to_value(&row).unwrap(), json!({ "id": "Q1", "label": "Universe" }));
    }
}
