//! Query expansion.
//!
//! A raw user query (possibly not in English) is rewritten by the oracle into an
//! English query, an expanded variant with synonyms and related terms, and an optional
//! document-type hint. Expansion is best-effort: any oracle failure or unparseable
//! answer degrades to the raw query with no type hint.

use crate::oracle::Oracle;
use crate::store::DocType;
use serde_json::Value;

/// The oracle's rewrite of a raw search query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryExpansion {
    /// The query translated to English, unchanged if already English.
    pub english_query: String,
    /// The English query expanded with synonyms and related terms.
    pub expanded_english_query: String,
    /// Document type inferred from the query, if the oracle named one.
    pub doc_type: Option<DocType>,
}

impl QueryExpansion {
    fn raw(query: &str) -> Self {
        Self {
            english_query: query.to_string(),
            expanded_english_query: query.to_string(),
            doc_type: None,
        }
    }
}

pub(crate) fn expansion_prompt(query: &str) -> String {
    format!(
        "You are a search query assistant for a personal document archive containing \
         invoices, receipts, flight tickets, and order confirmations.\n\
         Given the user query below, respond with JSON only (no markdown, no extra text):\n\
         {{\n\
           \"englishQuery\": \"the query translated to English, unchanged if already English\",\n\
           \"expandedEnglishQuery\": \"the English query expanded with synonyms, related terms, \
         and likely document vocabulary\",\n\
           \"docType\": \"one of Invoice, Receipt, Flight Ticket, Order Confirmation, or null \
         if the query does not clearly imply one\"\n\
         }}\n\
         User query: {query}"
    )
}

/// Expand `query` via the oracle, degrading to the raw query on any failure.
pub(crate) async fn expand_query(oracle: &dyn Oracle, query: &str) -> QueryExpansion {
    let raw = match oracle.generate(&expansion_prompt(query)).await {
        Ok(response) => response,
        Err(err) => {
            tracing::warn!(error = %err, "Query expansion failed, searching with the raw query");
            return QueryExpansion::raw(query);
        }
    };
    parse_expansion(&raw, query)
}

pub(crate) fn parse_expansion(raw: &str, query: &str) -> QueryExpansion {
    let Ok(value) = serde_json::from_str::<Value>(raw) else {
        tracing::warn!("Unparseable query expansion, searching with the raw query");
        return QueryExpansion::raw(query);
    };

    let english_query = non_empty_string(&value["englishQuery"]).unwrap_or_else(|| query.to_string());
    let expanded_english_query =
        non_empty_string(&value["expandedEnglishQuery"]).unwrap_or_else(|| english_query.clone());
    let doc_type = non_empty_string(&value["docType"])
        .filter(|label| !label.eq_ignore_ascii_case("null"))
        .map(|label| DocType::normalize(&label));

    QueryExpansion {
        english_query,
        expanded_english_query,
        doc_type,
    }
}

fn non_empty_string(value: &Value) -> Option<String> {
    value
        .as_str()
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}
