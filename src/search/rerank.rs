//! LLM reranking of retrieval candidates.
//!
//! Every candidate is scored independently against the query, with at most
//! `concurrency` oracle calls in flight at once. Scoring is best-effort per
//! candidate: an oracle failure or unparseable answer scores that candidate 0
//! rather than failing the search. Candidates with no extracted data score 0
//! without an oracle call.

use crate::oracle::Oracle;
use crate::store::Document;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use uuid::Uuid;

fn scoring_prompt(query: &str, document: &Document) -> String {
    format!(
        "Rate how relevant this document is to the search query on a scale from 0.0 \
         (irrelevant) to 1.0 (a direct answer).\n\
         Respond with JSON only: {{\"docId\": \"{id}\", \"relevancy\": <number>}}\n\n\
         Query: {query}\n\n\
         Document id: {id}\n\
         Name: {name}\n\
         Type: {doc_type}\n\
         Description: {description}\n\
         ExtractedData: {extracted}",
        id = document.id,
        name = document
            .better_name
            .as_deref()
            .unwrap_or(&document.original_file_name),
        doc_type = document.doc_type.map(|t| t.label()).unwrap_or(""),
        description = document.description.as_deref().unwrap_or(""),
        extracted = document.extracted_data_json.as_deref().unwrap_or("{}"),
    )
}

/// Parse a `{"docId", "relevancy"}` answer, clamped to `[0, 1]`. Anything else is 0.
pub(crate) fn parse_score(raw: &str) -> f64 {
    let Ok(value) = serde_json::from_str::<Value>(raw) else {
        return 0.0;
    };
    relevancy_of(&value["relevancy"]).clamp(0.0, 1.0)
}

fn relevancy_of(value: &Value) -> f64 {
    match value {
        Value::Number(number) => number.as_f64().unwrap_or(0.0),
        Value::String(text) => text.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Score every candidate against `query`, never exceeding `concurrency` in-flight
/// oracle calls. Returns a score for every input id.
pub(crate) async fn score_candidates(
    oracle: Arc<dyn Oracle>,
    query: &str,
    candidates: &[Document],
    concurrency: usize,
) -> HashMap<Uuid, f64> {
    let mut scores = HashMap::with_capacity(candidates.len());
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut tasks = JoinSet::new();

    for candidate in candidates {
        // Nothing was extracted, so there is nothing to judge.
        if candidate.extracted_data_json.is_none() {
            scores.insert(candidate.id, 0.0);
            continue;
        }

        let oracle = oracle.clone();
        let semaphore = semaphore.clone();
        let id = candidate.id;
        let prompt = scoring_prompt(query, candidate);
        tasks.spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore open");
            let score = match oracle.generate(&prompt).await {
                Ok(raw) => parse_score(&raw),
                Err(err) => {
                    tracing::warn!(document_id = %id, error = %err, "Rerank scoring failed");
                    0.0
                }
            };
            (id, score)
        });
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((id, score)) => {
                scores.insert(id, score);
            }
            Err(err) => {
                tracing::error!(error = %err, "Rerank task panicked");
            }
        }
    }
    scores
}

fn tie_break_prompt(query: &str, tied: &[&Document]) -> String {
    let mut prompt = format!(
        "These documents scored equally against the query. Order them from most to \
         least relevant and respond with JSON only: a JSON array of the document id \
         strings, every id appearing exactly once.\n\nQuery: {query}\n"
    );
    for document in tied {
        prompt.push_str(&format!(
            "\nDocument id: {}\nName: {}\nDescription: {}\nExtractedData: {}\n",
            document.id,
            document
                .better_name
                .as_deref()
                .unwrap_or(&document.original_file_name),
            document.description.as_deref().unwrap_or(""),
            document.extracted_data_json.as_deref().unwrap_or("{}"),
        ));
    }
    prompt
}

/// Ask the oracle to order a tied group. Returns `None` when the answer is unusable,
/// in which case the existing order stands.
pub(crate) async fn tie_break(
    oracle: &dyn Oracle,
    query: &str,
    tied: &[&Document],
) -> Option<Vec<Uuid>> {
    let raw = match oracle.generate(&tie_break_prompt(query, tied)).await {
        Ok(raw) => raw,
        Err(err) => {
            tracing::warn!(error = %err, "Tie-break call failed, keeping existing order");
            return None;
        }
    };
    parse_tie_break(&raw, tied)
}

pub(crate) fn parse_tie_break(raw: &str, tied: &[&Document]) -> Option<Vec<Uuid>> {
    let ids: Vec<Uuid> = serde_json::from_str::<Vec<String>>(raw)
        .ok()?
        .iter()
        .filter_map(|text| Uuid::parse_str(text.trim()).ok())
        .collect();

    // Anything other than a permutation of the tied ids is unusable.
    if ids.len() != tied.len() {
        return None;
    }
    let mut seen = std::collections::HashSet::new();
    for id in &ids {
        if !tied.iter().any(|doc| doc.id == *id) || !seen.insert(*id) {
            return None;
        }
    }
    Some(ids)
}
