//! GraphQL event feed client.
//!
//! Queries every event kind in one request, one aliased selection per kind:
//!
//! ```text
//! query Events($since: BigInt!, $limit: Int!) {
//!   GatherFood: gatherFoods(where: { timeGatherFood_gt: $since },
//!                           orderBy: timeGatherFood, orderDirection: asc,
//!                           first: $limit) { id ... }
//!   ...
//! }
//! ```
//!
//! Each alias comes back as its own `RawBatch` tagged with the kind, so the
//! normalizer can classify records even when the schema has no `kind` field.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use super::{EventSource, FetchError, FetchPage, RawBatch};
use crate::events::EventKind;

const PLAYER_FIELDS: &str = "username displayName";

/// One kind-specific slice of the feed.
struct Slice {
    kind: EventKind,
    collection: &'static str,
    fields: &'static str,
}

const SLICES: [Slice; 6] = [
    Slice {
        kind: EventKind::GatherFood,
        collection: "gatherFoods",
        fields: "amount villagers",
    },
    Slice {
        kind: EventKind::ChopWood,
        collection: "chopWoods",
        fields: "amount villagers",
    },
    Slice {
        kind: EventKind::BuildHut,
        collection: "buildHuts",
        fields: "hutsAdded",
    },
    Slice {
        kind: EventKind::CommitDefense,
        collection: "commitDefenses",
        fields: "",
    },
    Slice {
        kind: EventKind::AttackVillage,
        collection: "attackVillages",
        fields: "amount defender { username displayName }",
    },
    Slice {
        kind: EventKind::RevealBattle,
        collection: "revealBattles",
        fields: "amount resource winnerVillageId defender { username displayName }",
    },
];

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    #[serde(default)]
    data: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(default)]
    errors: Option<Vec<GraphQlErrorMessage>>,
}

#[derive(Debug, Deserialize)]
struct GraphQlErrorMessage {
    #[serde(default)]
    message: String,
}

pub struct GraphQlSource {
    client: reqwest::Client,
    endpoint: String,
}

impl GraphQlSource {
    pub fn new(endpoint: String, timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, endpoint })
    }

    /// The query document sent on every fetch.
    pub fn query_document() -> String {
        let mut query = String::from("query Events($since: BigInt!, $limit: Int!) {\n");
        for slice in &SLICES {
            // Every known kind has a time field; the unwrap_or keeps this total.
            let time_field = slice.kind.time_field().unwrap_or("timestamp");
            query.push_str(&format!(
                "  {alias}: {collection}(where: {{ {time}_gt: $since }}, orderBy: {time}, \
                 orderDirection: asc, first: $limit) {{ id {time} player {{ {player} }} {fields} }}\n",
                alias = slice.kind.as_str(),
                collection = slice.collection,
                time = time_field,
                player = PLAYER_FIELDS,
                fields = slice.fields,
            ));
        }
        query.push('}');
        query
    }
}

/// Split a GraphQL response body into per-kind batches.
fn parse_response(body: GraphQlResponse, limit: usize) -> Result<FetchPage, FetchError> {
    if let Some(errors) = body.errors.filter(|e| !e.is_empty()) {
        let joined = errors
            .into_iter()
            .map(|e| e.message)
            .collect::<Vec<_>>()
            .join("; ");
        return Err(FetchError::GraphQl(joined));
    }

    let data = body
        .data
        .ok_or_else(|| FetchError::Decode("response has neither data nor errors".to_string()))?;

    let mut page = FetchPage::default();
    for (alias, value) in data {
        let records = match value {
            serde_json::Value::Array(records) => records,
            serde_json::Value::Null => Vec::new(),
            other => {
                return Err(FetchError::Decode(format!(
                    "field {} is not a list: {}",
                    alias, other
                )))
            }
        };
        let truncated = limit > 0 && records.len() >= limit;
        if EventKind::parse(&alias).is_none() {
            warn!(alias = %alias, "feed returned an unexpected selection");
        }
        page.batches.push(RawBatch {
            kind_hint: Some(alias),
            records,
            truncated,
        });
    }
    Ok(page)
}

#[async_trait]
impl EventSource for GraphQlSource {
    async fn fetch_events_since(&self, since: i64, limit: usize) -> Result<FetchPage, FetchError> {
        let body = serde_json::json!({
            "query": Self::query_document(),
            "variables": {
                "since": since.to_string(),
                "limit": limit,
            },
        });

        let resp = self.client.post(&self.endpoint).json(&body).send().await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(FetchError::Status { status, body });
        }

        let parsed: GraphQlResponse = resp
            .json()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))?;
        let page = parse_response(parsed, limit)?;

        debug!(
            since = since,
            limit = limit,
            records = page.record_count(),
            has_more = page.has_more(),
            "fetched feed page"
        );
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(json: serde_json::Value) -> GraphQlResponse {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_query_covers_every_kind() {
        let query = GraphQlSource::query_document();
        for kind in EventKind::KNOWN {
            assert!(query.contains(&format!("{}:", kind.as_str())), "missing {}", kind);
            assert!(query.contains(&format!("{}_gt: $since", kind.time_field().unwrap())));
        }
    }

    #[test]
    fn test_parse_splits_batches_by_alias() {
        let body = response(serde_json::json!({
            "data": {
                "BuildHut": [{ "id": "h1", "timeBuildHut": "10", "hutsAdded": 2 }],
                "GatherFood": [],
                "CommitDefense": null
            }
        }));
        let page = parse_response(body, 25).unwrap();
        assert_eq!(page.batches.len(), 3);
        assert_eq!(page.record_count(), 1);
        assert!(!page.has_more());
        let hut = page
            .batches
            .iter()
            .find(|b| b.kind_hint.as_deref() == Some("BuildHut"))
            .unwrap();
        assert_eq!(hut.records[0]["id"], "h1");
    }

    #[test]
    fn test_parse_marks_only_full_slices_truncated() {
        let body = response(serde_json::json!({
            "data": {
                "ChopWood": [{ "id": "a" }, { "id": "b" }],
                "GatherFood": [{ "id": "c" }]
            }
        }));
        let page = parse_response(body, 2).unwrap();
        assert!(page.has_more());
        for batch in &page.batches {
            let full = batch.kind_hint.as_deref() == Some("ChopWood");
            assert_eq!(batch.truncated, full);
        }
    }

    #[test]
    fn test_parse_surfaces_graphql_errors() {
        let body = response(serde_json::json!({
            "data": null,
            "errors": [{ "message": "bad field" }, { "message": "timeout" }]
        }));
        match parse_response(body, 25) {
            Err(FetchError::GraphQl(msg)) => assert_eq!(msg, "bad field; timeout"),
            other => panic!("expected GraphQl error, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_rejects_non_list_selection() {
        let body = response(serde_json::json!({ "data": { "BuildHut": { "id": "x" } } }));
        assert!(matches!(parse_response(body, 25), Err(FetchError::Decode(_))));
    }
}
