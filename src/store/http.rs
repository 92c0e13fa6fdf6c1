//! HTTP client for the graph store API.
//!
//! Reads go through the query endpoint; writes are batch PUT/DELETE calls
//! on the graph endpoints. Every request carries the data source's bearer
//! token.

use super::traits::{RemoteStore, StoreError, StoreResult};
use crate::graph::{Asset, AssetWithId, Graph, Relation, RelationWithId, SchemaGraph};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

const ASSETS_QUERY: &str = "MATCH (a) RETURN a";
const RELATIONS_QUERY: &str = "MATCH (a)-[r]->(b) RETURN r";

#[derive(Serialize)]
struct QueryRequestBody<'a> {
    q: &'a str,
    include_sources: bool,
}

/// Query API response; the `columns` header is not needed and is ignored
#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default, alias = "Items")]
    items: Vec<Vec<Item>>,
}

type Item = HashMap<String, String>;

#[derive(Serialize)]
struct PutSchemaBody<'a> {
    schema: &'a SchemaGraph,
}

#[derive(Serialize)]
struct AssetsBody<'a> {
    assets: &'a [Asset],
}

#[derive(Serialize)]
struct RelationsBody<'a> {
    relations: &'a [Relation],
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            StoreError::Decode(err.to_string())
        } else if err.is_builder() {
            StoreError::Config(err.to_string())
        } else {
            StoreError::Transport(err.to_string())
        }
    }
}

/// Map a non-success HTTP status to a store error
fn classify_status(status: u16, message: String) -> StoreError {
    match status {
        401 | 403 => StoreError::Unauthorized { status, message },
        429 | 500..=599 => StoreError::Server { status, message },
        _ => StoreError::Rejected { status, message },
    }
}

fn field<'a>(item: &'a Item, name: &str) -> StoreResult<&'a str> {
    item.get(name)
        .map(String::as_str)
        .ok_or_else(|| StoreError::Decode(format!("query item is missing field '{}'", name)))
}

fn parse_assets(response: QueryResponse) -> StoreResult<Vec<AssetWithId>> {
    response
        .items
        .iter()
        .filter_map(|row| row.first())
        .map(|item| {
            Ok(AssetWithId {
                id: field(item, "_id")?.to_string(),
                asset: Asset::new(field(item, "type")?, field(item, "key")?),
            })
        })
        .collect()
}

fn parse_relations(response: QueryResponse) -> StoreResult<Vec<RelationWithId>> {
    response
        .items
        .iter()
        .filter_map(|row| row.first())
        .map(|item| {
            Ok(RelationWithId {
                id: field(item, "_id")?.to_string(),
                from_id: field(item, "from_id")?.to_string(),
                to_id: field(item, "to_id")?.to_string(),
                relation_type: field(item, "type")?.into(),
            })
        })
        .collect()
}

/// Remote store reached over HTTP(S).
#[derive(Clone)]
pub struct HttpStore {
    base_url: String,
    client: reqwest::Client,
}

impl HttpStore {
    /// Create a client for the store at `url`.
    ///
    /// `skip_verify` disables TLS certificate verification.
    pub fn new(url: &str, auth_token: &str, skip_verify: bool) -> StoreResult<Self> {
        if url.trim().is_empty() {
            return Err(StoreError::Config("store URL is empty".to_string()));
        }

        let mut headers = HeaderMap::new();
        if !auth_token.is_empty() {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", auth_token))
                .map_err(|e| StoreError::Config(format!("invalid auth token: {}", e)))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .danger_accept_invalid_certs(skip_verify)
            .build()?;

        Ok(Self {
            base_url: url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn query(&self, q: &str) -> StoreResult<QueryResponse> {
        let response = self
            .client
            .post(self.endpoint("/api/query"))
            .json(&QueryRequestBody { q, include_sources: false })
            .send()
            .await?;
        let response = check_status(response).await?;
        Ok(response.json().await?)
    }

    async fn send<B: Serialize + ?Sized>(&self, method: Method, path: &str, body: &B) -> StoreResult<()> {
        let response = self
            .client
            .request(method, self.endpoint(path))
            .json(body)
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }
}

async fn check_status(response: reqwest::Response) -> StoreResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(classify_status(status.as_u16(), message))
}

#[async_trait]
impl RemoteStore for HttpStore {
    async fn read_graph(&self) -> StoreResult<Graph> {
        let assets = parse_assets(self.query(ASSETS_QUERY).await?)?;
        let relations = parse_relations(self.query(RELATIONS_QUERY).await?)?;
        debug!(assets = assets.len(), relations = relations.len(), "Read remote graph");
        Graph::from_read(assets, relations).map_err(|e| StoreError::Decode(e.to_string()))
    }

    async fn put_schema(&self, schema: &SchemaGraph) -> StoreResult<()> {
        self.send(Method::PUT, "/api/graph/schema", &PutSchemaBody { schema }).await
    }

    async fn put_assets(&self, assets: &[Asset]) -> StoreResult<()> {
        self.send(Method::PUT, "/api/graph/assets", &AssetsBody { assets }).await
    }

    async fn delete_assets(&self, assets: &[Asset]) -> StoreResult<()> {
        self.send(Method::DELETE, "/api/graph/assets", &AssetsBody { assets }).await
    }

    async fn put_relations(&self, relations: &[Relation]) -> StoreResult<()> {
        self.send(Method::PUT, "/api/graph/relations", &RelationsBody { relations }).await
    }

    async fn delete_relations(&self, relations: &[Relation]) -> StoreResult<()> {
        self.send(Method::DELETE, "/api/graph/relations", &RelationsBody { relations }).await
    }
}
