//! Commerce platform client: fulfillment requests, assets and usage
//! files.

use crate::backends::CommercePlatform;
use crate::clients::retry::{retry_http_call, RetryConfig};
use crate::config::MarketplaceConfig;
use crate::error::ConnectorError;
use crate::models::{
    ActivationAnswer, Asset, AssetStatus, BillableItem, FulfillmentRequest, Param, RequestKind,
    Tier, UsageFileDraft, UsageFileInfo, UsageFileStatus, UsageRecord,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tracing::instrument;

pub struct CommerceClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: SecretString,
    retry: RetryConfig,
}

impl CommerceClient {
    pub fn new(http: reqwest::Client, config: &MarketplaceConfig) -> Self {
        Self {
            http,
            endpoint: config.api_endpoint.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            retry: RetryConfig::default(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint, path)
    }

    async fn send(
        &self,
        build: impl Fn() -> reqwest::RequestBuilder,
        context: &str,
    ) -> Result<Value, ConnectorError> {
        retry_http_call(&self.retry, context, || async {
            let response = build()
                .header("Authorization", self.api_key.expose_secret())
                .send()
                .await?;
            let status = response.status();
            if !status.is_success() {
                return Err(ConnectorError::from_status(status, context));
            }
            if status == reqwest::StatusCode::NO_CONTENT {
                return Ok(Value::Null);
            }
            Ok(response.json().await.unwrap_or(Value::Null))
        })
        .await
    }
}

fn comma_list(values: &[String]) -> String {
    values.join(",")
}

fn params_body(params: &[Param]) -> Value {
    Value::Array(
        params
            .iter()
            .map(|p| {
                json!({
                    "id": p.id,
                    "value": p.value.clone().unwrap_or_default(),
                    "value_error": p.value_error.clone().unwrap_or_default(),
                })
            })
            .collect(),
    )
}

fn parse_tier(value: &Value) -> Tier {
    Tier {
        id: value["id"].as_str().unwrap_or_default().to_string(),
        name: value["name"].as_str().unwrap_or_default().to_string(),
    }
}

fn parse_param(value: &Value) -> Param {
    Param {
        id: value["id"].as_str().unwrap_or_default().to_string(),
        value: value["value"].as_str().map(str::to_string),
        value_error: value["value_error"].as_str().map(str::to_string),
    }
}

/// Item quantities arrive as numbers or as decimal strings.
fn parse_quantity(value: &Value) -> i64 {
    value
        .as_i64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
        .unwrap_or(0)
}

/// Per-item ceiling, carried as an `item_limit` item parameter. An
/// absent or unparseable value means no ceiling.
fn parse_item_limit(item: &Value) -> i64 {
    item["params"]
        .as_array()
        .and_then(|params| {
            params
                .iter()
                .find(|p| p["id"].as_str() == Some("item_limit"))
        })
        .and_then(|p| {
            p["value"]
                .as_i64()
                .or_else(|| p["value"].as_str().and_then(|s| s.trim().parse().ok()))
        })
        .unwrap_or(-1)
}

fn parse_asset(value: &Value) -> Asset {
    let params = value["params"]
        .as_array()
        .map(|ps| ps.iter().map(parse_param).collect())
        .unwrap_or_default();
    let items = value["items"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .map(|i| BillableItem {
                    mpn: i["mpn"].as_str().unwrap_or_default().to_string(),
                    quantity: parse_quantity(&i["quantity"]),
                    hard_limit: parse_item_limit(i),
                })
                .collect()
        })
        .unwrap_or_default();

    Asset {
        id: value["id"].as_str().unwrap_or_default().to_string(),
        status: AssetStatus::from_string(value["status"].as_str().unwrap_or_default()),
        marketplace_id: value["marketplace"]["id"].as_str().unwrap_or_default().to_string(),
        product_id: value["product"]["id"].as_str().unwrap_or_default().to_string(),
        contract_id: value["contract"]["id"].as_str().unwrap_or_default().to_string(),
        customer: parse_tier(&value["tiers"]["customer"]),
        tier1: parse_tier(&value["tiers"]["tier1"]),
        params,
        items,
    }
}

fn parse_request(value: &Value) -> FulfillmentRequest {
    let asset = parse_asset(&value["asset"]);
    // Migration of an asset is flagged through a marker parameter and
    // handled by an external migration service.
    let needs_migration = asset.param_value("migration_info").is_some();
    FulfillmentRequest {
        id: value["id"].as_str().unwrap_or_default().to_string(),
        kind: RequestKind::from_string(value["type"].as_str().unwrap_or_default()),
        needs_migration,
        asset,
    }
}

fn parse_usage_file(value: &Value) -> UsageFileInfo {
    UsageFileInfo {
        id: value["id"].as_str().unwrap_or_default().to_string(),
        name: value["name"].as_str().unwrap_or_default().to_string(),
        status: UsageFileStatus::from_string(value["status"].as_str().unwrap_or_default()),
        product_id: value["product"]["id"].as_str().unwrap_or_default().to_string(),
    }
}

#[async_trait]
impl CommercePlatform for CommerceClient {
    #[instrument(skip(self, products))]
    async fn list_pending_fulfillments(
        &self,
        products: &[String],
    ) -> Result<Vec<FulfillmentRequest>, ConnectorError> {
        let product_filter = comma_list(products);
        let body = self
            .send(
                || {
                    self.http.get(self.url("/requests")).query(&[
                        ("status", "pending"),
                        ("asset.product.id__in", product_filter.as_str()),
                    ])
                },
                "list pending requests",
            )
            .await?;
        let requests = body.as_array().cloned().unwrap_or_default();
        Ok(requests.iter().map(parse_request).collect())
    }

    async fn approve(
        &self,
        request_id: &str,
        answer: &ActivationAnswer,
    ) -> Result<(), ConnectorError> {
        let payload = match answer {
            ActivationAnswer::Template(id) => json!({"template_id": id}),
            ActivationAnswer::Tile(text) => json!({"activation_tile": text}),
        };
        self.send(
            || {
                self.http
                    .post(self.url(&format!("/requests/{request_id}/approve")))
                    .json(&payload)
            },
            "approve request",
        )
        .await?;
        Ok(())
    }

    async fn fail(&self, request_id: &str, reason: &str) -> Result<(), ConnectorError> {
        let payload = json!({"reason": reason});
        self.send(
            || {
                self.http
                    .post(self.url(&format!("/requests/{request_id}/fail")))
                    .json(&payload)
            },
            "fail request",
        )
        .await?;
        Ok(())
    }

    async fn inquire(&self, request_id: &str, params: &[Param]) -> Result<(), ConnectorError> {
        self.update_request_params(request_id, params).await?;
        self.send(
            || {
                self.http
                    .post(self.url(&format!("/requests/{request_id}/inquire")))
                    .json(&json!({}))
            },
            "inquire request",
        )
        .await?;
        Ok(())
    }

    async fn update_request_params(
        &self,
        request_id: &str,
        params: &[Param],
    ) -> Result<(), ConnectorError> {
        let payload = json!({"asset": {"params": params_body(params)}});
        self.send(
            || {
                self.http
                    .put(self.url(&format!("/requests/{request_id}")))
                    .json(&payload)
            },
            "update request params",
        )
        .await?;
        Ok(())
    }

    async fn tier_config_param(
        &self,
        account_id: &str,
        param_id: &str,
    ) -> Result<Option<Param>, ConnectorError> {
        let body = self
            .send(
                || {
                    self.http
                        .get(self.url("/tier/configs"))
                        .query(&[("account.id", account_id)])
                },
                "get tier config",
            )
            .await?;
        let configs = body.as_array().cloned().unwrap_or_default();
        for config in &configs {
            let params = config["params"].as_array().cloned().unwrap_or_default();
            if let Some(param) = params.iter().find(|p| p["id"].as_str() == Some(param_id)) {
                return Ok(Some(parse_param(param)));
            }
        }
        Ok(None)
    }

    async fn list_assets(
        &self,
        products: &[String],
        statuses: &[AssetStatus],
        updated_after: Option<DateTime<Utc>>,
    ) -> Result<Vec<Asset>, ConnectorError> {
        let product_filter = comma_list(products);
        let status_filter = statuses
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(",");
        let updated = updated_after.map(|t| t.to_rfc3339());
        let body = self
            .send(
                || {
                    let mut request = self.http.get(self.url("/assets")).query(&[
                        ("product.id__in", product_filter.as_str()),
                        ("status__in", status_filter.as_str()),
                    ]);
                    if let Some(updated) = &updated {
                        request = request.query(&[("updated__gt", updated.as_str())]);
                    }
                    request
                },
                "list assets",
            )
            .await?;
        let assets = body.as_array().cloned().unwrap_or_default();
        Ok(assets.iter().map(parse_asset).collect())
    }

    async fn list_usage_files(
        &self,
        name: &str,
        products: &[String],
    ) -> Result<Vec<UsageFileInfo>, ConnectorError> {
        let product_filter = comma_list(products);
        let body = self
            .send(
                || {
                    self.http.get(self.url("/usage/files")).query(&[
                        ("name", name),
                        ("product_id__in", product_filter.as_str()),
                    ])
                },
                "list usage files",
            )
            .await?;
        let files = body.as_array().cloned().unwrap_or_default();
        Ok(files.iter().map(parse_usage_file).collect())
    }

    async fn create_usage_file(
        &self,
        draft: &UsageFileDraft,
        records: &[UsageRecord],
    ) -> Result<UsageFileInfo, ConnectorError> {
        let payload = json!({
            "name": draft.name,
            "description": draft.description,
            "product": {"id": draft.product_id},
            "contract": {"id": draft.contract_id},
        });
        let body = self
            .send(
                || self.http.post(self.url("/usage/files")).json(&payload),
                "create usage file",
            )
            .await?;
        let file = parse_usage_file(&body);

        let records_payload = json!({"usage_records": records});
        self.send(
            || {
                self.http
                    .put(self.url(&format!("/usage/files/{}/records", file.id)))
                    .json(&records_payload)
            },
            "upload usage records",
        )
        .await?;
        Ok(file)
    }

    async fn list_actionable_usage_files(
        &self,
        products: &[String],
    ) -> Result<Vec<UsageFileInfo>, ConnectorError> {
        let product_filter = comma_list(products);
        let body = self
            .send(
                || {
                    self.http.get(self.url("/usage/files")).query(&[
                        ("status__in", "ready,pending"),
                        ("product_id__in", product_filter.as_str()),
                    ])
                },
                "list actionable usage files",
            )
            .await?;
        let files = body.as_array().cloned().unwrap_or_default();
        Ok(files.iter().map(parse_usage_file).collect())
    }

    async fn submit_usage_file(&self, file_id: &str) -> Result<(), ConnectorError> {
        self.send(
            || {
                self.http
                    .post(self.url(&format!("/usage/files/{file_id}/submit")))
                    .json(&json!({}))
            },
            "submit usage file",
        )
        .await?;
        Ok(())
    }

    async fn accept_usage_file(&self, file_id: &str, note: &str) -> Result<(), ConnectorError> {
        let payload = json!({"acceptance_note": note});
        self.send(
            || {
                self.http
                    .post(self.url(&format!("/usage/files/{file_id}/accept")))
                    .json(&payload)
            },
            "accept usage file",
        )
        .await?;
        Ok(())
    }
}
