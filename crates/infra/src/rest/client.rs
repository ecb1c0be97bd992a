//! HTTP client for the hosted data API (PostgREST dialect).
//!
//! Tables live under `/rest/v1/<table>` and procedures under
//! `/rest/v1/rpc/<name>`. Every request carries the project key as `apikey`
//! and a bearer token (the operator's session token when present, otherwise
//! the project key).

use std::fmt::Display;

use chrono::{DateTime, Utc};
use reqwest::{Method, RequestBuilder, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;

use invoria_core::{ExpectedVersion, OrderId, OrderItemId, ReceiptId};
use invoria_purchasing::{
    PurchaseOrder, PurchaseOrderItem, PurchaseOrderStatus, ReceiptEntry, StockMovementRequest,
};

use crate::config::BackendConfig;
use crate::ports::{OrderFilter, OrderRepository, ReceiptRecorder, RemoteError, StockMutator};

use super::rows::{
    ADD_STOCK_RPC, AddStockArgs, ApiErrorBody, ITEMS_TABLE, ItemInsert, ItemRow, ORDERS_TABLE,
    ItemIdRow, RECEIPTS_TABLE, ReceivedPatch, StatusPatch, TotalPatch, next_version,
};

const ITEM_SELECT: &str = "*,products(name,sku)";

type Query = Vec<(&'static str, String)>;

fn eq(value: impl Display) -> String {
    format!("eq.{value}")
}

fn in_list<T: Display>(values: &[T]) -> String {
    let joined: Vec<String> = values.iter().map(ToString::to_string).collect();
    format!("in.({})", joined.join(","))
}

/// Query parameters for listing orders, newest first.
pub(crate) fn order_list_query(filter: &OrderFilter) -> Query {
    let mut query: Query = vec![
        ("select", "*".to_string()),
        ("order", "order_date.desc,id.desc".to_string()),
    ];
    if let Some(status) = filter.status {
        query.push(("status", eq(status.as_str())));
    }
    if let Some(supplier_id) = filter.supplier_id {
        query.push(("supplier_id", eq(supplier_id)));
    }
    if let Some(warehouse_id) = filter.warehouse_id {
        query.push(("warehouse_id", eq(warehouse_id)));
    }
    if let Some(limit) = filter.limit {
        query.push(("limit", limit.to_string()));
    }
    query
}

/// A patch by primary key that echoed no row hit nothing.
pub(crate) fn first_or_not_found<T>(rows: Vec<T>) -> Result<T, RemoteError> {
    rows.into_iter().next().ok_or(RemoteError::NotFound)
}

/// Filter selecting one order, guarded by its version when one is expected.
pub(crate) fn conditional_order_query(id: OrderId, expected: ExpectedVersion) -> Query {
    let mut query: Query = vec![("id", eq(id))];
    if let ExpectedVersion::Exact(version) = expected {
        query.push(("version", eq(version)));
    }
    query
}

/// Map a non-success response to a `RemoteError`.
pub(crate) fn status_error(status: u16, body: &str) -> RemoteError {
    let message = serde_json::from_str::<ApiErrorBody>(body)
        .ok()
        .and_then(|b| b.describe())
        .unwrap_or_else(|| body.trim().to_string());

    match status {
        404 => RemoteError::NotFound,
        409 => RemoteError::Conflict(message),
        400 | 422 => RemoteError::Rejected(message),
        _ => RemoteError::Status { status, message },
    }
}

#[derive(Debug, Clone)]
pub struct RestBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    access_token: Option<String>,
}

impl RestBackend {
    pub fn new(config: &BackendConfig) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| RemoteError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url().to_string(),
            api_key: config.api_key.clone(),
            access_token: config.access_token.clone(),
        })
    }

    /// Use the operator's session token for subsequent requests.
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub(crate) fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.base_url)
    }

    pub(crate) fn rpc_url(&self, name: &str) -> String {
        format!("{}/rest/v1/rpc/{name}", self.base_url)
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let token = self.access_token.as_deref().unwrap_or(&self.api_key);
        self.client
            .request(method, url)
            .header("apikey", &self.api_key)
            .bearer_auth(token)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, RemoteError> {
        let response = request
            .send()
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        tracing::debug!("data API returned {}: {}", status, body);
        Err(status_error(status.as_u16(), &body))
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, RemoteError> {
        response
            .json()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))
    }

    async fn select<T: DeserializeOwned>(&self, table: &str, query: &Query) -> Result<Vec<T>, RemoteError> {
        let request = self.request(Method::GET, &self.table_url(table)).query(query);
        Self::decode(self.send(request).await?).await
    }

    async fn insert<B: Serialize + ?Sized>(
        &self,
        table: &str,
        body: &B,
        prefer: &str,
        query: &Query,
    ) -> Result<Response, RemoteError> {
        let request = self
            .request(Method::POST, &self.table_url(table))
            .header("Prefer", prefer)
            .query(query)
            .json(body);
        self.send(request).await
    }

    async fn patch_returning<B: Serialize>(
        &self,
        table: &str,
        query: &Query,
        body: &B,
    ) -> Result<Vec<PurchaseOrder>, RemoteError> {
        let request = self
            .request(Method::PATCH, &self.table_url(table))
            .header("Prefer", "return=representation")
            .query(query)
            .json(body);
        Self::decode(self.send(request).await?).await
    }

    async fn delete(&self, table: &str, query: &Query) -> Result<(), RemoteError> {
        let request = self.request(Method::DELETE, &self.table_url(table)).query(query);
        self.send(request).await.map(|_| ())
    }

    /// A conditional PATCH matched no row: tell a missing order from a stale version.
    async fn explain_empty_patch(&self, id: OrderId, expected: ExpectedVersion) -> RemoteError {
        match self.get_order(id).await {
            Ok(None) => RemoteError::NotFound,
            Ok(Some(current)) => RemoteError::Conflict(format!(
                "order {id} is at version {}, expected {expected:?}",
                current.version
            )),
            Err(e) => e,
        }
    }

    async fn patch_order<B: Serialize>(
        &self,
        id: OrderId,
        expected: ExpectedVersion,
        body: &B,
    ) -> Result<PurchaseOrder, RemoteError> {
        let query = conditional_order_query(id, expected);
        let mut rows = self.patch_returning(ORDERS_TABLE, &query, body).await?;
        match rows.pop() {
            Some(order) => Ok(order),
            None => Err(self.explain_empty_patch(id, expected).await),
        }
    }
}

#[async_trait::async_trait]
impl OrderRepository for RestBackend {
    async fn get_order(&self, id: OrderId) -> Result<Option<PurchaseOrder>, RemoteError> {
        let query: Query = vec![("select", "*".to_string()), ("id", eq(id))];
        let mut rows: Vec<PurchaseOrder> = self.select(ORDERS_TABLE, &query).await?;
        Ok(rows.pop())
    }

    async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<PurchaseOrder>, RemoteError> {
        self.select(ORDERS_TABLE, &order_list_query(filter)).await
    }

    async fn list_order_items(&self, order_id: OrderId) -> Result<Vec<PurchaseOrderItem>, RemoteError> {
        let query: Query = vec![
            ("select", ITEM_SELECT.to_string()),
            ("order_id", eq(order_id)),
            ("order", "id.asc".to_string()),
        ];
        let rows: Vec<ItemRow> = self.select(ITEMS_TABLE, &query).await?;
        Ok(rows.into_iter().map(PurchaseOrderItem::from).collect())
    }

    async fn insert_order(&self, order: &PurchaseOrder) -> Result<PurchaseOrder, RemoteError> {
        let response = self
            .insert(ORDERS_TABLE, order, "return=representation", &Vec::new())
            .await?;
        let mut rows: Vec<PurchaseOrder> = Self::decode(response).await?;
        rows.pop()
            .ok_or_else(|| RemoteError::Decode("insert returned no row".to_string()))
    }

    async fn insert_order_items(&self, items: &[PurchaseOrderItem]) -> Result<(), RemoteError> {
        if items.is_empty() {
            return Ok(());
        }
        let body: Vec<ItemInsert> = items.iter().map(ItemInsert::from).collect();
        self.insert(ITEMS_TABLE, &body, "return=minimal", &Vec::new())
            .await
            .map(|_| ())
    }

    async fn delete_order_items(&self, order_id: OrderId) -> Result<(), RemoteError> {
        self.delete(ITEMS_TABLE, &vec![("order_id", eq(order_id))]).await
    }

    async fn update_order_status(
        &self,
        id: OrderId,
        status: PurchaseOrderStatus,
        updated_at: DateTime<Utc>,
        expected: ExpectedVersion,
    ) -> Result<PurchaseOrder, RemoteError> {
        let patch = StatusPatch {
            status,
            updated_at,
            version: next_version(expected),
        };
        self.patch_order(id, expected, &patch).await
    }

    async fn update_order_total(
        &self,
        id: OrderId,
        total_amount: u64,
        updated_at: DateTime<Utc>,
        expected: ExpectedVersion,
    ) -> Result<PurchaseOrder, RemoteError> {
        self.patch_order(
            id,
            expected,
            &TotalPatch {
                total_amount,
                updated_at,
                version: next_version(expected),
            },
        )
        .await
    }

    async fn update_item_received_quantity(
        &self,
        item_id: OrderItemId,
        received_quantity: i64,
    ) -> Result<(), RemoteError> {
        let request = self
            .request(Method::PATCH, &self.table_url(ITEMS_TABLE))
            .header("Prefer", "return=representation")
            .query(&[("select", "id".to_string()), ("id", eq(item_id))])
            .json(&ReceivedPatch { received_quantity });
        let rows: Vec<ItemIdRow> = Self::decode(self.send(request).await?).await?;
        first_or_not_found(rows).map(|_| ())
    }
}

#[async_trait::async_trait]
impl ReceiptRecorder for RestBackend {
    async fn insert_receipt_entries(&self, entries: &[ReceiptEntry]) -> Result<(), RemoteError> {
        if entries.is_empty() {
            return Ok(());
        }
        let query: Query = vec![("on_conflict", "commit_key,item_id".to_string())];
        self.insert(
            RECEIPTS_TABLE,
            entries,
            "resolution=ignore-duplicates,return=minimal",
            &query,
        )
        .await
        .map(|_| ())
    }

    async fn list_receipt_entries(&self, order_id: OrderId) -> Result<Vec<ReceiptEntry>, RemoteError> {
        let query: Query = vec![
            ("select", "*".to_string()),
            ("order_id", eq(order_id)),
            ("order", "received_at.asc".to_string()),
        ];
        self.select(RECEIPTS_TABLE, &query).await
    }

    async fn delete_receipt_entries(&self, ids: &[ReceiptId]) -> Result<(), RemoteError> {
        if ids.is_empty() {
            return Ok(());
        }
        self.delete(RECEIPTS_TABLE, &vec![("id", in_list(ids))]).await
    }
}

#[async_trait::async_trait]
impl StockMutator for RestBackend {
    async fn apply_movement(&self, request: &StockMovementRequest) -> Result<(), RemoteError> {
        let builder = self
            .request(Method::POST, &self.rpc_url(ADD_STOCK_RPC))
            .json(&AddStockArgs::from(request));
        self.send(builder).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use invoria_core::SupplierId;

    fn backend(url: &str) -> RestBackend {
        RestBackend::new(&BackendConfig {
            url: url.to_string(),
            api_key: "anon".to_string(),
            access_token: None,
            timeout_secs: 5,
        })
        .unwrap()
    }

    #[test]
    fn urls_are_rooted_at_rest_v1() {
        let backend = backend("https://project.example.co/");
        assert_eq!(
            backend.table_url(ORDERS_TABLE),
            "https://project.example.co/rest/v1/purchase_orders"
        );
        assert_eq!(
            backend.rpc_url(ADD_STOCK_RPC),
            "https://project.example.co/rest/v1/rpc/add_stock"
        );
    }

    #[test]
    fn order_list_query_only_filters_given_fields() {
        let supplier_id = SupplierId::new();
        let query = order_list_query(&OrderFilter {
            status: Some(PurchaseOrderStatus::PartiallyReceived),
            supplier_id: Some(supplier_id),
            warehouse_id: None,
            limit: Some(20),
        });

        assert!(query.contains(&("status", "eq.recibida_parcialmente".to_string())));
        assert!(query.contains(&("supplier_id", format!("eq.{supplier_id}"))));
        assert!(query.contains(&("limit", "20".to_string())));
        assert!(!query.iter().any(|(k, _)| *k == "warehouse_id"));
    }

    #[test]
    fn conditional_query_guards_on_exact_version() {
        let id = OrderId::new();
        let guarded = conditional_order_query(id, ExpectedVersion::Exact(7));
        assert_eq!(
            guarded,
            vec![("id", format!("eq.{id}")), ("version", "eq.7".to_string())]
        );
        assert_eq!(conditional_order_query(id, ExpectedVersion::Any).len(), 1);
    }

    #[test]
    fn item_patch_that_matched_nothing_is_not_found() {
        let id = OrderItemId::new();
        assert_eq!(first_or_not_found(Vec::<ItemIdRow>::new()).unwrap_err(), RemoteError::NotFound);
        assert_eq!(first_or_not_found(vec![ItemIdRow { id }]).unwrap().id, id);
    }

    #[test]
    fn receipt_ids_become_an_in_filter() {
        let a = ReceiptId::new();
        let b = ReceiptId::new();
        assert_eq!(in_list(&[a, b]), format!("in.({a},{b})"));
    }

    #[test]
    fn status_errors_map_to_remote_errors() {
        assert_eq!(status_error(404, ""), RemoteError::NotFound);
        assert_eq!(
            status_error(409, r#"{"message":"duplicate key"}"#),
            RemoteError::Conflict("duplicate key".to_string())
        );
        assert_eq!(
            status_error(400, r#"{"message":"producto inexistente","details":"p_product_id"}"#),
            RemoteError::Rejected("producto inexistente; p_product_id".to_string())
        );
        assert_eq!(
            status_error(503, "upstream down"),
            RemoteError::Status {
                status: 503,
                message: "upstream down".to_string()
            }
        );
    }
}
