use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_dynamodb::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client;
use tracing::debug;

use super::{Document, DocumentStore, FieldFilter, FieldValue};
use crate::error::StoreError;
use crate::util::sortable_timestamp;

/// Partition key attribute holding the document id.
const ID_ATTRIBUTE: &str = "id";

/// DynamoDB-backed document store. One table per collection, keyed by `id`.
///
/// Timestamps are written as fixed-width UTC RFC 3339 strings, so the
/// `<=` scan filter orders them chronologically.
pub struct DynamoDocumentStore {
    client: Client,
}

impl DynamoDocumentStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client from the default AWS credential/region chain.
    pub async fn from_env() -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self::new(Client::new(&config))
    }
}

#[async_trait]
impl DocumentStore for DynamoDocumentStore {
    fn name(&self) -> &str {
        "dynamodb"
    }

    async fn get_document(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        let output = self
            .client
            .get_item()
            .table_name(collection)
            .key(ID_ATTRIBUTE, AttributeValue::S(id.to_string()))
            .consistent_read(true)
            .send()
            .await
            .map_err(|e| map_sdk_error("get_item", e))?;

        Ok(output.item.map(|item| item_to_document(&item)))
    }

    async fn set_document(&self, collection: &str, id: &str, fields: Document) -> Result<(), StoreError> {
        let mut item: HashMap<String, AttributeValue> = fields
            .into_iter()
            .filter(|(name, _)| name != ID_ATTRIBUTE)
            .map(|(name, value)| (name, to_attribute(&value)))
            .collect();
        item.insert(ID_ATTRIBUTE.to_string(), AttributeValue::S(id.to_string()));

        self.client
            .put_item()
            .table_name(collection)
            .set_item(Some(item))
            .send()
            .await
            .map_err(|e| map_sdk_error("put_item", e))?;
        Ok(())
    }

    async fn delete_document(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        self.client
            .delete_item()
            .table_name(collection)
            .key(ID_ATTRIBUTE, AttributeValue::S(id.to_string()))
            .send()
            .await
            .map_err(|e| map_sdk_error("delete_item", e))?;
        Ok(())
    }

    async fn query_documents(
        &self,
        collection: &str,
        filter: &FieldFilter,
        limit: usize,
    ) -> Result<Vec<(String, Document)>, StoreError> {
        let mut matched = Vec::new();
        let mut start_key: Option<HashMap<String, AttributeValue>> = None;
        let (expression, values) = scan_filter(filter);

        // Scan `Limit` counts evaluated items, not matches, so keep paging
        // until enough matches are in hand or the table is exhausted.
        while matched.len() < limit {
            let page_size = i32::try_from(limit - matched.len()).unwrap_or(i32::MAX);
            let output = self
                .client
                .scan()
                .table_name(collection)
                .filter_expression(&expression)
                .expression_attribute_names("#f", &filter.field)
                .set_expression_attribute_values(Some(values.clone()))
                .limit(page_size)
                .set_exclusive_start_key(start_key.take())
                .send()
                .await
                .map_err(|e| map_sdk_error("scan", e))?;

            let last_key = output.last_evaluated_key;
            for item in output.items.unwrap_or_default() {
                let Some(id) = item.get(ID_ATTRIBUTE).and_then(|v| v.as_s().ok()).cloned() else {
                    continue;
                };
                matched.push((id, item_to_document(&item)));
                if matched.len() >= limit {
                    break;
                }
            }

            match last_key {
                Some(key) if !key.is_empty() => start_key = Some(key),
                _ => break,
            }
        }

        debug!("dynamodb scan on {} -> {} match(es)", collection, matched.len());
        Ok(matched)
    }
}

/// Filter expression and values for `filter`. A timestamp bound also matches
/// integer stamps, which are Unix seconds in an N attribute and never compare
/// against the S form.
fn scan_filter(filter: &FieldFilter) -> (String, HashMap<String, AttributeValue>) {
    let op = filter.op.symbol();
    let mut values = HashMap::from([(":v".to_string(), to_attribute(&filter.value))]);
    match &filter.value {
        FieldValue::Timestamp(t) => {
            values.insert(":n".to_string(), AttributeValue::N(t.timestamp().to_string()));
            (format!("#f {op} :v OR #f {op} :n"), values)
        }
        _ => (format!("#f {op} :v"), values),
    }
}

fn to_attribute(value: &FieldValue) -> AttributeValue {
    match value {
        FieldValue::Null => AttributeValue::Null(true),
        FieldValue::Text(s) => AttributeValue::S(s.clone()),
        FieldValue::Integer(n) => AttributeValue::N(n.to_string()),
        FieldValue::Timestamp(t) => AttributeValue::S(sortable_timestamp(t)),
    }
}

fn from_attribute(value: &AttributeValue) -> Option<FieldValue> {
    match value {
        AttributeValue::Null(_) => Some(FieldValue::Null),
        AttributeValue::S(s) => Some(FieldValue::Text(s.clone())),
        AttributeValue::N(n) => Some(
            n.parse()
                .map(FieldValue::Integer)
                .unwrap_or_else(|_| FieldValue::Text(n.clone())),
        ),
        _ => None,
    }
}

fn item_to_document(item: &HashMap<String, AttributeValue>) -> Document {
    item.iter()
        .filter(|(name, _)| name.as_str() != ID_ATTRIBUTE)
        .filter_map(|(name, value)| from_attribute(value).map(|v| (name.clone(), v)))
        .collect()
}

fn map_sdk_error<E, R>(op: &str, err: SdkError<E, R>) -> StoreError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    if err.code() == Some("AccessDeniedException") {
        return StoreError::PermissionDenied(format!("{op}: {}", DisplayErrorContext(&err)));
    }
    StoreError::Backend(format!("{op}: {}", DisplayErrorContext(&err)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_attribute_conversion() {
        let at = Utc.with_ymd_and_hms(2024, 7, 7, 7, 7, 7).unwrap();
        assert_eq!(
            to_attribute(&FieldValue::Timestamp(at)),
            AttributeValue::S("2024-07-07T07:07:07.000000Z".to_string())
        );
        assert_eq!(to_attribute(&FieldValue::Null), AttributeValue::Null(true));
        assert_eq!(
            from_attribute(&AttributeValue::N("42".to_string())),
            Some(FieldValue::Integer(42))
        );
        assert_eq!(from_attribute(&AttributeValue::Bool(true)), None);
    }

    #[test]
    fn test_scan_filter_covers_unix_seconds() {
        let at = Utc.with_ymd_and_hms(2024, 7, 7, 7, 7, 7).unwrap();
        let (expression, values) = scan_filter(&FieldFilter::less_or_equal("last_activity", at));
        assert_eq!(expression, "#f <= :v OR #f <= :n");
        assert_eq!(values.get(":n"), Some(&AttributeValue::N(at.timestamp().to_string())));

        let (expression, values) = scan_filter(&FieldFilter::less_or_equal("owner", "bob"));
        assert_eq!(expression, "#f <= :v");
        assert_eq!(values.len(), 1);
    }

    #[test]
    fn test_item_to_document_drops_key() {
        let mut item = HashMap::new();
        item.insert("id".to_string(), AttributeValue::S("abc".to_string()));
        item.insert("payload".to_string(), AttributeValue::S("aGk=".to_string()));
        let doc = item_to_document(&item);
        assert!(!doc.contains_key("id"));
        assert_eq!(doc.get("payload").and_then(|v| v.as_text()), Some("aGk="));
    }
}
