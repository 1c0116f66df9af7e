use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{id_value, required_str, respond, to_json};
use crate::ipc::types::{AppState, Request};
use crate::model;
use crate::store::Query;
use serde_json::{json, Value};

fn collection_param(params: &Value) -> Result<&str, HandlerErr> {
    let name = required_str(params, "collection")?;
    if !model::is_collection(name) {
        return Err(HandlerErr::bad_params(format!("unknown collection: {}", name))
            .with_details(json!({ "collections": model::COLLECTIONS })));
    }
    Ok(name)
}

fn records_query(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let collection = collection_param(params)?;
    let query: Query = serde_json::from_value(params.clone())?;
    let rows = state.store.query(collection, &query)?;
    Ok(json!({
        "collection": collection,
        "backend": state.store.kind(),
        "records": rows,
    }))
}

fn records_delete_many(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let collection = collection_param(params)?;
    let Some(raw_ids) = params.get("ids").and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params("missing ids"));
    };
    let ids = raw_ids
        .iter()
        .map(|v| id_value(v).ok_or_else(|| HandlerErr::bad_params(format!("invalid id: {}", v))))
        .collect::<Result<Vec<i64>, _>>()?;
    let outcome = state.store.delete_many(collection, &ids)?;
    log::info!(
        "deleteMany {}: {} deleted, {} failed",
        collection,
        outcome.deleted.len(),
        outcome.failed.len()
    );
    to_json(&outcome)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "records.query" => records_query(state, &req.params),
        "records.deleteMany" => records_delete_many(state, &req.params),
        _ => return None,
    };
    Some(respond(req, result))
}
