use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{
    contains_ci, create_checked, id_value, optional_str, required_id, required_object, required_str,
    respond, to_json, update_checked,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{iso_date, Communication, ParentContact, COMMUNICATIONS};
use crate::store::{record_id, Filter, Query, Repo};
use crate::validate;
use chrono::Utc;
use serde_json::{json, Value};

fn now_iso() -> Value {
    json!(iso_date::to_iso(&Utc::now()))
}

fn newest_first(comms: &mut [Communication]) {
    comms.sort_by(|a, b| b.date.cmp(&a.date).then(b.id.cmp(&a.id)));
}

fn contacts_list(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let needle = optional_str(params, "search").map(str::to_lowercase);
    let contacts: Vec<ParentContact> = Repo::<ParentContact>::new(state.store.as_mut())
        .get_all()?
        .into_iter()
        .filter(|c| {
            needle.as_deref().map_or(true, |n| {
                contains_ci(&c.parent_name, n)
                    || contains_ci(&c.email, n)
                    || contains_ci(c.relationship.as_str(), n)
            })
        })
        .collect();
    Ok(json!({ "contacts": to_json(&contacts)? }))
}

fn contacts_get(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let id = required_id(params, "id")?;
    let contact = Repo::<ParentContact>::new(state.store.as_mut()).get_by_id(id)?;
    Ok(json!({ "contact": to_json(&contact)? }))
}

fn contacts_get_by_student(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let student_id = required_id(params, "studentId")?;
    let contact = Repo::<ParentContact>::new(state.store.as_mut())
        .get_all()?
        .into_iter()
        .find(|c| c.student_id == student_id);
    Ok(json!({ "contact": to_json(&contact)? }))
}

fn contacts_create(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let mut fields = required_object(params, "contact")?;
    if let Some(student_id) = fields.get("studentId").and_then(id_value) {
        fields.insert("studentId".into(), json!(student_id));
    }
    fields.insert("createdDate".into(), now_iso());
    fields.remove("updatedDate");
    let contact: ParentContact = create_checked(state, fields, validate::parent_contact)?;
    log::info!("parent contact {} created for student {}", contact.id, contact.student_id);
    Ok(json!({ "contact": to_json(&contact)? }))
}

fn contacts_update(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let id = required_id(params, "id")?;
    let mut patch = required_object(params, "patch")?;
    patch.remove("createdDate");
    patch.insert("updatedDate".into(), now_iso());
    let contact: ParentContact = update_checked(state, id, patch, validate::parent_contact)?;
    Ok(json!({ "contact": to_json(&contact)? }))
}

/// Removes the contact and every communication logged against it.
fn contacts_delete(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let id = required_id(params, "id")?;
    Repo::<ParentContact>::new(state.store.as_mut()).delete(id)?;

    let query = Query {
        fields: vec!["id".into()],
        filters: vec![Filter {
            field: "parentContactId".into(),
            value: json!(id),
        }],
        ..Query::default()
    };
    let ids: Vec<i64> = state
        .store
        .query(COMMUNICATIONS, &query)?
        .iter()
        .filter_map(record_id)
        .collect();
    let outcome = state.store.delete_many(COMMUNICATIONS, &ids)?;
    if !outcome.failed.is_empty() {
        log::warn!(
            "parent contact {} deleted but {} communications remain",
            id,
            outcome.failed.len()
        );
    }
    Ok(json!({
        "deleted": true,
        "communicationsDeleted": outcome.deleted.len(),
        "failed": to_json(&outcome.failed)?,
    }))
}

fn communications_list(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let contact_id = required_id(params, "parentContactId")?;
    let mut comms: Vec<Communication> = Repo::<Communication>::new(state.store.as_mut())
        .get_all()?
        .into_iter()
        .filter(|c| c.parent_contact_id == contact_id)
        .collect();
    newest_first(&mut comms);
    Ok(json!({ "communications": to_json(&comms)? }))
}

fn communications_all(state: &mut AppState) -> Result<Value, HandlerErr> {
    let mut comms = Repo::<Communication>::new(state.store.as_mut()).get_all()?;
    newest_first(&mut comms);
    Ok(json!({ "communications": to_json(&comms)? }))
}

fn communications_search(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let needle = required_str(params, "query")?.to_lowercase();
    let mut comms: Vec<Communication> = Repo::<Communication>::new(state.store.as_mut())
        .get_all()?
        .into_iter()
        .filter(|c| contains_ci(&c.message, &needle) || contains_ci(c.kind.as_str(), &needle))
        .collect();
    newest_first(&mut comms);
    Ok(json!({ "communications": to_json(&comms)? }))
}

fn communications_add(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let contact_id = required_id(params, "parentContactId")?;
    let mut fields = required_object(params, "communication")?;
    Repo::<ParentContact>::new(state.store.as_mut()).get_by_id(contact_id)?;
    fields.insert("parentContactId".into(), json!(contact_id));
    fields.insert("date".into(), now_iso());
    fields.remove("updatedDate");
    let comm: Communication = create_checked(state, fields, validate::communication)?;
    Ok(json!({ "communication": to_json(&comm)? }))
}

fn communications_update(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let id = required_id(params, "id")?;
    let mut patch = required_object(params, "patch")?;
    patch.remove("parentContactId");
    patch.remove("date");
    patch.insert("updatedDate".into(), now_iso());
    let comm: Communication = update_checked(state, id, patch, validate::communication)?;
    Ok(json!({ "communication": to_json(&comm)? }))
}

fn communications_delete(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let id = required_id(params, "id")?;
    let deleted = Repo::<Communication>::new(state.store.as_mut()).delete(id)?;
    Ok(json!({ "deleted": deleted }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "parentContacts.list" => contacts_list(state, &req.params),
        "parentContacts.get" => contacts_get(state, &req.params),
        "parentContacts.getByStudent" => contacts_get_by_student(state, &req.params),
        "parentContacts.create" => contacts_create(state, &req.params),
        "parentContacts.update" => contacts_update(state, &req.params),
        "parentContacts.delete" => contacts_delete(state, &req.params),
        "communications.list" => communications_list(state, &req.params),
        "communications.all" => communications_all(state),
        "communications.search" => communications_search(state, &req.params),
        "communications.add" => communications_add(state, &req.params),
        "communications.update" => communications_update(state, &req.params),
        "communications.delete" => communications_delete(state, &req.params),
        _ => return None,
    };
    Some(respond(req, result))
}
