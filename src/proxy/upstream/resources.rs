//! Typed wrappers over the upstream scheduling endpoints
//!
//! Records are loosely typed: the fields the portal shows are named, anything
//! else the upstream sends is kept in `extra` so detail pages can show it.

use axum::http::{Method, StatusCode};
use reqwest::Url;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Map, Value};

use super::client::UpstreamClient;
use super::envelope::ApiError;
use crate::modules::credentials::derive_display_name;

/// Accept ids sent as either strings or numbers
fn id_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    })
}

fn opt_id_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Lists arrive either bare or wrapped in a page object
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Listing<T> {
    Items(Vec<T>),
    Page {
        #[serde(alias = "data", alias = "rows", alias = "results")]
        items: Vec<T>,
    },
}

impl<T> Listing<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            Listing::Items(items) | Listing::Page { items } => items,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    #[serde(default, deserialize_with = "id_string")]
    pub id: String,
    #[serde(default, alias = "roomNumber", alias = "number")]
    pub name: Option<String>,
    #[serde(default)]
    pub building: Option<String>,
    #[serde(default)]
    pub capacity: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Department {
    #[serde(default, deserialize_with = "id_string")]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Instructor {
    #[serde(default, deserialize_with = "id_string")]
    pub id: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Instructor {
    pub fn display_name(&self) -> String {
        derive_display_name(
            self.first_name.as_deref(),
            self.last_name.as_deref(),
            self.name.as_deref(),
            self.email.as_deref().unwrap_or_default(),
        )
    }

    /// Department name when the upstream embeds the department object
    pub fn department_name(&self) -> Option<String> {
        match self.extra.get("department") {
            Some(Value::Object(dept)) => dept.get("name").and_then(Value::as_str).map(str::to_string),
            Some(Value::String(name)) => Some(name.clone()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Class {
    #[serde(default, deserialize_with = "id_string")]
    pub id: String,
    #[serde(default, alias = "title", alias = "courseName")]
    pub name: Option<String>,
    #[serde(default, alias = "courseCode")]
    pub code: Option<String>,
    #[serde(default, deserialize_with = "opt_id_string")]
    pub instructor_id: Option<String>,
    #[serde(default, deserialize_with = "opt_id_string")]
    pub room_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Class {
    /// Whether the class is assigned to the given instructor
    pub fn taught_by(&self, subject_id: &str) -> bool {
        if self.instructor_id.as_deref() == Some(subject_id) {
            return true;
        }
        match self.extra.get("instructor").and_then(|i| i.get("id")) {
            Some(Value::String(id)) => id == subject_id,
            Some(Value::Number(id)) => id.to_string() == subject_id,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    #[serde(default, deserialize_with = "id_string")]
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Log a failed call with its operation name and target id, then pass it on
fn logged<T>(op: &str, id: Option<&str>, result: Result<T, ApiError>) -> Result<T, ApiError> {
    if let Err(e) = &result {
        match id {
            Some(id) => tracing::error!(op, id, error = %e, "upstream call failed"),
            None => tracing::error!(op, error = %e, "upstream call failed"),
        }
    }
    result
}

async fn list<T: serde::de::DeserializeOwned>(
    upstream: &UpstreamClient,
    op: &str,
    path: &str,
    token: &str,
) -> Result<Vec<T>, ApiError> {
    let result = upstream
        .call::<Listing<T>>(Method::GET, path, Some(token), None)
        .await
        .map(Listing::into_vec);
    logged(op, None, result)
}

async fn get_one<T: serde::de::DeserializeOwned>(
    upstream: &UpstreamClient,
    op: &str,
    collection: &str,
    id: &str,
    token: &str,
) -> Result<T, ApiError> {
    let result = match item_path(collection, id) {
        Ok(path) => upstream.call(Method::GET, &path, Some(token), None).await,
        Err(e) => Err(e),
    };
    logged(op, Some(id), result)
}

/// `collection/id` with the id percent-encoded as a single path segment
fn item_path(collection: &str, id: &str) -> Result<String, ApiError> {
    if matches!(id, "" | "." | "..") {
        return Err(ApiError::Upstream {
            status: StatusCode::NOT_FOUND,
            message: "Not found".to_string(),
        });
    }

    let mut url = Url::parse("http://upstream.invalid/")
        .map_err(|e| ApiError::Decode(e.to_string()))?;
    url.path_segments_mut()
        .map_err(|_| ApiError::Decode("upstream base cannot hold a path".to_string()))?
        .pop_if_empty()
        .extend(collection.split('/').filter(|s| !s.is_empty()))
        .push(id);
    Ok(url.path().to_string())
}

pub async fn profile(upstream: &UpstreamClient, token: &str) -> Result<Profile, ApiError> {
    let result = upstream.call(Method::GET, "/auth/profile", Some(token), None).await;
    logged("profile", None, result)
}

pub async fn change_password(
    upstream: &UpstreamClient,
    token: &str,
    current_password: &str,
    new_password: &str,
) -> Result<(), ApiError> {
    let body = json!({ "currentPassword": current_password, "newPassword": new_password });
    let result = upstream
        .call::<Value>(Method::POST, "/auth/change-password", Some(token), Some(&body))
        .await
        .map(|_| ());
    logged("change_password", None, result)
}

pub async fn generate_otp(upstream: &UpstreamClient, email: &str) -> Result<(), ApiError> {
    let body = json!({ "email": email });
    let result = upstream
        .call::<Value>(Method::POST, "/otp/generate", None, Some(&body))
        .await
        .map(|_| ());
    logged("generate_otp", Some(email), result)
}

pub async fn validate_otp(upstream: &UpstreamClient, email: &str, otp: &str) -> Result<(), ApiError> {
    let body = json!({ "email": email, "otp": otp });
    let result = upstream
        .call::<Value>(Method::POST, "/otp/validate", None, Some(&body))
        .await
        .map(|_| ());
    logged("validate_otp", Some(email), result)
}

pub async fn reset_password_with_otp(
    upstream: &UpstreamClient,
    email: &str,
    otp: &str,
    new_password: &str,
) -> Result<(), ApiError> {
    let body = json!({ "email": email, "otp": otp, "newPassword": new_password });
    let result = upstream
        .call::<Value>(Method::POST, "/auth/reset-password-with-otp", None, Some(&body))
        .await
        .map(|_| ());
    logged("reset_password_with_otp", Some(email), result)
}

pub async fn list_classes(upstream: &UpstreamClient, token: &str) -> Result<Vec<Class>, ApiError> {
    list(upstream, "list_classes", "/class", token).await
}

pub async fn get_class(upstream: &UpstreamClient, token: &str, id: &str) -> Result<Class, ApiError> {
    get_one(upstream, "get_class", "/class", id, token).await
}

pub async fn list_departments(
    upstream: &UpstreamClient,
    token: &str,
) -> Result<Vec<Department>, ApiError> {
    list(upstream, "list_departments", "/department", token).await
}

pub async fn list_instructors(
    upstream: &UpstreamClient,
    token: &str,
) -> Result<Vec<Instructor>, ApiError> {
    list(upstream, "list_instructors", "/instructors", token).await
}

pub async fn get_instructor(
    upstream: &UpstreamClient,
    token: &str,
    id: &str,
) -> Result<Instructor, ApiError> {
    get_one(upstream, "get_instructor", "/instructors", id, token).await
}

pub async fn list_rooms(upstream: &UpstreamClient, token: &str) -> Result<Vec<Room>, ApiError> {
    list(upstream, "list_rooms", "/room", token).await
}

pub async fn get_room(upstream: &UpstreamClient, token: &str, id: &str) -> Result<Room, ApiError> {
    get_one(upstream, "get_room", "/room", id, token).await
}
