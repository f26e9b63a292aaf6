//! Access keys: labelled service accounts with a role binding and a token.
//!
//! The token is returned once, at creation. Deleting the key deletes the
//! account, which invalidates every token minted for it.

use std::sync::Arc;

use ambient_cluster::objects::{RoleBinding, RoleRef, ServiceAccount, Subject};
use ambient_cluster::{Api, ListParams, ObjectStore};
use ambient_core::constants::{
    ANNOTATION_CREATED_AT, ANNOTATION_CREATED_BY, ANNOTATION_DESCRIPTION, ANNOTATION_DISPLAY_NAME,
    ANNOTATION_LAST_USED_AT, ANNOTATION_ROLE, LABEL_ACCESS_KEY,
};
use ambient_core::naming::{access_key_account_name, access_key_binding_name};
use ambient_core::resources::{AccessKey, CreatedAccessKey, ProjectRole};
use ambient_core::{ObjectMeta, Resource, ValidationError};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tracing::{debug, info, instrument};

use crate::errors::{TenancyError, TenancyResult};

/// Minimum gap between two last-used writes for the same key.
const TOUCH_INTERVAL_SECS: i64 = 60;

/// Body of a key creation request.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAccessKeyRequest {
    /// Display name; also the base of the account name.
    pub name: String,
    /// Description.
    #[serde(default)]
    pub description: Option<String>,
    /// Granted role, `edit` when absent.
    #[serde(default)]
    pub role: Option<ProjectRole>,
}

fn is_access_key(account: &ServiceAccount) -> bool {
    account.metadata.label(LABEL_ACCESS_KEY) == Some("true")
}

fn timestamp(meta: &ObjectMeta, key: &str) -> Option<DateTime<Utc>> {
    meta.annotation(key)
        .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
        .map(|t| t.with_timezone(&Utc))
}

fn to_access_key(account: &ServiceAccount) -> AccessKey {
    let meta = &account.metadata;
    AccessKey {
        id: meta.name.clone(),
        name: meta
            .annotation(ANNOTATION_DISPLAY_NAME)
            .unwrap_or(meta.name.as_str())
            .to_string(),
        description: meta.annotation(ANNOTATION_DESCRIPTION).map(String::from),
        role: meta
            .annotation(ANNOTATION_ROLE)
            .and_then(|r| r.parse().ok())
            .unwrap_or(ProjectRole::View),
        created_at: timestamp(meta, ANNOTATION_CREATED_AT).or(meta.creation_timestamp),
        last_used_at: timestamp(meta, ANNOTATION_LAST_USED_AT),
        created_by: meta.annotation(ANNOTATION_CREATED_BY).map(String::from),
    }
}

/// Create a key: account, binding, then a token valid for `ttl_secs`.
#[instrument(skip(caller, request), fields(key = %request.name))]
pub async fn create(
    caller: Arc<dyn ObjectStore>,
    project: &str,
    request: CreateAccessKeyRequest,
    created_by: &str,
    ttl_secs: u64,
) -> TenancyResult<CreatedAccessKey> {
    if !request.name.chars().any(|c| c.is_ascii_alphanumeric()) {
        return Err(ValidationError::invalid("name", "must contain at least one letter or digit").into());
    }
    let role = request.role.unwrap_or(ProjectRole::Edit);
    let now = Utc::now();
    let account_name = access_key_account_name(&request.name, now.timestamp());

    let mut metadata = ObjectMeta::named(&account_name, project)
        .with_label(LABEL_ACCESS_KEY, "true")
        .with_annotation(ANNOTATION_DISPLAY_NAME, &request.name)
        .with_annotation(ANNOTATION_CREATED_AT, now.to_rfc3339())
        .with_annotation(ANNOTATION_ROLE, role.as_str())
        .with_annotation(ANNOTATION_CREATED_BY, created_by);
    if let Some(description) = request.description.as_deref().filter(|d| !d.is_empty()) {
        metadata = metadata.with_annotation(ANNOTATION_DESCRIPTION, description);
    }
    let account = Api::<ServiceAccount>::namespaced(Arc::clone(&caller), project)
        .create(&ServiceAccount { metadata })
        .await?;

    let binding = RoleBinding {
        metadata: ObjectMeta::named(access_key_binding_name(&account_name), project)
            .with_label(LABEL_ACCESS_KEY, "true")
            .owned_by(account.owner_reference()),
        subjects: vec![Subject::service_account(project, &account_name)],
        role_ref: RoleRef::cluster_role(&role.cluster_role()),
    };
    let _ = Api::<RoleBinding>::namespaced(Arc::clone(&caller), project)
        .create(&binding)
        .await?;

    let token = caller.request_token(project, &account_name, ttl_secs).await?;
    info!(account = %account_name, role = %role, "access key created");
    Ok(CreatedAccessKey {
        key: to_access_key(&account),
        token,
    })
}

/// Keys in `project`.
pub async fn list(caller: Arc<dyn ObjectStore>, project: &str) -> TenancyResult<Vec<AccessKey>> {
    let accounts = Api::<ServiceAccount>::namespaced(caller, project)
        .list(&ListParams::default().labels(LABEL_ACCESS_KEY, "true"))
        .await?;
    Ok(accounts.iter().map(to_access_key).collect())
}

/// Delete key `key_id` and its binding.
#[instrument(skip(caller))]
pub async fn delete(caller: Arc<dyn ObjectStore>, project: &str, key_id: &str) -> TenancyResult<()> {
    let accounts = Api::<ServiceAccount>::namespaced(Arc::clone(&caller), project);
    if accounts.get_opt(key_id).await?.filter(is_access_key).is_none() {
        return Err(TenancyError::NotFound(format!("access key '{key_id}'")));
    }
    let _ = Api::<RoleBinding>::namespaced(caller, project)
        .delete_opt(&access_key_binding_name(key_id))
        .await?;
    accounts.delete(key_id).await?;
    info!(key = key_id, "access key deleted");
    Ok(())
}

/// Record that key `account` authenticated just now.
///
/// Returns whether the annotation was written; recent uses and accounts that
/// are not access keys are skipped.
pub async fn touch_last_used(service: Arc<dyn ObjectStore>, project: &str, account: &str) -> TenancyResult<bool> {
    let accounts = Api::<ServiceAccount>::namespaced(service, project);
    let Some(mut key) = accounts.get_opt(account).await?.filter(is_access_key) else {
        return Ok(false);
    };
    let now = Utc::now();
    if timestamp(&key.metadata, ANNOTATION_LAST_USED_AT)
        .is_some_and(|last| now - last < Duration::seconds(TOUCH_INTERVAL_SECS))
    {
        return Ok(false);
    }
    key.metadata = key.metadata.with_annotation(ANNOTATION_LAST_USED_AT, now.to_rfc3339());
    let _ = accounts.replace(&key).await?;
    debug!(project, account, "access key last-used updated");
    Ok(true)
}
