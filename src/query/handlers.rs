use axum::{
    Json,
    extract::{Extension, Path, Query},
    http::StatusCode,
};
use std::sync::Arc;

use super::contract::RingQuery;
use super::protocol::*;
use crate::error::RingError;
use crate::ring::peer::Directory;

pub async fn handle_put(
    Extension(directory): Extension<Arc<Directory>>,
    Path(name): Path<String>,
    Json(req): Json<PutRequest>,
) -> Result<StatusCode, RingError> {
    let member = directory.lookup(&name)?;
    if let Err(e) = member.put(&req.key, req.value).await {
        tracing::error!("Put {:?} via {} failed: {}", req.key, name, e);
        return Err(e);
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn handle_get(
    Extension(directory): Extension<Arc<Directory>>,
    Path(name): Path<String>,
    Query(KeyQuery { key }): Query<KeyQuery>,
) -> Result<Json<GetResponse>, RingError> {
    let member = directory.lookup(&name)?;
    let value = member.get(&key).await?;
    Ok(Json(GetResponse { key, value }))
}

pub async fn handle_delete(
    Extension(directory): Extension<Arc<Directory>>,
    Path(name): Path<String>,
    Json(req): Json<DeleteRequest>,
) -> Result<StatusCode, RingError> {
    let member = directory.lookup(&name)?;
    member.delete(&req.key).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn handle_values(
    Extension(directory): Extension<Arc<Directory>>,
    Path(name): Path<String>,
) -> Result<Json<ValuesResponse>, RingError> {
    let member = directory.lookup(&name)?;
    Ok(Json(ValuesResponse {
        values: member.list_values().await?,
    }))
}

pub async fn handle_refresh(
    Extension(directory): Extension<Arc<Directory>>,
    Path(name): Path<String>,
) -> Result<StatusCode, RingError> {
    let member = directory.lookup(&name)?;
    member.force_routing_refresh().await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn handle_members(
    Extension(directory): Extension<Arc<Directory>>,
    Path(name): Path<String>,
) -> Result<Json<MembersResponse>, RingError> {
    let member = directory.lookup(&name)?;
    Ok(Json(MembersResponse {
        members: member.enumerate_members().await?,
    }))
}

pub async fn handle_leave(
    Extension(directory): Extension<Arc<Directory>>,
    Path(name): Path<String>,
) -> Result<StatusCode, RingError> {
    let member = directory.lookup(&name)?;
    if let Err(e) = member.leave().await {
        tracing::error!("Leave of {} failed: {}", name, e);
        return Err(e);
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn handle_probe(
    Extension(directory): Extension<Arc<Directory>>,
    Path(name): Path<String>,
) -> Result<Json<ProbeResponse>, RingError> {
    let member = directory.lookup(&name)?;
    let hops = member.probe_ring().await?;
    Ok(Json(ProbeResponse { hops }))
}
