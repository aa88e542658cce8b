use axum::{
    Json,
    extract::{Extension, Path},
    http::StatusCode,
};
use std::sync::Arc;

use super::peer::Directory;
use super::protocol::*;
use super::types::RingView;
use crate::error::RingError;

type Reply<T> = Result<Json<T>, RingError>;

pub async fn handle_view(
    Extension(directory): Extension<Arc<Directory>>,
    Path(name): Path<String>,
) -> Reply<RingView> {
    let member = directory.lookup(&name)?;
    Ok(Json(member.view().await))
}

pub async fn handle_replace_link(
    Extension(directory): Extension<Arc<Directory>>,
    Path(name): Path<String>,
    Json(req): Json<ReplaceLinkRequest>,
) -> Result<StatusCode, RingError> {
    let member = directory.lookup(&name)?;
    member.replace_link(req.side, req.expected, req.new).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn handle_lookup(
    Extension(directory): Extension<Arc<Directory>>,
    Path(name): Path<String>,
    Json(req): Json<LookupRequest>,
) -> Reply<LookupResponse> {
    let member = directory.lookup(&name)?;
    match member.lookup_owner(req.key, req.hops).await {
        Ok(owner) => Ok(Json(LookupResponse { owner })),
        Err(e) => {
            tracing::error!("Lookup of {} at {} failed: {}", req.key, name, e);
            Err(e)
        }
    }
}

pub async fn handle_fingers(
    Extension(directory): Extension<Arc<Directory>>,
    Path(name): Path<String>,
    Json(req): Json<FingersRequest>,
) -> Result<StatusCode, RingError> {
    let member = directory.lookup(&name)?;
    member.compute_fingers(&req.members, req.epoch).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn handle_refresh(
    Extension(directory): Extension<Arc<Directory>>,
    Path(name): Path<String>,
) -> Result<StatusCode, RingError> {
    let member = directory.lookup(&name)?;
    if let Err(e) = member.refresh_routing().await {
        tracing::error!("Routing refresh from {} failed: {}", name, e);
        return Err(e);
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn handle_handover(
    Extension(directory): Extension<Arc<Directory>>,
    Path(name): Path<String>,
    Json(req): Json<HandoverRequest>,
) -> Reply<EntriesPayload> {
    let member = directory.lookup(&name)?;
    let entries = member.handover(req.from, req.to).await;
    Ok(Json(EntriesPayload::from_pairs(entries)))
}

pub async fn handle_absorb(
    Extension(directory): Extension<Arc<Directory>>,
    Path(name): Path<String>,
    Json(req): Json<AbsorbRequest>,
) -> Result<StatusCode, RingError> {
    let member = directory.lookup(&name)?;
    let count = req.entries.len();
    let entries = EntriesPayload {
        entries: req.entries,
    }
    .into_pairs();
    member.absorb(entries, req.mode).await;
    tracing::debug!("Member {} absorbed {} entries", name, count);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn handle_retract(
    Extension(directory): Extension<Arc<Directory>>,
    Path(name): Path<String>,
    Json(req): Json<EntriesPayload>,
) -> Result<StatusCode, RingError> {
    let member = directory.lookup(&name)?;
    member.retract(req.into_pairs()).await;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn handle_fetch(
    Extension(directory): Extension<Arc<Directory>>,
    Path((name, key)): Path<(String, u64)>,
) -> Reply<FetchResponse> {
    let member = directory.lookup(&name)?;
    let value = member.fetch(key.into()).await?;
    Ok(Json(FetchResponse { value }))
}

pub async fn handle_store(
    Extension(directory): Extension<Arc<Directory>>,
    Path(name): Path<String>,
    Json(req): Json<StoreRequest>,
) -> Result<StatusCode, RingError> {
    let member = directory.lookup(&name)?;
    member.store(req.key, req.value).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn handle_remove(
    Extension(directory): Extension<Arc<Directory>>,
    Path(name): Path<String>,
    Json(req): Json<RemoveRequest>,
) -> Result<StatusCode, RingError> {
    let member = directory.lookup(&name)?;
    member.remove(req.key).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn handle_values(
    Extension(directory): Extension<Arc<Directory>>,
    Path(name): Path<String>,
) -> Reply<ValuesResponse> {
    let member = directory.lookup(&name)?;
    Ok(Json(ValuesResponse {
        values: member.shard().all_values().await,
    }))
}

pub async fn handle_probe(
    Extension(directory): Extension<Arc<Directory>>,
    Path(name): Path<String>,
    Json(req): Json<ProbeRequest>,
) -> Reply<ProbeResponse> {
    let member = directory.lookup(&name)?;
    let hops = member.probe(req.origin, req.hops).await?;
    Ok(Json(ProbeResponse { hops }))
}

pub async fn handle_members(
    Extension(directory): Extension<Arc<Directory>>,
    Path(name): Path<String>,
) -> Reply<MembersResponse> {
    let member = directory.lookup(&name)?;
    Ok(Json(MembersResponse {
        members: member.enumerate_ring().await?,
    }))
}
