//! Capability link issuance and redemption.
//!
//! A link token seals `"{requester_id}:{file_id}"` with the context cipher.
//! The token is the whole capability: no server-side table maps tokens to
//! grants, and a token stays redeemable by its recipient until the key
//! rotates. Redemption re-checks that the presenting user is the recipient
//! the token was minted for.

use tracing::debug;

use crate::context::AppContext;
use crate::error::{AppError, AppResult};
use crate::store::files::FileRecord;

/// Everything a handler needs to stream the file back: the metadata row
/// (carrying the original name for the attachment header) and the content.
#[derive(Debug)]
pub struct DownloadHandle {
    pub file: FileRecord,
    pub content: Vec<u8>,
}

/// Mint a token binding (requester, file). The file must exist and be active.
pub fn issue_link(ctx: &AppContext, requester_id: i64, file_id: i64) -> AppResult<String> {
    let file = ctx
        .files
        .get_active(file_id)
        .ok_or_else(|| AppError::not_found("file_not_found", "File not found."))?;
    let payload = format!("{requester_id}:{}", file.id);
    let token = ctx
        .cipher
        .seal(payload.as_bytes())
        .map_err(|e| AppError::internal("seal_failed".into(), e.to_string()))?;
    debug!(target: "filegate::capability", "link minted requester={} file={}", requester_id, file.id);
    Ok(token)
}

/// Parse the sealed payload. Any format surprise is a token failure; which
/// stage rejected it is never exposed.
fn parse_payload(payload: &[u8]) -> Option<(i64, i64)> {
    let text = std::str::from_utf8(payload).ok()?;
    let (bound, file) = text.split_once(':')?;
    Some((bound.parse().ok()?, file.parse().ok()?))
}

/// Redeem a link token. On success the file's `last_opened` is stamped and a
/// handle with the content is returned.
pub fn redeem_link(ctx: &AppContext, token: &str, requester_id: i64) -> AppResult<DownloadHandle> {
    let payload = ctx.cipher.open(token).map_err(|_| AppError::invalid_token())?;
    let (bound_id, file_id) = parse_payload(&payload).ok_or_else(AppError::invalid_token)?;
    if bound_id != requester_id {
        return Err(AppError::forbidden("wrong_recipient", "This link is not for you."));
    }
    let file = ctx
        .files
        .get_active(file_id)
        .ok_or_else(|| AppError::not_found("file_not_found", "File not found."))?;
    let content = ctx.files.read_content(&file)?;
    ctx.files.touch_last_opened(file.id);
    debug!(target: "filegate::capability", "link redeemed requester={} file={}", requester_id, file.id);
    Ok(DownloadHandle { file, content })
}
