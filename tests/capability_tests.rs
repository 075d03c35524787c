//! Capability link integration tests: recipient binding, tamper rejection,
//! active-status checks and last_opened stamping.

use std::sync::Arc;

use anyhow::Result;
use tempfile::tempdir;

use filegate::access::{self, Role};
use filegate::capability;
use filegate::context::AppContext;
use filegate::error::AppError;
use filegate::mail::{MailDispatcher, MemoryMailDispatcher};

fn test_ctx(root: &std::path::Path) -> AppContext {
    let mail = Arc::new(MemoryMailDispatcher::default()) as Arc<dyn MailDispatcher>;
    AppContext::new(&[9u8; 32], root, mail).expect("context")
}

/// Seed one Ops uploader, one Client downloader and one stored file.
fn seed(ctx: &AppContext) -> (i64, i64) {
    let ops = ctx.users.create("ops@x.com", "Test@1234", "Ops", Role::Ops).unwrap();
    let client = ctx.users.create("client@x.com", "Test@1234", "Client", Role::Client).unwrap();
    let uploader = ctx.users.get(ops.id).unwrap();
    let file = access::upload(ctx, &uploader, "q3-report.xlsx", b"spreadsheet bytes").unwrap();
    (client.id, file.id)
}

#[tokio::test]
async fn minted_link_is_redeemable_by_its_recipient() -> Result<()> {
    let tmp = tempdir()?;
    let ctx = test_ctx(tmp.path());
    let (client_id, file_id) = seed(&ctx);

    let client = ctx.users.get(client_id).unwrap();
    let token = access::generate_link(&ctx, &client, file_id).expect("link minted");

    let handle = capability::redeem_link(&ctx, &token, client_id).expect("redeem");
    assert_eq!(handle.file.file_name, "q3-report.xlsx");
    assert_eq!(handle.content, b"spreadsheet bytes");
    Ok(())
}

#[tokio::test]
async fn redemption_stamps_last_opened() -> Result<()> {
    let tmp = tempdir()?;
    let ctx = test_ctx(tmp.path());
    let (client_id, file_id) = seed(&ctx);

    let before = ctx.files.get_active(file_id).unwrap().last_opened;
    std::thread::sleep(std::time::Duration::from_millis(5));

    let token = capability::issue_link(&ctx, client_id, file_id)?;
    capability::redeem_link(&ctx, &token, client_id)?;

    let after = ctx.files.get_active(file_id).unwrap().last_opened;
    assert!(after > before);
    Ok(())
}

#[tokio::test]
async fn wrong_recipient_is_forbidden() -> Result<()> {
    let tmp = tempdir()?;
    let ctx = test_ctx(tmp.path());
    let (client_id, file_id) = seed(&ctx);

    let token = capability::issue_link(&ctx, client_id, file_id)?;
    let err = capability::redeem_link(&ctx, &token, client_id + 57).unwrap_err();
    assert!(matches!(err, AppError::Forbidden { .. }));
    assert_eq!(err.message(), "This link is not for you.");
    Ok(())
}

#[tokio::test]
async fn corrupted_or_foreign_tokens_collapse_to_invalid_token() -> Result<()> {
    let tmp = tempdir()?;
    let ctx = test_ctx(tmp.path());
    let (client_id, file_id) = seed(&ctx);

    // Flipped byte in a genuine token.
    let token = capability::issue_link(&ctx, client_id, file_id)?;
    let mut bytes = token.clone().into_bytes();
    let idx = bytes.len() - 2;
    bytes[idx] = if bytes[idx] == b'A' { b'B' } else { b'A' };
    let tampered = String::from_utf8(bytes).unwrap();
    let err = capability::redeem_link(&ctx, &tampered, client_id).unwrap_err();
    assert!(matches!(err, AppError::InvalidToken { .. }));
    assert_eq!(err.message(), "Invalid or expired link.");

    // Arbitrary garbage.
    let err = capability::redeem_link(&ctx, "definitely-not-a-token", client_id).unwrap_err();
    assert!(matches!(err, AppError::InvalidToken { .. }));

    // Token sealed under a different key.
    let other_tmp = tempdir()?;
    let other = AppContext::new(
        &[1u8; 32],
        other_tmp.path(),
        Arc::new(MemoryMailDispatcher::default()) as Arc<dyn MailDispatcher>,
    )?;
    let foreign = other.cipher.seal(format!("{client_id}:{file_id}").as_bytes()).unwrap();
    let err = capability::redeem_link(&ctx, &foreign, client_id).unwrap_err();
    assert!(matches!(err, AppError::InvalidToken { .. }));
    Ok(())
}

#[tokio::test]
async fn well_formed_token_with_junk_payload_is_invalid_token() -> Result<()> {
    let tmp = tempdir()?;
    let ctx = test_ctx(tmp.path());
    let (client_id, _file_id) = seed(&ctx);

    // Sealed under the right key but not "{int}:{int}": parse failures are
    // indistinguishable from decode failures to the caller.
    for payload in [&b"not numbers"[..], b"1;2", b"1:2:3", b""] {
        let token = ctx.cipher.seal(payload).unwrap();
        let err = capability::redeem_link(&ctx, &token, client_id).unwrap_err();
        assert!(matches!(err, AppError::InvalidToken { .. }), "payload {:?}", payload);
    }
    Ok(())
}

#[tokio::test]
async fn links_to_missing_or_inactive_files_fail() -> Result<()> {
    let tmp = tempdir()?;
    let ctx = test_ctx(tmp.path());
    let (client_id, file_id) = seed(&ctx);

    // Minting against an unknown id is refused.
    let err = capability::issue_link(&ctx, client_id, 9999).unwrap_err();
    assert!(matches!(err, AppError::NotFound { .. }));

    // A link minted while active dies with the file's soft delete.
    let token = capability::issue_link(&ctx, client_id, file_id)?;
    ctx.files.soft_delete(file_id);
    let err = capability::redeem_link(&ctx, &token, client_id).unwrap_err();
    assert!(matches!(err, AppError::NotFound { .. }));
    Ok(())
}

#[tokio::test]
async fn tokens_are_reusable_until_key_rotation() -> Result<()> {
    let tmp = tempdir()?;
    let ctx = test_ctx(tmp.path());
    let (client_id, file_id) = seed(&ctx);

    // Capability-style: redemption does not consume the token.
    let token = capability::issue_link(&ctx, client_id, file_id)?;
    capability::redeem_link(&ctx, &token, client_id)?;
    let again = capability::redeem_link(&ctx, &token, client_id);
    assert!(again.is_ok());
    Ok(())
}
