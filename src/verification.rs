//! Email verification ledger operations.
//!
//! `issue` appends a fresh 4-digit code and mails it; `redeem` checks the
//! latest still-active code for the email against the 120-second window.
//! Codes are random and deliberately not checked for collisions with codes
//! still in flight: only the most recently issued record is ever consulted,
//! so an older code simply becomes unredeemable once a newer one exists.

use chrono::Utc;
use rand::Rng;
use tracing::{info, warn};

use crate::access;
use crate::context::AppContext;
use crate::error::{AppError, AppResult};
use crate::store::users::UserRecord;
use crate::store::verifications::VerificationState;

/// Redemption yields success only within this many seconds of issuance.
pub const VERIFICATION_WINDOW_SECS: i64 = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifiedOutcome {
    /// Correct code inside the window; the email is now registerable.
    Verified,
    /// Correct code, too late. The record is closed unverified.
    Expired,
    /// Wrong code; the record stays active so the user may retry.
    WrongCode,
    /// No active record for this email (never issued, superseded, or consumed).
    NoActiveCode,
}

fn generate_code() -> String {
    rand::thread_rng().gen_range(1000..=9999).to_string()
}

/// Issue a verification code for an email and dispatch it.
///
/// The record is appended before the mail goes out; a dispatch failure is
/// surfaced as an upstream error but the record stays, and a later `issue`
/// simply supersedes it under latest-wins.
pub async fn issue(ctx: &AppContext, email: &str) -> AppResult<String> {
    let code = generate_code();
    let record = ctx.verifications.append(email, &code);
    info!(target: "filegate::verify", "code issued email={} record={}", email, record.id);
    if let Err(e) = ctx
        .mail
        .send(email, "Verification Code", &format!("Your verification code is: {code}"))
        .await
    {
        warn!(target: "filegate::verify", "mail dispatch failed email={}: {e}", email);
        return Err(AppError::upstream(
            "mail_send_failed".into(),
            format!("Failed to send email: {e}"),
        ));
    }
    Ok(code)
}

/// Redeem a code against the latest active record for the email.
pub fn redeem(ctx: &AppContext, email: &str, code: &str) -> VerifiedOutcome {
    let Some(record) = ctx.verifications.latest_active(email) else {
        return VerifiedOutcome::NoActiveCode;
    };
    if record.code != code {
        // Record untouched: retry is permitted within the window.
        return VerifiedOutcome::WrongCode;
    }
    let elapsed = Utc::now().signed_duration_since(record.created_at).num_seconds();
    if elapsed <= VERIFICATION_WINDOW_SECS {
        ctx.verifications.complete(record.id, VerificationState::Verified);
        info!(target: "filegate::verify", "code verified email={} record={}", email, record.id);
        VerifiedOutcome::Verified
    } else {
        ctx.verifications.complete(record.id, VerificationState::Expired);
        VerifiedOutcome::Expired
    }
}

/// Registration is permitted only after a completed, successfully verified
/// redemption for the email, any time after that.
pub fn can_register(ctx: &AppContext, email: &str) -> bool {
    ctx.verifications.has_completed_verification(email)
}

/// Full registration flow: role and field validation, email uniqueness,
/// verification gate, password policy, then identity creation. Checks run in
/// the same order the API has always applied them.
pub fn register(
    ctx: &AppContext,
    email: &str,
    password: &str,
    role: &str,
    name: &str,
) -> AppResult<UserRecord> {
    let Some(role) = access::Role::parse(role) else {
        return Err(AppError::user("invalid_role", "Invalid role."));
    };
    if ctx.users.find_by_email(email).is_some() {
        return Err(AppError::user("email_exists", "Email already exists."));
    }
    if !can_register(ctx, email) {
        return Err(AppError::user("email_not_verified", "First verify your email."));
    }
    access::validate_password(password)?;
    ctx.users.create(email, password, name, role)
}
