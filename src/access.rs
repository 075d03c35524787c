//! Role-based access gate
//! ----------------------
//! One role per identity: Ops uploads, Client lists and downloads. The gate is
//! evaluated before any side effect, so a rejected upload never creates a
//! record. This module also owns the two input validators the gate applies
//! before delegating to the stores: the upload extension allow-list and the
//! registration password policy.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::capability;
use crate::context::AppContext;
use crate::error::{AppError, AppResult};
use crate::store::files::FileRecord;
use crate::store::users::UserRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Ops,
    Client,
}

impl Role {
    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "Ops" => Some(Role::Ops),
            "Client" => Some(Role::Client),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Ops => "Ops",
            Role::Client => "Client",
        }
    }
}

/// The three role-gated operations. Link redemption is deliberately absent:
/// there the recipient is bound inside the token payload instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Upload,
    List,
    GenerateLink,
}

impl Operation {
    pub fn required_role(&self) -> Role {
        match self {
            Operation::Upload => Role::Ops,
            Operation::List | Operation::GenerateLink => Role::Client,
        }
    }

    fn denial_message(&self) -> &'static str {
        match self {
            Operation::Upload => "Only Ops users can upload files.",
            Operation::List => "Only Client users can list files.",
            Operation::GenerateLink => "Only Client users can download files.",
        }
    }
}

/// Gate check: the requester's role must match the operation's required role.
pub fn authorize(role: Option<Role>, op: Operation) -> AppResult<()> {
    match role {
        Some(r) if r == op.required_role() => Ok(()),
        _ => {
            debug!(target: "filegate::access", "denied op={:?} role={:?}", op, role);
            Err(AppError::forbidden("role_mismatch", op.denial_message()))
        }
    }
}

pub const ALLOWED_EXTENSIONS: [&str; 3] = [".pptx", ".docx", ".xlsx"];

/// Case-insensitive extension check against the upload allow-list.
pub fn extension_allowed(file_name: &str) -> bool {
    let lower = file_name.to_ascii_lowercase();
    ALLOWED_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

// Allowed password alphabet and length; the four content requirements are
// checked separately because the regex crate has no lookahead.
static PASSWORD_SHAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z\d@$!#%*?&]{6,20}$").expect("password shape regex"));

const PASSWORD_SYMBOLS: &str = "@$!%*#?&";

/// Password policy: 6-20 chars from the allowed alphabet, with at least one
/// lowercase, one uppercase, one digit and one symbol from `@$!%*#?&`.
pub fn validate_password(password: &str) -> AppResult<()> {
    let ok = PASSWORD_SHAPE.is_match(password)
        && password.chars().any(|c| c.is_ascii_lowercase())
        && password.chars().any(|c| c.is_ascii_uppercase())
        && password.chars().any(|c| c.is_ascii_digit())
        && password.chars().any(|c| PASSWORD_SYMBOLS.contains(c));
    if ok {
        Ok(())
    } else {
        Err(AppError::user(
            "weak_password",
            "Invalid password. Password must contain at least one uppercase letter, one lowercase letter, one digit and one special character, and be 6-20 characters long.",
        ))
    }
}

/// Gated upload: role and extension are verified before the store is touched,
/// so a rejection leaves no file record and no content behind.
pub fn upload(ctx: &AppContext, user: &UserRecord, file_name: &str, bytes: &[u8]) -> AppResult<FileRecord> {
    authorize(Some(user.role), Operation::Upload)?;
    if !extension_allowed(file_name) {
        return Err(AppError::user("invalid_file_type", "Invalid file type."));
    }
    let record = ctx.files.create(user.id, file_name, bytes)?;
    debug!(target: "filegate::access", "upload ok user={} file={} size_kb={}", user.id, record.id, record.size_kb);
    Ok(record)
}

/// Gated listing: only active files are ever returned.
pub fn list(ctx: &AppContext, user: &UserRecord) -> AppResult<Vec<FileRecord>> {
    authorize(Some(user.role), Operation::List)?;
    Ok(ctx.files.list_active())
}

/// Gated link generation: mints a capability token for the requested file.
pub fn generate_link(ctx: &AppContext, user: &UserRecord, file_id: i64) -> AppResult<String> {
    authorize(Some(user.role), Operation::GenerateLink)?;
    capability::issue_link(ctx, user.id, file_id)
}
