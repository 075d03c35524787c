//! Explicitly constructed application context.
//!
//! Everything the operations need is carried here and passed down: the token
//! cipher key material, the three stores and the mail dispatcher. No
//! process-wide globals; a second context with its own key and stores can
//! coexist in the same process, which is exactly what the tests do.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

use crate::mail::MailDispatcher;
use crate::store::files::FileStore;
use crate::store::users::UserStore;
use crate::store::verifications::VerificationStore;
use crate::token::{TokenCipher, KEY_LEN};

pub struct AppContext {
    pub cipher: TokenCipher,
    pub users: UserStore,
    pub verifications: VerificationStore,
    pub files: FileStore,
    pub mail: Arc<dyn MailDispatcher>,
}

impl AppContext {
    pub fn new(key: &[u8; KEY_LEN], data_root: &Path, mail: Arc<dyn MailDispatcher>) -> Result<Self> {
        Self::with_cipher(TokenCipher::new(key), data_root, mail)
    }

    pub fn with_cipher(cipher: TokenCipher, data_root: &Path, mail: Arc<dyn MailDispatcher>) -> Result<Self> {
        Ok(Self {
            cipher,
            users: UserStore::new(),
            verifications: VerificationStore::new(),
            files: FileStore::new(data_root)?,
            mail,
        })
    }
}
