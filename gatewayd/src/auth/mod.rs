//! Authentication for the two surfaces this crate exposes.
//!
//! - **Proxy surface** (`POST /v1/messages`): [`current_user::ApiKeyUser`], a
//!   hashed-lookup extractor against the `api_keys` table. Key material is
//!   never stored in plaintext; see [`crate::crypto`].
//! - **Admin surface** (`/admin/api/**`): [`current_user::AdminUser`], a
//!   single static bearer token compared against `config.admin_token`.
//!
//! There is no session/cookie/SSO layer here: those concerns belong to the
//! control-plane product this crate was distilled from, not to a reverse
//! proxy.

pub mod current_user;
