use std::sync::Arc;

use anyhow::anyhow;
use axum::extract::FromRef;
use time::{format_description::FormatItem, macros::format_description, OffsetDateTime, UtcOffset};
use tracing::{debug, info, warn};

use super::{
    address::WalletAddress,
    dto::ConnectRequest,
    error::WalletError,
    signature,
};
use crate::{
    config::WalletConfig,
    state::AppState,
    users::{model::WALLET_CHANNEL, NewUser, Role, User, UserDirectory},
};

/// Links wallets to user accounts. Holds no state of its own.
#[derive(Clone)]
pub struct WalletLinkService {
    users: Arc<dyn UserDirectory>,
    config: WalletConfig,
}

/// Outcome of a successful connect.
#[derive(Debug, Clone)]
pub struct LinkedWallet {
    pub user: User,
    pub address: WalletAddress,
    pub role: Role,
    pub created: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletStatus {
    pub wallet_connected: bool,
    pub wallet_address: Option<String>,
    pub user_role: Option<Role>,
}

impl FromRef<AppState> for WalletLinkService {
    fn from_ref(state: &AppState) -> Self {
        Self::new(state.users.clone(), state.config.wallet.clone())
    }
}

// Same shape as JavaScript's `Date.prototype.toISOString`.
const ISO_MILLIS: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z");

/// `FoodPrint: Link wallet <address> as <role> at <timestamp>`, the text the
/// browser asks the wallet to sign.
pub fn link_message(address: &WalletAddress, role: Role, at: OffsetDateTime) -> anyhow::Result<String> {
    let at = at.to_offset(UtcOffset::UTC).format(ISO_MILLIS)?;
    Ok(format!("FoodPrint: Link wallet {} as {} at {}", address, role, at))
}

fn non_empty(v: Option<&str>) -> Option<&str> {
    v.filter(|s| !s.is_empty())
}

impl WalletLinkService {
    pub fn new(users: Arc<dyn UserDirectory>, config: WalletConfig) -> Self {
        Self { users, config }
    }

    pub async fn connect(&self, req: &ConnectRequest) -> Result<LinkedWallet, WalletError> {
        let address = match req.wallet_address.as_deref() {
            Some(raw) => WalletAddress::parse(raw),
            None => Err(WalletError::InvalidAddress),
        }
        .inspect_err(|_| warn!(wallet = ?req.wallet_address, "invalid wallet address"))?;

        let role: Role = req
            .user_role
            .as_deref()
            .ok_or(WalletError::InvalidRole)
            .and_then(|token| token.parse::<Role>().map_err(WalletError::from))
            .inspect_err(|_| warn!(role = ?req.user_role, "invalid role"))?;

        self.check_ownership(
            &address,
            non_empty(req.signature.as_deref()),
            non_empty(req.message.as_deref()),
        )?;

        if let Some(existing) = self.users.find_by_wallet(address.as_str()).await? {
            self.users.update_role(existing.id, role).await?;
            let user = self.reload(existing.id).await?;
            info!(user_id = user.id, wallet = %address, role = %role, "wallet reconnected");
            return Ok(LinkedWallet {
                user,
                address,
                role,
                created: false,
            });
        }

        let (user, created) = self.relink_or_create(&address, role).await?;
        Ok(LinkedWallet {
            user,
            address,
            role,
            created,
        })
    }

    /// Verification runs only when both fields are present, unless the
    /// deployment requires a signature.
    fn check_ownership(
        &self,
        address: &WalletAddress,
        signature: Option<&str>,
        message: Option<&str>,
    ) -> Result<(), WalletError> {
        match (signature, message) {
            (Some(signature), Some(message)) => {
                match signature::verify(message, signature, address.as_str()) {
                    Ok(true) => Ok(()),
                    Ok(false) => {
                        warn!(wallet = %address, "signature from a different address");
                        Err(WalletError::SignatureMismatch)
                    }
                    Err(e) => {
                        warn!(wallet = %address, error = %e, "signature verification error");
                        Err(WalletError::InvalidSignature)
                    }
                }
            }
            _ if self.config.require_signature => {
                warn!(wallet = %address, "signature required but not supplied");
                Err(WalletError::SignatureRequired)
            }
            _ => {
                debug!(wallet = %address, "no signature supplied; trusting claimed address");
                Ok(())
            }
        }
    }

    // A wallet-created account whose wallet was disconnected still owns the
    // synthesized email; relink it instead of colliding on that email.
    async fn relink_or_create(
        &self,
        address: &WalletAddress,
        role: Role,
    ) -> Result<(User, bool), WalletError> {
        let email = address.synthetic_email(&self.config.email_domain);

        if let Some(prior) = self.users.find_by_email(&email).await? {
            if prior.wallet_address.is_none() && prior.is_wallet_account() {
                self.users.link_wallet(prior.id, address.as_str(), role).await?;
                let user = self.reload(prior.id).await?;
                info!(user_id = user.id, wallet = %address, role = %role, "wallet relinked");
                return Ok((user, false));
            }
        }

        let new_user = NewUser {
            first_name: Some(role.display_label().to_string()),
            last_name: None,
            email: Some(email),
            phone_number: address.synthetic_phone(),
            role: Some(role),
            password_hash: None,
            registration_channel: WALLET_CHANNEL,
            wallet_address: Some(address.as_str().to_string()),
        };
        let user = self.users.insert(new_user).await.inspect_err(|e| {
            warn!(wallet = %address, error = %e, "wallet user insert failed");
        })?;
        info!(user_id = user.id, wallet = %address, role = %role, "wallet user created");
        Ok((user, true))
    }

    async fn reload(&self, id: i64) -> Result<User, WalletError> {
        self.users
            .find_by_id(id)
            .await?
            .ok_or_else(|| WalletError::Internal(anyhow!("user {id} vanished during update")))
    }

    /// Clears the caller's wallet. Roles are kept.
    pub async fn disconnect(&self, caller: Option<i64>) -> Result<(), WalletError> {
        let user_id = caller.ok_or(WalletError::Unauthenticated)?;
        self.users.clear_wallet(user_id).await?;
        info!(user_id, "wallet disconnected");
        Ok(())
    }

    pub async fn status(&self, caller: Option<i64>) -> Result<WalletStatus, WalletError> {
        let user_id = caller.ok_or(WalletError::Unauthenticated)?;
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(WalletError::UserNotFound)?;
        Ok(WalletStatus {
            wallet_connected: user.wallet_address.is_some(),
            user_role: user.role_token(),
            wallet_address: user.wallet_address,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::memory::MemoryUserDirectory;
    use crate::wallet::signature::test_support::{address_of, key, sign};
    use time::macros::datetime;

    const ADDR: &str = "0xABCDEF0123456789ABCDEF0123456789ABCDEF01";
    const ADDR_LOWER: &str = "0xabcdef0123456789abcdef0123456789abcdef01";

    fn service_with(config: WalletConfig) -> (WalletLinkService, Arc<MemoryUserDirectory>) {
        let dir = Arc::new(MemoryUserDirectory::new());
        (WalletLinkService::new(dir.clone(), config), dir)
    }

    fn service() -> (WalletLinkService, Arc<MemoryUserDirectory>) {
        service_with(WalletConfig::default())
    }

    fn req(address: &str, role: &str) -> ConnectRequest {
        ConnectRequest {
            wallet_address: Some(address.into()),
            user_role: Some(role.into()),
            ..Default::default()
        }
    }

    fn signed(address: &str, role: &str, signature: String, message: &str) -> ConnectRequest {
        ConnectRequest {
            signature: Some(signature),
            message: Some(message.into()),
            ..req(address, role)
        }
    }

    #[tokio::test]
    async fn first_connect_creates_wallet_account() {
        let (svc, dir) = service();
        let linked = svc.connect(&req(ADDR, "farmer")).await.unwrap();

        assert!(linked.created);
        assert_eq!(linked.address.as_str(), ADDR_LOWER);
        assert_eq!(linked.role, Role::Farmer);

        let rows = dir.all();
        assert_eq!(rows.len(), 1);
        let u = &rows[0];
        assert_eq!(u.wallet_address.as_deref(), Some(ADDR_LOWER));
        assert_eq!(u.user_role.as_deref(), Some("farmer"));
        assert_eq!(u.role.as_deref(), Some("Farmer"));
        assert_eq!(u.first_name.as_deref(), Some("Farmer"));
        assert_eq!(u.phone_number, "wallet_abcdef0123");
        assert_eq!(
            u.email.as_deref(),
            Some("0xabcdef0123456789abcdef0123456789abcdef01@wallet.foodprint")
        );
        assert_eq!(u.registration_channel.as_deref(), Some("wallet"));
        assert!(u.password_hash.is_none());
    }

    #[tokio::test]
    async fn rejects_bad_addresses_before_touching_directory() {
        let (svc, dir) = service();
        for bad in ["", "0x123", "ABCDEF0123456789ABCDEF0123456789ABCDEF0123", "0xZZCDEF0123456789ABCDEF0123456789ABCDEF01"] {
            let err = svc.connect(&req(bad, "farmer")).await.unwrap_err();
            assert!(matches!(err, WalletError::InvalidAddress), "{bad:?}");
        }
        let err = svc
            .connect(&ConnectRequest {
                user_role: Some("farmer".into()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, WalletError::InvalidAddress));
        assert_eq!(dir.calls(), 0);
    }

    #[tokio::test]
    async fn rejects_roles_outside_the_set() {
        let (svc, dir) = service();
        for bad in ["", "Farmer", "consumer", "ADMIN"] {
            let err = svc.connect(&req(ADDR, bad)).await.unwrap_err();
            assert!(matches!(err, WalletError::InvalidRole), "{bad:?}");
        }
        let err = svc
            .connect(&ConnectRequest {
                wallet_address: Some(ADDR.into()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, WalletError::InvalidRole));
        assert_eq!(dir.calls(), 0);
    }

    #[tokio::test]
    async fn connect_is_idempotent() {
        let (svc, dir) = service();
        let first = svc.connect(&req(ADDR, "farmer")).await.unwrap();
        let second = svc.connect(&req(ADDR, "farmer")).await.unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.user.id, second.user.id);
        let rows = dir.all();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].user_role.as_deref(), Some("farmer"));
    }

    #[tokio::test]
    async fn different_role_reassigns_without_new_record() {
        let (svc, dir) = service();
        svc.connect(&req(ADDR, "farmer")).await.unwrap();
        let linked = svc.connect(&req(ADDR_LOWER, "distributor")).await.unwrap();

        assert_eq!(linked.user.user_role.as_deref(), Some("distributor"));
        assert_eq!(linked.user.role.as_deref(), Some("Distributor"));
        let rows = dir.all();
        assert_eq!(rows.len(), 1);
        assert_eq!(
            rows.iter()
                .filter(|u| u.wallet_address.as_deref() == Some(ADDR_LOWER))
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn disconnect_keeps_role_and_status_reflects_it() {
        let (svc, _dir) = service();
        let linked = svc.connect(&req(ADDR, "wholesaler")).await.unwrap();
        let id = Some(linked.user.id);

        let before = svc.status(id).await.unwrap();
        assert!(before.wallet_connected);
        assert_eq!(before.wallet_address.as_deref(), Some(ADDR_LOWER));

        svc.disconnect(id).await.unwrap();

        let after = svc.status(id).await.unwrap();
        assert_eq!(
            after,
            WalletStatus {
                wallet_connected: false,
                wallet_address: None,
                user_role: Some(Role::Wholesaler),
            }
        );
    }

    #[tokio::test]
    async fn reconnect_after_disconnect_relinks_same_account() {
        let (svc, dir) = service();
        let first = svc.connect(&req(ADDR, "farmer")).await.unwrap();
        svc.disconnect(Some(first.user.id)).await.unwrap();

        let again = svc.connect(&req(ADDR, "retailer")).await.unwrap();
        assert!(!again.created);
        assert_eq!(again.user.id, first.user.id);
        assert_eq!(again.user.wallet_address.as_deref(), Some(ADDR_LOWER));
        assert_eq!(again.user.user_role.as_deref(), Some("retailer"));
        assert_eq!(dir.all().len(), 1);
    }

    #[tokio::test]
    async fn unauthenticated_calls_do_not_touch_directory() {
        let (svc, dir) = service();
        assert!(matches!(svc.status(None).await, Err(WalletError::Unauthenticated)));
        assert!(matches!(svc.disconnect(None).await, Err(WalletError::Unauthenticated)));
        assert_eq!(dir.calls(), 0);
    }

    #[tokio::test]
    async fn status_for_missing_user_is_not_found() {
        let (svc, _dir) = service();
        assert!(matches!(svc.status(Some(99)).await, Err(WalletError::UserNotFound)));
    }

    #[tokio::test]
    async fn valid_signature_is_accepted() {
        let (svc, _dir) = service();
        let signer = key(1);
        let address = address_of(&signer).to_uppercase().replacen("0X", "0x", 1);
        let message = "FoodPrint: Link wallet as farmer";
        let linked = svc
            .connect(&signed(&address, "farmer", sign(&signer, message), message))
            .await
            .unwrap();
        assert_eq!(linked.address.as_str(), address_of(&signer));
    }

    #[tokio::test]
    async fn signature_from_another_key_is_mismatch() {
        let (svc, dir) = service();
        let message = "FoodPrint: Link wallet";
        let err = svc
            .connect(&signed(&address_of(&key(1)), "farmer", sign(&key(2), message), message))
            .await
            .unwrap_err();
        assert!(matches!(err, WalletError::SignatureMismatch));
        assert_eq!(dir.calls(), 0);
    }

    #[tokio::test]
    async fn malformed_signature_is_invalid() {
        let (svc, _dir) = service();
        let err = svc
            .connect(&signed(ADDR, "farmer", "0xdeadbeef".into(), "hello"))
            .await
            .unwrap_err();
        assert!(matches!(err, WalletError::InvalidSignature));
    }

    #[tokio::test]
    async fn signature_without_message_is_skipped_by_default() {
        let (svc, _dir) = service();
        let linked = svc
            .connect(&ConnectRequest {
                signature: Some("0xdeadbeef".into()),
                ..req(ADDR, "admin")
            })
            .await
            .unwrap();
        assert_eq!(linked.role, Role::Admin);
    }

    #[tokio::test]
    async fn required_signature_rejects_unsigned_connect() {
        let (svc, dir) = service_with(WalletConfig {
            require_signature: true,
            ..WalletConfig::default()
        });
        let err = svc.connect(&req(ADDR, "farmer")).await.unwrap_err();
        assert!(matches!(err, WalletError::SignatureRequired));

        let err = svc
            .connect(&ConnectRequest {
                message: Some("hello".into()),
                signature: Some(String::new()),
                ..req(ADDR, "farmer")
            })
            .await
            .unwrap_err();
        assert!(matches!(err, WalletError::SignatureRequired));
        assert_eq!(dir.calls(), 0);

        let signer = key(5);
        let message = "FoodPrint: Link wallet";
        svc.connect(&signed(&address_of(&signer), "farmer", sign(&signer, message), message))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn insert_race_surfaces_as_already_linked() {
        // Another request linked the address to an account with a different
        // email; the unique key on wallet_address rejects our insert.
        let dir = Arc::new(MemoryUserDirectory::new());
        dir.insert(NewUser {
            first_name: None,
            last_name: None,
            email: Some("someone@else.example".into()),
            phone_number: "+1".into(),
            role: Some(Role::Farmer),
            password_hash: None,
            registration_channel: "web",
            wallet_address: Some(ADDR_LOWER.into()),
        })
        .await
        .unwrap();
        let svc = WalletLinkService::new(dir.clone(), WalletConfig::default());

        let address = WalletAddress::parse(ADDR).unwrap();
        let err = svc.relink_or_create(&address, Role::Farmer).await.unwrap_err();
        assert!(matches!(err, WalletError::AddressAlreadyLinked));
    }

    #[test]
    fn link_message_matches_browser_format() {
        let address = WalletAddress::parse(ADDR).unwrap();
        let msg = link_message(&address, Role::Farmer, datetime!(2025-11-06 06:58:22.123456 UTC)).unwrap();
        assert_eq!(
            msg,
            "FoodPrint: Link wallet 0xabcdef0123456789abcdef0123456789abcdef01 as farmer at 2025-11-06T06:58:22.123Z"
        );

        let shifted = link_message(&address, Role::Admin, datetime!(2025-11-06 09:58:22.1 +03:00)).unwrap();
        assert!(shifted.ends_with("as admin at 2025-11-06T06:58:22.100Z"), "{shifted}");
    }
}
