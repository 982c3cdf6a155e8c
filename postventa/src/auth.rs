//! Login on top of identity resolution, with first-login provisioning.
//!
//! A directory record (owner or technician) without an account logs in with
//! its RUT as password; that first login creates and links the account.

use rand::distributions::Alphanumeric;
use rand::{Rng, RngCore};
use tracing::{info, warn};

use crate::core::identity::{
    DirectoryRecord, IdentityError, Resolved, check_account, provisioned_username,
    provisioning_allowed, resolve,
};
use crate::core::password::{SALT_LEN, hash_with_salt, verify};
use crate::core::types::AccountId;
use crate::model::{Account, Store};

pub fn new_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    salt
}

pub fn hash_password(password: &str) -> String {
    hash_with_salt(password, &new_salt())
}

/// Random alphanumeric password for resets.
pub fn generate_password(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoginOutcome {
    pub account: AccountId,
    /// The account was created by this login.
    pub provisioned: bool,
}

/// Authenticate `identifier`/`password`.
///
/// The store is only modified when a directory record gets provisioned.
pub fn login(store: &mut Store, identifier: &str, password: &str) -> Result<LoginOutcome, IdentityError> {
    match resolve(store, identifier)? {
        Resolved::Account(id) => {
            let account = store.account(id).ok_or(IdentityError::NotFound)?;
            check_account(account)?;
            if !verify(password, &account.password_hash) {
                warn!(account = %id, "password mismatch");
                return Err(IdentityError::InvalidCredentials);
            }
            Ok(LoginOutcome {
                account: id,
                provisioned: false,
            })
        }
        Resolved::Unprovisioned(record) => {
            let id = provision(store, record, password)?;
            Ok(LoginOutcome {
                account: id,
                provisioned: true,
            })
        }
    }
}

fn provision(store: &mut Store, record: DirectoryRecord, password: &str) -> Result<AccountId, IdentityError> {
    let (rut, email, active) = match record {
        DirectoryRecord::Owner(id) => {
            let owner = store.owner(id).ok_or(IdentityError::NotFound)?;
            (owner.rut.clone(), Some(owner.email.clone()), true)
        }
        DirectoryRecord::Technician(id) => {
            let tech = store.technician(id).ok_or(IdentityError::NotFound)?;
            (tech.rut.clone(), tech.email.clone(), tech.active)
        }
    };
    if !active {
        return Err(IdentityError::Inactive);
    }
    if !provisioning_allowed(&rut, password) {
        return Err(IdentityError::InvalidCredentials);
    }
    let username = provisioned_username(store, &rut, record);
    let id = store.next_account_id();
    let (owner, technician) = match record {
        DirectoryRecord::Owner(owner) => (Some(owner), None),
        DirectoryRecord::Technician(technician) => (None, Some(technician)),
    };
    store.accounts.push(Account {
        id,
        username: username.clone(),
        email,
        rut: Some(rut),
        role: record.role(),
        staff: false,
        active: true,
        password_hash: hash_password(password),
        project: None,
        owner,
        technician,
    });
    match record {
        DirectoryRecord::Owner(owner) => {
            if let Some(owner) = store.owner_mut(owner) {
                owner.account = Some(id);
            }
        }
        DirectoryRecord::Technician(technician) => {
            if let Some(tech) = store.technician_mut(technician) {
                tech.account = Some(id);
            }
        }
    }
    info!(account = %id, %username, role = %record.role(), "account provisioned");
    Ok(id)
}

/// Replace the password of the account named `username`.
pub fn reset_password(store: &mut Store, username: &str, password: &str) -> Result<AccountId, IdentityError> {
    let id = store
        .account_by_username(username)
        .map(|account| account.id)
        .ok_or(IdentityError::NotFound)?;
    if let Some(account) = store.account_mut(id) {
        account.password_hash = hash_password(password);
    }
    info!(account = %id, "password reset");
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{OwnerId, Role};
    use crate::test_support::{SAMPLE_PASSWORD, sample_store};

    #[test]
    fn login_by_username_rut_and_email() {
        let mut store = sample_store();
        for (identifier, expected) in [
            ("CDIAZ", AccountId(3)),
            ("12.345.678-5", AccountId(2)),
            ("supervisor@andes.cl", AccountId(1)),
        ] {
            let outcome = login(&mut store, identifier, SAMPLE_PASSWORD).expect(identifier);
            assert_eq!(outcome.account, expected, "{identifier}");
            assert!(!outcome.provisioned);
        }
    }

    #[test]
    fn wrong_password_is_rejected() {
        let mut store = sample_store();
        assert_eq!(
            login(&mut store, "cdiaz", "otra"),
            Err(IdentityError::InvalidCredentials)
        );
    }

    #[test]
    fn first_login_with_rut_provisions_owner() {
        let mut store = sample_store();
        let outcome = login(&mut store, "11.111.111-1", "11111111-1").expect("provision");
        assert!(outcome.provisioned);
        let account = store.account(outcome.account).expect("account");
        assert_eq!(account.username, "111111111");
        assert_eq!(account.role, Role::Owner);
        assert_eq!(account.owner, Some(OwnerId(2)));
        assert_eq!(
            store.owner(OwnerId(2)).expect("owner").account,
            Some(outcome.account)
        );

        let again = login(&mut store, "111111111", "11111111-1").expect("second login");
        assert_eq!(again.account, outcome.account);
        assert!(!again.provisioned);
    }

    #[test]
    fn provisioning_requires_rut_as_password() {
        let mut store = sample_store();
        let before = store.clone();
        assert_eq!(
            login(&mut store, "bruno@correo.cl", "clave"),
            Err(IdentityError::InvalidCredentials)
        );
        assert_eq!(store, before);
    }

    #[test]
    fn reset_then_login_with_new_password() {
        let mut store = sample_store();
        let fresh = generate_password(12);
        assert_eq!(fresh.len(), 12);
        reset_password(&mut store, "cdiaz", &fresh).expect("reset");
        assert!(login(&mut store, "cdiaz", &fresh).is_ok());
        assert_eq!(
            reset_password(&mut store, "nadie", "x"),
            Err(IdentityError::NotFound)
        );
    }
}
