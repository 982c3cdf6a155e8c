//! Deterministic identity resolution for login.
//!
//! An identifier is looked up level by level; the first level with any
//! candidate decides. More than one candidate on that level is an error,
//! never a coin toss.
//!
//! Levels:
//! 1. account username (case-insensitive)
//! 2. account RUT (normalized)
//! 3. account email (case-insensitive)
//! 4. directory RUT (owners, then technicians)
//! 5. directory email (owners, then technicians)

use crate::core::rut;
use crate::core::types::{AccountId, OwnerId, Role, TechnicianId};
use crate::model::{Account, Store};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identifier {
    /// Lower-cased email address.
    Email(String),
    /// Free-form username; `rut` is set when the input is RUT-shaped.
    Username { raw: String, rut: Option<String> },
}

pub fn classify(input: &str) -> Identifier {
    let trimmed = input.trim();
    if trimmed.contains('@') {
        return Identifier::Email(trimmed.to_lowercase());
    }
    let rut = rut::is_rut_shaped(trimmed).then(|| rut::normalize(trimmed));
    Identifier::Username {
        raw: trimmed.to_string(),
        rut,
    }
}

/// Owner or technician record that can log in before it has an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectoryRecord {
    Owner(OwnerId),
    Technician(TechnicianId),
}

impl DirectoryRecord {
    pub fn role(self) -> Role {
        match self {
            DirectoryRecord::Owner(_) => Role::Owner,
            DirectoryRecord::Technician(_) => Role::Technician,
        }
    }

    pub fn raw_id(self) -> u64 {
        match self {
            DirectoryRecord::Owner(id) => id.0,
            DirectoryRecord::Technician(id) => id.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolved {
    Account(AccountId),
    /// Directory record without an account yet.
    Unprovisioned(DirectoryRecord),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    #[error("no account or directory record matches the identifier")]
    NotFound,
    #[error("identifier is ambiguous: {count} candidates by {level}")]
    Ambiguous { level: &'static str, count: usize },
    #[error("account is inactive")]
    Inactive,
    #[error("administrator account lacks the staff flag")]
    NotStaff,
    #[error("invalid credentials")]
    InvalidCredentials,
}

pub fn resolve(store: &Store, input: &str) -> Result<Resolved, IdentityError> {
    let identifier = classify(input);
    let (username, rut_key, email) = match &identifier {
        Identifier::Email(email) => (None, None, Some(email.as_str())),
        Identifier::Username { raw, rut } => (Some(raw.as_str()), rut.as_deref(), None),
    };

    if let Some(username) = username {
        let hits = accounts_where(store, |a| a.username.eq_ignore_ascii_case(username));
        if let Some(id) = single("account username", &hits)? {
            return Ok(Resolved::Account(id));
        }
    }
    if let Some(key) = rut_key {
        let hits = accounts_where(store, |a| {
            a.rut.as_deref().map(rut::normalize).as_deref() == Some(key)
        });
        if let Some(id) = single("account rut", &hits)? {
            return Ok(Resolved::Account(id));
        }
    }
    if let Some(email) = email {
        let hits = accounts_where(store, |a| {
            a.email
                .as_deref()
                .is_some_and(|e| e.eq_ignore_ascii_case(email))
        });
        if let Some(id) = single("account email", &hits)? {
            return Ok(Resolved::Account(id));
        }
    }
    if let Some(key) = rut_key
        && let Some(record) = directory_level(
            store,
            "directory rut",
            |record_rut| rut::normalize(record_rut) == key,
            |_| false,
        )?
    {
        return Ok(record);
    }
    if let Some(email) = email
        && let Some(record) = directory_level(
            store,
            "directory email",
            |_| false,
            |record_email| record_email.eq_ignore_ascii_case(email),
        )?
    {
        return Ok(record);
    }
    Err(IdentityError::NotFound)
}

/// Account-level gates applied after resolution and before the password check.
pub fn check_account(account: &Account) -> Result<(), IdentityError> {
    if !account.active {
        return Err(IdentityError::Inactive);
    }
    if account.role == Role::Administrator && !account.staff {
        return Err(IdentityError::NotStaff);
    }
    Ok(())
}

/// First-login rule: the password must equal the record's RUT once both are normalized.
pub fn provisioning_allowed(record_rut: &str, password: &str) -> bool {
    let expected = rut::normalize(record_rut);
    !expected.is_empty() && rut::normalize(password) == expected
}

/// Username for a provisioned account: the normalized RUT, suffixed with the
/// record id when already taken, then with a counter until it is free.
pub fn provisioned_username(store: &Store, record_rut: &str, record: DirectoryRecord) -> String {
    let base = rut::normalize(record_rut);
    if store.account_by_username(&base).is_none() {
        return base;
    }
    let suffixed = format!("{base}_{}", record.raw_id());
    let mut candidate = suffixed.clone();
    let mut attempt = 1;
    while store.account_by_username(&candidate).is_some() {
        attempt += 1;
        candidate = format!("{suffixed}_{attempt}");
    }
    candidate
}

fn accounts_where(store: &Store, pred: impl Fn(&Account) -> bool) -> Vec<AccountId> {
    store
        .accounts
        .iter()
        .filter(|account| pred(account))
        .map(|account| account.id)
        .collect()
}

fn single<T: Copy>(level: &'static str, hits: &[T]) -> Result<Option<T>, IdentityError> {
    match hits {
        [] => Ok(None),
        [only] => Ok(Some(*only)),
        _ => Err(IdentityError::Ambiguous {
            level,
            count: hits.len(),
        }),
    }
}

/// One directory level: owners first, technicians only if no owner matched.
/// `rut_match` and `email_match` receive the raw stored value.
fn directory_level(
    store: &Store,
    level: &'static str,
    rut_match: impl Fn(&str) -> bool,
    email_match: impl Fn(&str) -> bool,
) -> Result<Option<Resolved>, IdentityError> {
    let owners: Vec<_> = store
        .owners
        .iter()
        .filter(|owner| rut_match(&owner.rut) || email_match(&owner.email))
        .map(|owner| (DirectoryRecord::Owner(owner.id), owner.account))
        .collect();
    if let Some((record, account)) = single(level, &owners)? {
        return Ok(Some(link_or_unprovisioned(record, account)));
    }
    let technicians: Vec<_> = store
        .technicians
        .iter()
        .filter(|tech| rut_match(&tech.rut) || tech.email.as_deref().is_some_and(&email_match))
        .map(|tech| (DirectoryRecord::Technician(tech.id), tech.account))
        .collect();
    Ok(single(level, &technicians)?.map(|(record, account)| link_or_unprovisioned(record, account)))
}

fn link_or_unprovisioned(record: DirectoryRecord, account: Option<AccountId>) -> Resolved {
    match account {
        Some(account) => Resolved::Account(account),
        None => Resolved::Unprovisioned(record),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{account, owner, technician};

    #[test]
    fn classify_splits_email_username_and_rut() {
        assert_eq!(
            classify(" Ana@Mail.CL "),
            Identifier::Email("ana@mail.cl".to_string())
        );
        assert_eq!(
            classify("12.345.678-5"),
            Identifier::Username {
                raw: "12.345.678-5".to_string(),
                rut: Some("123456785".to_string())
            }
        );
        assert_eq!(
            classify("jperez"),
            Identifier::Username {
                raw: "jperez".to_string(),
                rut: None
            }
        );
    }

    #[test]
    fn username_beats_rut_match_on_other_account() {
        let mut store = Store::default();
        let mut by_rut = account(1, "someone", Role::Owner);
        by_rut.rut = Some("11.111.111-1".to_string());
        store.accounts.push(by_rut);
        store
            .accounts
            .push(account(2, "111111111", Role::Technician));

        assert_eq!(
            resolve(&store, "11.111.111-1"),
            Ok(Resolved::Account(AccountId(1)))
        );
        assert_eq!(
            resolve(&store, "111111111"),
            Ok(Resolved::Account(AccountId(2)))
        );
    }

    #[test]
    fn duplicate_emails_are_ambiguous_not_first_match() {
        let mut store = Store::default();
        for id in [1, 2] {
            let mut acc = account(id, &format!("user{id}"), Role::Owner);
            acc.email = Some("shared@mail.cl".to_string());
            store.accounts.push(acc);
        }
        assert_eq!(
            resolve(&store, "SHARED@mail.cl"),
            Err(IdentityError::Ambiguous {
                level: "account email",
                count: 2
            })
        );
    }

    #[test]
    fn directory_record_without_account_is_unprovisioned() {
        let mut store = Store::default();
        store.owners.push(owner(4, "12.345.678-5", "ana@mail.cl"));
        assert_eq!(
            resolve(&store, "123456785"),
            Ok(Resolved::Unprovisioned(DirectoryRecord::Owner(OwnerId(4))))
        );
        assert_eq!(
            resolve(&store, "ana@mail.cl"),
            Ok(Resolved::Unprovisioned(DirectoryRecord::Owner(OwnerId(4))))
        );
    }

    #[test]
    fn owner_record_wins_over_technician_with_same_rut() {
        let mut store = Store::default();
        store.owners.push(owner(1, "12345678-5", "o@mail.cl"));
        store.technicians.push(technician(9, "12345678-5"));
        assert_eq!(
            resolve(&store, "12345678-5"),
            Ok(Resolved::Unprovisioned(DirectoryRecord::Owner(OwnerId(1))))
        );
    }

    #[test]
    fn linked_directory_record_resolves_to_its_account() {
        let mut store = Store::default();
        let mut tech = technician(3, "11111111-1");
        tech.account = Some(AccountId(5));
        store.technicians.push(tech);
        store.accounts.push(account(5, "tec.juan", Role::Technician));
        assert_eq!(
            resolve(&store, "11111111-1"),
            Ok(Resolved::Account(AccountId(5)))
        );
    }

    #[test]
    fn unknown_identifier_is_not_found() {
        assert_eq!(
            resolve(&Store::default(), "nobody"),
            Err(IdentityError::NotFound)
        );
    }

    #[test]
    fn administrators_need_staff_flag() {
        let mut admin = account(1, "admin", Role::Administrator);
        assert_eq!(check_account(&admin), Err(IdentityError::NotStaff));
        admin.staff = true;
        assert_eq!(check_account(&admin), Ok(()));
        admin.active = false;
        assert_eq!(check_account(&admin), Err(IdentityError::Inactive));
    }

    #[test]
    fn provisioning_requires_password_equal_to_rut() {
        assert!(provisioning_allowed("12.345.678-5", "123456785"));
        assert!(provisioning_allowed("12.345.678-k", "12345678K"));
        assert!(!provisioning_allowed("12.345.678-5", "secreto"));
        assert!(!provisioning_allowed("", ""));
    }

    #[test]
    fn provisioned_username_gets_suffix_on_collision() {
        let mut store = Store::default();
        let record = DirectoryRecord::Owner(OwnerId(12));
        assert_eq!(
            provisioned_username(&store, "12.345.678-5", record),
            "123456785"
        );
        store.accounts.push(account(1, "123456785", Role::Owner));
        assert_eq!(
            provisioned_username(&store, "12.345.678-5", record),
            "123456785_12"
        );
        store.accounts.push(account(2, "123456785_12", Role::Owner));
        store.accounts.push(account(3, "123456785_12_2", Role::Owner));
        assert_eq!(
            provisioned_username(&store, "12.345.678-5", record),
            "123456785_12_3"
        );
    }
}
