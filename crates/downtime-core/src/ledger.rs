//! Resource Ledger: energy-chit balances of characters and group banks.
//!
//! A character's available funds are its personal balance plus its group's
//! bank. Debits draw from the two in a fixed [`DrawOrder`] and are atomic:
//! either the whole amount is taken or nothing changes. Every mutation is
//! appended to a journal of [`LedgerEntry`] values.
//!
//! Accounts live in a `DashMap` of individually locked cells. A debit locks
//! the character account first and the group account second, so commits on
//! different groups never contend and commits on the same group serialise.

use std::sync::{Arc, Mutex, MutexGuard};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ErrorKind;
use crate::id::{CharacterId, GroupId};

/// Which balance pays first when a character spends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrawOrder {
    #[default]
    PersonalFirst,
    GroupFirst,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountId {
    Character(CharacterId),
    Group(GroupId),
}

#[derive(Debug)]
struct Account {
    balance: i64,
    /// Group bank a character account may draw on.
    group: Option<GroupId>,
}

/// Proof that funds were available at validation time. Mutates nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reservation {
    pub character: CharacterId,
    pub amount: i64,
    pub available: i64,
}

/// How a committed debit was split between the two balances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Debit {
    pub personal: i64,
    pub group: i64,
}

impl Debit {
    pub fn total(&self) -> i64 {
        self.personal + self.group
    }
}

/// One line of the append-only journal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub seq: u64,
    pub account: AccountId,
    /// Signed change: negative for debits.
    pub delta: i64,
    pub balance_after: i64,
    pub memo: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("insufficient funds: needed {needed}, available {available}")]
    InsufficientFunds { needed: i64, available: i64 },
    #[error("invalid amount {0}")]
    InvalidAmount(i64),
    #[error("unknown account {0:?}")]
    UnknownAccount(AccountId),
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            LedgerError::InvalidAmount(_) => ErrorKind::InvalidPayload,
            LedgerError::UnknownAccount(_) => ErrorKind::NotFound,
        }
    }
}

fn lock<T>(cell: &Mutex<T>) -> MutexGuard<'_, T> {
    cell.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Default)]
pub struct Ledger {
    accounts: DashMap<AccountId, Arc<Mutex<Account>>>,
    journal: Mutex<Vec<LedgerEntry>>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open (or reset) a group bank.
    pub fn open_group(&self, group: GroupId, balance: i64) {
        self.accounts.insert(
            AccountId::Group(group),
            Arc::new(Mutex::new(Account {
                balance,
                group: None,
            })),
        );
    }

    /// Open (or reset) a character account, optionally linked to a group bank.
    pub fn open_character(&self, character: CharacterId, group: Option<GroupId>, balance: i64) {
        self.accounts.insert(
            AccountId::Character(character),
            Arc::new(Mutex::new(Account { balance, group })),
        );
    }

    fn cell(&self, account: AccountId) -> Result<Arc<Mutex<Account>>, LedgerError> {
        self.accounts
            .get(&account)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(LedgerError::UnknownAccount(account))
    }

    pub fn balance(&self, account: AccountId) -> Result<i64, LedgerError> {
        let cell = self.cell(account)?;
        let balance = lock(&cell).balance;
        Ok(balance)
    }

    /// Group bank the character draws on, if any.
    pub fn group_of(&self, character: CharacterId) -> Result<Option<GroupId>, LedgerError> {
        let cell = self.cell(AccountId::Character(character))?;
        let group = lock(&cell).group;
        Ok(group)
    }

    /// Personal balance plus the group bank when grouped.
    pub fn available_funds(&self, character: CharacterId) -> Result<i64, LedgerError> {
        let cell = self.cell(AccountId::Character(character))?;
        let (personal, group) = {
            let account = lock(&cell);
            (account.balance, account.group)
        };
        let shared = match group {
            Some(g) => self.balance(AccountId::Group(g))?,
            None => 0,
        };
        Ok(personal + shared)
    }

    /// Check `amount` against current funds without mutating anything.
    pub fn reserve(&self, character: CharacterId, amount: i64) -> Result<Reservation, LedgerError> {
        if amount < 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }
        let available = self.available_funds(character)?;
        if amount > available {
            return Err(LedgerError::InsufficientFunds {
                needed: amount,
                available,
            });
        }
        Ok(Reservation {
            character,
            amount,
            available,
        })
    }

    /// Debit `amount` from the character, splitting between the personal
    /// balance and the group bank in `order`. All-or-nothing: on error no
    /// balance changes.
    pub fn commit(
        &self,
        character: CharacterId,
        amount: i64,
        order: DrawOrder,
        memo: &str,
    ) -> Result<Debit, LedgerError> {
        if amount < 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }
        if amount == 0 {
            return Ok(Debit::default());
        }

        let personal_cell = self.cell(AccountId::Character(character))?;
        let mut personal = lock(&personal_cell);
        let group_id = personal.group;
        let group_cell = match group_id {
            Some(g) => Some(self.cell(AccountId::Group(g))?),
            None => None,
        };
        let mut group = group_cell.as_ref().map(|c| lock(c));

        let group_balance = group.as_ref().map(|g| g.balance).unwrap_or(0);
        let available = personal.balance + group_balance;
        if amount > available {
            warn!(
                character = character.0,
                needed = amount,
                available,
                "debit refused: insufficient funds"
            );
            return Err(LedgerError::InsufficientFunds {
                needed: amount,
                available,
            });
        }

        let debit = match order {
            DrawOrder::PersonalFirst => {
                let from_personal = amount.min(personal.balance.max(0));
                Debit {
                    personal: from_personal,
                    group: amount - from_personal,
                }
            }
            DrawOrder::GroupFirst => {
                let from_group = amount.min(group_balance.max(0));
                Debit {
                    personal: amount - from_group,
                    group: from_group,
                }
            }
        };

        personal.balance -= debit.personal;
        let mut entries = Vec::with_capacity(2);
        if debit.personal > 0 {
            entries.push((
                AccountId::Character(character),
                -debit.personal,
                personal.balance,
            ));
        }
        if let (Some(g), Some(gid)) = (group.as_mut(), group_id) {
            g.balance -= debit.group;
            if debit.group > 0 {
                entries.push((AccountId::Group(gid), -debit.group, g.balance));
            }
        }
        self.append(entries, memo);

        debug!(
            character = character.0,
            amount,
            personal = debit.personal,
            group = debit.group,
            "ledger debit"
        );
        Ok(debit)
    }

    /// Add `amount` to an account.
    pub fn credit(&self, account: AccountId, amount: i64, memo: &str) -> Result<i64, LedgerError> {
        if amount < 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }
        let cell = self.cell(account)?;
        let mut acc = lock(&cell);
        acc.balance += amount;
        let after = acc.balance;
        self.append(vec![(account, amount, after)], memo);
        debug!(account = ?account, amount, balance = after, "ledger credit");
        Ok(after)
    }

    fn append(&self, changes: Vec<(AccountId, i64, i64)>, memo: &str) {
        let mut journal = lock(&self.journal);
        for (account, delta, balance_after) in changes {
            let seq = journal.len() as u64;
            journal.push(LedgerEntry {
                seq,
                account,
                delta,
                balance_after,
                memo: memo.to_string(),
            });
        }
    }

    /// Snapshot of the journal, oldest first.
    pub fn entries(&self) -> Vec<LedgerEntry> {
        lock(&self.journal).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALICE: CharacterId = CharacterId(1);
    const BOB: CharacterId = CharacterId(2);
    const CREW: GroupId = GroupId(10);

    fn grouped_ledger(alice: i64, bank: i64) -> Ledger {
        let ledger = Ledger::new();
        ledger.open_group(CREW, bank);
        ledger.open_character(ALICE, Some(CREW), alice);
        ledger.open_character(BOB, Some(CREW), 0);
        ledger
    }

    #[test]
    fn available_includes_group() {
        let ledger = grouped_ledger(30, 70);
        assert_eq!(ledger.available_funds(ALICE).unwrap(), 100);
        assert_eq!(ledger.available_funds(BOB).unwrap(), 70);
    }

    #[test]
    fn ungrouped_available_is_personal() {
        let ledger = Ledger::new();
        ledger.open_character(ALICE, None, 50);
        assert_eq!(ledger.available_funds(ALICE).unwrap(), 50);
    }

    #[test]
    fn reserve_does_not_mutate() {
        let ledger = grouped_ledger(30, 70);
        let r = ledger.reserve(ALICE, 90).unwrap();
        assert_eq!(r.available, 100);
        assert_eq!(ledger.available_funds(ALICE).unwrap(), 100);
        assert!(ledger.entries().is_empty());
    }

    #[test]
    fn reserve_over_available_fails() {
        let ledger = grouped_ledger(30, 70);
        assert_eq!(
            ledger.reserve(ALICE, 101).unwrap_err(),
            LedgerError::InsufficientFunds {
                needed: 101,
                available: 100
            }
        );
    }

    #[test]
    fn personal_first_split() {
        let ledger = grouped_ledger(30, 70);
        let debit = ledger.commit(ALICE, 50, DrawOrder::PersonalFirst, "t").unwrap();
        assert_eq!(debit, Debit { personal: 30, group: 20 });
        assert_eq!(ledger.balance(AccountId::Character(ALICE)).unwrap(), 0);
        assert_eq!(ledger.balance(AccountId::Group(CREW)).unwrap(), 50);
    }

    #[test]
    fn group_first_split() {
        let ledger = grouped_ledger(30, 70);
        let debit = ledger.commit(ALICE, 80, DrawOrder::GroupFirst, "t").unwrap();
        assert_eq!(debit, Debit { personal: 10, group: 70 });
        assert_eq!(ledger.balance(AccountId::Character(ALICE)).unwrap(), 20);
        assert_eq!(ledger.balance(AccountId::Group(CREW)).unwrap(), 0);
    }

    #[test]
    fn failed_commit_changes_nothing() {
        let ledger = grouped_ledger(30, 70);
        let err = ledger.commit(ALICE, 150, DrawOrder::PersonalFirst, "t").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientFunds);
        assert_eq!(ledger.balance(AccountId::Character(ALICE)).unwrap(), 30);
        assert_eq!(ledger.balance(AccountId::Group(CREW)).unwrap(), 70);
        assert!(ledger.entries().is_empty());
    }

    #[test]
    fn negative_amount_rejected() {
        let ledger = grouped_ledger(30, 70);
        assert_eq!(
            ledger.commit(ALICE, -5, DrawOrder::PersonalFirst, "t").unwrap_err(),
            LedgerError::InvalidAmount(-5)
        );
        assert!(matches!(
            ledger.credit(AccountId::Group(CREW), -1, "t"),
            Err(LedgerError::InvalidAmount(-1))
        ));
    }

    #[test]
    fn zero_commit_is_noop() {
        let ledger = grouped_ledger(30, 70);
        let debit = ledger.commit(ALICE, 0, DrawOrder::PersonalFirst, "t").unwrap();
        assert_eq!(debit.total(), 0);
        assert!(ledger.entries().is_empty());
    }

    #[test]
    fn unknown_account() {
        let ledger = Ledger::new();
        let err = ledger.available_funds(ALICE).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn journal_records_each_side() {
        let ledger = grouped_ledger(30, 70);
        ledger.commit(ALICE, 50, DrawOrder::PersonalFirst, "downtime").unwrap();
        ledger.credit(AccountId::Character(ALICE), 5, "refund").unwrap();
        let entries = ledger.entries();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].account, AccountId::Character(ALICE));
        assert_eq!(entries[0].delta, -30);
        assert_eq!(entries[1].account, AccountId::Group(CREW));
        assert_eq!(entries[1].delta, -20);
        assert_eq!(entries[1].balance_after, 50);
        assert_eq!(entries[2].memo, "refund");
        assert_eq!(entries[2].seq, 2);
    }

    #[test]
    fn concurrent_debits_never_overdraw() {
        let ledger = grouped_ledger(0, 100);
        let results: Vec<_> = std::thread::scope(|s| {
            let handles: Vec<_> = [ALICE, BOB]
                .into_iter()
                .map(|c| {
                    let ledger = &ledger;
                    s.spawn(move || ledger.commit(c, 60, DrawOrder::PersonalFirst, "race"))
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(ledger.balance(AccountId::Group(CREW)).unwrap(), 40);
    }
}
