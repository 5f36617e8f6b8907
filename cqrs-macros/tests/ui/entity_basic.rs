use cqrs_domain::entity::Entity;
use cqrs_macros::entity;

#[entity]
struct Account {
    balance: i64,
}

#[entity(id = u64, debug = false)]
struct Ledger {
    entries: Vec<String>,
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Ledger(..)")
    }
}

fn main() {
    let account = Account::new("acc-1".to_string());
    assert_eq!(account.id(), "acc-1");
    assert_eq!(account.balance, 0);
    let _ = format!("{:?}", account.clone());

    let ledger = Ledger::new(7);
    assert_eq!(*ledger.id(), 7);
    assert!(ledger.entries.is_empty());
    let _ = format!("{:?}", ledger);
}
